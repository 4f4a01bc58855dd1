use chrono::{DateTime, Utc};
use docwire::document::{ObjectId, ObjectIdGenerator};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

#[test]
fn test_ids_from_many_threads_are_distinct() {
    let generator = Arc::new(ObjectIdGenerator::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let generator = Arc::clone(&generator);
            thread::spawn(move || (0..12_500).map(|_| generator.generate()).collect::<Vec<_>>())
        })
        .collect();

    let mut seen = HashSet::with_capacity(100_000);
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(seen.insert(id), "duplicate id {}", id);
        }
    }
    assert_eq!(seen.len(), 100_000);
}

#[test]
fn test_shared_generator_and_new_ids_are_distinct() {
    let ids: HashSet<ObjectId> = (0..1_000)
        .map(|i| {
            if i % 2 == 0 {
                ObjectId::new()
            } else {
                ObjectIdGenerator::shared().generate()
            }
        })
        .collect();
    assert_eq!(ids.len(), 1_000);
}

#[test]
fn test_same_second_ids_share_prefix_and_fingerprint() {
    let generator = ObjectIdGenerator::with_fingerprint([1, 2, 3], [4, 5]);
    let when = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
    let first = generator.generate_at(when);
    let second = generator.generate_at(when);

    assert_ne!(first, second);
    assert_eq!(first.as_bytes()[..9], second.as_bytes()[..9]);
    assert_eq!(&first.as_bytes()[4..7], &[1, 2, 3]);
    assert_eq!(&first.as_bytes()[7..9], &[4, 5]);
    assert_eq!(second.counter(), (first.counter() + 1) & 0x00FF_FFFF);
}

proptest! {
    #[test]
    fn prop_timestamp_is_big_endian_seconds(seconds in 0i64..=u32::MAX as i64) {
        let generator = ObjectIdGenerator::new();
        let when = DateTime::<Utc>::from_timestamp(seconds, 0).unwrap();
        let id = generator.generate_at(when);
        prop_assert_eq!(&id.as_bytes()[..4], &(seconds as u32).to_be_bytes());
        prop_assert_eq!(id.timestamp(), when);
    }

    #[test]
    fn prop_hex_roundtrip(bytes in any::<[u8; 12]>()) {
        let id = ObjectId::from_bytes(bytes);
        let hex = id.to_hex();
        prop_assert_eq!(hex.len(), 24);
        prop_assert_eq!(ObjectId::parse_str(&hex).unwrap(), id);
    }
}
