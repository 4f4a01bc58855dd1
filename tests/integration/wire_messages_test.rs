use docwire::doc;
use docwire::document::bson::{BsonEncoder, BsonError};
use docwire::document::{Document, ObjectId, Value};
use docwire::error::DriverError;
use docwire::protocol::{
    DeleteMessage, GetMoreMessage, InsertMessage, KillCursorsMessage, MessageHeader, OpCode, QueryFlags,
    QueryMessage, UpdateFlags, UpdateMessage, WireMessage,
};
use docwire::registry::TypeRegistry;
use std::io::Cursor;

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_i64(bytes: &[u8], at: usize) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    i64::from_le_bytes(raw)
}

fn header_of(bytes: &[u8]) -> MessageHeader {
    MessageHeader::read_from(&mut Cursor::new(bytes)).unwrap()
}

#[test]
fn test_insert_two_documents_layout() {
    let registry = TypeRegistry::new();
    let encoder = BsonEncoder::new(&registry);
    let person = doc! { "name" => "Jane Doe Smith" };
    assert_eq!(encoder.encode_document(&person).unwrap().len(), 30);

    let message = InsertMessage::with_documents("db.coll", vec![person.clone(), person]);
    let bytes = message.to_bytes(11, &encoder).unwrap();

    assert_eq!(bytes.len(), 16 + 4 + 8 + 30 + 30);
    let header = header_of(&bytes);
    assert_eq!(header.length as usize, bytes.len());
    assert_eq!(header.request_id, 11);
    assert_eq!(header.response_to, 0);
    assert_eq!(header.op_code, OpCode::Insert);
    assert_eq!(read_i32(&bytes, 16), 0);
    assert_eq!(&bytes[20..28], b"db.coll\0");
    assert_eq!(read_i32(&bytes, 28), 30);
    assert_eq!(read_i32(&bytes, 58), 30);
}

#[test]
fn test_query_skip_and_limit() {
    let registry = TypeRegistry::new();
    let encoder = BsonEncoder::new(&registry);
    let message = QueryMessage::new("db.coll", doc! { "age" => doc! { "$gt" => 21 } })
        .skip(5)
        .limit(10)
        .with_flags(QueryFlags::SLAVE_OK);
    let bytes = message.to_bytes(3, &encoder).unwrap();

    assert_eq!(header_of(&bytes).op_code, OpCode::Query);
    assert_eq!(read_i32(&bytes, 16), QueryFlags::SLAVE_OK.bits());
    assert_eq!(&bytes[20..28], b"db.coll\0");
    assert_eq!(read_i32(&bytes, 28), 5);
    assert_eq!(read_i32(&bytes, 32), 10);
    // query document runs to the end when no projection is given
    assert_eq!(read_i32(&bytes, 36) as usize, bytes.len() - 36);
}

#[test]
fn test_query_with_projection() {
    let registry = TypeRegistry::new();
    let encoder = BsonEncoder::new(&registry);
    let bare = QueryMessage::new("db.c", Document::new()).to_bytes(1, &encoder).unwrap();
    let projected = QueryMessage::new("db.c", Document::new())
        .fields(doc! { "name" => 1 })
        .to_bytes(1, &encoder)
        .unwrap();
    let projection_len = encoder.encode_document(&doc! { "name" => 1 }).unwrap().len();
    assert_eq!(projected.len(), bare.len() + projection_len);
}

#[test]
fn test_update_flags_and_documents() {
    let registry = TypeRegistry::new();
    let encoder = BsonEncoder::new(&registry);
    let selector = doc! { "name" => "Jane" };
    let update = doc! { "$set" => doc! { "age" => 42 } };
    let message = UpdateMessage::new("db.coll", selector.clone(), update.clone())
        .upsert(true)
        .multi(true);
    assert_eq!(message.flags(), UpdateFlags::UPSERT | UpdateFlags::MULTI_UPDATE);

    let bytes = message.to_bytes(4, &encoder).unwrap();
    assert_eq!(header_of(&bytes).op_code, OpCode::Update);
    assert_eq!(read_i32(&bytes, 16), 0);
    assert_eq!(&bytes[20..28], b"db.coll\0");
    assert_eq!(read_i32(&bytes, 28), 0b11);

    let selector_len = encoder.encode_document(&selector).unwrap().len();
    let update_len = encoder.encode_document(&update).unwrap().len();
    assert_eq!(bytes.len(), 32 + selector_len + update_len);
}

#[test]
fn test_update_allows_operator_keys() {
    let registry = TypeRegistry::new();
    let encoder = BsonEncoder::new(&registry);
    let message = UpdateMessage::new("db.c", doc! { "a.b" => 1 }, doc! { "$inc" => doc! { "n" => 1 } });
    assert!(message.to_bytes(1, &encoder).is_ok());
}

#[test]
fn test_delete_layout() {
    let registry = TypeRegistry::new();
    let encoder = BsonEncoder::new(&registry);
    let selector = doc! { "_id" => 7 };
    let bytes = DeleteMessage::new("db.coll", selector.clone()).to_bytes(5, &encoder).unwrap();

    assert_eq!(header_of(&bytes).op_code, OpCode::Delete);
    assert_eq!(read_i32(&bytes, 16), 0);
    assert_eq!(&bytes[20..28], b"db.coll\0");
    assert_eq!(read_i32(&bytes, 28), 0);
    assert_eq!(bytes.len(), 32 + encoder.encode_document(&selector).unwrap().len());
}

#[test]
fn test_get_more_layout() {
    let registry = TypeRegistry::new();
    let encoder = BsonEncoder::new(&registry);
    let bytes = GetMoreMessage::new("db.coll", 50, 0x0102_0304_0506_0708)
        .to_bytes(6, &encoder)
        .unwrap();

    assert_eq!(header_of(&bytes).op_code, OpCode::GetMore);
    assert_eq!(bytes.len(), 16 + 4 + 8 + 4 + 8);
    assert_eq!(read_i32(&bytes, 28), 50);
    assert_eq!(read_i64(&bytes, 32), 0x0102_0304_0506_0708);
}

#[test]
fn test_kill_cursors_layout() {
    let registry = TypeRegistry::new();
    let encoder = BsonEncoder::new(&registry);
    let bytes = KillCursorsMessage::new(vec![10, 20, 30]).to_bytes(7, &encoder).unwrap();

    assert_eq!(header_of(&bytes).op_code, OpCode::KillCursors);
    assert_eq!(bytes.len(), 16 + 4 + 4 + 3 * 8);
    assert_eq!(read_i32(&bytes, 20), 3);
    assert_eq!(read_i64(&bytes, 24), 10);
    assert_eq!(read_i64(&bytes, 40), 30);

    assert!(matches!(
        KillCursorsMessage::new(Vec::new()).to_bytes(8, &encoder),
        Err(DriverError::InvalidMessage(_))
    ));
}

#[test]
fn test_insert_rejects_bad_input() {
    let registry = TypeRegistry::new();
    let encoder = BsonEncoder::new(&registry);

    assert!(matches!(
        InsertMessage::new("db.c").to_bytes(1, &encoder),
        Err(DriverError::InvalidMessage(_))
    ));
    assert!(matches!(
        InsertMessage::with_documents("db\0c", vec![doc! { "a" => 1 }]).to_bytes(1, &encoder),
        Err(DriverError::InvalidMessage(_))
    ));
    assert!(matches!(
        InsertMessage::with_documents("db.c", vec![doc! { "$where" => "x" }]).to_bytes(1, &encoder),
        Err(DriverError::InvalidMessage(_))
    ));
    assert!(
        InsertMessage::with_documents("db.c", vec![doc! { "$where" => "x" }])
            .check_keys(false)
            .to_bytes(1, &encoder)
            .is_ok()
    );
}

#[test]
fn test_insert_accepts_db_reference() {
    let registry = TypeRegistry::new();
    let encoder = BsonEncoder::new(&registry);
    let owner = doc! {
        "$ref" => "people",
        "$id" => ObjectId::from_bytes([5; 12]),
        "$db" => "crm",
    };
    let message = InsertMessage::with_documents("db.c", vec![doc! { "owner" => owner.clone() }]);
    let bytes = message.to_bytes(1, &encoder).unwrap();

    let stored = encoder.encode_document(&doc! { "owner" => owner }).unwrap();
    assert_eq!(&bytes[16 + 4 + 5..], stored.as_slice());

    assert!(matches!(
        InsertMessage::with_documents("db.c", vec![doc! { "$ref" => "people" }]).to_bytes(1, &encoder),
        Err(DriverError::InvalidMessage(_))
    ));
}

#[test]
fn test_oversized_document_is_rejected() {
    let registry = TypeRegistry::new();
    let encoder = BsonEncoder::new(&registry).with_max_document_size(64);
    let big = doc! { "blob" => "x".repeat(100) };

    match InsertMessage::with_documents("db.c", vec![big]).to_bytes(1, &encoder) {
        Err(DriverError::Bson(BsonError::DocumentTooLarge { max, .. })) => assert_eq!(max, 64),
        other => panic!("unexpected {:?}", other.map(|bytes| bytes.len())),
    }
}

#[test]
fn test_message_size_limit() {
    let registry = TypeRegistry::new();
    let encoder = BsonEncoder::new(&registry);
    let docs: Vec<Document> = (0..4)
        .map(|i| doc! { "i" => i, "pad" => Value::from("y".repeat(40)) })
        .collect();
    let message = InsertMessage::with_documents("db.c", docs);
    let full = message.to_bytes(1, &encoder).unwrap().len();

    assert!(message.to_bytes_with_limit(1, &encoder, full).is_ok());
    assert!(matches!(
        message.to_bytes_with_limit(1, &encoder, full - 1),
        Err(DriverError::InvalidMessage(_))
    ));
}
