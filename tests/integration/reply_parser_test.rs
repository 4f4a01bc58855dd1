use byteorder::{LittleEndian, WriteBytesExt};
use docwire::doc;
use docwire::document::bson::{BsonDecoder, BsonEncoder, BsonError};
use docwire::document::{Document, Value};
use docwire::error::DriverError;
use docwire::protocol::{ReplyMessage, ResponseFlags};
use docwire::registry::{Schema, Shape, TypeRegistry};
use std::io::Cursor;

struct ReplyParts<'a> {
    response_to: i32,
    flags: ResponseFlags,
    cursor_id: i64,
    starting_from: i32,
    number_returned: i32,
    documents: &'a [Document],
}

impl Default for ReplyParts<'_> {
    fn default() -> Self {
        ReplyParts {
            response_to: 1,
            flags: ResponseFlags::empty(),
            cursor_id: 0,
            starting_from: 0,
            number_returned: 0,
            documents: &[],
        }
    }
}

fn build_reply(parts: ReplyParts<'_>) -> Vec<u8> {
    let registry = TypeRegistry::new();
    let encoder = BsonEncoder::new(&registry);
    let mut body = Vec::new();
    for doc in parts.documents {
        body.extend(encoder.encode_document(doc).unwrap());
    }

    let mut buffer = Vec::new();
    buffer.write_i32::<LittleEndian>((36 + body.len()) as i32).unwrap();
    buffer.write_i32::<LittleEndian>(900).unwrap();
    buffer.write_i32::<LittleEndian>(parts.response_to).unwrap();
    buffer.write_i32::<LittleEndian>(1).unwrap();
    buffer.write_i32::<LittleEndian>(parts.flags.bits()).unwrap();
    buffer.write_i64::<LittleEndian>(parts.cursor_id).unwrap();
    buffer.write_i32::<LittleEndian>(parts.starting_from).unwrap();
    buffer.write_i32::<LittleEndian>(parts.number_returned).unwrap();
    buffer.extend(body);
    buffer
}

#[derive(Debug, Default, PartialEq)]
struct Row {
    n: Option<i32>,
}

impl Shape for Row {
    fn describe(schema: &mut Schema<Self>) {
        schema.constructor(Row::default).field("N", |r| &r.n, |r, v| r.n = v);
    }
}

#[test]
fn test_batch_with_open_cursor() {
    let registry = TypeRegistry::new();
    let decoder = BsonDecoder::new(&registry);
    let docs = [doc! { "n" => 1 }, doc! { "n" => 2 }, doc! { "n" => 3, "tag" => "x" }];
    let bytes = build_reply(ReplyParts {
        response_to: 17,
        cursor_id: 123_456_789_012,
        starting_from: 20,
        number_returned: 3,
        documents: &docs,
        ..ReplyParts::default()
    });

    let reply = ReplyMessage::from_bytes(&bytes, &decoder).unwrap();
    assert_eq!(reply.response_to(), 17);
    assert_eq!(reply.request_id(), 900);
    assert_eq!(reply.cursor_id(), 123_456_789_012);
    assert_eq!(reply.cursor_position(), 20);
    assert_eq!(reply.next_position(), 23);
    assert_eq!(reply.number_returned(), 3);
    assert_eq!(reply.documents(), &docs);

    let rows = reply.decode_documents::<Row>(&registry).unwrap();
    assert_eq!(rows.iter().map(|row| row.value.n).collect::<Vec<_>>(), vec![Some(1), Some(2), Some(3)]);
    assert_eq!(rows[2].unmapped.get("tag"), Some(&Value::from("x")));
}

#[test]
fn test_empty_final_batch() {
    let registry = TypeRegistry::new();
    let decoder = BsonDecoder::new(&registry);
    let reply = ReplyMessage::from_bytes(&build_reply(ReplyParts::default()), &decoder).unwrap();
    assert_eq!(reply.cursor_id(), 0);
    assert!(reply.documents().is_empty());
    assert!(reply.ensure_ok().is_ok());
}

#[test]
fn test_query_failure_surfaces_err_text() {
    let registry = TypeRegistry::new();
    let decoder = BsonDecoder::new(&registry);
    let docs = [doc! { "$err" => "unauthorized", "code" => 13 }];
    let bytes = build_reply(ReplyParts {
        flags: ResponseFlags::QUERY_FAILURE,
        number_returned: 1,
        documents: &docs,
        ..ReplyParts::default()
    });

    let reply = ReplyMessage::from_bytes(&bytes, &decoder).unwrap();
    assert!(reply.has_error());
    assert_eq!(reply.error_message(), Some("unauthorized"));
    match reply.ensure_ok() {
        Err(DriverError::Protocol(msg)) => assert!(msg.contains("unauthorized")),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_cursor_not_found() {
    let registry = TypeRegistry::new();
    let decoder = BsonDecoder::new(&registry);
    let bytes = build_reply(ReplyParts {
        flags: ResponseFlags::CURSOR_NOT_FOUND,
        cursor_id: 44,
        ..ReplyParts::default()
    });
    let reply = ReplyMessage::from_bytes(&bytes, &decoder).unwrap();
    assert!(reply.has_error());
    assert_eq!(reply.error_message(), None);
    assert!(matches!(reply.ensure_ok(), Err(DriverError::Protocol(_))));
}

#[test]
fn test_announced_count_must_match() {
    let registry = TypeRegistry::new();
    let decoder = BsonDecoder::new(&registry);
    let docs = [doc! { "n" => 1 }, doc! { "n" => 2 }];

    for announced in [0, 1, 3] {
        let bytes = build_reply(ReplyParts {
            number_returned: announced,
            documents: &docs,
            ..ReplyParts::default()
        });
        assert!(
            matches!(ReplyMessage::from_bytes(&bytes, &decoder), Err(DriverError::Protocol(_))),
            "announced {}",
            announced
        );
    }
}

#[test]
fn test_document_overrunning_the_message() {
    let registry = TypeRegistry::new();
    let decoder = BsonDecoder::new(&registry);
    let docs = [doc! { "name" => "overrun" }];
    let mut bytes = build_reply(ReplyParts {
        number_returned: 1,
        documents: &docs,
        ..ReplyParts::default()
    });
    // grow the embedded document's own length past the end of the message
    let declared = i32::from_le_bytes([bytes[36], bytes[37], bytes[38], bytes[39]]);
    bytes[36..40].copy_from_slice(&(declared + 8).to_le_bytes());

    assert!(matches!(
        ReplyMessage::from_bytes(&bytes, &decoder),
        Err(DriverError::Protocol(_))
    ));
}

#[test]
fn test_corrupt_document_is_a_bson_error() {
    let registry = TypeRegistry::new();
    let decoder = BsonDecoder::new(&registry);
    let docs = [doc! { "k" => 1 }];
    let mut bytes = build_reply(ReplyParts {
        number_returned: 1,
        documents: &docs,
        ..ReplyParts::default()
    });
    bytes[40] = 0x42;

    assert!(matches!(
        ReplyMessage::from_bytes(&bytes, &decoder),
        Err(DriverError::Bson(BsonError::UnknownTypeTag(0x42)))
    ));
}

#[test]
fn test_header_length_must_match_buffer() {
    let registry = TypeRegistry::new();
    let decoder = BsonDecoder::new(&registry);
    let mut bytes = build_reply(ReplyParts::default());
    bytes.push(0);
    assert!(matches!(
        ReplyMessage::from_bytes(&bytes, &decoder),
        Err(DriverError::Protocol(_))
    ));
    assert!(matches!(
        ReplyMessage::from_bytes(&bytes[..20], &decoder),
        Err(DriverError::Protocol(_))
    ));
}

#[test]
fn test_consecutive_replies_on_one_stream() {
    let registry = TypeRegistry::new();
    let decoder = BsonDecoder::new(&registry);
    let first_docs = [doc! { "batch" => 1 }];
    let mut stream = build_reply(ReplyParts {
        response_to: 5,
        cursor_id: 9,
        number_returned: 1,
        documents: &first_docs,
        ..ReplyParts::default()
    });
    stream.extend(build_reply(ReplyParts {
        response_to: 6,
        ..ReplyParts::default()
    }));

    let mut reader = Cursor::new(stream);
    let first = ReplyMessage::read_from(&mut reader, &decoder).unwrap();
    let second = ReplyMessage::read_from(&mut reader, &decoder).unwrap();
    assert_eq!(first.response_to(), 5);
    assert_eq!(first.cursor_id(), 9);
    assert_eq!(second.response_to(), 6);
    assert!(second.into_documents().is_empty());
}

#[test]
fn test_oversized_reply_is_refused_before_reading() {
    let registry = TypeRegistry::new();
    let decoder = BsonDecoder::new(&registry);
    let docs = [doc! { "pad" => "z".repeat(200) }];
    let bytes = build_reply(ReplyParts {
        number_returned: 1,
        documents: &docs,
        ..ReplyParts::default()
    });
    let mut reader = Cursor::new(bytes);
    assert!(matches!(
        ReplyMessage::read_from_with_limit(&mut reader, &decoder, 128),
        Err(DriverError::Protocol(_))
    ));
    assert_eq!(reader.position(), 4);
}
