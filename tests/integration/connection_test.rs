use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use docwire::config::ClientConfig;
use docwire::doc;
use docwire::document::bson::{BsonDecoder, BsonEncoder, BsonError};
use docwire::document::Document;
use docwire::error::DriverError;
use docwire::protocol::{Connection, InsertMessage, OpCode, QueryMessage, ResponseFlags, Transport};
use docwire::registry::TypeRegistry;
use docwire::result::DriverResult;
use std::io::{Cursor, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Counts writes, never has anything to read.
#[derive(Default)]
struct RecordingTransport {
    writes: usize,
    written: Vec<u8>,
}

impl Transport for RecordingTransport {
    fn write_all(&mut self, data: &[u8]) -> DriverResult<()> {
        self.writes += 1;
        self.written.extend_from_slice(data);
        Ok(())
    }

    fn read_exact_until(&mut self, _buf: &mut [u8], _deadline: Instant) -> DriverResult<()> {
        Err(DriverError::Timeout(Duration::ZERO))
    }
}

/// Read one request off the socket and return its header fields and body.
fn read_request(stream: &mut TcpStream) -> (i32, i32, Vec<u8>) {
    let length = stream.read_i32::<LittleEndian>().unwrap();
    let mut rest = vec![0u8; length as usize - 4];
    stream.read_exact(&mut rest).unwrap();
    let mut header = Cursor::new(&rest[..12]);
    let request_id = header.read_i32::<LittleEndian>().unwrap();
    let _response_to = header.read_i32::<LittleEndian>().unwrap();
    let op_code = header.read_i32::<LittleEndian>().unwrap();
    (request_id, op_code, rest[12..].to_vec())
}

fn write_reply(stream: &mut TcpStream, response_to: i32, cursor_id: i64, documents: &[Document]) {
    write_flagged_reply(stream, ResponseFlags::empty(), response_to, cursor_id, documents);
}

fn write_flagged_reply(
    stream: &mut TcpStream,
    flags: ResponseFlags,
    response_to: i32,
    cursor_id: i64,
    documents: &[Document],
) {
    let registry = TypeRegistry::new();
    let encoder = BsonEncoder::new(&registry);
    let mut body = Vec::new();
    for doc in documents {
        body.extend(encoder.encode_document(doc).unwrap());
    }
    let mut buffer = Vec::new();
    buffer.write_i32::<LittleEndian>((36 + body.len()) as i32).unwrap();
    buffer.write_i32::<LittleEndian>(1000 + response_to).unwrap();
    buffer.write_i32::<LittleEndian>(response_to).unwrap();
    buffer.write_i32::<LittleEndian>(1).unwrap();
    buffer.write_i32::<LittleEndian>(flags.bits()).unwrap();
    buffer.write_i64::<LittleEndian>(cursor_id).unwrap();
    buffer.write_i32::<LittleEndian>(0).unwrap();
    buffer.write_i32::<LittleEndian>(documents.len() as i32).unwrap();
    buffer.extend(body);
    stream.write_all(&buffer).unwrap();
}

fn local_config(listener: &TcpListener) -> ClientConfig {
    ClientConfig::default()
        .with_address(listener.local_addr().unwrap().to_string())
        .with_connect_timeout(Duration::from_secs(2))
        .with_reply_timeout(Duration::from_secs(2))
}

#[test]
fn test_query_and_get_more_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let config = local_config(&listener);

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let registry = TypeRegistry::new();
        let decoder = BsonDecoder::new(&registry);

        let (query_id, op_code, body) = read_request(&mut stream);
        assert_eq!(op_code, OpCode::Query as i32);
        // flags, "db.people\0", skip, limit, then the query document
        let query = decoder.decode_document(&body[4 + 10 + 8..]).unwrap();
        assert_eq!(query.get_str("city"), Some("Oslo"));
        write_reply(&mut stream, query_id, 55, &[doc! { "name" => "Ada" }]);

        let (more_id, op_code, _) = read_request(&mut stream);
        assert_eq!(op_code, OpCode::GetMore as i32);
        write_reply(&mut stream, more_id, 0, &[doc! { "name" => "Bo" }]);

        let (_, op_code, _) = read_request(&mut stream);
        assert_eq!(op_code, OpCode::KillCursors as i32);
    });

    let mut connection = Connection::connect(config).unwrap();
    let first = connection
        .request(&QueryMessage::new("db.people", doc! { "city" => "Oslo" }).limit(1))
        .unwrap();
    assert_eq!(first.cursor_id(), 55);
    assert_eq!(first.documents()[0].get_str("name"), Some("Ada"));

    let second = connection.get_more("db.people", 1, first.cursor_id()).unwrap();
    assert_eq!(second.cursor_id(), 0);
    assert_eq!(second.documents()[0].get_str("name"), Some("Bo"));

    connection.kill_cursors(&[55]).unwrap();
    server.join().unwrap();
}

#[test]
fn test_get_more_on_expired_cursor_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let config = local_config(&listener);

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let (more_id, op_code, _) = read_request(&mut stream);
        assert_eq!(op_code, OpCode::GetMore as i32);
        write_flagged_reply(&mut stream, ResponseFlags::CURSOR_NOT_FOUND, more_id, 0, &[]);

        let (query_id, _, _) = read_request(&mut stream);
        write_flagged_reply(
            &mut stream,
            ResponseFlags::QUERY_FAILURE,
            query_id,
            0,
            &[doc! { "$err" => "bad projection" }],
        );
    });

    let mut connection = Connection::connect(config).unwrap();
    match connection.get_more("db.people", 10, 77) {
        Err(DriverError::Protocol(msg)) => assert!(msg.contains("77"), "unexpected message {}", msg),
        other => panic!("unexpected {:?}", other.map(|reply| reply.cursor_id())),
    }
    match connection.request(&QueryMessage::new("db.people", Document::new())) {
        Err(DriverError::Protocol(msg)) => assert!(msg.contains("bad projection")),
        other => panic!("unexpected {:?}", other.map(|reply| reply.cursor_id())),
    }
    server.join().unwrap();
}

#[test]
fn test_silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let config = local_config(&listener).with_reply_timeout(Duration::from_millis(200));

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        read_request(&mut stream);
        // hold the socket open without answering
        thread::sleep(Duration::from_millis(600));
    });

    let mut connection = Connection::connect(config).unwrap();
    let started = Instant::now();
    let err = connection
        .request(&QueryMessage::new("db.c", Document::new()))
        .unwrap_err();
    assert!(err.is_timeout(), "unexpected {:?}", err);
    assert!(started.elapsed() < Duration::from_millis(550));
    server.join().unwrap();
}

#[test]
fn test_reply_to_another_request_is_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let config = local_config(&listener);

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let (request_id, _, _) = read_request(&mut stream);
        write_reply(&mut stream, request_id.wrapping_add(100), 0, &[]);
    });

    let mut connection = Connection::connect(config).unwrap();
    assert!(matches!(
        connection.request(&QueryMessage::new("db.c", Document::new())),
        Err(DriverError::Protocol(_))
    ));
    server.join().unwrap();
}

#[test]
fn test_peer_closing_mid_reply() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let config = local_config(&listener);

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        read_request(&mut stream);
        stream.write_i32::<LittleEndian>(100).unwrap();
    });

    let mut connection = Connection::connect(config).unwrap();
    let err = connection
        .request(&QueryMessage::new("db.c", Document::new()))
        .unwrap_err();
    assert!(matches!(err, DriverError::Io(_)), "unexpected {:?}", err);
    server.join().unwrap();
}

#[test]
fn test_oversized_document_writes_nothing() {
    let config = ClientConfig::default().with_max_document_size(64);
    let mut connection = Connection::new(RecordingTransport::default(), Arc::new(TypeRegistry::new()), config);

    let err = connection
        .send(&InsertMessage::with_documents("db.c", vec![doc! { "blob" => "x".repeat(100) }]))
        .unwrap_err();
    assert!(matches!(err, DriverError::Bson(BsonError::DocumentTooLarge { .. })));

    let transport = connection.into_transport();
    assert_eq!(transport.writes, 0);
    assert!(transport.written.is_empty());
}

#[test]
fn test_insert_is_fire_and_forget() {
    let mut connection = Connection::new(
        RecordingTransport::default(),
        Arc::new(TypeRegistry::new()),
        ClientConfig::default(),
    );
    let first = connection
        .send(&InsertMessage::with_documents("db.c", vec![doc! { "a" => 1 }]))
        .unwrap();
    let second = connection
        .send(&InsertMessage::with_documents("db.c", vec![doc! { "a" => 2 }]))
        .unwrap();
    assert!(second > first);

    let transport = connection.into_transport();
    assert_eq!(transport.writes, 2);
    let first_len = i32::from_le_bytes([
        transport.written[0],
        transport.written[1],
        transport.written[2],
        transport.written[3],
    ]) as usize;
    assert_eq!(transport.written.len(), first_len * 2);
}

#[test]
fn test_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let config = ClientConfig::default()
        .with_address(address)
        .with_connect_timeout(Duration::from_millis(500));
    assert!(Connection::connect(config).is_err());
}
