use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use docwire::config::ClientConfig;
use docwire::document::bson::BsonEncoder;
use docwire::protocol::{Connection, InsertMessage, KillCursorsMessage, QueryMessage};
use docwire::registry::TypeRegistry;
use docwire::{doc, init_tracing};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;
use tracing::info;

// Run with: RUST_LOG=debug cargo run --example wire_roundtrip
//
// Starts a toy server on a local port that answers every query with one
// canned document, then talks to it through a Connection.

fn serve(listener: TcpListener) -> anyhow::Result<()> {
    let (mut stream, peer) = listener.accept()?;
    info!(%peer, "toy server accepted connection");
    let registry = TypeRegistry::new();
    let encoder = BsonEncoder::new(&registry);

    loop {
        let (request_id, op_code) = match read_request(&mut stream) {
            Ok(header) => header,
            Err(_) => return Ok(()),
        };
        info!(request_id, op_code, "toy server received request");
        // only queries and get-more expect an answer
        if op_code != 2004 && op_code != 2005 {
            continue;
        }

        let body = encoder.encode_document(&doc! { "greeting" => "hello", "answers" => request_id })?;
        let mut reply = Vec::with_capacity(36 + body.len());
        reply.write_i32::<LittleEndian>((36 + body.len()) as i32)?;
        reply.write_i32::<LittleEndian>(request_id + 10_000)?;
        reply.write_i32::<LittleEndian>(request_id)?;
        reply.write_i32::<LittleEndian>(1)?;
        reply.write_i32::<LittleEndian>(0)?;
        reply.write_i64::<LittleEndian>(0)?;
        reply.write_i32::<LittleEndian>(0)?;
        reply.write_i32::<LittleEndian>(1)?;
        reply.extend(body);
        stream.write_all(&reply)?;
    }
}

fn read_request(stream: &mut TcpStream) -> anyhow::Result<(i32, i32)> {
    let length = stream.read_i32::<LittleEndian>()?;
    let mut rest = vec![0u8; (length as usize).saturating_sub(4)];
    stream.read_exact(&mut rest)?;
    let request_id = (&rest[0..4]).read_i32::<LittleEndian>()?;
    let op_code = (&rest[8..12]).read_i32::<LittleEndian>()?;
    Ok((request_id, op_code))
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let listener = TcpListener::bind("127.0.0.1:0")?;
    let address = listener.local_addr()?.to_string();
    let server = thread::spawn(move || serve(listener));

    let config = ClientConfig::default()
        .with_address(address)
        .with_reply_timeout(Duration::from_secs(2));
    let mut connection = Connection::connect(config)?;

    let insert = InsertMessage::with_documents("demo.people", vec![doc! { "name" => "Jane Doe Smith" }]);
    let request_id = connection.send(&insert)?;
    println!("Sent insert as request {}", request_id);

    let reply = connection.request(&QueryMessage::new("demo.people", doc! {}).limit(1))?;
    for doc in reply.documents() {
        println!("Reply to {}: {}", reply.response_to(), doc.to_json());
    }

    connection.send(&KillCursorsMessage::new(vec![reply.cursor_id().max(1)]))?;
    drop(connection);

    server
        .join()
        .map_err(|_| anyhow::anyhow!("toy server panicked"))??;
    Ok(())
}
