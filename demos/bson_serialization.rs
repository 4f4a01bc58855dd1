use docwire::document::bson::{BsonDecoder, BsonEncoder};
use docwire::document::{Binary, Document, ObjectId, Value};
use docwire::registry::{Schema, Shape, TypeRegistry};
use docwire::{doc, init_tracing};
use std::io::Cursor;

// Run with: RUST_LOG=trace cargo run --example bson_serialization

#[derive(Debug, Default)]
struct Contact {
    id: Option<ObjectId>,
    name: String,
    email: Option<String>,
    tags: Vec<String>,
}

impl Shape for Contact {
    fn describe(schema: &mut Schema<Self>) {
        schema
            .constructor(Contact::default)
            .id("Id", |c| &c.id, |c, v| c.id = v)
            .field("Name", |c| &c.name, |c, v| c.name = v)
            .field("Email", |c| &c.email, |c, v| c.email = v)
            .field("Tags", |c| &c.tags, |c, v| c.tags = v);
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let registry = TypeRegistry::new();
    let encoder = BsonEncoder::new(&registry);
    let decoder = BsonDecoder::new(&registry);

    let doc = doc! {
        "null" => Value::Null,
        "bool" => true,
        "int32" => 42,
        "int64" => i64::MAX,
        "double" => 3.14159,
        "string" => "Hello, BSON!",
        "array" => vec![Value::from(1), Value::from("array_string"), Value::from(false)],
        "nested_doc" => doc! { "nested_field" => 99 },
        "blob" => Binary::new(vec![0xDE, 0xAD, 0xBE, 0xEF]),
    };
    println!("Original document:");
    println!("{}", doc.to_json());

    let bytes = encoder.encode_document(&doc)?;
    println!("\nSerialized size: {} bytes", bytes.len());

    let decoded = decoder.decode_document(&bytes)?;
    println!("Round trip equal: {}", decoded == doc);

    // two documents back to back, read one after the other
    let mut stream = bytes.clone();
    stream.extend(encoder.encode_document(&Document::new())?);
    let mut cursor = Cursor::new(stream.as_slice());
    while (cursor.position() as usize) < stream.len() {
        let next = decoder.decode_document_from(&mut cursor)?;
        println!("Read document with {} fields", next.len());
    }

    // typed shape with an unknown key on the way back
    let contact = Contact {
        id: Some(ObjectId::new()),
        name: "Grace".to_string(),
        email: None,
        tags: vec!["admiral".to_string()],
    };
    let extra = doc! { "Source" => "demo" };
    let bytes = encoder.encode(&contact, Some(&extra))?;
    let decoded = decoder.decode::<Contact>(&bytes)?;
    println!("\nDecoded contact: {:?}", decoded.value);
    println!("Unmapped entries: {}", decoded.unmapped.to_json());

    Ok(())
}
