use tracing::info;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub mod config;
pub mod document;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod result;

pub use config::ClientConfig;
pub use document::bson::{BsonDecoder, BsonEncoder, BsonError, ElementType};
pub use document::{Document, ObjectId, ObjectIdGenerator, Value};
pub use error::DriverError;
pub use registry::{Decoded, Schema, Shape, TypeRegistry};
pub use result::DriverResult;

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    info!("Tracing initialized");
}
