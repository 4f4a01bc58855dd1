use crate::document::bson::{BsonDecoder, BsonEncoder, MAX_DOCUMENT_SIZE, MIN_DOCUMENT_SIZE};
use crate::document::validator::{DEFAULT_MAX_DEPTH, DocumentValidator};
use crate::error::DriverError;
use crate::protocol::{MAX_MESSAGE_SIZE, MessageHeader};
use crate::registry::TypeRegistry;
use crate::result::DriverResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Connection and codec settings. Missing JSON keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub address: String,
    pub connect_timeout_ms: u64,
    pub reply_timeout_ms: u64,
    pub max_document_size: usize,
    pub max_message_size: usize,
    pub max_nesting_depth: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            address: "127.0.0.1:27017".to_string(),
            connect_timeout_ms: 10_000,
            reply_timeout_ms: 30_000,
            max_document_size: MAX_DOCUMENT_SIZE,
            max_message_size: MAX_MESSAGE_SIZE,
            max_nesting_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ClientConfig {
    pub fn from_json(input: &str) -> DriverResult<Self> {
        let config: ClientConfig = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> DriverResult<Self> {
        let input = std::fs::read_to_string(path)?;
        Self::from_json(&input)
    }

    pub fn validate(&self) -> DriverResult<()> {
        if self.address.trim().is_empty() {
            return Err(DriverError::Config("address is empty".to_string()));
        }
        if self.connect_timeout_ms == 0 || self.reply_timeout_ms == 0 {
            return Err(DriverError::Config("timeouts must be positive".to_string()));
        }
        if self.max_document_size < MIN_DOCUMENT_SIZE {
            return Err(DriverError::Config(format!(
                "max_document_size {} is below the {} byte minimum",
                self.max_document_size, MIN_DOCUMENT_SIZE
            )));
        }
        if self.max_message_size < MessageHeader::LENGTH + self.max_document_size {
            return Err(DriverError::Config(format!(
                "max_message_size {} cannot hold a {} byte document",
                self.max_message_size, self.max_document_size
            )));
        }
        Ok(())
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_document_size(mut self, size: usize) -> Self {
        self.max_document_size = size;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn validator(&self) -> DocumentValidator {
        DocumentValidator::with_max_depth(self.max_nesting_depth)
    }

    pub fn encoder<'r>(&self, registry: &'r TypeRegistry) -> BsonEncoder<'r> {
        BsonEncoder::new(registry)
            .with_max_document_size(self.max_document_size)
            .with_validator(self.validator())
    }

    pub fn decoder<'r>(&self, registry: &'r TypeRegistry) -> BsonDecoder<'r> {
        BsonDecoder::new(registry).with_validator(self.validator())
    }
}
