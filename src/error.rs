use crate::document::bson::BsonError;
use std::fmt;
use std::io;
use std::time::Duration;

#[derive(Debug)]
pub enum DriverError {
    Bson(BsonError),
    Protocol(String),
    Timeout(Duration),
    InvalidMessage(String),
    Config(String),
    Io(io::Error),
    Json(serde_json::Error),
}

impl DriverError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Timeout(_))
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Bson(err) => write!(f, "BSON error: {}", err),
            DriverError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            DriverError::Timeout(after) => {
                write!(f, "Timed out after {} ms waiting for reply", after.as_millis())
            }
            DriverError::InvalidMessage(msg) => write!(f, "Invalid message: {}", msg),
            DriverError::Config(msg) => write!(f, "Configuration error: {}", msg),
            DriverError::Io(err) => write!(f, "IO error: {}", err),
            DriverError::Json(err) => write!(f, "JSON error: {}", err),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DriverError::Bson(err) => Some(err),
            DriverError::Io(err) => Some(err),
            DriverError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for DriverError {
    fn from(err: io::Error) -> DriverError {
        DriverError::Io(err)
    }
}

impl From<BsonError> for DriverError {
    fn from(err: BsonError) -> DriverError {
        DriverError::Bson(err)
    }
}

impl From<serde_json::Error> for DriverError {
    fn from(err: serde_json::Error) -> DriverError {
        DriverError::Json(err)
    }
}
