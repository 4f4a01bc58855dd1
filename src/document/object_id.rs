use crate::document::bson::BsonError;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

pub const OBJECT_ID_LEN: usize = 12;

const COUNTER_MASK: u32 = 0x00FF_FFFF;

static SHARED_GENERATOR: OnceLock<ObjectIdGenerator> = OnceLock::new();

/// 12-byte document identifier.
///
/// Layout: 4 bytes big-endian seconds since the epoch, 3 bytes machine
/// fingerprint, 2 bytes process id, 3 bytes big-endian counter. Equality and
/// ordering are defined over the raw bytes, so ids sort by creation second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId {
    bytes: [u8; OBJECT_ID_LEN],
}

impl ObjectId {
    /// Generate a fresh id from the process-wide generator.
    pub fn new() -> Self {
        ObjectIdGenerator::shared().generate()
    }

    pub fn from_bytes(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        ObjectId { bytes }
    }

    pub fn to_bytes(&self) -> [u8; OBJECT_ID_LEN] {
        self.bytes
    }

    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn parse_str(input: &str) -> Result<Self, BsonError> {
        let decoded =
            hex::decode(input).map_err(|err| BsonError::InvalidObjectIdHex(err.to_string()))?;
        ObjectId::try_from(decoded.as_slice())
    }

    /// Creation time, second precision.
    pub fn timestamp(&self) -> DateTime<Utc> {
        let secs = u32::from_be_bytes([self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3]]);
        DateTime::from_timestamp(i64::from(secs), 0).unwrap_or_default()
    }

    pub fn counter(&self) -> u32 {
        u32::from_be_bytes([0, self.bytes[9], self.bytes[10], self.bytes[11]])
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = BsonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectId::parse_str(s)
    }
}

impl TryFrom<&[u8]> for ObjectId {
    type Error = BsonError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; OBJECT_ID_LEN] = value
            .try_into()
            .map_err(|_| BsonError::InvalidObjectIdLength(value.len()))?;
        Ok(ObjectId { bytes })
    }
}

/// Produces ObjectIds for one process.
///
/// The machine and process bytes are computed once at construction. The
/// counter starts at a random value so two generators in the same process do
/// not hand out the same sequence.
#[derive(Debug)]
pub struct ObjectIdGenerator {
    machine: [u8; 3],
    process: [u8; 2],
    counter: AtomicU32,
}

impl ObjectIdGenerator {
    pub fn new() -> Self {
        Self::with_fingerprint(machine_fingerprint(), process_fingerprint())
    }

    pub fn with_fingerprint(machine: [u8; 3], process: [u8; 2]) -> Self {
        Self {
            machine,
            process,
            counter: AtomicU32::new(rand::random::<u32>() & COUNTER_MASK),
        }
    }

    /// The generator behind `ObjectId::new`.
    pub fn shared() -> &'static ObjectIdGenerator {
        SHARED_GENERATOR.get_or_init(ObjectIdGenerator::new)
    }

    pub fn generate(&self) -> ObjectId {
        self.generate_at(Utc::now())
    }

    pub fn generate_at(&self, time: DateTime<Utc>) -> ObjectId {
        // fetch_add wraps at u32::MAX, masking keeps the wrap at 2^24
        let count = self.counter.fetch_add(1, Ordering::Relaxed) & COUNTER_MASK;
        let secs = time.timestamp() as u32;

        let mut bytes = [0u8; OBJECT_ID_LEN];
        bytes[0..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..7].copy_from_slice(&self.machine);
        bytes[7..9].copy_from_slice(&self.process);
        bytes[9..12].copy_from_slice(&count.to_be_bytes()[1..4]);
        ObjectId { bytes }
    }

    pub fn machine(&self) -> [u8; 3] {
        self.machine
    }

    pub fn process(&self) -> [u8; 2] {
        self.process
    }
}

impl Default for ObjectIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn machine_fingerprint() -> [u8; 3] {
    match hostname::get() {
        Ok(name) if !name.is_empty() => {
            let digest = md5::compute(name.to_string_lossy().as_bytes());
            [digest[0], digest[1], digest[2]]
        }
        Ok(_) => {
            debug!("empty host name, using random machine fingerprint");
            rand::random()
        }
        Err(err) => {
            debug!(error = %err, "host name unavailable, using random machine fingerprint");
            rand::random()
        }
    }
}

fn process_fingerprint() -> [u8; 2] {
    let pid = std::process::id();
    if pid == 0 {
        return rand::random();
    }
    let low = (pid & 0xFFFF) as u16;
    low.to_be_bytes()
}
