use crate::config::ClientConfig;
use crate::document::bson::{BsonDecoder, BsonEncoder};
use crate::error::DriverError;
use crate::protocol::message::{GetMoreMessage, KillCursorsMessage, WireMessage};
use crate::protocol::next_request_id;
use crate::protocol::reply::{ReplyMessage, reply_length};
use crate::registry::TypeRegistry;
use crate::result::DriverResult;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Duplex byte stream to a server.
pub trait Transport {
    fn write_all(&mut self, data: &[u8]) -> DriverResult<()>;

    /// Fill `buf` completely or fail with `DriverError::Timeout` once
    /// `deadline` passes.
    fn read_exact_until(&mut self, buf: &mut [u8], deadline: Instant) -> DriverResult<()>;
}

#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn connect(address: &str, timeout: Duration) -> DriverResult<Self> {
        let mut last_error = None;
        for addr in address.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    info!(%addr, "connected");
                    return Ok(TcpTransport { stream });
                }
                Err(err) => {
                    warn!(%addr, error = %err, "connect failed");
                    last_error = Some(err);
                }
            }
        }
        Err(match last_error {
            Some(err) if err.kind() == io::ErrorKind::TimedOut => DriverError::Timeout(timeout),
            Some(err) => DriverError::Io(err),
            None => DriverError::Config(format!("address {} did not resolve", address)),
        })
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        TcpTransport { stream }
    }
}

impl Transport for TcpTransport {
    fn write_all(&mut self, data: &[u8]) -> DriverResult<()> {
        self.stream.write_all(data)?;
        self.stream.flush()?;
        Ok(())
    }

    fn read_exact_until(&mut self, buf: &mut [u8], deadline: Instant) -> DriverResult<()> {
        let started = Instant::now();
        let mut filled = 0;
        while filled < buf.len() {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .filter(|left| !left.is_zero())
                .ok_or_else(|| DriverError::Timeout(started.elapsed()))?;
            // blocks for at most the time left
            self.stream.set_read_timeout(Some(remaining))?;
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(DriverError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed by peer",
                    )));
                }
                Ok(n) => filled += n,
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                    ) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

/// Blocking request/reply channel to one server.
pub struct Connection<T: Transport = TcpTransport> {
    transport: T,
    registry: Arc<TypeRegistry>,
    config: ClientConfig,
}

impl Connection<TcpTransport> {
    pub fn connect(config: ClientConfig) -> DriverResult<Self> {
        config.validate()?;
        let transport = TcpTransport::connect(&config.address, config.connect_timeout())?;
        Ok(Connection::new(transport, Arc::new(TypeRegistry::new()), config))
    }
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T, registry: Arc<TypeRegistry>, config: ClientConfig) -> Self {
        Connection {
            transport,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn encoder(&self) -> BsonEncoder<'_> {
        self.config.encoder(&self.registry)
    }

    pub fn decoder(&self) -> BsonDecoder<'_> {
        self.config.decoder(&self.registry)
    }

    /// Frame and write `message`, returning its request id. Nothing is read.
    pub fn send<M: WireMessage>(&mut self, message: &M) -> DriverResult<i32> {
        let request_id = next_request_id();
        let bytes = message.to_bytes_with_limit(
            request_id,
            &self.encoder(),
            self.config.max_message_size,
        )?;
        debug!(request_id, op_code = ?message.op_code(), bytes = bytes.len(), "sending message");
        self.transport.write_all(&bytes)?;
        Ok(request_id)
    }

    /// Send `message` and wait for the reply that answers it.
    ///
    /// A reply flagged with `CURSOR_NOT_FOUND` or `QUERY_FAILURE` becomes a
    /// `DriverError::Protocol`. Use [`Connection::send`] and
    /// [`Connection::read_reply`] to inspect such a reply yourself.
    pub fn request<M: WireMessage>(&mut self, message: &M) -> DriverResult<ReplyMessage> {
        let request_id = self.send(message)?;
        let reply = self.read_reply()?;
        if reply.response_to() != request_id {
            return Err(DriverError::Protocol(format!(
                "reply answers request {}, expected {}",
                reply.response_to(),
                request_id
            )));
        }
        reply.ensure_ok()
    }

    pub fn read_reply(&mut self) -> DriverResult<ReplyMessage> {
        let deadline = Instant::now() + self.config.reply_timeout();
        let mut prefix = [0u8; 4];
        self.transport.read_exact_until(&mut prefix, deadline)?;

        let mut buffer = vec![0u8; reply_length(prefix, self.config.max_message_size)?];
        buffer[..4].copy_from_slice(&prefix);
        self.transport.read_exact_until(&mut buffer[4..], deadline)?;
        ReplyMessage::from_bytes(&buffer, &self.decoder())
    }

    /// Fetch the next batch of `cursor_id`. Fails when the server no longer
    /// knows the cursor.
    pub fn get_more(&mut self, collection: &str, number_to_return: i32, cursor_id: i64) -> DriverResult<ReplyMessage> {
        self.request(&GetMoreMessage::new(collection, number_to_return, cursor_id))
    }

    /// The server does not reply to kill cursors.
    pub fn kill_cursors(&mut self, cursor_ids: &[i64]) -> DriverResult<()> {
        self.send(&KillCursorsMessage::new(cursor_ids.to_vec()))?;
        Ok(())
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}
