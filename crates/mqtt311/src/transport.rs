//! Transport abstraction: an ordered byte stream with half-close support.
//!
//! The engine only needs a reader half, a writer half and a close; TCP is
//! bundled, and any other duplex stream (TLS, in-memory pipes in tests)
//! plugs in through [`Transport::new`].

use mqtt311_protocol::Result;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;

/// A bidirectional byte stream usable as an MQTT transport.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Connection for T {}

pub(crate) type TransportReader = ReadHalf<Box<dyn Connection>>;
pub(crate) type TransportWriter = WriteHalf<Box<dyn Connection>>;

/// An established connection handed to the client engine.
pub struct Transport {
    stream: Box<dyn Connection>,
}

impl Transport {
    /// Wraps an already-established duplex stream.
    pub fn new(stream: impl Connection + 'static) -> Self {
        Self {
            stream: Box::new(stream),
        }
    }

    /// Dials a broker over TCP. An `mqtt://` or `tcp://` scheme prefix is
    /// tolerated; everything after it must be a `host:port` pair.
    pub async fn tcp(addr: &str) -> Result<Self> {
        let addr = addr
            .strip_prefix("mqtt://")
            .or_else(|| addr.strip_prefix("tcp://"))
            .unwrap_or(addr);

        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }

    pub(crate) fn split(self) -> (TransportReader, TransportWriter) {
        tokio::io::split(self.stream)
    }
}
