use crate::packet::connack::ConnectReturnCode;
use crate::packet::PacketType;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MqttError>;

/// Errors shared by the codec, the stream layer and the client engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MqttError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Buffer too small: need {needed} bytes, got {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Insufficient bytes to decode packet")]
    InsufficientData,

    #[error("Remaining length exceeds four bytes")]
    DetectionOverflow,

    #[error("Unexpected EOF while reading packet")]
    UnexpectedEof,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid CONNACK return code: {0}")]
    InvalidReturnCode(u8),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Client already connecting")]
    AlreadyConnecting,

    #[error("Client not connected")]
    NotConnected,

    #[error("Connection denied: {0:?}")]
    ConnectionDenied(ConnectReturnCode),

    #[error("Expected CONNACK as first packet")]
    ExpectedConnack,

    #[error("Unexpected packet: {0:?}")]
    UnexpectedPacket(PacketType),

    #[error("Missing PINGRESP from broker")]
    MissingPong,

    #[error("Transport closed unexpectedly")]
    UnexpectedClose,

    #[error("Future timed out")]
    FutureTimeout,

    #[error("Future canceled")]
    FutureCanceled,

    #[error("All packet IDs are in flight")]
    PacketIdExhausted,
}

impl From<std::io::Error> for MqttError {
    fn from(err: std::io::Error) -> Self {
        MqttError::Io(err.to_string())
    }
}
