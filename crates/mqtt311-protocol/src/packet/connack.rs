use crate::error::{MqttError, Result};
use crate::packet::{read_header, write_header, MqttPacket, PacketType};

/// CONNACK return code.
///
/// Decoding preserves whatever byte the broker sent so callers can
/// distinguish acceptance from any refusal; encoding rejects codes outside
/// the range defined by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectReturnCode(pub u8);

impl ConnectReturnCode {
    pub const ACCEPTED: Self = Self(0);
    pub const UNACCEPTABLE_PROTOCOL_VERSION: Self = Self(1);
    pub const IDENTIFIER_REJECTED: Self = Self(2);
    pub const SERVER_UNAVAILABLE: Self = Self(3);
    pub const BAD_USERNAME_OR_PASSWORD: Self = Self(4);
    pub const NOT_AUTHORIZED: Self = Self(5);

    #[must_use]
    pub fn is_accepted(self) -> bool {
        self == Self::ACCEPTED
    }

    #[must_use]
    pub fn is_valid(self) -> bool {
        self.0 <= 5
    }
}

/// Broker response to CONNECT: session-present flag plus a return code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnAckPacket {
    pub session_present: bool,
    pub return_code: ConnectReturnCode,
}

impl ConnAckPacket {
    #[must_use]
    pub fn new(session_present: bool, return_code: ConnectReturnCode) -> Self {
        Self {
            session_present,
            return_code,
        }
    }
}

impl MqttPacket for ConnAckPacket {
    fn len(&self) -> usize {
        4
    }

    fn encode(&self, dst: &mut [u8]) -> Result<usize> {
        if !self.return_code.is_valid() {
            return Err(MqttError::InvalidReturnCode(self.return_code.0));
        }
        if dst.len() < self.len() {
            return Err(MqttError::BufferTooSmall {
                needed: self.len(),
                available: dst.len(),
            });
        }

        let total = write_header(dst, PacketType::ConnAck, 2)?;
        dst[total] = u8::from(self.session_present);
        dst[total + 1] = self.return_code.0;
        Ok(total + 2)
    }

    fn decode(src: &[u8]) -> Result<(Self, usize)> {
        let (remaining, header_len) = read_header(src, PacketType::ConnAck)?;
        if remaining != 2 {
            return Err(MqttError::MalformedPacket(format!(
                "CONNACK must have a remaining length of 2, got {remaining}"
            )));
        }

        let ack_flags = src[header_len];
        if ack_flags & 0xFE != 0 {
            return Err(MqttError::MalformedPacket(format!(
                "Invalid CONNACK acknowledge flags: 0x{ack_flags:02X}"
            )));
        }

        Ok((
            Self {
                session_present: ack_flags & 0x01 != 0,
                return_code: ConnectReturnCode(src[header_len + 1]),
            },
            header_len + 2,
        ))
    }
}
