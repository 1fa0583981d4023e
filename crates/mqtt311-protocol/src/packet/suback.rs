use crate::encoding::{read_u16, write_u16};
use crate::error::{MqttError, Result};
use crate::packet::{header_len, read_header, write_header, MqttPacket, PacketType};

/// Return code granting a subscription at QoS 0, 1 or 2, or rejecting it.
pub const SUBACK_FAILURE: u8 = 0x80;

fn is_valid_return_code(code: u8) -> bool {
    code <= 2 || code == SUBACK_FAILURE
}

/// Broker response to SUBSCRIBE: one return code per requested
/// subscription, in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAckPacket {
    pub packet_id: u16,
    pub return_codes: Vec<u8>,
}

impl SubAckPacket {
    #[must_use]
    pub fn new(packet_id: u16, return_codes: Vec<u8>) -> Self {
        Self {
            packet_id,
            return_codes,
        }
    }

    fn body_len(&self) -> usize {
        2 + self.return_codes.len()
    }
}

impl MqttPacket for SubAckPacket {
    fn len(&self) -> usize {
        let body = self.body_len();
        header_len(body as u32) + body
    }

    fn encode(&self, dst: &mut [u8]) -> Result<usize> {
        if self.packet_id == 0 {
            return Err(MqttError::MalformedPacket(
                "SUBACK packet ID must not be zero".to_string(),
            ));
        }
        if self.return_codes.is_empty() {
            return Err(MqttError::MalformedPacket(
                "SUBACK must contain at least one return code".to_string(),
            ));
        }
        if let Some(&code) = self.return_codes.iter().find(|&&c| !is_valid_return_code(c)) {
            return Err(MqttError::MalformedPacket(format!(
                "Invalid SUBACK return code: 0x{code:02X}"
            )));
        }

        let needed = self.len();
        if dst.len() < needed {
            return Err(MqttError::BufferTooSmall {
                needed,
                available: dst.len(),
            });
        }

        let mut total = write_header(dst, PacketType::SubAck, self.body_len() as u32)?;
        total += write_u16(&mut dst[total..], self.packet_id)?;
        dst[total..total + self.return_codes.len()].copy_from_slice(&self.return_codes);
        Ok(total + self.return_codes.len())
    }

    fn decode(src: &[u8]) -> Result<(Self, usize)> {
        let (remaining, header_len) = read_header(src, PacketType::SubAck)?;
        let end = header_len + remaining as usize;
        let mut total = header_len;

        let (packet_id, n) = read_u16(&src[total..end])?;
        if packet_id == 0 {
            return Err(MqttError::MalformedPacket(
                "SUBACK packet ID must not be zero".to_string(),
            ));
        }
        total += n;

        let return_codes = src[total..end].to_vec();
        if return_codes.is_empty() {
            return Err(MqttError::MalformedPacket(
                "SUBACK must contain at least one return code".to_string(),
            ));
        }
        if let Some(&code) = return_codes.iter().find(|&&c| !is_valid_return_code(c)) {
            return Err(MqttError::MalformedPacket(format!(
                "Invalid SUBACK return code: 0x{code:02X}"
            )));
        }

        Ok((
            Self {
                packet_id,
                return_codes,
            },
            end,
        ))
    }
}
