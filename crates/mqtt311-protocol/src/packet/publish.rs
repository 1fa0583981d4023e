use crate::encoding::{read_lp_string, read_u16, write_lp_bytes, write_u16};
use crate::error::{MqttError, Result};
use crate::packet::{header_len, read_header_raw, write_header_with_flags, MqttPacket, PacketType};
use crate::types::{Message, QoS};

/// Application message transfer, in either direction.
///
/// The packet identifier is present exactly when the message QoS is greater
/// than zero; the dup flag marks a retransmission of a previously sent
/// packet identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    pub message: Message,
    pub packet_id: Option<u16>,
    pub dup: bool,
}

impl PublishPacket {
    #[must_use]
    pub fn new(message: Message, packet_id: Option<u16>) -> Self {
        Self {
            message,
            packet_id,
            dup: false,
        }
    }

    fn body_len(&self) -> usize {
        let mut total = 2 + self.message.topic.len() + self.message.payload.len();
        if self.message.qos != QoS::AtMostOnce {
            total += 2;
        }
        total
    }

    fn flags(&self) -> u8 {
        let mut flags = self.message.qos.as_u8() << 1;
        if self.dup {
            flags |= 0x08;
        }
        if self.message.retain {
            flags |= 0x01;
        }
        flags
    }
}

impl MqttPacket for PublishPacket {
    fn len(&self) -> usize {
        let body = self.body_len();
        header_len(body as u32) + body
    }

    fn encode(&self, dst: &mut [u8]) -> Result<usize> {
        if self.message.topic.is_empty() {
            return Err(MqttError::MalformedPacket(
                "PUBLISH topic must not be empty".to_string(),
            ));
        }
        if self.message.qos == QoS::AtMostOnce {
            if self.dup {
                return Err(MqttError::MalformedPacket(
                    "PUBLISH dup flag must be clear at QoS 0".to_string(),
                ));
            }
            if self.packet_id.is_some() {
                return Err(MqttError::MalformedPacket(
                    "PUBLISH at QoS 0 must not carry a packet ID".to_string(),
                ));
            }
        } else {
            match self.packet_id {
                Some(id) if id != 0 => {}
                Some(_) => {
                    return Err(MqttError::MalformedPacket(
                        "PUBLISH packet ID must not be zero".to_string(),
                    ))
                }
                None => {
                    return Err(MqttError::MalformedPacket(
                        "PUBLISH above QoS 0 requires a packet ID".to_string(),
                    ))
                }
            }
        }

        let needed = self.len();
        if dst.len() < needed {
            return Err(MqttError::BufferTooSmall {
                needed,
                available: dst.len(),
            });
        }

        let mut total = write_header_with_flags(
            dst,
            PacketType::Publish,
            self.flags(),
            self.body_len() as u32,
        )?;
        total += write_lp_bytes(&mut dst[total..], self.message.topic.as_bytes())?;
        if let Some(id) = self.packet_id {
            total += write_u16(&mut dst[total..], id)?;
        }
        dst[total..total + self.message.payload.len()].copy_from_slice(&self.message.payload);
        Ok(total + self.message.payload.len())
    }

    fn decode(src: &[u8]) -> Result<(Self, usize)> {
        let (flags, remaining, header_len) = read_header_raw(src, PacketType::Publish)?;
        let end = header_len + remaining as usize;

        let retain = flags & 0x01 != 0;
        let qos = QoS::try_from((flags >> 1) & 0x03)?;
        let dup = flags & 0x08 != 0;
        if dup && qos == QoS::AtMostOnce {
            return Err(MqttError::MalformedPacket(
                "PUBLISH dup flag must be clear at QoS 0".to_string(),
            ));
        }

        let mut total = header_len;
        let (topic, n) = read_lp_string(&src[total..end])?;
        if topic.is_empty() {
            return Err(MqttError::MalformedPacket(
                "PUBLISH topic must not be empty".to_string(),
            ));
        }
        total += n;

        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            let (id, n) = read_u16(&src[total..end])?;
            if id == 0 {
                return Err(MqttError::MalformedPacket(
                    "PUBLISH packet ID must not be zero".to_string(),
                ));
            }
            total += n;
            Some(id)
        };

        let payload = src[total..end].to_vec();

        Ok((
            Self {
                message: Message {
                    topic,
                    payload: payload.into(),
                    qos,
                    retain,
                },
                packet_id,
                dup,
            },
            end,
        ))
    }
}
