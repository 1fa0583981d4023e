use crate::encoding::{read_lp_string, read_u16, write_lp_bytes, write_u16};
use crate::error::{MqttError, Result};
use crate::packet::{header_len, read_header, write_header, MqttPacket, PacketType};
use crate::types::QoS;

/// A single subscription request: a topic filter and the maximum QoS the
/// broker may use when forwarding matching messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: String,
    pub qos: QoS,
}

impl Subscription {
    #[must_use]
    pub fn new(topic: impl Into<String>, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            qos,
        }
    }
}

/// Client request to create one or more subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub subscriptions: Vec<Subscription>,
}

impl SubscribePacket {
    #[must_use]
    pub fn new(packet_id: u16, subscriptions: Vec<Subscription>) -> Self {
        Self {
            packet_id,
            subscriptions,
        }
    }

    fn body_len(&self) -> usize {
        2 + self
            .subscriptions
            .iter()
            .map(|s| 2 + s.topic.len() + 1)
            .sum::<usize>()
    }
}

impl MqttPacket for SubscribePacket {
    fn len(&self) -> usize {
        let body = self.body_len();
        header_len(body as u32) + body
    }

    fn encode(&self, dst: &mut [u8]) -> Result<usize> {
        if self.packet_id == 0 {
            return Err(MqttError::MalformedPacket(
                "SUBSCRIBE packet ID must not be zero".to_string(),
            ));
        }
        if self.subscriptions.is_empty() {
            return Err(MqttError::MalformedPacket(
                "SUBSCRIBE must contain at least one subscription".to_string(),
            ));
        }

        let needed = self.len();
        if dst.len() < needed {
            return Err(MqttError::BufferTooSmall {
                needed,
                available: dst.len(),
            });
        }

        let mut total = write_header(dst, PacketType::Subscribe, self.body_len() as u32)?;
        total += write_u16(&mut dst[total..], self.packet_id)?;
        for subscription in &self.subscriptions {
            total += write_lp_bytes(&mut dst[total..], subscription.topic.as_bytes())?;
            dst[total] = subscription.qos.as_u8();
            total += 1;
        }
        Ok(total)
    }

    fn decode(src: &[u8]) -> Result<(Self, usize)> {
        let (remaining, header_len) = read_header(src, PacketType::Subscribe)?;
        let end = header_len + remaining as usize;
        let mut total = header_len;

        let (packet_id, n) = read_u16(&src[total..end])?;
        if packet_id == 0 {
            return Err(MqttError::MalformedPacket(
                "SUBSCRIBE packet ID must not be zero".to_string(),
            ));
        }
        total += n;

        let mut subscriptions = Vec::new();
        while total < end {
            let (topic, n) = read_lp_string(&src[total..end])?;
            total += n;
            if total >= end {
                return Err(MqttError::MalformedPacket(
                    "SUBSCRIBE subscription missing its QoS byte".to_string(),
                ));
            }
            let qos = QoS::try_from(src[total])?;
            total += 1;
            subscriptions.push(Subscription { topic, qos });
        }

        if subscriptions.is_empty() {
            return Err(MqttError::MalformedPacket(
                "SUBSCRIBE must contain at least one subscription".to_string(),
            ));
        }

        Ok((
            Self {
                packet_id,
                subscriptions,
            },
            total,
        ))
    }
}
