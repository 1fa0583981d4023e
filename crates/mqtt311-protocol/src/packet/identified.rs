//! Acknowledgement packets whose body is a single packet identifier:
//! PUBACK, PUBREC, PUBREL, PUBCOMP and UNSUBACK.

use crate::encoding::{read_u16, write_u16};
use crate::error::{MqttError, Result};
use crate::packet::{read_header, write_header, MqttPacket, PacketType};

pub(crate) fn identified_len() -> usize {
    4
}

pub(crate) fn identified_encode(
    dst: &mut [u8],
    packet_id: u16,
    packet_type: PacketType,
) -> Result<usize> {
    if packet_id == 0 {
        return Err(MqttError::MalformedPacket(format!(
            "{packet_type:?} packet ID must not be zero"
        )));
    }
    if dst.len() < identified_len() {
        return Err(MqttError::BufferTooSmall {
            needed: identified_len(),
            available: dst.len(),
        });
    }

    let mut total = write_header(dst, packet_type, 2)?;
    total += write_u16(&mut dst[total..], packet_id)?;
    Ok(total)
}

pub(crate) fn identified_decode(src: &[u8], packet_type: PacketType) -> Result<(u16, usize)> {
    let (remaining, header_len) = read_header(src, packet_type)?;
    if remaining != 2 {
        return Err(MqttError::MalformedPacket(format!(
            "{packet_type:?} must have a remaining length of 2, got {remaining}"
        )));
    }

    let (packet_id, n) = read_u16(&src[header_len..])?;
    if packet_id == 0 {
        return Err(MqttError::MalformedPacket(format!(
            "{packet_type:?} packet ID must not be zero"
        )));
    }

    Ok((packet_id, header_len + n))
}

macro_rules! define_identified_packet {
    ($(#[$doc:meta])* $name:ident, $packet_type:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub packet_id: u16,
        }

        impl $name {
            #[must_use]
            pub fn new(packet_id: u16) -> Self {
                Self { packet_id }
            }
        }

        impl MqttPacket for $name {
            fn len(&self) -> usize {
                identified_len()
            }

            fn encode(&self, dst: &mut [u8]) -> Result<usize> {
                identified_encode(dst, self.packet_id, $packet_type)
            }

            fn decode(src: &[u8]) -> Result<(Self, usize)> {
                let (packet_id, n) = identified_decode(src, $packet_type)?;
                Ok((Self { packet_id }, n))
            }
        }
    };
}

define_identified_packet! {
    /// QoS 1 publish acknowledgement.
    PubAckPacket, PacketType::PubAck
}

define_identified_packet! {
    /// First acknowledgement of the QoS 2 handshake.
    PubRecPacket, PacketType::PubRec
}

define_identified_packet! {
    /// Release of a QoS 2 publish. Carries fixed-header flags 0x02.
    PubRelPacket, PacketType::PubRel
}

define_identified_packet! {
    /// Final acknowledgement of the QoS 2 handshake.
    PubCompPacket, PacketType::PubComp
}

define_identified_packet! {
    /// Unsubscribe acknowledgement.
    UnsubAckPacket, PacketType::UnsubAck
}
