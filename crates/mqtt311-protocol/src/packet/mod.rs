//! MQTT 3.1.1 control packets.
//!
//! Every packet type implements [`MqttPacket`]: an exact [`len`], an
//! [`encode`] into a caller-provided slice and a [`decode`] that consumes a
//! whole packet including its fixed header. The [`Packet`] enum dispatches
//! the same operations over all fourteen types.
//!
//! [`len`]: MqttPacket::len
//! [`encode`]: MqttPacket::encode
//! [`decode`]: MqttPacket::decode

pub mod connack;
pub mod connect;
pub mod identified;
pub mod publish;
pub mod suback;
pub mod subscribe;
pub mod unsubscribe;

pub use connack::{ConnAckPacket, ConnectReturnCode};
pub use connect::ConnectPacket;
pub use identified::{PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket, UnsubAckPacket};
pub use publish::PublishPacket;
pub use suback::{SubAckPacket, SUBACK_FAILURE};
pub use subscribe::{SubscribePacket, Subscription};
pub use unsubscribe::UnsubscribePacket;

use crate::encoding::{read_remaining_length, remaining_length_len, write_remaining_length};
use crate::error::{MqttError, Result};

/// MQTT control packet type, the high nibble of the fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl PacketType {
    /// Fixed-header flags mandated for this type. PUBLISH flags are dynamic
    /// and handled by its own codec.
    #[must_use]
    pub fn default_flags(self) -> u8 {
        match self {
            PacketType::PubRel | PacketType::Subscribe | PacketType::Unsubscribe => 0x02,
            _ => 0x00,
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = MqttError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::ConnAck),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::PubAck),
            5 => Ok(PacketType::PubRec),
            6 => Ok(PacketType::PubRel),
            7 => Ok(PacketType::PubComp),
            8 => Ok(PacketType::Subscribe),
            9 => Ok(PacketType::SubAck),
            10 => Ok(PacketType::Unsubscribe),
            11 => Ok(PacketType::UnsubAck),
            12 => Ok(PacketType::PingReq),
            13 => Ok(PacketType::PingResp),
            14 => Ok(PacketType::Disconnect),
            _ => Err(MqttError::MalformedPacket(format!(
                "Invalid packet type: {value}"
            ))),
        }
    }
}

/// Codec surface shared by every control packet type.
pub trait MqttPacket: Sized {
    /// Exact number of bytes [`encode`](MqttPacket::encode) will write.
    fn len(&self) -> usize;

    /// Encodes the full packet into `dst`, returning the bytes written.
    ///
    /// Fails with [`MqttError::BufferTooSmall`] when `dst` is shorter than
    /// [`len`](MqttPacket::len).
    fn encode(&self, dst: &mut [u8]) -> Result<usize>;

    /// Decodes a full packet from `src`, returning it and the bytes consumed.
    fn decode(src: &[u8]) -> Result<(Self, usize)>;
}

/// Peeks a fixed header to determine the full packet length without
/// consuming input.
///
/// Returns `None` when more bytes are needed,
/// [`MqttError::DetectionOverflow`] when the remaining-length field extends
/// past four bytes, and a malformed-packet error for an invalid type nibble.
pub fn detect(src: &[u8]) -> Result<Option<(PacketType, usize)>> {
    let Some(&first) = src.first() else {
        return Ok(None);
    };
    let packet_type = PacketType::try_from(first >> 4)?;

    match read_remaining_length(&src[1..]) {
        Ok((remaining, n)) => Ok(Some((packet_type, 1 + n + remaining as usize))),
        Err(MqttError::InsufficientData) => Ok(None),
        Err(err) => Err(err),
    }
}

pub(crate) fn header_len(remaining: u32) -> usize {
    1 + remaining_length_len(remaining)
}

pub(crate) fn write_header(dst: &mut [u8], packet_type: PacketType, remaining: u32) -> Result<usize> {
    write_header_with_flags(dst, packet_type, packet_type.default_flags(), remaining)
}

pub(crate) fn write_header_with_flags(
    dst: &mut [u8],
    packet_type: PacketType,
    flags: u8,
    remaining: u32,
) -> Result<usize> {
    let needed = header_len(remaining);
    if dst.len() < needed {
        return Err(MqttError::BufferTooSmall {
            needed,
            available: dst.len(),
        });
    }

    dst[0] = (packet_type as u8) << 4 | (flags & 0x0F);
    let n = write_remaining_length(&mut dst[1..], remaining)?;
    Ok(1 + n)
}

/// Reads a fixed header without validating flags; returns
/// `(flags, remaining length, header bytes consumed)`.
pub(crate) fn read_header_raw(
    src: &[u8],
    expected: PacketType,
) -> Result<(u8, u32, usize)> {
    let Some(&first) = src.first() else {
        return Err(MqttError::InsufficientData);
    };

    let packet_type = PacketType::try_from(first >> 4)?;
    if packet_type != expected {
        return Err(MqttError::MalformedPacket(format!(
            "Expected {expected:?} packet, got {packet_type:?}"
        )));
    }

    let (remaining, n) = read_remaining_length(&src[1..])?;
    if src.len() < 1 + n + remaining as usize {
        return Err(MqttError::InsufficientData);
    }

    Ok((first & 0x0F, remaining, 1 + n))
}

/// Reads a fixed header and enforces the type's mandated flag bits.
pub(crate) fn read_header(src: &[u8], expected: PacketType) -> Result<(u32, usize)> {
    let (flags, remaining, n) = read_header_raw(src, expected)?;
    if flags != expected.default_flags() {
        return Err(MqttError::MalformedPacket(format!(
            "Invalid {expected:?} flags: expected 0x{:02X}, got 0x{flags:02X}",
            expected.default_flags()
        )));
    }
    Ok((remaining, n))
}

pub(crate) fn naked_len() -> usize {
    2
}

pub(crate) fn naked_encode(dst: &mut [u8], packet_type: PacketType) -> Result<usize> {
    write_header(dst, packet_type, 0)
}

pub(crate) fn naked_decode(src: &[u8], packet_type: PacketType) -> Result<usize> {
    let (remaining, n) = read_header(src, packet_type)?;
    if remaining != 0 {
        return Err(MqttError::MalformedPacket(format!(
            "{packet_type:?} must have a zero remaining length, got {remaining}"
        )));
    }
    Ok(n)
}

/// Any MQTT 3.1.1 control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(ConnectPacket),
    ConnAck(ConnAckPacket),
    Publish(PublishPacket),
    PubAck(PubAckPacket),
    PubRec(PubRecPacket),
    PubRel(PubRelPacket),
    PubComp(PubCompPacket),
    Subscribe(SubscribePacket),
    SubAck(SubAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubAck(UnsubAckPacket),
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::ConnAck(_) => PacketType::ConnAck,
            Packet::Publish(_) => PacketType::Publish,
            Packet::PubAck(_) => PacketType::PubAck,
            Packet::PubRec(_) => PacketType::PubRec,
            Packet::PubRel(_) => PacketType::PubRel,
            Packet::PubComp(_) => PacketType::PubComp,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::SubAck(_) => PacketType::SubAck,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::UnsubAck(_) => PacketType::UnsubAck,
            Packet::PingReq => PacketType::PingReq,
            Packet::PingResp => PacketType::PingResp,
            Packet::Disconnect => PacketType::Disconnect,
        }
    }

    /// Packet identifier, for the types that carry one.
    #[must_use]
    pub fn packet_id(&self) -> Option<u16> {
        match self {
            Packet::Publish(p) => p.packet_id,
            Packet::PubAck(p) => Some(p.packet_id),
            Packet::PubRec(p) => Some(p.packet_id),
            Packet::PubRel(p) => Some(p.packet_id),
            Packet::PubComp(p) => Some(p.packet_id),
            Packet::Subscribe(p) => Some(p.packet_id),
            Packet::SubAck(p) => Some(p.packet_id),
            Packet::Unsubscribe(p) => Some(p.packet_id),
            Packet::UnsubAck(p) => Some(p.packet_id),
            _ => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Packet::Connect(p) => p.len(),
            Packet::ConnAck(p) => p.len(),
            Packet::Publish(p) => p.len(),
            Packet::PubAck(p) => p.len(),
            Packet::PubRec(p) => p.len(),
            Packet::PubRel(p) => p.len(),
            Packet::PubComp(p) => p.len(),
            Packet::Subscribe(p) => p.len(),
            Packet::SubAck(p) => p.len(),
            Packet::Unsubscribe(p) => p.len(),
            Packet::UnsubAck(p) => p.len(),
            Packet::PingReq | Packet::PingResp | Packet::Disconnect => naked_len(),
        }
    }

    pub fn encode(&self, dst: &mut [u8]) -> Result<usize> {
        match self {
            Packet::Connect(p) => p.encode(dst),
            Packet::ConnAck(p) => p.encode(dst),
            Packet::Publish(p) => p.encode(dst),
            Packet::PubAck(p) => p.encode(dst),
            Packet::PubRec(p) => p.encode(dst),
            Packet::PubRel(p) => p.encode(dst),
            Packet::PubComp(p) => p.encode(dst),
            Packet::Subscribe(p) => p.encode(dst),
            Packet::SubAck(p) => p.encode(dst),
            Packet::Unsubscribe(p) => p.encode(dst),
            Packet::UnsubAck(p) => p.encode(dst),
            Packet::PingReq => naked_encode(dst, PacketType::PingReq),
            Packet::PingResp => naked_encode(dst, PacketType::PingResp),
            Packet::Disconnect => naked_encode(dst, PacketType::Disconnect),
        }
    }

    pub fn decode(src: &[u8]) -> Result<(Packet, usize)> {
        let Some(&first) = src.first() else {
            return Err(MqttError::InsufficientData);
        };

        match PacketType::try_from(first >> 4)? {
            PacketType::Connect => {
                ConnectPacket::decode(src).map(|(p, n)| (Packet::Connect(p), n))
            }
            PacketType::ConnAck => {
                ConnAckPacket::decode(src).map(|(p, n)| (Packet::ConnAck(p), n))
            }
            PacketType::Publish => {
                PublishPacket::decode(src).map(|(p, n)| (Packet::Publish(p), n))
            }
            PacketType::PubAck => PubAckPacket::decode(src).map(|(p, n)| (Packet::PubAck(p), n)),
            PacketType::PubRec => PubRecPacket::decode(src).map(|(p, n)| (Packet::PubRec(p), n)),
            PacketType::PubRel => PubRelPacket::decode(src).map(|(p, n)| (Packet::PubRel(p), n)),
            PacketType::PubComp => {
                PubCompPacket::decode(src).map(|(p, n)| (Packet::PubComp(p), n))
            }
            PacketType::Subscribe => {
                SubscribePacket::decode(src).map(|(p, n)| (Packet::Subscribe(p), n))
            }
            PacketType::SubAck => SubAckPacket::decode(src).map(|(p, n)| (Packet::SubAck(p), n)),
            PacketType::Unsubscribe => {
                UnsubscribePacket::decode(src).map(|(p, n)| (Packet::Unsubscribe(p), n))
            }
            PacketType::UnsubAck => {
                UnsubAckPacket::decode(src).map(|(p, n)| (Packet::UnsubAck(p), n))
            }
            PacketType::PingReq => {
                naked_decode(src, PacketType::PingReq).map(|n| (Packet::PingReq, n))
            }
            PacketType::PingResp => {
                naked_decode(src, PacketType::PingResp).map(|n| (Packet::PingResp, n))
            }
            PacketType::Disconnect => {
                naked_decode(src, PacketType::Disconnect).map(|n| (Packet::Disconnect, n))
            }
        }
    }

    /// Encodes into a freshly sized buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.len()];
        let n = self.encode(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }
}
