//! MQTT 3.1.1 wire codec and packet stream framing.
//!
//! [`packet`] implements the byte-exact codec for all fourteen control
//! packet types; [`stream`] layers buffered packet framing over any
//! asynchronous byte channel. The [`mqtt311`](https://docs.rs/mqtt311)
//! crate builds the client engine on top of this one.

#![warn(clippy::pedantic)]
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::module_name_repetitions)]

pub mod encoding;
pub mod error;
pub mod packet;
pub mod stream;
pub mod types;

pub use error::{MqttError, Result};
pub use packet::{
    detect, ConnAckPacket, ConnectPacket, ConnectReturnCode, MqttPacket, Packet, PacketType,
    PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket, PublishPacket, SubAckPacket,
    SubscribePacket, Subscription, UnsubAckPacket, UnsubscribePacket, SUBACK_FAILURE,
};
pub use stream::{Decoder, Encoder, Stream};
pub use types::{Message, QoS};
