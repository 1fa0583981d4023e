//! Asynchronous MQTT 3.1.1 client.
//!
//! The client drives the publish QoS 0/1/2 handshakes, keeps the
//! connection alive with a heartbeat, and persists in-flight packets in a
//! pluggable [`SessionStore`] so unfinished handshakes replay across
//! reconnects.
//!
//! ```no_run
//! use mqtt311::{Client, ConnectOptions, QoS};
//!
//! # async fn run() -> mqtt311::Result<()> {
//! let client = Client::new();
//! client.set_callback(|event| match event {
//!     Ok(message) => println!("{}: {:?}", message.topic, message.payload),
//!     Err(err) => eprintln!("connection lost: {err}"),
//! });
//!
//! let connack = client.connect("mqtt://localhost:1883", ConnectOptions::default()).await?;
//! connack.wait().await?;
//!
//! client.subscribe("sensors/#", QoS::AtLeastOnce).await?.wait().await?;
//! client.publish("sensors/temp", &b"21.5"[..], QoS::AtLeastOnce, false).await?.wait().await?;
//! client.disconnect().await
//! # }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod future;
mod options;
mod session;
mod transport;

pub use client::{Callback, Client, ClientState};
pub use future::{AckFuture, ConnectAck, ConnectFuture};
pub use options::ConnectOptions;
pub use session::{Direction, MemorySession, SessionStore};
pub use transport::{Connection, Transport};

pub use mqtt311_protocol::{
    ConnectReturnCode, Message, MqttError, Packet, PacketType, QoS, Result,
};
