//! Durable in-flight packet state.
//!
//! The session store is the single source of truth for packets that are on
//! the wire but not yet fully acknowledged, keyed by direction and packet
//! ID. It survives reconnects so half-finished QoS 1/2 handshakes can be
//! replayed, and it owns the packet-ID allocator so replayed IDs are never
//! handed out twice.

use mqtt311_protocol::{MqttError, Packet, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Which side of the wire a stored packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Packets received from the broker (QoS 2 publishes awaiting PUBREL).
    Incoming,
    /// Packets sent to the broker and awaiting acknowledgement.
    Outgoing,
}

/// Persistence interface consumed by the client engine.
///
/// Implementations must tolerate concurrent calls from the receiver task
/// and API callers. [`all`](SessionStore::all) returns entries in insertion
/// order; replay depends on it.
pub trait SessionStore: Send + Sync {
    /// Stores `packet` under its own packet ID, replacing any entry with
    /// the same ID in place.
    fn save(&self, direction: Direction, packet: Packet) -> Result<()>;

    /// Looks up the packet stored under `packet_id`.
    fn lookup(&self, direction: Direction, packet_id: u16) -> Result<Option<Packet>>;

    /// Removes the entry under `packet_id`, if any.
    fn delete(&self, direction: Direction, packet_id: u16) -> Result<()>;

    /// All stored packets for `direction`, oldest first.
    fn all(&self, direction: Direction) -> Result<Vec<Packet>>;

    /// Allocates the next free packet ID, skipping IDs present in either
    /// direction and wrapping after 65535.
    fn next_id(&self) -> Result<u16>;

    /// Drops all stored packets and rewinds the ID allocator.
    fn reset(&self) -> Result<()>;
}

#[derive(Default)]
struct MemorySessionInner {
    incoming: Vec<(u16, Packet)>,
    outgoing: Vec<(u16, Packet)>,
    counter: u16,
}

impl MemorySessionInner {
    fn entries(&self, direction: Direction) -> &Vec<(u16, Packet)> {
        match direction {
            Direction::Incoming => &self.incoming,
            Direction::Outgoing => &self.outgoing,
        }
    }

    fn entries_mut(&mut self, direction: Direction) -> &mut Vec<(u16, Packet)> {
        match direction {
            Direction::Incoming => &mut self.incoming,
            Direction::Outgoing => &mut self.outgoing,
        }
    }

    fn in_use(&self, packet_id: u16) -> bool {
        self.incoming.iter().any(|(id, _)| *id == packet_id)
            || self.outgoing.iter().any(|(id, _)| *id == packet_id)
    }
}

/// The bundled, non-persistent [`SessionStore`].
#[derive(Default)]
pub struct MemorySession {
    inner: Mutex<MemorySessionInner>,
}

impl MemorySession {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl SessionStore for MemorySession {
    fn save(&self, direction: Direction, packet: Packet) -> Result<()> {
        let Some(packet_id) = packet.packet_id() else {
            return Err(MqttError::MalformedPacket(
                "Only packets with a packet ID can be stored".to_string(),
            ));
        };

        let mut inner = self.inner.lock();
        let entries = inner.entries_mut(direction);
        match entries.iter_mut().find(|(id, _)| *id == packet_id) {
            Some(entry) => entry.1 = packet,
            None => entries.push((packet_id, packet)),
        }
        Ok(())
    }

    fn lookup(&self, direction: Direction, packet_id: u16) -> Result<Option<Packet>> {
        let inner = self.inner.lock();
        Ok(inner
            .entries(direction)
            .iter()
            .find(|(id, _)| *id == packet_id)
            .map(|(_, packet)| packet.clone()))
    }

    fn delete(&self, direction: Direction, packet_id: u16) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.entries_mut(direction).retain(|(id, _)| *id != packet_id);
        Ok(())
    }

    fn all(&self, direction: Direction) -> Result<Vec<Packet>> {
        let inner = self.inner.lock();
        Ok(inner
            .entries(direction)
            .iter()
            .map(|(_, packet)| packet.clone())
            .collect())
    }

    fn next_id(&self) -> Result<u16> {
        let mut inner = self.inner.lock();
        for _ in 0..u16::MAX {
            inner.counter = match inner.counter {
                u16::MAX => 1,
                n => n + 1,
            };
            if !inner.in_use(inner.counter) {
                return Ok(inner.counter);
            }
        }
        Err(MqttError::PacketIdExhausted)
    }

    fn reset(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.incoming.clear();
        inner.outgoing.clear();
        inner.counter = 0;
        Ok(())
    }
}
