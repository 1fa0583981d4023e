//! Receiver task: reads packets off the transport and drives the QoS
//! handshake state machines.

use mqtt311_protocol::{
    ConnAckPacket, Decoder, MqttError, Packet, PubAckPacket, PubCompPacket, PubRecPacket,
    PubRelPacket, PublishPacket, QoS, Result, SubAckPacket, UnsubAckPacket,
};
use std::sync::Arc;

use super::{ClientCore, ClientState, TaskKind};
use crate::future::{FutureCell, FutureValue};
use crate::session::Direction;
use crate::transport::TransportReader;

pub(crate) async fn receiver_task(core: Arc<ClientCore>, mut decoder: Decoder<TransportReader>) {
    tracing::debug!("receiver task started");

    loop {
        match decoder.read().await {
            Ok(packet) => {
                tracing::trace!(?packet, "received packet");
                if let Err(err) = dispatch(&core, packet).await {
                    tracing::error!("receiver terminating: {err}");
                    core.cleanup(Some(err), TaskKind::Reader).await;
                    break;
                }
            }
            Err(err) => {
                let err = match err {
                    MqttError::ConnectionClosed | MqttError::UnexpectedEof => {
                        MqttError::UnexpectedClose
                    }
                    err => err,
                };
                tracing::error!("receiver terminating: {err}");
                core.cleanup(Some(err), TaskKind::Reader).await;
                break;
            }
        }
    }

    tracing::debug!("receiver task exited");
}

async fn dispatch(core: &Arc<ClientCore>, packet: Packet) -> Result<()> {
    if core.state() == ClientState::Connecting {
        return match packet {
            Packet::ConnAck(connack) => handle_connack(core, connack).await,
            _ => Err(MqttError::ExpectedConnack),
        };
    }

    match packet {
        // a CONNACK outside the connecting state carries no meaning
        Packet::ConnAck(_) => Ok(()),
        Packet::Publish(publish) => handle_publish(core, publish).await,
        Packet::PubAck(PubAckPacket { packet_id })
        | Packet::PubComp(PubCompPacket { packet_id }) => handle_ack(core, packet_id),
        Packet::PubRec(pubrec) => handle_pubrec(core, pubrec.packet_id).await,
        Packet::PubRel(pubrel) => handle_pubrel(core, pubrel.packet_id).await,
        Packet::SubAck(suback) => handle_suback(core, suback),
        Packet::UnsubAck(UnsubAckPacket { packet_id }) => handle_unsuback(core, packet_id),
        Packet::PingResp => {
            if let Some(tracker) = core.tracker.lock().as_mut() {
                tracker.pong();
            }
            Ok(())
        }
        other => Err(MqttError::UnexpectedPacket(other.packet_type())),
    }
}

async fn handle_connack(core: &Arc<ClientCore>, connack: ConnAckPacket) -> Result<()> {
    let cell = core.connect_future.lock().clone();
    let value = FutureValue::connack(connack.session_present, connack.return_code);

    if !connack.return_code.is_accepted() {
        tracing::warn!(code = connack.return_code.0, "connection denied by broker");
        if let Some(cell) = cell {
            cell.complete(value);
        }
        return Err(MqttError::ConnectionDenied(connack.return_code));
    }

    core.set_state(ClientState::Connected);
    tracing::debug!(
        session_present = connack.session_present,
        "connection accepted"
    );

    replay(core).await?;

    if let Some(cell) = cell {
        cell.complete(value);
    }
    Ok(())
}

/// Retransmits the persisted outgoing session after a successful CONNACK.
///
/// Entries are walked in insertion order; PUBLISH retransmissions carry the
/// dup flag. IDs without a registered future get a fresh one so the
/// registry keeps covering every in-flight packet.
async fn replay(core: &Arc<ClientCore>) -> Result<()> {
    let packets = core.session.all(Direction::Outgoing)?;
    if packets.is_empty() {
        return Ok(());
    }

    tracing::debug!(count = packets.len(), "replaying outgoing session");
    for packet in packets {
        let Some(packet_id) = packet.packet_id() else {
            continue;
        };

        if !core.futures.contains(packet_id) {
            core.futures.put(packet_id, FutureCell::new());
        }

        let packet = match packet {
            Packet::Publish(mut publish) => {
                publish.dup = true;
                Packet::Publish(publish)
            }
            other => other,
        };
        core.send(&packet).await?;
    }
    Ok(())
}

async fn handle_publish(core: &Arc<ClientCore>, publish: PublishPacket) -> Result<()> {
    match publish.message.qos {
        QoS::AtMostOnce => {
            core.emit(Ok(publish.message));
            Ok(())
        }
        QoS::AtLeastOnce => {
            let Some(packet_id) = publish.packet_id else {
                return Err(MqttError::MalformedPacket(
                    "PUBLISH above QoS 0 without a packet ID".to_string(),
                ));
            };
            core.emit(Ok(publish.message));
            core.send(&Packet::PubAck(PubAckPacket::new(packet_id))).await
        }
        QoS::ExactlyOnce => {
            let Some(packet_id) = publish.packet_id else {
                return Err(MqttError::MalformedPacket(
                    "PUBLISH above QoS 0 without a packet ID".to_string(),
                ));
            };
            // held until the PUBREL releases it; a duplicate PUBLISH simply
            // overwrites the held copy and earns another PUBREC
            core.session
                .save(Direction::Incoming, Packet::Publish(publish))?;
            core.send(&Packet::PubRec(PubRecPacket::new(packet_id))).await
        }
    }
}

async fn handle_pubrel(core: &Arc<ClientCore>, packet_id: u16) -> Result<()> {
    let Some(Packet::Publish(publish)) = core.session.lookup(Direction::Incoming, packet_id)?
    else {
        tracing::debug!(packet_id, "PUBREL without a held publish, ignoring");
        return Ok(());
    };

    core.emit(Ok(publish.message));
    core.session.delete(Direction::Incoming, packet_id)?;
    core.send(&Packet::PubComp(PubCompPacket::new(packet_id))).await
}

fn handle_ack(core: &Arc<ClientCore>, packet_id: u16) -> Result<()> {
    let Some(cell) = core.futures.get(packet_id) else {
        tracing::debug!(packet_id, "acknowledgement without a future, ignoring");
        return Ok(());
    };

    core.session.delete(Direction::Outgoing, packet_id)?;
    cell.complete(FutureValue::ack());
    core.futures.delete(packet_id);
    Ok(())
}

async fn handle_pubrec(core: &Arc<ClientCore>, packet_id: u16) -> Result<()> {
    if core.session.lookup(Direction::Outgoing, packet_id)?.is_none() {
        tracing::debug!(packet_id, "PUBREC without an outgoing packet, ignoring");
        return Ok(());
    }

    // swap the stored PUBLISH for its PUBREL; a duplicate PUBREC repeats
    // this and resends the PUBREL, which is idempotent
    let pubrel = PubRelPacket::new(packet_id);
    core.session
        .save(Direction::Outgoing, Packet::PubRel(pubrel))?;
    core.send(&Packet::PubRel(pubrel)).await
}

fn handle_suback(core: &Arc<ClientCore>, suback: SubAckPacket) -> Result<()> {
    let Some(cell) = core.futures.get(suback.packet_id) else {
        tracing::debug!(packet_id = suback.packet_id, "SUBACK without a future, ignoring");
        return Ok(());
    };

    core.session.delete(Direction::Outgoing, suback.packet_id)?;
    cell.complete(FutureValue::suback(suback.return_codes));
    core.futures.delete(suback.packet_id);
    Ok(())
}

fn handle_unsuback(core: &Arc<ClientCore>, packet_id: u16) -> Result<()> {
    let Some(cell) = core.futures.get(packet_id) else {
        tracing::debug!(packet_id, "UNSUBACK without a future, ignoring");
        return Ok(());
    };

    core.session.delete(Direction::Outgoing, packet_id)?;
    cell.complete(FutureValue::ack());
    core.futures.delete(packet_id);
    Ok(())
}
