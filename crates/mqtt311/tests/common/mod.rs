//! A scripted broker for integration tests.
//!
//! The broker binds a real TCP listener, accepts one connection and plays a
//! fixed script: every `Receive` asserts byte-level equality with the
//! packet the client actually sent, every `Send` injects a broker response.
//! Deviations panic inside the broker task and surface when the test
//! awaits [`ScriptedBroker::done`].

#![allow(dead_code)]

use mqtt311::{Message, Packet, QoS};
use mqtt311_protocol::{
    ConnAckPacket, ConnectPacket, ConnectReturnCode, PubAckPacket, PubCompPacket, PubRecPacket,
    PubRelPacket, PublishPacket, Stream, SubAckPacket, SubscribePacket, Subscription,
    UnsubAckPacket, UnsubscribePacket,
};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub enum Step {
    /// Expect the client to send exactly this packet.
    Receive(Packet),
    /// Send this packet to the client.
    Send(Packet),
    /// Pause the script.
    Wait(Duration),
    /// Drop the connection mid-session.
    Close,
    /// Expect the client to close the connection.
    End,
}

pub struct ScriptedBroker {
    pub addr: String,
    handle: JoinHandle<()>,
}

impl ScriptedBroker {
    pub async fn start(steps: Vec<Step>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            socket.set_nodelay(true).unwrap();
            let (reader, writer) = tokio::io::split(socket);
            let mut stream = Stream::new(reader, writer);

            for (i, step) in steps.into_iter().enumerate() {
                match step {
                    Step::Receive(expected) => {
                        let received = stream
                            .read()
                            .await
                            .unwrap_or_else(|err| panic!("step {i}: read failed: {err}"));
                        assert_eq!(received, expected, "step {i}: unexpected packet");
                    }
                    Step::Send(packet) => {
                        stream.write(&packet).unwrap();
                        stream.flush().await.unwrap();
                    }
                    Step::Wait(duration) => tokio::time::sleep(duration).await,
                    Step::Close => return,
                    Step::End => {
                        let result = stream.read().await;
                        assert!(
                            result.is_err(),
                            "step {i}: expected the client to close, got {result:?}"
                        );
                        return;
                    }
                }
            }
        });

        Self { addr, handle }
    }

    /// Waits for the script to finish, propagating any assertion failure.
    pub async fn done(self) {
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("broker script timed out")
            .unwrap();
    }
}

pub fn connect_packet() -> ConnectPacket {
    ConnectPacket::default()
}

pub fn connack_packet() -> Packet {
    Packet::ConnAck(ConnAckPacket::new(false, ConnectReturnCode::ACCEPTED))
}

pub fn publish_packet(topic: &str, payload: &[u8], qos: QoS, packet_id: Option<u16>) -> Packet {
    Packet::Publish(PublishPacket::new(
        Message::new(topic, payload.to_vec()).with_qos(qos),
        packet_id,
    ))
}

pub fn dup_publish_packet(topic: &str, payload: &[u8], qos: QoS, packet_id: u16) -> Packet {
    let mut publish = PublishPacket::new(
        Message::new(topic, payload.to_vec()).with_qos(qos),
        Some(packet_id),
    );
    publish.dup = true;
    Packet::Publish(publish)
}

pub fn subscribe_packet(packet_id: u16, topic: &str, qos: QoS) -> Packet {
    Packet::Subscribe(SubscribePacket::new(
        packet_id,
        vec![Subscription::new(topic, qos)],
    ))
}

pub fn suback_packet(packet_id: u16, return_codes: Vec<u8>) -> Packet {
    Packet::SubAck(SubAckPacket::new(packet_id, return_codes))
}

pub fn unsubscribe_packet(packet_id: u16, topic: &str) -> Packet {
    Packet::Unsubscribe(UnsubscribePacket::new(packet_id, vec![topic.to_string()]))
}

pub fn unsuback_packet(packet_id: u16) -> Packet {
    Packet::UnsubAck(UnsubAckPacket::new(packet_id))
}

pub fn puback_packet(packet_id: u16) -> Packet {
    Packet::PubAck(PubAckPacket::new(packet_id))
}

pub fn pubrec_packet(packet_id: u16) -> Packet {
    Packet::PubRec(PubRecPacket::new(packet_id))
}

pub fn pubrel_packet(packet_id: u16) -> Packet {
    Packet::PubRel(PubRelPacket::new(packet_id))
}

pub fn pubcomp_packet(packet_id: u16) -> Packet {
    Packet::PubComp(PubCompPacket::new(packet_id))
}

/// Collects callback events on a channel so tests can await them.
pub struct EventCollector {
    rx: tokio::sync::Mutex<tokio::sync::mpsc::UnboundedReceiver<mqtt311::Result<Message>>>,
}

impl EventCollector {
    pub fn install(client: &mqtt311::Client) -> Self {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        client.set_callback(move |event| {
            let _ = tx.send(event);
        });
        Self {
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    pub async fn next(&self) -> mqtt311::Result<Message> {
        tokio::time::timeout(Duration::from_secs(10), self.rx.lock().await.recv())
            .await
            .expect("timed out waiting for a callback event")
            .expect("callback channel closed")
    }

    pub async fn assert_idle(&self) {
        let mut rx = self.rx.lock().await;
        match rx.try_recv() {
            Err(tokio::sync::mpsc::error::TryRecvError::Empty) => {}
            event => panic!("expected no callback events, got {event:?}"),
        }
    }
}
