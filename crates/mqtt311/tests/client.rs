//! End-to-end client behavior against a scripted broker.

mod common;

use common::*;
use mqtt311::{Client, ClientState, ConnectOptions, ConnectReturnCode, MqttError, QoS};
use mqtt311_protocol::{ConnectPacket, Packet};
use std::time::Duration;

#[tokio::test]
async fn test_connect_disconnect() {
    let broker = ScriptedBroker::start(vec![
        Step::Receive(Packet::Connect(connect_packet())),
        Step::Send(connack_packet()),
        Step::Receive(Packet::Disconnect),
        Step::End,
    ])
    .await;

    let client = Client::new();
    let events = EventCollector::install(&client);

    let future = client
        .connect(&broker.addr, ConnectOptions::default())
        .await
        .unwrap();
    let ack = future.wait().await.unwrap();
    assert!(!ack.session_present);
    assert_eq!(ack.return_code, ConnectReturnCode::ACCEPTED);
    assert!(client.is_connected());

    client.disconnect().await.unwrap();
    assert_eq!(client.state(), ClientState::Disconnected);

    broker.done().await;
    events.assert_idle().await;
}

#[tokio::test]
async fn test_connect_while_connected() {
    let broker = ScriptedBroker::start(vec![
        Step::Receive(Packet::Connect(connect_packet())),
        Step::Send(connack_packet()),
        Step::Receive(Packet::Disconnect),
        Step::End,
    ])
    .await;

    let client = Client::new();
    let future = client
        .connect(&broker.addr, ConnectOptions::default())
        .await
        .unwrap();
    future.wait().await.unwrap();

    let result = client.connect(&broker.addr, ConnectOptions::default()).await;
    assert!(matches!(result, Err(MqttError::AlreadyConnecting)));

    client.disconnect().await.unwrap();
    broker.done().await;
}

#[tokio::test]
async fn test_connect_with_credentials() {
    let expected = ConnectPacket {
        username: Some("user".to_string()),
        password: Some(b"pass".to_vec()),
        ..connect_packet()
    };

    let broker = ScriptedBroker::start(vec![
        Step::Receive(Packet::Connect(expected)),
        Step::Send(connack_packet()),
        Step::Receive(Packet::Disconnect),
        Step::End,
    ])
    .await;

    let client = Client::new();
    let options = ConnectOptions::default().with_credentials("user", "pass");
    let future = client.connect(&broker.addr, options).await.unwrap();
    future.wait().await.unwrap();

    client.disconnect().await.unwrap();
    broker.done().await;
}

#[tokio::test]
async fn test_connection_denied() {
    let denied = Packet::ConnAck(mqtt311_protocol::ConnAckPacket::new(
        false,
        ConnectReturnCode::NOT_AUTHORIZED,
    ));

    let broker = ScriptedBroker::start(vec![
        Step::Receive(Packet::Connect(connect_packet())),
        Step::Send(denied),
        Step::Close,
    ])
    .await;

    let client = Client::new();
    let events = EventCollector::install(&client);

    let future = client
        .connect(&broker.addr, ConnectOptions::default())
        .await
        .unwrap();
    let ack = future.wait().await.unwrap();
    assert!(!ack.session_present);
    assert_eq!(ack.return_code, ConnectReturnCode::NOT_AUTHORIZED);

    let event = events.next().await;
    assert_eq!(
        event,
        Err(MqttError::ConnectionDenied(ConnectReturnCode::NOT_AUTHORIZED))
    );

    broker.done().await;
}

#[tokio::test]
async fn test_expected_connack() {
    let broker = ScriptedBroker::start(vec![
        Step::Receive(Packet::Connect(connect_packet())),
        Step::Send(Packet::PingResp),
        Step::End,
    ])
    .await;

    let client = Client::new();
    let events = EventCollector::install(&client);

    let future = client
        .connect(&broker.addr, ConnectOptions::default())
        .await
        .unwrap();
    assert_eq!(future.wait().await.err(), Some(MqttError::FutureCanceled));

    assert_eq!(events.next().await, Err(MqttError::ExpectedConnack));
    broker.done().await;
}

#[tokio::test]
async fn test_keepalive() {
    let expected_connect = ConnectPacket {
        keep_alive: 0, // 100ms truncates to zero whole seconds on the wire
        ..connect_packet()
    };

    let broker = ScriptedBroker::start(vec![
        Step::Receive(Packet::Connect(expected_connect)),
        Step::Send(connack_packet()),
        Step::Receive(Packet::PingReq),
        Step::Send(Packet::PingResp),
        Step::Receive(Packet::PingReq),
        Step::Send(Packet::PingResp),
        Step::Receive(Packet::Disconnect),
        Step::End,
    ])
    .await;

    let client = Client::new();
    let events = EventCollector::install(&client);

    let options = ConnectOptions::default().with_keep_alive("100ms");
    let future = client.connect(&broker.addr, options).await.unwrap();
    future.wait().await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;

    client.disconnect().await.unwrap();
    broker.done().await;
    events.assert_idle().await;
}

#[tokio::test]
async fn test_missing_pong() {
    let expected_connect = ConnectPacket {
        keep_alive: 0,
        ..connect_packet()
    };

    let broker = ScriptedBroker::start(vec![
        Step::Receive(Packet::Connect(expected_connect)),
        Step::Send(connack_packet()),
        Step::Receive(Packet::PingReq),
        Step::End,
    ])
    .await;

    let client = Client::new();
    let events = EventCollector::install(&client);

    let options = ConnectOptions::default().with_keep_alive("20ms");
    let future = client.connect(&broker.addr, options).await.unwrap();
    future.wait().await.unwrap();

    assert_eq!(events.next().await, Err(MqttError::MissingPong));
    assert_eq!(client.state(), ClientState::Disconnected);

    broker.done().await;
}

#[tokio::test]
async fn test_publish_subscribe_qos0() {
    let broker = ScriptedBroker::start(vec![
        Step::Receive(Packet::Connect(connect_packet())),
        Step::Send(connack_packet()),
        Step::Receive(subscribe_packet(1, "test", QoS::AtMostOnce)),
        Step::Send(suback_packet(1, vec![0])),
        Step::Receive(publish_packet("test", b"test", QoS::AtMostOnce, None)),
        Step::Send(publish_packet("test", b"test", QoS::AtMostOnce, None)),
        Step::Receive(Packet::Disconnect),
        Step::End,
    ])
    .await;

    let client = Client::new();
    let events = EventCollector::install(&client);

    let future = client
        .connect(&broker.addr, ConnectOptions::default())
        .await
        .unwrap();
    future.wait().await.unwrap();

    let subscribe = client.subscribe("test", QoS::AtMostOnce).await.unwrap();
    subscribe.wait().await.unwrap();
    assert_eq!(subscribe.granted_codes(), Some(vec![0]));

    let publish = client
        .publish("test", &b"test"[..], QoS::AtMostOnce, false)
        .await
        .unwrap();
    publish.wait().await.unwrap();

    let message = events.next().await.unwrap();
    assert_eq!(message.topic, "test");
    assert_eq!(&message.payload[..], b"test");
    assert_eq!(message.qos, QoS::AtMostOnce);
    assert!(!message.retain);

    client.disconnect().await.unwrap();
    broker.done().await;

    let session = client.session();
    assert!(session.all(mqtt311::Direction::Incoming).unwrap().is_empty());
    assert!(session.all(mqtt311::Direction::Outgoing).unwrap().is_empty());
}

#[tokio::test]
async fn test_publish_subscribe_qos1() {
    let broker = ScriptedBroker::start(vec![
        Step::Receive(Packet::Connect(connect_packet())),
        Step::Send(connack_packet()),
        Step::Receive(subscribe_packet(1, "test", QoS::AtLeastOnce)),
        Step::Send(suback_packet(1, vec![1])),
        Step::Receive(publish_packet("test", b"test", QoS::AtLeastOnce, Some(2))),
        Step::Send(puback_packet(2)),
        Step::Send(publish_packet("test", b"test", QoS::AtLeastOnce, Some(2))),
        Step::Receive(puback_packet(2)),
        Step::Receive(Packet::Disconnect),
        Step::End,
    ])
    .await;

    let client = Client::new();
    let events = EventCollector::install(&client);

    let future = client
        .connect(&broker.addr, ConnectOptions::default())
        .await
        .unwrap();
    future.wait().await.unwrap();

    let subscribe = client.subscribe("test", QoS::AtLeastOnce).await.unwrap();
    subscribe.wait().await.unwrap();
    assert_eq!(subscribe.granted_codes(), Some(vec![1]));

    let publish = client
        .publish("test", &b"test"[..], QoS::AtLeastOnce, false)
        .await
        .unwrap();
    publish.wait().await.unwrap();

    let message = events.next().await.unwrap();
    assert_eq!(message.topic, "test");
    assert_eq!(message.qos, QoS::AtLeastOnce);

    client.disconnect().await.unwrap();
    broker.done().await;

    let session = client.session();
    assert!(session.all(mqtt311::Direction::Incoming).unwrap().is_empty());
    assert!(session.all(mqtt311::Direction::Outgoing).unwrap().is_empty());
}

#[tokio::test]
async fn test_publish_subscribe_qos2() {
    let broker = ScriptedBroker::start(vec![
        Step::Receive(Packet::Connect(connect_packet())),
        Step::Send(connack_packet()),
        Step::Receive(subscribe_packet(1, "test", QoS::ExactlyOnce)),
        Step::Send(suback_packet(1, vec![2])),
        // outgoing four-way handshake
        Step::Receive(publish_packet("test", b"test", QoS::ExactlyOnce, Some(2))),
        Step::Send(pubrec_packet(2)),
        Step::Receive(pubrel_packet(2)),
        Step::Send(pubcomp_packet(2)),
        // incoming four-way handshake
        Step::Send(publish_packet("test", b"test", QoS::ExactlyOnce, Some(2))),
        Step::Receive(pubrec_packet(2)),
        Step::Send(pubrel_packet(2)),
        Step::Receive(pubcomp_packet(2)),
        Step::Receive(Packet::Disconnect),
        Step::End,
    ])
    .await;

    let client = Client::new();
    let events = EventCollector::install(&client);

    let future = client
        .connect(&broker.addr, ConnectOptions::default())
        .await
        .unwrap();
    future.wait().await.unwrap();

    let subscribe = client.subscribe("test", QoS::ExactlyOnce).await.unwrap();
    subscribe.wait().await.unwrap();
    assert_eq!(subscribe.granted_codes(), Some(vec![2]));

    let publish = client
        .publish("test", &b"test"[..], QoS::ExactlyOnce, false)
        .await
        .unwrap();
    publish.wait().await.unwrap();

    let message = events.next().await.unwrap();
    assert_eq!(message.topic, "test");
    assert_eq!(message.qos, QoS::ExactlyOnce);

    client.disconnect().await.unwrap();
    broker.done().await;

    let session = client.session();
    assert!(session.all(mqtt311::Direction::Incoming).unwrap().is_empty());
    assert!(session.all(mqtt311::Direction::Outgoing).unwrap().is_empty());
}

#[tokio::test]
async fn test_unsubscribe() {
    let broker = ScriptedBroker::start(vec![
        Step::Receive(Packet::Connect(connect_packet())),
        Step::Send(connack_packet()),
        Step::Receive(unsubscribe_packet(1, "test")),
        Step::Send(unsuback_packet(1)),
        Step::Receive(Packet::Disconnect),
        Step::End,
    ])
    .await;

    let client = Client::new();
    let future = client
        .connect(&broker.addr, ConnectOptions::default())
        .await
        .unwrap();
    future.wait().await.unwrap();

    let unsubscribe = client.unsubscribe("test").await.unwrap();
    unsubscribe.wait().await.unwrap();

    client.disconnect().await.unwrap();
    broker.done().await;
}

#[tokio::test]
async fn test_hard_disconnect_keeps_inflight_publish() {
    let expected_connect = ConnectPacket {
        client_id: "test".to_string(),
        clean_session: false,
        ..connect_packet()
    };

    let broker = ScriptedBroker::start(vec![
        Step::Receive(Packet::Connect(expected_connect)),
        Step::Send(connack_packet()),
        Step::Receive(publish_packet("test", b"test", QoS::AtLeastOnce, Some(1))),
        Step::Receive(Packet::Disconnect),
        Step::End,
    ])
    .await;

    let client = Client::new();
    let options = ConnectOptions::new("test").with_clean_session(false);
    let future = client.connect(&broker.addr, options).await.unwrap();
    future.wait().await.unwrap();

    let publish = client
        .publish("test", &b"test"[..], QoS::AtLeastOnce, false)
        .await
        .unwrap();

    client.disconnect().await.unwrap();
    assert_eq!(publish.wait().await.err(), Some(MqttError::FutureCanceled));

    broker.done().await;

    let outgoing = client.session().all(mqtt311::Direction::Outgoing).unwrap();
    assert_eq!(outgoing.len(), 1);
}

#[tokio::test]
async fn test_disconnect_with_timeout_drains_futures() {
    let broker = ScriptedBroker::start(vec![
        Step::Receive(Packet::Connect(connect_packet())),
        Step::Send(connack_packet()),
        Step::Receive(publish_packet("test", b"test", QoS::AtLeastOnce, Some(1))),
        Step::Wait(Duration::from_millis(100)),
        Step::Send(puback_packet(1)),
        Step::Receive(Packet::Disconnect),
        Step::End,
    ])
    .await;

    let client = Client::new();
    let future = client
        .connect(&broker.addr, ConnectOptions::default())
        .await
        .unwrap();
    future.wait().await.unwrap();

    let publish = client
        .publish("test", &b"test"[..], QoS::AtLeastOnce, false)
        .await
        .unwrap();

    client
        .disconnect_timeout(Duration::from_secs(10))
        .await
        .unwrap();
    publish.wait().await.unwrap();

    broker.done().await;
    assert!(client
        .session()
        .all(mqtt311::Direction::Outgoing)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_close_without_disconnect_packet() {
    let broker = ScriptedBroker::start(vec![
        Step::Receive(Packet::Connect(connect_packet())),
        Step::Send(connack_packet()),
        Step::End,
    ])
    .await;

    let client = Client::new();
    let events = EventCollector::install(&client);

    let future = client
        .connect(&broker.addr, ConnectOptions::default())
        .await
        .unwrap();
    future.wait().await.unwrap();

    client.close().await.unwrap();
    assert_eq!(client.state(), ClientState::Disconnected);

    broker.done().await;
    events.assert_idle().await;
}

#[tokio::test]
async fn test_session_resumption_replays_with_dup() {
    let expected_connect = ConnectPacket {
        client_id: "test".to_string(),
        clean_session: false,
        ..connect_packet()
    };

    let broker = ScriptedBroker::start(vec![
        Step::Receive(Packet::Connect(expected_connect)),
        Step::Send(connack_packet()),
        Step::Receive(dup_publish_packet("test", b"test", QoS::AtLeastOnce, 1)),
        Step::Send(puback_packet(1)),
        Step::Receive(Packet::Disconnect),
        Step::End,
    ])
    .await;

    let client = Client::new();
    client
        .session()
        .save(
            mqtt311::Direction::Outgoing,
            publish_packet("test", b"test", QoS::AtLeastOnce, Some(1)),
        )
        .unwrap();

    let options = ConnectOptions::new("test").with_clean_session(false);
    let future = client.connect(&broker.addr, options).await.unwrap();
    future.wait().await.unwrap();

    client
        .disconnect_timeout(Duration::from_secs(10))
        .await
        .unwrap();
    broker.done().await;

    assert!(client
        .session()
        .all(mqtt311::Direction::Outgoing)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_unexpected_close() {
    let broker = ScriptedBroker::start(vec![
        Step::Receive(Packet::Connect(connect_packet())),
        Step::Send(connack_packet()),
        Step::Close,
    ])
    .await;

    let client = Client::new();
    let events = EventCollector::install(&client);

    let future = client
        .connect(&broker.addr, ConnectOptions::default())
        .await
        .unwrap();
    future.wait().await.unwrap();

    assert_eq!(events.next().await, Err(MqttError::UnexpectedClose));
    assert_eq!(client.state(), ClientState::Disconnected);

    broker.done().await;
}

#[tokio::test]
async fn test_connack_future_cancelled_on_close() {
    let broker = ScriptedBroker::start(vec![
        Step::Receive(Packet::Connect(connect_packet())),
        Step::Close,
    ])
    .await;

    let client = Client::new();
    let events = EventCollector::install(&client);

    let future = client
        .connect(&broker.addr, ConnectOptions::default())
        .await
        .unwrap();
    assert_eq!(future.wait().await.err(), Some(MqttError::FutureCanceled));

    assert_eq!(events.next().await, Err(MqttError::UnexpectedClose));
    broker.done().await;
}

#[tokio::test]
async fn test_publish_future_cancelled_on_unexpected_close() {
    let broker = ScriptedBroker::start(vec![
        Step::Receive(Packet::Connect(connect_packet())),
        Step::Send(connack_packet()),
        Step::Receive(publish_packet("test", b"test", QoS::AtLeastOnce, Some(1))),
        Step::Close,
    ])
    .await;

    let client = Client::new();
    let events = EventCollector::install(&client);

    let future = client
        .connect(&broker.addr, ConnectOptions::default())
        .await
        .unwrap();
    future.wait().await.unwrap();

    let publish = client
        .publish("test", &b"test"[..], QoS::AtLeastOnce, false)
        .await
        .unwrap();
    assert_eq!(publish.wait().await.err(), Some(MqttError::FutureCanceled));

    assert_eq!(events.next().await, Err(MqttError::UnexpectedClose));
    broker.done().await;

    // the unacked publish survives for the next session
    let outgoing = client.session().all(mqtt311::Direction::Outgoing).unwrap();
    assert_eq!(outgoing.len(), 1);
}

#[tokio::test]
async fn test_reconnect_after_unexpected_close() {
    let first = ScriptedBroker::start(vec![
        Step::Receive(Packet::Connect(connect_packet())),
        Step::Send(connack_packet()),
        Step::Close,
    ])
    .await;

    let client = Client::new();
    let events = EventCollector::install(&client);

    let future = client
        .connect(&first.addr, ConnectOptions::default())
        .await
        .unwrap();
    future.wait().await.unwrap();

    assert_eq!(events.next().await, Err(MqttError::UnexpectedClose));
    first.done().await;

    // the same client connects again
    let second = ScriptedBroker::start(vec![
        Step::Receive(Packet::Connect(connect_packet())),
        Step::Send(connack_packet()),
        Step::Receive(Packet::Disconnect),
        Step::End,
    ])
    .await;

    let future = client
        .connect(&second.addr, ConnectOptions::default())
        .await
        .unwrap();
    future.wait().await.unwrap();

    client.disconnect().await.unwrap();
    second.done().await;
}
