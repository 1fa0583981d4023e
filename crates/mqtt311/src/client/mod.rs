//! The asynchronous client engine.
//!
//! One receiver task per connection reads packets off the transport; a
//! keepalive task maintains the heartbeat; API callers encode onto a
//! single shared writer. All three coordinate through the future registry,
//! the session store and the keepalive tracker.

mod keepalive;
mod reader;

use bytes::Bytes;
use mqtt311_protocol::{
    Decoder, Encoder, Message, MqttError, Packet, PublishPacket, QoS, Result, SubscribePacket,
    Subscription, UnsubscribePacket,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::future::{AckFuture, ConnectFuture, FutureCell, FutureStore};
use crate::options::ConnectOptions;
use crate::session::{Direction, MemorySession, SessionStore};
use crate::transport::{Transport, TransportWriter};

use keepalive::Tracker;

/// The single user callback: `Ok` for every delivered inbound publish,
/// `Err` exactly once when the connection dies on a terminal error.
pub type Callback = Arc<dyn Fn(Result<Message>) + Send + Sync>;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientState {
    Initial = 0,
    Connecting = 1,
    Connected = 2,
    Disconnecting = 3,
    Disconnected = 4,
}

impl ClientState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ClientState::Initial,
            1 => ClientState::Connecting,
            2 => ClientState::Connected,
            3 => ClientState::Disconnecting,
            _ => ClientState::Disconnected,
        }
    }
}

/// Which task is tearing the connection down, so cleanup never aborts its
/// own caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskKind {
    Api,
    Reader,
    Keepalive,
}

pub(crate) struct ClientCore {
    state: AtomicU8,
    pub(crate) session: Arc<dyn SessionStore>,
    pub(crate) futures: FutureStore,
    pub(crate) connect_future: Mutex<Option<Arc<FutureCell>>>,
    pub(crate) tracker: Mutex<Option<Tracker>>,
    callback: Mutex<Option<Callback>>,
    callback_gate: Mutex<()>,
    writer: tokio::sync::Mutex<Option<Encoder<TransportWriter>>>,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
    keepalive_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ClientCore {
    pub(crate) fn state(&self) -> ClientState {
        ClientState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: ClientState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn begin_connecting(&self) -> Result<()> {
        for current in [ClientState::Initial, ClientState::Disconnected] {
            if self
                .state
                .compare_exchange(
                    current as u8,
                    ClientState::Connecting as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
            {
                return Ok(());
            }
        }
        Err(MqttError::AlreadyConnecting)
    }

    /// Encodes and flushes one packet while holding the writer lock, then
    /// restarts the keepalive window.
    pub(crate) async fn send(&self, packet: &Packet) -> Result<()> {
        {
            let mut writer = self.writer.lock().await;
            let Some(encoder) = writer.as_mut() else {
                return Err(MqttError::NotConnected);
            };
            tracing::trace!(packet_type = ?packet.packet_type(), "sending packet");
            encoder.write(packet)?;
            encoder.flush().await?;
        }

        if let Some(tracker) = self.tracker.lock().as_mut() {
            tracker.touch();
        }
        Ok(())
    }

    /// Invokes the user callback, serialised against every other invocation.
    pub(crate) fn emit(&self, event: Result<Message>) {
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            let _gate = self.callback_gate.lock();
            callback(event);
        }
    }

    /// Tears the connection down. The first caller wins; the rest return
    /// immediately. Cancels every pending future, stops the background
    /// tasks and, unless the shutdown was user-initiated, reports `error`
    /// through the callback exactly once.
    pub(crate) async fn cleanup(&self, error: Option<MqttError>, caller: TaskKind) {
        let previous = ClientState::from_u8(
            self.state
                .swap(ClientState::Disconnected as u8, Ordering::SeqCst),
        );
        if previous == ClientState::Disconnected {
            return;
        }
        tracing::debug!(?previous, ?error, "closing connection");

        let reader_handle = self.reader_handle.lock().take();
        if let Some(handle) = reader_handle {
            if caller != TaskKind::Reader {
                handle.abort();
            }
        }
        let keepalive_handle = self.keepalive_handle.lock().take();
        if let Some(handle) = keepalive_handle {
            if caller != TaskKind::Keepalive {
                handle.abort();
            }
        }

        if let Some(mut encoder) = self.writer.lock().await.take() {
            if error.is_none() {
                let _ = encoder.shutdown().await;
            }
        }

        if let Some(cell) = self.connect_future.lock().take() {
            cell.cancel();
        }
        self.futures.cancel_all();

        if let Some(err) = error {
            // an error racing a deliberate disconnect is not reported
            if previous != ClientState::Disconnecting {
                self.emit(Err(err));
            }
        }
    }
}

/// An MQTT 3.1.1 client.
///
/// Cheap to clone; all clones share one connection, session store and
/// callback. A client can connect again after a disconnect or a terminal
/// error, replaying unfinished QoS 1/2 handshakes from its session store.
#[derive(Clone)]
pub struct Client {
    core: Arc<ClientCore>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// A client backed by an in-memory session store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_session(MemorySession::new())
    }

    /// A client backed by the given session store.
    #[must_use]
    pub fn with_session(session: Arc<dyn SessionStore>) -> Self {
        Self {
            core: Arc::new(ClientCore {
                state: AtomicU8::new(ClientState::Initial as u8),
                session,
                futures: FutureStore::new(),
                connect_future: Mutex::new(None),
                tracker: Mutex::new(None),
                callback: Mutex::new(None),
                callback_gate: Mutex::new(()),
                writer: tokio::sync::Mutex::new(None),
                reader_handle: Mutex::new(None),
                keepalive_handle: Mutex::new(None),
            }),
        }
    }

    /// Installs the user callback. Must be set before connecting to observe
    /// every event.
    pub fn set_callback(&self, callback: impl Fn(Result<Message>) + Send + Sync + 'static) {
        *self.core.callback.lock() = Some(Arc::new(callback));
    }

    /// The session store backing this client.
    #[must_use]
    pub fn session(&self) -> Arc<dyn SessionStore> {
        self.core.session.clone()
    }

    #[must_use]
    pub fn state(&self) -> ClientState {
        self.core.state()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.core.state() == ClientState::Connected
    }

    /// Dials `addr` over TCP and establishes a session.
    ///
    /// Returns a [`ConnectFuture`] that resolves when the CONNACK arrives;
    /// option validation failures and dial errors are returned before any
    /// network effect.
    pub async fn connect(&self, addr: &str, options: ConnectOptions) -> Result<ConnectFuture> {
        options.validate()?;
        match self.core.state() {
            ClientState::Initial | ClientState::Disconnected => {}
            _ => return Err(MqttError::AlreadyConnecting),
        }

        let transport = Transport::tcp(addr).await?;
        self.connect_with(transport, options).await
    }

    /// Establishes a session over an already-dialed transport.
    pub async fn connect_with(
        &self,
        transport: Transport,
        options: ConnectOptions,
    ) -> Result<ConnectFuture> {
        let keep_alive = options.validate()?;
        self.core.begin_connecting()?;
        tracing::debug!(client_id = %options.client_id, "connecting");

        if options.clean_session {
            if let Err(err) = self.core.session.reset() {
                self.core.cleanup(None, TaskKind::Api).await;
                return Err(err);
            }
        }

        let (reader, writer) = transport.split();
        *self.core.writer.lock().await = Some(Encoder::new(writer));
        *self.core.tracker.lock() = Some(Tracker::new(keep_alive));

        let cell = FutureCell::new();
        *self.core.connect_future.lock() = Some(cell.clone());

        let connect = Packet::Connect(options.to_connect_packet(keep_alive));
        if let Err(err) = self.core.send(&connect).await {
            self.core.cleanup(None, TaskKind::Api).await;
            return Err(err);
        }

        let decoder = Decoder::new(reader);
        let reader_core = self.core.clone();
        *self.core.reader_handle.lock() = Some(tokio::spawn(async move {
            reader::receiver_task(reader_core, decoder).await;
        }));

        if keep_alive.is_zero() {
            tracing::debug!("keepalive disabled");
        } else {
            let keepalive_core = self.core.clone();
            *self.core.keepalive_handle.lock() = Some(tokio::spawn(async move {
                keepalive::keepalive_task(keepalive_core, keep_alive).await;
            }));
        }

        Ok(ConnectFuture { cell })
    }

    /// Publishes a message.
    ///
    /// At QoS 0 the returned future is already complete; at QoS 1/2 it
    /// resolves when the broker acknowledges the packet ID.
    pub async fn publish(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
        qos: QoS,
        retain: bool,
    ) -> Result<AckFuture> {
        if self.core.state() != ClientState::Connected {
            return Err(MqttError::NotConnected);
        }

        let message = Message {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain,
        };

        if qos == QoS::AtMostOnce {
            let packet = Packet::Publish(PublishPacket::new(message, None));
            self.core.send(&packet).await?;
            return Ok(AckFuture::ready());
        }

        let packet_id = self.core.session.next_id()?;
        let publish = PublishPacket::new(message, Some(packet_id));
        self.core
            .session
            .save(Direction::Outgoing, Packet::Publish(publish.clone()))?;

        let cell = FutureCell::new();
        self.core.futures.put(packet_id, cell.clone());

        if let Err(err) = self.core.send(&Packet::Publish(publish)).await {
            self.core.futures.delete(packet_id);
            cell.cancel();
            return Err(err);
        }
        Ok(AckFuture::new(cell))
    }

    /// Subscribes to a single topic filter.
    pub async fn subscribe(&self, topic: impl Into<String>, qos: QoS) -> Result<AckFuture> {
        self.subscribe_multiple(vec![Subscription::new(topic, qos)])
            .await
    }

    /// Subscribes to several topic filters in one packet. The future's
    /// [`granted_codes`](AckFuture::granted_codes) carry the broker's
    /// per-filter grants once it resolves.
    pub async fn subscribe_multiple(&self, subscriptions: Vec<Subscription>) -> Result<AckFuture> {
        if self.core.state() != ClientState::Connected {
            return Err(MqttError::NotConnected);
        }

        let packet_id = self.core.session.next_id()?;
        let subscribe = SubscribePacket::new(packet_id, subscriptions);
        self.core
            .session
            .save(Direction::Outgoing, Packet::Subscribe(subscribe.clone()))?;

        let cell = FutureCell::new();
        self.core.futures.put(packet_id, cell.clone());

        if let Err(err) = self.core.send(&Packet::Subscribe(subscribe)).await {
            self.core.futures.delete(packet_id);
            cell.cancel();
            return Err(err);
        }
        Ok(AckFuture::new(cell))
    }

    /// Removes a single subscription.
    pub async fn unsubscribe(&self, topic: impl Into<String>) -> Result<AckFuture> {
        self.unsubscribe_multiple(vec![topic.into()]).await
    }

    /// Removes several subscriptions in one packet.
    pub async fn unsubscribe_multiple(&self, topics: Vec<String>) -> Result<AckFuture> {
        if self.core.state() != ClientState::Connected {
            return Err(MqttError::NotConnected);
        }

        let packet_id = self.core.session.next_id()?;
        let unsubscribe = UnsubscribePacket::new(packet_id, topics);
        self.core
            .session
            .save(Direction::Outgoing, Packet::Unsubscribe(unsubscribe.clone()))?;

        let cell = FutureCell::new();
        self.core.futures.put(packet_id, cell.clone());

        if let Err(err) = self.core.send(&Packet::Unsubscribe(unsubscribe)).await {
            self.core.futures.delete(packet_id);
            cell.cancel();
            return Err(err);
        }
        Ok(AckFuture::new(cell))
    }

    /// Sends DISCONNECT and closes immediately. In-flight operations are
    /// cancelled; their packets stay in the session store for replay.
    pub async fn disconnect(&self) -> Result<()> {
        self.disconnect_timeout(Duration::ZERO).await
    }

    /// Like [`disconnect`](Client::disconnect), but first waits up to
    /// `timeout` for pending acknowledgements to drain.
    pub async fn disconnect_timeout(&self, timeout: Duration) -> Result<()> {
        if self.core.state() != ClientState::Connected {
            return Err(MqttError::NotConnected);
        }
        self.core.set_state(ClientState::Disconnecting);

        if !timeout.is_zero() {
            if let Err(err) = self.core.futures.await_drain(timeout).await {
                tracing::debug!("disconnect drain incomplete: {err}");
            }
        }

        if let Err(err) = self.core.send(&Packet::Disconnect).await {
            tracing::debug!("DISCONNECT not delivered: {err}");
        }
        self.core.cleanup(None, TaskKind::Api).await;
        Ok(())
    }

    /// Closes the transport without sending DISCONNECT.
    pub async fn close(&self) -> Result<()> {
        match self.core.state() {
            ClientState::Connecting | ClientState::Connected | ClientState::Disconnecting => {
                self.core.cleanup(None, TaskKind::Api).await;
                Ok(())
            }
            _ => Err(MqttError::NotConnected),
        }
    }
}
