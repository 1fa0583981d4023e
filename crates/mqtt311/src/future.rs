//! One-shot completion cells and the packet-ID-keyed registry of pending
//! operations.
//!
//! Futures are volatile runtime state: they pair an in-flight request with
//! its acknowledgement and die with the connection. Durable protocol state
//! lives in the session store.

use mqtt311_protocol::{ConnectReturnCode, MqttError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Payload stored in a completed cell.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct FutureValue {
    pub session_present: bool,
    pub return_code: ConnectReturnCode,
    pub granted: Option<Vec<u8>>,
}

impl FutureValue {
    pub(crate) fn ack() -> Self {
        Self::default()
    }

    pub(crate) fn connack(session_present: bool, return_code: ConnectReturnCode) -> Self {
        Self {
            session_present,
            return_code,
            ..Self::default()
        }
    }

    pub(crate) fn suback(granted: Vec<u8>) -> Self {
        Self {
            granted: Some(granted),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FutureState {
    Pending,
    Completed(FutureValue),
    Canceled,
    TimedOut,
}

/// A one-shot completion cell. Once terminal the state never changes; a
/// late completion or cancellation is a no-op.
#[derive(Debug)]
pub(crate) struct FutureCell {
    state: Mutex<FutureState>,
    done: Notify,
}

impl FutureCell {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FutureState::Pending),
            done: Notify::new(),
        })
    }

    pub(crate) fn complete(&self, value: FutureValue) {
        let mut state = self.state.lock();
        if *state == FutureState::Pending {
            *state = FutureState::Completed(value);
            drop(state);
            self.done.notify_waiters();
        }
    }

    pub(crate) fn cancel(&self) {
        let mut state = self.state.lock();
        if *state == FutureState::Pending {
            *state = FutureState::Canceled;
            drop(state);
            self.done.notify_waiters();
        }
    }

    fn terminal(&self) -> Option<Result<FutureValue>> {
        match &*self.state.lock() {
            FutureState::Pending => None,
            FutureState::Completed(value) => Some(Ok(value.clone())),
            FutureState::Canceled => Some(Err(MqttError::FutureCanceled)),
            FutureState::TimedOut => Some(Err(MqttError::FutureTimeout)),
        }
    }

    pub(crate) fn completed_value(&self) -> Option<FutureValue> {
        match &*self.state.lock() {
            FutureState::Completed(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub(crate) async fn wait(&self, timeout: Option<Duration>) -> Result<FutureValue> {
        let deadline = timeout.map(|d| tokio::time::Instant::now() + d);

        loop {
            let notified = self.done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(result) = self.terminal() {
                return result;
            }

            match deadline {
                None => notified.await,
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        let mut state = self.state.lock();
                        if *state == FutureState::Pending {
                            *state = FutureState::TimedOut;
                            drop(state);
                            self.done.notify_waiters();
                            return Err(MqttError::FutureTimeout);
                        }
                        // a completion raced the deadline; loop to observe it
                    }
                }
            }
        }
    }
}

/// Completion handle returned by `Client::connect`.
#[derive(Clone)]
pub struct ConnectFuture {
    pub(crate) cell: Arc<FutureCell>,
}

/// The broker's answer to CONNECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectAck {
    pub session_present: bool,
    pub return_code: ConnectReturnCode,
}

impl ConnectFuture {
    /// Waits for the CONNACK.
    pub async fn wait(&self) -> Result<ConnectAck> {
        self.wait_inner(None).await
    }

    /// Waits for the CONNACK, giving up after `timeout`.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<ConnectAck> {
        self.wait_inner(Some(timeout)).await
    }

    async fn wait_inner(&self, timeout: Option<Duration>) -> Result<ConnectAck> {
        let value = self.cell.wait(timeout).await?;
        Ok(ConnectAck {
            session_present: value.session_present,
            return_code: value.return_code,
        })
    }
}

/// Completion handle for publish, subscribe and unsubscribe operations.
#[derive(Clone)]
pub struct AckFuture {
    pub(crate) cell: Arc<FutureCell>,
}

impl AckFuture {
    pub(crate) fn new(cell: Arc<FutureCell>) -> Self {
        Self { cell }
    }

    /// Completed without waiting, for operations acknowledged synchronously.
    pub(crate) fn ready() -> Self {
        let cell = FutureCell::new();
        cell.complete(FutureValue::ack());
        Self { cell }
    }

    /// Waits for the acknowledgement.
    pub async fn wait(&self) -> Result<()> {
        self.cell.wait(None).await.map(|_| ())
    }

    /// Waits for the acknowledgement, giving up after `timeout`.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        self.cell.wait(Some(timeout)).await.map(|_| ())
    }

    /// Return codes granted by the SUBACK, once a subscribe has completed.
    #[must_use]
    pub fn granted_codes(&self) -> Option<Vec<u8>> {
        self.cell.completed_value().and_then(|value| value.granted)
    }
}

/// Registry of pending futures keyed by packet ID.
pub(crate) struct FutureStore {
    futures: Mutex<HashMap<u16, Arc<FutureCell>>>,
    drained: Notify,
}

impl FutureStore {
    pub(crate) fn new() -> Self {
        Self {
            futures: Mutex::new(HashMap::new()),
            drained: Notify::new(),
        }
    }

    pub(crate) fn put(&self, packet_id: u16, cell: Arc<FutureCell>) {
        self.futures.lock().insert(packet_id, cell);
    }

    pub(crate) fn get(&self, packet_id: u16) -> Option<Arc<FutureCell>> {
        self.futures.lock().get(&packet_id).cloned()
    }

    pub(crate) fn contains(&self, packet_id: u16) -> bool {
        self.futures.lock().contains_key(&packet_id)
    }

    pub(crate) fn delete(&self, packet_id: u16) {
        let mut futures = self.futures.lock();
        futures.remove(&packet_id);
        if futures.is_empty() {
            drop(futures);
            self.drained.notify_waiters();
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.futures.lock().is_empty()
    }

    /// Blocks until the registry is empty or `timeout` elapses.
    pub(crate) async fn await_drain(&self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_empty() {
                return Ok(());
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(MqttError::FutureTimeout);
            }
        }
    }

    /// Cancels every pending future and empties the registry.
    pub(crate) fn cancel_all(&self) {
        let cells: Vec<_> = {
            let mut futures = self.futures.lock();
            futures.drain().map(|(_, cell)| cell).collect()
        };
        for cell in cells {
            cell.cancel();
        }
        self.drained.notify_waiters();
    }
}
