//! Pool lifecycle wrapper around a [`DeepgramSocket`].
//!
//! A [`PooledConnection`] adds three things to a raw socket: an
//! IDLE/ACTIVE/CLOSED state machine driven by atomic compare-and-swap, a
//! periodic application-level KeepAlive, and an idle-timeout watchdog. The
//! socket itself stays oblivious to pool policy.
//!
//! Timer tasks and socket handlers hold only weak references to the wrapper;
//! the pool is the sole owner of both the wrapper and the socket.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::metrics::PoolMetrics;
use crate::error::{DeepgramError, DeepgramResult};
use crate::websocket::{ControlMessage, DeepgramSocket};

/// Lifecycle states of a pooled connection.
///
/// Legal transitions are IDLE↔ACTIVE and {IDLE, ACTIVE}→CLOSED; CLOSED is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Parked in the pool, not handed out.
    Idle,
    /// Checked out by a caller for streaming.
    Active,
    /// Retired; the underlying socket is disconnected.
    Closed,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Active,
            _ => Self::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Active => 1,
            Self::Closed => 2,
        }
    }
}

struct Inner {
    socket: Arc<DeepgramSocket>,
    metrics: Arc<PoolMetrics>,
    state: AtomicU8,
    /// Anchor for the millisecond clocks below.
    created: Instant,
    last_activity_ms: AtomicU64,
    activated_at_ms: AtomicU64,
    keep_alive_task: Mutex<Option<JoinHandle<()>>>,
    idle_check_task: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn now_ms(&self) -> u64 {
        self.created.elapsed().as_millis() as u64
    }

    fn touch(&self) {
        self.last_activity_ms.store(self.now_ms(), Ordering::SeqCst);
    }

    fn idle_elapsed(&self) -> Duration {
        let last = self.last_activity_ms.load(Ordering::SeqCst);
        Duration::from_millis(self.now_ms().saturating_sub(last))
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn transition(
        &self,
        from: ConnectionState,
        to: ConnectionState,
        message: &str,
    ) -> DeepgramResult<()> {
        self.state
            .compare_exchange(
                from.as_u8(),
                to.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(|_| DeepgramError::IllegalState(message.to_string()))
    }

    /// Terminal transition. The first closer cancels both timers and
    /// disconnects the socket; later calls are no-ops.
    fn close(&self) {
        let previous = self.state.swap(ConnectionState::Closed.as_u8(), Ordering::SeqCst);
        if previous == ConnectionState::Closed.as_u8() {
            return;
        }

        abort_task(&self.keep_alive_task);
        abort_task(&self.idle_check_task);
        self.socket.disconnect();
        self.metrics.record_connection_closed();
        debug!("Pooled connection closed");
    }
}

fn abort_task(slot: &Mutex<Option<JoinHandle<()>>>) {
    if let Ok(mut guard) = slot.lock() {
        if let Some(handle) = guard.take() {
            handle.abort();
        }
    }
}

/// A [`DeepgramSocket`] with a pool-friendly lifecycle.
///
/// Handles are cheap to clone; all clones refer to the same connection.
#[derive(Clone)]
pub struct PooledConnection {
    inner: Arc<Inner>,
}

impl PooledConnection {
    /// Wrap a socket. Installs error/close handlers on it and starts the
    /// keep-alive and idle-timeout timers (a zero interval disables the
    /// corresponding timer).
    pub fn new(
        socket: Arc<DeepgramSocket>,
        metrics: Arc<PoolMetrics>,
        keep_alive_interval: Duration,
        idle_timeout: Duration,
    ) -> Self {
        let inner = Arc::new(Inner {
            socket: socket.clone(),
            metrics,
            state: AtomicU8::new(ConnectionState::Idle.as_u8()),
            created: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
            activated_at_ms: AtomicU64::new(0),
            keep_alive_task: Mutex::new(None),
            idle_check_task: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        socket.set_on_error(Arc::new(move |description| {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    error!("Connection error: {description}");
                    inner.metrics.record_error();
                    inner.close();
                }
            })
        }));

        let weak = Arc::downgrade(&inner);
        socket.set_on_close(Arc::new(move |code| {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    info!("Connection closed with code {code}");
                    inner.close();
                }
            })
        }));

        if let Ok(mut guard) = inner.keep_alive_task.lock() {
            *guard = spawn_keep_alive(&inner, keep_alive_interval);
        }
        if let Ok(mut guard) = inner.idle_check_task.lock() {
            *guard = spawn_idle_check(&inner, idle_timeout);
        }

        Self { inner }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// The underlying socket, for callback wiring by advanced callers.
    pub fn socket(&self) -> &Arc<DeepgramSocket> {
        &self.inner.socket
    }

    /// Hand the connection to a caller: IDLE → ACTIVE.
    ///
    /// Initiates a background connect when the socket has never been opened.
    pub fn activate(&self) -> DeepgramResult<()> {
        self.inner.transition(
            ConnectionState::Idle,
            ConnectionState::Active,
            "Connection is not in IDLE state",
        )?;

        if !self.inner.socket.is_connected() {
            let socket = self.inner.socket.clone();
            tokio::spawn(async move {
                if let Err(e) = socket.connect().await {
                    error!("Background connect failed: {e}");
                }
            });
        }

        self.inner.touch();
        self.inner
            .activated_at_ms
            .store(self.inner.now_ms(), Ordering::SeqCst);
        self.inner.metrics.record_connection_acquired();
        Ok(())
    }

    /// Park the connection again: ACTIVE → IDLE.
    pub fn release(&self) -> DeepgramResult<()> {
        self.inner.transition(
            ConnectionState::Active,
            ConnectionState::Idle,
            "Connection is not in ACTIVE state",
        )?;

        let held = self
            .inner
            .now_ms()
            .saturating_sub(self.inner.activated_at_ms.load(Ordering::SeqCst));
        self.inner.touch();
        self.inner.metrics.record_connection_released();
        self.inner.metrics.record_usage_time(held);
        Ok(())
    }

    /// Stream audio through the wrapped socket. Requires ACTIVE state and an
    /// established connection.
    pub fn send_audio(&self, audio_data: Vec<u8>) -> DeepgramResult<()> {
        if self.state() != ConnectionState::Active {
            return Err(DeepgramError::IllegalState(
                "Connection is not in ACTIVE state".to_string(),
            ));
        }
        if !self.inner.socket.is_connected() {
            return Err(DeepgramError::IllegalState(
                "Connection is not established".to_string(),
            ));
        }
        self.inner.socket.send_audio(audio_data)?;
        self.inner.touch();
        Ok(())
    }

    /// Retire the connection. Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Whether two handles refer to the same pooled connection.
    pub(crate) fn same_connection(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

fn spawn_keep_alive(inner: &Arc<Inner>, interval: Duration) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }

    let weak: Weak<Inner> = Arc::downgrade(inner);
    Some(tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else { break };
            if inner.state() == ConnectionState::Closed {
                break;
            }

            match inner.socket.send_control(&ControlMessage::KeepAlive) {
                Ok(()) => {
                    inner.metrics.record_keep_alive_sent();
                    debug!("Sent keep-alive");
                }
                Err(e) => {
                    warn!("Keep-alive failed: {e}");
                    inner.metrics.record_error();
                    inner.close();
                    break;
                }
            }
        }
    }))
}

fn spawn_idle_check(inner: &Arc<Inner>, idle_timeout: Duration) -> Option<JoinHandle<()>> {
    if idle_timeout.is_zero() {
        return None;
    }

    let weak: Weak<Inner> = Arc::downgrade(inner);
    Some(tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + idle_timeout, idle_timeout);
        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else { break };
            if inner.state() == ConnectionState::Closed {
                break;
            }

            if inner.state() == ConnectionState::Idle && inner.idle_elapsed() >= idle_timeout {
                info!(
                    "Closing connection idle for {} ms",
                    inner.idle_elapsed().as_millis()
                );
                inner.metrics.record_timeout_closure();
                inner.close();
                break;
            }
        }
    }))
}
