//! Bounded pool of pre-warmed transcription connections.
//!
//! The pool owns every [`PooledConnection`] it creates. Callers borrow one
//! through [`acquire`](ConnectionPool::acquire), stream through it, and give
//! it back with [`release`](ConnectionPool::release) (or retire it with the
//! connection's own `close`). Connections that close themselves — transport
//! error, idle timeout, server-side close — are discovered and discarded the
//! next time the idle queue is polled.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::config::PoolConfig;
use super::connection::{ConnectionState, PooledConnection};
use super::metrics::PoolMetrics;
use crate::error::{DeepgramError, DeepgramResult};
use crate::websocket::{AudioStreamOptions, DeepgramSocket};

/// Upper bound on one sleep inside the acquire poll loop.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A bounded, metered pool of Deepgram streaming connections.
pub struct ConnectionPool {
    url: String,
    api_key: String,
    config: PoolConfig,
    options: AudioStreamOptions,
    metrics: Arc<PoolMetrics>,
    idle: Mutex<VecDeque<PooledConnection>>,
    active: Mutex<Vec<PooledConnection>>,
    shutdown: AtomicBool,
}

impl ConnectionPool {
    /// Build a pool and eagerly create `initial_size` connections.
    ///
    /// Initial-connection failures are logged and counted in metrics but do
    /// not fail construction; the pool fills back up on demand.
    pub async fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        config: PoolConfig,
        options: AudioStreamOptions,
    ) -> DeepgramResult<Self> {
        let url = url.into();
        let api_key = api_key.into();
        if url.trim().is_empty() {
            return Err(DeepgramError::InvalidArgument(
                "URL cannot be empty".to_string(),
            ));
        }
        if api_key.trim().is_empty() {
            return Err(DeepgramError::InvalidArgument(
                "API key cannot be empty".to_string(),
            ));
        }

        let pool = Self {
            url,
            api_key,
            config,
            options,
            metrics: Arc::new(PoolMetrics::new()),
            idle: Mutex::new(VecDeque::new()),
            active: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
        };

        for _ in 0..pool.config.initial_size() {
            match pool.create_connection().await {
                Ok(connection) => lock(&pool.idle).push_back(connection),
                Err(e) => error!("Error creating initial connection: {e}"),
            }
        }

        Ok(pool)
    }

    /// Borrow a connection, waiting up to the configured acquire timeout.
    ///
    /// Idle connections are handed out FIFO; closed ones found in the queue
    /// are discarded. Below the size cap a fresh connection is created on
    /// demand. The returned connection is in ACTIVE state.
    pub async fn acquire(&self) -> DeepgramResult<PooledConnection> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(DeepgramError::IllegalState(
                "Connection pool is shut down".to_string(),
            ));
        }

        let start = Instant::now();
        let deadline = self.config.acquire_timeout();
        let mut candidate: Option<PooledConnection> = None;

        while start.elapsed() < deadline {
            if let Some(connection) = lock(&self.idle).pop_front() {
                if connection.state() == ConnectionState::Closed {
                    // Stale entry; drop it and poll again.
                    debug!("Discarding closed connection from idle queue");
                    continue;
                }
                candidate = Some(connection);
                break;
            }

            if self.total_connections() < self.config.max_size() {
                candidate = Some(self.create_connection().await?);
                break;
            }

            let remaining = deadline.saturating_sub(start.elapsed());
            tokio::time::sleep(remaining.min(POLL_INTERVAL)).await;
        }

        let Some(connection) = candidate else {
            self.metrics.record_acquisition_timeout();
            return Err(DeepgramError::AcquireTimeout(
                "Failed to acquire connection within timeout".to_string(),
            ));
        };

        if let Err(e) = connection.activate() {
            lock(&self.idle).push_back(connection);
            return Err(e);
        }

        lock(&self.active).push(connection.clone());
        self.metrics
            .record_acquisition_time(start.elapsed().as_millis() as u64);
        Ok(connection)
    }

    /// Return a borrowed connection to the pool.
    ///
    /// A connection that fails to transition back to IDLE is closed instead
    /// of being re-queued.
    pub fn release(&self, connection: &PooledConnection) -> DeepgramResult<()> {
        let removed = {
            let mut active = lock(&self.active);
            match active
                .iter()
                .position(|held| held.same_connection(connection))
            {
                Some(index) => {
                    active.remove(index);
                    true
                }
                None => false,
            }
        };
        if !removed {
            return Err(DeepgramError::IllegalState(
                "Connection is not from this pool".to_string(),
            ));
        }

        match connection.release() {
            Ok(()) => {
                lock(&self.idle).push_back(connection.clone());
                Ok(())
            }
            Err(e) => {
                error!("Error releasing connection: {e}");
                connection.close();
                Ok(())
            }
        }
    }

    /// Shut the pool down, closing every connection.
    ///
    /// Shutdown is a one-shot event: a second call is an error.
    pub fn close(&self) -> DeepgramResult<()> {
        if self
            .shutdown
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DeepgramError::IllegalState(
                "Connection pool is already shut down".to_string(),
            ));
        }

        info!("Shutting down connection pool");
        let idle: Vec<PooledConnection> = lock(&self.idle).drain(..).collect();
        let active: Vec<PooledConnection> = std::mem::take(&mut *lock(&self.active));
        for connection in idle.iter().chain(active.iter()) {
            connection.close();
        }
        Ok(())
    }

    pub fn idle_count(&self) -> usize {
        lock(&self.idle).len()
    }

    pub fn active_count(&self) -> usize {
        lock(&self.active).len()
    }

    pub fn total_connections(&self) -> usize {
        self.idle_count() + self.active_count()
    }

    /// Read-only handle to the pool metrics.
    pub fn metrics(&self) -> Arc<PoolMetrics> {
        self.metrics.clone()
    }

    /// Create and connect a fresh session, retrying per the configured retry
    /// policy. The final failure is recorded in metrics and propagated.
    async fn create_connection(&self) -> DeepgramResult<PooledConnection> {
        let mut attempt = 0;
        loop {
            match self.try_create().await {
                Ok(connection) => return Ok(connection),
                Err(e) if attempt < self.config.max_retries() => {
                    attempt += 1;
                    warn!(
                        "Connect attempt {attempt}/{} failed: {e}; retrying",
                        self.config.max_retries() + 1
                    );
                    tokio::time::sleep(self.config.retry_delay()).await;
                }
                Err(e) => {
                    self.metrics.record_error();
                    return Err(e);
                }
            }
        }
    }

    async fn try_create(&self) -> DeepgramResult<PooledConnection> {
        let mut socket = DeepgramSocket::new(self.url.as_str(), self.api_key.as_str())?;
        socket.set_options(&self.options);

        // Connect-window handlers only; the pooled wrapper replaces them.
        socket.set_on_error(Arc::new(|description| {
            Box::pin(async move {
                error!("Connection error during initialization: {description}");
            })
        }));
        socket.set_on_close(Arc::new(|code| {
            Box::pin(async move {
                debug!("Connection closed during initialization with code: {code}");
            })
        }));

        let socket = Arc::new(socket);
        match timeout(self.config.acquire_timeout(), socket.connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(DeepgramError::ConnectionFailed(
                    "Timed out establishing connection".to_string(),
                ));
            }
        }

        let connection = PooledConnection::new(
            socket,
            self.metrics.clone(),
            self.config.keep_alive_interval(),
            self.config.connection_timeout(),
        );
        self.metrics.record_connection_created();
        Ok(connection)
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        // Best-effort cleanup for pools dropped without an explicit close.
        let _ = self.close();
    }
}
