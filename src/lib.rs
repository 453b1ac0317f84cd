//! Connection-pooled client for Deepgram's real-time speech-to-text
//! WebSocket API.
//!
//! The crate keeps a fleet of pre-warmed, keep-alive'd streaming sessions
//! and hands them out on demand:
//!
//! ```no_run
//! use deepgram_pool::{AudioStreamOptions, ConnectionPool, PoolConfig};
//!
//! # async fn demo() -> Result<(), deepgram_pool::DeepgramError> {
//! let options = AudioStreamOptions::new()
//!     .with_encoding("linear16")
//!     .with_sample_rate(16000)?
//!     .with_channels(1)?
//!     .with_model("nova-2");
//!
//! let pool = ConnectionPool::new(
//!     "wss://api.deepgram.com/v1/listen",
//!     std::env::var("DEEPGRAM_API_KEY").unwrap_or_default(),
//!     PoolConfig::default(),
//!     options,
//! )
//! .await?;
//!
//! let connection = pool.acquire().await?;
//! connection.send_audio(vec![0u8; 3200])?;
//! pool.release(&connection)?;
//! pool.close()?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod pool;
pub mod websocket;

// Re-export commonly used items for convenience
pub use error::{DeepgramError, DeepgramResult};
pub use pool::{ConnectionPool, ConnectionState, PoolConfig, PoolMetrics, PooledConnection};
pub use websocket::{AudioStreamOptions, ControlMessage, DeepgramSocket, TranscriptMessage, Word};
