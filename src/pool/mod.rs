//! Connection pooling: configuration, metrics, the pooled-connection
//! lifecycle wrapper, and the pool itself.

pub mod config;
pub mod connection;
pub mod metrics;
#[allow(clippy::module_inception)]
pub mod pool;

pub use config::PoolConfig;
pub use connection::{ConnectionState, PooledConnection};
pub use metrics::{PoolMetrics, UNSET_MIN};
pub use pool::ConnectionPool;
