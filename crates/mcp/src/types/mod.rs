//! Runtime types shared by the connection, schema and logging layers.

mod errors;
mod log;
mod status;

pub use errors::{CallError, ConnectionError, LogError};
pub use log::{LogLevel, LogSource, ProviderLogEntry};
pub use status::{ConnectionState, HealthStatus, ProviderStatus};
