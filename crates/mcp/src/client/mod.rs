//! Provider connections.
//!
//! Transports sit behind the [`ProviderConnector`]/[`ProviderSession`] traits; the rmcp-backed
//! implementation speaks the Model Context Protocol over a child process's stdio or over
//! streamable HTTP. [`ConnectionManager`] owns the live sessions, serializes acquisition per
//! provider, probes liveness and applies retry with backoff to calls.

mod http;
mod manager;
mod retry;
mod session;
mod stdio;
mod transport;

pub use transport::{RmcpConnector, RmcpSession};
pub use manager::{CallOutcome, ConnectionManager, ProviderHandle};
pub use retry::RetryPolicy;
pub use session::{ProviderConnector, ProviderSession, RemoteOperation};
