//! Log capture for providers.

mod manager;
mod ring_buffer;

pub use manager::{LogManager, sanitize_log_text};
pub use ring_buffer::LogRingBuffer;
