//! Message types.
//!
//! `LogMessage` is what a source worker fills on every read; `TrackedMessage`
//! is what the downstream pipeline receives and acknowledges.

mod log_message;
mod tracked;

// Re-export message types
pub use log_message::LogMessage;
pub use tracked::TrackedMessage;
