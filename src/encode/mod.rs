//! Delivery channel: sinks that consume frames in order as a session produces them.

/// Batch and terminal line sinks.
pub mod lines;
/// Generic frame sink trait plus in-memory and channel sinks.
pub mod sink;
/// Server-sent-events preview wire and its decoder.
pub mod sse;
