//! Render sessions: budgets, pacing, cancellation and the threaded frame stream.

/// Cooperative cancellation flag.
pub mod cancel;
/// Budgets, pacing and presets.
pub mod config;
/// The synchronous session driver.
pub mod render_session;
/// A session on its own thread, consumed as an iterator.
pub mod stream;
