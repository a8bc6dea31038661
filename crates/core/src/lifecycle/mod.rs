//! Process lifecycle: tracing initialization and shutdown signals.

pub mod logging;
pub mod signal;
