//! Request-scoped structured logging: field loggers, per-request log
//! entries, the context store that carries them, and the ambient pieces
//! (config, errors, tracing init) shared by the server crate.

pub mod config;
pub mod context;
pub mod counter;
pub mod entry;
pub mod error;
pub mod fields;
pub mod level;
pub mod lifecycle;
pub mod logger;
pub mod panic;
pub mod sink;

pub use context::LogContext;
pub use entry::{EntryHandle, LogEntry, RequestId, RequestMetadata};
pub use level::LogLevel;
pub use logger::{FieldLogger, Fields, Logger};
pub use sink::{LogRecord, LogSink, MemorySink, TracingSink};
