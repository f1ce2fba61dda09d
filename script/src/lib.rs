pub mod engine;
pub mod log;

pub use engine::{execute, ExecutionContext, ExecutionResult, MAX_SCRIPT_BYTES};
pub use log::{LogBuffer, LogEntry, LogLevel, MAX_LOG_ENTRIES};
