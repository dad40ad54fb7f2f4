pub mod classify;
pub mod config;
pub mod events;
pub mod ids;
pub mod redact;
pub mod truncate;

pub use classify::{classify_command, ToolClass};
pub use config::TraceConfig;
pub use events::{now_millis, OutputStream, TraceEvent};
pub use ids::{CorrelationId, ExecutionId, SessionId};
