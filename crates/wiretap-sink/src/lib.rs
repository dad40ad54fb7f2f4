pub mod error;
pub mod session;
pub mod sink;

pub use error::SinkError;
pub use session::Session;
pub use sink::EventSink;
