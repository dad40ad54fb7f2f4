pub mod client;
pub mod mock;
pub mod recording;
pub mod transport;

pub use client::ReqwestTransport;
pub use mock::{MockReply, MockTransport};
pub use recording::RecordingTransport;
pub use transport::{HttpTransport, Request, Response, TransportError};
