use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::transport::{HttpTransport, Request, Response, TransportError};

/// Pre-programmed replies for deterministic testing without network calls.
pub enum MockReply {
    Respond(Response),
    Fail(TransportError),
    /// Wait a duration, then yield the inner reply.
    Delay(Duration, Box<MockReply>),
}

impl MockReply {
    /// Convenience: a response with the given status and body and no headers.
    pub fn status(status: u16, body: impl Into<Bytes>) -> Self {
        Self::Respond(Response {
            status,
            status_text: canonical_reason(status).to_string(),
            headers: Vec::new(),
            body: body.into(),
        })
    }

    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::status(200, body)
    }

    pub fn delayed(delay: Duration, inner: MockReply) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

fn canonical_reason(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
}

/// Mock transport that consumes scripted replies in order and records every
/// request it is handed, so tests can assert byte-identical pass-through.
pub struct MockTransport {
    replies: Mutex<VecDeque<MockReply>>,
    seen: Mutex<Vec<Request>>,
    call_count: AtomicUsize,
}

impl MockTransport {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Requests received so far, in order.
    pub fn seen(&self) -> Vec<Request> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.seen.lock().push(request);

        let mut reply = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| MockReply::Fail(TransportError::Network("no scripted reply".into())));

        while let MockReply::Delay(delay, inner) = reply {
            tokio::time::sleep(delay).await;
            reply = *inner;
        }

        match reply {
            MockReply::Respond(resp) => Ok(resp),
            MockReply::Fail(err) => Err(err),
            MockReply::Delay(..) => unreachable!("delays unwrapped above"),
        }
    }
}
