use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use wiretap_core::redact::redact_headers;
use wiretap_core::truncate::truncate_body_bytes;
use wiretap_core::{now_millis, CorrelationId, SessionId, TraceConfig, TraceEvent};
use wiretap_sink::{EventSink, Session};

use crate::transport::{join_headers, HttpTransport, Request, Response, TransportError};

// URL paths treated as model API traffic when includeAllRequests is off.
const MODEL_API_PATHS: &[&str] = &["/v1/messages", "/v1/chat/completions", "/v1/complete"];

/// Decorator around a network-send capability that records each call as an
/// `HttpRequest` followed by exactly one `HttpResponse` or `HttpError`
/// sharing a fresh correlation id.
///
/// Purely observational: the request reaches the inner transport untouched,
/// the response (or error) returns to the caller untouched, and redaction
/// and truncation apply only to the logged copies.
pub struct RecordingTransport<T: HttpTransport> {
    inner: T,
    sink: Arc<EventSink>,
    config: TraceConfig,
    session_id: SessionId,
}

impl<T: HttpTransport> RecordingTransport<T> {
    pub fn new(inner: T, session: &Session, sink: Arc<EventSink>) -> Self {
        Self {
            inner,
            sink,
            config: session.config.clone(),
            session_id: session.id.clone(),
        }
    }

    fn should_capture(&self, request: &Request) -> bool {
        if !self.config.enabled {
            return false;
        }
        self.config.include_all_requests || is_model_api_url(&request.url)
    }

    fn request_event(&self, correlation_id: &CorrelationId, request: &Request) -> TraceEvent {
        let headers = redact_headers(
            &join_headers(&request.headers),
            &self.config.sensitive_header_names,
        );

        // Sliced to the capture limit before decoding, so buffering stays
        // within max_body_size even for huge bodies.
        let body = match &request.body {
            Some(bytes) if self.config.capture_request_bodies && !bytes.is_empty() => {
                Some(truncate_body_bytes(bytes, self.config.max_body_size))
            }
            _ => None,
        };

        TraceEvent::HttpRequest {
            timestamp_millis: now_millis(),
            session_id: self.session_id.clone(),
            correlation_id: correlation_id.clone(),
            method: request.method.clone(),
            url: request.url.clone(),
            headers,
            body,
            content_type: request.header_value("content-type").map(str::to_string),
            user_agent: request.header_value("user-agent").map(str::to_string),
        }
    }

    fn response_event(
        &self,
        correlation_id: &CorrelationId,
        response: &Response,
        elapsed: Duration,
    ) -> TraceEvent {
        // Response headers carry no caller secrets; logged as-is.
        let headers = join_headers(&response.headers);

        let body = if self.config.capture_response_bodies && !response.body.is_empty() {
            Some(truncate_body_bytes(&response.body, self.config.max_body_size))
        } else {
            None
        };

        TraceEvent::HttpResponse {
            timestamp_millis: now_millis(),
            session_id: self.session_id.clone(),
            correlation_id: correlation_id.clone(),
            status_code: response.status,
            status_text: response.status_text.clone(),
            headers,
            body,
            content_type: response.header_value("content-type").map(str::to_string),
            response_size_bytes: response.body.len() as u64,
            duration_millis: elapsed.as_millis() as u64,
            success: is_success(response.status),
        }
    }
}

#[async_trait]
impl<T: HttpTransport> HttpTransport for RecordingTransport<T> {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        if !self.should_capture(&request) {
            return self.inner.send(request).await;
        }

        let correlation_id = CorrelationId::new();
        let start = Instant::now();
        debug!(correlation_id = %correlation_id, method = %request.method, url = %request.url, "recording http call");

        self.sink.append(&self.request_event(&correlation_id, &request));

        let method = request.method.clone();
        let url = request.url.clone();

        match self.inner.send(request).await {
            Ok(response) => {
                self.sink
                    .append(&self.response_event(&correlation_id, &response, start.elapsed()));
                Ok(response)
            }
            Err(err) => {
                self.sink.append(&TraceEvent::HttpError {
                    timestamp_millis: now_millis(),
                    session_id: self.session_id.clone(),
                    correlation_id,
                    method,
                    url,
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }
}

pub(crate) fn is_success(status: u16) -> bool {
    (200..400).contains(&status)
}

fn is_model_api_url(url: &str) -> bool {
    MODEL_API_PATHS.iter().any(|p| url.contains(p))
}
