use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::transport::{HttpTransport, Request, Response, TransportError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// The real network-send capability, backed by a shared `reqwest::Client`.
/// The configured call timeout lives here; decorators add none of their own.
pub struct ReqwestTransport {
    client: Client,
    call_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(call_timeout)
                .build()
                .expect("failed to build HTTP client"),
            call_timeout,
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("method {}: {e}", request.method)))?;
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| TransportError::InvalidRequest(format!("url {}: {e}", request.url)))?;

        let mut req = self.client.request(method, url);
        for (name, value) in &request.headers {
            req = req.header(name, value);
        }
        if let Some(body) = request.body {
            req = req.body(body);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(self.call_timeout)
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let status = resp.status();
        let headers = resp
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        // The response stream is read exactly once, here; everyone
        // downstream works from the materialized bytes.
        let body = resp.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(self.call_timeout)
            } else {
                TransportError::Network(format!("reading body: {e}"))
            }
        })?;

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Request;

    #[tokio::test]
    async fn rejects_malformed_method() {
        let transport = ReqwestTransport::new(Duration::from_secs(5));
        let err = transport
            .send(Request::new("NOT A METHOD", "https://example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn rejects_malformed_url() {
        let transport = ReqwestTransport::new(Duration::from_secs(5));
        let err = transport
            .send(Request::get("not a url"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
    }
}
