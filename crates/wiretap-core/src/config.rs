use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Immutable capture configuration, snapshotted once per session.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TraceConfig {
    /// Master switch. When false, tracers delegate without capturing.
    pub enabled: bool,
    /// Upper bound (bytes) on captured HTTP bodies. The real call always
    /// sees the full body; only the logged copy is truncated.
    pub max_body_size: usize,
    pub capture_request_bodies: bool,
    pub capture_response_bodies: bool,
    /// Extra header names to redact, unioned with the built-in set.
    pub sensitive_header_names: HashSet<String>,
    /// Timeout applied by the real transport, not by the tracer.
    #[serde(with = "duration_ms")]
    pub call_timeout: Duration,
    /// Capture every request, not just model API calls.
    pub include_all_requests: bool,
    /// Emit per-chunk tool output events and surface swallowed sink errors.
    pub debug: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_body_size: 1024 * 1024,
            capture_request_bodies: true,
            capture_response_bodies: true,
            sensitive_header_names: HashSet::new(),
            call_timeout: Duration::from_secs(600),
            include_all_requests: false,
            debug: false,
        }
    }
}

/// Serde helper for Duration as milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}
