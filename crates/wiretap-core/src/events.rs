use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::classify::ToolClass;
use crate::ids::{CorrelationId, ExecutionId, SessionId};

/// Wall-clock timestamp for event construction, in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Which output stream a tool output chunk came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One captured side effect of the instrumented program.
///
/// Serialized as one JSON object per line; the variant tag lands in the
/// `type` field and payload fields use the downstream consumers' camelCase
/// names. Events are immutable once constructed and never rewritten in the
/// log.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    #[serde(rename_all = "camelCase")]
    HttpRequest {
        timestamp_millis: i64,
        session_id: SessionId,
        correlation_id: CorrelationId,
        method: String,
        url: String,
        /// Redacted before construction; joined when multi-valued.
        headers: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_agent: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    HttpResponse {
        timestamp_millis: i64,
        session_id: SessionId,
        correlation_id: CorrelationId,
        status_code: u16,
        status_text: String,
        headers: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
        /// Decoded byte length before truncation.
        response_size_bytes: u64,
        duration_millis: u64,
        success: bool,
    },

    #[serde(rename_all = "camelCase")]
    HttpError {
        timestamp_millis: i64,
        session_id: SessionId,
        correlation_id: CorrelationId,
        method: String,
        url: String,
        message: String,
    },

    #[serde(rename_all = "camelCase")]
    ToolExecutionStart {
        timestamp_millis: i64,
        session_id: SessionId,
        execution_id: ExecutionId,
        command: String,
        args: Vec<String>,
        /// Deep copy of the spawn options with secret env values redacted.
        sanitized_options: serde_json::Value,
        tool_class: ToolClass,
    },

    /// Debug-mode only: one event per observed output chunk.
    #[serde(rename_all = "camelCase")]
    ToolOutput {
        timestamp_millis: i64,
        session_id: SessionId,
        execution_id: ExecutionId,
        command: String,
        chunk: String,
        stream: OutputStream,
    },

    #[serde(rename_all = "camelCase")]
    ToolExecutionComplete {
        timestamp_millis: i64,
        session_id: SessionId,
        execution_id: ExecutionId,
        command: String,
        stdout_captured: String,
        stderr_captured: String,
        duration_millis: u64,
        exit_code: i32,
    },

    #[serde(rename_all = "camelCase")]
    ToolExecutionError {
        timestamp_millis: i64,
        session_id: SessionId,
        execution_id: ExecutionId,
        command: String,
        message: String,
        duration_millis: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signal: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stdout_captured: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stderr_captured: Option<String>,
    },
}

impl TraceEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::HttpRequest { session_id, .. }
            | Self::HttpResponse { session_id, .. }
            | Self::HttpError { session_id, .. }
            | Self::ToolExecutionStart { session_id, .. }
            | Self::ToolOutput { session_id, .. }
            | Self::ToolExecutionComplete { session_id, .. }
            | Self::ToolExecutionError { session_id, .. } => session_id,
        }
    }

    pub fn timestamp_millis(&self) -> i64 {
        match self {
            Self::HttpRequest { timestamp_millis, .. }
            | Self::HttpResponse { timestamp_millis, .. }
            | Self::HttpError { timestamp_millis, .. }
            | Self::ToolExecutionStart { timestamp_millis, .. }
            | Self::ToolOutput { timestamp_millis, .. }
            | Self::ToolExecutionComplete { timestamp_millis, .. }
            | Self::ToolExecutionError { timestamp_millis, .. } => *timestamp_millis,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::HttpRequest { .. } => "http_request",
            Self::HttpResponse { .. } => "http_response",
            Self::HttpError { .. } => "http_error",
            Self::ToolExecutionStart { .. } => "tool_execution_start",
            Self::ToolOutput { .. } => "tool_output",
            Self::ToolExecutionComplete { .. } => "tool_execution_complete",
            Self::ToolExecutionError { .. } => "tool_execution_error",
        }
    }
}
