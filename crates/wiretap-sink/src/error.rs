/// Errors on the sink's own surface. Only [`SinkError::Init`] ever reaches
/// instrumentation setup; append-path failures are swallowed so tracing can
/// never break the instrumented call.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to initialize session log: {0}")]
    Init(String),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("write error: {0}")]
    Write(String),
}
