use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model endpoint unreachable: {message}")]
    Network { message: String },
    #[error("model endpoint returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("model call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("ANTHROPIC_API_KEY not set")]
    MissingApiKey,
    #[error("undecodable model reply: {message}")]
    Decode { message: String },
}

/// The external text-generation oracle.
///
/// One call per prompt, no retries. Implementations return the concatenated text of the
/// reply and isolate all transport failures into [`ModelError`].
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<String, ModelError>;

    fn model_name(&self) -> &str;
}
