//! Model token-source module.
//!
//! This module defines the `TextGenerator` trait that abstracts over the
//! two streaming inference endpoints the pipeline talks to (plan
//! generation and summarization), and the concrete TGI implementation.
//!
//! The error type is deliberately not `anyhow`: the orchestrator has to
//! match on `InputTooLong` to drive the summary truncate-and-retry
//! loop, so the rejection must stay a distinguished variant.

pub mod tgi;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Decoding parameters for one generation request.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f64,
    pub stop: Vec<String>,
}

impl GenerationParams {
    /// Greedy, short, stops at the plan end marker.
    pub fn plan() -> Self {
        Self {
            max_new_tokens: 200,
            temperature: 0.001,
            stop: vec![crate::prompt::PLAN_STOP_MARKER.to_string()],
        }
    }

    /// Greedy, long-form; the turn-end marker is stripped by the
    /// consumer rather than used as a server-side stop.
    pub fn summary() -> Self {
        Self {
            max_new_tokens: 1000,
            temperature: 0.001,
            stop: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    /// The endpoint rejected the prompt as over-long. Consumed by the
    /// summary retry loop; never shown to the user directly.
    #[error("input rejected as too long: {0}")]
    InputTooLong(String),
    #[error("generation endpoint error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed stream: {0}")]
    Stream(String),
}

/// Trait for a streaming text-generation endpoint.
///
/// Fragments are pushed into `token_tx` as they arrive; the accumulated
/// full text is returned when the stream ends. Dropping the receiving
/// side is fine — sends are best-effort.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_stream(
        &self,
        prompt: &str,
        params: &GenerationParams,
        token_tx: mpsc::UnboundedSender<String>,
    ) -> Result<String, GenerationError>;

    /// The endpoint's display name (for logging).
    fn name(&self) -> &str;
}
