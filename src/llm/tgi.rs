//! Text-generation-inference (TGI) streaming client.
//!
//! Talks to a hosted `/generate_stream` endpoint and forwards token
//! fragments as they arrive. The SSE framing is parsed by hand over the
//! response byte stream: buffer bytes, cut on newlines, keep the
//! payload of `data:` lines.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;

use super::{GenerationError, GenerationParams, TextGenerator};

pub struct TgiGenerator {
    endpoint: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

// --- Stream payload types ---

#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    token: Option<TokenChunk>,
    #[serde(default)]
    generated_text: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_type: Option<String>,
}

#[derive(Deserialize, Debug)]
struct TokenChunk {
    text: String,
    #[serde(default)]
    special: bool,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    error: String,
    #[serde(default)]
    error_type: Option<String>,
}

/// The payload of one SSE line, if it is a data line.
fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn is_validation(error_type: Option<&str>) -> bool {
    matches!(error_type, Some("validation"))
}

impl TgiGenerator {
    pub fn new(endpoint: String, auth_token: Option<String>) -> Self {
        Self {
            endpoint,
            auth_token,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TextGenerator for TgiGenerator {
    async fn generate_stream(
        &self,
        prompt: &str,
        params: &GenerationParams,
        token_tx: mpsc::UnboundedSender<String>,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/generate_stream", self.endpoint.trim_end_matches('/'));
        let body = json!({
            "inputs": prompt,
            "parameters": {
                "max_new_tokens": params.max_new_tokens,
                "do_sample": false,
                "temperature": params.temperature,
                "return_full_text": false,
                "stop": params.stop,
            },
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.auth_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if let Ok(api_error) = serde_json::from_str::<ApiError>(&text) {
                if status.as_u16() == 422 || is_validation(api_error.error_type.as_deref()) {
                    return Err(GenerationError::InputTooLong(api_error.error));
                }
                return Err(GenerationError::Api {
                    status: status.as_u16(),
                    message: api_error.error,
                });
            }
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut generated = String::new();

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk_bytes = chunk_result?;
            buffer.push_str(&String::from_utf8_lossy(&chunk_bytes));

            while let Some(newline_pos) = buffer.find('\n') {
                let line = buffer[..newline_pos].trim_end_matches('\r').to_string();
                buffer = buffer[newline_pos + 1..].to_string();

                let Some(payload) = data_payload(&line) else {
                    continue;
                };
                if payload.is_empty() {
                    continue;
                }

                let chunk: StreamChunk = serde_json::from_str(payload)
                    .map_err(|e| GenerationError::Stream(format!("bad chunk: {}", e)))?;

                if let Some(error) = chunk.error {
                    if is_validation(chunk.error_type.as_deref()) {
                        return Err(GenerationError::InputTooLong(error));
                    }
                    return Err(GenerationError::Stream(error));
                }

                if let Some(token) = chunk.token {
                    if !token.special && !token.text.is_empty() {
                        generated.push_str(&token.text);
                        let _ = token_tx.send(token.text);
                    }
                }

                // The final chunk repeats the whole generation; prefer
                // it to the token accumulation when present.
                if let Some(full) = chunk.generated_text {
                    debug!(chars = full.len(), "generation complete");
                    generated = full;
                }
            }
        }

        Ok(generated)
    }

    fn name(&self) -> &str {
        "TGI"
    }
}
