//! Inference backend client: streams chat completions from a local Ollama-compatible service.
//!
//! The backend answers `POST /api/chat` with newline-delimited JSON, one object per chunk,
//! the last one carrying `"done": true`.

use crate::config::InferenceConfig;
use crate::error::{CoreError, CoreResult};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// One chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Decoding options forwarded to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodingOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub num_predict: u32,
}

/// Streaming chat request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: DecodingOptions,
}

impl ChatRequest {
    pub fn new(config: &InferenceConfig, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: config.model.clone(),
            messages,
            stream: true,
            options: DecodingOptions {
                temperature: config.temperature,
                top_p: config.top_p,
                num_predict: config.num_predict,
            },
        }
    }
}

/// One decoded line of the backend stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatChunk {
    pub content: String,
    pub done: bool,
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = CoreResult<ChatChunk>> + Send>>;

/// A token-streaming inference backend.
#[async_trait::async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Open a streaming chat. Errors before the first chunk (connection, status) are returned
    /// directly; later failures arrive as `Err` items.
    async fn open_stream(&self, request: &ChatRequest) -> CoreResult<ChunkStream>;
}

#[derive(Debug, Deserialize)]
struct OllamaLine {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

/// Decode one NDJSON line. Blank lines are skipped by the caller.
pub fn parse_chunk_line(line: &str) -> CoreResult<ChatChunk> {
    let parsed: OllamaLine = serde_json::from_str(line)
        .map_err(|e| CoreError::Malformed(format!("{} in line {:?}", e, truncate(line, 120))))?;
    if let Some(err) = parsed.error {
        return Err(CoreError::Backend(err));
    }
    Ok(ChatChunk {
        content: parsed.message.map(|m| m.content).unwrap_or_default(),
        done: parsed.done,
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Ollama `/api/chat` client.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(config: &InferenceConfig) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

#[async_trait::async_trait]
impl InferenceBackend for OllamaBackend {
    async fn open_stream(&self, request: &ChatRequest) -> CoreResult<ChunkStream> {
        tracing::info!(
            target: "pangool::oracle",
            model = %request.model,
            "Opening inference stream"
        );

        let response = self.client.post(self.chat_url()).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!(
                target: "pangool::oracle",
                status = %status,
                "Inference backend returned HTTP {}: {}",
                status,
                body
            );
            return Err(CoreError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let mut bytes = Box::pin(response.bytes_stream());
        let stream = async_stream::try_stream! {
            // Bytes, not text: a multi-byte character may straddle two network reads
            let mut buffer: Vec<u8> = Vec::new();
            let mut finished = false;
            while !finished {
                let Some(next) = bytes.next().await else { break };
                let next = next.map_err(|e| CoreError::Connection(e.to_string()))?;
                buffer.extend_from_slice(&next);

                while let Some(newline_pos) = buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=newline_pos).collect();
                    let line = String::from_utf8_lossy(&raw).trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    let chunk = parse_chunk_line(&line)?;
                    finished = chunk.done;
                    yield chunk;
                    if finished {
                        break;
                    }
                }
            }
            // Final line without a trailing newline
            let tail = String::from_utf8_lossy(&buffer).trim().to_string();
            if !finished && !tail.is_empty() {
                yield parse_chunk_line(&tail)?;
            }
        };

        Ok(Box::pin(stream))
    }
}
