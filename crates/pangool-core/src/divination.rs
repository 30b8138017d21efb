//! **Divination stream**: turns a theme and an optional question into a lazy sequence of
//! [`DivinationEvent`]s pulled from the inference backend.
//!
//! A producer task reads backend chunks, strips model markers, and forwards tokens over a
//! channel. After every token it polls the [`ConsumerProbe`]; once the consumer is gone it
//! stops without a terminal event. Otherwise exactly one `Done` or `Error` ends the stream.
//!
//! Every wait on the backend, including the one for response headers, is bounded by the
//! idle timeout and abandoned as soon as the consumer's channel closes.

use crate::config::{InferenceConfig, TokenMode};
use crate::error::CoreError;
use crate::markers::MarkerFilter;
use crate::oracle::{ChatMessage, ChatRequest, InferenceBackend};
use crate::themes::{compose_user_message, Theme, ORACLE_SYSTEM_PROMPT};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

const EVENT_BUFFER: usize = 64;

/// Inbound divination request from the tablet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DivinationRequest {
    pub theme: String,
    #[serde(default)]
    pub question: Option<String>,
}

impl DivinationRequest {
    pub fn new(theme: impl Into<String>, question: Option<String>) -> Self {
        Self {
            theme: theme.into(),
            question,
        }
    }
}

/// One outward event of a divination stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DivinationEvent {
    Token(String),
    Done(String),
    Error(String),
}

impl DivinationEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DivinationEvent::Token(_))
    }

    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            DivinationEvent::Token(_) => "token",
            DivinationEvent::Done(_) => "done",
            DivinationEvent::Error(_) => "error",
        }
    }

    /// JSON payload sent with the event.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            DivinationEvent::Token(t) => serde_json::json!({ "token": t }),
            DivinationEvent::Done(full) => serde_json::json!({ "full_text": full }),
            DivinationEvent::Error(e) => serde_json::json!({ "error": e }),
        }
    }
}

/// Cooperative disconnect flag shared between a stream's consumer and its producer.
#[derive(Debug, Clone, Default)]
pub struct ConsumerProbe(Arc<AtomicBool>);

impl ConsumerProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the consumer as gone. Idempotent.
    pub fn disconnect(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_disconnected(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Consumer side of a divination. Dropping it signals disconnection to the producer.
pub struct DivinationStream {
    inner: ReceiverStream<DivinationEvent>,
    probe: ConsumerProbe,
}

impl DivinationStream {
    pub fn probe(&self) -> ConsumerProbe {
        self.probe.clone()
    }
}

impl Stream for DivinationStream {
    type Item = DivinationEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for DivinationStream {
    fn drop(&mut self) {
        self.probe.disconnect();
    }
}

/// Produces divination streams against one inference backend.
#[derive(Clone)]
pub struct DivinationService {
    backend: Arc<dyn InferenceBackend>,
    config: InferenceConfig,
}

impl DivinationService {
    pub fn new(backend: Arc<dyn InferenceBackend>, config: InferenceConfig) -> Self {
        Self { backend, config }
    }

    /// Build the backend request: oracle persona + themed user message.
    pub fn chat_request(&self, request: &DivinationRequest) -> ChatRequest {
        let theme = Theme::resolve(&request.theme);
        let user = compose_user_message(theme, request.question.as_deref());
        ChatRequest::new(
            &self.config,
            vec![ChatMessage::system(ORACLE_SYSTEM_PROMPT), ChatMessage::user(user)],
        )
    }

    /// Start a fresh divination. Must be called inside a tokio runtime.
    pub fn stream(&self, request: DivinationRequest) -> DivinationStream {
        self.stream_with_probe(request, ConsumerProbe::new())
    }

    /// Like [`stream`](Self::stream) but with a probe the transport can flip on disconnect.
    pub fn stream_with_probe(&self, request: DivinationRequest, probe: ConsumerProbe) -> DivinationStream {
        let theme = Theme::resolve(&request.theme);
        info!(
            target: "pangool::divine",
            theme = theme.key(),
            requested = %request.theme,
            has_question = request.question.as_deref().is_some_and(|q| !q.trim().is_empty()),
            "Divination requested"
        );

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let producer = Producer {
            backend: Arc::clone(&self.backend),
            chat: self.chat_request(&request),
            idle_timeout: self.config.idle_timeout(),
            mode: self.config.token_mode,
            tx,
            probe: probe.clone(),
        };
        tokio::spawn(producer.run());

        DivinationStream {
            inner: ReceiverStream::new(rx),
            probe,
        }
    }
}

enum Outcome {
    Completed(String),
    Failed(CoreError),
    Disconnected,
}

struct Producer {
    backend: Arc<dyn InferenceBackend>,
    chat: ChatRequest,
    idle_timeout: Duration,
    mode: TokenMode,
    tx: mpsc::Sender<DivinationEvent>,
    probe: ConsumerProbe,
}

impl Producer {
    async fn run(mut self) {
        match self.pump().await {
            Outcome::Completed(full_text) => {
                info!(target: "pangool::divine", chars = full_text.chars().count(), "Divination complete");
                let _ = self.tx.send(DivinationEvent::Done(full_text)).await;
            }
            Outcome::Failed(err) => {
                warn!(target: "pangool::divine", "Divination error: {}", err);
                let _ = self.tx.send(DivinationEvent::Error(err.to_string())).await;
            }
            Outcome::Disconnected => {
                info!(target: "pangool::divine", "Client disconnected during divination");
            }
        }
    }

    async fn pump(&mut self) -> Outcome {
        let opened = tokio::select! {
            opened = tokio::time::timeout(self.idle_timeout, self.backend.open_stream(&self.chat)) => opened,
            _ = self.tx.closed() => return Outcome::Disconnected,
        };
        let mut chunks = match opened {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => return Outcome::Failed(e),
            Err(_) => return Outcome::Failed(CoreError::IdleTimeout(self.idle_timeout.as_secs())),
        };
        let mut filter = MarkerFilter::default();
        let mut full_text = String::new();

        loop {
            let next = tokio::select! {
                next = tokio::time::timeout(self.idle_timeout, chunks.next()) => next,
                _ = self.tx.closed() => return Outcome::Disconnected,
            };
            let chunk = match next {
                Err(_) => return Outcome::Failed(CoreError::IdleTimeout(self.idle_timeout.as_secs())),
                Ok(None) => break,
                Ok(Some(Err(e))) => return Outcome::Failed(e),
                Ok(Some(Ok(chunk))) => chunk,
            };

            let text = filter.push(&chunk.content);
            if self.emit(text, &mut full_text).await {
                return Outcome::Disconnected;
            }
            if chunk.done {
                break;
            }
        }

        let tail = filter.finish();
        if self.emit(tail, &mut full_text).await {
            return Outcome::Disconnected;
        }
        Outcome::Completed(full_text)
    }

    /// Send `text` as one or more tokens. Returns true once the consumer is gone.
    async fn emit(&self, text: String, full_text: &mut String) -> bool {
        if text.is_empty() {
            return false;
        }
        let pieces: Vec<String> = match self.mode {
            TokenMode::Fragment => vec![text],
            TokenMode::Character => text.chars().map(String::from).collect(),
        };
        for piece in pieces {
            full_text.push_str(&piece);
            if self.tx.send(DivinationEvent::Token(piece)).await.is_err() {
                return true;
            }
            if self.probe.is_disconnected() || self.tx.is_closed() {
                return true;
            }
        }
        false
    }
}
