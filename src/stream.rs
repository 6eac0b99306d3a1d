//! Incremental response streaming.
//!
//! A response is a set of named steps that run concurrently. Each step's
//! result is emitted as soon as it is ready: text as progressively longer
//! prefixes, structured results as a single `data` event. The stream ends
//! with exactly one terminal event, `complete` or `error`.
//!
//! ```text
//! step "reply"  ──▶ chunk "He" ─▶ chunk "Hell" ─▶ chunk "Hello" (done)
//! step "alumni" ─────────────▶ data [...]
//!                                                           ──▶ complete
//! ```

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::ChatConfig;
use crate::error::{Error, Result};
use crate::metrics;

/// Message sent to the client when a step fails irrecoverably.
pub const FATAL_ERROR_MESSAGE: &str =
    "Sorry, something went wrong while preparing your answer. Please try again.";

/// One event of a streamed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Current prefix of a text step; `done` marks the full text
    Chunk {
        step: String,
        text: String,
        done: bool,
    },
    /// Structured result of a step
    Data { step: String, payload: JsonValue },
    /// Terminal: every step finished
    Complete,
    /// Terminal: a step failed
    Error { message: String },
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Chunk { .. } => "chunk",
            StreamEvent::Data { .. } => "data",
            StreamEvent::Complete => "complete",
            StreamEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete | StreamEvent::Error { .. })
    }
}

/// Pacing of progressive text emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub char_delay: Duration,
    pub chars_per_chunk: usize,
    pub channel_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            char_delay: Duration::from_millis(15),
            chars_per_chunk: 2,
            channel_capacity: 64,
        }
    }
}

impl From<&ChatConfig> for StreamSettings {
    fn from(config: &ChatConfig) -> Self {
        Self {
            char_delay: Duration::from_millis(config.char_delay_ms),
            chars_per_chunk: config.chars_per_chunk.max(1),
            channel_capacity: config.channel_capacity.max(1),
        }
    }
}

/// Write half of a response stream.
///
/// Clones share the closed state: once a terminal event has been sent, or
/// the receiver has gone away, every send fails with [`Error::StreamClosed`].
#[derive(Clone)]
pub struct StreamSender {
    tx: mpsc::Sender<StreamEvent>,
    closed: Arc<AtomicBool>,
    settings: StreamSettings,
}

impl StreamSender {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.tx.is_closed()
    }

    pub async fn send(&self, event: StreamEvent) -> Result<()> {
        if event.is_terminal() {
            if self.closed.swap(true, Ordering::SeqCst) {
                return Err(Error::StreamClosed);
            }
        } else if self.closed.load(Ordering::SeqCst) {
            return Err(Error::StreamClosed);
        }

        let kind = event.kind();
        self.tx.send(event).await.map_err(|_| {
            self.closed.store(true, Ordering::SeqCst);
            Error::StreamClosed
        })?;
        metrics::record_stream_event(kind);
        Ok(())
    }

    /// Emit `text` as growing prefixes, pausing between chunks.
    pub async fn emit_text(&self, step: &str, text: &str) -> Result<()> {
        let boundaries = prefix_boundaries(text, self.settings.chars_per_chunk);
        let last = boundaries.len() - 1;

        for (i, end) in boundaries.into_iter().enumerate() {
            self.send(StreamEvent::Chunk {
                step: step.to_string(),
                text: text[..end].to_string(),
                done: i == last,
            })
            .await?;

            if i != last && !self.settings.char_delay.is_zero() {
                tokio::time::sleep(self.settings.char_delay).await;
            }
        }
        Ok(())
    }

    pub async fn emit_data(&self, step: &str, payload: JsonValue) -> Result<()> {
        self.send(StreamEvent::Data {
            step: step.to_string(),
            payload,
        })
        .await
    }

    pub async fn complete(&self) -> Result<()> {
        self.send(StreamEvent::Complete).await
    }

    pub async fn fail(&self, message: impl Into<String>) -> Result<()> {
        self.send(StreamEvent::Error {
            message: message.into(),
        })
        .await
    }
}

/// Byte offsets of each emitted prefix; always ends with `text.len()`.
fn prefix_boundaries(text: &str, chars_per_chunk: usize) -> Vec<usize> {
    let step = chars_per_chunk.max(1);
    let mut boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .skip(step)
        .step_by(step)
        .collect();
    boundaries.push(text.len());
    boundaries
}

/// Result of a step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput {
    Text(String),
    Data(JsonValue),
}

/// A named unit of work contributing to a response.
pub struct Step {
    pub name: &'static str,
    pub future: BoxFuture<'static, Result<StepOutput>>,
}

impl Step {
    pub fn new(
        name: &'static str,
        future: impl std::future::Future<Output = Result<StepOutput>> + Send + 'static,
    ) -> Self {
        Self {
            name,
            future: Box::pin(future),
        }
    }
}

/// Runs steps concurrently and streams their results in completion order.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamingResponder {
    settings: StreamSettings,
}

impl StreamingResponder {
    pub fn new(settings: StreamSettings) -> Self {
        Self { settings }
    }

    pub fn channel(&self) -> (StreamSender, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let sender = StreamSender {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
            settings: self.settings,
        };
        (sender, rx)
    }

    /// Run `steps` on a background task and return the event receiver.
    pub fn spawn(&self, steps: Vec<Step>) -> mpsc::Receiver<StreamEvent> {
        let (sender, rx) = self.channel();
        let responder = *self;
        tokio::spawn(async move {
            if let Err(e) = responder.run(&sender, steps).await {
                debug!(error = %e, "Response stream ended early");
            }
        });
        rx
    }

    /// Drive `steps` to completion, emitting through `sender`.
    ///
    /// Ends with `complete` when every step succeeded. The first failing step
    /// ends the stream with `error`; steps still running are dropped. If the
    /// receiver disappears, the remaining steps are dropped and
    /// [`Error::StreamClosed`] is returned.
    pub async fn run(&self, sender: &StreamSender, steps: Vec<Step>) -> Result<()> {
        let mut pending: FuturesUnordered<_> = steps
            .into_iter()
            .map(|step| {
                let sender = sender.clone();
                async move {
                    let result = match step.future.await {
                        Ok(StepOutput::Text(text)) => sender.emit_text(step.name, &text).await,
                        Ok(StepOutput::Data(payload)) => {
                            sender.emit_data(step.name, payload).await
                        }
                        Err(e) => Err(e),
                    };
                    (step.name, result)
                }
            })
            .collect();

        while let Some((name, result)) = pending.next().await {
            match result {
                Ok(()) => debug!(step = name, "Step emitted"),
                Err(Error::StreamClosed) => {
                    debug!(step = name, "Client disconnected, abandoning remaining steps");
                    return Err(Error::StreamClosed);
                }
                Err(e) => {
                    warn!(step = name, error = %e, "Step failed, closing stream");
                    sender.fail(FATAL_ERROR_MESSAGE).await?;
                    return Err(e);
                }
            }
        }

        sender.complete().await
    }
}
