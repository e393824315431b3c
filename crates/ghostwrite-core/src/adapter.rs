//! Adapter contract between the orchestrator and a generation backend.
//!
//! Adapters are caller-supplied. A streaming adapter returns a sequence of
//! raw JSON chunks; a batch adapter returns one raw JSON value. Only the four
//! keys named by the [`ResponseSchema`](ghostwrite_types::ResponseSchema) are
//! read off that output.
//!
//! Cancellation is cooperative. The orchestrator checks
//! [`AdapterContext::abort`] between chunks and before consuming a batch
//! result, but it never terminates adapter work itself: an adapter that wants
//! to stop its own network call early must watch the token.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use ghostwrite_types::{AiError, ApplyMode, SelectionPayload, response::UNKNOWN_ERROR};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Opaque adapter output.
pub type RawResponse = Value;

/// Stream of raw chunks. An `Err` item ends the request with an error.
pub type ChunkStream = BoxStream<'static, anyhow::Result<RawResponse>>;

/// Per-request context handed to adapters.
#[derive(Clone, Debug)]
pub struct AdapterContext {
    /// Cancelled when the request is superseded or cancelled.
    pub abort: CancellationToken,
    /// Free-form UI hints from the configuration.
    pub ui_behavior: Option<Value>,
    /// The configured apply mode.
    pub mode: ApplyMode,
}

/// Adapter producing incremental chunks.
#[async_trait]
pub trait StreamingAdapter: Send + Sync {
    /// Start generating for `payload`.
    async fn stream(
        &self,
        payload: SelectionPayload,
        ctx: AdapterContext,
    ) -> anyhow::Result<ChunkStream>;
}

/// Adapter producing a single result.
#[async_trait]
pub trait BatchAdapter: Send + Sync {
    /// Generate a complete result for `payload`.
    async fn complete(
        &self,
        payload: SelectionPayload,
        ctx: AdapterContext,
    ) -> anyhow::Result<RawResponse>;
}

/// A streaming adapter backed by a closure.
pub struct StreamFn<F>(F);

#[async_trait]
impl<F, Fut> StreamingAdapter for StreamFn<F>
where
    F: Fn(SelectionPayload, AdapterContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<ChunkStream>> + Send + 'static,
{
    async fn stream(
        &self,
        payload: SelectionPayload,
        ctx: AdapterContext,
    ) -> anyhow::Result<ChunkStream> {
        (self.0)(payload, ctx).await
    }
}

/// A batch adapter backed by a closure.
pub struct BatchFn<F>(F);

#[async_trait]
impl<F, Fut> BatchAdapter for BatchFn<F>
where
    F: Fn(SelectionPayload, AdapterContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<RawResponse>> + Send + 'static,
{
    async fn complete(
        &self,
        payload: SelectionPayload,
        ctx: AdapterContext,
    ) -> anyhow::Result<RawResponse> {
        (self.0)(payload, ctx).await
    }
}

/// Wrap a closure as a streaming adapter.
pub fn streaming_fn<F, Fut>(f: F) -> Arc<dyn StreamingAdapter>
where
    F: Fn(SelectionPayload, AdapterContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<ChunkStream>> + Send + 'static,
{
    Arc::new(StreamFn(f))
}

/// Wrap a closure as a batch adapter.
pub fn batch_fn<F, Fut>(f: F) -> Arc<dyn BatchAdapter>
where
    F: Fn(SelectionPayload, AdapterContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<RawResponse>> + Send + 'static,
{
    Arc::new(BatchFn(f))
}

/// The adapters available to an orchestrator.
#[derive(Clone, Default)]
pub struct Adapters {
    pub streaming: Option<Arc<dyn StreamingAdapter>>,
    pub batch: Option<Arc<dyn BatchAdapter>>,
}

impl Adapters {
    /// No adapters.
    pub fn none() -> Self {
        Self::default()
    }

    /// Set the streaming adapter.
    pub fn with_streaming(mut self, adapter: Arc<dyn StreamingAdapter>) -> Self {
        self.streaming = Some(adapter);
        self
    }

    /// Set the batch adapter.
    pub fn with_batch(mut self, adapter: Arc<dyn BatchAdapter>) -> Self {
        self.batch = Some(adapter);
        self
    }
}

impl std::fmt::Debug for Adapters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapters")
            .field("streaming", &self.streaming.is_some())
            .field("batch", &self.batch.is_some())
            .finish()
    }
}

/// An adapter failure carrying a raw JSON object instead of a Rust error.
///
/// Its message is the object's `message` string when present.
#[derive(Clone, Debug, PartialEq)]
pub struct ThrownValue(pub Value);

impl ThrownValue {
    fn message(&self) -> Option<&str> {
        self.0
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
    }
}

impl std::fmt::Display for ThrownValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message().unwrap_or(UNKNOWN_ERROR))
    }
}

impl std::error::Error for ThrownValue {}

/// Coerce an adapter failure into the error carried by the `error` event.
pub fn coerce_error(err: &anyhow::Error) -> AiError {
    if let Some(thrown) = err.downcast_ref::<ThrownValue>() {
        return thrown.message().map_or_else(AiError::unknown, |m| AiError::new(m));
    }
    let message = err.to_string();
    if message.is_empty() {
        AiError::unknown()
    } else {
        AiError::new(message)
    }
}
