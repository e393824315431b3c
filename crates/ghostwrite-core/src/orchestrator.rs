//! Request orchestration: adapter selection, normalization, merging,
//! cancellation and timeouts.
//!
//! One [`AiOrchestrator`] runs at most one request at a time. Starting a new
//! request cancels the previous one, and everything the superseded run tries
//! to emit afterwards is dropped.
//!
//! # Runs
//!
//! Every request gets a run ticket: a generation number plus a fresh
//! [`CancellationToken`]. Emission goes through a check that the ticket is
//! still the current generation and its token is not cancelled, performed
//! under the same lock that `send_selection` takes to start a new run. That
//! makes "new run started" and "old run emitted" mutually exclusive.
//!
//! The run lock is reentrant so that listeners may call back into the
//! orchestrator (`cancel`, `accept_preview`, ...) from inside an event.
//!
//! # Failure
//!
//! `send_selection` never returns an error. Missing adapters, adapter
//! failures, provider-reported errors and batch timeouts all become a single
//! `error` event.

use std::cell::RefCell;
use std::sync::Arc;

use futures::StreamExt;
use ghostwrite_types::{AiError, ApplyMode, NormalizedResponse, RequestMode, SelectionPayload};
use parking_lot::{ReentrantMutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::adapter::{AdapterContext, BatchAdapter, StreamingAdapter, coerce_error};
use crate::config::{AiConfig, OrchestratorSettings};
use crate::event_bus::EventBus;
use crate::events::PreviewEvent;

/// Reason logged when a request is superseded by a new one.
pub const NEW_REQUEST_REASON: &str = "new request";

/// Identifies one request for the "is this run still current" check.
#[derive(Clone, Debug)]
struct RunTicket {
    generation: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct RunState {
    generation: u64,
    token: Option<CancellationToken>,
    latest_preview: NormalizedResponse,
    active: bool,
}

impl RunState {
    fn is_current(&self, ticket: &RunTicket) -> bool {
        self.generation == ticket.generation && !ticket.token.is_cancelled()
    }
}

/// Drives adapters and emits the preview lifecycle over an [`EventBus`].
pub struct AiOrchestrator {
    bus: EventBus<PreviewEvent>,
    config: RwLock<AiConfig>,
    run: ReentrantMutex<RefCell<RunState>>,
}

impl AiOrchestrator {
    /// Orchestrator with a plain (non-replaying) bus.
    pub fn new(config: AiConfig) -> Self {
        Self::with_bus(config, EventBus::new())
    }

    /// Orchestrator emitting on `bus`, e.g. one built with
    /// [`EventBus::with_replay`].
    pub fn with_bus(config: AiConfig, bus: EventBus<PreviewEvent>) -> Self {
        Self {
            bus,
            config: RwLock::new(config),
            run: ReentrantMutex::new(RefCell::new(RunState::default())),
        }
    }

    /// The bus events are emitted on.
    pub fn bus(&self) -> &EventBus<PreviewEvent> {
        &self.bus
    }

    /// Replace adapters and settings wholesale.
    pub fn update_config(&self, config: AiConfig) {
        tracing::debug!(adapters = ?config.adapters, mode = %config.settings.mode, "orchestrator config replaced");
        *self.config.write() = config;
    }

    /// Snapshot of the current settings.
    pub fn settings(&self) -> OrchestratorSettings {
        self.config.read().settings.clone()
    }

    /// Whether a request is in flight and not cancelled.
    pub fn is_running(&self) -> bool {
        let guard = self.run.lock();
        let state = guard.borrow();
        state.active && state.token.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// The last merged preview.
    pub fn latest_preview(&self) -> NormalizedResponse {
        self.run.lock().borrow().latest_preview.clone()
    }

    /// Request a suggestion for `payload`.
    ///
    /// Resolves once the request has finished, failed, or been superseded.
    /// Outcomes are reported through events only.
    #[tracing::instrument(skip(self, payload), name = "orchestrator.send_selection", fields(mode = %mode))]
    pub async fn send_selection(&self, payload: SelectionPayload, mode: RequestMode) {
        let (adapters, settings) = {
            let config = self.config.read();
            (config.adapters.clone(), config.settings.clone())
        };

        let adapter = match mode {
            RequestMode::Stream => adapters.streaming.map(Adapter::Streaming),
            RequestMode::Batch => adapters.batch.map(Adapter::Batch),
        };
        let Some(adapter) = adapter else {
            tracing::warn!(mode = %mode, "no adapter registered for mode");
            self.emit_locked(PreviewEvent::Error(AiError::new(format!(
                "missing adapter for mode '{mode}'"
            ))));
            return;
        };

        let ticket = self.start_run(payload.clone(), mode);
        let ctx = AdapterContext {
            abort: ticket.token.clone(),
            ui_behavior: settings.ui_behavior.clone(),
            mode: settings.mode,
        };

        let result = match adapter {
            Adapter::Streaming(adapter) => {
                self.run_stream(adapter.as_ref(), payload, ctx, &settings, &ticket)
                    .await
            }
            Adapter::Batch(adapter) => {
                self.run_batch(adapter.as_ref(), payload, ctx, &settings, &ticket)
                    .await
            }
        };

        if let Err(err) = result {
            let error = coerce_error(&err);
            tracing::debug!(request = ticket.generation, error = %error, "request failed");
            self.emit_if_current(&ticket, PreviewEvent::Error(error));
        }
        self.finish_run(&ticket);
    }

    /// Cancel the current request, if any, and emit `cancel`.
    ///
    /// The event is emitted even when nothing was running.
    pub fn cancel(&self, reason: Option<&str>) {
        let guard = self.run.lock();
        {
            let mut state = guard.borrow_mut();
            if let Some(token) = &state.token {
                if !token.is_cancelled() {
                    token.cancel();
                    tracing::debug!(request = state.generation, reason, "request cancelled");
                }
            }
            state.active = false;
        }
        self.bus.emit(PreviewEvent::Cancel {
            reason: reason.map(str::to_string),
        });
    }

    /// Emit `accept` with the last merged preview.
    pub fn accept_preview(&self) {
        let preview = self.latest_preview();
        self.emit_locked(PreviewEvent::Accept(preview));
    }

    /// Emit `reject` with the last merged preview.
    pub fn reject_preview(&self) {
        let preview = self.latest_preview();
        self.emit_locked(PreviewEvent::Reject(preview));
    }

    /// Forget the last preview and emit `reset`.
    pub fn reset(&self) {
        let guard = self.run.lock();
        guard.borrow_mut().latest_preview = NormalizedResponse::default();
        self.bus.emit(PreviewEvent::Reset);
    }

    /// Supersede any running request and emit `start` for a new one.
    fn start_run(&self, payload: SelectionPayload, mode: RequestMode) -> RunTicket {
        let guard = self.run.lock();
        let ticket = {
            let mut state = guard.borrow_mut();
            if let Some(previous) = state.token.take() {
                if !previous.is_cancelled() {
                    previous.cancel();
                    tracing::debug!(
                        request = state.generation,
                        reason = NEW_REQUEST_REASON,
                        "request cancelled"
                    );
                }
            }
            state.generation += 1;
            let token = CancellationToken::new();
            state.token = Some(token.clone());
            state.latest_preview = NormalizedResponse::default();
            state.active = true;
            RunTicket {
                generation: state.generation,
                token,
            }
        };
        tracing::debug!(request = ticket.generation, mode = %mode, "request started");
        self.bus.emit(PreviewEvent::Start { payload, mode });
        ticket
    }

    fn finish_run(&self, ticket: &RunTicket) {
        let guard = self.run.lock();
        let mut state = guard.borrow_mut();
        if state.generation == ticket.generation {
            state.active = false;
        }
    }

    async fn run_stream(
        &self,
        adapter: &dyn StreamingAdapter,
        payload: SelectionPayload,
        ctx: AdapterContext,
        settings: &OrchestratorSettings,
        ticket: &RunTicket,
    ) -> anyhow::Result<()> {
        let mut stream = tokio::select! {
            biased;
            _ = ticket.token.cancelled() => return Ok(()),
            stream = adapter.stream(payload, ctx) => stream?,
        };

        loop {
            let item = tokio::select! {
                biased;
                _ = ticket.token.cancelled() => None,
                item = stream.next() => item,
            };
            if ticket.token.is_cancelled() {
                tracing::debug!(request = ticket.generation, "stream abandoned after cancel");
                return Ok(());
            }
            let Some(item) = item else {
                break;
            };

            let chunk = settings.response_schema.normalize(&item?);
            let Some(merged) = self.merge_if_current(ticket, &chunk) else {
                return Ok(());
            };

            if let Some(error) = chunk.error {
                self.emit_if_current(ticket, PreviewEvent::Error(error));
                return Ok(());
            }
            if chunk.delta.is_some() {
                self.emit_if_current(ticket, PreviewEvent::Chunk(merged));
            }
        }

        let preview = self.latest_preview();
        self.complete(ticket, preview, settings.mode);
        Ok(())
    }

    async fn run_batch(
        &self,
        adapter: &dyn BatchAdapter,
        payload: SelectionPayload,
        ctx: AdapterContext,
        settings: &OrchestratorSettings,
        ticket: &RunTicket,
    ) -> anyhow::Result<()> {
        let call = adapter.complete(payload, ctx);
        let raced = async {
            match settings.timeout() {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow::anyhow!(
                        "request timed out after {}ms",
                        settings.timeout_ms
                    )),
                },
                None => call.await,
            }
        };

        let raw = tokio::select! {
            biased;
            _ = ticket.token.cancelled() => None,
            raw = raced => Some(raw?),
        };
        let Some(raw) = raw.filter(|_| !ticket.token.is_cancelled()) else {
            tracing::debug!(request = ticket.generation, "batch result dropped after cancel");
            return Ok(());
        };

        let response = settings.response_schema.normalize(&raw);
        {
            let guard = self.run.lock();
            let mut state = guard.borrow_mut();
            if !state.is_current(ticket) {
                return Ok(());
            }
            state.latest_preview = response.clone();
        }

        match response.error.clone() {
            Some(error) => {
                self.emit_if_current(ticket, PreviewEvent::Error(error));
            }
            None => self.complete(ticket, response, settings.mode),
        }
        Ok(())
    }

    /// Emit `done` and `readyForDecision`, then `accept` in auto-apply mode.
    fn complete(&self, ticket: &RunTicket, preview: NormalizedResponse, mode: ApplyMode) {
        let guard = self.run.lock();
        if !self.emit_if_current(ticket, PreviewEvent::Done(preview.clone())) {
            return;
        }
        if !self.emit_if_current(ticket, PreviewEvent::ReadyForDecision(preview.clone())) {
            return;
        }
        tracing::debug!(request = ticket.generation, "preview ready for decision");
        if mode == ApplyMode::AutoApply {
            self.emit_if_current(ticket, PreviewEvent::Accept(preview));
        }
        drop(guard);
    }

    fn merge_if_current(
        &self,
        ticket: &RunTicket,
        chunk: &NormalizedResponse,
    ) -> Option<NormalizedResponse> {
        let guard = self.run.lock();
        let mut state = guard.borrow_mut();
        if !state.is_current(ticket) {
            return None;
        }
        state.latest_preview.merge(chunk);
        Some(state.latest_preview.clone())
    }

    /// Emit `event` only if `ticket` is still the live run.
    fn emit_if_current(&self, ticket: &RunTicket, event: PreviewEvent) -> bool {
        let guard = self.run.lock();
        if !guard.borrow().is_current(ticket) {
            tracing::trace!(request = ticket.generation, "dropping event from superseded request");
            return false;
        }
        self.bus.emit(event);
        drop(guard);
        true
    }

    fn emit_locked(&self, event: PreviewEvent) {
        let _guard = self.run.lock();
        self.bus.emit(event);
    }
}

impl std::fmt::Debug for AiOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.run.lock();
        let state = guard.borrow();
        f.debug_struct("AiOrchestrator")
            .field("config", &*self.config.read())
            .field("generation", &state.generation)
            .field("active", &state.active)
            .finish_non_exhaustive()
    }
}

enum Adapter {
    Streaming(Arc<dyn StreamingAdapter>),
    Batch(Arc<dyn BatchAdapter>),
}
