//! # ghostwrite-core
//!
//! AI suggestion preview orchestration.
//!
//! A request flows leaves-first through:
//! - [`EventBus`]: typed synchronous pub/sub, optionally replaying events
//!   emitted before anyone subscribed
//! - [`AiOrchestrator`]: picks an adapter, normalizes and merges output,
//!   handles cancellation and batch timeouts, emits the lifecycle
//! - [`reduce`]: pure reducer from events to [`PreviewState`](ghostwrite_types::PreviewState)
//! - [`PreviewController`]: holds the state and fans it out to listeners
//! - [`bind_editor`]: turns state changes into [`DocumentBridge`] calls
//!
//! Adapters and bridges are supplied by the host. Nothing here talks to a
//! network or owns a document.

pub mod adapter;
pub mod bridge;
pub mod config;
pub mod controller;
pub mod error;
pub mod event_bus;
pub mod events;
pub mod integration;
pub mod orchestrator;
pub mod state_machine;

pub use adapter::{
    AdapterContext, Adapters, BatchAdapter, ChunkStream, RawResponse, StreamingAdapter,
    ThrownValue, batch_fn, coerce_error, streaming_fn,
};
pub use bridge::{DocumentBridge, UndoHandle};
pub use config::{
    AiConfig, DEFAULT_CONFIG_SCRIPT, OrchestratorSettings, RetryPolicy, load_preview_config,
};
pub use controller::{PreviewController, StateSubscription};
pub use error::{ConfigError, ConfigResult};
pub use event_bus::{DEFAULT_REPLAY_CAPACITY, EventBus, EventName, Listener, ListenerId};
pub use events::{EVENT_NAMES, PreviewEvent};
pub use integration::{EditorBinding, HostHooks, bind_editor};
pub use orchestrator::AiOrchestrator;
pub use state_machine::{TransitionPolicy, reduce, reduce_with};
