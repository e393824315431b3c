//! Shared value types for ghostwrite.
//!
//! This crate has **no internal ghostwrite dependencies**. It defines the
//! values that flow through the preview pipeline:
//!
//! ```text
//! SelectionPayload ──► adapter ──► raw JSON ──► ResponseSchema::normalize
//!                                                     │
//!                                                     ▼
//!                     PreviewState ◄── reducer ◄── NormalizedResponse
//! ```
//!
//! # Key Types
//!
//! |------------------------|-----------------------------------------------|
//! | Type                   | Purpose                                       |
//! |------------------------|-----------------------------------------------|
//! | [`SelectionPayload`]   | Snapshot of what the model should act on      |
//! | [`RequestMode`]        | Stream vs batch request                       |
//! | [`ApplyMode`]          | Preview-then-decide vs auto-apply             |
//! | [`NormalizedResponse`] | The four canonical fields of adapter output   |
//! | [`AiError`]            | Error surfaced through the `error` event      |
//! | [`ResponseSchema`]     | Which raw keys map onto the canonical fields  |
//! | [`PreviewState`]       | Current lifecycle snapshot                    |
//! |------------------------|-----------------------------------------------|

pub mod preview;
pub mod response;
pub mod selection;

pub use preview::{PreviewState, PreviewStatus};
pub use response::{AiError, NormalizedResponse, ResponseSchema};
pub use selection::{ApplyMode, RequestMode, SelectionPayload};
