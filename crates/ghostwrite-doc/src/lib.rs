//! # ghostwrite-doc
//!
//! A small in-memory text document and the reference preview bridge that
//! draws suggestions onto it.
//!
//! |---------------------|-------------------------------------------------|
//! | Type                | Purpose                                         |
//! |---------------------|-------------------------------------------------|
//! | [`TextDocument`]    | Character-addressed text with transactions      |
//! | [`DocumentHost`]    | What a bridge needs from a document engine      |
//! | [`Transaction`]     | Ordered replacement steps tagged with an origin |
//! | [`Decoration`]      | Non-destructive annotation over a range         |
//! | [`DecorationBridge`]| Overlay preview with conflict detection         |
//! |---------------------|-------------------------------------------------|

pub mod bridge;
pub mod decoration;
pub mod document;
pub mod error;
pub mod mapping;
pub mod transaction;

pub use bridge::{BridgeConfig, ConflictEvent, DEFAULT_ERROR_DISPLAY, DecorationBridge, selection_span};
pub use decoration::{Decoration, DecorationKind};
pub use document::{DocumentHost, HistoryEntry, Observer, ObserverId, TextDocument};
pub use error::{BridgeError, DocumentError, DocumentResult};
pub use mapping::{Bias, Span, map_offset};
pub use transaction::{BridgeId, ChangeSet, Origin, Step, Transaction};
