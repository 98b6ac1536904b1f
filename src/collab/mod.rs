//! Collaborator contracts and reference implementations.
//!
//! The core never trains a perception, syntax, or semantics model itself;
//! it talks to them through the three traits here. The bundled
//! implementations are deliberately small: oracles and count-based models
//! that exercise the contracts end-to-end without dragging in a neural
//! stack. A real deployment swaps its own models in behind the same
//! traits.

mod perception;
mod slot_store;
mod syntax;

pub use perception::{NoisyPerception, OraclePerception};
pub use slot_store::SlotStore;
pub use syntax::PrecedenceSyntax;

use std::sync::Arc;

use crate::ast::{Confidences, Parse};
use crate::domain::{Sentence, Symbol};
use crate::error::SeshatResult;
use crate::semantics::{Example, SemanticsTable};

/// A raw input token, opaque to the core (an image path, a rendered
/// character, ...). The perception collaborator decides what it means.
pub type Glyph = String;

/// Turns raw inputs into symbol sequences with per-position confidences.
pub trait Perception: Send {
    /// Decode one batch. Returns per-sample sentences and, for each
    /// sentence, one confidence row per token over the evaluable alphabet.
    fn infer(&self, batch: &[Vec<Glyph>]) -> (Vec<Sentence>, Vec<Confidences>);

    /// Absorb supervised (raw token, resolved symbol) pairs.
    fn train(&mut self, pairs: &[(Glyph, Symbol)]);

    fn save_state(&self) -> SeshatResult<serde_json::Value>;
    fn load_state(&mut self, state: serde_json::Value) -> SeshatResult<()>;
}

/// Proposes a dependency structure over a symbol sequence.
///
/// Every returned parse must satisfy the single-root/tree invariant; on
/// unparseable input the model degrades to a structure that fails arity
/// checks rather than violating the invariant.
pub trait SyntaxModel: Send {
    fn infer(&self, sentences: &[Sentence]) -> Vec<Parse>;

    /// Absorb revised parses as training data.
    fn train(&mut self, parses: &[Parse]);

    fn save_state(&self) -> SeshatResult<serde_json::Value>;
    fn load_state(&mut self, state: serde_json::Value) -> SeshatResult<()>;
}

/// Owns the semantic slots and publishes immutable table snapshots.
pub trait SemanticsModel: Send {
    /// The current table snapshot. Snapshots are only replaced between
    /// training rounds, never mutated in place.
    fn table(&self) -> Arc<SemanticsTable>;

    /// Absorb per-symbol example lists: `dataset[sym]` holds
    /// (children results, own result) pairs harvested from revised trees.
    fn train(&mut self, dataset: &[Vec<Example>]);

    fn save_state(&self) -> SeshatResult<serde_json::Value>;
    fn load_state(&mut self, state: serde_json::Value) -> SeshatResult<()>;
}
