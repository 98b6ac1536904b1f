//! # seshat
//!
//! A weakly supervised neuro-symbolic learner for arithmetic expressions.
//! Supervision is the final value of an expression only; the intermediate
//! structure is recovered by abduction: when an expression tree's result
//! disagrees with ground truth, a greedy search revises exactly one
//! assumption (a perceived symbol, a dependency arc, or a semantic
//! binding) and keeps the first revision that explains the target.
//!
//! ## Architecture
//!
//! - **Domain** (`domain`): the symbol alphabet and ground-truth programs
//! - **Semantics** (`semantics`): per-symbol slots binding symbols to programs
//! - **Trees** (`ast`): dependency parses, bottom-up evaluation, abduction
//! - **Collaborators** (`collab`): perception / syntax / semantics models
//!   behind traits, with count-based reference implementations
//! - **Jointer** (`jointer`): the deduce / abduce / learn coordinator
//!
//! ## Library usage
//!
//! ```
//! use std::sync::Arc;
//! use seshat::ast::ExprTree;
//! use seshat::collab::PrecedenceSyntax;
//! use seshat::domain::{decode_sentence, ground_truth_table};
//!
//! let sentence = decode_sentence("2*3+4");
//! let parse = PrecedenceSyntax::new().parse(&sentence);
//! let tree = ExprTree::build(parse, Arc::new(ground_truth_table()), None);
//! assert_eq!(tree.result(), Some(10));
//! ```

pub mod ast;
pub mod collab;
pub mod config;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod jointer;
pub mod semantics;
