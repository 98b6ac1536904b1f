//! Expression trees over dependency parses.
//!
//! A [`Parse`] pairs a sentence with a dependency-head array; [`ExprTree`]
//! builds an owned node tree from it, evaluates bottom-up with checked
//! arithmetic, and exposes the abductive search that repairs a tree whose
//! result disagrees with ground truth.

mod abduce;
mod tree;

pub use abduce::{EPSILON, Strategy};
pub use tree::{ExprNode, ExprTree};

use serde::{Deserialize, Serialize};

use crate::domain::Sentence;
use crate::error::EvalError;

/// Per-token confidence rows over the evaluable alphabet, supplied by the
/// perception collaborator. `confidences[token][symbol]` is the model's
/// belief that `token` renders `symbol`.
pub type Confidences = Vec<Vec<f64>>;

/// A sentence plus its claimed dependency structure.
///
/// `head[i]` is the index of token i's parent; exactly one token carries
/// `-1` and is the root. `mask[i]` is false for tokens without a usable
/// interpretation, such as parentheses; they never enter evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parse {
    pub sentence: Sentence,
    pub mask: Vec<bool>,
    pub head: Vec<i32>,
}

impl Parse {
    pub fn new(sentence: Sentence, mask: Vec<bool>, head: Vec<i32>) -> Self {
        Self { sentence, mask, head }
    }

    /// A parse where every token is evaluable.
    pub fn unmasked(sentence: Sentence, head: Vec<i32>) -> Self {
        let mask = vec![true; sentence.len()];
        Self { sentence, mask, head }
    }

    pub fn len(&self) -> usize {
        self.sentence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentence.is_empty()
    }

    /// Check the single-root/tree invariant and return the root index.
    ///
    /// Rejected parses: zero or multiple roots (never an arbitrary pick),
    /// heads out of range, an unmasked token attached to a masked non-root
    /// head, and head chains that cycle instead of reaching the root.
    pub(crate) fn validate(&self) -> Result<usize, EvalError> {
        let n = self.len();
        if self.mask.len() != n || self.head.len() != n {
            return Err(EvalError::Structural {
                message: format!(
                    "length mismatch: {} tokens, {} mask entries, {} heads",
                    n,
                    self.mask.len(),
                    self.head.len()
                ),
            });
        }

        let roots: Vec<usize> = (0..n).filter(|&i| self.head[i] == -1).collect();
        let root = match roots.as_slice() {
            [root] => *root,
            _ => {
                return Err(EvalError::Structural {
                    message: format!("expected exactly one root, found {}", roots.len()),
                });
            }
        };

        for i in 0..n {
            let h = self.head[i];
            if h < -1 || h >= n as i32 {
                return Err(EvalError::Structural {
                    message: format!("token {i} has out-of-range head {h}"),
                });
            }
            if i != root && self.mask[i] {
                let h = h as usize;
                if !self.mask[h] && h != root {
                    return Err(EvalError::Structural {
                        message: format!("unmasked token {i} attaches to masked head {h}"),
                    });
                }
            }
        }

        // Every unmasked token must reach the root in at most n hops.
        for i in 0..n {
            if !self.mask[i] {
                continue;
            }
            let mut cursor = i;
            let mut hops = 0;
            while cursor != root {
                cursor = self.head[cursor] as usize;
                hops += 1;
                if hops > n {
                    return Err(EvalError::Structural {
                        message: format!("token {i} never reaches the root (cycle)"),
                    });
                }
            }
        }

        Ok(root)
    }
}
