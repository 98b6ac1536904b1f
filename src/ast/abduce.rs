//! Abductive search: minimal single-assumption revision of a tree.
//!
//! Given a tree whose result disagrees with ground truth, exactly one of
//! three strategies searches for a revision that makes the recomputed
//! result match: re-decode one token (perception), rotate one dependency
//! arc (syntax), or rebind the root's meaning (semantics). The search is
//! greedy first-fit over single mutations; strategies are never combined
//! and no candidate beyond the first exact match is considered.

use std::cmp::Ordering;

use crate::domain::Symbol;

use super::{ExprTree, Parse};

/// Confidence cutoff: positions the model is essentially certain about are
/// never blamed, alternatives it gives essentially no mass are never tried.
pub const EPSILON: f64 = 1e-5;

/// Which underlying assumption a revision is allowed to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// The sentence decoded by perception is wrong at one position.
    Perception,
    /// One dependency arc is wrong.
    Syntax,
    /// The meaning bound to the root's symbol is wrong.
    Semantics,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Perception => write!(f, "perception"),
            Strategy::Syntax => write!(f, "syntax"),
            Strategy::Semantics => write!(f, "semantics"),
        }
    }
}

impl ExprTree {
    /// Search for a single revision that makes the tree evaluate to
    /// `target` exactly.
    ///
    /// A tree already matching the target is returned as an equivalent
    /// fresh copy without invoking any strategy. Otherwise the given
    /// strategy runs alone; `None` means no single revision succeeded and
    /// the sample yields no training signal this cycle.
    pub fn abduce(&self, target: i64, strategy: Strategy) -> Option<ExprTree> {
        if self.result() == Some(target) {
            return Some(self.fresh_copy());
        }
        match strategy {
            Strategy::Perception => self.abduce_perception(target),
            Strategy::Syntax => self.abduce_syntax(target),
            Strategy::Semantics => self.abduce_semantics(target),
        }
    }

    /// Blame the weakest belief first: try positions in ascending order of
    /// the model's confidence in its own decode, and at each position try
    /// the alternatives in descending confidence order.
    fn abduce_perception(&self, target: i64) -> Option<ExprTree> {
        let probs = self.confidences()?;
        let sentence = self.sentence();

        let mut positions: Vec<usize> = (0..sentence.len())
            .filter(|&i| self.parse().mask[i])
            .collect();
        // Index tie-break keeps the search order deterministic.
        positions.sort_by(|&a, &b| {
            let pa = probs[a][sentence[a].index()];
            let pb = probs[b][sentence[b].index()];
            pa.partial_cmp(&pb).unwrap_or(Ordering::Equal).then(a.cmp(&b))
        });

        for pos in positions {
            let row = &probs[pos];
            let current = sentence[pos];
            if row[current.index()] > 1.0 - EPSILON {
                // Ascending order: every remaining position is at least as
                // certain, so nothing left to blame.
                break;
            }

            let mut alternatives: Vec<usize> = (0..row.len()).collect();
            alternatives.sort_by(|&a, &b| {
                row[b].partial_cmp(&row[a]).unwrap_or(Ordering::Equal).then(a.cmp(&b))
            });

            for alt in alternatives {
                if row[alt] < EPSILON {
                    break;
                }
                if alt == current.index() {
                    continue;
                }
                let mut parse = self.parse().clone();
                parse.sentence[pos] = Symbol(alt as u8);
                let candidate = self.rebuild(parse);
                if candidate.result() == Some(target) {
                    tracing::debug!(
                        pos,
                        from = %current,
                        to = %Symbol(alt as u8),
                        target,
                        "perception revision matched"
                    );
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Rotate the tree around each dependency arc in turn.
    ///
    /// Rotating arc (child, parent) promotes the child into the parent's
    /// position and demotes the parent beneath it; the child's own
    /// dependents lying strictly between the two token positions hand over
    /// to the demoted parent, so operand counts survive the rotation.
    fn abduce_syntax(&self, target: i64) -> Option<ExprTree> {
        let parse = self.parse();
        let n = parse.len();
        for child in 0..n {
            if !parse.mask[child] {
                continue;
            }
            let h = parse.head[child];
            if h < 0 {
                continue;
            }
            let parent = h as usize;
            if !parse.mask[parent] {
                continue;
            }

            let mut head = parse.head.clone();
            head[child] = parse.head[parent];
            head[parent] = child as i32;
            let (lo, hi) = (child.min(parent), child.max(parent));
            for t in lo + 1..hi {
                if parse.head[t] == child as i32 {
                    head[t] = parent as i32;
                }
            }

            let candidate = self.rebuild(Parse::new(
                parse.sentence.clone(),
                parse.mask.clone(),
                head,
            ));
            if candidate.result() == Some(target) {
                tracing::debug!(child, parent, target, "syntax revision matched");
                return Some(candidate);
            }
        }
        None
    }

    /// Rebind the root's meaning, applicable only when the blame cannot lie
    /// below the root: every child evaluated successfully and the root's
    /// own interpretation is a solved zero-argument constant whose value is
    /// simply wrong.
    ///
    /// The revision reassigns the root to the unsolved slot with the
    /// highest perception confidence at the root's position and pins the
    /// result to `target` via the targeted override, manufacturing a
    /// semantics training example rather than certifying a recomputation.
    fn abduce_semantics(&self, target: i64) -> Option<ExprTree> {
        let root = self.root()?;
        let root_node = &self.nodes()[root];
        if root_node.symbol.index() >= self.table().len() {
            return None;
        }
        let slot = self.table().slot(root_node.symbol);
        if !slot.solved || slot.arity != Some(0) {
            return None;
        }
        if root_node
            .children
            .iter()
            .any(|&c| self.nodes()[c].result.is_none())
        {
            return None;
        }

        let row = &self.confidences()?[root];
        let mut best: Option<(Symbol, f64)> = None;
        for sym in self.table().unsolved_symbols() {
            let p = row[sym.index()];
            // Strict improvement keeps the lowest index on ties.
            if best.is_none_or(|(_, bp)| p > bp) {
                best = Some((sym, p));
            }
        }
        let (symbol, confidence) = best?;

        let mut revised = self.fresh_copy();
        revised.override_root(symbol, target);
        tracing::debug!(
            root,
            %symbol,
            confidence,
            target,
            "semantics revision: targeted override"
        );
        Some(revised)
    }
}
