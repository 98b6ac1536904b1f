//! Example-driven semantics collaborator.
//!
//! Keeps a bank of per-symbol example sets and induces each slot's
//! program from them: constants for nullary slots, the best-fitting
//! arithmetic primitive for binary slots. Publishes an immutable
//! [`SemanticsTable`] snapshot after every training round.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::collab::SemanticsModel;
use crate::domain::{ground_truth_table, Symbol};
use crate::error::{SeshatResult, SnapshotError};
use crate::semantics::{BinaryOp, Example, Program, SemanticSlot, SemanticsTable};

/// Below this many fresh examples a slot's evidence is considered too
/// thin to act on and the slot is reset.
const MIN_EXAMPLES: usize = 10;
/// Retained examples are down-sampled to this many before induction.
const MAX_EXAMPLES: usize = 100;
/// A slot whose targets are mostly failures is reset outright.
const FAILURE_RESET_RATIO: f64 = 0.8;
/// Likelihood a non-nullary program must reach to count as solved.
const SOLVED_LIKELIHOOD: f64 = 0.9;
/// Distinct examples a non-nullary slot needs before it can be solved.
const SOLVED_DISTINCT: usize = 80;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SlotState {
    idx: usize,
    examples: Vec<Example>,
    program: Option<Program>,
    arity: Option<usize>,
    solved: bool,
    likelihood: f64,
}

impl SlotState {
    fn empty(idx: usize) -> Self {
        Self {
            idx,
            examples: Vec::new(),
            program: None,
            arity: None,
            solved: false,
            likelihood: 0.0,
        }
    }

    fn reset(&mut self) {
        self.examples.clear();
        self.program = None;
        self.arity = None;
        self.solved = false;
        self.likelihood = 0.0;
    }
}

pub struct SlotStore {
    slots: Vec<SlotState>,
    table: Arc<SemanticsTable>,
    rng: StdRng,
}

impl SlotStore {
    /// An empty store: every slot unsolved, nothing published.
    pub fn new(seed: u64) -> Self {
        Self {
            slots: (0..Symbol::COUNT).map(SlotState::empty).collect(),
            table: Arc::new(SemanticsTable::unsolved()),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// A store pre-bound to the ground-truth programs, for bypassing
    /// semantics learning.
    pub fn solved() -> Self {
        let table = ground_truth_table();
        let slots = table
            .slots()
            .iter()
            .map(|slot| SlotState {
                idx: slot.idx,
                examples: Vec::new(),
                program: slot.program,
                arity: slot.arity,
                solved: slot.solved,
                likelihood: slot.confidence,
            })
            .collect();
        Self {
            slots,
            table: Arc::new(table),
            rng: StdRng::seed_from_u64(0),
        }
    }

    /// Fraction of learnable symbols whose slot is solved. Parenthesis
    /// slots carry no interpretation and are left out of the ratio.
    pub fn solved_ratio(&self) -> f64 {
        let learnable = |s: &&SlotState| Symbol(s.idx as u8).is_learnable();
        let total = self.slots.iter().filter(learnable).count();
        if total == 0 {
            return 0.0;
        }
        let solved = self.slots.iter().filter(learnable).filter(|s| s.solved).count();
        solved as f64 / total as f64
    }

    /// Replace a slot's evidence with a fresh batch, applying the
    /// filtering rules before the examples are stored:
    /// fewer than [`MIN_EXAMPLES`] resets the slot, a batch dominated by
    /// failed targets resets it, and surviving failures are dropped so
    /// induction only sees defined outcomes.
    fn absorb(slot: &mut SlotState, batch: &[Example]) {
        if batch.len() < MIN_EXAMPLES {
            slot.reset();
            return;
        }
        let failures = batch.iter().filter(|(_, y)| y.is_none()).count();
        if failures as f64 >= FAILURE_RESET_RATIO * batch.len() as f64 {
            slot.reset();
            return;
        }
        let kept: Vec<Example> = batch.iter().filter(|(_, y)| y.is_some()).cloned().collect();

        // Keep only the majority arity; a symbol's program has one.
        let mut by_arity: HashMap<usize, usize> = HashMap::new();
        for (xs, _) in &kept {
            *by_arity.entry(xs.len()).or_insert(0) += 1;
        }
        let arity = by_arity
            .into_iter()
            .max_by_key(|&(a, n)| (n, std::cmp::Reverse(a)))
            .map(|(a, _)| a);
        let Some(arity) = arity else {
            slot.reset();
            return;
        };
        slot.examples = kept.into_iter().filter(|(xs, _)| xs.len() == arity).collect();
        slot.arity = Some(arity);
    }

    /// Cap a slot's examples at [`MAX_EXAMPLES`], always keeping the ones
    /// the current program gets wrong.
    fn downsample(&mut self, idx: usize) {
        let slot = &mut self.slots[idx];
        if slot.examples.len() <= MAX_EXAMPLES {
            return;
        }
        let (mut wrong, mut right): (Vec<Example>, Vec<Example>) = match slot.program {
            Some(program) => slot
                .examples
                .drain(..)
                .partition(|(xs, y)| !explains(program, xs, *y)),
            None => (Vec::new(), slot.examples.drain(..).collect()),
        };
        right.shuffle(&mut self.rng);
        right.truncate(MAX_EXAMPLES.saturating_sub(wrong.len()));
        wrong.extend(right);
        wrong.truncate(MAX_EXAMPLES);
        self.slots[idx].examples = wrong;
    }

    /// Re-induce a slot's program from its examples and update its
    /// solved status.
    fn induce(slot: &mut SlotState) {
        let Some(arity) = slot.arity else {
            return;
        };
        if slot.examples.is_empty() {
            return;
        }
        let candidates: Vec<Program> = match arity {
            0 => most_common_target(&slot.examples)
                .map(Program::Const)
                .into_iter()
                .collect(),
            2 => BinaryOp::ALL.iter().map(|&op| Program::Binary(op)).collect(),
            _ => Vec::new(),
        };
        let mut best: Option<(Program, f64)> = None;
        for program in candidates {
            let score = likelihood(program, &slot.examples);
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((program, score));
            }
        }
        let Some((program, score)) = best else {
            slot.program = None;
            slot.solved = false;
            slot.likelihood = 0.0;
            return;
        };
        slot.program = Some(program);
        slot.likelihood = score;

        let distinct: HashSet<&Example> = slot.examples.iter().collect();
        slot.solved = match arity {
            0 => score > 0.0,
            _ => score >= SOLVED_LIKELIHOOD && distinct.len() >= SOLVED_DISTINCT,
        };
        debug!(
            symbol = %Symbol(slot.idx as u8),
            program = %program,
            likelihood = score,
            solved = slot.solved,
            "slot induced"
        );
    }

    /// Two slots settling on the same program is a conflict; the one with
    /// less evidence yields.
    fn dedup(&mut self) {
        for i in 0..self.slots.len() {
            for j in (i + 1)..self.slots.len() {
                let (pi, pj) = (self.slots[i].program, self.slots[j].program);
                if let (Some(a), Some(b)) = (pi, pj) {
                    if a == b {
                        let loser = if self.slots[i].examples.len() < self.slots[j].examples.len() {
                            i
                        } else {
                            j
                        };
                        self.slots[loser].reset();
                    }
                }
            }
        }
    }

    fn publish(&mut self) {
        let slots = self
            .slots
            .iter()
            .map(|state| SemanticSlot {
                idx: state.idx,
                program: state.program,
                arity: state.arity,
                solved: state.solved,
                confidence: state.likelihood,
            })
            .collect();
        self.table = Arc::new(SemanticsTable::new(slots));
    }
}

/// Whether `program` reproduces one example, counting matching failures
/// as agreement.
fn explains(program: Program, xs: &[i64], y: Option<i64>) -> bool {
    match program.apply(xs) {
        Ok(v) => y == Some(v),
        Err(_) => y.is_none(),
    }
}

fn likelihood(program: Program, examples: &[Example]) -> f64 {
    if examples.is_empty() {
        return 0.0;
    }
    let hits = examples.iter().filter(|(xs, y)| explains(program, xs, *y)).count();
    hits as f64 / examples.len() as f64
}

fn most_common_target(examples: &[Example]) -> Option<i64> {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for (_, y) in examples {
        if let Some(v) = y {
            *counts.entry(*v).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .max_by_key(|&(v, n)| (n, std::cmp::Reverse(v)))
        .map(|(v, _)| v)
}

impl SemanticsModel for SlotStore {
    fn table(&self) -> Arc<SemanticsTable> {
        Arc::clone(&self.table)
    }

    fn train(&mut self, dataset: &[Vec<Example>]) {
        for (idx, batch) in dataset.iter().enumerate().take(self.slots.len()) {
            // Symbols absent from the batch keep their current state.
            // Parenthesis slots are not learnable and ignore evidence.
            if batch.is_empty() || !Symbol(idx as u8).is_learnable() {
                continue;
            }
            Self::absorb(&mut self.slots[idx], batch);
            self.downsample(idx);
            Self::induce(&mut self.slots[idx]);
        }
        self.dedup();
        self.publish();
        info!(solved = %format!("{:.2}", self.solved_ratio()), "semantics round complete");
    }

    fn save_state(&self) -> SeshatResult<serde_json::Value> {
        serde_json::to_value(&self.slots).map_err(|source| SnapshotError::Serde { source }.into())
    }

    fn load_state(&mut self, state: serde_json::Value) -> SeshatResult<()> {
        self.slots = serde_json::from_value(state).map_err(|source| SnapshotError::Serde { source })?;
        self.publish();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn const_batch(value: i64, count: usize) -> Vec<Example> {
        (0..count).map(|_| (vec![], Some(value))).collect()
    }

    fn binary_batch(op: BinaryOp, range: std::ops::Range<i64>) -> Vec<Example> {
        let mut batch = Vec::new();
        for x in range.clone() {
            for y in range.clone() {
                batch.push((vec![x, y], op.apply(x, y).ok()));
            }
        }
        batch
    }

    fn dataset_with(idx: usize, batch: Vec<Example>) -> Vec<Vec<Example>> {
        let mut dataset = vec![Vec::new(); Symbol::COUNT];
        dataset[idx] = batch;
        dataset
    }

    #[test]
    fn constant_slot_solves_from_consistent_examples() {
        let mut store = SlotStore::new(157);
        store.train(&dataset_with(5, const_batch(5, 20)));
        let slot = store.table().slot(Symbol(5)).clone();
        assert_eq!(slot.program, Some(Program::Const(5)));
        assert!(slot.solved);
        assert_eq!(slot.arity, Some(0));
    }

    #[test]
    fn thin_evidence_resets_the_slot() {
        let mut store = SlotStore::new(157);
        store.train(&dataset_with(5, const_batch(5, 20)));
        assert!(store.table().slot(Symbol(5)).solved);

        store.train(&dataset_with(5, const_batch(5, 3)));
        let slot = store.table().slot(Symbol(5)).clone();
        assert!(!slot.solved);
        assert_eq!(slot.program, None);
    }

    #[test]
    fn failure_dominated_batch_resets_the_slot() {
        let mut store = SlotStore::new(157);
        let mut batch: Vec<Example> = (0..16).map(|_| (vec![1, 0], None)).collect();
        batch.extend((0..4).map(|i| (vec![4, 2], Some(i))));
        store.train(&dataset_with(Symbol::DIVIDE.index(), batch));
        assert_eq!(store.table().slot(Symbol::DIVIDE).program, None);
    }

    #[test]
    fn binary_slot_identifies_its_primitive() {
        let mut store = SlotStore::new(157);
        store.train(&dataset_with(
            Symbol::PLUS.index(),
            binary_batch(BinaryOp::Add, 0..12),
        ));
        let slot = store.table().slot(Symbol::PLUS).clone();
        assert_eq!(slot.program, Some(Program::Binary(BinaryOp::Add)));
        assert!(slot.solved);
        assert!(slot.confidence >= SOLVED_LIKELIHOOD);
    }

    #[test]
    fn binary_slot_needs_enough_distinct_evidence_to_solve() {
        let mut store = SlotStore::new(157);
        // 16 distinct pairs, all explained by Mul, but far below the
        // distinctness bar.
        store.train(&dataset_with(
            Symbol::TIMES.index(),
            binary_batch(BinaryOp::Mul, 0..4),
        ));
        let slot = store.table().slot(Symbol::TIMES).clone();
        assert_eq!(slot.program, Some(Program::Binary(BinaryOp::Mul)));
        assert!(!slot.solved);
    }

    #[test]
    fn conflicting_slots_keep_the_better_evidenced_one() {
        let mut store = SlotStore::new(157);
        let mut dataset = vec![Vec::new(); Symbol::COUNT];
        dataset[3] = const_batch(3, 40);
        dataset[4] = const_batch(3, 15);
        store.train(&dataset);
        let table = store.table();
        assert_eq!(table.slot(Symbol(3)).program, Some(Program::Const(3)));
        assert_eq!(table.slot(Symbol(4)).program, None);
    }

    #[test]
    fn empty_batch_preserves_slot_state() {
        let mut store = SlotStore::new(157);
        store.train(&dataset_with(5, const_batch(5, 20)));
        store.train(&vec![Vec::new(); Symbol::COUNT]);
        assert!(store.table().slot(Symbol(5)).solved);
    }

    #[test]
    fn downsampling_caps_examples_and_keeps_misfits() {
        let mut store = SlotStore::new(157);
        let mut batch = binary_batch(BinaryOp::Add, 0..20);
        // One example no primitive explains.
        batch.push((vec![1, 1], Some(99)));
        store.train(&dataset_with(Symbol::PLUS.index(), batch));
        let state = &store.slots[Symbol::PLUS.index()];
        assert!(state.examples.len() <= MAX_EXAMPLES);
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut store = SlotStore::new(157);
        store.train(&dataset_with(5, const_batch(5, 20)));
        let state = store.save_state().unwrap();

        let mut restored = SlotStore::new(0);
        restored.load_state(state).unwrap();
        assert_eq!(
            restored.table().slot(Symbol(5)).program,
            Some(Program::Const(5))
        );
        assert!(restored.table().slot(Symbol(5)).solved);
    }

    #[test]
    fn parenthesis_slots_ignore_training_evidence() {
        let mut store = SlotStore::new(157);
        store.train(&dataset_with(Symbol::LPAREN.index(), const_batch(3, 20)));
        let slot = store.table().slot(Symbol::LPAREN).clone();
        assert_eq!(slot.program, None);
        assert!(!slot.solved);
    }

    #[test]
    fn solved_ratio_ignores_parenthesis_slots() {
        // 14 learnable slots. The paren slots can never solve and must
        // not drag the ratio below 1.0 on a fully trained store.
        let mut store = SlotStore::new(157);
        assert_eq!(store.solved_ratio(), 0.0);
        store.train(&dataset_with(5, const_batch(5, 20)));
        assert_eq!(store.solved_ratio(), 1.0 / 14.0);
    }

    #[test]
    fn ground_truth_store_is_fully_solved() {
        let store = SlotStore::solved();
        assert_eq!(store.solved_ratio(), 1.0);
        let table = store.table();
        assert_eq!(table.slot(Symbol(7)).program, Some(Program::Const(7)));
        assert_eq!(
            table.slot(Symbol::MINUS).program,
            Some(Program::Binary(BinaryOp::Monus))
        );
    }
}
