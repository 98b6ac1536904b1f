//! Reference perception collaborators.
//!
//! [`OraclePerception`] decodes canonical glyphs exactly and is useful for
//! bypassing perception during tests. [`NoisyPerception`] keeps a
//! pseudo-count table per glyph; its decoder starts out confused about
//! some glyphs and sharpens as abduced (glyph, symbol) pairs come back
//! from the learning loop.

use std::collections::BTreeMap;

use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use crate::ast::Confidences;
use crate::collab::{Glyph, Perception};
use crate::domain::{Sentence, Symbol};
use crate::error::{SeshatResult, SnapshotError};

/// Decodes canonical single-character glyphs with full confidence.
#[derive(Debug, Default)]
pub struct OraclePerception;

impl OraclePerception {
    pub fn new() -> Self {
        Self
    }
}

impl Perception for OraclePerception {
    fn infer(&self, batch: &[Vec<Glyph>]) -> (Vec<Sentence>, Vec<Confidences>) {
        let mut sentences = Vec::with_capacity(batch.len());
        let mut confidences = Vec::with_capacity(batch.len());
        for glyphs in batch {
            let mut sentence = Vec::with_capacity(glyphs.len());
            let mut rows = Vec::with_capacity(glyphs.len());
            for glyph in glyphs {
                match decode_canonical(glyph) {
                    Some(symbol) => {
                        sentence.push(symbol);
                        let mut row = vec![0.0; Symbol::COUNT];
                        row[symbol.index()] = 1.0;
                        rows.push(row);
                    }
                    None => {
                        // An unreadable glyph gets the NULL marker and a
                        // flat row, never a certain-looking guess.
                        sentence.push(Symbol::NULL);
                        rows.push(vec![1.0 / Symbol::COUNT as f64; Symbol::COUNT]);
                    }
                }
            }
            sentences.push(sentence);
            confidences.push(rows);
        }
        (sentences, confidences)
    }

    fn train(&mut self, _pairs: &[(Glyph, Symbol)]) {}

    fn save_state(&self) -> SeshatResult<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    fn load_state(&mut self, _state: serde_json::Value) -> SeshatResult<()> {
        Ok(())
    }
}

fn decode_canonical(glyph: &str) -> Option<Symbol> {
    let mut chars = glyph.chars();
    let first = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    Symbol::from_char(first)
}

/// Prior mass behind each glyph's initial count row.
const PRIOR_STRENGTH: f64 = 8.0;
/// Laplace mass added when normalizing counts into confidences. Kept tiny
/// so symbols a glyph has never been associated with stay below the
/// search cutoff instead of polluting abductive substitution.
const SMOOTHING: f64 = 1e-6;

/// Count-based decoder with a corrupted prior.
///
/// Each glyph carries a count row over the evaluable alphabet. Decoding
/// is argmax over the normalized row; a corrupted glyph starts with more
/// mass on a wrong symbol than on its true one, so only accumulated
/// training pairs can flip it.
pub struct NoisyPerception {
    counts: DashMap<Glyph, Vec<f64>>,
}

impl NoisyPerception {
    /// Seeded prior: each canonical glyph is corrupted with probability
    /// `noise`, in which case a random other symbol outweighs the truth.
    pub fn new(noise: f64, seed: u64) -> Self {
        let counts = DashMap::new();
        let mut rng = StdRng::seed_from_u64(seed);
        for idx in 0..Symbol::COUNT {
            let symbol = Symbol(idx as u8);
            let mut row = vec![0.0; Symbol::COUNT];
            if noise > 0.0 && rng.gen_bool(noise.min(1.0)) {
                let other = loop {
                    let candidate = rng.gen_range(0..Symbol::COUNT);
                    if candidate != idx {
                        break candidate;
                    }
                };
                row[other] = 0.5625 * PRIOR_STRENGTH;
                row[idx] = 0.4375 * PRIOR_STRENGTH;
            } else {
                row[idx] = PRIOR_STRENGTH;
            }
            counts.insert(symbol.as_str().to_string(), row);
        }
        Self { counts }
    }

    /// Deterministic prior: every `(truth, decoded)` pair makes the glyph
    /// for `truth` initially decode as `decoded`, with the true symbol as
    /// runner-up. All other glyphs decode exactly.
    pub fn confused(pairs: &[(Symbol, Symbol)]) -> Self {
        let model = Self::new(0.0, 0);
        for &(truth, decoded) in pairs {
            let mut row = vec![0.0; Symbol::COUNT];
            row[decoded.index()] = 0.5625 * PRIOR_STRENGTH;
            row[truth.index()] = 0.4375 * PRIOR_STRENGTH;
            model.counts.insert(truth.as_str().to_string(), row);
        }
        model
    }

    fn row(&self, glyph: &str) -> Vec<f64> {
        match self.counts.get(glyph) {
            Some(counts) => {
                let total: f64 = counts.iter().sum::<f64>() + SMOOTHING * Symbol::COUNT as f64;
                counts.iter().map(|c| (c + SMOOTHING) / total).collect()
            }
            None => vec![1.0 / Symbol::COUNT as f64; Symbol::COUNT],
        }
    }
}

impl Perception for NoisyPerception {
    fn infer(&self, batch: &[Vec<Glyph>]) -> (Vec<Sentence>, Vec<Confidences>) {
        let mut sentences = Vec::with_capacity(batch.len());
        let mut confidences = Vec::with_capacity(batch.len());
        for glyphs in batch {
            let mut sentence = Vec::with_capacity(glyphs.len());
            let mut rows = Vec::with_capacity(glyphs.len());
            for glyph in glyphs {
                let row = self.row(glyph);
                let best = row
                    .iter()
                    .enumerate()
                    .max_by(|(i, a), (j, b)| {
                        a.partial_cmp(b)
                            .unwrap_or(std::cmp::Ordering::Equal)
                            .then(j.cmp(i))
                    })
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                sentence.push(Symbol(best as u8));
                rows.push(row);
            }
            sentences.push(sentence);
            confidences.push(rows);
        }
        (sentences, confidences)
    }

    fn train(&mut self, pairs: &[(Glyph, Symbol)]) {
        pairs.par_iter().for_each(|(glyph, symbol)| {
            let mut entry = self
                .counts
                .entry(glyph.clone())
                .or_insert_with(|| vec![0.0; Symbol::COUNT]);
            entry[symbol.index()] += 1.0;
        });
        debug!(pairs = pairs.len(), glyphs = self.counts.len(), "perception counts updated");
    }

    fn save_state(&self) -> SeshatResult<serde_json::Value> {
        let table: BTreeMap<Glyph, Vec<f64>> = self
            .counts
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        serde_json::to_value(table).map_err(|source| SnapshotError::Serde { source }.into())
    }

    fn load_state(&mut self, state: serde_json::Value) -> SeshatResult<()> {
        let table: BTreeMap<Glyph, Vec<f64>> =
            serde_json::from_value(state).map_err(|source| SnapshotError::Serde { source })?;
        self.counts.clear();
        for (glyph, row) in table {
            self.counts.insert(glyph, row);
        }
        Ok(())
    }
}
