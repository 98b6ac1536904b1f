//! The Jointer: coordinator of the deduce / abduce / learn cycle.
//!
//! Owns one collaborator per module (perception, syntax, semantics) behind
//! trait objects and drives them through a fixed round-robin curriculum.
//! Deduction and abduction fan out over the batch with rayon; revised
//! trees land in a buffer that the next `learn` call drains into whichever
//! module the curriculum has active.

mod snapshot;

pub use snapshot::Snapshot;

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::ast::{ExprTree, Parse, Strategy};
use crate::collab::{Glyph, Perception, SemanticsModel, SyntaxModel};
use crate::config::JointerConfig;
use crate::dataset::Sample;
use crate::domain::{Sentence, Symbol};
use crate::error::{ConfigError, SeshatResult};
use crate::semantics::Example;

/// One revised tree waiting in the buffer, with the raw tokens it came
/// from so perception can be supervised at the glyph level.
struct Abduced {
    tree: ExprTree,
    glyphs: Vec<Glyph>,
}

/// What deduction produced for one batch.
pub struct Deduction {
    pub sentences: Vec<Sentence>,
    pub heads: Vec<Vec<i32>>,
    pub results: Vec<Option<i64>>,
}

/// Accuracy of the current collaborators over a labeled dataset.
#[derive(Debug, Clone, Copy)]
pub struct Metrics {
    /// Fraction of samples whose evaluated result equals the target.
    pub result_acc: f64,
    /// Fraction of samples decoded to exactly the right sentence.
    pub perception_acc: f64,
    /// Fraction of samples parsed to exactly the right head array.
    pub syntax_acc: f64,
    pub samples: usize,
}

pub struct Jointer {
    perception: Box<dyn Perception>,
    syntax: Box<dyn SyntaxModel>,
    semantics: Box<dyn SemanticsModel>,
    config: JointerConfig,
    /// Round-robin schedule of modules; empty when every collaborator is
    /// deterministic or ground-truth and there is nothing to train.
    curriculum: Vec<Strategy>,
    epoch: u64,
    /// Trees from the most recent deduction, indexed like the batch.
    trees: Vec<ExprTree>,
    buffer: Vec<Abduced>,
}

impl Jointer {
    pub fn new(
        perception: Box<dyn Perception>,
        syntax: Box<dyn SyntaxModel>,
        semantics: Box<dyn SemanticsModel>,
        config: JointerConfig,
    ) -> SeshatResult<Self> {
        if config.max_eval_depth == 0 {
            return Err(ConfigError::Invalid {
                message: "max_eval_depth must be positive".into(),
            }
            .into());
        }
        let mut curriculum = Vec::new();
        curriculum.extend(std::iter::repeat_n(Strategy::Perception, config.perception_steps as usize));
        curriculum.extend(std::iter::repeat_n(Strategy::Syntax, config.syntax_steps as usize));
        curriculum.extend(std::iter::repeat_n(Strategy::Semantics, config.semantics_steps as usize));
        Ok(Self {
            perception,
            syntax,
            semantics,
            config,
            curriculum,
            epoch: 0,
            trees: Vec::new(),
            buffer: Vec::new(),
        })
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// The module the curriculum has active this epoch.
    pub fn active(&self) -> Option<Strategy> {
        if self.curriculum.is_empty() {
            return None;
        }
        let slot = (self.epoch as usize) % self.curriculum.len();
        Some(self.curriculum[slot])
    }

    /// Run the full forward pass: decode, parse, build and evaluate one
    /// tree per sample. The trees are retained for the next `abduce` call.
    pub fn deduce(&mut self, batch: &[Vec<Glyph>]) -> Deduction {
        let (sentences, confidences) = self.perception.infer(batch);
        let parses = self.syntax.infer(&sentences);
        let table = self.semantics.table();
        let max_depth = self.config.max_eval_depth;
        self.trees = parses
            .into_par_iter()
            .zip(confidences.into_par_iter())
            .map(|(parse, probs)| {
                ExprTree::build_bounded(parse, Arc::clone(&table), Some(probs), max_depth)
            })
            .collect();
        Deduction {
            sentences,
            heads: self.trees.iter().map(|t| t.parse().head.clone()).collect(),
            results: self.trees.iter().map(|t| t.result()).collect(),
        }
    }

    /// Search for single-assumption revisions of the deduced trees under
    /// the active module's strategy. Trees that already match their target
    /// come back as-is; revised and matching trees alike are buffered as
    /// training data. Returns how many samples were buffered.
    ///
    /// `targets` and `batch` must parallel the batch passed to `deduce`.
    pub fn abduce(&mut self, targets: &[i64], batch: &[Vec<Glyph>]) -> usize {
        let Some(strategy) = self.active() else {
            return 0;
        };
        let hits: Vec<Abduced> = self
            .trees
            .par_iter()
            .zip(targets.par_iter())
            .zip(batch.par_iter())
            .filter_map(|((tree, &target), glyphs)| {
                tree.abduce(target, strategy).map(|tree| Abduced {
                    tree,
                    glyphs: glyphs.clone(),
                })
            })
            .collect();
        let count = hits.len();
        self.buffer.extend(hits);
        debug!(strategy = %strategy, buffered = count, of = targets.len(), "abduction pass");
        count
    }

    /// Drain the buffer into the active module and close the epoch.
    ///
    /// The buffer is cleared unconditionally: examples are never carried
    /// across epochs, a stale revision is worse than no revision. The
    /// epoch advances even when there was nothing to learn, so the
    /// curriculum keeps rotating.
    pub fn learn(&mut self) {
        let active = self.active();
        if self.buffer.is_empty() {
            debug!(epoch = self.epoch, "empty buffer, nothing to learn");
            self.epoch += 1;
            return;
        }
        let buffered = self.buffer.len();
        match active {
            Some(Strategy::Perception) => {
                let pairs: Vec<(Glyph, Symbol)> = self
                    .buffer
                    .iter()
                    .flat_map(|a| {
                        a.glyphs
                            .iter()
                            .cloned()
                            .zip(a.tree.sentence().iter().copied())
                    })
                    .collect();
                self.perception.train(&pairs);
            }
            Some(Strategy::Syntax) => {
                let parses: Vec<Parse> =
                    self.buffer.iter().map(|a| a.tree.parse().clone()).collect();
                self.syntax.train(&parses);
            }
            Some(Strategy::Semantics) => {
                let dataset = self.semantics_dataset();
                self.semantics.train(&dataset);
            }
            None => {}
        }
        self.buffer.clear();
        let module = active.map(|s| s.to_string()).unwrap_or_else(|| "none".into());
        info!(epoch = self.epoch, module = %module, buffered, "learn step complete");
        self.epoch += 1;
    }

    /// Harvest per-symbol (children results, own result) examples from
    /// every buffered tree.
    fn semantics_dataset(&self) -> Vec<Vec<Example>> {
        let mut dataset: Vec<Vec<Example>> = vec![Vec::new(); Symbol::COUNT];
        for abduced in &self.buffer {
            let tree = &abduced.tree;
            for &idx in tree.bottom_up() {
                let node = &tree.nodes()[idx];
                let symbol = node.symbol;
                if symbol.index() >= Symbol::COUNT {
                    continue;
                }
                let args: Option<Vec<i64>> = node
                    .children
                    .iter()
                    .map(|&c| tree.nodes()[c].result)
                    .collect();
                // A node whose children failed carries no usable example.
                let Some(args) = args else {
                    continue;
                };
                dataset[symbol.index()].push((args, node.result));
            }
        }
        dataset
    }

    /// Score the current collaborators against a labeled dataset.
    pub fn evaluate(&mut self, samples: &[Sample]) -> Metrics {
        let batch: Vec<Vec<Glyph>> = samples.iter().map(|s| s.glyphs.clone()).collect();
        let deduction = self.deduce(&batch);
        let mut result_hits = 0usize;
        let mut sentence_hits = 0usize;
        let mut head_hits = 0usize;
        for (i, sample) in samples.iter().enumerate() {
            if deduction.results[i] == Some(sample.target) {
                result_hits += 1;
            }
            if deduction.sentences[i] == sample.parse.sentence {
                sentence_hits += 1;
            }
            if deduction.heads[i] == sample.parse.head {
                head_hits += 1;
            }
        }
        let n = samples.len().max(1) as f64;
        Metrics {
            result_acc: result_hits as f64 / n,
            perception_acc: sentence_hits as f64 / n,
            syntax_acc: head_hits as f64 / n,
            samples: samples.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{NoisyPerception, OraclePerception, PrecedenceSyntax, SlotStore};

    fn glyphs(text: &str) -> Vec<Glyph> {
        text.chars().map(|c| c.to_string()).collect()
    }

    fn oracle_jointer(config: JointerConfig) -> Jointer {
        Jointer::new(
            Box::new(OraclePerception::new()),
            Box::new(PrecedenceSyntax::new()),
            Box::new(SlotStore::solved()),
            config,
        )
        .unwrap()
    }

    #[test]
    fn deduce_evaluates_a_batch() {
        let mut jointer = oracle_jointer(JointerConfig::default());
        let batch = vec![glyphs("1+5"), glyphs("2*3+4"), glyphs("8/0")];
        let deduction = jointer.deduce(&batch);
        assert_eq!(deduction.results, vec![Some(6), Some(10), None]);
        assert_eq!(deduction.sentences[0].len(), 3);
    }

    #[test]
    fn curriculum_rotates_with_the_epoch() {
        let config = JointerConfig {
            perception_steps: 2,
            syntax_steps: 0,
            semantics_steps: 1,
            ..JointerConfig::default()
        };
        let mut jointer = oracle_jointer(config);
        assert_eq!(jointer.active(), Some(Strategy::Perception));
        jointer.learn();
        assert_eq!(jointer.active(), Some(Strategy::Perception));
        jointer.learn();
        assert_eq!(jointer.active(), Some(Strategy::Semantics));
        jointer.learn();
        assert_eq!(jointer.active(), Some(Strategy::Perception));
        assert_eq!(jointer.epoch(), 3);
    }

    #[test]
    fn empty_curriculum_disables_abduction() {
        let config = JointerConfig {
            perception_steps: 0,
            syntax_steps: 0,
            semantics_steps: 0,
            ..JointerConfig::default()
        };
        let mut jointer = oracle_jointer(config);
        assert_eq!(jointer.active(), None);
        let batch = vec![glyphs("1+5")];
        jointer.deduce(&batch);
        assert_eq!(jointer.abduce(&[6], &batch), 0);
        assert_eq!(jointer.buffered(), 0);
    }

    #[test]
    fn matching_trees_are_buffered_as_training_data() {
        let mut jointer = oracle_jointer(JointerConfig::default());
        let batch = vec![glyphs("1+5"), glyphs("2*3")];
        jointer.deduce(&batch);
        assert_eq!(jointer.abduce(&[6, 6], &batch), 2);
        assert_eq!(jointer.buffered(), 2);
    }

    #[test]
    fn learn_drains_the_buffer_unconditionally() {
        let mut jointer = Jointer::new(
            Box::new(NoisyPerception::confused(&[(Symbol(1), Symbol(2))])),
            Box::new(PrecedenceSyntax::new()),
            Box::new(SlotStore::solved()),
            JointerConfig::default(),
        )
        .unwrap();
        let batch = vec![glyphs("1+5")];
        jointer.deduce(&batch);
        jointer.abduce(&[6], &batch);
        assert!(jointer.buffered() > 0);
        jointer.learn();
        assert_eq!(jointer.buffered(), 0);
        assert_eq!(jointer.epoch(), 1);
    }

    #[test]
    fn perception_learning_repairs_a_confused_glyph() {
        // '1' initially decodes as '2'; single-error samples get repaired
        // by abduction and the resulting pairs retrain the decoder.
        let mut jointer = Jointer::new(
            Box::new(NoisyPerception::confused(&[(Symbol(1), Symbol(2))])),
            Box::new(PrecedenceSyntax::new()),
            Box::new(SlotStore::solved()),
            JointerConfig::default(),
        )
        .unwrap();
        let batch = vec![glyphs("1+5"), glyphs("1*4"), glyphs("8-1")];
        let targets = [6, 4, 7];

        let before = jointer.deduce(&batch);
        assert_eq!(before.results, vec![Some(7), Some(8), Some(6)]);

        jointer.abduce(&targets, &batch);
        jointer.learn();

        let after = jointer.deduce(&batch);
        assert_eq!(after.results, vec![Some(6), Some(4), Some(7)]);
    }

    #[test]
    fn semantics_dataset_groups_examples_by_symbol() {
        let mut jointer = oracle_jointer(JointerConfig {
            perception_steps: 0,
            syntax_steps: 0,
            semantics_steps: 1,
            ..JointerConfig::default()
        });
        let batch = vec![glyphs("1+5")];
        jointer.deduce(&batch);
        jointer.abduce(&[6], &batch);
        let dataset = jointer.semantics_dataset();
        assert_eq!(dataset[1], vec![(vec![], Some(1))]);
        assert_eq!(dataset[5], vec![(vec![], Some(5))]);
        assert_eq!(dataset[Symbol::PLUS.index()], vec![(vec![1, 5], Some(6))]);
    }

    #[test]
    fn evaluate_reports_three_accuracies() {
        let mut jointer = oracle_jointer(JointerConfig::default());
        let syntax = PrecedenceSyntax::new();
        let samples: Vec<Sample> = [("1+5", 6), ("2*3+4", 10)]
            .iter()
            .map(|&(text, target)| {
                let sentence = crate::domain::decode_sentence(text);
                Sample {
                    glyphs: glyphs(text),
                    parse: syntax.parse(&sentence),
                    target,
                }
            })
            .collect();
        let metrics = jointer.evaluate(&samples);
        assert_eq!(metrics.result_acc, 1.0);
        assert_eq!(metrics.perception_acc, 1.0);
        assert_eq!(metrics.syntax_acc, 1.0);
        assert_eq!(metrics.samples, 2);
    }
}
