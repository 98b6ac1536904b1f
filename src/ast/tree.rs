//! Expression tree construction and bottom-up evaluation.

use std::sync::Arc;

use crate::domain::Symbol;
use crate::error::EvalError;
use crate::semantics::SemanticsTable;

use super::{Confidences, Parse};

/// One tree node: a symbol, its children (arena indices, dependency order),
/// and the memoized result.
#[derive(Debug, Clone)]
pub struct ExprNode {
    pub symbol: Symbol,
    pub children: Vec<usize>,
    pub result: Option<i64>,
}

/// An evaluated expression tree.
///
/// Owns one node per token; nodes are never shared between trees, even when
/// one tree is derived from another during abduction. Evaluation happens
/// once at build time and is memoized per node; the whole-tree result is
/// `None` when evaluation is impossible, which is a first-class "unknown"
/// distinct from any numeric value.
#[derive(Debug, Clone)]
pub struct ExprTree {
    parse: Parse,
    table: Arc<SemanticsTable>,
    sent_probs: Option<Confidences>,
    max_depth: usize,
    nodes: Vec<ExprNode>,
    /// Reachable nodes, children before parents.
    order: Vec<usize>,
    root: Option<usize>,
    result: Option<i64>,
    last_error: Option<EvalError>,
}

impl ExprTree {
    /// Default bound on tree depth during evaluation.
    pub const DEFAULT_MAX_DEPTH: usize = 1000;

    /// Build and evaluate a tree with the default depth bound.
    pub fn build(
        parse: Parse,
        table: Arc<SemanticsTable>,
        sent_probs: Option<Confidences>,
    ) -> Self {
        Self::build_bounded(parse, table, sent_probs, Self::DEFAULT_MAX_DEPTH)
    }

    /// Build and evaluate a tree with an explicit depth bound.
    pub fn build_bounded(
        parse: Parse,
        table: Arc<SemanticsTable>,
        sent_probs: Option<Confidences>,
        max_depth: usize,
    ) -> Self {
        let nodes = parse
            .sentence
            .iter()
            .map(|&symbol| ExprNode {
                symbol,
                children: Vec::new(),
                result: None,
            })
            .collect();

        let mut tree = Self {
            parse,
            table,
            sent_probs,
            max_depth,
            nodes,
            order: Vec::new(),
            root: None,
            result: None,
            last_error: None,
        };

        match tree.parse.validate() {
            Ok(root) => {
                // Ascending token order keeps children in dependency order:
                // for binary operators the left operand precedes the right.
                for i in 0..tree.parse.len() {
                    if i == root || !tree.parse.mask[i] {
                        continue;
                    }
                    let h = tree.parse.head[i] as usize;
                    tree.nodes[h].children.push(i);
                }
                tree.root = Some(root);
                tree.evaluate(root);
            }
            Err(err) => {
                tracing::debug!(error = %err, "parse rejected, tree is rootless");
                tree.last_error = Some(err);
            }
        }

        tree
    }

    fn evaluate(&mut self, root: usize) {
        // Reverse preorder lists every child after its parent, so reversing
        // it yields a valid bottom-up evaluation order.
        let mut preorder: Vec<usize> = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        while let Some((i, depth)) = stack.pop() {
            if depth > self.max_depth {
                self.last_error = Some(EvalError::DepthExceeded {
                    max_depth: self.max_depth,
                });
                return;
            }
            preorder.push(i);
            for &child in &self.nodes[i].children {
                stack.push((child, depth + 1));
            }
        }
        preorder.reverse();

        for &i in &preorder {
            self.nodes[i].result = self.evaluate_node(i);
        }

        self.order = preorder;
        self.result = self.nodes[root].result;
    }

    fn evaluate_node(&mut self, i: usize) -> Option<i64> {
        let symbol = self.nodes[i].symbol;
        if symbol.index() >= self.table.len() {
            self.last_error = Some(EvalError::MissingInterpretation {
                symbol: symbol.index(),
            });
            return None;
        }

        let mut args = Vec::with_capacity(self.nodes[i].children.len());
        for &child in &self.nodes[i].children {
            args.push(self.nodes[child].result?);
        }

        match self.table.slot(symbol).apply(&args) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::trace!(node = i, symbol = %symbol, error = %err, "node evaluation failed");
                self.last_error = Some(err);
                None
            }
        }
    }

    /// The memoized whole-tree result; `None` when evaluation is impossible.
    pub fn result(&self) -> Option<i64> {
        self.result
    }

    pub fn root(&self) -> Option<usize> {
        self.root
    }

    pub fn parse(&self) -> &Parse {
        &self.parse
    }

    pub fn sentence(&self) -> &[Symbol] {
        &self.parse.sentence
    }

    pub fn table(&self) -> &Arc<SemanticsTable> {
        &self.table
    }

    pub fn confidences(&self) -> Option<&Confidences> {
        self.sent_probs.as_ref()
    }

    pub fn nodes(&self) -> &[ExprNode] {
        &self.nodes
    }

    /// Indices of the nodes reachable from the root, children before
    /// parents. Empty for rootless trees.
    pub fn bottom_up(&self) -> &[usize] {
        &self.order
    }

    /// The most recent evaluation failure, for diagnostics only.
    pub fn last_error(&self) -> Option<&EvalError> {
        self.last_error.as_ref()
    }

    /// An equivalent tree rebuilt from scratch off the same inputs.
    pub(crate) fn fresh_copy(&self) -> ExprTree {
        ExprTree::build_bounded(
            self.parse.clone(),
            Arc::clone(&self.table),
            self.sent_probs.clone(),
            self.max_depth,
        )
    }

    /// Rebuild against a revised parse, dropping the confidence matrix.
    pub(crate) fn rebuild(&self, parse: Parse) -> ExprTree {
        ExprTree::build_bounded(parse, Arc::clone(&self.table), None, self.max_depth)
    }

    /// Targeted override: reassign the root's symbol and pin the cached
    /// result to `target` without re-evaluating.
    ///
    /// This is the one place a tree mutates instead of rebuilding. It
    /// manufactures a semantics training example (symbol → target); the
    /// pinned result is deliberately not certified by evaluation.
    pub(crate) fn override_root(&mut self, symbol: Symbol, target: i64) {
        if let Some(root) = self.root {
            self.parse.sentence[root] = symbol;
            self.nodes[root].symbol = symbol;
            self.nodes[root].result = Some(target);
            self.result = Some(target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{decode_sentence, ground_truth_table};

    fn tree(expr: &str, head: Vec<i32>) -> ExprTree {
        ExprTree::build(
            Parse::unmasked(decode_sentence(expr), head),
            Arc::new(ground_truth_table()),
            None,
        )
    }

    #[test]
    fn flat_sum_evaluates() {
        let t = tree("1+5", vec![1, -1, 1]);
        assert_eq!(t.result(), Some(6));
    }

    #[test]
    fn nested_expression_evaluates() {
        // 8*9+5 with + as root: [*, 8, 9] under +, then 5.
        let t = tree("8*9+5", vec![1, 3, 1, -1, 3]);
        assert_eq!(t.result(), Some(77));
    }

    #[test]
    fn monus_and_ceil_div_semantics() {
        let t = tree("3-7", vec![1, -1, 1]);
        assert_eq!(t.result(), Some(0));
        let t = tree("7/2", vec![1, -1, 1]);
        assert_eq!(t.result(), Some(4));
    }

    #[test]
    fn division_by_zero_is_unknown_not_zero() {
        let t = tree("7/0", vec![1, -1, 1]);
        assert_eq!(t.result(), None);
        assert!(matches!(t.last_error(), Some(EvalError::Domain { .. })));
    }

    #[test]
    fn two_roots_give_rootless_tree() {
        let t = tree("1+5", vec![-1, -1, 1]);
        assert_eq!(t.root(), None);
        assert_eq!(t.result(), None);
    }

    #[test]
    fn arity_mismatch_propagates_as_none() {
        // Digit 1 as root with + attached beneath it.
        let t = tree("1+5", vec![-1, 0, 1]);
        assert_eq!(t.result(), None);
    }

    #[test]
    fn child_failure_propagates_to_ancestors() {
        // (7/0)+2 without parens: / fails, + inherits None.
        let t = tree("7/0+2", vec![1, 3, 1, -1, 3]);
        assert_eq!(t.result(), None);
    }

    #[test]
    fn masked_parens_skip_evaluation() {
        let sentence = decode_sentence("(1+5)");
        let parse = Parse::new(
            sentence,
            vec![false, true, true, true, false],
            vec![2, 2, -1, 2, 2],
        );
        let t = ExprTree::build(parse, Arc::new(ground_truth_table()), None);
        assert_eq!(t.result(), Some(6));
    }

    /// Left-associated chain `1+1+...+1` with `levels` additions.
    fn chain_parse(levels: usize) -> Parse {
        let n = 2 * levels + 1;
        let mut sentence = Vec::with_capacity(n);
        let mut head = vec![0i32; n];
        for i in 0..n {
            sentence.push(if i % 2 == 0 { Symbol(1) } else { Symbol::PLUS });
        }
        // p1 takes d0 and d2; every later plus takes the previous plus and
        // the digit to its right; the last plus is the root.
        head[0] = 1;
        head[2] = 1;
        for j in (1..n - 2).step_by(2) {
            head[j] = j as i32 + 2;
        }
        for i in (4..n).step_by(2) {
            head[i] = i as i32 - 1;
        }
        head[n - 2] = -1;
        Parse::unmasked(sentence, head)
    }

    #[test]
    fn depth_bound_is_enforced() {
        let parse = chain_parse(8);
        let shallow = ExprTree::build_bounded(
            parse.clone(),
            Arc::new(ground_truth_table()),
            None,
            2,
        );
        assert_eq!(shallow.result(), None);
        assert!(matches!(
            shallow.last_error(),
            Some(EvalError::DepthExceeded { max_depth: 2 })
        ));

        let deep = ExprTree::build(parse, Arc::new(ground_truth_table()), None);
        assert!(deep.result().is_some());
    }

    #[test]
    fn evaluation_is_deterministic() {
        let a = tree("8*9+5", vec![1, 3, 1, -1, 3]);
        let b = tree("8*9+5", vec![1, 3, 1, -1, 3]);
        assert_eq!(a.result(), b.result());
        for (x, y) in a.nodes().iter().zip(b.nodes()) {
            assert_eq!(x.result, y.result);
        }
    }

    #[test]
    fn bottom_up_order_visits_children_first() {
        let t = tree("8*9+5", vec![1, 3, 1, -1, 3]);
        let order = t.bottom_up();
        let pos = |i: usize| order.iter().position(|&x| x == i).unwrap();
        for (i, node) in t.nodes().iter().enumerate() {
            for &c in &node.children {
                assert!(pos(c) < pos(i), "child {c} must precede parent {i}");
            }
        }
    }
}
