//! Precedence-climbing syntax collaborator.
//!
//! Produces dependency parses in which every operand attaches to its
//! operator and parentheses are masked out, attached to the root of the
//! bracketed subexpression. Deterministic, so training is a no-op; it
//! stands in for a learned parser behind the same trait.

use tracing::trace;

use crate::ast::Parse;
use crate::collab::SyntaxModel;
use crate::domain::{Sentence, Symbol};
use crate::error::SeshatResult;

#[derive(Debug, Default)]
pub struct PrecedenceSyntax;

impl PrecedenceSyntax {
    pub fn new() -> Self {
        Self
    }

    /// Parse one sentence. Malformed input degrades to a flat structure
    /// that keeps the single-root invariant and lets arity checking
    /// reject the tree downstream.
    pub fn parse(&self, sentence: &Sentence) -> Parse {
        match Cursor::run(sentence) {
            Some(parse) => parse,
            None => {
                trace!(len = sentence.len(), "unparseable sentence, flat fallback");
                fallback(sentence)
            }
        }
    }
}

fn precedence(symbol: Symbol) -> Option<u8> {
    match symbol {
        Symbol::PLUS | Symbol::MINUS => Some(1),
        Symbol::TIMES | Symbol::DIVIDE => Some(2),
        _ => None,
    }
}

fn fallback(sentence: &Sentence) -> Parse {
    let mut head = vec![0; sentence.len()];
    if let Some(first) = head.first_mut() {
        *first = -1;
    }
    Parse::unmasked(sentence.clone(), head)
}

struct Cursor<'a> {
    tokens: &'a [Symbol],
    pos: usize,
    head: Vec<i32>,
    mask: Vec<bool>,
}

impl<'a> Cursor<'a> {
    fn run(sentence: &'a Sentence) -> Option<Parse> {
        if sentence.is_empty() {
            return None;
        }
        let mut cursor = Cursor {
            tokens: sentence,
            pos: 0,
            head: vec![0; sentence.len()],
            mask: vec![true; sentence.len()],
        };
        let root = cursor.expression(1)?;
        if cursor.pos != sentence.len() {
            return None;
        }
        cursor.head[root] = -1;
        Some(Parse::new(sentence.clone(), cursor.mask, cursor.head))
    }

    fn expression(&mut self, min_precedence: u8) -> Option<usize> {
        let mut lhs = self.atom()?;
        while let Some((op, prec)) = self.peek_operator(min_precedence) {
            self.pos += 1;
            let rhs = self.expression(prec + 1)?;
            self.head[lhs] = op as i32;
            self.head[rhs] = op as i32;
            lhs = op;
        }
        Some(lhs)
    }

    fn peek_operator(&self, min_precedence: u8) -> Option<(usize, u8)> {
        let symbol = *self.tokens.get(self.pos)?;
        let prec = precedence(symbol)?;
        (prec >= min_precedence).then_some((self.pos, prec))
    }

    fn atom(&mut self) -> Option<usize> {
        let symbol = *self.tokens.get(self.pos)?;
        if symbol.is_digit() {
            let pos = self.pos;
            self.pos += 1;
            return Some(pos);
        }
        if symbol == Symbol::LPAREN {
            let open = self.pos;
            self.pos += 1;
            let inner = self.expression(1)?;
            if *self.tokens.get(self.pos)? != Symbol::RPAREN {
                return None;
            }
            let close = self.pos;
            self.pos += 1;
            self.mask[open] = false;
            self.mask[close] = false;
            self.head[open] = inner as i32;
            self.head[close] = inner as i32;
            return Some(inner);
        }
        None
    }
}

impl SyntaxModel for PrecedenceSyntax {
    fn infer(&self, sentences: &[Sentence]) -> Vec<Parse> {
        sentences.iter().map(|s| self.parse(s)).collect()
    }

    fn train(&mut self, _parses: &[Parse]) {}

    fn save_state(&self) -> SeshatResult<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    fn load_state(&mut self, _state: serde_json::Value) -> SeshatResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::decode_sentence;

    fn parse(text: &str) -> Parse {
        PrecedenceSyntax::new().parse(&decode_sentence(text))
    }

    #[test]
    fn single_digit_is_its_own_root() {
        let p = parse("7");
        assert_eq!(p.head, vec![-1]);
        assert_eq!(p.mask, vec![true]);
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        // 2*3+4: '+' is the root, '*' its left child.
        let p = parse("2*3+4");
        assert_eq!(p.head, vec![1, 3, 1, -1, 3]);
    }

    #[test]
    fn equal_precedence_associates_left() {
        // 9-3-2: outer '-' at position 3 is the root.
        let p = parse("9-3-2");
        assert_eq!(p.head, vec![1, 3, 1, -1, 3]);
    }

    #[test]
    fn parentheses_are_masked_and_attached_inward() {
        // (1+5)*2
        let p = parse("(1+5)*2");
        assert_eq!(p.mask, vec![false, true, true, true, false, true, true]);
        assert_eq!(p.head, vec![2, 2, 5, 2, 2, -1, 5]);
    }

    #[test]
    fn parses_satisfy_tree_invariant() {
        for text in ["8", "1+2", "2*3+4", "((7))", "6/(3-1)*4"] {
            let p = parse(text);
            let roots = p.head.iter().filter(|&&h| h == -1).count();
            assert_eq!(roots, 1, "{text}");
        }
    }

    #[test]
    fn malformed_input_degrades_to_flat_parse() {
        for text in ["+", "1+", "(1+2", "12", "*3"] {
            let p = parse(text);
            let roots = p.head.iter().filter(|&&h| h == -1).count();
            assert_eq!(roots, 1, "{text}");
            assert!(p.mask.iter().all(|&m| m), "{text}");
        }
    }
}
