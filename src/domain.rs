//! Symbol alphabet for the arithmetic domain.
//!
//! The alphabet is fixed process-wide: ten digits, four binary operators,
//! two parentheses, and three reserved sequence markers. A [`Symbol`] is an
//! index into this alphabet; the first [`Symbol::COUNT`] entries are the
//! evaluable symbols that own a [`SemanticSlot`](crate::semantics::SemanticSlot)
//! in the semantics table.

use serde::{Deserialize, Serialize};

use crate::semantics::{BinaryOp, Program, SemanticSlot, SemanticsTable};

/// Index into the fixed symbol alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Symbol(pub u8);

/// An ordered sequence of symbols, one per input token.
pub type Sentence = Vec<Symbol>;

impl Symbol {
    /// Number of evaluable symbols: digits `0`–`9`, `+ - * /`, `( )`.
    pub const COUNT: usize = 16;
    /// Total alphabet size including the reserved markers.
    pub const TOTAL: usize = 19;

    pub const PLUS: Symbol = Symbol(10);
    pub const MINUS: Symbol = Symbol(11);
    pub const TIMES: Symbol = Symbol(12);
    pub const DIVIDE: Symbol = Symbol(13);
    pub const LPAREN: Symbol = Symbol(14);
    pub const RPAREN: Symbol = Symbol(15);
    pub const START: Symbol = Symbol(16);
    pub const END: Symbol = Symbol(17);
    pub const NULL: Symbol = Symbol(18);

    /// The digit symbol for `d` (0–9). Returns `None` out of range.
    pub fn digit(d: u8) -> Option<Self> {
        (d <= 9).then_some(Symbol(d))
    }

    /// Look up the symbol for a rendered character.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0'..='9' => Symbol::digit(c as u8 - b'0'),
            '+' => Some(Symbol::PLUS),
            '-' => Some(Symbol::MINUS),
            '*' => Some(Symbol::TIMES),
            '/' => Some(Symbol::DIVIDE),
            '(' => Some(Symbol::LPAREN),
            ')' => Some(Symbol::RPAREN),
            _ => None,
        }
    }

    /// Raw alphabet index.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_digit(self) -> bool {
        self.0 <= 9
    }

    pub fn is_operator(self) -> bool {
        (10..=13).contains(&self.0)
    }

    pub fn is_paren(self) -> bool {
        self == Symbol::LPAREN || self == Symbol::RPAREN
    }

    /// Symbols whose slot can carry a program. Parentheses and markers
    /// never bind an interpretation, so no amount of evidence solves them.
    pub fn is_learnable(self) -> bool {
        self.is_digit() || self.is_operator()
    }

    /// Reserved marker symbols (START/END/NULL) carry no interpretation.
    pub fn is_marker(self) -> bool {
        self.0 >= Symbol::COUNT as u8
    }

    /// Rendered form of the symbol.
    pub fn as_str(self) -> &'static str {
        const RENDER: [&str; Symbol::TOTAL] = [
            "0", "1", "2", "3", "4", "5", "6", "7", "8", "9", "+", "-", "*", "/", "(", ")",
            "<START>", "<END>", "<NULL>",
        ];
        RENDER[self.0 as usize]
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decode a rendered expression into a sentence. Unknown characters are skipped.
pub fn decode_sentence(text: &str) -> Sentence {
    text.chars().filter_map(Symbol::from_char).collect()
}

/// Render a sentence back to its string form.
pub fn render_sentence(sentence: &[Symbol]) -> String {
    sentence.iter().map(|s| s.as_str()).collect()
}

/// The ground-truth semantics table for the arithmetic alphabet.
///
/// Digits are solved nullary constants, the four operators are solved binary
/// primitives, and parentheses carry no interpretation. Subtraction is monus
/// (clamped at zero) and division rounds up, so the domain is closed over
/// the non-negative integers.
pub fn ground_truth_table() -> SemanticsTable {
    let mut slots: Vec<SemanticSlot> = (0..Symbol::COUNT).map(SemanticSlot::empty).collect();
    for d in 0..=9u8 {
        slots[d as usize].bind(Program::Const(i64::from(d)), 1.0);
    }
    slots[Symbol::PLUS.index()].bind(Program::Binary(BinaryOp::Add), 1.0);
    slots[Symbol::MINUS.index()].bind(Program::Binary(BinaryOp::Monus), 1.0);
    slots[Symbol::TIMES.index()].bind(Program::Binary(BinaryOp::Mul), 1.0);
    slots[Symbol::DIVIDE.index()].bind(Program::Binary(BinaryOp::CeilDiv), 1.0);
    SemanticsTable::new(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphabet_round_trips_through_chars() {
        for c in "0123456789+-*/()".chars() {
            let sym = Symbol::from_char(c).unwrap();
            assert_eq!(sym.as_str(), c.to_string());
        }
        assert!(Symbol::from_char('x').is_none());
    }

    #[test]
    fn symbol_classes_partition_the_alphabet() {
        for raw in 0..Symbol::TOTAL as u8 {
            let sym = Symbol(raw);
            let classes = [sym.is_digit(), sym.is_operator(), sym.is_paren(), sym.is_marker()];
            assert_eq!(classes.iter().filter(|&&c| c).count(), 1, "symbol {sym}");
        }
    }

    #[test]
    fn decode_render_round_trip() {
        let sentence = decode_sentence("(1+5)*3");
        assert_eq!(sentence.len(), 7);
        assert_eq!(render_sentence(&sentence), "(1+5)*3");
    }

    #[test]
    fn ground_truth_table_covers_evaluable_symbols() {
        let table = ground_truth_table();
        assert_eq!(table.len(), Symbol::COUNT);
        for d in 0..=9u8 {
            let slot = table.slot(Symbol(d));
            assert!(slot.solved);
            assert_eq!(slot.arity, Some(0));
        }
        assert_eq!(table.slot(Symbol::PLUS).arity, Some(2));
        assert!(table.slot(Symbol::LPAREN).program.is_none());
    }
}
