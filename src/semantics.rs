//! Semantic slots: the per-symbol binding of a symbol to a numeric program.
//!
//! A [`SemanticSlot`] couples a symbol index with an optional [`Program`],
//! an arity, and a solved/confidence status. Slots are produced by the
//! semantics collaborator and consumed read-only by the evaluator: a
//! [`SemanticsTable`] is an immutable snapshot handed to each expression
//! tree at build time, and a new snapshot is published only between
//! training rounds.

use serde::{Deserialize, Serialize};

use crate::domain::Symbol;
use crate::error::EvalError;

/// One training example for a symbol: the children's results and the
/// node's own result. `None` marks a failed evaluation.
pub type Example = (Vec<i64>, Option<i64>);

/// Binary primitives of the arithmetic domain.
///
/// The same set doubles as the candidate library for program induction in
/// [`SlotStore`](crate::collab::SlotStore): an arity-2 slot is solved by
/// whichever primitive best explains its examples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `x + y`, checked.
    Add,
    /// Monus: `max(0, x - y)`.
    Monus,
    /// `x * y`, checked.
    Mul,
    /// Ceiling division; undefined for `y == 0`.
    CeilDiv,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 4] = [BinaryOp::Add, BinaryOp::Monus, BinaryOp::Mul, BinaryOp::CeilDiv];

    /// Apply the primitive with checked arithmetic.
    pub fn apply(self, x: i64, y: i64) -> Result<i64, EvalError> {
        match self {
            BinaryOp::Add => x.checked_add(y).ok_or(EvalError::Overflow),
            BinaryOp::Monus => Ok(x.saturating_sub(y).max(0)),
            BinaryOp::Mul => x.checked_mul(y).ok_or(EvalError::Overflow),
            BinaryOp::CeilDiv => {
                if y == 0 {
                    return Err(EvalError::Domain {
                        message: "division by zero".into(),
                    });
                }
                x.checked_div(y).ok_or(EvalError::Overflow).map(|q| {
                    // Round toward +inf: adjust truncated quotient when there
                    // is a remainder and the signs agree.
                    if x % y != 0 && (x < 0) == (y < 0) { q + 1 } else { q }
                })
            }
        }
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "add"),
            BinaryOp::Monus => write!(f, "monus"),
            BinaryOp::Mul => write!(f, "mul"),
            BinaryOp::CeilDiv => write!(f, "ceil-div"),
        }
    }
}

/// A callable interpretation of a symbol.
///
/// Modeled as a tagged union with a fixed arity per variant; evaluation
/// matches on the variant rather than dispatching through a boxed closure,
/// so programs stay `Copy`, comparable, and serializable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Program {
    /// Nullary constant.
    Const(i64),
    /// Binary primitive.
    Binary(BinaryOp),
}

impl Program {
    pub fn arity(self) -> usize {
        match self {
            Program::Const(_) => 0,
            Program::Binary(_) => 2,
        }
    }

    /// Invoke the program with exactly `arity` positional arguments.
    pub fn apply(self, args: &[i64]) -> Result<i64, EvalError> {
        if args.len() != self.arity() {
            return Err(EvalError::ArityMismatch {
                expected: self.arity(),
                actual: args.len(),
            });
        }
        match self {
            Program::Const(value) => Ok(value),
            Program::Binary(op) => op.apply(args[0], args[1]),
        }
    }
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Program::Const(value) => write!(f, "{value}"),
            Program::Binary(op) => write!(f, "{op}"),
        }
    }
}

/// Per-symbol record binding a symbol to its interpretation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticSlot {
    /// Symbol index this slot interprets.
    pub idx: usize,
    /// The interpretation, absent while the symbol is still unexplained.
    pub program: Option<Program>,
    /// Argument count the program expects.
    pub arity: Option<usize>,
    /// Whether the semantics collaborator considers this slot settled.
    pub solved: bool,
    /// Likelihood of the program on the slot's examples.
    pub confidence: f64,
}

impl SemanticSlot {
    /// A slot with no interpretation yet.
    pub fn empty(idx: usize) -> Self {
        Self {
            idx,
            program: None,
            arity: None,
            solved: false,
            confidence: 0.0,
        }
    }

    /// Bind a program to this slot and mark it solved.
    pub fn bind(&mut self, program: Program, confidence: f64) {
        self.arity = Some(program.arity());
        self.program = Some(program);
        self.solved = true;
        self.confidence = confidence;
    }

    /// Invoke the slot's program with the given positional arguments.
    pub fn apply(&self, args: &[i64]) -> Result<i64, EvalError> {
        let program = self.program.ok_or(EvalError::MissingInterpretation { symbol: self.idx })?;
        // The recorded arity can lag behind the program during induction;
        // the program's own arity is authoritative at call time.
        program.apply(args)
    }
}

/// Immutable snapshot of all semantic slots, indexed by symbol id.
///
/// Shared across trees via `Arc`; never mutated while evaluation is in
/// flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticsTable {
    slots: Vec<SemanticSlot>,
}

impl SemanticsTable {
    pub fn new(slots: Vec<SemanticSlot>) -> Self {
        Self { slots }
    }

    /// An all-empty table over the evaluable alphabet.
    pub fn unsolved() -> Self {
        Self::new((0..Symbol::COUNT).map(SemanticSlot::empty).collect())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The slot for a symbol. Markers fall outside the table; callers must
    /// not look them up.
    pub fn slot(&self, symbol: Symbol) -> &SemanticSlot {
        &self.slots[symbol.index()]
    }

    pub fn slots(&self) -> &[SemanticSlot] {
        &self.slots
    }

    /// Learnable symbols whose slot is not yet solved. Parenthesis slots
    /// never solve and are excluded, so abductive rebinding cannot pin a
    /// result on a symbol with no interpretation.
    pub fn unsolved_symbols(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.slots
            .iter()
            .filter(|s| !s.solved)
            .map(|s| Symbol(s.idx as u8))
            .filter(|s| s.is_learnable())
    }
}
