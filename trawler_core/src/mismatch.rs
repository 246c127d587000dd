//! Targeted mutations that steer toward known bug shapes.
//!
//! Each [`BugShape`] encodes one historically fruitful way of making a
//! program disagree with its input: patterns far longer than the data,
//! quantifiers that demand more bytes than exist, alternation floods at the
//! regex engine's limit, dangling label references and clause keywords where
//! an argument belongs. The shapes live in a [`BugShapeTable`] so callers can
//! narrow or extend the set without touching the worker loop.

use crate::generator::pick;
use crate::program::{CLAUSE_SEPARATORS, Program};
use crate::regex::{atom_alternation, near_ceiling_count};
use rand::Rng;

/// Regexes whose minimum match length is known, paired with that length.
const OVERRUN_PATTERNS: &[(&str, usize)] = &[
    (".{50,100}", 50),
    ("a{40,80}", 40),
    ("(..){30,50}", 60),
    ("\\w{70,99}", 70),
    ("(.|\n){80,100}", 80),
];

const PATTERN_OPS: &[&str] = &["find", "find:re", "until", "until:re"];
const ARGUMENT_OPS: &[&str] = &["find", "find:re", "find:bin", "skip", "take", "print", "fail"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BugShape {
    /// Inflate a literal or regex pattern to thousands of characters and
    /// shrink the input to a handful of bytes.
    LongPatternShortInput,
    /// Swap in a regex whose minimum match length exceeds the input size.
    QuantifierOverrun,
    /// Swap in a regex with an alternation count near the engine's limit.
    AlternationFlood,
    /// Prepend a view between two labels that are never defined.
    UndefinedLabel,
    /// Put a clause separator where an operation argument belongs.
    SeparatorAsArgument,
}

impl BugShape {
    pub const ALL: [BugShape; 5] = [
        BugShape::LongPatternShortInput,
        BugShape::QuantifierOverrun,
        BugShape::AlternationFlood,
        BugShape::UndefinedLabel,
        BugShape::SeparatorAsArgument,
    ];

    /// Applies the shape in place. Shapes that need a particular operation
    /// leave both program and input untouched when none is present.
    pub fn apply<R: Rng + ?Sized>(
        self,
        tokens: &mut Vec<String>,
        input: &mut Vec<u8>,
        rng: &mut R,
    ) {
        match self {
            BugShape::LongPatternShortInput => {
                if let Some(i) = argument_after(tokens, PATTERN_OPS) {
                    tokens[i] = "A".repeat(rng.random_range(5_000..=50_000));
                    *input = vec![b'x'; rng.random_range(1..=100)];
                }
            }
            BugShape::QuantifierOverrun => {
                if let Some(i) = argument_after(tokens, &["find:re"]) {
                    let (pattern, min_len) = *pick(rng, OVERRUN_PATTERNS);
                    tokens[i] = pattern.to_string();
                    *input = vec![b'a'; rng.random_range(1..=30usize.min(min_len - 1))];
                }
            }
            BugShape::AlternationFlood => {
                if let Some(i) = argument_after(tokens, &["find:re"]) {
                    let count = near_ceiling_count(rng);
                    tokens[i] = if rng.random_bool(0.5) {
                        vec!["a"; count].join("|")
                    } else {
                        atom_alternation(rng, count)
                    };
                }
            }
            BugShape::UndefinedLabel => {
                let label = format!("label_{}", rng.random_range(1000..=9999));
                tokens.splice(0..0, ["view".to_string(), label.clone(), label]);
            }
            BugShape::SeparatorAsArgument => {
                if let Some(i) = argument_after(tokens, ARGUMENT_OPS) {
                    tokens[i] = pick(rng, &CLAUSE_SEPARATORS).to_string();
                }
            }
        }
    }
}

/// Index of the first token directly following one of `ops`.
fn argument_after(tokens: &[String], ops: &[&str]) -> Option<usize> {
    (1..tokens.len()).find(|&i| ops.contains(&tokens[i - 1].as_str()))
}

/// The set of bug shapes targeted mismatch mutation draws from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BugShapeTable {
    shapes: Vec<BugShape>,
}

impl Default for BugShapeTable {
    fn default() -> Self {
        Self::new(BugShape::ALL.to_vec())
    }
}

impl BugShapeTable {
    pub fn new(shapes: Vec<BugShape>) -> Self {
        Self { shapes }
    }

    /// Applies one uniformly chosen shape. An empty table changes nothing.
    pub fn mutate<R: Rng + ?Sized>(
        &self,
        program: &Program,
        input: &[u8],
        rng: &mut R,
    ) -> (Program, Vec<u8>) {
        let mut tokens = program.tokens().to_vec();
        let mut data = input.to_vec();
        if !self.shapes.is_empty() {
            let shape = *pick(rng, &self.shapes);
            shape.apply(&mut tokens, &mut data, rng);
        }
        (Program::new(tokens), data)
    }
}
