//! Grammar-aware program generation.
//!
//! Programs are sequences of operations drawn uniformly from the target's
//! vocabulary. Arguments come from type-specific synthesizers. Between
//! operations a clause separator is inserted a quarter of the time, so most
//! clauses carry several operations.
//!
//! Everything here is a pure function of the supplied random stream.

use crate::program::{CLAUSE_SEPARATORS, LOCATION_BASES, Operation, Program};
use crate::regex::random_regex;
use rand::Rng;

/// Chance of a clause separator between two consecutive operations.
const SEPARATOR_PROBABILITY: f64 = 0.25;

const DIGITS: &[u8] = b"0123456789";
const UNITS: &[char] = &['b', 'l', 'c'];
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const NAME_TAIL: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_-";
const HEX_DIGITS: &[u8] = b"0123456789ABCDEF";
const STRING_POOL: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789 \t.:;,_-+/\\[]{}()|?*^$@!~\n\r";

/// Uniform choice from a non-empty slice.
///
/// # Panics
/// If `items` is empty. Every caller passes a non-empty constant table.
pub(crate) fn pick<'a, R: Rng + ?Sized, T>(rng: &mut R, items: &'a [T]) -> &'a T {
    &items[rng.random_range(0..items.len())]
}

fn pick_char<R: Rng + ?Sized>(rng: &mut R, pool: &[u8]) -> char {
    *pick(rng, pool) as char
}

/// Every operation the target understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Find,
    FindRegex,
    FindBinary,
    Skip,
    Take,
    Label,
    View,
    ClearView,
    Print,
    Fail,
}

impl OpKind {
    pub const ALL: [OpKind; 10] = [
        OpKind::Find,
        OpKind::FindRegex,
        OpKind::FindBinary,
        OpKind::Skip,
        OpKind::Take,
        OpKind::Label,
        OpKind::View,
        OpKind::ClearView,
        OpKind::Print,
        OpKind::Fail,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            OpKind::Find => "find",
            OpKind::FindRegex => "find:re",
            OpKind::FindBinary => "find:bin",
            OpKind::Skip => "skip",
            OpKind::Take => "take",
            OpKind::Label => "label",
            OpKind::View => "view",
            OpKind::ClearView => "clear",
            OpKind::Print => "print",
            OpKind::Fail => "fail",
        }
    }
}

/// Digit string of 1 to 6 digits. Leading zeros are allowed.
pub fn number<R: Rng + ?Sized>(rng: &mut R) -> String {
    let len = rng.random_range(1..=6);
    (0..len).map(|_| pick_char(rng, DIGITS)).collect()
}

pub fn unit<R: Rng + ?Sized>(rng: &mut R) -> char {
    *pick(rng, UNITS)
}

/// Number plus unit, e.g. `120b`.
pub fn size<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{}{}", number(rng), unit(rng))
}

/// Size that may be negative, e.g. `-5l`.
pub fn signed_size<R: Rng + ?Sized>(rng: &mut R) -> String {
    let sign = if rng.random_bool(0.5) { "-" } else { "" };
    format!("{sign}{}", size(rng))
}

/// Signed offset such as `+10b` or `-5c`.
pub fn offset<R: Rng + ?Sized>(rng: &mut R) -> String {
    let sign = if rng.random_bool(0.5) { '+' } else { '-' };
    format!("{sign}{}", size(rng))
}

/// Label name: an upper-case letter followed by up to nine more characters.
pub fn label_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let len = rng.random_range(1..=10);
    let mut name = String::with_capacity(len);
    name.push(pick_char(rng, UPPER));
    for _ in 1..len {
        name.push(pick_char(rng, NAME_TAIL));
    }
    name
}

/// Free-form string over printable and control characters, trimmed of
/// surrounding whitespace. Never empty.
pub fn string_token<R: Rng + ?Sized>(rng: &mut R) -> String {
    let len = rng.random_range(1..=26);
    let raw: String = (0..len).map(|_| pick_char(rng, STRING_POOL)).collect();
    let trimmed = raw.trim_matches([' ', '\n', '\r', '\t']);
    if trimmed.is_empty() {
        "x".to_string()
    } else {
        trimmed.to_string()
    }
}

/// 1 to 13 hex byte pairs, sometimes space-separated, e.g. `0A 1F2C`.
pub fn hex_string<R: Rng + ?Sized>(rng: &mut R) -> String {
    let pairs = rng.random_range(1..=13);
    let mut hex = String::with_capacity(pairs * 3);
    for i in 0..pairs {
        if i > 0 && rng.random_bool(0.5) {
            hex.push(' ');
        }
        hex.push(pick_char(rng, HEX_DIGITS));
        hex.push(pick_char(rng, HEX_DIGITS));
    }
    hex
}

/// A location base, or a random label a quarter of the time.
pub fn location<R: Rng + ?Sized>(rng: &mut R) -> String {
    if rng.random_bool(0.25) {
        label_name(rng)
    } else {
        pick(rng, &LOCATION_BASES).to_string()
    }
}

/// A location with an optional offset, e.g. `match-end+3l`.
pub fn location_expr<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut loc = location(rng);
    if rng.random_bool(0.3) {
        loc.push_str(&offset(rng));
    }
    loc
}

fn take_arguments<R: Rng + ?Sized>(rng: &mut R) -> Vec<String> {
    if rng.random_bool(0.5) {
        return vec![signed_size(rng)];
    }
    if rng.random_bool(0.4) {
        return vec!["until:re".into(), random_regex(rng)];
    }
    if rng.random_bool(0.5) {
        return vec!["until".into(), string_token(rng)];
    }
    if rng.random_bool(0.5) {
        return vec!["until:bin".into(), hex_string(rng)];
    }
    vec!["to".into(), location_expr(rng)]
}

/// Keyword plus arguments for one operation of the given kind.
pub fn operation_of<R: Rng + ?Sized>(rng: &mut R, kind: OpKind) -> Operation {
    let mut op = vec![kind.keyword().to_string()];
    match kind {
        OpKind::Find | OpKind::Print | OpKind::Fail => op.push(string_token(rng)),
        OpKind::FindRegex => op.push(random_regex(rng)),
        OpKind::FindBinary => op.push(hex_string(rng)),
        OpKind::Skip => op.push(size(rng)),
        OpKind::Take => op.extend(take_arguments(rng)),
        OpKind::Label => op.push(label_name(rng)),
        OpKind::View => {
            op.push(location_expr(rng));
            op.push(location_expr(rng));
        }
        OpKind::ClearView => op.push("view".into()),
    }
    op
}

pub fn random_operation<R: Rng + ?Sized>(rng: &mut R) -> Operation {
    let kind = *pick(rng, &OpKind::ALL);
    operation_of(rng, kind)
}

/// Separator weighted 60/30/10 across `THEN`, `OR`, `AND`.
pub fn clause_separator<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    match rng.random_range(1..=10) {
        1..=6 => CLAUSE_SEPARATORS[0],
        7..=9 => CLAUSE_SEPARATORS[1],
        _ => CLAUSE_SEPARATORS[2],
    }
}

/// Generates programs with an operation count in `min_ops..=max_ops`.
#[derive(Debug, Clone, Copy)]
pub struct ProgramGenerator {
    min_ops: usize,
    max_ops: usize,
}

impl ProgramGenerator {
    /// Bounds are normalised so that `1 <= min_ops <= max_ops`.
    pub fn new(min_ops: usize, max_ops: usize) -> Self {
        let min_ops = min_ops.max(1);
        Self {
            min_ops,
            max_ops: max_ops.max(min_ops),
        }
    }

    /// The operations of one program, without separators.
    pub fn operations<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Operation> {
        let count = rng.random_range(self.min_ops..=self.max_ops);
        (0..count).map(|_| random_operation(rng)).collect()
    }

    /// Flattens operations into a program, maybe separating each pair.
    pub fn assemble<R: Rng + ?Sized>(&self, rng: &mut R, operations: Vec<Operation>) -> Program {
        let count = operations.len();
        let mut tokens = Vec::new();
        for (i, op) in operations.into_iter().enumerate() {
            tokens.extend(op);
            if i + 1 < count && rng.random_bool(SEPARATOR_PROBABILITY) {
                tokens.push(clause_separator(rng).to_string());
            }
        }
        Program::new(tokens)
    }

    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Program {
        let operations = self.operations(rng);
        self.assemble(rng, operations)
    }
}
