use crate::corpus::Corpus;
use crate::generator::pick;
use crate::program::{CLAUSE_SEPARATORS, OPERATION_KEYWORDS, Program, SUB_KEYWORDS};
use crate::regex::random_regex;
use rand::Rng;

const EXTREME_SIZES: &[&str] = &[
    "0b",
    "0c",
    "0l",
    "999999999b",
    "999999999c",
    "999999999l",
    "-1b",
    "-1c",
    "-1l",
];

const EXTREME_LOCATIONS: &[&str] = &[
    "BOF+999999999b",
    "EOF-999999999b",
    "BOF+999999999c",
    "EOF-999999999c",
    "BOF+999999999l",
    "EOF-999999999l",
    "cursor+999999999b",
    "cursor-999999999b",
    "match-start+999999999b",
    "match-end-999999999b",
];

const GARBAGE: &[&str] = &[
    "",
    " ",
    "  ",
    "\t",
    "\n",
    "999999999999999999999",
    "-999999999999999999999",
    "0x",
    ":::",
    "...",
    "---",
    "+++",
    "////",
    "[[[[",
    "]]]]",
    "{{{{",
    "}}}}",
    "____",
    "INVALID",
];

const INVALID_HEX: &[&str] = &["G", "ZZ", "0G", "1H", "XY", "  ", "0", "000", "FFFFF"];

/// Most mutations a single [`ProgramMutator::mutate`] call applies.
const MAX_PROGRAM_MUTATIONS: usize = 2;
/// Byte mutations applied per input, inclusive range.
const INPUT_MUTATIONS: std::ops::RangeInclusive<usize> = 1..=6;

/// A `Mutator` transforms a value into a new, potentially modified value.
///
/// Mutators never fail: a transform whose precondition does not hold for the
/// given value (too short, no matching token, corpus too small) leaves it
/// unchanged.
///
/// # Type Parameters
/// * `T`: The type of value this mutator operates on.
/// * `R`: The type of random number generator used for mutation decisions.
pub trait Mutator<T, R: Rng + ?Sized> {
    /// Produces a mutated copy of `input`.
    ///
    /// # Arguments
    /// * `input`: The value to base the mutation on.
    /// * `rng`: A mutable reference to a random number generator.
    /// * `corpus`: Seeds some mutators draw data from. Optional.
    fn mutate(&mut self, input: &T, rng: &mut R, corpus: Option<&Corpus>) -> T;
}

/// `true` for tokens like `12b`, `-5l`, `0c`.
fn is_size_token(token: &str) -> bool {
    let Some(unit) = token.chars().last() else {
        return false;
    };
    if !matches!(unit, 'b' | 'l' | 'c') {
        return false;
    }
    is_integer(&token[..token.len() - 1])
}

/// `true` for an optionally negative run of ASCII digits.
fn is_integer(token: &str) -> bool {
    let digits = token.trim_start_matches('-');
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn is_location_token(token: &str) -> bool {
    matches!(token, "BOF" | "EOF" | "cursor")
        || token.starts_with("match-")
        || token.starts_with("line-")
}

/// Index of the first element of `candidates` that wins a coin flip.
fn coin_flip_first<R, I>(rng: &mut R, candidates: I) -> Option<usize>
where
    R: Rng + ?Sized,
    I: IntoIterator<Item = usize>,
{
    candidates.into_iter().find(|_| rng.random_bool(0.5))
}

/// The thirteen structural transforms applied to programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramMutation {
    /// Replace a size token with an extreme value such as `999999999b`.
    ExtremeSize,
    /// Replace a location token with a far out-of-range offset.
    ExtremeLocation,
    /// Regenerate the pattern following `find:re` or `until:re`.
    RerollRegex,
    DeleteToken,
    DuplicateToken,
    SwapAdjacent,
    /// Insert any vocabulary keyword at a random position.
    InsertKeyword,
    /// Overwrite a token with adversarial garbage.
    Garbage,
    /// Negate a size token, or drop its minus sign.
    SignFlip,
    /// Replace a binary pattern with an invalid hex string.
    CorruptHex,
    /// Add or subtract one from a bare integer.
    OffByOne,
    /// Remove one clause separator.
    DropSeparator,
    /// Copy a run of two or three tokens to another position.
    DuplicateRun,
}

impl ProgramMutation {
    pub const ALL: [ProgramMutation; 13] = [
        ProgramMutation::ExtremeSize,
        ProgramMutation::ExtremeLocation,
        ProgramMutation::RerollRegex,
        ProgramMutation::DeleteToken,
        ProgramMutation::DuplicateToken,
        ProgramMutation::SwapAdjacent,
        ProgramMutation::InsertKeyword,
        ProgramMutation::Garbage,
        ProgramMutation::SignFlip,
        ProgramMutation::CorruptHex,
        ProgramMutation::OffByOne,
        ProgramMutation::DropSeparator,
        ProgramMutation::DuplicateRun,
    ];

    /// Applies the transform in place. No-op when its precondition fails.
    pub fn apply<R: Rng + ?Sized>(self, tokens: &mut Vec<String>, rng: &mut R) {
        let len = tokens.len();
        match self {
            ProgramMutation::ExtremeSize => {
                let sizes = (0..len).filter(|&i| is_size_token(&tokens[i])).collect::<Vec<_>>();
                if let Some(i) = coin_flip_first(rng, sizes) {
                    tokens[i] = pick(rng, EXTREME_SIZES).to_string();
                }
            }
            ProgramMutation::ExtremeLocation => {
                let locations = (0..len)
                    .filter(|&i| is_location_token(&tokens[i]))
                    .collect::<Vec<_>>();
                if let Some(i) = coin_flip_first(rng, locations) {
                    tokens[i] = pick(rng, EXTREME_LOCATIONS).to_string();
                }
            }
            ProgramMutation::RerollRegex if len > 2 => {
                let patterns = (1..len)
                    .filter(|&i| matches!(tokens[i - 1].as_str(), "find:re" | "until:re"))
                    .collect::<Vec<_>>();
                if let Some(i) = coin_flip_first(rng, patterns) {
                    tokens[i] = random_regex(rng);
                }
            }
            ProgramMutation::DeleteToken if len > 1 => {
                tokens.remove(rng.random_range(0..len));
            }
            ProgramMutation::DuplicateToken if len > 1 => {
                let pos = rng.random_range(0..len);
                let copy = tokens[pos].clone();
                tokens.insert(pos, copy);
            }
            ProgramMutation::SwapAdjacent if len > 2 => {
                let pos = rng.random_range(0..len - 1);
                tokens.swap(pos, pos + 1);
            }
            ProgramMutation::InsertKeyword if len > 0 => {
                let keywords: Vec<&str> = OPERATION_KEYWORDS
                    .iter()
                    .chain(SUB_KEYWORDS.iter())
                    .chain(CLAUSE_SEPARATORS.iter())
                    .copied()
                    .collect();
                let pos = rng.random_range(0..=len);
                tokens.insert(pos, pick(rng, &keywords).to_string());
            }
            ProgramMutation::Garbage if len > 0 => {
                let pos = rng.random_range(0..len);
                tokens[pos] = pick(rng, GARBAGE).to_string();
            }
            ProgramMutation::SignFlip => {
                let sizes = (0..len).filter(|&i| is_size_token(&tokens[i])).collect::<Vec<_>>();
                if let Some(i) = coin_flip_first(rng, sizes) {
                    let flipped = match tokens[i].strip_prefix('-') {
                        Some(positive) => positive.to_string(),
                        None => format!("-{}", tokens[i]),
                    };
                    tokens[i] = flipped;
                }
            }
            ProgramMutation::CorruptHex if len > 1 => {
                let patterns = (1..len)
                    .filter(|&i| matches!(tokens[i - 1].as_str(), "find:bin" | "until:bin"))
                    .collect::<Vec<_>>();
                if let Some(i) = coin_flip_first(rng, patterns) {
                    tokens[i] = pick(rng, INVALID_HEX).to_string();
                }
            }
            ProgramMutation::OffByOne => {
                let integers = (0..len)
                    .filter(|&i| is_integer(&tokens[i]))
                    .collect::<Vec<_>>();
                if let Some(i) = coin_flip_first(rng, integers) {
                    // Digit runs too long even for i128 are left alone.
                    if let Ok(n) = tokens[i].parse::<i128>() {
                        let delta = if rng.random_bool(0.5) { 1 } else { -1 };
                        tokens[i] = n.saturating_add(delta).to_string();
                    }
                }
            }
            ProgramMutation::DropSeparator => {
                let separators = (0..len)
                    .rev()
                    .filter(|&i| CLAUSE_SEPARATORS.contains(&tokens[i].as_str()))
                    .collect::<Vec<_>>();
                if let Some(i) = coin_flip_first(rng, separators) {
                    tokens.remove(i);
                }
            }
            ProgramMutation::DuplicateRun if len > 2 => {
                let start = rng.random_range(0..len - 1);
                let count = rng.random_range(2..=3).min(len - start);
                let run: Vec<String> = tokens[start..start + count].to_vec();
                let pos = rng.random_range(0..=len);
                tokens.splice(pos..pos, run);
            }
            _ => {}
        }
    }
}

/// Applies zero to two randomly chosen [`ProgramMutation`]s per call.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProgramMutator;

impl<R: Rng + ?Sized> Mutator<Program, R> for ProgramMutator {
    fn mutate(&mut self, input: &Program, rng: &mut R, _corpus: Option<&Corpus>) -> Program {
        let mut tokens = input.tokens().to_vec();
        let count = rng.random_range(0..=MAX_PROGRAM_MUTATIONS);
        for _ in 0..count {
            let mutation = *pick(rng, &ProgramMutation::ALL);
            mutation.apply(&mut tokens, rng);
        }
        Program::new(tokens)
    }
}

/// The eight byte-level transforms applied to inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteMutation {
    BitFlip,
    /// Overwrite one byte with a random value.
    ByteFlip,
    ByteInsert,
    ByteDelete,
    /// Insert 1 to 17 random bytes.
    ChunkInsert,
    /// Remove up to 33 consecutive bytes.
    ChunkDelete,
    /// Cross over with another corpus entry at a common offset.
    Splice,
    /// Re-insert an existing chunk 1 to 5 times.
    Repeat,
}

impl ByteMutation {
    pub const ALL: [ByteMutation; 8] = [
        ByteMutation::BitFlip,
        ByteMutation::ByteFlip,
        ByteMutation::ByteInsert,
        ByteMutation::ByteDelete,
        ByteMutation::ChunkInsert,
        ByteMutation::ChunkDelete,
        ByteMutation::Splice,
        ByteMutation::Repeat,
    ];

    /// Applies the transform in place. No-op when its precondition fails.
    pub fn apply<R: Rng + ?Sized>(self, data: &mut Vec<u8>, rng: &mut R, corpus: Option<&Corpus>) {
        let len = data.len();
        match self {
            ByteMutation::BitFlip if len > 0 => {
                let pos = rng.random_range(0..len);
                data[pos] ^= 1u8 << rng.random_range(0..8u32);
            }
            ByteMutation::ByteFlip if len > 0 => {
                let pos = rng.random_range(0..len);
                data[pos] = rng.random();
            }
            ByteMutation::ByteInsert => {
                let pos = rng.random_range(0..=len);
                data.insert(pos, rng.random());
            }
            ByteMutation::ByteDelete if len > 1 => {
                data.remove(rng.random_range(0..len));
            }
            ByteMutation::ChunkInsert => {
                let size = rng.random_range(1..=17);
                let chunk: Vec<u8> = (0..size).map(|_| rng.random()).collect();
                let pos = rng.random_range(0..=len);
                data.splice(pos..pos, chunk);
            }
            ByteMutation::ChunkDelete if len > 1 => {
                let size = rng.random_range(1..=33).min(len);
                let pos = rng.random_range(0..=len - size);
                data.drain(pos..pos + size);
            }
            ByteMutation::Splice => {
                let Some(corpus) = corpus.filter(|c| c.len() >= 2) else {
                    return;
                };
                let Some(other) = corpus.random_select(rng) else {
                    return;
                };
                // The result is as long as `other`, never longer.
                let split = rng.random_range(0..=len.min(other.len()));
                data.truncate(split);
                data.extend_from_slice(&other[split..]);
            }
            ByteMutation::Repeat if len > 0 => {
                let size = rng.random_range(1..=17).min(len);
                let pos = rng.random_range(0..=len - size);
                let chunk = data[pos..pos + size].to_vec();
                let count = rng.random_range(1..=5);
                let at = rng.random_range(0..=len);
                data.splice(at..at, chunk.repeat(count));
            }
            _ => {}
        }
    }
}

/// Applies one to six randomly chosen [`ByteMutation`]s in sequence.
#[derive(Debug, Default, Clone, Copy)]
pub struct InputMutator;

impl<R: Rng + ?Sized> Mutator<Vec<u8>, R> for InputMutator {
    fn mutate(&mut self, input: &Vec<u8>, rng: &mut R, corpus: Option<&Corpus>) -> Vec<u8> {
        let mut data = input.clone();
        let count = rng.random_range(INPUT_MUTATIONS);
        for _ in 0..count {
            let mutation = *pick(rng, &ByteMutation::ALL);
            mutation.apply(&mut data, rng, corpus);
        }
        data
    }
}
