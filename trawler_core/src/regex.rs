//! Random regex patterns in the target's regex dialect.
//!
//! Patterns are built from a small recursive grammar: atoms, optionally
//! quantified, grouped, and joined by alternation. Nesting is capped at four
//! levels. Quantifier bounds and alternation counts deliberately reach past
//! the target's documented limits so its boundary checks get exercised.

use crate::generator::pick;
use rand::Rng;

/// Most alternatives the target's regex compiler documents support for.
pub const ALTERNATION_CEILING: usize = 256;

/// Deepest level at which a term may still open a nested group.
const MAX_DEPTH: usize = 3;

const LITERALS: &[&str] = &["a", "b", "x", "1", "0", " ", "\n"];
const CLASS_ESCAPES: &[&str] = &["\\d", "\\D", "\\w", "\\W", "\\s", "\\S"];
const CONTROL_ESCAPES: &[&str] = &["\\n", "\\t", "\\r", "\\f", "\\v", "\\0"];
const ESCAPED_META: &[&str] = &[
    "\\.", "\\*", "\\+", "\\?", "\\[", "\\]", "\\(", "\\)", "\\{", "\\}", "\\|", "\\^", "\\$",
];
const RANGES: &[&str] = &["a-z", "0-9", "A-Z", "a-zA-Z"];
const NEGATED_RANGES: &[&str] = &["0-9", "a-z", " \t"];
const SET_POOL: &[u8] = b"abcxyz0123";
const ANCHORS: &[&str] = &["^", "$"];
const FILLERS: &[&str] = &["", "a", "x"];

const SIMPLE_QUANTIFIERS: &[&str] = &["*", "+", "?"];
const EXACT_COUNTS: &[u32] = &[0, 1, 2, 3, 5, 10, 20, 50, 99];
const EDGE_QUANTIFIERS: &[&str] = &["{0,100}", "{99,100}", "{50,100}", "{0,1}", "{1,2}", "{100}"];
const EXTREME_QUANTIFIERS: &[&str] = &["{0,999999}", "{999,}", "{40,80}", "{70,99}"];
const UNBOUNDED_TAILS: &[&str] = &["{0,999999}", "{999,}", "{100,}"];
const EMPTY_PATTERNS: &[&str] = &["()*", "(|a)*", "(a|)*", "()*?", "()+", "()"];
const ALTERNATION_CAPS: &[usize] = &[3, 5, 10, 50, 200];

/// The four shapes a generated pattern can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
    Pathological,
}

impl Complexity {
    const ALL: [Complexity; 4] = [
        Complexity::Simple,
        Complexity::Medium,
        Complexity::Complex,
        Complexity::Pathological,
    ];
}

/// Generates a pattern of uniformly chosen complexity.
pub fn random_regex<R: Rng + ?Sized>(rng: &mut R) -> String {
    let complexity = *pick(rng, &Complexity::ALL);
    regex_of(rng, complexity)
}

pub fn regex_of<R: Rng + ?Sized>(rng: &mut R, complexity: Complexity) -> String {
    match complexity {
        Complexity::Simple => term(rng, 0),
        Complexity::Medium => {
            if rng.random_bool(0.5) {
                let count = rng.random_range(1..=3);
                (0..count).map(|_| term(rng, 0)).collect()
            } else {
                alternation(rng, 0)
            }
        }
        Complexity::Complex => {
            let count = rng.random_range(2..=4);
            let mut pattern = String::new();
            for _ in 0..count {
                if rng.random_bool(0.3) {
                    pattern.push_str(&alternation(rng, 1));
                } else {
                    pattern.push_str(&term(rng, 1));
                }
            }
            if rng.random_bool(0.2) {
                pattern.insert(0, '^');
            }
            if rng.random_bool(0.2) {
                pattern.push('$');
            }
            pattern
        }
        Complexity::Pathological => pathological(rng),
    }
}

/// `count` single atoms joined by `|`.
pub fn atom_alternation<R: Rng + ?Sized>(rng: &mut R, count: usize) -> String {
    (0..count)
        .map(|_| atom(rng))
        .collect::<Vec<_>>()
        .join("|")
}

/// An alternation count clustered around [`ALTERNATION_CEILING`], sometimes
/// a few past it.
pub fn near_ceiling_count<R: Rng + ?Sized>(rng: &mut R) -> usize {
    rng.random_range(200..=ALTERNATION_CEILING + 4)
}

fn atom<R: Rng + ?Sized>(rng: &mut R) -> String {
    match rng.random_range(1..=20) {
        1 => pick(rng, LITERALS).to_string(),
        2 => ".".to_string(),
        3..=8 => pick(rng, CLASS_ESCAPES).to_string(),
        9 => pick(rng, CONTROL_ESCAPES).to_string(),
        10 => pick(rng, ESCAPED_META).to_string(),
        11..=14 => bracket_class(rng),
        15 | 16 => pick(rng, ANCHORS).to_string(),
        _ => pick(rng, FILLERS).to_string(),
    }
}

fn bracket_class<R: Rng + ?Sized>(rng: &mut R) -> String {
    match rng.random_range(1..=4) {
        1 => format!("[{}]", pick(rng, RANGES)),
        2 => format!("[^{}]", pick(rng, NEGATED_RANGES)),
        3 => {
            let count = rng.random_range(2..=5);
            let members: String = rand::seq::index::sample(rng, SET_POOL.len(), count)
                .into_iter()
                .map(|i| SET_POOL[i] as char)
                .collect();
            format!("[{members}]")
        }
        _ => "[\\d\\w]".to_string(),
    }
}

fn quantifier<R: Rng + ?Sized>(rng: &mut R) -> String {
    match rng.random_range(1..=11) {
        1..=3 => pick(rng, SIMPLE_QUANTIFIERS).to_string(),
        4 | 5 => format!("{{{}}}", pick(rng, EXACT_COUNTS)),
        6 | 7 => {
            let min = rng.random_range(0..=20);
            let max = min + rng.random_range(1..=30);
            format!("{{{min},{max}}}")
        }
        8 | 9 => pick(rng, EDGE_QUANTIFIERS).to_string(),
        _ => pick(rng, EXTREME_QUANTIFIERS).to_string(),
    }
}

fn maybe_quantifier<R: Rng + ?Sized>(rng: &mut R, p: f64) -> String {
    if rng.random_bool(p) {
        quantifier(rng)
    } else {
        String::new()
    }
}

fn term<R: Rng + ?Sized>(rng: &mut R, depth: usize) -> String {
    if depth > MAX_DEPTH {
        return atom(rng) + &maybe_quantifier(rng, 0.3);
    }
    match rng.random_range(1..=10) {
        1..=6 => atom(rng) + &maybe_quantifier(rng, 0.5),
        7 | 8 if depth < 2 => {
            let inner = term(rng, depth + 1);
            format!("({inner}){}", maybe_quantifier(rng, 0.7))
        }
        _ => {
            // Quantified group around a quantified atom, the classic
            // catastrophic-backtracking shape.
            let inner = atom(rng) + &quantifier(rng);
            format!("({inner}){}", maybe_quantifier(rng, 0.5))
        }
    }
}

fn alternation<R: Rng + ?Sized>(rng: &mut R, depth: usize) -> String {
    let cap = *pick(rng, ALTERNATION_CAPS);
    let count = rng.random_range(2..=cap);
    let joined = (0..count)
        .map(|_| term(rng, depth))
        .collect::<Vec<_>>()
        .join("|");
    if rng.random_bool(0.3) {
        format!("({joined}){}", quantifier(rng))
    } else {
        joined
    }
}

fn pathological<R: Rng + ?Sized>(rng: &mut R) -> String {
    match rng.random_range(1..=10) {
        1 | 2 => {
            let mut nested = atom(rng);
            for _ in 0..rng.random_range(2..=4) {
                nested = format!("({nested}{})", quantifier(rng));
            }
            nested
        }
        3 | 4 => {
            let count = near_ceiling_count(rng);
            atom_alternation(rng, count)
        }
        5 | 6 => pick(rng, EMPTY_PATTERNS).to_string(),
        7 | 8 => atom(rng) + *pick(rng, UNBOUNDED_TAILS),
        _ => {
            let count = rng.random_range(5..=20);
            format!("({}){}", atom_alternation(rng, count), quantifier(rng))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    fn max_group_depth(pattern: &str) -> usize {
        let mut depth = 0usize;
        let mut deepest = 0usize;
        let mut escaped = false;
        for c in pattern.chars() {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' => escaped = true,
                '(' => {
                    depth += 1;
                    deepest = deepest.max(depth);
                }
                ')' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        deepest
    }

    #[test]
    fn same_seed_yields_same_patterns() {
        let mut a = ChaCha8Rng::seed_from_u64(7);
        let mut b = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..200 {
            assert_eq!(random_regex(&mut a), random_regex(&mut b));
        }
    }

    #[test]
    fn nesting_stays_within_four_levels() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..2_000 {
            let pattern = random_regex(&mut rng);
            assert!(
                max_group_depth(&pattern) <= 4,
                "pattern nests too deep: {pattern:?}"
            );
        }
    }

    #[test]
    fn near_ceiling_counts_straddle_the_limit() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let counts: Vec<usize> = (0..2_000).map(|_| near_ceiling_count(&mut rng)).collect();
        assert!(counts.iter().all(|&c| (200..=ALTERNATION_CEILING + 4).contains(&c)));
        assert!(counts.iter().any(|&c| c > ALTERNATION_CEILING));
        assert!(counts.iter().any(|&c| c <= ALTERNATION_CEILING));
    }

    #[test]
    fn atom_alternation_has_requested_arity() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let pattern = atom_alternation(&mut rng, 3);
        // Atoms may themselves contain an escaped bar, so count loosely.
        assert!(pattern.matches('|').count() >= 2);
    }

    #[test]
    fn every_complexity_tier_produces_output() {
        let mut rng = ChaCha8Rng::seed_from_u64(19);
        for complexity in Complexity::ALL {
            // Empty atoms are legal, so only check that generation terminates
            // and mostly yields something.
            let non_empty = (0..50)
                .filter(|_| !regex_of(&mut rng, complexity).is_empty())
                .count();
            assert!(non_empty > 0, "{complexity:?} never produced a pattern");
        }
    }
}
