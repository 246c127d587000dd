//! Token-level representation of a target program.

use std::fmt;

/// Clause separators, listed in descending order of generation weight.
pub const CLAUSE_SEPARATORS: [&str; 3] = ["THEN", "OR", "AND"];

/// Keywords that start an operation.
pub const OPERATION_KEYWORDS: [&str; 10] = [
    "find", "find:re", "find:bin", "skip", "take", "label", "view", "clear", "print", "fail",
];

/// Keywords that only ever appear inside an operation.
pub const SUB_KEYWORDS: [&str; 5] = ["to", "until", "until:re", "until:bin", "at"];

/// Location bases understood by the target.
pub const LOCATION_BASES: [&str; 7] = [
    "cursor",
    "BOF",
    "EOF",
    "match-start",
    "match-end",
    "line-start",
    "line-end",
];

pub fn is_clause_separator(token: &str) -> bool {
    CLAUSE_SEPARATORS.contains(&token)
}

/// One operation: its keyword followed by its arguments.
pub type Operation = Vec<String>;

/// An ordered token sequence passed verbatim to the target after `--`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    tokens: Vec<String>,
}

impl Program {
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut Vec<String> {
        &mut self.tokens
    }

    pub fn into_tokens(self) -> Vec<String> {
        self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Copy of the program with the token at `index` removed.
    pub fn without(&self, index: usize) -> Self {
        let mut tokens = self.tokens.clone();
        if index < tokens.len() {
            tokens.remove(index);
        }
        Self { tokens }
    }

    /// Line-oriented form used for `case_<id>.ops.txt`.
    pub fn to_lines(&self) -> String {
        self.tokens.join("\n")
    }

    /// Inverse of [`Program::to_lines`]. Every line is a token, so empty
    /// tokens survive anywhere in the program. Only an empty text is the
    /// empty program, and a token that is itself a newline cannot survive
    /// this format.
    pub fn from_lines(text: &str) -> Self {
        if text.is_empty() {
            return Self::default();
        }
        Self {
            tokens: text.split('\n').map(str::to_string).collect(),
        }
    }
}

impl From<Vec<String>> for Program {
    fn from(tokens: Vec<String>) -> Self {
        Self::new(tokens)
    }
}

impl From<Vec<&str>> for Program {
    fn from(tokens: Vec<&str>) -> Self {
        Self::new(tokens.into_iter().map(str::to_string).collect())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_round_trip_plain_tokens() {
        let program = Program::from(vec!["find", "abc", "THEN", "take", "+3b"]);
        assert_eq!(program.to_lines(), "find\nabc\nTHEN\ntake\n+3b");
        assert_eq!(Program::from_lines(&program.to_lines()), program);
    }

    #[test]
    fn empty_tokens_survive_the_line_format() {
        for tokens in [vec!["find", "x", ""], vec!["", "take", "5b"], vec!["skip", "", "1b"]] {
            let program = Program::from(tokens);
            assert_eq!(Program::from_lines(&program.to_lines()), program);
        }
        assert!(Program::from_lines("").is_empty());
        assert_eq!(Program::from_lines("\n"), Program::from(vec!["", ""]));
    }

    #[test]
    fn without_removes_one_token_and_ignores_out_of_range() {
        let program = Program::from(vec!["a", "b", "c"]);
        assert_eq!(program.without(1), Program::from(vec!["a", "c"]));
        assert_eq!(program.without(7), program);
    }

    #[test]
    fn separators_are_recognised() {
        assert!(is_clause_separator("THEN"));
        assert!(is_clause_separator("AND"));
        assert!(!is_clause_separator("then"));
        assert!(!is_clause_separator("find"));
    }
}
