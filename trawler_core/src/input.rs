//! Input byte streams fed to the target.

use crate::corpus::Corpus;
use crate::generator::pick;
use crate::mutator::{InputMutator, Mutator};
use rand::Rng;

/// Synthetic inputs are grown until they reach a length in this range.
pub const SYNTHETIC_LEN: std::ops::RangeInclusive<usize> = 64..=4160;

const LINE_FRAGMENTS: &[&[u8]] = &[
    b"Starting text\n",
    b"Middle line\n",
    b"Ending line\n",
    b"ERROR: something failed\n",
    b"WARNING: disk almost full\n",
    b"user=john id=12345\n",
    b"[database]\nhost=localhost\nport=5432\n",
    b"BEGIN data ----\n",
    b"END data ----\n",
    b"READY STATE\n",
    b"STATE=READY\n",
];

const FILE_MAGICS: &[&[u8]] = &[b"\x89PNG\r\n\x1a\n", b"\xFF\xD8\xFF", b"PK\x03\x04"];

/// Builds an input from canned text lines, binary file signatures and
/// single random bytes.
///
/// Roughly half of the pieces are text lines; magic numbers are only placed
/// while there is room for them. The final piece may overshoot the target
/// length.
pub fn synthetic_input<R: Rng + ?Sized>(rng: &mut R) -> Vec<u8> {
    let target = rng.random_range(SYNTHETIC_LEN);
    let mut data = Vec::with_capacity(target + 64);
    while data.len() < target {
        match rng.random_range(0..11) {
            0..=5 => data.extend_from_slice(*pick(rng, LINE_FRAGMENTS)),
            6 if data.len() + 8 < target => data.extend_from_slice(*pick(rng, FILE_MAGICS)),
            _ => data.push(rng.random()),
        }
    }
    data
}

/// A corpus seed put through one to six byte mutations, or `None` when the
/// corpus is empty.
pub fn corpus_input<R: Rng + ?Sized>(rng: &mut R, corpus: &Corpus) -> Option<Vec<u8>> {
    let base = corpus.random_select(rng)?.to_vec();
    Some(InputMutator.mutate(&base, rng, Some(corpus)))
}

/// Picks the input for one iteration: corpus-derived with probability
/// `corpus_pct` when a corpus is available, synthetic otherwise.
pub fn next_input<R: Rng + ?Sized>(
    rng: &mut R,
    corpus: Option<&Corpus>,
    corpus_pct: f64,
) -> Vec<u8> {
    if let Some(corpus) = corpus.filter(|c| !c.is_empty()) {
        if rng.random_bool(corpus_pct) {
            if let Some(data) = corpus_input(rng, corpus) {
                return data;
            }
        }
    }
    synthetic_input(rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    #[test]
    fn synthetic_input_length_is_bounded() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let longest_piece = LINE_FRAGMENTS.iter().map(|l| l.len()).max().unwrap();
        for _ in 0..200 {
            let data = synthetic_input(&mut rng);
            assert!(data.len() >= *SYNTHETIC_LEN.start());
            assert!(data.len() < *SYNTHETIC_LEN.end() + longest_piece);
        }
    }

    #[test]
    fn synthetic_input_mixes_text_and_noise() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let data = synthetic_input(&mut rng);
        assert!(data.contains(&b'\n'));
        let text = String::from_utf8_lossy(&data);
        assert!(LINE_FRAGMENTS
            .iter()
            .any(|l| text.contains(&*String::from_utf8_lossy(l))));
    }

    #[test]
    fn empty_corpus_falls_back_to_synthetic() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let corpus = Corpus::new();
        assert!(corpus_input(&mut rng, &corpus).is_none());
        let data = next_input(&mut rng, Some(&corpus), 1.0);
        assert!(data.len() >= *SYNTHETIC_LEN.start());
    }

    #[test]
    fn corpus_inputs_stay_close_to_their_seed() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let corpus = Corpus::from_entries(vec![vec![b'q'; 10]]);
        for _ in 0..50 {
            let data = next_input(&mut rng, Some(&corpus), 1.0);
            // Six insertions of at most 85 bytes each bound the growth.
            assert!(data.len() <= 10 + 6 * 85, "got {} bytes", data.len());
        }
    }
}
