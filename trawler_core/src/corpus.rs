use log::debug;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Seed files larger than this are skipped when loading a corpus.
pub const MAX_SEED_SIZE: u64 = 512 * 1024;

/// Defines errors that can arise while loading a corpus.
#[derive(Error, Debug)]
pub enum CorpusError {
    /// The corpus path exists but could not be listed.
    #[error("failed to read corpus directory {path:?}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A read-only collection of seed byte blobs.
///
/// Each worker loads its own copy once at startup. Nothing mutates it
/// afterwards, so there is no sharing or locking to worry about.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    entries: Vec<Vec<u8>>,
}

impl Corpus {
    /// Creates an empty corpus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps already loaded seeds.
    pub fn from_entries(entries: Vec<Vec<u8>>) -> Self {
        Self { entries }
    }

    /// Loads every non-empty file up to [`MAX_SEED_SIZE`] below `dir`,
    /// recursing into subdirectories.
    ///
    /// A missing directory yields an empty corpus. Files that cannot be read
    /// are skipped. Files are visited in sorted path order so that the same
    /// directory always produces the same entry order.
    pub fn load_from_dir(dir: &Path) -> Result<Self, CorpusError> {
        let mut corpus = Self::new();
        if !dir.exists() {
            debug!("Corpus directory {dir:?} does not exist, using an empty corpus");
            return Ok(corpus);
        }
        corpus.load_recursive(dir)?;
        Ok(corpus)
    }

    fn load_recursive(&mut self, dir: &Path) -> Result<(), CorpusError> {
        let read_dir = fs::read_dir(dir).map_err(|source| CorpusError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = read_dir
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        paths.sort();

        for path in paths {
            if path.is_dir() {
                self.load_recursive(&path)?;
                continue;
            }
            if !path.is_file() {
                continue;
            }
            let size = match fs::metadata(&path) {
                Ok(meta) => meta.len(),
                Err(e) => {
                    debug!("Skipping corpus file {path:?}: {e}");
                    continue;
                }
            };
            if size == 0 || size > MAX_SEED_SIZE {
                continue;
            }
            match fs::read(&path) {
                Ok(data) => self.entries.push(data),
                Err(e) => debug!("Skipping corpus file {path:?}: {e}"),
            }
        }
        Ok(())
    }

    /// Returns the total number of seeds.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the corpus contains no seeds.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.entries.get(index).map(Vec::as_slice)
    }

    /// Picks a seed uniformly at random, or `None` if the corpus is empty.
    pub fn random_select<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&[u8]> {
        if self.entries.is_empty() {
            return None;
        }
        let index = rng.random_range(0..self.entries.len());
        Some(&self.entries[index])
    }
}
