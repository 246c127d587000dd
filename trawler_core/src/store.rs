//! On-disk case artifacts.
//!
//! Every saved case is three sibling files sharing its id:
//! `case_<id>.ops.txt` (one token per line), `case_<id>.input.bin` (raw
//! bytes) and `case_<id>.meta.txt` (`exit=`, `signal=`, `timed_out=` lines).

use crate::executor::ExecutionResult;
use crate::program::Program;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to create run directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed metadata in {path:?}: {reason}")]
    Meta { path: PathBuf, reason: String },
    #[error("case {0} not found")]
    CaseNotFound(u64),
}

/// A persisted case read back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseRecord {
    pub id: u64,
    pub program: Program,
    pub input: Vec<u8>,
    pub result: ExecutionResult,
}

pub fn ops_file_name(id: u64) -> String {
    format!("case_{id}.ops.txt")
}

pub fn input_file_name(id: u64) -> String {
    format!("case_{id}.input.bin")
}

pub fn meta_file_name(id: u64) -> String {
    format!("case_{id}.meta.txt")
}

/// One run directory's worth of cases.
#[derive(Debug, Clone)]
pub struct CaseStore {
    dir: PathBuf,
}

impl CaseStore {
    /// Opens the store, creating the directory if needed.
    pub fn new(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir).map_err(|source| StoreError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn contains(&self, id: u64) -> bool {
        self.dir.join(meta_file_name(id)).is_file()
    }

    pub fn save_case(
        &self,
        id: u64,
        program: &Program,
        input: &[u8],
        result: &ExecutionResult,
    ) -> Result<(), StoreError> {
        self.write(&ops_file_name(id), program.to_lines().as_bytes())?;
        self.write(&input_file_name(id), input)?;
        self.write(&meta_file_name(id), format_meta(result).as_bytes())
    }

    pub fn load_case(&self, id: u64) -> Result<CaseRecord, StoreError> {
        let meta_path = self.dir.join(meta_file_name(id));
        if !meta_path.is_file() {
            return Err(StoreError::CaseNotFound(id));
        }
        let ops = String::from_utf8_lossy(&self.read(&ops_file_name(id))?).into_owned();
        let input = self.read(&input_file_name(id))?;
        let meta = String::from_utf8_lossy(&self.read(&meta_file_name(id))?).into_owned();
        let result = parse_meta(&meta).map_err(|reason| StoreError::Meta {
            path: meta_path,
            reason,
        })?;

        Ok(CaseRecord {
            id,
            program: Program::from_lines(&ops),
            input,
            result,
        })
    }

    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.dir.join(name);
        std::fs::write(&path, bytes).map_err(|source| StoreError::Write { path, source })
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.dir.join(name);
        std::fs::read(&path).map_err(|source| StoreError::Read { path, source })
    }
}

pub fn format_meta(result: &ExecutionResult) -> String {
    result
        .to_string()
        .split(' ')
        .map(|field| format!("{field}\n"))
        .collect()
}

/// Parses the `key=value` lines of a meta file. Unknown keys are ignored;
/// `exit` is required.
pub fn parse_meta(text: &str) -> Result<ExecutionResult, String> {
    let mut exit_code = None;
    let mut signal = None;
    let mut timed_out = false;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some((key, value)) = line.split_once('=') else {
            return Err(format!("expected key=value, got {line:?}"));
        };
        match key {
            "exit" => {
                exit_code = Some(
                    value
                        .parse::<i32>()
                        .map_err(|e| format!("bad exit code {value:?}: {e}"))?,
                )
            }
            "signal" if value == "None" => signal = None,
            "signal" => {
                signal = Some(
                    value
                        .parse::<i32>()
                        .map_err(|e| format!("bad signal {value:?}: {e}"))?,
                )
            }
            "timed_out" => {
                timed_out = value
                    .parse::<bool>()
                    .map_err(|e| format!("bad timed_out {value:?}: {e}"))?
            }
            _ => {}
        }
    }

    let exit_code = exit_code.ok_or_else(|| "missing exit line".to_string())?;
    Ok(ExecutionResult {
        exit_code,
        signal,
        timed_out,
    })
}

/// Finds the run directory holding case `id`.
///
/// A named `run_dir` is tried first. Failing that, the `run_*` directories
/// under `artifacts` are searched newest first, which the timestamped names
/// make a reverse lexicographic order.
pub fn locate_case(
    artifacts: &Path,
    run_dir: Option<&Path>,
    id: u64,
) -> Result<PathBuf, StoreError> {
    if let Some(dir) = run_dir.filter(|dir| dir.join(meta_file_name(id)).is_file()) {
        return Ok(dir.to_path_buf());
    }

    let entries = match std::fs::read_dir(artifacts) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::CaseNotFound(id));
        }
        Err(source) => {
            return Err(StoreError::Read {
                path: artifacts.to_path_buf(),
                source,
            });
        }
    };

    let mut runs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().starts_with("run_"))
        })
        .collect();
    runs.sort_unstable_by(|a, b| b.cmp(a));

    runs.into_iter()
        .find(|dir| dir.join(meta_file_name(id)).is_file())
        .ok_or(StoreError::CaseNotFound(id))
}
