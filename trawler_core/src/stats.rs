//! Per-worker counters and the files that carry them to the coordinator.
//!
//! Each worker rewrites `worker_<i>_stats.txt` after every iteration by
//! writing a temporary file in the run directory and renaming it into
//! place, so a reader sees either a complete snapshot or no file at all.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;

pub const SUMMARY_FILE: &str = "run_summary.txt";

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("failed to write snapshot {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read snapshot {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed snapshot line {0:?}")]
    Malformed(String),
}

pub fn snapshot_file_name(worker: usize) -> String {
    format!("worker_{worker}_stats.txt")
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    pub total: u64,
    pub saved: u64,
    pub timeouts: u64,
    pub crashed: u64,
    /// Executions per exit code.
    pub exits: BTreeMap<i32, u64>,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one execution.
    pub fn record(&mut self, exit_code: i32, timed_out: bool, crashed: bool) {
        self.total += 1;
        *self.exits.entry(exit_code).or_insert(0) += 1;
        if timed_out {
            self.timeouts += 1;
        }
        if crashed {
            self.crashed += 1;
        }
    }

    pub fn record_saved(&mut self) {
        self.saved += 1;
    }

    pub fn merge(&mut self, other: &WorkerStats) {
        self.total += other.total;
        self.saved += other.saved;
        self.timeouts += other.timeouts;
        self.crashed += other.crashed;
        for (code, count) in &other.exits {
            *self.exits.entry(*code).or_insert(0) += count;
        }
    }

    /// `key=value` lines, exit codes ascending as `exit[<code>]=<count>`.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "total={}", self.total);
        let _ = writeln!(out, "saved={}", self.saved);
        let _ = writeln!(out, "timeouts={}", self.timeouts);
        let _ = writeln!(out, "crashed={}", self.crashed);
        for (code, count) in &self.exits {
            let _ = writeln!(out, "exit[{code}]={count}");
        }
        out
    }

    pub fn parse(text: &str) -> Result<Self, StatsError> {
        let mut stats = Self::default();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let malformed = || StatsError::Malformed(line.to_string());
            let (key, value) = line.split_once('=').ok_or_else(malformed)?;
            let value: u64 = value.parse().map_err(|_| malformed())?;
            match key {
                "total" => stats.total = value,
                "saved" => stats.saved = value,
                "timeouts" => stats.timeouts = value,
                "crashed" => stats.crashed = value,
                _ => {
                    let code = key
                        .strip_prefix("exit[")
                        .and_then(|rest| rest.strip_suffix(']'))
                        .and_then(|code| code.parse::<i32>().ok())
                        .ok_or_else(malformed)?;
                    stats.exits.insert(code, value);
                }
            }
        }
        Ok(stats)
    }
}

/// Atomically replaces `worker_<index>_stats.txt` in `run_dir`.
pub fn write_snapshot(run_dir: &Path, index: usize, stats: &WorkerStats) -> Result<(), StatsError> {
    let path = run_dir.join(snapshot_file_name(index));
    let write_err = |source| StatsError::Write {
        path: path.clone(),
        source,
    };

    let mut tmp = NamedTempFile::new_in(run_dir).map_err(write_err)?;
    tmp.write_all(stats.serialize().as_bytes())
        .map_err(write_err)?;
    tmp.persist(&path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Reads one worker's snapshot; `None` if it does not exist (yet).
pub fn read_snapshot(run_dir: &Path, index: usize) -> Result<Option<WorkerStats>, StatsError> {
    let path = run_dir.join(snapshot_file_name(index));
    match std::fs::read_to_string(&path) {
        Ok(text) => WorkerStats::parse(&text).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StatsError::Read { path, source }),
    }
}

/// Sums every snapshot currently present for workers `0..workers`.
pub fn aggregate(run_dir: &Path, workers: usize) -> Result<WorkerStats, StatsError> {
    let mut total = WorkerStats::new();
    for index in 0..workers {
        if let Some(stats) = read_snapshot(run_dir, index)? {
            total.merge(&stats);
        }
    }
    Ok(total)
}

pub fn write_summary(run_dir: &Path, stats: &WorkerStats) -> Result<PathBuf, StatsError> {
    let path = run_dir.join(SUMMARY_FILE);
    std::fs::write(&path, stats.serialize()).map_err(|source| StatsError::Write {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Deletes the per-worker snapshots once they have been summarized.
pub fn remove_snapshots(run_dir: &Path, workers: usize) {
    for index in 0..workers {
        let _ = std::fs::remove_file(run_dir.join(snapshot_file_name(index)));
    }
}

/// `42s`, `3m7s` or `2h5m`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    }
}
