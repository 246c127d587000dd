//! Manual triage: replay a saved case, or an explicit input and ops file,
//! against the target exactly once.

use crate::config::RunConfig;
use crate::executor::{CommandExecutor, CommandExecutorConfig, ExecutionResult, ProcessOutput};
use crate::oracle::same_failure;
use crate::program::Program;
use crate::store::{CaseStore, StoreError, input_file_name, locate_case};
use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;

/// Lines of target stderr shown after a replay.
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug)]
pub struct ReproReport {
    /// Where the program and input came from.
    pub source: String,
    pub result: ExecutionResult,
    /// The result recorded when the case was saved, if replaying one.
    pub stored: Option<ExecutionResult>,
    pub output: ProcessOutput,
}

impl ReproReport {
    /// Whether the replay failed the same way as the recorded run. Always
    /// true when there is no recording.
    pub fn matches_stored(&self) -> bool {
        self.stored
            .as_ref()
            .is_none_or(|stored| same_failure(stored, &self.result))
    }

    pub fn stderr_tail(&self) -> String {
        let text = String::from_utf8_lossy(&self.output.stderr);
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
        lines[start..].join("\n")
    }
}

impl fmt::Display for ReproReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Reproducing {}", self.source)?;
        writeln!(f, "{}", self.result)?;
        if let Some(stored) = &self.stored {
            let verdict = if self.matches_stored() {
                "matches"
            } else {
                "DIFFERS"
            };
            writeln!(f, "stored: {stored} ({verdict})")?;
        }
        let tail = self.stderr_tail();
        if !tail.is_empty() {
            writeln!(f, "--- stderr (tail) ---")?;
            writeln!(f, "{tail}")?;
        }
        Ok(())
    }
}

/// Replays case `id` from `run_dir`, or from the newest run directory under
/// the configured artifacts root that holds it.
pub fn reproduce_case(config: &RunConfig, id: u64, run_dir: Option<&Path>) -> Result<ReproReport> {
    let dir = locate_case(&config.artifacts, run_dir, id)?;
    let record = CaseStore::new(&dir)?.load_case(id)?;
    let input_path = dir.join(input_file_name(id));

    let executor = CommandExecutor::new(CommandExecutorConfig::from_run_config(config));
    let (result, output) = executor.run(&record.program, &input_path)?;
    Ok(ReproReport {
        source: format!("case {id} from {}", dir.display()),
        result,
        stored: Some(record.result),
        output,
    })
}

/// Replays an explicit input file and ops file.
pub fn reproduce_files(config: &RunConfig, input: &Path, ops: &Path) -> Result<ReproReport> {
    if !input.is_file() {
        return Err(StoreError::Read {
            path: input.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }
        .into());
    }
    let text = std::fs::read_to_string(ops)
        .with_context(|| format!("reading ops file {}", ops.display()))?;
    let program = Program::from_lines(&text);

    let executor = CommandExecutor::new(CommandExecutorConfig::from_run_config(config));
    let (result, output) = executor.run(&program, input)?;
    Ok(ReproReport {
        source: format!("{} with {}", input.display(), ops.display()),
        result,
        stored: None,
        output,
    })
}
