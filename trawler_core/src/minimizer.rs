//! Greedy token-deletion minimizer.
//!
//! Tries deleting each token in turn and keeps every deletion that still
//! reproduces the same failure class, restarting from the first token after
//! each success. The result is locally minimal (no single token can be
//! removed), not globally minimal, which keeps it cheap enough to run inline
//! in the worker loop.

use crate::executor::{ExecutionResult, Executor, HarnessError};
use crate::oracle::same_failure;
use crate::program::Program;
use log::debug;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Minimized {
    pub program: Program,
    /// Number of target executions the reduction took.
    pub executions: usize,
}

/// Shrinks `program` while it keeps failing like `want` against the input at
/// `input_path`. Never returns an empty program.
pub fn minimize<E: Executor + ?Sized>(
    executor: &mut E,
    program: &Program,
    input_path: &Path,
    want: &ExecutionResult,
) -> Result<Minimized, HarnessError> {
    let mut best = program.clone();
    let mut executions = 0;
    let mut i = 0;

    while i < best.len() && best.len() > 1 {
        let trial = best.without(i);
        let result = executor.execute(&trial, input_path)?;
        executions += 1;

        if same_failure(want, &result) {
            best = trial;
            i = 0;
        } else {
            i += 1;
        }
    }

    debug!(
        "Minimized program from {} to {} tokens in {} executions",
        program.len(),
        best.len(),
        executions
    );
    Ok(Minimized {
        program: best,
        executions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CommandExecutor, CommandExecutorConfig};
    use std::path::PathBuf;
    use std::time::Duration;

    /// Crashes whenever all of its trigger tokens are present.
    struct TriggerExecutor {
        triggers: Vec<&'static str>,
        runs: usize,
    }

    impl Executor for TriggerExecutor {
        fn execute(
            &mut self,
            program: &Program,
            _input_path: &Path,
        ) -> Result<ExecutionResult, HarnessError> {
            self.runs += 1;
            let fires = self
                .triggers
                .iter()
                .all(|t| program.tokens().iter().any(|tok| tok == t));
            Ok(if fires {
                ExecutionResult::signaled(11)
            } else {
                ExecutionResult::exited(0)
            })
        }
    }

    #[test]
    fn reduces_to_the_triggering_tokens() {
        let mut executor = TriggerExecutor {
            triggers: vec!["boom", "take"],
            runs: 0,
        };
        let program = Program::from(vec!["find", "x", "take", "THEN", "boom", "skip", "3b"]);
        let minimized = minimize(
            &mut executor,
            &program,
            Path::new("/dev/null"),
            &ExecutionResult::signaled(11),
        )
        .unwrap();

        assert_eq!(minimized.program, Program::from(vec!["take", "boom"]));
        assert_eq!(minimized.executions, executor.runs);
    }

    #[test]
    fn output_reproduces_and_is_never_longer() {
        let mut executor = TriggerExecutor {
            triggers: vec!["a"],
            runs: 0,
        };
        let want = ExecutionResult::signaled(11);
        for program in [
            Program::from(vec!["a"]),
            Program::from(vec!["a", "a", "a"]),
            Program::from(vec!["b", "a", "c", "a"]),
        ] {
            let minimized = minimize(&mut executor, &program, Path::new("/dev/null"), &want)
                .unwrap()
                .program;
            assert!(minimized.len() <= program.len());
            let replay = executor.execute(&minimized, Path::new("/dev/null")).unwrap();
            assert!(same_failure(&want, &replay));
        }
    }

    #[test]
    fn single_token_program_is_not_executed() {
        let mut executor = TriggerExecutor {
            triggers: vec![],
            runs: 0,
        };
        let program = Program::from(vec!["only"]);
        let minimized = minimize(
            &mut executor,
            &program,
            Path::new("/dev/null"),
            &ExecutionResult::exited(0),
        )
        .unwrap();
        assert_eq!(minimized.program, program);
        assert_eq!(executor.runs, 0);
    }

    #[test]
    fn unreproducible_failure_leaves_program_intact() {
        let mut executor = TriggerExecutor {
            triggers: vec!["never-present"],
            runs: 0,
        };
        let program = Program::from(vec!["a", "b", "c"]);
        let minimized = minimize(
            &mut executor,
            &program,
            Path::new("/dev/null"),
            &ExecutionResult::signaled(11),
        )
        .unwrap();
        assert_eq!(minimized.program, program);
        assert_eq!(minimized.executions, 3);
    }

    #[test]
    fn minimizes_against_a_real_target() {
        let target = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../test_targets/keyword.sh");
        let mut executor =
            CommandExecutor::new(CommandExecutorConfig::new(target, Duration::from_secs(5)));
        let input = tempfile::NamedTempFile::new().unwrap();

        let program = Program::from(vec!["find", "abc", "OR", "exit=14", "print", "x"]);
        let want = executor.execute(&program, input.path()).unwrap();
        assert_eq!(want, ExecutionResult::exited(14));

        let minimized = minimize(&mut executor, &program, input.path(), &want).unwrap();
        assert_eq!(minimized.program, Program::from(vec!["exit=14"]));
    }

    #[test]
    fn timeouts_are_minimized_as_timeouts() {
        let target = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../test_targets/keyword.sh");
        let mut executor =
            CommandExecutor::new(CommandExecutorConfig::new(target, Duration::from_millis(200)));
        let input = tempfile::NamedTempFile::new().unwrap();

        let program = Program::from(vec!["find", "x", "hang", "print"]);
        let want = executor.execute(&program, input.path()).unwrap();
        assert!(want.timed_out);

        let minimized = minimize(&mut executor, &program, input.path(), &want).unwrap();
        assert_eq!(minimized.program, Program::from(vec!["hang"]));
    }
}
