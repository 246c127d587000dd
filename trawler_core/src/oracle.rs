use crate::config::ExitCodePolicy;
use crate::executor::ExecutionResult;

/// An interesting execution, as judged by the [`Oracle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BugReport {
    /// A human-readable description of the failure.
    pub description: String,
    /// MD5 of the input bytes, useful for spotting duplicates by eye.
    pub input_hash: String,
    /// Whether the program should be shrunk before it is saved.
    pub minimize: bool,
    /// Whether the failure counts as a crash in run statistics.
    pub crash: bool,
}

/// Decides which executions are worth keeping, based on the target's
/// exit-code contract.
///
/// Timeouts and crashes are always interesting. Other exit codes are
/// interesting when listed in [`ExitCodePolicy::interesting`], and with
/// `save_all` every execution is.
#[derive(Debug, Clone)]
pub struct Oracle {
    policy: ExitCodePolicy,
    save_all: bool,
    minimize: bool,
}

impl Oracle {
    /// Creates a new `Oracle`.
    ///
    /// # Arguments
    /// * `policy`: The target's exit-code contract.
    /// * `save_all`: Treat every execution as interesting.
    /// * `minimize`: Whether minimization is enabled at all for this run.
    pub fn new(policy: ExitCodePolicy, save_all: bool, minimize: bool) -> Self {
        Self {
            policy,
            save_all,
            minimize,
        }
    }

    /// Killed by a signal, or exited with one of the fatal codes.
    pub fn counts_as_crash(&self, result: &ExecutionResult) -> bool {
        result.crashed() || self.policy.fatal.contains(&result.exit_code)
    }

    pub fn is_interesting(&self, result: &ExecutionResult) -> bool {
        result.timed_out
            || self.counts_as_crash(result)
            || self.policy.interesting.contains(&result.exit_code)
            || self.save_all
    }

    /// Programs the target rejected as unparseable are never minimized:
    /// without a grammar, shrinking them just finds other parse errors.
    pub fn should_minimize(&self, result: &ExecutionResult) -> bool {
        self.minimize && result.exit_code != self.policy.parse_error
    }

    /// Examines an execution and reports it if it is interesting.
    ///
    /// # Returns
    /// `Some(BugReport)` when the case should be saved, otherwise `None`.
    pub fn examine(&self, input: &[u8], result: &ExecutionResult) -> Option<BugReport> {
        if !self.is_interesting(result) {
            return None;
        }
        Some(BugReport {
            description: describe(result),
            input_hash: format!("{:x}", md5::compute(input)),
            minimize: self.should_minimize(result),
            crash: self.counts_as_crash(result),
        })
    }
}

/// Two executions fail the same way if both timed out, else if both were
/// killed by a signal, else if their exit codes match.
///
/// Distinct soft-failure codes are never merged: exit code equality is the
/// fallback for everything that is neither a timeout nor a signal.
pub fn same_failure(a: &ExecutionResult, b: &ExecutionResult) -> bool {
    if a.timed_out && b.timed_out {
        return true;
    }
    if a.crashed() && b.crashed() {
        return true;
    }
    a.exit_code == b.exit_code
}

fn describe(result: &ExecutionResult) -> String {
    if result.timed_out {
        "timed out".to_string()
    } else if let Some(signal) = result.signal {
        format!("terminated by signal {signal}")
    } else {
        format!("exited with code {}", result.exit_code)
    }
}
