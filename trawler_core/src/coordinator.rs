//! Owns the pool of worker processes for one run.
//!
//! Workers are separate OS processes so a target that hangs or corrupts
//! memory can never take the coordinator down with it. They share a process
//! group of their own, which keeps terminal Ctrl-C away from them and lets
//! the coordinator stop the whole pool with a single `killpg`. Progress is
//! read from the per-worker snapshot files; the final summary is rebuilt
//! from whatever those files last said.

use crate::config::{ConfigError, RUN_CONFIG_FILE, RunConfig};
use crate::stats::{
    StatsError, WorkerStats, aggregate, format_elapsed, read_snapshot, remove_snapshots,
    write_summary,
};
use log::{error, info, warn};
use std::ffi::OsString;
use std::fmt::Write as _;
use std::io::Write as _;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Coordinator wake-ups are sliced this finely so interrupts are noticed
/// well within one poll interval.
const POLL_SLICE: Duration = Duration::from_millis(50);

static SIGNALED: AtomicBool = AtomicBool::new(false);

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("failed to create run directory {path:?}: {source}")]
    CreateRunDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Stats(#[from] StatsError),
    #[error("failed to spawn worker {index}: {source}")]
    Spawn {
        index: usize,
        source: std::io::Error,
    },
    #[error("worker {index} failed ({status}), run aborted")]
    WorkerFailed { index: usize, status: String },
    #[error("failed waiting for worker {index}: {source}")]
    Wait {
        index: usize,
        source: std::io::Error,
    },
}

/// Makes SIGINT and SIGTERM request a graceful stop instead of killing the
/// coordinator outright.
pub fn install_signal_handlers() {
    extern "C" fn handler(_: libc::c_int) {
        SIGNALED.store(true, Ordering::SeqCst);
    }

    let h = handler as *const () as libc::sighandler_t;
    unsafe {
        libc::signal(libc::SIGINT, h);
        libc::signal(libc::SIGTERM, h);
    }
}

/// How to start one worker process. The coordinator appends
/// `--run-dir <dir> --index <i>` to `args`.
#[derive(Debug, Clone)]
pub struct WorkerLauncher {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerLauncher {
    pub fn new(program: PathBuf, args: Vec<OsString>) -> Self {
        Self { program, args }
    }

    /// Re-executes the running binary with its hidden `worker` command.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, vec!["worker".into()]))
    }

    fn command(&self, run_dir: &Path, index: usize) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--run-dir")
            .arg(run_dir)
            .arg("--index")
            .arg(index.to_string())
            .stdin(Stdio::null());
        cmd
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub stats: WorkerStats,
    pub elapsed: Duration,
    pub interrupted: bool,
    pub run_dir: PathBuf,
}

pub struct Coordinator {
    config: RunConfig,
    launcher: WorkerLauncher,
    poll_interval: Duration,
    show_progress: bool,
    interrupt: Arc<AtomicBool>,
}

impl Coordinator {
    pub fn new(config: RunConfig, launcher: WorkerLauncher) -> Self {
        Self {
            config,
            launcher,
            poll_interval: Duration::from_secs(1),
            show_progress: true,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Setting the returned flag stops the run as a user interrupt would.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst) || SIGNALED.load(Ordering::SeqCst)
    }

    /// Runs the pool to completion or interruption. A worker that fails
    /// stops the whole pool and the run returns its error. Whatever the
    /// outcome, once workers were started the run summary is written and
    /// the worker snapshots are removed.
    pub fn run(&self) -> Result<RunOutcome, CoordinatorError> {
        let run_dir = self.config.run_dir.clone();
        let workers = self.config.workers;

        std::fs::create_dir_all(&run_dir).map_err(|source| CoordinatorError::CreateRunDir {
            path: run_dir.clone(),
            source,
        })?;
        self.config.save_to_file(&run_dir.join(RUN_CONFIG_FILE))?;

        let start = Instant::now();
        let supervised = self.supervise(&run_dir, start);
        if self.show_progress && !matches!(supervised, Ok(true)) {
            println!();
        }

        let stats = final_stats(&run_dir, workers);
        let summary = write_summary(&run_dir, &stats);
        remove_snapshots(&run_dir, workers);

        let interrupted = supervised?;
        summary?;
        Ok(RunOutcome {
            stats,
            elapsed: start.elapsed(),
            interrupted,
            run_dir,
        })
    }

    /// Returns whether the run was interrupted. The pool is always gone by
    /// the time this returns.
    fn supervise(&self, run_dir: &Path, start: Instant) -> Result<bool, CoordinatorError> {
        let mut pool = self.spawn_pool(run_dir)?;
        let watched = self.watch(&mut pool, run_dir, start);
        if !matches!(watched, Ok(false)) {
            pool.kill();
        }
        watched
    }

    fn watch(
        &self,
        pool: &mut Pool,
        run_dir: &Path,
        start: Instant,
    ) -> Result<bool, CoordinatorError> {
        let mut shown = WorkerStats::new();
        loop {
            self.reap(pool)?;
            if pool.children.iter().all(Option::is_none) {
                return Ok(false);
            }
            if self.interrupted() {
                if self.show_progress {
                    println!("\n\nInterrupted, stopping workers...");
                }
                return Ok(true);
            }

            if self.show_progress {
                match aggregate(run_dir, self.config.workers) {
                    Ok(stats) if stats.total >= shown.total => shown = stats,
                    Ok(_) => {}
                    Err(e) => warn!("Skipping progress update: {e}"),
                }
                print!("\r{}", progress_line(&shown, self.config.cases, start.elapsed()));
                let _ = std::io::stdout().flush();
            }

            self.sleep_slice();
        }
    }

    fn spawn_pool(&self, run_dir: &Path) -> Result<Pool, CoordinatorError> {
        let mut pool = Pool {
            children: Vec::with_capacity(self.config.workers),
            group: 0,
        };
        for index in 0..self.config.workers {
            let mut cmd = self.launcher.command(run_dir, index);
            // Zero puts the first worker in a new group named after its pid.
            cmd.process_group(pool.group);
            match cmd.spawn() {
                Ok(child) => {
                    if index == 0 {
                        pool.group = child.id() as i32;
                    }
                    info!("Spawned worker {index} (pid {})", child.id());
                    pool.children.push(Some(child));
                }
                Err(source) => {
                    pool.kill();
                    return Err(CoordinatorError::Spawn { index, source });
                }
            }
        }
        Ok(pool)
    }

    /// Collects finished workers. The first unsuccessful exit is an error.
    fn reap(&self, pool: &mut Pool) -> Result<(), CoordinatorError> {
        for (index, slot) in pool.children.iter_mut().enumerate() {
            let Some(child) = slot else { continue };
            let status = child
                .try_wait()
                .map_err(|source| CoordinatorError::Wait { index, source })?;
            if let Some(status) = status {
                *slot = None;
                if !status.success() {
                    error!("Worker {index} failed: {status}");
                    return Err(CoordinatorError::WorkerFailed {
                        index,
                        status: status.to_string(),
                    });
                }
                info!("Worker {index} finished");
            }
        }
        Ok(())
    }

    fn sleep_slice(&self) {
        let deadline = Instant::now() + self.poll_interval;
        while !self.interrupted() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(POLL_SLICE.min(deadline - now));
        }
    }
}

struct Pool {
    children: Vec<Option<Child>>,
    group: i32,
}

impl Pool {
    /// Terminates the whole process group and reaps every worker.
    fn kill(&mut self) {
        if self.group > 0 {
            unsafe {
                libc::killpg(self.group, libc::SIGTERM);
            }
        }
        for child in self.children.iter_mut().filter_map(Option::as_mut) {
            let _ = child.wait();
        }
        self.children.iter_mut().for_each(|slot| *slot = None);
    }
}

/// Sums the last snapshot of every worker. Unreadable snapshots are left
/// out so a summary can always be written.
fn final_stats(run_dir: &Path, workers: usize) -> WorkerStats {
    let mut stats = WorkerStats::new();
    for index in 0..workers {
        match read_snapshot(run_dir, index) {
            Ok(Some(snapshot)) => stats.merge(&snapshot),
            Ok(None) => {}
            Err(e) => warn!("Leaving worker {index} out of the summary: {e}"),
        }
    }
    stats
}

/// `[120/1000 cases | 40 exec/s | 1 crashes | 0 timeouts | 3s]`
pub fn progress_line(stats: &WorkerStats, cases: Option<u64>, elapsed: Duration) -> String {
    let done = match cases {
        Some(cases) => format!("{}/{cases}", stats.total),
        None => stats.total.to_string(),
    };
    format!(
        "[{done} cases | {} exec/s | {} crashes | {} timeouts | {}]",
        exec_rate(stats.total, elapsed),
        stats.crashed,
        stats.timeouts,
        format_elapsed(elapsed)
    )
}

fn exec_rate(total: u64, elapsed: Duration) -> u64 {
    match elapsed.as_secs() {
        0 => 0,
        secs => total / secs,
    }
}

/// The end-of-run report printed to the user.
pub fn render_summary(outcome: &RunOutcome) -> String {
    let stats = &outcome.stats;
    let mut out = String::new();
    if outcome.interrupted {
        let _ = writeln!(out, "=== Run Summary (interrupted) ===");
    } else {
        let _ = writeln!(out, "=== Run Summary ===");
    }
    let _ = writeln!(out, "Total cases:    {}", stats.total);
    let _ = writeln!(
        out,
        "Execution rate: {} exec/s",
        exec_rate(stats.total, outcome.elapsed)
    );
    let _ = writeln!(out, "Time elapsed:   {}", format_elapsed(outcome.elapsed));
    let _ = writeln!(out, "Crashes:        {}", stats.crashed);
    let _ = writeln!(out, "Timeouts:       {}", stats.timeouts);
    let _ = writeln!(out, "Saved cases:    {}", stats.saved);
    if !stats.exits.is_empty() {
        let _ = writeln!(out, "\nExit code distribution:");
        for (code, count) in &stats.exits {
            let _ = writeln!(out, "  exit {code}: {count}");
        }
    }
    let _ = writeln!(out, "\nRun directory: {}", outcome.run_dir.display());
    if stats.saved > 0 {
        let _ = writeln!(
            out,
            "Reproduce: trawler --repro-case N --run-dir {}",
            outcome.run_dir.display()
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{SUMMARY_FILE, snapshot_file_name};

    /// A launcher whose "workers" are shell one-liners. The appended
    /// `--run-dir <dir> --index <i>` arrive as `$1`..`$4`.
    fn shell_launcher(script: &str) -> WorkerLauncher {
        WorkerLauncher::new(
            PathBuf::from("/bin/sh"),
            vec!["-c".into(), script.into(), "sh".into()],
        )
    }

    fn config_in(run_dir: &Path, workers: usize) -> RunConfig {
        let mut config = RunConfig::new(PathBuf::from("/bin/true"));
        config.run_dir = run_dir.to_path_buf();
        config.workers = workers;
        config.cases = Some(10);
        config
    }

    fn quiet(config: RunConfig, launcher: WorkerLauncher) -> Coordinator {
        Coordinator::new(config, launcher)
            .with_poll_interval(Duration::from_millis(20))
            .with_progress(false)
    }

    #[test]
    fn aggregates_worker_snapshots_into_summary() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = dir.path().join("run");
        let launcher = shell_launcher(
            r#"printf 'total=5\nsaved=1\ntimeouts=0\ncrashed=1\nexit[0]=4\nexit[139]=1\n' > "$2/worker_$4_stats.txt""#,
        );

        let outcome = quiet(config_in(&run_dir, 2), launcher).run().unwrap();
        assert!(!outcome.interrupted);
        assert_eq!(outcome.stats.total, 10);
        assert_eq!(outcome.stats.crashed, 2);
        assert_eq!(outcome.stats.exits[&0], 8);

        let summary = std::fs::read_to_string(run_dir.join(SUMMARY_FILE)).unwrap();
        assert!(summary.starts_with("total=10\nsaved=2\n"));
        for index in 0..2 {
            assert!(!run_dir.join(snapshot_file_name(index)).exists());
        }
        assert!(run_dir.join(RUN_CONFIG_FILE).is_file());
    }

    #[test]
    fn failed_worker_aborts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = shell_launcher(
            r#"printf 'total=2\n' > "$2/worker_$4_stats.txt"; [ "$4" = 1 ] && exit 3; exec sleep 30"#,
        );

        let started = Instant::now();
        let err = quiet(config_in(dir.path(), 3), launcher).run().unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(matches!(err, CoordinatorError::WorkerFailed { index: 1, .. }));

        // Worker 1 wrote its snapshot before failing; the others may not have.
        let summary = std::fs::read_to_string(dir.path().join(SUMMARY_FILE)).unwrap();
        let total: u64 = summary.lines().next().unwrap()["total=".len()..].parse().unwrap();
        assert!((2..=6).contains(&total), "{summary}");
        for index in 0..3 {
            assert!(!dir.path().join(snapshot_file_name(index)).exists());
        }
    }

    #[test]
    fn interrupt_stops_the_pool_and_keeps_last_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = shell_launcher(
            r#"printf 'total=7\n' > "$2/worker_$4_stats.txt"; exec sleep 30"#,
        );
        let coordinator = quiet(config_in(dir.path(), 2), launcher);
        let interrupt = coordinator.interrupt_handle();

        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(500));
            interrupt.store(true, Ordering::SeqCst);
        });

        let started = Instant::now();
        let outcome = coordinator.run().unwrap();
        stopper.join().unwrap();

        assert!(outcome.interrupted);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(outcome.stats.total, 14);
        let summary = render_summary(&outcome);
        assert!(summary.starts_with("=== Run Summary (interrupted) ==="));
    }

    #[test]
    fn missing_worker_binary_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = WorkerLauncher::new(PathBuf::from("/nonexistent/trawler"), Vec::new());
        let err = quiet(config_in(dir.path(), 1), launcher).run().unwrap_err();
        assert!(matches!(err, CoordinatorError::Spawn { index: 0, .. }));
        let summary = std::fs::read_to_string(dir.path().join(SUMMARY_FILE)).unwrap();
        assert!(summary.starts_with("total=0\n"), "{summary}");
    }

    #[test]
    fn progress_line_formats() {
        let mut stats = WorkerStats::new();
        for _ in 0..120 {
            stats.record(0, false, false);
        }
        stats.record(139, false, true);
        assert_eq!(
            progress_line(&stats, Some(1000), Duration::from_secs(3)),
            "[121/1000 cases | 40 exec/s | 1 crashes | 0 timeouts | 3s]"
        );
        assert_eq!(
            progress_line(&stats, None, Duration::from_millis(10)),
            "[121 cases | 0 exec/s | 1 crashes | 0 timeouts | 0s]"
        );
    }

    #[test]
    fn summary_mentions_repro_only_when_cases_were_saved() {
        let mut outcome = RunOutcome {
            stats: WorkerStats::new(),
            elapsed: Duration::from_secs(2),
            interrupted: false,
            run_dir: PathBuf::from("artifacts/run_x"),
        };
        outcome.stats.record(2, false, false);
        let text = render_summary(&outcome);
        assert!(text.starts_with("=== Run Summary ===\n"));
        assert!(text.contains("  exit 2: 1"));
        assert!(!text.contains("Reproduce"));

        outcome.stats.record_saved();
        assert!(render_summary(&outcome).contains("--repro-case N"));
    }
}
