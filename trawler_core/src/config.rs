use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the resolved configuration written into every run directory.
/// Worker processes read their settings back from this file.
pub const RUN_CONFIG_FILE: &str = "run_config.toml";

const ASAN_CANDIDATES: &[&str] = &["./fiskta-asan", "zig-out/bin/fiskta-asan"];
const RELEASE_CANDIDATES: &[&str] = &["./fiskta", "zig-out/bin/fiskta"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write config file {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse TOML from config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize run configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("no target binary found (looked for {0})")]
    TargetNotFound(String),
}

/// The target's exit-code contract. Codes differ between target versions,
/// so none of them are hard-wired into the engine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ExitCodePolicy {
    /// Exit code the target uses to reject a program it cannot parse.
    /// Such failures are saved but never minimized.
    #[serde(default = "default_parse_error_code")]
    pub parse_error: i32,
    /// Exit codes counted as crashes in run statistics.
    #[serde(default = "default_fatal_codes")]
    pub fatal: Vec<i32>,
    /// Exit codes that make a case worth saving.
    #[serde(default = "default_interesting_codes")]
    pub interesting: Vec<i32>,
    /// Exit code recorded for a run that hit the wall-clock timeout.
    #[serde(default = "default_timeout_sentinel")]
    pub timeout_sentinel: i32,
}

fn default_parse_error_code() -> i32 {
    12
}

fn default_fatal_codes() -> Vec<i32> {
    vec![10, 11, 14]
}

fn default_interesting_codes() -> Vec<i32> {
    vec![2, 10, 11, 14]
}

pub fn default_timeout_sentinel() -> i32 {
    -2
}

impl Default for ExitCodePolicy {
    fn default() -> Self {
        Self {
            parse_error: default_parse_error_code(),
            fatal: default_fatal_codes(),
            interesting: default_interesting_codes(),
            timeout_sentinel: default_timeout_sentinel(),
        }
    }
}

/// How each iteration chooses between its generation strategies.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct StrategyMix {
    /// Share of iterations that run a freshly generated program as-is.
    #[serde(default = "default_random_pct")]
    pub random_pct: f64,
    /// Share of iterations that structurally mutate the generated program.
    /// The remainder goes to targeted mismatch mutation.
    #[serde(default = "default_mutated_pct")]
    pub mutated_pct: f64,
    /// Chance of deriving the input from the corpus when one is loaded.
    #[serde(default = "default_corpus_pct")]
    pub corpus_pct: f64,
}

fn default_random_pct() -> f64 {
    0.40
}

fn default_mutated_pct() -> f64 {
    0.40
}

fn default_corpus_pct() -> f64 {
    0.80
}

impl Default for StrategyMix {
    fn default() -> Self {
        Self {
            random_pct: default_random_pct(),
            mutated_pct: default_mutated_pct(),
            corpus_pct: default_corpus_pct(),
        }
    }
}

/// Everything a run needs, resolved once before any worker starts and
/// never modified afterwards.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Empty until resolved; the binary is auto-detected when unset.
    #[serde(default)]
    pub target: PathBuf,
    #[serde(default = "default_artifacts")]
    pub artifacts: PathBuf,
    /// Empty until resolved; a timestamped directory under `artifacts` is
    /// used when unset.
    #[serde(default)]
    pub run_dir: PathBuf,
    /// Fixed number of cases; `None` fuzzes until interrupted.
    #[serde(default)]
    pub cases: Option<u64>,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_true")]
    pub minimize: bool,
    #[serde(default = "default_true")]
    pub use_corpus: bool,
    #[serde(default = "default_corpus_dir")]
    pub corpus_dir: PathBuf,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_min_ops")]
    pub min_ops: usize,
    #[serde(default = "default_max_ops")]
    pub max_ops: usize,
    #[serde(default)]
    pub save_all: bool,
    /// Set when the target is a sanitizer build; the harness then exports
    /// sanitizer options to it.
    #[serde(default)]
    pub asan: bool,
    #[serde(default)]
    pub exit_codes: ExitCodePolicy,
    #[serde(default)]
    pub strategy: StrategyMix,
}

fn default_true() -> bool {
    true
}

pub fn default_artifacts() -> PathBuf {
    PathBuf::from("artifacts")
}

pub fn default_corpus_dir() -> PathBuf {
    PathBuf::from("tests/fixtures")
}

fn default_timeout_ms() -> u64 {
    1500
}

pub fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus / 2).max(1)
}

fn default_min_ops() -> usize {
    3
}

fn default_max_ops() -> usize {
    15
}

impl RunConfig {
    /// Builds a configuration with every field at its default value.
    pub fn new(target: PathBuf) -> Self {
        Self {
            target,
            artifacts: default_artifacts(),
            run_dir: PathBuf::new(),
            cases: None,
            seed: 0,
            timeout_ms: default_timeout_ms(),
            minimize: true,
            use_corpus: true,
            corpus_dir: default_corpus_dir(),
            workers: default_workers(),
            min_ops: default_min_ops(),
            max_ops: default_max_ops(),
            save_all: false,
            asan: false,
            exit_codes: ExitCodePolicy::default(),
            strategy: StrategyMix::default(),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_ops == 0 {
            return Err(ConfigError::Invalid("min-ops must be at least 1".into()));
        }
        if self.min_ops > self.max_ops {
            return Err(ConfigError::Invalid(format!(
                "min-ops ({}) exceeds max-ops ({})",
                self.min_ops, self.max_ops
            )));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout-ms must be positive".into()));
        }
        // TOML integers are signed 64-bit.
        if i64::try_from(self.seed).is_err() {
            return Err(ConfigError::Invalid(format!(
                "seed {} does not fit in a signed 64-bit integer",
                self.seed
            )));
        }
        let mix = &self.strategy;
        for (name, p) in [
            ("random-pct", mix.random_pct),
            ("mutated-pct", mix.mutated_pct),
            ("corpus-pct", mix.corpus_pct),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must lie in [0, 1], got {p}"
                )));
            }
        }
        if mix.random_pct + mix.mutated_pct > 1.0 {
            return Err(ConfigError::Invalid(
                "random-pct + mutated-pct must not exceed 1".into(),
            ));
        }
        Ok(())
    }
}

/// Locates the target binary, preferring a sanitizer build.
/// Returns the absolute path and whether it is a sanitizer build.
pub fn detect_target() -> Result<(PathBuf, bool), ConfigError> {
    let candidates = ASAN_CANDIDATES
        .iter()
        .map(|c| (c, true))
        .chain(RELEASE_CANDIDATES.iter().map(|c| (c, false)));

    for (candidate, asan) in candidates {
        let path = Path::new(candidate);
        if path.exists() {
            let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
            return Ok((absolute, asan));
        }
    }

    let looked_for: Vec<&str> = ASAN_CANDIDATES
        .iter()
        .chain(RELEASE_CANDIDATES)
        .copied()
        .collect();
    Err(ConfigError::TargetNotFound(looked_for.join(", ")))
}

/// Name of a fresh run directory under `artifacts`, stamped with local time.
pub fn timestamped_run_dir(artifacts: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y-%m-%d_%H%M%S");
    artifacts.join(format!("run_{stamp}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RunConfig::new(PathBuf::from("/bin/true"));
        assert_eq!(config.timeout_ms, 1500);
        assert_eq!(config.min_ops, 3);
        assert_eq!(config.max_ops, 15);
        assert!(config.minimize);
        assert!(config.use_corpus);
        assert!(config.workers >= 1);
        assert_eq!(config.exit_codes.parse_error, 12);
        assert_eq!(config.exit_codes.timeout_sentinel, -2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn round_trips_through_run_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(RUN_CONFIG_FILE);

        let mut config = RunConfig::new(PathBuf::from("/opt/fiskta"));
        config.cases = Some(10);
        config.seed = 42;
        config.workers = 3;
        config.exit_codes.fatal = vec![10, 99];
        config.save_to_file(&path).unwrap();

        let loaded = RunConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn continuous_mode_survives_serialization() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(RUN_CONFIG_FILE);

        let config = RunConfig::new(PathBuf::from("/opt/fiskta"));
        config.save_to_file(&path).unwrap();
        assert_eq!(RunConfig::load_from_file(&path).unwrap().cases, None);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: RunConfig = toml::from_str(
            r#"
            target = "/opt/fiskta"
            workers = 2

            [exit-codes]
            parse-error = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.exit_codes.parse_error, 2);
        assert_eq!(config.exit_codes.fatal, vec![10, 11, 14]);
        assert_eq!(config.strategy, StrategyMix::default());
        assert!(config.run_dir.as_os_str().is_empty());
    }

    #[test]
    fn run_dir_is_read_from_toml() {
        let config: RunConfig = toml::from_str(
            r#"
            target = "/opt/fiskta"
            run-dir = "/tmp/nightly"
            "#,
        )
        .unwrap();
        assert_eq!(config.run_dir, PathBuf::from("/tmp/nightly"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let parsed: Result<RunConfig, _> = toml::from_str(
            r#"
            target = "/opt/fiskta"
            thread-count = 4
            "#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn validate_rejects_inverted_op_bounds() {
        let mut config = RunConfig::new(PathBuf::from("/bin/true"));
        config.min_ops = 8;
        config.max_ops = 4;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_zero_workers_and_zero_min_ops() {
        let mut config = RunConfig::new(PathBuf::from("/bin/true"));
        config.workers = 0;
        assert!(config.validate().is_err());

        let mut config = RunConfig::new(PathBuf::from("/bin/true"));
        config.min_ops = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_oversubscribed_strategy_mix() {
        let mut config = RunConfig::new(PathBuf::from("/bin/true"));
        config.strategy.random_pct = 0.7;
        config.strategy.mutated_pct = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn run_dir_is_stamped_under_artifacts() {
        let dir = timestamped_run_dir(Path::new("artifacts"));
        assert!(dir.starts_with("artifacts"));
        let name = dir.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("run_"), "unexpected run dir name {name}");
        assert_eq!(name.len(), "run_2025-01-01_000000".len());
    }
}
