use trawler_core::config::{RunConfig, detect_target, timestamped_run_dir};
use trawler_core::coordinator::{
    Coordinator, WorkerLauncher, install_signal_handlers, render_summary,
};
use trawler_core::repro::{reproduce_case, reproduce_files};
use trawler_core::worker::run_worker;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const QUICK_CASES: u64 = 10_000;
const QUICK_WORKERS: usize = 2;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Grammar-aware parallel fuzzer for fiskta", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Option<Command>,

    /// TOML file with run settings; command-line flags take precedence.
    #[clap(long, value_parser)]
    config: Option<PathBuf>,
    /// Target binary (auto-detected when omitted).
    #[clap(long)]
    target: Option<PathBuf>,
    #[clap(long)]
    artifacts: Option<PathBuf>,
    /// Run directory; for --repro-case, where to look for the case.
    #[clap(long)]
    run_dir: Option<PathBuf>,
    /// Number of cases to run (continuous when omitted).
    #[clap(short, long)]
    cases: Option<u64>,
    /// Preset: 10000 cases on 2 workers.
    #[clap(long)]
    quick: bool,
    #[clap(long)]
    seed: Option<u64>,
    #[clap(long)]
    timeout_ms: Option<u64>,
    #[clap(short = 'j', long)]
    workers: Option<usize>,
    #[clap(long)]
    min_ops: Option<usize>,
    #[clap(long)]
    max_ops: Option<usize>,
    #[clap(long)]
    no_minimize: bool,
    #[clap(long)]
    no_corpus: bool,
    #[clap(long)]
    corpus_dir: Option<PathBuf>,
    /// Save every case, not only failures.
    #[clap(long)]
    save_all: bool,
    /// Replay saved case N.
    #[clap(long, value_name = "N")]
    repro_case: Option<u64>,
    /// Replay an input file with an ops file.
    #[clap(long, num_args = 2, value_names = ["INPUT", "OPS"])]
    repro: Option<Vec<PathBuf>>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs one worker of an existing run. Started by the coordinator.
    #[clap(hide = true)]
    Worker {
        #[clap(long)]
        run_dir: PathBuf,
        #[clap(long)]
        index: usize,
    },
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Some(Command::Worker { run_dir, index }) = &cli.command {
        return run_worker(run_dir, *index).with_context(|| format!("worker {index}"));
    }

    let config = resolve_config(&cli)?;

    if let Some(id) = cli.repro_case {
        let report = reproduce_case(&config, id, Some(&config.run_dir))?;
        print!("{report}");
        return Ok(());
    }
    if let Some(files) = &cli.repro {
        let [input, ops] = files.as_slice() else {
            bail!("--repro takes exactly two paths: INPUT OPS");
        };
        let report = reproduce_files(&config, input, ops)?;
        print!("{report}");
        return Ok(());
    }

    run_fuzzer(config)
}

/// Built-in defaults, then the optional TOML file, then command-line flags.
fn resolve_config(cli: &Cli) -> anyhow::Result<RunConfig> {
    let mut config = match &cli.config {
        Some(path) => RunConfig::load_from_file(path)?,
        None => RunConfig::new(PathBuf::new()),
    };

    if let Some(target) = &cli.target {
        config.target = target.clone();
        config.asan = is_sanitizer_build(target);
    } else if config.target.as_os_str().is_empty() {
        let (target, asan) = detect_target()?;
        config.target = target;
        config.asan = asan;
    } else {
        config.asan = config.asan || is_sanitizer_build(&config.target);
    }
    if !config.target.is_file() {
        bail!("target binary {} does not exist", config.target.display());
    }
    config.target = std::path::absolute(&config.target)
        .with_context(|| format!("resolving {}", config.target.display()))?;

    if let Some(artifacts) = &cli.artifacts {
        config.artifacts = artifacts.clone();
    }
    if cli.quick {
        config.cases = Some(QUICK_CASES);
        config.workers = QUICK_WORKERS;
    }
    if let Some(cases) = cli.cases {
        config.cases = Some(cases);
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    if let Some(min_ops) = cli.min_ops {
        config.min_ops = min_ops;
    }
    if let Some(max_ops) = cli.max_ops {
        config.max_ops = max_ops;
    }
    if let Some(corpus_dir) = &cli.corpus_dir {
        config.corpus_dir = corpus_dir.clone();
    }
    config.minimize &= !cli.no_minimize;
    config.use_corpus &= !cli.no_corpus;
    config.save_all |= cli.save_all;
    config.seed = match cli.seed {
        Some(seed) => seed,
        None if cli.config.is_some() && config.seed != 0 => config.seed,
        None => SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default(),
    };
    if let Some(run_dir) = &cli.run_dir {
        config.run_dir = run_dir.clone();
    } else if config.run_dir.as_os_str().is_empty() {
        config.run_dir = timestamped_run_dir(&config.artifacts);
    }

    config.validate()?;
    Ok(config)
}

fn is_sanitizer_build(target: &Path) -> bool {
    target
        .file_name()
        .is_some_and(|name| name.to_string_lossy().contains("asan"))
}

fn run_fuzzer(config: RunConfig) -> anyhow::Result<()> {
    println!("Run directory: {}\n", config.run_dir.display());
    println!(
        "trawler [{} | seed={} | minimize={}]",
        if config.asan { "ASAN" } else { "release" },
        config.seed,
        if config.minimize { "on" } else { "off" }
    );
    println!("Binary: {}", config.target.display());
    match config.cases {
        Some(cases) => println!("Mode: {cases} cases ({} workers)\n", config.workers),
        None => println!(
            "Mode: continuous (Ctrl+C to stop, {} workers)\n",
            config.workers
        ),
    }

    install_signal_handlers();
    let launcher = WorkerLauncher::current_exe().context("locating the trawler binary")?;
    info!("Starting {} workers", config.workers);
    let run_dir = config.run_dir.clone();
    let outcome = Coordinator::new(config, launcher)
        .run()
        .with_context(|| format!("fuzzing run in {}", run_dir.display()))?;

    print!("\n{}", render_summary(&outcome));
    Ok(())
}
