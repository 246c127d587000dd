//! One worker's generate, execute, minimize and persist loop.

use crate::config::{RUN_CONFIG_FILE, RunConfig, StrategyMix};
use crate::corpus::Corpus;
use crate::executor::{CommandExecutor, CommandExecutorConfig, ExecutionResult, Executor};
use crate::generator::ProgramGenerator;
use crate::input::next_input;
use crate::minimizer::minimize;
use crate::mismatch::BugShapeTable;
use crate::mutator::{Mutator, ProgramMutator};
use crate::oracle::Oracle;
use crate::program::Program;
use crate::stats::{WorkerStats, write_snapshot};
use crate::store::CaseStore;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use std::io::Write;
use std::path::Path;

/// How an iteration builds its program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Random,
    Mutated,
    Mismatch,
}

impl Strategy {
    pub fn choose<R: Rng + ?Sized>(rng: &mut R, mix: &StrategyMix) -> Self {
        let roll: f64 = rng.random();
        if roll < mix.random_pct {
            Strategy::Random
        } else if roll < mix.random_pct + mix.mutated_pct {
            Strategy::Mutated
        } else {
            Strategy::Mismatch
        }
    }
}

/// Unique across the run: worker `i` of `n` owns ids `i, i + n, i + 2n, ...`.
pub fn case_id(index: usize, workers: usize, iteration: u64) -> u64 {
    index as u64 + iteration * workers as u64
}

pub struct Worker<E: Executor> {
    index: usize,
    config: RunConfig,
    rng: ChaCha8Rng,
    generator: ProgramGenerator,
    corpus: Option<Corpus>,
    shapes: BugShapeTable,
    oracle: Oracle,
    store: CaseStore,
    stats: WorkerStats,
    executor: E,
}

impl Worker<CommandExecutor> {
    pub fn new(config: RunConfig, index: usize) -> Result<Self> {
        let executor = CommandExecutor::new(CommandExecutorConfig::from_run_config(&config));
        Self::with_executor(config, index, executor)
    }
}

impl<E: Executor> Worker<E> {
    pub fn with_executor(config: RunConfig, index: usize, executor: E) -> Result<Self> {
        let store = CaseStore::new(&config.run_dir)?;
        let corpus = if config.use_corpus {
            let corpus = Corpus::load_from_dir(&config.corpus_dir)
                .with_context(|| format!("worker {index}: loading corpus"))?;
            if corpus.is_empty() {
                warn!(
                    "Worker {index}: corpus directory {:?} has no usable seeds",
                    config.corpus_dir
                );
            }
            Some(corpus)
        } else {
            None
        };

        Ok(Self {
            index,
            rng: ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(index as u64)),
            generator: ProgramGenerator::new(config.min_ops, config.max_ops),
            corpus,
            shapes: BugShapeTable::default(),
            oracle: Oracle::new(config.exit_codes.clone(), config.save_all, config.minimize),
            store,
            stats: WorkerStats::new(),
            executor,
            config,
        })
    }

    pub fn with_shapes(mut self, shapes: BugShapeTable) -> Self {
        self.shapes = shapes;
        self
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Draws the next program and input from this worker's random stream.
    pub fn next_case(&mut self) -> (Program, Vec<u8>) {
        let strategy = Strategy::choose(&mut self.rng, &self.config.strategy);
        let program = self.generator.generate(&mut self.rng);
        let input = next_input(
            &mut self.rng,
            self.corpus.as_ref(),
            self.config.strategy.corpus_pct,
        );

        match strategy {
            Strategy::Random => (program, input),
            Strategy::Mutated => {
                let mutated = ProgramMutator.mutate(&program, &mut self.rng, self.corpus.as_ref());
                (mutated, input)
            }
            Strategy::Mismatch => self.shapes.mutate(&program, &input, &mut self.rng),
        }
    }

    /// Runs one case and saves it if the oracle finds it interesting.
    pub fn run_case(&mut self, id: u64) -> Result<ExecutionResult> {
        let (program, input) = self.next_case();

        let mut input_file = tempfile::Builder::new()
            .prefix("input_")
            .suffix(".bin")
            .tempfile_in(&self.config.run_dir)
            .context("creating input file")?;
        input_file
            .write_all(&input)
            .and_then(|_| input_file.flush())
            .context("writing input file")?;

        let result = self.executor.execute(&program, input_file.path())?;
        self.stats.record(
            result.exit_code,
            result.timed_out,
            self.oracle.counts_as_crash(&result),
        );

        if let Some(report) = self.oracle.examine(&input, &result) {
            let program = if report.minimize {
                minimize(&mut self.executor, &program, input_file.path(), &result)?.program
            } else {
                program
            };
            self.store.save_case(id, &program, &input, &result)?;
            self.stats.record_saved();
            debug!(
                "Worker {}: saved case {id} ({}, {} tokens, input md5 {})",
                self.index,
                report.description,
                program.len(),
                report.input_hash
            );
        }
        Ok(result)
    }

    /// Loops until the configured case count is reached, or forever in
    /// continuous mode. Counters are flushed after every case.
    pub fn run(&mut self) -> Result<&WorkerStats> {
        let run_dir = self.config.run_dir.clone();
        let workers = self.config.workers.max(1);
        write_snapshot(&run_dir, self.index, &self.stats)?;

        for iteration in 0.. {
            let id = case_id(self.index, workers, iteration);
            if self.config.cases.is_some_and(|cases| id >= cases) {
                break;
            }
            self.run_case(id)?;
            write_snapshot(&run_dir, self.index, &self.stats)?;
        }

        info!(
            "Worker {} finished after {} cases ({} saved)",
            self.index, self.stats.total, self.stats.saved
        );
        Ok(&self.stats)
    }
}

/// Entry point of a worker process: reads the run's configuration back
/// from `run_dir` and runs worker `index` to completion.
pub fn run_worker(run_dir: &Path, index: usize) -> Result<()> {
    let config_path = run_dir.join(RUN_CONFIG_FILE);
    let config = RunConfig::load_from_file(&config_path)?;
    let mut worker = Worker::new(config, index)?;
    worker.run()?;
    Ok(())
}
