pub mod config;
pub mod coordinator;
pub mod corpus;
pub mod executor;
pub mod generator;
pub mod input;
pub mod minimizer;
pub mod mismatch;
pub mod mutator;
pub mod oracle;
pub mod program;
pub mod regex;
pub mod repro;
pub mod stats;
pub mod store;
pub mod worker;

pub use config::{ConfigError, ExitCodePolicy, RunConfig, StrategyMix};
pub use coordinator::{Coordinator, CoordinatorError, RunOutcome, WorkerLauncher};
pub use corpus::{Corpus, CorpusError};
pub use executor::{CommandExecutor, CommandExecutorConfig, ExecutionResult, Executor, HarnessError};
pub use generator::ProgramGenerator;
pub use minimizer::minimize;
pub use mismatch::{BugShape, BugShapeTable};
pub use mutator::{InputMutator, Mutator, ProgramMutator};
pub use oracle::{BugReport, Oracle, same_failure};
pub use program::Program;
pub use repro::{ReproReport, reproduce_case, reproduce_files};
pub use stats::{StatsError, WorkerStats};
pub use store::{CaseRecord, CaseStore, StoreError};
pub use worker::{Worker, run_worker};
