pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod fs;
pub mod metrics;
pub mod model;
pub mod parser;
pub mod report;
pub mod style;

pub use cli::Cli;
pub use config::Config;
pub use engine::{Engine, PipelineState, RunSummary};
pub use error::{ConfigurationError, EXIT_FAILURE, EXIT_OK, EngineError};
pub use metrics::{Analyzer, AnalyzerId, AnalyzerLoader, AnalyzerRegistry, ExecutionPlan};
pub use model::CodeModel;
