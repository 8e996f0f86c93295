use crate::config::ConfigError;
use crate::events::ObserverError;
use crate::metrics::{AnalyzerError, CacheError, ConstructionError};
use crate::parser::ParseError;
use crate::report::ReportError;
use thiserror::Error;

/// Exit code of a successful run.
pub const EXIT_OK: i32 = 0;
/// Exit code of any configuration or pipeline failure.
pub const EXIT_FAILURE: i32 = 2;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("No source directories or files to analyze.")]
    NoSources,
    #[error("No output specified.")]
    NoReports,
    #[error("The log target is not configured for '{0}'.")]
    NoLogTarget(String),
    #[error("Unknown report '{0}'")]
    UnknownReport(String),
    #[error(transparent)]
    File(#[from] ConfigError),
}

/// Everything that can end a run early.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Construction(#[from] ConstructionError),
    #[error(transparent)]
    Observer(#[from] ObserverError),
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl EngineError {
    pub fn exit_code(&self) -> i32 {
        EXIT_FAILURE
    }
}
