//! Report sinks: receive the model and the executed analyzers, write a
//! summary on close.

mod json;
mod text;

pub use json::JsonSummary;
pub use text::TextSummary;

use crate::error::ConfigurationError;
use crate::fs::FileSystem;
use crate::metrics::{
    Analyzer, AnalyzerId, Capability, Metrics, Selector, SharedAnalyzer, satisfies_any,
};
use crate::model::{CodeModel, NodeId};
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("Failed to write report to {target}: {source}")]
    Io {
        target: OutputTarget,
        source: io::Error,
    },
    #[error("Failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where a report writes on close. `-` stands for stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
}

impl FromStr for OutputTarget {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "-" => OutputTarget::Stdout,
            path => OutputTarget::File(PathBuf::from(path)),
        })
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::Stdout => write!(f, "stdout"),
            OutputTarget::File(path) => write!(f, "{}", path.display()),
        }
    }
}

pub trait Report: Send {
    fn name(&self) -> &str;

    /// Selectors of the analyzers this report wants to receive.
    fn accepted_capabilities(&self) -> Vec<Selector>;

    fn set_code(&mut self, _model: Arc<CodeModel>) {}

    /// Offers an executed analyzer. Returns true iff the report kept it.
    fn submit(&mut self, analyzer: &SharedAnalyzer) -> bool;

    fn set_output_target(&mut self, target: OutputTarget);

    fn close(&mut self) -> Result<(), ReportError>;

    fn accepts(&self, analyzer: &dyn Analyzer) -> bool {
        satisfies_any(
            analyzer.id(),
            analyzer.capabilities(),
            &self.accepted_capabilities(),
        )
    }
}

/// State shared by the bundled summary reports.
#[derive(Default)]
pub(crate) struct Collected {
    pub model: Option<Arc<CodeModel>>,
    pub analyzers: Vec<SharedAnalyzer>,
    pub target: Option<OutputTarget>,
}

impl Collected {
    pub fn target(&self, report: &str) -> Result<OutputTarget, ReportError> {
        self.target
            .clone()
            .ok_or_else(|| ConfigurationError::NoLogTarget(report.to_string()).into())
    }

    pub fn ids(&self) -> Vec<AnalyzerId> {
        self.analyzers.iter().map(|a| a.read().id().clone()).collect()
    }

    /// Per-analyzer node metrics, skipping analyzers that are not node aware
    /// or have nothing for `node`.
    pub fn node_metrics(&self, node: NodeId) -> Vec<(AnalyzerId, Metrics)> {
        self.metrics(Capability::NodeAware, |a| a.node_metrics(node))
    }

    pub fn project_metrics(&self) -> Vec<(AnalyzerId, Metrics)> {
        self.metrics(Capability::ProjectAware, |a| a.project_metrics())
    }

    fn metrics<F>(&self, capability: Capability, read: F) -> Vec<(AnalyzerId, Metrics)>
    where
        F: Fn(&dyn Analyzer) -> Metrics,
    {
        self.analyzers
            .iter()
            .filter_map(|analyzer| {
                let analyzer = analyzer.read();
                if !analyzer.capabilities().contains(capability) {
                    return None;
                }
                let metrics = read(&*analyzer);
                (!metrics.is_empty()).then(|| (analyzer.id().clone(), metrics))
            })
            .collect()
    }
}

pub(crate) fn write_target(
    fs: &dyn FileSystem,
    target: &OutputTarget,
    content: &str,
) -> Result<(), ReportError> {
    let result = match target {
        OutputTarget::Stdout => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(content.as_bytes())
                .and_then(|_| stdout.flush())
        }
        OutputTarget::File(path) => fs.write(path, content),
    };
    result.map_err(|source| ReportError::Io {
        target: target.clone(),
        source,
    })
}

/// Creates the bundled reports by id.
pub struct ReportFactory {
    fs: Arc<dyn FileSystem>,
}

impl ReportFactory {
    pub const IDS: [&'static str; 2] = [JsonSummary::ID, TextSummary::ID];

    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    pub fn create(&self, id: &str) -> Result<Box<dyn Report>, ConfigurationError> {
        match id.trim().to_lowercase().as_str() {
            JsonSummary::ID => Ok(Box::new(JsonSummary::new(self.fs.clone()))),
            TextSummary::ID => Ok(Box::new(TextSummary::new(self.fs.clone()))),
            _ => Err(ConfigurationError::UnknownReport(id.to_string())),
        }
    }
}
