//! Analyzers, their classification, and the loader that orders them.

mod cache;
mod capability;
mod derived;
mod loader;
mod node_count;
mod node_loc;
mod options;
mod registry;

pub use cache::{CACHE_FILE, CacheError, CacheKey, FileCache, MemoryCache, MetricCache};
pub use capability::{AnalyzerId, Capability, CapabilitySet, Selector, satisfies, satisfies_any};
pub use derived::DerivedMetric;
pub use loader::{
    AnalyzerLoader, ConstructionError, DisabledPolicy, ExecutionPlan, InstanceCache, Step,
};
pub use node_count::NodeCount;
pub use node_loc::NodeLoc;
pub use options::{DISABLED_ANALYZERS, Options};
pub use registry::{
    AnalyzerDescriptor, AnalyzerFactory, AnalyzerRegistry, ConstructionContext, Origin,
    RegistryDiagnostic,
};

use crate::model::{CodeModel, NodeId};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;

/// Generic result shape: metric name to value.
pub type Metrics = IndexMap<String, f64>;

/// The single instance of an analyzer, shared by every step and dependent.
pub type SharedAnalyzer = Arc<RwLock<dyn Analyzer>>;

pub fn shared<A: Analyzer + 'static>(analyzer: A) -> SharedAnalyzer {
    Arc::new(RwLock::new(analyzer))
}

#[derive(Debug, Error)]
#[error("Analyzer '{analyzer}' failed: {message}")]
pub struct AnalyzerError {
    pub analyzer: AnalyzerId,
    pub message: String,
}

impl AnalyzerError {
    pub fn new(analyzer: &AnalyzerId, message: impl Into<String>) -> Self {
        Self {
            analyzer: analyzer.clone(),
            message: message.into(),
        }
    }
}

/// One analysis pass over the code model.
///
/// Node-aware analyzers answer `node_metrics`, project-aware analyzers answer
/// `project_metrics`; everything else keeps the empty defaults.
pub trait Analyzer: Send + Sync {
    fn id(&self) -> &AnalyzerId;

    fn capabilities(&self) -> CapabilitySet;

    /// Runtime opt-out, evaluated by the loader after dependency resolution.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Receives a resolved dependency. Only aggregates keep it.
    fn add_dependency(&mut self, _analyzer: SharedAnalyzer) {}

    fn analyze(&mut self, model: &CodeModel) -> Result<(), AnalyzerError>;

    fn node_metrics(&self, _node: NodeId) -> Metrics {
        Metrics::new()
    }

    fn project_metrics(&self) -> Metrics {
        Metrics::new()
    }
}
