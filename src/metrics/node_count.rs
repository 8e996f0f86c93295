use super::{
    Analyzer, AnalyzerDescriptor, AnalyzerError, AnalyzerId, Capability, CapabilitySet, Metrics,
    Options, Origin, shared,
};
use crate::model::{CodeModel, EntityKind, NodeId, TypeKind, Visitor, walk_package, walk_type};
use std::collections::HashMap;

/// Counts packages, classes, interfaces, methods and functions.
pub struct NodeCount {
    id: AnalyzerId,
    enabled: bool,
    nodes: HashMap<NodeId, Metrics>,
    project: Metrics,
}

impl NodeCount {
    pub const ID: &'static str = "node-count";

    pub fn new(options: &Options) -> Self {
        let id = AnalyzerId::new(Self::ID);
        Self {
            enabled: !options.is_disabled(&id),
            id,
            nodes: HashMap::new(),
            project: Metrics::new(),
        }
    }

    pub fn descriptor() -> AnalyzerDescriptor {
        AnalyzerDescriptor::new(
            Self::ID,
            CapabilitySet::of(&[Capability::NodeAware, Capability::ProjectAware]),
            |ctx| Ok(shared(NodeCount::new(ctx.options()))),
        )
        .configurable()
        .with_origin(Origin::Builtin)
        .describe("number of packages, classes, interfaces, methods and functions")
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    packages: usize,
    classes: usize,
    interfaces: usize,
    methods: usize,
    functions: usize,
}

impl Totals {
    fn since(self, before: Totals) -> Metrics {
        let mut metrics = Metrics::new();
        metrics.insert("noc".to_string(), (self.classes - before.classes) as f64);
        metrics.insert("noi".to_string(), (self.interfaces - before.interfaces) as f64);
        metrics.insert("nom".to_string(), (self.methods - before.methods) as f64);
        metrics.insert("nof".to_string(), (self.functions - before.functions) as f64);
        metrics
    }
}

#[derive(Default)]
struct Tally {
    totals: Totals,
    nodes: HashMap<NodeId, Metrics>,
}

impl Visitor for Tally {
    fn visit_package(&mut self, model: &CodeModel, package: NodeId) {
        let before = self.totals;
        self.totals.packages += 1;
        walk_package(self, model, package);
        self.nodes.insert(package, self.totals.since(before));
    }

    fn visit_type(&mut self, model: &CodeModel, ty: NodeId) {
        match model.entity(ty).kind {
            EntityKind::Type(TypeKind::Interface) => self.totals.interfaces += 1,
            _ => self.totals.classes += 1,
        }
        let mut metrics = Metrics::new();
        metrics.insert("nom".to_string(), model.function_count(ty) as f64);
        self.nodes.insert(ty, metrics);
        walk_type(self, model, ty);
    }

    fn visit_function(&mut self, _model: &CodeModel, _function: NodeId) {
        self.totals.functions += 1;
    }

    fn visit_method(&mut self, _model: &CodeModel, _method: NodeId) {
        self.totals.methods += 1;
    }
}

impl Analyzer for NodeCount {
    fn id(&self) -> &AnalyzerId {
        &self.id
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::of(&[Capability::NodeAware, Capability::ProjectAware])
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn analyze(&mut self, model: &CodeModel) -> Result<(), AnalyzerError> {
        let mut tally = Tally::default();
        model.walk(&mut tally);

        let totals = tally.totals;
        let mut project = Metrics::new();
        project.insert("nop".to_string(), totals.packages as f64);
        project.extend(totals.since(Totals::default()));

        self.nodes = tally.nodes;
        self.project = project;
        tracing::debug!(packages = totals.packages, "node counts collected");
        Ok(())
    }

    fn node_metrics(&self, node: NodeId) -> Metrics {
        self.nodes.get(&node).cloned().unwrap_or_default()
    }

    fn project_metrics(&self) -> Metrics {
        self.project.clone()
    }
}
