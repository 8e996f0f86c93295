use super::{
    Analyzer, AnalyzerDescriptor, AnalyzerError, AnalyzerId, Capability, CapabilitySet, Metrics,
    Origin, Selector, SharedAnalyzer, shared,
};
use crate::model::{CodeModel, NodeId, Visitor, walk_package, walk_type};
use std::collections::HashMap;

/// `metric = numerator / denominator`, over metric names published by the
/// dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ratio {
    pub numerator: String,
    pub denominator: String,
    pub metric: String,
}

impl Ratio {
    fn apply(&self, inputs: &Metrics) -> Option<f64> {
        let numerator = inputs.get(&self.numerator)?;
        let denominator = inputs.get(&self.denominator)?;
        (*denominator > 0.0).then(|| numerator / denominator)
    }
}

/// Aggregate computing one ratio from the results of its dependencies.
pub struct DerivedMetric {
    id: AnalyzerId,
    capabilities: CapabilitySet,
    enabled: bool,
    ratio: Ratio,
    dependencies: Vec<SharedAnalyzer>,
    nodes: HashMap<NodeId, Metrics>,
    project: Metrics,
}

impl DerivedMetric {
    pub const METHOD_SIZE: &'static str = "method-size";

    pub fn descriptor(
        id: AnalyzerId,
        capabilities: CapabilitySet,
        requires: Vec<Selector>,
        ratio: Ratio,
    ) -> AnalyzerDescriptor {
        AnalyzerDescriptor::new(id, capabilities, move |ctx| {
            let id = ctx.id.clone();
            Ok(shared(DerivedMetric {
                enabled: !ctx.options().is_disabled(&id),
                id,
                capabilities: capabilities.with(Capability::Aggregate),
                ratio: ratio.clone(),
                dependencies: Vec::new(),
                nodes: HashMap::new(),
                project: Metrics::new(),
            }))
        })
        .requiring(requires)
        .configurable()
    }

    /// Average method length: `amloc = loc / nom`.
    pub fn method_size_descriptor() -> AnalyzerDescriptor {
        Self::descriptor(
            AnalyzerId::new(Self::METHOD_SIZE),
            CapabilitySet::of(&[Capability::NodeAware, Capability::ProjectAware]),
            vec![Selector::parse("node-loc"), Selector::parse("node-count")],
            Ratio {
                numerator: "loc".to_string(),
                denominator: "nom".to_string(),
                metric: "amloc".to_string(),
            },
        )
        .with_origin(Origin::Builtin)
        .describe("average lines of code per method")
    }

    fn inputs(&self, node: Option<NodeId>) -> Metrics {
        let mut inputs = Metrics::new();
        for dependency in &self.dependencies {
            let dependency = dependency.read();
            match node {
                Some(node) => inputs.extend(dependency.node_metrics(node)),
                None => inputs.extend(dependency.project_metrics()),
            }
        }
        inputs
    }

    fn result(&self, value: f64) -> Metrics {
        let mut metrics = Metrics::new();
        metrics.insert(self.ratio.metric.clone(), value);
        metrics
    }
}

#[derive(Default)]
struct Nodes(Vec<NodeId>);

impl Visitor for Nodes {
    fn visit_package(&mut self, model: &CodeModel, package: NodeId) {
        self.0.push(package);
        walk_package(self, model, package);
    }

    fn visit_type(&mut self, model: &CodeModel, ty: NodeId) {
        self.0.push(ty);
        walk_type(self, model, ty);
    }

    fn visit_function(&mut self, _model: &CodeModel, function: NodeId) {
        self.0.push(function);
    }

    fn visit_method(&mut self, _model: &CodeModel, method: NodeId) {
        self.0.push(method);
    }
}

impl Analyzer for DerivedMetric {
    fn id(&self) -> &AnalyzerId {
        &self.id
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn add_dependency(&mut self, analyzer: SharedAnalyzer) {
        self.dependencies.push(analyzer);
    }

    fn analyze(&mut self, model: &CodeModel) -> Result<(), AnalyzerError> {
        if self.dependencies.is_empty() {
            tracing::debug!(analyzer = %self.id, "no dependencies wired, nothing to derive");
        }

        let mut nodes = HashMap::new();
        if self.capabilities.contains(Capability::NodeAware) {
            let mut visible = Nodes::default();
            model.walk(&mut visible);
            for node in visible.0 {
                if let Some(value) = self.ratio.apply(&self.inputs(Some(node))) {
                    nodes.insert(node, self.result(value));
                }
            }
        }

        self.project = if self.capabilities.contains(Capability::ProjectAware) {
            self.ratio
                .apply(&self.inputs(None))
                .map(|value| self.result(value))
                .unwrap_or_default()
        } else {
            Metrics::new()
        };
        self.nodes = nodes;
        Ok(())
    }

    fn node_metrics(&self, node: NodeId) -> Metrics {
        self.nodes.get(&node).cloned().unwrap_or_default()
    }

    fn project_metrics(&self) -> Metrics {
        self.project.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MemoryCache, NodeCount, NodeLoc, Options};
    use crate::model::{Language, Span, TypeKind};
    use std::path::PathBuf;
    use std::sync::Arc;

    #[test]
    fn test_ratio_requires_positive_denominator() {
        let ratio = Ratio {
            numerator: "loc".to_string(),
            denominator: "nom".to_string(),
            metric: "amloc".to_string(),
        };
        let mut inputs = Metrics::new();
        inputs.insert("loc".to_string(), 12.0);
        assert_eq!(ratio.apply(&inputs), None);
        inputs.insert("nom".to_string(), 0.0);
        assert_eq!(ratio.apply(&inputs), None);
        inputs.insert("nom".to_string(), 4.0);
        assert_eq!(ratio.apply(&inputs), Some(3.0));
    }

    #[test]
    fn test_method_size_over_wired_dependencies() {
        let mut model = CodeModel::new();
        let text = "class A:\n    def f(self):\n        pass\n    def g(self):\n        pass\n";
        let file = model.add_file(PathBuf::from("a.py"), Language::Python, text.to_string());
        let package = model.package("pkg");
        let class = model.create_type("A", TypeKind::Class, Some(file), Span::new(1, 5));
        model.add_child(package, class).unwrap();
        for (name, start) in [("f", 2), ("g", 4)] {
            let method = model.create_function(name, Some(file), Span::new(start, start + 1));
            model.add_child(class, method).unwrap();
        }

        let loc: SharedAnalyzer = shared(
            NodeLoc::new(&Options::new(), Arc::new(MemoryCache::new())).unwrap(),
        );
        let count: SharedAnalyzer = shared(NodeCount::new(&Options::new()));
        loc.write().analyze(&model).unwrap();
        count.write().analyze(&model).unwrap();

        let mut analyzer = DerivedMetric {
            id: AnalyzerId::new(DerivedMetric::METHOD_SIZE),
            capabilities: CapabilitySet::of(&[Capability::NodeAware, Capability::ProjectAware]),
            enabled: true,
            ratio: Ratio {
                numerator: "loc".to_string(),
                denominator: "nom".to_string(),
                metric: "amloc".to_string(),
            },
            dependencies: Vec::new(),
            nodes: HashMap::new(),
            project: Metrics::new(),
        };
        analyzer.add_dependency(loc);
        analyzer.add_dependency(count);
        analyzer.analyze(&model).unwrap();

        assert_eq!(analyzer.node_metrics(class)["amloc"], 2.5);
        assert_eq!(analyzer.node_metrics(package)["amloc"], 2.5);
        assert_eq!(analyzer.project_metrics()["amloc"], 2.5);
    }
}
