use super::{Collected, OutputTarget, Report, ReportError, write_target};
use crate::fs::FileSystem;
use crate::metrics::{AnalyzerId, Capability, Metrics, Selector, SharedAnalyzer};
use crate::model::{CodeModel, NodeId, Visitor, walk_package, walk_type};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;

/// Machine readable summary: every visible node with its metrics, grouped
/// by analyzer, plus project totals.
pub struct JsonSummary {
    fs: Arc<dyn FileSystem>,
    collected: Collected,
    nodes: Vec<JsonNode>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    analyzers: Vec<AnalyzerId>,
    project: IndexMap<AnalyzerId, Metrics>,
    nodes: &'a [JsonNode],
}

#[derive(Serialize)]
struct JsonNode {
    id: String,
    kind: &'static str,
    qualified_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<usize>,
    metrics: IndexMap<AnalyzerId, Metrics>,
}

impl JsonSummary {
    pub const ID: &'static str = "summary-json";

    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            collected: Collected::default(),
            nodes: Vec::new(),
        }
    }

    fn record(&mut self, model: &CodeModel, id: NodeId) {
        let entity = model.entity(id);
        self.nodes.push(JsonNode {
            id: model.node_identifier(id),
            kind: if model.is_method(id) {
                "method"
            } else {
                entity.kind.label()
            },
            qualified_name: model.qualified_name(id),
            file: entity
                .file
                .map(|file| model.file(file).path.display().to_string()),
            line: entity.file.map(|_| entity.span.start_line()),
            metrics: self.collected.node_metrics(id).into_iter().collect(),
        });
    }

    fn render(&mut self) -> Result<String, ReportError> {
        self.nodes.clear();
        if let Some(model) = self.collected.model.clone() {
            model.walk(self);
        }
        let report = JsonReport {
            analyzers: self.collected.ids(),
            project: self.collected.project_metrics().into_iter().collect(),
            nodes: &self.nodes,
        };
        Ok(serde_json::to_string_pretty(&report)?)
    }
}

impl Visitor for JsonSummary {
    fn visit_package(&mut self, model: &CodeModel, package: NodeId) {
        self.record(model, package);
        walk_package(self, model, package);
    }

    fn visit_type(&mut self, model: &CodeModel, ty: NodeId) {
        self.record(model, ty);
        walk_type(self, model, ty);
    }

    fn visit_function(&mut self, model: &CodeModel, function: NodeId) {
        self.record(model, function);
    }

    fn visit_method(&mut self, model: &CodeModel, method: NodeId) {
        self.record(model, method);
    }
}

impl Report for JsonSummary {
    fn name(&self) -> &str {
        Self::ID
    }

    fn accepted_capabilities(&self) -> Vec<Selector> {
        vec![
            Selector::Capability(Capability::NodeAware),
            Selector::Capability(Capability::ProjectAware),
        ]
    }

    fn set_code(&mut self, model: Arc<CodeModel>) {
        self.collected.model = Some(model);
    }

    fn submit(&mut self, analyzer: &SharedAnalyzer) -> bool {
        if !self.accepts(&*analyzer.read()) {
            return false;
        }
        self.collected.analyzers.push(analyzer.clone());
        true
    }

    fn set_output_target(&mut self, target: OutputTarget) {
        self.collected.target = Some(target);
    }

    fn close(&mut self) -> Result<(), ReportError> {
        let target = self.collected.target(Self::ID)?;
        let json = self.render()?;
        write_target(self.fs.as_ref(), &target, &json)?;
        tracing::info!(report = Self::ID, target = %target, nodes = self.nodes.len(), "report written");
        Ok(())
    }
}
