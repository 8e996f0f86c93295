use super::{Collected, OutputTarget, Report, ReportError, write_target};
use crate::fs::FileSystem;
use crate::metrics::{AnalyzerId, Capability, Metrics, Selector, SharedAnalyzer};
use crate::model::{CodeModel, NodeId, Visitor, walk_package, walk_type};
use std::sync::Arc;

/// Markdown summary, one section per package.
pub struct TextSummary {
    fs: Arc<dyn FileSystem>,
    collected: Collected,
    out: String,
}

impl TextSummary {
    pub const ID: &'static str = "summary-text";

    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            collected: Collected::default(),
            out: String::new(),
        }
    }

    fn push(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn line(&mut self, indent: usize, label: &str, metrics: Vec<(AnalyzerId, Metrics)>) {
        let values: Vec<String> = metrics
            .iter()
            .flat_map(|(_, m)| m.iter())
            .map(|(name, value)| format!("{}={}", name, format_value(*value)))
            .collect();
        let pad = "  ".repeat(indent);
        if values.is_empty() {
            self.push(&format!("{}- `{}`", pad, label));
        } else {
            self.push(&format!("{}- `{}`: {}", pad, label, values.join(", ")));
        }
    }

    fn render(&mut self) -> String {
        self.out.clear();
        self.push("# Metrics Summary\n");

        let ids: Vec<_> = self
            .collected
            .ids()
            .iter()
            .map(|id| format!("`{}`", id))
            .collect();
        if ids.is_empty() {
            self.push("Analyzers: none\n");
        } else {
            self.push(&format!("Analyzers: {}\n", ids.join(", ")));
        }

        let project = self.collected.project_metrics();
        if !project.is_empty() {
            self.push("## Project\n");
            for (analyzer, metrics) in project {
                for (name, value) in metrics {
                    self.push(&format!("- {} ({}): {}", name, analyzer, format_value(value)));
                }
            }
            self.push("");
        }

        if let Some(model) = self.collected.model.clone() {
            model.walk(self);
        }
        std::mem::take(&mut self.out)
    }
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}

impl Visitor for TextSummary {
    fn visit_package(&mut self, model: &CodeModel, package: NodeId) {
        self.push(&format!("## Package `{}`\n", model.entity(package).name));
        let metrics = self.collected.node_metrics(package);
        self.line(0, &model.node_identifier(package), metrics);
        walk_package(self, model, package);
        self.push("");
    }

    fn visit_type(&mut self, model: &CodeModel, ty: NodeId) {
        let metrics = self.collected.node_metrics(ty);
        self.line(0, &model.node_identifier(ty), metrics);
        walk_type(self, model, ty);
    }

    fn visit_function(&mut self, model: &CodeModel, function: NodeId) {
        let metrics = self.collected.node_metrics(function);
        self.line(0, &model.node_identifier(function), metrics);
    }

    fn visit_method(&mut self, model: &CodeModel, method: NodeId) {
        let metrics = self.collected.node_metrics(method);
        self.line(1, &model.node_identifier(method), metrics);
    }
}

impl Report for TextSummary {
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
        let text = self.render();
        write_target(self.fs.as_ref(), &target, &text)?;
        tracing::info!(report = Self::ID, target = %target, "report written");
        Ok(())
    }
}
