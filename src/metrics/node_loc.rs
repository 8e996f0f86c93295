use super::{
    Analyzer, AnalyzerDescriptor, AnalyzerError, AnalyzerId, CacheKey, Capability, CapabilitySet,
    ConstructionError, MetricCache, Metrics, Options, Origin, shared,
};
use crate::model::{CodeModel, Language, NodeId, SourceFile, Span, Visitor, walk_package, walk_type};
use std::collections::HashMap;
use std::sync::Arc;

/// Skip blank lines when counting `loc`.
pub const IGNORE_BLANK: &str = "node-loc.ignore-blank";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct LineCount {
    loc: usize,
    cloc: usize,
}

impl LineCount {
    fn of<'a>(lines: impl Iterator<Item = &'a str>, language: Language, ignore_blank: bool) -> Self {
        let prefixes = language.comment_prefixes();
        let mut count = LineCount::default();
        for line in lines {
            let trimmed = line.trim();
            if trimmed.is_empty() && ignore_blank {
                continue;
            }
            count.loc += 1;
            if prefixes.iter().any(|p| trimmed.starts_with(p)) {
                count.cloc += 1;
            }
        }
        count
    }

    fn add(&mut self, other: LineCount) {
        self.loc += other.loc;
        self.cloc += other.cloc;
    }

    fn to_metrics(self) -> Metrics {
        let mut metrics = Metrics::new();
        metrics.insert("loc".to_string(), self.loc as f64);
        metrics.insert("cloc".to_string(), self.cloc as f64);
        metrics.insert("ncloc".to_string(), self.loc.saturating_sub(self.cloc) as f64);
        metrics
    }

    fn from_metrics(metrics: &Metrics) -> Option<Self> {
        Some(Self {
            loc: *metrics.get("loc")? as usize,
            cloc: *metrics.get("cloc")? as usize,
        })
    }
}

/// Lines of code, comment lines and non-comment lines per declaration.
pub struct NodeLoc {
    id: AnalyzerId,
    enabled: bool,
    ignore_blank: bool,
    cache: Arc<dyn MetricCache>,
    nodes: HashMap<NodeId, Metrics>,
    project: Metrics,
}

impl NodeLoc {
    pub const ID: &'static str = "node-loc";

    pub fn new(options: &Options, cache: Arc<dyn MetricCache>) -> Result<Self, ConstructionError> {
        let id = AnalyzerId::new(Self::ID);
        Ok(Self {
            enabled: !options.is_disabled(&id),
            ignore_blank: options.get_bool(&id, IGNORE_BLANK, false)?,
            id,
            cache,
            nodes: HashMap::new(),
            project: Metrics::new(),
        })
    }

    pub fn descriptor() -> AnalyzerDescriptor {
        AnalyzerDescriptor::new(
            Self::ID,
            CapabilitySet::of(&[Capability::NodeAware, Capability::ProjectAware]),
            |ctx| {
                let cache = ctx.require_cache()?;
                Ok(shared(NodeLoc::new(ctx.options(), cache)?))
            },
        )
        .configurable()
        .cache_aware()
        .with_origin(Origin::Builtin)
        .describe("lines of code (loc, cloc, ncloc)")
    }

    fn cached(&self, key: String, compute: impl FnOnce() -> LineCount) -> LineCount {
        let key = CacheKey::new(&self.id, key);
        if let Some(count) = self.cache.get(&key).as_ref().and_then(LineCount::from_metrics) {
            return count;
        }
        let count = compute();
        self.cache.put(key, count.to_metrics());
        count
    }

    fn measure(&self, file: &SourceFile, qualified: &str, span: Span) -> LineCount {
        let key = format!(
            "{}#{}#{}-{}#{}",
            file.digest, qualified, span.start_line(), span.end_line(), self.ignore_blank
        );
        self.cached(key, || {
            LineCount::of(file.span_lines(span), file.language, self.ignore_blank)
        })
    }
}

struct Measure<'a> {
    analyzer: &'a NodeLoc,
    nodes: HashMap<NodeId, LineCount>,
}

impl Measure<'_> {
    fn declaration(&mut self, model: &CodeModel, id: NodeId) -> LineCount {
        let entity = model.entity(id);
        let count = match entity.file {
            Some(file) => {
                self.analyzer
                    .measure(model.file(file), &model.qualified_name(id), entity.span)
            }
            None => LineCount::default(),
        };
        self.nodes.insert(id, count);
        count
    }
}

impl Visitor for Measure<'_> {
    fn visit_package(&mut self, model: &CodeModel, package: NodeId) {
        walk_package(self, model, package);
        let mut total = LineCount::default();
        for child in model.children(package) {
            if let Some(count) = self.nodes.get(&child) {
                total.add(*count);
            }
        }
        self.nodes.insert(package, total);
    }

    fn visit_type(&mut self, model: &CodeModel, ty: NodeId) {
        self.declaration(model, ty);
        walk_type(self, model, ty);
    }

    fn visit_function(&mut self, model: &CodeModel, function: NodeId) {
        self.declaration(model, function);
    }

    fn visit_method(&mut self, model: &CodeModel, method: NodeId) {
        self.declaration(model, method);
    }
}

impl Analyzer for NodeLoc {
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
        let mut measure = Measure {
            analyzer: self,
            nodes: HashMap::new(),
        };
        model.walk(&mut measure);
        let nodes: HashMap<NodeId, Metrics> = measure
            .nodes
            .into_iter()
            .map(|(id, count)| (id, count.to_metrics()))
            .collect();

        let mut total = LineCount::default();
        for file in model.files() {
            let count = self.cached(format!("{}#{}", file.digest, self.ignore_blank), || {
                LineCount::of(file.text.lines(), file.language, self.ignore_blank)
            });
            total.add(count);
        }

        self.nodes = nodes;
        self.project = total.to_metrics();
        tracing::debug!(loc = total.loc, files = model.files().count(), "line counts collected");
        Ok(())
    }

    fn node_metrics(&self, node: NodeId) -> Metrics {
        self.nodes.get(&node).cloned().unwrap_or_default()
    }

    fn project_metrics(&self) -> Metrics {
        self.project.clone()
    }
}
