use super::derived::{DerivedMetric, Ratio};
use super::loader::ConstructionError;
use super::{
    AnalyzerId, Capability, CapabilitySet, MetricCache, NodeCount, NodeLoc, Options, Selector,
    SharedAnalyzer, satisfies_any,
};
use crate::fs::FileSystem;
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type AnalyzerFactory = Arc<
    dyn Fn(ConstructionContext<'_>) -> Result<SharedAnalyzer, ConstructionError> + Send + Sync,
>;

static NO_OPTIONS: Options = Options::empty();

/// What the loader hands a factory when it creates an instance.
pub struct ConstructionContext<'a> {
    pub id: &'a AnalyzerId,
    /// Present only for descriptors declared `configurable`.
    pub options: Option<&'a Options>,
    /// Present only for descriptors declared `cache_aware`.
    pub cache: Option<Arc<dyn MetricCache>>,
}

impl ConstructionContext<'_> {
    pub fn options(&self) -> &Options {
        self.options.unwrap_or(&NO_OPTIONS)
    }

    pub fn require_cache(&self) -> Result<Arc<dyn MetricCache>, ConstructionError> {
        self.cache
            .clone()
            .ok_or_else(|| ConstructionError::MissingCache {
                analyzer: self.id.clone(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Builtin,
    Manifest(PathBuf),
    Custom,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Builtin => write!(f, "built-in"),
            Origin::Manifest(path) => write!(f, "{}", path.display()),
            Origin::Custom => write!(f, "custom"),
        }
    }
}

/// Static description of an analyzer implementation.
#[derive(Clone)]
pub struct AnalyzerDescriptor {
    pub id: AnalyzerId,
    pub capabilities: CapabilitySet,
    pub requires: Vec<Selector>,
    pub configurable: bool,
    pub cache_aware: bool,
    pub origin: Origin,
    pub description: String,
    factory: AnalyzerFactory,
}

impl AnalyzerDescriptor {
    pub fn new<F>(id: impl Into<AnalyzerId>, capabilities: CapabilitySet, factory: F) -> Self
    where
        F: Fn(ConstructionContext<'_>) -> Result<SharedAnalyzer, ConstructionError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            id: id.into(),
            capabilities,
            requires: Vec::new(),
            configurable: false,
            cache_aware: false,
            origin: Origin::Custom,
            description: String::new(),
            factory: Arc::new(factory),
        }
    }

    /// Declares the analyzer an aggregate over whatever `selectors` resolve to.
    pub fn requiring<I>(mut self, selectors: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Selector>,
    {
        self.capabilities.insert(Capability::Aggregate);
        self.requires.extend(selectors.into_iter().map(Into::into));
        self
    }

    pub fn configurable(mut self) -> Self {
        self.configurable = true;
        self
    }

    pub fn cache_aware(mut self) -> Self {
        self.cache_aware = true;
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn is_aggregate(&self) -> bool {
        self.capabilities.contains(Capability::Aggregate)
    }

    pub fn matches(&self, selectors: &[Selector]) -> bool {
        satisfies_any(&self.id, self.capabilities, selectors)
    }

    pub fn create(&self, context: ConstructionContext<'_>) -> Result<SharedAnalyzer, ConstructionError> {
        (self.factory)(context)
    }
}

impl fmt::Debug for AnalyzerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerDescriptor")
            .field("id", &self.id)
            .field("capabilities", &self.capabilities)
            .field("requires", &self.requires)
            .field("configurable", &self.configurable)
            .field("cache_aware", &self.cache_aware)
            .field("origin", &self.origin)
            .finish()
    }
}

/// A registration problem. Recorded and logged, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryDiagnostic {
    pub source: Origin,
    pub message: String,
}

impl fmt::Display for RegistryDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    analyzer: Vec<RawAnalyzer>,
}

#[derive(Debug, Deserialize)]
struct RawAnalyzer {
    id: Option<String>,
    kind: Option<String>,
    description: Option<String>,
    requires: Option<Vec<String>>,
    capabilities: Option<Vec<String>>,
    numerator: Option<String>,
    denominator: Option<String>,
    metric: Option<String>,
}

/// Every analyzer implementation known to the process.
#[derive(Debug, Default, Clone)]
pub struct AnalyzerRegistry {
    descriptors: Vec<AnalyzerDescriptor>,
    diagnostics: Vec<RegistryDiagnostic>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(NodeCount::descriptor());
        registry.register(NodeLoc::descriptor());
        registry.register(DerivedMetric::method_size_descriptor());
        registry
    }

    /// Adds a descriptor. A duplicate id is reported and ignored.
    pub fn register(&mut self, descriptor: AnalyzerDescriptor) -> bool {
        if self.get(&descriptor.id).is_some() {
            self.report(
                descriptor.origin.clone(),
                format!("duplicate analyzer id '{}' ignored", descriptor.id),
            );
            return false;
        }
        self.descriptors.push(descriptor);
        true
    }

    pub fn get(&self, id: &AnalyzerId) -> Option<&AnalyzerDescriptor> {
        self.descriptors.iter().find(|d| d.id == *id)
    }

    /// All descriptors, in registration order.
    pub fn find_all(&self) -> impl Iterator<Item = &AnalyzerDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn diagnostics(&self) -> &[RegistryDiagnostic] {
        &self.diagnostics
    }

    fn report(&mut self, source: Origin, message: String) {
        tracing::warn!(source = %source, "{}", message);
        self.diagnostics.push(RegistryDiagnostic { source, message });
    }

    /// Registers the analyzers declared by every `*.toml` manifest in `paths`.
    /// Returns how many were added.
    pub fn load_search_paths(&mut self, paths: &[PathBuf], fs: &dyn FileSystem) -> usize {
        let mut added = 0;
        for dir in paths {
            let manifests = match fs.list_files(dir, "toml") {
                Ok(files) => files,
                Err(e) => {
                    self.report(
                        Origin::Manifest(dir.clone()),
                        format!("cannot read analyzer directory: {}", e),
                    );
                    continue;
                }
            };
            for manifest in manifests {
                match fs.read_to_string(&manifest) {
                    Ok(content) => added += self.load_manifest(&manifest, &content),
                    Err(e) => self.report(
                        Origin::Manifest(manifest.clone()),
                        format!("cannot read manifest: {}", e),
                    ),
                }
            }
        }
        added
    }

    fn load_manifest(&mut self, path: &Path, content: &str) -> usize {
        let origin = Origin::Manifest(path.to_path_buf());
        let raw: RawManifest = match toml::from_str(content) {
            Ok(raw) => raw,
            Err(e) => {
                self.report(origin, format!("malformed manifest: {}", e));
                return 0;
            }
        };

        let mut added = 0;
        for entry in raw.analyzer {
            match build_manifest_descriptor(entry, &origin) {
                Ok(descriptor) => {
                    if self.register(descriptor) {
                        added += 1;
                    }
                }
                Err(message) => self.report(origin.clone(), message),
            }
        }
        added
    }

    /// Groups of analyzers whose requirements form a cycle.
    ///
    /// The loader breaks such cycles at runtime; this is for reporting.
    pub fn requirement_cycles(&self) -> Vec<Vec<AnalyzerId>> {
        let mut graph = DiGraph::<AnalyzerId, ()>::new();
        let nodes: Vec<_> = self
            .descriptors
            .iter()
            .map(|d| graph.add_node(d.id.clone()))
            .collect();

        for (i, dependent) in self.descriptors.iter().enumerate() {
            for (j, dependency) in self.descriptors.iter().enumerate() {
                if i != j && dependency.matches(&dependent.requires) {
                    graph.add_edge(nodes[i], nodes[j], ());
                }
            }
        }

        let mut cycles: Vec<Vec<AnalyzerId>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                let mut ids: Vec<_> = component.into_iter().map(|n| graph[n].clone()).collect();
                ids.sort();
                ids
            })
            .collect();
        cycles.sort();
        cycles
    }
}

fn build_manifest_descriptor(
    raw: RawAnalyzer,
    origin: &Origin,
) -> Result<AnalyzerDescriptor, String> {
    let id = raw
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| "analyzer entry without an id".to_string())?;

    let kind = raw.kind.as_deref().unwrap_or("ratio");
    if kind != "ratio" {
        return Err(format!("analyzer '{}': unknown kind '{}'", id, kind));
    }

    let requires = raw.requires.unwrap_or_default();
    if requires.is_empty() {
        return Err(format!("analyzer '{}': 'requires' must not be empty", id));
    }

    let numerator = raw
        .numerator
        .ok_or_else(|| format!("analyzer '{}': missing 'numerator'", id))?;
    let denominator = raw
        .denominator
        .ok_or_else(|| format!("analyzer '{}': missing 'denominator'", id))?;
    let metric = raw
        .metric
        .unwrap_or_else(|| format!("{}_per_{}", numerator, denominator));

    let capabilities = match raw.capabilities {
        None => CapabilitySet::of(&[Capability::NodeAware, Capability::ProjectAware]),
        Some(names) => {
            let mut set = CapabilitySet::empty();
            for name in names {
                match name.parse::<Capability>() {
                    Ok(tag @ (Capability::NodeAware | Capability::ProjectAware)) => set.insert(tag),
                    Ok(tag) => {
                        return Err(format!(
                            "analyzer '{}': capability '{}' cannot be declared",
                            id, tag
                        ));
                    }
                    Err(e) => return Err(format!("analyzer '{}': {}", id, e)),
                }
            }
            set
        }
    };

    let ratio = Ratio {
        numerator,
        denominator,
        metric,
    };
    Ok(DerivedMetric::descriptor(
        AnalyzerId::new(id),
        capabilities,
        requires.iter().map(|s| Selector::parse(s)).collect(),
        ratio,
    )
    .with_origin(origin.clone())
    .describe(raw.description.unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFs;
    use indoc::indoc;

    #[test]
    fn test_builtins_are_registered_in_order() {
        let registry = AnalyzerRegistry::with_builtins();
        let ids: Vec<_> = registry.find_all().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["node-count", "node-loc", "method-size"]);
        assert!(registry.get(&AnalyzerId::new("method-size")).unwrap().is_aggregate());
        assert!(registry.diagnostics().is_empty());
    }

    #[test]
    fn test_duplicate_registration_is_reported() {
        let mut registry = AnalyzerRegistry::with_builtins();
        assert!(!registry.register(NodeLoc::descriptor()));
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.diagnostics().len(), 1);
        assert!(registry.diagnostics()[0].message.contains("duplicate"));
    }

    #[test]
    fn test_load_manifest_registers_derived_analyzers() {
        let fs = MockFs::with_files([(
            "/analyzers/ratios.toml",
            indoc! {r#"
                [[analyzer]]
                id = "comment-ratio"
                requires = ["node-loc"]
                numerator = "cloc"
                denominator = "loc"
                capabilities = ["per-node"]
            "#},
        )]);
        let mut registry = AnalyzerRegistry::with_builtins();

        let added = registry.load_search_paths(&[PathBuf::from("/analyzers")], &fs);

        assert_eq!(added, 1);
        let descriptor = registry.get(&AnalyzerId::new("comment-ratio")).unwrap();
        assert!(descriptor.is_aggregate());
        assert!(descriptor.capabilities.contains(Capability::NodeAware));
        assert!(!descriptor.capabilities.contains(Capability::ProjectAware));
        assert_eq!(
            descriptor.origin,
            Origin::Manifest(PathBuf::from("/analyzers/ratios.toml"))
        );
    }

    #[test]
    fn test_malformed_manifests_become_diagnostics() {
        let fs = MockFs::with_files([
            ("/analyzers/a.toml", "[[analyzer]\nid = "),
            (
                "/analyzers/b.toml",
                indoc! {r#"
                    [[analyzer]]
                    requires = ["node-loc"]

                    [[analyzer]]
                    id = "no-numerator"
                    requires = ["node-loc"]
                    denominator = "loc"

                    [[analyzer]]
                    id = "bad-cap"
                    requires = ["node-loc"]
                    numerator = "cloc"
                    denominator = "loc"
                    capabilities = ["sideways"]

                    [[analyzer]]
                    id = "ok"
                    requires = ["node-loc"]
                    numerator = "cloc"
                    denominator = "loc"
                "#},
            ),
        ]);
        let mut registry = AnalyzerRegistry::new();

        let added = registry.load_search_paths(
            &[PathBuf::from("/analyzers"), PathBuf::from("/missing")],
            &fs,
        );

        assert_eq!(added, 1);
        assert!(registry.get(&AnalyzerId::new("ok")).is_some());
        let messages: Vec<_> = registry
            .diagnostics()
            .iter()
            .map(|d| d.message.as_str())
            .collect();
        assert_eq!(messages.len(), 5, "{:?}", messages);
        assert!(messages[0].starts_with("malformed manifest"));
        assert!(messages[1].contains("without an id"));
        assert!(messages[2].contains("missing 'numerator'"));
        assert!(messages[3].contains("Unknown capability"));
        assert!(messages[4].contains("cannot read analyzer directory"));
    }

    #[test]
    fn test_requirement_cycles_are_detected() {
        let fs = MockFs::with_files([(
            "/analyzers/cycle.toml",
            indoc! {r#"
                [[analyzer]]
                id = "a"
                requires = ["b"]
                numerator = "x"
                denominator = "y"

                [[analyzer]]
                id = "b"
                requires = ["a"]
                numerator = "x"
                denominator = "y"
            "#},
        )]);
        let mut registry = AnalyzerRegistry::with_builtins();
        registry.load_search_paths(&[PathBuf::from("/analyzers")], &fs);

        assert_eq!(
            registry.requirement_cycles(),
            vec![vec![AnalyzerId::new("a"), AnalyzerId::new("b")]]
        );
        assert!(AnalyzerRegistry::with_builtins().requirement_cycles().is_empty());
    }
}
