//! End-to-end runs of the engine over small source trees.

use depmetric::config::Config;
use depmetric::events::{ObserverError, ProcessListener};
use depmetric::fs::default_fs;
use depmetric::metrics::{
    Analyzer, AnalyzerDescriptor, AnalyzerError, AnalyzerId, AnalyzerRegistry, Capability,
    CapabilitySet, Metrics, Selector, SharedAnalyzer, shared,
};
use depmetric::model::{CodeModel, NodeId, Visitor, walk_package, walk_type};
use depmetric::parser::SourceDiscovery;
use depmetric::report::{OutputTarget, Report, ReportError};
use depmetric::{ConfigurationError, Engine, EngineError, PipelineState};
use indoc::indoc;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn python_project() -> TempDir {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "pkg/a.py", "def f1():\n    pass\n");
    write(temp.path(), "pkg/b.py", "def f2():\n    return 2\n");
    write(
        temp.path(),
        "pkg/c.py",
        indoc! {"
            class C:
                def m1(self):
                    pass

                def m2(self):
                    # nothing yet
                    pass
        "},
    );
    temp
}

fn config(temp: &TempDir, reports: &[(&str, &str)]) -> Config {
    let mut config = Config::default();
    config.sources = vec![temp.path().to_path_buf()];
    for (id, target) in reports {
        config.reports.insert(id.to_string(), target.to_string());
    }
    config
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

/// Numbers every declaration in visit order, starting at 1.
struct VisitCounter {
    id: AnalyzerId,
    visits: Arc<AtomicUsize>,
    order: HashMap<NodeId, f64>,
}

struct Counting<'a> {
    visits: &'a AtomicUsize,
    order: &'a mut HashMap<NodeId, f64>,
}

impl Counting<'_> {
    fn count(&mut self, node: NodeId) {
        let ordinal = self.visits.fetch_add(1, Ordering::SeqCst) + 1;
        self.order.insert(node, ordinal as f64);
    }
}

impl Visitor for Counting<'_> {
    fn visit_package(&mut self, model: &CodeModel, package: NodeId) {
        self.count(package);
        walk_package(self, model, package);
    }

    fn visit_type(&mut self, model: &CodeModel, ty: NodeId) {
        self.count(ty);
        walk_type(self, model, ty);
    }

    fn visit_function(&mut self, _model: &CodeModel, function: NodeId) {
        self.count(function);
    }

    fn visit_method(&mut self, _model: &CodeModel, method: NodeId) {
        self.count(method);
    }
}

impl Analyzer for VisitCounter {
    fn id(&self) -> &AnalyzerId {
        &self.id
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::of(&[Capability::NodeAware])
    }

    fn analyze(&mut self, model: &CodeModel) -> Result<(), AnalyzerError> {
        model.walk(&mut Counting {
            visits: &self.visits,
            order: &mut self.order,
        });
        Ok(())
    }

    fn node_metrics(&self, node: NodeId) -> Metrics {
        let mut metrics = Metrics::new();
        if let Some(ordinal) = self.order.get(&node) {
            metrics.insert("visit".to_string(), *ordinal);
        }
        metrics
    }
}

fn with_visit_counter(mut registry: AnalyzerRegistry, visits: Arc<AtomicUsize>) -> AnalyzerRegistry {
    registry.register(AnalyzerDescriptor::new(
        "visit-counter",
        CapabilitySet::of(&[Capability::NodeAware]),
        move |ctx| {
            Ok(shared(VisitCounter {
                id: ctx.id.clone(),
                visits: visits.clone(),
                order: HashMap::new(),
            }))
        },
    ));
    registry
}

fn counting_registry(visits: Arc<AtomicUsize>) -> AnalyzerRegistry {
    with_visit_counter(AnalyzerRegistry::with_builtins(), visits)
}

type Rows = Arc<Mutex<Vec<(String, Vec<(AnalyzerId, Metrics)>)>>>;

/// Records every node identifier with the node metrics of each accepted
/// analyzer. Only asks for node-aware analyzers.
struct NodeRecorder {
    model: Option<Arc<CodeModel>>,
    analyzers: Vec<SharedAnalyzer>,
    rows: Rows,
}

struct Identifiers(Vec<NodeId>);

impl Visitor for Identifiers {
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

impl Report for NodeRecorder {
    fn name(&self) -> &str {
        "node-recorder"
    }

    fn accepted_capabilities(&self) -> Vec<Selector> {
        vec![Selector::Capability(Capability::NodeAware)]
    }

    fn set_code(&mut self, model: Arc<CodeModel>) {
        self.model = Some(model);
    }

    fn submit(&mut self, analyzer: &SharedAnalyzer) -> bool {
        if !self.accepts(&*analyzer.read()) {
            return false;
        }
        self.analyzers.push(analyzer.clone());
        true
    }

    fn set_output_target(&mut self, _target: OutputTarget) {}

    fn close(&mut self) -> Result<(), ReportError> {
        let Some(model) = &self.model else {
            return Ok(());
        };
        let mut nodes = Identifiers(Vec::new());
        model.walk(&mut nodes);
        let mut rows = self.rows.lock();
        for node in nodes.0 {
            let metrics = self
                .analyzers
                .iter()
                .map(|a| {
                    let a = a.read();
                    (a.id().clone(), a.node_metrics(node))
                })
                .collect();
            rows.push((model.node_identifier(node), metrics));
        }
        Ok(())
    }
}

#[test]
fn test_node_aware_request_reaches_every_declaration() {
    let temp = python_project();
    let visits = Arc::new(AtomicUsize::new(0));
    let rows: Rows = Arc::new(Mutex::new(Vec::new()));

    let mut engine = Engine::new(SourceDiscovery::new(vec![temp.path().to_path_buf()]))
        .with_registry(with_visit_counter(AnalyzerRegistry::new(), visits.clone()));
    engine.add_report(Box::new(NodeRecorder {
        model: None,
        analyzers: Vec::new(),
        rows: rows.clone(),
    }));

    let summary = engine.run().unwrap();

    assert_eq!(engine.state(), PipelineState::Done);
    assert_eq!(summary.files, 3);
    assert_eq!(summary.steps, vec![vec![AnalyzerId::new("visit-counter")]]);
    assert_eq!(visits.load(Ordering::SeqCst), 6);

    let rows = rows.lock();
    let ids: Vec<_> = rows.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["pkg#n", "C#c", "C::m1()#m", "C::m2()#m", "f1()#f", "f2()#f"]
    );
    for (ordinal, (id, metrics)) in rows.iter().enumerate() {
        assert_eq!(metrics.len(), 1, "{}", id);
        let (analyzer, values) = &metrics[0];
        assert_eq!(analyzer.as_str(), "visit-counter");
        assert_eq!(values.get("visit"), Some(&((ordinal + 1) as f64)), "{}", id);
    }
}

#[test]
fn test_summary_json_lists_every_node() {
    let temp = python_project();
    let out = temp.path().join("out/summary.json");
    let visits = Arc::new(AtomicUsize::new(0));

    let mut engine = Engine::from_config(
        &config(&temp, &[("summary-json", out.to_str().unwrap())]),
        default_fs(),
    )
    .unwrap()
    .with_registry(counting_registry(visits.clone()));
    engine.run().unwrap();

    let json = read_json(&out);
    let ids: Vec<_> = json["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|node| node["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        ids,
        vec!["pkg#n", "C#c", "C::m1()#m", "C::m2()#m", "f1()#f", "f2()#f"]
    );
    assert_eq!(json["nodes"][2]["metrics"]["visit-counter"]["visit"], 3.0);
    assert_eq!(json["nodes"][0]["metrics"]["node-count"]["noc"], 1.0);
    assert_eq!(
        json["analyzers"],
        serde_json::json!(["node-count", "node-loc", "visit-counter", "method-size"])
    );
    assert_eq!(json["project"]["node-count"]["nom"], 2.0);
}

#[test]
fn test_text_report_to_file() {
    let temp = python_project();
    let out = temp.path().join("summary.md");

    let mut engine = Engine::from_config(
        &config(&temp, &[("summary-text", out.to_str().unwrap())]),
        default_fs(),
    )
    .unwrap();
    engine.run().unwrap();

    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.starts_with("# Metrics Summary"));
    assert!(text.contains("## Package `pkg`"));
}

#[test]
fn test_configuration_errors_fail_the_run() {
    let temp = python_project();

    let mut engine = Engine::from_config(&config(&temp, &[]), default_fs()).unwrap();
    let err = engine.run().unwrap_err();
    assert!(matches!(err, EngineError::Configuration(ConfigurationError::NoReports)));
    assert_eq!(err.to_string(), "No output specified.");
    assert_eq!(engine.state(), PipelineState::Failed);
    assert_eq!(err.exit_code(), 2);

    let mut missing = config(&temp, &[("summary-json", "-")]);
    missing.sources = vec![PathBuf::from("/definitely/not/here")];
    let mut engine = Engine::from_config(&missing, default_fs()).unwrap();
    let err = engine.run().unwrap_err();
    assert!(matches!(err, EngineError::Configuration(ConfigurationError::NoSources)));
    assert_eq!(engine.state(), PipelineState::Failed);
}

struct FailingListener;

impl ProcessListener for FailingListener {
    fn name(&self) -> &str {
        "failing"
    }

    fn end_parse(&mut self, _files: usize) -> Result<(), ObserverError> {
        Err(ObserverError::new("failing", "disk full"))
    }
}

#[test]
fn test_failing_listener_aborts_before_analysis() {
    let temp = python_project();
    let out = temp.path().join("summary.json");
    let visits = Arc::new(AtomicUsize::new(0));

    let mut engine = Engine::from_config(
        &config(&temp, &[("summary-json", out.to_str().unwrap())]),
        default_fs(),
    )
    .unwrap()
    .with_registry(counting_registry(visits.clone()));
    engine.add_listener(Box::new(FailingListener));

    let err = engine.run().unwrap_err();
    assert_eq!(err.to_string(), "Listener 'failing' failed: disk full");
    assert_eq!(engine.state(), PipelineState::Failed);
    assert_eq!(visits.load(Ordering::SeqCst), 0);
    assert!(!out.exists());
}

#[test]
fn test_persisted_cache_is_reused() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "src/app.py", "def run():\n    pass\n");
    let out = temp.path().join("summary.json");
    let mut config = config(&temp, &[("summary-json", out.to_str().unwrap())]);
    config.sources = vec![temp.path().join("src")];
    config.cache_dir = Some(temp.path().join(".cache"));

    Engine::from_config(&config, default_fs()).unwrap().run().unwrap();
    assert_eq!(read_json(&out)["project"]["node-loc"]["loc"], 2.0);

    // Rewrite every cached line count; the next run must pick them up.
    let cache_file = temp.path().join(".cache/metrics-cache.json");
    let mut entries = read_json(&cache_file);
    for metrics in entries.as_object_mut().unwrap().values_mut() {
        if metrics.get("loc").is_some() {
            metrics["loc"] = serde_json::json!(40.0);
        }
    }
    std::fs::write(&cache_file, entries.to_string()).unwrap();

    Engine::from_config(&config, default_fs()).unwrap().run().unwrap();
    assert_eq!(read_json(&out)["project"]["node-loc"]["loc"], 40.0);
}

#[test]
fn test_disabled_dependency_still_runs_dependents() {
    let temp = python_project();
    let out = temp.path().join("summary.json");
    let mut config = config(&temp, &[("summary-json", out.to_str().unwrap())]);
    config.options.insert("disabled-analyzers", "node-count");

    let summary = Engine::from_config(&config, default_fs())
        .unwrap()
        .run()
        .unwrap();

    let steps: Vec<Vec<String>> = summary
        .steps
        .iter()
        .map(|step| step.iter().map(|id| id.to_string()).collect())
        .collect();
    assert_eq!(steps, vec![vec!["node-loc"], vec!["method-size"]]);
    assert!(read_json(&out)["project"].get("method-size").is_none());
}

#[test]
fn test_manifest_analyzers_join_the_run() {
    let temp = python_project();
    let out = temp.path().join("summary.json");
    write(
        temp.path(),
        "analyzers/density.toml",
        indoc! {r#"
            [[analyzer]]
            id = "comment-density"
            kind = "ratio"
            requires = ["node-loc"]
            numerator = "cloc"
            denominator = "loc"
        "#},
    );
    write(
        temp.path(),
        "analyzers/broken.toml",
        indoc! {r#"
            [[analyzer]]
            id = "no-requirements"
            kind = "ratio"
            requires = []
            numerator = "a"
            denominator = "b"
        "#},
    );
    let mut config = config(&temp, &[("summary-json", out.to_str().unwrap())]);
    config.analyzer_paths = vec![temp.path().join("analyzers")];

    let mut engine = Engine::from_config(&config, default_fs()).unwrap();
    assert_eq!(engine.registry().diagnostics().len(), 1);
    assert!(engine.registry().get(&AnalyzerId::new("comment-density")).is_some());

    let summary = engine.run().unwrap();
    assert!(summary.steps[1].contains(&AnalyzerId::new("comment-density")));
    let project = &read_json(&out)["project"]["comment-density"];
    assert!(project["cloc_per_loc"].as_f64().unwrap() > 0.0);
}

#[test]
fn test_overlapping_roots_parse_each_file_once() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "pkg/a.py", "class A:\n    pass\n");
    let out = temp.path().join("summary.json");
    let mut config = config(&temp, &[("summary-json", out.to_str().unwrap())]);
    config.sources = vec![temp.path().to_path_buf(), temp.path().join("pkg")];

    let summary = Engine::from_config(&config, default_fs())
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(summary.files, 1);
    assert_eq!(read_json(&out)["project"]["node-count"]["noc"], 1.0);
}

#[test]
fn test_persisted_cache_does_not_grow_across_edits() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("summary.json");
    let mut config = config(&temp, &[("summary-json", out.to_str().unwrap())]);
    config.sources = vec![temp.path().join("src")];
    config.cache_dir = Some(temp.path().join(".cache"));
    let cache_file = temp.path().join(".cache/metrics-cache.json");

    let mut sizes = Vec::new();
    for edit in 0..4 {
        write(
            temp.path(),
            "src/app.py",
            &format!("def run():\n    return {}\n", edit),
        );
        Engine::from_config(&config, default_fs()).unwrap().run().unwrap();
        sizes.push(read_json(&cache_file).as_object().unwrap().len());
    }

    assert_eq!(sizes, vec![2, 2, 2, 2]);
}
