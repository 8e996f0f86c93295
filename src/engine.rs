//! Pipeline driver: parse, schedule, analyze, log.

use crate::config::Config;
use crate::error::{ConfigurationError, EngineError};
use crate::events::{EventBus, ProcessListener};
use crate::fs::FileSystem;
use crate::metrics::{
    AnalyzerError, AnalyzerId, AnalyzerLoader, AnalyzerRegistry, DisabledPolicy, ExecutionPlan,
    FileCache, InstanceCache, MemoryCache, MetricCache, Options, Selector, SharedAnalyzer, Step,
};
use crate::model::{CodeModel, PackageFilter};
use crate::parser::{ParserRegistry, SourceDiscovery};
use crate::report::{Report, ReportFactory};
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Configured,
    Parsing,
    Scheduled,
    Analyzing,
    Logging,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Configured => "configured",
            PipelineState::Parsing => "parsing",
            PipelineState::Scheduled => "scheduled",
            PipelineState::Analyzing => "analyzing",
            PipelineState::Logging => "logging",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub files: usize,
    /// Executed analyzer ids, step by step.
    pub steps: Vec<Vec<AnalyzerId>>,
    pub reports: Vec<String>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn analyzers(&self) -> usize {
        self.steps.iter().map(Vec::len).sum()
    }
}

pub struct Engine {
    state: PipelineState,
    discovery: SourceDiscovery,
    parsers: ParserRegistry,
    registry: AnalyzerRegistry,
    options: Options,
    policy: DisabledPolicy,
    parallel: bool,
    filter: PackageFilter,
    cache: Arc<dyn MetricCache>,
    reports: Vec<Box<dyn Report>>,
    events: EventBus,
    model: Option<Arc<CodeModel>>,
}

impl Engine {
    pub fn new(discovery: SourceDiscovery) -> Self {
        Self {
            state: PipelineState::Configured,
            discovery,
            parsers: ParserRegistry::new(),
            registry: AnalyzerRegistry::with_builtins(),
            options: Options::new(),
            policy: DisabledPolicy::default(),
            parallel: false,
            filter: PackageFilter::default(),
            cache: Arc::new(MemoryCache::new()),
            reports: Vec::new(),
            events: EventBus::new(),
            model: None,
        }
    }

    /// Builds an engine with the registry, cache and reports a
    /// configuration describes.
    pub fn from_config(config: &Config, fs: Arc<dyn FileSystem>) -> Result<Self, EngineError> {
        let discovery = SourceDiscovery::new(config.sources.clone())
            .with_extensions(config.extensions.clone())
            .with_excluded_dirs(config.exclude_dirs.clone());

        let mut registry = AnalyzerRegistry::with_builtins();
        registry.load_search_paths(&config.analyzer_paths, fs.as_ref());

        let cache: Arc<dyn MetricCache> = match &config.cache_dir {
            Some(dir) => Arc::new(FileCache::open(dir, fs.clone())?),
            None => Arc::new(MemoryCache::new()),
        };

        let factory = ReportFactory::new(fs);
        let mut engine = Self::new(discovery)
            .with_registry(registry)
            .with_options(config.options.clone())
            .with_policy(if config.cascade_disabled {
                DisabledPolicy::Cascade
            } else {
                DisabledPolicy::Detach
            })
            .parallel(config.parallel)
            .with_package_filter(PackageFilter::new(config.exclude_packages.iter().cloned()))
            .with_cache(cache);

        for (id, target) in &config.reports {
            let mut report = factory.create(id)?;
            report.set_output_target(target.parse().unwrap_or_else(|never| match never {}));
            engine.add_report(report);
        }
        Ok(engine)
    }

    pub fn with_registry(mut self, registry: AnalyzerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_policy(mut self, policy: DisabledPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_package_filter(mut self, filter: PackageFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn MetricCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn add_report(&mut self, report: Box<dyn Report>) {
        self.reports.push(report);
    }

    pub fn add_listener(&mut self, listener: Box<dyn ProcessListener>) {
        self.events.register(listener);
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn registry(&self) -> &AnalyzerRegistry {
        &self.registry
    }

    /// The model built by the last run, once parsing has finished.
    pub fn model(&self) -> Option<&Arc<CodeModel>> {
        self.model.as_ref()
    }

    /// Runs every phase. Any failure leaves the engine in `Failed` and skips
    /// the remaining phases.
    pub fn run(&mut self) -> Result<RunSummary, EngineError> {
        let started = Instant::now();
        match self.execute(started) {
            Ok(summary) => {
                self.state = PipelineState::Done;
                tracing::info!(
                    files = summary.files,
                    analyzers = summary.analyzers(),
                    elapsed_ms = summary.elapsed.as_millis() as u64,
                    "run finished"
                );
                Ok(summary)
            }
            Err(e) => {
                tracing::debug!(state = %self.state, "run failed: {}", e);
                self.state = PipelineState::Failed;
                Err(e)
            }
        }
    }

    fn execute(&mut self, started: Instant) -> Result<RunSummary, EngineError> {
        self.validate()?;

        let model = self.parse()?;
        let files = model.files().count();
        let model = Arc::new(model);
        self.model = Some(model.clone());

        let plan = self.schedule()?;
        self.analyze(&plan, &model)?;
        let reports = self.log(&plan, &model)?;

        Ok(RunSummary {
            files,
            steps: plan.ids_per_step(),
            reports,
            elapsed: started.elapsed(),
        })
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.discovery.has_reachable_root() {
            return Err(ConfigurationError::NoSources);
        }
        if self.reports.is_empty() {
            return Err(ConfigurationError::NoReports);
        }
        Ok(())
    }

    fn parse(&mut self) -> Result<CodeModel, EngineError> {
        self.state = PipelineState::Parsing;
        tracing::info!("parsing sources");
        self.events.start_parse()?;

        let units: Vec<_> = self
            .discovery
            .discover()
            .into_iter()
            .filter(|unit| {
                let supported = self.parsers.find_parser(&unit.path).is_some();
                if !supported {
                    tracing::warn!(path = %unit.path.display(), "no parser for file, skipping");
                }
                supported
            })
            .collect();

        let mut model = CodeModel::new();
        for unit in &units {
            self.events.start_file(&unit.path)?;
            self.parsers.parse_unit(unit, &mut model)?;
            self.events.end_file(&unit.path)?;
        }
        model.set_filter(self.filter.clone());

        self.events.end_parse(units.len())?;
        Ok(model)
    }

    fn requested_selectors(&self) -> Vec<Selector> {
        let mut selectors: Vec<Selector> = Vec::new();
        for report in &self.reports {
            for selector in report.accepted_capabilities() {
                if !selectors.contains(&selector) {
                    selectors.push(selector);
                }
            }
        }
        selectors
    }

    fn schedule(&mut self) -> Result<ExecutionPlan, EngineError> {
        let diagnostics = self.registry.diagnostics().len();
        if diagnostics > 0 {
            tracing::warn!(diagnostics, "analyzer registry reported problems");
        }
        for cycle in self.registry.requirement_cycles() {
            let ids: Vec<_> = cycle.iter().map(AnalyzerId::as_str).collect();
            tracing::warn!(analyzers = %ids.join(", "), "analyzers require each other");
        }

        let selectors = self.requested_selectors();
        let loader = AnalyzerLoader::new(&self.registry)
            .with_options(self.options.clone())
            .with_cache(self.cache.clone())
            .with_policy(self.policy);
        let plan = loader.schedule(&selectors, &mut InstanceCache::new())?;

        self.state = PipelineState::Scheduled;
        tracing::info!(
            analyzers = plan.len(),
            steps = plan.steps().len(),
            "execution plan ready"
        );
        Ok(plan)
    }

    fn analyze(&mut self, plan: &ExecutionPlan, model: &CodeModel) -> Result<(), EngineError> {
        self.state = PipelineState::Analyzing;
        self.events.start_analyze(plan)?;

        for step in plan.steps() {
            if self.parallel && step.len() > 1 {
                self.run_parallel(step, model)?;
            } else {
                for (id, analyzer) in &step.analyzers {
                    self.events.start_analyzer(id)?;
                    analyzer.write().analyze(model)?;
                    self.events.end_analyzer(id)?;
                }
            }
        }

        self.events.end_analyze()?;
        Ok(())
    }

    fn run_parallel(&mut self, step: &Step, model: &CodeModel) -> Result<(), EngineError> {
        for id in step.ids() {
            self.events.start_analyzer(id)?;
        }

        let members: Vec<&SharedAnalyzer> = step.analyzers.values().collect();
        let results: Vec<Result<(), AnalyzerError>> = members
            .par_iter()
            .map(|analyzer| analyzer.write().analyze(model))
            .collect();
        results.into_iter().collect::<Result<Vec<_>, _>>()?;

        for id in step.ids() {
            self.events.end_analyzer(id)?;
        }
        Ok(())
    }

    fn log(&mut self, plan: &ExecutionPlan, model: &Arc<CodeModel>) -> Result<Vec<String>, EngineError> {
        self.state = PipelineState::Logging;
        self.events.start_log()?;

        let mut closed = Vec::new();
        for report in &mut self.reports {
            report.set_code(model.clone());
            let accepted = plan
                .analyzers()
                .filter(|(_, analyzer)| report.submit(analyzer))
                .count();
            tracing::debug!(report = report.name(), accepted, "closing report");
            report.close()?;
            closed.push(report.name().to_string());
        }

        self.cache.flush()?;
        self.events.end_log()?;
        Ok(closed)
    }
}
