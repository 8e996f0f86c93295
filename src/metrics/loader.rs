//! Turns requested selectors into an ordered, deduplicated execution plan.

use super::{
    AnalyzerDescriptor, AnalyzerId, AnalyzerRegistry, ConstructionContext, MetricCache, Options,
    Selector, SharedAnalyzer,
};
use indexmap::{IndexMap, IndexSet};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("Invalid value '{value}' for option '{key}' of analyzer '{analyzer}': {reason}")]
    InvalidOption {
        analyzer: AnalyzerId,
        key: String,
        value: String,
        reason: String,
    },
    #[error("Analyzer '{analyzer}' needs a metric cache but none is configured")]
    MissingCache { analyzer: AnalyzerId },
    #[error("Failed to construct analyzer '{analyzer}': {message}")]
    Factory { analyzer: AnalyzerId, message: String },
}

/// What happens to aggregates whose dependency opted out of the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisabledPolicy {
    /// The aggregate runs without the disabled dependency.
    #[default]
    Detach,
    /// Every aggregate transitively requiring a disabled analyzer is dropped.
    Cascade,
}

/// Identity to single shared instance, scoped to one scheduling run.
///
/// Passing the same cache to several `schedule` calls keeps instances (and
/// their step placement) shared between them.
#[derive(Default)]
pub struct InstanceCache {
    instances: IndexMap<AnalyzerId, SharedAnalyzer>,
    placement: HashMap<AnalyzerId, usize>,
    edges: HashMap<AnalyzerId, Vec<AnalyzerId>>,
    wired: HashSet<AnalyzerId>,
}

impl InstanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &AnalyzerId) -> Option<&SharedAnalyzer> {
        self.instances.get(id)
    }

    pub fn contains(&self, id: &AnalyzerId) -> bool {
        self.instances.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// Analyzers that may run together once every earlier step has finished.
pub struct Step {
    pub index: usize,
    pub analyzers: IndexMap<AnalyzerId, SharedAnalyzer>,
}

impl Step {
    pub fn ids(&self) -> impl Iterator<Item = &AnalyzerId> {
        self.analyzers.keys()
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }
}

/// Non-empty steps in ascending index order.
#[derive(Default)]
pub struct ExecutionPlan {
    steps: Vec<Step>,
    dependencies: IndexMap<AnalyzerId, Vec<AnalyzerId>>,
}

impl ExecutionPlan {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.iter().map(Step::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every scheduled instance, step by step.
    pub fn analyzers(&self) -> impl Iterator<Item = (&AnalyzerId, &SharedAnalyzer)> {
        self.steps.iter().flat_map(|step| step.analyzers.iter())
    }

    pub fn step_of(&self, id: &AnalyzerId) -> Option<usize> {
        self.steps
            .iter()
            .find(|step| step.analyzers.contains_key(id))
            .map(|step| step.index)
    }

    /// Dependencies wired into `id`, disabled ones excluded.
    pub fn dependencies(&self, id: &AnalyzerId) -> &[AnalyzerId] {
        self.dependencies.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn ids_per_step(&self) -> Vec<Vec<AnalyzerId>> {
        self.steps
            .iter()
            .map(|step| step.ids().cloned().collect())
            .collect()
    }
}

#[derive(Default)]
struct Resolution {
    reached: IndexSet<AnalyzerId>,
    stack: Vec<AnalyzerId>,
}

pub struct AnalyzerLoader<'a> {
    registry: &'a AnalyzerRegistry,
    options: Options,
    cache: Option<Arc<dyn MetricCache>>,
    policy: DisabledPolicy,
}

impl<'a> AnalyzerLoader<'a> {
    pub fn new(registry: &'a AnalyzerRegistry) -> Self {
        Self {
            registry,
            options: Options::new(),
            cache: None,
            policy: DisabledPolicy::default(),
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn MetricCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_policy(mut self, policy: DisabledPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Resolves `selectors` (and transitively every aggregate's requirements)
    /// into a plan. A construction failure aborts scheduling.
    pub fn schedule(
        &self,
        selectors: &[Selector],
        instances: &mut InstanceCache,
    ) -> Result<ExecutionPlan, ConstructionError> {
        let mut resolution = Resolution::default();
        self.resolve(selectors, instances, &mut resolution)?;
        let reached = resolution.reached;

        let disabled = self.disabled(&reached, instances);
        self.wire(&reached, &disabled, instances);

        let order: HashMap<&AnalyzerId, usize> = self
            .registry
            .find_all()
            .enumerate()
            .map(|(i, d)| (&d.id, i))
            .collect();
        let mut members: Vec<&AnalyzerId> =
            reached.iter().filter(|id| !disabled.contains(*id)).collect();
        members.sort_by_key(|id| order.get(*id).copied().unwrap_or(usize::MAX));

        let mut by_index: BTreeMap<usize, IndexMap<AnalyzerId, SharedAnalyzer>> = BTreeMap::new();
        let mut dependencies = IndexMap::new();
        for id in members {
            let (Some(index), Some(instance)) = (instances.placement.get(id), instances.get(id))
            else {
                continue;
            };
            by_index
                .entry(*index)
                .or_default()
                .insert(id.clone(), instance.clone());
            if let Some(deps) = instances.edges.get(id) {
                let kept: Vec<_> = deps.iter().filter(|d| !disabled.contains(*d)).cloned().collect();
                dependencies.insert(id.clone(), kept);
            }
        }

        let steps: Vec<Step> = by_index
            .into_iter()
            .map(|(index, analyzers)| Step { index, analyzers })
            .collect();

        for step in &steps {
            tracing::debug!(
                step = step.index,
                analyzers = %step.ids().map(AnalyzerId::as_str).collect::<Vec<_>>().join(", "),
                "scheduled step"
            );
        }

        Ok(ExecutionPlan {
            steps,
            dependencies,
        })
    }

    fn resolve(
        &self,
        selectors: &[Selector],
        instances: &mut InstanceCache,
        resolution: &mut Resolution,
    ) -> Result<Vec<AnalyzerId>, ConstructionError> {
        let mut resolved = Vec::new();
        for descriptor in self.registry.find_all().filter(|d| d.matches(selectors)) {
            if resolution.stack.contains(&descriptor.id) {
                if resolution.stack.last() == Some(&descriptor.id) {
                    tracing::debug!(analyzer = %descriptor.id, "aggregate matches its own requirement, skipped");
                } else {
                    tracing::warn!(analyzer = %descriptor.id, "requirement cycle detected, skipping re-entrant dependency");
                }
                continue;
            }
            self.place(descriptor, instances, resolution)?;
            resolved.push(descriptor.id.clone());
        }
        Ok(resolved)
    }

    fn place(
        &self,
        descriptor: &AnalyzerDescriptor,
        instances: &mut InstanceCache,
        resolution: &mut Resolution,
    ) -> Result<(), ConstructionError> {
        let id = &descriptor.id;
        if instances.placement.contains_key(id) {
            reach(id, instances, &mut resolution.reached);
            return Ok(());
        }

        if !instances.contains(id) {
            let instance = self.instantiate(descriptor)?;
            instances.instances.insert(id.clone(), instance);
        }

        let index = if descriptor.is_aggregate() {
            resolution.stack.push(id.clone());
            let deps = self.resolve(&descriptor.requires, instances, resolution)?;
            resolution.stack.pop();

            if deps.is_empty() {
                tracing::debug!(analyzer = %id, "no requirement resolved, scheduling without dependencies");
            }
            let index = deps
                .iter()
                .filter_map(|dep| instances.placement.get(dep))
                .max()
                .map_or(1, |deepest| deepest + 1);
            instances.edges.insert(id.clone(), deps);
            index
        } else {
            0
        };

        tracing::debug!(analyzer = %id, step = index, "placed analyzer");
        instances.placement.insert(id.clone(), index);
        resolution.reached.insert(id.clone());
        Ok(())
    }

    fn instantiate(&self, descriptor: &AnalyzerDescriptor) -> Result<SharedAnalyzer, ConstructionError> {
        let context = ConstructionContext {
            id: &descriptor.id,
            options: descriptor.configurable.then_some(&self.options),
            cache: if descriptor.cache_aware {
                self.cache.clone()
            } else {
                None
            },
        };
        tracing::debug!(analyzer = %descriptor.id, "constructing analyzer");
        descriptor.create(context)
    }

    fn disabled(&self, reached: &IndexSet<AnalyzerId>, instances: &InstanceCache) -> HashSet<AnalyzerId> {
        let mut disabled: HashSet<AnalyzerId> = reached
            .iter()
            .filter(|id| instances.get(id).is_some_and(|a| !a.read().is_enabled()))
            .cloned()
            .collect();

        if self.policy == DisabledPolicy::Cascade {
            loop {
                let dropped: Vec<AnalyzerId> = reached
                    .iter()
                    .filter(|id| !disabled.contains(*id))
                    .filter(|id| {
                        instances
                            .edges
                            .get(*id)
                            .is_some_and(|deps| deps.iter().any(|d| disabled.contains(d)))
                    })
                    .cloned()
                    .collect();
                if dropped.is_empty() {
                    break;
                }
                disabled.extend(dropped);
            }
        }

        for id in &disabled {
            tracing::info!(analyzer = %id, "analyzer disabled for this run");
        }
        disabled
    }

    fn wire(&self, reached: &IndexSet<AnalyzerId>, disabled: &HashSet<AnalyzerId>, instances: &mut InstanceCache) {
        for id in reached {
            if disabled.contains(id) || instances.wired.contains(id) {
                continue;
            }
            let Some(deps) = instances.edges.get(id) else {
                continue;
            };
            if let Some(dependent) = instances.instances.get(id) {
                let mut dependent = dependent.write();
                for dep in deps.iter().filter(|d| !disabled.contains(*d)) {
                    if let Some(instance) = instances.instances.get(dep) {
                        dependent.add_dependency(instance.clone());
                    }
                }
            }
            instances.wired.insert(id.clone());
        }
    }
}

/// Marks `id` and everything it was resolved against as part of this plan.
fn reach(id: &AnalyzerId, instances: &InstanceCache, reached: &mut IndexSet<AnalyzerId>) {
    if !reached.insert(id.clone()) {
        return;
    }
    if let Some(deps) = instances.edges.get(id) {
        for dep in deps {
            reach(dep, instances, reached);
        }
    }
}
