//! Step registration coordinator.
//!
//! Turns a set of [`PipelineModifications`] into one deterministic ordered
//! step list:
//!
//! 1. Enabled additions are registered; duplicate ids are rejected.
//! 2. Replacements swap the factory (and optionally the description) of an
//!    added step, leaving its id and ordering relations in place.
//! 3. Removals drop steps; unknown ids are ignored.
//! 4. `before`/`after` relations are resolved into a total order. Among steps
//!    that are free to run, the one registered first runs first.

use crate::behavior::BehaviorInstance;
use crate::error::ConfigurationError;
use crate::registration::{
    BehaviorFactory, PipelineModifications, RegisterStep, RemoveStep, ReplaceStep, StepReference,
};
use indexmap::IndexMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use tessera_core::{BuildError, ObjectBuilder, ReadOnlySettings};
use tessera_telemetry::logging::fields;
use tracing::field;

/// A resolved step, ready to be built.
#[derive(Clone)]
pub struct OrderedStep {
    id: String,
    description: String,
    factory: BehaviorFactory,
}

impl OrderedStep {
    /// Returns the step id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Builds the step's behavior.
    ///
    /// # Errors
    ///
    /// Returns the builder's error unchanged.
    pub fn build(&self, builder: &dyn ObjectBuilder) -> Result<BehaviorInstance, BuildError> {
        (self.factory)(builder)
    }
}

impl fmt::Debug for OrderedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedStep")
            .field("id", &self.id)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Collects modifications for one pipeline and resolves their order.
///
/// # Example
///
/// ```
/// use tessera_core::{RootContext, SettingsHolder};
/// use tessera_pipeline::{FnBehavior, RegisterStep, StepCoordinator};
///
/// let noop = || FnBehavior::new(|_: &mut RootContext| Ok(()));
/// let settings = SettingsHolder::new();
///
/// let mut coordinator = StepCoordinator::new(&settings);
/// coordinator.register(RegisterStep::with_behavior("b", "b", noop()).insert_after("a"))?;
/// coordinator.register(RegisterStep::with_behavior("a", "a", noop()))?;
///
/// let ids: Vec<_> = coordinator
///     .build_order()?
///     .iter()
///     .map(|step| step.id().to_string())
///     .collect();
/// assert_eq!(ids, ["a", "b"]);
/// # Ok::<(), tessera_pipeline::ConfigurationError>(())
/// ```
pub struct StepCoordinator<'s> {
    settings: &'s dyn ReadOnlySettings,
    additions: IndexMap<String, RegisterStep>,
    replacements: IndexMap<String, ReplaceStep>,
    removals: Vec<RemoveStep>,
}

impl<'s> StepCoordinator<'s> {
    /// Creates a coordinator evaluating enablement against `settings`.
    pub fn new(settings: &'s dyn ReadOnlySettings) -> Self {
        Self {
            settings,
            additions: IndexMap::new(),
            replacements: IndexMap::new(),
            removals: Vec::new(),
        }
    }

    /// Registers an addition if its enablement condition holds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateStep`] if an enabled step with
    /// the same id is already registered.
    pub fn register(&mut self, step: RegisterStep) -> Result<(), ConfigurationError> {
        if !step.is_enabled(self.settings) {
            tracing::debug!({ fields::STEP_ID } = step.id(), "Step disabled by settings, skipping");
            return Ok(());
        }
        if self.additions.contains_key(step.id()) {
            return Err(ConfigurationError::DuplicateStep {
                id: step.id().to_string(),
            });
        }
        self.additions.insert(step.id().to_string(), step);
        Ok(())
    }

    /// Records a replacement.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateReplacement`] if the id is
    /// already being replaced.
    pub fn replace(&mut self, step: ReplaceStep) -> Result<(), ConfigurationError> {
        if self.replacements.contains_key(step.id()) {
            return Err(ConfigurationError::DuplicateReplacement {
                id: step.id().to_string(),
            });
        }
        self.replacements.insert(step.id().to_string(), step);
        Ok(())
    }

    /// Records a removal.
    pub fn remove(&mut self, step: RemoveStep) {
        self.removals.push(step);
    }

    /// Records every modification in `modifications`.
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register) and [`replace`](Self::replace).
    pub fn apply(&mut self, modifications: &PipelineModifications) -> Result<(), ConfigurationError> {
        for step in modifications.additions() {
            self.register(step.clone())?;
        }
        for step in modifications.replacements() {
            self.replace(step.clone())?;
        }
        for step in modifications.removals() {
            self.remove(step.clone());
        }
        Ok(())
    }

    /// Resolves the final ordered step list.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnknownReplacementTarget`],
    /// [`ConfigurationError::UnknownStepReference`] or
    /// [`ConfigurationError::OrderingCycle`].
    pub fn build_order(self) -> Result<Vec<OrderedStep>, ConfigurationError> {
        let Self {
            additions,
            replacements,
            removals,
            ..
        } = self;

        let mut steps: IndexMap<String, Pending> = additions
            .into_iter()
            .map(|(id, step)| (id, Pending::from(step)))
            .collect();

        for (id, replacement) in replacements {
            let step = steps
                .get_mut(&id)
                .ok_or_else(|| ConfigurationError::UnknownReplacementTarget { id: id.clone() })?;
            step.factory = replacement.factory().clone();
            if let Some(description) = replacement.new_description() {
                step.description = description.to_string();
            }
            tracing::debug!({ fields::STEP_ID } = id.as_str(), "Replaced pipeline step");
        }

        for removal in removals {
            if steps.shift_remove(removal.id()).is_some() {
                tracing::debug!({ fields::STEP_ID } = removal.id(), "Removed pipeline step");
            } else {
                tracing::warn!(
                    { fields::STEP_ID } = removal.id(),
                    "Ignoring removal of unknown pipeline step"
                );
            }
        }

        let order = resolve_order(&steps)?;
        let ordered: Vec<OrderedStep> = order
            .into_iter()
            .filter_map(|index| steps.get_index(index))
            .map(|(id, step)| OrderedStep {
                id: id.clone(),
                description: step.description.clone(),
                factory: step.factory.clone(),
            })
            .collect();

        tracing::debug!(
            { fields::PIPELINE_STEP_COUNT } = ordered.len(),
            { fields::PIPELINE_STEPS } =
                field::debug(ordered.iter().map(OrderedStep::id).collect::<Vec<_>>()),
            "Resolved pipeline step order"
        );
        Ok(ordered)
    }
}

impl fmt::Debug for StepCoordinator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepCoordinator")
            .field("additions", &self.additions.keys().collect::<Vec<_>>())
            .field("replacements", &self.replacements.keys().collect::<Vec<_>>())
            .field("removals", &self.removals)
            .finish_non_exhaustive()
    }
}

struct Pending {
    description: String,
    factory: BehaviorFactory,
    before: Vec<StepReference>,
    after: Vec<StepReference>,
}

impl From<RegisterStep> for Pending {
    fn from(step: RegisterStep) -> Self {
        Self {
            description: step.description().to_string(),
            factory: step.factory().clone(),
            before: step.before().to_vec(),
            after: step.after().to_vec(),
        }
    }
}

/// Kahn's algorithm over the registration indices of `steps`.
fn resolve_order(steps: &IndexMap<String, Pending>) -> Result<Vec<usize>, ConfigurationError> {
    let count = steps.len();
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut in_degree = vec![0_usize; count];

    for (index, (id, step)) in steps.iter().enumerate() {
        let relations = step
            .before
            .iter()
            .map(|reference| ("before", reference))
            .chain(step.after.iter().map(|reference| ("after", reference)));

        for (relation, reference) in relations {
            let Some(other) = steps.get_index_of(reference.id()) else {
                if reference.is_required() {
                    return Err(ConfigurationError::UnknownStepReference {
                        step: id.clone(),
                        relation,
                        reference: reference.id().to_string(),
                    });
                }
                continue;
            };
            let (from, to) = if relation == "before" {
                (index, other)
            } else {
                (other, index)
            };
            successors[from].push(to);
            in_degree[to] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(index, _)| Reverse(index))
        .collect();
    let mut order = Vec::with_capacity(count);

    while let Some(Reverse(index)) = ready.pop() {
        order.push(index);
        for &next in &successors[index] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() < count {
        return Err(ConfigurationError::OrderingCycle {
            steps: cycle_members(steps, &successors, &in_degree),
        });
    }
    Ok(order)
}

/// Narrows the unordered remainder down to the steps that sit on a cycle by
/// repeatedly discarding steps with no remaining successor.
fn cycle_members(
    steps: &IndexMap<String, Pending>,
    successors: &[Vec<usize>],
    in_degree: &[usize],
) -> Vec<String> {
    let mut remaining: Vec<bool> = in_degree.iter().map(|degree| *degree > 0).collect();
    loop {
        let mut pruned = false;
        for index in 0..remaining.len() {
            if remaining[index] && !successors[index].iter().any(|&next| remaining[next]) {
                remaining[index] = false;
                pruned = true;
            }
        }
        if !pruned {
            break;
        }
    }
    remaining
        .iter()
        .enumerate()
        .filter(|(_, on_cycle)| **on_cycle)
        .filter_map(|(index, _)| steps.get_index(index).map(|(id, _)| id.clone()))
        .collect()
}
