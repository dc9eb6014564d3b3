//! Steps, phases and generators.
//!
//! A generator is an ordered list of phases; a phase is an ordered list of
//! steps. A step describes its work as a [`WorkDescriptor`] and judges the
//! result once every item has resolved.

use async_trait::async_trait;
use chainload_types::{Deploy, ExecutionContext};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::{verification, OrchestrationContext, VerificationError, WorkItem};

/// How the items of a step resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// An item resolves when its deploy is reported finalized.
    OnFinalization,
    /// An item resolves when the worker reports it done.
    OnDispatch,
}

type ItemFactory = dyn Fn() -> Box<dyn Iterator<Item = WorkItem> + Send> + Send + Sync;

/// The work of one step: how many items, how they resolve, and a restartable
/// lazy sequence producing them.
#[derive(Clone)]
pub struct WorkDescriptor {
    pub cardinality: usize,
    pub completion: Completion,
    factory: Arc<ItemFactory>,
}

impl fmt::Debug for WorkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkDescriptor")
            .field("cardinality", &self.cardinality)
            .field("completion", &self.completion)
            .finish_non_exhaustive()
    }
}

impl WorkDescriptor {
    pub fn new<F, I>(completion: Completion, cardinality: usize, factory: F) -> Self
    where
        F: Fn() -> I + Send + Sync + 'static,
        I: Iterator<Item = WorkItem> + Send + 'static,
    {
        Self {
            cardinality,
            completion,
            factory: Arc::new(move || Box::new(factory()) as Box<dyn Iterator<Item = WorkItem> + Send>),
        }
    }

    /// A step with nothing to do.
    pub fn empty(completion: Completion) -> Self {
        Self::new(completion, 0, std::iter::empty::<WorkItem>)
    }

    /// A fresh pass over the items.
    pub fn items(&self) -> Box<dyn Iterator<Item = WorkItem> + Send> {
        (self.factory)()
    }

    pub fn is_vacuous(&self) -> bool {
        self.cardinality == 0
    }
}

/// One step of a phase.
#[async_trait]
pub trait Step: Send + Sync {
    /// Action part of the step label, e.g. `fund-users`.
    fn action(&self) -> &str;

    /// Describe the work for this pass.
    fn execute(&self, ctx: &ExecutionContext) -> WorkDescriptor;

    /// Check one finalized deploy of this step.
    fn verify_deploy(
        &self,
        _ctx: &ExecutionContext,
        context: &OrchestrationContext,
        deploy: &Deploy,
    ) -> Result<(), VerificationError> {
        verification::verify_deploy(deploy, context.config.enforce_finalization_tolerance)
    }

    /// Check the aggregate effect once every item resolved.
    async fn verify(
        &self,
        _ctx: &ExecutionContext,
        _context: &OrchestrationContext,
        _label: &str,
    ) -> Result<(), VerificationError> {
        Ok(())
    }
}

/// An ordered group of steps.
#[derive(Clone)]
pub struct Phase {
    pub name: String,
    pub steps: Vec<Arc<dyn Step>>,
}

impl fmt::Debug for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Phase")
            .field("name", &self.name)
            .field(
                "steps",
                &self.steps.iter().map(|s| s.action().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Phase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Full label of one of this phase's steps.
    pub fn step_label(&self, step: &dyn Step) -> String {
        format!("{}.{}", self.name, step.action())
    }
}

/// A workload generator: a run type and its phases.
#[derive(Debug, Clone)]
pub struct Generator {
    pub run_type: String,
    pub description: String,
    pub phases: Vec<Phase>,
}

impl Generator {
    pub fn new(run_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            run_type: run_type.into(),
            description: description.into(),
            phases: Vec::new(),
        }
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phases.push(phase);
        self
    }

    /// Step at a cursor position, with its label.
    pub fn step_at(&self, phase: usize, step: usize) -> Option<(String, Arc<dyn Step>)> {
        let p = self.phases.get(phase)?;
        let s = p.steps.get(step)?;
        Some((p.step_label(s.as_ref()), Arc::clone(s)))
    }

    /// Cursor following `(phase, step)`, or `None` after the last step.
    pub fn next_cursor(&self, phase: usize, step: usize) -> Option<(usize, usize)> {
        let p = self.phases.get(phase)?;
        if step + 1 < p.steps.len() {
            return Some((phase, step + 1));
        }
        (phase + 1..self.phases.len())
            .find(|i| !self.phases[*i].steps.is_empty())
            .map(|i| (i, 0))
    }

    /// First step cursor, skipping empty phases.
    pub fn first_cursor(&self) -> Option<(usize, usize)> {
        (0..self.phases.len())
            .find(|i| !self.phases[*i].steps.is_empty())
            .map(|i| (i, 0))
    }

    /// Labels of every step, in execution order.
    pub fn step_labels(&self) -> Vec<String> {
        self.phases
            .iter()
            .flat_map(|p| p.steps.iter().map(move |s| p.step_label(s.as_ref())))
            .collect()
    }
}

/// Generators by run type.
#[derive(Debug, Clone, Default)]
pub struct GeneratorRegistry {
    generators: BTreeMap<String, Arc<Generator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, generator: Generator) {
        self.generators
            .insert(generator.run_type.clone(), Arc::new(generator));
    }

    pub fn with(mut self, generator: Generator) -> Self {
        self.register(generator);
        self
    }

    pub fn get(&self, run_type: &str) -> Option<Arc<Generator>> {
        self.generators.get(run_type).cloned()
    }

    pub fn run_types(&self) -> impl Iterator<Item = &str> {
        self.generators.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(&'static str);

    #[async_trait]
    impl Step for Noop {
        fn action(&self) -> &str {
            self.0
        }

        fn execute(&self, _ctx: &ExecutionContext) -> WorkDescriptor {
            WorkDescriptor::empty(Completion::OnDispatch)
        }
    }

    fn generator() -> Generator {
        Generator::new("WG-T", "test")
            .with_phase(Phase::new("phase-01").with_step(Noop("a")).with_step(Noop("b")))
            .with_phase(Phase::new("phase-02"))
            .with_phase(Phase::new("phase-03").with_step(Noop("c")))
    }

    #[test]
    fn test_cursor_walks_steps_in_order() {
        let g = generator();
        let mut labels = Vec::new();
        let mut cursor = g.first_cursor();
        while let Some((p, s)) = cursor {
            labels.push(g.step_at(p, s).unwrap().0);
            cursor = g.next_cursor(p, s);
        }
        assert_eq!(labels, vec!["phase-01.a", "phase-01.b", "phase-03.c"]);
        assert_eq!(labels, g.step_labels());
    }

    #[test]
    fn test_descriptor_is_restartable() {
        let d = WorkDescriptor::new(Completion::OnDispatch, 3, || {
            (1..=3).map(|index| WorkItem::CreateAccount {
                index,
                account_type: chainload_types::AccountType::User,
            })
        });
        assert_eq!(d.items().count(), 3);
        assert_eq!(d.items().count(), 3);
        assert!(!d.is_vacuous());
        assert!(WorkDescriptor::empty(Completion::OnFinalization).is_vacuous());
    }

    #[test]
    fn test_registry_lookup() {
        let registry = GeneratorRegistry::new().with(generator());
        assert!(registry.get("WG-T").is_some());
        assert!(registry.get("WG-X").is_none());
        assert_eq!(registry.run_types().collect::<Vec<_>>(), vec!["WG-T"]);
    }
}
