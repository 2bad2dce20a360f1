//! PropertyRunner - the property test loop
//!
//! This module drives one property run: it resolves the seed, validates the
//! shape, generates up to `num_tests` values, runs the property against each
//! one and stops at the first failure. A failing value is kept alive and, when
//! shrinking is enabled, handed to the [`Shrinker`] before the outcome is
//! rendered into a [`PropertyResult`].
//!
//! The loop is strictly sequential. Every value that passes is disposed before
//! the next one is generated, so at most one generated value (plus one shrink
//! candidate) is alive at a time.

use crate::alloc::{Allocator, SystemAllocator};
use crate::config::PropertyConfig;
use crate::generation::{dispose, generate, GenerationContext, GenerationError};
use crate::result::{PropertyResult, ResultBuilder};
use crate::rng::{seed_for_label, seed_from_clock, RngSource};
use crate::shape::{ShapeDescriptor, ShapeRegistry};
use crate::shrinking::Shrinker;
use crate::value::GeneratedValue;
use log::{debug, info, warn};
use std::any::Any;
use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Outcome of running the property once
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    /// The property failed, with a reason
    Fail(String),
}

impl Verdict {
    pub fn is_fail(&self) -> bool {
        matches!(self, Verdict::Fail(_))
    }
}

/// Return types a property function may use
pub trait IntoVerdict {
    fn into_verdict(self) -> Verdict;
}

impl IntoVerdict for Verdict {
    fn into_verdict(self) -> Verdict {
        self
    }
}

impl IntoVerdict for bool {
    fn into_verdict(self) -> Verdict {
        if self {
            Verdict::Pass
        } else {
            Verdict::Fail("property returned false".to_string())
        }
    }
}

impl IntoVerdict for () {
    fn into_verdict(self) -> Verdict {
        Verdict::Pass
    }
}

impl<E: Display> IntoVerdict for Result<(), E> {
    fn into_verdict(self) -> Verdict {
        match self {
            Ok(()) => Verdict::Pass,
            Err(err) => Verdict::Fail(err.to_string()),
        }
    }
}

/// Run the property once, turning a panic into a failure
fn check<F, R>(property: &mut F, value: &GeneratedValue) -> Verdict
where
    F: FnMut(&GeneratedValue) -> R,
    R: IntoVerdict,
{
    match catch_unwind(AssertUnwindSafe(|| property(value).into_verdict())) {
        Ok(verdict) => verdict,
        Err(payload) => Verdict::Fail(format!("property panicked: {}", panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// The first failing case found by the generation loop
struct Failure {
    /// 1-based index of the failing case
    case: u32,
    value: GeneratedValue,
    reason: String,
}

/// Runs one property against generated values of one shape
#[derive(Debug, Clone)]
pub struct PropertyRunner {
    pub config: PropertyConfig,
    registry: ShapeRegistry,
    label: Option<String>,
}

impl PropertyRunner {
    pub fn new(config: PropertyConfig) -> Self {
        Self {
            config,
            registry: ShapeRegistry::new(),
            label: None,
        }
    }

    /// Use `registry` to resolve named shapes
    pub fn with_registry(mut self, registry: ShapeRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Name of the property, used to derive the seed when derandomizing
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn registry(&self) -> &ShapeRegistry {
        &self.registry
    }

    /// The seed a run will use: explicit, derived from the label, or from the clock
    pub fn resolve_seed(&self) -> u64 {
        match (self.config.seed, self.config.derandomize, &self.label) {
            (Some(seed), _, _) => seed,
            (None, true, Some(label)) => seed_for_label(label),
            _ => seed_from_clock(),
        }
    }

    /// Run the property with an unlimited allocator
    pub fn run<F, R>(&self, shape: &ShapeDescriptor, property: F) -> PropertyResult
    where
        F: FnMut(&GeneratedValue) -> R,
        R: IntoVerdict,
    {
        let mut allocator = SystemAllocator::new();
        self.run_with_allocator(shape, &mut allocator, property)
    }

    /// Run the property, charging every generated value to `allocator`
    pub fn run_with_allocator<F, R>(
        &self,
        shape: &ShapeDescriptor,
        allocator: &mut dyn Allocator,
        mut property: F,
    ) -> PropertyResult
    where
        F: FnMut(&GeneratedValue) -> R,
        R: IntoVerdict,
    {
        let seed = self.resolve_seed();
        let builder = ResultBuilder::new(shape, &self.registry, seed);
        info!(
            "RUNNER: starting {} run with seed {} and config {:?}",
            shape.kind(),
            seed,
            self.config
        );

        if let Err(err) = self.config.validate() {
            warn!("RUNNER: invalid configuration: {}", err);
            return builder.build(false, 0, None, None, Some(format!("invalid configuration: {}", err)));
        }
        if let Err(err) = self.registry.validate(shape) {
            warn!("RUNNER: {}", err);
            return builder.build(false, 0, None, None, Some(err.to_string()));
        }

        let failure = match self.generation_phase(shape, seed, allocator, &mut property) {
            Ok(None) => {
                info!("RUNNER: all {} cases passed", self.config.num_tests);
                return builder.build(true, self.config.num_tests, None, None, None);
            }
            Ok(Some(failure)) => failure,
            Err((cases_run, err)) => {
                warn!("RUNNER: aborting after {} cases: {}", cases_run, err);
                return builder.build(false, cases_run, None, None, Some(err.to_string()));
            }
        };

        info!(
            "RUNNER: case {} failed: {}",
            failure.case, failure.reason
        );

        let (shrunk, attempts, steps) = if self.config.shrink_enabled {
            let outcome = Shrinker::new(
                shape,
                &self.registry,
                &mut *allocator,
                self.config.max_shrink_attempts,
            )
            .shrink(&failure.value, |candidate| check(&mut property, candidate).is_fail());
            (outcome.shrunk, outcome.attempts, outcome.steps)
        } else {
            (None, 0, 0)
        };

        let result = builder.shrink_stats(attempts, steps).build(
            false,
            failure.case,
            Some(&failure.value),
            shrunk.as_ref(),
            Some(failure.reason),
        );

        // The retained counterexamples are only released once rendered
        if let Some(shrunk) = shrunk {
            dispose(shape, shrunk, &mut *allocator);
        }
        dispose(shape, failure.value, &mut *allocator);

        info!("RUNNER: {}", result);
        result
    }

    /// Generate and check cases until one fails or `num_tests` pass.
    ///
    /// Errors carry the number of cases completed before generation failed.
    fn generation_phase<F, R>(
        &self,
        shape: &ShapeDescriptor,
        seed: u64,
        allocator: &mut dyn Allocator,
        property: &mut F,
    ) -> Result<Option<Failure>, (u32, GenerationError)>
    where
        F: FnMut(&GeneratedValue) -> R,
        R: IntoVerdict,
    {
        let mut ctx = GenerationContext::new(
            RngSource::new(seed),
            self.config.max_size,
            allocator,
            &self.registry,
        );

        for case in 0..self.config.num_tests {
            let value = generate(shape, &mut ctx).map_err(|err| (case, err))?;
            match check(property, &value) {
                Verdict::Pass => {
                    debug!("RUNNER: case {} passed", case + 1);
                    dispose(shape, value, ctx.allocator());
                }
                Verdict::Fail(reason) => {
                    return Ok(Some(Failure {
                        case: case + 1,
                        value,
                        reason,
                    }));
                }
            }
        }
        Ok(None)
    }
}

/// Run `property` against up to `config.num_tests` generated values of `shape`.
///
/// This is the single synchronous entry point; it never panics on property
/// failures or generation errors, reporting both through the returned result.
pub fn run_property<F, R>(config: PropertyConfig, shape: &ShapeDescriptor, property: F) -> PropertyResult
where
    F: FnMut(&GeneratedValue) -> R,
    R: IntoVerdict,
{
    PropertyRunner::new(config).run(shape, property)
}
