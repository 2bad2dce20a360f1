//! # Conjecture Shapes
//!
//! The generation and shrinking core of a property-based testing engine.
//!
//! A property is run against values drawn from a [`ShapeDescriptor`], a
//! structural description of some type: integers, floats, bools, byte strings,
//! sequences, records, optionals, enumerations and named (possibly recursive)
//! shapes held in a [`ShapeRegistry`]. All randomness comes from one seeded
//! [`RngSource`], so a run is fully reproducible from its seed. When a value
//! makes the property fail, the [`Shrinker`] greedily searches for a smaller
//! value that still fails, and the outcome is reported as a [`PropertyResult`].
//!
//! Every heap allocation a generated value makes is charged to an
//! [`Allocator`] and released again by [`dispose`], which lets a run enforce
//! a memory budget through [`BudgetAllocator`].
//!
//! ```
//! use conjecture_shapes::{run_property, GeneratedValue, PropertyConfig, ShapeDescriptor};
//!
//! let config = PropertyConfig::default().with_seed(42).with_max_size(50);
//! let result = run_property(config, &ShapeDescriptor::unsigned(32), |v: &GeneratedValue| {
//!     v.as_int() == Some(0)
//! });
//! assert!(!result.passed);
//! assert_eq!(result.best_counterexample(), Some("1"));
//! ```

pub mod alloc;
pub mod config;
pub mod engine;
pub mod generation;
pub mod result;
pub mod rng;
pub mod shape;
pub mod shaped;
pub mod shrinking;
pub mod value;

// Re-export the types a property author touches
pub use alloc::{AllocError, Allocator, BudgetAllocator, SystemAllocator};
pub use config::{ConfigError, PropertyConfig};
pub use engine::{run_property, IntoVerdict, PropertyRunner, Verdict};
pub use generation::{dispose, generate, minimal_value, GenerationContext, GenerationError};
pub use result::{render, PropertyResult, ResultBuilder};
pub use rng::{seed_for_label, RngSource};
pub use shape::{Alphabet, RegisteredShape, ShapeDescriptor, ShapeRegistry, Variant};
pub use shaped::{run_typed, Shaped};
pub use shrinking::{shrink, shrink_moves, sort_key, ShrinkOutcome, ShrinkStatus, Shrinker};
pub use value::GeneratedValue;
