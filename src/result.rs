//! Reporting the outcome of a property run
//!
//! Generated values never leave the engine: before a result is handed to a
//! reporter every counterexample is rendered to text with [`render`], so a
//! [`PropertyResult`] is plain data that can be serialized without knowing
//! anything about shapes.

use crate::generation::alphabet_of;
use crate::shape::{Alphabet, ShapeDescriptor, ShapeRegistry};
use crate::value::GeneratedValue;
use half::f16;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};

/// Outcome of one property run, in the form handed to reporters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyResult {
    pub passed: bool,

    /// Cases executed; the 1-based index of the failing case on failure
    pub cases_run: u32,

    /// Rendered first failing value
    pub counterexample: Option<String>,

    /// Rendered smallest failing value, when shrinking found one
    pub shrunk_counterexample: Option<String>,

    /// Failure reason, or the configuration/generation error that aborted the run
    pub error_message: Option<String>,

    /// Seed the run used; supply it again to reproduce the run
    pub seed: u64,

    /// Candidates evaluated while shrinking
    pub shrink_attempts: u32,

    /// Candidates accepted while shrinking
    pub shrink_steps: u32,
}

impl PropertyResult {
    pub fn failed(&self) -> bool {
        !self.passed
    }

    /// The counterexample most worth showing: the shrunk one if present
    pub fn best_counterexample(&self) -> Option<&str> {
        self.shrunk_counterexample
            .as_deref()
            .or(self.counterexample.as_deref())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for PropertyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed {
            return write!(f, "passed {} cases (seed {})", self.cases_run, self.seed);
        }
        write!(f, "failed after {} cases (seed {})", self.cases_run, self.seed)?;
        if let Some(original) = &self.counterexample {
            write!(f, "; counterexample: {}", original)?;
        }
        if let Some(shrunk) = &self.shrunk_counterexample {
            write!(f, "; shrunk to: {} in {} steps", shrunk, self.shrink_steps)?;
        }
        if let Some(message) = &self.error_message {
            write!(f, "; {}", message)?;
        }
        Ok(())
    }
}

/// Assembles a [`PropertyResult`], rendering values against their shape
pub struct ResultBuilder<'a> {
    shape: &'a ShapeDescriptor,
    registry: &'a ShapeRegistry,
    seed: u64,
    shrink_attempts: u32,
    shrink_steps: u32,
}

impl<'a> ResultBuilder<'a> {
    pub fn new(shape: &'a ShapeDescriptor, registry: &'a ShapeRegistry, seed: u64) -> Self {
        Self {
            shape,
            registry,
            seed,
            shrink_attempts: 0,
            shrink_steps: 0,
        }
    }

    pub fn shrink_stats(mut self, attempts: u32, steps: u32) -> Self {
        self.shrink_attempts = attempts;
        self.shrink_steps = steps;
        self
    }

    pub fn build(
        &self,
        passed: bool,
        cases_run: u32,
        original: Option<&GeneratedValue>,
        shrunk: Option<&GeneratedValue>,
        error: Option<String>,
    ) -> PropertyResult {
        PropertyResult {
            passed,
            cases_run,
            counterexample: original.map(|v| render(self.shape, v, self.registry)),
            shrunk_counterexample: shrunk.map(|v| render(self.shape, v, self.registry)),
            error_message: error,
            seed: self.seed,
            shrink_attempts: self.shrink_attempts,
            shrink_steps: self.shrink_steps,
        }
    }
}

/// Render a value as human-readable text.
///
/// Numbers and bools print as literals, text as a quoted string, binary
/// bytes as `b"..."`, sequences as `[a, b]`, records as `{name: v, ...}`,
/// optionals as `None`/`Some(v)` and enumerations by variant name.
pub fn render(shape: &ShapeDescriptor, value: &GeneratedValue, registry: &ShapeRegistry) -> String {
    let mut out = String::new();
    render_into(&mut out, shape, value, registry);
    out
}

fn render_into(
    out: &mut String,
    shape: &ShapeDescriptor,
    value: &GeneratedValue,
    registry: &ShapeRegistry,
) {
    // Writing to a String never fails
    let _ = match (shape, value) {
        (ShapeDescriptor::Named(name), _) => match registry.get(name) {
            Some(entry) => {
                render_into(out, &entry.shape, value, registry);
                Ok(())
            }
            None => write!(out, "{:?}", value),
        },
        (_, GeneratedValue::Int(v)) => write!(out, "{}", v),
        (ShapeDescriptor::Float { bit_width: 16 }, GeneratedValue::Float(v)) => {
            write!(out, "{}", f16::from_f64(*v))
        }
        (ShapeDescriptor::Float { bit_width: 32 }, GeneratedValue::Float(v)) => {
            write!(out, "{:?}", *v as f32)
        }
        (_, GeneratedValue::Float(v)) => write!(out, "{:?}", v),
        (_, GeneratedValue::Bool(v)) => write!(out, "{}", v),
        (_, GeneratedValue::Bytes(bytes)) => {
            let prefix = match alphabet_of(shape) {
                Some(Alphabet::Binary) => "b",
                _ => "",
            };
            out.push_str(prefix);
            out.push('"');
            for byte in bytes {
                out.extend(std::ascii::escape_default(*byte).map(char::from));
            }
            out.push('"');
            Ok(())
        }
        (ShapeDescriptor::Sequence { element, .. }, GeneratedValue::Sequence(items)) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_into(out, element, item, registry);
            }
            out.push(']');
            Ok(())
        }
        (ShapeDescriptor::Record { fields }, GeneratedValue::Record(items)) => {
            out.push('{');
            for (i, ((name, field), item)) in fields.iter().zip(items).enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(name);
                out.push_str(": ");
                render_into(out, field, item, registry);
            }
            out.push('}');
            Ok(())
        }
        (ShapeDescriptor::Optional { inner }, GeneratedValue::Optional(present)) => match present {
            Some(v) => {
                out.push_str("Some(");
                render_into(out, inner, v, registry);
                out.push(')');
                Ok(())
            }
            None => write!(out, "None"),
        },
        (ShapeDescriptor::Enumeration { variants }, GeneratedValue::Variant { index, payload }) => {
            match variants.get(*index as usize) {
                Some(variant) => {
                    out.push_str(&variant.name);
                    if let (Some(payload_shape), Some(p)) = (&variant.payload, payload) {
                        out.push('(');
                        render_into(out, payload_shape, p, registry);
                        out.push(')');
                    }
                    Ok(())
                }
                None => write!(out, "{:?}", value),
            }
        }
        _ => write!(out, "{:?}", value),
    };
}
