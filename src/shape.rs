//! Shape descriptors and the registry of named shapes
//!
//! A [`ShapeDescriptor`] describes the structure of a value the engine can
//! generate, dispose and shrink. Shapes nest freely; recursion is only possible
//! through [`ShapeDescriptor::Named`] references into a [`ShapeRegistry`], and
//! every reference cycle must pass through an entry carrying a `max_depth`.

use crate::generation::{minimal_value, GenerationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default upper bound on sequence length when a shape sets none
pub const DEFAULT_SEQUENCE_CAP: u32 = 32;

/// Byte range drawn from when generating byte sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Alphabet {
    /// Printable ASCII, `0x20..=0x7E`
    Printable,
    /// Any byte value
    Binary,
}

impl Alphabet {
    /// Lowest byte of the alphabet, which is also its shrink target
    pub fn low(self) -> u8 {
        match self {
            Alphabet::Printable => 0x20,
            Alphabet::Binary => 0x00,
        }
    }

    /// Highest byte of the alphabet
    pub fn high(self) -> u8 {
        match self {
            Alphabet::Printable => 0x7E,
            Alphabet::Binary => 0xFF,
        }
    }
}

/// One alternative of an enumeration shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    pub payload: Option<ShapeDescriptor>,
}

impl Variant {
    /// Variant without payload
    pub fn unit(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: None,
        }
    }

    /// Variant carrying a payload of the given shape
    pub fn with_payload(name: impl Into<String>, payload: ShapeDescriptor) -> Self {
        Self {
            name: name.into(),
            payload: Some(payload),
        }
    }
}

/// Structural description of a value's type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShapeDescriptor {
    Integer {
        signed: bool,
        bit_width: u32,
    },
    Float {
        bit_width: u32,
    },
    Bool,
    /// Raw bytes or text
    ByteSequence {
        alphabet: Alphabet,
        allow_empty: bool,
        max_len: Option<u32>,
    },
    Sequence {
        element: Box<ShapeDescriptor>,
        min_len: u32,
        max_len: Option<u32>,
    },
    Record {
        fields: Vec<(String, ShapeDescriptor)>,
    },
    Optional {
        inner: Box<ShapeDescriptor>,
    },
    Enumeration {
        variants: Vec<Variant>,
    },
    /// Reference to a shape registered under this name
    Named(String),
}

impl ShapeDescriptor {
    pub fn signed(bit_width: u32) -> Self {
        ShapeDescriptor::Integer {
            signed: true,
            bit_width,
        }
    }

    pub fn unsigned(bit_width: u32) -> Self {
        ShapeDescriptor::Integer {
            signed: false,
            bit_width,
        }
    }

    pub fn float(bit_width: u32) -> Self {
        ShapeDescriptor::Float { bit_width }
    }

    /// Non-empty printable text
    pub fn text() -> Self {
        ShapeDescriptor::ByteSequence {
            alphabet: Alphabet::Printable,
            allow_empty: false,
            max_len: None,
        }
    }

    /// Non-empty bytes over the full byte range
    pub fn binary() -> Self {
        ShapeDescriptor::ByteSequence {
            alphabet: Alphabet::Binary,
            allow_empty: false,
            max_len: None,
        }
    }

    /// Sequence of at least one element, capped at [`DEFAULT_SEQUENCE_CAP`]
    pub fn sequence(element: ShapeDescriptor) -> Self {
        ShapeDescriptor::Sequence {
            element: Box::new(element),
            min_len: 1,
            max_len: None,
        }
    }

    pub fn record<N: Into<String>>(fields: Vec<(N, ShapeDescriptor)>) -> Self {
        ShapeDescriptor::Record {
            fields: fields
                .into_iter()
                .map(|(name, shape)| (name.into(), shape))
                .collect(),
        }
    }

    pub fn optional(inner: ShapeDescriptor) -> Self {
        ShapeDescriptor::Optional {
            inner: Box::new(inner),
        }
    }

    pub fn enumeration(variants: Vec<Variant>) -> Self {
        ShapeDescriptor::Enumeration { variants }
    }

    pub fn named(name: impl Into<String>) -> Self {
        ShapeDescriptor::Named(name.into())
    }

    /// Short human name of the shape kind, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            ShapeDescriptor::Integer { .. } => "integer",
            ShapeDescriptor::Float { .. } => "float",
            ShapeDescriptor::Bool => "bool",
            ShapeDescriptor::ByteSequence { .. } => "byte sequence",
            ShapeDescriptor::Sequence { .. } => "sequence",
            ShapeDescriptor::Record { .. } => "record",
            ShapeDescriptor::Optional { .. } => "optional",
            ShapeDescriptor::Enumeration { .. } => "enumeration",
            ShapeDescriptor::Named(_) => "named",
        }
    }
}

/// A shape registered under a name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredShape {
    pub shape: ShapeDescriptor,

    /// How many times this shape may nest inside itself before generation
    /// falls back to its minimal value. Required for self-referential shapes.
    pub max_depth: Option<u32>,
}

/// Registration table mapping logical type names to their shapes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapeRegistry {
    entries: BTreeMap<String, RegisteredShape>,
}

impl ShapeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a non-recursive shape
    pub fn register(&mut self, name: impl Into<String>, shape: ShapeDescriptor) -> &mut Self {
        self.entries.insert(
            name.into(),
            RegisteredShape {
                shape,
                max_depth: None,
            },
        );
        self
    }

    /// Register a shape that may refer to itself, nesting at most `max_depth` times
    pub fn register_recursive(
        &mut self,
        name: impl Into<String>,
        shape: ShapeDescriptor,
        max_depth: u32,
    ) -> &mut Self {
        self.entries.insert(
            name.into(),
            RegisteredShape {
                shape,
                max_depth: Some(max_depth),
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredShape> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a named shape, failing with `UnsupportedShape` if it is unknown
    pub fn resolve(&self, name: &str) -> Result<&RegisteredShape, GenerationError> {
        self.entries.get(name).ok_or_else(|| {
            GenerationError::UnsupportedShape(format!("shape `{}` is not registered", name))
        })
    }

    /// Check that `shape` can be generated before any generation begins.
    ///
    /// Every named reference must resolve, every primitive width must be
    /// supported, enumerations must be non-empty, and any cycle of named
    /// references must pass through a depth-bounded entry that has a finite
    /// base case.
    pub fn validate(&self, shape: &ShapeDescriptor) -> Result<(), GenerationError> {
        let mut path = Vec::new();
        let mut checked = Vec::new();
        self.validate_inner(shape, &mut path, &mut checked)
    }

    fn validate_inner<'a>(
        &'a self,
        shape: &'a ShapeDescriptor,
        path: &mut Vec<&'a str>,
        checked: &mut Vec<&'a str>,
    ) -> Result<(), GenerationError> {
        match shape {
            ShapeDescriptor::Integer { bit_width, .. } => {
                if !(1..=64).contains(bit_width) {
                    return Err(GenerationError::UnsupportedShape(format!(
                        "integer bit width {} is outside 1..=64",
                        bit_width
                    )));
                }
            }
            ShapeDescriptor::Float { bit_width } => {
                if !matches!(bit_width, 16 | 32 | 64) {
                    return Err(GenerationError::UnsupportedShape(format!(
                        "float bit width {} is not one of 16, 32, 64",
                        bit_width
                    )));
                }
            }
            ShapeDescriptor::Bool | ShapeDescriptor::ByteSequence { .. } => {}
            ShapeDescriptor::Sequence { element, .. } => {
                self.validate_inner(element, path, checked)?;
            }
            ShapeDescriptor::Record { fields } => {
                for (_, field) in fields {
                    self.validate_inner(field, path, checked)?;
                }
            }
            ShapeDescriptor::Optional { inner } => {
                self.validate_inner(inner, path, checked)?;
            }
            ShapeDescriptor::Enumeration { variants } => {
                if variants.is_empty() {
                    return Err(GenerationError::UnsupportedShape(
                        "enumeration has no variants".to_string(),
                    ));
                }
                for variant in variants {
                    if let Some(payload) = &variant.payload {
                        self.validate_inner(payload, path, checked)?;
                    }
                }
            }
            ShapeDescriptor::Named(name) => {
                let name = name.as_str();
                if let Some(start) = path.iter().position(|n| *n == name) {
                    let bounded = path[start..]
                        .iter()
                        .any(|n| self.get(n).map_or(false, |e| e.max_depth.is_some()));
                    if !bounded {
                        return Err(GenerationError::UnsupportedShape(format!(
                            "shape `{}` is self-referential without a depth bound",
                            name
                        )));
                    }
                    return Ok(());
                }
                if checked.contains(&name) {
                    return Ok(());
                }
                let entry = self.resolve(name)?;
                path.push(name);
                self.validate_inner(&entry.shape, path, checked)?;
                path.pop();
                if entry.max_depth.is_some() {
                    minimal_value(&ShapeDescriptor::Named(name.to_string()), self)?;
                }
                checked.push(name);
            }
        }
        Ok(())
    }
}
