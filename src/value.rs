//! Generated values
//!
//! A [`GeneratedValue`] is one instance conforming to a
//! [`ShapeDescriptor`](crate::shape::ShapeDescriptor). Composite values own
//! their children outright; nothing is shared between values.

use std::mem::size_of;

/// Bytes charged for one child slot of a composite value
pub const SLOT_SIZE: usize = size_of::<GeneratedValue>();

#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedValue {
    /// Signed and unsigned integers up to 64 bits
    Int(i128),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Sequence(Vec<GeneratedValue>),
    /// Field values in declaration order
    Record(Vec<GeneratedValue>),
    Optional(Option<Box<GeneratedValue>>),
    Variant {
        index: u32,
        payload: Option<Box<GeneratedValue>>,
    },
}

impl GeneratedValue {
    /// Heap bytes owned by this value, counted the same way the allocator is charged
    pub fn footprint(&self) -> usize {
        match self {
            GeneratedValue::Int(_) | GeneratedValue::Float(_) | GeneratedValue::Bool(_) => 0,
            GeneratedValue::Bytes(bytes) => bytes.len(),
            GeneratedValue::Sequence(items) | GeneratedValue::Record(items) => {
                items.len() * SLOT_SIZE + items.iter().map(|v| v.footprint()).sum::<usize>()
            }
            GeneratedValue::Optional(inner) => inner
                .as_ref()
                .map_or(0, |v| SLOT_SIZE + v.footprint()),
            GeneratedValue::Variant { payload, .. } => payload
                .as_ref()
                .map_or(0, |v| SLOT_SIZE + v.footprint()),
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            GeneratedValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            GeneratedValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            GeneratedValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            GeneratedValue::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[GeneratedValue]> {
        match self {
            GeneratedValue::Sequence(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&[GeneratedValue]> {
        match self {
            GeneratedValue::Record(v) => Some(v),
            _ => None,
        }
    }

    /// `Some(inner)` for a present optional, `None` for an absent one or a non-optional
    pub fn as_optional(&self) -> Option<Option<&GeneratedValue>> {
        match self {
            GeneratedValue::Optional(v) => Some(v.as_deref()),
            _ => None,
        }
    }

    pub fn as_variant(&self) -> Option<(u32, Option<&GeneratedValue>)> {
        match self {
            GeneratedValue::Variant { index, payload } => Some((*index, payload.as_deref())),
            _ => None,
        }
    }
}
