//! Shape-driven value generation and disposal
//!
//! [`generate`] walks a [`ShapeDescriptor`] recursively and draws one random
//! value for it from the [`GenerationContext`]'s random source, charging every
//! heap allocation to the context's allocator. [`dispose`] is the mirror walk
//! that releases those charges once a value is no longer needed.
//!
//! All recursive calls share the same `max_size`; nesting depth is bounded by
//! the shape itself (and by `max_depth` on recursive registry entries), never
//! by shrinking the size parameter.

use crate::alloc::{AllocError, Allocator};
use crate::rng::RngSource;
use crate::shape::{Alphabet, ShapeDescriptor, ShapeRegistry, DEFAULT_SEQUENCE_CAP};
use crate::value::{GeneratedValue, SLOT_SIZE};
use half::f16;
use log::trace;
use thiserror::Error;

/// Fatal errors raised while generating test data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// The shape cannot be generated (unregistered, unbounded recursion, bad width)
    #[error("could not generate valid test data: {0}")]
    UnsupportedShape(String),

    /// The allocator refused a request
    #[error("test data generation exhausted memory: could not allocate {requested} bytes ({in_use} bytes in use)")]
    AllocationFailure { requested: usize, in_use: usize },
}

impl From<AllocError> for GenerationError {
    fn from(err: AllocError) -> Self {
        GenerationError::AllocationFailure {
            requested: err.requested,
            in_use: err.in_use,
        }
    }
}

/// State shared by every recursive generation call of one property run
pub struct GenerationContext<'a> {
    /// Random source, exclusively owned by this run
    pub rng: RngSource,

    /// Bound on numeric magnitude and collection length
    pub max_size: u32,

    allocator: &'a mut dyn Allocator,
    registry: &'a ShapeRegistry,

    /// Named shapes currently being expanded, innermost last
    active: Vec<String>,
}

impl<'a> GenerationContext<'a> {
    pub fn new(
        rng: RngSource,
        max_size: u32,
        allocator: &'a mut dyn Allocator,
        registry: &'a ShapeRegistry,
    ) -> Self {
        Self {
            rng,
            max_size,
            allocator,
            registry,
            active: Vec::new(),
        }
    }

    pub fn allocator(&mut self) -> &mut dyn Allocator {
        &mut *self.allocator
    }

    pub fn registry(&self) -> &'a ShapeRegistry {
        self.registry
    }

    fn charge(&mut self, bytes: usize) -> Result<(), GenerationError> {
        self.allocator.allocate(bytes).map_err(GenerationError::from)
    }

    fn nesting_of(&self, name: &str) -> u32 {
        self.active.iter().filter(|n| n.as_str() == name).count() as u32
    }
}

/// Generate one value of `shape`.
pub fn generate(
    shape: &ShapeDescriptor,
    ctx: &mut GenerationContext<'_>,
) -> Result<GeneratedValue, GenerationError> {
    let max_size = i128::from(ctx.max_size);
    match shape {
        ShapeDescriptor::Integer { signed, bit_width } => {
            let (type_min, type_max) = integer_bounds(*signed, *bit_width)?;
            let lo = if *signed { (-max_size).max(type_min) } else { 0 };
            let hi = max_size.min(type_max);
            Ok(GeneratedValue::Int(ctx.rng.uniform_int(lo, hi)))
        }
        ShapeDescriptor::Float { bit_width } => {
            let raw = ctx.rng.uniform_float() * f64::from(ctx.max_size);
            Ok(GeneratedValue::Float(round_to_width(raw, *bit_width)?))
        }
        ShapeDescriptor::Bool => Ok(GeneratedValue::Bool(ctx.rng.uniform_bool())),
        ShapeDescriptor::ByteSequence {
            alphabet,
            allow_empty,
            max_len,
        } => {
            let min_len = if *allow_empty { 0 } else { 1 };
            let cap = max_len.map_or(ctx.max_size, |m| m.min(ctx.max_size));
            let len = draw_length(ctx, min_len, cap);
            ctx.charge(len)?;
            let mut bytes = Vec::new();
            if bytes.try_reserve_exact(len).is_err() {
                ctx.allocator.release(len);
                return Err(GenerationError::AllocationFailure {
                    requested: len,
                    in_use: ctx.allocator.in_use(),
                });
            }
            for _ in 0..len {
                let byte = ctx
                    .rng
                    .uniform_int(i128::from(alphabet.low()), i128::from(alphabet.high()));
                bytes.push(byte as u8);
            }
            Ok(GeneratedValue::Bytes(bytes))
        }
        ShapeDescriptor::Sequence {
            element,
            min_len,
            max_len,
        } => {
            let cap = max_len.unwrap_or(DEFAULT_SEQUENCE_CAP).min(ctx.max_size);
            let len = draw_length(ctx, *min_len as usize, cap);
            let items = generate_slots(ctx, len, |ctx, _| generate(element, ctx))?;
            Ok(GeneratedValue::Sequence(items))
        }
        ShapeDescriptor::Record { fields } => {
            let items = generate_slots(ctx, fields.len(), |ctx, i| generate(&fields[i].1, ctx))?;
            Ok(GeneratedValue::Record(items))
        }
        ShapeDescriptor::Optional { inner } => {
            if ctx.rng.uniform_bool() {
                let value = generate_boxed(inner, ctx)?;
                Ok(GeneratedValue::Optional(Some(value)))
            } else {
                Ok(GeneratedValue::Optional(None))
            }
        }
        ShapeDescriptor::Enumeration { variants } => {
            if variants.is_empty() {
                return Err(GenerationError::UnsupportedShape(
                    "enumeration has no variants".to_string(),
                ));
            }
            let index = ctx.rng.uniform_index(variants.len());
            let payload = match &variants[index].payload {
                Some(payload_shape) => Some(generate_boxed(payload_shape, ctx)?),
                None => None,
            };
            Ok(GeneratedValue::Variant {
                index: index as u32,
                payload,
            })
        }
        ShapeDescriptor::Named(name) => {
            let registry = ctx.registry();
            let entry = registry.resolve(name)?;
            let depth = ctx.nesting_of(name);
            if entry.max_depth.map_or(false, |max| depth >= max) {
                trace!("depth bound reached for `{}`, using its minimal value", name);
                let value = minimal_value(shape, registry)?;
                ctx.charge(value.footprint())?;
                return Ok(value);
            }
            ctx.active.push(name.clone());
            let result = generate(&entry.shape, ctx);
            ctx.active.pop();
            result
        }
    }
}

/// Release a value and every allocation it owns.
///
/// Must be called exactly once per generated value.
pub fn dispose(shape: &ShapeDescriptor, value: GeneratedValue, allocator: &mut dyn Allocator) {
    debug_assert!(admits(shape, &value), "disposing a {} with a mismatched value", shape.kind());
    allocator.release(value.footprint());
    drop(value);
}

/// Shallow check that `value` has the structure `shape` describes.
///
/// Named shapes admit any value since resolving them needs a registry.
pub fn admits(shape: &ShapeDescriptor, value: &GeneratedValue) -> bool {
    match (shape, value) {
        (ShapeDescriptor::Named(_), _) => true,
        (ShapeDescriptor::Integer { .. }, GeneratedValue::Int(_))
        | (ShapeDescriptor::Float { .. }, GeneratedValue::Float(_))
        | (ShapeDescriptor::Bool, GeneratedValue::Bool(_))
        | (ShapeDescriptor::ByteSequence { .. }, GeneratedValue::Bytes(_)) => true,
        (ShapeDescriptor::Sequence { element, .. }, GeneratedValue::Sequence(items)) => {
            items.iter().all(|item| admits(element, item))
        }
        (ShapeDescriptor::Record { fields }, GeneratedValue::Record(items)) => {
            fields.len() == items.len()
                && fields
                    .iter()
                    .zip(items)
                    .all(|((_, field), item)| admits(field, item))
        }
        (ShapeDescriptor::Optional { inner }, GeneratedValue::Optional(value)) => {
            value.as_ref().map_or(true, |v| admits(inner, v))
        }
        (ShapeDescriptor::Enumeration { variants }, GeneratedValue::Variant { index, payload }) => {
            match (variants.get(*index as usize), payload) {
                (Some(variant), None) => variant.payload.is_none(),
                (Some(variant), Some(p)) => variant
                    .payload
                    .as_ref()
                    .map_or(false, |shape| admits(shape, p)),
                (None, _) => false,
            }
        }
        _ => false,
    }
}

/// The smallest value of `shape`: the base case used when a recursive shape
/// hits its depth bound, and the payload used when shrinking to an earlier
/// enumeration variant.
pub fn minimal_value(
    shape: &ShapeDescriptor,
    registry: &ShapeRegistry,
) -> Result<GeneratedValue, GenerationError> {
    let mut visiting = Vec::new();
    minimal_inner(shape, registry, &mut visiting)
}

fn minimal_inner(
    shape: &ShapeDescriptor,
    registry: &ShapeRegistry,
    visiting: &mut Vec<String>,
) -> Result<GeneratedValue, GenerationError> {
    match shape {
        ShapeDescriptor::Integer { .. } => Ok(GeneratedValue::Int(0)),
        ShapeDescriptor::Float { .. } => Ok(GeneratedValue::Float(0.0)),
        ShapeDescriptor::Bool => Ok(GeneratedValue::Bool(false)),
        ShapeDescriptor::ByteSequence {
            alphabet,
            allow_empty,
            ..
        } => {
            let len = if *allow_empty { 0 } else { 1 };
            Ok(GeneratedValue::Bytes(vec![alphabet.low(); len]))
        }
        ShapeDescriptor::Sequence {
            element, min_len, ..
        } => {
            let items = (0..*min_len)
                .map(|_| minimal_inner(element, registry, visiting))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(GeneratedValue::Sequence(items))
        }
        ShapeDescriptor::Record { fields } => {
            let items = fields
                .iter()
                .map(|(_, field)| minimal_inner(field, registry, visiting))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(GeneratedValue::Record(items))
        }
        ShapeDescriptor::Optional { .. } => Ok(GeneratedValue::Optional(None)),
        ShapeDescriptor::Enumeration { variants } => {
            let mut last_err = None;
            for (index, variant) in variants.iter().enumerate() {
                let payload = match &variant.payload {
                    None => None,
                    Some(payload_shape) => match minimal_inner(payload_shape, registry, visiting) {
                        Ok(value) => Some(Box::new(value)),
                        Err(err) => {
                            last_err = Some(err);
                            continue;
                        }
                    },
                };
                return Ok(GeneratedValue::Variant {
                    index: index as u32,
                    payload,
                });
            }
            Err(last_err.unwrap_or_else(|| {
                GenerationError::UnsupportedShape("enumeration has no variants".to_string())
            }))
        }
        ShapeDescriptor::Named(name) => {
            if visiting.iter().any(|n| n == name) {
                return Err(GenerationError::UnsupportedShape(format!(
                    "recursive shape `{}` has no finite base case",
                    name
                )));
            }
            let entry = registry.resolve(name)?;
            visiting.push(name.clone());
            let result = minimal_inner(&entry.shape, registry, visiting);
            visiting.pop();
            result
        }
    }
}

/// Representable range of an integer shape
pub fn integer_bounds(signed: bool, bit_width: u32) -> Result<(i128, i128), GenerationError> {
    if !(1..=64).contains(&bit_width) {
        return Err(GenerationError::UnsupportedShape(format!(
            "integer bit width {} is outside 1..=64",
            bit_width
        )));
    }
    if signed {
        let half = 1i128 << (bit_width - 1);
        Ok((-half, half - 1))
    } else {
        Ok((0, (1i128 << bit_width) - 1))
    }
}

/// Round `value` to the nearest float of the given width
pub fn round_to_width(value: f64, bit_width: u32) -> Result<f64, GenerationError> {
    match bit_width {
        16 => {
            let clamped = value.clamp(f64::from(f16::MIN), f64::from(f16::MAX));
            Ok(f16::from_f64(clamped).to_f64())
        }
        32 => Ok(f64::from(value as f32)),
        64 => Ok(value),
        other => Err(GenerationError::UnsupportedShape(format!(
            "float bit width {} is not one of 16, 32, 64",
            other
        ))),
    }
}

fn draw_length(ctx: &mut GenerationContext<'_>, min_len: usize, cap: u32) -> usize {
    let hi = (cap as usize).max(min_len);
    ctx.rng.uniform_int(min_len as i128, hi as i128) as usize
}

/// Allocate `len` child slots and fill them in order.
///
/// On failure every charge made so far, slots and finished children alike,
/// is released before the error is returned.
fn generate_slots<F>(
    ctx: &mut GenerationContext<'_>,
    len: usize,
    mut next: F,
) -> Result<Vec<GeneratedValue>, GenerationError>
where
    F: FnMut(&mut GenerationContext<'_>, usize) -> Result<GeneratedValue, GenerationError>,
{
    let bytes = len.saturating_mul(SLOT_SIZE);
    ctx.charge(bytes)?;
    let mut items = Vec::new();
    if items.try_reserve_exact(len).is_err() {
        ctx.allocator.release(bytes);
        return Err(GenerationError::AllocationFailure {
            requested: bytes,
            in_use: ctx.allocator.in_use(),
        });
    }
    for i in 0..len {
        match next(ctx, i) {
            Ok(item) => items.push(item),
            Err(err) => {
                let built: usize = items.iter().map(GeneratedValue::footprint).sum();
                ctx.allocator.release(bytes + built);
                return Err(err);
            }
        }
    }
    Ok(items)
}

/// Charge one box slot and generate its contents, releasing the slot if
/// the contents cannot be generated
fn generate_boxed(
    shape: &ShapeDescriptor,
    ctx: &mut GenerationContext<'_>,
) -> Result<Box<GeneratedValue>, GenerationError> {
    ctx.charge(SLOT_SIZE)?;
    match generate(shape, ctx) {
        Ok(value) => Ok(Box::new(value)),
        Err(err) => {
            ctx.allocator.release(SLOT_SIZE);
            Err(err)
        }
    }
}

/// Alphabet a byte-sequence shape draws from, if `shape` is one
pub fn alphabet_of(shape: &ShapeDescriptor) -> Option<Alphabet> {
    match shape {
        ShapeDescriptor::ByteSequence { alphabet, .. } => Some(*alphabet),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{BudgetAllocator, SystemAllocator};
    use crate::shape::Variant;

    fn with_ctx<T>(seed: u64, max_size: u32, f: impl FnOnce(&mut GenerationContext<'_>) -> T) -> T {
        let mut alloc = SystemAllocator::new();
        let registry = ShapeRegistry::new();
        let mut ctx = GenerationContext::new(RngSource::new(seed), max_size, &mut alloc, &registry);
        f(&mut ctx)
    }

    #[test]
    fn test_signed_integers_respect_max_size() {
        with_ctx(1, 10, |ctx| {
            for _ in 0..500 {
                let v = generate(&ShapeDescriptor::signed(64), ctx).unwrap();
                assert!((-10..=10).contains(&v.as_int().unwrap()));
            }
        });
    }

    #[test]
    fn test_integers_clamp_to_type_range() {
        with_ctx(2, 1000, |ctx| {
            for _ in 0..500 {
                let v = generate(&ShapeDescriptor::signed(8), ctx).unwrap().as_int().unwrap();
                assert!((-128..=127).contains(&v));
                let u = generate(&ShapeDescriptor::unsigned(4), ctx).unwrap().as_int().unwrap();
                assert!((0..=15).contains(&u));
            }
        });
    }

    #[test]
    fn test_floats_scale_by_max_size() {
        with_ctx(3, 50, |ctx| {
            for width in [16, 32, 64] {
                for _ in 0..200 {
                    let f = generate(&ShapeDescriptor::float(width), ctx).unwrap().as_float().unwrap();
                    assert!((0.0..=50.0).contains(&f));
                }
            }
        });
    }

    #[test]
    fn test_text_is_printable_and_bounded() {
        with_ctx(4, 12, |ctx| {
            for _ in 0..200 {
                let v = generate(&ShapeDescriptor::text(), ctx).unwrap();
                let bytes = v.as_bytes().unwrap();
                assert!(!bytes.is_empty() && bytes.len() <= 12);
                assert!(bytes.iter().all(|b| (0x20..=0x7E).contains(b)));
            }
        });
    }

    #[test]
    fn test_zero_length_bytes_allowed_when_configured() {
        let shape = ShapeDescriptor::ByteSequence {
            alphabet: Alphabet::Binary,
            allow_empty: true,
            max_len: Some(2),
        };
        with_ctx(5, 100, |ctx| {
            let lens: Vec<usize> = (0..200)
                .map(|_| generate(&shape, ctx).unwrap().as_bytes().unwrap().len())
                .collect();
            assert!(lens.contains(&0));
            assert!(lens.iter().all(|l| *l <= 2));
        });
    }

    #[test]
    fn test_sequence_length_bounded_by_max_size() {
        let shape = ShapeDescriptor::sequence(ShapeDescriptor::Bool);
        with_ctx(6, 5, |ctx| {
            for _ in 0..200 {
                let len = generate(&shape, ctx).unwrap().as_sequence().unwrap().len();
                assert!((1..=5).contains(&len));
            }
        });
    }

    #[test]
    fn test_record_fields_in_order() {
        let shape = ShapeDescriptor::record(vec![
            ("flag", ShapeDescriptor::Bool),
            ("count", ShapeDescriptor::unsigned(8)),
        ]);
        with_ctx(7, 20, |ctx| {
            let v = generate(&shape, ctx).unwrap();
            let fields = v.as_record().unwrap();
            assert!(fields[0].as_bool().is_some());
            assert!(fields[1].as_int().is_some());
            assert!(admits(&shape, &v));
        });
    }

    #[test]
    fn test_optional_produces_both_cases() {
        let shape = ShapeDescriptor::optional(ShapeDescriptor::Bool);
        with_ctx(8, 10, |ctx| {
            let values: Vec<_> = (0..100).map(|_| generate(&shape, ctx).unwrap()).collect();
            assert!(values.iter().any(|v| v.as_optional() == Some(None)));
            assert!(values.iter().any(|v| matches!(v.as_optional(), Some(Some(_)))));
        });
    }

    #[test]
    fn test_enumeration_payload_matches_variant() {
        let shape = ShapeDescriptor::enumeration(vec![
            Variant::unit("Empty"),
            Variant::with_payload("Full", ShapeDescriptor::unsigned(8)),
        ]);
        with_ctx(9, 10, |ctx| {
            for _ in 0..100 {
                let v = generate(&shape, ctx).unwrap();
                assert!(admits(&shape, &v));
            }
        });
    }

    #[test]
    fn test_bounded_recursion_terminates() {
        let mut registry = ShapeRegistry::new();
        registry.register_recursive(
            "List",
            ShapeDescriptor::optional(ShapeDescriptor::record(vec![
                ("head", ShapeDescriptor::Bool),
                ("tail", ShapeDescriptor::named("List")),
            ])),
            3,
        );
        let mut alloc = SystemAllocator::new();
        let mut ctx = GenerationContext::new(RngSource::new(10), 10, &mut alloc, &registry);
        for _ in 0..100 {
            let mut value = generate(&ShapeDescriptor::named("List"), &mut ctx).unwrap();
            let mut depth = 0;
            while let GeneratedValue::Optional(Some(node)) = value {
                depth += 1;
                value = node.as_record().unwrap()[1].clone();
            }
            assert!(depth <= 3);
        }
    }

    #[test]
    fn test_unregistered_name_fails() {
        with_ctx(11, 10, |ctx| {
            let err = generate(&ShapeDescriptor::named("Ghost"), ctx).unwrap_err();
            assert!(matches!(err, GenerationError::UnsupportedShape(_)));
        });
    }

    #[test]
    fn test_budget_exhaustion_is_allocation_failure() {
        let mut alloc = BudgetAllocator::new(4);
        let registry = ShapeRegistry::new();
        let mut ctx = GenerationContext::new(RngSource::new(12), 100, &mut alloc, &registry);
        let shape = ShapeDescriptor::sequence(ShapeDescriptor::unsigned(8));
        let err = generate(&shape, &mut ctx).unwrap_err();
        assert!(matches!(err, GenerationError::AllocationFailure { .. }));
        assert!(err.to_string().contains("exhausted memory"));
    }

    #[test]
    fn test_failed_record_releases_earlier_charges() {
        let shape = ShapeDescriptor::record(vec![
            ("flag", ShapeDescriptor::Bool),
            ("name", ShapeDescriptor::text()),
        ]);
        let mut alloc = BudgetAllocator::new(2 * SLOT_SIZE);
        let registry = ShapeRegistry::new();
        let err = {
            let mut ctx = GenerationContext::new(RngSource::new(14), 10, &mut alloc, &registry);
            generate(&shape, &mut ctx).unwrap_err()
        };
        assert!(matches!(err, GenerationError::AllocationFailure { .. }));
        assert_eq!(alloc.peak(), 2 * SLOT_SIZE);
        assert_eq!(alloc.in_use(), 0);
    }

    #[test]
    fn test_failed_payload_releases_its_slot() {
        let shape = ShapeDescriptor::enumeration(vec![Variant::with_payload(
            "Named",
            ShapeDescriptor::text(),
        )]);
        let mut alloc = BudgetAllocator::new(SLOT_SIZE);
        let registry = ShapeRegistry::new();
        let result = {
            let mut ctx = GenerationContext::new(RngSource::new(15), 10, &mut alloc, &registry);
            generate(&shape, &mut ctx)
        };
        assert!(result.is_err());
        assert_eq!(alloc.peak(), SLOT_SIZE);
        assert_eq!(alloc.in_use(), 0);
    }

    #[test]
    fn test_dispose_releases_everything() {
        let mut alloc = BudgetAllocator::new(1 << 20);
        let registry = ShapeRegistry::new();
        let shape = ShapeDescriptor::sequence(ShapeDescriptor::record(vec![
            ("name", ShapeDescriptor::text()),
            ("tag", ShapeDescriptor::optional(ShapeDescriptor::binary())),
        ]));
        let value = {
            let mut ctx = GenerationContext::new(RngSource::new(13), 20, &mut alloc, &registry);
            generate(&shape, &mut ctx).unwrap()
        };
        assert_eq!(alloc.in_use(), value.footprint());
        dispose(&shape, value, &mut alloc);
        assert_eq!(alloc.in_use(), 0);
    }

    #[test]
    fn test_minimal_values() {
        let registry = ShapeRegistry::new();
        let shape = ShapeDescriptor::record(vec![
            ("n", ShapeDescriptor::signed(32)),
            ("s", ShapeDescriptor::text()),
            ("xs", ShapeDescriptor::sequence(ShapeDescriptor::Bool)),
            ("o", ShapeDescriptor::optional(ShapeDescriptor::Bool)),
        ]);
        let min = minimal_value(&shape, &registry).unwrap();
        assert_eq!(
            min,
            GeneratedValue::Record(vec![
                GeneratedValue::Int(0),
                GeneratedValue::Bytes(vec![b' ']),
                GeneratedValue::Sequence(vec![GeneratedValue::Bool(false)]),
                GeneratedValue::Optional(None),
            ])
        );
    }

    #[test]
    fn test_round_to_width() {
        assert_eq!(round_to_width(1.5, 16).unwrap(), 1.5);
        assert_eq!(round_to_width(0.1, 32).unwrap(), f64::from(0.1f32));
        assert_eq!(round_to_width(1e9, 16).unwrap(), f64::from(f16::MAX));
        assert!(round_to_width(1.0, 8).is_err());
    }
}
