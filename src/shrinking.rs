//! Greedy shape-aware shrinking
//!
//! Given a value that makes a property fail, the [`Shrinker`] looks for a
//! smaller value that still fails. Each round asks [`shrink_moves`] for an
//! ordered, lazily produced list of candidates; the first candidate that still
//! fails becomes the new current value and a new round starts from it. When a
//! round yields no failing candidate the search stops. Every candidate that is
//! actually evaluated counts against `max_attempts`, so the search always
//! terminates.
//!
//! Candidates are compared with [`sort_key`]: structural size first, then leaf
//! magnitudes in traversal order. Only candidates strictly below the current
//! value are evaluated, so the result is never larger than the original.

use crate::alloc::{Allocator, SystemAllocator};
use crate::generation::{dispose, minimal_value, round_to_width};
use crate::shape::{ShapeDescriptor, ShapeRegistry};
use crate::value::GeneratedValue;
use log::{debug, trace, warn};
use std::iter;

/// Lazily produced shrink candidates
pub type Moves<'a> = Box<dyn Iterator<Item = GeneratedValue> + 'a>;

/// Ordering key used to decide whether a candidate is simpler.
///
/// Returns (structural size, leaf magnitudes in traversal order); smaller is
/// simpler. Structural size counts nodes plus byte lengths, so dropping an
/// element or a present optional always wins over changing a leaf.
pub fn sort_key(value: &GeneratedValue) -> (usize, Vec<u64>) {
    let mut leaves = Vec::new();
    let size = collect_key(value, &mut leaves);
    (size, leaves)
}

fn collect_key(value: &GeneratedValue, leaves: &mut Vec<u64>) -> usize {
    match value {
        GeneratedValue::Int(v) => {
            leaves.push(v.unsigned_abs() as u64);
            1
        }
        GeneratedValue::Float(f) => {
            // Non-negative floats order the same as their bit patterns
            leaves.push(f.abs().to_bits());
            1
        }
        GeneratedValue::Bool(b) => {
            leaves.push(u64::from(*b));
            1
        }
        GeneratedValue::Bytes(bytes) => {
            leaves.extend(bytes.iter().map(|b| u64::from(*b)));
            1 + bytes.len()
        }
        GeneratedValue::Sequence(items) | GeneratedValue::Record(items) => {
            1 + items.iter().map(|v| collect_key(v, leaves)).sum::<usize>()
        }
        GeneratedValue::Optional(None) => {
            leaves.push(0);
            1
        }
        GeneratedValue::Optional(Some(inner)) => {
            leaves.push(1);
            2 + collect_key(inner, leaves)
        }
        GeneratedValue::Variant { index, payload } => {
            leaves.push(u64::from(*index));
            1 + payload.as_ref().map_or(0, |p| collect_key(p, leaves))
        }
    }
}

/// Ordered candidates that are one move smaller than `value`.
///
/// Move order per shape:
/// - integers: one unit toward zero
/// - floats: zero, truncation, halving
/// - bools: `false`
/// - byte sequences and sequences: truncate to half, drop the last element,
///   delete each earlier element, then simplify each element in place
/// - records: each field in declaration order, siblings held fixed
/// - optionals: absent, then shrink the inner value
/// - enumerations: each earlier variant with its minimal payload, then shrink the payload
///
/// Values that do not match their shape produce no candidates.
pub fn shrink_moves<'a>(
    shape: &'a ShapeDescriptor,
    value: &'a GeneratedValue,
    registry: &'a ShapeRegistry,
) -> Moves<'a> {
    match (shape, value) {
        (ShapeDescriptor::Named(name), _) => match registry.get(name) {
            Some(entry) => shrink_moves(&entry.shape, value, registry),
            None => Box::new(iter::empty()),
        },
        (ShapeDescriptor::Integer { .. }, GeneratedValue::Int(v)) => {
            if *v == 0 {
                Box::new(iter::empty())
            } else {
                Box::new(iter::once(GeneratedValue::Int(v - v.signum())))
            }
        }
        (ShapeDescriptor::Float { bit_width }, GeneratedValue::Float(f)) => {
            Box::new(float_moves(*f, *bit_width).into_iter().map(GeneratedValue::Float))
        }
        (ShapeDescriptor::Bool, GeneratedValue::Bool(true)) => {
            Box::new(iter::once(GeneratedValue::Bool(false)))
        }
        (
            ShapeDescriptor::ByteSequence {
                alphabet,
                allow_empty,
                ..
            },
            GeneratedValue::Bytes(bytes),
        ) => {
            let min_len = if *allow_empty { 0 } else { 1 };
            let low = alphabet.low();
            let shorter = removal_moves(bytes.len(), min_len)
                .into_iter()
                .map(move |removal| GeneratedValue::Bytes(removal.apply(bytes)));
            let simpler = (0..bytes.len())
                .filter(move |&i| bytes[i] > low)
                .map(move |i| {
                    let mut next = bytes.to_vec();
                    next[i] = low;
                    GeneratedValue::Bytes(next)
                });
            Box::new(shorter.chain(simpler))
        }
        (ShapeDescriptor::Sequence { element, min_len, .. }, GeneratedValue::Sequence(items)) => {
            let element: &'a ShapeDescriptor = element;
            let shorter = removal_moves(items.len(), *min_len as usize)
                .into_iter()
                .map(move |removal| GeneratedValue::Sequence(removal.apply(items)));
            let simpler = (0..items.len()).flat_map(move |i| {
                shrink_moves(element, &items[i], registry).map(move |candidate| {
                    let mut next = items.to_vec();
                    next[i] = candidate;
                    GeneratedValue::Sequence(next)
                })
            });
            Box::new(shorter.chain(simpler))
        }
        (ShapeDescriptor::Record { fields }, GeneratedValue::Record(items)) => {
            let count = fields.len().min(items.len());
            Box::new((0..count).flat_map(move |i| {
                shrink_moves(&fields[i].1, &items[i], registry).map(move |candidate| {
                    let mut next = items.to_vec();
                    next[i] = candidate;
                    GeneratedValue::Record(next)
                })
            }))
        }
        (ShapeDescriptor::Optional { inner }, GeneratedValue::Optional(Some(present))) => {
            let inner: &'a ShapeDescriptor = inner;
            let absent = iter::once(GeneratedValue::Optional(None));
            let smaller = shrink_moves(inner, present, registry)
                .map(|candidate| GeneratedValue::Optional(Some(Box::new(candidate))));
            Box::new(absent.chain(smaller))
        }
        (ShapeDescriptor::Enumeration { variants }, GeneratedValue::Variant { index, payload }) => {
            let current = *index as usize;
            let earlier = (0..current.min(variants.len())).filter_map(move |j| {
                let payload = match &variants[j].payload {
                    None => None,
                    Some(payload_shape) => Some(Box::new(minimal_value(payload_shape, registry).ok()?)),
                };
                Some(GeneratedValue::Variant {
                    index: j as u32,
                    payload,
                })
            });
            let payload_moves: Moves<'a> = match (variants.get(current), payload) {
                (Some(variant), Some(present)) => match &variant.payload {
                    Some(payload_shape) => {
                        let index = *index;
                        Box::new(shrink_moves(payload_shape, present, registry).map(move |candidate| {
                            GeneratedValue::Variant {
                                index,
                                payload: Some(Box::new(candidate)),
                            }
                        }))
                    }
                    None => Box::new(iter::empty()),
                },
                _ => Box::new(iter::empty()),
            };
            Box::new(earlier.chain(payload_moves))
        }
        _ => Box::new(iter::empty()),
    }
}

/// A way of making a collection shorter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    /// Keep only the first `n` elements
    Truncate(usize),
    /// Remove the element at this index
    Delete(usize),
}

impl Removal {
    fn apply<T: Clone>(self, items: &[T]) -> Vec<T> {
        match self {
            Removal::Truncate(n) => items[..n].to_vec(),
            Removal::Delete(i) => {
                let mut next = Vec::with_capacity(items.len() - 1);
                next.extend_from_slice(&items[..i]);
                next.extend_from_slice(&items[i + 1..]);
                next
            }
        }
    }
}

/// Shorter variants of a collection: truncate to half, drop the last
/// element, then delete each earlier element in turn
fn removal_moves(len: usize, min_len: usize) -> Vec<Removal> {
    if len <= min_len {
        return Vec::new();
    }
    let mut removals = Vec::with_capacity(len + 1);
    let half = (len / 2).max(min_len);
    if half + 1 < len {
        removals.push(Removal::Truncate(half));
    }
    removals.push(Removal::Truncate(len - 1));
    removals.extend((0..len - 1).map(Removal::Delete));
    removals
}

fn float_moves(value: f64, bit_width: u32) -> Vec<f64> {
    if value == 0.0 || !value.is_finite() {
        return Vec::new();
    }
    let mut candidates = vec![0.0];
    if value.fract() != 0.0 {
        candidates.push(value.trunc());
    }
    if let Ok(half) = round_to_width(value / 2.0, bit_width) {
        candidates.push(half);
    }
    let mut unique: Vec<f64> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if candidate.to_bits() != value.to_bits()
            && !unique.iter().any(|c| c.to_bits() == candidate.to_bits())
        {
            unique.push(candidate);
        }
    }
    unique
}

/// Why a shrink session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShrinkStatus {
    /// The current value has no smaller candidates at all
    Minimal,
    /// Every candidate of the last round passed the property
    LocalMinimum,
    /// `max_attempts` candidates were evaluated
    BudgetExhausted,
    /// The allocator refused to hold another candidate
    OutOfMemory,
}

/// Result of one shrink session
#[derive(Debug, Clone, PartialEq)]
pub struct ShrinkOutcome {
    /// Smallest failing value found, if any is smaller than the original.
    /// Still charged to the allocator; the caller must dispose it.
    pub shrunk: Option<GeneratedValue>,

    /// Candidates evaluated against the property
    pub attempts: u32,

    /// Candidates accepted as the new current value
    pub steps: u32,

    pub status: ShrinkStatus,
}

/// Greedy local search for a smaller failing value
pub struct Shrinker<'a> {
    shape: &'a ShapeDescriptor,
    registry: &'a ShapeRegistry,
    allocator: &'a mut dyn Allocator,
    max_attempts: u32,
    attempts: u32,
    steps: u32,
}

impl<'a> Shrinker<'a> {
    pub fn new(
        shape: &'a ShapeDescriptor,
        registry: &'a ShapeRegistry,
        allocator: &'a mut dyn Allocator,
        max_attempts: u32,
    ) -> Self {
        Self {
            shape,
            registry,
            allocator,
            max_attempts,
            attempts: 0,
            steps: 0,
        }
    }

    /// Shrink `original`, which must already make the property fail.
    ///
    /// `still_fails` is called once per evaluated candidate and returns true
    /// when the candidate still makes the property fail. The original value is
    /// only borrowed; its disposal stays with the caller.
    pub fn shrink<F>(mut self, original: &GeneratedValue, mut still_fails: F) -> ShrinkOutcome
    where
        F: FnMut(&GeneratedValue) -> bool,
    {
        let mut current: Option<GeneratedValue> = None;

        let status = loop {
            let best = current.as_ref().unwrap_or(original);
            let best_key = sort_key(best);
            let mut saw_candidate = false;
            let mut accepted = None;
            let mut stopped = None;

            for candidate in shrink_moves(self.shape, best, self.registry) {
                if sort_key(&candidate) >= best_key {
                    continue;
                }
                saw_candidate = true;
                if self.attempts >= self.max_attempts {
                    stopped = Some(ShrinkStatus::BudgetExhausted);
                    break;
                }
                if let Err(err) = self.allocator.allocate(candidate.footprint()) {
                    warn!("Stopping shrink early: {}", err);
                    stopped = Some(ShrinkStatus::OutOfMemory);
                    break;
                }
                self.attempts += 1;
                if still_fails(&candidate) {
                    accepted = Some(candidate);
                    break;
                }
                trace!("SHRINK: candidate {} passed, discarding", self.attempts);
                dispose(self.shape, candidate, &mut *self.allocator);
            }

            if let Some(status) = stopped {
                break status;
            }
            match accepted {
                Some(next) => {
                    self.steps += 1;
                    debug!(
                        "SHRINK: accepted step {} after {} attempts",
                        self.steps, self.attempts
                    );
                    if let Some(previous) = current.replace(next) {
                        dispose(self.shape, previous, &mut *self.allocator);
                    }
                }
                None => {
                    break if saw_candidate {
                        ShrinkStatus::LocalMinimum
                    } else {
                        ShrinkStatus::Minimal
                    }
                }
            }
        };

        debug!(
            "SHRINK: finished with {:?} after {} attempts and {} steps",
            status, self.attempts, self.steps
        );
        ShrinkOutcome {
            shrunk: current,
            attempts: self.attempts,
            steps: self.steps,
            status,
        }
    }
}

/// Shrink without an allocation budget.
///
/// Returns `None` when no smaller failing value was found.
pub fn shrink<F>(
    shape: &ShapeDescriptor,
    original: &GeneratedValue,
    registry: &ShapeRegistry,
    still_fails: F,
    max_attempts: u32,
) -> Option<GeneratedValue>
where
    F: FnMut(&GeneratedValue) -> bool,
{
    let mut allocator = SystemAllocator::new();
    Shrinker::new(shape, registry, &mut allocator, max_attempts)
        .shrink(original, still_fails)
        .shrunk
}
