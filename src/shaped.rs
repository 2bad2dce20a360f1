//! Typed properties
//!
//! Properties are usually easier to write against plain Rust types than
//! against [`GeneratedValue`]. A type implementing [`Shaped`] names the shape
//! its values are generated from and knows how to read itself back out of a
//! generated value; [`run_typed`] uses both to run a property over `T`.
//!
//! Implementations are provided for the primitive integers up to 64 bits,
//! `f32`, `f64`, `bool`, `String`, `Vec<T>`, `Option<T>` and tuples of two
//! and three elements. Structs get one through [`shaped_record!`].

use crate::config::PropertyConfig;
use crate::engine::{run_property, IntoVerdict, Verdict};
use crate::result::PropertyResult;
use crate::shape::ShapeDescriptor;
use crate::value::GeneratedValue;

/// A type that can be generated from a shape
pub trait Shaped: Sized {
    /// Shape values of this type are generated from
    fn shape() -> ShapeDescriptor;

    /// Read a value of this type back out of a generated value.
    ///
    /// Returns `None` when `value` does not have the structure of [`Shaped::shape`].
    fn from_generated(value: &GeneratedValue) -> Option<Self>;
}

macro_rules! shaped_int {
    ($($t:ty => $signed:expr),* $(,)?) => {
        $(
            impl Shaped for $t {
                fn shape() -> ShapeDescriptor {
                    ShapeDescriptor::Integer {
                        signed: $signed,
                        bit_width: <$t>::BITS,
                    }
                }

                fn from_generated(value: &GeneratedValue) -> Option<Self> {
                    value.as_int().and_then(|v| <$t>::try_from(v).ok())
                }
            }
        )*
    };
}

shaped_int! {
    i8 => true,
    i16 => true,
    i32 => true,
    i64 => true,
    u8 => false,
    u16 => false,
    u32 => false,
    u64 => false,
}

impl Shaped for f32 {
    fn shape() -> ShapeDescriptor {
        ShapeDescriptor::float(32)
    }

    fn from_generated(value: &GeneratedValue) -> Option<Self> {
        value.as_float().map(|f| f as f32)
    }
}

impl Shaped for f64 {
    fn shape() -> ShapeDescriptor {
        ShapeDescriptor::float(64)
    }

    fn from_generated(value: &GeneratedValue) -> Option<Self> {
        value.as_float()
    }
}

impl Shaped for bool {
    fn shape() -> ShapeDescriptor {
        ShapeDescriptor::Bool
    }

    fn from_generated(value: &GeneratedValue) -> Option<Self> {
        value.as_bool()
    }
}

impl Shaped for String {
    fn shape() -> ShapeDescriptor {
        ShapeDescriptor::text()
    }

    fn from_generated(value: &GeneratedValue) -> Option<Self> {
        value
            .as_bytes()
            .and_then(|bytes| String::from_utf8(bytes.to_vec()).ok())
    }
}

impl<T: Shaped> Shaped for Vec<T> {
    fn shape() -> ShapeDescriptor {
        ShapeDescriptor::sequence(T::shape())
    }

    fn from_generated(value: &GeneratedValue) -> Option<Self> {
        value.as_sequence()?.iter().map(T::from_generated).collect()
    }
}

impl<T: Shaped> Shaped for Option<T> {
    fn shape() -> ShapeDescriptor {
        ShapeDescriptor::optional(T::shape())
    }

    fn from_generated(value: &GeneratedValue) -> Option<Self> {
        match value.as_optional()? {
            Some(inner) => T::from_generated(inner).map(Some),
            None => Some(None),
        }
    }
}

impl<A: Shaped, B: Shaped> Shaped for (A, B) {
    fn shape() -> ShapeDescriptor {
        ShapeDescriptor::record(vec![("0", A::shape()), ("1", B::shape())])
    }

    fn from_generated(value: &GeneratedValue) -> Option<Self> {
        match value.as_record()? {
            [a, b] => Some((A::from_generated(a)?, B::from_generated(b)?)),
            _ => None,
        }
    }
}

impl<A: Shaped, B: Shaped, C: Shaped> Shaped for (A, B, C) {
    fn shape() -> ShapeDescriptor {
        ShapeDescriptor::record(vec![("0", A::shape()), ("1", B::shape()), ("2", C::shape())])
    }

    fn from_generated(value: &GeneratedValue) -> Option<Self> {
        match value.as_record()? {
            [a, b, c] => Some((
                A::from_generated(a)?,
                B::from_generated(b)?,
                C::from_generated(c)?,
            )),
            _ => None,
        }
    }
}

/// Implement [`Shaped`] for a struct whose fields are all [`Shaped`].
///
/// The struct is generated as a record with one field per listed field, in
/// the order given.
///
/// ```
/// use conjecture_shapes::{shaped_record, Shaped};
///
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// shaped_record!(Point { x: i32, y: i32 });
///
/// assert_eq!(Point::shape().kind(), "record");
/// ```
#[macro_export]
macro_rules! shaped_record {
    ($name:ident { $($field:ident : $ty:ty),+ $(,)? }) => {
        impl $crate::Shaped for $name {
            fn shape() -> $crate::ShapeDescriptor {
                $crate::ShapeDescriptor::record(vec![
                    $((stringify!($field), <$ty as $crate::Shaped>::shape())),+
                ])
            }

            fn from_generated(value: &$crate::GeneratedValue) -> Option<Self> {
                let mut fields = value.as_record()?.iter();
                let result = $name {
                    $($field: <$ty as $crate::Shaped>::from_generated(fields.next()?)?),+
                };
                match fields.next() {
                    Some(_) => None,
                    None => Some(result),
                }
            }
        }
    };
}

/// Run `property` against generated values of `T`.
///
/// A generated value that cannot be read back as `T` fails the case.
pub fn run_typed<T, F, R>(config: PropertyConfig, mut property: F) -> PropertyResult
where
    T: Shaped,
    F: FnMut(T) -> R,
    R: IntoVerdict,
{
    let shape = T::shape();
    run_property(config, &shape, |value: &GeneratedValue| match T::from_generated(value) {
        Some(typed) => property(typed).into_verdict(),
        None => Verdict::Fail(format!("generated value {:?} does not fit the requested type", value)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Account {
        id: u16,
        owner: String,
        balance: i64,
    }

    shaped_record!(Account {
        id: u16,
        owner: String,
        balance: i64,
    });

    #[test]
    fn test_integer_shapes_carry_width() {
        assert_eq!(
            i8::shape(),
            ShapeDescriptor::Integer {
                signed: true,
                bit_width: 8
            }
        );
        assert_eq!(
            u64::shape(),
            ShapeDescriptor::Integer {
                signed: false,
                bit_width: 64
            }
        );
    }

    #[test]
    fn test_out_of_range_int_is_rejected() {
        assert_eq!(u8::from_generated(&GeneratedValue::Int(300)), None);
        assert_eq!(i8::from_generated(&GeneratedValue::Int(-5)), Some(-5));
    }

    #[test]
    fn test_nested_conversion() {
        let value = GeneratedValue::Sequence(vec![
            GeneratedValue::Optional(Some(Box::new(GeneratedValue::Bool(true)))),
            GeneratedValue::Optional(None),
        ]);
        assert_eq!(
            Vec::<Option<bool>>::from_generated(&value),
            Some(vec![Some(true), None])
        );
        assert_eq!(Vec::<bool>::from_generated(&value), None);
    }

    #[test]
    fn test_record_macro() {
        let value = GeneratedValue::Record(vec![
            GeneratedValue::Int(7),
            GeneratedValue::Bytes(b"ann".to_vec()),
            GeneratedValue::Int(-20),
        ]);
        let account = Account::from_generated(&value).unwrap();
        assert_eq!(account.id, 7);
        assert_eq!(account.owner, "ann");
        assert_eq!(account.balance, -20);
        assert_eq!(Account::shape().kind(), "record");

        let short = GeneratedValue::Record(vec![GeneratedValue::Int(7)]);
        assert!(Account::from_generated(&short).is_none());
    }

    #[test]
    fn test_run_typed_shrinks_pairs() {
        let result = run_typed::<(u8, bool), _, _>(PropertyConfig::default().with_seed(11), |(a, _)| {
            a < 60
        });
        assert!(!result.passed);
        assert_eq!(result.best_counterexample(), Some("{0: 60, 1: false}"));
    }

    #[test]
    fn test_run_typed_passes() {
        let result = run_typed::<Vec<u32>, _, _>(PropertyConfig::default().with_seed(12), |xs| {
            let mut sorted = xs.clone();
            sorted.sort_unstable();
            sorted.len() == xs.len()
        });
        assert!(result.passed);
        assert_eq!(result.cases_run, 100);
    }
}
