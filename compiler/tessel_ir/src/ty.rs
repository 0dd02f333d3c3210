//! Static value types.

use std::fmt;

use crate::DataType;

/// Static type of a value: tensor rank and dtype, shape arity, or an opaque
/// runtime handle.
///
/// `None` ranks mean "statically unknown" (`Tensor[_, "float32"]`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Type {
    Tensor { rank: Option<usize>, dtype: DataType },
    /// A runtime shape value holding `ndim` integer dimensions.
    Shape { ndim: Option<usize> },
    /// Opaque runtime object (storage blocks, heaps, packed function results).
    Object,
    /// Tuple of values. The empty tuple is the unit type of effect-only calls.
    Tuple(Vec<Type>),
}

impl Type {
    pub fn tensor(rank: usize, dtype: DataType) -> Self {
        Type::Tensor {
            rank: Some(rank),
            dtype,
        }
    }

    pub fn unit() -> Self {
        Type::Tuple(Vec::new())
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Type::Tuple(fields) if fields.is_empty())
    }

    /// The element type if this is a tensor type.
    pub fn tensor_dtype(&self) -> Option<DataType> {
        match self {
            Type::Tensor { dtype, .. } => Some(*dtype),
            _ => None,
        }
    }

    /// Compatibility check used when binding a value to an annotated variable.
    ///
    /// Equal types are compatible; an unknown rank or arity on either side
    /// matches any known one.
    pub fn is_compatible(&self, other: &Type) -> bool {
        match (self, other) {
            (
                Type::Tensor { rank: r1, dtype: d1 },
                Type::Tensor { rank: r2, dtype: d2 },
            ) => d1 == d2 && unknown_or_equal(*r1, *r2),
            (Type::Shape { ndim: n1 }, Type::Shape { ndim: n2 }) => unknown_or_equal(*n1, *n2),
            (Type::Object, Type::Object) => true,
            (Type::Tuple(a), Type::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.is_compatible(y))
            }
            _ => false,
        }
    }
}

fn unknown_or_equal(a: Option<usize>, b: Option<usize>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Tensor { rank, dtype } => match rank {
                Some(rank) => write!(f, "Tensor[ndim={rank}, {dtype}]"),
                None => write!(f, "Tensor[_, {dtype}]"),
            },
            Type::Shape { ndim: Some(ndim) } => write!(f, "Shape[{ndim}]"),
            Type::Shape { ndim: None } => f.write_str("Shape"),
            Type::Object => f.write_str("Object"),
            Type::Tuple(fields) => {
                f.write_str("(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{field}")?;
                }
                f.write_str(")")
            }
        }
    }
}
