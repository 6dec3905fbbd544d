//! Precision tags and the element types behind them.
//!
//! Every array carries a [`Precision`] tag that decides how its bytes are
//! interpreted. Code that works on the elements is written once, generic over
//! [`Element`], and instantiated per tag with [`dispatch_precision!`]:
//!
//! ```
//! use mixtile_core::{dispatch_precision, Element, Precision};
//!
//! fn width_of(precision: Precision) -> usize {
//!     dispatch_precision!(precision, T => core::mem::size_of::<T>())
//! }
//!
//! assert_eq!(width_of(Precision::Half), 2);
//! ```

use core::fmt;
use core::ops::{Add, Div, Mul, Neg, Sub};
use core::str::FromStr;

use bytemuck::Pod;
use half::f16;

use crate::{Error, Result};

/// Instantiate an expression once per precision.
///
/// Binds the element type of `$precision` to the identifier `$t` inside
/// `$body`. Every arm must evaluate to the same type.
#[macro_export]
macro_rules! dispatch_precision {
    ($precision:expr, $t:ident => $body:expr) => {
        match $precision {
            $crate::Precision::Half => {
                #[allow(dead_code)]
                type $t = $crate::half::f16;
                $body
            }
            $crate::Precision::Float => {
                #[allow(dead_code)]
                type $t = f32;
                $body
            }
            $crate::Precision::Double => {
                #[allow(dead_code)]
                type $t = f64;
                $body
            }
        }
    };
}

/// Element width of a numeric array.
///
/// Ordered by width, so `max` over a set of precisions yields the one every
/// operand can be promoted to without loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Precision {
    /// IEEE 754 binary16
    Half,
    /// IEEE 754 binary32
    Float,
    /// IEEE 754 binary64
    Double,
}

impl Precision {
    /// All precisions, narrowest first.
    pub const ALL: [Precision; 3] = [Precision::Half, Precision::Float, Precision::Double];

    /// Size of one element in bytes.
    pub const fn width(self) -> usize {
        match self {
            Precision::Half => 2,
            Precision::Float => 4,
            Precision::Double => 8,
        }
    }

    /// Lowercase name, as accepted by [`FromStr`].
    pub const fn name(self) -> &'static str {
        match self {
            Precision::Half => "half",
            Precision::Float => "float",
            Precision::Double => "double",
        }
    }

    /// Integer code used by the serialized format (1, 2, 3).
    pub const fn code(self) -> u64 {
        match self {
            Precision::Half => 1,
            Precision::Float => 2,
            Precision::Double => 3,
        }
    }

    /// Inverse of [`Precision::code`].
    pub fn from_code(code: u64) -> Result<Self> {
        match code {
            1 => Ok(Precision::Half),
            2 => Ok(Precision::Float),
            3 => Ok(Precision::Double),
            other => Err(Error::UnknownPrecision(other.to_string())),
        }
    }

    /// Machine epsilon of the element type.
    pub fn epsilon(self) -> f64 {
        dispatch_precision!(self, T => T::epsilon())
    }

    /// Widest of a set of precisions, `None` for an empty set.
    pub fn widest<I: IntoIterator<Item = Precision>>(precisions: I) -> Option<Precision> {
        precisions.into_iter().max()
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Precision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "half" | "16" => Ok(Precision::Half),
            "float" | "single" | "32" => Ok(Precision::Float),
            "double" | "64" => Ok(Precision::Double),
            _ => Err(Error::UnknownPrecision(s.to_string())),
        }
    }
}

/// Numeric element stored in an array.
///
/// Implemented for `half::f16`, `f32` and `f64`. Arithmetic happens in the
/// element's own type; `f64` is only the interchange format for scalar
/// get/set.
pub trait Element:
    Pod
    + PartialOrd
    + fmt::Debug
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    /// Tag of this element type.
    const PRECISION: Precision;

    /// Native narrowing/widening cast from `f64`.
    fn from_f64(value: f64) -> Self;

    /// Widening cast to `f64`.
    fn to_f64(self) -> f64;

    /// Machine epsilon as `f64`.
    fn epsilon() -> f64;

    /// Whether the bit pattern encodes NaN.
    fn is_nan(self) -> bool;

    /// Square root, rounded to this precision.
    fn sqrt(self) -> Self;

    /// Additive identity.
    fn zero() -> Self {
        Self::from_f64(0.0)
    }

    /// Multiplicative identity.
    fn one() -> Self {
        Self::from_f64(1.0)
    }

    /// Absolute value.
    fn abs(self) -> Self {
        if self < Self::zero() {
            -self
        } else {
            self
        }
    }

    /// Convert from another element type through `f64`.
    fn cast_from<S: Element>(value: S) -> Self {
        Self::from_f64(value.to_f64())
    }
}

impl Element for f16 {
    const PRECISION: Precision = Precision::Half;

    fn from_f64(value: f64) -> Self {
        f16::from_f64(value)
    }

    fn to_f64(self) -> f64 {
        f16::to_f64(self)
    }

    fn epsilon() -> f64 {
        f16::EPSILON.to_f64()
    }

    fn is_nan(self) -> bool {
        f16::is_nan(self)
    }

    fn sqrt(self) -> Self {
        f16::from_f32(self.to_f32().sqrt())
    }
}

impl Element for f32 {
    const PRECISION: Precision = Precision::Float;

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn epsilon() -> f64 {
        f32::EPSILON as f64
    }

    fn is_nan(self) -> bool {
        f32::is_nan(self)
    }

    fn sqrt(self) -> Self {
        f32::sqrt(self)
    }
}

impl Element for f64 {
    const PRECISION: Precision = Precision::Double;

    fn from_f64(value: f64) -> Self {
        value
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn epsilon() -> f64 {
        f64::EPSILON
    }

    fn is_nan(self) -> bool {
        f64::is_nan(self)
    }

    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }
}
