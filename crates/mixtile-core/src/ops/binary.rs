//! Elementwise arithmetic and comparison between arrays.
//!
//! Operands of different precision are promoted to the wider one. The
//! shorter operand is reused cyclically up to the length of the longer; a
//! length that does not divide evenly still produces a result, together with
//! a [`SizeMismatchWarning`]. Matrices only combine with operands of their
//! own length, and two matrices must agree on their dimensions.

use crate::config::get_tolerance_policy;
use crate::{
    dispatch_precision, Checked, Dimensions, Element, Error, NumericArray, Promoter, Result,
    SizeMismatchWarning,
};

/// Arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl ArithmeticOp {
    pub(crate) fn apply<T: Element>(self, lhs: T, rhs: T) -> T {
        match self {
            ArithmeticOp::Add => lhs + rhs,
            ArithmeticOp::Sub => lhs - rhs,
            ArithmeticOp::Mul => lhs * rhs,
            ArithmeticOp::Div => lhs / rhs,
            ArithmeticOp::Pow => T::from_f64(lhs.to_f64().powf(rhs.to_f64())),
        }
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl CompareOp {
    fn apply(self, lhs: f64, rhs: f64, tolerance: f64) -> Option<bool> {
        if lhs.is_nan() || rhs.is_nan() {
            return None;
        }
        let equal = (lhs - rhs).abs() <= tolerance;
        Some(match self {
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Eq => equal,
            CompareOp::Ne => !equal,
        })
    }
}

/// Per-element comparison result. `None` where either side was NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub values: Vec<Option<bool>>,
    pub dims: Option<Dimensions>,
}

struct Shape {
    len: usize,
    dims: Option<Dimensions>,
    warning: Option<SizeMismatchWarning>,
}

fn output_shape(lhs: &NumericArray, rhs: &NumericArray) -> Result<Shape> {
    if lhs.is_matrix() || rhs.is_matrix() {
        if lhs.len() != rhs.len() {
            return Err(Error::shape(format!(
                "Matrix operands must have equal length, got {} and {}",
                lhs.len(),
                rhs.len()
            )));
        }
        if let (Some(a), Some(b)) = (lhs.dims(), rhs.dims()) {
            if a != b {
                return Err(Error::shape(format!(
                    "Matrix dimensions differ: {a} and {b}"
                )));
            }
        }
    }

    let longer = lhs.len().max(rhs.len());
    let shorter = lhs.len().min(rhs.len());
    if shorter == 0 {
        return Ok(Shape {
            len: 0,
            dims: None,
            warning: None,
        });
    }

    let warning = (longer % shorter != 0).then_some(SizeMismatchWarning { longer, shorter });
    if let Some(warning) = warning {
        tracing::warn!(%warning, "recycling shorter operand");
    }
    Ok(Shape {
        len: longer,
        dims: lhs.dims().or(rhs.dims()),
        warning,
    })
}

/// `lhs op rhs`, elementwise, at the wider of the two precisions.
pub fn arithmetic(
    lhs: &NumericArray,
    rhs: &NumericArray,
    op: ArithmeticOp,
) -> Result<Checked<NumericArray>> {
    let shape = output_shape(lhs, rhs)?;

    let mut promoter = Promoter::new(2);
    promoter.insert(lhs)?;
    promoter.insert(rhs)?;
    let target = promoter.promote()?;
    let (a, b) = (promoter.operand(0)?, promoter.operand(1)?);

    let mut out = NumericArray::with_context(shape.len, target, lhs.context().clone());
    dispatch_precision!(target, T => {
        let x = a.values::<T>()?;
        let y = b.values::<T>()?;
        for (i, slot) in out.values_mut::<T>()?.iter_mut().enumerate() {
            *slot = op.apply(x[i % x.len()], y[i % y.len()]);
        }
    });
    if let Some(dims) = shape.dims {
        out.to_matrix(dims.rows, dims.cols)?;
    }

    Ok(Checked {
        value: out,
        warning: shape.warning,
    })
}

/// `array op value`, elementwise, keeping the array's precision.
pub fn arithmetic_scalar(array: &NumericArray, value: f64, op: ArithmeticOp) -> Result<NumericArray> {
    let mut out = array.try_clone()?;
    dispatch_precision!(array.precision(), T => {
        let rhs = <T as Element>::from_f64(value);
        for slot in out.values_mut::<T>()? {
            *slot = op.apply(*slot, rhs);
        }
    });
    Ok(out)
}

/// `lhs op rhs`, elementwise, with equality judged by the global
/// [`TolerancePolicy`](crate::TolerancePolicy).
pub fn compare(lhs: &NumericArray, rhs: &NumericArray, op: CompareOp) -> Result<Checked<Comparison>> {
    let shape = output_shape(lhs, rhs)?;
    let tolerance = get_tolerance_policy().tolerance(lhs.precision(), rhs.precision());
    let (x, y) = (lhs.to_f64_vec()?, rhs.to_f64_vec()?);

    let values = (0..shape.len)
        .map(|i| op.apply(x[i % x.len()], y[i % y.len()], tolerance))
        .collect();

    Ok(Checked {
        value: Comparison {
            values,
            dims: shape.dims,
        },
        warning: shape.warning,
    })
}

/// `array op value`, elementwise.
pub fn compare_scalar(array: &NumericArray, value: f64, op: CompareOp) -> Result<Comparison> {
    let tolerance = get_tolerance_policy().tolerance(array.precision(), array.precision());
    let values = array
        .to_f64_vec()?
        .into_iter()
        .map(|v| op.apply(v, value, tolerance))
        .collect();
    Ok(Comparison {
        values,
        dims: array.dims(),
    })
}

macro_rules! arithmetic_fns {
    ($($name:ident, $scalar:ident => $op:ident;)*) => {
        $(
            #[doc = concat!("Elementwise `", stringify!($op), "` of two arrays.")]
            pub fn $name(lhs: &NumericArray, rhs: &NumericArray) -> Result<Checked<NumericArray>> {
                arithmetic(lhs, rhs, ArithmeticOp::$op)
            }

            #[doc = concat!("Elementwise `", stringify!($op), "` with a scalar right operand.")]
            pub fn $scalar(array: &NumericArray, value: f64) -> Result<NumericArray> {
                arithmetic_scalar(array, value, ArithmeticOp::$op)
            }
        )*
    };
}

arithmetic_fns! {
    add, add_scalar => Add;
    sub, sub_scalar => Sub;
    mul, mul_scalar => Mul;
    div, div_scalar => Div;
    pow, pow_scalar => Pow;
}

macro_rules! compare_fns {
    ($($name:ident => $op:ident;)*) => {
        $(
            #[doc = concat!("Elementwise `", stringify!($op), "` comparison.")]
            pub fn $name(lhs: &NumericArray, rhs: &NumericArray) -> Result<Checked<Comparison>> {
                compare(lhs, rhs, CompareOp::$op)
            }
        )*
    };
}

compare_fns! {
    gt => Gt;
    ge => Ge;
    lt => Lt;
    le => Le;
    eq => Eq;
    ne => Ne;
}
