//! Operations over whole arrays.

pub mod basic;
pub mod binary;

pub use basic::{
    apply_center, apply_scale, column_bind, concatenate, concatenate_at, diagonal, min_max,
    na_exclude, na_replace, replicate, row_bind, sweep, Margin,
};
pub use binary::{
    add, add_scalar, arithmetic, arithmetic_scalar, compare, compare_scalar, div, div_scalar, eq,
    ge, gt, le, lt, mul, mul_scalar, ne, pow, pow_scalar, sub, sub_scalar, ArithmeticOp,
    CompareOp, Comparison,
};
