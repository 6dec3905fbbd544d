//! Dense column-major kernels on single tiles.
//!
//! Each kernel works on raw element slices with BLAS-style leading
//! dimensions: element `(i, j)` of a matrix with leading dimension `ld`
//! lives at `i + j * ld`. Arithmetic happens in the element type itself, so
//! calling a kernel on `f16` data gives genuine half-precision results.

mod gemm;
mod potrf;
mod trsm;

pub use gemm::gemm;
pub use potrf::{potrf, PivotFailure};
pub use trsm::trsm;

/// Side parameter for BLAS operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// A appears on the left: op(A) * X
    Left,
    /// A appears on the right: X * op(A)
    Right,
}

/// Triangle type (upper or lower)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Triangle {
    /// Upper triangular
    Upper,
    /// Lower triangular
    Lower,
}

/// Transpose mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transpose {
    /// No transpose
    NoTrans,
    /// Transpose A -> A^T
    Trans,
}

impl Transpose {
    pub fn is_trans(self) -> bool {
        self == Transpose::Trans
    }
}

/// Diagonal type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagonal {
    /// Use diagonal elements of A
    NonUnit,
    /// Assume diagonal elements are 1 (unit triangular)
    Unit,
}

/// Element `(i, j)` of `op(A)`.
#[inline]
pub(crate) fn op_at<T: Copy>(a: &[T], lda: usize, trans: Transpose, i: usize, j: usize) -> T {
    match trans {
        Transpose::NoTrans => a[i + j * lda],
        Transpose::Trans => a[j + i * lda],
    }
}
