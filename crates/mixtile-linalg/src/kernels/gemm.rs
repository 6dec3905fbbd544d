use mixtile_core::Element;

use super::{op_at, Transpose};

/// General matrix multiply: `C = alpha * op(A) * op(B) + beta * C`.
///
/// `op(A)` is `m x k`, `op(B)` is `k x n` and `C` is `m x n`. When `beta`
/// is zero, `C` is overwritten without being read, so NaN in the previous
/// contents does not leak into the result.
#[allow(clippy::too_many_arguments)]
pub fn gemm<T: Element>(
    transa: Transpose,
    transb: Transpose,
    m: usize,
    n: usize,
    k: usize,
    alpha: f64,
    a: &[T],
    lda: usize,
    b: &[T],
    ldb: usize,
    beta: f64,
    c: &mut [T],
    ldc: usize,
) {
    let alpha = T::from_f64(alpha);
    let beta_is_zero = beta == 0.0;
    let beta = T::from_f64(beta);

    for j in 0..n {
        for i in 0..m {
            let mut acc = T::zero();
            for p in 0..k {
                acc = acc + op_at(a, lda, transa, i, p) * op_at(b, ldb, transb, p, j);
            }
            let slot = &mut c[i + j * ldc];
            *slot = if beta_is_zero {
                alpha * acc
            } else {
                alpha * acc + beta * *slot
            };
        }
    }
}
