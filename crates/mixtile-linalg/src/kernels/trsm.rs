use mixtile_core::Element;

use super::{op_at, Diagonal, Side, Transpose, Triangle};

/// Triangular solve with multiple right-hand sides.
///
/// Solves `op(A) * X = alpha * B` (left) or `X * op(A) = alpha * B`
/// (right), overwriting the `m x n` matrix `B` with `X`. `A` is `m x m` on
/// the left and `n x n` on the right; only the `uplo` triangle is read.
/// With `alpha == 0`, `B` is zeroed and `A` is not read.
#[allow(clippy::too_many_arguments)]
pub fn trsm<T: Element>(
    side: Side,
    uplo: Triangle,
    trans: Transpose,
    diag: Diagonal,
    m: usize,
    n: usize,
    alpha: f64,
    a: &[T],
    lda: usize,
    b: &mut [T],
    ldb: usize,
) {
    if alpha == 0.0 {
        for j in 0..n {
            for i in 0..m {
                b[i + j * ldb] = T::zero();
            }
        }
        return;
    }

    if alpha != 1.0 {
        let alpha = T::from_f64(alpha);
        for j in 0..n {
            for i in 0..m {
                b[i + j * ldb] = alpha * b[i + j * ldb];
            }
        }
    }

    // Transposing swaps which triangle op(A) occupies.
    let lower = (uplo == Triangle::Lower) != trans.is_trans();
    let at = |i: usize, j: usize| op_at(a, lda, trans, i, j);
    let divide = |value: T, pivot: T| match diag {
        Diagonal::NonUnit => value / pivot,
        Diagonal::Unit => value,
    };

    let (order, dim) = match side {
        Side::Left => (lower, m),
        // X * op(A): a lower op(A) couples column j to later columns
        Side::Right => (!lower, n),
    };
    let step = |s: usize| if order { s } else { dim - 1 - s };
    let others = |j: usize| if order { 0..j } else { j + 1..dim };

    match side {
        Side::Left => {
            for col in 0..n {
                let base = col * ldb;
                for s in 0..m {
                    let i = step(s);
                    let mut x = b[base + i];
                    for p in others(i) {
                        x = x - at(i, p) * b[base + p];
                    }
                    b[base + i] = divide(x, at(i, i));
                }
            }
        }
        Side::Right => {
            for row in 0..m {
                for s in 0..n {
                    let j = step(s);
                    let mut x = b[row + j * ldb];
                    for p in others(j) {
                        x = x - b[row + p * ldb] * at(p, j);
                    }
                    b[row + j * ldb] = divide(x, at(j, j));
                }
            }
        }
    }
}
