//! Tiled triangular solve with multiple right-hand sides.
//!
//! Solves `op(A) * X = alpha * B` or `X * op(A) = alpha * B` for a tiled
//! triangular `A`, overwriting `B` with `X`. Tiles are solved in dependency
//! order; after each diagonal solve, the tiles that still depend on the
//! freshly computed block are updated with a GEMM:
//!
//! ```text
//! left, op(A) lower (forward):
//!   for k in 0..nt:
//!     B[k,j] = op(A)[k,k] \ (lalpha * B[k,j])                  (TRSM)
//!     B[i,j] = lalpha * B[i,j] - op(A)[i,k] * B[k,j]   i > k   (GEMM)
//! ```
//!
//! `lalpha` is `alpha` at the first step and one afterwards, so every tile
//! of `B` is scaled exactly once. An upper `op(A)` on the left walks
//! backward; on the right the directions are swapped.

use mixtile_core::{dispatch_precision, Precision, TileCache};

use crate::components::step::apply_kernel;
use crate::kernels::{gemm, trsm, Diagonal, Side, Transpose, Triangle};
use crate::{get_linalg_policy, LinalgError, LinalgPolicy, LinalgResult, TiledMatrix};

/// Parameters shared by every step of one solve.
struct Solve {
    side: Side,
    uplo: Triangle,
    trans: Transpose,
    diag: Diagonal,
    /// Extent of a tile of A
    nb: usize,
    /// Extents of a tile of B
    bm: usize,
    bn: usize,
    floor: Precision,
}

impl Solve {
    /// Tile `(tr, tc)` of `op(A)` as a position in `A`.
    fn a_position(&self, tr: usize, tc: usize) -> (usize, usize) {
        match self.trans {
            Transpose::NoTrans => (tr, tc),
            Transpose::Trans => (tc, tr),
        }
    }

    /// `B[tr,tc] = op(A)[k,k] \ (lalpha * B[tr,tc])`, or the right-side
    /// counterpart.
    fn diagonal(
        &self,
        cache: &mut TileCache,
        a: &TiledMatrix,
        k: usize,
        work: &mut TiledMatrix,
        (tr, tc): (usize, usize),
        lalpha: f64,
    ) -> LinalgResult<()> {
        let key = work.key(tr, tc)?;
        apply_kernel(
            cache,
            &[(a.key(k, k)?, a.tile(k, k)?)],
            (key, work.tile_mut(tr, tc)?),
            self.floor,
            |inputs, out| {
                dispatch_precision!(out.precision(), T => {
                    let tri = inputs[0].values::<T>()?;
                    trsm(
                        self.side,
                        self.uplo,
                        self.trans,
                        self.diag,
                        self.bm,
                        self.bn,
                        lalpha,
                        &tri,
                        self.nb,
                        out.values_mut::<T>()?,
                        self.bm,
                    );
                });
                Ok(())
            },
        )?;
        Ok(())
    }

    /// `B[target] = lalpha * B[target] - op(A)[a_block] * X[solved]` on the
    /// left, `lalpha * B[target] - X[solved] * op(A)[a_block]` on the right.
    #[allow(clippy::too_many_arguments)]
    fn update(
        &self,
        cache: &mut TileCache,
        a: &TiledMatrix,
        a_block: (usize, usize),
        work: &mut TiledMatrix,
        solved: (usize, usize),
        target: (usize, usize),
        lalpha: f64,
    ) -> LinalgResult<()> {
        let (ar, ac) = self.a_position(a_block.0, a_block.1);
        let a_input = (a.key(ar, ac)?, a.tile(ar, ac)?);
        let solved_key = work.key(solved.0, solved.1)?;
        let key = work.key(target.0, target.1)?;

        work.update_tile(target.0, target.1, |tile, rest| {
            apply_kernel(
                cache,
                &[a_input, (solved_key, rest.tile(solved.0, solved.1)?)],
                (key, tile),
                self.floor,
                |inputs, out| {
                    dispatch_precision!(out.precision(), T => {
                        let tri = inputs[0].values::<T>()?;
                        let x = inputs[1].values::<T>()?;
                        let c = out.values_mut::<T>()?;
                        match self.side {
                            Side::Left => gemm(
                                self.trans,
                                Transpose::NoTrans,
                                self.bm,
                                self.bn,
                                self.nb,
                                -1.0,
                                &tri,
                                self.nb,
                                &x,
                                self.bm,
                                lalpha,
                                c,
                                self.bm,
                            ),
                            Side::Right => gemm(
                                Transpose::NoTrans,
                                self.trans,
                                self.bm,
                                self.bn,
                                self.nb,
                                -1.0,
                                &x,
                                self.bm,
                                &tri,
                                self.nb,
                                lalpha,
                                c,
                                self.bm,
                            ),
                        }
                    });
                    Ok(())
                },
            )?;
            Ok::<_, LinalgError>(())
        })
    }
}

fn check_shapes(side: Side, a: &TiledMatrix, b: &TiledMatrix) -> LinalgResult<()> {
    for matrix in [a, b] {
        matrix
            .validate()
            .map_err(|err| LinalgError::shape(err.to_string()))?;
    }
    if !a.dims().is_square() || !a.tile_dims().is_square() {
        return Err(LinalgError::shape(format!(
            "Triangular matrix must be square with square tiles, got {} in {} tiles",
            a.dims(),
            a.tile_dims()
        )));
    }

    let (extent, tile) = match side {
        Side::Left => (b.rows(), b.tile_dims().rows),
        Side::Right => (b.cols(), b.tile_dims().cols),
    };
    if a.rows() != extent || a.tile_dims().rows != tile {
        return Err(LinalgError::shape(format!(
            "Triangular {} ({} tiles) does not conform to right-hand side {} ({} tiles) on the {:?} side",
            a.dims(),
            a.tile_dims(),
            b.dims(),
            b.tile_dims(),
            side
        )));
    }
    Ok(())
}

/// Tiled triangular solve, overwriting `b` with `X`.
///
/// # Arguments
///
/// * `side` - Whether `op(A)` multiplies `X` from the left or the right
/// * `uplo` - Which triangle of `a` holds the matrix
/// * `trans` - Whether to use `A` or `A^T`
/// * `diag` - Whether the diagonal of `A` is taken as one
/// * `alpha` - Scale applied to `B`
///
/// With `alpha == 0`, `b` is zeroed without reading `a`.
///
/// # Errors
///
/// [`LinalgError::InvalidShape`] if `a` is not square with square tiles,
/// its tiles do not match those of `b` along the solved dimension, or a
/// slot is empty. `b` is replaced only on success.
///
/// # Example
///
/// ```
/// use mixtile_core::Precision;
/// use mixtile_linalg::{tile_trsm, Diagonal, Side, TiledMatrix, Transpose, Triangle};
///
/// // L = [[2, 0], [1, 4]]
/// let l = TiledMatrix::new(2, 2, 1, 1, &[2.0, 1.0, 0.0, 4.0], &[Precision::Double; 4])?;
/// let mut b = TiledMatrix::new(2, 1, 1, 1, &[2.0, 9.0], &[Precision::Float; 2])?;
///
/// tile_trsm(Side::Left, Triangle::Lower, Transpose::NoTrans, Diagonal::NonUnit, 1.0, &l, &mut b)?;
/// assert_eq!(b.get_value(0, 0)?, 1.0);
/// assert_eq!(b.get_value(1, 0)?, 2.0);
/// # Ok::<(), mixtile_linalg::LinalgError>(())
/// ```
#[tracing::instrument(skip(a, b), fields(n = a.rows(), rhs = %b.dims()))]
pub fn tile_trsm(
    side: Side,
    uplo: Triangle,
    trans: Transpose,
    diag: Diagonal,
    alpha: f64,
    a: &TiledMatrix,
    b: &mut TiledMatrix,
) -> LinalgResult<()> {
    let solution = solve(side, uplo, trans, diag, alpha, a, b, &get_linalg_policy())?;
    *b = solution;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn solve(
    side: Side,
    uplo: Triangle,
    trans: Transpose,
    diag: Diagonal,
    alpha: f64,
    a: &TiledMatrix,
    b: &TiledMatrix,
    policy: &LinalgPolicy,
) -> LinalgResult<TiledMatrix> {
    check_shapes(side, a, b)?;

    let plan = Solve {
        side,
        uplo,
        trans,
        diag,
        nb: a.tile_dims().rows,
        bm: b.tile_dims().rows,
        bn: b.tile_dims().cols,
        floor: policy.accumulation.floor(),
    };
    let nt = a.grid().rows;
    let lower = (uplo == Triangle::Lower) != trans.is_trans();
    let forward = match side {
        Side::Left => lower,
        Side::Right => !lower,
    };
    let order: Vec<usize> = if forward {
        (0..nt).collect()
    } else {
        (0..nt).rev().collect()
    };

    let mut work = b.try_clone()?;
    if alpha == 0.0 {
        for tc in 0..work.grid().cols {
            for tr in 0..work.grid().rows {
                work.map_tile(tr, tc, |_, _, _| 0.0)?;
            }
        }
        return Ok(work);
    }
    let mut cache = TileCache::new();

    for (step, &k) in order.iter().enumerate() {
        let lalpha = if step == 0 { alpha } else { 1.0 };
        let pending = &order[step + 1..];
        match side {
            Side::Left => {
                for j in 0..work.grid().cols {
                    plan.diagonal(&mut cache, a, k, &mut work, (k, j), lalpha)?;
                }
                for &i in pending {
                    for j in 0..work.grid().cols {
                        plan.update(&mut cache, a, (i, k), &mut work, (k, j), (i, j), lalpha)?;
                    }
                }
            }
            Side::Right => {
                for i in 0..work.grid().rows {
                    plan.diagonal(&mut cache, a, k, &mut work, (i, k), lalpha)?;
                }
                for &j in pending {
                    for i in 0..work.grid().rows {
                        plan.update(&mut cache, a, (k, j), &mut work, (i, k), (i, j), lalpha)?;
                    }
                }
            }
        }
    }

    tracing::debug!(steps = nt, cached = cache.len(), "tiled trsm finished");
    Ok(work)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn lower() -> TiledMatrix {
        // L = [[2, 0, 0, 0], [1, 3, 0, 0], [0, 1, 4, 0], [1, 0, 2, 5]]
        let values = [
            2.0, 1.0, 0.0, 1.0, //
            0.0, 3.0, 1.0, 0.0, //
            0.0, 0.0, 4.0, 2.0, //
            0.0, 0.0, 0.0, 5.0,
        ];
        TiledMatrix::new(
            4,
            4,
            2,
            2,
            &values,
            &[Precision::Double, Precision::Float, Precision::Half, Precision::Double],
        )
        .unwrap()
    }

    fn dense(matrix: &TiledMatrix) -> Vec<f64> {
        matrix.to_array(Precision::Double).unwrap().to_f64_vec().unwrap()
    }

    /// `op(L) * X` (left) or `X * op(L)` (right) on column-major 4x4 `L`.
    fn apply(l: &[f64], x: &[f64], side: Side, trans: Transpose, rows: usize, cols: usize) -> Vec<f64> {
        let op = |i: usize, j: usize| match trans {
            Transpose::NoTrans => l[i + j * 4],
            Transpose::Trans => l[j + i * 4],
        };
        let mut out = vec![0.0; rows * cols];
        for c in 0..cols {
            for r in 0..rows {
                out[r + c * rows] = match side {
                    Side::Left => (0..4).map(|p| op(r, p) * x[p + c * rows]).sum(),
                    Side::Right => (0..4).map(|p| x[r + p * rows] * op(p, c)).sum(),
                };
            }
        }
        out
    }

    #[test]
    fn test_all_sides_and_transposes() {
        let a = lower();
        let l = dense(&a);
        for side in [Side::Left, Side::Right] {
            for trans in [Transpose::NoTrans, Transpose::Trans] {
                let (rows, cols) = match side {
                    Side::Left => (4, 2),
                    Side::Right => (2, 4),
                };
                let x: Vec<f64> = (0..8).map(|v| f64::from(v) - 3.0).collect();
                let rhs: Vec<f64> = apply(&l, &x, side, trans, rows, cols)
                    .into_iter()
                    .map(|v| v / 2.0)
                    .collect();
                let b = TiledMatrix::new(rows, cols, 2, 2, &rhs, &[Precision::Double; 2]).unwrap();

                let solution = solve(
                    side,
                    Triangle::Lower,
                    trans,
                    Diagonal::NonUnit,
                    2.0,
                    &a,
                    &b,
                    &LinalgPolicy::default(),
                )
                .unwrap();
                for (got, want) in dense(&solution).iter().zip(&x) {
                    assert_relative_eq!(*got, *want, epsilon = 1e-2);
                }
            }
        }
    }

    #[test]
    fn test_upper_unit_diagonal() {
        // U = [[1, 2], [0, 1]] with a junk diagonal that must be ignored
        let u = TiledMatrix::new(2, 2, 1, 1, &[9.0, 0.0, 2.0, 9.0], &[Precision::Float; 4]).unwrap();
        // U * x = [5, 2] -> x = [1, 2]
        let b = TiledMatrix::new(2, 1, 1, 1, &[5.0, 2.0], &[Precision::Float; 2]).unwrap();
        let x = solve(
            Side::Left,
            Triangle::Upper,
            Transpose::NoTrans,
            Diagonal::Unit,
            1.0,
            &u,
            &b,
            &LinalgPolicy::default(),
        )
        .unwrap();
        assert_eq!(dense(&x), vec![1.0, 2.0]);
    }

    #[test]
    fn test_zero_alpha_ignores_singular_a() {
        let a = TiledMatrix::new(4, 4, 2, 2, &[0.0; 16], &[Precision::Float; 4]).unwrap();
        let b = TiledMatrix::new(4, 2, 2, 2, &[3.0; 8], &[Precision::Half, Precision::Double]).unwrap();
        for trans in [Transpose::NoTrans, Transpose::Trans] {
            let x = solve(
                Side::Left,
                Triangle::Upper,
                trans,
                Diagonal::NonUnit,
                0.0,
                &a,
                &b,
                &LinalgPolicy::default(),
            )
            .unwrap();
            assert_eq!(dense(&x), vec![0.0; 8]);
            assert_eq!(x.precisions(), b.precisions());
        }
    }

    #[test]
    fn test_nonconforming_rhs() {
        let a = lower();
        let b = TiledMatrix::new(3, 2, 1, 1, &[1.0; 6], &[Precision::Float; 6]).unwrap();
        assert!(matches!(
            solve(
                Side::Left,
                Triangle::Lower,
                Transpose::NoTrans,
                Diagonal::NonUnit,
                1.0,
                &a,
                &b,
                &LinalgPolicy::default()
            ),
            Err(LinalgError::InvalidShape { .. })
        ));
    }
}
