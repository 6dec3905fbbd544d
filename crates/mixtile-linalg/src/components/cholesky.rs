//! Tiled Cholesky factorization for mixed-precision SPD matrices.
//!
//! ## Algorithm
//!
//! Right-looking factorization over the diagonal tiles of an `nt x nt` grid.
//! Only the lower triangle of the input is read.
//!
//! ```text
//! for k in 0..nt:
//!   1. A[k,k] = potrf(A[k,k])                  in the tile's own precision
//!   2. A[i,k] = A[i,k] * inv(A[k,k])^T         i > k          (TRSM)
//!   3. A[i,j] -= A[i,k] * A[j,k]^T             i >= j > k     (SYRK / GEMM)
//! ```
//!
//! Steps 2 and 3 combine tiles of different precisions. Each of them runs
//! through a [`Promoter`](mixtile_core::Promoter): the operands are lifted to
//! the widest precision among them (or the policy floor), the kernel runs,
//! and the updated tile goes back to its stored precision. Promoted copies of
//! finished panel tiles are cached and reused by every update that reads
//! them.
//!
//! ## References
//!
//! - Buttari, Langou, Kurzak, Dongarra: "A class of parallel tiled linear
//!   algebra algorithms for multicore architectures" (2009)
//! - LAPACK: DPOTRF

use mixtile_core::{dispatch_precision, TileCache};

use crate::components::step::apply_kernel;
use crate::kernels::{gemm, potrf, trsm, Diagonal, Side, Transpose, Triangle};
use crate::{get_linalg_policy, LinalgError, LinalgPolicy, LinalgResult, SolveInfo, TiledMatrix};

/// Cholesky factorization in place: `A = L * L^T`.
///
/// On success `matrix` holds the lower factor `L` with the strict upper
/// triangle zeroed, every tile keeping its precision. On failure `matrix`
/// is left unchanged.
///
/// # Arguments
///
/// * `matrix` - Square tiled matrix with square tiles
///
/// # Returns
///
/// Diagnostic information with a condition estimate taken from the
/// factor's diagonal.
///
/// # Errors
///
/// * [`LinalgError::InvalidShape`] if the matrix or its tiles are not square
///   or a slot is empty
/// * [`LinalgError::NotSymmetric`] if the policy asks for a symmetry check
///   and it fails
/// * [`LinalgError::NotSpd`] on a non-positive pivot, with its global index
///
/// # Example
///
/// ```
/// use mixtile_core::Precision;
/// use mixtile_linalg::{tile_cholesky, TiledMatrix};
///
/// let values = [4.0, 2.0, 2.0, 3.0];
/// let mut a = TiledMatrix::new(2, 2, 1, 1, &values, &[Precision::Double; 4])?;
/// let info = tile_cholesky(&mut a)?;
/// assert_eq!(a.get_value(0, 0)?, 2.0);
/// assert_eq!(a.get_value(0, 1)?, 0.0);
/// assert_eq!(info.steps, 2);
/// # Ok::<(), mixtile_linalg::LinalgError>(())
/// ```
#[tracing::instrument(skip(matrix), fields(n = matrix.rows(), tile = %matrix.tile_dims()))]
pub fn tile_cholesky(matrix: &mut TiledMatrix) -> LinalgResult<SolveInfo> {
    let (factor, info) = factorize(matrix, &get_linalg_policy())?;
    *matrix = factor;
    Ok(info)
}

/// Cholesky factorization into a new tiled matrix, leaving `matrix` as is.
///
/// See [`tile_cholesky`] for the result layout and errors.
#[tracing::instrument(skip(matrix), fields(n = matrix.rows(), tile = %matrix.tile_dims()))]
pub fn tile_cholesky_copy(matrix: &TiledMatrix) -> LinalgResult<(TiledMatrix, SolveInfo)> {
    factorize(matrix, &get_linalg_policy())
}

fn check_square(matrix: &TiledMatrix) -> LinalgResult<()> {
    matrix
        .validate()
        .map_err(|err| LinalgError::shape(err.to_string()))?;
    if !matrix.dims().is_square() {
        return Err(LinalgError::shape(format!(
            "Cholesky requires a square matrix, got {}",
            matrix.dims()
        )));
    }
    if !matrix.tile_dims().is_square() {
        return Err(LinalgError::shape(format!(
            "Cholesky requires square tiles, got {}",
            matrix.tile_dims()
        )));
    }
    Ok(())
}

fn check_symmetric(matrix: &TiledMatrix, tolerance: f64) -> LinalgResult<()> {
    let n = matrix.rows();
    for col in 0..n {
        for row in col + 1..n {
            let diff = (matrix.get_value(row, col)? - matrix.get_value(col, row)?).abs();
            if !(diff <= tolerance) {
                return Err(LinalgError::NotSymmetric { row, col });
            }
        }
    }
    Ok(())
}

/// Factor the diagonal tile `k` in place, in its own precision.
fn factor_diagonal(work: &mut TiledMatrix, k: usize, nb: usize) -> LinalgResult<()> {
    let tile = work.tile_mut(k, k)?;
    dispatch_precision!(tile.precision(), T => {
        potrf(nb, tile.values_mut::<T>()?, nb).map_err(|failure| LinalgError::NotSpd {
            index: k * nb + failure.index,
            value: failure.value,
        })
    })
}

pub(crate) fn factorize(
    matrix: &TiledMatrix,
    policy: &LinalgPolicy,
) -> LinalgResult<(TiledMatrix, SolveInfo)> {
    check_square(matrix)?;
    if policy.check_symmetry {
        check_symmetric(matrix, policy.symmetry_tolerance)?;
    }

    let mut work = matrix.try_clone()?;
    let nt = work.grid().rows;
    let nb = work.tile_dims().rows;
    let floor = policy.accumulation.floor();
    let mut cache = TileCache::new();
    let mut promoted = false;

    for k in 0..nt {
        factor_diagonal(&mut work, k, nb)?;
        cache.invalidate(work.key(k, k)?);

        let diag_key = work.key(k, k)?;
        for i in k + 1..nt {
            let key = work.key(i, k)?;
            promoted |= work.update_tile(i, k, |tile, rest| {
                let original = tile.precision();
                let target = apply_kernel(
                    &mut cache,
                    &[(diag_key, rest.tile(k, k)?)],
                    (key, tile),
                    floor,
                    |inputs, out| {
                        dispatch_precision!(out.precision(), T => {
                            let l = inputs[0].values::<T>()?;
                            trsm(
                                Side::Right,
                                Triangle::Lower,
                                Transpose::Trans,
                                Diagonal::NonUnit,
                                nb,
                                nb,
                                1.0,
                                &l,
                                nb,
                                out.values_mut::<T>()?,
                                nb,
                            );
                        });
                        Ok(())
                    },
                )?;
                Ok::<_, LinalgError>(target != original)
            })?;
        }

        for j in k + 1..nt {
            for i in j..nt {
                let (left_key, right_key, key) = (work.key(i, k)?, work.key(j, k)?, work.key(i, j)?);
                promoted |= work.update_tile(i, j, |tile, rest| {
                    let original = tile.precision();
                    let target = apply_kernel(
                        &mut cache,
                        &[(left_key, rest.tile(i, k)?), (right_key, rest.tile(j, k)?)],
                        (key, tile),
                        floor,
                        |inputs, out| {
                            dispatch_precision!(out.precision(), T => {
                                let left = inputs[0].values::<T>()?;
                                let right = inputs[1].values::<T>()?;
                                gemm(
                                    Transpose::NoTrans,
                                    Transpose::Trans,
                                    nb,
                                    nb,
                                    nb,
                                    -1.0,
                                    &left,
                                    nb,
                                    &right,
                                    nb,
                                    1.0,
                                    out.values_mut::<T>()?,
                                    nb,
                                );
                            });
                            Ok(())
                        },
                    )?;
                    Ok::<_, LinalgError>(target != original)
                })?;
            }
        }
    }

    // Only the lower triangle was computed.
    for j in 0..nt {
        for i in 0..j {
            work.map_tile(i, j, |_, _, _| 0.0)?;
        }
        work.tile_mut(j, j)?.fill_triangle(0.0, true)?;
    }

    let mut info = SolveInfo::new()
        .with_condition(diagonal_condition(&work, nb)?)
        .with_steps(nt);
    if promoted {
        info = info.with_promotion();
    }
    tracing::debug!(%info, "tiled cholesky finished");
    Ok((work, info))
}

/// `(max / min)^2` over the factor's diagonal, a cheap lower bound on the
/// 2-norm condition number of `A`.
fn diagonal_condition(factor: &TiledMatrix, nb: usize) -> LinalgResult<f64> {
    let mut max = f64::MIN;
    let mut min = f64::MAX;
    for k in 0..factor.grid().rows {
        let tile = factor.tile(k, k)?;
        for d in 0..nb {
            let value = tile.get_matrix(d, d)?;
            max = max.max(value);
            min = min.min(value);
        }
    }
    Ok((max / min).powi(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mixtile_core::Precision;

    #[test]
    fn test_single_tile() {
        let values = [4.0, 2.0, 2.0, 3.0];
        let matrix = TiledMatrix::new(2, 2, 2, 2, &values, &[Precision::Double]).unwrap();
        let (factor, info) = factorize(&matrix, &LinalgPolicy::default()).unwrap();

        assert_relative_eq!(factor.get_value(0, 0).unwrap(), 2.0);
        assert_relative_eq!(factor.get_value(1, 0).unwrap(), 1.0);
        assert_relative_eq!(factor.get_value(1, 1).unwrap(), 2.0f64.sqrt());
        assert_eq!(factor.get_value(0, 1).unwrap(), 0.0);
        assert_eq!(info.steps, 1);
        assert!(!info.was_promoted);
        assert_relative_eq!(info.condition_estimate.unwrap(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_rectangular_tiles() {
        let matrix = TiledMatrix::new(2, 2, 2, 1, &[1.0, 0.0, 0.0, 1.0], &[Precision::Float; 2])
            .unwrap();
        assert!(matches!(
            factorize(&matrix, &LinalgPolicy::default()),
            Err(LinalgError::InvalidShape { .. })
        ));

        let empty = TiledMatrix::empty(2, 2, 1, 1).unwrap();
        assert!(matches!(
            factorize(&empty, &LinalgPolicy::default()),
            Err(LinalgError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_symmetry_check() {
        let values = [4.0, 2.0, 1.0, 3.0];
        let matrix = TiledMatrix::new(2, 2, 1, 1, &values, &[Precision::Double; 4]).unwrap();
        let policy = LinalgPolicy {
            check_symmetry: true,
            ..LinalgPolicy::default()
        };
        assert_eq!(
            factorize(&matrix, &policy).unwrap_err(),
            LinalgError::NotSymmetric { row: 1, col: 0 }
        );
        // Without the check only the lower triangle is read.
        assert!(factorize(&matrix, &LinalgPolicy::default()).is_ok());
    }

    #[test]
    fn test_promotion_is_reported() {
        let values = [4.0, 2.0, 2.0, 3.0];
        let matrix = TiledMatrix::new(
            2,
            2,
            1,
            1,
            &values,
            &[Precision::Double, Precision::Half, Precision::Half, Precision::Double],
        )
        .unwrap();
        let (factor, info) = factorize(&matrix, &LinalgPolicy::default()).unwrap();
        assert!(info.was_promoted);
        assert_eq!(factor.tile(1, 0).unwrap().precision(), Precision::Half);
        assert_eq!(factor.get_value(1, 0).unwrap(), 1.0);
    }
}
