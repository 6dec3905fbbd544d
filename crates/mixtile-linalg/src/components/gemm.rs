//! Tiled general matrix multiply across mixed-precision tiles.

use mixtile_core::{dispatch_precision, Dimensions, NumericArray, TileCache, TileKey};

use crate::components::step::apply_kernel;
use crate::kernels::{gemm, Transpose};
use crate::{get_linalg_policy, LinalgError, LinalgPolicy, LinalgResult, TiledMatrix};

/// Extents of `op(M)` and of its tiles.
fn op_shape(matrix: &TiledMatrix, trans: Transpose) -> (Dimensions, Dimensions) {
    match trans {
        Transpose::NoTrans => (matrix.dims(), matrix.tile_dims()),
        Transpose::Trans => (matrix.dims().transposed(), matrix.tile_dims().transposed()),
    }
}

/// Tile `(tr, tc)` of `op(M)`, with its cache key.
fn op_tile(
    matrix: &TiledMatrix,
    trans: Transpose,
    tr: usize,
    tc: usize,
) -> LinalgResult<(TileKey, &NumericArray)> {
    let (r, c) = match trans {
        Transpose::NoTrans => (tr, tc),
        Transpose::Trans => (tc, tr),
    };
    Ok((matrix.key(r, c)?, matrix.tile(r, c)?))
}

fn check_shapes(
    transa: Transpose,
    transb: Transpose,
    a: &TiledMatrix,
    b: &TiledMatrix,
    c: &TiledMatrix,
) -> LinalgResult<()> {
    for matrix in [a, b, c] {
        matrix
            .validate()
            .map_err(|err| LinalgError::shape(err.to_string()))?;
    }

    let (ad, at) = op_shape(a, transa);
    let (bd, bt) = op_shape(b, transb);
    let (cd, ct) = (c.dims(), c.tile_dims());
    if ad.rows != cd.rows || bd.cols != cd.cols || ad.cols != bd.rows {
        return Err(LinalgError::shape(format!(
            "Cannot multiply {ad} by {bd} into {cd}"
        )));
    }
    if at.rows != ct.rows || bt.cols != ct.cols || at.cols != bt.rows {
        return Err(LinalgError::shape(format!(
            "Incompatible tiles: {at} by {bt} into {ct}"
        )));
    }
    Ok(())
}

/// Tiled matrix multiply: `C = alpha * op(A) * op(B) + beta * C`.
///
/// For each tile of `C`, the output tile and every tile of `op(A)` and
/// `op(B)` contributing to it are promoted together. All contributions are
/// accumulated at that precision, and the tile is converted back to its
/// stored precision once. `C` is replaced only on success.
///
/// # Errors
///
/// [`LinalgError::InvalidShape`] if the operands do not conform, their
/// tile extents do not line up, or a slot is empty. Nothing is written in
/// that case.
///
/// # Example
///
/// ```
/// use mixtile_core::Precision;
/// use mixtile_linalg::{tile_gemm, TiledMatrix, Transpose};
///
/// let a = TiledMatrix::new(2, 2, 1, 1, &[1.0, 0.0, 0.0, 1.0], &[Precision::Half; 4])?;
/// let b = TiledMatrix::new(2, 2, 1, 1, &[1.0, 2.0, 3.0, 4.0], &[Precision::Double; 4])?;
/// let mut c = TiledMatrix::new(2, 2, 1, 1, &[0.0; 4], &[Precision::Double; 4])?;
///
/// tile_gemm(Transpose::NoTrans, Transpose::NoTrans, 1.0, &a, &b, 0.0, &mut c)?;
/// assert_eq!(c.get_value(1, 1)?, 4.0);
/// # Ok::<(), mixtile_linalg::LinalgError>(())
/// ```
#[tracing::instrument(skip(a, b, c), fields(m = c.rows(), n = c.cols()))]
pub fn tile_gemm(
    transa: Transpose,
    transb: Transpose,
    alpha: f64,
    a: &TiledMatrix,
    b: &TiledMatrix,
    beta: f64,
    c: &mut TiledMatrix,
) -> LinalgResult<()> {
    let product = multiply(transa, transb, alpha, a, b, beta, c, &get_linalg_policy())?;
    *c = product;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn multiply(
    transa: Transpose,
    transb: Transpose,
    alpha: f64,
    a: &TiledMatrix,
    b: &TiledMatrix,
    beta: f64,
    c: &TiledMatrix,
    policy: &LinalgPolicy,
) -> LinalgResult<TiledMatrix> {
    check_shapes(transa, transb, a, b, c)?;

    let (m, n) = (c.tile_dims().rows, c.tile_dims().cols);
    let (op_a_dims, op_a_tile) = op_shape(a, transa);
    let k = op_a_tile.cols;
    let kt = op_a_dims.cols / k;
    let (lda, ldb) = (a.tile_dims().rows, b.tile_dims().rows);
    let floor = policy.accumulation.floor();

    let mut work = c.try_clone()?;
    let mut cache = TileCache::new();

    for tc in 0..work.grid().cols {
        for tr in 0..work.grid().rows {
            let mut inputs = Vec::with_capacity(2 * kt);
            for p in 0..kt {
                inputs.push(op_tile(a, transa, tr, p)?);
                inputs.push(op_tile(b, transb, p, tc)?);
            }

            let key = work.key(tr, tc)?;
            apply_kernel(
                &mut cache,
                &inputs,
                (key, work.tile_mut(tr, tc)?),
                floor,
                |operands, out| {
                    dispatch_precision!(out.precision(), T => {
                        let data = out.values_mut::<T>()?;
                        for (p, pair) in operands.chunks(2).enumerate() {
                            let x = pair[0].values::<T>()?;
                            let y = pair[1].values::<T>()?;
                            let beta = if p == 0 { beta } else { 1.0 };
                            gemm(transa, transb, m, n, k, alpha, &x, lda, &y, ldb, beta, data, m);
                        }
                    });
                    Ok(())
                },
            )?;
        }
    }

    tracing::debug!(tiles = work.grid().len(), cached = cache.len(), "tiled gemm finished");
    Ok(work)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixtile_core::Precision;

    #[test]
    fn test_transposed_operands() {
        // A is 2x4 (stored), op(A) = A^T is 4x2; B is 2x2
        let a_values: Vec<f64> = (1..=8).map(f64::from).collect();
        let a = TiledMatrix::new(2, 4, 2, 2, &a_values, &[Precision::Float; 2]).unwrap();
        let b = TiledMatrix::new(2, 2, 2, 2, &[1.0, 0.0, 0.0, 1.0], &[Precision::Half]).unwrap();
        let c = TiledMatrix::empty(4, 2, 2, 2).unwrap();
        assert!(multiply(
            Transpose::Trans,
            Transpose::NoTrans,
            1.0,
            &a,
            &b,
            0.0,
            &c,
            &LinalgPolicy::default()
        )
        .is_err());

        let c = TiledMatrix::new(4, 2, 2, 2, &[0.0; 8], &[Precision::Double; 2]).unwrap();
        let product = multiply(
            Transpose::Trans,
            Transpose::NoTrans,
            2.0,
            &a,
            &b,
            0.0,
            &c,
            &LinalgPolicy::default(),
        )
        .unwrap();
        // op(A)(r, c) = A(c, r) = a_values[r * 2 + c]
        for r in 0..4 {
            for col in 0..2 {
                assert_eq!(
                    product.get_value(r, col).unwrap(),
                    2.0 * a_values[r * 2 + col]
                );
            }
        }
    }

    #[test]
    fn test_mismatched_inner_dimension() {
        let a = TiledMatrix::new(2, 3, 1, 1, &[1.0; 6], &[Precision::Float; 6]).unwrap();
        let b = TiledMatrix::new(2, 2, 1, 1, &[1.0; 4], &[Precision::Float; 4]).unwrap();
        let c = TiledMatrix::new(2, 2, 1, 1, &[1.0; 4], &[Precision::Float; 4]).unwrap();
        let err = multiply(
            Transpose::NoTrans,
            Transpose::NoTrans,
            1.0,
            &a,
            &b,
            1.0,
            &c,
            &LinalgPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, LinalgError::InvalidShape { .. }));
    }

    #[test]
    fn test_accumulation_spans_contributions() {
        // C = 1 + 1 * 2048 + 1 * 1. Accumulated in half, each +1 is rounded
        // away at 2048; accumulated in float the exact 2050 survives.
        let a = TiledMatrix::new(1, 2, 1, 1, &[1.0, 1.0], &[Precision::Half; 2]).unwrap();
        let b = TiledMatrix::new(2, 1, 1, 1, &[2048.0, 1.0], &[Precision::Half; 2]).unwrap();
        let c = TiledMatrix::new(1, 1, 1, 1, &[1.0], &[Precision::Half]).unwrap();
        let policy = LinalgPolicy {
            accumulation: crate::AccumulationPolicy::AtLeast(Precision::Float),
            ..LinalgPolicy::default()
        };
        let product = multiply(
            Transpose::NoTrans,
            Transpose::NoTrans,
            1.0,
            &a,
            &b,
            1.0,
            &c,
            &policy,
        )
        .unwrap();
        let tile = product.tile(0, 0).unwrap();
        assert_eq!(tile.precision(), Precision::Half);
        // 2048 + 1 + 1 = 2050 is representable in half
        assert_eq!(tile.get(0).unwrap(), 2050.0);

        let product = multiply(
            Transpose::NoTrans,
            Transpose::NoTrans,
            1.0,
            &a,
            &b,
            1.0,
            &c,
            &LinalgPolicy::default(),
        )
        .unwrap();
        // In half: 2048 + 1 -> 2048 (ties to even), then + 1 -> 2048
        assert_eq!(product.tile(0, 0).unwrap().get(0).unwrap(), 2048.0);
    }
}
