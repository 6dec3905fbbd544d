//! Tests for tiled matrix multiply

/// CPU reference: `C = alpha * A * B + beta * C`, column-major, no
/// transposes. `A` is `m x k`, `B` is `k x n`.
#[allow(clippy::too_many_arguments)]
pub fn cpu_gemm(
    m: usize,
    n: usize,
    k: usize,
    alpha: f64,
    a: &[f64],
    b: &[f64],
    beta: f64,
    c: &[f64],
) -> Vec<f64> {
    let mut out = vec![0.0_f64; m * n];
    for j in 0..n {
        for i in 0..m {
            let mut sum = 0.0;
            for p in 0..k {
                sum += a[i + p * m] * b[p + j * k];
            }
            out[i + j * m] = alpha * sum + beta * c[i + j * m];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::gemm::multiply;
    use crate::{LinalgError, LinalgPolicy, TiledMatrix, Transpose};
    use crate::tests::device_tiled;
    use approx::assert_relative_eq;
    use mixtile_core::{BufferState, Context, LoopbackDevice, Precision};
    use std::sync::Arc;

    fn values(matrix: &TiledMatrix) -> Vec<f64> {
        matrix
            .to_array(Precision::Double)
            .unwrap()
            .to_f64_vec()
            .unwrap()
    }

    fn sequence(len: usize, scale: f64) -> Vec<f64> {
        (0..len).map(|i| (i as f64 * scale).sin()).collect()
    }

    #[test]
    fn test_identity_reproduces_b() {
        let n = 4;
        let mut identity = vec![0.0; n * n];
        for i in 0..n {
            identity[i + i * n] = 1.0;
        }
        let b_values = sequence(n * n, 0.7);

        let a = TiledMatrix::new(n, n, 2, 2, &identity, &[Precision::Double; 4]).unwrap();
        let b = TiledMatrix::new(n, n, 2, 2, &b_values, &[Precision::Double; 4]).unwrap();
        let c = TiledMatrix::new(n, n, 2, 2, &vec![f64::NAN; n * n], &[Precision::Double; 4])
            .unwrap();

        let product = multiply(
            Transpose::NoTrans,
            Transpose::NoTrans,
            1.0,
            &a,
            &b,
            0.0,
            &c,
            &LinalgPolicy::default(),
        )
        .unwrap();
        assert_eq!(values(&product), b_values);
    }

    #[test]
    fn test_identity_reproduces_b_at_lower_precisions() {
        let n = 6;
        let mut identity = vec![0.0; n * n];
        for i in 0..n {
            identity[i + i * n] = 1.0;
        }
        let b_values = sequence(n * n, 0.7);

        for precision in [Precision::Half, Precision::Float] {
            let p = [precision; 9];
            let a = TiledMatrix::new(n, n, 2, 2, &identity, &p).unwrap();
            let b = TiledMatrix::new(n, n, 2, 2, &b_values, &p).unwrap();
            let c = TiledMatrix::new(n, n, 2, 2, &vec![f64::NAN; n * n], &p).unwrap();

            let product = multiply(
                Transpose::NoTrans,
                Transpose::NoTrans,
                1.0,
                &a,
                &b,
                0.0,
                &c,
                &LinalgPolicy::default(),
            )
            .unwrap();
            assert_eq!(product.widest_precision(), Some(precision));
            // Only the rounding of B to `precision` remains
            assert_eq!(values(&product), values(&b));
            for (got, want) in values(&product).iter().zip(&b_values) {
                assert_relative_eq!(*got, *want, epsilon = precision.epsilon());
            }
        }
    }

    #[test]
    fn test_device_resident_tiles() {
        let device = Arc::new(LoopbackDevice::new());
        let context = Context::with_device(device.clone());
        {
            let (m, n, k) = (4, 4, 4);
            let a_values = sequence(m * k, 0.3);
            let b_values = sequence(k * n, 0.5);
            let expected = cpu_gemm(m, n, k, 2.0, &a_values, &b_values, 0.0, &[0.0; 16]);

            let a = device_tiled(m, k, 2, &a_values, Precision::Double, &context);
            let b = device_tiled(k, n, 2, &b_values, Precision::Float, &context);
            let c = device_tiled(m, n, 2, &[0.0; 16], Precision::Double, &context);

            let product = multiply(
                Transpose::NoTrans,
                Transpose::NoTrans,
                2.0,
                &a,
                &b,
                0.0,
                &c,
                &LinalgPolicy::default(),
            )
            .unwrap();
            for (got, want) in values(&product).iter().zip(&expected) {
                assert_relative_eq!(*got, *want, epsilon = 1e-5);
            }

            // Reading operands leaves them on the device
            for matrix in [&a, &c] {
                assert_eq!(matrix.tile(1, 1).unwrap().buffer_state(), BufferState::DeviceOnly);
            }
            assert!(device.live_allocations() >= 12);
        }
        assert_eq!(device.live_allocations(), 0);
    }

    #[test]
    fn test_matches_cpu_reference() {
        let (m, n, k) = (4, 6, 8);
        let a_values = sequence(m * k, 0.3);
        let b_values = sequence(k * n, 0.5);
        let c_values = sequence(m * n, 0.9);
        let expected = cpu_gemm(m, n, k, 1.5, &a_values, &b_values, -0.5, &c_values);

        let a = TiledMatrix::new(m, k, 2, 4, &a_values, &[Precision::Double; 4]).unwrap();
        let b = TiledMatrix::new(k, n, 4, 3, &b_values, &[Precision::Double; 4]).unwrap();
        let c = TiledMatrix::new(m, n, 2, 3, &c_values, &[Precision::Double; 4]).unwrap();

        let product = multiply(
            Transpose::NoTrans,
            Transpose::NoTrans,
            1.5,
            &a,
            &b,
            -0.5,
            &c,
            &LinalgPolicy::default(),
        )
        .unwrap();
        for (got, want) in values(&product).iter().zip(&expected) {
            assert_relative_eq!(*got, *want, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_mixed_precision_output_keeps_precision() {
        let (m, n, k) = (4, 4, 4);
        let a_values = sequence(m * k, 0.3);
        let b_values = sequence(k * n, 0.5);
        let expected = cpu_gemm(m, n, k, 1.0, &a_values, &b_values, 0.0, &[0.0; 16]);

        let a = TiledMatrix::new(m, k, 2, 2, &a_values, &[Precision::Half; 4]).unwrap();
        let b = TiledMatrix::new(k, n, 2, 2, &b_values, &[Precision::Double; 4]).unwrap();
        let c_precisions = [
            Precision::Half,
            Precision::Float,
            Precision::Float,
            Precision::Double,
        ];
        let c = TiledMatrix::new(m, n, 2, 2, &[0.0; 16], &c_precisions).unwrap();

        let product = multiply(
            Transpose::NoTrans,
            Transpose::NoTrans,
            1.0,
            &a,
            &b,
            0.0,
            &c,
            &LinalgPolicy::default(),
        )
        .unwrap();
        assert_eq!(
            product.precisions(),
            c_precisions.iter().copied().map(Some).collect::<Vec<_>>()
        );
        // A was rounded to half before the multiply
        for (got, want) in values(&product).iter().zip(&expected) {
            assert_relative_eq!(*got, *want, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_tile_gemm_replaces_output() {
        let a = TiledMatrix::new(2, 2, 1, 1, &[1.0, 2.0, 3.0, 4.0], &[Precision::Float; 4]).unwrap();
        let mut c = TiledMatrix::new(2, 2, 1, 1, &[1.0; 4], &[Precision::Float; 4]).unwrap();
        // C = A^T * A + C
        crate::tile_gemm(Transpose::Trans, Transpose::NoTrans, 1.0, &a, &a, 1.0, &mut c).unwrap();
        assert_eq!(values(&c), vec![6.0, 12.0, 12.0, 26.0]);
    }

    #[test]
    fn test_nonconforming_tiles_write_nothing() {
        let a = TiledMatrix::new(4, 4, 2, 2, &[1.0; 16], &[Precision::Float; 4]).unwrap();
        let b = TiledMatrix::new(4, 4, 1, 1, &[1.0; 16], &vec![Precision::Float; 16]).unwrap();
        let mut c = TiledMatrix::new(4, 4, 2, 2, &[7.0; 16], &[Precision::Float; 4]).unwrap();
        let err = crate::tile_gemm(Transpose::NoTrans, Transpose::NoTrans, 1.0, &a, &b, 0.0, &mut c)
            .unwrap_err();
        assert!(matches!(err, LinalgError::InvalidShape { .. }));
        assert_eq!(values(&c), vec![7.0; 16]);
    }
}
