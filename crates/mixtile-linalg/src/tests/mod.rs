//! Test infrastructure and utilities.

pub mod gemm_tests;

// Re-export CPU references for use in other tests
pub use cholesky_tests::{cpu_cholesky, spd_matrix};
pub use gemm_tests::cpu_gemm;
pub use trsm_tests::{cpu_lower_solve, cpu_trsm};

/// Tiled matrix whose `nb x nb` tiles live only on the device of `context`.
#[cfg(test)]
pub(crate) fn device_tiled(
    rows: usize,
    cols: usize,
    nb: usize,
    values: &[f64],
    precision: mixtile_core::Precision,
    context: &mixtile_core::Context,
) -> crate::TiledMatrix {
    use mixtile_core::{BufferState, NumericArray, Placement};

    let mut tiled = crate::TiledMatrix::empty(rows, cols, nb, nb).unwrap();
    for tc in 0..cols / nb {
        for tr in 0..rows / nb {
            let tile_values: Vec<f64> = (0..nb * nb)
                .map(|i| values[(tr * nb + i % nb) + (tc * nb + i / nb) * rows])
                .collect();
            let mut tile = NumericArray::with_context(nb * nb, precision, context.clone());
            tile.set_values(&tile_values).unwrap();
            tile.to_matrix(nb, nb).unwrap();
            tile.sync(Placement::Device).unwrap();
            tile.free_memory(Placement::Host).unwrap();
            assert_eq!(tile.buffer_state(), BufferState::DeviceOnly);
            tiled.insert_tile(tile, tr, tc).unwrap();
        }
    }
    tiled
}
