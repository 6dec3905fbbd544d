//! Tiled algorithms built from the single-tile kernels.

pub mod cholesky;
pub mod gemm;
pub mod triangular;

mod step;
