//! # Mixtile linear algebra
//!
//! Tiled dense linear algebra over matrices whose tiles each carry their own
//! precision.
//!
//! ## Features
//!
//! - **Tiled matrices**: column-major grids of half, single or double
//!   precision tiles
//! - **Cholesky factorization**: right-looking, tile by tile
//! - **GEMM**: `C = alpha * op(A) * op(B) + beta * C` across tiles
//! - **TRSM**: left and right triangular solves with BLAS-compatible options
//! - **Mixed precision**: every multi-tile step promotes its operands to a
//!   common precision and writes results back at the stored precision
//!
//! ## Example
//!
//! ```
//! use mixtile_core::Precision;
//! use mixtile_linalg::{tile_cholesky, TiledMatrix};
//!
//! // SPD matrix with a double-precision diagonal and half-precision
//! // off-diagonal tiles
//! let values = [
//!     4.0, 2.0, 0.0, 0.0,
//!     2.0, 5.0, 2.0, 0.0,
//!     0.0, 2.0, 5.0, 2.0,
//!     0.0, 0.0, 2.0, 5.0,
//! ];
//! let mut a = TiledMatrix::new(
//!     4, 4, 2, 2,
//!     &values,
//!     &[Precision::Double, Precision::Half, Precision::Half, Precision::Double],
//! )?;
//! let info = tile_cholesky(&mut a)?;
//! println!("Factorized with quality: {}", info.quality);
//! # Ok::<(), mixtile_linalg::LinalgError>(())
//! ```

mod error;
mod handle;
mod policy;
mod tile;

/// Tiled algorithms
pub mod components;

/// Dense kernels on single tiles
pub mod kernels;

/// CPU references and tests for the tiled operations
#[cfg(any(test, feature = "export_tests"))]
pub mod tests;

pub use error::*;
pub use handle::*;
pub use policy::*;
pub use tile::*;

pub use components::cholesky::*;
pub use components::gemm::*;
pub use components::triangular::*;
pub use kernels::{Diagonal, Side, Transpose, Triangle};
