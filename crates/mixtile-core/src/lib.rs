//! Precision-tagged numeric arrays for mixed-precision computing.
//!
//! Arrays hold half, single or double precision elements in a buffer that
//! can live on the host, on an accelerator, or both. The [`Promoter`] lifts
//! the operands of an operation to a common precision and restores outputs
//! afterwards.
//!
//! # Example
//!
//! ```
//! use mixtile_core::{ops, NumericArray, Precision};
//!
//! let a = NumericArray::from_values(&[1.0, 2.0], Precision::Half);
//! let b = NumericArray::from_values(&[0.5, 0.5], Precision::Double);
//!
//! let sum = ops::add(&a, &b)?.into_value();
//! assert_eq!(sum.precision(), Precision::Double);
//! assert_eq!(sum.to_f64_vec()?, vec![1.5, 2.5]);
//! # Ok::<(), mixtile_core::Error>(())
//! ```

pub use half;

pub mod array;
pub mod buffer;
pub mod config;
pub mod device;
pub mod error;
pub mod ops;
pub mod precision;
pub mod promoter;

pub use array::{Dimensions, NumericArray};
pub use buffer::{BufferHolder, BufferState, HostBuffer, Placement};
pub use config::{
    get_context, get_tolerance_policy, set_context, set_tolerance_policy, Context,
    TolerancePolicy,
};
pub use device::{DeviceMemory, DevicePtr, LoopbackDevice};
pub use error::{Checked, Error, Result, SizeMismatchWarning};
pub use precision::{Element, Precision};
pub use promoter::{PromotedTile, Promoter, TileCache, TileKey};

#[cfg(feature = "cubecl")]
pub use device::CubeclDevice;
