//! Global policy for tiled linear algebra operations.

use core::fmt;
use std::sync::{PoisonError, RwLock};

use mixtile_core::Precision;
use once_cell::sync::Lazy;

/// Precision at which tile contributions are accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccumulationPolicy {
    /// Widest precision among the operands of each step.
    #[default]
    Promoted,
    /// Widest precision among the operands, raised to at least this one.
    AtLeast(Precision),
}

impl AccumulationPolicy {
    /// Lowest precision a step may compute in.
    pub fn floor(self) -> Precision {
        match self {
            AccumulationPolicy::Promoted => Precision::Half,
            AccumulationPolicy::AtLeast(precision) => precision,
        }
    }
}

impl fmt::Display for AccumulationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccumulationPolicy::Promoted => write!(f, "promoted"),
            AccumulationPolicy::AtLeast(precision) => write!(f, "at least {precision}"),
        }
    }
}

/// Global policy for tiled operations.
///
/// Read once at the start of each operation.
#[derive(Debug, Clone, PartialEq)]
pub struct LinalgPolicy {
    /// Accumulation precision for GEMM, TRSM and trailing updates.
    pub accumulation: AccumulationPolicy,

    /// Verify symmetry before a Cholesky factorization.
    pub check_symmetry: bool,

    /// Absolute tolerance used by the symmetry check.
    pub symmetry_tolerance: f64,
}

impl Default for LinalgPolicy {
    fn default() -> Self {
        Self {
            accumulation: AccumulationPolicy::Promoted,
            check_symmetry: false,
            symmetry_tolerance: 1e-6,
        }
    }
}

static GLOBAL_POLICY: Lazy<RwLock<LinalgPolicy>> =
    Lazy::new(|| RwLock::new(LinalgPolicy::default()));

/// Set the global linear algebra policy.
///
/// # Example
///
/// ```
/// use mixtile_core::Precision;
/// use mixtile_linalg::{get_linalg_policy, set_linalg_policy, AccumulationPolicy, LinalgPolicy};
///
/// set_linalg_policy(LinalgPolicy {
///     accumulation: AccumulationPolicy::AtLeast(Precision::Float),
///     ..LinalgPolicy::default()
/// });
/// assert_eq!(get_linalg_policy().accumulation.floor(), Precision::Float);
/// # set_linalg_policy(LinalgPolicy::default());
/// ```
pub fn set_linalg_policy(policy: LinalgPolicy) {
    *GLOBAL_POLICY
        .write()
        .unwrap_or_else(PoisonError::into_inner) = policy;
}

/// Get the current global linear algebra policy.
pub fn get_linalg_policy() -> LinalgPolicy {
    GLOBAL_POLICY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}
