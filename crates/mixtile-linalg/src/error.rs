//! Error types and diagnostic information for tiled linear algebra.

use core::fmt;
use thiserror::Error;

/// Errors that can occur during tiled linear algebra operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinalgError {
    /// Factorization met a non-positive pivot.
    #[error("Matrix is not symmetric positive definite: pivot {index} is {value}")]
    NotSpd {
        /// Global row/column of the failing pivot
        index: usize,
        /// Pivot value before the square root
        value: f64,
    },

    /// Invalid matrix or tile shape.
    #[error("Invalid shape: {reason}")]
    InvalidShape {
        /// Description of the shape error
        reason: String,
    },

    /// Input is not symmetric within the configured tolerance.
    #[error("Matrix is not symmetric at ({row}, {col})")]
    NotSymmetric {
        /// Row of the first mismatching element
        row: usize,
        /// Column of the first mismatching element
        col: usize,
    },

    /// Array, buffer or promoter failure.
    #[error(transparent)]
    Core(#[from] mixtile_core::Error),
}

impl LinalgError {
    pub(crate) fn shape(reason: impl Into<String>) -> Self {
        LinalgError::InvalidShape {
            reason: reason.into(),
        }
    }
}

/// Result type for tiled linear algebra operations.
pub type LinalgResult<T> = Result<T, LinalgError>;

/// Quality indicator for numerical solve results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveQuality {
    /// High confidence in accuracy (condition < 1e6).
    Excellent,
    /// Acceptable, but monitor residuals (condition < 1e10).
    Good,
    /// Numerically challenging, use with caution (condition >= 1e10).
    Marginal,
}

impl fmt::Display for SolveQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveQuality::Excellent => write!(f, "excellent"),
            SolveQuality::Good => write!(f, "good"),
            SolveQuality::Marginal => write!(f, "marginal"),
        }
    }
}

/// Diagnostic information returned with a successful factorization.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveInfo {
    /// Estimated condition number, from the factor's diagonal.
    pub condition_estimate: Option<f64>,

    /// Number of diagonal tiles processed.
    pub steps: usize,

    /// Whether any tile was computed above its stored precision.
    pub was_promoted: bool,

    /// Numerical quality indicator.
    pub quality: SolveQuality,
}

impl SolveInfo {
    pub fn new() -> Self {
        Self {
            condition_estimate: None,
            steps: 0,
            was_promoted: false,
            quality: SolveQuality::Good,
        }
    }

    /// Set the condition number estimate and update quality.
    pub fn with_condition(mut self, cond: f64) -> Self {
        self.condition_estimate = Some(cond);
        self.quality = match cond {
            c if c < 1e6 => SolveQuality::Excellent,
            c if c < 1e10 => SolveQuality::Good,
            _ => SolveQuality::Marginal,
        };
        self
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    /// Mark that mixed-precision promotion took place.
    pub fn with_promotion(mut self) -> Self {
        self.was_promoted = true;
        self
    }
}

impl Default for SolveInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SolveInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SolveInfo {{ quality: {}", self.quality)?;

        if let Some(cond) = self.condition_estimate {
            write!(f, ", cond: {:.2e}", cond)?;
        }

        if self.steps > 0 {
            write!(f, ", steps: {}", self.steps)?;
        }

        if self.was_promoted {
            write!(f, ", promoted")?;
        }

        write!(f, " }}")
    }
}
