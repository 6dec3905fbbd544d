//! Process-wide configuration: the accelerator capability descriptor and the
//! equality tolerance used by comparisons.

use core::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;

use crate::device::DeviceMemory;
use crate::{Error, Precision, Result};

/// Capability descriptor handed to every buffer holder.
///
/// Without a device, buffers are host-only and any device-side request fails
/// with [`Error::Configuration`].
#[derive(Clone, Default)]
pub struct Context {
    device: Option<Arc<dyn DeviceMemory>>,
}

impl Context {
    /// Host-only context.
    pub fn host_only() -> Self {
        Self::default()
    }

    /// Context with an accelerator backend.
    pub fn with_device(device: Arc<dyn DeviceMemory>) -> Self {
        Self {
            device: Some(device),
        }
    }

    /// The accelerator backend, if any.
    pub fn device(&self) -> Option<&Arc<dyn DeviceMemory>> {
        self.device.as_ref()
    }

    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    pub(crate) fn require_device(&self) -> Result<&Arc<dyn DeviceMemory>> {
        self.device
            .as_ref()
            .ok_or_else(|| Error::configuration("no accelerator device in this context"))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("device", &self.device.as_ref().map(|d| d.name().to_string()))
            .finish()
    }
}

static GLOBAL_CONTEXT: Lazy<RwLock<Context>> = Lazy::new(|| RwLock::new(Context::default()));

/// Set the context used by newly created arrays.
///
/// Existing arrays keep the context they were created with.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use mixtile_core::{set_context, get_context, Context, LoopbackDevice};
///
/// set_context(Context::with_device(Arc::new(LoopbackDevice::new())));
/// assert!(get_context().has_device());
/// set_context(Context::host_only());
/// ```
pub fn set_context(context: Context) {
    *GLOBAL_CONTEXT
        .write()
        .unwrap_or_else(PoisonError::into_inner) = context;
}

/// Get the current global context.
pub fn get_context() -> Context {
    GLOBAL_CONTEXT
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// How close two values must be for approximate equality.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TolerancePolicy {
    /// Epsilon of the comparison's working precision.
    #[default]
    OutputEpsilon,
    /// Epsilon of the narrower operand.
    NarrowestEpsilon,
    /// Fixed absolute tolerance.
    Absolute(f64),
}

impl TolerancePolicy {
    /// Tolerance for comparing operands of `lhs` and `rhs` precision.
    pub fn tolerance(self, lhs: Precision, rhs: Precision) -> f64 {
        match self {
            TolerancePolicy::OutputEpsilon => lhs.max(rhs).epsilon(),
            TolerancePolicy::NarrowestEpsilon => lhs.min(rhs).epsilon(),
            TolerancePolicy::Absolute(tolerance) => tolerance,
        }
    }
}

impl fmt::Display for TolerancePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TolerancePolicy::OutputEpsilon => write!(f, "output-epsilon"),
            TolerancePolicy::NarrowestEpsilon => write!(f, "narrowest-epsilon"),
            TolerancePolicy::Absolute(tolerance) => write!(f, "absolute({tolerance})"),
        }
    }
}

static GLOBAL_TOLERANCE: Lazy<RwLock<TolerancePolicy>> =
    Lazy::new(|| RwLock::new(TolerancePolicy::default()));

/// Set the global equality tolerance policy.
pub fn set_tolerance_policy(policy: TolerancePolicy) {
    *GLOBAL_TOLERANCE
        .write()
        .unwrap_or_else(PoisonError::into_inner) = policy;
}

/// Get the current equality tolerance policy.
pub fn get_tolerance_policy() -> TolerancePolicy {
    *GLOBAL_TOLERANCE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
}
