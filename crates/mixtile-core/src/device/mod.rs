//! Accelerator memory primitive.
//!
//! A [`DeviceMemory`] implementation owns raw allocations on one accelerator
//! and moves bytes between them and host memory. Buffers never talk to a
//! backend directly; they receive one through [`crate::config::Context`].

use core::fmt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::{Error, Result};

#[cfg(feature = "cubecl")]
mod cubecl;

#[cfg(feature = "cubecl")]
pub use self::cubecl::CubeclDevice;

/// Opaque handle to one device allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevicePtr {
    /// Backend-assigned allocation id
    pub id: u64,
    /// Allocation size in bytes
    pub bytes: usize,
}

/// Raw byte movement on one accelerator.
///
/// Every failure is reported as [`Error::Configuration`]; callers do not
/// retry.
pub trait DeviceMemory: Send + Sync + fmt::Debug {
    /// Short backend name for diagnostics.
    fn name(&self) -> &str;

    /// Allocate `bytes` of zeroed device memory.
    fn allocate(&self, bytes: usize) -> Result<DevicePtr>;

    /// Release an allocation. Unknown pointers are ignored.
    fn free(&self, ptr: DevicePtr);

    /// Copy `src` into the start of `dst`.
    fn copy_to_device(&self, dst: DevicePtr, src: &[u8]) -> Result<()>;

    /// Copy the start of `src` into `dst`.
    fn copy_to_host(&self, dst: &mut [u8], src: DevicePtr) -> Result<()>;

    /// Copy `bytes` from `src` to `dst`.
    fn copy_on_device(&self, dst: DevicePtr, src: DevicePtr, bytes: usize) -> Result<()>;
}

/// Device memory emulated with separate host allocations.
///
/// Lets CPU-only hosts and tests exercise every synchronization path.
#[derive(Debug, Default)]
pub struct LoopbackDevice {
    next_id: AtomicU64,
    allocations: Mutex<HashMap<u64, Vec<u8>>>,
}

impl LoopbackDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live allocations.
    pub fn live_allocations(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Vec<u8>>> {
        self.allocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn unknown(ptr: DevicePtr) -> Error {
    Error::configuration(format!("unknown device allocation {}", ptr.id))
}

fn out_of_range(len: usize, ptr: DevicePtr) -> Error {
    Error::configuration(format!(
        "copy of {len} bytes exceeds device allocation {} of {} bytes",
        ptr.id, ptr.bytes
    ))
}

impl DeviceMemory for LoopbackDevice {
    fn name(&self) -> &str {
        "loopback"
    }

    fn allocate(&self, bytes: usize) -> Result<DevicePtr> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, vec![0; bytes]);
        Ok(DevicePtr { id, bytes })
    }

    fn free(&self, ptr: DevicePtr) {
        self.lock().remove(&ptr.id);
    }

    fn copy_to_device(&self, dst: DevicePtr, src: &[u8]) -> Result<()> {
        let mut allocations = self.lock();
        let memory = allocations.get_mut(&dst.id).ok_or_else(|| unknown(dst))?;
        if src.len() > memory.len() {
            return Err(out_of_range(src.len(), dst));
        }
        memory[..src.len()].copy_from_slice(src);
        Ok(())
    }

    fn copy_to_host(&self, dst: &mut [u8], src: DevicePtr) -> Result<()> {
        let allocations = self.lock();
        let memory = allocations.get(&src.id).ok_or_else(|| unknown(src))?;
        if dst.len() > memory.len() {
            return Err(out_of_range(dst.len(), src));
        }
        dst.copy_from_slice(&memory[..dst.len()]);
        Ok(())
    }

    fn copy_on_device(&self, dst: DevicePtr, src: DevicePtr, bytes: usize) -> Result<()> {
        let mut allocations = self.lock();
        let data = allocations
            .get(&src.id)
            .ok_or_else(|| unknown(src))?
            .get(..bytes)
            .ok_or_else(|| out_of_range(bytes, src))?
            .to_vec();
        let memory = allocations.get_mut(&dst.id).ok_or_else(|| unknown(dst))?;
        if bytes > memory.len() {
            return Err(out_of_range(bytes, dst));
        }
        memory[..bytes].copy_from_slice(&data);
        Ok(())
    }
}
