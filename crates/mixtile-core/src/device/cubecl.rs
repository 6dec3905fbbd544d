//! CubeCL-backed device memory.

use core::fmt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use cubecl_core::{client::ComputeClient, Runtime};
use cubecl_runtime::server::Handle;

use super::{DeviceMemory, DevicePtr};
use crate::{Error, Result};

/// Device memory managed by a CubeCL compute client.
///
/// CubeCL handles are immutable from the host, so host-to-device copies
/// replace the handle behind a [`DevicePtr`] instead of writing into it.
pub struct CubeclDevice<R: Runtime> {
    client: ComputeClient<R::Server>,
    next_id: AtomicU64,
    handles: Mutex<HashMap<u64, Handle>>,
}

impl<R: Runtime> CubeclDevice<R> {
    pub fn new(client: ComputeClient<R::Server>) -> Self {
        Self {
            client,
            next_id: AtomicU64::new(0),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Compute client backing this device.
    pub fn client(&self) -> &ComputeClient<R::Server> {
        &self.client
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Handle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self, ptr: DevicePtr) -> Result<Vec<u8>> {
        let handle = self
            .lock()
            .get(&ptr.id)
            .cloned()
            .ok_or_else(|| Error::configuration(format!("unknown device allocation {}", ptr.id)))?;
        Ok(self.client.read_one(handle))
    }

    fn write(&self, ptr: DevicePtr, bytes: &[u8]) -> Result<()> {
        if bytes.len() > ptr.bytes {
            return Err(Error::configuration(format!(
                "copy of {} bytes exceeds device allocation {} of {} bytes",
                bytes.len(),
                ptr.id,
                ptr.bytes
            )));
        }
        let mut contents = self.read(ptr)?;
        contents.resize(ptr.bytes, 0);
        contents[..bytes.len()].copy_from_slice(bytes);
        let handle = self.client.create(&contents);
        self.lock().insert(ptr.id, handle);
        Ok(())
    }
}

impl<R: Runtime> fmt::Debug for CubeclDevice<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CubeclDevice")
            .field("runtime", &core::any::type_name::<R>())
            .field("allocations", &self.lock().len())
            .finish()
    }
}

impl<R: Runtime> DeviceMemory for CubeclDevice<R> {
    fn name(&self) -> &str {
        "cubecl"
    }

    fn allocate(&self, bytes: usize) -> Result<DevicePtr> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = self.client.create(&vec![0u8; bytes]);
        self.lock().insert(id, handle);
        tracing::debug!(id, bytes, "allocated cubecl device buffer");
        Ok(DevicePtr { id, bytes })
    }

    fn free(&self, ptr: DevicePtr) {
        self.lock().remove(&ptr.id);
    }

    fn copy_to_device(&self, dst: DevicePtr, src: &[u8]) -> Result<()> {
        self.write(dst, src)
    }

    fn copy_to_host(&self, dst: &mut [u8], src: DevicePtr) -> Result<()> {
        let bytes = self.read(src)?;
        let source = bytes.get(..dst.len()).ok_or_else(|| {
            Error::configuration(format!(
                "copy of {} bytes exceeds device allocation {}",
                dst.len(),
                src.id
            ))
        })?;
        dst.copy_from_slice(source);
        Ok(())
    }

    fn copy_on_device(&self, dst: DevicePtr, src: DevicePtr, bytes: usize) -> Result<()> {
        let data = self.read(src)?;
        let source = data.get(..bytes).ok_or_else(|| {
            Error::configuration(format!(
                "copy of {bytes} bytes exceeds device allocation {}",
                src.id
            ))
        })?;
        self.write(dst, source)
    }
}
