//! Host/device buffer ownership and lazy synchronization.
//!
//! A [`BufferHolder`] owns at most one host allocation and one device
//! allocation of the same size. Writes mark the other side stale; the stale
//! side is refreshed only when it is next requested.

mod host;
mod state;

pub use host::HostBuffer;
pub use state::{BufferEvent, BufferState, Placement};

use std::borrow::Cow;

use crate::config::Context;
use crate::device::DevicePtr;
use crate::{Error, Result};

static EMPTY_HOST: HostBuffer = HostBuffer::EMPTY;

/// Storage of one array.
#[derive(Debug)]
pub struct BufferHolder {
    context: Context,
    host: Option<HostBuffer>,
    device: Option<DevicePtr>,
    bytes: usize,
    state: BufferState,
}

impl BufferHolder {
    /// Empty holder using `context` for device access.
    pub fn new(context: Context) -> Self {
        Self {
            context,
            host: None,
            device: None,
            bytes: 0,
            state: BufferState::Empty,
        }
    }

    /// Holder with `bytes` zeroed bytes on `placement`.
    pub fn zeroed(context: Context, bytes: usize, placement: Placement) -> Result<Self> {
        let mut holder = Self::new(context);
        holder.allocate(bytes, placement)?;
        Ok(holder)
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    /// Size in bytes.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.state == BufferState::Empty
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    fn transition(&mut self, event: BufferEvent) {
        self.state = self.state.on(event);
    }

    /// Replace all storage with `bytes` zeroed bytes on `placement`.
    ///
    /// Both sides are released first, so the other placement ends up empty
    /// rather than stale.
    pub fn allocate(&mut self, bytes: usize, placement: Placement) -> Result<()> {
        self.clear();
        if bytes == 0 {
            return Ok(());
        }
        match placement {
            Placement::Host => self.host = Some(HostBuffer::zeroed(bytes)),
            Placement::Device => {
                let ptr = self.context.require_device()?.allocate(bytes)?;
                self.device = Some(ptr);
            }
        }
        self.bytes = bytes;
        self.transition(BufferEvent::Adopt(placement));
        Ok(())
    }

    /// Adopt `buffer` as the only storage.
    pub fn set_host(&mut self, buffer: HostBuffer) {
        self.clear();
        if buffer.is_empty() {
            return;
        }
        self.bytes = buffer.len();
        self.host = Some(buffer);
        self.transition(BufferEvent::Adopt(Placement::Host));
    }

    /// Adopt a device allocation as the only storage.
    ///
    /// The pointer must come from this holder's device and is freed with it.
    pub fn set_device(&mut self, ptr: DevicePtr) -> Result<()> {
        let device = self.context.require_device()?.clone();
        self.clear();
        if ptr.bytes == 0 {
            device.free(ptr);
            return Ok(());
        }
        self.bytes = ptr.bytes;
        self.device = Some(ptr);
        self.transition(BufferEvent::Adopt(Placement::Device));
        Ok(())
    }

    /// Adopt identical host and device copies.
    pub fn set_pointers(&mut self, host: HostBuffer, device: DevicePtr) -> Result<()> {
        let memory = self.context.require_device()?.clone();
        if host.len() != device.bytes {
            return Err(Error::shape(format!(
                "Host buffer of {} bytes does not match device buffer of {} bytes",
                host.len(),
                device.bytes
            )));
        }
        self.clear();
        if host.is_empty() {
            memory.free(device);
            return Ok(());
        }
        self.bytes = host.len();
        self.host = Some(host);
        self.device = Some(device);
        self.transition(BufferEvent::AdoptBoth);
        Ok(())
    }

    /// Make `placement` hold the current contents.
    pub fn sync(&mut self, placement: Placement) -> Result<()> {
        if !self.state.needs_sync(placement) {
            return Ok(());
        }
        let device = self.context.require_device()?.clone();
        let bytes = self.bytes;

        match placement {
            Placement::Host => {
                let src = self
                    .device
                    .ok_or_else(|| Error::configuration("device buffer missing"))?;
                let host = self.host.get_or_insert_with(|| HostBuffer::zeroed(bytes));
                device.copy_to_host(host.as_bytes_mut(), src)?;
            }
            Placement::Device => {
                let dst = match self.device {
                    Some(ptr) => ptr,
                    None => {
                        let ptr = device.allocate(bytes)?;
                        self.device = Some(ptr);
                        ptr
                    }
                };
                let host = self
                    .host
                    .as_ref()
                    .ok_or_else(|| Error::configuration("host buffer missing"))?;
                device.copy_to_device(dst, host.as_bytes())?;
            }
        }

        tracing::debug!(bytes, to = %placement, "synchronized buffer");
        self.transition(BufferEvent::Synced);
        Ok(())
    }

    /// Host contents, synchronized first.
    pub fn host(&mut self) -> Result<&HostBuffer> {
        self.sync(Placement::Host)?;
        Ok(self.host.as_ref().unwrap_or(&EMPTY_HOST))
    }

    /// Writable host contents. The device side becomes stale.
    pub fn host_mut(&mut self) -> Result<&mut HostBuffer> {
        self.sync(Placement::Host)?;
        self.transition(BufferEvent::Wrote(Placement::Host));
        self.host
            .as_mut()
            .ok_or_else(|| Error::configuration("buffer holds no storage"))
    }

    /// Device allocation, synchronized first.
    pub fn device(&mut self) -> Result<DevicePtr> {
        self.sync(Placement::Device)?;
        self.device
            .ok_or_else(|| Error::configuration("buffer holds no storage"))
    }

    /// Device allocation about to be written. The host side becomes stale.
    pub fn device_mut(&mut self) -> Result<DevicePtr> {
        let ptr = self.device()?;
        self.transition(BufferEvent::Wrote(Placement::Device));
        Ok(ptr)
    }

    /// Read host contents without changing state.
    ///
    /// Borrows when the host copy is current, copies from the device
    /// otherwise.
    pub fn read_host(&self) -> Result<Cow<'_, HostBuffer>> {
        if !self.state.needs_sync(Placement::Host) {
            return Ok(Cow::Borrowed(
                self.host.as_ref().unwrap_or(&EMPTY_HOST),
            ));
        }
        let device = self.context.require_device()?;
        let src = self
            .device
            .ok_or_else(|| Error::configuration("device buffer missing"))?;
        let mut host = HostBuffer::zeroed(self.bytes);
        device.copy_to_host(host.as_bytes_mut(), src)?;
        tracing::debug!(bytes = self.bytes, "copied device buffer for read");
        Ok(Cow::Owned(host))
    }

    /// Release `placement`, keeping the contents on the other side.
    ///
    /// With no storage on the other side the holder becomes empty.
    pub fn free_memory(&mut self, placement: Placement) -> Result<()> {
        if !self.state.has(placement) {
            return Ok(());
        }
        if !self.state.has(placement.other()) {
            self.clear();
            return Ok(());
        }
        self.sync(placement.other())?;
        match placement {
            Placement::Host => self.host = None,
            Placement::Device => self.release_device(),
        }
        self.transition(BufferEvent::Freed(placement));
        Ok(())
    }

    /// Release everything.
    pub fn clear(&mut self) {
        self.release_device();
        self.host = None;
        self.bytes = 0;
        self.transition(BufferEvent::Cleared);
    }

    fn release_device(&mut self) {
        if let Some(ptr) = self.device.take() {
            if let Some(device) = self.context.device() {
                device.free(ptr);
            }
        }
    }

    /// Independent copy of the current contents on the authoritative side.
    pub fn try_clone(&self) -> Result<Self> {
        let mut clone = Self::new(self.context.clone());
        if self.state.is_valid(Placement::Host) {
            if let Some(host) = &self.host {
                clone.set_host(host.clone());
            }
        } else if let Some(src) = self.device {
            let device = self.context.require_device()?;
            let dst = device.allocate(self.bytes)?;
            device.copy_on_device(dst, src, self.bytes)?;
            clone.set_device(dst)?;
        }
        tracing::debug!(bytes = self.bytes, "cloned buffer");
        Ok(clone)
    }
}

impl Drop for BufferHolder {
    fn drop(&mut self) {
        self.release_device();
    }
}
