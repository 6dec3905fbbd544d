use bytemuck::Pod;

/// Host-side byte storage.
///
/// Backed by 8-byte words so the bytes can be reinterpreted as any element
/// type without alignment failures.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct HostBuffer {
    words: Vec<u64>,
    len: usize,
}

impl HostBuffer {
    /// Zero-length buffer.
    pub const EMPTY: HostBuffer = HostBuffer {
        words: Vec::new(),
        len: 0,
    };

    /// Zero-filled buffer of `bytes` bytes.
    pub fn zeroed(bytes: usize) -> Self {
        Self {
            words: vec![0; bytes.div_ceil(8)],
            len: bytes,
        }
    }

    /// Buffer holding a copy of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut buffer = Self::zeroed(bytes.len());
        buffer.as_bytes_mut().copy_from_slice(bytes);
        buffer
    }

    /// Buffer holding the raw bytes of `values`.
    pub fn from_slice<T: Pod>(values: &[T]) -> Self {
        Self::from_bytes(bytemuck::cast_slice(values))
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.len]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..self.len]
    }

    /// View as elements. `len` must be a multiple of `size_of::<T>()`.
    pub fn as_slice<T: Pod>(&self) -> &[T] {
        bytemuck::cast_slice(self.as_bytes())
    }

    /// Mutable view as elements. `len` must be a multiple of `size_of::<T>()`.
    pub fn as_slice_mut<T: Pod>(&mut self) -> &mut [T] {
        bytemuck::cast_slice_mut(self.as_bytes_mut())
    }
}

impl core::fmt::Debug for HostBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HostBuffer").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;

    #[test]
    fn test_odd_length_is_truncated() {
        let buffer = HostBuffer::from_slice(&[f16::ONE, f16::ZERO, f16::NEG_ONE]);
        assert_eq!(buffer.len(), 6);
        assert_eq!(buffer.as_bytes().len(), 6);
        assert_eq!(buffer.as_slice::<f16>(), &[f16::ONE, f16::ZERO, f16::NEG_ONE]);
    }

    #[test]
    fn test_typed_write() {
        let mut buffer = HostBuffer::zeroed(16);
        buffer.as_slice_mut::<f64>()[1] = 2.5;
        assert_eq!(buffer.as_slice::<f64>(), &[0.0, 2.5]);
        assert!(HostBuffer::EMPTY.is_empty());
    }
}
