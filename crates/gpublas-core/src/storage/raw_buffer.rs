use crate::TensorDType;

/// Zero-initialised bytes with 8 byte alignment, large enough for every
/// element type a view may reinterpret them as.
#[derive(Clone, PartialEq, Eq)]
pub struct RawDeviceBuffer {
    words: Vec<u64>,
    n_bytes: usize,
}

impl RawDeviceBuffer {
    pub const ALIGNMENT: usize = std::mem::align_of::<u64>();

    pub fn zeroed(n_bytes: usize) -> Option<Self> {
        let n_words = n_bytes.div_ceil(Self::ALIGNMENT);
        let mut words = Vec::new();
        words.try_reserve_exact(n_words).ok()?;
        words.resize(n_words, 0u64);
        Some(Self { words, n_bytes })
    }

    pub fn n_bytes(&self) -> usize {
        self.n_bytes
    }

    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.n_bytes]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..self.n_bytes]
    }

    /// Reinterprets the whole buffer as elements of `T`, dropping any
    /// trailing bytes that do not fill an element.
    pub fn as_slice<T: TensorDType>(&self) -> &[T] {
        let words: &[T] = bytemuck::cast_slice(&self.words);
        &words[..self.n_bytes / std::mem::size_of::<T>()]
    }

    pub fn as_slice_mut<T: TensorDType>(&mut self) -> &mut [T] {
        let len = self.n_bytes / std::mem::size_of::<T>();
        let words: &mut [T] = bytemuck::cast_slice_mut(&mut self.words);
        &mut words[..len]
    }
}

impl std::fmt::Debug for RawDeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawDeviceBuffer({} bytes)", self.n_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_rounds_up_to_words() {
        let raw = RawDeviceBuffer::zeroed(12).unwrap();
        assert_eq!(raw.n_bytes(), 12);
        assert_eq!(raw.as_bytes(), &[0u8; 12]);
        assert_eq!(raw.as_slice::<f32>().len(), 3);
        assert_eq!(raw.as_slice::<f64>().len(), 1);
    }

    #[test]
    fn typed_writes_are_visible_as_bytes() {
        let mut raw = RawDeviceBuffer::zeroed(8).unwrap();
        raw.as_slice_mut::<f32>()[1] = 1.0;
        assert_eq!(&raw.as_bytes()[4..8], &1.0f32.to_ne_bytes());
    }

    #[test]
    fn empty_buffer() {
        let raw = RawDeviceBuffer::zeroed(0).unwrap();
        assert!(raw.as_slice::<f64>().is_empty());
    }
}
