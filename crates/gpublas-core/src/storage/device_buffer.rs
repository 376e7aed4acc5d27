use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{DeviceError, DeviceId, RawDeviceBuffer};

/// Unique identifier for device allocations.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(usize);

impl std::fmt::Debug for BufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "B{}", self.0)
    }
}

impl BufferId {
    pub(crate) fn new() -> Self {
        // https://users.rust-lang.org/t/idiomatic-rust-way-to-generate-unique-id/33805
        use std::sync::atomic;
        static COUNTER: atomic::AtomicUsize = atomic::AtomicUsize::new(1);
        Self(COUNTER.fetch_add(1, atomic::Ordering::Relaxed))
    }
}

/// A shared handle to an allocation that lives on a device.
///
/// Cloning the handle never copies memory. Views created by slicing or
/// transposing keep a clone of their origin's handle.
#[derive(Clone)]
pub struct DeviceBuffer {
    inner: Arc<BufferInner>,
}

struct BufferInner {
    id: BufferId,
    device: DeviceId,
    n_bytes: usize,
    raw: RwLock<RawDeviceBuffer>,
}

impl DeviceBuffer {
    pub(crate) fn zeroed(n_bytes: usize, device: DeviceId) -> Result<Self, DeviceError> {
        let raw = RawDeviceBuffer::zeroed(n_bytes)
            .ok_or(DeviceError::BufferAllocationFailed(n_bytes))?;
        let id = BufferId::new();
        log::trace!("Allocated {:?} ({} bytes) on {:?}", id, n_bytes, device);
        Ok(Self {
            inner: Arc::new(BufferInner {
                id,
                device,
                n_bytes,
                raw: RwLock::new(raw),
            }),
        })
    }

    pub fn id(&self) -> BufferId {
        self.inner.id
    }

    pub fn device_id(&self) -> DeviceId {
        self.inner.device
    }

    pub fn n_bytes(&self) -> usize {
        self.inner.n_bytes
    }

    pub fn same_as(&self, other: &DeviceBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Shared access. Recursive so two read-only operands backed by the same
    /// allocation can be held at once.
    pub fn read(&self) -> RwLockReadGuard<'_, RawDeviceBuffer> {
        self.inner.raw.read_recursive()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, RawDeviceBuffer> {
        self.inner.raw.write()
    }
}

impl std::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("id", &self.inner.id)
            .field("device", &self.inner.device)
            .field("n_bytes", &self.n_bytes())
            .finish()
    }
}

impl PartialEq for DeviceBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}
