use std::sync::Arc;

use crate::{BackendError, BlasBackend, DeviceBuffer, HostBackend, HostConfig};

#[derive(Clone, Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Failed to allocate buffer of {0} bytes")]
    BufferAllocationFailed(usize),
    #[error("Device mismatch, requested device: {0:?}, actual device: {1:?}")]
    DeviceMismatch(DeviceId, DeviceId),
    #[error("Device synchronization failed: {0}")]
    SynchronizationFailed(#[from] BackendError),
}

/// Unique identifier for a device context.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(usize);

impl std::fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "D{}", self.0)
    }
}

impl DeviceId {
    fn new() -> Self {
        use std::sync::atomic;
        static COUNTER: atomic::AtomicUsize = atomic::AtomicUsize::new(0);
        Self(COUNTER.fetch_add(1, atomic::Ordering::Relaxed))
    }
}

pub enum DeviceRequest {
    /// Host reference backend, configured from the environment.
    Host,
    HostWith(HostConfig),
    Custom(Arc<dyn BlasBackend>),
}

/// # Device
///
/// An explicit device context. Every buffer records the device it was
/// allocated on and every dispatch is issued against one device; there is no
/// process wide default.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

struct DeviceInner {
    id: DeviceId,
    backend: Arc<dyn BlasBackend>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{:?}", self.inner.backend.name(), self.inner.id)
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Device {
    pub fn request_device(request: DeviceRequest) -> Result<Self, DeviceError> {
        let backend: Arc<dyn BlasBackend> = match request {
            DeviceRequest::Host => Arc::new(HostBackend::new(HostConfig::from_env())),
            DeviceRequest::HostWith(cfg) => Arc::new(HostBackend::new(cfg)),
            DeviceRequest::Custom(backend) => backend,
        };
        let device = Self {
            inner: Arc::new(DeviceInner {
                id: DeviceId::new(),
                backend,
            }),
        };
        log::debug!("Acquired device {:?}", device);
        Ok(device)
    }

    pub fn id(&self) -> DeviceId {
        self.inner.id
    }

    pub fn backend(&self) -> &dyn BlasBackend {
        self.inner.backend.as_ref()
    }

    /// Allocates a zero-initialised buffer on this device.
    pub fn allocate(&self, n_bytes: usize) -> Result<DeviceBuffer, DeviceError> {
        DeviceBuffer::zeroed(n_bytes, self.id())
    }

    pub fn synchronize(&self) -> Result<(), DeviceError> {
        Ok(self.backend().synchronize()?)
    }

    pub fn check_owns(&self, buffer: &DeviceBuffer) -> Result<(), DeviceError> {
        if buffer.device_id() != self.id() {
            return Err(DeviceError::DeviceMismatch(self.id(), buffer.device_id()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn devices_are_distinct_contexts() {
        let a = Device::request_device(DeviceRequest::Host).unwrap();
        let b = Device::request_device(DeviceRequest::HostWith(HostConfig::new(1))).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, a.clone());

        let buf = a.allocate(16).unwrap();
        assert!(a.check_owns(&buf).is_ok());
        assert!(matches!(
            b.check_owns(&buf),
            Err(DeviceError::DeviceMismatch(_, _))
        ));
    }
}
