use std::ops::Range;

use crate::{
    rvec, DType, Device, DeviceBuffer, DeviceError, DeviceId, Order, RVec, Shape, Strides,
    TensorDType,
};

#[cfg(feature = "rand")]
use rand::prelude::*;

#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("Shape {shape:?} and strides {strides:?} differ in rank")]
    RankMismatch { shape: Shape, strides: Strides },
    #[error("Byte offset {offset} is not aligned to {dt:?}")]
    MisalignedOffset { offset: usize, dt: DType },
    #[error("View {shape:?} with strides {strides:?} at byte offset {offset} exceeds buffer of {n_bytes} bytes")]
    OutOfBounds {
        shape: Shape,
        strides: Strides,
        offset: usize,
        n_bytes: usize,
    },
    #[error("Expected {expected} elements for shape, got {actual}")]
    DataLength { expected: usize, actual: usize },
    #[error("Axis {axis} out of range for rank {rank}")]
    InvalidAxis { axis: usize, rank: usize },
    #[error("Invalid slice {range:?} with step {step} on axis of extent {dim}")]
    InvalidSlice {
        range: Range<usize>,
        step: isize,
        dim: usize,
    },
    #[error("Requested host data as {requested:?}, view holds {actual:?}")]
    DTypeMismatch { requested: DType, actual: DType },
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// # View
///
/// A shape/stride/offset descriptor over a region of device memory.
///
/// Strides are measured in elements and may be negative, the offset is
/// measured in bytes and locates logical element `[0, ..., 0]`. A view never
/// owns its buffer exclusively: slicing and transposing produce new views that
/// share the origin's allocation.
#[derive(Clone)]
pub struct View {
    buffer: DeviceBuffer,
    shape: Shape,
    strides: Strides,
    offset: usize,
    dt: DType,
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("buffer", &self.buffer.id())
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("offset", &self.offset)
            .field("dt", &self.dt)
            .finish()
    }
}

impl View {
    /// Builds a view over an existing buffer, checking that every addressable
    /// element lies inside it.
    pub fn from_parts(
        buffer: DeviceBuffer,
        shape: Shape,
        strides: Strides,
        offset: usize,
        dt: DType,
    ) -> Result<Self, ViewError> {
        if shape.rank() != strides.len() {
            return Err(ViewError::RankMismatch { shape, strides });
        }
        let size = dt.size_of();
        if offset % size != 0 {
            return Err(ViewError::MisalignedOffset { offset, dt });
        }
        let n_bytes = buffer.n_bytes();
        let in_bounds = match Self::element_span(&shape, &strides) {
            None => offset <= n_bytes,
            Some((lo, hi)) => {
                let base = (offset / size) as isize;
                base + lo >= 0 && ((base + hi + 1) as usize) * size <= n_bytes
            }
        };
        if !in_bounds {
            return Err(ViewError::OutOfBounds {
                shape,
                strides,
                offset,
                n_bytes,
            });
        }
        Ok(Self {
            buffer,
            shape,
            strides,
            offset,
            dt,
        })
    }

    /// Lowest and highest element reached relative to the origin, `None` for
    /// empty views.
    fn element_span(shape: &Shape, strides: &Strides) -> Option<(isize, isize)> {
        if shape.numel() == 0 {
            return None;
        }
        let (mut lo, mut hi) = (0isize, 0isize);
        for (&dim, &stride) in shape.iter().zip(strides.inner().iter()) {
            let reach = (dim as isize - 1) * stride;
            if reach < 0 {
                lo += reach;
            } else {
                hi += reach;
            }
        }
        Some((lo, hi))
    }

    pub fn zeros(shape: Shape, dt: DType, order: Order, device: &Device) -> Result<Self, ViewError> {
        let buffer = device.allocate(shape.numel() * dt.size_of())?;
        let strides = Strides::with_order(&shape, order);
        Self::from_parts(buffer, shape, strides, 0, dt)
    }

    /// Creates a row-major view holding `data`.
    pub fn from_data<T: TensorDType, U: AsRef<[T]>>(
        data: U,
        shape: Shape,
        device: &Device,
    ) -> Result<Self, ViewError> {
        Self::from_data_ordered(data, shape, Order::C, device)
    }

    /// Creates a view holding `data`, which is always given in logical
    /// row-major order, stored in `order`.
    pub fn from_data_ordered<T: TensorDType, U: AsRef<[T]>>(
        data: U,
        shape: Shape,
        order: Order,
        device: &Device,
    ) -> Result<Self, ViewError> {
        let data = data.as_ref();
        if data.len() != shape.numel() {
            return Err(ViewError::DataLength {
                expected: shape.numel(),
                actual: data.len(),
            });
        }
        let view = Self::zeros(shape, T::dt(), order, device)?;
        {
            let mut raw = view.buffer.write();
            let dst = raw.as_slice_mut::<T>();
            let index = StridedIndex::new(view.shape.inner(), view.strides.inner(), 0);
            for (value, idx) in data.iter().zip(index) {
                dst[idx as usize] = *value;
            }
        }
        Ok(view)
    }

    #[cfg(feature = "rand")]
    pub fn uniform<T: TensorDType + num_traits::Float>(
        shape: Shape,
        low: f64,
        high: f64,
        order: Order,
        device: &Device,
    ) -> Result<Self, ViewError> {
        let mut rng = rand::thread_rng();
        let dist = rand_distr::Uniform::new(low, high);
        let data = (0..shape.numel())
            .map(|_| T::from(dist.sample(&mut rng)).unwrap_or_else(T::nan))
            .collect::<Vec<T>>();
        Self::from_data_ordered(data, shape, order, device)
    }
}

impl View {
    pub fn buffer(&self) -> &DeviceBuffer {
        &self.buffer
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn strides(&self) -> &Strides {
        &self.strides
    }

    /// Byte offset of logical element zero.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn element_offset(&self) -> usize {
        self.offset / self.dt.size_of()
    }

    pub fn dt(&self) -> DType {
        self.dt
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn device_id(&self) -> DeviceId {
        self.buffer.device_id()
    }

    pub fn shares_storage(&self, other: &View) -> bool {
        self.buffer.same_as(&other.buffer)
    }
}

impl View {
    /// Swaps the trailing two axes without touching memory.
    pub fn transpose(&self) -> View {
        let mut view = self.clone();
        view.shape.transpose();
        view.strides.transpose();
        view
    }

    pub fn permute(&self, dims: &[usize]) -> Result<View, ViewError> {
        let rank = self.rank();
        let mut seen = rvec![false; rank];
        for &axis in dims {
            if axis >= rank || seen[axis] {
                return Err(ViewError::InvalidAxis { axis, rank });
            }
            seen[axis] = true;
        }
        if dims.len() != rank {
            return Err(ViewError::InvalidAxis {
                axis: dims.len(),
                rank,
            });
        }
        let mut view = self.clone();
        view.shape = dims.iter().map(|&d| self.shape[d]).collect::<Vec<_>>().into();
        view.strides = dims
            .iter()
            .map(|&d| self.strides[d])
            .collect::<Vec<_>>()
            .into();
        Ok(view)
    }

    /// Selects `range` along `axis`, keeping every `|step|`-th element. A
    /// negative step walks the range backwards, so `slice(0, 0..n, -1)`
    /// reverses the axis.
    pub fn slice(&self, axis: usize, range: Range<usize>, step: isize) -> Result<View, ViewError> {
        let rank = self.rank();
        if axis >= rank {
            return Err(ViewError::InvalidAxis { axis, rank });
        }
        let dim = self.shape[axis];
        if step == 0 || range.start > range.end || range.end > dim {
            return Err(ViewError::InvalidSlice { range, step, dim });
        }
        let len = range.end - range.start;
        let stride = self.strides[axis];
        let magnitude = step.unsigned_abs();
        let extent = len.div_ceil(magnitude);

        let first = match (len, step > 0) {
            (0, _) => 0,
            (_, true) => range.start as isize,
            (_, false) => range.end as isize - 1,
        };
        let offset = self.element_offset() as isize + first * stride;

        let mut view = self.clone();
        view.shape[axis] = extent;
        view.strides[axis] = stride * step;
        view.offset = offset as usize * self.dt.size_of();
        Ok(view)
    }
}

impl View {
    /// Copies the logical elements of the view to the host, in row-major
    /// order.
    pub fn to_vec<T: TensorDType>(&self) -> Result<Vec<T>, ViewError> {
        if T::dt() != self.dt {
            return Err(ViewError::DTypeMismatch {
                requested: T::dt(),
                actual: self.dt,
            });
        }
        let raw = self.buffer.read();
        let src = raw.as_slice::<T>();
        let index = StridedIndex::new(
            self.shape.inner(),
            self.strides.inner(),
            self.element_offset() as isize,
        );
        Ok(index.map(|idx| src[idx as usize]).collect())
    }

    /// Host copy widened to `f64`, whatever the element type.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>, ViewError> {
        fn widen<T: TensorDType>(view: &View) -> Result<Vec<f64>, ViewError> {
            Ok(view.to_vec::<T>()?.into_iter().map(T::to_f64).collect())
        }
        match self.dt {
            DType::F16 => widen::<half::f16>(self),
            DType::F32 => widen::<f32>(self),
            DType::F64 => widen::<f64>(self),
        }
    }
}

#[cfg(feature = "testing")]
impl View {
    pub fn to_ndarray<T: TensorDType>(&self) -> Result<ndarray::ArrayD<T>, ViewError> {
        let data = self.to_vec::<T>()?;
        let actual = data.len();
        ndarray::ArrayD::from_shape_vec(self.shape.to_vec(), data).map_err(|_| {
            ViewError::DataLength {
                expected: self.numel(),
                actual,
            }
        })
    }

    pub fn all_close(&self, other: &Self, atol: f64, rtol: f64) -> anyhow::Result<()> {
        if self.shape() != other.shape() {
            anyhow::bail!("Shape mismatch {:?} != {:?}", self.shape(), other.shape())
        }
        let ours = self.to_f64_vec()?;
        let theirs = other.to_f64_vec()?;
        let mut stats = CloseStats::new(atol, rtol);
        ours.iter()
            .zip(theirs.iter())
            .enumerate()
            .for_each(|(idx, (a, b))| stats.update(*a, *b, idx));

        if stats.fail_count > 0 {
            anyhow::bail!(
                "{} samples not close - AVGE={} MAE={} at {:?}",
                stats.fail_count,
                stats.avg_error(),
                stats.max_abs_error,
                stats.max_abs_error_idx,
            );
        }
        log::debug!(
            "All close - AVGE={} MAE={} at {:?}",
            stats.avg_error(),
            stats.max_abs_error,
            stats.max_abs_error_idx
        );
        Ok(())
    }
}

#[cfg(feature = "testing")]
struct CloseStats {
    total_error: f64,
    max_abs_error: f64,
    max_abs_error_idx: Option<usize>,
    element_count: usize,
    fail_count: usize,
    atol: f64,
    rtol: f64,
}

#[cfg(feature = "testing")]
impl CloseStats {
    fn new(atol: f64, rtol: f64) -> Self {
        Self {
            total_error: 0.0,
            max_abs_error: 0.0,
            max_abs_error_idx: None,
            element_count: 0,
            fail_count: 0,
            atol,
            rtol,
        }
    }

    fn update(&mut self, a: f64, b: f64, index: usize) {
        let abs_diff = (a - b).abs();
        self.total_error += abs_diff;
        self.element_count += 1;

        if abs_diff > self.max_abs_error {
            self.max_abs_error = abs_diff;
            self.max_abs_error_idx = Some(index);
        }

        if !self.is_close(a, b, abs_diff) {
            self.fail_count += 1;
        }
    }

    fn avg_error(&self) -> f64 {
        if self.element_count == 0 {
            return 0.0;
        }
        self.total_error / self.element_count as f64
    }

    fn is_close(&self, a: f64, b: f64, abs_diff: f64) -> bool {
        (a.is_nan() && b.is_nan())
            || (a.is_infinite() && b.is_infinite() && a.signum() == b.signum())
            || abs_diff <= self.atol + self.rtol * b.abs()
    }
}

/// Walks the storage offsets (in elements) of a strided view in logical
/// row-major order.
pub struct StridedIndex<'a> {
    next: Option<isize>,
    multi_index: RVec<usize>,
    dims: &'a [usize],
    strides: &'a [isize],
}

impl<'a> StridedIndex<'a> {
    pub fn new(dims: &'a [usize], strides: &'a [isize], start: isize) -> Self {
        let next = if dims.iter().product::<usize>() == 0 {
            None
        } else {
            Some(start)
        };
        Self {
            next,
            multi_index: rvec![0; dims.len()],
            dims,
            strides,
        }
    }
}

impl Iterator for StridedIndex<'_> {
    type Item = isize;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        let mut next = current;
        let mut updated = false;
        for ((idx, &dim), &stride) in self
            .multi_index
            .iter_mut()
            .zip(self.dims.iter())
            .zip(self.strides.iter())
            .rev()
        {
            if *idx + 1 < dim {
                *idx += 1;
                next += stride;
                updated = true;
                break;
            }
            next -= *idx as isize * stride;
            *idx = 0;
        }
        self.next = updated.then_some(next);
        Some(current)
    }
}
