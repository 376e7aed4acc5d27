#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use gpublas::{
    BackendError, BlasBackend, DType, Device, DeviceRequest, GemmArgs, GemvArgs, HostBackend,
    HostConfig, Order, Shape, StridedArg, TensorDType, View,
};
use ndarray::{Array1, Array2, ArrayD, Ix1, Ix2};

pub fn device() -> Device {
    Device::request_device(DeviceRequest::Host).unwrap()
}

/// Random view with values in `[0, 10)` laid out in `order`.
///
/// `offseted_outer` and `offseted_inner` allocate one extra leading row or
/// trailing column and drop it, leaving a non-zero byte offset. `sliced`
/// allocates `|sliced|` times as many rows and keeps every `sliced`-th one,
/// walking backwards when negative.
#[derive(Debug, Clone, Copy)]
pub struct ViewSpec {
    pub order: Order,
    pub offseted_outer: bool,
    pub offseted_inner: bool,
    pub sliced: isize,
}

impl Default for ViewSpec {
    fn default() -> Self {
        Self {
            order: Order::C,
            offseted_outer: false,
            offseted_inner: false,
            sliced: 1,
        }
    }
}

impl ViewSpec {
    pub fn ordered(order: Order) -> Self {
        Self {
            order,
            ..Default::default()
        }
    }
}

pub fn gen_view<T: TensorDType + num_traits::Float>(
    shape: &[usize],
    spec: ViewSpec,
    device: &Device,
) -> anyhow::Result<View> {
    let rank = shape.len();
    let mut alloc = shape.to_vec();
    alloc[0] *= spec.sliced.unsigned_abs();
    if spec.offseted_outer {
        alloc[0] += 1;
    }
    if spec.offseted_inner {
        alloc[rank - 1] += 1;
    }

    let mut view = View::uniform::<T>(Shape::from(alloc.clone()), 0., 10., spec.order, device)?;
    if spec.offseted_outer {
        view = view.slice(0, 1..alloc[0], 1)?;
    }
    if spec.offseted_inner {
        view = view.slice(rank - 1, 1..alloc[rank - 1], 1)?;
    }
    if spec.sliced != 1 {
        let outer = view.shape()[0];
        view = view.slice(0, 0..outer, spec.sliced)?;
    }
    assert_eq!(view.shape().to_vec(), shape);
    Ok(view)
}

/// Host copy of `view` as a double precision ndarray.
pub fn to_array(view: &View) -> anyhow::Result<ArrayD<f64>> {
    fn widen<T: TensorDType>(view: &View) -> anyhow::Result<ArrayD<f64>> {
        Ok(view.to_ndarray::<T>()?.mapv(T::to_f64))
    }
    match view.dt() {
        DType::F16 => widen::<half::f16>(view),
        DType::F32 => widen::<f32>(view),
        DType::F64 => widen::<f64>(view),
    }
}

pub fn to_matrix(view: &View) -> anyhow::Result<Array2<f64>> {
    Ok(to_array(view)?.into_dimensionality::<Ix2>()?)
}

pub fn to_vector(view: &View) -> anyhow::Result<Array1<f64>> {
    Ok(to_array(view)?.into_dimensionality::<Ix1>()?)
}

/// `alpha * op(A) @ x + beta * y` in double precision.
pub fn gemv_ground(
    alpha: f64,
    a: &View,
    x: &View,
    beta: f64,
    y: Option<&View>,
    trans_a: bool,
) -> anyhow::Result<Vec<f64>> {
    let mut a = to_matrix(a)?;
    if trans_a {
        a = a.reversed_axes();
    }
    let mut result = a.dot(&to_vector(x)?) * alpha;
    if let Some(y) = y {
        result = result + to_vector(y)? * beta;
    }
    Ok(result.iter().copied().collect())
}

/// `alpha * op(A) @ op(B) + beta * C` in double precision, row-major.
pub fn gemm_ground(
    alpha: f64,
    a: &View,
    b: &View,
    beta: f64,
    c: Option<&View>,
    trans_a: bool,
    trans_b: bool,
) -> anyhow::Result<Vec<f64>> {
    let mut a = to_matrix(a)?;
    let mut b = to_matrix(b)?;
    if trans_a {
        a = a.reversed_axes();
    }
    if trans_b {
        b = b.reversed_axes();
    }
    let mut result = a.dot(&b) * alpha;
    if let Some(c) = c {
        result = result + to_matrix(c)? * beta;
    }
    Ok(result.iter().copied().collect())
}

pub fn tolerance<T: TensorDType>() -> f64 {
    match T::dt() {
        DType::F64 => 1e-10,
        _ => 1e-6,
    }
}

/// Compares a dispatch result against a double precision ground truth.
pub fn assert_close(actual: &View, expected: Vec<f64>, rtol: f64) -> anyhow::Result<()> {
    let device = device();
    let expected = View::from_data(expected, actual.shape().clone(), &device)?;
    actual.all_close(&expected, 0., rtol)
}

/// Host backend that counts how often each native entry point is hit.
#[derive(Debug)]
pub struct CountingBackend {
    inner: HostBackend,
    compute: AtomicUsize,
    scal: AtomicUsize,
    copy: AtomicUsize,
}

impl Default for CountingBackend {
    fn default() -> Self {
        Self {
            inner: HostBackend::new(HostConfig::new(1)),
            compute: AtomicUsize::new(0),
            scal: AtomicUsize::new(0),
            copy: AtomicUsize::new(0),
        }
    }
}

impl CountingBackend {
    pub fn device() -> (Arc<Self>, Device) {
        let backend = Arc::new(Self::default());
        let device = Device::request_device(DeviceRequest::Custom(backend.clone())).unwrap();
        (backend, device)
    }

    /// Native gemv and gemm calls.
    pub fn compute_calls(&self) -> usize {
        self.compute.load(Ordering::SeqCst)
    }

    pub fn scal_calls(&self) -> usize {
        self.scal.load(Ordering::SeqCst)
    }

    pub fn copy_calls(&self) -> usize {
        self.copy.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.compute.store(0, Ordering::SeqCst);
        self.scal.store(0, Ordering::SeqCst);
        self.copy.store(0, Ordering::SeqCst);
    }
}

impl BlasBackend for CountingBackend {
    fn name(&self) -> String {
        "counting".to_string()
    }

    fn sgemv(&self, args: GemvArgs<'_, f32>) -> Result<(), BackendError> {
        self.compute.fetch_add(1, Ordering::SeqCst);
        self.inner.sgemv(args)
    }

    fn dgemv(&self, args: GemvArgs<'_, f64>) -> Result<(), BackendError> {
        self.compute.fetch_add(1, Ordering::SeqCst);
        self.inner.dgemv(args)
    }

    fn sgemm(&self, args: GemmArgs<'_, f32>) -> Result<(), BackendError> {
        self.compute.fetch_add(1, Ordering::SeqCst);
        self.inner.sgemm(args)
    }

    fn dgemm(&self, args: GemmArgs<'_, f64>) -> Result<(), BackendError> {
        self.compute.fetch_add(1, Ordering::SeqCst);
        self.inner.dgemm(args)
    }

    fn sscal(&self, dst: StridedArg<'_>, factor: f32) -> Result<(), BackendError> {
        self.scal.fetch_add(1, Ordering::SeqCst);
        self.inner.sscal(dst, factor)
    }

    fn dscal(&self, dst: StridedArg<'_>, factor: f64) -> Result<(), BackendError> {
        self.scal.fetch_add(1, Ordering::SeqCst);
        self.inner.dscal(dst, factor)
    }

    fn copy(
        &self,
        src: StridedArg<'_>,
        dst: StridedArg<'_>,
        elem_size: usize,
    ) -> Result<(), BackendError> {
        self.copy.fetch_add(1, Ordering::SeqCst);
        self.inner.copy(src, dst, elem_size)
    }
}

/// Backend whose compute routines always fail.
#[derive(Debug, Default)]
pub struct FailingBackend {
    inner: HostBackend,
}

impl BlasBackend for FailingBackend {
    fn name(&self) -> String {
        "failing".to_string()
    }

    fn sgemv(&self, _: GemvArgs<'_, f32>) -> Result<(), BackendError> {
        Err(BackendError::Execution("out of memory".to_string()))
    }

    fn dgemv(&self, _: GemvArgs<'_, f64>) -> Result<(), BackendError> {
        Err(BackendError::Execution("out of memory".to_string()))
    }

    fn sgemm(&self, _: GemmArgs<'_, f32>) -> Result<(), BackendError> {
        Err(BackendError::Execution("out of memory".to_string()))
    }

    fn dgemm(&self, _: GemmArgs<'_, f64>) -> Result<(), BackendError> {
        Err(BackendError::Execution("out of memory".to_string()))
    }

    fn sscal(&self, dst: StridedArg<'_>, factor: f32) -> Result<(), BackendError> {
        self.inner.sscal(dst, factor)
    }

    fn dscal(&self, dst: StridedArg<'_>, factor: f64) -> Result<(), BackendError> {
        self.inner.dscal(dst, factor)
    }

    fn copy(
        &self,
        src: StridedArg<'_>,
        dst: StridedArg<'_>,
        elem_size: usize,
    ) -> Result<(), BackendError> {
        self.inner.copy(src, dst, elem_size)
    }
}
