mod host;

pub use host::*;

use crate::{DeviceBuffer, TensorDType};

#[derive(Clone, Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Invalid argument to native routine: {0}")]
    InvalidArgument(String),
    #[error("Unsupported by native backend: {0}")]
    Unsupported(String),
    #[error("Native routine failed: {0}")]
    Execution(String),
}

/// BLAS operand transposition flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transpose {
    No,
    Yes,
}

impl Transpose {
    pub fn is_trans(self) -> bool {
        matches!(self, Transpose::Yes)
    }

    /// Applies a further logical transpose.
    pub fn toggle(self, flip: bool) -> Self {
        match (self, flip) {
            (t, false) => t,
            (Transpose::No, true) => Transpose::Yes,
            (Transpose::Yes, true) => Transpose::No,
        }
    }
}

impl From<bool> for Transpose {
    fn from(trans: bool) -> Self {
        if trans {
            Transpose::Yes
        } else {
            Transpose::No
        }
    }
}

/// Column-major matrix argument: element `(i, j)` lives at
/// `offset + i + j * ld`, offsets in elements.
#[derive(Debug, Clone, Copy, derive_new::new)]
pub struct MatrixArg<'a> {
    pub buffer: &'a DeviceBuffer,
    pub offset: usize,
    pub ld: usize,
}

/// Vector argument: element `i` lives at `offset + i * inc`.
#[derive(Debug, Clone, Copy, derive_new::new)]
pub struct VectorArg<'a> {
    pub buffer: &'a DeviceBuffer,
    pub offset: usize,
    pub inc: usize,
}

/// Arbitrary strided region, used by the copy and scale primitives.
/// `offset` must address logical element zero and every reachable element
/// must be non-negative.
#[derive(Debug, Clone, Copy, derive_new::new)]
pub struct StridedArg<'a> {
    pub buffer: &'a DeviceBuffer,
    pub offset: usize,
    pub dims: &'a [usize],
    pub strides: &'a [isize],
}

/// `y = alpha * op(A) @ x + beta * y`, with `A` stored `m x n`.
#[derive(Debug, Clone, Copy)]
pub struct GemvArgs<'a, T> {
    pub trans: Transpose,
    pub m: usize,
    pub n: usize,
    pub alpha: T,
    pub a: MatrixArg<'a>,
    pub x: VectorArg<'a>,
    pub beta: T,
    pub y: VectorArg<'a>,
}

/// `C = alpha * op(A) @ op(B) + beta * C`, with `op(A)` `m x k`, `op(B)`
/// `k x n` and `C` `m x n`.
#[derive(Debug, Clone, Copy)]
pub struct GemmArgs<'a, T> {
    pub trans_a: Transpose,
    pub trans_b: Transpose,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub alpha: T,
    pub a: MatrixArg<'a>,
    pub b: MatrixArg<'a>,
    pub beta: T,
    pub c: MatrixArg<'a>,
}

/// # BlasBackend
///
/// The native library behind a device. Follows reference BLAS calling
/// conventions: column-major storage, leading dimensions and increments in
/// elements, and `beta == 0` meaning the destination is write-only.
pub trait BlasBackend: Send + Sync + std::fmt::Debug {
    fn name(&self) -> String;

    fn sgemv(&self, args: GemvArgs<'_, f32>) -> Result<(), BackendError>;
    fn dgemv(&self, args: GemvArgs<'_, f64>) -> Result<(), BackendError>;

    fn sgemm(&self, args: GemmArgs<'_, f32>) -> Result<(), BackendError>;
    fn dgemm(&self, args: GemmArgs<'_, f64>) -> Result<(), BackendError>;

    /// Scales a region in place. A zero factor fills with zeros without
    /// reading the prior contents.
    fn sscal(&self, dst: StridedArg<'_>, factor: f32) -> Result<(), BackendError>;
    fn dscal(&self, dst: StridedArg<'_>, factor: f64) -> Result<(), BackendError>;

    /// Element-wise copy between two regions of identical logical shape.
    fn copy(
        &self,
        src: StridedArg<'_>,
        dst: StridedArg<'_>,
        elem_size: usize,
    ) -> Result<(), BackendError>;

    /// Blocks until all previously issued work has completed.
    fn synchronize(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Per-precision routing to the native routines.
pub trait BlasScalar: TensorDType + num_traits::Float {
    fn gemv(backend: &dyn BlasBackend, args: GemvArgs<'_, Self>) -> Result<(), BackendError>;
    fn gemm(backend: &dyn BlasBackend, args: GemmArgs<'_, Self>) -> Result<(), BackendError>;
    fn scal(backend: &dyn BlasBackend, dst: StridedArg<'_>, factor: Self)
        -> Result<(), BackendError>;
}

impl BlasScalar for f32 {
    fn gemv(backend: &dyn BlasBackend, args: GemvArgs<'_, Self>) -> Result<(), BackendError> {
        backend.sgemv(args)
    }

    fn gemm(backend: &dyn BlasBackend, args: GemmArgs<'_, Self>) -> Result<(), BackendError> {
        backend.sgemm(args)
    }

    fn scal(
        backend: &dyn BlasBackend,
        dst: StridedArg<'_>,
        factor: Self,
    ) -> Result<(), BackendError> {
        backend.sscal(dst, factor)
    }
}

impl BlasScalar for f64 {
    fn gemv(backend: &dyn BlasBackend, args: GemvArgs<'_, Self>) -> Result<(), BackendError> {
        backend.dgemv(args)
    }

    fn gemm(backend: &dyn BlasBackend, args: GemmArgs<'_, Self>) -> Result<(), BackendError> {
        backend.dgemm(args)
    }

    fn scal(
        backend: &dyn BlasBackend,
        dst: StridedArg<'_>,
        factor: Self,
    ) -> Result<(), BackendError> {
        backend.dscal(dst, factor)
    }
}
