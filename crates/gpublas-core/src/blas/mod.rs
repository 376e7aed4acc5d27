mod coefficients;
mod gemm;
mod gemv;
mod layout;
mod materialize;
mod output;

pub use coefficients::*;
pub use gemm::*;
pub use gemv::*;
pub use layout::*;
pub use materialize::*;
pub use output::*;

use crate::{
    BackendError, BlasScalar, Device, DeviceError, InvariantError, MatrixArg, Order, StridedArg,
    VectorArg, View, ViewError,
};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Invariant(#[from] InvariantError),
    #[error("Layout of {0} cannot be expressed to native BLAS")]
    UnsupportedLayout(String),
    #[error(transparent)]
    NativeCallFailure(#[from] BackendError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    View(#[from] ViewError),
}

/// `(rows, cols)` of `op(view)`. Only meaningful for 2-D views.
fn op_dims(view: &View, trans: bool) -> (usize, usize) {
    let (r, c) = (view.shape()[0], view.shape()[1]);
    if trans {
        (c, r)
    } else {
        (r, c)
    }
}

fn scalar<T: BlasScalar>(value: f64) -> T {
    T::from(value).unwrap_or_else(T::nan)
}

/// A 2-D view in the form the native routine accepts.
#[derive(Debug)]
struct NativeMatrix {
    view: View,
    trans: bool,
    ld: usize,
    offset: usize,
}

impl NativeMatrix {
    /// An input operand. Views the native routine cannot address, and views
    /// sharing storage with the destination, are materialized first.
    fn operand(device: &Device, view: &View, dst: &View) -> Result<Self, DispatchError> {
        let layout = classify_matrix(view, Order::F);
        let aliased = view.shares_storage(dst);
        if layout.is_expressible() && !aliased {
            return Self::destination(view.clone());
        }
        log::debug!(
            "materializing operand {:?} (layout {:?}, aliases destination: {})",
            view,
            layout,
            aliased
        );
        Self::destination(materialize(device, view)?)
    }

    fn destination(view: View) -> Result<Self, DispatchError> {
        match classify_matrix(&view, Order::F) {
            Layout::Expressible { trans, ld, offset } => Ok(Self {
                view,
                trans,
                ld,
                offset,
            }),
            Layout::NeedsCopy => Err(DispatchError::UnsupportedLayout(format!("{:?}", view))),
        }
    }

    fn arg(&self) -> MatrixArg<'_> {
        MatrixArg::new(self.view.buffer(), self.offset, self.ld)
    }
}

/// A 1-D view in the form the native routine accepts.
#[derive(Debug)]
struct NativeVector {
    view: View,
    inc: usize,
    offset: usize,
}

impl NativeVector {
    fn operand(device: &Device, view: &View, dst: &View) -> Result<Self, DispatchError> {
        let layout = classify_vector(view);
        let aliased = view.shares_storage(dst);
        if layout.is_expressible() && !aliased {
            return Self::destination(view.clone());
        }
        log::debug!(
            "materializing operand {:?} (layout {:?}, aliases destination: {})",
            view,
            layout,
            aliased
        );
        Self::destination(materialize(device, view)?)
    }

    fn destination(view: View) -> Result<Self, DispatchError> {
        match classify_vector(&view) {
            VectorLayout::Expressible { inc, offset } => Ok(Self { view, inc, offset }),
            VectorLayout::NeedsCopy => {
                Err(DispatchError::UnsupportedLayout(format!("{:?}", view)))
            }
        }
    }

    fn arg(&self) -> VectorArg<'_> {
        VectorArg::new(self.view.buffer(), self.offset, self.inc)
    }
}

/// Produces `beta * prior` (or zeros) in the destination of a product with a
/// zero extent, without touching native BLAS.
fn degenerate_fill<T: BlasScalar>(
    device: &Device,
    output: &ResolvedOutput,
    coefficients: &Coefficients,
) -> Result<(), DispatchError> {
    let dst = &output.view;
    let fresh = output.origin == OutputOrigin::Fresh;
    match coefficients.degenerate_scale(fresh) {
        Some(factor) if dst.numel() > 0 => {
            log::debug!("degenerate product, scaling {:?} by {}", dst, factor);
            let arg = StridedArg::new(
                dst.buffer(),
                dst.element_offset(),
                dst.shape().inner(),
                dst.strides().inner(),
            );
            T::scal(device.backend(), arg, scalar::<T>(factor))?;
        }
        _ => log::debug!("degenerate product, {:?} already holds the result", dst),
    }
    Ok(())
}
