use super::{degenerate_fill, op_dims, scalar, NativeMatrix, NativeVector};
use crate::{
    resolve_output, shape, validate_output, BlasScalar, Coefficients, DType, Device,
    DispatchError, Enforcer, Execution, GemvArgs, InvariantError, Shape, Transpose, View,
};

/// # Gemv
///
/// `y = alpha * op(A) @ x + beta * y`, where `op(A)` is `A` or `A^T`.
///
/// Without `y` the result is written to a new buffer. With `y` and
/// `overwrite_y`, the result is written into `y` itself when native BLAS can
/// address it; otherwise `y` is left untouched.
#[derive(Debug, Clone, derive_new::new)]
pub struct Gemv {
    pub alpha: f64,
    pub a: View,
    pub x: View,
    pub beta: f64,
    pub y: Option<View>,
    pub trans_a: bool,
    pub overwrite_y: bool,
}

impl Gemv {
    pub fn dst_shape(&self) -> Result<Shape, InvariantError> {
        Enforcer::assert_rank(&self.a, 2)?;
        Ok(shape![op_dims(&self.a, self.trans_a).0])
    }

    /// Validates the request against `device`, returning the common dtype.
    pub fn check_invariants(&self, device: &Device) -> Result<DType, InvariantError> {
        Enforcer::assert_rank(&self.a, 2)?;
        Enforcer::assert_rank(&self.x, 1)?;
        let dt = Enforcer::check_dtype_match(&[&self.a, &self.x])?;
        Enforcer::assert_blas_dtype(dt)?;
        Enforcer::check_device(&[&self.a, &self.x], device.id())?;

        let (rows, inner) = op_dims(&self.a, self.trans_a);
        Enforcer::check_shape("gemv", &self.x, &shape![inner])?;
        if let Some(y) = &self.y {
            validate_output("gemv", y, &shape![rows], dt, device)?;
        }
        Ok(dt)
    }

    pub fn dispatch(&self, device: &Device) -> Result<View, DispatchError> {
        match self.check_invariants(device)? {
            DType::F32 => self.dispatch_typed::<f32>(device),
            DType::F64 => self.dispatch_typed::<f64>(device),
            dt => Err(InvariantError::UnsupportedDType(dt).into()),
        }
    }

    fn dispatch_typed<T: BlasScalar>(&self, device: &Device) -> Result<View, DispatchError> {
        let (r, c) = (self.a.shape()[0], self.a.shape()[1]);
        let coefficients =
            Coefficients::resolve(self.alpha, self.beta, &shape![r, c], self.y.is_some());
        let output = resolve_output(
            device,
            self.y.as_ref(),
            &shape![op_dims(&self.a, self.trans_a).0],
            T::dt(),
            self.overwrite_y,
            &coefficients,
        )?;
        if coefficients.execution == Execution::Degenerate {
            degenerate_fill::<T>(device, &output, &coefficients)?;
            return Ok(output.view);
        }

        let a = NativeMatrix::operand(device, &self.a, &output.view)?;
        let x = NativeVector::operand(device, &self.x, &output.view)?;
        let y = NativeVector::destination(output.view.clone())?;

        // BLAS sees the stored matrix, which is A for column-major views and
        // A^T for row-major ones.
        let (m, n) = if a.trans { (c, r) } else { (r, c) };
        let args = GemvArgs {
            trans: Transpose::from(a.trans).toggle(self.trans_a),
            m,
            n,
            alpha: scalar::<T>(coefficients.alpha),
            a: a.arg(),
            x: x.arg(),
            beta: scalar::<T>(coefficients.beta),
            y: y.arg(),
        };
        log::debug!(
            "gemv({:?}, m={m}, n={n}, lda={}, incx={}, incy={}) into {:?} output",
            args.trans,
            a.ld,
            x.inc,
            y.inc,
            output.origin
        );
        T::gemv(device.backend(), args)?;
        Ok(output.view)
    }
}

/// `alpha * op(A) @ x + beta * y` on `device`. See [`Gemv`].
#[allow(clippy::too_many_arguments)]
pub fn gemv(
    device: &Device,
    alpha: f64,
    a: &View,
    x: &View,
    beta: f64,
    y: Option<&View>,
    trans_a: bool,
    overwrite_y: bool,
) -> Result<View, DispatchError> {
    Gemv::new(
        alpha,
        a.clone(),
        x.clone(),
        beta,
        y.cloned(),
        trans_a,
        overwrite_y,
    )
    .dispatch(device)
}
