use super::{degenerate_fill, op_dims, scalar, NativeMatrix};
use crate::{
    resolve_output, shape, validate_output, BlasScalar, Coefficients, DType, Device,
    DispatchError, Enforcer, Execution, GemmArgs, InvariantError, Shape, Transpose, View,
};

/// # Gemm
///
/// `C = alpha * op(A) @ op(B) + beta * C`.
///
/// Output handling follows [`Gemv`](crate::Gemv): a missing `c` yields a new
/// buffer, `overwrite_c` writes into `c` when native BLAS can address it.
#[derive(Debug, Clone, derive_new::new)]
pub struct Gemm {
    pub alpha: f64,
    pub a: View,
    pub b: View,
    pub beta: f64,
    pub c: Option<View>,
    pub trans_a: bool,
    pub trans_b: bool,
    pub overwrite_c: bool,
}

impl Gemm {
    /// `(m, n, k)` of the product.
    fn extents(&self) -> (usize, usize, usize) {
        let (m, k) = op_dims(&self.a, self.trans_a);
        let (_, n) = op_dims(&self.b, self.trans_b);
        (m, n, k)
    }

    pub fn dst_shape(&self) -> Result<Shape, InvariantError> {
        Enforcer::assert_rank(&self.a, 2)?;
        Enforcer::assert_rank(&self.b, 2)?;
        let (m, n, _) = self.extents();
        Ok(shape![m, n])
    }

    /// Validates the request against `device`, returning the common dtype.
    pub fn check_invariants(&self, device: &Device) -> Result<DType, InvariantError> {
        Enforcer::assert_rank(&self.a, 2)?;
        Enforcer::assert_rank(&self.b, 2)?;
        let dt = Enforcer::check_dtype_match(&[&self.a, &self.b])?;
        Enforcer::assert_blas_dtype(dt)?;
        Enforcer::check_device(&[&self.a, &self.b], device.id())?;

        let (m, k) = op_dims(&self.a, self.trans_a);
        let (kb, n) = op_dims(&self.b, self.trans_b);
        if k != kb {
            let expected = if self.trans_b {
                shape![n, k]
            } else {
                shape![k, n]
            };
            return Err(InvariantError::ShapeMismatch {
                op: "gemm",
                expected,
                actual: self.b.shape().clone(),
            });
        }
        if let Some(c) = &self.c {
            validate_output("gemm", c, &shape![m, n], dt, device)?;
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
        let (m, n, k) = self.extents();
        let coefficients =
            Coefficients::resolve(self.alpha, self.beta, &shape![m, n, k], self.c.is_some());
        let output = resolve_output(
            device,
            self.c.as_ref(),
            &shape![m, n],
            T::dt(),
            self.overwrite_c,
            &coefficients,
        )?;
        if coefficients.execution == Execution::Degenerate {
            degenerate_fill::<T>(device, &output, &coefficients)?;
            return Ok(output.view);
        }

        let a = NativeMatrix::operand(device, &self.a, &output.view)?;
        let b = NativeMatrix::operand(device, &self.b, &output.view)?;
        let c = NativeMatrix::destination(output.view.clone())?;

        let op_a = Transpose::from(a.trans).toggle(self.trans_a);
        let op_b = Transpose::from(b.trans).toggle(self.trans_b);
        let (alpha, beta) = (
            scalar::<T>(coefficients.alpha),
            scalar::<T>(coefficients.beta),
        );
        let args = if c.trans {
            // C is stored row-major, so BLAS sees C^T and computes
            // op(B)^T @ op(A)^T.
            GemmArgs {
                trans_a: op_b.toggle(true),
                trans_b: op_a.toggle(true),
                m: n,
                n: m,
                k,
                alpha,
                a: b.arg(),
                b: a.arg(),
                beta,
                c: c.arg(),
            }
        } else {
            GemmArgs {
                trans_a: op_a,
                trans_b: op_b,
                m,
                n,
                k,
                alpha,
                a: a.arg(),
                b: b.arg(),
                beta,
                c: c.arg(),
            }
        };
        log::debug!(
            "gemm({:?}, {:?}, m={}, n={}, k={k}, lda={}, ldb={}, ldc={}) into {:?} output",
            args.trans_a,
            args.trans_b,
            args.m,
            args.n,
            args.a.ld,
            args.b.ld,
            args.c.ld,
            output.origin
        );
        T::gemm(device.backend(), args)?;
        Ok(output.view)
    }
}

/// `alpha * op(A) @ op(B) + beta * C` on `device`. See [`Gemm`].
#[allow(clippy::too_many_arguments)]
pub fn gemm(
    device: &Device,
    alpha: f64,
    a: &View,
    b: &View,
    beta: f64,
    c: Option<&View>,
    trans_a: bool,
    trans_b: bool,
    overwrite_c: bool,
) -> Result<View, DispatchError> {
    Gemm::new(
        alpha,
        a.clone(),
        b.clone(),
        beta,
        c.cloned(),
        trans_a,
        trans_b,
        overwrite_c,
    )
    .dispatch(device)
}
