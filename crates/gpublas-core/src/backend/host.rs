use gemm::{gemm, Parallelism};
use std::str::FromStr;

use crate::{
    BackendError, BlasBackend, BlasScalar, DeviceBuffer, GemmArgs, GemvArgs, MatrixArg,
    StridedArg, StridedIndex, Transpose, VectorArg,
};

pub fn get_num_threads() -> usize {
    // Respond to the same environment variable as rayon.
    match std::env::var("RAYON_NUM_THREADS")
        .ok()
        .and_then(|s| usize::from_str(&s).ok())
    {
        Some(x) if x > 0 => x,
        Some(_) | None => num_cpus::get(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_new::new)]
pub struct HostConfig {
    pub num_threads: usize,
}

impl HostConfig {
    pub fn from_env() -> Self {
        Self::new(get_num_threads())
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// # HostBackend
///
/// Reference BLAS running synchronously on the calling thread, backed by the
/// `gemm` crate. Device memory is host memory.
#[derive(Debug, Clone, Default)]
pub struct HostBackend {
    config: HostConfig,
}

impl HostBackend {
    pub fn new(config: HostConfig) -> Self {
        Self { config }
    }

    fn parallelism(&self) -> Parallelism {
        if self.config.num_threads > 1 {
            Parallelism::Rayon(self.config.num_threads)
        } else {
            Parallelism::None
        }
    }

    fn gemm_impl<T: BlasScalar>(&self, args: GemmArgs<'_, T>) -> Result<(), BackendError> {
        let GemmArgs {
            trans_a,
            trans_b,
            m,
            n,
            k,
            alpha,
            a,
            b,
            beta,
            c,
        } = args;
        log::trace!(
            "gemm({trans_a:?}, {trans_b:?}, m={m}, n={n}, k={k}, lda={}, ldb={}, ldc={})",
            a.ld,
            b.ld,
            c.ld
        );
        if m == 0 || n == 0 || k == 0 {
            return Err(BackendError::InvalidArgument(format!(
                "zero extent in gemm: m={m}, n={n}, k={k}"
            )));
        }
        ensure_distinct("C", c.buffer, &[a.buffer, b.buffer])?;

        let (a_rows, a_cols) = if trans_a.is_trans() { (k, m) } else { (m, k) };
        let (b_rows, b_cols) = if trans_b.is_trans() { (n, k) } else { (k, n) };

        let a_guard = a.buffer.read();
        let b_guard = b.buffer.read();
        let mut c_guard = c.buffer.write();
        let a_data = a_guard.as_slice::<T>();
        let b_data = b_guard.as_slice::<T>();
        let c_data = c_guard.as_slice_mut::<T>();
        check_matrix("A", &a, a_rows, a_cols, a_data.len())?;
        check_matrix("B", &b, b_rows, b_cols, b_data.len())?;
        check_matrix("C", &c, m, n, c_data.len())?;

        let (lhs_rs, lhs_cs) = op_strides(trans_a, a.ld);
        let (rhs_rs, rhs_cs) = op_strides(trans_b, b.ld);
        let lhs = &a_data[a.offset..];
        let rhs = &b_data[b.offset..];
        let dst = &mut c_data[c.offset..];

        // gemm computes dst = alpha * dst + beta * lhs @ rhs, the BLAS
        // coefficients are swapped into place here.
        unsafe {
            gemm(
                m,
                n,
                k,
                dst.as_mut_ptr(),
                c.ld as isize,
                1,
                beta != T::zero(),
                lhs.as_ptr(),
                lhs_cs,
                lhs_rs,
                rhs.as_ptr(),
                rhs_cs,
                rhs_rs,
                beta,
                alpha,
                false,
                false,
                false,
                self.parallelism(),
            )
        }
        Ok(())
    }

    fn gemv_impl<T: BlasScalar>(&self, args: GemvArgs<'_, T>) -> Result<(), BackendError> {
        let GemvArgs {
            trans,
            m,
            n,
            alpha,
            a,
            x,
            beta,
            y,
        } = args;
        log::trace!(
            "gemv({trans:?}, m={m}, n={n}, lda={}, incx={}, incy={})",
            a.ld,
            x.inc,
            y.inc
        );
        if m == 0 || n == 0 {
            return Err(BackendError::InvalidArgument(format!(
                "zero extent in gemv: m={m}, n={n}"
            )));
        }
        ensure_distinct("y", y.buffer, &[a.buffer, x.buffer])?;

        // op(A) is rows x inner, x has `inner` elements and y has `rows`.
        let (rows, inner) = if trans.is_trans() { (n, m) } else { (m, n) };

        let a_guard = a.buffer.read();
        let x_guard = x.buffer.read();
        let mut y_guard = y.buffer.write();
        let a_data = a_guard.as_slice::<T>();
        let x_data = x_guard.as_slice::<T>();
        let y_data = y_guard.as_slice_mut::<T>();
        check_matrix("A", &a, m, n, a_data.len())?;
        check_vector("x", &x, inner, x_data.len())?;
        check_vector("y", &y, rows, y_data.len())?;

        let (lhs_rs, lhs_cs) = op_strides(trans, a.ld);
        let lhs = &a_data[a.offset..];
        let rhs = &x_data[x.offset..];
        let dst = &mut y_data[y.offset..];

        unsafe {
            gemm(
                rows,
                1,
                inner,
                dst.as_mut_ptr(),
                (rows * y.inc) as isize,
                y.inc as isize,
                beta != T::zero(),
                lhs.as_ptr(),
                lhs_cs,
                lhs_rs,
                rhs.as_ptr(),
                (inner * x.inc) as isize,
                x.inc as isize,
                beta,
                alpha,
                false,
                false,
                false,
                self.parallelism(),
            )
        }
        Ok(())
    }

    fn scal_impl<T: BlasScalar>(&self, dst: StridedArg<'_>, factor: T) -> Result<(), BackendError> {
        log::trace!("scal(dims={:?}, factor={factor:?})", dst.dims);
        let mut guard = dst.buffer.write();
        let data = guard.as_slice_mut::<T>();
        let len = data.len();
        let index = StridedIndex::new(dst.dims, dst.strides, dst.offset as isize);
        for idx in index {
            let slot = element(data, idx, len)?;
            *slot = if factor == T::zero() {
                T::zero()
            } else {
                *slot * factor
            };
        }
        Ok(())
    }
}

fn op_strides(trans: Transpose, ld: usize) -> (isize, isize) {
    match trans {
        Transpose::No => (1, ld as isize),
        Transpose::Yes => (ld as isize, 1),
    }
}

fn element<T>(data: &mut [T], idx: isize, len: usize) -> Result<&mut T, BackendError> {
    usize::try_from(idx)
        .ok()
        .and_then(|i| data.get_mut(i))
        .ok_or_else(|| {
            BackendError::InvalidArgument(format!("element {idx} outside buffer of {len}"))
        })
}

fn ensure_distinct(
    name: &str,
    dst: &DeviceBuffer,
    inputs: &[&DeviceBuffer],
) -> Result<(), BackendError> {
    if inputs.iter().any(|b| b.same_as(dst)) {
        return Err(BackendError::InvalidArgument(format!(
            "{name} aliases an input operand"
        )));
    }
    Ok(())
}

fn check_matrix(
    name: &str,
    arg: &MatrixArg<'_>,
    rows: usize,
    cols: usize,
    len: usize,
) -> Result<(), BackendError> {
    if arg.ld < rows.max(1) {
        return Err(BackendError::InvalidArgument(format!(
            "ld{name}={} < max(1, {rows})",
            arg.ld
        )));
    }
    let last = arg.offset + (cols - 1) * arg.ld + rows - 1;
    if last >= len {
        return Err(BackendError::InvalidArgument(format!(
            "{name} reaches element {last} of buffer holding {len}"
        )));
    }
    Ok(())
}

fn check_vector(
    name: &str,
    arg: &VectorArg<'_>,
    n: usize,
    len: usize,
) -> Result<(), BackendError> {
    if arg.inc == 0 {
        return Err(BackendError::InvalidArgument(format!("inc{name}=0")));
    }
    let last = arg.offset + (n - 1) * arg.inc;
    if last >= len {
        return Err(BackendError::InvalidArgument(format!(
            "{name} reaches element {last} of buffer holding {len}"
        )));
    }
    Ok(())
}

impl BlasBackend for HostBackend {
    fn name(&self) -> String {
        "host".to_string()
    }

    fn sgemv(&self, args: GemvArgs<'_, f32>) -> Result<(), BackendError> {
        self.gemv_impl(args)
    }

    fn dgemv(&self, args: GemvArgs<'_, f64>) -> Result<(), BackendError> {
        self.gemv_impl(args)
    }

    fn sgemm(&self, args: GemmArgs<'_, f32>) -> Result<(), BackendError> {
        self.gemm_impl(args)
    }

    fn dgemm(&self, args: GemmArgs<'_, f64>) -> Result<(), BackendError> {
        self.gemm_impl(args)
    }

    fn sscal(&self, dst: StridedArg<'_>, factor: f32) -> Result<(), BackendError> {
        self.scal_impl(dst, factor)
    }

    fn dscal(&self, dst: StridedArg<'_>, factor: f64) -> Result<(), BackendError> {
        self.scal_impl(dst, factor)
    }

    fn copy(
        &self,
        src: StridedArg<'_>,
        dst: StridedArg<'_>,
        elem_size: usize,
    ) -> Result<(), BackendError> {
        log::trace!("copy(dims={:?}, elem_size={elem_size})", src.dims);
        if src.dims != dst.dims {
            return Err(BackendError::InvalidArgument(format!(
                "copy between shapes {:?} and {:?}",
                src.dims, dst.dims
            )));
        }
        ensure_distinct("copy destination", dst.buffer, &[src.buffer])?;

        let src_guard = src.buffer.read();
        let mut dst_guard = dst.buffer.write();
        let src_bytes = src_guard.as_bytes();
        let dst_bytes = dst_guard.as_bytes_mut();
        let src_index = StridedIndex::new(src.dims, src.strides, src.offset as isize);
        let dst_index = StridedIndex::new(dst.dims, dst.strides, dst.offset as isize);
        for (s, d) in src_index.zip(dst_index) {
            let (s, d) = match (usize::try_from(s), usize::try_from(d)) {
                (Ok(s), Ok(d)) => (s * elem_size, d * elem_size),
                _ => {
                    return Err(BackendError::InvalidArgument(
                        "copy reaches a negative element".to_string(),
                    ))
                }
            };
            match (src_bytes.get(s..s + elem_size), dst_bytes.get_mut(d..d + elem_size)) {
                (Some(from), Some(to)) => to.copy_from_slice(from),
                _ => {
                    return Err(BackendError::InvalidArgument(
                        "copy reaches outside its buffers".to_string(),
                    ))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Device, DeviceRequest};

    fn buffer_of(device: &Device, data: &[f32]) -> DeviceBuffer {
        let buffer = device.allocate(std::mem::size_of_val(data)).unwrap();
        buffer.write().as_slice_mut::<f32>().copy_from_slice(data);
        buffer
    }

    fn backend() -> HostBackend {
        HostBackend::new(HostConfig::new(1))
    }

    #[test]
    fn sgemm_column_major() {
        let device = Device::request_device(DeviceRequest::Host).unwrap();
        // A = [[1, 2], [3, 4]] column-major, B = I
        let a = buffer_of(&device, &[1., 3., 2., 4.]);
        let b = buffer_of(&device, &[1., 0., 0., 1.]);
        let c = buffer_of(&device, &[f32::NAN; 4]);
        backend()
            .sgemm(GemmArgs {
                trans_a: Transpose::No,
                trans_b: Transpose::No,
                m: 2,
                n: 2,
                k: 2,
                alpha: 2.0,
                a: MatrixArg::new(&a, 0, 2),
                b: MatrixArg::new(&b, 0, 2),
                beta: 0.0,
                c: MatrixArg::new(&c, 0, 2),
            })
            .unwrap();
        assert_eq!(c.read().as_slice::<f32>(), &[2., 6., 4., 8.]);
    }

    #[test]
    fn sgemv_transposed_with_increments() {
        let device = Device::request_device(DeviceRequest::Host).unwrap();
        // A = [[1, 2, 3], [4, 5, 6]] column-major, ld 2
        let a = buffer_of(&device, &[1., 4., 2., 5., 3., 6.]);
        let x = buffer_of(&device, &[1., -1., 1.]);
        let y = buffer_of(&device, &[10., 0., 10., 0., 10.]);
        backend()
            .sgemv(GemvArgs {
                trans: Transpose::Yes,
                m: 2,
                n: 3,
                alpha: 1.0,
                a: MatrixArg::new(&a, 0, 2),
                x: VectorArg::new(&x, 0, 2),
                beta: 1.0,
                y: VectorArg::new(&y, 0, 2),
            })
            .unwrap();
        // A^T @ [1, 1] = [5, 7, 9]
        assert_eq!(y.read().as_slice::<f32>(), &[15., 0., 17., 0., 19.]);
    }

    #[test]
    fn rejects_invalid_arguments() {
        let device = Device::request_device(DeviceRequest::Host).unwrap();
        let a = buffer_of(&device, &[1., 2., 3., 4.]);
        let x = buffer_of(&device, &[1., 2.]);
        let y = buffer_of(&device, &[0., 0.]);
        let args = |m, lda, y_buf| GemvArgs {
            trans: Transpose::No,
            m,
            n: 2,
            alpha: 1.0f32,
            a: MatrixArg::new(&a, 0, lda),
            x: VectorArg::new(&x, 0, 1),
            beta: 0.0,
            y: VectorArg::new(y_buf, 0, 1),
        };
        assert!(backend().sgemv(args(0, 1, &y)).is_err());
        assert!(backend().sgemv(args(2, 1, &y)).is_err());
        assert!(backend().sgemv(args(2, 2, &x)).is_err());
        assert!(backend().sgemv(args(2, 2, &y)).is_ok());
    }

    #[test]
    fn scal_zero_fills_without_reading() {
        let device = Device::request_device(DeviceRequest::Host).unwrap();
        let buf = buffer_of(&device, &[f32::NAN, 2., f32::NAN, 4.]);
        let (dims, strides) = ([2usize], [2isize]);
        backend()
            .sscal(StridedArg::new(&buf, 1, &dims, &strides), 0.5)
            .unwrap();
        let data = buf.read().as_slice::<f32>().to_vec();
        assert!(data[0].is_nan() && data[2].is_nan());
        assert_eq!((data[1], data[3]), (1., 2.));

        backend()
            .sscal(StridedArg::new(&buf, 0, &[4], &[1]), 0.0)
            .unwrap();
        assert_eq!(buf.read().as_slice::<f32>(), &[0.; 4]);
    }

    #[test]
    fn copy_gathers_strided_elements() {
        let device = Device::request_device(DeviceRequest::Host).unwrap();
        let src = buffer_of(&device, &[0., 1., 2., 3., 4., 5.]);
        let dst = buffer_of(&device, &[0.; 3]);
        backend()
            .copy(
                StridedArg::new(&src, 5, &[3], &[-2]),
                StridedArg::new(&dst, 0, &[3], &[1]),
                4,
            )
            .unwrap();
        assert_eq!(dst.read().as_slice::<f32>(), &[5., 3., 1.]);
    }
}
