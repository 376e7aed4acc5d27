use crate::{
    classify_matrix, classify_vector, materialize, Coefficients, DType, Device, DispatchError,
    Enforcer, InvariantError, Order, Shape, View,
};

/// Where the destination of a dispatch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputOrigin {
    /// Newly allocated and zero filled, nothing prior to read.
    Fresh,
    /// The caller's view, written in place.
    Reused,
    /// A canonical copy of the caller's view, the caller's buffer stays
    /// untouched.
    Copied,
}

#[derive(Debug, Clone)]
pub struct ResolvedOutput {
    pub view: View,
    pub origin: OutputOrigin,
}

fn is_expressible(view: &View) -> bool {
    match view.rank() {
        1 => classify_vector(view).is_expressible(),
        2 => classify_matrix(view, Order::F).is_expressible(),
        _ => false,
    }
}

/// Checks a supplied output against the logical result.
pub fn validate_output(
    op: &'static str,
    out: &View,
    shape: &Shape,
    dt: DType,
    device: &Device,
) -> Result<(), InvariantError> {
    Enforcer::assert_rank(out, shape.rank())?;
    Enforcer::check_shape(op, out, shape)?;
    if out.dt() != dt {
        return Err(InvariantError::DTypeMismatch {
            expected: dt,
            actual: out.dt(),
        });
    }
    Enforcer::check_device(&[out], device.id())
}

/// Picks the buffer the native routine writes.
///
/// An overwrite request is honoured only for outputs the native routine can
/// address directly. Otherwise the result lands in a new buffer: a copy of
/// the output when its prior contents contribute, zeros when they don't.
pub fn resolve_output(
    device: &Device,
    out: Option<&View>,
    shape: &Shape,
    dt: DType,
    overwrite: bool,
    coefficients: &Coefficients,
) -> Result<ResolvedOutput, DispatchError> {
    let fresh = || -> Result<ResolvedOutput, DispatchError> {
        Ok(ResolvedOutput {
            view: View::zeros(shape.clone(), dt, Order::F, device)?,
            origin: OutputOrigin::Fresh,
        })
    };
    let Some(out) = out else {
        return fresh();
    };

    let resolved = if overwrite && is_expressible(out) {
        ResolvedOutput {
            view: out.clone(),
            origin: OutputOrigin::Reused,
        }
    } else {
        if overwrite {
            log::warn!(
                "Cannot overwrite {:?} in place, writing the result to a new buffer",
                out
            );
        }
        if coefficients.reads_output() {
            ResolvedOutput {
                view: materialize(device, out)?,
                origin: OutputOrigin::Copied,
            }
        } else {
            return fresh();
        }
    };
    log::debug!("output {:?} resolved as {:?}", out, resolved.origin);
    Ok(resolved)
}
