use std::ops::RangeInclusive;

use crate::{DType, DeviceId, Shape, View};

#[derive(Debug, Clone, thiserror::Error)]
pub enum InvariantError {
    #[error("Shape mismatch in {op}, expected {expected:?}, got {actual:?}.")]
    ShapeMismatch {
        op: &'static str,
        expected: Shape,
        actual: Shape,
    },
    #[error("Rank mismatch. {accepted:?} != {actual}.")]
    RankMismatch {
        accepted: RangeInclusive<usize>,
        actual: usize,
    },
    #[error("DType mismatch, expected {expected:?}, got {actual:?}.")]
    DTypeMismatch { expected: DType, actual: DType },
    #[error("Unsupported DType {0:?}.")]
    UnsupportedDType(DType),
    #[error("Device mismatch, expected {expected:?}, got {actual:?}.")]
    DeviceMismatch { expected: DeviceId, actual: DeviceId },
}

/// # Enforcer
///
/// Enforcer enforces common invariants on views. Every check runs before any
/// device memory is touched.
pub struct Enforcer;

impl Enforcer {
    pub fn assert_rank(view: &View, rank: usize) -> Result<(), InvariantError> {
        Self::assert_rank_range(view, rank..=rank)
    }

    pub fn assert_rank_range(
        view: &View,
        accepted: RangeInclusive<usize>,
    ) -> Result<(), InvariantError> {
        let actual = view.rank();
        if !accepted.contains(&actual) {
            return Err(InvariantError::RankMismatch { accepted, actual });
        }
        Ok(())
    }

    pub fn check_dtype_match(views: &[&View]) -> Result<DType, InvariantError> {
        let dtype = views[0].dt();
        for view in views.iter().skip(1) {
            if dtype != view.dt() {
                return Err(InvariantError::DTypeMismatch {
                    expected: dtype,
                    actual: view.dt(),
                });
            }
        }
        Ok(dtype)
    }

    pub fn assert_blas_dtype(dt: DType) -> Result<(), InvariantError> {
        if !dt.is_blas_supported() {
            return Err(InvariantError::UnsupportedDType(dt));
        }
        Ok(())
    }

    pub fn check_device(views: &[&View], expected: DeviceId) -> Result<(), InvariantError> {
        for view in views {
            let actual = view.device_id();
            if actual != expected {
                return Err(InvariantError::DeviceMismatch { expected, actual });
            }
        }
        Ok(())
    }

    pub fn check_shape(
        op: &'static str,
        view: &View,
        expected: &Shape,
    ) -> Result<(), InvariantError> {
        if view.shape() != expected {
            return Err(InvariantError::ShapeMismatch {
                op,
                expected: expected.clone(),
                actual: view.shape().clone(),
            });
        }
        Ok(())
    }
}
