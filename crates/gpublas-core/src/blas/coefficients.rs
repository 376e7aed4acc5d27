use crate::Shape;

/// Whether the product term exists at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// Every extent is positive, the native routine runs.
    Native,
    /// Some extent is zero. `alpha * op(A) @ op(B)` is an exact zero and
    /// native BLAS, which rejects zero extents, is bypassed.
    Degenerate,
}

/// Resolved scalar coefficients of a single dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub alpha: f64,
    /// The `beta` handed to the native routine. Zero whenever no prior output
    /// exists, so an absent output can never contribute.
    pub beta: f64,
    pub execution: Execution,
}

impl Coefficients {
    /// `extents` are every dimension taking part in the product (`m, n` of the
    /// stored matrix for gemv, `m, n, k` for gemm). `has_prior` is whether the
    /// caller supplied an output.
    ///
    /// `alpha == 0` is never special cased: the native call still runs so that
    /// `beta * prior` is formed with BLAS semantics.
    pub fn resolve(alpha: f64, beta: f64, extents: &Shape, has_prior: bool) -> Self {
        let beta = if has_prior { beta } else { 0. };
        let execution = if extents.has_zero_dim() {
            Execution::Degenerate
        } else {
            Execution::Native
        };
        let resolved = Self {
            alpha,
            beta,
            execution,
        };
        log::debug!("coefficients {:?} for extents {:?}", resolved, extents);
        resolved
    }

    /// Whether prior output content takes part in the result. When false the
    /// destination is write-only and its old contents, NaN included, are
    /// never read.
    pub fn reads_output(&self) -> bool {
        self.beta != 0.
    }

    /// The fallback for a degenerate product: the factor to scale the
    /// destination by, or `None` when its contents are already the result.
    pub fn degenerate_scale(&self, fresh_destination: bool) -> Option<f64> {
        match (self.reads_output(), fresh_destination) {
            (true, _) if self.beta == 1. => None,
            (true, _) => Some(self.beta),
            (false, true) => None,
            (false, false) => Some(0.),
        }
    }
}
