//! Barycentric interpolation of the cosine-basis response.
//!
//! Given the current reference set (as `x = cos(2 pi f)` nodes) with the
//! desired response and weight at each node, the evaluator solves for the
//! equialternating error level `delta` and the node ordinates, and then
//! evaluates the interpolating polynomial at arbitrary `x` in time linear in
//! the reference-set size. The barycentric form avoids the catastrophic
//! ill-conditioning of Vandermonde solves at high order.
//!
//! The weights are memoized in the evaluator value and are valid only for the
//! node set it was built from; every reference-set update constructs a fresh
//! evaluator, which is the explicit cache invalidation point.

use crate::error::{DesignError, DesignResult};
use crate::precision::PrecisionContext;
use rug::Float;

/// Interpolating evaluator tied to one reference set.
#[derive(Debug, Clone)]
pub struct BarycentricEvaluator {
    x: Vec<Float>,
    w: Vec<Float>,
    y: Vec<Float>,
    delta: Float,
}

impl BarycentricEvaluator {
    /// Build the evaluator for reference nodes `x` (distinct, ordered by
    /// increasing frequency) with the adjusted desired response and weight at
    /// each node.
    ///
    /// Fails with `NumericalFailure` if nodes coincide or the level system is
    /// singular at the active precision.
    pub fn new(
        x: &[Float],
        desired: &[Float],
        weight: &[Float],
        ctx: &PrecisionContext,
    ) -> DesignResult<Self> {
        debug_assert_eq!(x.len(), desired.len());
        debug_assert_eq!(x.len(), weight.len());
        let n = x.len();
        if n < 2 {
            return Err(DesignError::NumericalFailure(
                "reference set has fewer than two points".into(),
            ));
        }

        let w = barycentric_weights(x, ctx)?;

        // Equialternating level: delta = sum(w_k d_k) / sum((-1)^k w_k / W_k).
        let mut numer = ctx.zero();
        let mut denom = ctx.zero();
        let mut sign = 1i32;
        for k in 0..n {
            numer += ctx.float(&w[k]) * &desired[k];
            let term = ctx.float(&w[k]) / &weight[k];
            if sign > 0 {
                denom += term;
            } else {
                denom -= term;
            }
            sign = -sign;
        }
        if !denom.is_finite() || denom.is_zero() {
            return Err(DesignError::NumericalFailure(
                "singular level system for the current reference set".into(),
            ));
        }
        let delta = numer / &denom;
        if !delta.is_finite() {
            return Err(DesignError::NumericalFailure(
                "non-finite error level for the current reference set".into(),
            ));
        }

        // Node ordinates y_k = d_k - (-1)^k delta / W_k.
        let mut y = Vec::with_capacity(n);
        let mut sign = 1i32;
        for k in 0..n {
            let offset = ctx.float(&delta) / &weight[k];
            let yk = if sign > 0 {
                ctx.float(&desired[k]) - offset
            } else {
                ctx.float(&desired[k]) + offset
            };
            y.push(yk);
            sign = -sign;
        }

        Ok(Self {
            x: x.to_vec(),
            w,
            y,
            delta,
        })
    }

    /// The equialternating weighted-error level at the reference set. Its
    /// magnitude is the minimax error the current reference set implies.
    #[inline]
    pub fn delta(&self) -> &Float {
        &self.delta
    }

    /// Reference nodes this evaluator was built for.
    #[inline]
    pub fn nodes(&self) -> &[Float] {
        &self.x
    }

    /// Memoized barycentric weights.
    #[inline]
    pub fn weights(&self) -> &[Float] {
        &self.w
    }

    /// Evaluate the interpolant at `x`. Exact node hits short-circuit to the
    /// stored ordinate; everything else is the O(n) barycentric sum.
    pub fn eval(&self, x: &Float, ctx: &PrecisionContext) -> Float {
        let mut numer = ctx.zero();
        let mut denom = ctx.zero();
        for k in 0..self.x.len() {
            let diff = ctx.float(x) - &self.x[k];
            if diff.is_zero() {
                return ctx.float(&self.y[k]);
            }
            let c = ctx.float(&self.w[k]) / diff;
            numer += ctx.float(&c) * &self.y[k];
            denom += c;
        }
        numer / denom
    }
}

/// Barycentric weights `w_k = 1 / prod_{j != k} 2 (x_k - x_j)`.
///
/// The product is accumulated in an index-skipping order, pairing factors
/// from across the node range instead of sweeping left to right, which keeps
/// partial products centered in magnitude for closely spaced Chebyshev-like
/// node sets.
pub(crate) fn barycentric_weights(
    x: &[Float],
    ctx: &PrecisionContext,
) -> DesignResult<Vec<Float>> {
    let n = x.len();
    let ld = (n - 1) / 15 + 1;
    let mut w = Vec::with_capacity(n);
    for i in 0..n {
        let mut denom = ctx.one();
        for j in 0..ld {
            for k in (j..n).step_by(ld) {
                if k != i {
                    let factor = (ctx.float(&x[i]) - &x[k]) * 2u32;
                    if factor.is_zero() {
                        return Err(DesignError::NumericalFailure(
                            "coincident reference points".into(),
                        ));
                    }
                    denom *= factor;
                }
            }
        }
        if !denom.is_finite() || denom.is_zero() {
            return Err(DesignError::NumericalFailure(
                "barycentric weight underflow or overflow".into(),
            ));
        }
        w.push(ctx.one() / denom);
    }
    Ok(w)
}
