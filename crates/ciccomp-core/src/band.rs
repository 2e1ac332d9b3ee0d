//! Band specification for minimax FIR design.
//!
//! A design run approximates a desired amplitude response over a set of
//! disjoint frequency bands, each carrying a desired-gain function and an
//! error-weight function of normalized frequency (cycles/sample, Nyquist at
//! 0.5). The gap between adjacent bands is the transition region where the
//! response is unconstrained.
//!
//! For CIC droop compensation the passband desired gain is the inverse of the
//! `sinc^stages` droop, available as [`inverse_sinc`]:
//!
//! ```rust
//! use ciccomp_core::band::{Band, BandSpec, constant, inverse_sinc};
//!
//! let spec = BandSpec::new(vec![
//!     Band::new(0.0, 0.2, inverse_sinc(16), constant(1.0)).unwrap(),
//!     Band::new(0.25, 0.5, constant(0.0), constant(1.0)).unwrap(),
//! ])
//! .unwrap();
//! assert_eq!(spec.bands().len(), 2);
//! ```

use crate::error::{DesignError, DesignResult};
use crate::precision::PrecisionContext;
use rug::ops::Pow;
use rug::Float;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Linear-phase coefficient symmetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Symmetry {
    /// Coefficients symmetric about the center tap (types I and II).
    Even,
    /// Coefficients antisymmetric about the center tap (types III and IV,
    /// e.g. differentiators and Hilbert transformers).
    Odd,
}

/// A desired-gain or weight function of normalized frequency, evaluated under
/// an explicit precision context. Shared and immutable for the duration of a
/// run; `Send + Sync` so dense-grid evaluation can be partitioned across
/// worker threads.
pub type GainFn = Arc<dyn Fn(&Float, &PrecisionContext) -> Float + Send + Sync>;

/// Constant gain or weight.
pub fn constant(value: f64) -> GainFn {
    Arc::new(move |_f, ctx| ctx.from_f64(value))
}

/// Inverse CIC droop response `sinc(f)^-stages` with
/// `sinc(f) = sin(pi f) / (pi f)`.
///
/// `f` is in cycles/sample of the rate at which the compensator runs; the
/// limit at `f = 0` is 1. One stage per integrator-comb pair of the CIC being
/// compensated.
pub fn inverse_sinc(stages: u32) -> GainFn {
    Arc::new(move |f, ctx| {
        if f.is_zero() {
            return ctx.one();
        }
        let arg = ctx.pi() * f;
        let sinc = ctx.sin(&arg) / arg;
        sinc.pow(-(stages as i32))
    })
}

/// One approximation band: `[low_edge, high_edge]` with a desired gain and an
/// error weight, both functions of frequency.
#[derive(Clone)]
pub struct Band {
    low_edge: f64,
    high_edge: f64,
    desired: GainFn,
    weight: GainFn,
}

impl fmt::Debug for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Band")
            .field("low_edge", &self.low_edge)
            .field("high_edge", &self.high_edge)
            .finish()
    }
}

impl Band {
    /// Create a band. Edges must satisfy `0 <= low < high <= 0.5`.
    pub fn new(
        low_edge: f64,
        high_edge: f64,
        desired: GainFn,
        weight: GainFn,
    ) -> DesignResult<Self> {
        if !low_edge.is_finite() || !high_edge.is_finite() {
            return Err(DesignError::InvalidSpecification(
                "band edges must be finite".into(),
            ));
        }
        if low_edge < 0.0 || high_edge > 0.5 {
            return Err(DesignError::InvalidSpecification(format!(
                "band [{low_edge}, {high_edge}] outside [0, 0.5]"
            )));
        }
        if low_edge >= high_edge {
            return Err(DesignError::InvalidSpecification(format!(
                "band edges not increasing: [{low_edge}, {high_edge}]"
            )));
        }
        Ok(Self {
            low_edge,
            high_edge,
            desired,
            weight,
        })
    }

    /// Lower band edge in cycles/sample.
    #[inline]
    pub fn low_edge(&self) -> f64 {
        self.low_edge
    }

    /// Upper band edge in cycles/sample.
    #[inline]
    pub fn high_edge(&self) -> f64 {
        self.high_edge
    }

    /// Band width in cycles/sample.
    #[inline]
    pub fn width(&self) -> f64 {
        self.high_edge - self.low_edge
    }

    /// Desired gain at `f` under the context.
    pub fn desired_at(&self, f: &Float, ctx: &PrecisionContext) -> Float {
        (self.desired)(f, ctx)
    }

    /// Error weight at `f` under the context.
    pub fn weight_at(&self, f: &Float, ctx: &PrecisionContext) -> Float {
        (self.weight)(f, ctx)
    }

    /// Desired gain and weight adjusted for the cosine-basis reduction of the
    /// four linear-phase cases: the response is designed as
    /// `G(f) = H(f) / q(f)` with the weight multiplied by `q(f)`, where
    /// `q` is 1, `cos(pi f)`, `sin(2 pi f)` or `sin(pi f)` depending on
    /// symmetry and tap-count parity.
    ///
    /// Callers are responsible for keeping `f` away from the zeros of `q`
    /// (the grid generator nudges such points inward).
    pub fn adjusted_at(
        &self,
        f: &Float,
        symmetry: Symmetry,
        odd_length: bool,
        ctx: &PrecisionContext,
    ) -> (Float, Float) {
        let desired = self.desired_at(f, ctx);
        let weight = self.weight_at(f, ctx);
        match basis_factor(f, symmetry, odd_length, ctx) {
            None => (desired, weight),
            Some(q) => (desired / &q, weight * &q),
        }
    }
}

/// The reduction factor `q(f)`, or `None` for the type I case where no
/// adjustment is needed.
pub(crate) fn basis_factor(
    f: &Float,
    symmetry: Symmetry,
    odd_length: bool,
    ctx: &PrecisionContext,
) -> Option<Float> {
    match (symmetry, odd_length) {
        (Symmetry::Even, true) => None,
        (Symmetry::Even, false) => Some(ctx.cos(&(ctx.pi() * f))),
        (Symmetry::Odd, true) => Some(ctx.sin(&(ctx.two_pi() * f))),
        (Symmetry::Odd, false) => Some(ctx.sin(&(ctx.pi() * f))),
    }
}

/// Ordered, validated set of disjoint bands. Immutable for the duration of a
/// design run.
#[derive(Debug, Clone)]
pub struct BandSpec {
    bands: Vec<Band>,
}

impl BandSpec {
    /// Validate and freeze a band set. Bands must be ordered by frequency and
    /// non-overlapping (touching edges are permitted but leave no transition
    /// region, which typically makes the approximation problem degenerate).
    pub fn new(bands: Vec<Band>) -> DesignResult<Self> {
        if bands.is_empty() {
            return Err(DesignError::InvalidSpecification(
                "at least one band is required".into(),
            ));
        }
        for pair in bands.windows(2) {
            if pair[1].low_edge < pair[0].high_edge {
                return Err(DesignError::InvalidSpecification(format!(
                    "bands overlap: [{}, {}] and [{}, {}]",
                    pair[0].low_edge, pair[0].high_edge, pair[1].low_edge, pair[1].high_edge
                )));
            }
        }
        Ok(Self { bands })
    }

    /// The bands, in frequency order.
    #[inline]
    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    /// Sum of band widths (the measure of the approximation region).
    pub fn total_width(&self) -> f64 {
        self.bands.iter().map(Band::width).sum()
    }

    /// Whether `f` lies inside the band union (inclusive edges).
    pub fn contains(&self, f: f64) -> bool {
        self.bands
            .iter()
            .any(|b| f >= b.low_edge && f <= b.high_edge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> PrecisionContext {
        PrecisionContext::new(128)
    }

    #[test]
    fn test_band_rejects_bad_edges() {
        assert!(Band::new(0.3, 0.2, constant(1.0), constant(1.0)).is_err());
        assert!(Band::new(0.1, 0.1, constant(1.0), constant(1.0)).is_err());
        assert!(Band::new(-0.1, 0.2, constant(1.0), constant(1.0)).is_err());
        assert!(Band::new(0.1, 0.6, constant(1.0), constant(1.0)).is_err());
        assert!(Band::new(0.0, f64::NAN, constant(1.0), constant(1.0)).is_err());
    }

    #[test]
    fn test_spec_rejects_overlap() {
        let bands = vec![
            Band::new(0.0, 0.3, constant(1.0), constant(1.0)).unwrap(),
            Band::new(0.25, 0.5, constant(0.0), constant(1.0)).unwrap(),
        ];
        match BandSpec::new(bands) {
            Err(DesignError::InvalidSpecification(msg)) => {
                assert!(msg.contains("overlap"), "{msg}");
            }
            other => panic!("expected InvalidSpecification, got {other:?}"),
        }
    }

    #[test]
    fn test_spec_rejects_empty() {
        assert!(BandSpec::new(vec![]).is_err());
    }

    #[test]
    fn test_spec_accepts_touching_bands() {
        let bands = vec![
            Band::new(0.0, 0.25, constant(1.0), constant(1.0)).unwrap(),
            Band::new(0.25, 0.5, constant(0.0), constant(1.0)).unwrap(),
        ];
        assert!(BandSpec::new(bands).is_ok());
    }

    #[test]
    fn test_total_width_and_contains() {
        let spec = BandSpec::new(vec![
            Band::new(0.0, 0.2, constant(1.0), constant(1.0)).unwrap(),
            Band::new(0.25, 0.5, constant(0.0), constant(1.0)).unwrap(),
        ])
        .unwrap();
        assert!((spec.total_width() - 0.45).abs() < 1e-15);
        assert!(spec.contains(0.1));
        assert!(spec.contains(0.25));
        assert!(!spec.contains(0.22));
    }

    #[test]
    fn test_inverse_sinc_limit_at_zero() {
        let ctx = ctx();
        let g = inverse_sinc(16);
        let at_zero = g(&ctx.zero(), &ctx);
        assert!((ctx.to_f64(&at_zero) - 1.0).abs() < 1e-30);
    }

    #[test]
    fn test_inverse_sinc_matches_f64() {
        let ctx = ctx();
        let g = inverse_sinc(16);
        let f = 0.2;
        let expected = (std::f64::consts::PI * f / (std::f64::consts::PI * f).sin()).powi(16);
        let got = ctx.to_f64(&g(&ctx.from_f64(f), &ctx));
        assert!(
            (got - expected).abs() < 1e-12 * expected,
            "got {got}, expected {expected}"
        );
    }

    #[test]
    fn test_basis_factor_type_i_is_identity() {
        let ctx = ctx();
        let f = ctx.from_f64(0.2);
        assert!(basis_factor(&f, Symmetry::Even, true, &ctx).is_none());
    }

    #[test]
    fn test_basis_factor_type_iv() {
        let ctx = ctx();
        let f = ctx.from_f64(0.25);
        let q = basis_factor(&f, Symmetry::Odd, false, &ctx).unwrap();
        let expected = (std::f64::consts::PI * 0.25).sin();
        assert!((ctx.to_f64(&q) - expected).abs() < 1e-15);
    }
}
