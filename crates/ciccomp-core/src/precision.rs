//! Arbitrary-precision arithmetic context.
//!
//! Every numerically sensitive stage of the design engine (grid construction,
//! barycentric weights, matrix assembly, eigenvalue decomposition, error
//! evaluation) allocates its values through an explicit [`PrecisionContext`].
//! The context fixes the working precision in bits and the MPFR rounding mode,
//! and is passed as a parameter everywhere; there is no ambient or global
//! precision state, so concurrent design runs cannot interfere.
//!
//! Values produced through the context keep their precision through ordinary
//! arithmetic; conversion down to `f64` happens once, at the output boundary,
//! via [`PrecisionContext::to_f64`].
//!
//! ## Example
//!
//! ```rust
//! use ciccomp_core::precision::PrecisionContext;
//!
//! let ctx = PrecisionContext::new(256);
//! let third = ctx.from_f64(1.0) / ctx.from_usize(3);
//! assert!((ctx.to_f64(&third) - 1.0 / 3.0).abs() < 1e-15);
//! ```

use rug::float::{Constant, Round};
use rug::ops::AssignRound;
use rug::Float;
use std::cmp::Ordering;

/// Default working precision in bits.
///
/// Generous for a design-time tool; callers solving extreme specifications
/// (very high order, very narrow transition bands) can raise it.
pub const DEFAULT_PRECISION_BITS: u32 = 512;

/// Minimum accepted working precision. Below double precision the engine
/// would be strictly worse than a plain `f64` implementation.
pub const MIN_PRECISION_BITS: u32 = 64;

/// Explicit multiprecision configuration: working bit-width plus rounding
/// mode. `Copy`, cheap to pass by reference into every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecisionContext {
    bits: u32,
    rounding: Round,
}

impl Default for PrecisionContext {
    fn default() -> Self {
        Self::new(DEFAULT_PRECISION_BITS)
    }
}

impl PrecisionContext {
    /// Create a context with the given precision and round-to-nearest.
    pub fn new(bits: u32) -> Self {
        Self::with_rounding(bits, Round::Nearest)
    }

    /// Create a context with an explicit rounding mode.
    pub fn with_rounding(bits: u32, rounding: Round) -> Self {
        Self {
            bits: bits.max(MIN_PRECISION_BITS),
            rounding,
        }
    }

    /// Working precision in bits.
    #[inline]
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Active rounding mode.
    #[inline]
    pub fn rounding(&self) -> Round {
        self.rounding
    }

    /// Allocate a value at the context precision, rounded per the context.
    #[inline]
    pub fn float<T>(&self, val: T) -> Float
    where
        Float: AssignRound<T, Round = Round, Ordering = Ordering>,
    {
        Float::with_val_round(self.bits, val, self.rounding).0
    }

    /// Zero at context precision.
    #[inline]
    pub fn zero(&self) -> Float {
        self.float(0)
    }

    /// One at context precision.
    #[inline]
    pub fn one(&self) -> Float {
        self.float(1)
    }

    /// Import an `f64` (exact; rounding applies only if `bits < 53`).
    #[inline]
    pub fn from_f64(&self, val: f64) -> Float {
        self.float(val)
    }

    /// Import an index or count.
    #[inline]
    pub fn from_usize(&self, val: usize) -> Float {
        self.float(val as u64)
    }

    /// π at context precision.
    #[inline]
    pub fn pi(&self) -> Float {
        self.float(Constant::Pi)
    }

    /// 2π at context precision.
    pub fn two_pi(&self) -> Float {
        self.pi() * 2u32
    }

    /// Cosine under the context rounding mode.
    pub fn cos(&self, x: &Float) -> Float {
        let mut r = self.float(x);
        r.cos_round(self.rounding);
        r
    }

    /// Sine under the context rounding mode.
    pub fn sin(&self, x: &Float) -> Float {
        let mut r = self.float(x);
        r.sin_round(self.rounding);
        r
    }

    /// Arc cosine under the context rounding mode.
    pub fn acos(&self, x: &Float) -> Float {
        let mut r = self.float(x);
        r.acos_round(self.rounding);
        r
    }

    /// Unit roundoff for this precision: `2^(1 - bits)`.
    ///
    /// Used for deflation thresholds and degeneracy tests so that tolerances
    /// scale with the configured precision instead of being hard-coded at
    /// double-precision magnitudes.
    pub fn epsilon(&self) -> Float {
        let mut eps = self.one();
        eps >>= self.bits - 1;
        eps
    }

    /// A coarse tolerance at half the working precision, `2^(-bits/2)`.
    /// Appropriate for "is this coefficient negligible" decisions where full
    /// roundoff accuracy cannot be expected of the quantity being tested.
    pub fn half_epsilon(&self) -> Float {
        let mut eps = self.one();
        eps >>= self.bits / 2;
        eps
    }

    /// Round a finished value down to `f64` under the context rounding mode.
    /// This is the single output boundary of the precision layer.
    #[inline]
    pub fn to_f64(&self, val: &Float) -> f64 {
        val.to_f64_round(self.rounding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_context() {
        let ctx = PrecisionContext::default();
        assert_eq!(ctx.bits(), DEFAULT_PRECISION_BITS);
        assert_eq!(ctx.rounding(), Round::Nearest);
    }

    #[test]
    fn test_minimum_precision_clamped() {
        let ctx = PrecisionContext::new(8);
        assert_eq!(ctx.bits(), MIN_PRECISION_BITS);
    }

    #[test]
    fn test_pi_matches_f64() {
        let ctx = PrecisionContext::new(128);
        assert!((ctx.to_f64(&ctx.pi()) - std::f64::consts::PI).abs() < 1e-15);
    }

    #[test]
    fn test_trig_round_trip() {
        let ctx = PrecisionContext::new(128);
        let x = ctx.from_f64(0.3);
        let c = ctx.cos(&x);
        let back = ctx.acos(&c);
        assert!((ctx.to_f64(&back) - 0.3).abs() < 1e-30);
    }

    #[test]
    fn test_precision_exceeds_f64() {
        // 1 + 2^-80 is representable at 128 bits but collapses to 1.0 in f64.
        let ctx = PrecisionContext::new(128);
        let mut tiny = ctx.one();
        tiny >>= 80;
        let sum = ctx.one() + &tiny;
        assert!(sum > 1.0);
        assert_eq!(ctx.to_f64(&(sum - ctx.one())) * 2f64.powi(80), 1.0);
    }

    #[test]
    fn test_epsilon_scales_with_bits() {
        let a = PrecisionContext::new(64);
        let b = PrecisionContext::new(256);
        assert!(a.epsilon() > b.epsilon());
        assert!(b.half_epsilon() > b.epsilon());
    }
}
