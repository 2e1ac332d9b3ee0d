//! Dense Chebyshev-spaced evaluation grid.
//!
//! The exchange loop locates error extrema on a deterministic dense sampling
//! of the band union. Within each band the sample points follow Chebyshev
//! points of the second kind mapped into the band, which concentrates samples
//! near the band edges where the error of a near-optimal design changes
//! fastest, and conditions the downstream interpolation much better than
//! uniform spacing at high orders.
//!
//! The grid also seeds the initial reference set by striding a well-spread
//! subset of its points.

use crate::band::{basis_factor, BandSpec, Symmetry};
use crate::error::{DesignError, DesignResult};
use crate::precision::PrecisionContext;
use rug::Float;
use std::cmp::Ordering;

/// Minimum number of grid points placed in any band, however narrow.
const MIN_POINTS_PER_BAND: usize = 8;

/// Dense frequency grid with the desired response and weight evaluated (and
/// basis-adjusted) at every point. Immutable once built; rebuilding with the
/// same inputs reproduces the identical grid.
#[derive(Debug, Clone)]
pub struct DenseGrid {
    freqs: Vec<Float>,
    /// `cos(2 pi f)` per grid point (decreasing as `f` increases).
    x: Vec<Float>,
    desired: Vec<Float>,
    weight: Vec<Float>,
    /// Half-open `[start, end)` grid index range of each band.
    segments: Vec<(usize, usize)>,
}

impl DenseGrid {
    /// Build the dense grid for `spec`.
    ///
    /// `basis_size` is the number of cosine basis functions of the design;
    /// the grid carries roughly `density * basis_size` points distributed
    /// over the bands proportionally to their widths. Fails with
    /// `InvalidSpecification` if any weight sample is not strictly positive.
    pub fn build(
        spec: &BandSpec,
        basis_size: usize,
        symmetry: Symmetry,
        odd_length: bool,
        density: usize,
        ctx: &PrecisionContext,
    ) -> DesignResult<Self> {
        let density = density.max(8);
        let total_width = spec.total_width();
        let target = density * basis_size;

        let mut freqs = Vec::new();
        let mut segments = Vec::with_capacity(spec.bands().len());

        for band in spec.bands() {
            let share = (target as f64 * band.width() / total_width).ceil() as usize;
            let n = share.max(MIN_POINTS_PER_BAND);
            let start = freqs.len();
            freqs.extend(chebyshev_points(band.low_edge(), band.high_edge(), n, ctx));
            segments.push((start, freqs.len()));
        }

        nudge_singular_edges(&mut freqs, &segments, symmetry, odd_length, ctx);

        let two_pi = ctx.two_pi();
        let mut x = Vec::with_capacity(freqs.len());
        let mut desired = Vec::with_capacity(freqs.len());
        let mut weight = Vec::with_capacity(freqs.len());

        for (band, &(start, end)) in spec.bands().iter().zip(&segments) {
            for f in &freqs[start..end] {
                let raw_weight = band.weight_at(f, ctx);
                if raw_weight.cmp0() != Some(Ordering::Greater) {
                    return Err(DesignError::InvalidSpecification(format!(
                        "weight not strictly positive at f = {}",
                        ctx.to_f64(f)
                    )));
                }
                let (d, w) = band.adjusted_at(f, symmetry, odd_length, ctx);
                if !d.is_finite() || !w.is_finite() {
                    return Err(DesignError::InvalidSpecification(format!(
                        "desired response not finite at f = {}",
                        ctx.to_f64(f)
                    )));
                }
                x.push(ctx.cos(&(ctx.float(&two_pi) * f)));
                desired.push(d);
                weight.push(w);
            }
        }

        Ok(Self {
            freqs,
            x,
            desired,
            weight,
            segments,
        })
    }

    /// Total number of grid points.
    #[inline]
    pub fn len(&self) -> usize {
        self.freqs.len()
    }

    /// Whether the grid is empty (never true for a validated spec).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.freqs.is_empty()
    }

    /// Grid frequencies in cycles/sample, band by band, increasing.
    #[inline]
    pub fn freqs(&self) -> &[Float] {
        &self.freqs
    }

    /// `cos(2 pi f)` per grid point.
    #[inline]
    pub fn x(&self) -> &[Float] {
        &self.x
    }

    /// Basis-adjusted desired response per grid point.
    #[inline]
    pub fn desired(&self) -> &[Float] {
        &self.desired
    }

    /// Basis-adjusted weight per grid point.
    #[inline]
    pub fn weight(&self) -> &[Float] {
        &self.weight
    }

    /// Half-open grid index range of each band.
    #[inline]
    pub fn segments(&self) -> &[(usize, usize)] {
        &self.segments
    }

    /// Index of the band segment containing grid index `i`.
    pub fn segment_of(&self, i: usize) -> usize {
        self.segments
            .iter()
            .position(|&(s, e)| i >= s && i < e)
            .expect("grid index out of range")
    }

    /// Seed reference set: `count` well-spread grid indices, strictly
    /// increasing, always including the first and last grid point.
    pub fn initial_reference(&self, count: usize) -> DesignResult<Vec<usize>> {
        let n = self.len();
        if count > n {
            return Err(DesignError::InvalidSpecification(format!(
                "filter order requires {count} reference points but the grid has only {n}"
            )));
        }
        let mut indices = Vec::with_capacity(count);
        for i in 0..count {
            let mut idx = i * (n - 1) / (count - 1);
            if let Some(&prev) = indices.last() {
                if idx <= prev {
                    idx = prev + 1;
                }
            }
            indices.push(idx.min(n - 1));
        }
        Ok(indices)
    }
}

/// `n` Chebyshev points of the second kind mapped into `[lo, hi]`, in
/// increasing order with the endpoints exact.
pub(crate) fn chebyshev_points(lo: f64, hi: f64, n: usize, ctx: &PrecisionContext) -> Vec<Float> {
    debug_assert!(n >= 2);
    let lo = ctx.from_f64(lo);
    let half_width = (ctx.from_f64(hi) - &lo) / 2u32;
    let pi = ctx.pi();
    (0..n)
        .map(|i| {
            // u runs 1 -> -1, so (1 - u)/2 runs 0 -> 1.
            let theta = ctx.float(&pi) * ctx.from_usize(i) / ctx.from_usize(n - 1);
            let u = ctx.cos(&theta);
            ctx.float(&lo) + ctx.float(&half_width) * (ctx.one() - u)
        })
        .collect()
}

/// Move grid points sitting exactly on a zero of the basis reduction factor
/// (`f = 0` or `f = 0.5`, depending on symmetry and parity) half a step into
/// the band, so the adjusted response stays finite.
fn nudge_singular_edges(
    freqs: &mut [Float],
    segments: &[(usize, usize)],
    symmetry: Symmetry,
    odd_length: bool,
    ctx: &PrecisionContext,
) {
    for &(start, end) in segments {
        if end - start < 2 {
            continue;
        }
        for (idx, neighbor) in [(start, start + 1), (end - 1, end - 2)] {
            let q = basis_factor(&freqs[idx], symmetry, odd_length, ctx);
            let singular = match q {
                None => false,
                Some(q) => q.is_zero() || q.abs() < ctx.epsilon(),
            };
            if singular {
                let mid = (ctx.float(&freqs[idx]) + &freqs[neighbor]) / 2u32;
                freqs[idx] = mid;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band::{constant, inverse_sinc, Band};

    fn ctx() -> PrecisionContext {
        PrecisionContext::new(128)
    }

    fn lowpass_spec() -> BandSpec {
        BandSpec::new(vec![
            Band::new(0.0, 0.2, inverse_sinc(16), constant(1.0)).unwrap(),
            Band::new(0.25, 0.5, constant(0.0), constant(1.0)).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_chebyshev_points_shape() {
        let ctx = ctx();
        let pts = chebyshev_points(0.1, 0.3, 17, &ctx);
        assert_eq!(pts.len(), 17);
        assert!((ctx.to_f64(&pts[0]) - 0.1).abs() < 1e-30);
        assert!((ctx.to_f64(&pts[16]) - 0.3).abs() < 1e-30);
        for pair in pts.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        // Edge concentration: first gap smaller than the central gap.
        let first_gap = ctx.to_f64(&pts[1]) - ctx.to_f64(&pts[0]);
        let mid_gap = ctx.to_f64(&pts[9]) - ctx.to_f64(&pts[8]);
        assert!(first_gap < mid_gap);
    }

    #[test]
    fn test_grid_is_deterministic() {
        let ctx = ctx();
        let spec = lowpass_spec();
        let a = DenseGrid::build(&spec, 33, Symmetry::Even, true, 16, &ctx).unwrap();
        let b = DenseGrid::build(&spec, 33, Symmetry::Even, true, 16, &ctx).unwrap();
        assert_eq!(a.len(), b.len());
        for (p, q) in a.freqs().iter().zip(b.freqs()) {
            assert_eq!(p, q);
        }
    }

    #[test]
    fn test_grid_covers_bands_in_order() {
        let ctx = ctx();
        let spec = lowpass_spec();
        let grid = DenseGrid::build(&spec, 33, Symmetry::Even, true, 16, &ctx).unwrap();
        assert_eq!(grid.segments().len(), 2);
        assert!(grid.len() >= 16 * 33);
        let (s0, e0) = grid.segments()[0];
        let (s1, e1) = grid.segments()[1];
        assert_eq!(s0, 0);
        assert_eq!(s1, e0);
        assert_eq!(e1, grid.len());
        for f in &grid.freqs()[s0..e0] {
            let v = ctx.to_f64(f);
            assert!((0.0..=0.2).contains(&v));
        }
        for f in &grid.freqs()[s1..e1] {
            let v = ctx.to_f64(f);
            assert!((0.25..=0.5).contains(&v));
        }
    }

    #[test]
    fn test_grid_rejects_non_positive_weight() {
        let ctx = ctx();
        let spec = BandSpec::new(vec![
            Band::new(0.0, 0.2, constant(1.0), constant(0.0)).unwrap()
        ])
        .unwrap();
        match DenseGrid::build(&spec, 10, Symmetry::Even, true, 16, &ctx) {
            Err(DesignError::InvalidSpecification(msg)) => {
                assert!(msg.contains("weight"), "{msg}");
            }
            other => panic!("expected InvalidSpecification, got {other:?}"),
        }
    }

    #[test]
    fn test_type_iv_nudges_zero_edge() {
        let ctx = ctx();
        let spec = BandSpec::new(vec![
            Band::new(0.0, 0.4, constant(1.0), constant(1.0)).unwrap()
        ])
        .unwrap();
        // Odd symmetry, even length: q = sin(pi f) vanishes at f = 0.
        let grid = DenseGrid::build(&spec, 10, Symmetry::Odd, false, 16, &ctx).unwrap();
        assert!(ctx.to_f64(&grid.freqs()[0]) > 0.0);
        assert!(grid.desired()[0].is_finite());
    }

    #[test]
    fn test_initial_reference_spread() {
        let ctx = ctx();
        let spec = lowpass_spec();
        let grid = DenseGrid::build(&spec, 33, Symmetry::Even, true, 16, &ctx).unwrap();
        let seed = grid.initial_reference(34).unwrap();
        assert_eq!(seed.len(), 34);
        assert_eq!(seed[0], 0);
        assert_eq!(*seed.last().unwrap(), grid.len() - 1);
        for pair in seed.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }
}
