//! Remez exchange driver.
//!
//! Orchestrates the full minimax iteration: evaluate the weighted error over
//! the dense grid under the current coefficient estimate, relocate the
//! reference set to the new error extrema (classically on the grid, or
//! refined off-grid through the Chebyshev-proxy eigenvalue solver), re-solve
//! the equialternating level at the updated reference set, and test for
//! convergence. The run is a state machine
//! `Init -> Iterate -> {Converged, Diverged, MaxIterationsExceeded}`; only
//! `Converged` yields a usable coefficient vector, and the two failure states
//! carry diagnostics instead of pretending success.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ciccomp_core::band::{Band, BandSpec, constant, inverse_sinc};
//! use ciccomp_core::remez::design_filter;
//!
//! let spec = BandSpec::new(vec![
//!     Band::new(0.0, 0.2, inverse_sinc(16), constant(1.0)).unwrap(),
//!     Band::new(0.25, 0.5, constant(0.0), constant(1.0)).unwrap(),
//! ])
//! .unwrap();
//! let design = design_filter(64, &spec, 512).unwrap();
//! assert_eq!(design.taps.len(), 65);
//! ```

use crate::band::{BandSpec, Symmetry};
use crate::barycentric::BarycentricEvaluator;
use crate::cheby_grid::DenseGrid;
use crate::eigen::{
    chebyshev_coefficients, chebyshev_derivative, chebyshev_roots, DenseBackend, EigenBackend,
};
use crate::error::{DesignError, DesignResult};
use crate::precision::PrecisionContext;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use rug::Float;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// How the reference set is updated each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeStrategy {
    /// Grid-based multi-point relocation only; the eigenvalue solver is
    /// never engaged.
    ClassicalOnly,
    /// Classical relocation, with the Chebyshev-proxy eigenvalue refinement
    /// engaged when the classical search under-collects extrema or the error
    /// stops improving. The default.
    EigenFallback,
    /// Chebyshev-proxy eigenvalue refinement on every iteration.
    EigenAlways,
}

/// What to do when the iteration bound is reached without convergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxIterPolicy {
    /// Hard failure carrying the best-effort design. The default.
    Fail,
    /// Return the best-effort design with `converged` set to `false`.
    ReturnBest,
}

/// Exchange-loop configuration. The defaults suit CIC compensator design;
/// every knob has a `with_*` builder method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignConfig {
    /// Coefficient symmetry of the linear-phase design.
    pub symmetry: Symmetry,
    /// Grid oversampling relative to the basis size (clamped to at least 8).
    pub grid_density: usize,
    /// Iteration bound; the sole limit on run duration.
    pub max_iterations: usize,
    /// Convergence threshold on the reference-error flatness
    /// `(max - min) / max`.
    pub flatness_tolerance: f64,
    /// Consecutive non-improving iterations tolerated before the run is
    /// declared diverged.
    pub stall_iterations: usize,
    /// Reference-update strategy.
    pub strategy: ExchangeStrategy,
    /// Degree of the Chebyshev proxy fitted per subinterval by the
    /// eigenvalue refinement.
    pub proxy_degree: usize,
    /// Behavior at the iteration bound.
    pub max_iter_policy: MaxIterPolicy,
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self {
            symmetry: Symmetry::Even,
            grid_density: 16,
            max_iterations: 100,
            flatness_tolerance: 1e-4,
            stall_iterations: 8,
            strategy: ExchangeStrategy::EigenFallback,
            proxy_degree: 8,
            max_iter_policy: MaxIterPolicy::Fail,
        }
    }
}

impl DesignConfig {
    /// Set the coefficient symmetry.
    pub fn with_symmetry(mut self, symmetry: Symmetry) -> Self {
        self.symmetry = symmetry;
        self
    }

    /// Set the grid oversampling factor.
    pub fn with_grid_density(mut self, density: usize) -> Self {
        self.grid_density = density;
        self
    }

    /// Set the iteration bound.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the convergence flatness threshold.
    pub fn with_flatness_tolerance(mut self, tolerance: f64) -> Self {
        self.flatness_tolerance = tolerance;
        self
    }

    /// Set the stall patience before divergence is declared.
    pub fn with_stall_iterations(mut self, stall_iterations: usize) -> Self {
        self.stall_iterations = stall_iterations;
        self
    }

    /// Set the reference-update strategy.
    pub fn with_strategy(mut self, strategy: ExchangeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the Chebyshev proxy degree.
    pub fn with_proxy_degree(mut self, degree: usize) -> Self {
        self.proxy_degree = degree.max(3);
        self
    }

    /// Set the iteration-bound policy.
    pub fn with_max_iter_policy(mut self, policy: MaxIterPolicy) -> Self {
        self.max_iter_policy = policy;
        self
    }
}

/// Finished design: the coefficient vector plus convergence diagnostics.
/// Coefficients are rounded to `f64` only here, at the output boundary; the
/// iteration itself runs at the context precision throughout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterDesign {
    /// Filter taps in time order, length `order + 1`.
    pub taps: Vec<f64>,
    /// Magnitude of the equialternating weighted-error level.
    pub weighted_error: f64,
    /// Final reference frequencies in cycles/sample.
    pub reference_frequencies: Vec<f64>,
    /// Exchange iterations performed.
    pub iterations: usize,
    /// Final reference-error flatness `(max - min) / max`.
    pub flatness: f64,
    /// Whether the equioscillation test was met. `false` only under
    /// [`MaxIterPolicy::ReturnBest`].
    pub converged: bool,
    /// Maximum weighted dense-grid error recorded at each iteration.
    pub error_trace: Vec<f64>,
}

/// Driver state machine. Terminal states are `Converged`, `Diverged` and
/// `MaxIterationsExceeded`; only the first yields a usable design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    Init,
    Iterate,
    Converged,
    Diverged,
    MaxIterationsExceeded,
}

/// One extremum candidate: a frequency with its transformed abscissa, the
/// adjusted desired response and weight there, and the weighted error under
/// the evaluator it was found with.
#[derive(Debug, Clone)]
struct Candidate {
    f: Float,
    x: Float,
    desired: Float,
    weight: Float,
    error: Float,
}

/// Design a minimax FIR filter with default configuration at the given
/// working precision.
///
/// `order` is the number of taps minus one. Returns the coefficient vector
/// and diagnostics, or a typed failure; see [`crate::error::DesignError`].
pub fn design_filter(
    order: usize,
    spec: &BandSpec,
    precision_bits: u32,
) -> DesignResult<FilterDesign> {
    design_filter_with(
        order,
        spec,
        &DesignConfig::default(),
        &PrecisionContext::new(precision_bits),
    )
}

/// Design a minimax FIR filter with explicit configuration and precision
/// context. Pure function boundary: no state is retained between calls, and
/// concurrent runs with separate contexts do not interact.
pub fn design_filter_with(
    order: usize,
    spec: &BandSpec,
    config: &DesignConfig,
    ctx: &PrecisionContext,
) -> DesignResult<FilterDesign> {
    let mut state = DriverState::Init;
    tracing::debug!(?state, order, bands = spec.bands().len(), "design run");

    if order == 0 {
        return Err(DesignError::InvalidSpecification(
            "filter order must be positive".into(),
        ));
    }
    let num_taps = order + 1;
    if num_taps < 4 {
        return Err(DesignError::InvalidSpecification(format!(
            "filter order {order} is too small; at least 4 taps are required"
        )));
    }
    let odd_length = num_taps % 2 == 1;
    let basis_size = match (config.symmetry, odd_length) {
        (Symmetry::Even, true) => num_taps / 2 + 1,
        _ => num_taps / 2,
    };
    let ref_size = basis_size + 1;

    let grid = DenseGrid::build(
        spec,
        basis_size,
        config.symmetry,
        odd_length,
        config.grid_density,
        ctx,
    )?;
    let seed = grid.initial_reference(ref_size)?;
    let mut reference: Vec<Candidate> = seed
        .into_iter()
        .map(|i| candidate_from_grid(&grid, i, ctx.zero(), ctx))
        .collect();
    let mut evaluator = evaluator_for(&reference, ctx)?;

    let backend = DenseBackend;
    let mut error_trace: Vec<f64> = Vec::new();
    let mut best_error = f64::INFINITY;
    let mut stall = 0usize;
    let mut iterations = 0usize;
    let mut flatness = f64::INFINITY;
    let mut converged = false;

    state = DriverState::Iterate;
    for iter in 1..=config.max_iterations {
        iterations = iter;

        // (a) Weighted error over the dense grid under the current
        // coefficients. Workers fill disjoint partitions; the reference
        // update below is sequential, so this is the iteration barrier.
        let errors = evaluate_grid_errors(&grid, &evaluator, ctx);
        let grid_max = errors
            .iter()
            .map(|e| ctx.to_f64(e).abs())
            .fold(0.0_f64, f64::max);
        error_trace.push(grid_max);

        // Improvements below a relative margin count as a stall so the
        // eigenvalue refinement (or divergence) is reached instead of
        // spinning on roundoff-sized gains.
        if grid_max < best_error * (1.0 - 1e-9) {
            best_error = grid_max;
            stall = 0;
        } else {
            best_error = best_error.min(grid_max);
            stall += 1;
        }

        // (b) Locate alternating extrema on the grid.
        let classical = find_grid_extrema(&grid, &errors, ctx);

        // (c) Update the reference set, delegating to the eigenvalue
        // refinement per the configured strategy.
        let use_eigen = match config.strategy {
            ExchangeStrategy::ClassicalOnly => false,
            ExchangeStrategy::EigenAlways => true,
            ExchangeStrategy::EigenFallback => classical.len() < ref_size || stall >= 2,
        };
        let candidates = if use_eigen {
            if config.strategy != ExchangeStrategy::EigenAlways {
                tracing::warn!(
                    iter,
                    found = classical.len(),
                    stall,
                    "classical relocation stalled, engaging eigenvalue refinement"
                );
            }
            refine_with_proxy(
                spec, &grid, &errors, &classical, &reference, &evaluator, &backend, config,
                odd_length, ctx,
            )?
        } else {
            classical
        };

        if candidates.len() < ref_size {
            state = DriverState::Diverged;
            tracing::debug!(?state, iter, found = candidates.len(), need = ref_size);
            return Err(diverged(iterations, &error_trace, num_taps, config, &evaluator, ctx));
        }
        let pruned = match prune_alternating(candidates, ref_size) {
            Some(p) => p,
            None => {
                state = DriverState::Diverged;
                tracing::debug!(?state, iter, "alternation lost during pruning");
                return Err(diverged(iterations, &error_trace, num_taps, config, &evaluator, ctx));
            }
        };
        if reference_degenerate(&pruned) {
            state = DriverState::Diverged;
            tracing::debug!(?state, iter, "reference points merged");
            return Err(diverged(iterations, &error_trace, num_taps, config, &evaluator, ctx));
        }

        // (e) Flatness of the reference errors decides convergence.
        let (min_abs, max_abs) = pruned.iter().fold((f64::INFINITY, 0.0_f64), |(lo, hi), c| {
            let mag = ctx.to_f64(&c.error).abs();
            (lo.min(mag), hi.max(mag))
        });
        flatness = if max_abs > 0.0 {
            (max_abs - min_abs) / max_abs
        } else {
            0.0
        };

        // (d) Re-solve the level at the updated reference set. Building a
        // fresh evaluator is the explicit barycentric-weight invalidation.
        reference = pruned;
        evaluator = evaluator_for(&reference, ctx)?;

        tracing::debug!(
            iter,
            grid_max,
            flatness,
            delta = ctx.to_f64(evaluator.delta()),
            "exchange iteration"
        );

        if flatness <= config.flatness_tolerance {
            converged = true;
            state = DriverState::Converged;
            break;
        }
        if stall >= config.stall_iterations {
            state = DriverState::Diverged;
            tracing::debug!(?state, iter, best_error, "maximum error stopped improving");
            return Err(diverged(iterations, &error_trace, num_taps, config, &evaluator, ctx));
        }
    }

    if !converged {
        state = DriverState::MaxIterationsExceeded;
    }
    tracing::debug!(?state, iterations, flatness, "design run finished");

    let design = FilterDesign {
        taps: reconstruct_taps(num_taps, config.symmetry, odd_length, &evaluator, ctx),
        weighted_error: ctx.to_f64(&ctx.float(evaluator.delta()).abs()),
        reference_frequencies: reference.iter().map(|c| ctx.to_f64(&c.f)).collect(),
        iterations,
        flatness,
        converged,
        error_trace,
    };

    if converged {
        Ok(design)
    } else {
        match config.max_iter_policy {
            MaxIterPolicy::ReturnBest => Ok(design),
            MaxIterPolicy::Fail => Err(DesignError::MaxIterationsExceeded {
                iterations,
                best: Box::new(design),
            }),
        }
    }
}

fn candidate_from_grid(
    grid: &DenseGrid,
    i: usize,
    error: Float,
    ctx: &PrecisionContext,
) -> Candidate {
    Candidate {
        f: ctx.float(&grid.freqs()[i]),
        x: ctx.float(&grid.x()[i]),
        desired: ctx.float(&grid.desired()[i]),
        weight: ctx.float(&grid.weight()[i]),
        error,
    }
}

fn evaluator_for(
    reference: &[Candidate],
    ctx: &PrecisionContext,
) -> DesignResult<BarycentricEvaluator> {
    let x: Vec<Float> = reference.iter().map(|c| ctx.float(&c.x)).collect();
    let desired: Vec<Float> = reference.iter().map(|c| ctx.float(&c.desired)).collect();
    let weight: Vec<Float> = reference.iter().map(|c| ctx.float(&c.weight)).collect();
    BarycentricEvaluator::new(&x, &desired, &weight, ctx)
}

fn weighted_error_at(
    grid: &DenseGrid,
    i: usize,
    evaluator: &BarycentricEvaluator,
    ctx: &PrecisionContext,
) -> Float {
    let a = evaluator.eval(&grid.x()[i], ctx);
    ctx.float(&grid.weight()[i]) * (ctx.float(&grid.desired()[i]) - a)
}

/// Weighted error at every grid point. With the `parallel` feature the grid
/// is partitioned into disjoint chunks processed on the rayon pool; the
/// implicit join is the per-iteration barrier. Output is identical either
/// way since every point is computed independently.
fn evaluate_grid_errors(
    grid: &DenseGrid,
    evaluator: &BarycentricEvaluator,
    ctx: &PrecisionContext,
) -> Vec<Float> {
    let n = grid.len();
    #[cfg(feature = "parallel")]
    {
        let chunk = (n / rayon::current_num_threads().max(1)).max(32);
        let mut errors = vec![ctx.zero(); n];
        errors
            .par_chunks_mut(chunk)
            .enumerate()
            .for_each(|(ci, out)| {
                let base = ci * chunk;
                for (k, slot) in out.iter_mut().enumerate() {
                    *slot = weighted_error_at(grid, base + k, evaluator, ctx);
                }
            });
        errors
    }
    #[cfg(not(feature = "parallel"))]
    {
        (0..n)
            .map(|i| weighted_error_at(grid, i, evaluator, ctx))
            .collect()
    }
}

/// Classical extremum search: every grid point that is a signed local
/// extremum of the error within its band segment, band edges included.
fn find_grid_extrema(
    grid: &DenseGrid,
    errors: &[Float],
    ctx: &PrecisionContext,
) -> Vec<Candidate> {
    let mut found = Vec::new();
    for &(s, e) in grid.segments() {
        if e - s == 1 {
            found.push(candidate_from_grid(grid, s, ctx.float(&errors[s]), ctx));
            continue;
        }
        for i in s..e {
            let ei = &errors[i];
            let positive = ei.cmp0() == Some(Ordering::Greater);
            let negative = ei.cmp0() == Some(Ordering::Less);
            let is_extremum = if i == s {
                (positive && ei > &errors[i + 1]) || (negative && ei < &errors[i + 1])
            } else if i == e - 1 {
                (positive && ei > &errors[i - 1]) || (negative && ei < &errors[i - 1])
            } else {
                (positive && ei >= &errors[i - 1] && ei > &errors[i + 1])
                    || (negative && ei <= &errors[i - 1] && ei < &errors[i + 1])
            };
            if is_extremum {
                found.push(candidate_from_grid(grid, i, ctx.float(ei), ctx));
            }
        }
    }
    found
}

/// Keep exactly `target` candidates with alternating error signs, deleting
/// the smallest-magnitude offender first, then the smaller of the outermost
/// pair once everything alternates. Returns `None` if the surviving set does
/// not alternate.
fn prune_alternating(mut candidates: Vec<Candidate>, target: usize) -> Option<Vec<Candidate>> {
    while candidates.len() > target {
        let k = candidates.len();
        let mut up = candidates[0].error.cmp0() == Some(Ordering::Greater);
        let mut smallest = 0usize;
        let mut alternating = true;
        for j in 1..k {
            if mag(&candidates[j]) < mag(&candidates[smallest]) {
                smallest = j;
            }
            let positive = candidates[j].error.cmp0() == Some(Ordering::Greater);
            let negative = candidates[j].error.cmp0() == Some(Ordering::Less);
            if up && negative {
                up = false;
            } else if !up && positive {
                up = true;
            } else {
                alternating = false;
                break;
            }
        }
        if alternating && candidates.len() == target + 1 {
            smallest = if mag(&candidates[k - 1]) < mag(&candidates[0]) {
                k - 1
            } else {
                0
            };
        }
        candidates.remove(smallest);
    }

    let mut up = candidates[0].error.cmp0() == Some(Ordering::Greater);
    for c in candidates.iter().skip(1) {
        let positive = c.error.cmp0() == Some(Ordering::Greater);
        let negative = c.error.cmp0() == Some(Ordering::Less);
        if up && negative {
            up = false;
        } else if !up && positive {
            up = true;
        } else {
            return None;
        }
    }
    Some(candidates)
}

fn mag(c: &Candidate) -> Float {
    c.error.clone().abs()
}

/// Adjacent reference points that have merged (equal abscissae) make the
/// interpolation singular; the run is declared diverged before that happens.
fn reference_degenerate(reference: &[Candidate]) -> bool {
    reference
        .windows(2)
        .any(|pair| pair[0].x == pair[1].x || pair[0].f == pair[1].f)
}

/// Chebyshev-proxy refinement: between consecutive split points inside each
/// band, fit a proxy to the weighted error, differentiate it, and take the
/// derivative's colleague-matrix eigenvalues as off-grid extremum locations.
/// Merges the classical candidates, the band-edge grid points and the proxy
/// roots into one candidate list.
#[allow(clippy::too_many_arguments)]
fn refine_with_proxy<B: EigenBackend>(
    spec: &BandSpec,
    grid: &DenseGrid,
    errors: &[Float],
    classical: &[Candidate],
    reference: &[Candidate],
    evaluator: &BarycentricEvaluator,
    backend: &B,
    config: &DesignConfig,
    odd_length: bool,
    ctx: &PrecisionContext,
) -> DesignResult<Vec<Candidate>> {
    let mut candidates: Vec<Candidate> = Vec::new();

    // Split points: the classical extrema when available, otherwise the
    // current reference set.
    let splits: &[Candidate] = if classical.is_empty() {
        reference
    } else {
        classical
    };

    for (band, &(s, e)) in spec.bands().iter().zip(grid.segments()) {
        // Band edges from the grid (already nudged off singular points).
        candidates.push(candidate_from_grid(grid, s, ctx.float(&errors[s]), ctx));
        if e - s > 1 {
            candidates.push(candidate_from_grid(grid, e - 1, ctx.float(&errors[e - 1]), ctx));
        }

        let f_lo = &grid.freqs()[s];
        let f_hi = &grid.freqs()[e - 1];
        // x = cos(2 pi f) decreases in f: the band's x-interval endpoints.
        let band_x_lo = ctx.float(&grid.x()[e - 1]);
        let band_x_hi = ctx.float(&grid.x()[s]);

        let mut edges: Vec<Float> = vec![band_x_lo];
        let mut in_band: Vec<&Candidate> = splits
            .iter()
            .filter(|c| c.f >= *f_lo && c.f <= *f_hi)
            .collect();
        in_band.sort_by(|a, b| a.x.partial_cmp(&b.x).expect("abscissae are finite"));
        for c in in_band {
            edges.push(ctx.float(&c.x));
        }
        edges.push(band_x_hi);

        for pair in edges.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let width = ctx.to_f64(b) - ctx.to_f64(a);
            if width < 1e-13 {
                continue;
            }
            for x in proxy_extrema(band, a, b, evaluator, backend, config, odd_length, ctx)? {
                candidates.push(candidate_at(
                    band,
                    x,
                    evaluator,
                    config.symmetry,
                    odd_length,
                    ctx,
                ));
            }
        }
    }

    for c in classical {
        candidates.push(c.clone());
    }

    candidates.sort_by(|a, b| a.f.partial_cmp(&b.f).expect("frequencies are finite"));
    candidates.dedup_by(|next, prev| {
        let same = ctx.to_f64(&next.f) - ctx.to_f64(&prev.f) < 1e-14;
        if same && mag(next) > mag(prev) {
            std::mem::swap(next, prev);
        }
        same
    });
    Ok(candidates)
}

/// Local extrema of the weighted error inside the x-interval `[a, b]` of one
/// band, from the roots of the differentiated Chebyshev proxy.
#[allow(clippy::too_many_arguments)]
fn proxy_extrema<B: EigenBackend>(
    band: &crate::band::Band,
    a: &Float,
    b: &Float,
    evaluator: &BarycentricEvaluator,
    backend: &B,
    config: &DesignConfig,
    odd_length: bool,
    ctx: &PrecisionContext,
) -> DesignResult<Vec<Float>> {
    let m = config.proxy_degree.max(3);
    let mid = (ctx.float(a) + b) / 2u32;
    let half = (ctx.float(b) - a) / 2u32;
    let pi = ctx.pi();

    // Samples at u_j = cos(pi j / m), j = 0..=m (u decreasing from 1 to -1).
    let samples: Vec<Float> = (0..=m)
        .map(|j| {
            let theta = ctx.float(&pi) * ctx.from_usize(j) / ctx.from_usize(m);
            let u = ctx.cos(&theta);
            let x = ctx.float(&mid) + ctx.float(&half) * u;
            let c = candidate_at(band, x, evaluator, config.symmetry, odd_length, ctx);
            c.error
        })
        .collect();
    if samples.iter().any(|s| !s.is_finite()) {
        return Err(DesignError::NumericalFailure(
            "non-finite error sample while fitting the Chebyshev proxy".into(),
        ));
    }

    let coeffs = chebyshev_coefficients(&samples, ctx);
    let derivative = chebyshev_derivative(&coeffs, ctx);
    let roots = chebyshev_roots(&derivative, backend, ctx)?;
    Ok(roots
        .into_iter()
        .map(|u| ctx.float(&mid) + ctx.float(&half) * u)
        .collect())
}

/// Build a candidate at an off-grid abscissa by re-deriving the frequency
/// and the adjusted desired response and weight from the band functions.
fn candidate_at(
    band: &crate::band::Band,
    x: Float,
    evaluator: &BarycentricEvaluator,
    symmetry: Symmetry,
    odd_length: bool,
    ctx: &PrecisionContext,
) -> Candidate {
    let f = ctx.acos(&x) / ctx.two_pi();
    let (desired, weight) = band.adjusted_at(&f, symmetry, odd_length, ctx);
    let a = evaluator.eval(&x, ctx);
    let error = ctx.float(&weight) * (ctx.float(&desired) - a);
    Candidate {
        f,
        x,
        desired,
        weight,
        error,
    }
}

/// Reconstruct the time-domain taps from the converged response by frequency
/// sampling at `i / num_taps`, undoing the cosine-basis reduction, entirely
/// at the context precision. `f64` rounding happens on the way out.
fn reconstruct_taps(
    num_taps: usize,
    symmetry: Symmetry,
    odd_length: bool,
    evaluator: &BarycentricEvaluator,
    ctx: &PrecisionContext,
) -> Vec<f64> {
    let n = num_taps;
    let two_pi = ctx.two_pi();
    let pi = ctx.pi();
    let n_f = ctx.from_usize(n);

    // Response samples with the reduction factor reapplied.
    let samples: Vec<Float> = (0..=n / 2)
        .map(|i| {
            let f = ctx.from_usize(i) / &n_f;
            let x = ctx.cos(&(ctx.float(&two_pi) * &f));
            let a = evaluator.eval(&x, ctx);
            let c = match (symmetry, odd_length) {
                (Symmetry::Even, true) => ctx.one(),
                (Symmetry::Even, false) => ctx.cos(&(ctx.float(&pi) * &f)),
                (Symmetry::Odd, true) => ctx.sin(&(ctx.float(&two_pi) * &f)),
                (Symmetry::Odd, false) => ctx.sin(&(ctx.float(&pi) * &f)),
            };
            a * c
        })
        .collect();

    let m = ctx.float(&n_f) - 1u32;
    let center = m / 2u32;
    let upper = match (symmetry, odd_length) {
        (_, true) => (n - 1) / 2,
        (_, false) => n / 2 - 1,
    };

    (0..n)
        .map(|j| {
            let offset = ctx.from_usize(j) - &center;
            let base_angle = ctx.float(&two_pi) * &offset / &n_f;
            let mut val = match (symmetry, odd_length) {
                (Symmetry::Even, _) => ctx.float(&samples[0]),
                (Symmetry::Odd, true) => ctx.zero(),
                (Symmetry::Odd, false) => {
                    ctx.float(&samples[n / 2]) * ctx.sin(&(ctx.float(&pi) * &offset))
                }
            };
            for (k, sample) in samples.iter().enumerate().take(upper + 1).skip(1) {
                let angle = ctx.float(&base_angle) * ctx.from_usize(k);
                let basis = match symmetry {
                    Symmetry::Even => ctx.cos(&angle),
                    Symmetry::Odd => ctx.sin(&angle),
                };
                val += ctx.float(sample) * basis * 2u32;
            }
            ctx.to_f64(&(val / &n_f))
        })
        .collect()
}

fn diverged(
    iterations: usize,
    error_trace: &[f64],
    num_taps: usize,
    config: &DesignConfig,
    evaluator: &BarycentricEvaluator,
    ctx: &PrecisionContext,
) -> DesignError {
    let odd_length = num_taps % 2 == 1;
    DesignError::Diverged {
        iterations,
        last_taps: reconstruct_taps(num_taps, config.symmetry, odd_length, evaluator, ctx),
        error_trace: error_trace.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band::{constant, inverse_sinc, Band};

    fn cic_spec() -> BandSpec {
        BandSpec::new(vec![
            Band::new(0.0, 0.2, inverse_sinc(16), constant(1.0)).unwrap(),
            Band::new(0.25, 0.5, constant(0.0), constant(1.0)).unwrap(),
        ])
        .unwrap()
    }

    fn lowpass_spec() -> BandSpec {
        BandSpec::new(vec![
            Band::new(0.0, 0.2, constant(1.0), constant(1.0)).unwrap(),
            Band::new(0.3, 0.5, constant(0.0), constant(1.0)).unwrap(),
        ])
        .unwrap()
    }

    fn sinc_inv_16(f: f64) -> f64 {
        if f == 0.0 {
            1.0
        } else {
            let x = std::f64::consts::PI * f;
            (x / x.sin()).powi(16)
        }
    }

    #[test]
    fn test_order_zero_is_invalid() {
        match design_filter(0, &cic_spec(), 128) {
            Err(DesignError::InvalidSpecification(_)) => {}
            other => panic!("expected InvalidSpecification, got {other:?}"),
        }
    }

    #[test]
    fn test_tiny_order_is_invalid() {
        assert!(matches!(
            design_filter(2, &cic_spec(), 128),
            Err(DesignError::InvalidSpecification(_))
        ));
    }

    #[test]
    fn test_cic_compensator_converges() {
        let ctx = PrecisionContext::new(256);
        let design =
            design_filter_with(64, &cic_spec(), &DesignConfig::default(), &ctx).unwrap();

        assert!(design.converged);
        assert_eq!(design.taps.len(), 65);
        assert!(design.weighted_error > 0.0);
        assert!(design.weighted_error < 1e-2, "{}", design.weighted_error);

        // Linear phase: symmetric taps.
        for i in 0..=32 {
            let a = design.taps[i];
            let b = design.taps[64 - i];
            assert!((a - b).abs() < 1e-12, "tap {i}: {a} vs {b}");
        }

        // Passband tracks the inverse droop to the equiripple level.
        for k in 0..=80 {
            let f = 0.2 * k as f64 / 80.0;
            let h = crate::response::amplitude_at(&design.taps, f);
            let want = sinc_inv_16(f);
            assert!(
                (h - want).abs() <= design.weighted_error * 1.05 + 1e-12,
                "passband deviation at f = {f}: {h} vs {want}"
            );
        }
        // Stopband floor.
        for k in 0..=80 {
            let f = 0.25 + 0.25 * k as f64 / 80.0;
            let h = crate::response::amplitude_at(&design.taps, f);
            assert!(
                h <= design.weighted_error * 1.05 + 1e-12,
                "stopband leakage at f = {f}: {h}"
            );
        }
    }

    #[test]
    fn test_equioscillation_at_reference() {
        let ctx = PrecisionContext::new(256);
        let design =
            design_filter_with(64, &cic_spec(), &DesignConfig::default(), &ctx).unwrap();
        assert_eq!(design.reference_frequencies.len(), 34);

        let errors: Vec<f64> = design
            .reference_frequencies
            .iter()
            .map(|&f| {
                let desired = if f <= 0.2 { sinc_inv_16(f) } else { 0.0 };
                desired - crate::response::amplitude_at(&design.taps, f)
            })
            .collect();
        for pair in errors.windows(2) {
            assert!(
                pair[0] * pair[1] < 0.0,
                "reference errors must alternate: {pair:?}"
            );
        }
        let max = design.weighted_error;
        for (i, e) in errors.iter().enumerate() {
            assert!(
                (e.abs() - max).abs() <= max * 0.05 + 1e-12,
                "reference {i}: |{e}| vs level {max}"
            );
        }
    }

    #[test]
    fn test_monotonic_error_improvement() {
        let ctx = PrecisionContext::new(256);
        let design =
            design_filter_with(64, &cic_spec(), &DesignConfig::default(), &ctx).unwrap();
        assert!(design.error_trace.len() >= 2);
        // Non-increasing up to grid-discretization jitter.
        for pair in design.error_trace.windows(2) {
            assert!(
                pair[1] <= pair[0] * (1.0 + 1e-6),
                "error trace increased: {pair:?}"
            );
        }
    }

    #[test]
    fn test_idempotent_runs() {
        let ctx = PrecisionContext::new(192);
        let config = DesignConfig::default();
        let a = design_filter_with(40, &lowpass_spec(), &config, &ctx).unwrap();
        let b = design_filter_with(40, &lowpass_spec(), &config, &ctx).unwrap();
        assert_eq!(a.iterations, b.iterations);
        for (p, q) in a.taps.iter().zip(&b.taps) {
            assert!((p - q).abs() < 1e-15);
        }
    }

    #[test]
    fn test_eigen_always_strategy_converges() {
        let ctx = PrecisionContext::new(192);
        let config = DesignConfig::default().with_strategy(ExchangeStrategy::EigenAlways);
        let design = design_filter_with(24, &lowpass_spec(), &config, &ctx).unwrap();
        assert!(design.converged);
        assert_eq!(design.taps.len(), 25);
        for i in 0..=12 {
            assert!((design.taps[i] - design.taps[24 - i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_classical_only_strategy_converges() {
        let ctx = PrecisionContext::new(192);
        // Without off-grid refinement the reference-error spread bottoms out
        // at the grid discretization, so allow a coarser flatness target.
        let config = DesignConfig::default()
            .with_strategy(ExchangeStrategy::ClassicalOnly)
            .with_flatness_tolerance(1e-3);
        let design = design_filter_with(32, &lowpass_spec(), &config, &ctx).unwrap();
        assert!(design.converged);
        assert_eq!(design.taps.len(), 33);
    }

    #[test]
    fn test_antisymmetric_design() {
        // Odd symmetry, even tap count: taps must come out antisymmetric
        // about the center.
        let ctx = PrecisionContext::new(192);
        let spec = BandSpec::new(vec![
            Band::new(0.0, 0.2, constant(0.0), constant(1.0)).unwrap(),
            Band::new(0.3, 0.5, constant(1.0), constant(1.0)).unwrap(),
        ])
        .unwrap();
        let config = DesignConfig::default().with_symmetry(Symmetry::Odd);
        let design = design_filter_with(25, &spec, &config, &ctx).unwrap();
        assert!(design.converged);
        assert_eq!(design.taps.len(), 26);
        for i in 0..13 {
            let a = design.taps[i];
            let b = design.taps[25 - i];
            assert!((a + b).abs() < 1e-12, "tap {i}: {a} vs {b}");
        }
    }

    #[test]
    fn test_narrow_transition_never_pretends_convergence() {
        // A transition band far too narrow for the order, with a convergence
        // bar the loop cannot clear in the allowed iterations.
        let ctx = PrecisionContext::new(192);
        let spec = BandSpec::new(vec![
            Band::new(0.0, 0.2400, constant(1.0), constant(1.0)).unwrap(),
            Band::new(0.2401, 0.5, constant(0.0), constant(1.0)).unwrap(),
        ])
        .unwrap();
        let config = DesignConfig::default()
            .with_strategy(ExchangeStrategy::ClassicalOnly)
            .with_max_iterations(4)
            .with_flatness_tolerance(1e-12);
        match design_filter_with(10, &spec, &config, &ctx) {
            Err(DesignError::Diverged { .. }) => {}
            Err(DesignError::MaxIterationsExceeded { best, .. }) => {
                assert!(!best.converged);
            }
            other => panic!("expected a failure state, got {other:?}"),
        }
    }

    #[test]
    fn test_return_best_policy_flags_result() {
        let ctx = PrecisionContext::new(192);
        let config = DesignConfig::default()
            .with_max_iterations(1)
            .with_flatness_tolerance(1e-30)
            .with_max_iter_policy(MaxIterPolicy::ReturnBest);
        let design = design_filter_with(40, &lowpass_spec(), &config, &ctx).unwrap();
        assert!(!design.converged);
        assert_eq!(design.taps.len(), 41);
        assert_eq!(design.iterations, 1);
    }

    #[test]
    fn test_diverged_carries_diagnostics() {
        let ctx = PrecisionContext::new(192);
        let spec = BandSpec::new(vec![
            Band::new(0.0, 0.2400, constant(1.0), constant(1.0)).unwrap(),
            Band::new(0.2401, 0.5, constant(0.0), constant(1.0)).unwrap(),
        ])
        .unwrap();
        let config = DesignConfig::default()
            .with_strategy(ExchangeStrategy::ClassicalOnly)
            .with_flatness_tolerance(1e-30)
            .with_stall_iterations(2)
            .with_max_iterations(50);
        match design_filter_with(10, &spec, &config, &ctx) {
            Err(DesignError::Diverged {
                iterations,
                last_taps,
                error_trace,
            }) => {
                assert!(iterations >= 1);
                assert_eq!(last_taps.len(), 11);
                assert_eq!(error_trace.len(), iterations);
            }
            Err(DesignError::MaxIterationsExceeded { best, .. }) => {
                assert!(!best.converged);
            }
            other => panic!("expected a failure state, got {other:?}"),
        }
    }
}
