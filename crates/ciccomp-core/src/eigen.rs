//! Eigenvalue machinery for reference-set refinement.
//!
//! The exchange loop locates off-grid extrema of the weighted error by
//! fitting a Chebyshev proxy to the error over a subinterval, differentiating
//! it, and extracting the derivative's roots as the eigenvalues of its
//! colleague matrix. Because proxy coefficients can span many orders of
//! magnitude for narrow transition bands or high filter orders, the matrix is
//! assembled and decomposed entirely in multiprecision arithmetic.
//!
//! The matrix work sits behind [`EigenBackend`] (`assemble` / `decompose` /
//! `extract_dominant`) so alternative decompositions can be swapped in
//! without touching the exchange driver. [`DenseBackend`] is the provided
//! implementation: Parlett-Reinsch balancing followed by Francis double-shift
//! QR iteration on the (upper Hessenberg) colleague matrix.

use crate::error::{DesignError, DesignResult};
use crate::precision::PrecisionContext;
use rug::Float;
use std::cmp::Ordering;

/// Row-major dense multiprecision matrix.
#[derive(Debug, Clone)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<Float>,
}

impl Matrix {
    /// Zero-initialized matrix at the context precision.
    pub fn new(rows: usize, cols: usize, ctx: &PrecisionContext) -> Self {
        Self {
            rows,
            cols,
            data: (0..rows * cols).map(|_| ctx.zero()).collect(),
        }
    }

    /// Element at (r, c).
    #[inline]
    pub fn get(&self, r: usize, c: usize) -> &Float {
        &self.data[r * self.cols + c]
    }

    /// Overwrite element at (r, c).
    #[inline]
    pub fn set(&mut self, r: usize, c: usize, val: Float) {
        self.data[r * self.cols + c] = val;
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Matrix-vector product.
    pub fn mul_vec(&self, v: &[Float], ctx: &PrecisionContext) -> Vec<Float> {
        debug_assert_eq!(v.len(), self.cols);
        (0..self.rows)
            .map(|i| {
                let mut acc = ctx.zero();
                for j in 0..self.cols {
                    acc += ctx.float(self.get(i, j)) * &v[j];
                }
                acc
            })
            .collect()
    }
}

/// Interchangeable eigenvalue computation for the exchange driver.
///
/// `decompose` returns eigenvalues as `(re, im)` pairs; purely real
/// eigenvalues carry an exactly zero imaginary part.
pub trait EigenBackend {
    /// Build the colleague matrix of a Chebyshev-basis polynomial
    /// `p(u) = sum_k coeffs[k] T_k(u)` with a nonzero leading coefficient.
    /// The matrix is upper Hessenberg; its eigenvalues are the roots of `p`.
    fn assemble(&self, coeffs: &[Float], ctx: &PrecisionContext) -> DesignResult<Matrix>;

    /// Eigenvalues of an upper Hessenberg matrix.
    fn decompose(&self, m: Matrix, ctx: &PrecisionContext) -> DesignResult<Vec<(Float, Float)>>;

    /// Dominant eigenvalue and eigenvector by power iteration.
    fn extract_dominant(
        &self,
        m: &Matrix,
        ctx: &PrecisionContext,
    ) -> DesignResult<(Float, Vec<Float>)>;
}

/// Multiprecision dense backend: balancing + Francis double-shift QR.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseBackend;

/// Iterations allowed per eigenvalue before the decomposition is declared
/// non-convergent.
const QR_ITERATIONS_PER_EIGENVALUE: usize = 30;

/// Power-iteration limit for `extract_dominant`.
const POWER_ITERATIONS: usize = 500;

impl EigenBackend for DenseBackend {
    fn assemble(&self, coeffs: &[Float], ctx: &PrecisionContext) -> DesignResult<Matrix> {
        let n = coeffs.len().saturating_sub(1);
        if n < 2 {
            return Err(DesignError::NumericalFailure(
                "colleague matrix needs a polynomial of degree at least 2".into(),
            ));
        }
        let lead = &coeffs[n];
        if lead.is_zero() || !lead.is_finite() {
            return Err(DesignError::NumericalFailure(
                "colleague matrix has a vanishing leading coefficient".into(),
            ));
        }

        // Upper Hessenberg (transposed) colleague form: tridiagonal halves
        // plus the coefficient row folded into the last column.
        let mut m = Matrix::new(n, n, ctx);
        let half = ctx.from_f64(0.5);
        m.set(1, 0, ctx.one());
        for i in 1..n - 1 {
            m.set(i - 1, i, ctx.float(&half));
            m.set(i + 1, i, ctx.float(&half));
        }
        let scale = ctx.float(lead) * 2u32;
        for j in 0..n {
            let mut v = -(ctx.float(&coeffs[j]) / &scale);
            if j == n - 2 {
                v += &half;
            }
            m.set(j, n - 1, v);
        }
        Ok(m)
    }

    fn decompose(&self, mut m: Matrix, ctx: &PrecisionContext) -> DesignResult<Vec<(Float, Float)>> {
        if m.rows() != m.cols() || m.rows() == 0 {
            return Err(DesignError::NumericalFailure(
                "decomposition requires a non-empty square matrix".into(),
            ));
        }
        balance(&mut m, ctx);
        hqr(&mut m, ctx)
    }

    fn extract_dominant(
        &self,
        m: &Matrix,
        ctx: &PrecisionContext,
    ) -> DesignResult<(Float, Vec<Float>)> {
        let n = m.rows();
        if n == 0 || m.cols() != n {
            return Err(DesignError::NumericalFailure(
                "power iteration requires a non-empty square matrix".into(),
            ));
        }
        let tol = ctx.half_epsilon();
        let mut b: Vec<Float> = (0..n).map(|_| ctx.zero()).collect();
        b[0] = ctx.one();
        let mut eigenvalue = ctx.zero();

        for _ in 0..POWER_ITERATIONS {
            let next = m.mul_vec(&b, ctx);

            // Rayleigh quotient estimate.
            let mut numer = ctx.zero();
            let mut denom = ctx.zero();
            for i in 0..n {
                numer += ctx.float(&next[i]) * &b[i];
                denom += ctx.float(&b[i]) * &b[i];
            }
            let estimate = numer / denom;

            let mut norm_sq = ctx.zero();
            for v in &next {
                norm_sq += ctx.float(v) * v;
            }
            let norm = norm_sq.sqrt();
            if norm.is_zero() {
                break;
            }
            b = next.into_iter().map(|v| v / &norm).collect();

            let converged = ctx.float(&estimate - &eigenvalue).abs() < tol;
            eigenvalue = estimate;
            if converged {
                break;
            }
        }
        Ok((eigenvalue, b))
    }
}

/// Chebyshev interpolation coefficients from samples at the Chebyshev points
/// of the second kind `u_j = cos(pi j / m)`, `j = 0..=m`. Returns `c` such
/// that the interpolant is `sum_k c[k] T_k(u)`.
pub(crate) fn chebyshev_coefficients(samples: &[Float], ctx: &PrecisionContext) -> Vec<Float> {
    let m = samples.len() - 1;
    let pi = ctx.pi();
    let mut c = Vec::with_capacity(m + 1);
    for k in 0..=m {
        // Endpoints enter with half weight; cos(pi k) = (-1)^k at j = m.
        let mut acc = ctx.float(&samples[0]) / 2u32;
        let tail = ctx.float(&samples[m]) / 2u32;
        if k % 2 == 0 {
            acc += tail;
        } else {
            acc -= tail;
        }
        for (j, sample) in samples.iter().enumerate().take(m).skip(1) {
            let angle = ctx.float(&pi) * ctx.from_usize(j * k) / ctx.from_usize(m);
            acc += ctx.cos(&angle) * sample;
        }
        c.push(acc * 2u32 / ctx.from_usize(m));
    }
    c[0] /= 2u32;
    c[m] /= 2u32;
    c
}

/// Chebyshev-basis derivative: given `p = sum c[k] T_k`, returns `d` with
/// `p' = sum d[k] T_k` (one degree lower).
pub(crate) fn chebyshev_derivative(c: &[Float], ctx: &PrecisionContext) -> Vec<Float> {
    let n = c.len() - 1;
    if n == 0 {
        return vec![ctx.zero()];
    }
    let mut d: Vec<Float> = (0..n + 2).map(|_| ctx.zero()).collect();
    for k in (1..=n).rev() {
        d[k - 1] = ctx.float(&d[k + 1]) + ctx.float(&c[k]) * ctx.from_usize(2 * k);
    }
    d[0] /= 2u32;
    d.truncate(n);
    d
}

/// Real roots of a Chebyshev-basis polynomial inside `[-1, 1]`, found as the
/// real eigenvalues of the colleague matrix. Trailing coefficients negligible
/// relative to the largest are trimmed first; a polynomial that is zero to
/// working accuracy has no isolated roots and yields an empty set.
pub(crate) fn chebyshev_roots<B: EigenBackend>(
    coeffs: &[Float],
    backend: &B,
    ctx: &PrecisionContext,
) -> DesignResult<Vec<Float>> {
    let mut max_mag = ctx.zero();
    for c in coeffs {
        let mag = ctx.float(c).abs();
        if mag > max_mag {
            max_mag = mag;
        }
    }
    if max_mag.is_zero() {
        return Ok(Vec::new());
    }
    let threshold = max_mag * ctx.half_epsilon();
    let mut last = 0;
    for (k, c) in coeffs.iter().enumerate() {
        if ctx.float(c).abs() > threshold {
            last = k;
        }
    }
    let coeffs = &coeffs[..=last];
    let n = coeffs.len() - 1;

    // In-interval tolerance: eigenvalues a hair outside [-1, 1] are clamped,
    // anything further out belongs to the complement of the subinterval.
    let slack = 1.0 + 1e-9;

    let mut roots = Vec::new();
    match n {
        0 => {}
        1 => {
            let root = -(ctx.float(&coeffs[0]) / &coeffs[1]);
            let mag = ctx.to_f64(&root).abs();
            if mag <= slack {
                roots.push(clamp_unit(root, ctx));
            }
        }
        _ => {
            let matrix = backend.assemble(coeffs, ctx)?;
            for (re, im) in backend.decompose(matrix, ctx)? {
                if im.is_zero() && ctx.to_f64(&re).abs() <= slack {
                    roots.push(clamp_unit(re, ctx));
                }
            }
        }
    }
    roots.sort_by(|a, b| a.partial_cmp(b).expect("roots are finite"));
    Ok(roots)
}

fn clamp_unit(v: Float, ctx: &PrecisionContext) -> Float {
    if v > 1 {
        ctx.one()
    } else if v < -1 {
        -ctx.one()
    } else {
        v
    }
}

/// Parlett-Reinsch balancing by radix-2 diagonal similarity. Preserves both
/// the eigenvalues and the Hessenberg zero pattern.
fn balance(a: &mut Matrix, ctx: &PrecisionContext) {
    let n = a.rows();
    let point_95 = ctx.from_f64(0.95);
    loop {
        let mut done = true;
        for i in 0..n {
            let mut c = ctx.zero();
            let mut r = ctx.zero();
            for j in 0..n {
                if j != i {
                    c += ctx.float(a.get(j, i)).abs();
                    r += ctx.float(a.get(i, j)).abs();
                }
            }
            if c.is_zero() || r.is_zero() {
                continue;
            }
            let s = ctx.float(&c) + &r;
            let mut f = ctx.one();
            let mut g = ctx.float(&r) / 2u32;
            while c < g {
                f *= 2u32;
                c *= 4u32;
            }
            g = ctx.float(&r) * 2u32;
            while c > g {
                f /= 2u32;
                c /= 4u32;
            }
            if (ctx.float(&c) + &r) / &f < ctx.float(&point_95) * &s {
                done = false;
                for j in 0..n {
                    let scaled = ctx.float(a.get(i, j)) / &f;
                    a.set(i, j, scaled);
                }
                for j in 0..n {
                    let scaled = ctx.float(a.get(j, i)) * &f;
                    a.set(j, i, scaled);
                }
            }
        }
        if done {
            break;
        }
    }
}

/// Magnitude of `mag` with the sign of `sign_of` (positive when `sign_of`
/// is zero).
fn with_sign(mag: Float, sign_of: &Float) -> Float {
    let mag = mag.abs();
    if sign_of.cmp0() == Some(Ordering::Less) {
        -mag
    } else {
        mag
    }
}

/// Francis double-shift QR iteration on an upper Hessenberg matrix,
/// eigenvalues only. Classic explicit-deflation formulation with exceptional
/// shifts after 10 and 20 stalled sweeps per eigenvalue.
fn hqr(a: &mut Matrix, ctx: &PrecisionContext) -> DesignResult<Vec<(Float, Float)>> {
    let n = a.rows();
    let eps = ctx.epsilon();

    let mut anorm = ctx.zero();
    for i in 0..n {
        for j in i.saturating_sub(1)..n {
            anorm += ctx.float(a.get(i, j)).abs();
        }
    }

    let mut eigs: Vec<(Float, Float)> = Vec::with_capacity(n);
    let mut t = ctx.zero();
    let mut nn = n as isize - 1;

    while nn >= 0 {
        let mut its = 0usize;
        loop {
            // Look for a negligible subdiagonal element to split the block.
            let mut l = nn;
            while l >= 1 {
                let (lu, lm) = (l as usize, (l - 1) as usize);
                let mut s = ctx.float(a.get(lm, lm)).abs() + ctx.float(a.get(lu, lu)).abs();
                if s.is_zero() {
                    s = ctx.float(&anorm);
                }
                if ctx.float(a.get(lu, lm)).abs() <= ctx.float(&eps) * &s {
                    a.set(lu, lm, ctx.zero());
                    break;
                }
                l -= 1;
            }

            let nu = nn as usize;
            let mut x = ctx.float(a.get(nu, nu));
            if l == nn {
                // Single real eigenvalue deflates.
                eigs.push((x + &t, ctx.zero()));
                nn -= 1;
                break;
            }

            let mut y = ctx.float(a.get(nu - 1, nu - 1));
            let mut w = ctx.float(a.get(nu, nu - 1)) * a.get(nu - 1, nu);
            if l == nn - 1 {
                // Trailing 2x2 block: real pair or complex conjugate pair.
                let p = (ctx.float(&y) - &x) / 2u32;
                let q = ctx.float(&p) * &p + &w;
                let z = ctx.float(&q).abs().sqrt();
                x += &t;
                if q.cmp0() != Some(Ordering::Less) {
                    let z = ctx.float(&p) + with_sign(z, &p);
                    let first = ctx.float(&x) + &z;
                    let second = if z.is_zero() {
                        ctx.float(&first)
                    } else {
                        ctx.float(&x) - w / &z
                    };
                    eigs.push((first, ctx.zero()));
                    eigs.push((second, ctx.zero()));
                } else {
                    let re = ctx.float(&x) + &p;
                    eigs.push((ctx.float(&re), ctx.float(&z)));
                    eigs.push((re, -z));
                }
                nn -= 2;
                break;
            }

            // No deflation yet: run one double QR sweep on rows l..=nn.
            if its == QR_ITERATIONS_PER_EIGENVALUE {
                return Err(DesignError::NumericalFailure(
                    "eigenvalue decomposition did not converge".into(),
                ));
            }
            if its == 10 || its == 20 {
                // Exceptional shift to break symmetry-induced cycling.
                t += &x;
                for i in 0..=nu {
                    let shifted = ctx.float(a.get(i, i)) - &x;
                    a.set(i, i, shifted);
                }
                let s = ctx.float(a.get(nu, nu - 1)).abs()
                    + ctx.float(a.get(nu - 1, nu - 2)).abs();
                y = ctx.float(&s) * ctx.from_f64(0.75);
                x = ctx.float(&y);
                w = -(ctx.float(&s) * &s * ctx.from_f64(0.4375));
            }
            its += 1;

            // Find two consecutive small subdiagonals working up from the
            // bottom of the block.
            let mut m = nn - 2;
            let mut p = ctx.zero();
            let mut q = ctx.zero();
            let mut r = ctx.zero();
            while m >= l {
                let mu = m as usize;
                let z = ctx.float(a.get(mu, mu));
                let rr = ctx.float(&x) - &z;
                let ss = ctx.float(&y) - &z;
                p = (ctx.float(&rr) * &ss - &w) / a.get(mu + 1, mu) + a.get(mu, mu + 1);
                q = ctx.float(a.get(mu + 1, mu + 1)) - &z - &rr - &ss;
                r = ctx.float(a.get(mu + 2, mu + 1));
                let s = ctx.float(&p).abs() + ctx.float(&q).abs() + ctx.float(&r).abs();
                p /= &s;
                q /= &s;
                r /= &s;
                if m == l {
                    break;
                }
                let u = ctx.float(a.get(mu, mu - 1)).abs()
                    * (ctx.float(&q).abs() + ctx.float(&r).abs());
                let v = ctx.float(&p).abs()
                    * (ctx.float(a.get(mu - 1, mu - 1)).abs()
                        + ctx.float(&z).abs()
                        + ctx.float(a.get(mu + 1, mu + 1)).abs());
                if u <= ctx.float(&eps) * v {
                    break;
                }
                m -= 1;
            }
            let mu = m as usize;
            for i in mu + 2..=nu {
                a.set(i, i - 2, ctx.zero());
                if i > mu + 2 {
                    a.set(i, i - 3, ctx.zero());
                }
            }

            // Bulge chase.
            for k in mu..nu {
                if k != mu {
                    p = ctx.float(a.get(k, k - 1));
                    q = ctx.float(a.get(k + 1, k - 1));
                    r = if k != nu - 1 {
                        ctx.float(a.get(k + 2, k - 1))
                    } else {
                        ctx.zero()
                    };
                    x = ctx.float(&p).abs() + ctx.float(&q).abs() + ctx.float(&r).abs();
                    if !x.is_zero() {
                        p /= &x;
                        q /= &x;
                        r /= &x;
                    }
                }
                let norm =
                    (ctx.float(&p) * &p + ctx.float(&q) * &q + ctx.float(&r) * &r).sqrt();
                let s = with_sign(norm, &p);
                if s.is_zero() {
                    continue;
                }
                if k == mu {
                    if l != m {
                        let flipped = -ctx.float(a.get(k, k - 1));
                        a.set(k, k - 1, flipped);
                    }
                } else {
                    a.set(k, k - 1, -(ctx.float(&s) * &x));
                }
                p += &s;
                x = ctx.float(&p) / &s;
                y = ctx.float(&q) / &s;
                let z = ctx.float(&r) / &s;
                q /= &p;
                r /= &p;

                // Row modification.
                for j in k..=nu {
                    let mut pj = ctx.float(a.get(k, j)) + ctx.float(&q) * a.get(k + 1, j);
                    if k != nu - 1 {
                        pj += ctx.float(&r) * a.get(k + 2, j);
                        let updated = ctx.float(a.get(k + 2, j)) - ctx.float(&pj) * &z;
                        a.set(k + 2, j, updated);
                    }
                    let updated = ctx.float(a.get(k + 1, j)) - ctx.float(&pj) * &y;
                    a.set(k + 1, j, updated);
                    let updated = ctx.float(a.get(k, j)) - ctx.float(&pj) * &x;
                    a.set(k, j, updated);
                }

                // Column modification.
                let mmin = nu.min(k + 3);
                for i in (l as usize)..=mmin {
                    let mut pi = ctx.float(&x) * a.get(i, k) + ctx.float(&y) * a.get(i, k + 1);
                    if k != nu - 1 {
                        pi += ctx.float(&z) * a.get(i, k + 2);
                        let updated = ctx.float(a.get(i, k + 2)) - ctx.float(&pi) * &r;
                        a.set(i, k + 2, updated);
                    }
                    let updated = ctx.float(a.get(i, k + 1)) - ctx.float(&pi) * &q;
                    a.set(i, k + 1, updated);
                    let updated = ctx.float(a.get(i, k)) - &pi;
                    a.set(i, k, updated);
                }
            }
        }
    }
    Ok(eigs)
}
