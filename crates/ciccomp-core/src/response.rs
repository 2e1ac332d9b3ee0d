//! Frequency-response checks on finished tap vectors.
//!
//! These helpers operate on the `f64` coefficient vector at the output
//! boundary; the design iteration itself never goes through them. They back
//! the crate's own verification tests and give downstream consumers a quick
//! way to sanity-check an artifact without the external spectrum tooling.

use num_complex::Complex64;
use std::f64::consts::PI;

/// Amplitude response `|H(f)|` of a tap vector at normalized frequency `f`
/// (cycles/sample, Nyquist at 0.5).
pub fn amplitude_at(taps: &[f64], f: f64) -> f64 {
    let omega = 2.0 * PI * f;
    let mut acc = Complex64::new(0.0, 0.0);
    for (n, &h) in taps.iter().enumerate() {
        acc += h * Complex64::new(0.0, -omega * n as f64).exp();
    }
    acc.norm()
}

/// Amplitude response at `num_points` equally spaced frequencies from 0 to
/// 0.5 inclusive. Returns `(frequencies, magnitudes)`.
pub fn amplitude_response(taps: &[f64], num_points: usize) -> (Vec<f64>, Vec<f64>) {
    let denom = (num_points.max(2) - 1) as f64;
    let freqs: Vec<f64> = (0..num_points.max(2))
        .map(|i| 0.5 * i as f64 / denom)
        .collect();
    let mags = freqs.iter().map(|&f| amplitude_at(taps, f)).collect();
    (freqs, mags)
}

/// CIC passband droop `sinc(f)^stages` with `sinc(f) = sin(pi f) / (pi f)`.
/// This is the curve a compensator's passband response is meant to invert.
pub fn cic_droop(f: f64, stages: u32) -> f64 {
    if f == 0.0 {
        return 1.0;
    }
    let x = PI * f;
    (x.sin() / x).powi(stages as i32)
}

/// Largest deviation of `|H(f)|` from `desired(f)` over `[lo, hi]`, scanned
/// at `points` equally spaced frequencies.
pub fn peak_deviation<F>(taps: &[f64], lo: f64, hi: f64, desired: F, points: usize) -> f64
where
    F: Fn(f64) -> f64,
{
    let denom = (points.max(2) - 1) as f64;
    (0..points.max(2))
        .map(|i| {
            let f = lo + (hi - lo) * i as f64 / denom;
            (amplitude_at(taps, f) - desired(f)).abs()
        })
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moving_average_response() {
        // 4-tap boxcar: |H(0)| = 1, null at f = 0.25.
        let taps = [0.25; 4];
        assert!((amplitude_at(&taps, 0.0) - 1.0).abs() < 1e-12);
        assert!(amplitude_at(&taps, 0.25) < 1e-12);
    }

    #[test]
    fn test_single_tap_is_allpass() {
        let taps = [1.0];
        for k in 0..=10 {
            let f = 0.05 * k as f64;
            assert!((amplitude_at(&taps, f) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_amplitude_response_shape() {
        let taps = [0.25; 4];
        let (freqs, mags) = amplitude_response(&taps, 65);
        assert_eq!(freqs.len(), 65);
        assert_eq!(mags.len(), 65);
        assert_eq!(freqs[0], 0.0);
        assert!((freqs[64] - 0.5).abs() < 1e-15);
        assert!((mags[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cic_droop_endpoints() {
        assert_eq!(cic_droop(0.0, 16), 1.0);
        let d = cic_droop(0.2, 16);
        assert!(d < 1.0 && d > 0.0);
        // One stage at f = 0.5: sin(pi/2)/(pi/2) = 2/pi.
        assert!((cic_droop(0.5, 1) - 2.0 / PI).abs() < 1e-15);
    }

    #[test]
    fn test_peak_deviation_of_exact_match() {
        let taps = [0.25; 4];
        let dev = peak_deviation(&taps, 0.0, 0.0, |_| 1.0, 2);
        assert!(dev < 1e-12);
    }
}
