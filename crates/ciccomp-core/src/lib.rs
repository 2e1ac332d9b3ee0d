//! # CIC Compensator Design Core
//!
//! This crate synthesizes optimal equiripple (minimax) FIR filter
//! coefficients from a frequency-domain amplitude specification, built for
//! designing compensation filters that flatten the `sinc^N` passband droop
//! of cascaded integrator-comb (CIC) decimation and interpolation chains.
//!
//! ## Overview
//!
//! The engine is an exchange iteration over a reference set of extremal
//! frequencies:
//!
//! - **Band specification**: desired gain and error weight as functions of
//!   normalized frequency over disjoint bands
//! - **Chebyshev grid**: dense, edge-concentrated sampling of the bands for
//!   extremum location
//! - **Barycentric evaluation**: numerically stable interpolation of the
//!   current response estimate at any frequency
//! - **Eigenvalue refinement**: off-grid extremum location via the colleague
//!   matrix of a Chebyshev proxy of the error
//! - **Exchange driver**: the iterative loop with convergence, divergence
//!   and iteration-bound terminal states
//!
//! All numerically sensitive work runs under an explicit multiprecision
//! [`precision::PrecisionContext`]; results are rounded to `f64` only at the
//! output boundary.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ciccomp_core::{
//!     band::{constant, inverse_sinc, Band, BandSpec},
//!     design_filter, output,
//! };
//!
//! // Compensator for a 16-stage CIC: invert the droop across the passband,
//! // reject everything past the decimated Nyquist margin.
//! let spec = BandSpec::new(vec![
//!     Band::new(0.0, 0.2, inverse_sinc(16), constant(1.0)).unwrap(),
//!     Band::new(0.25, 0.5, constant(0.0), constant(1.0)).unwrap(),
//! ])
//! .unwrap();
//!
//! let design = design_filter(64, &spec, 512).unwrap();
//! output::write_taps("ciccomp.dat", &design.taps).unwrap();
//! ```
//!
//! ## Parallelism
//!
//! With the `parallel` feature (enabled by default) the dense-grid error
//! evaluation is partitioned across the rayon thread pool; each iteration
//! joins at a barrier before the sequential reference update. Runs own their
//! context and share no mutable state, so independent designs can execute
//! concurrently.

pub mod band;
pub mod barycentric;
pub mod cheby_grid;
pub mod eigen;
pub mod error;
pub mod observe;
pub mod output;
pub mod precision;
pub mod remez;
pub mod response;

pub use band::{constant, inverse_sinc, Band, BandSpec, Symmetry};
pub use error::{DesignError, DesignResult};
pub use precision::PrecisionContext;
pub use remez::{
    design_filter, design_filter_with, DesignConfig, ExchangeStrategy, FilterDesign,
    MaxIterPolicy,
};
