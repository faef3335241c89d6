//! Curve fitting.
//!
//! Responsibilities:
//!
//! - guess initial parameters of a new function from the residual signal
//! - minimize WSSR over the fitted parameters (Levenberg–Marquardt)
//! - compute goodness-of-fit statistics

pub mod fitter;
pub mod guess;
pub mod stats;

pub use fitter::*;
pub use guess::*;
pub use stats::*;
