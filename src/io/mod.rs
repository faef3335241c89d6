//! Output files.
//!
//! - per-point results as CSV (`export`)
//! - model JSON read/write (`curve`)

pub mod curve;
pub mod export;

pub use curve::*;
pub use export::*;
