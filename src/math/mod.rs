//! Mathematical utilities: linear solves and number formatting.

pub mod numfmt;
pub mod ols;

pub use numfmt::*;
pub use ols::*;
