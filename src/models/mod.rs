//! Built-in function shapes.
//!
//! Shapes are implemented as small, pure functions so that guessing and
//! fitting code can stay generic.

pub mod model;

pub use model::*;
