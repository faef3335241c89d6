//! Domain types used throughout the session engine.
//!
//! This module defines:
//!
//! - observations and datasets (`Point`, `Dataset`)
//! - model building blocks (`FunctionKind`, `Function`, `Param`, `Variable`)
//! - fit outputs (`FitStats`)

pub mod types;

pub use types::*;
