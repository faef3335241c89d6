//! Reporting utilities: formatted terminal output.
//!
//! Formatting lives here so the session and fitting code stay free of
//! presentation details.

pub mod format;

pub use format::*;
