//! `peakfit` library crate.
//!
//! The binary (`peakfit`) is a thin wrapper around this library so that:
//!
//! - the session engine is testable without spawning processes
//! - the command language can be driven from other programs
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
pub mod session;
