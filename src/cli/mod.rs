//! Command-line parsing for the peak fitter.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! session and fitting code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::FunctionKind;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "peakfit", version, about = "Peak fitting sessions driven by a small command language")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load a data file, guess a peak, fit it and dump the session.
    ///
    /// This is what runs when no arguments are given.
    Hello(HelloArgs),
    /// Fit a generated noisy Gaussian loaded from arrays.
    Synth(SynthArgs),
    /// Run command scripts in one session.
    Exec(ExecArgs),
    /// Plot a previously exported model JSON.
    Plot(PlotArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct HelloArgs {
    /// Data file to load into `@0`.
    #[arg(long, value_name = "FILE", default_value = "nacl01.dat")]
    pub data: PathBuf,

    /// Where to write the session script.
    #[arg(long, value_name = "FILE", default_value = "tmp_dump.fit")]
    pub session: PathBuf,

    /// Peak shape to guess and fit.
    #[arg(long, value_enum, default_value_t = FunctionKind::Gaussian)]
    pub shape: FunctionKind,

    /// Name of the peak function (without `%`).
    #[arg(long, default_value = "g")]
    pub name: String,

    /// Render an ASCII plot of data and model.
    #[arg(long)]
    pub plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Export per-point results to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,

    /// Export the fitted model (functions + grid) to JSON.
    #[arg(long = "export-model", value_name = "JSON")]
    pub export_model: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct SynthArgs {
    /// True peak center.
    #[arg(long, default_value_t = 12.345)]
    pub center: f64,

    /// Random seed for the noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Also write the generated data as a text file.
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct ExecArgs {
    /// Script files, run in order.
    #[arg(value_name = "SCRIPT", required = true)]
    pub scripts: Vec<PathBuf>,
}

/// Options for plotting a saved model.
#[derive(Debug, Parser)]
pub struct PlotArgs {
    /// Model JSON file produced by `peakfit hello --export-model`.
    #[arg(long, value_name = "JSON")]
    pub model: PathBuf,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_defaults() {
        let cli = Cli::parse_from(["peakfit", "hello"]);
        let Command::Hello(args) = cli.command else {
            panic!("expected hello");
        };
        assert_eq!(args.data, PathBuf::from("nacl01.dat"));
        assert_eq!(args.session, PathBuf::from("tmp_dump.fit"));
        assert_eq!(args.shape, FunctionKind::Gaussian);
        assert!(!args.plot);
    }

    #[test]
    fn shape_and_exec_scripts() {
        let cli = Cli::parse_from(["peakfit", "hello", "--shape", "pseudovoigt"]);
        assert!(matches!(cli.command, Command::Hello(HelloArgs { shape: FunctionKind::PseudoVoigt, .. })));

        let cli = Cli::parse_from(["peakfit", "exec", "a.fit", "b.fit"]);
        let Command::Exec(args) = cli.command else {
            panic!("expected exec");
        };
        assert_eq!(args.scripts.len(), 2);
        assert!(Cli::try_parse_from(["peakfit", "exec"]).is_err());
    }
}
