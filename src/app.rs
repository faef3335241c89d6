//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - runs the hello / synth / exec flows against a session
//! - prints reports/plots
//! - writes optional exports

use clap::Parser;

use crate::cli::{Command, ExecArgs, HelloArgs, PlotArgs, SynthArgs};
use crate::error::AppError;
use crate::session::Session;

pub mod driver;

/// Entry point for the `peakfit` binary.
pub fn run() -> Result<(), AppError> {
    // `peakfit` with no arguments runs the fixed sample flow, so rewrite argv
    // to `peakfit hello` before clap sees it.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Hello(args) => handle_hello(args),
        Command::Synth(args) => handle_synth(args),
        Command::Exec(args) => handle_exec(args),
        Command::Plot(args) => handle_plot(args),
    }
}

fn handle_hello(args: HelloArgs) -> Result<(), AppError> {
    let session = Session::from_env()?;
    let mut out = std::io::stdout();
    let (fitter, _summary) = driver::run_sequence(
        session,
        &args.data.display().to_string(),
        &args.session.display().to_string(),
        &args.name,
        args.shape,
        &mut out,
    )?;

    let session = fitter.session();
    let ds = &session.datasets()[session.default_dataset()];

    if args.plot {
        let plot = crate::plot::render_dataset_plot(ds, session.functions(), args.width, args.height);
        println!("{plot}");
    }

    // Optional exports.
    if let Some(path) = &args.export {
        crate::io::export::write_points_csv(path, ds, session.functions())?;
    }
    if let Some(path) = &args.export_model {
        let model = crate::io::curve::model_file_from_session(session)?;
        crate::io::curve::write_model_json(path, &model)?;
    }

    Ok(())
}

/// Point-by-point flow: ideal counts go in with `add_point`, then the
/// session itself adds the noise with a data transformation.
fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let ideal = crate::data::ideal_gaussian(args.center)?;

    let mut session = Session::from_env()?;
    println!("{}", session.get_info("version")?);
    session.execute(&format!("set pseudo_random_seed = {}", args.seed))?;
    for ((&x, &y), &sigma) in ideal.x.iter().zip(&ideal.y).zip(&ideal.sigma) {
        session.add_point(x, y, sigma)?;
    }
    session.execute("title = 'synthetic'; Y = randnormal(y, s)")?;
    if let Some(path) = &args.out {
        let text = crate::data::points_to_text(session.get_data(0)?);
        std::fs::write(path, text)
            .map_err(|e| AppError::io(format!("Failed to write data file '{}': {e}", path.display())))?;
    }

    session.execute("guess %gauss = Gaussian")?;
    session.execute("fit")?;
    println!(
        "peak center: {}",
        crate::math::format_g(session.calculate_expr("%gauss.Center")?, 6)
    );
    Ok(())
}

fn handle_exec(args: ExecArgs) -> Result<(), AppError> {
    let mut session = Session::from_env()?;
    for script in &args.scripts {
        session.exec_file(script)?;
    }
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let model = crate::io::curve::read_model_json(&args.model)?;
    let plot = crate::plot::render_model_file_plot(&model, args.width, args.height);
    println!("{plot}");
    Ok(())
}

/// Rewrite argv so `peakfit` defaults to `peakfit hello`.
///
/// Rules:
/// - `peakfit`                          -> `peakfit hello`
/// - `peakfit --data x.dat ...`         -> `peakfit hello --data x.dat ...`
/// - `peakfit --help/--version/-h`      -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("hello".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(
        arg1.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg1.as_str(), "hello" | "synth" | "exec" | "plot");
    if is_subcommand {
        return argv;
    }

    // A leading flag belongs to `hello`.
    if arg1.starts_with('-') {
        argv.insert(1, "hello".to_string());
        return argv;
    }

    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_arguments_run_hello() {
        assert_eq!(rewrite_args(args(&["peakfit"])), args(&["peakfit", "hello"]));
        assert_eq!(
            rewrite_args(args(&["peakfit", "--plot"])),
            args(&["peakfit", "hello", "--plot"])
        );
    }

    #[test]
    fn subcommands_and_help_untouched() {
        for v in [vec!["peakfit", "exec", "a.fit"], vec!["peakfit", "--help"], vec!["peakfit", "-V"]] {
            assert_eq!(rewrite_args(args(&v)), args(&v));
        }
    }
}
