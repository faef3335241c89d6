//! The sample driver: one dataset, one peak, one fit, one dumped session.
//!
//! `GaussianFitter` wraps a `Session` by composition and exposes the three
//! steps of the flow. Text output goes to any `Write` so the whole sequence
//! can be checked in tests.

use std::io::Write;
use std::path::Path;

use crate::domain::FunctionKind;
use crate::error::AppError;
use crate::math::format_g;
use crate::session::Session;

/// What `initialize` reports about the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryInfo {
    pub version: String,
    pub ln2: f64,
}

/// Values read back after `guess_and_fit`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitSummary {
    pub wssr: f64,
    pub center: f64,
}

/// Version string and `ln(2)` from a throwaway session.
pub fn initialize() -> Result<LibraryInfo, AppError> {
    let mut s = Session::new();
    Ok(LibraryInfo {
        version: s.get_info("version")?,
        ln2: s.calculate_expr("ln(2)")?,
    })
}

#[derive(Debug)]
pub struct GaussianFitter {
    session: Session,
    filename: String,
    name: String,
    shape: FunctionKind,
}

impl GaussianFitter {
    /// Load `filename` into `@0` of `session`.
    pub fn new(session: Session, filename: &str) -> Result<Self, AppError> {
        if !Path::new(filename).is_file() {
            return Err(AppError::io(format!("File '{filename}' not found.")));
        }
        let mut fitter = Self {
            session,
            filename: filename.to_string(),
            name: "g".to_string(),
            shape: FunctionKind::Gaussian,
        };
        fitter.session.execute(&format!("@0 < '{filename}'"))?;
        Ok(fitter)
    }

    /// Use another function name / peak shape.
    pub fn with_function(mut self, name: &str, shape: FunctionKind) -> Self {
        self.name = name.to_string();
        self.shape = shape;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn data_info(&mut self) -> Result<String, AppError> {
        self.session.get_info("data in @0")
    }

    /// Guess the peak, fit, and report WSSR and the fitted center.
    pub fn guess_and_fit<W: Write>(&mut self, out: &mut W) -> Result<FitSummary, AppError> {
        self.session
            .execute(&format!("%{} = guess {}", self.name, self.shape))?;
        writeln!(out, "Fitting {} ...", self.filename).map_err(write_err)?;
        self.session.execute("fit")?;

        let summary = FitSummary {
            wssr: self.session.get_wssr()?,
            center: self
                .session
                .calculate_expr(&format!("%{}.center", self.name))?,
        };
        writeln!(out, "WSSR= {}", format_g(summary.wssr, 6)).map_err(write_err)?;
        writeln!(out, "{} center: {}", self.shape, format_g(summary.center, 5)).map_err(write_err)?;
        Ok(summary)
    }

    pub fn save_session(&mut self, path: &str) -> Result<(), AppError> {
        self.session.execute(&format!("info state > '{path}'"))
    }
}

fn write_err(e: std::io::Error) -> AppError {
    AppError::io(format!("Failed to write output: {e}"))
}

/// The whole flow: header lines, load, guess + fit, dump.
pub fn run_sequence<W: Write>(
    session: Session,
    data: &str,
    session_file: &str,
    name: &str,
    shape: FunctionKind,
    out: &mut W,
) -> Result<(GaussianFitter, FitSummary), AppError> {
    let info = initialize()?;
    writeln!(out, "{}", info.version).map_err(write_err)?;
    writeln!(out, "ln(2) = {:.9}", info.ln2).map_err(write_err)?;

    let mut fitter = GaussianFitter::new(session, data)?.with_function(name, shape);
    let data_info = fitter.data_info()?;
    writeln!(out, "Data info: {data_info}").map_err(write_err)?;

    let summary = fitter.guess_and_fit(out)?;
    fitter.save_session(session_file)?;
    Ok((fitter, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ideal_gaussian, points_to_text};
    use crate::session::ui::MessageSink;

    fn quiet() -> Session {
        let mut s = Session::new();
        s.set_message_sink(MessageSink::Discard);
        s
    }

    fn temp_path(tag: &str) -> String {
        std::env::temp_dir()
            .join(format!("peakfit_driver_{}_{tag}", std::process::id()))
            .display()
            .to_string()
    }

    /// Ideal counts around `mu` with seeded noise added by the session.
    fn write_noisy_gaussian(path: &str, mu: f64, seed: u64) {
        let ideal = ideal_gaussian(mu).unwrap();
        let mut s = quiet();
        s.execute(&format!("set pseudo_random_seed = {seed}")).unwrap();
        for i in 0..ideal.x.len() {
            s.add_point(ideal.x[i], ideal.y[i], ideal.sigma[i]).unwrap();
        }
        s.execute("Y = randnormal(y, s)").unwrap();
        std::fs::write(path, points_to_text(s.get_data(0).unwrap())).unwrap();
    }

    #[test]
    fn sequence_prints_lines_in_order_and_finds_center() {
        let data_path = format!("{}.dat", temp_path("data"));
        let dump_path = format!("{}.fit", temp_path("dump"));
        write_noisy_gaussian(&data_path, 12.345, 3);

        let mut out = Vec::new();
        let (mut fitter, summary) =
            run_sequence(quiet(), &data_path, &dump_path, "g", FunctionKind::Gaussian, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        let pos = |needle: &str| text.find(needle).unwrap_or_else(|| panic!("missing `{needle}` in:\n{text}"));
        let order = [
            pos("peakfit "),
            pos("ln(2) = 0.693147181"),
            pos("Data info: "),
            pos("Fitting "),
            pos("WSSR= "),
            pos("Gaussian center: "),
        ];
        assert!(order.windows(2).all(|w| w[0] < w[1]), "{text}");

        assert!(summary.wssr.is_finite() && summary.wssr > 0.0);
        assert!((summary.center - 12.345).abs() < 0.05, "center={}", summary.center);

        // Reading an expression twice without a fit gives the same value.
        let a = fitter.session_mut().calculate_expr("%g.center").unwrap();
        let b = fitter.session_mut().calculate_expr("%g.center").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, summary.center);

        // The dumped session replays to the same fit state.
        let mut replay = quiet();
        replay.execute(&format!("exec '{dump_path}'")).unwrap();
        assert_eq!(replay.get_wssr().unwrap(), summary.wssr);
        assert_eq!(replay.calculate_expr("%g.center").unwrap(), summary.center);

        let _ = std::fs::remove_file(&data_path);
        let _ = std::fs::remove_file(&dump_path);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = GaussianFitter::new(quiet(), "/nonexistent/nacl01.dat").unwrap_err();
        assert_eq!(err.message(), "File '/nonexistent/nacl01.dat' not found.");
    }

    #[test]
    fn initialize_has_no_side_effects() {
        let info = initialize().unwrap();
        assert!(info.version.starts_with("peakfit "));
        assert!((info.ln2 - std::f64::consts::LN_2).abs() < 1e-15);
    }
}
