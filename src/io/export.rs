//! Export per-point results to CSV.
//!
//! The export is meant to be easy to consume in spreadsheets or downstream scripts.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::{Dataset, Function};
use crate::error::AppError;
use crate::models::model_value;

/// Write `x,y,sigma,active,model,residual` for every point of `ds`.
pub fn write_points_csv(path: &Path, ds: &Dataset, functions: &[Function]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create export CSV '{}': {e}", path.display())))?;
    let mut out = BufWriter::new(file);
    let write_err = |e: std::io::Error| AppError::io(format!("Failed to write export CSV '{}': {e}", path.display()));

    writeln!(out, "x,y,sigma,active,model,residual").map_err(write_err)?;
    for p in &ds.points {
        let model = model_value(ds, p.x, |name| functions.iter().find(|f| f.name == name));
        writeln!(
            out,
            "{},{},{},{},{:.10},{:.10}",
            p.x,
            p.y,
            p.sigma,
            u8::from(p.is_active),
            model,
            p.y - model
        )
        .map_err(write_err)?;
    }
    out.flush().map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FunctionKind, Param, Point};

    #[test]
    fn csv_has_header_and_residuals() {
        let ds = Dataset {
            title: "t".to_string(),
            filename: String::new(),
            points: vec![Point::new(1.0, 5.0, 1.0), Point::new(2.0, 4.0, 2.0)],
            model: vec!["c".to_string()],
        };
        let funcs = vec![Function {
            name: "c".to_string(),
            kind: FunctionKind::Constant,
            params: vec![Param::fitted(4.5)],
        }];
        let path = std::env::temp_dir().join(format!("peakfit_export_{}.csv", std::process::id()));
        write_points_csv(&path, &ds, &funcs).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "x,y,sigma,active,model,residual");
        assert_eq!(lines[1], "1,5,1,1,4.5000000000,0.5000000000");
        assert_eq!(lines[2], "2,4,2,1,4.5000000000,-0.5000000000");
    }
}
