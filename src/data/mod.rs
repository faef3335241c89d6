//! Dataset readers.
//!
//! - plain text columns (`text`, the default format)
//! - Siemens/Bruker UXD (`uxd`)
//! - synthetic Gaussian counts (`synth`)
//!
//! `load_file` picks the reader from the file extension and turns the raw
//! columns into sorted `Point`s with sigma filled in.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::domain::{DefaultSigma, Point};
use crate::error::AppError;

pub mod synth;
pub mod text;
pub mod uxd;

pub use synth::*;
pub use text::*;
pub use uxd::*;

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Text,
    Uxd,
}

impl FileFormat {
    /// Guess the format from the file extension (text unless recognized).
    pub fn detect(path: &Path) -> FileFormat {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("uxd") => FileFormat::Uxd,
            _ => FileFormat::Text,
        }
    }
}

/// A dataset as read from disk.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub points: Vec<Point>,
    pub title: String,
    pub filename: String,
}

/// Read a data file into points.
pub fn load_file(path: &Path, default_sigma: DefaultSigma) -> Result<LoadedData, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open data file '{}': {e}", path.display())))?;
    let reader = BufReader::new(file);

    let cols = match FileFormat::detect(path) {
        FileFormat::Text => read_text(reader)?,
        FileFormat::Uxd => read_uxd(reader)?,
    };
    if cols.x.is_empty() {
        return Err(AppError::execute(format!(
            "No data points found in '{}'.",
            path.display()
        )));
    }

    let points = columns_to_points(&cols, default_sigma)?;
    let title = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    Ok(LoadedData {
        points,
        title,
        filename: path.display().to_string(),
    })
}

/// Combine raw columns into sorted points.
pub fn columns_to_points(cols: &Columns, default_sigma: DefaultSigma) -> Result<Vec<Point>, AppError> {
    let mut points = Vec::with_capacity(cols.x.len());
    for (i, (&x, &y)) in cols.x.iter().zip(&cols.y).enumerate() {
        let sigma = match &cols.sigma {
            Some(s) => s[i],
            None => default_sigma.sigma_for(y),
        };
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(AppError::execute(format!(
                "Invalid sigma {sigma} for point #{i} (x={x})."
            )));
        }
        points.push(Point::new(x, y, sigma));
    }
    points.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));
    Ok(points)
}
