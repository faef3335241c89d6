//! Read/write model JSON files.
//!
//! A model file is the portable representation of a fit:
//! - the model components with their parameters
//! - dataset identity and goodness of fit
//! - the data points and a precomputed model grid for quick plotting
//!
//! The schema is defined by `domain::ModelFile`.

use std::fs::File;
use std::path::Path;

use chrono::Utc;

use crate::domain::{ModelFile, ModelGrid};
use crate::error::AppError;
use crate::models::function_value;
use crate::session::Session;

const GRID_POINTS: usize = 201;

/// Snapshot the default dataset's model.
pub fn model_file_from_session(session: &Session) -> Result<ModelFile, AppError> {
    let n = session.default_dataset();
    let ds = &session.datasets()[n];
    let stats = session.fit_stats(n)?;
    let functions: Vec<_> = ds
        .model
        .iter()
        .filter_map(|name| session.find_function(name))
        .cloned()
        .collect();

    let (x0, x1) = match ds.stats() {
        Some(s) => (s.x_min, s.x_max),
        None => (0.0, 1.0),
    };
    let x = build_grid(x0, x1, GRID_POINTS);
    let y = x
        .iter()
        .map(|&xi| functions.iter().map(|f| function_value(f, xi)).sum())
        .collect();

    Ok(ModelFile {
        tool: format!("peakfit {}", crate::session::VERSION),
        created: Utc::now(),
        title: ds.title.clone(),
        filename: ds.filename.clone(),
        functions,
        wssr: stats.wssr,
        rsquared: stats.rsquared.is_finite().then_some(stats.rsquared),
        dof: stats.dof,
        points: ds.points.clone(),
        grid: ModelGrid { x, y },
    })
}

/// Write a model JSON file.
pub fn write_model_json(path: &Path, model: &ModelFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create model JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, model)
        .map_err(|e| AppError::io(format!("Failed to write model JSON: {e}")))?;
    Ok(())
}

/// Read a model JSON file.
pub fn read_model_json(path: &Path) -> Result<ModelFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open model JSON '{}': {e}", path.display())))?;
    let model: ModelFile =
        serde_json::from_reader(file).map_err(|e| AppError::execute(format!("Invalid model JSON: {e}")))?;
    Ok(model)
}

fn build_grid(x0: f64, x1: f64, n: usize) -> Vec<f64> {
    let n = n.max(2);
    let (mut x0, mut x1) = (x0, x1);
    if (x1 - x0).abs() < 1e-12 {
        x0 -= 0.5;
        x1 += 0.5;
    }
    (0..n)
        .map(|i| x0 + (x1 - x0) * i as f64 / (n as f64 - 1.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ui::MessageSink;

    #[test]
    fn model_file_round_trips_through_json() {
        let mut s = Session::new();
        s.set_message_sink(MessageSink::Discard);
        s.execute("point 0, 1, 1; point 1, 3, 1; point 2, 5, 1").unwrap();
        s.execute("%l = Linear(~1, ~2); F += %l").unwrap();

        let model = model_file_from_session(&s).unwrap();
        assert_eq!(model.grid.x.len(), GRID_POINTS);
        assert!((model.grid.y[GRID_POINTS - 1] - 5.0).abs() < 1e-12);
        assert_eq!(model.wssr, 0.0);

        let path = std::env::temp_dir().join(format!("peakfit_model_{}.json", std::process::id()));
        write_model_json(&path, &model).unwrap();
        let back = read_model_json(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(back, model);
    }

    #[test]
    fn degenerate_range_is_widened() {
        let g = build_grid(2.0, 2.0, 3);
        assert_eq!(g, vec![1.5, 2.0, 2.5]);
    }
}
