//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - active points: `o`
//! - inactive points: `.`
//! - model curve: `-` line

use crate::domain::{Dataset, Function, ModelFile, Point};
use crate::models::model_value;

/// Plot a dataset with its current model.
pub fn render_dataset_plot(ds: &Dataset, functions: &[Function], width: usize, height: usize) -> String {
    let (x_min, x_max) = x_range(ds.points.iter().map(|p| p.x)).unwrap_or((0.0, 1.0));
    let n = width.max(2);
    let curve: Vec<(f64, f64)> = if ds.model.is_empty() {
        Vec::new()
    } else {
        (0..n)
            .map(|i| {
                let x = x_min + (x_max - x_min) * i as f64 / (n as f64 - 1.0);
                (x, model_value(ds, x, |name| functions.iter().find(|f| f.name == name)))
            })
            .collect()
    };
    render_plot(&ds.points, &curve, x_min, x_max, width, height)
}

/// Plot a saved model file (points plus the precomputed grid).
pub fn render_model_file_plot(model: &ModelFile, width: usize, height: usize) -> String {
    let curve: Vec<(f64, f64)> = model
        .grid
        .x
        .iter()
        .zip(model.grid.y.iter())
        .map(|(&x, &y)| (x, y))
        .collect();
    let xs = model.points.iter().map(|p| p.x).chain(model.grid.x.iter().copied());
    let (x_min, x_max) = x_range(xs).unwrap_or((0.0, 1.0));
    render_plot(&model.points, &curve, x_min, x_max, width, height)
}

fn render_plot(points: &[Point], curve: &[(f64, f64)], x_min: f64, x_max: f64, width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (y_min, y_max) = y_range(points, curve).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Curve first so points overlay it.
    draw_curve(&mut grid, curve, x_min, x_max, y_min, y_max);

    for p in points {
        let col = map_x(p.x, x_min, x_max, width);
        let row = map_y(p.y, y_min, y_max, height);
        grid[row][col] = if p.is_active { 'o' } else { '.' };
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: x=[{x_min:.4}, {x_max:.4}] | y=[{y_min:.4}, {y_max:.4}]\n"
    ));
    for row in grid {
        out.push_str(row.into_iter().collect::<String>().trim_end());
        out.push('\n');
    }
    out
}

fn x_range(xs: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (lo, hi) = xs.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| (lo.min(x), hi.max(x)));
    if lo.is_finite() && hi.is_finite() && hi > lo {
        Some((lo, hi))
    } else if lo.is_finite() && hi.is_finite() {
        Some((lo - 0.5, hi + 0.5))
    } else {
        None
    }
}

fn y_range(points: &[Point], curve: &[(f64, f64)]) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for y in points.iter().map(|p| p.y).chain(curve.iter().map(|&(_, y)| y)) {
        if y.is_finite() {
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }
    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else if min_y.is_finite() {
        Some((min_y - 0.5, max_y + 0.5))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // top row is y_max
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], x_min: f64, x_max: f64, y_min: f64, y_max: f64) {
    if curve.len() < 2 {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(x, y) in curve.iter().filter(|(_, y)| y.is_finite()) {
        let col = map_x(x, x_min, x_max, width);
        let row = map_y(y, y_min, y_max, height);
        match prev {
            Some((c0, r0)) => draw_line(grid, c0, r0, col, row, '-'),
            None => grid[row][col] = '-',
        }
        prev = Some((col, row));
    }
}

/// Integer line drawing (Bresenham).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if let Some(cell) = grid
            .get_mut(y0 as usize)
            .and_then(|row| row.get_mut(x0 as usize))
            .filter(|c| **c == ' ')
        {
            *cell = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
