//! Synthetic Gaussian dataset.
//!
//! The generator reproduces the classic "counting experiment" example:
//! `x = i/100 + 10`, ideal counts `ceil(100·exp(-(x-μ)²/2))`, `σ = sqrt(y)`.
//! Noise is added afterwards inside a session with `Y = randnormal(y, s)`.

use crate::domain::Point;
use crate::error::AppError;

pub const SYNTH_POINTS: usize = 500;

#[derive(Debug, Clone)]
pub struct SynthData {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub sigma: Vec<f64>,
}

/// Ideal (noise-free) counts of a Gaussian centered at `mu`.
pub fn ideal_gaussian(mu: f64) -> Result<SynthData, AppError> {
    if !mu.is_finite() {
        return Err(AppError::new(2, "Peak center must be finite."));
    }
    let mut x = Vec::with_capacity(SYNTH_POINTS);
    let mut y = Vec::with_capacity(SYNTH_POINTS);
    let mut sigma = Vec::with_capacity(SYNTH_POINTS);

    for i in 0..SYNTH_POINTS {
        let xi = i as f64 / 100.0 + 10.0;
        let yi = (100.0 * (-(xi - mu) * (xi - mu) / 2.0).exp()).ceil();
        x.push(xi);
        y.push(yi);
        sigma.push(yi.sqrt().max(1.0));
    }
    Ok(SynthData { x, y, sigma })
}

/// Three-column text (`x y sigma`), readable by the text reader.
pub fn points_to_text(points: &[Point]) -> String {
    let mut out = String::from("# x y sigma\n");
    for p in points {
        out.push_str(&format!("{} {} {}\n", p.x, p.y, p.sigma));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_and_counts() {
        let d = ideal_gaussian(12.345).unwrap();
        assert_eq!(d.x.len(), SYNTH_POINTS);
        assert!((d.x[0] - 10.0).abs() < 1e-12);
        assert!((d.x[499] - 14.99).abs() < 1e-9);
        assert_eq!(d.y[234], 100.0);
        assert!(d.y.iter().all(|&y| y >= 1.0 && y.fract() == 0.0));
        assert!(d.sigma.iter().all(|&s| s >= 1.0));
        assert!(ideal_gaussian(f64::NAN).is_err());
    }

    #[test]
    fn text_is_readable_back() {
        let pts = vec![Point::new(1.0, 2.5, 0.5), Point::new(2.0, 4.0, 2.0)];
        let cols = crate::data::read_text(points_to_text(&pts).as_bytes()).unwrap();
        assert_eq!(cols.x, vec![1.0, 2.0]);
        assert_eq!(cols.sigma, Some(vec![0.5, 2.0]));
    }
}
