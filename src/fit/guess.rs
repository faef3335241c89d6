//! Initial parameter estimates for a new function.
//!
//! Guessing works on the *residual* signal: data minus the current model
//! (without the function being replaced), restricted to a range. Peaks are
//! located at the highest local maximum; lines come from a least-squares fit.

use crate::domain::FunctionKind;
use crate::error::AppError;

/// Number of consecutive points below half maximum needed to accept a
/// half-width crossing (fewer are treated as noise).
const HWHM_NOISE_POINTS: usize = 3;

/// Residual signal inside the guess range.
#[derive(Debug, Clone, Default)]
pub struct GuessInput {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Present when weights should steer the maximum search.
    pub sigma: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuessOptions {
    pub height_correction: f64,
    pub width_correction: f64,
    pub epsilon: f64,
}

impl Default for GuessOptions {
    fn default() -> Self {
        Self {
            height_correction: 1.0,
            width_correction: 1.0,
            epsilon: 1e-12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakEstimate {
    pub center: f64,
    pub height: f64,
    pub hwhm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearEstimate {
    pub slope: f64,
    pub intercept: f64,
    pub avgy: f64,
}

/// Initial values for all parameters of `kind`, in positional order.
pub fn guess_params(kind: FunctionKind, input: &GuessInput, opts: &GuessOptions) -> Result<Vec<f64>, AppError> {
    if input.x.is_empty() {
        return Err(AppError::execute("guess: empty range"));
    }
    let params = match kind {
        FunctionKind::Constant => {
            let lin = estimate_linear(input);
            vec![lin.avgy]
        }
        FunctionKind::Linear => {
            let lin = estimate_linear(input);
            vec![lin.intercept, lin.slope]
        }
        FunctionKind::Quadratic => {
            let lin = estimate_linear(input);
            vec![lin.intercept, lin.slope, 0.0]
        }
        FunctionKind::Gaussian | FunctionKind::Lorentzian => {
            let pk = estimate_peak(input, opts)?;
            vec![pk.height, pk.center, pk.hwhm]
        }
        FunctionKind::PseudoVoigt => {
            let pk = estimate_peak(input, opts)?;
            vec![pk.height, pk.center, pk.hwhm, kind.param_default(3).unwrap_or(0.5)]
        }
    };
    Ok(params)
}

/// Locate the highest local maximum and measure its half width.
///
/// The maximum must rise above the previous point and not fall below the
/// next one, so the first and last points can never be picked.
pub fn estimate_peak(input: &GuessInput, opts: &GuessOptions) -> Result<PeakEstimate, AppError> {
    let yy = &input.y;
    let n = yy.len();
    let mut pos: Option<usize> = None;

    for i in 1..n.saturating_sub(1) {
        let t = pos.unwrap_or(i - 1);
        let higher = match &input.sigma {
            Some(s) => s[t] * yy[i] > s[i] * yy[t] && s[i + 1] * yy[i] >= s[i] * yy[i + 1],
            None => yy[i] > yy[t] && yy[i] >= yy[i + 1],
        };
        if higher {
            pos = Some(i);
        }
    }

    let Some(pos) = pos else {
        return Err(AppError::execute("Peak outside of the range."));
    };

    let hwhm = find_hwhm(&input.x, yy, pos, opts.epsilon);
    Ok(PeakEstimate {
        center: input.x[pos],
        height: yy[pos] * opts.height_correction,
        hwhm: hwhm * opts.width_correction,
    })
}

/// Half width at half maximum around `pos`.
fn find_hwhm(xx: &[f64], yy: &[f64], pos: usize, epsilon: f64) -> f64 {
    let hm = 0.5 * yy[pos];
    let mut left_pos = 0usize;
    let mut right_pos = yy.len() - 1;

    let mut counter = 0usize;
    for i in (1..=pos).rev() {
        if yy[i] > hm {
            counter = counter.saturating_sub(1);
        } else {
            counter += 1;
            if counter == HWHM_NOISE_POINTS {
                left_pos = i + counter;
                break;
            }
        }
    }

    counter = 0;
    let mut i = pos;
    while i < right_pos {
        if yy[i] > hm {
            counter = counter.saturating_sub(1);
        } else {
            counter += 1;
            if counter == HWHM_NOISE_POINTS {
                right_pos = i + 1 - counter;
                break;
            }
        }
        i += 1;
    }

    // A non-positive maximum makes every point "below half maximum".
    let left_pos = left_pos.min(pos);
    let right_pos = right_pos.max(pos);

    let hwhm = (xx[right_pos] - xx[left_pos]) / 2.0;
    hwhm.max(epsilon)
}

/// Least-squares line through the residual signal.
pub fn estimate_linear(input: &GuessInput) -> LinearEstimate {
    let n = input.x.len() as f64;
    let (mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0);
    for (&x, &y) in input.x.iter().zip(&input.y) {
        sx += x;
        sy += y;
        sxx += x * x;
        sxy += x * y;
    }
    let denom = n * sxx - sx * sx;
    let slope = if denom.abs() > 0.0 { (n * sxy - sx * sy) / denom } else { 0.0 };
    LinearEstimate {
        slope,
        intercept: (sy - slope * sx) / n,
        avgy: sy / n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::value_at;

    fn gaussian_input(center: f64, hwhm: f64) -> GuessInput {
        let x: Vec<f64> = (0..201).map(|i| i as f64 * 0.05).collect();
        let y = x
            .iter()
            .map(|&xi| value_at(FunctionKind::Gaussian, xi, &[50.0, center, hwhm]) + 1.0)
            .collect();
        GuessInput { x, y, sigma: None }
    }

    #[test]
    fn peak_estimate_recovers_gaussian() {
        let input = gaussian_input(4.0, 0.6);
        let pk = estimate_peak(&input, &GuessOptions::default()).unwrap();
        assert!((pk.center - 4.0).abs() < 1e-9);
        assert!((pk.height - 51.0).abs() < 1e-9);
        assert!((pk.hwhm - 0.6).abs() < 0.1, "hwhm={}", pk.hwhm);
    }

    #[test]
    fn corrections_scale_height_and_width() {
        let input = gaussian_input(4.0, 0.6);
        let opts = GuessOptions {
            height_correction: 2.0,
            width_correction: 0.5,
            ..GuessOptions::default()
        };
        let base = estimate_peak(&input, &GuessOptions::default()).unwrap();
        let pk = estimate_peak(&input, &opts).unwrap();
        assert!((pk.height - 2.0 * base.height).abs() < 1e-9);
        assert!((pk.hwhm - 0.5 * base.hwhm).abs() < 1e-9);
    }

    #[test]
    fn monotonic_data_has_no_peak() {
        let input = GuessInput {
            x: vec![1.0, 2.0, 3.0, 4.0],
            y: vec![1.0, 2.0, 3.0, 4.0],
            sigma: None,
        };
        assert!(estimate_peak(&input, &GuessOptions::default()).is_err());
    }

    #[test]
    fn linear_estimate_is_exact_on_a_line() {
        let input = GuessInput {
            x: vec![0.0, 1.0, 2.0, 3.0],
            y: vec![1.0, 3.0, 5.0, 7.0],
            sigma: None,
        };
        let lin = estimate_linear(&input);
        assert!((lin.slope - 2.0).abs() < 1e-12);
        assert!((lin.intercept - 1.0).abs() < 1e-12);
        assert!((lin.avgy - 4.0).abs() < 1e-12);
        let p = guess_params(FunctionKind::Quadratic, &input, &GuessOptions::default()).unwrap();
        assert_eq!(p.len(), 3);
    }

    #[test]
    fn empty_range_is_an_error() {
        let err = guess_params(FunctionKind::Gaussian, &GuessInput::default(), &GuessOptions::default()).unwrap_err();
        assert!(err.message().contains("empty range"));
    }
}
