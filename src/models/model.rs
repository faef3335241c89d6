//! Function shape evaluation.
//!
//! The fitter relies on two primitive operations:
//! - evaluate `f(x)` given parameter values (for residuals/plots)
//! - fill the row of partial derivatives `∂f/∂p_j` at `x` (for the Jacobian)
//!
//! These are implemented here for each function kind. Peak widths are
//! half-widths at half maximum (`hwhm`).

use std::f64::consts::LN_2;

use crate::domain::{Dataset, Function, FunctionKind};

/// Evaluate a single shape at `x`.
///
/// # Panics
/// Panics if `params` is shorter than `kind.param_len()`.
pub fn value_at(kind: FunctionKind, x: f64, params: &[f64]) -> f64 {
    match kind {
        FunctionKind::Constant => params[0],
        FunctionKind::Linear => params[0] + params[1] * x,
        FunctionKind::Quadratic => params[0] + params[1] * x + params[2] * x * x,
        FunctionKind::Gaussian => {
            let u = (x - params[1]) / params[2];
            params[0] * (-LN_2 * u * u).exp()
        }
        FunctionKind::Lorentzian => {
            let u = (x - params[1]) / params[2];
            params[0] / (1.0 + u * u)
        }
        FunctionKind::PseudoVoigt => {
            let u = (x - params[1]) / params[2];
            let g = (-LN_2 * u * u).exp();
            let l = 1.0 / (1.0 + u * u);
            params[0] * ((1.0 - params[3]) * g + params[3] * l)
        }
    }
}

/// Fill `out[j] = ∂f/∂p_j` at `x`.
///
/// # Panics
/// Panics if `params` or `out` are shorter than `kind.param_len()`.
pub fn fill_derivatives(kind: FunctionKind, x: f64, params: &[f64], out: &mut [f64]) {
    match kind {
        FunctionKind::Constant => {
            out[0] = 1.0;
        }
        FunctionKind::Linear => {
            out[0] = 1.0;
            out[1] = x;
        }
        FunctionKind::Quadratic => {
            out[0] = 1.0;
            out[1] = x;
            out[2] = x * x;
        }
        FunctionKind::Gaussian => {
            let (h, w) = (params[0], params[2]);
            let u = (x - params[1]) / w;
            let g = (-LN_2 * u * u).exp();
            let k = h * g * 2.0 * LN_2 * u / w;
            out[0] = g;
            out[1] = k;
            out[2] = k * u;
        }
        FunctionKind::Lorentzian => {
            let (h, w) = (params[0], params[2]);
            let u = (x - params[1]) / w;
            let l = 1.0 / (1.0 + u * u);
            let k = h * 2.0 * u * l * l / w;
            out[0] = l;
            out[1] = k;
            out[2] = k * u;
        }
        FunctionKind::PseudoVoigt => {
            let (h, w, s) = (params[0], params[2], params[3]);
            let u = (x - params[1]) / w;
            let g = (-LN_2 * u * u).exp();
            let l = 1.0 / (1.0 + u * u);
            // d/dcenter of the unit profiles, before the 1/w factor
            let dg = g * 2.0 * LN_2 * u;
            let dl = 2.0 * u * l * l;
            let k = h * ((1.0 - s) * dg + s * dl) / w;
            out[0] = (1.0 - s) * g + s * l;
            out[1] = k;
            out[2] = k * u;
            out[3] = h * (l - g);
        }
    }
}

/// Evaluate a function instance.
pub fn function_value(func: &Function, x: f64) -> f64 {
    let params = func.param_values();
    value_at(func.kind, x, &params)
}

/// Sum of the model components of `dataset` at `x`.
///
/// `lookup` resolves a component name to its function; unknown names
/// contribute nothing.
pub fn model_value<'a, F>(dataset: &Dataset, x: f64, lookup: F) -> f64
where
    F: Fn(&str) -> Option<&'a Function>,
{
    dataset
        .model
        .iter()
        .filter_map(|name| lookup(name))
        .map(|f| function_value(f, x))
        .sum()
}

/// Peak area for peak shapes, `None` otherwise.
pub fn peak_area(func: &Function) -> Option<f64> {
    let p = func.param_values();
    let gauss = |h: f64, w: f64| h * w * (std::f64::consts::PI / LN_2).sqrt();
    let lorentz = |h: f64, w: f64| h * w * std::f64::consts::PI;
    match func.kind {
        FunctionKind::Gaussian => Some(gauss(p[0], p[2].abs())),
        FunctionKind::Lorentzian => Some(lorentz(p[0], p[2].abs())),
        FunctionKind::PseudoVoigt => {
            let w = p[2].abs();
            Some((1.0 - p[3]) * gauss(p[0], w) + p[3] * lorentz(p[0], w))
        }
        _ => None,
    }
}
