//! Goodness-of-fit statistics.

use crate::domain::FitStats;

/// One active observation together with the model value at its x.
#[derive(Debug, Clone, Copy)]
pub struct Residual {
    pub y: f64,
    pub sigma: f64,
    pub model: f64,
}

/// WSSR, SSR, R² and degrees of freedom for a set of residuals.
///
/// `n_params` is the number of fitted parameters used by the model.
pub fn compute_stats(residuals: &[Residual], n_params: usize) -> FitStats {
    let n = residuals.len();
    let mut wssr = 0.0;
    let mut ssr = 0.0;
    let mut sum_y = 0.0;
    for r in residuals {
        let d = r.y - r.model;
        wssr += (d / r.sigma) * (d / r.sigma);
        ssr += d * d;
        sum_y += r.y;
    }

    let rsquared = if n == 0 {
        f64::NAN
    } else {
        let mean = sum_y / n as f64;
        let sst: f64 = residuals.iter().map(|r| (r.y - mean) * (r.y - mean)).sum();
        if sst > 0.0 { 1.0 - ssr / sst } else { f64::NAN }
    };

    FitStats {
        wssr,
        ssr,
        rsquared,
        n_points: n,
        n_params,
        dof: n as i64 - n_params as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_model_has_zero_wssr_and_unit_rsquared() {
        let r: Vec<Residual> = [1.0, 2.0, 4.0]
            .iter()
            .map(|&y| Residual { y, sigma: 0.5, model: y })
            .collect();
        let s = compute_stats(&r, 2);
        assert_eq!(s.wssr, 0.0);
        assert_eq!(s.rsquared, 1.0);
        assert_eq!(s.dof, 1);
    }

    #[test]
    fn weights_divide_by_sigma_squared() {
        let r = [
            Residual { y: 3.0, sigma: 2.0, model: 1.0 },
            Residual { y: 1.0, sigma: 1.0, model: 2.0 },
        ];
        let s = compute_stats(&r, 0);
        assert!((s.wssr - 2.0).abs() < 1e-12);
        assert!((s.ssr - 5.0).abs() < 1e-12);
        assert!((s.rsquared - (1.0 - 5.0 / 2.0)).abs() < 1e-12);
    }
}
