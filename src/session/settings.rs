//! Session options changed with `set key = value`.

use crate::domain::DefaultSigma;
use crate::error::AppError;
use crate::math::NumericFormat;

/// Every option key, in listing order.
pub const SETTING_KEYS: [&str; 14] = [
    "verbosity",
    "default_sigma",
    "epsilon",
    "numeric_format",
    "height_correction",
    "width_correction",
    "guess_uses_weights",
    "max_wssr_evaluations",
    "lm_lambda_start",
    "lm_lambda_up_factor",
    "lm_lambda_down_factor",
    "lm_max_lambda",
    "lm_stop_rel_change",
    "pseudo_random_seed",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// -1 quiet, 0 normal, 1 fit progress, 2 debug.
    pub verbosity: i32,
    pub default_sigma: DefaultSigma,
    pub epsilon: f64,
    pub numeric_format: NumericFormat,
    pub height_correction: f64,
    pub width_correction: f64,
    pub guess_uses_weights: bool,
    pub max_wssr_evaluations: usize,
    pub lm_lambda_start: f64,
    pub lm_lambda_up_factor: f64,
    pub lm_lambda_down_factor: f64,
    pub lm_max_lambda: f64,
    pub lm_stop_rel_change: f64,
    /// 0 means "seed from the clock".
    pub pseudo_random_seed: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            verbosity: 0,
            default_sigma: DefaultSigma::Sqrt,
            epsilon: 1e-12,
            numeric_format: NumericFormat::default(),
            height_correction: 1.0,
            width_correction: 1.0,
            guess_uses_weights: true,
            max_wssr_evaluations: 1000,
            lm_lambda_start: 0.001,
            lm_lambda_up_factor: 10.0,
            lm_lambda_down_factor: 10.0,
            lm_max_lambda: 1e15,
            lm_stop_rel_change: 1e-7,
            pseudo_random_seed: 0,
        }
    }
}

impl Settings {
    /// Apply `PEAKFIT_VERBOSITY` / `PEAKFIT_SEED` overrides (after `.env`).
    pub fn apply_env(&mut self) -> Result<(), AppError> {
        dotenvy::dotenv().ok();
        if let Ok(v) = std::env::var("PEAKFIT_VERBOSITY") {
            self.set("verbosity", &v)?;
        }
        if let Ok(v) = std::env::var("PEAKFIT_SEED") {
            self.set("pseudo_random_seed", &v)?;
        }
        Ok(())
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), AppError> {
        let value = value.trim().trim_matches('\'');
        match key {
            "verbosity" => self.verbosity = parse_int(key, value)?,
            "default_sigma" => {
                self.default_sigma = match value {
                    "sqrt" => DefaultSigma::Sqrt,
                    "one" => DefaultSigma::One,
                    _ => {
                        return Err(AppError::execute(format!(
                            "Wrong value for default_sigma: {value} (allowed: sqrt, one)"
                        )));
                    }
                }
            }
            "epsilon" => self.epsilon = parse_positive(key, value)?,
            "numeric_format" => self.numeric_format = NumericFormat::parse(value)?,
            "height_correction" => self.height_correction = parse_positive(key, value)?,
            "width_correction" => self.width_correction = parse_positive(key, value)?,
            "guess_uses_weights" => self.guess_uses_weights = parse_bool(key, value)?,
            "max_wssr_evaluations" => self.max_wssr_evaluations = parse_int(key, value)?,
            "lm_lambda_start" => self.lm_lambda_start = parse_positive(key, value)?,
            "lm_lambda_up_factor" => self.lm_lambda_up_factor = parse_positive(key, value)?,
            "lm_lambda_down_factor" => self.lm_lambda_down_factor = parse_positive(key, value)?,
            "lm_max_lambda" => self.lm_max_lambda = parse_positive(key, value)?,
            "lm_stop_rel_change" => self.lm_stop_rel_change = parse_real(key, value)?,
            "pseudo_random_seed" => self.pseudo_random_seed = parse_int(key, value)?,
            _ => return Err(AppError::execute(format!("Unknown option: {key}"))),
        }
        Ok(())
    }

    /// Value in the form accepted back by `set`.
    pub fn get_as_string(&self, key: &str) -> Result<String, AppError> {
        let s = match key {
            "verbosity" => self.verbosity.to_string(),
            "default_sigma" => self.default_sigma.as_str().to_string(),
            "epsilon" => self.epsilon.to_string(),
            "numeric_format" => format!("'{}'", self.numeric_format.spec()),
            "height_correction" => self.height_correction.to_string(),
            "width_correction" => self.width_correction.to_string(),
            "guess_uses_weights" => (self.guess_uses_weights as u8).to_string(),
            "max_wssr_evaluations" => self.max_wssr_evaluations.to_string(),
            "lm_lambda_start" => self.lm_lambda_start.to_string(),
            "lm_lambda_up_factor" => self.lm_lambda_up_factor.to_string(),
            "lm_lambda_down_factor" => self.lm_lambda_down_factor.to_string(),
            "lm_max_lambda" => self.lm_max_lambda.to_string(),
            "lm_stop_rel_change" => self.lm_stop_rel_change.to_string(),
            "pseudo_random_seed" => self.pseudo_random_seed.to_string(),
            _ => return Err(AppError::execute(format!("Unknown option: {key}"))),
        };
        Ok(s)
    }

    pub fn type_desc(key: &str) -> &'static str {
        match key {
            "verbosity" | "max_wssr_evaluations" | "pseudo_random_seed" => "integer",
            "default_sigma" => "one of: sqrt, one",
            "numeric_format" => "string",
            "guess_uses_weights" => "boolean (0/1)",
            _ => "real number",
        }
    }
}

fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, AppError> {
    value
        .parse()
        .map_err(|_| AppError::execute(format!("Integer expected for {key}, got `{value}`")))
}

fn parse_real(key: &str, value: &str) -> Result<f64, AppError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| AppError::execute(format!("Real number expected for {key}, got `{value}`")))
}

fn parse_positive(key: &str, value: &str) -> Result<f64, AppError> {
    let v = parse_real(key, value)?;
    if v <= 0.0 {
        return Err(AppError::execute(format!("{key} must be positive")));
    }
    Ok(v)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, AppError> {
    match value {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(AppError::execute(format!("Boolean expected for {key}, got `{value}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_key_round_trips_through_set() {
        let mut s = Settings::default();
        s.lm_lambda_start = 0.5;
        s.numeric_format = NumericFormat::General(10);
        s.default_sigma = DefaultSigma::One;
        let mut t = Settings::default();
        for key in SETTING_KEYS {
            let v = s.get_as_string(key).unwrap();
            t.set(key, &v).unwrap();
        }
        assert_eq!(s, t);
    }

    #[test]
    fn rejects_unknown_and_bad_values() {
        let mut s = Settings::default();
        assert!(s.set("no_such_option", "1").is_err());
        assert!(s.set("lm_lambda_start", "-1").is_err());
        assert!(s.set("verbosity", "x").is_err());
        assert!(s.set("default_sigma", "cube").is_err());
        assert_eq!(s, Settings::default());
    }
}
