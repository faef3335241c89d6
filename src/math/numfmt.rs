//! printf-style number formatting.
//!
//! Session output uses the `numeric_format` setting, which accepts the usual
//! C conversions `%g`, `%.Ng`, `%.Nf` and `%.Ne`. Rust's `format!` has no `%g`,
//! so it is emulated here.

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericFormat {
    /// Shortest of fixed/scientific with N significant digits.
    General(usize),
    Fixed(usize),
    Exponent(usize),
}

impl Default for NumericFormat {
    fn default() -> Self {
        NumericFormat::General(6)
    }
}

impl NumericFormat {
    /// Parse a printf-style spec such as `%g` or `%.10g`.
    pub fn parse(spec: &str) -> Result<Self, AppError> {
        let bad = || AppError::execute(format!("Unsupported numeric format: {spec}"));
        let body = spec.trim().strip_prefix('%').ok_or_else(bad)?;
        let conv = body.chars().last().ok_or_else(bad)?;
        let prec_part = &body[..body.len() - conv.len_utf8()];
        let precision = if prec_part.is_empty() {
            6
        } else {
            prec_part
                .strip_prefix('.')
                .and_then(|p| p.parse::<usize>().ok())
                .ok_or_else(bad)?
        };
        match conv {
            'g' | 'G' => Ok(NumericFormat::General(precision)),
            'f' | 'F' => Ok(NumericFormat::Fixed(precision)),
            'e' | 'E' => Ok(NumericFormat::Exponent(precision)),
            _ => Err(bad()),
        }
    }

    pub fn format(self, v: f64) -> String {
        match self {
            NumericFormat::General(p) => format_g(v, p),
            NumericFormat::Fixed(p) => format!("{v:.p$}"),
            NumericFormat::Exponent(p) => c_exponent(&format!("{v:.p$e}")),
        }
    }

    pub fn spec(self) -> String {
        match self {
            NumericFormat::General(6) => "%g".to_string(),
            NumericFormat::General(p) => format!("%.{p}g"),
            NumericFormat::Fixed(p) => format!("%.{p}f"),
            NumericFormat::Exponent(p) => format!("%.{p}e"),
        }
    }
}

/// Format like C's `%.{precision}g`.
pub fn format_g(v: f64, precision: usize) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if v == 0.0 {
        return "0".to_string();
    }

    let p = precision.max(1);
    // Round to p significant digits first; the exponent is taken after rounding.
    let sci = format!("{:.*e}", p - 1, v);
    let exp: i32 = sci
        .rsplit_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0);

    if exp < -4 || exp >= p as i32 {
        let (mantissa, _) = sci.split_once('e').unwrap_or((&sci, "0"));
        let mantissa = strip_trailing_zeros(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    } else {
        let decimals = (p as i32 - 1 - exp).max(0) as usize;
        strip_trailing_zeros(&format!("{v:.decimals$}")).to_string()
    }
}

fn strip_trailing_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Rust prints `1.5e3`; C prints `1.5e+03`.
fn c_exponent(s: &str) -> String {
    match s.split_once('e') {
        Some((m, e)) => {
            let exp: i32 = e.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{m}e{sign}{:02}", exp.abs())
        }
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_matches_printf() {
        assert_eq!(format_g(0.6931471805599453, 6), "0.693147");
        assert_eq!(format_g(12.3456, 5), "12.346");
        assert_eq!(format_g(100.0, 6), "100");
        assert_eq!(format_g(1234567.0, 6), "1.23457e+06");
        assert_eq!(format_g(0.0001234, 6), "0.0001234");
        assert_eq!(format_g(0.00001234, 6), "1.234e-05");
        assert_eq!(format_g(-2.5, 6), "-2.5");
        assert_eq!(format_g(999999.7, 6), "1e+06");
    }

    #[test]
    fn parse_specs() {
        assert_eq!(NumericFormat::parse("%g").unwrap(), NumericFormat::General(6));
        assert_eq!(NumericFormat::parse("%.10g").unwrap(), NumericFormat::General(10));
        assert_eq!(NumericFormat::parse("%.3f").unwrap().format(1.23456), "1.235");
        assert_eq!(NumericFormat::parse("%.2e").unwrap().format(1234.0), "1.23e+03");
        assert!(NumericFormat::parse("%d").is_err());
        assert!(NumericFormat::parse("g").is_err());
    }
}
