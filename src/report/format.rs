//! Text formatting of functions, datasets and fit results.
//!
//! Every number goes through the session's `NumericFormat`, so the same
//! session prints consistently whether the text ends up on stdout or in a
//! redirected `info` file.

use crate::domain::{Dataset, FitStats, Function, FunctionKind, Variable};
use crate::math::NumericFormat;
use crate::models::peak_area;

/// `%name = Kind(p1=~v1, p2=v2, ...)`
pub fn format_function(func: &Function, fmt: NumericFormat) -> String {
    let args: Vec<String> = func
        .kind
        .param_names()
        .iter()
        .zip(&func.params)
        .map(|(name, p)| match &p.var {
            Some(v) => format!("{name}=${v}"),
            None => {
                let tilde = if p.fitted { "~" } else { "" };
                format!("{name}={tilde}{}", fmt.format(p.value))
            }
        })
        .collect();
    format!("%{} = {}({})", func.name, func.kind, args.join(", "))
}

/// `$name = ~value`, `~` marking a fitted variable.
pub fn format_variable(var: &Variable, fmt: NumericFormat) -> String {
    let tilde = if var.fitted { "~" } else { "" };
    format!("${} = {tilde}{}", var.name, fmt.format(var.value))
}

/// `Kind(v1, v2, ...)` without names, used by `info formula`.
pub fn format_component(func: &Function, fmt: NumericFormat) -> String {
    let values: Vec<String> = func.params.iter().map(|p| fmt.format(p.value)).collect();
    format!("{}({})", func.kind, values.join(", "))
}

/// Shape names with their parameter lists.
pub fn format_types() -> String {
    FunctionKind::ALL
        .iter()
        .map(|k| format!("{k}({})", k.param_names().join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One-paragraph description of a dataset.
pub fn format_data_info(ds: &Dataset, fmt: NumericFormat) -> String {
    let Some(stats) = ds.stats() else {
        return if ds.title.is_empty() {
            "No data points.".to_string()
        } else {
            format!("{}: no data points.", ds.title)
        };
    };
    let mut out = String::new();
    if !ds.filename.is_empty() {
        out.push_str(&format!("From file {}\n", ds.filename));
    }
    if !ds.title.is_empty() {
        out.push_str(&format!("Title: {}\n", ds.title));
    }
    out.push_str(&format!(
        "{} points, {} active. x range: [{}, {}], y range: [{}, {}]",
        stats.n_points,
        stats.n_active,
        fmt.format(stats.x_min),
        fmt.format(stats.x_max),
        fmt.format(stats.y_min),
        fmt.format(stats.y_max)
    ));
    out
}

/// Table of peak functions: center, height, area, hwhm.
pub fn format_peaks_table(funcs: &[&Function], fmt: NumericFormat) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<12} {:<12} {:>12} {:>12} {:>12} {:>12}\n",
        "# name", "type", "center", "height", "area", "hwhm"
    ));
    let mut any = false;
    for f in funcs.iter().filter(|f| f.kind.is_peak()) {
        any = true;
        let p = f.param_values();
        let area = peak_area(f).map(|a| fmt.format(a)).unwrap_or_default();
        out.push_str(
            format!(
                "%{:<11} {:<12} {:>12} {:>12} {:>12} {:>12}",
                f.name,
                f.kind.to_string(),
                fmt.format(p[1]),
                fmt.format(p[0]),
                area,
                fmt.format(p[2].abs())
            )
            .trim_end(),
        );
        out.push('\n');
    }
    if !any {
        out.push_str("(no peaks)\n");
    }
    out.trim_end().to_string()
}

/// Summary printed by `info fit`.
pub fn format_fit_summary(stats: &FitStats, fmt: NumericFormat) -> String {
    let mut out = String::new();
    out.push_str(&format!("WSSR: {}\n", fmt.format(stats.wssr)));
    out.push_str(&format!("SSR: {}\n", fmt.format(stats.ssr)));
    out.push_str(&format!("R-squared: {}\n", fmt.format(stats.rsquared)));
    out.push_str(&format!(
        "Points: {}  Fitted parameters: {}  DoF: {}",
        stats.n_points, stats.n_params, stats.dof
    ));
    if stats.dof > 0 {
        out.push_str(&format!(
            "\nWSSR/DoF: {}",
            fmt.format(stats.wssr / stats.dof as f64)
        ));
    }
    out
}

/// Fitted parameter with its standard error.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamError {
    /// `%func.param`, or `$var` for a shared variable.
    pub name: String,
    pub value: f64,
    pub error: f64,
}

/// `name = value +/- error (rel%)` lines.
pub fn format_param_errors(rows: &[ParamError], fmt: NumericFormat) -> String {
    if rows.is_empty() {
        return "No fitted parameters.".to_string();
    }
    rows.iter()
        .map(|r| {
            let rel = if r.value != 0.0 {
                format!(" ({}%)", fmt.format(100.0 * r.error / r.value.abs()))
            } else {
                String::new()
            };
            format!(
                "{} = {} +/- {}{rel}",
                r.name,
                fmt.format(r.value),
                fmt.format(r.error)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
