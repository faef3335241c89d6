//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during guessing and fitting
//! - exported to JSON/CSV
//! - reloaded later for plotting

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Built-in function shapes that can be placed in a dataset's model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum FunctionKind {
    Constant,
    Linear,
    Quadratic,
    Gaussian,
    Lorentzian,
    #[value(name = "pseudovoigt")]
    PseudoVoigt,
}

impl FunctionKind {
    pub const ALL: [FunctionKind; 6] = [
        FunctionKind::Constant,
        FunctionKind::Linear,
        FunctionKind::Quadratic,
        FunctionKind::Gaussian,
        FunctionKind::Lorentzian,
        FunctionKind::PseudoVoigt,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            FunctionKind::Constant => "Constant",
            FunctionKind::Linear => "Linear",
            FunctionKind::Quadratic => "Quadratic",
            FunctionKind::Gaussian => "Gaussian",
            FunctionKind::Lorentzian => "Lorentzian",
            FunctionKind::PseudoVoigt => "PseudoVoigt",
        }
    }

    /// Look up a shape by its type name (case-insensitive).
    pub fn from_name(name: &str) -> Option<FunctionKind> {
        FunctionKind::ALL
            .into_iter()
            .find(|k| k.display_name().eq_ignore_ascii_case(name))
    }

    /// Parameter names in positional order.
    pub fn param_names(self) -> &'static [&'static str] {
        match self {
            FunctionKind::Constant => &["a"],
            FunctionKind::Linear => &["a0", "a1"],
            FunctionKind::Quadratic => &["a0", "a1", "a2"],
            FunctionKind::Gaussian | FunctionKind::Lorentzian => &["height", "center", "hwhm"],
            FunctionKind::PseudoVoigt => &["height", "center", "hwhm", "shape"],
        }
    }

    pub fn param_len(self) -> usize {
        self.param_names().len()
    }

    /// Peak shapes have center/height/hwhm and are guessed from a maximum.
    pub fn is_peak(self) -> bool {
        matches!(
            self,
            FunctionKind::Gaussian | FunctionKind::Lorentzian | FunctionKind::PseudoVoigt
        )
    }

    /// Default used when a parameter is omitted and no guess provides it.
    pub fn param_default(self, idx: usize) -> Option<f64> {
        match (self, idx) {
            (FunctionKind::PseudoVoigt, 3) => Some(0.5),
            (FunctionKind::Quadratic, 2) => Some(0.0),
            _ => None,
        }
    }
}

impl std::fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// How sigma is derived for points that come without an explicit column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultSigma {
    /// `sqrt(y)` for `y > 1`, otherwise 1 (counting statistics).
    Sqrt,
    /// Uniform weights.
    One,
}

impl DefaultSigma {
    pub fn sigma_for(self, y: f64) -> f64 {
        match self {
            DefaultSigma::Sqrt => {
                if y > 1.0 {
                    y.sqrt()
                } else {
                    1.0
                }
            }
            DefaultSigma::One => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DefaultSigma::Sqrt => "sqrt",
            DefaultSigma::One => "one",
        }
    }
}

/// One observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub sigma: f64,
    pub is_active: bool,
}

impl Point {
    pub fn new(x: f64, y: f64, sigma: f64) -> Self {
        Self {
            x,
            y,
            sigma,
            is_active: true,
        }
    }
}

/// A function parameter.
///
/// `fitted` parameters are written as `~value` in the command language and
/// are the only ones the fitter may change. A parameter bound to a variable
/// (`center=$c`) mirrors that variable's value and `fitted` flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub value: f64,
    pub fitted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var: Option<String>,
}

impl Param {
    pub fn fitted(value: f64) -> Self {
        Self {
            value,
            fitted: true,
            var: None,
        }
    }

    pub fn fixed(value: f64) -> Self {
        Self {
            value,
            fitted: false,
            var: None,
        }
    }

    pub fn bound(var: &Variable) -> Self {
        Self {
            value: var.value,
            fitted: var.fitted,
            var: Some(var.name.clone()),
        }
    }
}

/// A named variable (`$name`). Simple variables (`$a = ~1.5`) are fitted and
/// can be shared by several function parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: f64,
    pub fitted: bool,
}

/// A named function instance (`%name`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub kind: FunctionKind,
    pub params: Vec<Param>,
}

impl Function {
    pub fn param_values(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.value).collect()
    }

    /// Find a parameter index by name (case-insensitive).
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.kind
            .param_names()
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
    }
}

/// One dataset slot (`@N`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub title: String,
    pub filename: String,
    pub points: Vec<Point>,
    /// Names of the functions summed to form `F(x)`.
    pub model: Vec<String>,
}

impl Dataset {
    pub fn active_points(&self) -> impl Iterator<Item = &Point> {
        self.points.iter().filter(|p| p.is_active)
    }

    /// Keep points ordered by x (stable for equal x).
    pub fn sort_points(&mut self) {
        self.points
            .sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));
    }

    /// Indices of active points with `from <= x <= to`.
    pub fn active_indices_in(&self, from: f64, to: f64) -> Vec<usize> {
        self.points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_active && p.x >= from && p.x <= to)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn stats(&self) -> Option<DatasetStats> {
        DatasetStats::from_points(&self.points)
    }
}

/// Summary stats about the points of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub n_points: usize,
    pub n_active: usize,
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl DatasetStats {
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut stats = DatasetStats {
            n_points: points.len(),
            n_active: 0,
            x_min: first.x,
            x_max: first.x,
            y_min: first.y,
            y_max: first.y,
        };
        for p in points {
            if p.is_active {
                stats.n_active += 1;
            }
            stats.x_min = stats.x_min.min(p.x);
            stats.x_max = stats.x_max.max(p.x);
            stats.y_min = stats.y_min.min(p.y);
            stats.y_max = stats.y_max.max(p.y);
        }
        Some(stats)
    }
}

/// Goodness-of-fit numbers for one or more datasets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitStats {
    pub wssr: f64,
    pub ssr: f64,
    pub rsquared: f64,
    pub n_points: usize,
    pub n_params: usize,
    pub dof: i64,
}

/// Sampled model curve for quick plotting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelGrid {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// Portable snapshot of a fitted model (`--export-model`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    pub tool: String,
    pub created: DateTime<Utc>,
    pub title: String,
    pub filename: String,
    /// Components of `F(x)`, in model order.
    pub functions: Vec<Function>,
    pub wssr: f64,
    /// `None` when undefined (constant data).
    pub rsquared: Option<f64>,
    pub dof: i64,
    pub points: Vec<Point>,
    pub grid: ModelGrid,
}
