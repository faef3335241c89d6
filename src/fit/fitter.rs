//! Levenberg–Marquardt fitting of the fitted (`~`) parameters.
//!
//! Given:
//! - active observations `(x_i, y_i, σ_i)` from one or more datasets
//! - each dataset's model (a list of functions)
//! - the free parameters; one free parameter may feed several function
//!   parameters when they are bound to the same variable
//!
//! we minimize `WSSR(a) = Σ ((y_i - F(x_i; a)) / σ_i)²` by repeatedly solving
//! the damped normal equations
//!
//! ```text
//! (α + λ·diag(α)) δ = β,   α = JᵀWJ,   β = JᵀW r
//! ```
//!
//! accepting a step only when WSSR decreases.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::domain::Function;
use crate::error::AppError;
use crate::math::{pseudo_inverse, solve_least_squares};
use crate::models::{fill_derivatives, value_at};
use crate::session::ui::Level;

/// Tuning knobs; mirrors the `lm_*` settings.
#[derive(Debug, Clone)]
pub struct LmOptions {
    pub lambda_start: f64,
    pub lambda_up_factor: f64,
    pub lambda_down_factor: f64,
    pub max_lambda: f64,
    /// Stop after two consecutive accepted steps with a smaller relative
    /// WSSR change than this.
    pub stop_rel_change: f64,
    pub max_evaluations: usize,
    pub max_iterations: Option<usize>,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            lambda_start: 0.001,
            lambda_up_factor: 10.0,
            lambda_down_factor: 10.0,
            max_lambda: 1e15,
            stop_rel_change: 1e-7,
            max_evaluations: 1000,
            max_iterations: None,
        }
    }
}

/// One active observation, tagged with the model it is compared to.
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub x: f64,
    pub y: f64,
    pub sigma: f64,
    /// Index into `FitProblem::models`.
    pub model: usize,
}

/// `(function index, parameter index)` of a fitted parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSlot {
    pub func: usize,
    pub param: usize,
}

/// One fitted value and every function parameter that takes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeParam {
    /// Variable name when the slots are bound to `$var`.
    pub var: Option<String>,
    pub slots: Vec<ParamSlot>,
}

/// Everything the optimizer needs, detached from the session.
#[derive(Debug, Clone)]
pub struct FitProblem {
    pub observations: Vec<Observation>,
    /// Per dataset: indices into `functions`.
    pub models: Vec<Vec<usize>>,
    pub functions: Vec<Function>,
    pub free: Vec<FreeParam>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Converged,
    LambdaLimit,
    MaxIterations,
    MaxEvaluations,
}

impl StopReason {
    pub fn describe(self) -> &'static str {
        match self {
            StopReason::Converged => "converged",
            StopReason::LambdaLimit => "lambda limit reached",
            StopReason::MaxIterations => "maximum number of iterations reached",
            StopReason::MaxEvaluations => "maximum number of WSSR evaluations reached",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FitOutcome {
    /// Best parameter vector, ordered like `FitProblem::free`.
    pub params: Vec<f64>,
    pub initial_wssr: f64,
    pub wssr: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub stop: StopReason,
}

impl FitOutcome {
    pub fn improved(&self) -> bool {
        self.wssr < self.initial_wssr
    }
}

impl FitProblem {
    /// Collect free parameters from every function referenced by `models`.
    /// Parameters bound to the same variable share one free parameter.
    pub fn new(observations: Vec<Observation>, models: Vec<Vec<usize>>, functions: Vec<Function>) -> Self {
        let mut used = vec![false; functions.len()];
        for m in &models {
            for &f in m {
                used[f] = true;
            }
        }
        let mut free: Vec<FreeParam> = Vec::new();
        for (fi, func) in functions.iter().enumerate() {
            if !used[fi] {
                continue;
            }
            for (pi, p) in func.params.iter().enumerate() {
                if !p.fitted {
                    continue;
                }
                let slot = ParamSlot { func: fi, param: pi };
                let shared = p
                    .var
                    .as_ref()
                    .and_then(|v| free.iter().position(|fp| fp.var.as_ref() == Some(v)));
                match shared {
                    Some(k) => free[k].slots.push(slot),
                    None => free.push(FreeParam {
                        var: p.var.clone(),
                        slots: vec![slot],
                    }),
                }
            }
        }
        Self {
            observations,
            models,
            functions,
            free,
        }
    }

    pub fn initial_params(&self) -> Vec<f64> {
        self.free
            .iter()
            .map(|fp| {
                let s = fp.slots[0];
                self.functions[s.func].params[s.param].value
            })
            .collect()
    }

    /// Parameter values of every function with `a` substituted in.
    fn param_table(&self, a: &[f64]) -> Vec<Vec<f64>> {
        let mut table: Vec<Vec<f64>> = self.functions.iter().map(|f| f.param_values()).collect();
        for (fp, &v) in self.free.iter().zip(a) {
            for s in &fp.slots {
                table[s.func][s.param] = v;
            }
        }
        table
    }

    fn model_value(&self, table: &[Vec<f64>], obs: &Observation) -> f64 {
        self.models[obs.model]
            .iter()
            .map(|&f| value_at(self.functions[f].kind, obs.x, &table[f]))
            .sum()
    }

    pub fn wssr(&self, a: &[f64]) -> f64 {
        let table = self.param_table(a);
        self.observations
            .iter()
            .map(|o| {
                let r = (o.y - self.model_value(&table, o)) / o.sigma;
                r * r
            })
            .sum()
    }

    /// Build `α = JᵀWJ` and `β = JᵀW r` at `a`.
    pub fn normal_equations(&self, a: &[f64]) -> (DMatrix<f64>, DVector<f64>) {
        let na = self.free.len();
        let table = self.param_table(a);

        // Map (func, param) -> position in `a`.
        let mut slot_of: Vec<Vec<Option<usize>>> =
            self.functions.iter().map(|f| vec![None; f.params.len()]).collect();
        for (k, fp) in self.free.iter().enumerate() {
            for s in &fp.slots {
                slot_of[s.func][s.param] = Some(k);
            }
        }

        let rows: Vec<(Vec<f64>, f64, f64)> = self
            .observations
            .par_iter()
            .map(|o| {
                let mut grad = vec![0.0; na];
                let mut buf = [0.0; 8];
                let mut model = 0.0;
                for &f in &self.models[o.model] {
                    let kind = self.functions[f].kind;
                    let p = &table[f];
                    model += value_at(kind, o.x, p);
                    let d = &mut buf[..kind.param_len()];
                    fill_derivatives(kind, o.x, p, d);
                    for (pi, &dv) in d.iter().enumerate() {
                        if let Some(k) = slot_of[f][pi] {
                            grad[k] += dv;
                        }
                    }
                }
                let w = 1.0 / (o.sigma * o.sigma);
                (grad, o.y - model, w)
            })
            .collect();

        let mut alpha = DMatrix::<f64>::zeros(na, na);
        let mut beta = DVector::<f64>::zeros(na);
        for (grad, r, w) in &rows {
            for j in 0..na {
                let wg = w * grad[j];
                if wg == 0.0 {
                    continue;
                }
                beta[j] += wg * r;
                for k in 0..=j {
                    alpha[(j, k)] += wg * grad[k];
                }
            }
        }
        for j in 0..na {
            for k in 0..j {
                alpha[(k, j)] = alpha[(j, k)];
            }
        }
        (alpha, beta)
    }

    /// Covariance matrix `α⁻¹` at `a`.
    pub fn covariance(&self, a: &[f64]) -> Option<DMatrix<f64>> {
        let (alpha, _) = self.normal_equations(a);
        pseudo_inverse(&alpha)
    }

    /// Symmetric standard errors `sqrt(cov_ii · WSSR/DOF)`.
    pub fn standard_errors(&self, a: &[f64]) -> Option<Vec<f64>> {
        let dof = self.observations.len() as i64 - self.free.len() as i64;
        if dof <= 0 {
            return None;
        }
        let cov = self.covariance(a)?;
        let scale = self.wssr(a) / dof as f64;
        Some((0..a.len()).map(|i| (cov[(i, i)].abs() * scale).sqrt()).collect())
    }
}

/// Run Levenberg–Marquardt from the problem's current parameter values.
///
/// `log` receives progress messages with their verbosity level.
pub fn run_lm(
    problem: &FitProblem,
    opts: &LmOptions,
    log: &mut dyn FnMut(Level, &str),
) -> Result<FitOutcome, AppError> {
    if problem.observations.is_empty() {
        return Err(AppError::execute("No active data points to fit."));
    }
    if problem.free.is_empty() {
        return Err(AppError::execute("No parameters to fit."));
    }

    let na = problem.free.len();
    let mut best = problem.initial_params();
    let initial_wssr = problem.wssr(&best);
    if !initial_wssr.is_finite() {
        return Err(AppError::numeric("Initial WSSR is not finite; check the starting parameters."));
    }
    let mut chi2 = initial_wssr;
    let mut evaluations = 1usize;
    let mut lambda = opts.lambda_start;

    log(
        Level::Progress,
        &format!("Initial WSSR={chi2:.6}  lambda={lambda}  parameters: {na}"),
    );

    let (mut alpha, mut beta) = problem.normal_equations(&best);
    let mut small_change_counter = 0;
    let mut iterations = 0usize;

    let stop = loop {
        if opts.max_iterations.is_some_and(|m| iterations >= m) {
            break StopReason::MaxIterations;
        }
        if evaluations >= opts.max_evaluations {
            break StopReason::MaxEvaluations;
        }
        iterations += 1;

        let mut damped = alpha.clone();
        for j in 0..na {
            damped[(j, j)] *= 1.0 + lambda;
        }
        log(Level::Debug, &format!("lambda={lambda:.5e}  alpha' = {damped}"));

        let trial = solve_least_squares(&damped, &beta).map(|da| {
            best.iter().zip(da.iter()).map(|(a, d)| a + d).collect::<Vec<f64>>()
        });
        let new_chi2 = match &trial {
            Some(t) => {
                evaluations += 1;
                problem.wssr(t)
            }
            None => f64::INFINITY,
        };

        log(
            Level::Progress,
            &format!("#{iterations}: WSSR={new_chi2:.6}  lambda={lambda:.5e}"),
        );

        match trial {
            Some(t) if new_chi2 < chi2 => {
                let rel_change = (chi2 - new_chi2) / chi2;
                chi2 = new_chi2;
                best = t;

                if rel_change < opts.stop_rel_change || chi2 == 0.0 {
                    small_change_counter += 1;
                    if small_change_counter >= 2 || chi2 == 0.0 {
                        break StopReason::Converged;
                    }
                } else {
                    small_change_counter = 0;
                }

                (alpha, beta) = problem.normal_equations(&best);
                lambda /= opts.lambda_down_factor;
            }
            _ => {
                if lambda > opts.max_lambda {
                    break StopReason::LambdaLimit;
                }
                lambda *= opts.lambda_up_factor;
            }
        }
    };

    Ok(FitOutcome {
        params: best,
        initial_wssr,
        wssr: chi2,
        iterations,
        evaluations,
        stop,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FunctionKind, Param};
    use crate::models::value_at;

    fn gaussian_problem(start: [f64; 3]) -> FitProblem {
        let truth = [20.0, 3.0, 0.7];
        let observations = (0..120)
            .map(|i| {
                let x = i as f64 * 0.05;
                let y = value_at(FunctionKind::Gaussian, x, &truth) + 0.5;
                Observation { x, y, sigma: 1.0, model: 0 }
            })
            .collect();
        let functions = vec![
            Function {
                name: "g".to_string(),
                kind: FunctionKind::Gaussian,
                params: start.map(Param::fitted).to_vec(),
            },
            Function {
                name: "bg".to_string(),
                kind: FunctionKind::Constant,
                params: vec![Param::fixed(0.5)],
            },
        ];
        FitProblem::new(observations, vec![vec![0, 1]], functions)
    }

    #[test]
    fn only_fitted_params_are_free() {
        let p = gaussian_problem([18.0, 2.8, 0.9]);
        assert_eq!(p.free.len(), 3);
        assert!(p.free.iter().all(|fp| fp.var.is_none() && fp.slots.len() == 1 && fp.slots[0].func == 0));
    }

    #[test]
    fn shared_variable_is_one_free_parameter() {
        // Two peaks with the same width, bound to `$w`.
        let truth = [(10.0, 2.0), (6.0, 5.0)];
        let observations = (0..200)
            .map(|i| {
                let x = i as f64 * 0.04;
                let y = truth
                    .iter()
                    .map(|&(h, c)| value_at(FunctionKind::Gaussian, x, &[h, c, 0.6]))
                    .sum();
                Observation { x, y, sigma: 1.0, model: 0 }
            })
            .collect();
        let width = crate::domain::Variable {
            name: "w".to_string(),
            value: 0.8,
            fitted: true,
        };
        let functions = truth
            .iter()
            .enumerate()
            .map(|(i, &(h, c))| Function {
                name: format!("p{i}"),
                kind: FunctionKind::Gaussian,
                params: vec![Param::fitted(h * 0.9), Param::fitted(c + 0.1), Param::bound(&width)],
            })
            .collect();
        let p = FitProblem::new(observations, vec![vec![0, 1]], functions);
        assert_eq!(p.free.len(), 5);
        let shared: Vec<_> = p.free.iter().filter(|fp| fp.var.as_deref() == Some("w")).collect();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].slots, vec![ParamSlot { func: 0, param: 2 }, ParamSlot { func: 1, param: 2 }]);

        let out = run_lm(&p, &LmOptions::default(), &mut |_, _| {}).unwrap();
        let k = p.free.iter().position(|fp| fp.var.is_some()).unwrap();
        assert!((out.params[k] - 0.6).abs() < 1e-6, "w={}", out.params[k]);
    }

    #[test]
    fn lm_recovers_gaussian() {
        let p = gaussian_problem([15.0, 2.7, 1.0]);
        let out = run_lm(&p, &LmOptions::default(), &mut |_, _| {}).unwrap();
        assert!(out.improved());
        assert!(out.wssr < 1e-10, "wssr={}", out.wssr);
        assert!((out.params[0] - 20.0).abs() < 1e-5);
        assert!((out.params[1] - 3.0).abs() < 1e-6);
        assert!((out.params[2] - 0.7).abs() < 1e-6);
        assert_eq!(out.stop, StopReason::Converged);
    }

    #[test]
    fn iteration_cap_is_honored() {
        let p = gaussian_problem([15.0, 2.7, 1.0]);
        let opts = LmOptions {
            max_iterations: Some(1),
            ..LmOptions::default()
        };
        let out = run_lm(&p, &opts, &mut |_, _| {}).unwrap();
        assert_eq!(out.iterations, 1);
        assert_eq!(out.stop, StopReason::MaxIterations);
    }

    #[test]
    fn normal_equations_are_symmetric() {
        let p = gaussian_problem([18.0, 2.8, 0.9]);
        let (alpha, _) = p.normal_equations(&p.initial_params());
        assert!((alpha.clone() - alpha.transpose()).abs().max() < 1e-9);
    }

    #[test]
    fn no_free_params_is_an_error() {
        let mut p = gaussian_problem([18.0, 2.8, 0.9]);
        p.free.clear();
        assert!(run_lm(&p, &LmOptions::default(), &mut |_, _| {}).is_err());
    }

    #[test]
    fn exact_parameters_have_zero_errors() {
        let p = gaussian_problem([20.0, 3.0, 0.7]);
        let errs = p.standard_errors(&p.initial_params());
        // WSSR == 0 at the true parameters
        assert!(errs.unwrap().iter().all(|e| *e < 1e-6));
    }
}
