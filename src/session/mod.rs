//! A fitting session: datasets, functions, settings and the interpreter for
//! the command language that manipulates them.
//!
//! The public surface is deliberately small:
//!
//! - `execute` runs one line of commands
//! - `get_info` / `calculate_expr` answer queries
//! - `load_data` / `add_point` push raw arrays
//! - `get_wssr` and friends expose fit statistics

pub mod command;
pub mod expr;
mod info;
pub mod lexer;
pub mod settings;
pub mod state;
mod transform;
pub mod ui;

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::data;
use crate::domain::{Dataset, FitStats, Function, FunctionKind, Param, Point, Variable};
use crate::error::AppError;
use crate::fit::{self, FitProblem, GuessInput, GuessOptions, LmOptions, Observation, Residual};
use crate::models::{function_value, model_value};
use crate::report::{ParamError, format_function};
use command::{Command, DeleteTarget, ParamArg, RangeArg, Redirect, RedirectMode, parse_command};
use expr::{EvalContext, Expr};
use lexer::{DatasetToken, split_statements, tokenize};
use settings::Settings;
use ui::{Level, MessageSink, Ui};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Nesting limit for `exec` inside scripts.
const MAX_EXEC_DEPTH: usize = 16;

#[derive(Debug)]
pub struct Session {
    datasets: Vec<Dataset>,
    functions: Vec<Function>,
    variables: Vec<Variable>,
    settings: Settings,
    default_ds: usize,
    ui: Ui,
    rng: StdRng,
    exec_depth: usize,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let settings = Settings::default();
        Self {
            datasets: vec![Dataset::default()],
            functions: Vec::new(),
            variables: Vec::new(),
            rng: seeded_rng(settings.pseudo_random_seed),
            settings,
            default_ds: 0,
            ui: Ui::default(),
            exec_depth: 0,
        }
    }

    /// New session with `.env` / environment overrides applied.
    pub fn from_env() -> Result<Self, AppError> {
        let mut s = Self::new();
        s.settings.apply_env()?;
        s.rng = seeded_rng(s.settings.pseudo_random_seed);
        Ok(s)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn default_dataset(&self) -> usize {
        self.default_ds
    }

    pub fn dataset_count(&self) -> usize {
        self.datasets.len()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn find_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn find_variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    fn function_index(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.name == name)
    }

    fn dataset(&self, n: usize) -> Result<&Dataset, AppError> {
        self.datasets
            .get(n)
            .ok_or_else(|| AppError::execute(format!("No such dataset: @{n}")))
    }

    /// Points of dataset `n`, sorted by x.
    pub fn get_data(&self, n: usize) -> Result<&[Point], AppError> {
        Ok(&self.dataset(n)?.points)
    }

    /// Model value of dataset `n` at `x`.
    pub fn get_model_value(&self, n: usize, x: f64) -> Result<f64, AppError> {
        let ds = self.dataset(n)?;
        Ok(model_value(ds, x, |name| self.find_function(name)))
    }

    /// Route messages to a callback instead of stdout.
    pub fn set_show_message<F>(&mut self, callback: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.ui.set_show_message(callback);
    }

    pub fn set_message_sink(&mut self, sink: MessageSink) {
        self.ui.set_sink(sink);
    }

    fn mesg(&mut self, level: Level, msg: &str) {
        let verbosity = self.settings.verbosity;
        self.ui.mesg(verbosity, level, msg);
    }

    /// Run one line: statements separated by `;`, `#` comments allowed.
    pub fn execute(&mut self, line: &str) -> Result<(), AppError> {
        for stmt in split_statements(line) {
            let cmd = parse_command(&stmt)?;
            self.run(cmd)?;
        }
        Ok(())
    }

    /// Evaluate an expression such as `%g.center` or `ln(2)`.
    pub fn calculate_expr(&mut self, text: &str) -> Result<f64, AppError> {
        let tokens = tokenize(text)?;
        let e = expr::parse_expr(&tokens)?;
        expr::eval(&e, self)
    }

    /// Run a script file line by line.
    pub fn exec_file(&mut self, path: &Path) -> Result<(), AppError> {
        if self.exec_depth >= MAX_EXEC_DEPTH {
            return Err(AppError::execute(format!(
                "exec: nesting deeper than {MAX_EXEC_DEPTH} levels"
            )));
        }
        let text = fs::read_to_string(path)
            .map_err(|e| AppError::io(format!("Failed to read script '{}': {e}", path.display())))?;

        self.exec_depth += 1;
        let mut result = Ok(());
        for (no, line) in text.lines().enumerate() {
            if let Err(e) = self.execute(line) {
                result = Err(e.context(format!("{}:{}", path.display(), no + 1)));
                break;
            }
        }
        self.exec_depth -= 1;
        result
    }

    /// Replace (or append, when `n == dataset_count()`) dataset `n` with
    /// raw arrays. An empty `sigma` means "use `default_sigma`".
    pub fn load_data(&mut self, n: usize, x: &[f64], y: &[f64], sigma: &[f64], title: &str) -> Result<(), AppError> {
        if x.len() != y.len() || (!sigma.is_empty() && sigma.len() != x.len()) {
            return Err(AppError::execute("load_data: arrays differ in length"));
        }
        let cols = data::Columns {
            x: x.to_vec(),
            y: y.to_vec(),
            sigma: (!sigma.is_empty()).then(|| sigma.to_vec()),
        };
        let points = data::columns_to_points(&cols, self.settings.default_sigma)?;
        let slot = self.slot_for(DatasetToken::Index(n))?;
        let ds = &mut self.datasets[slot];
        ds.points = points;
        ds.title = title.to_string();
        ds.filename.clear();
        Ok(())
    }

    /// Append a point to the default dataset.
    pub fn add_point(&mut self, x: f64, y: f64, sigma: f64) -> Result<(), AppError> {
        self.insert_point(Point::new(x, y, sigma))
    }

    fn insert_point(&mut self, p: Point) -> Result<(), AppError> {
        if !(p.x.is_finite() && p.y.is_finite()) {
            return Err(AppError::execute("Point coordinates must be finite."));
        }
        if !(p.sigma.is_finite() && p.sigma > 0.0) {
            return Err(AppError::execute(format!("Invalid sigma {} (must be > 0).", p.sigma)));
        }
        let ds = &mut self.datasets[self.default_ds];
        let pos = ds.points.partition_point(|q| q.x <= p.x);
        ds.points.insert(pos, p);
        Ok(())
    }

    /// Index of the slot a load targets; `@+` and `@count` append.
    fn slot_for(&mut self, target: DatasetToken) -> Result<usize, AppError> {
        match target {
            DatasetToken::Index(n) if n < self.datasets.len() => Ok(n),
            DatasetToken::Index(n) if n == self.datasets.len() => {
                self.datasets.push(Dataset::default());
                Ok(n)
            }
            DatasetToken::New => {
                self.datasets.push(Dataset::default());
                Ok(self.datasets.len() - 1)
            }
            DatasetToken::Index(n) => Err(AppError::execute(format!("No such dataset: @{n}"))),
            DatasetToken::All => Err(AppError::execute("`@*` cannot be used here")),
        }
    }

    fn run(&mut self, cmd: Command) -> Result<(), AppError> {
        match cmd {
            Command::Load { dataset, path } => self.load_file(dataset, &path),
            Command::NewDataset => {
                self.datasets.push(Dataset::default());
                Ok(())
            }
            Command::Use(n) => {
                self.dataset(n)?;
                self.default_ds = n;
                Ok(())
            }
            Command::Title(t) => {
                self.datasets[self.default_ds].title = t;
                Ok(())
            }
            Command::Filename(f) => {
                self.datasets[self.default_ds].filename = f;
                Ok(())
            }
            Command::Point { x, y, sigma, active } => {
                let x = expr::eval(&x, self)?;
                let y = expr::eval(&y, self)?;
                let sigma = expr::eval(&sigma, self)?;
                let mut p = Point::new(x, y, sigma);
                if let Some(a) = active {
                    p.is_active = expr::eval(&a, self)? != 0.0;
                }
                self.insert_point(p)
            }
            Command::Define { name, kind, args } => self.define_function(&name, kind, &args),
            Command::DefineVariable { name, value, fitted } => self.define_variable(&name, &value, fitted),
            Command::Transform(assignments) => self.transform(&assignments),
            Command::AddToModel(name) => self.add_to_model(&name),
            Command::Guess { name, kind, range } => self.guess(name, kind, &range),
            Command::Fit {
                max_iterations,
                datasets,
            } => self.fit(max_iterations, &datasets),
            Command::Info { what, redirect } => {
                let text = self.info_for(&what)?;
                match redirect {
                    None => {
                        self.mesg(Level::Output, &text);
                        Ok(())
                    }
                    Some(r) => write_redirect(&r, &text),
                }
            }
            Command::Print(e) => {
                let v = expr::eval(&e, self)?;
                let text = self.settings.numeric_format.format(v);
                self.mesg(Level::Output, &text);
                Ok(())
            }
            Command::Set { key, value } => {
                self.settings.set(&key, &value)?;
                if key == "pseudo_random_seed" {
                    self.rng = seeded_rng(self.settings.pseudo_random_seed);
                }
                Ok(())
            }
            Command::Delete(targets) => self.delete(&targets),
            Command::Reset => {
                self.reset();
                Ok(())
            }
            Command::Exec(path) => self.exec_file(Path::new(&path)),
        }
    }

    fn load_file(&mut self, target: DatasetToken, path: &str) -> Result<(), AppError> {
        let loaded = data::load_file(Path::new(path), self.settings.default_sigma)?;
        let slot = self.slot_for(target)?;
        let ds = &mut self.datasets[slot];
        ds.points = loaded.points;
        ds.title = loaded.title;
        ds.filename = loaded.filename;
        let msg = format!("{} points loaded into @{slot}.", ds.points.len());
        self.mesg(Level::Progress, &msg);
        Ok(())
    }

    /// Define or redefine `%name`.
    fn define_function(&mut self, name: &str, kind: FunctionKind, args: &[ParamArg]) -> Result<(), AppError> {
        let names = kind.param_names();
        let mut params: Vec<Option<Param>> = vec![None; names.len()];
        let mut next_positional = 0;

        for arg in args {
            let idx = match &arg.name {
                Some(pn) => names
                    .iter()
                    .position(|n| n.eq_ignore_ascii_case(pn))
                    .ok_or_else(|| AppError::execute(format!("{kind} has no parameter `{pn}`")))?,
                None => {
                    next_positional += 1;
                    next_positional - 1
                }
            };
            if idx >= names.len() {
                return Err(AppError::execute(format!(
                    "{kind} takes {} parameters, more given",
                    names.len()
                )));
            }
            if params[idx].is_some() {
                return Err(AppError::execute(format!(
                    "Parameter `{}` of %{name} given twice",
                    names[idx]
                )));
            }
            // A bare `$var` binds the parameter; anything else is a value.
            let param = match (&arg.value, arg.fitted) {
                (Expr::VarRef(v), false) => Param::bound(
                    self.find_variable(v)
                        .ok_or_else(|| AppError::execute(format!("Undefined variable: ${v}")))?,
                ),
                _ => {
                    let value = expr::eval(&arg.value, self)?;
                    if !value.is_finite() {
                        return Err(AppError::execute(format!(
                            "Parameter `{}` of %{name} must be finite, got {value}.",
                            names[idx]
                        )));
                    }
                    Param {
                        value,
                        fitted: arg.fitted,
                        var: None,
                    }
                }
            };
            params[idx] = Some(param);
        }

        let mut resolved = Vec::with_capacity(names.len());
        for (i, p) in params.into_iter().enumerate() {
            let p = p
                .or_else(|| kind.param_default(i).map(Param::fitted))
                .ok_or_else(|| AppError::execute(format!("Missing parameter `{}` of %{name}", names[i])))?;
            resolved.push(p);
        }

        self.put_function(Function {
            name: name.to_string(),
            kind,
            params: resolved,
        });
        Ok(())
    }

    fn put_function(&mut self, func: Function) {
        let msg = match self.function_index(&func.name) {
            Some(i) => {
                let msg = format!("%{} was changed.", func.name);
                self.functions[i] = func;
                msg
            }
            None => {
                let msg = format!("New function %{} was created.", func.name);
                self.functions.push(func);
                msg
            }
        };
        self.mesg(Level::Output, &msg);
    }

    /// Define or redefine `$name`; parameters bound to it follow.
    fn define_variable(&mut self, name: &str, value: &Expr, fitted: bool) -> Result<(), AppError> {
        let value = expr::eval(value, self)?;
        if !value.is_finite() {
            return Err(AppError::execute(format!("${name} must be finite, got {value}.")));
        }
        let var = Variable {
            name: name.to_string(),
            value,
            fitted,
        };
        let msg = match self.variables.iter().position(|v| v.name == name) {
            Some(i) => {
                self.variables[i] = var;
                format!("${name} was changed.")
            }
            None => {
                self.variables.push(var);
                format!("New variable ${name} was created.")
            }
        };
        self.sync_bound_params(name);
        self.mesg(Level::Output, &msg);
        Ok(())
    }

    /// Copy `$name`'s value and fitted flag into every parameter bound to it.
    fn sync_bound_params(&mut self, name: &str) {
        let Some(var) = self.find_variable(name).cloned() else {
            return;
        };
        for p in self.functions.iter_mut().flat_map(|f| f.params.iter_mut()) {
            if p.var.as_deref() == Some(name) {
                p.value = var.value;
                p.fitted = var.fitted;
            }
        }
    }

    fn add_to_model(&mut self, name: &str) -> Result<(), AppError> {
        if self.find_function(name).is_none() {
            return Err(AppError::execute(format!("Undefined function: %{name}")));
        }
        let model = &mut self.datasets[self.default_ds].model;
        if model.iter().any(|m| m == name) {
            return Err(AppError::execute(format!("%{name} is already in F")));
        }
        model.push(name.to_string());
        Ok(())
    }

    /// First unused `_N` name.
    fn auto_name(&self) -> String {
        (1..)
            .map(|n| format!("_{n}"))
            .find(|n| self.find_function(n).is_none())
            .unwrap_or_default()
    }

    fn guess(&mut self, name: Option<String>, kind: FunctionKind, range: &RangeArg) -> Result<(), AppError> {
        let from = match &range.from {
            Some(e) => expr::eval(e, self)?,
            None => f64::NEG_INFINITY,
        };
        let to = match &range.to {
            Some(e) => expr::eval(e, self)?,
            None => f64::INFINITY,
        };
        let name = name.unwrap_or_else(|| self.auto_name());

        let ds = &self.datasets[self.default_ds];
        let idx = ds.active_indices_in(from, to);
        let mut input = GuessInput::default();
        for &i in &idx {
            let p = &ds.points[i];
            let others: f64 = ds
                .model
                .iter()
                .filter(|m| **m != name)
                .filter_map(|m| self.find_function(m))
                .map(|f| function_value(f, p.x))
                .sum();
            input.x.push(p.x);
            input.y.push(p.y - others);
        }
        if self.settings.guess_uses_weights {
            input.sigma = Some(idx.iter().map(|&i| ds.points[i].sigma).collect());
        }

        let opts = GuessOptions {
            height_correction: self.settings.height_correction,
            width_correction: self.settings.width_correction,
            epsilon: self.settings.epsilon,
        };
        let values = fit::guess_params(kind, &input, &opts)?;
        if let Some(v) = values.iter().find(|v| !v.is_finite()) {
            return Err(AppError::numeric(format!("guess: estimated parameter is not finite ({v}).")));
        }
        let func = Function {
            name: name.clone(),
            kind,
            params: values.into_iter().map(Param::fitted).collect(),
        };
        let text = format_function(&func, self.settings.numeric_format);
        self.put_function(func);
        self.mesg(Level::Progress, &text);

        let model = &mut self.datasets[self.default_ds].model;
        if !model.iter().any(|m| *m == name) {
            model.push(name);
        }
        Ok(())
    }

    fn fit_targets(&self, targets: &[DatasetToken]) -> Result<Vec<usize>, AppError> {
        if targets.is_empty() {
            return Ok(vec![self.default_ds]);
        }
        if targets.contains(&DatasetToken::All) {
            return Ok((0..self.datasets.len()).collect());
        }
        let mut out = Vec::new();
        for t in targets {
            match t {
                DatasetToken::Index(n) => {
                    self.dataset(*n)?;
                    if !out.contains(n) {
                        out.push(*n);
                    }
                }
                _ => return Err(AppError::execute("fit: dataset `@N` or `@*` expected")),
            }
        }
        Ok(out)
    }

    fn fit_problem(&self, datasets: &[usize]) -> FitProblem {
        let mut observations = Vec::new();
        let mut models = Vec::with_capacity(datasets.len());
        for (k, &di) in datasets.iter().enumerate() {
            let ds = &self.datasets[di];
            models.push(ds.model.iter().filter_map(|n| self.function_index(n)).collect());
            observations.extend(ds.active_points().map(|p| Observation {
                x: p.x,
                y: p.y,
                sigma: p.sigma,
                model: k,
            }));
        }
        FitProblem::new(observations, models, self.functions.clone())
    }

    fn lm_options(&self, max_iterations: Option<usize>) -> LmOptions {
        let s = &self.settings;
        LmOptions {
            lambda_start: s.lm_lambda_start,
            lambda_up_factor: s.lm_lambda_up_factor,
            lambda_down_factor: s.lm_lambda_down_factor,
            max_lambda: s.lm_max_lambda,
            stop_rel_change: s.lm_stop_rel_change,
            max_evaluations: s.max_wssr_evaluations,
            max_iterations,
        }
    }

    fn fit(&mut self, max_iterations: Option<usize>, targets: &[DatasetToken]) -> Result<(), AppError> {
        let indices = self.fit_targets(targets)?;
        let problem = self.fit_problem(&indices);
        let opts = self.lm_options(max_iterations);

        let verbosity = self.settings.verbosity;
        let ui = &mut self.ui;
        let outcome = fit::run_lm(&problem, &opts, &mut |level, msg| ui.mesg(verbosity, level, msg))?;

        let fmt = self.settings.numeric_format;
        let msg = if outcome.improved() {
            for (fp, &v) in problem.free.iter().zip(&outcome.params) {
                for slot in &fp.slots {
                    self.functions[slot.func].params[slot.param].value = v;
                }
                if let Some(name) = &fp.var {
                    if let Some(var) = self.variables.iter_mut().find(|x| x.name == *name) {
                        var.value = v;
                    }
                    self.sync_bound_params(name);
                }
            }
            format!(
                "Fit {}: WSSR {} -> {} ({}%) after {} iterations.",
                outcome.stop.describe(),
                fmt.format(outcome.initial_wssr),
                fmt.format(outcome.wssr),
                fmt.format(relative_change_percent(outcome.initial_wssr, outcome.wssr)),
                outcome.iterations
            )
        } else {
            format!(
                "Fit {}: better fit not found (WSSR = {}), parameters unchanged.",
                outcome.stop.describe(),
                fmt.format(outcome.initial_wssr)
            )
        };
        self.mesg(Level::Output, &msg);
        Ok(())
    }

    /// WSSR, SSR, R² and DOF of dataset `n` with the current parameters.
    pub fn fit_stats(&self, n: usize) -> Result<FitStats, AppError> {
        let ds = self.dataset(n)?;
        let residuals: Vec<Residual> = ds
            .active_points()
            .map(|p| Residual {
                y: p.y,
                sigma: p.sigma,
                model: model_value(ds, p.x, |name| self.find_function(name)),
            })
            .collect();
        let n_params = self.fit_problem(&[n]).free.len();
        Ok(fit::compute_stats(&residuals, n_params))
    }

    pub fn get_wssr(&self) -> Result<f64, AppError> {
        Ok(self.fit_stats(self.default_ds)?.wssr)
    }

    pub fn get_ssr(&self) -> Result<f64, AppError> {
        Ok(self.fit_stats(self.default_ds)?.ssr)
    }

    pub fn get_rsquared(&self) -> Result<f64, AppError> {
        Ok(self.fit_stats(self.default_ds)?.rsquared)
    }

    pub fn get_dof(&self) -> Result<i64, AppError> {
        Ok(self.fit_stats(self.default_ds)?.dof)
    }

    /// Standard errors of the fitted parameters of the default dataset.
    pub fn param_errors(&self) -> Result<Vec<ParamError>, AppError> {
        let problem = self.fit_problem(&[self.default_ds]);
        if problem.free.is_empty() {
            return Ok(Vec::new());
        }
        let a = problem.initial_params();
        let errors = problem.standard_errors(&a).ok_or_else(|| {
            AppError::numeric("Cannot estimate errors: not enough degrees of freedom or singular matrix.")
        })?;
        Ok(problem
            .free
            .iter()
            .zip(a.iter().zip(errors))
            .map(|(fp, (&value, error))| {
                let name = match &fp.var {
                    Some(v) => format!("${v}"),
                    None => {
                        let slot = fp.slots[0];
                        let f = &self.functions[slot.func];
                        format!("%{}.{}", f.name, f.kind.param_names()[slot.param])
                    }
                };
                ParamError { name, value, error }
            })
            .collect())
    }

    fn delete(&mut self, targets: &[DeleteTarget]) -> Result<(), AppError> {
        // Validate everything first so a bad target leaves the session as is.
        for t in targets {
            match t {
                DeleteTarget::Function(name) if self.find_function(name).is_none() => {
                    return Err(AppError::execute(format!("Undefined function: %{name}")));
                }
                DeleteTarget::Variable(name) => {
                    if self.find_variable(name).is_none() {
                        return Err(AppError::execute(format!("Undefined variable: ${name}")));
                    }
                    let deleted_funcs: Vec<&str> = targets
                        .iter()
                        .filter_map(|t| match t {
                            DeleteTarget::Function(f) => Some(f.as_str()),
                            _ => None,
                        })
                        .collect();
                    let user = self.functions.iter().find(|f| {
                        !deleted_funcs.contains(&f.name.as_str())
                            && f.params.iter().any(|p| p.var.as_deref() == Some(name))
                    });
                    if let Some(f) = user {
                        return Err(AppError::execute(format!("${name} is used by %{}.", f.name)));
                    }
                }
                DeleteTarget::Dataset(n) => {
                    self.dataset(*n)?;
                }
                _ => {}
            }
        }

        let mut dataset_ids: Vec<usize> = Vec::new();
        for t in targets {
            match t {
                DeleteTarget::Function(name) => {
                    self.functions.retain(|f| f.name != *name);
                    for ds in &mut self.datasets {
                        ds.model.retain(|m| m != name);
                    }
                }
                DeleteTarget::Variable(name) => self.variables.retain(|v| v.name != *name),
                DeleteTarget::Dataset(n) => dataset_ids.push(*n),
            }
        }
        dataset_ids.sort_unstable();
        dataset_ids.dedup();
        for n in dataset_ids.into_iter().rev() {
            self.datasets.remove(n);
            if n < self.default_ds {
                self.default_ds -= 1;
            }
        }
        if self.datasets.is_empty() {
            self.datasets.push(Dataset::default());
        }
        self.default_ds = self.default_ds.min(self.datasets.len() - 1);
        Ok(())
    }

    /// Drop all data and functions and restore default settings.
    /// `verbosity` survives so that scripts can stay quiet across a reset.
    fn reset(&mut self) {
        let verbosity = self.settings.verbosity;
        self.datasets = vec![Dataset::default()];
        self.functions.clear();
        self.variables.clear();
        self.default_ds = 0;
        self.settings = Settings {
            verbosity,
            ..Settings::default()
        };
        self.rng = seeded_rng(self.settings.pseudo_random_seed);
    }
}

impl EvalContext for Session {
    fn param_value(&self, func: &str, param: &str) -> Result<f64, AppError> {
        let f = self
            .find_function(func)
            .ok_or_else(|| AppError::execute(format!("Undefined function: %{func}")))?;
        let i = f
            .param_index(param)
            .ok_or_else(|| AppError::execute(format!("%{func} ({}) has no parameter `{param}`", f.kind)))?;
        Ok(f.params[i].value)
    }

    fn function_at(&self, func: &str, x: f64) -> Result<f64, AppError> {
        self.find_function(func)
            .map(|f| function_value(f, x))
            .ok_or_else(|| AppError::execute(format!("Undefined function: %{func}")))
    }

    fn model_at(&self, x: f64) -> Result<f64, AppError> {
        self.get_model_value(self.default_ds, x)
    }

    fn variable_value(&self, name: &str) -> Result<f64, AppError> {
        self.find_variable(name)
            .map(|v| v.value)
            .ok_or_else(|| AppError::execute(format!("Undefined variable: ${name}")))
    }

    fn lookup(&self, name: &str) -> Result<Option<f64>, AppError> {
        if !matches!(name, "wssr" | "ssr" | "rsquared" | "dof") {
            return Ok(None);
        }
        let s = self.fit_stats(self.default_ds)?;
        Ok(Some(match name {
            "wssr" => s.wssr,
            "ssr" => s.ssr,
            "rsquared" => s.rsquared,
            _ => s.dof as f64,
        }))
    }

    fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

fn seeded_rng(seed: u64) -> StdRng {
    if seed == 0 {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        StdRng::seed_from_u64(nanos as u64)
    } else {
        StdRng::seed_from_u64(seed)
    }
}

fn relative_change_percent(before: f64, after: f64) -> f64 {
    if before == 0.0 {
        0.0
    } else {
        100.0 * (after - before) / before
    }
}

fn write_redirect(r: &Redirect, text: &str) -> Result<(), AppError> {
    let mut opts = OpenOptions::new();
    match r.mode {
        RedirectMode::Write => opts.write(true).create(true).truncate(true),
        RedirectMode::Append => opts.append(true).create(true),
    };
    let mut file = opts
        .open(&r.path)
        .map_err(|e| AppError::io(format!("Failed to open '{}' for writing: {e}", r.path)))?;
    writeln!(file, "{text}").map_err(|e| AppError::io(format!("Failed to write '{}': {e}", r.path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::value_at;
    use std::sync::{Arc, Mutex};

    fn quiet() -> Session {
        let mut s = Session::new();
        s.set_message_sink(MessageSink::Discard);
        s
    }

    fn with_gaussian(center: f64) -> Session {
        let mut s = quiet();
        let x: Vec<f64> = (0..300).map(|i| i as f64 * 0.02).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&xi| value_at(FunctionKind::Gaussian, xi, &[40.0, center, 0.4]) + 2.0)
            .collect();
        s.load_data(0, &x, &y, &[], "synthetic").unwrap();
        s
    }

    #[test]
    fn guess_then_fit_recovers_peak() {
        let mut s = with_gaussian(3.1);
        s.execute("%bg = Constant(~1); F += %bg").unwrap();
        s.execute("%p = guess Gaussian").unwrap();
        assert_eq!(s.datasets()[0].model, vec!["bg".to_string(), "p".to_string()]);

        let before = s.get_wssr().unwrap();
        s.execute("fit").unwrap();
        let after = s.get_wssr().unwrap();
        assert!(after < before);
        assert!((s.calculate_expr("%p.Center").unwrap() - 3.1).abs() < 1e-4);
        assert!((s.calculate_expr("%bg.a").unwrap() - 2.0).abs() < 1e-3);
        assert!(s.get_rsquared().unwrap() > 0.999);
    }

    #[test]
    fn expression_reads_are_stable_without_a_fit() {
        let mut s = with_gaussian(3.0);
        s.execute("guess %g = Gaussian [2:4]").unwrap();
        let a = s.calculate_expr("%g.center").unwrap();
        let b = s.calculate_expr("%g.center").unwrap();
        assert_eq!(a, b);
        assert_eq!(s.get_wssr().unwrap(), s.get_wssr().unwrap());
    }

    #[test]
    fn define_with_named_defaults_and_redefine() {
        let mut s = quiet();
        s.execute("%v = PseudoVoigt(hwhm=0.2, height=~10, center=1)").unwrap();
        let v = s.find_function("v").unwrap();
        assert_eq!(v.param_values(), vec![10.0, 1.0, 0.2, 0.5]);
        assert!(v.params[0].fitted && !v.params[1].fitted && v.params[3].fitted);

        s.execute("%v = Gaussian(1, 2, 3)").unwrap();
        assert_eq!(s.functions().len(), 1);
        assert_eq!(s.find_function("v").unwrap().kind, FunctionKind::Gaussian);

        assert!(s.execute("%w = Gaussian(1, 2)").is_err());
        assert!(s.execute("%w = Gaussian(1, 2, 3, center=4)").is_err());
        assert!(s.execute("F += %nope").is_err());
    }

    #[test]
    fn datasets_points_and_delete() {
        let mut s = quiet();
        s.execute("point 2, 5, 1; point 1, 4, 1; point 3, 1, 1, 0").unwrap();
        let xs: Vec<f64> = s.get_data(0).unwrap().iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![1.0, 2.0, 3.0]);
        assert!(!s.get_data(0).unwrap()[2].is_active);
        assert!(s.execute("point 1, 1, 0").is_err());

        s.execute("@+ = 0; use @1; title = 'second'").unwrap();
        assert_eq!(s.dataset_count(), 2);
        assert_eq!(s.default_dataset(), 1);
        assert!(s.execute("use @5").is_err());

        s.execute("delete @0").unwrap();
        assert_eq!(s.dataset_count(), 1);
        assert_eq!(s.default_dataset(), 0);
        assert_eq!(s.datasets()[0].title, "second");

        s.execute("delete @0").unwrap();
        assert_eq!(s.dataset_count(), 1);
        assert!(s.get_data(0).unwrap().is_empty());
    }

    #[test]
    fn info_and_print_go_through_the_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut s = Session::new();
        s.set_show_message(move |m| sink.lock().unwrap().push(m.to_string()));

        s.execute("print 1 + 1; info ln(2)").unwrap();
        s.execute("set numeric_format = '%.3f'; print pi").unwrap();
        s.execute("set verbosity = -1; print 5").unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["2", "0.693147", "3.142"]);
    }

    #[test]
    fn fit_without_parameters_is_an_error() {
        let mut s = with_gaussian(3.0);
        assert!(s.execute("fit").is_err());
        s.execute("%c = Constant(2); F += %c").unwrap();
        assert!(s.execute("fit").is_err());
    }

    #[test]
    fn reset_keeps_verbosity_only() {
        let mut s = with_gaussian(3.0);
        s.execute("set verbosity = -1; set epsilon = 0.5; %a = Constant(1)").unwrap();
        s.execute("reset").unwrap();
        assert_eq!(s.settings().verbosity, -1);
        assert_eq!(s.settings().epsilon, Settings::default().epsilon);
        assert!(s.functions().is_empty());
        assert!(s.get_data(0).unwrap().is_empty());
    }

    #[test]
    fn load_data_rejects_mismatched_arrays() {
        let mut s = quiet();
        assert!(s.load_data(0, &[1.0, 2.0], &[1.0], &[], "").is_err());
        assert!(s.load_data(3, &[1.0], &[1.0], &[], "").is_err());
        s.load_data(1, &[1.0], &[4.0], &[], "b").unwrap();
        assert_eq!(s.dataset_count(), 2);
        assert_eq!(s.get_data(1).unwrap()[0].sigma, 2.0);
    }

    fn temp_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("peakfit_session_{tag}_{}", std::process::id()))
    }

    #[test]
    fn one_function_fitted_across_two_datasets() {
        let mut s = quiet();
        for (n, step) in [(0, 0.02), (1, 0.03)] {
            let x: Vec<f64> = (0..200).map(|i| i as f64 * step).collect();
            let y: Vec<f64> = x
                .iter()
                .map(|&xi| value_at(FunctionKind::Gaussian, xi, &[40.0, 3.0, 0.4]))
                .collect();
            s.load_data(n, &x, &y, &[], "shared").unwrap();
        }
        s.execute("%g = Gaussian(~30, ~3.2, ~0.5); F += %g; use @1; F += %g").unwrap();
        s.execute("fit @0 @1").unwrap();
        assert!((s.calculate_expr("%g.center").unwrap() - 3.0).abs() < 1e-4);
        assert!(s.fit_stats(0).unwrap().wssr < 1e-4);
        assert!(s.fit_stats(1).unwrap().wssr < 1e-4);

        s.execute("%g = Gaussian(~35, ~2.9, ~0.45); fit @*").unwrap();
        assert!((s.calculate_expr("%g.height").unwrap() - 40.0).abs() < 1e-2);
        assert!(s.execute("fit @7").is_err());
    }

    #[test]
    fn variables_bind_parameters() {
        let mut s = quiet();
        s.execute("$w = ~0.5; %a = Gaussian(10, 1, $w)").unwrap();
        assert_eq!(s.find_function("a").unwrap().params[2].var.as_deref(), Some("w"));

        s.execute("$w = 0.25").unwrap();
        let p = &s.find_function("a").unwrap().params[2];
        assert_eq!((p.value, p.fitted), (0.25, false));
        assert_eq!(s.calculate_expr("$w * 4").unwrap(), 1.0);

        assert!(s.execute("delete $w").is_err());
        s.execute("delete %a, $w").unwrap();
        assert!(s.variables().is_empty());
        assert!(s.execute("%b = Gaussian(1, 2, $nope)").is_err());
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let mut s = quiet();
        s.execute("%c = Constant(1)").unwrap();
        let err = s.execute("%c = Constant(ln(0))").unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert_eq!(s.find_function("c").unwrap().params[0].value, 1.0);

        assert!(s.execute("$v = sqrt(-1)").is_err());
        assert!(s.variables().is_empty());
    }

    #[test]
    fn script_errors_carry_path_and_line() {
        let path = temp_path("bad.fit");
        fs::write(&path, "print 1\nfrobnicate 2\n").unwrap();
        let mut s = quiet();
        let err = s.execute(&format!("exec '{}'", path.display())).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().starts_with(&format!("{}:2: ", path.display())));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn self_including_script_hits_depth_limit() {
        let path = temp_path("loop.fit");
        fs::write(&path, format!("$n = 1\nexec '{}'\n", path.display())).unwrap();
        let mut s = quiet();
        let err = s.exec_file(&path).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.message().contains(&format!("nesting deeper than {MAX_EXEC_DEPTH} levels")));
        assert!(err.message().starts_with(&format!("{}:2: ", path.display())));
        // the session is usable afterwards
        s.exec_file(&temp_path("missing.fit")).unwrap_err();
        assert_eq!(s.exec_depth, 0);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn info_redirect_writes_then_appends() {
        let path = temp_path("info.txt");
        let p = path.display();
        let mut s = quiet();
        s.execute(&format!("info 1 + 1 > '{p}'; info 2 * 2 >> '{p}'")).unwrap();
        s.execute(&format!("info 3 >> '{p}'")).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "2\n4\n3\n");

        s.execute(&format!("info 5 > '{p}'")).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "5\n");
        fs::remove_file(&path).ok();
    }
}
