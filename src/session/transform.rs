//! Data transformations: `X = expr, Y = expr, S = expr, A = expr`.
//!
//! Assignments apply in order to every point of the default dataset. Inside
//! an expression `x`, `y`, `s` and `a` are the point's current values, `n`
//! its index and `M` the number of points. The dataset is only replaced when
//! every resulting point is valid, then re-sorted by x.

use rand::rngs::StdRng;

use super::Session;
use super::command::PointColumn;
use super::expr::{self, EvalContext, Expr};
use super::ui::Level;
use crate::domain::Point;
use crate::error::AppError;

struct PointScope<'a> {
    session: &'a mut Session,
    point: Point,
    index: usize,
    count: usize,
}

impl EvalContext for PointScope<'_> {
    fn param_value(&self, func: &str, param: &str) -> Result<f64, AppError> {
        self.session.param_value(func, param)
    }

    fn function_at(&self, func: &str, x: f64) -> Result<f64, AppError> {
        self.session.function_at(func, x)
    }

    fn model_at(&self, x: f64) -> Result<f64, AppError> {
        self.session.model_at(x)
    }

    fn variable_value(&self, name: &str) -> Result<f64, AppError> {
        self.session.variable_value(name)
    }

    fn lookup(&self, name: &str) -> Result<Option<f64>, AppError> {
        let p = &self.point;
        let v = match name {
            "x" => p.x,
            "y" => p.y,
            "s" => p.sigma,
            "a" => {
                if p.is_active {
                    1.0
                } else {
                    0.0
                }
            }
            "n" => self.index as f64,
            "M" => self.count as f64,
            _ => return self.session.lookup(name),
        };
        Ok(Some(v))
    }

    fn rng(&mut self) -> &mut StdRng {
        self.session.rng()
    }
}

impl Session {
    pub(super) fn transform(&mut self, assignments: &[(PointColumn, Expr)]) -> Result<(), AppError> {
        let mut points = self.datasets[self.default_ds].points.clone();
        let count = points.len();

        for (column, e) in assignments {
            let mut values = Vec::with_capacity(count);
            for (index, &point) in points.iter().enumerate() {
                let mut scope = PointScope {
                    session: self,
                    point,
                    index,
                    count,
                };
                values.push(expr::eval(e, &mut scope)?);
            }
            for (p, v) in points.iter_mut().zip(values) {
                match column {
                    PointColumn::X => p.x = v,
                    PointColumn::Y => p.y = v,
                    PointColumn::S => p.sigma = v,
                    PointColumn::A => p.is_active = v != 0.0,
                }
            }
        }

        for (i, p) in points.iter().enumerate() {
            if !(p.x.is_finite() && p.y.is_finite()) {
                return Err(AppError::execute(format!(
                    "Transformation gives non-finite point {i}: x = {}, y = {}.",
                    p.x, p.y
                )));
            }
            if !(p.sigma.is_finite() && p.sigma > 0.0) {
                return Err(AppError::execute(format!(
                    "Transformation gives invalid sigma {} at point {i} (must be > 0).",
                    p.sigma
                )));
            }
        }

        let ds = &mut self.datasets[self.default_ds];
        ds.points = points;
        ds.sort_points();
        let msg = format!("{count} points of @{} transformed.", self.default_ds);
        self.mesg(Level::Debug, &msg);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::session::Session;
    use crate::session::ui::MessageSink;

    fn session() -> Session {
        let mut s = Session::new();
        s.set_message_sink(MessageSink::Discard);
        s.execute("point 1, 2, 1; point 2, 4, 1; point 3, 6, 1").unwrap();
        s
    }

    fn column(s: &Session, f: impl Fn(&crate::domain::Point) -> f64) -> Vec<f64> {
        s.get_data(0).unwrap().iter().map(f).collect()
    }

    #[test]
    fn assignments_apply_in_order() {
        let mut s = session();
        s.execute("Y = y / 2, S = 0.5").unwrap();
        assert_eq!(column(&s, |p| p.y), vec![1.0, 2.0, 3.0]);
        assert_eq!(column(&s, |p| p.sigma), vec![0.5; 3]);

        s.execute("X = x + 1, Y = x").unwrap();
        assert_eq!(column(&s, |p| p.y), vec![2.0, 3.0, 4.0]);

        s.execute("Y = n * 10 + M").unwrap();
        assert_eq!(column(&s, |p| p.y), vec![3.0, 13.0, 23.0]);
    }

    #[test]
    fn x_changes_resort_points() {
        let mut s = session();
        s.execute("X = -x").unwrap();
        assert_eq!(column(&s, |p| p.x), vec![-3.0, -2.0, -1.0]);
        assert_eq!(column(&s, |p| p.y), vec![6.0, 4.0, 2.0]);
    }

    #[test]
    fn activity_from_a_condition() {
        let mut s = session();
        s.execute("A = x > 1.5 and x < 2.5").unwrap();
        let active: Vec<bool> = s.get_data(0).unwrap().iter().map(|p| p.is_active).collect();
        assert_eq!(active, vec![false, true, false]);
        s.execute("A = not a").unwrap();
        assert_eq!(s.get_dof().unwrap(), 2);
    }

    #[test]
    fn expressions_see_functions_and_variables() {
        let mut s = session();
        s.execute("$k = 3; %c = Constant(1)").unwrap();
        s.execute("Y = y - %c(x) + $k").unwrap();
        assert_eq!(column(&s, |p| p.y), vec![4.0, 6.0, 8.0]);
    }

    #[test]
    fn invalid_result_leaves_data_unchanged() {
        let mut s = session();
        let before = s.get_data(0).unwrap().to_vec();
        assert!(s.execute("S = y - 2").is_err());
        assert!(s.execute("Y = ln(x - 1)").is_err());
        assert!(s.execute("Y = q").is_err());
        assert_eq!(s.get_data(0).unwrap(), &before[..]);
    }

    #[test]
    fn noise_follows_the_seed() {
        let noisy = |seed: u64| {
            let mut s = session();
            s.execute(&format!("set pseudo_random_seed = {seed}; Y = randnormal(y, s)")).unwrap();
            column(&s, |p| p.y)
        };
        assert_eq!(noisy(7), noisy(7));
        assert_ne!(noisy(7), noisy(8));
        assert_ne!(noisy(7), vec![2.0, 4.0, 6.0]);
    }
}
