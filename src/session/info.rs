//! `info` targets.

use super::Session;
use super::expr;
use super::lexer::{DatasetToken, Token, tokenize};
use super::settings::{SETTING_KEYS, Settings};
use super::state;
use crate::error::AppError;
use crate::report::{
    format_component, format_data_info, format_fit_summary, format_function, format_param_errors,
    format_peaks_table, format_types, format_variable,
};

impl Session {
    /// Text that `info <what>` would show.
    ///
    /// Unknown words are evaluated as an expression, so `get_info("ln(2)")`
    /// returns the formatted number.
    pub fn get_info(&mut self, what: &str) -> Result<String, AppError> {
        let tokens = tokenize(what)?;
        if tokens.is_empty() {
            return Err(AppError::syntax("info: argument expected"));
        }
        self.info_for(&tokens)
    }

    pub(super) fn info_for(&mut self, tokens: &[Token]) -> Result<String, AppError> {
        // `... in @N` answers for dataset N instead of the default one.
        if let [head @ .., Token::Name(kw), Token::Dataset(ds)] = tokens {
            if kw == "in" {
                let DatasetToken::Index(n) = *ds else {
                    return Err(AppError::syntax("info: `in @N` expected"));
                };
                if head.is_empty() {
                    return Err(AppError::syntax("info: argument expected"));
                }
                self.dataset(n)?;
                let saved = std::mem::replace(&mut self.default_ds, n);
                let result = self.info_for(head);
                self.default_ds = saved;
                return result;
            }
        }
        if let [Token::Name(word), rest @ ..] = tokens {
            if let Some(text) = self.named_info(word, rest)? {
                return Ok(text);
            }
        }
        let e = expr::parse_expr(tokens)?;
        let v = expr::eval(&e, self)?;
        Ok(self.settings.numeric_format.format(v))
    }

    fn named_info(&self, word: &str, rest: &[Token]) -> Result<Option<String>, AppError> {
        let fmt = self.settings.numeric_format;
        let ds = &self.datasets[self.default_ds];

        let text = match (word, rest) {
            ("version", []) => format!("peakfit {}", super::VERSION),
            ("data", []) => format_data_info(ds, fmt),
            ("title", []) => ds.title.clone(),
            ("filename", []) => ds.filename.clone(),
            ("dataset_count", []) => self.datasets.len().to_string(),
            ("functions", []) => {
                if self.functions.is_empty() {
                    "No functions defined.".to_string()
                } else {
                    self.functions
                        .iter()
                        .map(|f| format_function(f, fmt))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            ("variables", []) => {
                if self.variables.is_empty() {
                    "No variables defined.".to_string()
                } else {
                    self.variables
                        .iter()
                        .map(|v| format_variable(v, fmt))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            ("types", []) => format_types(),
            ("peaks", []) => {
                let funcs: Vec<_> = ds.model.iter().filter_map(|n| self.find_function(n)).collect();
                format_peaks_table(&funcs, fmt)
            }
            ("formula", []) => {
                let parts: Vec<String> = ds
                    .model
                    .iter()
                    .filter_map(|n| self.find_function(n))
                    .map(|f| format_component(f, fmt))
                    .collect();
                if parts.is_empty() {
                    "0".to_string()
                } else {
                    parts.join(" + ")
                }
            }
            ("errors", []) => format_param_errors(&self.param_errors()?, fmt),
            ("fit", []) => format_fit_summary(&self.fit_stats(self.default_ds)?, fmt),
            ("state", []) => state::render(self),
            ("set", []) => SETTING_KEYS
                .iter()
                .map(|k| Ok(format!("{k} = {}", self.settings.get_as_string(k)?)))
                .collect::<Result<Vec<_>, AppError>>()?
                .join("\n"),
            ("set", [Token::Name(key)]) => format!(
                "{key} = {}  ({})",
                self.settings.get_as_string(key)?,
                Settings::type_desc(key)
            ),
            _ => return Ok(None),
        };
        Ok(Some(text))
    }
}

#[cfg(test)]
mod tests {
    use crate::session::Session;
    use crate::session::ui::MessageSink;

    fn session() -> Session {
        let mut s = Session::new();
        s.set_message_sink(MessageSink::Discard);
        s.execute("title = 'demo'; point 1, 2, 1; point 2, 6, 1; point 3, 2, 1").unwrap();
        s.execute("%g = Gaussian(~4, ~2, 0.5); %c = Constant(2); F += %c; F += %g").unwrap();
        s
    }

    #[test]
    fn simple_targets() {
        let mut s = session();
        assert!(s.get_info("version").unwrap().starts_with("peakfit "));
        assert_eq!(s.get_info("title").unwrap(), "demo");
        assert_eq!(s.get_info("dataset_count").unwrap(), "1");
        assert_eq!(s.get_info("formula").unwrap(), "Constant(2) + Gaussian(4, 2, 0.5)");
        assert_eq!(s.get_info("dof").unwrap(), "1");
        assert!(s.get_info("types").unwrap().contains("PseudoVoigt(height, center, hwhm, shape)"));
        assert!(s.get_info("functions").unwrap().contains("%g = Gaussian(height=~4, center=~2, hwhm=0.5)"));
    }

    #[test]
    fn expressions_and_settings() {
        let mut s = session();
        assert_eq!(s.get_info("ln(2)").unwrap(), "0.693147");
        assert_eq!(s.get_info("%g.height * 2").unwrap(), "8");
        assert_eq!(s.get_info("set epsilon").unwrap(), "epsilon = 0.000000000001  (real number)");
        assert!(s.get_info("set").unwrap().lines().any(|l| l == "default_sigma = sqrt"));
        assert!(s.get_info("set nonsense").is_err());
        assert!(s.get_info("").is_err());
        assert!(s.get_info("frobnicate").is_err());
    }

    #[test]
    fn targets_for_another_dataset() {
        let mut s = session();
        s.execute("@+ = 0; use @1; title = 'other'; point 5, 1, 1; point 6, 1, 1").unwrap();
        s.execute("$c = ~1; %k = Constant($c); F += %k; use @0").unwrap();

        assert_eq!(s.get_info("title in @1").unwrap(), "other");
        assert_eq!(s.get_info("formula in @1").unwrap(), "Constant(1)");
        assert_eq!(s.get_info("wssr in @1").unwrap(), "0");
        assert!(s.get_info("data in @1").unwrap().contains("2 points"));
        assert_eq!(s.get_info("F(1) in @1").unwrap(), "1");
        assert_eq!(s.default_dataset(), 0);
        assert_eq!(s.get_info("title").unwrap(), "demo");

        assert!(s.get_info("title in @4").is_err());
        assert!(s.get_info("title in @*").is_err());
        assert!(s.get_info("in @1").is_err());
        assert_eq!(s.get_info("variables").unwrap(), "$c = ~1");
    }

    #[test]
    fn wssr_matches_getter() {
        let mut s = session();
        let w = s.get_wssr().unwrap();
        assert_eq!(s.calculate_expr("wssr").unwrap(), w);
        assert!(s.get_info("fit").unwrap().starts_with("WSSR: "));
    }
}
