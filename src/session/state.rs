//! Session state as a replayable script (`info state`, `dump`).
//!
//! Running the script in any session (or via `exec`) rebuilds the datasets,
//! variables, functions, models, settings and default dataset. Numbers are written in
//! shortest round-trip form so replaying is exact.

use std::fmt::Write;

use chrono::Local;

use super::Session;
use super::settings::SETTING_KEYS;
use crate::domain::Function;

pub fn render(session: &Session) -> String {
    let mut out = String::new();
    let settings = session.settings();

    let _ = writeln!(
        out,
        "# peakfit {} session. Created: {}",
        super::VERSION,
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    out.push_str("set verbosity = -1 # restored at the end\n");
    out.push_str("reset\n");
    for key in SETTING_KEYS.iter().filter(|k| **k != "verbosity") {
        if let Ok(v) = settings.get_as_string(key) {
            let _ = writeln!(out, "set {key} = {v}");
        }
    }

    for (i, ds) in session.datasets().iter().enumerate() {
        out.push('\n');
        if i > 0 {
            out.push_str("@+ = 0\n");
        }
        let _ = writeln!(out, "use @{i}");
        if !ds.title.is_empty() {
            let _ = writeln!(out, "title = '{}'", ds.title.replace('\'', "\""));
        }
        if !ds.filename.is_empty() {
            let _ = writeln!(out, "filename = '{}'", ds.filename.replace('\'', "\""));
        }
        for p in &ds.points {
            let _ = write!(out, "point {}, {}, {}", num(p.x), num(p.y), num(p.sigma));
            if !p.is_active {
                out.push_str(", 0");
            }
            out.push('\n');
        }
    }

    if !session.functions().is_empty() || !session.variables().is_empty() {
        out.push('\n');
    }
    for v in session.variables() {
        let _ = writeln!(out, "${} = {}{}", v.name, if v.fitted { "~" } else { "" }, num(v.value));
    }
    for f in session.functions() {
        let _ = writeln!(out, "{}", definition(f));
    }

    for (i, ds) in session.datasets().iter().enumerate() {
        if ds.model.is_empty() {
            continue;
        }
        let _ = writeln!(out, "use @{i}");
        for name in &ds.model {
            let _ = writeln!(out, "F += %{name}");
        }
    }

    out.push('\n');
    let _ = writeln!(out, "use @{}", session.default_dataset());
    let _ = write!(out, "set verbosity = {}", settings.verbosity);
    out
}

fn definition(f: &Function) -> String {
    let args: Vec<String> = f
        .kind
        .param_names()
        .iter()
        .zip(&f.params)
        .map(|(name, p)| match &p.var {
            Some(v) => format!("{name}=${v}"),
            None => format!("{name}={}{}", if p.fitted { "~" } else { "" }, num(p.value)),
        })
        .collect();
    format!("%{} = {}({})", f.name, f.kind, args.join(", "))
}

/// Shortest representation that parses back to the same `f64`.
fn num(v: f64) -> String {
    format!("{v:?}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ui::MessageSink;

    fn replay(text: &str) -> Session {
        let mut s = Session::new();
        s.set_message_sink(MessageSink::Discard);
        for line in text.lines() {
            s.execute(line).unwrap();
        }
        s
    }

    #[test]
    fn dump_replays_to_the_same_session() {
        let mut s = Session::new();
        s.set_message_sink(MessageSink::Discard);
        let x: Vec<f64> = (0..50).map(|i| 0.1 * i as f64 - 2.0).collect();
        let y: Vec<f64> = x.iter().map(|v| 3.0 / (1.0 + v * v) + 0.1).collect();
        s.load_data(0, &x, &y, &[], "it's data").unwrap();
        s.execute("%l = Lorentzian(~2.5, ~0.1, ~0.8); %b = Constant(1e-7); F += %l; F += %b").unwrap();
        s.execute("fit 3").unwrap();
        s.execute("@+ = 0; use @1; point -1.5, 2, 0.25; point 4, 1e300, 3, 0").unwrap();
        s.execute("F += %b; set numeric_format = '%.4e'; set lm_lambda_start = 0.01").unwrap();
        s.execute("filename = 'scan \"b\".dat'; use @0; filename = 'lorentz.dat'").unwrap();

        let text = render(&s);
        assert!(text.starts_with("# peakfit "));
        let r = replay(&text);

        assert_eq!(r.datasets().len(), 2);
        assert_eq!(r.datasets()[0].points, s.datasets()[0].points);
        assert_eq!(r.datasets()[1].points, s.datasets()[1].points);
        assert_eq!(r.datasets()[0].title, "it\"s data");
        assert_eq!(r.datasets()[0].filename, "lorentz.dat");
        assert_eq!(r.datasets()[1].filename, "scan \"b\".dat");
        assert_eq!(r.datasets()[1].model, vec!["b".to_string()]);
        assert_eq!(r.functions(), s.functions());
        assert_eq!(r.settings(), s.settings());
        assert_eq!(r.default_dataset(), 0);
        assert_eq!(r.get_wssr().unwrap(), s.get_wssr().unwrap());
    }

    #[test]
    fn variables_and_bound_parameters_replay() {
        let mut s = Session::new();
        s.set_message_sink(MessageSink::Discard);
        s.execute("$w = ~0.3; $k = 2.5; %a = Gaussian(~1, $k, $w); %b = Gaussian(2, ~4, $w)").unwrap();

        let text = render(&s);
        assert!(text.contains("$w = ~0.3\n$k = 2.5\n"));
        assert!(text.contains("%a = Gaussian(height=~1.0, center=$k, hwhm=$w)"));
        let r = replay(&text);
        assert_eq!(r.variables(), s.variables());
        assert_eq!(r.functions(), s.functions());
    }

    #[test]
    fn replay_restores_verbosity() {
        let mut s = Session::new();
        s.set_message_sink(MessageSink::Discard);
        s.execute("set verbosity = 1").unwrap();
        let r = replay(&render(&s));
        assert_eq!(r.settings().verbosity, 1);
    }
}
