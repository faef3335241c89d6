//! Message output of a session.
//!
//! Commands such as `info` and `print`, and the fitter's progress lines, do
//! not write to stdout directly: they go through `Ui`, which filters by the
//! `verbosity` setting and forwards to the configured sink.

use std::fmt;

/// Importance of a message; compared against `verbosity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Results of `info`/`print` and short notices. Shown at verbosity >= 0.
    Output = 0,
    /// Per-iteration fit progress. Shown at verbosity >= 1.
    Progress = 1,
    /// Matrices, tried parameters. Shown at verbosity >= 2.
    Debug = 2,
}

/// Where messages go.
pub enum MessageSink {
    Stdout,
    Stderr,
    Discard,
    Callback(Box<dyn FnMut(&str) + Send>),
}

impl fmt::Debug for MessageSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageSink::Stdout => f.write_str("Stdout"),
            MessageSink::Stderr => f.write_str("Stderr"),
            MessageSink::Discard => f.write_str("Discard"),
            MessageSink::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

#[derive(Debug)]
pub struct Ui {
    sink: MessageSink,
}

impl Default for Ui {
    fn default() -> Self {
        Self {
            sink: MessageSink::Stdout,
        }
    }
}

impl Ui {
    pub fn set_sink(&mut self, sink: MessageSink) {
        self.sink = sink;
    }

    /// Route messages to a closure (replaces the previous sink).
    pub fn set_show_message<F>(&mut self, callback: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.sink = MessageSink::Callback(Box::new(callback));
    }

    /// Emit `msg` if `level` passes the current `verbosity`.
    pub fn mesg(&mut self, verbosity: i32, level: Level, msg: &str) {
        if verbosity < level as i32 {
            return;
        }
        match &mut self.sink {
            MessageSink::Stdout => println!("{msg}"),
            MessageSink::Stderr => eprintln!("{msg}"),
            MessageSink::Discard => {}
            MessageSink::Callback(cb) => cb(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn verbosity_filters_levels() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut ui = Ui::default();
        ui.set_show_message(move |s| sink.lock().unwrap().push(s.to_string()));

        ui.mesg(0, Level::Output, "a");
        ui.mesg(0, Level::Progress, "b");
        ui.mesg(-1, Level::Output, "c");
        ui.mesg(2, Level::Debug, "d");

        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string(), "d".to_string()]);
    }
}
