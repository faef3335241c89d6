//! Siemens/Bruker Diffrac-AT UXD reader.
//!
//! Layout: a file header of `_KEY=value` lines, then one section per range.
//! Each range has its own `_START` and `_STEPSIZE`, and the counts follow a
//! `_COUNTS` (or `_CPS`) line, several numbers per line. `;` starts a comment.
//!
//! ```text
//! _FILEVERSION=1
//! _DRIVE='COUPLED'
//! _STEPSIZE=0.020000
//! _START=10.0000
//! _COUNTS
//!      1048      1162      1108
//! ```
//!
//! All ranges are concatenated into one set of columns.

use std::io::BufRead;

use crate::data::text::Columns;
use crate::error::AppError;

#[derive(Debug, Default)]
struct RangeState {
    start: f64,
    step: f64,
    /// Number of counts read since the last `_COUNTS` line.
    n: usize,
    in_counts: bool,
}

pub fn read_uxd<R: BufRead>(reader: R) -> Result<Columns, AppError> {
    let mut cols = Columns::default();
    let mut state = RangeState::default();
    let mut saw_counts = false;

    for line in reader.lines() {
        let line = line.map_err(|e| AppError::io(format!("Read error: {e}")))?;
        let line = line.split(';').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        if let Some(meta) = line.strip_prefix('_') {
            let upper = meta.to_ascii_uppercase();
            if upper.starts_with("COUNTS") || upper.starts_with("CPS") {
                if state.step == 0.0 {
                    return Err(AppError::execute("UXD: _STEPSIZE not set before data."));
                }
                state.in_counts = true;
                state.n = 0;
                saw_counts = true;
                continue;
            }
            state.in_counts = false;
            if upper.starts_with("DRIVE") {
                state = RangeState::default();
                continue;
            }
            if let Some((key, val)) = meta.split_once('=') {
                let key = key.trim().to_ascii_uppercase();
                let val = val.trim().trim_matches('\'');
                match key.as_str() {
                    "START" => state.start = parse_value(&key, val)?,
                    "STEPSIZE" => state.step = parse_value(&key, val)?,
                    _ => {}
                }
            }
            continue;
        }

        if !state.in_counts {
            continue;
        }
        for tok in line.split_whitespace() {
            let y: f64 = tok
                .parse()
                .map_err(|_| AppError::execute(format!("UXD: invalid count `{tok}`.")))?;
            cols.x.push(state.start + state.step * state.n as f64);
            cols.y.push(y);
            state.n += 1;
        }
    }

    if !saw_counts {
        return Err(AppError::execute("UXD: no _COUNTS section found."));
    }
    Ok(cols)
}

fn parse_value(key: &str, val: &str) -> Result<f64, AppError> {
    val.parse()
        .map_err(|_| AppError::execute(format!("UXD: invalid value for _{key}: `{val}`.")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_two_ranges() {
        let text = "_FILEVERSION=1\n\
                    _SAMPLE='test'\n\
                    ; range 1\n\
                    _DRIVE='COUPLED'\n\
                    _STEPSIZE=0.5\n\
                    _START=10.0\n\
                    _COUNTS\n\
                    1 2 3\n\
                    4\n\
                    _DRIVE='COUPLED'\n\
                    _START=20.0\n\
                    _STEPSIZE=1.0\n\
                    _COUNTS\n\
                    7 8\n";
        let cols = read_uxd(text.as_bytes()).unwrap();
        assert_eq!(cols.x, vec![10.0, 10.5, 11.0, 11.5, 20.0, 21.0]);
        assert_eq!(cols.y, vec![1.0, 2.0, 3.0, 4.0, 7.0, 8.0]);
    }

    #[test]
    fn missing_counts_is_an_error() {
        assert!(read_uxd("_FILEVERSION=1\n_START=1\n".as_bytes()).is_err());
    }
}
