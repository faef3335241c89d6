//! Plain-text column reader.
//!
//! Every data line holds `x y [sigma]` (extra columns are ignored). Columns may
//! be separated by whitespace or any of `, ; :`. Text after `#` is a comment,
//! and lines containing non-numeric tokens (headers, notes) are skipped.

use std::io::BufRead;

use crate::error::AppError;

/// Raw columns as read from the file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Columns {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub sigma: Option<Vec<f64>>,
}

/// Read text columns from any buffered reader.
pub fn read_text<R: BufRead>(reader: R) -> Result<Columns, AppError> {
    let mut cols = Columns::default();
    let mut n_cols = 0usize;

    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| AppError::io(format!("Read error: {e}")))?;
        let Some(numbers) = parse_numbers(&line) else {
            continue;
        };
        if numbers.is_empty() {
            continue;
        }
        if numbers.len() == 1 {
            return Err(AppError::execute(format!(
                "Only one number in line {}.",
                idx + 1
            )));
        }

        if n_cols == 0 {
            n_cols = numbers.len();
            if n_cols >= 3 {
                cols.sigma = Some(Vec::new());
            }
        } else if numbers.len() != n_cols {
            return Err(AppError::execute(format!(
                "Number of columns differ in line {} ({} instead of {n_cols}).",
                idx + 1,
                numbers.len()
            )));
        }

        cols.x.push(numbers[0]);
        cols.y.push(numbers[1]);
        if let Some(s) = cols.sigma.as_mut() {
            s.push(numbers[2]);
        }
    }

    Ok(cols)
}

/// Split a line into numbers.
///
/// Returns `None` for lines with any non-numeric token.
fn parse_numbers(line: &str) -> Option<Vec<f64>> {
    let content = line.split('#').next().unwrap_or("");
    content
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':'))
        .filter(|tok| !tok.is_empty())
        .map(|tok| tok.parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_mixed_delimiters_and_comments() {
        let text = "; Sample date: 2000/12/31\n\
                    # x y\n\
                    38.834110      361\n\
                    38.872800  ,   318   # delimiter\n\
                    \n\
                    38.911500 ; 352.431\n";
        let cols = read_text(text.as_bytes()).unwrap();
        assert_eq!(cols.x, vec![38.834110, 38.872800, 38.911500]);
        assert_eq!(cols.y, vec![361.0, 318.0, 352.431]);
        assert!(cols.sigma.is_none());
    }

    #[test]
    fn third_column_is_sigma() {
        let cols = read_text("1 2 0.5\n2 3 0.25\n".as_bytes()).unwrap();
        assert_eq!(cols.sigma, Some(vec![0.5, 0.25]));
    }

    #[test]
    fn single_number_line_is_an_error() {
        let err = read_text("1 2\n3\n".as_bytes()).unwrap_err();
        assert!(err.message().contains("line 2"), "{err}");
    }

    #[test]
    fn column_count_must_stay_constant() {
        assert!(read_text("1 2\n3 4 5\n".as_bytes()).is_err());
    }
}
