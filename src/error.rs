/// Broad category of a failure.
///
/// Mirrors the split every command goes through: the text either does not
/// parse (`Syntax`), or it parses but cannot be carried out (`Execute`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Execute,
    Io,
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    kind: ErrorKind,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            kind: ErrorKind::Execute,
            message: message.into(),
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self {
            exit_code: 2,
            kind: ErrorKind::Syntax,
            message: message.into(),
        }
    }

    pub fn execute(message: impl Into<String>) -> Self {
        Self::new(3, message)
    }

    pub fn numeric(message: impl Into<String>) -> Self {
        Self::new(4, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self {
            exit_code: 5,
            kind: ErrorKind::Io,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Prefix the message, keeping kind and exit code.
    pub fn context(mut self, prefix: impl std::fmt::Display) -> Self {
        self.message = format!("{prefix}: {}", self.message);
        self
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ErrorKind::Syntax => write!(f, "Syntax error: {}", self.message),
            ErrorKind::Execute | ErrorKind::Io => write!(f, "Error: {}", self.message),
        }
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("kind", &self.kind)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefix_follows_kind() {
        assert_eq!(AppError::syntax("bad").to_string(), "Syntax error: bad");
        assert_eq!(AppError::execute("no data").to_string(), "Error: no data");
        assert_eq!(AppError::syntax("x").exit_code(), 2);
        assert_eq!(AppError::io("x").kind(), ErrorKind::Io);

        let err = AppError::syntax("bad").context("line 3");
        assert_eq!(err.message(), "line 3: bad");
        assert_eq!(err.kind(), ErrorKind::Syntax);
    }
}
