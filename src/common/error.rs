use thiserror::Error;

use crate::ast::SourcePos;

/// Result type for gbc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the generator.
///
/// `Semantic` errors are user-facing and may be accumulated in an
/// [`ErrorCollector`]. `Internal` errors signal a generator bug and abort the
/// compilation unit immediately.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Semantic error at line {line}, column {column}: {message}")]
    Semantic {
        line: u32,
        column: u32,
        message: String,
    },

    #[error("Internal compiler error in {class}.{method}: {message}")]
    Internal {
        class: String,
        method: String,
        message: String,
    },

    #[error("Class format error: {message}")]
    ClassFormat { message: String },

    #[error("Too many errors ({count}), compilation aborted")]
    TooManyErrors { count: usize },
}

impl Error {
    /// Create a user-facing error at a source position
    pub fn semantic(pos: SourcePos, message: impl Into<String>) -> Self {
        Self::Semantic {
            line: pos.line,
            column: pos.column,
            message: message.into(),
        }
    }

    /// Create an internal consistency error for the method under generation
    pub fn internal(
        class: impl Into<String>,
        method: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Internal {
            class: class.into(),
            method: method.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn class_format(message: impl Into<String>) -> Self {
        Self::ClassFormat { message: message.into() }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Internal { .. })
    }
}

/// Accumulates user-facing errors so that several can be reported at once.
#[derive(Debug)]
pub struct ErrorCollector {
    errors: Vec<Error>,
    max_errors: usize,
}

impl ErrorCollector {
    pub fn new(max_errors: usize) -> Self {
        Self { errors: Vec::new(), max_errors: max_errors.max(1) }
    }

    /// Record a user-facing error. Fails once the configured limit is hit.
    ///
    /// Internal errors are handed straight back: they are never accumulated.
    pub fn add(&mut self, error: Error) -> Result<()> {
        if error.is_internal() {
            return Err(error);
        }
        self.errors.push(error);
        if self.errors.len() >= self.max_errors {
            return Err(Error::TooManyErrors { count: self.errors.len() });
        }
        Ok(())
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// Fail with the first collected error, if any
    pub fn into_result(self) -> Result<()> {
        match self.errors.into_iter().next() {
            Some(first) => Err(first),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_error_names_class_and_method() {
        let err = Error::internal("demo/Foo", "bar", "operand stack underflow");
        let text = err.to_string();
        assert!(text.contains("demo/Foo.bar"), "{}", text);
        assert!(text.contains("underflow"));
    }

    #[test]
    fn collector_accumulates_semantic_errors() {
        let mut collector = ErrorCollector::new(10);
        collector.add(Error::semantic(SourcePos::new(1, 2), "first")).unwrap();
        collector.add(Error::semantic(SourcePos::new(3, 4), "second")).unwrap();
        assert_eq!(collector.errors().len(), 2);
        match collector.into_result() {
            Err(Error::Semantic { line, message, .. }) => {
                assert_eq!(line, 1);
                assert_eq!(message, "first");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn collector_refuses_internal_errors() {
        let mut collector = ErrorCollector::new(10);
        let result = collector.add(Error::internal("A", "m", "boom"));
        assert!(matches!(result, Err(Error::Internal { .. })));
        assert!(!collector.has_errors());
    }

    #[test]
    fn collector_stops_at_limit() {
        let mut collector = ErrorCollector::new(2);
        collector.add(Error::semantic(SourcePos::default(), "a")).unwrap();
        let result = collector.add(Error::semantic(SourcePos::default(), "b"));
        assert!(matches!(result, Err(Error::TooManyErrors { count: 2 })));
    }
}
