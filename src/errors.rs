//! Unified, `miette`-based diagnostic system for the metamorph engine.
//!
//! Every failure mode of the engine is represented by [`MetamorphicError`].
//! The taxonomy splits into two propagation classes:
//!
//! - **Recoverable** (`InvalidInput`, `Skipped`): terminate only the current
//!   test case. They are recorded on the test case's error slot and surfaced
//!   to the host runner as a skip signal.
//! - **Fatal** (`Configuration`, `SutExecution`, `Transformation`,
//!   `Relation`): indicate a structural misconfiguration rather than a
//!   per-input anomaly. They wrap the originating fault, are attached to
//!   every affected test case for diagnostics, and bubble out of `execute`
//!   so the host can abort the entire run.
//!
//! Configuration errors are raised immediately at setup time, never deferred
//! to execution.

use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;

/// Shared handle to an originating fault. `Arc` rather than `Box` because a
/// single SUT fault is attached to every test case in the failing batch.
pub type SourceFault = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Type-safe error classification corresponding to [`MetamorphicError`]
/// variants. Used by the runner and tests instead of string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad generator parameters, duplicate registration, conflicting setters.
    Configuration,
    /// The validity gate rejected the source outputs of one test case.
    InvalidInput,
    /// A transform or relation explicitly opted this test case out.
    Skipped,
    /// The system under test raised while executing a batch.
    SutExecution,
    /// The registered transformation raised.
    Transformation,
    /// The registered relation raised.
    Relation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "Configuration",
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::Skipped => "Skipped",
            ErrorKind::SutExecution => "SutExecution",
            ErrorKind::Transformation => "Transformation",
            ErrorKind::Relation => "Relation",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unified error type for all engine failure modes.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum MetamorphicError {
    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(metamorph::configuration),
        help("Fix the relation setup; configuration errors are raised at registration time.")
    )]
    Configuration { message: String },

    #[error("Invalid input: {message}")]
    #[diagnostic(code(metamorph::invalid_input))]
    InvalidInput { message: String },

    #[error("Test case skipped: {message}")]
    #[diagnostic(code(metamorph::skipped))]
    Skipped { message: String },

    #[error("SUT execution error: {message}")]
    #[diagnostic(
        code(metamorph::sut_execution),
        help("Check that the system under test accepts the input type produced by the transformation.")
    )]
    SutExecution {
        message: String,
        #[source]
        source: Option<SourceFault>,
    },

    #[error("Transformation error: {message}")]
    #[diagnostic(code(metamorph::transformation))]
    Transformation {
        message: String,
        #[source]
        source: Option<SourceFault>,
    },

    #[error("Relation error: {message}")]
    #[diagnostic(code(metamorph::relation))]
    Relation {
        message: String,
        #[source]
        source: Option<SourceFault>,
    },
}

impl MetamorphicError {
    /// Returns the type-safe classification for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MetamorphicError::Configuration { .. } => ErrorKind::Configuration,
            MetamorphicError::InvalidInput { .. } => ErrorKind::InvalidInput,
            MetamorphicError::Skipped { .. } => ErrorKind::Skipped,
            MetamorphicError::SutExecution { .. } => ErrorKind::SutExecution,
            MetamorphicError::Transformation { .. } => ErrorKind::Transformation,
            MetamorphicError::Relation { .. } => ErrorKind::Relation,
        }
    }

    /// True for errors that terminate only the current test case.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidInput | ErrorKind::Skipped
        )
    }

    /// True for errors that must abort the entire run.
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// The originating fault wrapped by a fatal error, if any.
    pub fn original_fault(&self) -> Option<&SourceFault> {
        match self {
            MetamorphicError::SutExecution { source, .. }
            | MetamorphicError::Transformation { source, .. }
            | MetamorphicError::Relation { source, .. } => source.as_ref(),
            _ => None,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        MetamorphicError::Configuration {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        MetamorphicError::InvalidInput {
            message: message.into(),
        }
    }
}

/// Explicitly opts the current test case out from inside a transform or
/// relation. The engine treats the returned error as a recoverable skip.
///
/// # Examples
///
/// ```rust
/// use metamorph::errors::skip;
/// let err = skip("input outside the supported range");
/// assert!(err.is_recoverable());
/// ```
pub fn skip(message: impl Into<String>) -> MetamorphicError {
    MetamorphicError::Skipped {
        message: message.into(),
    }
}

#[cfg(test)]
mod errors_tests {
    use super::*;

    #[test]
    fn recoverable_classification() {
        assert!(skip("benign").is_recoverable());
        assert!(MetamorphicError::invalid_input("bad").is_recoverable());
        assert!(!MetamorphicError::configuration("dup").is_recoverable());
    }

    #[test]
    fn fatal_errors_carry_original_fault() {
        let cause: SourceFault = Arc::new(std::io::Error::new(
            std::io::ErrorKind::Other,
            "sut blew up",
        ));
        let err = MetamorphicError::SutExecution {
            message: "batch failed".to_string(),
            source: Some(cause),
        };
        assert!(err.is_fatal());
        assert_eq!(err.kind(), ErrorKind::SutExecution);
        let fault = err.original_fault().expect("fault attached");
        assert!(fault.to_string().contains("sut blew up"));
    }

    #[test]
    fn display_includes_kind_prefix() {
        let err = MetamorphicError::configuration("relation already exists");
        assert!(err.to_string().contains("Configuration error"));
    }
}
