//! Error taxonomy for template synthesis
//!
//! Every error is raised synchronously by the construction call that caused
//! it. Nothing is retried and no partial template is ever produced.

use std::fmt;

use thiserror::Error;

/// Main error type for synthesis
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SynthError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("cyclic reference: {}", .path.join(" -> "))]
    CyclicReference { path: Vec<String> },

    #[error("type mismatch in {operation}: expected {expected}, found {found}")]
    TypeMismatch {
        operation: &'static str,
        expected: &'static str,
        found: String,
    },
}

pub type SynthResult<T> = Result<T, SynthError>;

impl SynthError {
    pub fn cycle(path: Vec<String>) -> Self {
        Self::CyclicReference { path }
    }

    pub fn type_mismatch(
        operation: &'static str,
        expected: &'static str,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            operation,
            expected,
            found: found.into(),
        }
    }

    /// The violated rule, if this is a validation failure
    pub fn rule(&self) -> Option<Rule> {
        match self {
            Self::Validation(v) => Some(v.rule),
            _ => None,
        }
    }
}

/// The specific constraint a [`ValidationError`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    Prefix,
    Charset,
    Length,
    Empty,
    Reserved,
    ForbiddenChar,
    Pattern,
    MutuallyExclusive,
    DuplicateId,
    UnknownPolicy,
    InvalidArn,
    Unbound,
    AlreadyBound,
    UnknownTarget,
    UnknownCondition,
    CrossEnvironment,
    Unsupported,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rule::Prefix => "prefix",
            Rule::Charset => "charset",
            Rule::Length => "length",
            Rule::Empty => "empty",
            Rule::Reserved => "reserved",
            Rule::ForbiddenChar => "forbidden-char",
            Rule::Pattern => "pattern",
            Rule::MutuallyExclusive => "mutually-exclusive",
            Rule::DuplicateId => "duplicate-id",
            Rule::UnknownPolicy => "unknown-policy",
            Rule::InvalidArn => "invalid-arn",
            Rule::Unbound => "unbound",
            Rule::AlreadyBound => "already-bound",
            Rule::UnknownTarget => "unknown-target",
            Rule::UnknownCondition => "unknown-condition",
            Rule::CrossEnvironment => "cross-environment",
            Rule::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

/// A construction-time validation failure.
///
/// `subject` is the offending value or path, `message` the full
/// human-readable text (it always names the subject).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    pub rule: Rule,
    pub subject: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(rule: Rule, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule,
            subject: subject.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_validation_is_message() {
        let e = SynthError::from(ValidationError::new(
            Rule::Reserved,
            "default",
            "'eventBusName' must not be 'default'",
        ));
        assert_eq!(e.to_string(), "'eventBusName' must not be 'default'");
        assert_eq!(e.rule(), Some(Rule::Reserved));
    }

    #[test]
    fn validation_error_is_std_error() {
        let e = ValidationError::new(Rule::Length, "x", "name is too long");
        let source: &dyn std::error::Error = &e;
        assert_eq!(source.to_string(), "name is too long");
        assert!(source.source().is_none());
    }

    #[test]
    fn display_cycle_joins_path() {
        let e = SynthError::cycle(vec!["A".into(), "B".into(), "A".into()]);
        assert_eq!(e.to_string(), "cyclic reference: A -> B -> A");
        assert_eq!(e.rule(), None);
    }

    #[test]
    fn display_type_mismatch() {
        let e = SynthError::type_mismatch("Fn::Join", "string", "number 42");
        assert_eq!(
            e.to_string(),
            "type mismatch in Fn::Join: expected string, found number 42"
        );
    }

    #[test]
    fn rule_display() {
        assert_eq!(Rule::CrossEnvironment.to_string(), "cross-environment");
    }
}
