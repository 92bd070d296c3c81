//! Diagnostics and function errors.
//!
//! Diagnostics are how a provider reports problems: they travel in every
//! response alongside the payload and are never raised as transport errors.

use std::fmt;

use crate::tftypes::AttributePath;

/// How serious a diagnostic is.
///
/// `Invalid` is the zero value on the wire. It is logged as an unknown
/// diagnostic but counted as neither an error nor a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DiagnosticSeverity {
    /// The unset severity.
    #[default]
    Invalid,
    /// The operation failed.
    Error,
    /// The operation succeeded but something deserves attention.
    Warning,
    /// A severity this library does not know, kept by its wire value.
    Unrecognized(i32),
}

impl From<i32> for DiagnosticSeverity {
    fn from(value: i32) -> Self {
        match value {
            0 => Self::Invalid,
            1 => Self::Error,
            2 => Self::Warning,
            other => Self::Unrecognized(other),
        }
    }
}

impl From<DiagnosticSeverity> for i32 {
    fn from(severity: DiagnosticSeverity) -> Self {
        match severity {
            DiagnosticSeverity::Invalid => 0,
            DiagnosticSeverity::Error => 1,
            DiagnosticSeverity::Warning => 2,
            DiagnosticSeverity::Unrecognized(other) => other,
        }
    }
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid => f.write_str("INVALID"),
            Self::Error => f.write_str("ERROR"),
            Self::Warning => f.write_str("WARNING"),
            Self::Unrecognized(other) => write!(f, "{}", other),
        }
    }
}

/// A structured problem report.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Diagnostic {
    /// Severity.
    pub severity: DiagnosticSeverity,
    /// Short description.
    pub summary: String,
    /// Longer explanation, possibly empty.
    pub detail: String,
    /// The attribute the problem is about, if any.
    pub attribute: Option<AttributePath>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            ..Default::default()
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            ..Default::default()
        }
    }

    /// Build a diagnostic from raw bytes, replacing invalid UTF-8.
    pub fn from_raw(severity: DiagnosticSeverity, summary: &[u8], detail: &[u8]) -> Self {
        Self {
            severity,
            summary: force_valid_utf8(summary),
            detail: force_valid_utf8(detail),
            attribute: None,
        }
    }

    /// Add a detail message.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    /// Anchor the diagnostic to an attribute.
    pub fn with_attribute(mut self, attribute: AttributePath) -> Self {
        self.attribute = Some(attribute);
        self
    }

    /// Whether this is an error diagnostic.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

/// Counting helpers over a list of diagnostics.
pub trait DiagnosticsExt {
    /// Number of error diagnostics.
    fn error_count(&self) -> usize;
    /// Number of warning diagnostics.
    fn warning_count(&self) -> usize;
    /// Whether any diagnostic is an error.
    fn has_error(&self) -> bool {
        self.error_count() > 0
    }
}

impl DiagnosticsExt for [Diagnostic] {
    fn error_count(&self) -> usize {
        self.iter()
            .filter(|d| d.severity == DiagnosticSeverity::Error)
            .count()
    }

    fn warning_count(&self) -> usize {
        self.iter()
            .filter(|d| d.severity == DiagnosticSeverity::Warning)
            .count()
    }
}

/// An error returned from a provider-defined function.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FunctionError {
    /// Description of the error.
    pub text: String,
    /// Zero-based index of the argument that caused the error.
    pub function_argument: Option<i64>,
}

impl FunctionError {
    /// Create a function error with text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            function_argument: None,
        }
    }

    /// Attribute the error to an argument.
    pub fn with_argument(mut self, index: i64) -> Self {
        self.function_argument = Some(index);
        self
    }

    /// Whether either field is populated.
    pub fn has_error(&self) -> bool {
        !self.text.is_empty() || self.function_argument.is_some()
    }
}

impl fmt::Display for FunctionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.function_argument {
            Some(idx) => write!(f, "argument {}: {}", idx, self.text),
            None => f.write_str(&self.text),
        }
    }
}

/// Decode `bytes` as UTF-8, replacing every invalid byte with U+FFFD.
///
/// Each offending byte gets its own replacement character, so the output
/// does not depend on how invalid bytes are grouped.
pub fn force_valid_utf8(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            },
            Err(e) => {
                let (valid, invalid) = rest.split_at(e.valid_up_to());
                out.push_str(&String::from_utf8_lossy(valid));
                out.push(char::REPLACEMENT_CHARACTER);
                rest = &invalid[1..];
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let diag = Diagnostic::error("Invalid name")
            .with_detail("Names must be lowercase")
            .with_attribute(AttributePath::root("name"));
        assert!(diag.is_error());
        assert_eq!(diag.detail, "Names must be lowercase");
        assert_eq!(diag.attribute, Some(AttributePath::root("name")));

        let diag = Diagnostic::warning("Deprecated");
        assert_eq!(diag.severity, DiagnosticSeverity::Warning);
        assert!(diag.detail.is_empty());
        assert!(diag.attribute.is_none());
    }

    #[test]
    fn test_counts_ignore_invalid_severity() {
        let diagnostics = vec![
            Diagnostic::error("a"),
            Diagnostic::error("b"),
            Diagnostic::warning("c"),
            Diagnostic {
                summary: "d".into(),
                ..Default::default()
            },
            Diagnostic {
                severity: DiagnosticSeverity::Unrecognized(7),
                ..Default::default()
            },
        ];
        assert_eq!(diagnostics.error_count(), 2);
        assert_eq!(diagnostics.warning_count(), 1);
        assert!(diagnostics.has_error());
        assert!(!diagnostics[2..].has_error());
    }

    #[test]
    fn test_severity_wire_values() {
        assert_eq!(DiagnosticSeverity::from(0), DiagnosticSeverity::Invalid);
        assert_eq!(DiagnosticSeverity::from(1), DiagnosticSeverity::Error);
        assert_eq!(DiagnosticSeverity::from(2), DiagnosticSeverity::Warning);
        assert_eq!(DiagnosticSeverity::from(9), DiagnosticSeverity::Unrecognized(9));
        assert_eq!(i32::from(DiagnosticSeverity::Unrecognized(9)), 9);
        assert_eq!(DiagnosticSeverity::Error.to_string(), "ERROR");
    }

    #[test]
    fn test_function_error_has_error() {
        assert!(!FunctionError::default().has_error());
        assert!(FunctionError::new("bad input").has_error());
        assert!(FunctionError::default().with_argument(0).has_error());
        assert_eq!(
            FunctionError::new("bad input").with_argument(2).to_string(),
            "argument 2: bad input"
        );
    }

    #[test]
    fn test_force_valid_utf8_passthrough() {
        assert_eq!(force_valid_utf8(b"hello"), "hello");
        assert_eq!(force_valid_utf8("h\u{e9}llo".as_bytes()), "h\u{e9}llo");
        assert_eq!(force_valid_utf8(b""), "");
    }

    #[test]
    fn test_force_valid_utf8_replaces_each_byte() {
        assert_eq!(force_valid_utf8(b"\xff\xfe\xfd"), "\u{fffd}\u{fffd}\u{fffd}");
        assert_eq!(force_valid_utf8(b"a\xffb"), "a\u{fffd}b");
        // A truncated two-byte sequence is one invalid byte.
        assert_eq!(force_valid_utf8(b"\xc3"), "\u{fffd}");
    }

    #[test]
    fn test_force_valid_utf8_length_independent_of_position() {
        let front = force_valid_utf8(b"\xffabc");
        let middle = force_valid_utf8(b"ab\xffc");
        let back = force_valid_utf8(b"abc\xff");
        assert_eq!(front.len(), middle.len());
        assert_eq!(middle.len(), back.len());
    }

    #[test]
    fn test_from_raw() {
        let diag = Diagnostic::from_raw(DiagnosticSeverity::Error, b"bad \xff", b"");
        assert_eq!(diag.summary, "bad \u{fffd}");
        assert!(diag.detail.is_empty());
    }
}
