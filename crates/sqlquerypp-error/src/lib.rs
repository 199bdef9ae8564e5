use thiserror::Error;

/// Primary error type for sqlquerypp compilation.
///
/// Every variant describes a defect in the template (or in the caller's
/// configuration) except [`CompileError::Internal`], which signals a backend
/// that broke the placeholder replication law.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    // === Front end ===
    /// Malformed token stream: unterminated block or parenthesis, malformed
    /// block header, `$` without an identifier.
    #[error("syntax error at {line}:{col} (offset {offset}): {detail}")]
    SyntaxError {
        offset: usize,
        line: u32,
        col: u32,
        detail: String,
    },

    /// Structurally invalid fragment tree.
    #[error("parse error at {line}:{col} (offset {offset}): {detail}")]
    ParseError {
        offset: usize,
        line: u32,
        col: u32,
        detail: String,
    },

    // === Resolution ===
    /// Two `combined_result` blocks share a name.
    #[error("combined result `${name}` is defined more than once (again at offset {offset})")]
    DuplicateDefinition { name: String, offset: usize },

    /// `$name` with no block of that name defined earlier in the template.
    #[error("reference to undefined combined result `${name}` at offset {offset}")]
    UndefinedReference { name: String, offset: usize },

    // === Parameters ===
    /// Supplied parameter count differs from the template's placeholder count.
    #[error("template has {expected} placeholders but {actual} parameters were supplied")]
    ParameterCountMismatch { expected: usize, actual: usize },

    /// Statement exceeds the configured size limit.
    #[error("template too long: {length} bytes (max {max})")]
    TemplateTooLong { length: usize, max: usize },

    // === Emission ===
    /// The backend cannot lower this block shape.
    #[error("{dialect} cannot lower combined result `${block}`: {detail}")]
    DialectUnsupportedConstruct {
        dialect: String,
        block: String,
        detail: String,
    },

    /// The compiled statement does not parse as SQL of the target dialect.
    #[error("resulting {dialect} query is invalid: {detail}")]
    ResultingQueryInvalid {
        dialect: String,
        query: String,
        detail: String,
    },

    // === Setup ===
    /// No backend is registered under this tag.
    #[error("unknown SQL dialect: '{tag}'")]
    UnknownDialect { tag: String },

    /// Compiler configuration could not be decoded.
    #[error("invalid compiler configuration: {detail}")]
    InvalidConfig { detail: String },

    /// Internal logic error (a backend violated the replication law).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Stage of a single `compile()` call.
///
/// A call moves `Parsed → Resolved → Emitting → Done`; any failure moves it
/// to `Failed`, carrying the stage that was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileStage {
    /// Tokenizing and parsing the template.
    Parsed,
    /// Binding parameters and linking references.
    Resolved,
    /// Lowering the resolved tree through a dialect and checking that the
    /// result parses.
    Emitting,
    /// The compiled query has been produced.
    Done,
    /// The call aborted while in the wrapped stage.
    Failed,
}

impl std::fmt::Display for CompileStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Parsed => "PARSED",
            Self::Resolved => "RESOLVED",
            Self::Emitting => "EMITTING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        })
    }
}

impl CompileError {
    /// The pipeline stage that produces this error.
    ///
    /// Parameters are bound when resolution starts, before any reference is
    /// linked, so [`CompileError::ParameterCountMismatch`] reports
    /// [`CompileStage::Resolved`] even for templates whose references would
    /// not resolve.
    pub const fn stage(&self) -> CompileStage {
        match self {
            Self::SyntaxError { .. }
            | Self::ParseError { .. }
            | Self::TemplateTooLong { .. }
            | Self::UnknownDialect { .. }
            | Self::InvalidConfig { .. } => CompileStage::Parsed,
            Self::DuplicateDefinition { .. }
            | Self::UndefinedReference { .. }
            | Self::ParameterCountMismatch { .. } => CompileStage::Resolved,
            Self::DialectUnsupportedConstruct { .. }
            | Self::ResultingQueryInvalid { .. }
            | Self::Internal(_) => CompileStage::Emitting,
        }
    }

    /// Whether the caller fixes this by editing the template or its
    /// parameters (as opposed to configuration or a compiler bug).
    pub const fn is_template_defect(&self) -> bool {
        matches!(
            self,
            Self::SyntaxError { .. }
                | Self::ParseError { .. }
                | Self::DuplicateDefinition { .. }
                | Self::UndefinedReference { .. }
                | Self::ParameterCountMismatch { .. }
                | Self::TemplateTooLong { .. }
                | Self::DialectUnsupportedConstruct { .. }
                | Self::ResultingQueryInvalid { .. }
        )
    }

    /// Human-friendly suggestion for fixing this error.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::SyntaxError { .. } => Some(
                "Check the block header shape: combined_result (<subquery>) AS $name { <body> }",
            ),
            Self::DuplicateDefinition { .. } => Some("Give every combined_result block a unique name"),
            Self::UndefinedReference { .. } => {
                Some("Define the combined_result block before referencing it")
            }
            Self::ParameterCountMismatch { .. } => {
                Some("Pass exactly one parameter per %s placeholder, in template order")
            }
            Self::DialectUnsupportedConstruct { .. } => {
                Some("Rewrite the block body into a shape the target dialect supports")
            }
            Self::ResultingQueryInvalid { .. } => Some(
                "Check the SQL around the combined_result blocks; the compiled query must parse for the target dialect",
            ),
            Self::UnknownDialect { .. } => Some("Use one of: mysql84, postgres"),
            _ => None,
        }
    }

    /// Create a syntax error.
    pub fn syntax(offset: usize, line: u32, col: u32, detail: impl Into<String>) -> Self {
        Self::SyntaxError {
            offset,
            line,
            col,
            detail: detail.into(),
        }
    }

    /// Create a parse error.
    pub fn parse(offset: usize, line: u32, col: u32, detail: impl Into<String>) -> Self {
        Self::ParseError {
            offset,
            line,
            col,
            detail: detail.into(),
        }
    }

    /// Create an unsupported-construct error for a dialect backend.
    pub fn unsupported(
        dialect: impl Into<String>,
        block: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::DialectUnsupportedConstruct {
            dialect: dialect.into(),
            block: block.into(),
            detail: detail.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using `CompileError`.
pub type Result<T> = std::result::Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CompileError::syntax(12, 2, 5, "expected `AS` after combined_result subquery");
        assert_eq!(
            err.to_string(),
            "syntax error at 2:5 (offset 12): expected `AS` after combined_result subquery"
        );
    }

    #[test]
    fn error_display_references() {
        let err = CompileError::UndefinedReference {
            name: "x".to_owned(),
            offset: 7,
        };
        assert_eq!(
            err.to_string(),
            "reference to undefined combined result `$x` at offset 7"
        );

        let err = CompileError::DuplicateDefinition {
            name: "dup".to_owned(),
            offset: 40,
        };
        assert_eq!(
            err.to_string(),
            "combined result `$dup` is defined more than once (again at offset 40)"
        );
    }

    #[test]
    fn error_display_parameter_mismatch() {
        let err = CompileError::ParameterCountMismatch {
            expected: 3,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "template has 3 placeholders but 2 parameters were supplied"
        );
    }

    #[test]
    fn error_display_resulting_query() {
        let err = CompileError::ResultingQueryInvalid {
            dialect: "postgres".to_owned(),
            query: "(WITH x AS (SELECT 1)".to_owned(),
            detail: "Expected: ), found: EOF".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "resulting postgres query is invalid: Expected: ), found: EOF"
        );
        assert_eq!(err.stage(), CompileStage::Emitting);
        assert!(err.is_template_defect());
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn stage_mapping() {
        assert_eq!(
            CompileError::syntax(0, 1, 1, "x").stage(),
            CompileStage::Parsed
        );
        assert_eq!(
            CompileError::ParameterCountMismatch {
                expected: 1,
                actual: 0
            }
            .stage(),
            CompileStage::Resolved
        );
        assert_eq!(
            CompileError::unsupported("mysql84", "id", "no WHERE").stage(),
            CompileStage::Emitting
        );
        assert_eq!(CompileError::internal("bug").stage(), CompileStage::Emitting);
    }

    #[test]
    fn template_defects() {
        assert!(CompileError::parse(0, 1, 1, "x").is_template_defect());
        assert!(
            CompileError::UndefinedReference {
                name: "x".to_owned(),
                offset: 0
            }
            .is_template_defect()
        );
        assert!(!CompileError::internal("bug").is_template_defect());
        assert!(
            !CompileError::UnknownDialect {
                tag: "oracle".to_owned()
            }
            .is_template_defect()
        );
    }

    #[test]
    fn suggestions() {
        assert!(
            CompileError::ParameterCountMismatch {
                expected: 1,
                actual: 2
            }
            .suggestion()
            .is_some()
        );
        assert!(CompileError::internal("x").suggestion().is_none());
    }

    #[test]
    fn convenience_constructors() {
        let err = CompileError::unsupported("mysql84", "id", "GROUP BY after WHERE");
        assert!(matches!(
            err,
            CompileError::DialectUnsupportedConstruct { ref dialect, ref block, .. }
                if dialect == "mysql84" && block == "id"
        ));

        let err = CompileError::parse(42, 3, 7, "unexpected token");
        assert!(matches!(err, CompileError::ParseError { offset: 42, line: 3, col: 7, .. }));

        let err = CompileError::internal("assertion failed");
        assert!(matches!(err, CompileError::Internal(msg) if msg == "assertion failed"));
    }

    #[test]
    fn stage_display() {
        assert_eq!(CompileStage::Parsed.to_string(), "PARSED");
        assert_eq!(CompileStage::Failed.to_string(), "FAILED");
    }
}
