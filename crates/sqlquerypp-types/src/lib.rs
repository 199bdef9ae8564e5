//! Value types shared by every sqlquerypp crate: the [`Query`] pair used as
//! both compiler input and output, bound parameter [`Value`]s, and the byte
//! [`Span`] used to locate template constructs in error messages.

pub mod value;

pub use value::Value;

use std::fmt;

/// The positional placeholder marker, in both templates and compiled output.
pub const PLACEHOLDER: &str = "%s";

/// Source span: byte range in the original template text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Byte offset of the first character (inclusive).
    pub start: u32,
    /// Byte offset one past the last character (exclusive).
    pub end: u32,
}

impl Span {
    /// Create a new span from start (inclusive) to end (exclusive) byte offsets.
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// A zero-length span at position 0, used as a placeholder.
    pub const ZERO: Self = Self { start: 0, end: 0 };

    /// Merge two spans into one that covers both.
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        let start = if self.start < other.start {
            self.start
        } else {
            other.start
        };
        let end = if self.end > other.end {
            self.end
        } else {
            other.end
        };
        Self { start, end }
    }

    /// Length of the span in bytes.
    #[must_use]
    pub const fn len(self) -> u32 {
        self.end - self.start
    }

    /// Whether the span covers no bytes.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.start == self.end
    }

    /// Start offset as `usize`, for slicing and error reporting.
    #[must_use]
    pub const fn offset(self) -> usize {
        self.start as usize
    }
}

/// A statement plus its ordered positional parameters.
///
/// Used both as the template handed to a compiler and as the executable
/// result. The `n`-th `%s` in `statement` binds to `parameters()[n]`.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Query {
    statement: String,
    parameters: Vec<Value>,
}

impl Query {
    /// Create a query from a statement and its parameters.
    #[must_use]
    pub fn new(statement: impl Into<String>, parameters: Vec<Value>) -> Self {
        Self {
            statement: statement.into(),
            parameters,
        }
    }

    /// The SQL (or template) text.
    #[must_use]
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// The ordered parameter values.
    #[must_use]
    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    /// Split into statement and parameters.
    #[must_use]
    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.statement, self.parameters)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.statement)?;
        if !self.parameters.is_empty() {
            f.write_str(" -- [")?;
            for (i, p) in self.parameters.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{p}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}
