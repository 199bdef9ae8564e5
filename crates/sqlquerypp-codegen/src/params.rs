//! Parameter table: the caller's values keyed by placeholder index.

use sqlquerypp_error::{CompileError, Result};
use sqlquerypp_types::Value;

/// Values supplied with a template, bound one-to-one to its placeholders.
#[derive(Debug, Clone, Copy)]
pub struct ParameterTable<'q> {
    values: &'q [Value],
}

impl<'q> ParameterTable<'q> {
    /// Bind `values` to a template with `placeholder_count` placeholders.
    ///
    /// # Errors
    ///
    /// [`CompileError::ParameterCountMismatch`] when the counts differ.
    pub fn bind(placeholder_count: usize, values: &'q [Value]) -> Result<Self> {
        if values.len() != placeholder_count {
            return Err(CompileError::ParameterCountMismatch {
                expected: placeholder_count,
                actual: values.len(),
            });
        }
        Ok(Self { values })
    }

    /// The value bound to placeholder `index`.
    pub fn get(&self, index: usize) -> Result<&'q Value> {
        self.values
            .get(index)
            .ok_or_else(|| CompileError::internal(format!("placeholder #{index} has no bound value")))
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
