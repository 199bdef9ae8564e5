//! The compile pipeline: parse, bind, resolve, emit.

use std::fmt;

use sqlquerypp_error::{CompileError, CompileStage, Result};
use sqlquerypp_parser::{parse_template, resolve};
use sqlquerypp_types::Query;

use crate::dialect::{Dialect, DialectTag};
use crate::emit::{Compilation, emit};
use crate::metrics;
use crate::mysql84::MySql84;
use crate::params::ParameterTable;
use crate::postgres::Postgres;
use crate::validate::validate_output;

/// Default cap on template size, in bytes.
pub const DEFAULT_MAX_TEMPLATE_BYTES: usize = 1 << 20;

/// Compiles templates for one dialect.
///
/// A compiler holds no per-call state; one instance may serve any number of
/// concurrent `compile` calls.
pub struct Compiler {
    dialect: Box<dyn Dialect>,
    max_template_bytes: usize,
    validate_output: bool,
}

impl Compiler {
    pub fn new(dialect: impl Dialect + 'static) -> Self {
        Self::from_boxed(Box::new(dialect))
    }

    #[must_use]
    pub fn from_boxed(dialect: Box<dyn Dialect>) -> Self {
        Self {
            dialect,
            max_template_bytes: DEFAULT_MAX_TEMPLATE_BYTES,
            validate_output: true,
        }
    }

    /// A compiler for `tag` with default dialect options.
    #[must_use]
    pub fn for_tag(tag: DialectTag) -> Self {
        match tag {
            DialectTag::MySql84 => Self::new(MySql84::default()),
            DialectTag::Postgres => Self::new(Postgres::default()),
        }
    }

    /// Cap template size; `0` disables the check.
    #[must_use]
    pub const fn with_max_template_bytes(mut self, max: usize) -> Self {
        self.max_template_bytes = max;
        self
    }

    /// Parse every compiled statement that lowered at least one block with
    /// the target dialect's grammar. On by default.
    #[must_use]
    pub const fn with_output_validation(mut self, enabled: bool) -> Self {
        self.validate_output = enabled;
        self
    }

    #[must_use]
    pub fn dialect(&self) -> DialectTag {
        self.dialect.tag()
    }

    #[must_use]
    pub const fn max_template_bytes(&self) -> usize {
        self.max_template_bytes
    }

    #[must_use]
    pub const fn validates_output(&self) -> bool {
        self.validate_output
    }

    /// Compile a template into an executable query.
    pub fn compile(&self, query: &Query) -> Result<Query> {
        self.compile_detailed(query).map(|c| c.query)
    }

    /// Compile a template, also reporting where each block was lowered.
    pub fn compile_detailed(&self, query: &Query) -> Result<Compilation> {
        let span = tracing::debug_span!(
            target: "sqlquerypp.compile",
            "compile",
            dialect = %self.dialect.tag(),
            template_bytes = query.statement().len(),
            blocks = tracing::field::Empty,
            placeholders = tracing::field::Empty,
            emitted_placeholders = tracing::field::Empty,
        );
        let _guard = span.enter();
        metrics::record_compile();

        let result = self.run(query, &span);
        if let Err(err) = &result {
            metrics::record_error();
            tracing::debug!(
                target: "sqlquerypp.compile",
                stage = %err.stage(),
                error = %err,
                "{} -> {}",
                err.stage(),
                CompileStage::Failed
            );
        }
        result
    }

    fn run(&self, query: &Query, span: &tracing::Span) -> Result<Compilation> {
        let length = query.statement().len();
        if self.max_template_bytes != 0 && length > self.max_template_bytes {
            return Err(CompileError::TemplateTooLong {
                length,
                max: self.max_template_bytes,
            });
        }

        let template = parse_template(query.statement())?;
        let block_count = template.block_count();
        span.record("blocks", block_count);
        span.record("placeholders", template.placeholder_count);
        tracing::trace!(target: "sqlquerypp.compile", stage = %CompileStage::Parsed);

        let params = ParameterTable::bind(template.placeholder_count, query.parameters())?;
        let resolved = resolve(&template)?;
        tracing::trace!(
            target: "sqlquerypp.compile",
            "{} -> {}",
            CompileStage::Parsed,
            CompileStage::Resolved
        );

        tracing::trace!(
            target: "sqlquerypp.compile",
            "{} -> {}",
            CompileStage::Resolved,
            CompileStage::Emitting
        );
        let compilation = emit(self.dialect.as_ref(), &resolved, &params)?;
        // Templates without blocks come back verbatim and are not checked.
        if self.validate_output && !compilation.blocks.is_empty() {
            validate_output(self.dialect.tag(), compilation.query.statement())?;
        }
        span.record("emitted_placeholders", compilation.query.parameters().len());
        metrics::record_blocks(block_count);
        tracing::trace!(
            target: "sqlquerypp.compile",
            "{} -> {}",
            CompileStage::Emitting,
            CompileStage::Done
        );
        Ok(compilation)
    }
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("dialect", &self.dialect.tag())
            .field("max_template_bytes", &self.max_template_bytes)
            .field("validate_output", &self.validate_output)
            .finish()
    }
}
