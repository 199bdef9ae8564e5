//! Public API facade for sqlquerypp.
//!
//! sqlquerypp compiles augmented SQL templates into plain, parameterized SQL
//! for a target dialect. A template is ordinary SQL plus two extensions:
//!
//! - `%s`, a positional parameter placeholder;
//! - `combined_result (<subquery>) AS $name { <body> }`, a block that runs
//!   `<body>` once per row of `<subquery>`, where `$name` inside the body
//!   stands for the current row and `$name` elsewhere for the whole result.
//!
//! ```
//! use sqlquerypp::{Query, compiler, params};
//!
//! fn main() -> sqlquerypp::Result<()> {
//!     let compiler = compiler("postgres")?;
//!     let out = compiler.compile(&Query::new(
//!         "combined_result (SELECT id FROM users WHERE team = %s) AS $uid { \
//!            SELECT p.uid, p.title FROM posts p WHERE p.uid = $uid ORDER BY p.created DESC LIMIT %s }",
//!         params!["core", 3],
//!     ))?;
//!     assert!(out.statement().starts_with("(WITH cr_uid AS MATERIALIZED (SELECT id FROM users"));
//!     assert!(out.statement().contains("WHERE p.uid = loop_values.item"));
//!     assert_eq!(out.parameters(), params!["core", 3].as_slice());
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};

pub use sqlquerypp_codegen::{
    BlockSlice, Compilation, CompileMetricsSnapshot, Compiler, DEFAULT_MAX_TEMPLATE_BYTES, Dialect,
    DialectTag, Emitter, MySql84, MySql84Options, ParameterTable, Piece, Postgres,
    PostgresOptions, Replication, Substitution, compile_metrics_snapshot, count_markers,
    reset_compile_metrics, validate_output,
};
pub use sqlquerypp_error::{CompileError, CompileStage, Result};
pub use sqlquerypp_parser::{
    Block, BlockId, Fragment, ReferenceCounts, ResolvedTemplate, Template, parse_template, resolve,
};
pub use sqlquerypp_types::{PLACEHOLDER, Query, Span, Value};

/// Build a `Vec<Value>` from heterogeneous values.
///
/// ```
/// use sqlquerypp::Value;
///
/// let p = sqlquerypp::params!["CRIT1", 1337, None::<i64>];
/// assert_eq!(p, vec![Value::from("CRIT1"), Value::Integer(1337), Value::Null]);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($val:expr),+ $(,)?) => {
        ::std::vec![$($crate::Value::from($val)),+]
    };
}

/// Compiler configuration, typically loaded from JSON.
///
/// Every field is optional; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub dialect: DialectTag,
    /// Largest accepted template in bytes; `0` disables the limit.
    pub max_template_bytes: usize,
    pub mysql84: MySql84Options,
    pub postgres: PostgresOptions,
    /// Parse compiled statements with the dialect's grammar.
    pub validate_output: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            dialect: DialectTag::default(),
            max_template_bytes: DEFAULT_MAX_TEMPLATE_BYTES,
            mysql84: MySql84Options::default(),
            postgres: PostgresOptions::default(),
            validate_output: true,
        }
    }
}

impl CompilerConfig {
    /// Decode a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| CompileError::InvalidConfig {
            detail: err.to_string(),
        })
    }

    /// Build the compiler this configuration describes.
    pub fn build(&self) -> Result<Compiler> {
        let compiler = match self.dialect {
            DialectTag::MySql84 => Compiler::new(MySql84::new(self.mysql84.clone())?),
            DialectTag::Postgres => Compiler::new(Postgres::new(self.postgres.clone())?),
        };
        tracing::debug!(
            target: "sqlquerypp.compile",
            dialect = %self.dialect,
            max_template_bytes = self.max_template_bytes,
            validate_output = self.validate_output,
            "compiler configured"
        );
        Ok(compiler
            .with_max_template_bytes(self.max_template_bytes)
            .with_output_validation(self.validate_output))
    }
}

/// A compiler with default options for the dialect named by `tag`.
pub fn compiler(tag: &str) -> Result<Compiler> {
    let tag: DialectTag = tag.parse()?;
    Ok(Compiler::for_tag(tag))
}

/// A compiler built from `config`.
pub fn compiler_for(config: &CompilerConfig) -> Result<Compiler> {
    config.build()
}
