//! Back end of the sqlquerypp compiler.
//!
//! [`Compiler`] drives a template through parsing, parameter binding and
//! reference resolution, then hands the resolved fragment tree to a
//! [`Dialect`] that lowers each `combined_result` block into SQL the target
//! database executes natively. The emitted parameter list always lines up one
//! to one with the `%s` markers in the emitted statement, and a statement
//! that lowered any block is parsed again with the dialect's grammar before
//! it is returned.

pub mod compiler;
pub mod dialect;
pub mod emit;
pub mod metrics;
pub mod mysql84;
pub mod options;
pub mod params;
pub mod postgres;
pub mod validate;

pub use compiler::{Compiler, DEFAULT_MAX_TEMPLATE_BYTES};
pub use dialect::{Dialect, DialectTag, Replication};
pub use emit::{BlockSlice, Compilation, Emitter, Piece, Substitution, count_markers, emit};
pub use metrics::{CompileMetricsSnapshot, compile_metrics_snapshot, reset_compile_metrics};
pub use mysql84::MySql84;
pub use options::{MySql84Options, PostgresOptions};
pub use params::ParameterTable;
pub use postgres::Postgres;
pub use validate::validate_output;
