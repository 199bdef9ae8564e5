//! Per-dialect lowering options.
//!
//! Every name here is spliced into generated SQL, so each must be a plain
//! identifier. All fields default, so a partial JSON object is enough.

use serde::{Deserialize, Serialize};
use sqlquerypp_error::{CompileError, Result};

/// Names used by the MySQL 8.4 recursive-CTE lowering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MySql84Options {
    /// Recursive CTE accumulating one row set per loop value.
    pub entries_cte: String,
    /// CTE holding the block's subquery results.
    pub loop_cte: String,
    /// Iteration counter column of the recursive CTE.
    pub counter_column: String,
}

impl Default for MySql84Options {
    fn default() -> Self {
        Self {
            entries_cte: "all_entries".to_owned(),
            loop_cte: "loop_values".to_owned(),
            counter_column: "n".to_owned(),
        }
    }
}

impl MySql84Options {
    pub fn validate(&self) -> Result<()> {
        check_identifier("mysql84.entries_cte", &self.entries_cte)?;
        check_identifier("mysql84.loop_cte", &self.loop_cte)?;
        check_identifier("mysql84.counter_column", &self.counter_column)?;
        if self.entries_cte.eq_ignore_ascii_case(&self.loop_cte) {
            return Err(CompileError::InvalidConfig {
                detail: "mysql84.entries_cte and mysql84.loop_cte must differ".to_owned(),
            });
        }
        Ok(())
    }
}

/// Names used by the PostgreSQL `LATERAL` lowering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresOptions {
    /// Prefix of the CTE named after each block.
    pub cte_prefix: String,
    /// Alias of the CTE inside the block's `FROM`.
    pub loop_alias: String,
    /// Column alias of the subquery's single result column.
    pub item_column: String,
    /// Alias of the lateral body.
    pub lateral_alias: String,
    /// Emit `AS MATERIALIZED` so the subquery runs once.
    pub materialized: bool,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            cte_prefix: "cr_".to_owned(),
            loop_alias: "loop_values".to_owned(),
            item_column: "item".to_owned(),
            lateral_alias: "combined".to_owned(),
            materialized: true,
        }
    }
}

impl PostgresOptions {
    pub fn validate(&self) -> Result<()> {
        check_identifier("postgres.cte_prefix", &self.cte_prefix)?;
        check_identifier("postgres.loop_alias", &self.loop_alias)?;
        check_identifier("postgres.item_column", &self.item_column)?;
        check_identifier("postgres.lateral_alias", &self.lateral_alias)
    }
}

fn check_identifier(field: &str, value: &str) -> Result<()> {
    let mut bytes = value.bytes();
    let valid = bytes
        .next()
        .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_')
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(CompileError::InvalidConfig {
            detail: format!("{field} must be a plain SQL identifier, got {value:?}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        MySql84Options::default().validate().expect("mysql defaults");
        PostgresOptions::default().validate().expect("postgres defaults");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let opts: PostgresOptions =
            serde_json::from_str(r#"{"materialized": false}"#).expect("decode");
        assert!(!opts.materialized);
        assert_eq!(opts.cte_prefix, "cr_");

        let opts: MySql84Options =
            serde_json::from_str(r#"{"loop_cte": "ids"}"#).expect("decode");
        assert_eq!(opts.loop_cte, "ids");
        assert_eq!(opts.entries_cte, "all_entries");
    }

    #[test]
    fn test_rejects_non_identifiers() {
        let opts = MySql84Options {
            counter_column: "n; DROP TABLE t".to_owned(),
            ..MySql84Options::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(CompileError::InvalidConfig { ref detail }) if detail.contains("counter_column")
        ));

        let opts = PostgresOptions {
            lateral_alias: String::new(),
            ..PostgresOptions::default()
        };
        assert!(opts.validate().is_err());

        let opts = MySql84Options {
            loop_cte: "ALL_ENTRIES".to_owned(),
            ..MySql84Options::default()
        };
        assert!(opts.validate().is_err());
    }
}
