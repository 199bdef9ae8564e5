//! Dialect backends: the seam between the emission engine and the SQL each
//! target database needs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlquerypp_error::{CompileError, Result};
use sqlquerypp_parser::{Block, ReferenceCounts};

use crate::emit::Emitter;

/// Identifies a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DialectTag {
    /// MySQL 8.4, lowering blocks to recursive CTEs.
    #[default]
    MySql84,
    /// PostgreSQL, lowering blocks to `CROSS JOIN LATERAL`.
    Postgres,
}

impl DialectTag {
    pub const ALL: [Self; 2] = [Self::MySql84, Self::Postgres];

    /// Canonical tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MySql84 => "mysql84",
            Self::Postgres => "postgres",
        }
    }
}

impl fmt::Display for DialectTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialectTag {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql84" | "mysql-8.4" | "mysql8.4" => Ok(Self::MySql84),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            _ => Err(CompileError::UnknownDialect { tag: s.to_owned() }),
        }
    }
}

impl TryFrom<String> for DialectTag {
    type Error = CompileError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<DialectTag> for String {
    fn from(tag: DialectTag) -> Self {
        tag.as_str().to_owned()
    }
}

/// How many times a backend emits each part of a block.
///
/// Placeholders inherit their fragment's count: every `%s` of the defining
/// subquery is emitted `subquery_at_block` times where the block stands, plus
/// `subquery_per_external_reference` times for every emission of a reference
/// from outside the block's own body. Body placeholders are emitted
/// `body_at_block` times. References inside the block's own body are
/// rendered as substitution text and carry no placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replication {
    pub subquery_at_block: usize,
    pub body_at_block: usize,
    pub subquery_per_external_reference: usize,
}

/// A target SQL dialect.
///
/// Backends only produce text and ask the [`Emitter`] to emit template
/// fragments; the emitter owns parameter values, so it can check afterwards
/// that the backend emitted each placeholder as often as its
/// [`Replication`] promised.
pub trait Dialect: Send + Sync {
    fn tag(&self) -> DialectTag;

    /// Replication counts for `block`. May reject block shapes the backend
    /// cannot lower.
    fn replication(&self, block: &Block, usage: ReferenceCounts) -> Result<Replication>;

    /// Emit the SQL replacing `block` at its definition site.
    fn lower_block(&self, block: &Block, out: &mut Emitter<'_>) -> Result<()>;

    /// Emit the SQL replacing a reference to `block` from outside its body.
    /// Inlines the defining subquery as a parenthesized expression.
    fn lower_reference(&self, block: &Block, out: &mut Emitter<'_>) -> Result<()> {
        out.push_str("(");
        out.emit_trimmed(&block.subquery, None)?;
        out.push_str(")");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_parsing() {
        assert_eq!("mysql84".parse::<DialectTag>().ok(), Some(DialectTag::MySql84));
        assert_eq!("MySQL-8.4".parse::<DialectTag>().ok(), Some(DialectTag::MySql84));
        assert_eq!(" pg ".parse::<DialectTag>().ok(), Some(DialectTag::Postgres));
        assert_eq!("PostgreSQL".parse::<DialectTag>().ok(), Some(DialectTag::Postgres));
        assert_eq!(
            "oracle".parse::<DialectTag>(),
            Err(CompileError::UnknownDialect {
                tag: "oracle".to_owned()
            })
        );
    }

    #[test]
    fn test_tag_display_round_trips() {
        for tag in DialectTag::ALL {
            assert_eq!(tag.to_string().parse::<DialectTag>().ok(), Some(tag));
        }
    }

    #[test]
    fn test_tag_serde() {
        let json = serde_json::to_string(&DialectTag::Postgres).expect("serialize");
        assert_eq!(json, r#""postgres""#);
        let tag: DialectTag = serde_json::from_str(r#""mysql-8.4""#).expect("deserialize");
        assert_eq!(tag, DialectTag::MySql84);
        assert!(serde_json::from_str::<DialectTag>(r#""sqlite""#).is_err());
    }
}
