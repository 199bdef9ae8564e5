//! PostgreSQL backend.
//!
//! PostgreSQL correlates derived tables through `LATERAL`, so the body runs
//! once per subquery row without being repeated in the output:
//!
//! ```text
//! (WITH cr_<name> AS MATERIALIZED (<subquery>)
//! SELECT combined.* FROM cr_<name> AS loop_values (item)
//! CROSS JOIN LATERAL (<body, with $name as loop_values.item>) AS combined)
//! ```

use sqlquerypp_error::Result;
use sqlquerypp_parser::{Block, ReferenceCounts};

use crate::dialect::{Dialect, DialectTag, Replication};
use crate::emit::{Emitter, Substitution};
use crate::options::PostgresOptions;

/// The PostgreSQL dialect.
#[derive(Debug, Clone, Default)]
pub struct Postgres {
    options: PostgresOptions,
}

impl Postgres {
    pub fn new(options: PostgresOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    #[must_use]
    pub const fn options(&self) -> &PostgresOptions {
        &self.options
    }
}

impl Dialect for Postgres {
    fn tag(&self) -> DialectTag {
        DialectTag::Postgres
    }

    fn replication(&self, _block: &Block, _usage: ReferenceCounts) -> Result<Replication> {
        Ok(Replication {
            subquery_at_block: 1,
            body_at_block: 1,
            subquery_per_external_reference: 1,
        })
    }

    fn lower_block(&self, block: &Block, out: &mut Emitter<'_>) -> Result<()> {
        let PostgresOptions {
            cte_prefix,
            loop_alias,
            item_column,
            lateral_alias,
            materialized,
        } = &self.options;
        let cte = format!("{cte_prefix}{}", block.name);
        let materialized = if *materialized { "MATERIALIZED " } else { "" };

        out.push_str(&format!("(WITH {cte} AS {materialized}("));
        out.emit_trimmed(&block.subquery, None)?;
        out.push_str(&format!(
            ")\nSELECT {lateral_alias}.* FROM {cte} AS {loop_alias} ({item_column})\nCROSS JOIN LATERAL ("
        ));
        let item = Substitution {
            block: block.id,
            text: format!("{loop_alias}.{item_column}"),
        };
        out.emit_trimmed(&block.body, Some(&item))?;
        out.push_str(&format!(") AS {lateral_alias})"));
        Ok(())
    }
}
