//! Output validation: the compiled statement must parse for its dialect.
//!
//! `%s` markers are not SQL, so before parsing each one is swapped for the
//! dialect's own bind parameter (`?` for MySQL, `$n` for PostgreSQL) and
//! every `%%` for the percent sign it escapes.

use sqlparser::dialect::{Dialect as SqlDialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;
use sqlquerypp_error::{CompileError, Result};

use crate::dialect::DialectTag;

/// Parse `sql` with the grammar of `tag`.
pub fn validate_output(tag: DialectTag, sql: &str) -> Result<()> {
    let (dialect, bindable): (Box<dyn SqlDialect>, String) = match tag {
        DialectTag::MySql84 => (Box::new(MySqlDialect {}), bind_markers(sql, |_| "?".to_owned())),
        DialectTag::Postgres => (
            Box::new(PostgreSqlDialect {}),
            bind_markers(sql, |n| format!("${n}")),
        ),
    };
    Parser::parse_sql(dialect.as_ref(), &bindable)
        .map(|_| ())
        .map_err(|err| {
            tracing::debug!(
                target: "sqlquerypp.compile",
                dialect = %tag,
                error = %err,
                "compiled query does not parse"
            );
            CompileError::ResultingQueryInvalid {
                dialect: tag.as_str().to_owned(),
                query: sql.to_owned(),
                detail: err.to_string(),
            }
        })
}

/// Rewrite `%s` markers with `param(n)` for the 1-based marker number `n`.
fn bind_markers(sql: &str, param: impl Fn(usize) -> String) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut markers = 0;
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('s') => {
                chars.next();
                markers += 1;
                out.push_str(&param(markers));
            }
            Some('%') => {
                chars.next();
                out.push('%');
            }
            _ => out.push('%'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_markers() {
        let pg = bind_markers("a = %s AND b LIKE 'x%%' AND c = %s % 2", |n| format!("${n}"));
        assert_eq!(pg, "a = $1 AND b LIKE 'x%' AND c = $2 % 2");
        let my = bind_markers("%%s %s", |_| "?".to_owned());
        assert_eq!(my, "%s ?");
    }

    #[test]
    fn test_generated_shapes_parse() {
        validate_output(
            DialectTag::Postgres,
            "(WITH cr_ids AS MATERIALIZED (SELECT id FROM a WHERE k = %s)\n\
             SELECT combined.* FROM cr_ids AS loop_values (item)\n\
             CROSS JOIN LATERAL (SELECT a.id FROM a WHERE a.id = loop_values.item) AS combined)",
        )
        .expect("lateral lowering parses");
        validate_output(
            DialectTag::MySql84,
            "(WITH RECURSIVE all_entries (n, id) AS (\n\
             WITH loop_values (id) AS (SELECT id FROM t WHERE g = %s)\n\
             SELECT 0, t.id FROM t WHERE t.id = (SELECT MIN(id) FROM loop_values)\n\
             UNION ALL\n\
             SELECT all_entries.n + 1, t.id FROM all_entries LEFT JOIN t AS t \
             ON t.id = (SELECT MIN(id) FROM loop_values WHERE id > all_entries.id) \
             WHERE all_entries.n + 1 < (SELECT COUNT(DISTINCT id) FROM loop_values)\n\
             )\n\
             SELECT id FROM all_entries WHERE id IS NOT NULL)",
        )
        .expect("recursive lowering parses");
    }

    #[test]
    fn test_commented_out_closer_is_reported() {
        let sql = "(WITH cr_ids AS MATERIALIZED (SELECT id FROM t -- ids)\n\
                   SELECT combined.* FROM cr_ids AS loop_values (item)";
        let err = validate_output(DialectTag::Postgres, sql).expect_err("unbalanced");
        assert!(matches!(
            err,
            CompileError::ResultingQueryInvalid { ref dialect, ref query, .. }
                if dialect == "postgres" && query == sql
        ));
    }
}
