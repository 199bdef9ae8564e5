//! MySQL 8.4 backend.
//!
//! MySQL cannot correlate a derived table with an outer row, so a block is
//! lowered to a recursive CTE that walks the distinct values of the defining
//! subquery in ascending order, running the body once per value:
//!
//! ```text
//! (WITH RECURSIVE all_entries (n, <columns>) AS (
//! WITH loop_values (<col>) AS (<subquery>)
//! SELECT 0, <projection> FROM <table> <joins> WHERE <q>.<col> = (SELECT MIN(<col>) FROM loop_values)
//! UNION ALL
//! SELECT all_entries.n + 1, <projection> FROM all_entries
//!   LEFT JOIN <table> AS <q> ON <q>.<col> = (SELECT MIN(<col>) FROM loop_values WHERE <col> > all_entries.<col>)
//!   <joins> WHERE all_entries.n + 1 < (SELECT COUNT(DISTINCT <col>) FROM loop_values)
//! )
//! SELECT <columns> FROM all_entries WHERE <joined columns> IS NOT NULL)
//! ```
//!
//! The body's joins appear in both halves of the union, so body placeholders
//! are emitted twice. Joins with an `ON` or `USING` constraint become
//! `LEFT JOIN`s so that a loop value without matches does not end the walk.
//! The body is read with sqlparser and printed back from its syntax tree;
//! comments inside the body are dropped.

mod select;
mod slots;

use sqlquerypp_error::{CompileError, Result};
use sqlquerypp_parser::{Block, ReferenceCounts};

use crate::dialect::{Dialect, DialectTag, Replication};
use crate::emit::{Emitter, Substitution};
use crate::options::MySql84Options;

use self::select::{SelectShape, analyze};
use self::slots::SlottedSql;

const REPLICATION: Replication = Replication {
    subquery_at_block: 1,
    body_at_block: 2,
    subquery_per_external_reference: 1,
};

/// The MySQL 8.4 dialect.
#[derive(Debug, Clone, Default)]
pub struct MySql84 {
    options: MySql84Options,
}

impl MySql84 {
    pub fn new(options: MySql84Options) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    #[must_use]
    pub const fn options(&self) -> &MySql84Options {
        &self.options
    }

    fn unsupported(&self, block: &Block, detail: String) -> CompileError {
        CompileError::unsupported(self.tag().as_str(), block.name.as_str(), detail)
    }

    fn render(
        &self,
        block: &Block,
        body: &SlottedSql<'_>,
        shape: &SelectShape,
        out: &mut Emitter<'_>,
    ) -> Result<()> {
        let MySql84Options {
            entries_cte: entries,
            loop_cte: values,
            counter_column: counter,
        } = &self.options;
        let qualifier = shape.qualifier();
        let col = &shape.iteration.name;
        let column_list = shape
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        out.push_str(&format!(
            "(WITH RECURSIVE {entries} ({counter}, {column_list}) AS (\nWITH {values} ({col}) AS ("
        ));
        out.emit_trimmed(&block.subquery, None)?;
        out.push_str(")\n");

        // Anchor: the smallest loop value.
        let anchor = Substitution {
            block: block.id,
            text: format!("(SELECT MIN({col}) FROM {values})"),
        };
        out.push_str(&format!("SELECT 0, {} FROM ", shape.projection));
        body.emit(out, &shape.table, None)?;
        if let Some(alias) = &shape.alias {
            out.push_str(" AS ");
            out.push_str(alias);
        }
        Self::render_joins(body, shape, out, &anchor)?;
        out.push_str(&format!(
            " WHERE {} = {}\nUNION ALL\n",
            shape.iteration, anchor.text
        ));

        // Step: the next larger loop value.
        let step = Substitution {
            block: block.id,
            text: format!("(SELECT MIN({col}) FROM {values} WHERE {col} > {entries}.{col})"),
        };
        out.push_str(&format!(
            "SELECT {entries}.{counter} + 1, {} FROM {entries} LEFT JOIN ",
            shape.projection
        ));
        body.emit(out, &shape.table, None)?;
        out.push_str(&format!(
            " AS {qualifier} ON {} = {}",
            shape.iteration, step.text
        ));
        Self::render_joins(body, shape, out, &step)?;
        out.push_str(&format!(
            " WHERE {entries}.{counter} + 1 < (SELECT COUNT(DISTINCT {col}) FROM {values})\n)\n"
        ));

        let mut filtered: Vec<&str> = shape.joined_columns().map(|c| c.name.as_str()).collect();
        if filtered.is_empty() {
            filtered.push(col);
        }
        let filter = filtered
            .iter()
            .map(|name| format!("{name} IS NOT NULL"))
            .collect::<Vec<_>>()
            .join(" AND ");
        out.push_str(&format!("SELECT {column_list} FROM {entries} WHERE {filter})"));
        Ok(())
    }

    fn render_joins(
        body: &SlottedSql<'_>,
        shape: &SelectShape,
        out: &mut Emitter<'_>,
        local: &Substitution,
    ) -> Result<()> {
        for join in &shape.joins {
            out.push_str(" ");
            body.emit(out, join, Some(local))?;
        }
        Ok(())
    }

    fn analyze<'f>(&self, block: &'f Block) -> Result<(SlottedSql<'f>, SelectShape)> {
        let body = SlottedSql::new(&block.body).map_err(|detail| self.unsupported(block, detail))?;
        let shape = analyze(&body, &block.name).map_err(|detail| self.unsupported(block, detail))?;
        Ok((body, shape))
    }
}

impl Dialect for MySql84 {
    fn tag(&self) -> DialectTag {
        DialectTag::MySql84
    }

    fn replication(&self, block: &Block, _usage: ReferenceCounts) -> Result<Replication> {
        self.analyze(block)?;
        Ok(REPLICATION)
    }

    fn lower_block(&self, block: &Block, out: &mut Emitter<'_>) -> Result<()> {
        let (body, shape) = self.analyze(block)?;
        tracing::debug!(
            target: "sqlquerypp.compile",
            block = %block.name,
            iteration = %shape.iteration,
            joins = shape.joins.len(),
            "lowering combined_result to recursive CTE"
        );
        self.render(block, &body, &shape, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use sqlquerypp_types::{Query, Value};

    fn compile(src: &str, values: Vec<Value>) -> Result<Query> {
        Compiler::new(MySql84::default()).compile(&Query::new(src, values))
    }

    #[test]
    fn test_lower_block_exact_output() {
        let src = "combined_result (SELECT id FROM a WHERE k = %s) AS $ids {\n  \
                   SELECT a.id, b.v FROM a LEFT JOIN b ON b.a_id = a.id AND b.x = %s WHERE a.id = $ids\n}";
        let out = compile(src, vec![Value::from("K"), Value::from(9_i64)]).expect("compiles");
        assert_eq!(
            out.statement(),
            "(WITH RECURSIVE all_entries (n, id, v) AS (\n\
             WITH loop_values (id) AS (SELECT id FROM a WHERE k = %s)\n\
             SELECT 0, a.id, b.v FROM a LEFT JOIN b ON b.a_id = a.id AND b.x = %s \
             WHERE a.id = (SELECT MIN(id) FROM loop_values)\n\
             UNION ALL\n\
             SELECT all_entries.n + 1, a.id, b.v FROM all_entries LEFT JOIN a AS a \
             ON a.id = (SELECT MIN(id) FROM loop_values WHERE id > all_entries.id) \
             LEFT JOIN b ON b.a_id = a.id AND b.x = %s \
             WHERE all_entries.n + 1 < (SELECT COUNT(DISTINCT id) FROM loop_values)\n\
             )\n\
             SELECT id, v FROM all_entries WHERE v IS NOT NULL)"
        );
        assert_eq!(
            out.parameters(),
            &[Value::from("K"), Value::from(9_i64), Value::from(9_i64)]
        );
    }

    #[test]
    fn test_lower_block_without_joins_filters_iteration_column() {
        let src = "combined_result (SELECT id FROM t) AS $ids { SELECT t.id, t.name FROM items t WHERE t.id = $ids }";
        let out = compile(src, vec![]).expect("compiles");
        assert!(out.statement().contains("SELECT 0, t.id, t.name FROM items AS t WHERE t.id = "));
        assert!(out.statement().contains("FROM all_entries LEFT JOIN items AS t ON t.id = "));
        assert!(out.statement().ends_with("SELECT id, name FROM all_entries WHERE id IS NOT NULL)"));
    }

    #[test]
    fn test_lower_joins_become_left_joins() {
        let src = "combined_result (SELECT id FROM t) AS $ids { \
                   SELECT t.id, u.v FROM t INNER JOIN u ON u.t = t.id CROSS JOIN w WHERE t.id = $ids }";
        let out = compile(src, vec![]).expect("compiles");
        let sql = out.statement();
        assert!(!sql.contains("INNER JOIN"));
        assert_eq!(sql.matches("LEFT JOIN u ON u.t = t.id").count(), 2);
        assert_eq!(sql.matches("CROSS JOIN w").count(), 2);
    }

    #[test]
    fn test_external_reference_inlines_subquery() {
        let src = "combined_result (SELECT id FROM t WHERE g = %s) AS $ids { \
                   SELECT t.id FROM t WHERE t.id = $ids };\n\
                   SELECT COUNT(*) FROM t WHERE t.id IN $ids AND t.z = %s";
        let out = compile(src, vec![Value::from(1_i64), Value::from(2_i64)]).expect("compiles");
        assert!(out
            .statement()
            .ends_with(";\nSELECT COUNT(*) FROM t WHERE t.id IN (SELECT id FROM t WHERE g = %s) AND t.z = %s"));
        assert_eq!(
            out.parameters(),
            &[Value::from(1_i64), Value::from(1_i64), Value::from(2_i64)]
        );
    }

    #[test]
    fn test_custom_names() {
        let options = MySql84Options {
            entries_cte: "walk".to_owned(),
            loop_cte: "vals".to_owned(),
            counter_column: "step".to_owned(),
        };
        let compiler = Compiler::new(MySql84::new(options).expect("valid options"));
        let out = compiler
            .compile(&Query::new(
                "combined_result (SELECT id FROM t) AS $ids { SELECT t.id FROM t WHERE t.id = $ids }",
                vec![],
            ))
            .expect("compiles");
        assert!(out.statement().starts_with("(WITH RECURSIVE walk (step, id) AS (\nWITH vals (id) AS ("));
        assert!(out.statement().contains("walk.step + 1 <"));
    }

    #[test]
    fn test_trailing_line_comments_do_not_swallow_closers() {
        let src = "combined_result (SELECT id FROM t -- ids\n) AS $ids {\n \
                   SELECT t.id FROM t WHERE t.id = $ids -- per id\n}\n\
                   UNION ALL\n\
                   SELECT t.id FROM t WHERE t.id IN $ids";
        let out = compile(src, vec![]).expect("compiles");
        assert_eq!(
            out.statement(),
            "(WITH RECURSIVE all_entries (n, id) AS (\n\
             WITH loop_values (id) AS (SELECT id FROM t -- ids\n)\n\
             SELECT 0, t.id FROM t WHERE t.id = (SELECT MIN(id) FROM loop_values)\n\
             UNION ALL\n\
             SELECT all_entries.n + 1, t.id FROM all_entries LEFT JOIN t AS t \
             ON t.id = (SELECT MIN(id) FROM loop_values WHERE id > all_entries.id) \
             WHERE all_entries.n + 1 < (SELECT COUNT(DISTINCT id) FROM loop_values)\n\
             )\n\
             SELECT id FROM all_entries WHERE id IS NOT NULL)\n\
             UNION ALL\n\
             SELECT t.id FROM t WHERE t.id IN (SELECT id FROM t -- ids\n)"
        );
    }

    #[test]
    fn test_comment_after_join_constraint_is_dropped() {
        let src = "combined_result (SELECT id FROM t WHERE g = %s) AS $ids { \
                   SELECT t.id, u.v FROM t LEFT JOIN u ON u.tid = t.id -- was here\n WHERE t.id = $ids }";
        let out = compile(src, vec![Value::from(1_i64)]).expect("compiles");
        let sql = out.statement();
        assert!(!sql.contains("--"));
        assert!(sql.contains(
            "LEFT JOIN u ON u.tid = t.id WHERE t.id = (SELECT MIN(id) FROM loop_values)\nUNION ALL\n"
        ));
        assert!(sql.contains(
            "LEFT JOIN u ON u.tid = t.id WHERE all_entries.n + 1 < (SELECT COUNT(DISTINCT id) FROM loop_values)\n)"
        ));
        assert_eq!(out.parameters(), &[Value::from(1_i64)]);
    }

    #[test]
    fn test_placeholder_in_body_comment_is_rejected() {
        let src = "combined_result (SELECT id FROM t) AS $ids { \
                   SELECT t.id, u.v FROM t LEFT JOIN u ON u.tid = t.id -- was %s\n WHERE t.id = $ids }";
        let err = compile(src, vec![Value::from(1_i64)]).expect_err("comment placeholder");
        assert!(matches!(
            err,
            CompileError::DialectUnsupportedConstruct { ref block, ref detail, .. }
                if block == "ids" && detail.contains("inside a comment")
        ));
    }

    #[test]
    fn test_body_placeholders_in_strings_and_derived_joins() {
        let src = "combined_result (SELECT id FROM t) AS $ids { \
                   SELECT t.id, d.v FROM t JOIN (SELECT v, tid FROM u WHERE k = %s) AS d \
                   ON d.tid = t.id AND d.v <> 'x%s' WHERE t.id = $ids }";
        let out = compile(src, vec![Value::from(1_i64), Value::from(2_i64)]).expect("compiles");
        assert_eq!(
            out.parameters(),
            &[
                Value::from(1_i64),
                Value::from(2_i64),
                Value::from(1_i64),
                Value::from(2_i64)
            ]
        );
        assert_eq!(out.statement().matches("d.v <> 'x%s'").count(), 2);
    }

    #[test]
    fn test_unsupported_body() {
        let src = "combined_result (SELECT id FROM t) AS $ids { SELECT t.id FROM t WHERE t.id = $ids GROUP BY t.id }";
        let err = compile(src, vec![]).expect_err("GROUP BY rejected");
        assert!(matches!(
            err,
            CompileError::DialectUnsupportedConstruct { ref dialect, ref block, ref detail }
                if dialect == "mysql84" && block == "ids" && detail.contains("GROUP")
        ));
    }
}
