// Shape analysis of a block body for the recursive-CTE lowering.
//
// The lowering re-emits the body's projection, table and joins around a
// generated iteration predicate, so the body must be a single SELECT of
// qualified columns from one table, optionally joined, filtered only by
// `<alias>.<column> = $<block>`. Everything kept for rendering is printed
// back from the sqlparser tree, so comments in the body do not reach the
// output.

use std::fmt;

use sqlparser::ast::{
    BinaryOperator, Expr, GroupByExpr, JoinConstraint, JoinOperator, SelectItem, TableFactor,
};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

use super::slots::SlottedSql;

/// `qualifier.name` in the projection or the WHERE clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Column {
    pub qualifier: String,
    pub name: String,
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.qualifier, self.name)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SelectShape {
    pub projection: String,
    pub columns: Vec<Column>,
    /// Table name: `t` or `schema.t`.
    pub table: String,
    pub alias: Option<String>,
    /// `LEFT JOIN <relation> <constraint>` or `CROSS JOIN <relation>`.
    pub joins: Vec<String>,
    /// The column the block's values are matched against.
    pub iteration: Column,
}

impl SelectShape {
    /// The name the FROM table is referred to by.
    pub fn qualifier(&self) -> &str {
        self.alias
            .as_deref()
            .or_else(|| self.table.rsplit('.').next())
            .unwrap_or_default()
    }

    /// Projected columns coming from joined tables.
    pub fn joined_columns(&self) -> impl Iterator<Item = &Column> {
        let qualifier = self.qualifier();
        self.columns
            .iter()
            .filter(move |c| !c.qualifier.eq_ignore_ascii_case(qualifier))
    }
}

/// Analyze a slotted body. Errors describe the offending construct.
pub(crate) fn analyze(body: &SlottedSql<'_>, block: &str) -> Result<SelectShape, String> {
    let dialect = MySqlDialect {};
    let mut parser = Parser::new(&dialect)
        .try_with_sql(&body.sql)
        .map_err(|err| format!("body is not valid SQL: {err}"))?;
    let select = parser
        .parse_select()
        .map_err(|err| format!("body must be a single SELECT statement: {err}"))?;
    let next = parser.peek_token();
    if next.token != Token::EOF {
        return Err(format!("`{}` is not supported here", next.token));
    }

    if select.distinct.is_some() {
        return Err("SELECT DISTINCT is not supported".to_owned());
    }
    if select.into.is_some() {
        return Err("SELECT ... INTO is not supported".to_owned());
    }
    if !matches!(&select.group_by, GroupByExpr::Expressions(exprs, _) if exprs.is_empty()) {
        return Err("GROUP BY is not supported".to_owned());
    }
    if select.having.is_some() {
        return Err("HAVING is not supported".to_owned());
    }
    if !select.named_window.is_empty() {
        return Err("WINDOW is not supported".to_owned());
    }

    // Projection.
    let mut columns: Vec<Column> = Vec::new();
    for item in &select.projection {
        let column = match item {
            SelectItem::UnnamedExpr(expr) => qualified_column(expr),
            _ => None,
        }
        .filter(|c| !SlottedSql::has_slot(&c.to_string()))
        .ok_or_else(|| {
            format!(
                "projection item `{}` is not a qualified column such as `alias.column`",
                body.describe(&item.to_string())
            )
        })?;
        if columns.iter().any(|c| c.name.eq_ignore_ascii_case(&column.name)) {
            return Err(format!("column name `{}` is selected twice", column.name));
        }
        columns.push(column);
    }
    let projection = columns
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    // FROM table.
    let from = match select.from.as_slice() {
        [from] => from,
        [] => return Err("body has no FROM clause".to_owned()),
        _ => return Err("FROM may name only one table; use JOIN for the others".to_owned()),
    };
    let TableFactor::Table { name, alias, .. } = &from.relation else {
        return Err(format!(
            "FROM must name a single table, found `{}`",
            body.describe(&from.relation.to_string())
        ));
    };
    let alias = match alias {
        Some(alias) if !alias.columns.is_empty() => {
            return Err(format!("table alias `{alias}` may not list columns"));
        }
        Some(alias) => Some(alias.name.to_string()),
        None => None,
    };

    // Joins.
    let mut joins = Vec::with_capacity(from.joins.len());
    for join in &from.joins {
        let constraint = match &join.join_operator {
            JoinOperator::Join(c)
            | JoinOperator::Inner(c)
            | JoinOperator::Left(c)
            | JoinOperator::LeftOuter(c)
            | JoinOperator::Right(c)
            | JoinOperator::RightOuter(c)
            | JoinOperator::StraightJoin(c) => constraint_sql(c)?,
            JoinOperator::CrossJoin => None,
            _ => {
                return Err(format!(
                    "`{}` is not supported",
                    body.describe(join.to_string().trim())
                ));
            }
        };
        joins.push(match constraint {
            Some(constraint) => format!("LEFT JOIN {} {constraint}", join.relation),
            None => format!("CROSS JOIN {}", join.relation),
        });
    }

    // WHERE.
    let selection = select
        .selection
        .as_ref()
        .ok_or_else(|| format!("body has no WHERE clause binding `${block}`"))?;
    let iteration = iteration_predicate(selection, body, block)
        .ok_or_else(|| format!("WHERE must be exactly `<alias>.<column> = ${block}`"))?;

    // Placeholders outside the re-emitted parts would be dropped.
    let printed = select.to_string();
    let kept = format!("{} {}", name, joins.join(" "));
    if let Some(index) = body.placeholders_missing_from(&kept).first() {
        return Err(if body.placeholders_missing_from(&printed).contains(index) {
            "`%s` inside a comment is not supported; move the comment out of the body".to_owned()
        } else {
            "`%s` is only supported in the FROM and JOIN clauses".to_owned()
        });
    }

    let shape = SelectShape {
        projection,
        columns,
        table: name.to_string(),
        alias,
        joins,
        iteration,
    };
    let qualifier = shape.qualifier();
    if !shape.iteration.qualifier.eq_ignore_ascii_case(qualifier) {
        return Err(format!(
            "`${block}` must be matched against a column of the FROM table `{qualifier}`"
        ));
    }
    if !shape.columns.iter().any(|c| {
        c.qualifier.eq_ignore_ascii_case(&shape.iteration.qualifier)
            && c.name.eq_ignore_ascii_case(&shape.iteration.name)
    }) {
        return Err(format!(
            "iteration column `{}` must also be selected",
            shape.iteration
        ));
    }
    Ok(shape)
}

/// `a.b`
fn qualified_column(expr: &Expr) -> Option<Column> {
    match expr {
        Expr::CompoundIdentifier(idents) => match idents.as_slice() {
            [qualifier, name] => Some(Column {
                qualifier: qualifier.to_string(),
                name: name.to_string(),
            }),
            _ => None,
        },
        _ => None,
    }
}

fn constraint_sql(constraint: &JoinConstraint) -> Result<Option<String>, String> {
    match constraint {
        JoinConstraint::On(expr) => Ok(Some(format!("ON {expr}"))),
        JoinConstraint::Using(columns) => Ok(Some(format!(
            "USING ({})",
            columns
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ))),
        JoinConstraint::None => Ok(None),
        JoinConstraint::Natural => Err("NATURAL joins are not supported".to_owned()),
    }
}

/// `q.c = $block`
fn iteration_predicate(expr: &Expr, body: &SlottedSql<'_>, block: &str) -> Option<Column> {
    let Expr::BinaryOp {
        left,
        op: BinaryOperator::Eq,
        right,
    } = expr
    else {
        return None;
    };
    let Expr::Subquery(query) = right.as_ref() else {
        return None;
    };
    if body.reference_name(&query.to_string()) != Some(block) {
        return None;
    }
    qualified_column(left).filter(|c| !SlottedSql::has_slot(&c.to_string()))
}
