//! Emission engine.
//!
//! Walks a resolved template, hands each block to the dialect and appends
//! every other fragment verbatim. Parameter values are appended in lockstep
//! with the `%s` markers they bind to, so the `n`-th marker of the output
//! always binds the `n`-th output value. After the walk, the number of times
//! each source placeholder was emitted is checked against the counts the
//! dialect's [`Replication`] promised.

use sqlquerypp_error::{CompileError, Result};
use sqlquerypp_parser::{
    Block, BlockId, Fragment, Placeholder, Reference, ResolvedTemplate, Section,
};
use sqlquerypp_types::{PLACEHOLDER, Query, Value};

use crate::dialect::{Dialect, Replication};
use crate::params::ParameterTable;

/// A unit of backend output: text, or a template fragment to emit.
#[derive(Debug, Clone, Copy)]
pub enum Piece<'f> {
    Text(&'f str),
    Placeholder(&'f Placeholder),
    Reference(&'f Reference),
}

/// Text standing in for references to `block` while its body is emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub block: BlockId,
    pub text: String,
}

/// Byte range of a lowered block within the compiled statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSlice {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

/// A compiled query plus where each block ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct Compilation {
    pub query: Query,
    pub blocks: Vec<BlockSlice>,
}

impl Compilation {
    /// The SQL a block was lowered to.
    #[must_use]
    pub fn block_sql(&self, name: &str) -> Option<&str> {
        let slice = self.blocks.iter().find(|b| b.name == name)?;
        self.query.statement().get(slice.start..slice.end)
    }
}

/// Output buffer handed to dialect backends.
pub struct Emitter<'a> {
    dialect: &'a dyn Dialect,
    resolved: &'a ResolvedTemplate<'a>,
    params: &'a ParameterTable<'a>,
    sql: String,
    values: Vec<Value>,
    /// Emission count per source placeholder.
    emitted: Vec<usize>,
}

impl<'a> Emitter<'a> {
    fn new(
        dialect: &'a dyn Dialect,
        resolved: &'a ResolvedTemplate<'a>,
        params: &'a ParameterTable<'a>,
    ) -> Self {
        let template = resolved.template();
        Self {
            dialect,
            resolved,
            params,
            sql: String::with_capacity(2 * template.fragments.len() + 64),
            values: Vec::with_capacity(params.len()),
            emitted: vec![0; template.placeholder_count],
        }
    }

    /// Append generated SQL text.
    pub fn push_str(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    /// Emit a fragment sequence in order. References to `local.block` are
    /// replaced by `local.text`; other references are lowered by the dialect.
    pub fn emit_fragments(
        &mut self,
        fragments: &[Fragment],
        local: Option<&Substitution>,
    ) -> Result<()> {
        for fragment in fragments {
            self.emit_fragment(fragment, local)?;
        }
        Ok(())
    }

    /// Like [`Self::emit_fragments`], without the leading whitespace of the
    /// first literal or the trailing whitespace of the last one.
    ///
    /// A line comment at the end of the fragments keeps its line break, so
    /// whatever the backend appends next is not commented out.
    pub fn emit_trimmed(
        &mut self,
        fragments: &[Fragment],
        local: Option<&Substitution>,
    ) -> Result<()> {
        let last = fragments.len().saturating_sub(1);
        for (i, fragment) in fragments.iter().enumerate() {
            match fragment {
                Fragment::Literal(lit) => {
                    let mut text = lit.text.as_str();
                    if i == 0 {
                        text = text.trim_start();
                    }
                    if i == last {
                        text = text.trim_end();
                    }
                    self.sql.push_str(text);
                }
                other => self.emit_fragment(other, local)?,
            }
        }
        self.break_open_comment();
        Ok(())
    }

    /// End the current line if it may hold an unterminated `--` or `#`
    /// comment. Extra line breaks are harmless; a swallowed closer is not.
    fn break_open_comment(&mut self) {
        let line = self.sql.rfind('\n').map_or(self.sql.as_str(), |i| &self.sql[i + 1..]);
        if line.contains("--") || line.contains('#') {
            self.sql.push('\n');
        }
    }

    pub fn emit_piece(&mut self, piece: Piece<'_>, local: Option<&Substitution>) -> Result<()> {
        match piece {
            Piece::Text(text) => {
                self.sql.push_str(text);
                Ok(())
            }
            Piece::Placeholder(p) => self.emit_placeholder(p),
            Piece::Reference(r) => self.emit_reference(r, local),
        }
    }

    fn emit_fragment(&mut self, fragment: &Fragment, local: Option<&Substitution>) -> Result<()> {
        match fragment {
            Fragment::Literal(lit) => {
                self.sql.push_str(&lit.text);
                Ok(())
            }
            Fragment::Placeholder(p) => self.emit_placeholder(p),
            Fragment::Reference(r) => self.emit_reference(r, local),
            Fragment::Block(b) => Err(CompileError::internal(format!(
                "block `${}` emitted outside the top level",
                b.name
            ))),
        }
    }

    fn emit_placeholder(&mut self, placeholder: &Placeholder) -> Result<()> {
        let value = self.params.get(placeholder.index)?;
        let count = self.emitted.get_mut(placeholder.index).ok_or_else(|| {
            CompileError::internal(format!("placeholder #{} out of range", placeholder.index))
        })?;
        *count += 1;
        self.sql.push_str(PLACEHOLDER);
        self.values.push(value.clone());
        Ok(())
    }

    fn emit_reference(&mut self, reference: &Reference, local: Option<&Substitution>) -> Result<()> {
        let target = self.resolved.target(reference).ok_or_else(|| {
            CompileError::internal(format!("reference `${}` was never resolved", reference.name))
        })?;
        if let Some(sub) = local.filter(|s| s.block == target) {
            self.sql.push_str(&sub.text);
            return Ok(());
        }
        let block = self.block(target)?;
        let dialect = self.dialect;
        dialect.lower_reference(block, self)
    }

    fn block(&self, id: BlockId) -> Result<&'a Block> {
        self.resolved
            .block(id)
            .ok_or_else(|| CompileError::internal(format!("no block with id {}", id.0)))
    }

    /// Compare actual emission counts against `expected`.
    fn verify(&self, expected: &[usize]) -> Result<()> {
        let tag = self.dialect.tag();
        for (index, (&want, &got)) in expected.iter().zip(&self.emitted).enumerate() {
            if want != got {
                tracing::error!(
                    target: "sqlquerypp.compile",
                    dialect = %tag,
                    placeholder = index,
                    expected = want,
                    emitted = got,
                    "placeholder replication mismatch"
                );
                return Err(CompileError::internal(format!(
                    "{tag} emitted placeholder #{index} {got} times, expected {want}"
                )));
            }
        }
        let markers = count_markers(&self.sql);
        if markers != self.values.len() {
            tracing::error!(
                target: "sqlquerypp.compile",
                dialect = %tag,
                markers,
                values = self.values.len(),
                "placeholder alignment broken"
            );
            return Err(CompileError::internal(format!(
                "{tag} output has {markers} placeholders but {} values",
                self.values.len()
            )));
        }
        Ok(())
    }
}

/// Lower a resolved template through `dialect`.
pub fn emit(
    dialect: &dyn Dialect,
    resolved: &ResolvedTemplate<'_>,
    params: &ParameterTable<'_>,
) -> Result<Compilation> {
    let policies = resolved
        .blocks()
        .iter()
        .map(|block| dialect.replication(block, resolved.usage(block.id)))
        .collect::<Result<Vec<_>>>()?;
    let expected = expected_emissions(resolved, &policies);

    let mut out = Emitter::new(dialect, resolved, params);
    let mut blocks = Vec::with_capacity(policies.len());
    for fragment in &resolved.template().fragments {
        if let Fragment::Block(block) = fragment {
            let start = out.sql.len();
            dialect.lower_block(block, &mut out)?;
            blocks.push(BlockSlice {
                name: block.name.clone(),
                start,
                end: out.sql.len(),
            });
        } else {
            out.emit_fragment(fragment, None)?;
        }
    }
    out.verify(&expected)?;

    Ok(Compilation {
        query: Query::new(out.sql, out.values),
        blocks,
    })
}

/// Expected emission count of every placeholder, by placeholder index.
///
/// References only point backwards, so walking blocks last to first sees
/// every section that references a block before the block itself.
fn expected_emissions(resolved: &ResolvedTemplate<'_>, policies: &[Replication]) -> Vec<usize> {
    let body_copies = |id: BlockId| policies.get(id.0).map_or(0, |p| p.body_at_block);
    let mut subquery_copies = vec![0_usize; policies.len()];
    for (index, policy) in policies.iter().enumerate().rev() {
        let id = BlockId(index);
        let mut copies = policy.subquery_at_block;
        for site in resolved.reference_sites(id) {
            let site_copies = match *site {
                Section::Body(owner) if owner == id => continue,
                Section::TopLevel => 1,
                Section::Subquery(owner) => subquery_copies.get(owner.0).copied().unwrap_or(0),
                Section::Body(owner) => body_copies(owner),
            };
            copies = copies
                .saturating_add(site_copies.saturating_mul(policy.subquery_per_external_reference));
        }
        subquery_copies[index] = copies;
    }

    resolved
        .template()
        .placeholder_sections()
        .into_iter()
        .map(|section| match section {
            Section::TopLevel => 1,
            Section::Subquery(id) => subquery_copies.get(id.0).copied().unwrap_or(0),
            Section::Body(id) => body_copies(id),
        })
        .collect()
}

/// Count `%s` markers the way a pyformat driver does: `%%` is an escaped
/// percent sign.
#[must_use]
pub fn count_markers(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut count = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            match bytes.get(i + 1) {
                Some(b's') => {
                    count += 1;
                    i += 2;
                }
                Some(b'%') => i += 2,
                _ => i += 1,
            }
        } else {
            i += 1;
        }
    }
    count
}
