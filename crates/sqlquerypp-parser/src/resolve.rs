//! Reference resolution.
//!
//! Links every `$name` to the block it names and records, per block, where it
//! is referenced from. A block's name is visible from the end of its header
//! onward: its own body and everything after the block may use it, its own
//! subquery and anything before it may not.

use std::collections::HashMap;

use sqlquerypp_error::{CompileError, Result};

use crate::fragment::{Block, BlockId, Fragment, Reference, Section, Template};

/// How often a block is referenced, split by where the references sit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReferenceCounts {
    /// References inside the block's own body.
    pub in_body: usize,
    /// References anywhere else (top level, or later blocks).
    pub external: usize,
}

impl ReferenceCounts {
    #[must_use]
    pub const fn total(self) -> usize {
        self.in_body + self.external
    }
}

/// A template whose references are all linked to blocks.
#[derive(Debug, Clone)]
pub struct ResolvedTemplate<'t> {
    template: &'t Template,
    blocks: Vec<&'t Block>,
    /// Indexed by `ReferenceId`.
    targets: Vec<BlockId>,
    /// Indexed by `BlockId`: the section of every reference to the block.
    sites: Vec<Vec<Section>>,
}

impl<'t> ResolvedTemplate<'t> {
    #[must_use]
    pub const fn template(&self) -> &'t Template {
        self.template
    }

    /// Blocks in definition order.
    #[must_use]
    pub fn blocks(&self) -> &[&'t Block] {
        &self.blocks
    }

    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&'t Block> {
        self.blocks.get(id.0).copied()
    }

    /// The block a reference names.
    #[must_use]
    pub fn target(&self, reference: &Reference) -> Option<BlockId> {
        self.targets.get(reference.id.0).copied()
    }

    /// Sections of all references to `id`, in template order.
    #[must_use]
    pub fn reference_sites(&self, id: BlockId) -> &[Section] {
        self.sites.get(id.0).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn usage(&self, id: BlockId) -> ReferenceCounts {
        let mut counts = ReferenceCounts::default();
        for site in self.reference_sites(id) {
            if *site == Section::Body(id) {
                counts.in_body += 1;
            } else {
                counts.external += 1;
            }
        }
        counts
    }
}

/// Resolve all references of a parsed template.
pub fn resolve(template: &Template) -> Result<ResolvedTemplate<'_>> {
    Resolver::new(template).resolve()
}

struct Resolver<'t> {
    template: &'t Template,
    visible: HashMap<&'t str, BlockId>,
    blocks: Vec<&'t Block>,
    targets: Vec<Option<BlockId>>,
    sites: Vec<Vec<Section>>,
}

impl<'t> Resolver<'t> {
    fn new(template: &'t Template) -> Self {
        Self {
            template,
            visible: HashMap::new(),
            blocks: Vec::new(),
            targets: vec![None; template.reference_count],
            sites: Vec::new(),
        }
    }

    fn resolve(mut self) -> Result<ResolvedTemplate<'t>> {
        let span = tracing::debug_span!(
            target: "sqlquerypp.resolve",
            "resolve",
            blocks = tracing::field::Empty,
            references_bound = tracing::field::Empty,
        );
        let _guard = span.enter();

        let template = self.template;
        for fragment in &template.fragments {
            match fragment {
                Fragment::Block(block) => self.define(block)?,
                Fragment::Reference(reference) => self.link(reference, Section::TopLevel)?,
                Fragment::Literal(_) | Fragment::Placeholder(_) => {}
            }
        }

        span.record("blocks", self.blocks.len());
        span.record("references_bound", self.targets.len());

        let targets = self
            .targets
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| CompileError::internal("reference left unresolved"))?;
        Ok(ResolvedTemplate {
            template,
            blocks: self.blocks,
            targets,
            sites: self.sites,
        })
    }

    fn define(&mut self, block: &'t Block) -> Result<()> {
        self.link_all(&block.subquery, Section::Subquery(block.id))?;

        if self.visible.contains_key(block.name.as_str()) {
            tracing::debug!(
                target: "sqlquerypp.resolve",
                name = %block.name,
                "duplicate combined_result definition"
            );
            return Err(CompileError::DuplicateDefinition {
                name: block.name.clone(),
                offset: block.name_span.offset(),
            });
        }
        if block.id.0 != self.blocks.len() {
            return Err(CompileError::internal(format!(
                "block `${}` has id {} but is definition #{}",
                block.name,
                block.id.0,
                self.blocks.len()
            )));
        }
        self.visible.insert(block.name.as_str(), block.id);
        self.blocks.push(block);
        self.sites.push(Vec::new());

        self.link_all(&block.body, Section::Body(block.id))
    }

    fn link_all(&mut self, fragments: &[Fragment], section: Section) -> Result<()> {
        for fragment in fragments {
            if let Fragment::Reference(reference) = fragment {
                self.link(reference, section)?;
            }
        }
        Ok(())
    }

    fn link(&mut self, reference: &Reference, section: Section) -> Result<()> {
        let Some(&target) = self.visible.get(reference.name.as_str()) else {
            tracing::debug!(
                target: "sqlquerypp.resolve",
                name = %reference.name,
                offset = reference.span.offset(),
                "undefined combined_result reference"
            );
            return Err(CompileError::UndefinedReference {
                name: reference.name.clone(),
                offset: reference.span.offset(),
            });
        };
        let slot = self
            .targets
            .get_mut(reference.id.0)
            .ok_or_else(|| CompileError::internal("reference id out of range"))?;
        *slot = Some(target);
        if let Some(sites) = self.sites.get_mut(target.0) {
            sites.push(section);
        }
        Ok(())
    }
}
