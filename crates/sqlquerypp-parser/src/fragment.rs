//! Fragment tree produced by the parser.
//!
//! A template is an ordered sequence of fragments. Blocks appear only at the
//! top level; their subquery and body are flat sequences of literals,
//! placeholders and references.

use sqlquerypp_types::Span;

/// Index of a block in definition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

/// Index of a reference in template order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferenceId(pub usize);

/// One element of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Literal(Literal),
    Placeholder(Placeholder),
    Block(Block),
    Reference(Reference),
}

impl Fragment {
    /// Source span of this fragment.
    #[must_use]
    pub const fn span(&self) -> Span {
        match self {
            Self::Literal(l) => l.span,
            Self::Placeholder(p) => p.span,
            Self::Block(b) => b.span,
            Self::Reference(r) => r.span,
        }
    }
}

/// Verbatim SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    pub text: String,
    pub span: Span,
}

/// A `%s`. `index` is its position among all placeholders of the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder {
    pub index: usize,
    pub span: Span,
}

/// A `$name` use site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub id: ReferenceId,
    pub name: String,
    pub span: Span,
}

/// A `combined_result (<subquery>) AS $name { <body> }` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: BlockId,
    pub name: String,
    /// Span of `$name` in the header.
    pub name_span: Span,
    /// Span of the whole block, keyword to closing brace.
    pub span: Span,
    pub subquery: Vec<Fragment>,
    pub body: Vec<Fragment>,
}

impl Block {
    /// Placeholders of the defining subquery, in order.
    pub fn subquery_placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        placeholders(&self.subquery)
    }

    /// Placeholders of the body, in order.
    pub fn body_placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        placeholders(&self.body)
    }
}

fn placeholders(fragments: &[Fragment]) -> impl Iterator<Item = &Placeholder> {
    fragments.iter().filter_map(|f| match f {
        Fragment::Placeholder(p) => Some(p),
        _ => None,
    })
}

/// Where a fragment sits relative to the blocks of its template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    /// Outside every block.
    TopLevel,
    /// Inside the defining subquery of the block.
    Subquery(BlockId),
    /// Inside the body of the block.
    Body(BlockId),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub fragments: Vec<Fragment>,
    pub placeholder_count: usize,
    pub reference_count: usize,
}

impl Template {
    /// Top-level blocks in definition order. `blocks().nth(i)` has `BlockId(i)`.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.fragments.iter().filter_map(|f| match f {
            Fragment::Block(b) => Some(b),
            _ => None,
        })
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks().count()
    }

    /// Visit every non-block fragment together with the section it sits in,
    /// in template order.
    pub fn walk(&self, mut visit: impl FnMut(&Fragment, Section)) {
        for fragment in &self.fragments {
            match fragment {
                Fragment::Block(block) => {
                    for f in &block.subquery {
                        visit(f, Section::Subquery(block.id));
                    }
                    for f in &block.body {
                        visit(f, Section::Body(block.id));
                    }
                }
                other => visit(other, Section::TopLevel),
            }
        }
    }

    /// The section of every placeholder, indexed by placeholder index.
    #[must_use]
    pub fn placeholder_sections(&self) -> Vec<Section> {
        let mut sections = vec![Section::TopLevel; self.placeholder_count];
        self.walk(|fragment, section| {
            if let Fragment::Placeholder(p) = fragment {
                if let Some(slot) = sections.get_mut(p.index) {
                    *slot = section;
                }
            }
        });
        sections
    }
}
