//! Front end of the sqlquerypp compiler: tokenizer, fragment-tree parser and
//! reference resolver.

pub mod fragment;
pub mod lexer;
pub mod parser;
pub mod resolve;
pub mod token;

pub use fragment::{
    Block, BlockId, Fragment, Literal, Placeholder, Reference, ReferenceId, Section, Template,
};
pub use lexer::Lexer;
pub use parser::{Parser, parse_template};
pub use resolve::{ReferenceCounts, ResolvedTemplate, resolve};
pub use token::{Token, TokenKind};
