// Block bodies as text sqlparser can read.
//
// Every `%s` becomes a bare identifier `__sqlquerypp_<n>_` and every `$name`
// the scalar subquery `(SELECT __sqlquerypp_<n>_)`, so both can stand
// wherever an expression may. SQL printed back from the parsed tree still
// carries these markers; `emit` turns them into the fragments they replaced.

use memchr::memmem;
use sqlquerypp_error::{CompileError, Result};
use sqlquerypp_parser::Fragment;

use crate::emit::{Emitter, Piece, Substitution};

const SLOT_PREFIX: &str = "__sqlquerypp_";
const REFERENCE_OPEN: &str = "(SELECT ";

fn slot_name(index: usize) -> String {
    format!("{SLOT_PREFIX}{index}_")
}

/// A piece of printed SQL: plain text, or the fragment a marker stands for.
#[derive(Debug, Clone, Copy)]
enum Segment<'t, 'f> {
    Text(&'t str),
    Slot(Piece<'f>),
}

#[derive(Debug)]
pub(crate) struct SlottedSql<'f> {
    pub sql: String,
    slots: Vec<Piece<'f>>,
}

impl<'f> SlottedSql<'f> {
    pub fn new(fragments: &'f [Fragment]) -> std::result::Result<Self, String> {
        let mut sql = String::new();
        let mut slots = Vec::new();
        for fragment in fragments {
            match fragment {
                Fragment::Literal(lit) => {
                    if memmem::find(lit.text.as_bytes(), SLOT_PREFIX.as_bytes()).is_some() {
                        return Err(format!("`{SLOT_PREFIX}` is reserved in block bodies"));
                    }
                    sql.push_str(&lit.text);
                }
                Fragment::Placeholder(p) => {
                    sql.push_str(&slot_name(slots.len()));
                    slots.push(Piece::Placeholder(p));
                }
                Fragment::Reference(r) => {
                    sql.push_str(REFERENCE_OPEN);
                    sql.push_str(&slot_name(slots.len()));
                    sql.push(')');
                    slots.push(Piece::Reference(r));
                }
                Fragment::Block(b) => return Err(format!("nested block `${}`", b.name)),
            }
        }
        Ok(Self { sql, slots })
    }

    /// Indices of placeholder slots whose marker does not occur in `text`.
    pub fn placeholders_missing_from(&self, text: &str) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, piece)| matches!(piece, Piece::Placeholder(_)))
            .filter(|&(index, _)| !text.contains(&slot_name(index)))
            .map(|(index, _)| index)
            .collect()
    }

    /// Whether `text` contains any marker.
    pub fn has_slot(text: &str) -> bool {
        memmem::find(text.as_bytes(), SLOT_PREFIX.as_bytes()).is_some()
    }

    /// The block name, if `query` is exactly a printed reference marker
    /// (without its parentheses).
    pub fn reference_name(&self, query: &str) -> Option<&'f str> {
        let index = query
            .strip_prefix(REFERENCE_OPEN)?
            .strip_prefix(SLOT_PREFIX)?
            .strip_suffix('_')?
            .parse::<usize>()
            .ok()?;
        match self.slots.get(index)? {
            Piece::Reference(r) => Some(r.name.as_str()),
            Piece::Placeholder(_) | Piece::Text(_) => None,
        }
    }

    /// Emit printed SQL, turning markers back into their fragments.
    pub fn emit(&self, out: &mut Emitter<'_>, text: &str, local: Option<&Substitution>) -> Result<()> {
        for segment in self.segments(text)? {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Slot(piece) => out.emit_piece(piece, local)?,
            }
        }
        Ok(())
    }

    /// Printed SQL the way it reads in the template, for error messages.
    pub fn describe(&self, text: &str) -> String {
        let Ok(segments) = self.segments(text) else {
            return text.to_owned();
        };
        segments
            .into_iter()
            .map(|segment| match segment {
                Segment::Text(text) => text.to_owned(),
                Segment::Slot(Piece::Placeholder(_)) => "%s".to_owned(),
                Segment::Slot(Piece::Reference(r)) => format!("${}", r.name),
                Segment::Slot(Piece::Text(text)) => text.to_owned(),
            })
            .collect()
    }

    fn segments<'t>(&self, text: &'t str) -> Result<Vec<Segment<'t, 'f>>> {
        let malformed = || CompileError::internal(format!("malformed slot marker in `{text}`"));
        let finder = memmem::Finder::new(SLOT_PREFIX);
        let mut segments = Vec::new();
        let mut rest = text;
        while let Some(at) = finder.find(rest.as_bytes()) {
            let after = &rest[at + SLOT_PREFIX.len()..];
            let digits = after.bytes().take_while(u8::is_ascii_digit).count();
            let index: usize = after[..digits].parse().map_err(|_| malformed())?;
            let tail = after[digits..].strip_prefix('_').ok_or_else(malformed)?;
            let piece = self.slots.get(index).copied().ok_or_else(malformed)?;
            let (head, tail) = match piece {
                Piece::Reference(_) => (
                    rest[..at].strip_suffix(REFERENCE_OPEN).ok_or_else(malformed)?,
                    tail.strip_prefix(')').ok_or_else(malformed)?,
                ),
                Piece::Placeholder(_) | Piece::Text(_) => (&rest[..at], tail),
            };
            if !head.is_empty() {
                segments.push(Segment::Text(head));
            }
            segments.push(Segment::Slot(piece));
            rest = tail;
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest));
        }
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlquerypp_parser::parse_template;

    fn body(inner: &str) -> Vec<Fragment> {
        let src = format!("combined_result (SELECT 1) AS $ids {{ {inner} }}");
        let template = parse_template(&src).expect("parses");
        template.blocks().next().expect("one block").body.clone()
    }

    #[test]
    fn test_markers_replace_fragments() {
        let fragments = body("SELECT t.a FROM t WHERE t.b = %s AND t.a = $ids AND t.c = 'x%s'");
        let slotted = SlottedSql::new(&fragments).expect("slots");
        assert_eq!(
            slotted.sql,
            "SELECT t.a FROM t WHERE t.b = __sqlquerypp_0_ AND t.a = (SELECT __sqlquerypp_1_) \
             AND t.c = 'x__sqlquerypp_2_'"
        );
        assert_eq!(slotted.reference_name("SELECT __sqlquerypp_1_"), Some("ids"));
        assert_eq!(slotted.reference_name("SELECT __sqlquerypp_0_"), None);
        assert_eq!(
            slotted.describe(&slotted.sql),
            "SELECT t.a FROM t WHERE t.b = %s AND t.a = $ids AND t.c = 'x%s'"
        );
    }

    #[test]
    fn test_placeholders_missing_from_printed_sql() {
        let fragments = body("SELECT t.a FROM t /* %s */ WHERE t.b = %s");
        let slotted = SlottedSql::new(&fragments).expect("slots");
        assert_eq!(
            slotted.placeholders_missing_from("SELECT t.a FROM t WHERE t.b = __sqlquerypp_1_"),
            vec![0]
        );
        assert!(SlottedSql::has_slot("x__sqlquerypp_3_y"));
        assert!(!SlottedSql::has_slot("t.a"));
    }

    #[test]
    fn test_reserved_prefix_rejected() {
        let fragments = body("SELECT t.__sqlquerypp_0_ FROM t");
        assert!(SlottedSql::new(&fragments).is_err());
    }
}
