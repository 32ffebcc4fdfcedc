//! Stage Library
//!
//! One module per stage. Every rewrite function has the `RewriteFn` shape
//! and returns edits against the buffer it was given.

pub mod computed_keys;
pub mod declarations;
pub mod exports;
pub mod hashbang;
pub mod imports;
pub mod semicolons;
pub mod strict;
pub mod wrapper;

use oxc_span::Span;

use crate::edit::SyntaxRange;

/// Range of a whole statement plus the line break that ends it, so removing
/// it does not leave a blank line behind.
pub(crate) fn statement_line(code: &str, span: Span) -> SyntaxRange {
    let bytes = code.as_bytes();
    let mut end = span.end as usize;
    if bytes.get(end) == Some(&b'\r') && bytes.get(end + 1) == Some(&b'\n') {
        end += 2;
    } else if bytes.get(end) == Some(&b'\n') {
        end += 1;
    }
    SyntaxRange::new(span.start, end as u32)
}
