//! Text edits against an immutable buffer snapshot.
//!
//! Stages never touch the syntax tree. They describe their rewrite as a list
//! of `Edit`s whose ranges all point into the buffer they were handed, and
//! `apply` produces the next buffer together with the map fragment linking
//! the two.

use oxc_span::Span;
use serde::{Deserialize, Serialize};

use crate::diagnostics::PipelineError;
use crate::mapping::{DecodedMap, Original, Segment};

/// Half-open `[start, end)` byte range into one buffer snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SyntaxRange {
    pub start: u32,
    pub end: u32,
}

impl SyntaxRange {
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "range start after end");
        SyntaxRange { start, end }
    }

    pub fn at(offset: u32) -> Self {
        SyntaxRange::new(offset, offset)
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl From<Span> for SyntaxRange {
    fn from(span: Span) -> Self {
        SyntaxRange::new(span.start, span.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    Remove(SyntaxRange),
    Overwrite(SyntaxRange, String),
    /// Adds content at the end of the buffer.
    Append(String),
    /// Adds content right before `range.start`, leaving the range untouched.
    AppendBefore(SyntaxRange, String),
}

impl Edit {
    pub fn remove(range: impl Into<SyntaxRange>) -> Self {
        Edit::Remove(range.into())
    }

    pub fn overwrite(range: impl Into<SyntaxRange>, content: impl Into<String>) -> Self {
        Edit::Overwrite(range.into(), content.into())
    }

    pub fn append(content: impl Into<String>) -> Self {
        Edit::Append(content.into())
    }

    pub fn append_before(range: impl Into<SyntaxRange>, content: impl Into<String>) -> Self {
        Edit::AppendBefore(range.into(), content.into())
    }
}

/// One normalized operation: replace `[start, end)` with `content`.
struct Op<'e> {
    start: u32,
    end: u32,
    content: &'e str,
    is_insert: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    line: u32,
    column: u32,
}

impl Cursor {
    fn advance(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += ch.len_utf16() as u32;
            }
        }
    }
}

/// Applies `edits` to `buffer`.
///
/// All ranges refer to `buffer`. Insertions at the same offset keep their
/// relative order and land before any range edit starting there.
pub fn apply(
    edits: &[Edit],
    buffer: &str,
    source_name: &str,
) -> Result<(String, DecodedMap), PipelineError> {
    let len = buffer.len();
    let mut ops = Vec::with_capacity(edits.len());
    for edit in edits {
        let op = match edit {
            Edit::Remove(r) => Op {
                start: r.start,
                end: r.end,
                content: "",
                is_insert: false,
            },
            Edit::Overwrite(r, content) => Op {
                start: r.start,
                end: r.end,
                content,
                is_insert: false,
            },
            Edit::Append(content) => Op {
                start: len as u32,
                end: len as u32,
                content,
                is_insert: true,
            },
            Edit::AppendBefore(r, content) => Op {
                start: r.start,
                end: r.start,
                content,
                is_insert: true,
            },
        };
        if op.start > op.end
            || op.end as usize > len
            || !buffer.is_char_boundary(op.start as usize)
            || !buffer.is_char_boundary(op.end as usize)
        {
            return Err(PipelineError::EditOutOfBounds {
                start: op.start,
                end: op.end,
                len,
            });
        }
        ops.push(op);
    }
    ops.sort_by_key(|op| (op.start, !op.is_insert));

    let mut last_range: Option<(u32, u32)> = None;
    for op in &ops {
        if let Some((a_start, a_end)) = last_range {
            if op.start < a_end && !(op.is_insert && op.start == a_start) {
                return Err(PipelineError::OverlappingEdits {
                    a_start,
                    a_end,
                    b_start: op.start,
                    b_end: op.end,
                });
            }
        }
        if !op.is_insert {
            last_range = Some((op.start, op.end));
        }
    }

    let mut out = String::with_capacity(len + 64);
    let mut map = DecodedMap::for_source(source_name);
    let mut gen = Cursor::default();
    let mut orig = Cursor::default();
    let mut pos = 0usize;

    for op in &ops {
        let start = op.start as usize;
        if start > pos {
            copy_chunk(&buffer[pos..start], &mut out, &mut map, &mut gen, &mut orig);
            pos = start;
        }
        emit_inserted(op.content, &mut out, &mut map, &mut gen, orig);
        let end = op.end as usize;
        if end > pos {
            orig.advance(&buffer[pos..end]);
            pos = end;
        }
    }
    if pos < len {
        copy_chunk(&buffer[pos..], &mut out, &mut map, &mut gen, &mut orig);
    }

    map.normalize();
    Ok((out, map))
}

fn mapped(at: Cursor) -> Option<Original> {
    Some(Original {
        source: 0,
        line: at.line,
        column: at.column,
        name: None,
    })
}

fn copy_chunk(
    text: &str,
    out: &mut String,
    map: &mut DecodedMap,
    gen: &mut Cursor,
    orig: &mut Cursor,
) {
    map.push(
        gen.line,
        Segment {
            column: gen.column,
            original: mapped(*orig),
        },
    );
    for (idx, piece) in text.split('\n').enumerate() {
        if idx > 0 {
            out.push('\n');
            gen.line += 1;
            gen.column = 0;
            orig.line += 1;
            orig.column = 0;
            map.push(
                gen.line,
                Segment {
                    column: 0,
                    original: mapped(*orig),
                },
            );
        }
        out.push_str(piece);
        let width: u32 = piece.chars().map(|c| c.len_utf16() as u32).sum();
        gen.column += width;
        orig.column += width;
    }
}

/// Inserted text has no source of its own; every line of it points at the
/// position the edit was anchored to.
fn emit_inserted(text: &str, out: &mut String, map: &mut DecodedMap, gen: &mut Cursor, at: Cursor) {
    if text.is_empty() {
        return;
    }
    map.push(
        gen.line,
        Segment {
            column: gen.column,
            original: mapped(at),
        },
    );
    for (idx, piece) in text.split('\n').enumerate() {
        if idx > 0 {
            out.push('\n');
            gen.line += 1;
            gen.column = 0;
            if !piece.is_empty() {
                map.push(
                    gen.line,
                    Segment {
                        column: 0,
                        original: mapped(at),
                    },
                );
            }
        }
        out.push_str(piece);
        gen.advance(piece);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_edits_reference_input_offsets() {
        let src = "const a = 1; const b = 2;";
        let edits = vec![
            Edit::overwrite(SyntaxRange::new(0, 5), "let"),
            Edit::overwrite(SyntaxRange::new(13, 18), "let"),
            Edit::append("\nwindow['a'] = a;"),
        ];
        let (out, _) = apply(&edits, src, "in.js").unwrap();
        assert_eq!(out, "let a = 1; let b = 2;\nwindow['a'] = a;");
    }

    #[test]
    fn test_append_before_keeps_range() {
        let src = "function f(){}";
        let edits = vec![Edit::append_before(SyntaxRange::new(0, 8), "export ")];
        let (out, map) = apply(&edits, src, "in.js").unwrap();
        assert_eq!(out, "export function f(){}");
        let o = map.lookup(0, 7).unwrap();
        assert_eq!((o.line, o.column), (0, 0));
        let o = map.lookup(0, 16).unwrap();
        assert_eq!((o.line, o.column), (0, 9));
    }

    #[test]
    fn test_remove_shifts_following_lines() {
        let src = "#!/usr/bin/env node\nfoo();\nbar();";
        let edits = vec![Edit::remove(SyntaxRange::new(0, 20))];
        let (out, map) = apply(&edits, src, "in.js").unwrap();
        assert_eq!(out, "foo();\nbar();");
        let o = map.lookup(1, 2).unwrap();
        assert_eq!((o.line, o.column), (2, 2));
    }

    #[test]
    fn test_out_of_bounds_is_error() {
        let err = apply(&[Edit::remove(SyntaxRange::new(2, 40))], "abc", "in.js").unwrap_err();
        assert!(matches!(err, PipelineError::EditOutOfBounds { .. }));
    }

    #[test]
    fn test_overlap_is_error() {
        let edits = vec![
            Edit::remove(SyntaxRange::new(0, 4)),
            Edit::overwrite(SyntaxRange::new(2, 6), "x"),
        ];
        let err = apply(&edits, "abcdefgh", "in.js").unwrap_err();
        assert!(matches!(err, PipelineError::OverlappingEdits { .. }));
    }

    #[test]
    fn test_insert_order_is_preserved() {
        let edits = vec![
            Edit::append_before(SyntaxRange::at(0), "a"),
            Edit::append_before(SyntaxRange::at(0), "b"),
            Edit::remove(SyntaxRange::new(0, 1)),
        ];
        let (out, _) = apply(&edits, "xyz", "in.js").unwrap();
        assert_eq!(out, "abyz");
    }
}
