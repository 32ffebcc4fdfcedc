//! Decoded source maps and their recomposition.
//!
//! A `DecodedMap` stores, per generated line, a sorted list of segments. A
//! segment maps its generated column to an original position, and every
//! column after it (up to the next segment) maps linearly from there. That
//! makes each line a piecewise translation, so chaining two maps is plain
//! function composition and the result does not depend on grouping.

use serde::{Deserialize, Serialize};
use sourcemap::{SourceMap, SourceMapBuilder};

use crate::diagnostics::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Original {
    pub source: u32,
    pub line: u32,
    pub column: u32,
    pub name: Option<u32>,
}

impl Original {
    fn shifted(&self, by: u32) -> Original {
        Original {
            column: self.column + by,
            name: if by == 0 { self.name } else { None },
            ..*self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub column: u32,
    /// `None` marks generated text with no counterpart in the source.
    pub original: Option<Original>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedMap {
    pub file: Option<String>,
    pub sources: Vec<String>,
    pub sources_content: Vec<Option<String>>,
    pub names: Vec<String>,
    pub lines: Vec<Vec<Segment>>,
}

/// The unit handed from stage to stage and finally to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescription {
    pub code: String,
    pub map: DecodedMap,
}

impl DecodedMap {
    /// Single-source map with no segments, used as the base of edit fragments.
    pub fn for_source(source: &str) -> Self {
        DecodedMap {
            sources: vec![source.to_string()],
            sources_content: vec![None],
            ..Default::default()
        }
    }

    /// Maps every line of `code` onto itself.
    pub fn identity(source: &str, code: &str) -> Self {
        let mut map = DecodedMap::for_source(source);
        let line_count = code.split('\n').count();
        for line in 0..line_count {
            map.push(
                line as u32,
                Segment {
                    column: 0,
                    original: Some(Original {
                        source: 0,
                        line: line as u32,
                        column: 0,
                        name: None,
                    }),
                },
            );
        }
        map
    }

    pub fn push(&mut self, line: u32, segment: Segment) {
        let line = line as usize;
        if self.lines.len() <= line {
            self.lines.resize_with(line + 1, Vec::new);
        }
        self.lines[line].push(segment);
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|l| l.is_empty())
    }

    /// Original position of a generated position, extrapolating linearly
    /// from the closest segment at or before `column`.
    pub fn lookup(&self, line: u32, column: u32) -> Option<Original> {
        let segments = self.lines.get(line as usize)?;
        let idx = segments.partition_point(|s| s.column <= column);
        if idx == 0 {
            return None;
        }
        let seg = &segments[idx - 1];
        seg.original.map(|o| o.shifted(column - seg.column))
    }

    /// Drops segments that add no information: leading unmapped segments,
    /// repeated unmapped segments, and mapped segments that continue the
    /// previous one linearly.
    pub fn normalize(&mut self) {
        for segments in &mut self.lines {
            segments.sort_by_key(|s| s.column);
            // Later segments at the same column win.
            let mut collapsed: Vec<Segment> = Vec::with_capacity(segments.len());
            for seg in segments.drain(..) {
                match collapsed.last_mut() {
                    Some(last) if last.column == seg.column => *last = seg,
                    _ => collapsed.push(seg),
                }
            }
            let mut kept: Vec<Segment> = Vec::with_capacity(collapsed.len());
            for seg in collapsed {
                let redundant = match (kept.last(), seg.original) {
                    (None, None) => true,
                    (Some(prev), None) => prev.original.is_none(),
                    (Some(prev), Some(cur)) => match prev.original {
                        Some(p) => {
                            cur.name.is_none()
                                && p.source == cur.source
                                && p.line == cur.line
                                && cur.column >= p.column
                                && cur.column - p.column == seg.column - prev.column
                        }
                        None => false,
                    },
                    (None, Some(_)) => false,
                };
                if !redundant {
                    kept.push(seg);
                }
            }
            *segments = kept;
        }
        while self.lines.last().is_some_and(|l| l.is_empty()) {
            self.lines.pop();
        }
    }

    fn intern_name(&mut self, name: &str) -> u32 {
        if let Some(idx) = self.names.iter().position(|n| n == name) {
            return idx as u32;
        }
        self.names.push(name.to_string());
        (self.names.len() - 1) as u32
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // JSON
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn from_json_slice(bytes: &[u8]) -> Result<DecodedMap, PipelineError> {
        let sm = SourceMap::from_slice(bytes)?;
        let mut map = DecodedMap {
            file: sm.get_file().map(|f| f.to_string()),
            ..Default::default()
        };
        for idx in 0..sm.get_source_count() {
            map.sources
                .push(sm.get_source(idx).unwrap_or_default().to_string());
            map.sources_content
                .push(sm.get_source_contents(idx).map(|c| c.to_string()));
        }
        for token in sm.tokens() {
            let original = if token.get_src_id() == !0 {
                None
            } else {
                let name = token.get_name().map(|n| n.to_string());
                Some(Original {
                    source: token.get_src_id(),
                    line: token.get_src_line(),
                    column: token.get_src_col(),
                    name: name.map(|n| map.intern_name(&n)),
                })
            };
            map.push(
                token.get_dst_line(),
                Segment {
                    column: token.get_dst_col(),
                    original,
                },
            );
        }
        Ok(map)
    }

    pub fn to_json(&self) -> Result<String, PipelineError> {
        let mut builder = SourceMapBuilder::new(self.file.as_deref());
        for (idx, source) in self.sources.iter().enumerate() {
            let id = builder.add_source(source);
            if let Some(Some(content)) = self.sources_content.get(idx) {
                builder.set_source_contents(id, Some(content));
            }
        }
        for (line, segments) in self.lines.iter().enumerate() {
            for seg in segments {
                match seg.original {
                    Some(o) => {
                        let source = self.sources.get(o.source as usize).map(|s| s.as_str());
                        let name = o
                            .name
                            .and_then(|n| self.names.get(n as usize))
                            .map(|s| s.as_str());
                        builder.add(
                            line as u32,
                            seg.column,
                            o.line,
                            o.column,
                            source,
                            name,
                            false,
                        );
                    }
                    None => {
                        builder.add(line as u32, seg.column, 0, 0, None, None, false);
                    }
                }
            }
        }
        let mut out = Vec::new();
        builder.into_sourcemap().to_writer(&mut out)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECOMPOSITION
// ═══════════════════════════════════════════════════════════════════════════════

/// Chains `outer` (final → middle) after `inner` (middle → original).
///
/// The result resolves generated positions of `outer` to original positions
/// of `inner`, keeping `inner`'s source table. `inner` describes a single
/// middle file, so outer segments that point into any other source are left
/// unmapped.
pub fn compose(inner: &DecodedMap, outer: &DecodedMap) -> DecodedMap {
    let mut out = DecodedMap {
        file: outer.file.clone().or_else(|| inner.file.clone()),
        sources: inner.sources.clone(),
        sources_content: inner.sources_content.clone(),
        names: inner.names.clone(),
        lines: Vec::with_capacity(outer.lines.len()),
    };

    let mut foreign = 0usize;
    for (gen_line, segments) in outer.lines.iter().enumerate() {
        for (idx, seg) in segments.iter().enumerate() {
            let next_column = segments.get(idx + 1).map(|s| s.column);
            let mid = seg.original.filter(|m| {
                let own = m.source == 0;
                if !own {
                    foreign += 1;
                }
                own
            });
            let Some(mid) = mid else {
                out.push(
                    gen_line as u32,
                    Segment {
                        column: seg.column,
                        original: None,
                    },
                );
                continue;
            };

            let mut first = inner.lookup(mid.line, mid.column);
            let hit_exact_segment = inner
                .lines
                .get(mid.line as usize)
                .is_some_and(|l| l.iter().any(|s| s.column == mid.column));
            if let Some(first) = first.as_mut() {
                if !hit_exact_segment || first.name.is_none() {
                    first.name = mid
                        .name
                        .and_then(|n| outer.names.get(n as usize))
                        .map(|n| out.intern_name(n));
                }
            }
            out.push(
                gen_line as u32,
                Segment {
                    column: seg.column,
                    original: first,
                },
            );

            // Inner breakpoints that fall inside this outer segment's extent.
            let extent = next_column.map(|n| n - seg.column);
            if let Some(inner_segments) = inner.lines.get(mid.line as usize) {
                for inner_seg in inner_segments {
                    if inner_seg.column <= mid.column {
                        continue;
                    }
                    let offset = inner_seg.column - mid.column;
                    if extent.is_some_and(|e| offset >= e) {
                        break;
                    }
                    out.push(
                        gen_line as u32,
                        Segment {
                            column: seg.column + offset,
                            original: inner_seg.original,
                        },
                    );
                }
            }
        }
    }

    if foreign > 0 {
        log::warn!(
            "source map compose: {} segment(s) point outside `{}`, left unmapped",
            foreign,
            outer.sources.first().map(|s| s.as_str()).unwrap_or("<unnamed>")
        );
    }
    out.normalize();
    out
}

/// Chains fragments given in application order (first fragment is closest
/// to the original source).
pub fn recompose(fragments: &[DecodedMap]) -> DecodedMap {
    let Some((first, rest)) = fragments.split_first() else {
        return DecodedMap::default();
    };
    let mut acc = first.clone();
    acc.normalize();
    for fragment in rest {
        acc = compose(&acc, fragment);
    }
    acc
}

#[cfg(test)]
#[path = "mapping_tests.rs"]
mod tests;
