//! The contract every pipeline stage follows.
//!
//! A stage is a plain descriptor holding up to three function values. A
//! missing phase is a no-op. Stages compute edits against the buffer they are
//! handed; the orchestrator applies them and records the map fragment.

use crate::diagnostics::{Anomaly, PipelineError};
use crate::discovery::ExportRegistry;
use crate::edit::Edit;
use crate::mangle::SharedMangler;
use crate::options::CompileOptions;
use crate::stages;

/// Imports lifted out of the unit before optimization.
#[derive(Debug, Clone, Default)]
pub struct ImportRegistry {
    /// `(origin, verbatim text)` in first-seen order, one entry per origin.
    pub retained: Vec<(String, String)>,
    /// Surface names given to imported locals, in registration order.
    pub mangled: Vec<String>,
    /// Stand-in for `import(...)`, when the unit uses it.
    pub dynamic_import: Option<String>,
}

impl ImportRegistry {
    pub fn retain(&mut self, origin: &str, text: &str) {
        match self.retained.iter_mut().find(|(o, _)| o == origin) {
            Some((_, existing)) => {
                existing.push('\n');
                existing.push_str(text);
            }
            None => self.retained.push((origin.to_string(), text.to_string())),
        }
    }

    pub fn is_mangled(&self, name: &str) -> bool {
        self.mangled.iter().any(|m| m == name)
    }
}

/// Scratch state that survives from the pre-phase to the post-phase of one
/// compilation unit. Never shared between units.
#[derive(Debug, Clone, Default)]
pub struct Memory {
    pub hashbang: Option<String>,
    pub exports: ExportRegistry,
    pub imports: ImportRegistry,
}

pub struct StageContext<'a> {
    pub file_name: &'a str,
    pub options: &'a CompileOptions,
    pub mangler: &'a SharedMangler,
    pub memory: &'a mut Memory,
    pub anomalies: &'a mut Vec<Anomaly>,
}

impl StageContext<'_> {
    pub fn warn(&mut self, anomaly: Anomaly) {
        self.anomalies.push(anomaly);
    }
}

/// Read-only view used to generate extern stubs once the pre-phase is done.
pub struct ExternContext<'a> {
    pub options: &'a CompileOptions,
    pub memory: &'a Memory,
}

pub type ExternFn = for<'a, 'b> fn(&'b ExternContext<'a>) -> Option<String>;
pub type RewriteFn = for<'a, 'b> fn(&str, &'b mut StageContext<'a>) -> Result<Vec<Edit>, PipelineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Hashbang,
    Declarations,
    WrapperName,
    Exports,
    Imports,
    ComputedKeys,
    StrictDirective,
    TrailingSemicolons,
}

impl StageKind {
    pub fn name(self) -> &'static str {
        match self {
            StageKind::Hashbang => "hashbang",
            StageKind::Declarations => "declarations",
            StageKind::WrapperName => "wrapper-name",
            StageKind::Exports => "exports",
            StageKind::Imports => "imports",
            StageKind::ComputedKeys => "computed-keys",
            StageKind::StrictDirective => "strict-directive",
            StageKind::TrailingSemicolons => "trailing-semicolons",
        }
    }

    pub fn descriptor(self) -> Stage {
        match self {
            StageKind::Hashbang => Stage {
                kind: self,
                externs: None,
                pre: Some(stages::hashbang::extract),
                post: Some(stages::hashbang::reinsert),
            },
            StageKind::Declarations => Stage {
                kind: self,
                externs: None,
                pre: Some(stages::declarations::normalize),
                post: None,
            },
            StageKind::WrapperName => Stage {
                kind: self,
                externs: Some(stages::wrapper::externs),
                pre: None,
                post: None,
            },
            StageKind::Exports => Stage {
                kind: self,
                externs: Some(stages::exports::externs),
                pre: Some(stages::exports::preserve),
                post: Some(stages::exports::restore),
            },
            StageKind::Imports => Stage {
                kind: self,
                externs: Some(stages::imports::externs),
                pre: Some(stages::imports::preserve),
                post: Some(stages::imports::restore),
            },
            StageKind::ComputedKeys => Stage {
                kind: self,
                externs: None,
                pre: None,
                post: Some(stages::computed_keys::normalize),
            },
            StageKind::StrictDirective => Stage {
                kind: self,
                externs: None,
                pre: None,
                post: Some(stages::strict::strip),
            },
            StageKind::TrailingSemicolons => Stage {
                kind: self,
                externs: None,
                pre: None,
                post: Some(stages::semicolons::cleanup),
            },
        }
    }
}

#[derive(Clone, Copy)]
pub struct Stage {
    pub kind: StageKind,
    pub externs: Option<ExternFn>,
    pub pre: Option<RewriteFn>,
    pub post: Option<RewriteFn>,
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("kind", &self.kind)
            .field("externs", &self.externs.is_some())
            .field("pre", &self.pre.is_some())
            .field("post", &self.post.is_some())
            .finish()
    }
}

/// Pre-phase order. Hashbang extraction must come before anything parses,
/// and every extern-producing stage runs before the request is assembled.
pub const PRE_ORDER: [StageKind; 8] = [
    StageKind::Hashbang,
    StageKind::Declarations,
    StageKind::WrapperName,
    StageKind::Exports,
    StageKind::Imports,
    StageKind::ComputedKeys,
    StageKind::StrictDirective,
    StageKind::TrailingSemicolons,
];

/// Post-phase order. The directive must be stripped while it is still the
/// first statement, imports are prepended after exports are restored, and
/// the hashbang goes back on last.
pub const POST_ORDER: [StageKind; 8] = [
    StageKind::StrictDirective,
    StageKind::Exports,
    StageKind::Imports,
    StageKind::ComputedKeys,
    StageKind::TrailingSemicolons,
    StageKind::Declarations,
    StageKind::WrapperName,
    StageKind::Hashbang,
];

pub fn pre_stages() -> impl Iterator<Item = Stage> {
    PRE_ORDER.into_iter().map(StageKind::descriptor)
}

pub fn post_stages() -> impl Iterator<Item = Stage> {
    POST_ORDER.into_iter().map(StageKind::descriptor)
}

pub const EXTERN_HEADER: &str = "/**
 * @fileoverview Externs built from the bundle configuration and the unit's
 * import/export surface. Names declared here are never renamed.
 * @externs
 */
";

/// Wraps a stage's stub declarations in the fixed extern header.
pub fn extern_file(body: &str) -> String {
    format!("{}\n{}\n", EXTERN_HEADER, body.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_stage_runs_once_per_phase() {
        let pre: HashSet<_> = PRE_ORDER.iter().collect();
        let post: HashSet<_> = POST_ORDER.iter().collect();
        assert_eq!(pre.len(), PRE_ORDER.len());
        assert_eq!(post.len(), POST_ORDER.len());
        assert_eq!(pre, post);
    }

    #[test]
    fn test_hashbang_brackets_both_phases() {
        assert_eq!(PRE_ORDER[0], StageKind::Hashbang);
        assert_eq!(POST_ORDER[POST_ORDER.len() - 1], StageKind::Hashbang);
    }

    #[test]
    fn test_missing_phases_are_explicit() {
        let wrapper = StageKind::WrapperName.descriptor();
        assert!(wrapper.externs.is_some());
        assert!(wrapper.pre.is_none() && wrapper.post.is_none());
        let strict = StageKind::StrictDirective.descriptor();
        assert!(strict.pre.is_none() && strict.post.is_some());
    }

    #[test]
    fn test_import_registry_groups_by_origin() {
        let mut reg = ImportRegistry::default();
        reg.retain("lodash", "import a from 'lodash';");
        reg.retain("react", "import R from 'react';");
        reg.retain("lodash", "import { b } from 'lodash';");
        assert_eq!(reg.retained.len(), 2);
        assert_eq!(reg.retained[0].1, "import a from 'lodash';\nimport { b } from 'lodash';");
    }

    #[test]
    fn test_extern_file_has_header() {
        let file = extern_file("function foo(){};\n");
        assert!(file.starts_with("/**"));
        assert!(file.contains("@externs"));
        assert!(file.ends_with("function foo(){};\n"));
    }
}
