use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTIC CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_CONFIGURATION_CONFLICT: &str = "CN-ERR-CONFIG-001";
pub const ERR_UNSUPPORTED_SYNTAX: &str = "CN-ERR-SYNTAX-001";
pub const ERR_OPTIMIZER_FAILURE: &str = "CN-ERR-OPTIMIZER-001";
pub const ERR_PARSE: &str = "CN-ERR-PARSE-001";
pub const ERR_EDIT_OUT_OF_BOUNDS: &str = "CN-ERR-EDIT-001";
pub const ERR_OVERLAPPING_EDITS: &str = "CN-ERR-EDIT-002";
pub const ERR_PHASE_ORDER: &str = "CN-ERR-PHASE-001";
pub const ERR_IO: &str = "CN-ERR-IO-001";
pub const ERR_SOURCE_MAP: &str = "CN-ERR-MAP-001";
pub const ERR_JSON: &str = "CN-ERR-JSON-001";

pub const WARN_RESTORATION: &str = "CN-WARN-RESTORE-001";
pub const WARN_MANGLE_COLLISION: &str = "CN-WARN-MANGLE-001";

// ═══════════════════════════════════════════════════════════════════════════════
// FATAL ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Every error that aborts a compilation unit.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("configuration conflict: {0}")]
    ConfigurationConflict(String),

    #[error("unsupported syntax `{construct}` at {file}:{line}:{column}")]
    UnsupportedSyntaxForm {
        construct: String,
        file: String,
        line: u32,
        column: u32,
    },

    #[error("optimizer exited with code {exit_code}:\n{stderr}")]
    OptimizerFailure { exit_code: i32, stderr: String },

    #[error("failed to parse output of stage `{stage}`: {message}")]
    Parse { stage: String, message: String },

    #[error("edit range [{start},{end}) exceeds buffer of {len} bytes")]
    EditOutOfBounds { start: u32, end: u32, len: usize },

    #[error("overlapping edits: [{a_start},{a_end}) overlaps [{b_start},{b_end})")]
    OverlappingEdits {
        a_start: u32,
        a_end: u32,
        b_start: u32,
        b_end: u32,
    },

    #[error("cannot run {requested} while unit is {current}")]
    PhaseOrder {
        requested: &'static str,
        current: &'static str,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid source map: {0}")]
    SourceMap(#[from] sourcemap::Error),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::ConfigurationConflict(_) => ERR_CONFIGURATION_CONFLICT,
            PipelineError::UnsupportedSyntaxForm { .. } => ERR_UNSUPPORTED_SYNTAX,
            PipelineError::OptimizerFailure { .. } => ERR_OPTIMIZER_FAILURE,
            PipelineError::Parse { .. } => ERR_PARSE,
            PipelineError::EditOutOfBounds { .. } => ERR_EDIT_OUT_OF_BOUNDS,
            PipelineError::OverlappingEdits { .. } => ERR_OVERLAPPING_EDITS,
            PipelineError::PhaseOrder { .. } => ERR_PHASE_ORDER,
            PipelineError::Io(_) => ERR_IO,
            PipelineError::SourceMap(_) => ERR_SOURCE_MAP,
            PipelineError::Json(_) => ERR_JSON,
        }
    }

    /// Builds an `UnsupportedSyntaxForm` pointing at `offset` inside `code`.
    pub fn unsupported(construct: &str, file: &str, code: &str, offset: u32) -> Self {
        let (line, column) = line_column(code, offset);
        PipelineError::UnsupportedSyntaxForm {
            construct: construct.to_string(),
            file: file.to_string(),
            line,
            column,
        }
    }
}

/// 1-based line and column of a byte offset.
pub fn line_column(code: &str, offset: u32) -> (u32, u32) {
    let offset = (offset as usize).min(code.len());
    let before = &code.as_bytes()[..offset];
    let line = before.iter().filter(|b| **b == b'\n').count() as u32 + 1;
    let line_start = before
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|p| p + 1)
        .unwrap_or(0);
    (line, (offset - line_start) as u32 + 1)
}

// ═══════════════════════════════════════════════════════════════════════════════
// NON-FATAL ANOMALIES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnomalyKind {
    /// A recorded export/import binding was not found in the optimized output.
    RestorationAnomaly,
    /// The same surface name was claimed by two different bindings.
    MangleCollision,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub code: String,
    pub message: String,
}

impl Anomaly {
    pub fn restoration(message: impl Into<String>) -> Self {
        let anomaly = Anomaly {
            kind: AnomalyKind::RestorationAnomaly,
            code: WARN_RESTORATION.to_string(),
            message: message.into(),
        };
        log::warn!("[{}] {}", anomaly.code, anomaly.message);
        anomaly
    }

    pub fn mangle_collision(message: impl Into<String>) -> Self {
        let anomaly = Anomaly {
            kind: AnomalyKind::MangleCollision,
            code: WARN_MANGLE_COLLISION.to_string(),
            message: message.into(),
        };
        log::warn!("[{}] {}", anomaly.code, anomaly.message);
        anomaly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_column_counts_from_one() {
        let code = "let a;\nexport * from './x';";
        assert_eq!(line_column(code, 0), (1, 1));
        assert_eq!(line_column(code, 7), (2, 1));
        assert_eq!(line_column(code, 14), (2, 8));
    }

    #[test]
    fn test_unsupported_carries_location_and_code() {
        let err = PipelineError::unsupported("export *", "entry.js", "\n  export * from 'x'", 3);
        assert_eq!(err.code(), ERR_UNSUPPORTED_SYNTAX);
        match err {
            PipelineError::UnsupportedSyntaxForm { line, column, .. } => {
                assert_eq!((line, column), (2, 3));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
