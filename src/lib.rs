//! # Closure Native
//!
//! Runs an ES module chunk through an external whole-program optimizer
//! without losing what the optimizer does not understand.
//!
//! ## Pipeline
//!
//! 1. **Pre-phase**: stages rewrite module syntax into forms the optimizer
//!    accepts (exports become `window["x"] = x`, imports are lifted out and
//!    their locals mangled) and record what they removed.
//! 2. **Optimize**: the result is staged on disk with one extern file per
//!    contributing stage and handed to the optimizer process.
//! 3. **Post-phase**: stages restore exports, imports, the hashbang and
//!    friends from what the pre-phase recorded.
//!
//! Every applied edit set produces a source map fragment; the fragments and
//! the optimizer's own map are recomposed into one map back to the input.
//!
//! Fatal problems are `PipelineError`s with a stable `CN-ERR-*` code.
//! Problems the output survives are `Anomaly` values and are logged.

#[cfg(feature = "napi")]
use napi_derive::napi;

mod diagnostics;
mod discovery;
mod edit;
mod mangle;
mod mapping;
mod optimizer;
mod options;
mod parse;
mod pipeline;
mod scope;
mod stage;
mod stages;

use serde::Serialize;

pub use diagnostics::{Anomaly, AnomalyKind, PipelineError};
pub use discovery::{discover_module_exports, ClosureKind, ExportBinding};
pub use edit::{apply, Edit, SyntaxRange};
pub use mangle::{Mangler, SharedMangler};
pub use mapping::{compose, recompose, DecodedMap, SourceDescription};
pub use optimizer::{Optimizer, OptimizerRequest, OptimizerResponse, ProcessOptimizer};
pub use options::{CompileOptions, FlagValue, OptimizerCommand, OutputFormat};
pub use pipeline::{
    compile_unit, compile_units, CompiledUnit, TranscriptEntry, Unit, UnitFailure, UnitState,
};
pub use stage::{Stage, StageKind, POST_ORDER, PRE_ORDER};

/// Compiles one unit with the optimizer process configured in `options`.
pub fn compile(
    file_name: &str,
    code: &str,
    options: &CompileOptions,
) -> Result<CompiledUnit, UnitFailure> {
    let optimizer = ProcessOptimizer::new(options.optimizer.clone());
    let mangler = SharedMangler::new(options.salt);
    compile_unit(file_name, code, options, &mangler, &optimizer)
}

/// What the host receives for a finished unit. The map is serialized so the
/// host can hand it straight to its bundler.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    pub code: String,
    pub map: String,
    pub anomalies: Vec<Anomaly>,
    pub transcript: Vec<TranscriptEntry>,
}

impl CompileResult {
    pub fn from_unit(unit: CompiledUnit) -> Result<Self, PipelineError> {
        Ok(CompileResult {
            map: unit.output.map.to_json()?,
            code: unit.output.code,
            anomalies: unit.anomalies,
            transcript: unit.transcript,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE BINDINGS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
fn init_logging() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let env = env_logger::Env::new()
            .filter_or("CLOSURE_NATIVE_LOG", "warn")
            .write_style("CLOSURE_NATIVE_LOG_STYLE");
        let _ = env_logger::Builder::from_env(env).try_init();
    });
}

#[cfg(feature = "napi")]
fn to_napi(err: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(err.to_string())
}

#[cfg(feature = "napi")]
fn options_from(options_json: Option<String>) -> napi::Result<CompileOptions> {
    match options_json {
        Some(json) => {
            CompileOptions::from_json(&json).map_err(|e| to_napi(format!("[{}] {}", e.code(), e)))
        }
        None => Ok(CompileOptions::default()),
    }
}

#[cfg(feature = "napi")]
#[napi]
pub fn compile_native(
    file_name: String,
    code: String,
    options_json: Option<String>,
) -> napi::Result<serde_json::Value> {
    init_logging();
    let options = options_from(options_json)?;
    let unit = compile(&file_name, &code, &options)
        .map_err(|failure| to_napi(format!("[{}] {}", failure.error.code(), failure)))?;
    let result = CompileResult::from_unit(unit).map_err(to_napi)?;
    serde_json::to_value(result).map_err(to_napi)
}

#[cfg(feature = "napi")]
#[napi]
pub fn discover_exports_native(
    file_name: String,
    code: String,
    is_entry: bool,
    salt: Option<u32>,
) -> napi::Result<serde_json::Value> {
    init_logging();
    let mangler = SharedMangler::new(salt.unwrap_or_default() as u64);
    let bindings = discover_module_exports(&file_name, &code, is_entry, &mangler)
        .map_err(|e| to_napi(format!("[{}] {}", e.code(), e)))?;
    serde_json::to_value(bindings).map_err(to_napi)
}

#[cfg(feature = "napi")]
#[napi]
pub fn validate_options_native(options_json: String) -> napi::Result<()> {
    let options = options_from(Some(options_json))?;
    options
        .validate()
        .map_err(|e| to_napi(format!("[{}] {}", e.code(), e)))
}
