//! Pipeline Orchestrator
//!
//! Drives one compilation unit through
//! `Idle -> PreStaging -> Optimizing -> PostStaging -> Done`, with `Failed`
//! reachable from every state. Each stage's output buffer is the next
//! stage's input, every step is recorded in a transcript, and every applied
//! edit set contributes a map fragment to the final map.

use rayon::prelude::*;
use serde::Serialize;

use crate::diagnostics::{Anomaly, PipelineError};
use crate::edit::apply;
use crate::mangle::SharedMangler;
use crate::mapping::{recompose, DecodedMap, SourceDescription};
use crate::optimizer::{run_optimizer, Optimized, Optimizer};
use crate::options::CompileOptions;
use crate::stage::{
    extern_file, post_stages, pre_stages, ExternContext, Memory, RewriteFn, StageContext,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UnitState {
    Idle,
    PreStaging,
    Optimizing,
    PostStaging,
    Done,
    Failed,
}

impl UnitState {
    pub fn name(self) -> &'static str {
        match self {
            UnitState::Idle => "idle",
            UnitState::PreStaging => "pre-staging",
            UnitState::Optimizing => "optimizing",
            UnitState::PostStaging => "post-staging",
            UnitState::Done => "done",
            UnitState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub stage: String,
    pub code: String,
}

/// A unit that aborted. `state` is where it was when the error happened.
#[derive(Debug, thiserror::Error)]
#[error("{file_name}: failed while {}: {error}", state.name())]
pub struct UnitFailure {
    pub file_name: String,
    pub state: UnitState,
    #[source]
    pub error: PipelineError,
    pub transcript: Vec<TranscriptEntry>,
}

#[derive(Debug, Clone)]
pub struct CompiledUnit {
    pub file_name: String,
    pub output: SourceDescription,
    pub anomalies: Vec<Anomaly>,
    pub transcript: Vec<TranscriptEntry>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// UNIT
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Unit<'o> {
    file_name: String,
    options: &'o CompileOptions,
    mangler: SharedMangler,
    memory: Memory,
    anomalies: Vec<Anomaly>,
    state: UnitState,
    failed_in: Option<UnitState>,
    transcript: Vec<TranscriptEntry>,
    fragments: Vec<DecodedMap>,
    original: String,
}

impl<'o> Unit<'o> {
    /// The unit reports mangle collisions only for its own calls, even when
    /// `mangler` is shared with other units.
    pub fn new(file_name: &str, options: &'o CompileOptions, mangler: &SharedMangler) -> Self {
        Unit {
            file_name: file_name.to_string(),
            options,
            mangler: mangler.for_unit(),
            memory: Memory::default(),
            anomalies: Vec::new(),
            state: UnitState::Idle,
            failed_in: None,
            transcript: Vec::new(),
            fragments: Vec::new(),
            original: String::new(),
        }
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    /// The state a failed unit was in when its error happened.
    pub fn failed_in(&self) -> Option<UnitState> {
        self.failed_in
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    fn enter(&mut self, expected: UnitState, next: UnitState) -> Result<(), PipelineError> {
        if self.state != expected {
            return Err(PipelineError::PhaseOrder {
                requested: next.name(),
                current: self.state.name(),
            });
        }
        self.state = next;
        Ok(())
    }

    fn record(&mut self, stage: String, code: &str) {
        self.transcript.push(TranscriptEntry {
            stage,
            code: code.to_string(),
        });
    }

    /// Runs one rewrite and applies its edits.
    fn run_rewrite(
        &mut self,
        label: String,
        rewrite: RewriteFn,
        code: String,
    ) -> Result<String, PipelineError> {
        let mut ctx = StageContext {
            file_name: &self.file_name,
            options: self.options,
            mangler: &self.mangler,
            memory: &mut self.memory,
            anomalies: &mut self.anomalies,
        };
        let edits = rewrite(&code, &mut ctx)?;
        if edits.is_empty() {
            self.record(label, &code);
            return Ok(code);
        }
        let (next, fragment) = apply(&edits, &code, &self.file_name)?;
        log::debug!(
            "{}: {} applied {} edit(s), {} -> {} bytes",
            self.file_name,
            label,
            edits.len(),
            code.len(),
            next.len()
        );
        self.fragments.push(fragment);
        self.record(label, &next);
        Ok(next)
    }

    fn collect_mangle_anomalies(&mut self) {
        let anomalies = self.mangler.take_anomalies();
        self.anomalies.extend(anomalies);
    }

    fn current_map(&self) -> DecodedMap {
        let mut map = recompose(&self.fragments);
        map.file = Some(self.file_name.clone());
        if let Some(content) = map.sources_content.first_mut() {
            *content = Some(self.original.clone());
        }
        map
    }

    fn guarded<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        let result = f(self);
        if result.is_err() {
            self.failed_in = Some(self.state);
            self.state = UnitState::Failed;
        }
        result
    }

    /// Makes `code` acceptable to the optimizer.
    pub fn pre_phase(&mut self, code: &str) -> Result<SourceDescription, PipelineError> {
        self.enter(UnitState::Idle, UnitState::PreStaging)?;
        self.guarded(|unit| {
            unit.options.validate()?;
            unit.original = code.to_string();
            unit.fragments.push(DecodedMap::identity(&unit.file_name, code));
            unit.record("input".to_string(), code);

            let mut buffer = code.to_string();
            for stage in pre_stages() {
                if let Some(pre) = stage.pre {
                    buffer = unit.run_rewrite(format!("pre:{}", stage.kind.name()), pre, buffer)?;
                }
            }
            unit.collect_mangle_anomalies();
            Ok(SourceDescription {
                map: unit.current_map(),
                code: buffer,
            })
        })
    }

    /// Extern files for the optimizer request: `(stage name, content)`, one
    /// per stage that has something to declare. Only meaningful once the
    /// pre-phase has filled `Memory`.
    pub fn externs(&self) -> Vec<(String, String)> {
        let ctx = ExternContext {
            options: self.options,
            memory: &self.memory,
        };
        pre_stages()
            .filter_map(|stage| {
                let externs = stage.externs?;
                externs(&ctx).map(|body| (stage.kind.name().to_string(), extern_file(&body)))
            })
            .collect()
    }

    /// Hands the pre-phase output to the optimizer.
    pub fn optimize(
        &mut self,
        code: &str,
        optimizer: &dyn Optimizer,
    ) -> Result<Optimized, PipelineError> {
        self.enter(UnitState::PreStaging, UnitState::Optimizing)?;
        self.guarded(|unit| {
            let externs = unit.externs();
            let optimized = run_optimizer(optimizer, code, &externs, unit.options.optimizer_flags())?;
            unit.record("optimizer".to_string(), &optimized.code);
            Ok(optimized)
        })
    }

    /// Restores what the optimizer could not preserve. `optimizer_map` maps
    /// `code` back to the pre-phase output.
    pub fn post_phase(
        &mut self,
        code: &str,
        optimizer_map: Option<DecodedMap>,
    ) -> Result<SourceDescription, PipelineError> {
        self.enter(UnitState::Optimizing, UnitState::PostStaging)?;
        self.guarded(|unit| {
            unit.fragments.push(optimizer_map.unwrap_or_default());

            let mut buffer = code.to_string();
            for stage in post_stages() {
                if let Some(post) = stage.post {
                    buffer = unit.run_rewrite(format!("post:{}", stage.kind.name()), post, buffer)?;
                }
            }
            unit.collect_mangle_anomalies();
            unit.state = UnitState::Done;
            Ok(SourceDescription {
                map: unit.current_map(),
                code: buffer,
            })
        })
    }

    fn into_failure(self, error: PipelineError) -> UnitFailure {
        UnitFailure {
            state: self.failed_in.unwrap_or(self.state),
            file_name: self.file_name,
            error,
            transcript: self.transcript,
        }
    }
}

fn drive(
    unit: &mut Unit<'_>,
    code: &str,
    optimizer: &dyn Optimizer,
) -> Result<SourceDescription, PipelineError> {
    let pre = unit.pre_phase(code)?;
    let optimized = unit.optimize(&pre.code, optimizer)?;
    unit.post_phase(&optimized.code, optimized.map)
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Runs one unit end to end.
pub fn compile_unit(
    file_name: &str,
    code: &str,
    options: &CompileOptions,
    mangler: &SharedMangler,
    optimizer: &dyn Optimizer,
) -> Result<CompiledUnit, UnitFailure> {
    log::info!("{}: compiling {} bytes", file_name, code.len());
    let mut unit = Unit::new(file_name, options, mangler);

    match drive(&mut unit, code, optimizer) {
        Ok(output) => {
            log::info!(
                "{}: done, {} bytes, {} anomaly(ies)",
                file_name,
                output.code.len(),
                unit.anomalies.len()
            );
            Ok(CompiledUnit {
                file_name: file_name.to_string(),
                output,
                anomalies: unit.anomalies,
                transcript: unit.transcript,
            })
        }
        Err(error) => {
            let failure = unit.into_failure(error);
            log::info!("{}", failure);
            Err(failure)
        }
    }
}

/// Compiles independent units in parallel. All of them share one mangler so
/// an origin gets the same id in every unit.
pub fn compile_units(
    units: &[(String, String)],
    options: &CompileOptions,
    optimizer: &dyn Optimizer,
) -> Vec<Result<CompiledUnit, UnitFailure>> {
    let mangler = SharedMangler::new(options.salt);
    units
        .par_iter()
        .map(|(file_name, code)| compile_unit(file_name, code, options, &mangler, optimizer))
        .collect()
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
