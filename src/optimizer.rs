//! External Optimizer Adapter
//!
//! The optimizer is a black box: it reads an input file plus extern files,
//! writes optimized code to stdout and its own source map to a file. This
//! module stages that request on disk and reads the response back.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

use crate::diagnostics::PipelineError;
use crate::mapping::DecodedMap;
use crate::options::{FlagValue, OptimizerCommand};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizerRequest {
    pub input_file: PathBuf,
    pub extern_files: Vec<PathBuf>,
    pub source_map_output_file: PathBuf,
    pub flags: BTreeMap<String, FlagValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizerResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

pub trait Optimizer: Sync {
    fn run(&self, request: &OptimizerRequest) -> Result<OptimizerResponse, PipelineError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROCESS OPTIMIZER
// ═══════════════════════════════════════════════════════════════════════════════

/// Runs the optimizer as a child process and waits for it.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptimizer {
    command: OptimizerCommand,
}

impl ProcessOptimizer {
    pub fn new(command: OptimizerCommand) -> Self {
        ProcessOptimizer { command }
    }

    /// Request arguments, after the configured base arguments.
    pub fn arguments(&self, request: &OptimizerRequest) -> Vec<String> {
        let mut args = self.command.args.clone();
        args.push("--js".to_string());
        args.push(request.input_file.display().to_string());
        for externs in &request.extern_files {
            args.push("--externs".to_string());
            args.push(externs.display().to_string());
        }
        args.push("--create_source_map".to_string());
        args.push(request.source_map_output_file.display().to_string());
        for (name, value) in &request.flags {
            args.extend(value.to_args(name));
        }
        args
    }
}

impl Optimizer for ProcessOptimizer {
    fn run(&self, request: &OptimizerRequest) -> Result<OptimizerResponse, PipelineError> {
        let args = self.arguments(request);
        log::debug!("spawning {} {}", self.command.program, args.join(" "));
        let output = Command::new(&self.command.program).args(&args).output()?;
        Ok(OptimizerResponse {
            // Killed by a signal: no code, report it as a failure.
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST STAGING
// ═══════════════════════════════════════════════════════════════════════════════

/// A request whose files live in a temporary directory. The directory is
/// removed when this value is dropped.
#[derive(Debug)]
pub struct StagedRequest {
    dir: TempDir,
    pub request: OptimizerRequest,
}

impl StagedRequest {
    pub fn dir(&self) -> &std::path::Path {
        self.dir.path()
    }

    /// The optimizer's own map, if it wrote one.
    pub fn read_map(&self) -> Result<Option<DecodedMap>, PipelineError> {
        let path = &self.request.source_map_output_file;
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(None);
        }
        Ok(Some(DecodedMap::from_json_slice(&bytes)?))
    }
}

/// Writes the input and one extern file per contributing stage.
pub fn stage_request(
    code: &str,
    externs: &[(String, String)],
    flags: BTreeMap<String, FlagValue>,
) -> Result<StagedRequest, PipelineError> {
    let dir = tempfile::Builder::new().prefix("closure-native-").tempdir()?;

    let input_file = dir.path().join("input.js");
    fs::write(&input_file, code)?;

    let mut extern_files = Vec::with_capacity(externs.len());
    for (stage, content) in externs {
        let path = dir.path().join(format!("externs-{}.js", stage));
        fs::write(&path, content)?;
        extern_files.push(path);
    }

    let source_map_output_file = dir.path().join("output.js.map");
    Ok(StagedRequest {
        dir,
        request: OptimizerRequest {
            input_file,
            extern_files,
            source_map_output_file,
            flags,
        },
    })
}

/// Optimized code plus the optimizer's map.
#[derive(Debug, Clone)]
pub struct Optimized {
    pub code: String,
    pub map: Option<DecodedMap>,
}

/// Stages, runs and reads back one optimizer invocation. A non-zero exit is
/// final; nothing is retried.
pub fn run_optimizer(
    optimizer: &dyn Optimizer,
    code: &str,
    externs: &[(String, String)],
    flags: BTreeMap<String, FlagValue>,
) -> Result<Optimized, PipelineError> {
    let staged = stage_request(code, externs, flags)?;
    let response = optimizer.run(&staged.request)?;
    if response.exit_code != 0 {
        return Err(PipelineError::OptimizerFailure {
            exit_code: response.exit_code,
            stderr: response.stderr,
        });
    }
    if !response.stderr.trim().is_empty() {
        log::debug!("optimizer diagnostics:\n{}", response.stderr.trim_end());
    }
    let map = staged.read_map()?;
    if map.is_none() {
        log::warn!("optimizer wrote no source map; its step is left unmapped");
    }
    Ok(Optimized {
        code: response.stdout,
        map,
    })
}
