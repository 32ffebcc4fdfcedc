use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::diagnostics::PipelineError;

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT FORMAT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Es,
    Cjs,
    Iife,
    Umd,
    Amd,
    System,
}

impl OutputFormat {
    /// Formats whose output keeps module syntax.
    pub fn is_module(self) -> bool {
        matches!(self, OutputFormat::Es)
    }

    /// Formats where the runtime already evaluates code in strict mode.
    pub fn implies_strict(self) -> bool {
        matches!(self, OutputFormat::Es)
    }

    /// Formats that wrap the chunk in one named global.
    pub fn has_global_wrapper(self) -> bool {
        matches!(self, OutputFormat::Iife | OutputFormat::Umd)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIMIZER FLAGS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Switch(bool),
    Value(String),
    Repeated(Vec<String>),
}

impl FlagValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FlagValue::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Command line form: `--name=value`, `--name` for a set switch, one
    /// occurrence per entry for repeated values.
    pub fn to_args(&self, name: &str) -> Vec<String> {
        match self {
            FlagValue::Switch(true) => vec![format!("--{}", name)],
            FlagValue::Switch(false) => vec![],
            FlagValue::Value(v) => vec![format!("--{}={}", name, v)],
            FlagValue::Repeated(vs) => vs.iter().map(|v| format!("--{}={}", name, v)).collect(),
        }
    }
}

pub const FLAG_LANGUAGE_OUT: &str = "language_out";
pub const FLAG_WARNING_LEVEL: &str = "warning_level";
pub const FLAG_MODULE_RESOLUTION: &str = "module_resolution";
pub const FLAG_ASSUME_FUNCTION_WRAPPER: &str = "assume_function_wrapper";

/// Flags the adapter sets from the staged request.
pub const RESERVED_FLAGS: [&str; 3] = ["js", "externs", "create_source_map"];

const NO_TRANSPILE: &str = "NO_TRANSPILE";
const VERBOSE: &str = "VERBOSE";

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILE OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for OptimizerCommand {
    fn default() -> Self {
        OptimizerCommand {
            program: "google-closure-compiler".to_string(),
            args: vec![],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOptions {
    #[serde(default)]
    pub format: OutputFormat,
    /// Global name of the wrapper for iife/umd output.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub flags: BTreeMap<String, FlagValue>,
    /// Seed for mangled names; fixed so output is reproducible.
    #[serde(default)]
    pub salt: u64,
    #[serde(default)]
    pub optimizer: OptimizerCommand,
}

impl CompileOptions {
    pub fn new(format: OutputFormat) -> Self {
        CompileOptions {
            format,
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_flag(mut self, name: &str, value: FlagValue) -> Self {
        self.flags.insert(name.to_string(), value);
        self
    }

    /// Rejects flag combinations the optimizer would refuse. Must run before
    /// anything is staged on disk.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let verbose = self
            .flags
            .get(FLAG_WARNING_LEVEL)
            .and_then(FlagValue::as_str)
            .is_some_and(|v| v.eq_ignore_ascii_case(VERBOSE));
        if verbose {
            let language_out = self.flags.get(FLAG_LANGUAGE_OUT).and_then(FlagValue::as_str);
            match language_out {
                None => {
                    return Err(PipelineError::ConfigurationConflict(format!(
                        "{}={} requires {} to name a target language level",
                        FLAG_WARNING_LEVEL, VERBOSE, FLAG_LANGUAGE_OUT
                    )))
                }
                Some(level) if level.eq_ignore_ascii_case(NO_TRANSPILE) => {
                    return Err(PipelineError::ConfigurationConflict(format!(
                        "{}={} cannot be combined with {}={}",
                        FLAG_WARNING_LEVEL, VERBOSE, FLAG_LANGUAGE_OUT, NO_TRANSPILE
                    )))
                }
                Some(_) => {}
            }
        }
        if self.format.has_global_wrapper() {
            if let Some(name) = &self.name {
                if name.trim().is_empty() {
                    return Err(PipelineError::ConfigurationConflict(
                        "wrapper name must not be empty".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Flags for the optimizer request: defaults first, user flags on top,
    /// adapter-owned flags removed.
    pub fn optimizer_flags(&self) -> BTreeMap<String, FlagValue> {
        let mut flags = BTreeMap::new();
        flags.insert(
            FLAG_LANGUAGE_OUT.to_string(),
            FlagValue::Value(NO_TRANSPILE.to_string()),
        );
        flags.insert(
            FLAG_WARNING_LEVEL.to_string(),
            FlagValue::Value("QUIET".to_string()),
        );
        flags.insert(
            FLAG_MODULE_RESOLUTION.to_string(),
            FlagValue::Value("BROWSER".to_string()),
        );
        if self.format.is_module() {
            flags.insert(
                FLAG_ASSUME_FUNCTION_WRAPPER.to_string(),
                FlagValue::Switch(true),
            );
        }
        for (name, value) in &self.flags {
            if RESERVED_FLAGS.contains(&name.as_str()) {
                log::warn!("ignoring optimizer flag `{}`, it is set per request", name);
                continue;
            }
            flags.insert(name.clone(), value.clone());
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_requires_language_out() {
        let opts = CompileOptions::new(OutputFormat::Es)
            .with_flag(FLAG_WARNING_LEVEL, FlagValue::Value("VERBOSE".into()));
        assert!(matches!(
            opts.validate(),
            Err(PipelineError::ConfigurationConflict(_))
        ));

        let opts = opts.with_flag(FLAG_LANGUAGE_OUT, FlagValue::Value("NO_TRANSPILE".into()));
        assert!(matches!(
            opts.validate(),
            Err(PipelineError::ConfigurationConflict(_))
        ));

        let opts = opts.with_flag(FLAG_LANGUAGE_OUT, FlagValue::Value("ECMASCRIPT_2015".into()));
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_user_flags_override_defaults() {
        let opts = CompileOptions::new(OutputFormat::Es)
            .with_flag(FLAG_LANGUAGE_OUT, FlagValue::Value("ECMASCRIPT5".into()))
            .with_flag("js", FlagValue::Value("other.js".into()));
        let flags = opts.optimizer_flags();
        assert_eq!(
            flags.get(FLAG_LANGUAGE_OUT),
            Some(&FlagValue::Value("ECMASCRIPT5".into()))
        );
        assert_eq!(
            flags.get(FLAG_ASSUME_FUNCTION_WRAPPER),
            Some(&FlagValue::Switch(true))
        );
        assert!(!flags.contains_key("js"));
    }

    #[test]
    fn test_options_from_json() {
        let opts = CompileOptions::from_json(
            r#"{"format":"iife","name":"Lib","flags":{"compilation_level":"ADVANCED","debug":true,"jscomp_off":["checkVars","misplacedTypeAnnotation"]},"salt":9}"#,
        )
        .unwrap();
        assert_eq!(opts.format, OutputFormat::Iife);
        assert_eq!(opts.name.as_deref(), Some("Lib"));
        assert_eq!(opts.salt, 9);
        assert_eq!(
            opts.flags["jscomp_off"].to_args("jscomp_off"),
            vec!["--jscomp_off=checkVars", "--jscomp_off=misplacedTypeAnnotation"]
        );
        assert_eq!(opts.flags["debug"].to_args("debug"), vec!["--debug"]);
        assert_eq!(opts.optimizer.program, "google-closure-compiler");
    }
}
