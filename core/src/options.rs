//! Host-supplied construction options (§4.3, §4.8), mirroring the teacher's
//! `HardwareSpec`/`ProgramSpec` config structs: a plain serde-(de)serializable
//! struct so embedders can ship options as JSON/TOML/etc.

use crate::consts::{DEFAULT_EXTERNAL_VALUE_TIMEOUT_MS, DEFAULT_MAX_LOOP_ITERATIONS};
use serde::{Deserialize, Serialize};

/// Whether external values (`digitalRead`, `analogRead`, `millis`,
/// `micros`, library calls) are resolved synchronously against a
/// [`crate::provider::SyncProvider`] or asynchronously via
/// request/response (§4.8).
#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExternalValueMode {
    Sync,
    Async,
}

impl Default for ExternalValueMode {
    fn default() -> Self {
        ExternalValueMode::Sync
    }
}

/// Construction-time configuration for an [`crate::Interpreter`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InterpreterOptions {
    /// Iteration cap applied to every loop construct (§4.3).
    #[serde(default = "default_max_loop_iterations")]
    pub max_loop_iterations: u32,
    /// Whether `digitalRead`/`analogRead`/`millis`/`micros`/library calls
    /// are resolved synchronously or asynchronously (§4.8).
    #[serde(default)]
    pub external_value_mode: ExternalValueMode,
    /// Deadline for an in-flight asynchronous external-value request, in
    /// milliseconds. `0` means "use the built-in default."
    #[serde(default = "default_external_value_timeout_ms")]
    pub external_value_timeout_ms: u32,
    /// Emit extra `log::debug!` tracing of evaluator internals. Never
    /// affects the emitted command stream.
    #[serde(default)]
    pub verbose: bool,
}

fn default_max_loop_iterations() -> u32 {
    DEFAULT_MAX_LOOP_ITERATIONS
}

fn default_external_value_timeout_ms() -> u32 {
    DEFAULT_EXTERNAL_VALUE_TIMEOUT_MS
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            max_loop_iterations: DEFAULT_MAX_LOOP_ITERATIONS,
            external_value_mode: ExternalValueMode::Sync,
            external_value_timeout_ms: DEFAULT_EXTERNAL_VALUE_TIMEOUT_MS,
            verbose: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = InterpreterOptions::default();
        assert_eq!(opts.max_loop_iterations, DEFAULT_MAX_LOOP_ITERATIONS);
        assert_eq!(opts.external_value_mode, ExternalValueMode::Sync);
    }

    #[test]
    fn test_deserialize_partial_json_fills_defaults() {
        let opts: InterpreterOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, InterpreterOptions::default());
    }

    #[test]
    fn test_deserialize_overrides() {
        let opts: InterpreterOptions =
            serde_json::from_str(r#"{"maxLoopIterations": 10, "externalValueMode": "async"}"#)
                .unwrap();
        assert_eq!(opts.max_loop_iterations, 10);
        assert_eq!(opts.external_value_mode, ExternalValueMode::Async);
    }
}
