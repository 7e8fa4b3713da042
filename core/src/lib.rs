//! A tree-walking interpreter for compiled Arduino-sketch programs.
//!
//! The interpreter consumes a CompactAST binary document (produced by an
//! out-of-scope source-to-AST compiler), executes `setup()` once and
//! `loop()` repeatedly, and emits one NDJSON [`Command`] per observable
//! effect — pin writes, serial output, timing, variable changes — so a
//! host can drive a simulator, a test harness, or a hardware bridge
//! without embedding any C++ semantics itself.
//!
//! ```no_run
//! use sketch_interpreter::{Interpreter, InterpreterOptions};
//!
//! let ast_bytes = std::fs::read("sketch.ast").unwrap();
//! let interpreter = Interpreter::new(&ast_bytes, InterpreterOptions::default()).unwrap();
//! interpreter.on_command(|cmd| {
//!     println!("{}", serde_json::to_string(cmd).unwrap());
//! });
//! interpreter.start().unwrap();
//! ```

pub mod ast;
pub mod builtins;
pub mod codec;
pub mod command;
pub mod consts;
pub mod error;
pub mod exec_stack;
pub mod interpreter;
pub mod options;
pub mod provider;
pub mod registry;
pub mod scope;
pub mod value;

pub use command::{Command, CommandSink};
pub use error::{ConfigurationError, DecodeError, InternalError, RecoverableError, RuntimeError};
pub use interpreter::{Interpreter, RunOutcome};
pub use options::{ExternalValueMode, InterpreterOptions};
pub use provider::{ExternalResponseOutcome, SyncProvider};
pub use value::Value;
