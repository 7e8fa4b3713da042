//! The NDJSON command stream (§3.5, §6): every observable effect of a
//! running sketch is emitted as one `Command`, one JSON object per line.
//!
//! Each variant is serialized as an internally-tagged enum: serde always
//! writes the tag field (`type`) first, then the variant's own fields in
//! their declared struct order, which is exactly the fixed ordering the
//! schema requires without any hand-rolled `Serialize` impl.

use crate::value::Value;
use serde::Serialize;
use std::cell::RefCell;
use std::fmt;
use std::fs::File;
use std::io::{self, Write as IoWrite};
use std::rc::Rc;

/// One line of the emitted command stream. `timestamp` is always the
/// second field (after the `type` tag serde adds), in milliseconds since
/// the interpreter was constructed.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum Command {
    #[serde(rename = "VERSION_INFO")]
    VersionInfo {
        timestamp: u64,
        component: String,
        version: String,
    },
    #[serde(rename = "PROGRAM_START")]
    ProgramStart { timestamp: u64 },
    #[serde(rename = "PROGRAM_END")]
    ProgramEnd { timestamp: u64 },
    #[serde(rename = "SETUP_START")]
    SetupStart { timestamp: u64 },
    #[serde(rename = "SETUP_END")]
    SetupEnd { timestamp: u64 },
    #[serde(rename = "LOOP_START")]
    LoopStart { timestamp: u64, iteration: u32 },
    #[serde(rename = "LOOP_END")]
    LoopEnd { timestamp: u64, iteration: u32 },

    #[serde(rename = "PIN_MODE")]
    PinMode { timestamp: u64, pin: i32, mode: i32 },
    #[serde(rename = "DIGITAL_WRITE")]
    DigitalWrite {
        timestamp: u64,
        pin: i32,
        value: i32,
    },
    #[serde(rename = "ANALOG_WRITE")]
    AnalogWrite {
        timestamp: u64,
        pin: i32,
        value: i32,
    },
    #[serde(rename = "DIGITAL_READ")]
    DigitalRead {
        timestamp: u64,
        pin: i32,
        value: i32,
    },
    #[serde(rename = "DIGITAL_READ_REQUEST")]
    DigitalReadRequest {
        timestamp: u64,
        pin: i32,
        #[serde(rename = "requestId")]
        request_id: u64,
    },
    #[serde(rename = "ANALOG_READ")]
    AnalogRead {
        timestamp: u64,
        pin: i32,
        value: i32,
    },
    #[serde(rename = "ANALOG_READ_REQUEST")]
    AnalogReadRequest {
        timestamp: u64,
        pin: i32,
        #[serde(rename = "requestId")]
        request_id: u64,
    },
    #[serde(rename = "MILLIS")]
    Millis { timestamp: u64, value: u32 },
    #[serde(rename = "MILLIS_REQUEST")]
    MillisRequest {
        timestamp: u64,
        #[serde(rename = "requestId")]
        request_id: u64,
    },
    #[serde(rename = "MICROS")]
    Micros { timestamp: u64, value: u32 },
    #[serde(rename = "MICROS_REQUEST")]
    MicrosRequest {
        timestamp: u64,
        #[serde(rename = "requestId")]
        request_id: u64,
    },
    #[serde(rename = "LIBRARY_CALL")]
    LibraryCall {
        timestamp: u64,
        library: String,
        method: String,
        args: Vec<serde_json::Value>,
        value: serde_json::Value,
    },
    #[serde(rename = "LIBRARY_CALL_REQUEST")]
    LibraryCallRequest {
        timestamp: u64,
        library: String,
        method: String,
        args: Vec<serde_json::Value>,
        #[serde(rename = "requestId")]
        request_id: u64,
    },

    #[serde(rename = "DELAY")]
    Delay { timestamp: u64, duration: u32 },
    #[serde(rename = "TONE")]
    Tone {
        timestamp: u64,
        pin: i32,
        frequency: u32,
        duration: Option<u32>,
    },
    #[serde(rename = "NO_TONE")]
    NoTone { timestamp: u64, pin: i32 },

    #[serde(rename = "SERIAL_BEGIN")]
    SerialBegin { timestamp: u64, baud_rate: u32 },
    #[serde(rename = "SERIAL_PRINT")]
    SerialPrint { timestamp: u64, value: String },
    #[serde(rename = "SERIAL_PRINTLN")]
    SerialPrintln { timestamp: u64, value: String },

    #[serde(rename = "KEYBOARD_PRESS")]
    KeyboardPress { timestamp: u64, key: String },
    #[serde(rename = "KEYBOARD_RELEASE")]
    KeyboardRelease { timestamp: u64, key: String },
    #[serde(rename = "MOUSE_MOVE")]
    MouseMove { timestamp: u64, x: i32, y: i32 },
    #[serde(rename = "MOUSE_CLICK")]
    MouseClick { timestamp: u64, button: String },

    #[serde(rename = "VAR_SET")]
    VarSet {
        timestamp: u64,
        variable: String,
        value: serde_json::Value,
    },
    #[serde(rename = "STRUCT_FIELD_SET")]
    StructFieldSet {
        timestamp: u64,
        #[serde(rename = "struct")]
        struct_name: String,
        field: String,
        value: serde_json::Value,
    },
    #[serde(rename = "STRUCT_FIELD_ACCESS")]
    StructFieldAccess {
        timestamp: u64,
        #[serde(rename = "struct")]
        struct_name: String,
        field: String,
        value: serde_json::Value,
    },
    #[serde(rename = "SWITCH_STATEMENT")]
    SwitchStatement { timestamp: u64, discriminant: i32 },
    #[serde(rename = "SWITCH_CASE")]
    SwitchCase { timestamp: u64, value: i32 },
    #[serde(rename = "BREAK_STATEMENT")]
    BreakStatement { timestamp: u64 },
    #[serde(rename = "LOOP_LIMIT_REACHED")]
    LoopLimitReached {
        timestamp: u64,
        phase: String,
        iterations: u32,
        message: String,
    },
    #[serde(rename = "FUNCTION_CALL")]
    FunctionCall {
        timestamp: u64,
        function: String,
        arguments: Vec<serde_json::Value>,
        message: String,
    },
    #[serde(rename = "FUNCTION_RETURN")]
    FunctionReturn {
        timestamp: u64,
        name: String,
        value: serde_json::Value,
    },

    #[serde(rename = "ERROR")]
    Error {
        timestamp: u64,
        #[serde(rename = "errorType")]
        error_type: String,
        message: String,
    },
}

impl Command {
    /// Build the struct-field variant of a struct's `{structName, fields,
    /// type:"struct", structId}` payload (§6) — a shape [`Value::to_json`]
    /// can't produce alone since `Value::Struct` only carries a handle, not
    /// the registry context needed to resolve field names.
    pub fn struct_value_json(
        struct_name: &str,
        struct_id: u64,
        fields: &[(String, Value)],
    ) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("type".to_string(), serde_json::Value::String("struct".to_string()));
        map.insert("structName".to_string(), serde_json::Value::String(struct_name.to_string()));
        map.insert("structId".to_string(), serde_json::json!(struct_id));
        let mut field_map = serde_json::Map::new();
        for (name, value) in fields {
            field_map.insert(name.clone(), value.to_json());
        }
        map.insert("fields".to_string(), serde_json::Value::Object(field_map));
        serde_json::Value::Object(map)
    }

    /// Render a function call as the human-readable `message` string carried
    /// by `FUNCTION_CALL` (§4.9 display-formatting rule): string arguments
    /// keep their surrounding quotes, everything else uses the same
    /// minimum-precision rendering as [`Value::display_string`].
    pub fn format_call_message(name: &str, args: &[Value]) -> String {
        let rendered: Vec<String> = args
            .iter()
            .map(|v| match v {
                Value::Str(s) => format!("\"{}\"", s),
                other => other.display_string(),
            })
            .collect();
        format!("{}({})", name, rendered.join(", "))
    }

    /// Serialize this command as one NDJSON line (no trailing newline).
    pub fn to_ndjson_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Where emitted commands go. Hosts embedding the interpreter implement
/// [`CommandSink::Callback`] to stream commands live; the CLI uses
/// [`CommandSink::File`] or [`CommandSink::Stdout`]; tests use
/// [`CommandSink::InMemory`].
pub enum CommandSink {
    File(RefCell<File>),
    Stdout,
    InMemory(RefCell<Vec<Command>>),
    Callback(Box<dyn Fn(&Command)>),
}

impl fmt::Debug for CommandSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            CommandSink::File(_) => "File",
            CommandSink::Stdout => "Stdout",
            CommandSink::InMemory(_) => "InMemory",
            CommandSink::Callback(_) => "Callback",
        };
        write!(f, "CommandSink::{}", kind)
    }
}

impl CommandSink {
    pub fn file(file: File) -> Rc<Self> {
        Rc::new(CommandSink::File(RefCell::new(file)))
    }

    pub fn stdout() -> Rc<Self> {
        Rc::new(CommandSink::Stdout)
    }

    pub fn in_memory() -> Rc<Self> {
        Rc::new(CommandSink::InMemory(RefCell::new(Vec::new())))
    }

    pub fn callback(f: impl Fn(&Command) + 'static) -> Rc<Self> {
        Rc::new(CommandSink::Callback(Box::new(f)))
    }

    /// Emit one command: write the NDJSON line (for `File`/`Stdout`), hand
    /// the command to a registered callback, or buffer it in memory.
    pub fn emit(&self, command: Command) -> io::Result<()> {
        match self {
            CommandSink::File(file) => {
                let line = command
                    .to_ndjson_line()
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                let mut file = file.borrow_mut();
                writeln!(file, "{}", line)
            }
            CommandSink::Stdout => {
                let line = command
                    .to_ndjson_line()
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                println!("{}", line);
                Ok(())
            }
            CommandSink::InMemory(buf) => {
                buf.borrow_mut().push(command);
                Ok(())
            }
            CommandSink::Callback(f) => {
                f(&command);
                Ok(())
            }
        }
    }

    /// Snapshot of buffered commands; only meaningful for
    /// [`CommandSink::InMemory`], used by tests and by hosts that poll
    /// instead of registering a callback.
    pub fn buffered(&self) -> Vec<Command> {
        match self {
            CommandSink::InMemory(buf) => buf.borrow().clone(),
            _ => Vec::new(),
        }
    }
}
