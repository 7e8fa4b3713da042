//! Dispatch table for the Arduino built-in functions and library methods
//! (§5). Each entry marshals interpreter [`Value`]s into a [`Command`] and,
//! for hardware reads, suspends on [`crate::interpreter::resolve_external`]
//! to obtain the answer synchronously or asynchronously per §4.8.

use crate::command::Command;
use crate::interpreter::{resolve_external, Core, SharedCore};
use crate::value::Value;

/// Attempt to dispatch a bare-name call (`digitalWrite(...)`, `delay(...)`,
/// etc., as opposed to a `Library.method(...)` call). Returns `None` when
/// `name` isn't a recognized built-in, so the caller falls back to
/// looking up a user-defined function.
pub async fn call_builtin(core: SharedCore, name: &str, args: &[Value]) -> Option<Value> {
    match name {
        "pinMode" => {
            let pin = args.get(0).map(Value::to_i32).unwrap_or(0);
            let mode = args.get(1).map(Value::to_i32).unwrap_or(0);
            let ts = Core::now_ms(&core);
            Core::emit(
                &core,
                Command::PinMode {
                    timestamp: ts,
                    pin,
                    mode,
                },
            );
            Some(Value::Null)
        }
        "digitalWrite" => {
            let pin = args.get(0).map(Value::to_i32).unwrap_or(0);
            let value = args.get(1).map(Value::to_i32).unwrap_or(0);
            let ts = Core::now_ms(&core);
            Core::emit(&core, Command::DigitalWrite { timestamp: ts, pin, value });
            Some(Value::Null)
        }
        "analogWrite" => {
            let pin = args.get(0).map(Value::to_i32).unwrap_or(0);
            let value = args.get(1).map(Value::to_i32).unwrap_or(0);
            let ts = Core::now_ms(&core);
            Core::emit(&core, Command::AnalogWrite { timestamp: ts, pin, value });
            Some(Value::Null)
        }
        "digitalRead" => {
            let pin = args.get(0).map(Value::to_i32).unwrap_or(0);
            Some(
                resolve_external(
                    core.clone(),
                    "digitalRead",
                    move |provider| provider.digital_read(pin),
                    move |timestamp, request_id| Command::DigitalReadRequest {
                        timestamp,
                        pin,
                        request_id,
                    },
                )
                .await,
            )
        }
        "analogRead" => {
            let pin = args.get(0).map(Value::to_i32).unwrap_or(0);
            Some(
                resolve_external(
                    core.clone(),
                    "analogRead",
                    move |provider| provider.analog_read(pin),
                    move |timestamp, request_id| Command::AnalogReadRequest {
                        timestamp,
                        pin,
                        request_id,
                    },
                )
                .await,
            )
        }
        "millis" => Some(
            resolve_external(
                core.clone(),
                "millis",
                |provider| provider.millis(),
                |timestamp, request_id| Command::MillisRequest {
                    timestamp,
                    request_id,
                },
            )
            .await,
        ),
        "micros" => Some(
            resolve_external(
                core.clone(),
                "micros",
                |provider| provider.micros(),
                |timestamp, request_id| Command::MicrosRequest {
                    timestamp,
                    request_id,
                },
            )
            .await,
        ),
        "delay" => {
            let duration = args.get(0).map(Value::to_u32).unwrap_or(0);
            let ts = Core::now_ms(&core);
            Core::emit(&core, Command::Delay { timestamp: ts, duration });
            Core::advance_clock(&core, duration as u64);
            Some(Value::Null)
        }
        "delayMicroseconds" => {
            let micros = args.get(0).map(Value::to_u32).unwrap_or(0);
            let duration = micros / 1000;
            let ts = Core::now_ms(&core);
            Core::emit(&core, Command::Delay { timestamp: ts, duration });
            Core::advance_clock(&core, duration as u64);
            Some(Value::Null)
        }
        "tone" => {
            let pin = args.get(0).map(Value::to_i32).unwrap_or(0);
            let frequency = args.get(1).map(Value::to_u32).unwrap_or(0);
            let duration = args.get(2).map(Value::to_u32);
            let ts = Core::now_ms(&core);
            Core::emit(
                &core,
                Command::Tone {
                    timestamp: ts,
                    pin,
                    frequency,
                    duration,
                },
            );
            Some(Value::Null)
        }
        "noTone" => {
            let pin = args.get(0).map(Value::to_i32).unwrap_or(0);
            let ts = Core::now_ms(&core);
            Core::emit(&core, Command::NoTone { timestamp: ts, pin });
            Some(Value::Null)
        }
        _ => None,
    }
}

/// Dispatch a `Library.method(...)` call (`Serial.println`,
/// `Keyboard.press`, `Mouse.move`, etc.). `None` means the pair isn't a
/// recognized built-in library call, so the caller reports
/// [`crate::error::RuntimeError::UndefinedFunction`].
pub async fn call_library_method(
    core: SharedCore,
    library: &str,
    method: &str,
    args: &[Value],
) -> Option<Value> {
    match (library, method) {
        ("Serial", "begin") => {
            let baud_rate = args.get(0).map(Value::to_u32).unwrap_or(9600);
            let ts = Core::now_ms(&core);
            Core::emit(&core, Command::SerialBegin { timestamp: ts, baud_rate });
            Some(Value::Null)
        }
        ("Serial", "print") => {
            let value = args.get(0).map(Value::display_string).unwrap_or_default();
            let ts = Core::now_ms(&core);
            Core::emit(&core, Command::SerialPrint { timestamp: ts, value });
            Some(Value::Null)
        }
        ("Serial", "println") => {
            let value = args.get(0).map(Value::display_string).unwrap_or_default();
            let ts = Core::now_ms(&core);
            Core::emit(&core, Command::SerialPrintln { timestamp: ts, value });
            Some(Value::Null)
        }
        ("Keyboard", "press") => {
            let key = args.get(0).map(Value::display_string).unwrap_or_default();
            let ts = Core::now_ms(&core);
            Core::emit(&core, Command::KeyboardPress { timestamp: ts, key });
            Some(Value::Null)
        }
        ("Keyboard", "release") => {
            let key = args.get(0).map(Value::display_string).unwrap_or_default();
            let ts = Core::now_ms(&core);
            Core::emit(&core, Command::KeyboardRelease { timestamp: ts, key });
            Some(Value::Null)
        }
        ("Mouse", "move") => {
            let x = args.get(0).map(Value::to_i32).unwrap_or(0);
            let y = args.get(1).map(Value::to_i32).unwrap_or(0);
            let ts = Core::now_ms(&core);
            Core::emit(&core, Command::MouseMove { timestamp: ts, x, y });
            Some(Value::Null)
        }
        ("Mouse", "click") => {
            let button = args.get(0).map(Value::display_string).unwrap_or_else(|| "LEFT".to_string());
            let ts = Core::now_ms(&core);
            Core::emit(&core, Command::MouseClick { timestamp: ts, button });
            Some(Value::Null)
        }
        (library, method) => {
            let library = library.to_string();
            let method = method.to_string();
            let args_owned = args.to_vec();
            let json_args: Vec<serde_json::Value> = args_owned.iter().map(Value::to_json).collect();
            let library_for_cmd = library.clone();
            let method_for_cmd = method.clone();
            Some(
                resolve_external(
                    core.clone(),
                    "libraryCall",
                    move |provider| provider.library_call(&library, &method, &args_owned),
                    move |timestamp, request_id| Command::LibraryCallRequest {
                        timestamp,
                        library: library_for_cmd.clone(),
                        method: method_for_cmd.clone(),
                        args: json_args.clone(),
                        request_id,
                    },
                )
                .await,
            )
        }
    }
}

