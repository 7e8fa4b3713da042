mod support;

use sketch_interpreter::{Command, Interpreter, InterpreterOptions, SyncProvider, Value};
use support::TreeBuilder;

/// A provider that always answers `digitalRead` with `HIGH` (1); the other
/// methods are never exercised by this test.
struct FixedProvider;

impl SyncProvider for FixedProvider {
    fn digital_read(&mut self, _pin: i32) -> Value {
        Value::I32(1)
    }
    fn analog_read(&mut self, _pin: i32) -> Value {
        Value::I32(0)
    }
    fn millis(&mut self) -> Value {
        Value::U32(0)
    }
    fn micros(&mut self) -> Value {
        Value::U32(0)
    }
    fn library_call(&mut self, _library: &str, _method: &str, _args: &[Value]) -> Value {
        Value::Null
    }
}

/// `int v = digitalRead(2);` in sync mode (the default) must still emit a
/// `DIGITAL_READ_REQUEST` before consulting the provider, matching the
/// sequence async mode produces for the same call (§4.8 parity).
#[test]
fn sync_mode_digital_read_emits_request_before_value() {
    let mut b = TreeBuilder::new();

    let pin = b.num(2);
    let digital_read_ident = b.ident("digitalRead");
    let call = b.call(digital_read_ident, vec![pin]);
    let int_type = b.type_name("int");
    let decl = b.declarator("v", Some(call));
    let var_decl = b.var_decl(int_type, vec![decl]);
    let body = b.compound(vec![var_decl]);
    let return_type = b.type_name("void");
    let params = b.params(vec![]);
    let setup_def = b.func_def("setup", return_type, params, body);

    let bytes = b.bytes(vec![setup_def]);

    let options = InterpreterOptions::default();
    assert_eq!(options.external_value_mode, sketch_interpreter::ExternalValueMode::Sync);
    let interpreter = Interpreter::new(&bytes, options).expect("decode");
    interpreter.set_provider(FixedProvider);
    interpreter.start().expect("start");

    let commands = interpreter.buffered_commands();
    assert!(commands.iter().all(|c| !matches!(c, Command::Error { .. })));

    let request_pos = commands
        .iter()
        .position(|c| matches!(c, Command::DigitalReadRequest { pin: 2, .. }))
        .expect("expected a DIGITAL_READ_REQUEST command");
    let var_set_pos = commands
        .iter()
        .position(|c| matches!(c, Command::VarSet { variable, .. } if variable == "v"))
        .expect("expected a VAR_SET for v");
    assert!(request_pos < var_set_pos);

    let v = commands.iter().find_map(|c| match c {
        Command::VarSet { variable, value, .. } if variable == "v" => Some(value.clone()),
        _ => None,
    });
    assert_eq!(v, Some(serde_json::json!(1)));
}
