mod support;

use sketch_interpreter::{Command, Interpreter, InterpreterOptions};
use support::TreeBuilder;

/// `int result = (int)(7 / 2) + (int)3.9;` then `Serial.println(result);`
/// exercises int division truncation and a float-to-int cast in one
/// expression, run once inside `setup()` with no `loop()`.
#[test]
fn cast_and_int_division_coerce_through_println() {
    let mut b = TreeBuilder::new();

    let seven = b.num(7);
    let two = b.num(2);
    let div = b.binary("/", seven, two);
    let literal = b.float(3.9);
    let cast = b.cast("int", literal);
    let sum = b.binary("+", div, cast);

    let int_type = b.type_name("int");
    let decl = b.declarator("result", Some(sum));
    let var_decl = b.var_decl(int_type, vec![decl]);

    let result_ref = b.ident("result");
    let serial_ident = b.ident("Serial");
    let println_ident = b.ident("println");
    let println_member = b.member_access(serial_ident, println_ident);
    let print_call = b.call(println_member, vec![result_ref]);

    let print_stmt = b.expr_stmt(print_call);
    let body = b.compound(vec![var_decl, print_stmt]);
    let return_type = b.type_name("void");
    let params = b.params(vec![]);
    let setup_def = b.func_def("setup", return_type, params, body);

    let bytes = b.bytes(vec![setup_def]);
    let interpreter = Interpreter::new(&bytes, InterpreterOptions::default()).expect("decode");
    interpreter.start().expect("start");

    let commands = interpreter.buffered_commands();
    let println = commands
        .iter()
        .find_map(|c| match c {
            Command::SerialPrintln { value, .. } => Some(value.clone()),
            _ => None,
        })
        .expect("expected a SERIAL_PRINTLN command");

    assert_eq!(println, "6");
}

/// Integer division by zero is a recoverable runtime error, not a panic or
/// a silent zero result beyond the emitted Null.
#[test]
fn integer_division_by_zero_emits_runtime_error() {
    let mut b = TreeBuilder::new();

    let ten = b.num(10);
    let zero = b.num(0);
    let div = b.binary("/", ten, zero);
    let expr_stmt = b.expr_stmt(div);

    let body = b.compound(vec![expr_stmt]);
    let return_type = b.type_name("void");
    let params = b.params(vec![]);
    let setup_def = b.func_def("setup", return_type, params, body);

    let bytes = b.bytes(vec![setup_def]);
    let interpreter = Interpreter::new(&bytes, InterpreterOptions::default()).expect("decode");
    interpreter.start().expect("start");

    let commands = interpreter.buffered_commands();
    let error = commands.iter().find_map(|c| match c {
        Command::Error { error_type, message, .. } => Some((error_type.clone(), message.clone())),
        _ => None,
    });
    assert_eq!(error, Some(("RuntimeError".to_string(), "Division by zero".to_string())));
}

/// Float division by zero is not an error: it produces `Infinity`, which
/// must render as a JSON string token rather than a bare number.
#[test]
fn float_division_by_zero_produces_infinity_not_an_error() {
    let mut b = TreeBuilder::new();

    let one = b.float(1.0);
    let zero = b.float(0.0);
    let div = b.binary("/", one, zero);

    let float_type = b.type_name("float");
    let decl = b.declarator("result", Some(div));
    let var_decl = b.var_decl(float_type, vec![decl]);

    let body = b.compound(vec![var_decl]);
    let return_type = b.type_name("void");
    let params = b.params(vec![]);
    let setup_def = b.func_def("setup", return_type, params, body);

    let bytes = b.bytes(vec![setup_def]);
    let interpreter = Interpreter::new(&bytes, InterpreterOptions::default()).expect("decode");
    interpreter.start().expect("start");

    let commands = interpreter.buffered_commands();
    assert!(commands.iter().all(|c| !matches!(c, Command::Error { .. })));
    let var_set_value = commands
        .iter()
        .find_map(|c| match c {
            Command::VarSet { variable: name, value, .. } if name == "result" => Some(value.clone()),
            _ => None,
        })
        .expect("expected a VAR_SET for result");
    assert_eq!(var_set_value, serde_json::Value::String("Infinity".to_string()));
}
