mod support;

use sketch_interpreter::{Command, Interpreter, InterpreterOptions};
use support::TreeBuilder;

/// `struct Point { int x; int y; }; Point p; p.x = 5;` — the declaration
/// with no initializer must allocate a real struct instance (fields
/// defaulted to null), and the field write must emit STRUCT_FIELD_SET, not
/// a plain VAR_SET.
#[test]
fn struct_declaration_default_inits_then_field_write_emits_struct_field_set() {
    let mut b = TreeBuilder::new();

    let x_type = b.type_name("int");
    let x_member = b.member_decl(x_type, "x");
    let y_type = b.type_name("int");
    let y_member = b.member_decl(y_type, "y");
    let struct_decl = b.struct_decl("Point", vec![x_member, y_member]);

    let point_type = b.type_name("Point");
    let p_decl = b.declarator("p", None);
    let var_decl = b.var_decl(point_type, vec![p_decl]);

    let p_ref = b.ident("p");
    let x_field = b.ident("x");
    let p_dot_x = b.member_access(p_ref, x_field);
    let five = b.num(5);
    let assignment = b.assign(p_dot_x, five);

    let p_ref2 = b.ident("p");
    let x_field2 = b.ident("x");
    let p_dot_x_read = b.member_access(p_ref2, x_field2);
    let read_type = b.type_name("int");
    let read_decl = b.declarator("read_back", Some(p_dot_x_read));
    let read_var_decl = b.var_decl(read_type, vec![read_decl]);

    let assignment_stmt = b.expr_stmt(assignment);
    let body = b.compound(vec![
        var_decl,
        assignment_stmt,
        read_var_decl,
    ]);
    let return_type = b.type_name("void");
    let params = b.params(vec![]);
    let setup_def = b.func_def("setup", return_type, params, body);

    let bytes = b.bytes(vec![struct_decl, setup_def]);
    let interpreter = Interpreter::new(&bytes, InterpreterOptions::default()).expect("decode");
    interpreter.start().expect("start");

    let commands = interpreter.buffered_commands();
    assert!(commands.iter().all(|c| !matches!(c, Command::Error { .. })));

    let initial_var_set = commands.iter().find_map(|c| match c {
        Command::VarSet { variable: name, value, .. } if name == "p" => Some(value.clone()),
        _ => None,
    });
    let initial = initial_var_set.expect("expected a VAR_SET for p's default init");
    assert_eq!(initial["type"], "struct");
    assert_eq!(initial["structName"], "Point");
    assert_eq!(initial["fields"]["x"], serde_json::Value::Null);
    assert_eq!(initial["fields"]["y"], serde_json::Value::Null);

    let field_set = commands.iter().find_map(|c| match c {
        Command::StructFieldSet {
            struct_name,
            field,
            value,
            ..
        } => Some((struct_name.clone(), field.clone(), value.clone())),
        _ => None,
    });
    assert_eq!(field_set, Some(("Point".to_string(), "x".to_string(), serde_json::json!(5))));

    // Reading `p.x` back must emit STRUCT_FIELD_ACCESS carrying the struct's
    // type name (never the variable name `p`), per the struct-identity rule.
    let field_access = commands.iter().find_map(|c| match c {
        Command::StructFieldAccess {
            struct_name,
            field,
            value,
            ..
        } => Some((struct_name.clone(), field.clone(), value.clone())),
        _ => None,
    });
    assert_eq!(field_access, Some(("Point".to_string(), "x".to_string(), serde_json::json!(5))));
}
