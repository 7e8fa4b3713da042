mod support;

use sketch_interpreter::{Command, Interpreter, InterpreterOptions};
use support::TreeBuilder;

/// `int x = 41; int *p = &x; *p = 42;` — dereferencing a pointer obtained
/// via `&x` and assigning through it must update `x` itself, emitting a
/// VAR_SET for `x` (the pointer's target), not for `p`.
#[test]
fn address_of_then_dereference_assignment_writes_through_to_target() {
    let mut b = TreeBuilder::new();

    let forty_one = b.num(41);
    let int_type = b.type_name("int");
    let x_decl = b.declarator("x", Some(forty_one));
    let x_var_decl = b.var_decl(int_type, vec![x_decl]);

    let x_ref = b.ident("x");
    let addr_of_x = b.address_of(x_ref);
    let ptr_type = b.type_name("int*");
    let p_decl = b.declarator("p", Some(addr_of_x));
    let p_var_decl = b.var_decl(ptr_type, vec![p_decl]);

    let p_ref = b.ident("p");
    let deref_p = b.dereference(p_ref);
    let forty_two = b.num(42);
    let assignment = b.assign(deref_p, forty_two);

    let assignment_stmt = b.expr_stmt(assignment);
    let body = b.compound(vec![x_var_decl, p_var_decl, assignment_stmt]);
    let return_type = b.type_name("void");
    let params = b.params(vec![]);
    let setup_def = b.func_def("setup", return_type, params, body);

    let bytes = b.bytes(vec![setup_def]);
    let interpreter = Interpreter::new(&bytes, InterpreterOptions::default()).expect("decode");
    interpreter.start().expect("start");

    let commands = interpreter.buffered_commands();
    assert!(commands.iter().all(|c| !matches!(c, Command::Error { .. })));

    let last_x = commands.iter().rev().find_map(|c| match c {
        Command::VarSet { variable: name, value, .. } if name == "x" => Some(value.clone()),
        _ => None,
    });
    assert_eq!(last_x, Some(serde_json::json!(42)));
}
