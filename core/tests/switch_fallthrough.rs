mod support;

use sketch_interpreter::{Command, Interpreter, InterpreterOptions};
use support::TreeBuilder;

/// `switch (1) { case 1: trace = trace*10+1; case 2: trace = trace*10+2;
/// break; case 3: trace = trace*10+3; default: trace = trace*10+9; }` —
/// matching `case 1` with no `break` must fall through into `case 2`'s
/// body, then stop at its `break`, never reaching `case 3` or `default`.
/// `trace` should end at `12`, not `123` or `1239`.
#[test]
fn switch_without_break_falls_through_to_next_case() {
    let mut b = TreeBuilder::new();

    let zero = b.num(0);
    let int_type = b.type_name("int");
    let trace_decl = b.declarator("trace", Some(zero));
    let trace_var_decl = b.var_decl(int_type, vec![trace_decl]);

    let accumulate = |b: &mut TreeBuilder, digit: i32| -> sketch_interpreter::ast::NodeId {
        let trace_ref = b.ident("trace");
        let ten = b.num(10);
        let times_ten = b.binary("*", trace_ref, ten);
        let digit_node = b.num(digit);
        let sum = b.binary("+", times_ten, digit_node);
        let trace_target = b.ident("trace");
        let assignment = b.assign(trace_target, sum);
        b.expr_stmt(assignment)
    };

    let subject = b.num(1);

    let case1_test = b.num(1);
    let case1_stmt = accumulate(&mut b, 1);
    let case1 = b.case_stmt(case1_test, vec![case1_stmt]);

    let case2_test = b.num(2);
    let case2_stmt = accumulate(&mut b, 2);
    let case2_break = b.break_stmt();
    let case2 = b.case_stmt(case2_test, vec![case2_stmt, case2_break]);

    let case3_test = b.num(3);
    let case3_stmt = accumulate(&mut b, 3);
    let case3 = b.case_stmt(case3_test, vec![case3_stmt]);

    let default_stmt = accumulate(&mut b, 9);
    let default_case = b.default_stmt(vec![default_stmt]);

    let switch_stmt = b.switch_stmt(subject, vec![case1, case2, case3, default_case]);

    let body = b.compound(vec![trace_var_decl, switch_stmt]);
    let return_type = b.type_name("void");
    let params = b.params(vec![]);
    let setup_def = b.func_def("setup", return_type, params, body);

    let bytes = b.bytes(vec![setup_def]);
    let interpreter = Interpreter::new(&bytes, InterpreterOptions::default()).expect("decode");
    interpreter.start().expect("start");

    let commands = interpreter.buffered_commands();
    assert!(commands.iter().all(|c| !matches!(c, Command::Error { .. })));

    let last_trace = commands.iter().rev().find_map(|c| match c {
        Command::VarSet { variable: name, value, .. } if name == "trace" => Some(value.clone()),
        _ => None,
    });
    assert_eq!(last_trace, Some(serde_json::json!(12)));

    // One SWITCH_STATEMENT carrying the discriminant, one SWITCH_CASE for
    // the case that actually matched (not one per case entered via
    // fall-through), and one BREAK_STATEMENT where case 2's `break` fired.
    let switch_statements: Vec<_> = commands
        .iter()
        .filter(|c| matches!(c, Command::SwitchStatement { .. }))
        .collect();
    assert_eq!(switch_statements.len(), 1);
    assert!(matches!(
        switch_statements[0],
        Command::SwitchStatement { discriminant: 1, .. }
    ));

    let switch_cases: Vec<_> = commands
        .iter()
        .filter(|c| matches!(c, Command::SwitchCase { .. }))
        .collect();
    assert_eq!(switch_cases.len(), 1);
    assert!(matches!(switch_cases[0], Command::SwitchCase { value: 1, .. }));

    let break_count = commands.iter().filter(|c| matches!(c, Command::BreakStatement { .. })).count();
    assert_eq!(break_count, 1);
}
