use thorn::error::ThornError;
use thorn::Thorn;

#[test]
fn for_loop_variable_does_not_survive_the_loop_when_previously_undefined() {
    let mut thorn = Thorn::new();
    let err = thorn.run("for (v in [1, 2, 3]) { } v;").unwrap_err();
    assert!(matches!(err, ThornError::Runtime { .. }));
}

#[test]
fn for_loop_variable_restores_a_prior_binding_after_the_loop() {
    let mut thorn = Thorn::new();
    let value = thorn.run("var v = 99; for (v in [1, 2, 3]) { } v;").unwrap();
    assert_eq!(thorn::interpreter::value::describe(&value), "99");
}

#[test]
fn block_scoped_declarations_do_not_leak_out_of_an_if_body() {
    let mut thorn = Thorn::new();
    let err = thorn.run("if (true) { var inner = 1; } inner;").unwrap_err();
    assert!(matches!(err, ThornError::Runtime { .. }));
}

#[test]
fn while_loop_fast_path_still_runs_the_full_body_each_iteration() {
    let mut thorn = Thorn::new();
    let src = r#"
        var i = 0;
        var total = 0;
        while (i < 5) {
            total = total + i;
            i = i + 1;
        }
        total;
    "#;
    let value = thorn.run(src).unwrap();
    assert_eq!(thorn::interpreter::value::describe(&value), "10");
}

#[test]
fn while_loop_falls_back_to_the_general_condition_once_its_variable_stops_being_numeric() {
    let mut thorn = Thorn::new();
    let src = r#"
        var i = 0;
        while (i < 5) {
            i = "stop";
        }
        i;
    "#;
    let err = thorn.run(src).unwrap_err();
    assert!(matches!(err, ThornError::Runtime { .. }));
}

#[test]
fn closures_capture_their_defining_environment() {
    let mut thorn = Thorn::new();
    let src = r#"
        $ make_adder(n) {
            $ add(x) { return x + n; }
            return add;
        }
        @immut add5 = make_adder(5);
        add5(10);
    "#;
    let value = thorn.run(src).unwrap();
    assert_eq!(thorn::interpreter::value::describe(&value), "15");
}
