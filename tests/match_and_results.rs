use thorn::error::ThornError;
use thorn::Thorn;

#[test]
fn match_destructures_an_ok_result() {
    let mut thorn = Thorn::new();
    let value = thorn.run("match (Ok(42)) { Ok(x) => x, Err(e) => -1, };").unwrap();
    assert_eq!(thorn::interpreter::value::describe(&value), "42");
}

#[test]
fn match_destructures_an_err_result() {
    let mut thorn = Thorn::new();
    let value = thorn.run(r#"match (Err("boom")) { Ok(x) => x, Err(e) => e, };"#).unwrap();
    assert_eq!(thorn::interpreter::value::describe(&value), "\"boom\"");
}

#[test]
fn match_binding_does_not_leak_into_the_enclosing_scope() {
    let mut thorn = Thorn::new();
    let err = thorn.run("match (Ok(1)) { Ok(x) => x, }; x;").unwrap_err();
    assert!(matches!(err, ThornError::Runtime { .. }));
}

#[test]
fn division_by_zero_at_top_level_is_a_runtime_error() {
    let mut thorn = Thorn::new();
    let err = thorn.run("1 / 0;").unwrap_err();
    assert!(matches!(err, ThornError::Runtime { .. }));
}

#[test]
fn division_by_zero_inside_try_is_catchable() {
    let mut thorn = Thorn::new();
    let value = thorn
        .run("var caught = null; try { 1 / 0; } catch (e) { caught = e; } caught;")
        .unwrap();
    assert_eq!(thorn::interpreter::value::describe(&value), "\"Division by zero\"");
}

#[test]
fn division_by_zero_inside_ok_produces_infinity() {
    let mut thorn = Thorn::new();
    let value = thorn.run("Ok(1 / 0);").unwrap();
    assert_eq!(thorn::interpreter::value::describe(&value), "Ok(Infinity)");
}
