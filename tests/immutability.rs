use thorn::error::ThornError;
use thorn::Thorn;

#[test]
fn assigning_to_an_immutable_binding_is_a_runtime_error() {
    let mut thorn = Thorn::new();
    let err = thorn.run("@immut a = 1; a = 2;").unwrap_err();
    match err {
        ThornError::Runtime { message, .. } => {
            assert!(message.contains("immutable"), "unexpected message: {message}");
            assert!(message.contains('a'), "unexpected message: {message}");
        }
        other => panic!("expected a Runtime error, got {other:?}"),
    }
}

#[test]
fn plain_var_bindings_may_be_reassigned() {
    let mut thorn = Thorn::new();
    let value = thorn.run("var a = 1; a = 2; a;").unwrap();
    assert_eq!(thorn::interpreter::value::describe(&value), "2");
}
