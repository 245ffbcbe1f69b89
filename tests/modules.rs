use std::path::PathBuf;

use thorn::error::ThornError;
use thorn::Thorn;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

#[test]
fn imports_named_exports_from_another_file() {
    let mut thorn = Thorn::new();
    let src = format!(
        "import {{ pi, double }} from \"{}\"; double(pi);",
        fixture("constants.thorn").display()
    );
    let value = thorn.run(&src).unwrap();
    assert_eq!(thorn::interpreter::value::describe(&value), "6");
}

#[test]
fn circular_imports_are_rejected() {
    let mut thorn = Thorn::new();
    let err = thorn.run_file(fixture("circular_a.thorn")).unwrap_err();
    match err {
        ThornError::Import { reason, .. } => {
            assert!(reason.contains("Circular dependency"), "unexpected reason: {reason}");
        }
        other => panic!("expected an Import error, got {other:?}"),
    }
}
