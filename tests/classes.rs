use thorn::Thorn;

#[test]
fn constructor_assigns_fields_and_methods_read_them_back() {
    let mut thorn = Thorn::new();
    let src = r#"
        class Point {
            $ init(x, y) {
                x = x;
                y = y;
            }
            $ sum() {
                return this.x + this.y;
            }
        }
        @immut p = Point(3, 4);
        p.sum();
    "#;
    let value = thorn.run(src).unwrap();
    assert_eq!(thorn::interpreter::value::describe(&value), "7");
}

#[test]
fn a_class_with_no_init_rejects_constructor_arguments() {
    let mut thorn = Thorn::new();
    let err = thorn.run("class Empty { } Empty(1);").unwrap_err();
    assert!(err.to_string().contains("no constructor"));
}
