use thorn::Thorn;

fn run(src: &str) -> String {
    let mut thorn = Thorn::new();
    let value = thorn.run(src).unwrap();
    thorn::interpreter::value::describe(&value)
}

#[test]
fn string_methods_cover_search_and_slicing() {
    assert_eq!(run(r#""Hello".includes("ell");"#), "true");
    assert_eq!(run(r#""Hello".startsWith("He");"#), "true");
    assert_eq!(run(r#""Hello".endsWith("lo");"#), "true");
    assert_eq!(run(r#""Hello".slice(1, 3);"#), "\"el\"");
    assert_eq!(run(r#""Hello".length();"#), "5");
}

#[test]
fn array_methods_cover_queue_search_and_slicing() {
    let src = r#"
        var a = [1, 2, 3];
        a.push(4);
        a.unshift(0);
        a.shift();
        a;
    "#;
    assert_eq!(run(src), "[1, 2, 3, 4]");
    assert_eq!(run("[1, 2, 3].includes(2);"), "true");
    assert_eq!(run("[1, 2, 3].indexOf(2);"), "1");
    assert_eq!(run("[1, 2, 3].indexOf(9);"), "-1");
    assert_eq!(run("[1, 2, 3, 4].slice(1, 3);"), "[2, 3]");
}

#[test]
fn dictionary_round_trips_through_set_get_and_size() {
    let src = r#"
        var d = {};
        d.set("a", 1);
        d.set("b", 2);
        d.size();
    "#;
    assert_eq!(run(src), "2");
    assert_eq!(run(r#"var d = {}; d.get("missing", 9);"#), "9");
}

#[test]
fn result_methods_match_the_fixed_surface() {
    assert_eq!(run("Ok(1).is_ok();"), "true");
    assert_eq!(run(r#"Err("nope").is_error();"#), "true");
    assert_eq!(run(r#"Err("nope").unwrap_or(9);"#), "9");
    assert_eq!(run(r#"Err("nope").unwrap_error();"#), "\"nope\"");
}

#[test]
fn len_builtin_accepts_strings_lists_and_dicts() {
    assert_eq!(run(r#"len("abc");"#), "3");
    assert_eq!(run("len([1, 2]);"), "2");
}
