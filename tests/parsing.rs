use thorn::error::ThornError;
use thorn::lexer::Lexer;
use thorn::parser::Parser;

#[test]
fn parser_recovers_and_reports_every_error_in_a_program() {
    let tokens = Lexer::new("var ; var ; @immut x = 1;").scan_tokens().unwrap();
    let err = Parser::new(tokens).parse().unwrap_err();
    assert!(err.len() >= 2, "expected multiple recovered errors, got {}", err.len());
}

#[test]
fn a_parse_error_never_reaches_the_interpreter() {
    let mut thorn = thorn::Thorn::new();
    let err = thorn.run("var ;").unwrap_err();
    assert!(matches!(err, ThornError::Parse(_)));
}

#[test]
fn lexer_reports_the_line_of_an_unterminated_string() {
    let err = Lexer::new("\n\n\"unterminated").scan_tokens().unwrap_err();
    assert!(err.iter().any(|e| e.line == 3), "errors: {err:?}");
}
