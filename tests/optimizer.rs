use thorn::ast::Stmt;
use thorn::lexer::Lexer;
use thorn::optimizer::pipeline::Pipeline;
use thorn::optimizer::OptimizationLevel;
use thorn::parser::Parser;
use thorn::Thorn;

fn parse(source: &str) -> Vec<Stmt> {
    let tokens = Lexer::new(source).scan_tokens().unwrap();
    Parser::new(tokens).parse().unwrap()
}

#[test]
fn o2_inlines_a_single_expression_function_out_of_the_ast() {
    let source = "$ add(a, b) { return a + b; } @immut sum = add(2, 3); sum;";

    let mut program = parse(source);
    Pipeline::standard().run(&mut program, OptimizationLevel::O2, false).unwrap();

    let still_declared = program.iter().any(|stmt| matches!(stmt, Stmt::Function(decl) if decl.name.lexeme == "add"));
    assert!(!still_declared, "expected 'add' to be inlined away at O2");
}

#[test]
fn optimized_and_unoptimized_runs_agree_on_the_result() {
    let source = "$ add(a, b) { return a + b; } @immut sum = add(2, 3); sum;";

    let mut unoptimized = Thorn::new().with_optimization_level(OptimizationLevel::O0);
    let mut optimized = Thorn::new().with_optimization_level(OptimizationLevel::O2);

    let lhs = thorn::interpreter::value::describe(&unoptimized.run(source).unwrap());
    let rhs = thorn::interpreter::value::describe(&optimized.run(source).unwrap());
    assert_eq!(lhs, rhs);
}

#[test]
fn constant_folding_does_not_fold_across_a_runtime_division_by_zero() {
    let source = "@immut z = 0; @immut x = 1 / z; x;";

    let mut unoptimized = Thorn::new().with_optimization_level(OptimizationLevel::O0);
    let mut optimized = Thorn::new().with_optimization_level(OptimizationLevel::O2);

    assert!(unoptimized.run(source).is_err());
    assert!(optimized.run(source).is_err());
}
