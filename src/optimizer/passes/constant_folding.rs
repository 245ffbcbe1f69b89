//! Fold binary/unary expressions over literal operands at compile time.

use crate::ast::{Expr, Literal, Stmt};
use crate::error::ThornResult;
use crate::optimizer::context::OptimizationContext;
use crate::optimizer::{OptimizationLevel, OptimizationPass, PassType};
use crate::token::TokenKind;

pub struct ConstantFolding;

impl OptimizationPass for ConstantFolding {
    fn name(&self) -> &'static str {
        "constant-folding"
    }

    fn pass_type(&self) -> PassType {
        PassType::Transformation
    }

    fn minimum_level(&self) -> OptimizationLevel {
        OptimizationLevel::O1
    }

    fn run(&self, program: &mut Vec<Stmt>, ctx: &mut OptimizationContext) -> ThornResult<()> {
        let mut folded = 0;
        for stmt in program.iter_mut() {
            fold_stmt(stmt, &mut folded);
        }
        if folded > 0 {
            ctx.note(format!("constant-folding: folded {folded} expression(s)"));
        }
        Ok(())
    }
}

fn fold_stmt(stmt: &mut Stmt, count: &mut usize) {
    match stmt {
        Stmt::Block(body) => body.iter_mut().for_each(|s| fold_stmt(s, count)),
        Stmt::Expression(expr) => fold_expr(expr, count),
        Stmt::If {
            condition,
            then_branch,
            else_branch,
        } => {
            fold_expr(condition, count);
            fold_stmt(then_branch, count);
            if let Some(else_branch) = else_branch {
                fold_stmt(else_branch, count);
            }
        }
        Stmt::While { condition, body } => {
            fold_expr(condition, count);
            fold_stmt(body, count);
        }
        Stmt::For { iterable, body, .. } => {
            fold_expr(iterable, count);
            fold_stmt(body, count);
        }
        Stmt::Return { value: Some(v), .. } => fold_expr(v, count),
        Stmt::Throw { value, .. } => fold_expr(value, count),
        Stmt::Var { init: Some(v), .. } => fold_expr(v, count),
        Stmt::TryCatch {
            try_block,
            catch_block,
            ..
        } => {
            fold_stmt(try_block, count);
            fold_stmt(catch_block, count);
        }
        Stmt::Function(decl) => decl.body.iter_mut().for_each(|s| fold_stmt(s, count)),
        Stmt::Class { methods, .. } => {
            for method in methods {
                method.body.iter_mut().for_each(|s| fold_stmt(s, count));
            }
        }
        Stmt::Export(inner) => fold_stmt(inner, count),
        _ => {}
    }
}

fn fold_expr(expr: &mut Expr, count: &mut usize) {
    match expr {
        Expr::Binary { left, operator, right } => {
            fold_expr(left, count);
            fold_expr(right, count);
            if let (Expr::Literal(a), Expr::Literal(b)) = (left.as_ref(), right.as_ref()) {
                if let Some(folded) = fold_binary(a, operator.kind, b) {
                    *expr = Expr::Literal(folded);
                    *count += 1;
                }
            }
        }
        Expr::Unary { operator, right } => {
            fold_expr(right, count);
            if let Expr::Literal(Literal::Number(n)) = right.as_ref() {
                match operator.kind {
                    TokenKind::Minus => {
                        *expr = Expr::Literal(Literal::Number(-n));
                        *count += 1;
                    }
                    TokenKind::Bang => {
                        *expr = Expr::Literal(Literal::Bool(*n == 0.0));
                        *count += 1;
                    }
                    _ => {}
                }
            }
        }
        Expr::Grouping(inner) => {
            fold_expr(inner, count);
            if matches!(inner.as_ref(), Expr::Literal(_)) {
                *expr = (**inner).clone();
                *count += 1;
            }
        }
        Expr::Logical { left, right, .. } => {
            fold_expr(left, count);
            fold_expr(right, count);
        }
        Expr::Call { args, .. } => args.iter_mut().for_each(|a| fold_expr(a, count)),
        Expr::ListExpr(items) => items.iter_mut().for_each(|i| fold_expr(i, count)),
        Expr::Dict { keys, values } => {
            keys.iter_mut().for_each(|k| fold_expr(k, count));
            values.iter_mut().for_each(|v| fold_expr(v, count));
        }
        Expr::Assign { value, .. } => fold_expr(value, count),
        Expr::Index { object, index, .. } => {
            fold_expr(object, count);
            fold_expr(index, count);
        }
        Expr::IndexSet { object, index, value, .. } => {
            fold_expr(object, count);
            fold_expr(index, count);
            fold_expr(value, count);
        }
        Expr::Slice { object, start, end, .. } => {
            fold_expr(object, count);
            if let Some(start) = start {
                fold_expr(start, count);
            }
            if let Some(end) = end {
                fold_expr(end, count);
            }
        }
        Expr::Get { object, .. } => fold_expr(object, count),
        Expr::Set { object, value, .. } => {
            fold_expr(object, count);
            fold_expr(value, count);
        }
        Expr::Match { subject, cases, .. } => {
            fold_expr(subject, count);
            for case in cases {
                if let Some(guard) = &mut case.guard {
                    fold_expr(guard, count);
                }
                match &mut case.body {
                    crate::ast::MatchBody::Expr(e) => fold_expr(e, count),
                    crate::ast::MatchBody::Block(stmts) => {
                        stmts.iter_mut().for_each(|s| fold_stmt(s, count))
                    }
                }
            }
        }
        _ => {}
    }
}

/// Numeric and string-concat folding only; division is left alone when the
/// divisor is zero so the interpreter's own zero-division fault/`Ok`-`Err`
/// infinity rule still applies at run time.
fn fold_binary(a: &Literal, op: TokenKind, b: &Literal) -> Option<Literal> {
    if let (Literal::Str(a), Literal::Str(b)) = (a, b) {
        if op == TokenKind::Plus {
            return Some(Literal::Str(format!("{a}{b}")));
        }
    }

    let (Literal::Number(a), Literal::Number(b)) = (a, b) else {
        return None;
    };

    match op {
        TokenKind::Plus => Some(Literal::Number(a + b)),
        TokenKind::Minus => Some(Literal::Number(a - b)),
        TokenKind::Star => Some(Literal::Number(a * b)),
        TokenKind::StarStar => Some(Literal::Number(a.powf(*b))),
        TokenKind::Percent if *b != 0.0 => Some(Literal::Number(a % b)),
        TokenKind::Slash if *b != 0.0 => Some(Literal::Number(a / b)),
        TokenKind::Greater => Some(Literal::Bool(a > b)),
        TokenKind::GreaterEqual => Some(Literal::Bool(a >= b)),
        TokenKind::Less => Some(Literal::Bool(a < b)),
        TokenKind::LessEqual => Some(Literal::Bool(a <= b)),
        TokenKind::EqEqual => Some(Literal::Bool(a == b)),
        TokenKind::BangEqual => Some(Literal::Bool(a != b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn parse(src: &str) -> Vec<Stmt> {
        let tokens = Lexer::new(src).scan_tokens().unwrap();
        Parser::new(tokens).parse().unwrap()
    }

    #[test]
    fn folds_arithmetic_on_literals() {
        let mut program = parse("x = 2 + 3 * 4;");
        let mut ctx = OptimizationContext::new(OptimizationLevel::O1, false);
        ConstantFolding.run(&mut program, &mut ctx).unwrap();
        let Stmt::Expression(Expr::Assign { value, .. }) = &program[0] else {
            panic!()
        };
        assert!(matches!(value.as_ref(), Expr::Literal(Literal::Number(n)) if *n == 14.0));
    }

    #[test]
    fn does_not_fold_division_by_zero() {
        let mut program = parse("x = 1 / 0;");
        let mut ctx = OptimizationContext::new(OptimizationLevel::O1, false);
        ConstantFolding.run(&mut program, &mut ctx).unwrap();
        let Stmt::Expression(Expr::Assign { value, .. }) = &program[0] else {
            panic!()
        };
        assert!(matches!(value.as_ref(), Expr::Binary { .. }));
    }
}
