//! Replace reads of a variable that is just a copy of another, not-yet-reassigned
//! variable with the original, so later passes (dead store elimination) can
//! see that the copy itself went unused.

use std::collections::{HashMap, HashSet};

use crate::ast::{Expr, LambdaBody, Stmt};
use crate::error::ThornResult;
use crate::optimizer::context::OptimizationContext;
use crate::optimizer::walk::for_each_block_mut;
use crate::optimizer::{OptimizationLevel, OptimizationPass, PassType};

pub struct CopyPropagation;

impl OptimizationPass for CopyPropagation {
    fn name(&self) -> &'static str {
        "copy-propagation"
    }

    fn pass_type(&self) -> PassType {
        PassType::Transformation
    }

    fn minimum_level(&self) -> OptimizationLevel {
        OptimizationLevel::O2
    }

    fn dependencies(&self) -> &[&'static str] {
        &["constant-folding"]
    }

    fn run(&self, program: &mut Vec<Stmt>, ctx: &mut OptimizationContext) -> ThornResult<()> {
        let mut propagated = 0;
        for_each_block_mut(program, &mut |block| propagate_block(block, &mut propagated));
        if propagated > 0 {
            ctx.note(format!("copy-propagation: rewrote {propagated} use(s)"));
        }
        Ok(())
    }
}

/// Within a single statement list, `@immut x = y;` makes `x` an alias for `y`
/// until either is reassigned; every read of `x` up to that point is rewired
/// to read `y` instead.
fn propagate_block(block: &mut [Stmt], count: &mut usize) {
    let mut copies: HashMap<String, String> = HashMap::new();

    for stmt in block.iter_mut() {
        substitute_stmt(stmt, &copies, count);

        match stmt {
            Stmt::Var {
                name,
                init: Some(Expr::Variable(source)),
                ..
            } if source.lexeme != name.lexeme => {
                invalidate(&mut copies, &name.lexeme);
                copies.insert(name.lexeme.clone(), source.lexeme.clone());
            }
            Stmt::Var { name, .. } => invalidate(&mut copies, &name.lexeme),
            Stmt::Expression(Expr::Assign { name, .. }) => invalidate(&mut copies, &name.lexeme),
            Stmt::For { var, .. } => invalidate(&mut copies, &var.lexeme),
            _ => {}
        }

        // `if`/`while`/`for`/`try` bodies are walked by `for_each_block_mut` as
        // their own independent blocks, so a reassignment inside one is invisible
        // to this block's `copies` table. Invalidate anything that statement's
        // nested bodies could reassign before trusting an alias across it.
        if has_nested_body(stmt) {
            let mut assigned = HashSet::new();
            collect_assigned_names(stmt, &mut assigned);
            for name in &assigned {
                invalidate(&mut copies, name);
            }
        }
    }
}

fn has_nested_body(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::If { .. } | Stmt::While { .. } | Stmt::For { .. } | Stmt::TryCatch { .. })
}

/// Collects every variable name a statement (and anything nested inside it,
/// including `else` branches, catch blocks, and closures) could reassign.
fn collect_assigned_names(stmt: &Stmt, names: &mut HashSet<String>) {
    match stmt {
        Stmt::Block(body) => body.iter().for_each(|s| collect_assigned_names(s, names)),
        Stmt::If { condition, then_branch, else_branch } => {
            collect_assigned_in_expr(condition, names);
            collect_assigned_names(then_branch, names);
            if let Some(else_branch) = else_branch {
                collect_assigned_names(else_branch, names);
            }
        }
        Stmt::While { condition, body } => {
            collect_assigned_in_expr(condition, names);
            collect_assigned_names(body, names);
        }
        Stmt::For { var, iterable, body } => {
            names.insert(var.lexeme.clone());
            collect_assigned_in_expr(iterable, names);
            collect_assigned_names(body, names);
        }
        Stmt::TryCatch { try_block, catch_block, .. } => {
            collect_assigned_names(try_block, names);
            collect_assigned_names(catch_block, names);
        }
        Stmt::Function(decl) => decl.body.iter().for_each(|s| collect_assigned_names(s, names)),
        Stmt::Class { methods, .. } => {
            for method in methods {
                method.body.iter().for_each(|s| collect_assigned_names(s, names));
            }
        }
        Stmt::Export(inner) => collect_assigned_names(inner, names),
        Stmt::Expression(expr) | Stmt::Return { value: Some(expr), .. } | Stmt::Throw { value: expr, .. } => {
            collect_assigned_in_expr(expr, names)
        }
        Stmt::Var { init: Some(expr), .. } => collect_assigned_in_expr(expr, names),
        _ => {}
    }
}

fn collect_assigned_in_expr(expr: &Expr, names: &mut HashSet<String>) {
    match expr {
        Expr::Assign { name, value } => {
            names.insert(name.lexeme.clone());
            collect_assigned_in_expr(value, names);
        }
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            collect_assigned_in_expr(left, names);
            collect_assigned_in_expr(right, names);
        }
        Expr::Unary { right, .. } | Expr::Grouping(right) => collect_assigned_in_expr(right, names),
        Expr::Call { callee, args, .. } => {
            collect_assigned_in_expr(callee, names);
            args.iter().for_each(|a| collect_assigned_in_expr(a, names));
        }
        Expr::Get { object, .. } => collect_assigned_in_expr(object, names),
        Expr::Set { object, value, .. } => {
            collect_assigned_in_expr(object, names);
            collect_assigned_in_expr(value, names);
        }
        Expr::Index { object, index, .. } => {
            collect_assigned_in_expr(object, names);
            collect_assigned_in_expr(index, names);
        }
        Expr::IndexSet { object, index, value, .. } => {
            collect_assigned_in_expr(object, names);
            collect_assigned_in_expr(index, names);
            collect_assigned_in_expr(value, names);
        }
        Expr::Slice { object, start, end, .. } => {
            collect_assigned_in_expr(object, names);
            if let Some(start) = start {
                collect_assigned_in_expr(start, names);
            }
            if let Some(end) = end {
                collect_assigned_in_expr(end, names);
            }
        }
        Expr::Match { subject, cases, .. } => {
            collect_assigned_in_expr(subject, names);
            for case in cases {
                if let Some(guard) = &case.guard {
                    collect_assigned_in_expr(guard, names);
                }
                match &case.body {
                    crate::ast::MatchBody::Expr(inner) => collect_assigned_in_expr(inner, names),
                    crate::ast::MatchBody::Block(stmts) => {
                        stmts.iter().for_each(|s| collect_assigned_names(s, names))
                    }
                }
            }
        }
        Expr::ListExpr(items) => items.iter().for_each(|i| collect_assigned_in_expr(i, names)),
        Expr::Dict { keys, values } => {
            keys.iter().for_each(|k| collect_assigned_in_expr(k, names));
            values.iter().for_each(|v| collect_assigned_in_expr(v, names));
        }
        Expr::Lambda { body, .. } => match body.as_ref() {
            LambdaBody::Block(stmts) => stmts.iter().for_each(|s| collect_assigned_names(s, names)),
            LambdaBody::Expr(inner) => collect_assigned_in_expr(inner, names),
        },
        _ => {}
    }
}

/// A reassignment anywhere invalidates both the binding itself and any
/// existing alias sourced from it, since the alias would now read stale data.
fn invalidate(copies: &mut HashMap<String, String>, name: &str) {
    copies.remove(name);
    copies.retain(|_, source| source != name);
}

fn substitute_stmt(stmt: &mut Stmt, copies: &HashMap<String, String>, count: &mut usize) {
    match stmt {
        Stmt::Expression(expr) => substitute_expr(expr, copies, count),
        Stmt::If { condition, .. } => substitute_expr(condition, copies, count),
        Stmt::While { condition, .. } => substitute_expr(condition, copies, count),
        Stmt::For { iterable, .. } => substitute_expr(iterable, copies, count),
        Stmt::Return { value: Some(v), .. } => substitute_expr(v, copies, count),
        Stmt::Throw { value, .. } => substitute_expr(value, copies, count),
        Stmt::Var { init: Some(v), .. } => substitute_expr(v, copies, count),
        _ => {}
    }
}

fn substitute_expr(expr: &mut Expr, copies: &HashMap<String, String>, count: &mut usize) {
    match expr {
        Expr::Variable(tok) => {
            if let Some(source) = copies.get(&tok.lexeme) {
                tok.lexeme = source.clone();
                *count += 1;
            }
        }
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            substitute_expr(left, copies, count);
            substitute_expr(right, copies, count);
        }
        Expr::Unary { right, .. } | Expr::Grouping(right) => substitute_expr(right, copies, count),
        Expr::Call { callee, args, .. } => {
            substitute_expr(callee, copies, count);
            args.iter_mut().for_each(|a| substitute_expr(a, copies, count));
        }
        Expr::Assign { value, .. } => substitute_expr(value, copies, count),
        Expr::Get { object, .. } => substitute_expr(object, copies, count),
        Expr::Set { object, value, .. } => {
            substitute_expr(object, copies, count);
            substitute_expr(value, copies, count);
        }
        Expr::Index { object, index, .. } => {
            substitute_expr(object, copies, count);
            substitute_expr(index, copies, count);
        }
        Expr::IndexSet { object, index, value, .. } => {
            substitute_expr(object, copies, count);
            substitute_expr(index, copies, count);
            substitute_expr(value, copies, count);
        }
        Expr::ListExpr(items) => items.iter_mut().for_each(|i| substitute_expr(i, copies, count)),
        Expr::Dict { keys, values } => {
            keys.iter_mut().for_each(|k| substitute_expr(k, copies, count));
            values.iter_mut().for_each(|v| substitute_expr(v, copies, count));
        }
        _ => {}
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
    fn propagates_simple_alias() {
        let mut program = parse("@immut x = 1; @immut y = x; print(y);");
        let mut ctx = OptimizationContext::new(OptimizationLevel::O2, false);
        CopyPropagation.run(&mut program, &mut ctx).unwrap();
        let Stmt::Expression(Expr::Call { args, .. }) = &program[2] else {
            panic!("expected call statement")
        };
        assert!(matches!(&args[0], Expr::Variable(tok) if tok.lexeme == "x"));
    }

    #[test]
    fn stops_propagating_after_reassignment() {
        let mut program = parse("var x = 1; @immut y = x; x = 2; print(y);");
        let mut ctx = OptimizationContext::new(OptimizationLevel::O2, false);
        CopyPropagation.run(&mut program, &mut ctx).unwrap();
        let Stmt::Expression(Expr::Call { args, .. }) = &program[3] else {
            panic!("expected call statement")
        };
        assert!(matches!(&args[0], Expr::Variable(tok) if tok.lexeme == "y"));
    }

    #[test]
    fn stops_propagating_after_reassignment_inside_an_if_body() {
        let mut program = parse("var x = 1; @immut y = x; if (true) { x = 2; } print(y);");
        let mut ctx = OptimizationContext::new(OptimizationLevel::O2, false);
        CopyPropagation.run(&mut program, &mut ctx).unwrap();
        let Stmt::Expression(Expr::Call { args, .. }) = &program[3] else {
            panic!("expected call statement")
        };
        assert!(matches!(&args[0], Expr::Variable(tok) if tok.lexeme == "y"));
    }
}
