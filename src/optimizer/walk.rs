//! Shared AST traversal for optimization passes: every pass needs to reach
//! every nested statement list (`if`/`while`/`for` bodies, `try`/`catch`,
//! function and method bodies, lambda blocks) without re-deriving its own
//! recursion, so that logic lives here once.

use crate::ast::{Expr, LambdaBody, MatchBody, Stmt};

/// Apply `f` to every statement list in the program, innermost first, so a
/// pass that rewrites a block sees its nested blocks already rewritten.
pub fn for_each_block_mut(stmts: &mut Vec<Stmt>, f: &mut impl FnMut(&mut Vec<Stmt>)) {
    for stmt in stmts.iter_mut() {
        visit_stmt(stmt, f);
    }
    f(stmts);
}

fn visit_stmt(stmt: &mut Stmt, f: &mut impl FnMut(&mut Vec<Stmt>)) {
    match stmt {
        Stmt::Block(body) => for_each_block_mut(body, f),
        Stmt::If {
            then_branch,
            else_branch,
            condition,
        } => {
            visit_expr(condition, f);
            visit_stmt(then_branch, f);
            if let Some(else_branch) = else_branch {
                visit_stmt(else_branch, f);
            }
        }
        Stmt::While { condition, body } => {
            visit_expr(condition, f);
            visit_stmt(body, f);
        }
        Stmt::For { iterable, body, .. } => {
            visit_expr(iterable, f);
            visit_stmt(body, f);
        }
        Stmt::TryCatch {
            try_block,
            catch_block,
            ..
        } => {
            visit_stmt(try_block, f);
            visit_stmt(catch_block, f);
        }
        Stmt::Function(decl) => for_each_block_mut(&mut decl.body, f),
        Stmt::Class { methods, .. } => {
            for method in methods {
                for_each_block_mut(&mut method.body, f);
            }
        }
        Stmt::Export(inner) => visit_stmt(inner, f),
        Stmt::Expression(expr) | Stmt::Return { value: Some(expr), .. } | Stmt::Throw { value: expr, .. } => {
            visit_expr(expr, f)
        }
        Stmt::Var { init: Some(expr), .. } => visit_expr(expr, f),
        _ => {}
    }
}

/// Lambdas carry their own statement lists too; dig into them so a pass
/// reaches code inside `$(...) => { ... }` bodies.
fn visit_expr(expr: &mut Expr, f: &mut impl FnMut(&mut Vec<Stmt>)) {
    match expr {
        Expr::Lambda { body, .. } => {
            if let Some(body) = std::rc::Rc::get_mut(body) {
                match body {
                    LambdaBody::Block(stmts) => for_each_block_mut(stmts, f),
                    LambdaBody::Expr(inner) => visit_expr(inner, f),
                }
            }
        }
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            visit_expr(left, f);
            visit_expr(right, f);
        }
        Expr::Unary { right, .. } | Expr::Grouping(right) => visit_expr(right, f),
        Expr::Call { callee, args, .. } => {
            visit_expr(callee, f);
            for arg in args {
                visit_expr(arg, f);
            }
        }
        Expr::Assign { value, .. } => visit_expr(value, f),
        Expr::Get { object, .. } => visit_expr(object, f),
        Expr::Set { object, value, .. } => {
            visit_expr(object, f);
            visit_expr(value, f);
        }
        Expr::Index { object, index, .. } => {
            visit_expr(object, f);
            visit_expr(index, f);
        }
        Expr::IndexSet { object, index, value, .. } => {
            visit_expr(object, f);
            visit_expr(index, f);
            visit_expr(value, f);
        }
        Expr::Slice { object, start, end, .. } => {
            visit_expr(object, f);
            if let Some(start) = start {
                visit_expr(start, f);
            }
            if let Some(end) = end {
                visit_expr(end, f);
            }
        }
        Expr::ListExpr(items) => items.iter_mut().for_each(|i| visit_expr(i, f)),
        Expr::Dict { keys, values } => {
            keys.iter_mut().for_each(|k| visit_expr(k, f));
            values.iter_mut().for_each(|v| visit_expr(v, f));
        }
        Expr::Match { subject, cases, .. } => {
            visit_expr(subject, f);
            for case in cases {
                if let Some(guard) = &mut case.guard {
                    visit_expr(guard, f);
                }
                match &mut case.body {
                    MatchBody::Expr(expr) => visit_expr(expr, f),
                    MatchBody::Block(stmts) => for_each_block_mut(stmts, f),
                }
            }
        }
        _ => {}
    }
}
