//! Inline calls to small, non-recursive, single-expression top-level
//! functions directly at their call sites.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Expr, FunctionDecl, LambdaBody, MatchBody, Stmt};
use crate::error::ThornResult;
use crate::optimizer::context::OptimizationContext;
use crate::optimizer::{OptimizationLevel, OptimizationPass, PassType};

pub struct FunctionInlining;

impl OptimizationPass for FunctionInlining {
    fn name(&self) -> &'static str {
        "function-inlining"
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
        let candidates = find_candidates(program);
        if candidates.is_empty() {
            return Ok(());
        }

        let mut inlined = 0;
        for stmt in program.iter_mut() {
            inline_stmt(stmt, &candidates, &mut inlined);
        }
        if inlined > 0 {
            ctx.note(format!("function-inlining: inlined {inlined} call(s)"));
        }

        // A candidate whose name appears nowhere in the rewritten program had
        // every call site replaced; its declaration is now dead and is
        // dropped, same as the distilled semantics call for.
        let removable: Vec<String> = candidates
            .keys()
            .filter(|name| !program.iter().any(|stmt| stmt_references(stmt, name)))
            .cloned()
            .collect();
        if !removable.is_empty() {
            let before = program.len();
            program.retain(|stmt| !declares_any(stmt, &removable));
            ctx.note(format!(
                "function-inlining: removed {} fully-inlined declaration(s)",
                before - program.len()
            ));
        }

        Ok(())
    }
}

fn declares_any(stmt: &Stmt, names: &[String]) -> bool {
    match stmt {
        Stmt::Function(decl) => names.iter().any(|n| n == &decl.name.lexeme),
        Stmt::Export(inner) => declares_any(inner, names),
        _ => false,
    }
}

/// Whether `name` still occurs as a read anywhere under `stmt` — used only
/// after inlining has already rewritten every call site it could, so any
/// remaining mention means at least one call survived (e.g. a mismatched
/// arity) or the function is used as a value, not just called.
fn stmt_references(stmt: &Stmt, name: &str) -> bool {
    match stmt {
        Stmt::Block(body) => body.iter().any(|s| stmt_references(s, name)),
        Stmt::Expression(expr) => expr_references(expr, name),
        Stmt::Function(decl) => decl.body.iter().any(|s| stmt_references(s, name)),
        Stmt::If {
            condition,
            then_branch,
            else_branch,
        } => {
            expr_references(condition, name)
                || stmt_references(then_branch, name)
                || else_branch.as_ref().is_some_and(|s| stmt_references(s, name))
        }
        Stmt::Return { value: Some(v), .. } => expr_references(v, name),
        Stmt::Return { value: None, .. } => false,
        Stmt::Throw { value, .. } => expr_references(value, name),
        Stmt::Var { init: Some(v), .. } => expr_references(v, name),
        Stmt::Var { init: None, .. } => false,
        Stmt::While { condition, body } => expr_references(condition, name) || stmt_references(body, name),
        Stmt::For { iterable, body, .. } => expr_references(iterable, name) || stmt_references(body, name),
        Stmt::Class { methods, .. } => methods.iter().any(|m| m.body.iter().any(|s| stmt_references(s, name))),
        Stmt::Import { .. } => false,
        Stmt::Export(inner) => stmt_references(inner, name),
        Stmt::ExportIdentifier(tok) => tok.lexeme == name,
        Stmt::TryCatch {
            try_block,
            catch_block,
            ..
        } => stmt_references(try_block, name) || stmt_references(catch_block, name),
        Stmt::TypeAlias { .. } => false,
    }
}

fn expr_references(expr: &Expr, name: &str) -> bool {
    match expr {
        Expr::Variable(tok) => tok.lexeme == name,
        Expr::Assign { name: tok, value } => tok.lexeme == name || expr_references(value, name),
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            expr_references(left, name) || expr_references(right, name)
        }
        Expr::Unary { right, .. } | Expr::Grouping(right) => expr_references(right, name),
        Expr::Call { callee, args, .. } => {
            expr_references(callee, name) || args.iter().any(|a| expr_references(a, name))
        }
        Expr::Lambda { body, .. } => match body.as_ref() {
            LambdaBody::Expr(e) => expr_references(e, name),
            LambdaBody::Block(stmts) => stmts.iter().any(|s| stmt_references(s, name)),
        },
        Expr::ListExpr(items) => items.iter().any(|i| expr_references(i, name)),
        Expr::Dict { keys, values } => {
            keys.iter().any(|k| expr_references(k, name)) || values.iter().any(|v| expr_references(v, name))
        }
        Expr::Index { object, index, .. } => expr_references(object, name) || expr_references(index, name),
        Expr::IndexSet { object, index, value, .. } => {
            expr_references(object, name) || expr_references(index, name) || expr_references(value, name)
        }
        Expr::Slice { object, start, end, .. } => {
            expr_references(object, name)
                || start.as_ref().is_some_and(|s| expr_references(s, name))
                || end.as_ref().is_some_and(|e| expr_references(e, name))
        }
        Expr::Match { subject, cases, .. } => {
            expr_references(subject, name)
                || cases.iter().any(|case| {
                    case.guard.as_ref().is_some_and(|g| expr_references(g, name))
                        || match &case.body {
                            MatchBody::Expr(e) => expr_references(e, name),
                            MatchBody::Block(stmts) => stmts.iter().any(|s| stmt_references(s, name)),
                        }
                })
        }
        Expr::Get { object, .. } => expr_references(object, name),
        Expr::Set { object, value, .. } => expr_references(object, name) || expr_references(value, name),
        Expr::Literal(_) | Expr::This(_) | Expr::TypeExpr(_) => false,
    }
}

struct Candidate {
    params: Vec<String>,
    body: Expr,
}

/// A top-level function qualifies when its whole body is a single
/// `return expr;` that doesn't call itself — inlining a recursive function
/// would either not terminate or require unrolling, neither of which this
/// pass attempts.
fn find_candidates(program: &[Stmt]) -> HashMap<String, Rc<Candidate>> {
    let mut out = HashMap::new();
    for stmt in program {
        let decl = match stmt {
            Stmt::Function(decl) => decl,
            Stmt::Export(inner) => match inner.as_ref() {
                Stmt::Function(decl) => decl,
                _ => continue,
            },
            _ => continue,
        };
        if let Some(candidate) = as_candidate(decl) {
            out.insert(decl.name.lexeme.clone(), Rc::new(candidate));
        }
    }
    out
}

fn as_candidate(decl: &FunctionDecl) -> Option<Candidate> {
    let [Stmt::Return { value: Some(body), .. }] = decl.body.as_slice() else {
        return None;
    };
    if calls_name(body, &decl.name.lexeme) {
        return None;
    }
    Some(Candidate {
        params: decl.params.iter().map(|p| p.name.clone()).collect(),
        body: body.clone(),
    })
}

fn calls_name(expr: &Expr, name: &str) -> bool {
    match expr {
        Expr::Call { callee, args, .. } => {
            matches!(callee.as_ref(), Expr::Variable(tok) if tok.lexeme == name)
                || calls_name(callee, name)
                || args.iter().any(|a| calls_name(a, name))
        }
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            calls_name(left, name) || calls_name(right, name)
        }
        Expr::Unary { right, .. } | Expr::Grouping(right) => calls_name(right, name),
        Expr::Index { object, index, .. } => calls_name(object, name) || calls_name(index, name),
        Expr::Get { object, .. } => calls_name(object, name),
        Expr::ListExpr(items) => items.iter().any(|i| calls_name(i, name)),
        _ => false,
    }
}

fn inline_stmt(stmt: &mut Stmt, candidates: &HashMap<String, Rc<Candidate>>, count: &mut usize) {
    match stmt {
        Stmt::Block(body) => body.iter_mut().for_each(|s| inline_stmt(s, candidates, count)),
        Stmt::Expression(expr) => inline_expr(expr, candidates, count),
        Stmt::If {
            condition,
            then_branch,
            else_branch,
        } => {
            inline_expr(condition, candidates, count);
            inline_stmt(then_branch, candidates, count);
            if let Some(else_branch) = else_branch {
                inline_stmt(else_branch, candidates, count);
            }
        }
        Stmt::While { condition, body } => {
            inline_expr(condition, candidates, count);
            inline_stmt(body, candidates, count);
        }
        Stmt::For { iterable, body, .. } => {
            inline_expr(iterable, candidates, count);
            inline_stmt(body, candidates, count);
        }
        Stmt::Return { value: Some(v), .. } => inline_expr(v, candidates, count),
        Stmt::Throw { value, .. } => inline_expr(value, candidates, count),
        Stmt::Var { init: Some(v), .. } => inline_expr(v, candidates, count),
        Stmt::TryCatch {
            try_block,
            catch_block,
            ..
        } => {
            inline_stmt(try_block, candidates, count);
            inline_stmt(catch_block, candidates, count);
        }
        Stmt::Function(decl) => decl.body.iter_mut().for_each(|s| inline_stmt(s, candidates, count)),
        Stmt::Class { methods, .. } => {
            for method in methods {
                method.body.iter_mut().for_each(|s| inline_stmt(s, candidates, count));
            }
        }
        Stmt::Export(inner) => inline_stmt(inner, candidates, count),
        _ => {}
    }
}

fn inline_expr(expr: &mut Expr, candidates: &HashMap<String, Rc<Candidate>>, count: &mut usize) {
    match expr {
        Expr::Call { callee, args, .. } => {
            args.iter_mut().for_each(|a| inline_expr(a, candidates, count));
            if let Expr::Variable(tok) = callee.as_ref() {
                if let Some(candidate) = candidates.get(&tok.lexeme) {
                    if candidate.params.len() == args.len() {
                        let subst: HashMap<&str, Expr> = candidate
                            .params
                            .iter()
                            .map(|p| p.as_str())
                            .zip(args.iter().cloned())
                            .collect();
                        *expr = substitute(&candidate.body, &subst);
                        *count += 1;
                        return;
                    }
                }
            }
            inline_expr(callee, candidates, count);
        }
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            inline_expr(left, candidates, count);
            inline_expr(right, candidates, count);
        }
        Expr::Unary { right, .. } | Expr::Grouping(right) => inline_expr(right, candidates, count),
        Expr::Assign { value, .. } => inline_expr(value, candidates, count),
        Expr::Get { object, .. } => inline_expr(object, candidates, count),
        Expr::Set { object, value, .. } => {
            inline_expr(object, candidates, count);
            inline_expr(value, candidates, count);
        }
        Expr::Index { object, index, .. } => {
            inline_expr(object, candidates, count);
            inline_expr(index, candidates, count);
        }
        Expr::ListExpr(items) => items.iter_mut().for_each(|i| inline_expr(i, candidates, count)),
        Expr::Dict { keys, values } => {
            keys.iter_mut().for_each(|k| inline_expr(k, candidates, count));
            values.iter_mut().for_each(|v| inline_expr(v, candidates, count));
        }
        Expr::Match { subject, cases, .. } => {
            inline_expr(subject, candidates, count);
            for case in cases {
                if let Some(guard) = &mut case.guard {
                    inline_expr(guard, candidates, count);
                }
                match &mut case.body {
                    MatchBody::Expr(e) => inline_expr(e, candidates, count),
                    MatchBody::Block(stmts) => stmts.iter_mut().for_each(|s| inline_stmt(s, candidates, count)),
                }
            }
        }
        _ => {}
    }
}

/// Textual substitution of each parameter name with its call-site argument.
/// `candidates` only admits functions whose whole body is one return
/// expression, so there is no inner scope in which a parameter name could be
/// legitimately shadowed.
fn substitute(expr: &Expr, subst: &HashMap<&str, Expr>) -> Expr {
    match expr {
        Expr::Variable(tok) => subst.get(tok.lexeme.as_str()).cloned().unwrap_or_else(|| expr.clone()),
        Expr::Binary { left, operator, right } => Expr::Binary {
            left: Box::new(substitute(left, subst)),
            operator: operator.clone(),
            right: Box::new(substitute(right, subst)),
        },
        Expr::Logical { left, operator, right } => Expr::Logical {
            left: Box::new(substitute(left, subst)),
            operator: operator.clone(),
            right: Box::new(substitute(right, subst)),
        },
        Expr::Unary { operator, right } => Expr::Unary {
            operator: operator.clone(),
            right: Box::new(substitute(right, subst)),
        },
        Expr::Grouping(inner) => Expr::Grouping(Box::new(substitute(inner, subst))),
        Expr::Call { callee, paren, args } => Expr::Call {
            callee: Box::new(substitute(callee, subst)),
            paren: paren.clone(),
            args: args.iter().map(|a| substitute(a, subst)).collect(),
        },
        Expr::Index { object, bracket, index } => Expr::Index {
            object: Box::new(substitute(object, subst)),
            bracket: bracket.clone(),
            index: Box::new(substitute(index, subst)),
        },
        Expr::Get { object, name } => Expr::Get {
            object: Box::new(substitute(object, subst)),
            name: name.clone(),
        },
        Expr::ListExpr(items) => Expr::ListExpr(items.iter().map(|i| substitute(i, subst)).collect()),
        other => other.clone(),
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
    fn inlines_small_function_at_call_site_and_drops_its_declaration() {
        let mut program = parse("$ double(n) { return n * 2; } print(double(5));");
        let mut ctx = OptimizationContext::new(OptimizationLevel::O2, false);
        FunctionInlining.run(&mut program, &mut ctx).unwrap();

        assert_eq!(program.len(), 1, "the now-dead 'double' declaration should be gone");
        let Stmt::Expression(Expr::Call { args, .. }) = &program[0] else {
            panic!("expected call statement")
        };
        assert!(matches!(&args[0], Expr::Binary { .. }));
    }

    #[test]
    fn does_not_inline_a_recursive_function() {
        let mut program = parse("$ fact(n) { return n * fact(n - 1); } print(fact(5));");
        let mut ctx = OptimizationContext::new(OptimizationLevel::O2, false);
        FunctionInlining.run(&mut program, &mut ctx).unwrap();
        assert_eq!(program.len(), 2, "a recursive function is never inlined, so its declaration stays");
        let Stmt::Expression(Expr::Call { args, .. }) = &program[1] else {
            panic!("expected call statement")
        };
        assert!(matches!(&args[0], Expr::Call { .. }));
    }
}
