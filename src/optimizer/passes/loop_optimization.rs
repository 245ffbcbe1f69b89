//! Hoist loop-invariant `immut`/`var` declarations out of `while`/`for`
//! bodies so they compute once instead of every iteration.

use std::collections::HashSet;

use crate::ast::{Expr, Stmt};
use crate::error::ThornResult;
use crate::optimizer::context::OptimizationContext;
use crate::optimizer::{OptimizationLevel, OptimizationPass, PassType};

pub struct LoopInvariantHoisting;

impl OptimizationPass for LoopInvariantHoisting {
    fn name(&self) -> &'static str {
        "loop-invariant-hoisting"
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
        let mut hoisted = 0;
        hoist_block(program, &mut hoisted);
        if hoisted > 0 {
            ctx.note(format!("loop-invariant-hoisting: hoisted {hoisted} statement(s)"));
        }
        Ok(())
    }
}

fn hoist_block(block: &mut Vec<Stmt>, count: &mut usize) {
    let old = std::mem::take(block);
    let mut rebuilt = Vec::with_capacity(old.len());

    for mut stmt in old {
        recurse(&mut stmt, count);
        if let Stmt::While { .. } | Stmt::For { .. } = &stmt {
            rebuilt.extend(hoist_loop(&mut stmt, count));
        }
        rebuilt.push(stmt);
    }

    *block = rebuilt;
}

/// Hoist out of nested loop/branch bodies first, so an outer loop sees its
/// inner loops already cleaned up before analyzing its own body.
fn recurse(stmt: &mut Stmt, count: &mut usize) {
    match stmt {
        Stmt::Block(body) => hoist_block(body, count),
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            recurse(then_branch, count);
            if let Some(else_branch) = else_branch {
                recurse(else_branch, count);
            }
        }
        Stmt::While { body, .. } | Stmt::For { body, .. } => recurse(body, count),
        Stmt::TryCatch {
            try_block,
            catch_block,
            ..
        } => {
            recurse(try_block, count);
            recurse(catch_block, count);
        }
        Stmt::Function(decl) => hoist_block(&mut decl.body, count),
        Stmt::Class { methods, .. } => {
            for method in methods {
                hoist_block(&mut method.body, count);
            }
        }
        Stmt::Export(inner) => recurse(inner, count),
        _ => {}
    }
}

/// Returns statements to splice in immediately before `loop_stmt`.
fn hoist_loop(loop_stmt: &mut Stmt, count: &mut usize) -> Vec<Stmt> {
    let (loop_var, body) = match loop_stmt {
        Stmt::While { body, .. } => (None, body),
        Stmt::For { var, body, .. } => (Some(var.lexeme.clone()), body),
        _ => return Vec::new(),
    };
    let Stmt::Block(body) = body.as_mut() else {
        return Vec::new();
    };

    let assigned = assigned_names(body, loop_var.as_deref());
    let mut hoisted = Vec::new();
    let mut remaining = Vec::with_capacity(body.len());

    for stmt in std::mem::take(body) {
        let is_invariant = matches!(
            &stmt,
            Stmt::Var { init: Some(init), .. } if !references_any(init, &assigned)
        );
        if is_invariant {
            hoisted.push(stmt);
        } else {
            remaining.push(stmt);
        }
    }

    *count += hoisted.len();
    *body = remaining;
    hoisted
}

/// Every name written anywhere in the loop body (declared, reassigned, or the
/// loop variable itself), so a candidate hoist can check it depends on none
/// of them.
fn assigned_names(body: &[Stmt], loop_var: Option<&str>) -> HashSet<String> {
    let mut names: HashSet<String> = loop_var.map(String::from).into_iter().collect();
    collect_assigned(body, &mut names);
    names
}

fn collect_assigned(body: &[Stmt], names: &mut HashSet<String>) {
    for stmt in body {
        match stmt {
            Stmt::Var { name, .. } => {
                names.insert(name.lexeme.clone());
            }
            Stmt::Expression(Expr::Assign { name, .. }) => {
                names.insert(name.lexeme.clone());
            }
            Stmt::Block(inner) => collect_assigned(inner, names),
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                if let Stmt::Block(inner) = then_branch.as_ref() {
                    collect_assigned(inner, names);
                }
                if let Some(else_branch) = else_branch {
                    if let Stmt::Block(inner) = else_branch.as_ref() {
                        collect_assigned(inner, names);
                    }
                }
            }
            Stmt::While { body, .. } | Stmt::For { body, .. } => {
                if let Stmt::Block(inner) = body.as_ref() {
                    collect_assigned(inner, names);
                }
            }
            Stmt::TryCatch {
                try_block,
                catch_block,
                ..
            } => {
                if let Stmt::Block(inner) = try_block.as_ref() {
                    collect_assigned(inner, names);
                }
                if let Stmt::Block(inner) = catch_block.as_ref() {
                    collect_assigned(inner, names);
                }
            }
            _ => {}
        }
    }
}

fn references_any(expr: &Expr, names: &HashSet<String>) -> bool {
    match expr {
        Expr::Variable(tok) => names.contains(&tok.lexeme),
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            references_any(left, names) || references_any(right, names)
        }
        Expr::Unary { right, .. } | Expr::Grouping(right) => references_any(right, names),
        Expr::Call { callee, args, .. } => {
            references_any(callee, names) || args.iter().any(|a| references_any(a, names))
        }
        Expr::Get { object, .. } => references_any(object, names),
        Expr::Index { object, index, .. } => references_any(object, names) || references_any(index, names),
        Expr::ListExpr(items) => items.iter().any(|i| references_any(i, names)),
        Expr::Dict { keys, values } => {
            keys.iter().any(|k| references_any(k, names)) || values.iter().any(|v| references_any(v, names))
        }
        _ => false,
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
    fn hoists_invariant_declaration_out_of_while_body() {
        let mut program = parse("var i = 0; while (i < 10) { @immut limit = 100; i = i + 1; }");
        let mut ctx = OptimizationContext::new(OptimizationLevel::O2, false);
        LoopInvariantHoisting.run(&mut program, &mut ctx).unwrap();
        assert!(matches!(&program[1], Stmt::Var { name, .. } if name.lexeme == "limit"));
        assert!(matches!(&program[2], Stmt::While { .. }));
    }

    #[test]
    fn does_not_hoist_a_declaration_that_depends_on_the_loop_variable() {
        let mut program = parse("for (x in items) { @immut doubled = x * 2; print(doubled); }");
        let mut ctx = OptimizationContext::new(OptimizationLevel::O2, false);
        LoopInvariantHoisting.run(&mut program, &mut ctx).unwrap();
        assert!(matches!(&program[0], Stmt::For { .. }));
    }
}
