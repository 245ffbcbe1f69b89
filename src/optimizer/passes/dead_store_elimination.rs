//! Drop a write to a variable when it is provably overwritten before ever
//! being read, as long as dropping it can't discard a side effect.

use crate::ast::{Expr, Literal, Stmt};
use crate::error::ThornResult;
use crate::optimizer::context::OptimizationContext;
use crate::optimizer::walk::for_each_block_mut;
use crate::optimizer::{OptimizationLevel, OptimizationPass, PassType};

pub struct DeadStoreElimination;

impl OptimizationPass for DeadStoreElimination {
    fn name(&self) -> &'static str {
        "dead-store-elimination"
    }

    fn pass_type(&self) -> PassType {
        PassType::Cleanup
    }

    fn minimum_level(&self) -> OptimizationLevel {
        OptimizationLevel::O2
    }

    fn dependencies(&self) -> &[&'static str] {
        &["constant-folding", "copy-propagation"]
    }

    fn run(&self, program: &mut Vec<Stmt>, ctx: &mut OptimizationContext) -> ThornResult<()> {
        let mut removed = 0;
        for_each_block_mut(program, &mut |block| eliminate_block(block, &mut removed));
        if removed > 0 {
            ctx.note(format!("dead-store-elimination: dropped {removed} dead store(s)"));
        }
        Ok(())
    }
}

/// A write is "pure" when dropping it cannot lose a side effect: a bare
/// literal, a copy of another variable, or a basic arithmetic/comparison
/// expression over such values.
fn is_pure(expr: &Expr) -> bool {
    match expr {
        Expr::Literal(_) | Expr::Variable(_) => true,
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            is_pure(left) && is_pure(right)
        }
        Expr::Unary { right, .. } | Expr::Grouping(right) => is_pure(right),
        _ => false,
    }
}

fn write_target(stmt: &Stmt) -> Option<(&str, &Expr)> {
    match stmt {
        Stmt::Var {
            name, init: Some(init), ..
        } => Some((name.lexeme.as_str(), init)),
        Stmt::Expression(Expr::Assign { name, value }) => Some((name.lexeme.as_str(), value)),
        _ => None,
    }
}

fn references(expr: &Expr, name: &str) -> bool {
    match expr {
        Expr::Variable(tok) => tok.lexeme == name,
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            references(left, name) || references(right, name)
        }
        Expr::Unary { right, .. } | Expr::Grouping(right) => references(right, name),
        Expr::Assign { value, .. } => references(value, name),
        Expr::Call { callee, args, .. } => {
            references(callee, name) || args.iter().any(|a| references(a, name))
        }
        Expr::Get { object, .. } => references(object, name),
        Expr::Set { object, value, .. } => references(object, name) || references(value, name),
        Expr::Index { object, index, .. } => references(object, name) || references(index, name),
        Expr::IndexSet { object, index, value, .. } => {
            references(object, name) || references(index, name) || references(value, name)
        }
        Expr::ListExpr(items) => items.iter().any(|i| references(i, name)),
        Expr::Dict { keys, values } => {
            keys.iter().any(|k| references(k, name)) || values.iter().any(|v| references(v, name))
        }
        _ => false,
    }
}

/// Any expression reachable from a statement, used to decide whether a
/// pending dead store survives to this point. Branching statements are
/// treated as reads unconditionally: their bodies are separate blocks as far
/// as `for_each_block_mut` is concerned, so a dead store can't safely be
/// proven to straddle one.
fn stmt_reads(stmt: &Stmt, name: &str) -> bool {
    match stmt {
        Stmt::Expression(e) => references(e, name),
        Stmt::Return { value: Some(v), .. } => references(v, name),
        Stmt::Throw { value, .. } => references(value, name),
        Stmt::Var { init: Some(v), .. } => references(v, name),
        Stmt::If { .. } | Stmt::While { .. } | Stmt::For { .. } | Stmt::TryCatch { .. } => true,
        _ => false,
    }
}

fn eliminate_block(block: &mut Vec<Stmt>, removed: &mut usize) {
    let mut to_delete = Vec::new();

    for i in 0..block.len() {
        let Some((name, init)) = write_target(&block[i]) else {
            continue;
        };
        if !is_pure(init) {
            continue;
        }
        let name = name.to_string();

        for stmt in &block[i + 1..] {
            if stmt_reads(stmt, &name) {
                break;
            }
            if let Some((other_name, _)) = write_target(stmt) {
                if other_name == name {
                    to_delete.push(i);
                    break;
                }
            }
        }
    }

    for &i in to_delete.iter().rev() {
        if let Stmt::Var { init, .. } = &mut block[i] {
            // Keep the declaration (later reads may still rely on the name
            // existing) but drop its now-useless initializer.
            *init = None;
        } else {
            block.remove(i);
        }
    }
    *removed += to_delete.len();
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
    fn drops_overwritten_assignment() {
        let mut program = parse("var x = 1; x = 2; print(x);");
        let mut ctx = OptimizationContext::new(OptimizationLevel::O2, false);
        DeadStoreElimination.run(&mut program, &mut ctx).unwrap();
        let Stmt::Var { init, .. } = &program[0] else {
            panic!("expected var declaration")
        };
        assert!(init.is_none());
    }

    #[test]
    fn keeps_store_that_is_read() {
        let mut program = parse("var x = 1; print(x); x = 2;");
        let mut ctx = OptimizationContext::new(OptimizationLevel::O2, false);
        DeadStoreElimination.run(&mut program, &mut ctx).unwrap();
        let Stmt::Var { init, .. } = &program[0] else {
            panic!("expected var declaration")
        };
        assert!(init.is_some());
    }
}
