//! Drop statements that can never run: anything after a `return`/`throw` in
//! the same block, and the dead branch of an `if` whose condition folded to
//! a literal `true`/`false`.

use crate::ast::{Expr, Literal, Stmt};
use crate::error::ThornResult;
use crate::optimizer::context::OptimizationContext;
use crate::optimizer::walk::for_each_block_mut;
use crate::optimizer::{OptimizationLevel, OptimizationPass, PassType};

pub struct DeadCodeElimination;

impl OptimizationPass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dead-code-elimination"
    }

    fn pass_type(&self) -> PassType {
        PassType::Cleanup
    }

    fn minimum_level(&self) -> OptimizationLevel {
        OptimizationLevel::O1
    }

    fn dependencies(&self) -> &[&'static str] {
        &["constant-folding"]
    }

    fn run(&self, program: &mut Vec<Stmt>, ctx: &mut OptimizationContext) -> ThornResult<()> {
        let mut unreachable = 0;
        let mut collapsed = 0;
        for_each_block_mut(program, &mut |block| {
            unreachable += truncate_after_exit(block);
            collapsed += collapse_constant_ifs(block);
        });
        if unreachable > 0 || collapsed > 0 {
            ctx.note(format!(
                "dead-code-elimination: removed {unreachable} unreachable statement(s), collapsed {collapsed} constant if(s)"
            ));
        }
        Ok(())
    }
}

fn truncate_after_exit(block: &mut Vec<Stmt>) -> usize {
    let Some(idx) = block
        .iter()
        .position(|s| matches!(s, Stmt::Return { .. } | Stmt::Throw { .. }))
    else {
        return 0;
    };
    let dropped = block.len() - (idx + 1);
    block.truncate(idx + 1);
    dropped
}

fn collapse_constant_ifs(block: &mut Vec<Stmt>) -> usize {
    let mut collapsed = 0;
    let old = std::mem::take(block);
    let mut rebuilt = Vec::with_capacity(old.len());

    for stmt in old {
        match stmt {
            Stmt::If {
                condition: Expr::Literal(Literal::Bool(true)),
                then_branch,
                ..
            } => {
                collapsed += 1;
                rebuilt.push(*then_branch);
            }
            Stmt::If {
                condition: Expr::Literal(Literal::Bool(false)),
                else_branch: Some(else_branch),
                ..
            } => {
                collapsed += 1;
                rebuilt.push(*else_branch);
            }
            Stmt::If {
                condition: Expr::Literal(Literal::Bool(false)),
                else_branch: None,
                ..
            } => {
                collapsed += 1;
            }
            other => rebuilt.push(other),
        }
    }

    *block = rebuilt;
    collapsed
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
    fn drops_statements_after_return() {
        let mut program = parse("$ f() { return 1; print(\"dead\"); }");
        let mut ctx = OptimizationContext::new(OptimizationLevel::O1, false);
        DeadCodeElimination.run(&mut program, &mut ctx).unwrap();
        let Stmt::Function(decl) = &program[0] else {
            panic!("expected function declaration")
        };
        assert_eq!(decl.body.len(), 1);
    }

    #[test]
    fn collapses_if_true_to_its_then_branch() {
        let mut program = parse("if (true) { print(\"always\"); } else { print(\"never\"); }");
        let mut ctx = OptimizationContext::new(OptimizationLevel::O1, false);
        DeadCodeElimination.run(&mut program, &mut ctx).unwrap();
        assert!(matches!(&program[0], Stmt::Block(stmts) if stmts.len() == 1));
    }
}
