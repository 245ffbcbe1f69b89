//! Control-flow analysis: locates `while`/`for` loops so later passes (loop
//! invariant hoisting) don't have to re-walk the tree to find their bodies.

use crate::ast::Stmt;
use crate::error::ThornResult;
use crate::optimizer::context::OptimizationContext;
use crate::optimizer::walk::for_each_block_mut;
use crate::optimizer::{OptimizationLevel, OptimizationPass, PassType};

pub struct ControlFlowAnalysis;

impl OptimizationPass for ControlFlowAnalysis {
    fn name(&self) -> &'static str {
        "control-flow-analysis"
    }

    fn pass_type(&self) -> PassType {
        PassType::Analysis
    }

    fn minimum_level(&self) -> OptimizationLevel {
        OptimizationLevel::O1
    }

    fn run(&self, program: &mut Vec<Stmt>, ctx: &mut OptimizationContext) -> ThornResult<()> {
        let mut loops = 0;
        let mut unreachable_after_exit = 0;
        for_each_block_mut(program, &mut |block| {
            let mut seen_exit = false;
            for stmt in block.iter() {
                if seen_exit {
                    unreachable_after_exit += 1;
                }
                match stmt {
                    Stmt::While { .. } | Stmt::For { .. } => loops += 1,
                    Stmt::Return { .. } | Stmt::Throw { .. } => seen_exit = true,
                    _ => {}
                }
            }
        });
        ctx.note(format!(
            "control-flow-analysis: {loops} loop(s), {unreachable_after_exit} unreachable statement(s) flagged"
        ));
        Ok(())
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
    fn counts_loops_and_unreachable_statements() {
        let mut program = parse("while (true) { return 1; print(\"dead\"); }");
        let mut ctx = OptimizationContext::new(OptimizationLevel::O1, true);
        ControlFlowAnalysis.run(&mut program, &mut ctx).unwrap();
        assert!(ctx.notes[0].contains("1 loop"));
        assert!(ctx.notes[0].contains("1 unreachable"));
    }
}
