//! Pass registration, dependency ordering, and sequential execution.

use std::collections::{HashMap, VecDeque};

use crate::ast::Stmt;
use crate::error::{ThornError, ThornResult};
use crate::optimizer::context::OptimizationContext;
use crate::optimizer::{OptimizationLevel, OptimizationPass, PassType};

pub struct Pipeline {
    passes: Vec<Box<dyn OptimizationPass>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// The pipeline every `Thorn` instance runs, ordered the way a reader
    /// would naturally write them; [`Pipeline::ordered`] re-derives the real
    /// execution order from dependencies rather than trusting this order.
    pub fn standard() -> Self {
        use crate::optimizer::passes::*;

        let mut pipeline = Self::new();
        pipeline.register(Box::new(control_flow::ControlFlowAnalysis));
        pipeline.register(Box::new(constant_folding::ConstantFolding));
        pipeline.register(Box::new(copy_propagation::CopyPropagation));
        pipeline.register(Box::new(loop_optimization::LoopInvariantHoisting));
        pipeline.register(Box::new(inlining::FunctionInlining));
        pipeline.register(Box::new(dead_store_elimination::DeadStoreElimination));
        pipeline.register(Box::new(dead_code_elimination::DeadCodeElimination));
        pipeline
    }

    pub fn register(&mut self, pass: Box<dyn OptimizationPass>) {
        self.passes.push(pass);
    }

    /// Kahn's algorithm over the declared `dependencies()`, then a stable
    /// partition into Analysis → Transformation → Cleanup groups so passes
    /// of the same kind keep their dependency-sorted relative order.
    fn ordered(&self) -> ThornResult<Vec<&dyn OptimizationPass>> {
        let index_of: HashMap<&str, usize> = self
            .passes
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name(), i))
            .collect();

        let mut in_degree = vec![0usize; self.passes.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.passes.len()];

        for (i, pass) in self.passes.iter().enumerate() {
            for dep in pass.dependencies() {
                let dep_index = *index_of.get(dep).ok_or_else(|| ThornError::Runtime {
                    line: 0,
                    token: pass.name().to_string(),
                    message: format!("optimization pass '{}' depends on unknown pass '{dep}'", pass.name()),
                })?;
                dependents[dep_index].push(i);
                in_degree[i] += 1;
            }
        }

        let mut queue: VecDeque<usize> = (0..self.passes.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut sorted = Vec::with_capacity(self.passes.len());

        while let Some(i) = queue.pop_front() {
            sorted.push(i);
            for &dependent in &dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if sorted.len() != self.passes.len() {
            return Err(ThornError::Runtime {
                line: 0,
                token: "optimizer".to_string(),
                message: "cyclic dependency among optimization passes".to_string(),
            });
        }

        let mut by_kind: [Vec<usize>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for i in sorted {
            let bucket = match self.passes[i].pass_type() {
                PassType::Analysis => 0,
                PassType::Transformation => 1,
                PassType::Cleanup => 2,
            };
            by_kind[bucket].push(i);
        }

        Ok(by_kind
            .into_iter()
            .flatten()
            .map(|i| self.passes[i].as_ref())
            .collect())
    }

    pub fn run(&self, program: &mut Vec<Stmt>, level: OptimizationLevel, debug: bool) -> ThornResult<OptimizationContext> {
        let mut ctx = OptimizationContext::new(level, debug);
        if level == OptimizationLevel::O0 {
            return Ok(ctx);
        }
        for pass in self.ordered()? {
            if pass.minimum_level() > level {
                continue;
            }
            pass.run(program, &mut ctx)?;
            ctx.note(format!("ran {}", pass.name()));
        }
        Ok(ctx)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn o0_runs_no_passes() {
        let pipeline = Pipeline::standard();
        let mut program = Vec::new();
        let ctx = pipeline.run(&mut program, OptimizationLevel::O0, true).unwrap();
        assert!(ctx.notes.is_empty());
    }
}
