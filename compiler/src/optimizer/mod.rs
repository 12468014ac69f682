//! Optimizer orchestration: constant folding, dead-branch elimination, and
//! loop-invariant code motion.
//!
//! One entry point (`optimize`) runs its sub-passes in sequence over the
//! AST and returns an `OptimizationStats` report so callers and tests can
//! see what actually changed without re-walking the tree themselves.

mod constant_fold;
mod licm;

use crate::ast::{Ast, NodeId};

pub use constant_fold::fold_program;
pub use licm::run_licm;

#[derive(Debug, Clone, Default)]
pub struct OptimizationStats {
    pub invariants_hoisted: u32,
    pub loops_optimized: u32,
    pub guard_fusions: u32,
    pub redundant_guard_fusions: u32,
    pub changed: bool,
}

/// Runs constant folding followed by LICM. LICM runs on the AST after scope
/// analysis and before emission; folding runs first so LICM's invariance
/// test sees already-folded literals.
pub fn optimize(ast: &mut Ast, root: NodeId) -> OptimizationStats {
    let fold_changed = fold_program(ast, root);
    let licm_stats = run_licm(ast, root);

    OptimizationStats {
        invariants_hoisted: licm_stats.invariants_hoisted,
        loops_optimized: licm_stats.loops_optimized,
        guard_fusions: licm_stats.guard_fusions,
        redundant_guard_fusions: licm_stats.redundant_guard_fusions,
        changed: fold_changed || licm_stats.invariants_hoisted > 0 || licm_stats.loops_optimized > 0,
    }
}
