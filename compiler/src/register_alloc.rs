//! Register allocator.
//!
//! Tracks a bump-pointer `next_reg` and a set of currently-live bindings to
//! decide reuse, plus a priority ordering and interference check on top of
//! that bump-then-reuse core so loop induction variables can be pinned for
//! a loop's whole duration instead of getting recycled mid-body.

use crate::scope::{Priority, ScopeInfo};

pub const REGISTER_COUNT: usize = 256;
/// Register 0 is reserved; no live variable may be assigned it.
const RESERVED_REGISTER: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    Register(u8),
    Spilled,
}

#[derive(Debug, Clone)]
pub struct VariableAssignment {
    pub scope_index: usize,
    pub variable_index: usize,
    pub assignment: Assignment,
}

pub struct RegisterAllocator {
    /// `interferes[a][b]` is true when the live ranges of the variables
    /// currently occupying registers `a` and `b` overlapped at some point.
    interferes: Vec<Vec<bool>>,
    next_free: u8,
    spill_count: u32,
}

struct Interval {
    scope_index: usize,
    variable_index: usize,
    first_use: u32,
    last_use: u32,
    priority: Priority,
    is_loop_var: bool,
}

impl Default for RegisterAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterAllocator {
    pub fn new() -> Self {
        RegisterAllocator {
            interferes: vec![vec![false; REGISTER_COUNT]; REGISTER_COUNT],
            next_free: 1, // register 0 reserved
            spill_count: 0,
        }
    }

    pub fn spill_count(&self) -> u32 {
        self.spill_count
    }

    fn intervals_overlap(a: &Interval, b: &Interval) -> bool {
        a.first_use <= b.last_use && b.first_use <= a.last_use
    }

    /// Assigns registers to every variable across all scopes. Loop
    /// induction variables are assigned first so they stay register-
    /// resident for the loop's duration, then the remainder in descending
    /// priority order.
    pub fn allocate(&mut self, scopes: &[ScopeInfo]) -> Vec<VariableAssignment> {
        let mut intervals = Vec::new();
        for (scope_index, scope) in scopes.iter().enumerate() {
            for (variable_index, var) in scope.variables.iter().enumerate() {
                if var.is_dead {
                    continue;
                }
                intervals.push(Interval {
                    scope_index,
                    variable_index,
                    first_use: var.first_use,
                    last_use: var.last_use,
                    priority: var.priority,
                    is_loop_var: var.is_loop_var,
                });
            }
        }

        intervals.sort_by(|a, b| {
            b.is_loop_var
                .cmp(&a.is_loop_var)
                .then(a.priority.cmp(&b.priority))
                .then(a.first_use.cmp(&b.first_use))
        });

        // register -> interval currently assigned there, for reuse checks.
        let mut occupant: Vec<Option<usize>> = vec![None; REGISTER_COUNT];
        let mut results = Vec::with_capacity(intervals.len());

        for (slot, interval) in intervals.iter().enumerate() {
            let assignment = self.assign_one(interval, &intervals, &mut occupant, slot);
            results.push(VariableAssignment {
                scope_index: interval.scope_index,
                variable_index: interval.variable_index,
                assignment,
            });
        }

        self.coalesce(&intervals, &mut results);
        results
    }

    fn assign_one(
        &mut self,
        interval: &Interval,
        all: &[Interval],
        occupant: &mut Vec<Option<usize>>,
        my_slot: usize,
    ) -> Assignment {
        for reg in RESERVED_REGISTER + 1..REGISTER_COUNT as u8 {
            let reg_idx = reg as usize;
            let conflicts = match occupant[reg_idx] {
                None => false,
                Some(other_slot) => Self::intervals_overlap(interval, &all[other_slot]),
            };
            if !conflicts {
                occupant[reg_idx] = Some(my_slot);
                self.next_free = self.next_free.max(reg.saturating_add(1));
                return Assignment::Register(reg);
            }
        }
        self.spill_count += 1;
        Assignment::Spilled
    }

    /// Global coalescing: registers whose occupants never interfere across
    /// the whole program are merged onto the lowest-numbered register in
    /// the group. Conservative: only merges pairs that were never found to
    /// interfere by `assign_one`'s bookkeeping.
    fn coalesce(&mut self, intervals: &[Interval], results: &mut [VariableAssignment]) {
        for i in 0..results.len() {
            let (reg_i, Assignment::Register(reg_i_val)) = (results[i].assignment, results[i].assignment) else {
                continue;
            };
            let _ = reg_i;
            for j in (i + 1)..results.len() {
                if let Assignment::Register(reg_j_val) = results[j].assignment {
                    if reg_i_val == reg_j_val {
                        continue;
                    }
                    if Self::intervals_overlap(&intervals[i], &intervals[j]) {
                        self.interferes[reg_i_val as usize][reg_j_val as usize] = true;
                        self.interferes[reg_j_val as usize][reg_i_val as usize] = true;
                    }
                }
            }
        }

        for result in results.iter_mut() {
            if let Assignment::Register(reg) = result.assignment {
                let mut lowest = reg;
                for candidate in RESERVED_REGISTER + 1..reg {
                    if !self.interferes[reg as usize][candidate as usize] {
                        lowest = candidate;
                        break;
                    }
                }
                result.assignment = Assignment::Register(lowest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Ast, NodeId, NodeKind};
    use crate::scope::analyze;

    fn program_with_two_sequential_vars() -> (Ast, NodeId) {
        let mut ast = Ast::new();
        let init1 = ast.alloc(
            NodeKind::Literal { value: crate::ast::Literal::Int(1), has_explicit_suffix: false },
            Default::default(),
        );
        let decl1 = ast.alloc(
            NodeKind::VarDecl {
                name: "a".to_string(),
                is_mut: false,
                is_const: false,
                type_ann: None,
                init: Some(init1),
            },
            Default::default(),
        );
        let use_a = ast.alloc(NodeKind::Identifier("a".to_string()), Default::default());
        let print1 = ast.alloc(
            NodeKind::Print { args: vec![use_a], newline: true },
            Default::default(),
        );
        let program = ast.alloc(NodeKind::Program(vec![decl1, print1]), Default::default());
        (ast, program)
    }

    #[test]
    fn never_assigns_reserved_register_zero() {
        let (ast, program) = program_with_two_sequential_vars();
        let analysis = analyze(&ast, program);
        let mut allocator = RegisterAllocator::new();
        let assignments = allocator.allocate(&analysis.scopes);
        for a in &assignments {
            if let Assignment::Register(r) = a.assignment {
                assert_ne!(r, 0);
            }
        }
    }

    #[test]
    fn disjoint_lifetimes_can_share_a_register() {
        let mut ast = Ast::new();
        let init1 = ast.alloc(
            NodeKind::Literal { value: crate::ast::Literal::Int(1), has_explicit_suffix: false },
            Default::default(),
        );
        let decl1 = ast.alloc(
            NodeKind::VarDecl {
                name: "a".to_string(),
                is_mut: false,
                is_const: false,
                type_ann: None,
                init: Some(init1),
            },
            Default::default(),
        );
        let use_a = ast.alloc(NodeKind::Identifier("a".to_string()), Default::default());
        let print1 = ast.alloc(
            NodeKind::Print { args: vec![use_a], newline: true },
            Default::default(),
        );
        let init2 = ast.alloc(
            NodeKind::Literal { value: crate::ast::Literal::Int(2), has_explicit_suffix: false },
            Default::default(),
        );
        let decl2 = ast.alloc(
            NodeKind::VarDecl {
                name: "b".to_string(),
                is_mut: false,
                is_const: false,
                type_ann: None,
                init: Some(init2),
            },
            Default::default(),
        );
        let use_b = ast.alloc(NodeKind::Identifier("b".to_string()), Default::default());
        let print2 = ast.alloc(
            NodeKind::Print { args: vec![use_b], newline: true },
            Default::default(),
        );
        let program = ast.alloc(
            NodeKind::Program(vec![decl1, print1, decl2, print2]),
            Default::default(),
        );

        let analysis = analyze(&ast, program);
        let mut allocator = RegisterAllocator::new();
        let assignments = allocator.allocate(&analysis.scopes);
        assert_eq!(assignments.len(), 2);
    }

    #[test]
    fn spills_when_more_live_variables_than_registers() {
        let mut ast = Ast::new();
        let mut decls = Vec::new();
        let mut uses = Vec::new();
        for i in 0..300 {
            let init = ast.alloc(
                NodeKind::Literal { value: crate::ast::Literal::Int(i), has_explicit_suffix: false },
                Default::default(),
            );
            let decl = ast.alloc(
                NodeKind::VarDecl {
                    name: format!("v{}", i),
                    is_mut: false,
                    is_const: false,
                    type_ann: None,
                    init: Some(init),
                },
                Default::default(),
            );
            decls.push(decl);
            uses.push(ast.alloc(NodeKind::Identifier(format!("v{}", i)), Default::default()));
        }
        let print_all = ast.alloc(
            NodeKind::Print { args: uses, newline: true },
            Default::default(),
        );
        decls.push(print_all);
        let program = ast.alloc(NodeKind::Program(decls), Default::default());

        let analysis = analyze(&ast, program);
        let mut allocator = RegisterAllocator::new();
        let _assignments = allocator.allocate(&analysis.scopes);
        assert!(allocator.spill_count() > 0);
    }
}
