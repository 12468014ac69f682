//! Loop-invariant code motion.

use std::collections::{HashMap, HashSet};

use super::constant_fold::fold_program;
use crate::ast::{Ast, BinaryOp, Literal, LoopOptMetadata, NodeId, NodeKind};

#[derive(Debug, Clone, Default)]
pub struct LicmStats {
    pub invariants_hoisted: u32,
    pub loops_optimized: u32,
    pub guard_fusions: u32,
    pub redundant_guard_fusions: u32,
}

pub fn run_licm(ast: &mut Ast, root: NodeId) -> LicmStats {
    let mut stats = LicmStats::default();
    let kind = ast.kind(root).clone();
    match kind {
        NodeKind::Program(mut stmts) => {
            process_list(ast, &mut stmts, &mut stats);
            ast.replace_kind(root, NodeKind::Program(stmts));
        }
        NodeKind::Block(mut stmts) => {
            process_list(ast, &mut stmts, &mut stats);
            ast.replace_kind(root, NodeKind::Block(stmts));
        }
        _ => {
            let mut wrapper = vec![root];
            process_list(ast, &mut wrapper, &mut stats);
        }
    }
    stats
}

fn process_list(ast: &mut Ast, list: &mut Vec<NodeId>, stats: &mut LicmStats) {
    let mut i = 0;
    while i < list.len() {
        let id = list[i];
        let kind = ast.kind(id).clone();
        match kind {
            NodeKind::Program(mut inner) => {
                process_list(ast, &mut inner, stats);
                ast.replace_kind(id, NodeKind::Program(inner));
            }
            NodeKind::Block(mut inner) => {
                process_list(ast, &mut inner, stats);
                ast.replace_kind(id, NodeKind::Block(inner));
            }
            NodeKind::If { cond, mut then_branch, mut else_branch } => {
                process_list(ast, &mut then_branch, stats);
                if let Some(eb) = &mut else_branch {
                    process_list(ast, eb, stats);
                }
                ast.replace_kind(id, NodeKind::If { cond, then_branch, else_branch });
            }
            NodeKind::Function { name, params, return_type, mut body, is_pub } => {
                process_list(ast, &mut body, stats);
                ast.replace_kind(
                    id,
                    NodeKind::Function { name, params, return_type, body, is_pub },
                );
            }
            NodeKind::Impl { type_name, mut methods } => {
                process_list(ast, &mut methods, stats);
                ast.replace_kind(id, NodeKind::Impl { type_name, methods });
            }
            NodeKind::Try { body: mut try_body, catch_name, catch_body: mut cb } => {
                process_list(ast, &mut try_body, stats);
                process_list(ast, &mut cb, stats);
                ast.replace_kind(
                    id,
                    NodeKind::Try { body: try_body, catch_name, catch_body: cb },
                );
            }
            NodeKind::Match { subject, mut arms, has_wildcard } => {
                for arm in arms.iter_mut() {
                    process_list(ast, &mut arm.body, stats);
                }
                ast.replace_kind(id, NodeKind::Match { subject, arms, has_wildcard });
            }
            NodeKind::While { label, cond, mut body } => {
                process_list(ast, &mut body, stats);
                let hoisted = hoist_loop_body(ast, &mut body, stats);
                ast.replace_kind(id, NodeKind::While { label, cond, body });
                if !hoisted.is_empty() {
                    insert_hoisted(ast, id, list, i, hoisted, stats);
                }
            }
            NodeKind::ForRange { label, var, start, end, step, inclusive, mut body } => {
                process_list(ast, &mut body, stats);
                let hoisted = hoist_loop_body(ast, &mut body, stats);
                ast.replace_kind(
                    id,
                    NodeKind::ForRange { label, var, start, end, step, inclusive, body },
                );
                if !hoisted.is_empty() {
                    insert_hoisted(ast, id, list, i, hoisted, stats);
                }
            }
            NodeKind::ForIter { label, var, iterable, mut body } => {
                process_list(ast, &mut body, stats);
                let hoisted = hoist_loop_body(ast, &mut body, stats);
                ast.replace_kind(id, NodeKind::ForIter { label, var, iterable, body });
                if !hoisted.is_empty() {
                    insert_hoisted(ast, id, list, i, hoisted, stats);
                }
            }
            _ => {}
        }
        i += 1;
    }
}

fn insert_hoisted(
    ast: &mut Ast,
    loop_id: NodeId,
    list: &mut Vec<NodeId>,
    loop_pos: usize,
    hoisted: Vec<NodeId>,
    stats: &mut LicmStats,
) {
    stats.loops_optimized += 1;
    stats.invariants_hoisted += hoisted.len() as u32;
    let count = hoisted.len() as u32;
    for (offset, stmt) in hoisted.into_iter().enumerate() {
        fold_program(ast, stmt);
        list.insert(loop_pos + offset, stmt);
    }
    let escape_mask = if count >= 32 { u32::MAX } else { (1u32 << count) - 1 };
    ast.get_mut(loop_id).loop_meta = Some(LoopOptMetadata {
        typed_guard_witness: true,
        typed_metadata_stable: true,
        escape_mask,
    });
}

/// Collects every name declared (`VarDecl`) and every name written
/// (`Assign`) anywhere in `body`. Does not descend into nested function
/// bodies — a function defined inside a loop has its own scope and its own
/// invariance analysis when it is itself compiled.
fn collect_locals_and_mutations(
    ast: &Ast,
    body: &[NodeId],
    locals: &mut HashSet<String>,
    mutated: &mut HashMap<String, u32>,
) {
    for &id in body {
        walk_collect(ast, id, locals, mutated);
    }
}

fn walk_collect(
    ast: &Ast,
    id: NodeId,
    locals: &mut HashSet<String>,
    mutated: &mut HashMap<String, u32>,
) {
    match ast.kind(id) {
        NodeKind::Function { .. } => {}
        NodeKind::Program(stmts) | NodeKind::Block(stmts) => {
            for &s in stmts {
                walk_collect(ast, s, locals, mutated);
            }
        }
        NodeKind::VarDecl { name, init, .. } => {
            locals.insert(name.clone());
            if let Some(init) = init {
                walk_collect(ast, *init, locals, mutated);
            }
        }
        NodeKind::Assign { target, value, .. } => {
            if let NodeKind::Identifier(name) = ast.kind(*target) {
                *mutated.entry(name.clone()).or_insert(0) += 1;
            }
            walk_collect(ast, *value, locals, mutated);
        }
        NodeKind::If { cond, then_branch, else_branch } => {
            walk_collect(ast, *cond, locals, mutated);
            for &s in then_branch {
                walk_collect(ast, s, locals, mutated);
            }
            if let Some(eb) = else_branch {
                for &s in eb {
                    walk_collect(ast, s, locals, mutated);
                }
            }
        }
        NodeKind::While { cond, body, .. } => {
            walk_collect(ast, *cond, locals, mutated);
            for &s in body {
                walk_collect(ast, s, locals, mutated);
            }
        }
        NodeKind::ForRange { var, start, end, step, body, .. } => {
            locals.insert(var.clone());
            walk_collect(ast, *start, locals, mutated);
            walk_collect(ast, *end, locals, mutated);
            if let Some(step) = step {
                walk_collect(ast, *step, locals, mutated);
            }
            for &s in body {
                walk_collect(ast, s, locals, mutated);
            }
        }
        NodeKind::ForIter { var, iterable, body, .. } => {
            locals.insert(var.clone());
            walk_collect(ast, *iterable, locals, mutated);
            for &s in body {
                walk_collect(ast, s, locals, mutated);
            }
        }
        NodeKind::Binary { left, right, .. } => {
            walk_collect(ast, *left, locals, mutated);
            walk_collect(ast, *right, locals, mutated);
        }
        NodeKind::Unary { operand, .. } => walk_collect(ast, *operand, locals, mutated),
        NodeKind::Cast { expr, .. } => walk_collect(ast, *expr, locals, mutated),
        NodeKind::Ternary { cond, then_expr, else_expr } => {
            walk_collect(ast, *cond, locals, mutated);
            walk_collect(ast, *then_expr, locals, mutated);
            walk_collect(ast, *else_expr, locals, mutated);
        }
        NodeKind::Call { args, .. } => {
            for &a in args {
                walk_collect(ast, a, locals, mutated);
            }
        }
        NodeKind::Print { args, .. } => {
            for &a in args {
                walk_collect(ast, a, locals, mutated);
            }
        }
        NodeKind::Return(Some(expr)) => walk_collect(ast, *expr, locals, mutated),
        NodeKind::MemberAccess { object, .. } => walk_collect(ast, *object, locals, mutated),
        NodeKind::IndexAccess { object, index } => {
            walk_collect(ast, *object, locals, mutated);
            walk_collect(ast, *index, locals, mutated);
        }
        _ => {}
    }
}

/// An expression is invariant iff it is a literal, an identifier referring
/// to a name outside both `locals` and `mutated` (or already hoisted), or a
/// binary/unary/cast built from invariants.
fn is_invariant(
    ast: &Ast,
    id: NodeId,
    locals: &HashSet<String>,
    mutated: &HashMap<String, u32>,
    hoisted_names: &HashSet<String>,
) -> bool {
    match ast.kind(id) {
        NodeKind::Literal { .. } => true,
        NodeKind::Identifier(name) => {
            hoisted_names.contains(name) || (!locals.contains(name) && !mutated.contains_key(name))
        }
        NodeKind::Binary { left, right, .. } => {
            is_invariant(ast, *left, locals, mutated, hoisted_names)
                && is_invariant(ast, *right, locals, mutated, hoisted_names)
        }
        NodeKind::Unary { operand, .. } => is_invariant(ast, *operand, locals, mutated, hoisted_names),
        NodeKind::Cast { expr, .. } => is_invariant(ast, *expr, locals, mutated, hoisted_names),
        _ => false,
    }
}

fn hoist_loop_body(ast: &mut Ast, body: &mut Vec<NodeId>, stats: &mut LicmStats) -> Vec<NodeId> {
    let mut locals = HashSet::new();
    let mut mutated = HashMap::new();
    collect_locals_and_mutations(ast, body, &mut locals, &mut mutated);

    let mut hoisted = Vec::new();
    let mut hoisted_names: HashSet<String> = HashSet::new();
    let mut remaining = Vec::with_capacity(body.len());

    for &id in body.iter() {
        let hoistable = match ast.kind(id).clone() {
            NodeKind::VarDecl { ref name, init: Some(init), .. } => {
                let never_reassigned = mutated.get(name).copied().unwrap_or(0) == 0;
                never_reassigned && is_invariant(ast, init, &locals, &mutated, &hoisted_names)
            }
            NodeKind::Assign { target, value, .. } => {
                if let NodeKind::Identifier(name) = ast.kind(target) {
                    let not_a_local = !locals.contains(name);
                    let written_once = mutated.get(name).copied().unwrap_or(0) == 1;
                    not_a_local && written_once && is_invariant(ast, value, &locals, &mutated, &hoisted_names)
                } else {
                    false
                }
            }
            _ => false,
        };

        if hoistable {
            if let NodeKind::VarDecl { name, .. } = ast.kind(id) {
                hoisted_names.insert(name.clone());
            }
            hoisted.push(id);
        } else {
            remaining.push(id);
        }
    }

    *body = remaining;
    fuse_guards(ast, &hoisted, stats);
    hoisted
}

/// When two consecutive hoisted statements are boolean guards of the shape
/// `g2 := g1 and base` where `g1` is the previous guard's name with the
/// same `base`, rewrites `g2`'s initializer to just `g1`.
fn fuse_guards(ast: &mut Ast, hoisted: &[NodeId], stats: &mut LicmStats) {
    for pair in hoisted.windows(2) {
        let (g1_id, g2_id) = (pair[0], pair[1]);
        let g1 = match ast.kind(g1_id).clone() {
            NodeKind::VarDecl { name, init: Some(init), .. } => Some((name, init)),
            _ => None,
        };
        let Some((g1_name, g1_init)) = g1 else { continue };
        let g1_base = match ast.kind(g1_init) {
            NodeKind::Binary { op: BinaryOp::And, right, .. } => Some(*right),
            _ => None,
        };
        let Some(g1_base) = g1_base else { continue };

        let g2 = match ast.kind(g2_id).clone() {
            NodeKind::VarDecl { name, is_mut, is_const, type_ann, init: Some(init) } => {
                Some((name, is_mut, is_const, type_ann, init))
            }
            _ => None,
        };
        let Some((g2_name, is_mut, is_const, type_ann, g2_init)) = g2 else { continue };

        let matches = match ast.kind(g2_init) {
            NodeKind::Binary { op: BinaryOp::And, left, right } => {
                let left_is_g1 = matches!(ast.kind(*left), NodeKind::Identifier(n) if *n == g1_name);
                left_is_g1 && nodes_structurally_equal(ast, *right, g1_base)
            }
            _ => false,
        };

        if matches {
            let replacement = ast.alloc(NodeKind::Identifier(g1_name), Default::default());
            ast.replace_kind(
                g2_id,
                NodeKind::VarDecl {
                    name: g2_name,
                    is_mut,
                    is_const,
                    type_ann,
                    init: Some(replacement),
                },
            );
            stats.guard_fusions += 1;
            stats.redundant_guard_fusions += 1;
        }
    }
}

fn nodes_structurally_equal(ast: &Ast, a: NodeId, b: NodeId) -> bool {
    match (ast.kind(a), ast.kind(b)) {
        (NodeKind::Identifier(x), NodeKind::Identifier(y)) => x == y,
        (NodeKind::Literal { value: Literal::Int(x), .. }, NodeKind::Literal { value: Literal::Int(y), .. }) => x == y,
        (NodeKind::Literal { value: Literal::Bool(x), .. }, NodeKind::Literal { value: Literal::Bool(y), .. }) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Ast, AssignOp, Location};

    fn ident(ast: &mut Ast, name: &str) -> NodeId {
        ast.alloc(NodeKind::Identifier(name.to_string()), Location::default())
    }

    fn int_lit(ast: &mut Ast, v: i64) -> NodeId {
        ast.alloc(
            NodeKind::Literal { value: Literal::Int(v), has_explicit_suffix: false },
            Location::default(),
        )
    }

    /// `k = 2 * n` hoists out of the loop body.
    #[test]
    fn hoists_loop_invariant_assignment() {
        let mut ast = Ast::new();
        let n_init = int_lit(&mut ast, 10);
        let n_decl = ast.alloc(
            NodeKind::VarDecl { name: "n".into(), is_mut: false, is_const: false, type_ann: None, init: Some(n_init) },
            Location::default(),
        );

        let two = int_lit(&mut ast, 2);
        let n_ref = ident(&mut ast, "n");
        let k_init = ast.alloc(
            NodeKind::Binary { op: BinaryOp::Mul, left: two, right: n_ref },
            Location::default(),
        );
        let k_target = ident(&mut ast, "k");
        let k_assign = ast.alloc(
            NodeKind::Assign { op: AssignOp::Assign, target: k_target, value: k_init },
            Location::default(),
        );

        let i_ref = ident(&mut ast, "i");
        let k_ref = ident(&mut ast, "k");
        let s_ref_for_rhs = ident(&mut ast, "s");
        let k_plus_i = ast.alloc(
            NodeKind::Binary { op: BinaryOp::Add, left: k_ref, right: i_ref },
            Location::default(),
        );
        let s_plus_k_i = ast.alloc(
            NodeKind::Binary { op: BinaryOp::Add, left: s_ref_for_rhs, right: k_plus_i },
            Location::default(),
        );
        let s_target = ident(&mut ast, "s");
        let s_assign = ast.alloc(
            NodeKind::Assign { op: AssignOp::Assign, target: s_target, value: s_plus_k_i },
            Location::default(),
        );

        let start = int_lit(&mut ast, 0);
        let end = ident(&mut ast, "n");
        let for_loop = ast.alloc(
            NodeKind::ForRange {
                label: None,
                var: "i".into(),
                start,
                end,
                step: None,
                inclusive: false,
                body: vec![k_assign, s_assign],
            },
            Location::default(),
        );

        let program = ast.alloc(NodeKind::Program(vec![n_decl, for_loop]), Location::default());

        let stats = run_licm(&mut ast, program);
        assert_eq!(stats.invariants_hoisted, 1);
        assert_eq!(stats.loops_optimized, 1);

        match ast.kind(program) {
            NodeKind::Program(stmts) => {
                assert_eq!(stmts.len(), 3);
                assert_eq!(stmts[1], k_assign);
                match ast.kind(stmts[2]) {
                    NodeKind::ForRange { body, .. } => assert_eq!(body, &vec![s_assign]),
                    other => panic!("expected for loop, got {:?}", other),
                }
            }
            other => panic!("expected program, got {:?}", other),
        }
    }

    /// `g2 = g1 and b` fuses to `g2 = g1`.
    #[test]
    fn fuses_redundant_guards() {
        let mut ast = Ast::new();
        let a = ident(&mut ast, "a");
        let b1 = ident(&mut ast, "b");
        let g1_init = ast.alloc(
            NodeKind::Binary { op: BinaryOp::And, left: a, right: b1 },
            Location::default(),
        );
        let g1_decl = ast.alloc(
            NodeKind::VarDecl { name: "g1".into(), is_mut: false, is_const: false, type_ann: None, init: Some(g1_init) },
            Location::default(),
        );

        let g1_ref = ident(&mut ast, "g1");
        let b2 = ident(&mut ast, "b");
        let g2_init = ast.alloc(
            NodeKind::Binary { op: BinaryOp::And, left: g1_ref, right: b2 },
            Location::default(),
        );
        let g2_decl = ast.alloc(
            NodeKind::VarDecl { name: "g2".into(), is_mut: false, is_const: false, type_ann: None, init: Some(g2_init) },
            Location::default(),
        );

        let body_noop = ast.alloc(NodeKind::Pass, Location::default());
        let cond = ast.alloc(
            NodeKind::Literal { value: Literal::Bool(true), has_explicit_suffix: false },
            Location::default(),
        );
        let while_loop = ast.alloc(
            NodeKind::While { label: None, cond, body: vec![g1_decl, g2_decl, body_noop] },
            Location::default(),
        );
        let program = ast.alloc(NodeKind::Program(vec![while_loop]), Location::default());

        let stats = run_licm(&mut ast, program);
        assert_eq!(stats.redundant_guard_fusions, 1);

        match ast.kind(g2_decl) {
            NodeKind::VarDecl { init: Some(init), .. } => match ast.kind(*init) {
                NodeKind::Identifier(name) => assert_eq!(name, "g1"),
                other => panic!("expected fused identifier, got {:?}", other),
            },
            other => panic!("expected var decl, got {:?}", other),
        }
    }

    #[test]
    fn idempotent_on_an_already_hoisted_loop() {
        let mut ast = Ast::new();
        let two = int_lit(&mut ast, 2);
        let decl = ast.alloc(
            NodeKind::VarDecl { name: "k".into(), is_mut: false, is_const: false, type_ann: None, init: Some(two) },
            Location::default(),
        );
        let cond = ast.alloc(
            NodeKind::Literal { value: Literal::Bool(false), has_explicit_suffix: false },
            Location::default(),
        );
        let while_loop = ast.alloc(
            NodeKind::While { label: None, cond, body: vec![] },
            Location::default(),
        );
        let program = ast.alloc(NodeKind::Program(vec![decl, while_loop]), Location::default());

        run_licm(&mut ast, program);
        let stats_second = run_licm(&mut ast, program);
        assert_eq!(stats_second.invariants_hoisted, 0);
    }
}
