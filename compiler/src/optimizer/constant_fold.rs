//! Constant folding and dead-branch elimination.

use crate::ast::{Ast, BinaryOp, Literal, NodeId, NodeKind, UnaryOp};

/// Folds every foldable expression in the tree reachable from `root`,
/// post-order so nested constant subexpressions fold before their parents
/// are inspected. Returns whether anything changed.
pub fn fold_program(ast: &mut Ast, root: NodeId) -> bool {
    fold_node(ast, root)
}

fn fold_block(ast: &mut Ast, ids: &[NodeId]) -> bool {
    let mut changed = false;
    for &id in ids {
        changed |= fold_node(ast, id);
    }
    changed
}

fn literal_of(ast: &Ast, id: NodeId) -> Option<Literal> {
    match ast.kind(id) {
        NodeKind::Literal { value, .. } => Some(value.clone()),
        _ => None,
    }
}

fn set_literal(ast: &mut Ast, id: NodeId, value: Literal) {
    ast.replace_kind(
        id,
        NodeKind::Literal { value, has_explicit_suffix: false },
    );
}

fn fold_binary_literals(op: BinaryOp, l: &Literal, r: &Literal) -> Option<Literal> {
    use BinaryOp::*;
    match (l, r) {
        (Literal::Int(a), Literal::Int(b)) => match op {
            Add => Some(Literal::Int(a.wrapping_add(*b))),
            Sub => Some(Literal::Int(a.wrapping_sub(*b))),
            Mul => Some(Literal::Int(a.wrapping_mul(*b))),
            // Division/modulo by zero is never folded: the expression is
            // left intact so the runtime reports it.
            Div if *b != 0 => Some(Literal::Int(a / b)),
            Mod if *b != 0 => Some(Literal::Int(a % b)),
            Eq => Some(Literal::Bool(a == b)),
            NotEq => Some(Literal::Bool(a != b)),
            Less => Some(Literal::Bool(a < b)),
            Greater => Some(Literal::Bool(a > b)),
            LessEq => Some(Literal::Bool(a <= b)),
            GreaterEq => Some(Literal::Bool(a >= b)),
            ShiftLeft => Some(Literal::Int(a.wrapping_shl(*b as u32))),
            ShiftRight => Some(Literal::Int(a.wrapping_shr(*b as u32))),
            BitAnd => Some(Literal::Int(a & b)),
            BitOr => Some(Literal::Int(a | b)),
            BitXor => Some(Literal::Int(a ^ b)),
            _ => None,
        },
        (Literal::Float(a), Literal::Float(b)) => match op {
            Add => Some(Literal::Float(a + b)),
            Sub => Some(Literal::Float(a - b)),
            Mul => Some(Literal::Float(a * b)),
            Div => Some(Literal::Float(a / b)),
            Eq => Some(Literal::Bool(a == b)),
            NotEq => Some(Literal::Bool(a != b)),
            Less => Some(Literal::Bool(a < b)),
            Greater => Some(Literal::Bool(a > b)),
            LessEq => Some(Literal::Bool(a <= b)),
            GreaterEq => Some(Literal::Bool(a >= b)),
            _ => None,
        },
        // Boolean and/or fold with strict semantics: both sides constant.
        (Literal::Bool(a), Literal::Bool(b)) => match op {
            And => Some(Literal::Bool(*a && *b)),
            Or => Some(Literal::Bool(*a || *b)),
            Eq => Some(Literal::Bool(a == b)),
            NotEq => Some(Literal::Bool(a != b)),
            _ => None,
        },
        (Literal::Str(a), Literal::Str(b)) => match op {
            Add => Some(Literal::Str(format!("{}{}", a, b))),
            Eq => Some(Literal::Bool(a == b)),
            NotEq => Some(Literal::Bool(a != b)),
            _ => None,
        },
        _ => None,
    }
}

fn fold_unary_literal(op: UnaryOp, v: &Literal) -> Option<Literal> {
    match (op, v) {
        (UnaryOp::Neg, Literal::Int(n)) => Some(Literal::Int(n.wrapping_neg())),
        (UnaryOp::Neg, Literal::Float(f)) => Some(Literal::Float(-f)),
        (UnaryOp::Not, Literal::Bool(b)) => Some(Literal::Bool(!b)),
        (UnaryOp::BitNot, Literal::Int(n)) => Some(Literal::Int(!n)),
        _ => None,
    }
}

fn fold_cast_literal(v: &Literal, target: &crate::types::Type) -> Option<Literal> {
    use crate::types::Type;
    match (v, target) {
        (Literal::Int(n), Type::F64) => Some(Literal::Float(*n as f64)),
        (Literal::Float(f), t) if t.is_integer() => Some(Literal::Int(*f as i64)),
        (Literal::Bool(b), t) if t.is_integer() => Some(Literal::Int(if *b { 1 } else { 0 })),
        (Literal::Int(n), Type::Bool) => Some(Literal::Bool(*n != 0)),
        (Literal::Int(_), t) if t.is_integer() => Some(v.clone()),
        _ => None,
    }
}

fn truthy(lit: &Literal) -> Option<bool> {
    match lit {
        Literal::Bool(b) => Some(*b),
        _ => None,
    }
}

fn fold_node(ast: &mut Ast, id: NodeId) -> bool {
    let kind = ast.kind(id).clone();
    let mut changed = false;

    match kind {
        NodeKind::Program(stmts) | NodeKind::Block(stmts) => {
            changed |= fold_block(ast, &stmts);
        }
        NodeKind::VarDecl { init: Some(init), .. } => {
            changed |= fold_node(ast, init);
        }
        NodeKind::VarDecl { init: None, .. } => {}
        NodeKind::Assign { target, value, .. } => {
            changed |= fold_node(ast, target);
            changed |= fold_node(ast, value);
        }
        NodeKind::Binary { op, left, right } => {
            changed |= fold_node(ast, left);
            changed |= fold_node(ast, right);
            if let (Some(l), Some(r)) = (literal_of(ast, left), literal_of(ast, right)) {
                if let Some(folded) = fold_binary_literals(op, &l, &r) {
                    set_literal(ast, id, folded);
                    changed = true;
                }
            }
        }
        NodeKind::Unary { op, operand } => {
            changed |= fold_node(ast, operand);
            if let Some(v) = literal_of(ast, operand) {
                if let Some(folded) = fold_unary_literal(op, &v) {
                    set_literal(ast, id, folded);
                    changed = true;
                }
            }
        }
        NodeKind::Cast { expr, target_type, .. } => {
            changed |= fold_node(ast, expr);
            if let Some(v) = literal_of(ast, expr) {
                if let Some(folded) = fold_cast_literal(&v, &target_type) {
                    set_literal(ast, id, folded);
                    changed = true;
                }
            }
        }
        NodeKind::Ternary { cond, then_expr, else_expr } => {
            changed |= fold_node(ast, cond);
            changed |= fold_node(ast, then_expr);
            changed |= fold_node(ast, else_expr);
            if let Some(c) = literal_of(ast, cond).and_then(|l| truthy(&l)) {
                let chosen = if c { then_expr } else { else_expr };
                let chosen_kind = ast.kind(chosen).clone();
                ast.replace_kind(id, chosen_kind);
                changed = true;
            }
        }
        NodeKind::Call { args, .. } => {
            changed |= fold_block(ast, &args);
        }
        NodeKind::Identifier(_) | NodeKind::Literal { .. } | NodeKind::Pass => {}
        NodeKind::If { cond, then_branch, else_branch } => {
            changed |= fold_node(ast, cond);
            changed |= fold_block(ast, &then_branch);
            if let Some(else_branch) = &else_branch {
                changed |= fold_block(ast, else_branch);
            }
            if let Some(c) = literal_of(ast, cond).and_then(|l| truthy(&l)) {
                let chosen = if c {
                    then_branch
                } else {
                    else_branch.clone().unwrap_or_default()
                };
                ast.replace_kind(id, NodeKind::Block(chosen));
                changed = true;
            }
        }
        NodeKind::While { cond, body, .. } => {
            changed |= fold_node(ast, cond);
            changed |= fold_block(ast, &body);
            // A folded-true while is preserved: the optimizer does not
            // assume termination.
        }
        NodeKind::ForRange { start, end, step, body, .. } => {
            changed |= fold_node(ast, start);
            changed |= fold_node(ast, end);
            if let Some(step) = step {
                changed |= fold_node(ast, step);
            }
            changed |= fold_block(ast, &body);
        }
        NodeKind::ForIter { iterable, body, .. } => {
            changed |= fold_node(ast, iterable);
            changed |= fold_block(ast, &body);
        }
        NodeKind::Break { .. } | NodeKind::Continue { .. } => {}
        NodeKind::Return(expr) => {
            if let Some(expr) = expr {
                changed |= fold_node(ast, expr);
            }
        }
        NodeKind::Print { args, .. } => {
            changed |= fold_block(ast, &args);
        }
        NodeKind::Function { body, .. } => {
            changed |= fold_block(ast, &body);
        }
        NodeKind::Struct { .. } | NodeKind::Enum { .. } => {}
        NodeKind::Impl { methods, .. } => {
            changed |= fold_block(ast, &methods);
        }
        NodeKind::Match { subject, arms, .. } => {
            changed |= fold_node(ast, subject);
            for arm in &arms {
                changed |= fold_block(ast, &arm.body);
            }
        }
        NodeKind::MemberAccess { object, .. } => {
            changed |= fold_node(ast, object);
        }
        NodeKind::IndexAccess { object, index } => {
            changed |= fold_node(ast, object);
            changed |= fold_node(ast, index);
        }
        NodeKind::ArrayLiteral(items) => {
            changed |= fold_block(ast, &items);
        }
        NodeKind::ArrayFill { value, count } => {
            changed |= fold_node(ast, value);
            changed |= fold_node(ast, count);
        }
        NodeKind::ArraySlice { object, start, end } => {
            changed |= fold_node(ast, object);
            if let Some(start) = start {
                changed |= fold_node(ast, start);
            }
            if let Some(end) = end {
                changed |= fold_node(ast, end);
            }
        }
        NodeKind::StructLiteral { fields, .. } => {
            for (_, value) in &fields {
                changed |= fold_node(ast, *value);
            }
        }
        NodeKind::Try { body, catch_body, .. } => {
            changed |= fold_block(ast, &body);
            changed |= fold_block(ast, &catch_body);
        }
        NodeKind::Throw(expr) => {
            changed |= fold_node(ast, expr);
        }
        NodeKind::Import(_) | NodeKind::TypeAnnotation(_) => {}
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Ast, Location};

    fn int_lit(ast: &mut Ast, v: i64) -> NodeId {
        ast.alloc(
            NodeKind::Literal { value: Literal::Int(v), has_explicit_suffix: false },
            Location::default(),
        )
    }

    #[test]
    fn folds_addition_of_int_literals() {
        let mut ast = Ast::new();
        let l = int_lit(&mut ast, 1);
        let r = int_lit(&mut ast, 2);
        let sum = ast.alloc(
            NodeKind::Binary { op: BinaryOp::Add, left: l, right: r },
            Location::default(),
        );
        assert!(fold_program(&mut ast, sum));
        match ast.kind(sum) {
            NodeKind::Literal { value: Literal::Int(3), .. } => {}
            other => panic!("expected folded literal 3, got {:?}", other),
        }
    }

    #[test]
    fn never_folds_division_by_zero() {
        let mut ast = Ast::new();
        let l = int_lit(&mut ast, 1);
        let r = int_lit(&mut ast, 0);
        let div = ast.alloc(
            NodeKind::Binary { op: BinaryOp::Div, left: l, right: r },
            Location::default(),
        );
        fold_program(&mut ast, div);
        assert!(matches!(ast.kind(div), NodeKind::Binary { .. }));
    }

    #[test]
    fn dead_branch_elimination_keeps_only_true_branch() {
        let mut ast = Ast::new();
        let cond = ast.alloc(
            NodeKind::Literal { value: Literal::Bool(true), has_explicit_suffix: false },
            Location::default(),
        );
        let yes = ast.alloc(
            NodeKind::Print { args: vec![], newline: true },
            Location::default(),
        );
        let no = ast.alloc(NodeKind::Pass, Location::default());
        let if_node = ast.alloc(
            NodeKind::If { cond, then_branch: vec![yes], else_branch: Some(vec![no]) },
            Location::default(),
        );
        fold_program(&mut ast, if_node);
        match ast.kind(if_node) {
            NodeKind::Block(stmts) => assert_eq!(stmts, &vec![yes]),
            other => panic!("expected collapsed block, got {:?}", other),
        }
    }

    #[test]
    fn idempotent_on_an_already_folded_tree() {
        let mut ast = Ast::new();
        let l = int_lit(&mut ast, 4);
        let r = int_lit(&mut ast, 5);
        let sum = ast.alloc(
            NodeKind::Binary { op: BinaryOp::Add, left: l, right: r },
            Location::default(),
        );
        fold_program(&mut ast, sum);
        let changed_again = fold_program(&mut ast, sum);
        assert!(!changed_again);
    }
}
