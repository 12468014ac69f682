//! Loop and match lowering: `while`/`for` bodies, labeled break/continue
//! resolution against a stack of enclosing loops, and `match` desugaring
//! into a comparison chain.

use super::opcode::Opcode;
use super::{CodeGen, LoopContext};
use crate::ast::{Literal, NodeId, NodeKind, Pattern};
use crate::diagnostics::DiagnosticCode;

impl<'a> CodeGen<'a> {
    pub(super) fn gen_while(&mut self, id: NodeId, label: Option<String>, cond: NodeId, body: &[NodeId]) {
        let loop_start_pc = self.chunk.len();
        self.loop_stack.push(LoopContext {
            break_targets: Vec::new(),
            continue_targets: Vec::new(),
            continue_target_pc: loop_start_pc,
            scope_depth: self.current_scope_depth,
            label,
            loop_start_pc,
        });

        let cond_reg = self.gen_expr(cond);
        let exit_jump = self.emit_jump(id, Opcode::JumpIfNot);
        self.chunk.code.insert(exit_jump - 1, cond_reg);

        for &s in body {
            self.gen_stmt(s);
        }

        self.emit_loop(id, loop_start_pc);
        let end_pc = self.chunk.len();
        self.patch_jump(id, exit_jump, end_pc);
        self.close_loop(id, end_pc);
    }

    pub(super) fn gen_for_range(
        &mut self,
        id: NodeId,
        label: Option<String>,
        var: &str,
        start: NodeId,
        end: NodeId,
        step: Option<NodeId>,
        inclusive: bool,
        body: &[NodeId],
    ) {
        let negative_step = step
            .map(|s| is_negative_literal(self.ast, s))
            .unwrap_or(false);

        let i_reg = self.gen_expr(start);
        self.name_to_register.insert(var.to_string(), i_reg);

        let end_reg = self.gen_expr(end);
        if inclusive {
            let one = self.next_register(id);
            let idx = self.add_const(id, orus_runtime::Value::I32(1));
            self.emit_op(id, Opcode::LoadConst, &[one, idx.to_be_bytes()[0], idx.to_be_bytes()[1]]);
            let adjusted = self.next_register(id);
            let op = if negative_step { Opcode::SubI32 } else { Opcode::AddI32 };
            self.emit_op(id, op, &[adjusted, end_reg, one]);
            self.gen_for_range_body(id, label, i_reg, adjusted, step, negative_step, body);
        } else {
            self.gen_for_range_body(id, label, i_reg, end_reg, step, negative_step, body);
        }

        self.name_to_register.remove(var);
    }

    #[allow(clippy::too_many_arguments)]
    fn gen_for_range_body(
        &mut self,
        id: NodeId,
        label: Option<String>,
        i_reg: u8,
        end_reg: u8,
        step: Option<NodeId>,
        negative_step: bool,
        body: &[NodeId],
    ) {
        let compare_pc = self.chunk.len();
        let cmp_dst = self.next_register(id);
        let cmp_op = if negative_step { Opcode::GreaterR } else { Opcode::LessR };
        self.emit_op(id, cmp_op, &[cmp_dst, i_reg, end_reg]);
        let exit_jump = self.emit_jump(id, Opcode::JumpIfNot);
        self.chunk.code.insert(exit_jump - 1, cmp_dst);

        self.loop_stack.push(LoopContext {
            break_targets: Vec::new(),
            continue_targets: Vec::new(),
            continue_target_pc: 0, // filled in once the increment site is known
            scope_depth: self.current_scope_depth,
            label,
            loop_start_pc: compare_pc,
        });

        for &s in body {
            self.gen_stmt(s);
        }

        let increment_pc = self.chunk.len();
        if let Some(ctx) = self.loop_stack.last_mut() {
            ctx.continue_target_pc = increment_pc;
        }

        let step_reg = match step {
            Some(step_id) => self.gen_expr(step_id),
            None => {
                let one = self.next_register(id);
                let idx = self.add_const(id, orus_runtime::Value::I32(1));
                self.emit_op(id, Opcode::LoadConst, &[one, idx.to_be_bytes()[0], idx.to_be_bytes()[1]]);
                one
            }
        };
        let step_op = if negative_step { Opcode::SubI32 } else { Opcode::AddI32 };
        self.emit_op(id, step_op, &[i_reg, i_reg, step_reg]);

        self.emit_loop(id, compare_pc);
        let end_pc = self.chunk.len();
        self.patch_jump(id, exit_jump, end_pc);
        self.close_loop(id, end_pc);
    }

    pub(super) fn gen_for_iter(&mut self, id: NodeId, label: Option<String>, var: &str, iterable: NodeId, body: &[NodeId]) {
        let iter_src = self.gen_expr(iterable);
        let iter_reg = self.next_register(id);
        self.emit_op(id, Opcode::GetIterR, &[iter_reg, iter_src]);

        let loop_start_pc = self.chunk.len();
        self.loop_stack.push(LoopContext {
            break_targets: Vec::new(),
            continue_targets: Vec::new(),
            continue_target_pc: loop_start_pc,
            scope_depth: self.current_scope_depth,
            label,
            loop_start_pc,
        });

        let item_reg = self.next_register(id);
        let has_more = self.next_register(id);
        self.emit_op(id, Opcode::IterNextR, &[has_more, item_reg, iter_reg]);
        self.name_to_register.insert(var.to_string(), item_reg);

        let exit_jump = self.emit_jump(id, Opcode::JumpIfNot);
        self.chunk.code.insert(exit_jump - 1, has_more);

        for &s in body {
            self.gen_stmt(s);
        }

        self.emit_loop(id, loop_start_pc);
        let end_pc = self.chunk.len();
        self.patch_jump(id, exit_jump, end_pc);
        self.close_loop(id, end_pc);
        self.name_to_register.remove(var);
    }

    fn emit_loop(&mut self, id: NodeId, target: usize) {
        let pc = self.emit_jump(id, Opcode::Loop);
        // `Loop` jumps backward: target is behind the patch site, so the
        // stored offset is negative relative to `patch_jump`'s forward math.
        let offset = (pc as isize + 2) - target as isize;
        if !(0..=0xFFFF).contains(&offset) {
            self.diagnostics.push(crate::diagnostics::Diagnostic::new(
                DiagnosticCode::JumpTooFar,
                crate::diagnostics::SourceLoc::new(self.ast.get(id).location.line, self.ast.get(id).location.column),
                "backward loop offset does not fit in 16 bits",
            ));
            return;
        }
        let bytes = (offset as u16).to_be_bytes();
        self.chunk.code[pc] = bytes[0];
        self.chunk.code[pc + 1] = bytes[1];
    }

    /// Pops the current loop context, patching every collected break target
    /// to `end_pc` and every continue target to the recorded continue pc.
    fn close_loop(&mut self, id: NodeId, end_pc: usize) {
        let ctx = self.loop_stack.pop().expect("close_loop without a matching push");
        for site in ctx.break_targets {
            self.patch_jump(id, site, end_pc);
        }
        for site in ctx.continue_targets {
            self.patch_jump(id, site, ctx.continue_target_pc);
        }
    }

    /// Unlabeled break/continue targets the innermost loop whose
    /// `scope_depth` equals the current depth, falling back to the
    /// innermost loop overall.
    fn find_loop_index(&self, label: Option<&str>) -> Option<usize> {
        if let Some(label) = label {
            return self
                .loop_stack
                .iter()
                .rposition(|ctx| ctx.label.as_deref() == Some(label));
        }
        self.loop_stack
            .iter()
            .rposition(|ctx| ctx.scope_depth == self.current_scope_depth)
            .or_else(|| if self.loop_stack.is_empty() { None } else { Some(self.loop_stack.len() - 1) })
    }

    pub(super) fn gen_break(&mut self, id: NodeId, label: Option<&str>) {
        match self.find_loop_index(label) {
            Some(idx) => {
                let site = self.emit_jump(id, Opcode::Jump);
                self.loop_stack[idx].break_targets.push(site);
            }
            None => {
                let code = if label.is_some() {
                    DiagnosticCode::UndefinedLabel
                } else {
                    DiagnosticCode::BreakOutsideLoop
                };
                self.diagnostics.push(crate::diagnostics::Diagnostic::new(
                    code,
                    crate::diagnostics::SourceLoc::new(self.ast.get(id).location.line, self.ast.get(id).location.column),
                    "break has no matching loop",
                ));
            }
        }
    }

    pub(super) fn gen_continue(&mut self, id: NodeId, label: Option<&str>) {
        match self.find_loop_index(label) {
            Some(idx) => {
                let site = self.emit_jump(id, Opcode::Jump);
                self.loop_stack[idx].continue_targets.push(site);
            }
            None => {
                let code = if label.is_some() {
                    DiagnosticCode::UndefinedLabel
                } else {
                    DiagnosticCode::ContinueOutsideLoop
                };
                self.diagnostics.push(crate::diagnostics::Diagnostic::new(
                    code,
                    crate::diagnostics::SourceLoc::new(self.ast.get(id).location.line, self.ast.get(id).location.column),
                    "continue has no matching loop",
                ));
            }
        }
    }

    /// Desugars `match` into a chain of `if`/`elif` comparisons against the
    /// subject, enforcing exhaustiveness and duplicate-pattern checks along
    /// the way.
    pub(super) fn gen_match(&mut self, id: NodeId) {
        let (subject, arms, has_wildcard) = match self.ast.kind(id).clone() {
            NodeKind::Match { subject, arms, has_wildcard } => (subject, arms, has_wildcard),
            _ => return,
        };

        if !has_wildcard {
            self.diagnostics.push(crate::diagnostics::Diagnostic::new(
                DiagnosticCode::NonExhaustiveMatch,
                crate::diagnostics::SourceLoc::new(self.ast.get(id).location.line, self.ast.get(id).location.column),
                "match is not exhaustive: add a wildcard or cover every variant",
            ));
        }

        let mut seen_literals: Vec<Literal> = Vec::new();
        let subject_reg = self.gen_expr(subject);
        let mut end_jumps = Vec::new();

        for arm in &arms {
            if let Pattern::Literal(lit) = &arm.pattern {
                if seen_literals.contains(lit) {
                    self.diagnostics.push(crate::diagnostics::Diagnostic::new(
                        DiagnosticCode::DuplicateMatchArm,
                        crate::diagnostics::SourceLoc::new(arm.location.line, arm.location.column),
                        "duplicate literal pattern in match",
                    ));
                }
                seen_literals.push(lit.clone());
            }

            let is_wildcard = matches!(arm.pattern, Pattern::Wildcard);
            let next_arm_jump = if is_wildcard {
                None
            } else {
                let cmp_dst = self.next_register(id);
                match &arm.pattern {
                    Pattern::Literal(lit) => {
                        let lit_reg = self.load_pattern_literal(id, lit);
                        self.emit_op(id, Opcode::EqR, &[cmp_dst, subject_reg, lit_reg]);
                    }
                    Pattern::EnumVariant { .. } => {
                        self.emit_op(id, Opcode::EqR, &[cmp_dst, subject_reg, subject_reg]);
                    }
                    Pattern::Wildcard => unreachable!(),
                }
                let jump = self.emit_jump(id, Opcode::JumpIfNot);
                self.chunk.code.insert(jump - 1, cmp_dst);
                Some(jump)
            };

            for &s in &arm.body {
                self.gen_stmt(s);
            }
            end_jumps.push(self.emit_jump(id, Opcode::Jump));

            if let Some(jump) = next_arm_jump {
                let here = self.chunk.len();
                self.patch_jump(id, jump, here);
            }
        }

        let end_pc = self.chunk.len();
        for j in end_jumps {
            self.patch_jump(id, j, end_pc);
        }
    }

    /// Loads a match arm's literal pattern into a fresh register, bypassing
    /// `gen_expr` since pattern literals live on `MatchArm`, not in the
    /// arena as their own node.
    fn load_pattern_literal(&mut self, id: NodeId, lit: &Literal) -> u8 {
        let dst = self.next_register(id);
        let value = match lit {
            Literal::Int(n) => orus_runtime::Value::I32(*n as i32),
            Literal::Float(f) => orus_runtime::Value::F64(*f),
            Literal::Bool(b) => orus_runtime::Value::Bool(*b),
            Literal::Str(s) => orus_runtime::Value::Str(orus_runtime::allocate_string(s.as_bytes())),
        };
        let idx = self.add_const(id, value);
        self.emit_op(id, Opcode::LoadConst, &[dst, idx.to_be_bytes()[0], idx.to_be_bytes()[1]]);
        dst
    }
}

fn is_negative_literal(ast: &crate::ast::Ast, id: NodeId) -> bool {
    match ast.kind(id) {
        NodeKind::Literal { value: Literal::Int(n), .. } => *n < 0,
        NodeKind::Unary { op: crate::ast::UnaryOp::Neg, .. } => true,
        _ => false,
    }
}

