//! Bytecode emitter.
//!
//! One `CodeGen` state struct split across files by concern: this file
//! (state + expression/statement lowering), `control_flow.rs` (if/while/for/
//! match plus the loop-context stack), and `functions.rs` (function
//! sub-compilers and upvalues). Each lowering method walks an AST subtree
//! and pushes opcodes into a `Chunk`.

mod control_flow;
pub mod error;
mod functions;
pub mod opcode;

use std::collections::HashMap;

use crate::ast::{Ast, AssignOp, BinaryOp, Literal, NodeId, NodeKind, UnaryOp};
use crate::config::CompileOptions;
use crate::diagnostics::{Diagnostic, DiagnosticBag, DiagnosticCode, SourceLoc};
use crate::register_alloc::{Assignment, RegisterAllocator, VariableAssignment};
use crate::scope::{AnalysisResult, ScopeId};
use crate::symbol_table::{SlotIndex, SymbolTable};
use crate::types::Type;
use opcode::{ConstIndex, GlobalSlot, Opcode, Register, JUMP_PLACEHOLDER};

pub use error::CodeGenError;

pub(super) struct LoopContext {
    pub break_targets: Vec<usize>,
    pub continue_targets: Vec<usize>,
    pub continue_target_pc: usize,
    pub scope_depth: u32,
    pub label: Option<String>,
    pub loop_start_pc: usize,
}

/// Bytecode emission state for one chunk (module body or one function).
pub struct CodeGen<'a> {
    pub(super) ast: &'a Ast,
    pub(super) chunk: orus_runtime::Chunk,
    pub(super) vm: &'a mut orus_runtime::Vm,
    pub(super) options: &'a CompileOptions,
    pub(super) diagnostics: DiagnosticBag,
    pub(super) symbols: SymbolTable,
    pub(super) var_registers: HashMap<(usize, usize), Assignment>,
    pub(super) name_to_register: HashMap<String, Register>,
    pub(super) next_free_register: Register,
    pub(super) loop_stack: Vec<LoopContext>,
    pub(super) current_scope_depth: u32,
}

impl<'a> CodeGen<'a> {
    pub fn new(
        ast: &'a Ast,
        vm: &'a mut orus_runtime::Vm,
        options: &'a CompileOptions,
    ) -> Self {
        CodeGen {
            ast,
            chunk: orus_runtime::Chunk::new(),
            vm,
            options,
            diagnostics: DiagnosticBag::new(),
            symbols: SymbolTable::new(),
            var_registers: HashMap::new(),
            name_to_register: HashMap::new(),
            next_free_register: 1,
            loop_stack: Vec::new(),
            current_scope_depth: 0,
        }
    }

    pub(super) fn apply_register_assignments(&mut self, analysis: &AnalysisResult) {
        let mut allocator = RegisterAllocator::new();
        let assignments = allocator.allocate(&analysis.scopes);
        for VariableAssignment { scope_index, variable_index, assignment } in assignments {
            self.var_registers.insert((scope_index, variable_index), assignment);
            let var = &analysis.scopes[scope_index].variables[variable_index];
            if let Assignment::Register(r) = assignment {
                self.name_to_register.insert(var.name.clone(), r);
            }
        }
    }

    fn loc(&self, id: NodeId) -> SourceLoc {
        let l = self.ast.get(id).location;
        SourceLoc::new(l.line, l.column)
    }

    fn error(&mut self, id: NodeId, code: DiagnosticCode, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(code, self.loc(id), message.into()));
    }

    pub(super) fn emit_op(&mut self, id: NodeId, op: Opcode, operands: &[u8]) -> usize {
        let pc = self.chunk.len();
        let loc = self.ast.get(id).location;
        let line = orus_runtime::LineCol { line: loc.line, column: loc.column };
        self.chunk.write_u8(op as u8, line);
        for &b in operands {
            self.chunk.write_u8(b, line);
        }
        pc
    }

    pub(super) fn emit_jump(&mut self, id: NodeId, op: Opcode) -> usize {
        let pc = self.emit_op(id, op, &[0, 0]);
        // site of the low byte of the 16-bit placeholder we just wrote
        pc + 1
    }

    pub(super) fn patch_jump(&mut self, id: NodeId, patch_site: usize, target: usize) {
        let offset = target as isize - (patch_site + 2) as isize;
        if !(0..=0xFFFF).contains(&offset) {
            self.error(
                id,
                DiagnosticCode::JumpTooFar,
                format!("jump offset {} does not fit in 16 bits", offset),
            );
            return;
        }
        let bytes = (offset as u16).to_be_bytes();
        self.chunk.code[patch_site] = bytes[0];
        self.chunk.code[patch_site + 1] = bytes[1];
    }

    fn next_register(&mut self, id: NodeId) -> Register {
        if self.next_free_register == Register::MAX {
            self.error(id, DiagnosticCode::ExpressionTooComplex, "out of registers");
            return self.next_free_register;
        }
        let r = self.next_free_register;
        self.next_free_register += 1;
        r
    }

    fn register_for(&self, name: &str) -> Option<Register> {
        self.name_to_register.get(name).copied()
    }

    fn add_const(&mut self, id: NodeId, value: orus_runtime::Value) -> ConstIndex {
        match orus_runtime::add_constant(&mut self.chunk, value) {
            Some(idx) => idx,
            None => {
                self.error(id, DiagnosticCode::ExpressionTooComplex, "constant pool exhausted");
                0
            }
        }
    }

    fn literal_value(&self, lit: &Literal) -> (orus_runtime::Value, Opcode) {
        match lit {
            Literal::Int(n) => (orus_runtime::Value::I32(*n as i32), Opcode::AddI32),
            Literal::Float(f) => (orus_runtime::Value::F64(*f), Opcode::AddF64),
            Literal::Bool(b) => (orus_runtime::Value::Bool(*b), Opcode::AddI32),
            Literal::Str(s) => {
                let obj = orus_runtime::allocate_string(s.as_bytes());
                (orus_runtime::Value::Str(obj), Opcode::ConcatStr)
            }
        }
    }

    /// Lowers an expression node, returning the register holding the result.
    pub(super) fn gen_expr(&mut self, id: NodeId) -> Register {
        let kind = self.ast.kind(id).clone();
        match kind {
            NodeKind::Literal { value, .. } => {
                let dst = self.next_register(id);
                let (val, _) = self.literal_value(&value);
                let idx = self.add_const(id, val);
                self.emit_op(id, Opcode::LoadConst, &[dst, idx.to_be_bytes()[0], idx.to_be_bytes()[1]]);
                dst
            }
            NodeKind::Identifier(name) => {
                if let Some(reg) = self.register_for(&name) {
                    reg
                } else if let Some((slot, _)) =
                    self.symbols.get_in_scope(&name, self.current_scope_depth)
                {
                    let dst = self.next_register(id);
                    match slot {
                        SlotIndex::Global(g) => {
                            self.emit_op(id, Opcode::LoadGlobal, &[dst, g.to_be_bytes()[0], g.to_be_bytes()[1]]);
                        }
                        SlotIndex::Register(r) => {
                            self.emit_op(id, Opcode::Move, &[dst, r]);
                        }
                    }
                    dst
                } else {
                    self.error(id, DiagnosticCode::UndefinedVariable, format!("undefined variable '{}'", name));
                    0
                }
            }
            NodeKind::Binary { op, left, right } => self.gen_binary(id, op, left, right),
            NodeKind::Unary { op, operand } => self.gen_unary(id, op, operand),
            NodeKind::Cast { expr, target_type, parenthesized } => {
                self.gen_cast(id, expr, &target_type, parenthesized)
            }
            NodeKind::Ternary { cond, then_expr, else_expr } => {
                self.gen_ternary(id, cond, then_expr, else_expr)
            }
            NodeKind::Call { callee, args } => self.gen_call(id, &callee, &args),
            NodeKind::MemberAccess { object, .. } => self.gen_expr(object),
            NodeKind::IndexAccess { object, index } => {
                let obj_reg = self.gen_expr(object);
                let idx_reg = self.gen_expr(index);
                let dst = self.next_register(id);
                self.emit_op(id, Opcode::ArrayGetR, &[dst, obj_reg, idx_reg]);
                dst
            }
            NodeKind::ArrayLiteral(items) => {
                let dst = self.next_register(id);
                let len = items.len() as u8;
                self.emit_op(id, Opcode::NewArrayR, &[dst, len]);
                for item in items {
                    let item_reg = self.gen_expr(item);
                    self.emit_op(id, Opcode::ArraySetR, &[dst, item_reg]);
                }
                dst
            }
            _ => {
                self.error(id, DiagnosticCode::UnexpectedToken, "expression form not yet supported by the emitter");
                0
            }
        }
    }

    fn gen_binary(&mut self, id: NodeId, op: BinaryOp, left: NodeId, right: NodeId) -> Register {
        let l = self.gen_expr(left);
        let r = self.gen_expr(right);
        let dst = self.next_register(id);
        let opcode = match op {
            BinaryOp::Add => Opcode::AddI32,
            BinaryOp::Sub => Opcode::SubI32,
            BinaryOp::Mul => Opcode::MulI32,
            BinaryOp::Div => Opcode::DivI32,
            BinaryOp::Mod => Opcode::ModI32,
            BinaryOp::Eq => Opcode::EqR,
            BinaryOp::NotEq => Opcode::NotEqR,
            BinaryOp::Less => Opcode::LessR,
            BinaryOp::Greater => Opcode::GreaterR,
            BinaryOp::LessEq => Opcode::LessEqR,
            BinaryOp::GreaterEq => Opcode::GreaterEqR,
            BinaryOp::And => Opcode::AndR,
            BinaryOp::Or => Opcode::OrR,
            BinaryOp::ShiftLeft => Opcode::ShlI32,
            BinaryOp::ShiftRight => Opcode::ShrI32,
            BinaryOp::BitAnd => Opcode::BitAndI32,
            BinaryOp::BitOr => Opcode::BitOrI32,
            BinaryOp::BitXor => Opcode::BitXorI32,
            BinaryOp::Matches => Opcode::EqR,
        };
        self.emit_op(id, opcode, &[dst, l, r]);
        dst
    }

    fn gen_unary(&mut self, id: NodeId, op: UnaryOp, operand: NodeId) -> Register {
        let src = self.gen_expr(operand);
        let dst = self.next_register(id);
        let opcode = match op {
            UnaryOp::Neg => Opcode::NegI32,
            UnaryOp::Not => Opcode::NotR,
            UnaryOp::BitNot => Opcode::BitNotI32,
        };
        self.emit_op(id, opcode, &[dst, src]);
        dst
    }

    /// Casting from `string` to anything except `string` is rejected.
    /// Same-type casts are no-ops handled by the caller reusing the source
    /// register.
    fn gen_cast(&mut self, id: NodeId, expr: NodeId, target: &Type, _parenthesized: bool) -> Register {
        let src_type = self.ast.get(expr).data_type.clone();
        if matches!(src_type, Some(Type::String)) && !matches!(target, Type::String) {
            self.error(id, DiagnosticCode::InvalidCast, "cannot cast from string");
            return self.gen_expr(expr);
        }
        let src = self.gen_expr(expr);
        if Some(target.clone()) == src_type {
            return src;
        }
        let dst = self.next_register(id);
        let opcode = match target {
            Type::I64 => Opcode::I32ToI64,
            Type::I32 => Opcode::I64ToI32,
            Type::U64 => Opcode::U32ToU64,
            Type::U32 => Opcode::U64ToU32,
            Type::F64 => Opcode::I32ToF64,
            Type::Bool => Opcode::BoolToI32,
            Type::String => Opcode::ToStringR,
            _ => {
                self.error(id, DiagnosticCode::InvalidCast, "unsupported cast target");
                return src;
            }
        };
        self.emit_op(id, opcode, &[dst, src]);
        dst
    }

    fn gen_ternary(&mut self, id: NodeId, cond: NodeId, then_expr: NodeId, else_expr: NodeId) -> Register {
        let dst = self.next_register(id);
        let cond_reg = self.gen_expr(cond);
        let jump_to_else = self.emit_jump(id, Opcode::JumpIfNot);
        self.chunk.code.insert(jump_to_else - 1, cond_reg);
        let then_reg = self.gen_expr(then_expr);
        self.emit_op(id, Opcode::Move, &[dst, then_reg]);
        let jump_to_end = self.emit_jump(id, Opcode::Jump);
        let else_pc = self.chunk.len();
        self.patch_jump(id, jump_to_else, else_pc);
        let else_reg = self.gen_expr(else_expr);
        self.emit_op(id, Opcode::Move, &[dst, else_reg]);
        let end_pc = self.chunk.len();
        self.patch_jump(id, jump_to_end, end_pc);
        dst
    }

    fn gen_call(&mut self, id: NodeId, callee: &str, args: &[NodeId]) -> Register {
        let callee_reg = if let Some(reg) = self.register_for(callee) {
            reg
        } else if let Some((slot, _)) = self.symbols.get_in_scope(callee, self.current_scope_depth) {
            match slot {
                SlotIndex::Global(g) => {
                    let dst = self.next_register(id);
                    self.emit_op(id, Opcode::LoadGlobal, &[dst, g.to_be_bytes()[0], g.to_be_bytes()[1]]);
                    dst
                }
                SlotIndex::Register(r) => r,
            }
        } else {
            self.error(id, DiagnosticCode::UndefinedVariable, format!("undefined function '{}'", callee));
            0
        };

        let first_arg = self.next_free_register;
        for &arg in args {
            let r = self.gen_expr(arg);
            if r != self.next_free_register - 1 {
                let dst = self.next_register(id);
                self.emit_op(id, Opcode::Move, &[dst, r]);
            }
        }
        let dst = self.next_register(id);
        self.emit_op(id, Opcode::CallR, &[callee_reg, first_arg, args.len() as u8, dst]);
        dst
    }

    pub(super) fn gen_stmt(&mut self, id: NodeId) {
        let kind = self.ast.kind(id).clone();
        match kind {
            NodeKind::Program(stmts) | NodeKind::Block(stmts) => {
                for s in stmts {
                    self.gen_stmt(s);
                }
            }
            NodeKind::VarDecl { name, init, is_mut, is_const, .. } => {
                if is_const && self.current_scope_depth == 0 && !is_screaming_snake_case(&name) {
                    self.error(
                        id,
                        DiagnosticCode::InvalidConstantName,
                        format!("constant '{}' must be SCREAMING_SNAKE_CASE", name),
                    );
                }
                let _ = is_mut;
                let reg = if let Some(init) = init {
                    self.gen_expr(init)
                } else {
                    self.next_register(id)
                };
                if let Some(&existing) = self.name_to_register.get(&name) {
                    self.emit_op(id, Opcode::Move, &[existing, reg]);
                } else {
                    self.name_to_register.insert(name.clone(), reg);
                    if self
                        .symbols
                        .set(&name, SlotIndex::Register(reg), self.current_scope_depth)
                        .is_err()
                    {
                        self.error(
                            id,
                            DiagnosticCode::DuplicateGlobal,
                            format!("'{}' is already declared at module scope", name),
                        );
                    }
                }
            }
            NodeKind::Assign { op, target, value } => self.gen_assign(id, op, target, value),
            NodeKind::If { cond, then_branch, else_branch } => {
                self.gen_if(id, cond, &then_branch, else_branch.as_deref())
            }
            NodeKind::While { label, cond, body } => self.gen_while(id, label, cond, &body),
            NodeKind::ForRange { label, var, start, end, step, inclusive, body } => {
                self.gen_for_range(id, label, &var, start, end, step, inclusive, &body)
            }
            NodeKind::ForIter { label, var, iterable, body } => {
                self.gen_for_iter(id, label, &var, iterable, &body)
            }
            NodeKind::Break { label } => self.gen_break(id, label.as_deref()),
            NodeKind::Continue { label } => self.gen_continue(id, label.as_deref()),
            NodeKind::Pass => {}
            NodeKind::Return(expr) => {
                if let Some(expr) = expr {
                    let r = self.gen_expr(expr);
                    self.emit_op(id, Opcode::ReturnR, &[r]);
                } else {
                    self.emit_op(id, Opcode::ReturnVoid, &[]);
                }
            }
            NodeKind::Print { args, newline } => {
                if args.len() == 1 {
                    let r = self.gen_expr(args[0]);
                    let op = if newline { Opcode::PrintR } else { Opcode::PrintNoNlR };
                    self.emit_op(id, op, &[r]);
                } else {
                    let first = self.next_free_register;
                    for &a in &args {
                        self.gen_expr(a);
                    }
                    self.emit_op(
                        id,
                        Opcode::PrintMultiR,
                        &[first, args.len() as u8, newline as u8],
                    );
                }
            }
            NodeKind::Function { .. } => self.gen_function(id),
            NodeKind::Throw(expr) => {
                let _ = self.gen_expr(expr);
            }
            NodeKind::Try { body, catch_body, .. } => {
                for s in body {
                    self.gen_stmt(s);
                }
                for s in catch_body {
                    self.gen_stmt(s);
                }
            }
            NodeKind::Match { .. } => self.gen_match(id),
            NodeKind::Struct { .. } | NodeKind::Enum { .. } | NodeKind::Impl { .. } | NodeKind::Import(_) => {}
            _ => {}
        }
    }

    fn gen_assign(&mut self, id: NodeId, op: AssignOp, target: NodeId, value: NodeId) {
        // Compound assignments desugar to `x = x <op> y`; the parser is
        // expected to have already done this, but the emitter tolerates
        // either form defensively.
        let binop = match op {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(BinaryOp::Add),
            AssignOp::SubAssign => Some(BinaryOp::Sub),
            AssignOp::MulAssign => Some(BinaryOp::Mul),
            AssignOp::DivAssign => Some(BinaryOp::Div),
            AssignOp::ModAssign => Some(BinaryOp::Mod),
        };

        let name = match self.ast.kind(target) {
            NodeKind::Identifier(name) => name.clone(),
            _ => {
                self.error(id, DiagnosticCode::UnexpectedToken, "assignment target must be a name");
                return;
            }
        };

        let value_reg = if let Some(binop) = binop {
            self.gen_binary(id, binop, target, value)
        } else {
            self.gen_expr(value)
        };

        if let Some(&dst) = self.name_to_register.get(&name) {
            self.emit_op(id, Opcode::Move, &[dst, value_reg]);
        } else if let Some((SlotIndex::Global(g), _)) =
            self.symbols.get_in_scope(&name, self.current_scope_depth)
        {
            self.emit_op(id, Opcode::StoreGlobal, &[g.to_be_bytes()[0], g.to_be_bytes()[1], value_reg]);
        } else {
            self.error(id, DiagnosticCode::UndefinedVariable, format!("undefined variable '{}'", name));
        }
    }

    fn gen_if(&mut self, id: NodeId, cond: NodeId, then_branch: &[NodeId], else_branch: Option<&[NodeId]>) {
        let cond_reg = self.gen_expr(cond);
        let jump_to_else = self.emit_jump(id, Opcode::JumpIfNot);
        self.chunk.code.insert(jump_to_else - 1, cond_reg);
        for &s in then_branch {
            self.gen_stmt(s);
        }
        if let Some(else_branch) = else_branch {
            let jump_to_end = self.emit_jump(id, Opcode::Jump);
            let else_pc = self.chunk.len();
            self.patch_jump(id, jump_to_else, else_pc);
            for &s in else_branch {
                self.gen_stmt(s);
            }
            let end_pc = self.chunk.len();
            self.patch_jump(id, jump_to_end, end_pc);
        } else {
            let end_pc = self.chunk.len();
            self.patch_jump(id, jump_to_else, end_pc);
        }
    }

    pub(super) fn finish(self) -> (orus_runtime::Chunk, DiagnosticBag) {
        (self.chunk, self.diagnostics)
    }
}

fn is_screaming_snake_case(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c == '_' || c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Location;

    #[test]
    fn emits_load_const_for_an_integer_literal() {
        let mut ast = Ast::new();
        let lit = ast.alloc(
            NodeKind::Literal { value: Literal::Int(7), has_explicit_suffix: false },
            Location::default(),
        );
        let (mut vm, options) = (orus_runtime::Vm::new(), CompileOptions::default());
        let mut cg = CodeGen::new(&ast, &mut vm, &options);
        cg.gen_expr(lit);
        assert_eq!(cg.chunk.code[0], Opcode::LoadConst as u8);
    }

    #[test]
    fn screaming_snake_case_validator_accepts_and_rejects() {
        assert!(is_screaming_snake_case("MAX_SIZE"));
        assert!(!is_screaming_snake_case("maxSize"));
    }

    #[test]
    fn lowercase_const_name_is_rejected_at_module_scope_but_not_inside_a_function() {
        let mut ast = Ast::new();
        let init = ast.alloc(
            NodeKind::Literal { value: Literal::Int(1), has_explicit_suffix: false },
            Location::default(),
        );
        let decl = ast.alloc(
            NodeKind::VarDecl {
                name: "total".to_string(),
                is_mut: false,
                is_const: true,
                type_ann: None,
                init: Some(init),
            },
            Location::default(),
        );
        let (mut vm, options) = (orus_runtime::Vm::new(), CompileOptions::default());

        let mut cg = CodeGen::new(&ast, &mut vm, &options);
        cg.gen_stmt(decl);
        assert!(cg.diagnostics.had_error());

        let mut cg = CodeGen::new(&ast, &mut vm, &options);
        cg.current_scope_depth = 1;
        cg.gen_stmt(decl);
        assert!(!cg.diagnostics.had_error());
    }
}
