//! Scope tree, lifetime classification, and capture analysis.
//!
//! A tree of scopes plus a per-variable record is built once resolution is
//! done, marking variables that close over outer bindings, and a
//! conservative elimination pass rolls back on any uncertainty rather than
//! risk dropping a definition that turns out to be live.

use crate::ast::{Ast, NodeId, NodeKind};
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// lifespan >= 100 instructions
    Long,
    /// 10 <= lifespan < 100
    Medium,
    /// lifespan < 10
    Short,
}

pub fn classify_priority(first_use: u32, last_use: u32) -> Priority {
    let lifespan = last_use.saturating_sub(first_use);
    if lifespan >= 100 {
        Priority::Long
    } else if lifespan >= 10 {
        Priority::Medium
    } else {
        Priority::Short
    }
}

#[derive(Debug, Clone)]
pub struct ScopeVariable {
    pub name: String,
    pub declared_type: Option<Type>,
    pub declaration_point: u32,
    pub first_use: u32,
    pub last_use: u32,
    pub reg: Option<u8>,
    pub priority: Priority,
    pub escapes: bool,
    pub is_loop_var: bool,
    pub is_captured: bool,
    pub capture_depth: u32,
    pub is_dead: bool,
    pub use_count: u32,
    pub write_count: u32,
}

impl ScopeVariable {
    fn new(name: String, declaration_point: u32, is_loop_var: bool) -> Self {
        ScopeVariable {
            name,
            declared_type: None,
            declaration_point,
            first_use: declaration_point,
            last_use: declaration_point,
            reg: None,
            priority: Priority::Short,
            escapes: false,
            is_loop_var,
            is_captured: false,
            capture_depth: 0,
            is_dead: false,
            use_count: 0,
            write_count: 0,
        }
    }

    fn record_use(&mut self, at: u32) {
        self.use_count += 1;
        self.first_use = self.first_use.min(at);
        self.last_use = self.last_use.max(at);
    }

    fn record_write(&mut self, at: u32) {
        self.write_count += 1;
        self.last_use = self.last_use.max(at);
    }

    fn refresh_priority(&mut self) {
        self.priority = classify_priority(self.first_use, self.last_use);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone)]
pub struct ScopeInfo {
    pub depth: u32,
    pub start_instr: u32,
    pub end_instr: u32,
    pub is_loop_scope: bool,
    pub variables: Vec<ScopeVariable>,
    pub children: Vec<ScopeId>,
    pub parent: Option<ScopeId>,
}

/// Tree of [`ScopeInfo`] nodes plus the instruction cursor used while
/// walking the AST. Lifetimes are measured in emitted-instruction offsets,
/// so this analyzer assigns a synthetic offset per statement/expression
/// visited, standing in for the real emitter cursor since scope analysis
/// runs before emission.
pub struct ScopeAnalyzer<'a> {
    ast: &'a Ast,
    scopes: Vec<ScopeInfo>,
    scope_stack: Vec<ScopeId>,
    function_depth_stack: Vec<u32>,
    instr_cursor: u32,
    pub saved_registers: u32,
    pub rollback_triggered: bool,
}

pub struct AnalysisResult {
    pub scopes: Vec<ScopeInfo>,
    pub root: ScopeId,
    pub dead_count: u32,
    pub captured_count: u32,
    pub total_count: u32,
    pub rollback_triggered: bool,
}

impl<'a> ScopeAnalyzer<'a> {
    pub fn new(ast: &'a Ast) -> Self {
        let root = ScopeInfo {
            depth: 0,
            start_instr: 0,
            end_instr: 0,
            is_loop_scope: false,
            variables: Vec::new(),
            children: Vec::new(),
            parent: None,
        };
        ScopeAnalyzer {
            ast,
            scopes: vec![root],
            scope_stack: vec![ScopeId(0)],
            function_depth_stack: vec![0],
            instr_cursor: 0,
            saved_registers: 0,
            rollback_triggered: false,
        }
    }

    fn current(&self) -> ScopeId {
        *self.scope_stack.last().unwrap()
    }

    fn tick(&mut self) -> u32 {
        let at = self.instr_cursor;
        self.instr_cursor += 1;
        at
    }

    fn push_scope(&mut self, is_loop_scope: bool) -> ScopeId {
        let parent = self.current();
        let depth = self.scopes[parent.0 as usize].depth + 1;
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(ScopeInfo {
            depth,
            start_instr: self.instr_cursor,
            end_instr: self.instr_cursor,
            is_loop_scope,
            variables: Vec::new(),
            children: Vec::new(),
            parent: Some(parent),
        });
        self.scopes[parent.0 as usize].children.push(id);
        self.scope_stack.push(id);
        id
    }

    fn pop_scope(&mut self) {
        let id = self.scope_stack.pop().unwrap();
        self.scopes[id.0 as usize].end_instr = self.instr_cursor;
    }

    fn declare(&mut self, name: &str, is_loop_var: bool) {
        let at = self.tick();
        let scope = self.current();
        self.scopes[scope.0 as usize]
            .variables
            .push(ScopeVariable::new(name.to_string(), at, is_loop_var));
    }

    /// Finds the nearest enclosing scope (searching outward from the
    /// current one) declaring `name`, returning its scope id and the index
    /// of the variable within that scope's `variables` vec.
    fn resolve(&self, name: &str) -> Option<(ScopeId, usize)> {
        let mut cursor = Some(self.current());
        while let Some(id) = cursor {
            let scope = &self.scopes[id.0 as usize];
            if let Some(idx) = scope.variables.iter().position(|v| v.name == name) {
                return Some((id, idx));
            }
            cursor = scope.parent;
        }
        None
    }

    fn mark_use(&mut self, name: &str) {
        let at = self.tick();
        let declaring_depth = self
            .resolve(name)
            .map(|(id, _)| self.scopes[id.0 as usize].depth);
        let current_depth = self.scopes[self.current().0 as usize].depth;
        let current_fn_depth = *self.function_depth_stack.last().unwrap();
        if let Some((id, idx)) = self.resolve(name) {
            let var_fn_depth_origin = self.function_depth_stack
                [..self.function_depth_stack.len()]
                .iter()
                .rposition(|&d| d <= self.scopes[id.0 as usize].depth)
                .map(|pos| self.function_depth_stack[pos]);
            let scope = &mut self.scopes[id.0 as usize];
            scope.variables[idx].record_use(at);
            if let Some(decl_depth) = declaring_depth {
                if current_depth > decl_depth {
                    scope.variables[idx].escapes = true;
                }
            }
            if let Some(origin_fn_depth) = var_fn_depth_origin {
                if current_fn_depth > origin_fn_depth {
                    scope.variables[idx].is_captured = true;
                    scope.variables[idx].escapes = true;
                    scope.variables[idx].capture_depth = current_fn_depth - origin_fn_depth;
                }
            }
        }
    }

    fn mark_write(&mut self, name: &str) {
        let at = self.tick();
        if let Some((id, idx)) = self.resolve(name) {
            self.scopes[id.0 as usize].variables[idx].record_write(at);
        }
    }

    fn visit_block(&mut self, nodes: &[NodeId]) {
        for &id in nodes {
            self.visit(id);
        }
    }

    fn visit(&mut self, id: NodeId) {
        let node = self.ast.get(id);
        match &node.kind {
            NodeKind::Program(stmts) | NodeKind::Block(stmts) => self.visit_block(stmts),
            NodeKind::VarDecl { name, init, .. } => {
                if let Some(init) = init {
                    self.visit(*init);
                }
                self.declare(name, false);
            }
            NodeKind::Assign { target, value, .. } => {
                self.visit(*value);
                if let NodeKind::Identifier(name) = &self.ast.kind(*target) {
                    self.mark_write(&name.clone());
                } else {
                    self.visit(*target);
                }
            }
            NodeKind::Binary { left, right, .. } => {
                self.visit(*left);
                self.visit(*right);
            }
            NodeKind::Unary { operand, .. } => self.visit(*operand),
            NodeKind::Cast { expr, .. } => self.visit(*expr),
            NodeKind::Ternary { cond, then_expr, else_expr } => {
                self.visit(*cond);
                self.visit(*then_expr);
                self.visit(*else_expr);
            }
            NodeKind::Call { args, .. } => self.visit_block(args),
            NodeKind::Identifier(name) => self.mark_use(&name.clone()),
            NodeKind::Literal { .. } => {
                self.tick();
            }
            NodeKind::If { cond, then_branch, else_branch } => {
                self.visit(*cond);
                self.push_scope(false);
                self.visit_block(then_branch);
                self.pop_scope();
                if let Some(else_branch) = else_branch {
                    self.push_scope(false);
                    self.visit_block(else_branch);
                    self.pop_scope();
                }
            }
            NodeKind::While { cond, body, .. } => {
                self.visit(*cond);
                self.push_scope(true);
                self.visit_block(body);
                self.pop_scope();
            }
            NodeKind::ForRange { var, start, end, step, body, .. } => {
                self.visit(*start);
                self.visit(*end);
                if let Some(step) = step {
                    self.visit(*step);
                }
                self.push_scope(true);
                self.declare(var, true);
                self.visit_block(body);
                self.pop_scope();
            }
            NodeKind::ForIter { var, iterable, body, .. } => {
                self.visit(*iterable);
                self.push_scope(true);
                self.declare(var, true);
                self.visit_block(body);
                self.pop_scope();
            }
            NodeKind::Break { .. } | NodeKind::Continue { .. } | NodeKind::Pass => {
                self.tick();
            }
            NodeKind::Return(expr) => {
                if let Some(expr) = expr {
                    self.visit(*expr);
                }
            }
            NodeKind::Print { args, .. } => self.visit_block(args),
            NodeKind::Function { params, body, .. } => {
                let parent_depth = self.scopes[self.current().0 as usize].depth;
                self.function_depth_stack.push(parent_depth + 1);
                self.push_scope(false);
                for p in params {
                    self.declare(&p.name, false);
                }
                self.visit_block(body);
                self.pop_scope();
                self.function_depth_stack.pop();
            }
            NodeKind::Struct { .. } | NodeKind::Enum { .. } => {
                self.tick();
            }
            NodeKind::Impl { methods, .. } => self.visit_block(methods),
            NodeKind::Match { subject, arms, .. } => {
                self.visit(*subject);
                for arm in arms {
                    self.push_scope(false);
                    self.visit_block(&arm.body);
                    self.pop_scope();
                }
            }
            NodeKind::MemberAccess { object, .. } => self.visit(*object),
            NodeKind::IndexAccess { object, index } => {
                self.visit(*object);
                self.visit(*index);
            }
            NodeKind::ArrayLiteral(items) => self.visit_block(items),
            NodeKind::ArrayFill { value, count } => {
                self.visit(*value);
                self.visit(*count);
            }
            NodeKind::ArraySlice { object, start, end } => {
                self.visit(*object);
                if let Some(start) = start {
                    self.visit(*start);
                }
                if let Some(end) = end {
                    self.visit(*end);
                }
            }
            NodeKind::StructLiteral { fields, .. } => {
                for (_, value) in fields {
                    self.visit(*value);
                }
            }
            NodeKind::Try { body, catch_body, .. } => {
                self.push_scope(false);
                self.visit_block(body);
                self.pop_scope();
                self.push_scope(false);
                self.visit_block(catch_body);
                self.pop_scope();
            }
            NodeKind::Throw(expr) => self.visit(*expr),
            NodeKind::Import(_) | NodeKind::TypeAnnotation(_) => {
                self.tick();
            }
        }
    }

    fn finalize_priorities(&mut self) {
        for scope in self.scopes.iter_mut() {
            for var in scope.variables.iter_mut() {
                var.refresh_priority();
            }
        }
    }

    /// Dead-variable identification with conservative rollback: a variable
    /// is dead iff unused, uncaptured, non-escaping, and
    /// not part of a complex (captured/escaping) lifetime. Marks are
    /// applied tentatively, then validated; any violation rolls every
    /// tentative mark back.
    fn mark_dead_variables(&mut self) {
        let mut tentative: Vec<(usize, usize)> = Vec::new();
        for (scope_idx, scope) in self.scopes.iter().enumerate() {
            for (var_idx, var) in scope.variables.iter().enumerate() {
                if var.use_count == 0 && !var.is_captured && !var.escapes && !var.is_loop_var {
                    tentative.push((scope_idx, var_idx));
                }
            }
        }

        for &(scope_idx, var_idx) in &tentative {
            self.scopes[scope_idx].variables[var_idx].is_dead = true;
        }

        let mut ok = true;
        for scope in &self.scopes {
            for var in &scope.variables {
                if var.is_dead && (var.is_captured || var.escapes || var.use_count > 0) {
                    ok = false;
                }
            }
        }

        if !ok {
            self.rollback_triggered = true;
            for scope in self.scopes.iter_mut() {
                for var in scope.variables.iter_mut() {
                    var.is_dead = false;
                }
            }
        }
    }

    pub fn analyze(mut self, root: NodeId) -> AnalysisResult {
        self.visit(root);
        while self.scope_stack.len() > 1 {
            self.pop_scope();
        }
        self.finalize_priorities();
        self.mark_dead_variables();

        let mut total = 0u32;
        let mut dead = 0u32;
        let mut captured = 0u32;
        for scope in &self.scopes {
            for var in &scope.variables {
                total += 1;
                if var.is_dead {
                    dead += 1;
                }
                if var.is_captured {
                    captured += 1;
                }
            }
        }

        AnalysisResult {
            scopes: self.scopes,
            root: ScopeId(0),
            dead_count: dead,
            captured_count: captured,
            total_count: total,
            rollback_triggered: self.rollback_triggered,
        }
    }
}

pub fn analyze(ast: &Ast, root: NodeId) -> AnalysisResult {
    ScopeAnalyzer::new(ast).analyze(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Ast, Literal, Location, NodeKind};

    fn ident(ast: &mut Ast, name: &str) -> NodeId {
        ast.alloc(NodeKind::Identifier(name.to_string()), Location::default())
    }

    fn int_lit(ast: &mut Ast, v: i64) -> NodeId {
        ast.alloc(
            NodeKind::Literal { value: Literal::Int(v), has_explicit_suffix: false },
            Location::default(),
        )
    }

    #[test]
    fn unused_variable_is_marked_dead() {
        let mut ast = Ast::new();
        let init = int_lit(&mut ast, 1);
        let decl = ast.alloc(
            NodeKind::VarDecl {
                name: "unused".to_string(),
                is_mut: false,
                is_const: false,
                type_ann: None,
                init: Some(init),
            },
            Location::default(),
        );
        let program = ast.alloc(NodeKind::Program(vec![decl]), Location::default());

        let result = analyze(&ast, program);
        assert_eq!(result.dead_count, 1);
        assert!(!result.rollback_triggered);
    }

    #[test]
    fn used_variable_is_not_dead() {
        let mut ast = Ast::new();
        let init = int_lit(&mut ast, 1);
        let decl = ast.alloc(
            NodeKind::VarDecl {
                name: "x".to_string(),
                is_mut: false,
                is_const: false,
                type_ann: None,
                init: Some(init),
            },
            Location::default(),
        );
        let use_x = ident(&mut ast, "x");
        let print = ast.alloc(
            NodeKind::Print { args: vec![use_x], newline: true },
            Location::default(),
        );
        let program = ast.alloc(NodeKind::Program(vec![decl, print]), Location::default());

        let result = analyze(&ast, program);
        assert_eq!(result.dead_count, 0);
    }

    #[test]
    fn variable_captured_by_nested_function_is_not_dead_and_is_captured() {
        let mut ast = Ast::new();
        let init = int_lit(&mut ast, 1);
        let decl = ast.alloc(
            NodeKind::VarDecl {
                name: "outer".to_string(),
                is_mut: false,
                is_const: false,
                type_ann: None,
                init: Some(init),
            },
            Location::default(),
        );
        let use_outer = ident(&mut ast, "outer");
        let ret = ast.alloc(NodeKind::Return(Some(use_outer)), Location::default());
        let func = ast.alloc(
            NodeKind::Function {
                name: "inner".to_string(),
                params: vec![],
                return_type: None,
                body: vec![ret],
                is_pub: false,
            },
            Location::default(),
        );
        let program = ast.alloc(NodeKind::Program(vec![decl, func]), Location::default());

        let result = analyze(&ast, program);
        assert_eq!(result.captured_count, 1);
        assert_eq!(result.dead_count, 0);
    }

    #[test]
    fn loop_variable_is_never_marked_dead_even_if_unused() {
        let mut ast = Ast::new();
        let start = int_lit(&mut ast, 0);
        let end = int_lit(&mut ast, 3);
        let pass = ast.alloc(NodeKind::Pass, Location::default());
        let for_loop = ast.alloc(
            NodeKind::ForRange {
                label: None,
                var: "i".to_string(),
                start,
                end,
                step: None,
                inclusive: false,
                body: vec![pass],
            },
            Location::default(),
        );
        let program = ast.alloc(NodeKind::Program(vec![for_loop]), Location::default());

        let result = analyze(&ast, program);
        assert_eq!(result.dead_count, 0);
    }

    #[test]
    fn priority_classification_matches_lifespan_thresholds() {
        assert_eq!(classify_priority(0, 5), Priority::Short);
        assert_eq!(classify_priority(0, 50), Priority::Medium);
        assert_eq!(classify_priority(0, 150), Priority::Long);
    }
}
