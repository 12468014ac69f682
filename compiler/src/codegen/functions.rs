//! Function sub-compilers and upvalues: each function body gets its own
//! register namespace and its own `Chunk`, compiled by a throwaway `CodeGen`
//! that shares the parent's `vm` handle.

use super::opcode::Opcode;
use super::CodeGen;
use crate::ast::{NodeId, NodeKind};
use crate::diagnostics::DiagnosticCode;
use crate::symbol_table::SlotIndex;

impl<'a> CodeGen<'a> {
    /// Compiles a function body in a dedicated sub-chunk with its own
    /// register namespace, then registers the resulting function object in
    /// a global slot keyed by name.
    pub(super) fn gen_function(&mut self, id: NodeId) {
        let (name, params, body) = match self.ast.kind(id).clone() {
            NodeKind::Function { name, params, body, .. } => (name, params, body),
            _ => return,
        };

        let mut sub = CodeGen::new(self.ast, self.vm, self.options);
        sub.current_scope_depth = self.current_scope_depth + 1;
        // Parameters occupy the first N local registers; register 0 stays
        // reserved, so params start at register 1.
        for (i, param) in params.iter().enumerate() {
            let reg = (i + 1) as u8;
            sub.name_to_register.insert(param.name.clone(), reg);
        }
        sub.next_free_register = (params.len() + 1) as u8;

        for stmt in &body {
            sub.gen_stmt(*stmt);
        }

        if !ends_in_return(self.ast, &body) {
            sub.emit_op(id, Opcode::ReturnVoid, &[]);
        }

        let (sub_chunk, sub_diagnostics) = sub.finish();
        self.diagnostics.extend(sub_diagnostics);

        let mut function = orus_runtime::allocate_function(&name, params.len() as u8);
        // `function` was just allocated and never shared, so this is the
        // only owner: safe to fill in the chunk the sub-compiler produced.
        std::rc::Rc::get_mut(&mut function)
            .expect("freshly allocated function has no other owners")
            .chunk = sub_chunk;

        self.vm.register_function(function);
        let slot = self
            .vm
            .declare_global(&name, orus_runtime::GlobalType::Function, false);
        if self
            .symbols
            .set(&name, SlotIndex::Global(slot), self.current_scope_depth)
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

fn ends_in_return(ast: &crate::ast::Ast, body: &[NodeId]) -> bool {
    matches!(
        body.last().map(|id| ast.kind(*id)),
        Some(NodeKind::Return(_))
    )
}
