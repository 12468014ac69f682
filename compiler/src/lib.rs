//! Compiler core for the Orus language.
//!
//! Wires the phases together — lexer -> parser -> analysis passes -> emitter
//! — behind two entry points, `parse` and `compile`, instead of exposing
//! each phase's internals to callers.

pub mod ast;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod register_alloc;
pub mod scope;
pub mod symbol_table;
pub mod token;
pub mod types;

use ast::{Ast, NodeId};
use config::CompileOptions;
use diagnostics::DiagnosticBag;

/// Lexes and parses `source` into an arena-owned AST.
///
/// Never fails outright: lexical and syntactic errors are collected into the
/// returned [`DiagnosticBag`] while the parser keeps going statement by
/// statement, so a caller can report every problem in one pass instead of
/// stopping at the first one.
#[tracing::instrument(skip(source), fields(module = %module_name))]
pub fn parse(source: &str, module_name: &str) -> (Ast, NodeId, DiagnosticBag) {
    tracing::debug!("parsing module");
    let (ast, root, diagnostics) = parser::parse(source);
    if diagnostics.had_error() {
        tracing::warn!(count = diagnostics.iter().count(), "parse completed with diagnostics");
    }
    (ast, root, diagnostics)
}

/// Runs scope analysis, optimization, register allocation, and bytecode
/// emission over an already-parsed AST, writing the top-level chunk into
/// `chunk` and registering any nested function chunks/globals on `vm`.
/// Returns `Err` with accumulated diagnostics if any phase
/// reported a fatal problem; `chunk` and `vm` may still hold a partially
/// emitted result in that case, which callers should discard.
#[tracing::instrument(skip(ast, chunk, vm, options), fields(module = %options.module_name))]
pub fn compile(
    ast: &mut Ast,
    root: NodeId,
    chunk: &mut orus_runtime::Chunk,
    vm: &mut orus_runtime::Vm,
    options: &CompileOptions,
) -> Result<(), DiagnosticBag> {
    if options.optimize {
        let stats = optimizer::optimize(ast, root);
        tracing::debug!(
            invariants_hoisted = stats.invariants_hoisted,
            loops_optimized = stats.loops_optimized,
            guard_fusions = stats.guard_fusions,
            "optimization pass complete"
        );
    }

    let analysis = scope::analyze(ast, root);
    if analysis.rollback_triggered {
        tracing::debug!("dead-variable elimination rolled back: escape analysis was inconclusive");
    }
    tracing::debug!(
        total = analysis.total_count,
        dead = analysis.dead_count,
        captured = analysis.captured_count,
        "scope analysis complete"
    );

    let mut codegen = codegen::CodeGen::new(ast, vm, options);
    codegen.apply_register_assignments(&analysis);
    codegen.gen_stmt(root);
    let (emitted, diagnostics) = codegen.finish();
    *chunk = emitted;

    if diagnostics.had_error() {
        tracing::error!(count = diagnostics.iter().count(), "compilation failed");
        return Err(diagnostics);
    }

    tracing::debug!("compilation succeeded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_then_compile_round_trip_succeeds_for_a_trivial_program() {
        let (mut ast, root, diags) = parse("x = 1\nprint(x)\n", "main");
        assert!(!diags.had_error());
        let mut chunk = orus_runtime::Chunk::new();
        let mut vm = orus_runtime::Vm::new();
        let options = CompileOptions::default();
        let result = compile(&mut ast, root, &mut chunk, &mut vm, &options);
        assert!(result.is_ok());
        assert!(!chunk.is_empty());
    }

    #[test]
    fn compile_reports_undefined_variable_as_a_diagnostic_not_a_panic() {
        let (mut ast, root, diags) = parse("print(missing)\n", "main");
        assert!(!diags.had_error());
        let mut chunk = orus_runtime::Chunk::new();
        let mut vm = orus_runtime::Vm::new();
        let options = CompileOptions::default();
        let result = compile(&mut ast, root, &mut chunk, &mut vm, &options);
        assert!(result.is_err());
    }
}
