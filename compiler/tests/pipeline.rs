//! End-to-end scenarios driving the real lexer -> parser -> optimizer ->
//! scope analysis -> emitter pipeline over source text, as opposed to the
//! hand-built-AST unit tests inside each module. Since the interpreter loop
//! is out of scope for this crate, these assert on the pipeline's visible
//! structural output (diagnostics, folded/hoisted AST shape, constant pool,
//! declared globals) rather than on printed program output.

use orusc::ast::NodeKind;
use orusc::config::CompileOptions;

fn parse_ok(source: &str) -> (orusc::ast::Ast, orusc::ast::NodeId) {
    let (ast, root, diags) = orusc::parse(source, "main");
    assert!(!diags.had_error(), "unexpected parse diagnostics: {:?}", diags);
    (ast, root)
}

/// An inclusive range loop visits every bound.
#[test]
fn inclusive_for_range_parses_and_compiles() {
    let (mut ast, root) = parse_ok("for i in 1..=3:\n    print(i)\n");
    match ast.kind(root) {
        NodeKind::Program(stmts) => {
            assert_eq!(stmts.len(), 1);
            match ast.kind(stmts[0]) {
                NodeKind::ForRange { inclusive, .. } => assert!(*inclusive),
                other => panic!("expected a for-range loop, got {:?}", other),
            }
        }
        other => panic!("expected a program, got {:?}", other),
    }

    let mut chunk = orus_runtime::Chunk::new();
    let mut vm = orus_runtime::Vm::new();
    let options = CompileOptions::default();
    let result = orusc::compile(&mut ast, root, &mut chunk, &mut vm, &options);
    assert!(result.is_ok());
    assert!(!chunk.is_empty());
}

/// The inline single-line `if/else` form parses, and constant folding
/// collapses the always-true condition down to just the "yes" branch.
#[test]
fn inline_if_else_folds_to_the_true_branch() {
    let (mut ast, root) = parse_ok("if 1 + 2 == 3: print(\"yes\")\nelse: print(\"no\")\n");

    orusc::optimizer::optimize(&mut ast, root);

    match ast.kind(root) {
        NodeKind::Program(stmts) => {
            assert_eq!(stmts.len(), 1);
            match ast.kind(stmts[0]) {
                NodeKind::Block(inner) => {
                    assert_eq!(inner.len(), 1);
                    match ast.kind(inner[0]) {
                        NodeKind::Print { args, .. } => {
                            assert_eq!(args.len(), 1);
                            match ast.kind(args[0]) {
                                NodeKind::Literal { value: orusc::ast::Literal::Str(s), .. } => {
                                    assert_eq!(s, "yes");
                                }
                                other => panic!("expected a string literal, got {:?}", other),
                            }
                        }
                        other => panic!("expected the surviving print, got {:?}", other),
                    }
                }
                other => panic!("expected the if to collapse to a block, got {:?}", other),
            }
        }
        other => panic!("expected a program, got {:?}", other),
    }
}

/// `k = 2 * n` is loop-invariant and hoists above the `for` loop that
/// mutates `s`.
#[test]
fn loop_invariant_assignment_hoists_out_of_the_loop() {
    let source = "n = 10\nmut s = 0\nmut k = 0\nfor i in 0..n:\n    k = 2 * n\n    s = s + k + i\n";
    let (mut ast, root) = parse_ok(source);

    let stats = orusc::optimizer::optimize(&mut ast, root);
    assert!(stats.invariants_hoisted >= 1);
    assert!(stats.loops_optimized >= 1);

    match ast.kind(root) {
        NodeKind::Program(stmts) => {
            let for_loop = stmts
                .iter()
                .find(|&&id| matches!(ast.kind(id), NodeKind::ForRange { .. }))
                .expect("expected a for-range loop in the program");
            match ast.kind(*for_loop) {
                NodeKind::ForRange { body, .. } => {
                    assert!(
                        body.iter().all(|&id| !matches!(
                            ast.kind(id),
                            NodeKind::Assign { target, .. }
                                if matches!(ast.kind(*target), NodeKind::Identifier(n) if n == "k")
                        )),
                        "the hoisted assignment to k should no longer live in the loop body"
                    );
                }
                other => panic!("expected a for-range loop, got {:?}", other),
            }
        }
        other => panic!("expected a program, got {:?}", other),
    }
}

/// A redundant guard `g2 = g1 and b` fuses to `g2 = g1` once both are
/// hoisted out of the same loop.
#[test]
fn redundant_guard_fuses_after_hoisting() {
    let source =
        "a = true\nb = true\nwhile true:\n    mut g1 = a and b\n    mut g2 = g1 and b\n    pass\n";
    let (mut ast, root) = parse_ok(source);

    let stats = orusc::optimizer::optimize(&mut ast, root);
    assert_eq!(stats.redundant_guard_fusions, 1);
}

/// Chained `as` casts without parentheses are rejected, but the same chain
/// with explicit parentheses is accepted.
#[test]
fn chained_cast_requires_parentheses() {
    let (_, _, diags) = orusc::parse("x = 1\ny = x as i64 as f64\n", "main");
    assert!(diags.had_error());

    let (_, _, diags) = orusc::parse("x = 1\ny = ((x as i64) as f64)\n", "main");
    assert!(!diags.had_error());
}

/// A `match` with a wildcard arm is exhaustive; one missing a wildcard
/// catch-all reports `NonExhaustiveMatch` at emission time (the current
/// exhaustiveness check is wildcard-only, not per-variant).
#[test]
fn match_with_wildcard_arm_has_wildcard_flag_set() {
    let source = "n = 1\nmatch n:\n    1 -> print(\"one\")\n    _ -> print(\"other\")\n";
    let (mut ast, root) = parse_ok(source);

    match ast.kind(root) {
        NodeKind::Program(stmts) => {
            let match_node = stmts
                .iter()
                .find(|&&id| matches!(ast.kind(id), NodeKind::Match { .. }))
                .expect("expected a match statement");
            match ast.kind(*match_node) {
                NodeKind::Match { has_wildcard, .. } => assert!(*has_wildcard),
                other => panic!("expected a match node, got {:?}", other),
            }
        }
        other => panic!("expected a program, got {:?}", other),
    }

    let mut chunk = orus_runtime::Chunk::new();
    let mut vm = orus_runtime::Vm::new();
    let options = CompileOptions::default();
    let result = orusc::compile(&mut ast, root, &mut chunk, &mut vm, &options);
    assert!(result.is_ok());
}

/// A `match` with no wildcard arm is reported as non-exhaustive at
/// emission time rather than silently accepted.
#[test]
fn match_without_wildcard_arm_is_reported_non_exhaustive() {
    let source = "n = 1\nmatch n:\n    1 -> print(\"one\")\n    2 -> print(\"two\")\n";
    let (mut ast, root) = parse_ok(source);
    let mut chunk = orus_runtime::Chunk::new();
    let mut vm = orus_runtime::Vm::new();
    let options = CompileOptions::default();
    let result = orusc::compile(&mut ast, root, &mut chunk, &mut vm, &options);
    assert!(result.is_err());
}

/// Declaring a global and reassigning it registers exactly one global slot
/// on the VM and lowers a folded constant into the chunk's pool.
#[test]
fn global_declaration_registers_one_slot_and_folds_its_constant() {
    let (mut ast, root) = parse_ok("total = 1 + 2\nprint(total)\n");

    let mut chunk = orus_runtime::Chunk::new();
    let mut vm = orus_runtime::Vm::new();
    let options = CompileOptions::default();
    let result = orusc::compile(&mut ast, root, &mut chunk, &mut vm, &options);
    assert!(result.is_ok());
    assert_eq!(vm.variable_count, 1);
    assert_eq!(vm.variable_names[0], "total");
    assert!(chunk
        .constants
        .iter()
        .any(|v| matches!(v, orus_runtime::Value::I32(3))));
}

/// An undefined identifier is reported as a diagnostic rather than causing
/// a panic, and other statements in the same program are still attempted.
#[test]
fn undefined_variable_is_a_diagnostic_not_a_panic() {
    let (mut ast, root) = parse_ok("print(undeclared)\nx = 1\nprint(x)\n");
    let mut chunk = orus_runtime::Chunk::new();
    let mut vm = orus_runtime::Vm::new();
    let options = CompileOptions::default();
    let result = orusc::compile(&mut ast, root, &mut chunk, &mut vm, &options);
    assert!(result.is_err());
}
