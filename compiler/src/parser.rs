//! Recursive-descent parser.
//!
//! A token vector plus a cursor, with `check`/`consume`/`advance` helpers
//! driving an arena-allocated [`Ast`] instead of building a tree of owned,
//! boxed statement enums. Failures are reported as [`Diagnostic`]s rather
//! than bailing out with `Result<_, String>`, so one bad statement doesn't
//! stop the rest of the file from being parsed.

use std::collections::HashSet;
use std::string::String;

use crate::ast::{
    Ast, AssignOp, BinaryOp, EnumVariantDef, Literal, Location, MatchArm, NodeId, NodeKind, Param,
    Pattern, StructField, UnaryOp, UsePath,
};
use crate::diagnostics::{Diagnostic, DiagnosticBag, DiagnosticCode, SourceLoc};
use crate::lexer::tokenize;
use crate::token::{Token, TokenKind};
use crate::types::Type;

/// Parser's recursion-depth cap.
const MAX_RECURSION_DEPTH: usize = 1000;
/// Loop-nesting cap the parser itself enforces.
const MAX_LOOP_NESTING: usize = 16;

/// Parse `source` into an arena, returning the root `Program` node and any
/// diagnostics accumulated by the lexer and parser together.
pub fn parse(source: &str) -> (Ast, NodeId, DiagnosticBag) {
    let (tokens, lex_diagnostics) = tokenize(source);
    let mut parser = Parser {
        tokens,
        source,
        pos: 0,
        ast: Ast::new(),
        diagnostics: lex_diagnostics,
        depth: 0,
        loop_depth: 0,
        scopes: vec![HashSet::new()],
        tuple_tmp_counter: 0,
    };
    let root = parser.parse_program();
    (parser.ast, root, parser.diagnostics)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    source: &'a str,
    pos: usize,
    ast: Ast,
    diagnostics: DiagnosticBag,
    depth: usize,
    loop_depth: usize,
    /// One set of declared names per lexical nesting level, used only to
    /// decide whether a bare `name = expr` is a fresh `VarDecl` or a
    /// re-assignment — the scope analyzer does the real symbol resolution
    /// later.
    scopes: Vec<HashSet<String>>,
    tuple_tmp_counter: u32,
}

use TokenKind::*;

impl<'a> Parser<'a> {
    fn peek(&self) -> TokenKind {
        self.tokens[self.pos].kind
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek() == kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos];
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn text(&self, tok: Token) -> &'a str {
        tok.lexeme(self.source)
    }

    fn loc(&self) -> Location {
        let tok = self.tokens[self.pos];
        Location { line: tok.line, column: tok.column }
    }

    fn error(&mut self, code: DiagnosticCode, message: impl Into<String>) {
        let loc = self.loc();
        self.diagnostics
            .push(Diagnostic::new(code, SourceLoc::new(loc.line, loc.column), message));
    }

    fn expect(&mut self, kind: TokenKind, code: DiagnosticCode, message: impl Into<String>) -> Option<Token> {
        if self.at(kind) {
            Some(self.advance())
        } else {
            self.error(code, message);
            None
        }
    }

    fn expect_newline(&mut self) {
        if self.at(Newline) {
            self.advance();
        } else if !self.at(Eof) && !self.at(Dedent) {
            self.error(DiagnosticCode::MissingDelimiter, "expected end of statement");
        }
    }

    fn skip_newlines(&mut self) {
        while self.at(Newline) {
            self.advance();
        }
    }

    /// Skips to the next statement boundary after an unrecoverable local
    /// error. Fatal errors abort the current statement, not the whole file.
    fn synchronize(&mut self) {
        while !self.at(Newline) && !self.at(Dedent) && !self.at(Eof) {
            self.advance();
        }
        if self.at(Newline) {
            self.advance();
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashSet::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare_name(&mut self, name: &str) {
        if let Some(top) = self.scopes.last_mut() {
            top.insert(name.to_string());
        }
    }

    fn is_declared(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| s.contains(name))
    }

    fn compound_assign_op(&self) -> Option<BinaryOp> {
        match self.peek() {
            PlusEq => Some(BinaryOp::Add),
            MinusEq => Some(BinaryOp::Sub),
            StarEq => Some(BinaryOp::Mul),
            SlashEq => Some(BinaryOp::Div),
            PercentEq => Some(BinaryOp::Mod),
            _ => None,
        }
    }

    // ---------------------------------------------------------------
    // Program / statements
    // ---------------------------------------------------------------

    fn parse_program(&mut self) -> NodeId {
        let mut stmts = Vec::new();
        self.skip_newlines();
        while !self.at(Eof) {
            if let Some(s) = self.parse_statement(true) {
                stmts.push(s);
            }
            self.skip_newlines();
        }
        self.ast.alloc(NodeKind::Program(stmts), Location { line: 1, column: 1 })
    }

    fn parse_statement(&mut self, top_level: bool) -> Option<NodeId> {
        self.skip_newlines();
        if self.at(Eof) || self.at(Dedent) {
            return None;
        }

        let is_pub = if self.at(KwPub) {
            if !top_level {
                self.error(DiagnosticCode::UnexpectedToken, "'pub' is only valid at module scope");
            }
            self.advance();
            true
        } else {
            false
        };

        let result = match self.peek() {
            KwFn => self.parse_function(is_pub),
            KwStruct => self.parse_struct(is_pub),
            KwEnum => self.parse_enum(is_pub),
            KwImpl => {
                if is_pub {
                    self.error(DiagnosticCode::UnexpectedToken, "'pub' cannot precede 'impl'");
                }
                self.parse_impl()
            }
            KwUse | KwImport => {
                if !top_level {
                    self.error(DiagnosticCode::UnexpectedToken, "'use'/'import' is only valid at module scope");
                }
                self.parse_import()
            }
            KwIf => self.parse_if(),
            KwWhile => self.parse_while(None),
            KwFor => self.parse_for(None),
            Quote => self.parse_labeled_loop(),
            KwMatch => self.parse_match(),
            KwBreak => self.parse_break(),
            KwContinue => self.parse_continue(),
            KwPass => self.parse_pass(),
            KwReturn => self.parse_return(),
            KwPrint => self.parse_print(),
            KwThrow => self.parse_throw(),
            KwTry => self.parse_try(),
            _ => {
                if is_pub {
                    self.error(DiagnosticCode::UnexpectedToken, "'pub' must precede a declaration");
                }
                self.parse_simple_stmt()
            }
        };

        if result.is_none() {
            self.synchronize();
        }
        result
    }

    /// A loop/if/function/etc. body: either a single inline statement
    /// (`if cond: print(x)`) or an indented block.
    fn parse_block(&mut self) -> Vec<NodeId> {
        if !self.at(Newline) {
            return match self.parse_statement(false) {
                Some(s) => vec![s],
                None => Vec::new(),
            };
        }
        self.advance(); // Newline
        if self.expect(Indent, DiagnosticCode::MissingDelimiter, "expected an indented block").is_none() {
            return Vec::new();
        }
        self.push_scope();
        let mut stmts = Vec::new();
        while !self.at(Dedent) && !self.at(Eof) {
            if let Some(s) = self.parse_statement(false) {
                stmts.push(s);
            }
            self.skip_newlines();
        }
        self.pop_scope();
        self.expect(Dedent, DiagnosticCode::MissingDelimiter, "expected a dedent to close the block");
        if stmts.is_empty() {
            self.error(DiagnosticCode::EmptyBlock, "empty block: use 'pass' for a deliberate no-op");
        }
        stmts
    }

    fn parse_if(&mut self) -> Option<NodeId> {
        let loc = self.loc();
        self.advance(); // 'if'
        let cond = self.parse_expr();
        self.expect(Colon, DiagnosticCode::MissingDelimiter, "expected ':' after if condition")?;
        let then_branch = self.parse_block();
        let else_branch = self.parse_else_chain();
        Some(self.ast.alloc(NodeKind::If { cond, then_branch, else_branch }, loc))
    }

    fn parse_else_chain(&mut self) -> Option<Vec<NodeId>> {
        if self.at(KwElif) {
            let loc = self.loc();
            self.advance();
            let cond = self.parse_expr();
            self.expect(Colon, DiagnosticCode::MissingDelimiter, "expected ':' after elif condition");
            let then_branch = self.parse_block();
            let else_branch = self.parse_else_chain();
            let id = self.ast.alloc(NodeKind::If { cond, then_branch, else_branch }, loc);
            Some(vec![id])
        } else if self.at(KwElse) {
            self.advance();
            self.expect(Colon, DiagnosticCode::MissingDelimiter, "expected ':' after else");
            Some(self.parse_block())
        } else {
            None
        }
    }

    fn parse_while(&mut self, label: Option<String>) -> Option<NodeId> {
        let loc = self.loc();
        self.advance(); // 'while'
        let cond = self.parse_expr();
        self.expect(Colon, DiagnosticCode::MissingDelimiter, "expected ':' after while condition")?;
        if self.loop_depth >= MAX_LOOP_NESTING {
            self.error(DiagnosticCode::ExpressionTooComplex, "loop nesting exceeds the maximum depth");
        }
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        Some(self.ast.alloc(NodeKind::While { label, cond, body }, loc))
    }

    fn parse_for(&mut self, label: Option<String>) -> Option<NodeId> {
        let loc = self.loc();
        self.advance(); // 'for'
        let var_tok = self.expect(Identifier, DiagnosticCode::UnexpectedToken, "expected a loop variable name")?;
        let var = self.text(var_tok).to_string();
        self.expect(KwIn, DiagnosticCode::MissingDelimiter, "expected 'in' in for loop")?;
        let start = self.parse_expr();

        if self.loop_depth >= MAX_LOOP_NESTING {
            self.error(DiagnosticCode::ExpressionTooComplex, "loop nesting exceeds the maximum depth");
        }

        if self.at(Range) || self.at(RangeInclusive) {
            let inclusive = self.at(RangeInclusive);
            self.advance();
            let end = self.parse_additive();
            let step = if self.at(Range) {
                self.advance();
                Some(self.parse_additive())
            } else {
                None
            };
            self.expect(Colon, DiagnosticCode::MissingDelimiter, "expected ':' after for-range header")?;
            self.loop_depth += 1;
            self.push_scope();
            self.declare_name(&var);
            let body = self.parse_block();
            self.pop_scope();
            self.loop_depth -= 1;
            Some(self.ast.alloc(NodeKind::ForRange { label, var, start, end, step, inclusive, body }, loc))
        } else {
            self.expect(Colon, DiagnosticCode::MissingDelimiter, "expected ':' after for-in header")?;
            self.loop_depth += 1;
            self.push_scope();
            self.declare_name(&var);
            let body = self.parse_block();
            self.pop_scope();
            self.loop_depth -= 1;
            Some(self.ast.alloc(NodeKind::ForIter { label, var, iterable: start, body }, loc))
        }
    }

    fn parse_labeled_loop(&mut self) -> Option<NodeId> {
        self.advance(); // Quote
        let name_tok = self.expect(Identifier, DiagnosticCode::UnexpectedToken, "expected a label name after '\''")?;
        let label = self.text(name_tok).to_string();
        self.expect(Colon, DiagnosticCode::MissingDelimiter, "expected ':' after loop label")?;
        match self.peek() {
            KwWhile => self.parse_while(Some(label)),
            KwFor => self.parse_for(Some(label)),
            _ => {
                self.error(DiagnosticCode::UnexpectedToken, "a label must precede 'while' or 'for'");
                None
            }
        }
    }

    fn parse_optional_label(&mut self) -> Option<String> {
        if self.at(Quote) {
            self.advance();
            self.expect(Identifier, DiagnosticCode::UnexpectedToken, "expected a label name")
                .map(|t| self.text(t).to_string())
        } else {
            None
        }
    }

    fn parse_break(&mut self) -> Option<NodeId> {
        let loc = self.loc();
        self.advance(); // 'break'
        let label = self.parse_optional_label();
        self.expect_newline();
        Some(self.ast.alloc(NodeKind::Break { label }, loc))
    }

    fn parse_continue(&mut self) -> Option<NodeId> {
        let loc = self.loc();
        self.advance(); // 'continue'
        let label = self.parse_optional_label();
        self.expect_newline();
        Some(self.ast.alloc(NodeKind::Continue { label }, loc))
    }

    fn parse_pass(&mut self) -> Option<NodeId> {
        let loc = self.loc();
        self.advance();
        self.expect_newline();
        Some(self.ast.alloc(NodeKind::Pass, loc))
    }

    fn parse_return(&mut self) -> Option<NodeId> {
        let loc = self.loc();
        self.advance();
        let expr = if self.at(Newline) || self.at(Dedent) || self.at(Eof) {
            None
        } else {
            Some(self.parse_expr())
        };
        self.expect_newline();
        Some(self.ast.alloc(NodeKind::Return(expr), loc))
    }

    fn parse_print(&mut self) -> Option<NodeId> {
        let loc = self.loc();
        self.advance(); // 'print'
        self.expect(LeftParen, DiagnosticCode::MissingDelimiter, "expected '(' after 'print'")?;
        let mut args = Vec::new();
        if !self.at(RightParen) {
            loop {
                args.push(self.parse_expr());
                if self.at(Comma) {
                    self.advance();
                    if self.at(RightParen) {
                        break;
                    }
                    continue;
                }
                if !self.at(RightParen) {
                    self.error(DiagnosticCode::MissingComma, "expected ',' between print arguments");
                }
                break;
            }
        }
        self.expect(RightParen, DiagnosticCode::MissingDelimiter, "expected ')' to close print arguments")?;
        self.expect_newline();
        Some(self.ast.alloc(NodeKind::Print { args, newline: true }, loc))
    }

    fn parse_throw(&mut self) -> Option<NodeId> {
        let loc = self.loc();
        self.advance();
        let expr = self.parse_expr();
        self.expect_newline();
        Some(self.ast.alloc(NodeKind::Throw(expr), loc))
    }

    fn parse_try(&mut self) -> Option<NodeId> {
        let loc = self.loc();
        self.advance();
        self.expect(Colon, DiagnosticCode::MissingDelimiter, "expected ':' after try")?;
        let body = self.parse_block();
        let mut catch_name = None;
        let mut catch_body = Vec::new();
        if self.at(KwCatch) {
            self.advance();
            if self.at(Identifier) {
                let tok = self.advance();
                catch_name = Some(self.text(tok).to_string());
            }
            self.expect(Colon, DiagnosticCode::MissingDelimiter, "expected ':' after catch");
            catch_body = self.parse_block();
        }
        Some(self.ast.alloc(NodeKind::Try { body, catch_name, catch_body }, loc))
    }

    fn parse_import(&mut self) -> Option<NodeId> {
        let loc = self.loc();
        self.advance(); // 'use' or 'import'
        let mut segments = Vec::new();
        loop {
            let tok = self.expect(Identifier, DiagnosticCode::UnexpectedToken, "expected an identifier in the import path")?;
            segments.push(self.text(tok).to_string());
            if self.at(Dot) {
                self.advance();
                continue;
            }
            break;
        }
        let alias = if self.at(KwAs) {
            self.advance();
            self.expect(Identifier, DiagnosticCode::UnexpectedToken, "expected an alias after 'as'")
                .map(|t| self.text(t).to_string())
        } else {
            None
        };
        let symbols = if self.at(Colon) {
            self.advance();
            if self.at(Star) {
                self.advance();
                Some(Vec::new())
            } else {
                let mut syms = Vec::new();
                loop {
                    let Some(tok) = self.expect(Identifier, DiagnosticCode::UnexpectedToken, "expected a symbol name") else {
                        break;
                    };
                    let name = self.text(tok).to_string();
                    let sym_alias = if self.at(KwAs) {
                        self.advance();
                        self.expect(Identifier, DiagnosticCode::UnexpectedToken, "expected an alias after 'as'")
                            .map(|t| self.text(t).to_string())
                    } else {
                        None
                    };
                    syms.push((name, sym_alias));
                    if self.at(Comma) {
                        self.advance();
                        continue;
                    }
                    break;
                }
                Some(syms)
            }
        } else {
            None
        };
        self.expect_newline();
        Some(self.ast.alloc(NodeKind::Import(UsePath { segments, alias, symbols }), loc))
    }

    fn parse_function(&mut self, is_pub: bool) -> Option<NodeId> {
        let loc = self.loc();
        self.advance(); // 'fn'
        let name_tok = self.expect(Identifier, DiagnosticCode::UnexpectedToken, "expected a function name")?;
        let name = self.text(name_tok).to_string();
        self.expect(LeftParen, DiagnosticCode::MissingDelimiter, "expected '(' after function name")?;
        let mut params = Vec::new();
        if !self.at(RightParen) {
            loop {
                let Some(p_tok) = self.expect(Identifier, DiagnosticCode::UnexpectedToken, "expected a parameter name") else {
                    break;
                };
                let p_name = self.text(p_tok).to_string();
                let type_ann = if self.at(Colon) {
                    self.advance();
                    Some(self.parse_type_annotation_node())
                } else {
                    None
                };
                params.push(Param { name: p_name, type_ann });
                if self.at(Comma) {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect(RightParen, DiagnosticCode::MissingDelimiter, "expected ')' to close the parameter list")?;
        let return_type = if self.at(Arrow) {
            self.advance();
            Some(self.parse_type_annotation_node())
        } else {
            None
        };
        self.expect(Colon, DiagnosticCode::MissingDelimiter, "expected ':' to start the function body")?;
        self.push_scope();
        for p in &params {
            self.declare_name(&p.name);
        }
        let body = self.parse_block_no_scope();
        self.pop_scope();
        Some(self.ast.alloc(NodeKind::Function { name, params, return_type, body, is_pub }, loc))
    }

    /// Like [`Self::parse_block`] but doesn't push its own name scope — used
    /// by `parse_function`, which already pushed one to cover parameters.
    fn parse_block_no_scope(&mut self) -> Vec<NodeId> {
        if !self.at(Newline) {
            return match self.parse_statement(false) {
                Some(s) => vec![s],
                None => Vec::new(),
            };
        }
        self.advance();
        if self.expect(Indent, DiagnosticCode::MissingDelimiter, "expected an indented block").is_none() {
            return Vec::new();
        }
        let mut stmts = Vec::new();
        while !self.at(Dedent) && !self.at(Eof) {
            if let Some(s) = self.parse_statement(false) {
                stmts.push(s);
            }
            self.skip_newlines();
        }
        self.expect(Dedent, DiagnosticCode::MissingDelimiter, "expected a dedent to close the block");
        if stmts.is_empty() {
            self.error(DiagnosticCode::EmptyBlock, "empty block: use 'pass' for a deliberate no-op");
        }
        stmts
    }

    fn parse_struct(&mut self, is_pub: bool) -> Option<NodeId> {
        let loc = self.loc();
        self.advance(); // 'struct'
        let name_tok = self.expect(Identifier, DiagnosticCode::UnexpectedToken, "expected a struct name")?;
        let name = self.text(name_tok).to_string();
        self.expect(Colon, DiagnosticCode::MissingDelimiter, "expected ':' after struct name")?;
        self.expect(Newline, DiagnosticCode::MissingDelimiter, "expected a newline before struct fields")?;
        self.expect(Indent, DiagnosticCode::MissingDelimiter, "expected an indented struct body")?;
        let mut fields = Vec::new();
        while !self.at(Dedent) && !self.at(Eof) {
            if self.at(Identifier) {
                let f_tok = self.advance();
                let f_name = self.text(f_tok).to_string();
                self.expect(Colon, DiagnosticCode::MissingDelimiter, "expected ':' after field name");
                let type_ann = self.parse_type_annotation_node();
                fields.push(StructField { name: f_name, type_ann });
                self.expect_newline();
            } else {
                self.synchronize();
            }
            self.skip_newlines();
        }
        self.expect(Dedent, DiagnosticCode::MissingDelimiter, "expected a dedent to close the struct body");
        Some(self.ast.alloc(NodeKind::Struct { name, fields, is_pub }, loc))
    }

    fn parse_enum_variant(&mut self) -> EnumVariantDef {
        let tok = self.advance();
        let name = self.text(tok).to_string();
        let mut fields = Vec::new();
        if self.at(LeftParen) {
            self.advance();
            if !self.at(RightParen) {
                loop {
                    if let Some(f_tok) = self.expect(Identifier, DiagnosticCode::UnexpectedToken, "expected a field name") {
                        let f_name = self.text(f_tok).to_string();
                        self.expect(Colon, DiagnosticCode::MissingDelimiter, "expected ':' after field name");
                        let type_ann = self.parse_type_annotation_node();
                        fields.push(StructField { name: f_name, type_ann });
                    }
                    if self.at(Comma) {
                        self.advance();
                        continue;
                    }
                    break;
                }
            }
            self.expect(RightParen, DiagnosticCode::MissingDelimiter, "expected ')' to close variant fields");
        }
        EnumVariantDef { name, fields }
    }

    fn parse_enum(&mut self, is_pub: bool) -> Option<NodeId> {
        let loc = self.loc();
        self.advance(); // 'enum'
        let name_tok = self.expect(Identifier, DiagnosticCode::UnexpectedToken, "expected an enum name")?;
        let name = self.text(name_tok).to_string();
        self.expect(Colon, DiagnosticCode::MissingDelimiter, "expected ':' after enum name")?;
        let mut variants = Vec::new();
        if self.at(Newline) {
            self.advance();
            self.expect(Indent, DiagnosticCode::MissingDelimiter, "expected an indented enum body")?;
            while !self.at(Dedent) && !self.at(Eof) {
                if self.at(Identifier) {
                    variants.push(self.parse_enum_variant());
                    self.expect_newline();
                } else {
                    self.synchronize();
                }
                self.skip_newlines();
            }
            self.expect(Dedent, DiagnosticCode::MissingDelimiter, "expected a dedent to close the enum body");
        } else {
            loop {
                if !self.at(Identifier) {
                    self.error(DiagnosticCode::UnexpectedToken, "expected a variant name");
                    break;
                }
                variants.push(self.parse_enum_variant());
                if self.at(Comma) {
                    self.advance();
                    continue;
                }
                break;
            }
            self.expect_newline();
        }
        Some(self.ast.alloc(NodeKind::Enum { name, variants, is_pub }, loc))
    }

    fn parse_impl(&mut self) -> Option<NodeId> {
        let loc = self.loc();
        self.advance(); // 'impl'
        let name_tok = self.expect(Identifier, DiagnosticCode::UnexpectedToken, "expected a type name after 'impl'")?;
        let type_name = self.text(name_tok).to_string();
        self.expect(Colon, DiagnosticCode::MissingDelimiter, "expected ':' after impl target")?;
        self.expect(Newline, DiagnosticCode::MissingDelimiter, "expected a newline before impl methods")?;
        self.expect(Indent, DiagnosticCode::MissingDelimiter, "expected an indented impl body")?;
        let mut methods = Vec::new();
        while !self.at(Dedent) && !self.at(Eof) {
            if self.at(KwFn) {
                if let Some(f) = self.parse_function(false) {
                    methods.push(f);
                }
            } else {
                self.synchronize();
            }
            self.skip_newlines();
        }
        self.expect(Dedent, DiagnosticCode::MissingDelimiter, "expected a dedent to close the impl body");
        Some(self.ast.alloc(NodeKind::Impl { type_name, methods }, loc))
    }

    // ---------------------------------------------------------------
    // Pattern matching
    // ---------------------------------------------------------------

    fn parse_pattern(&mut self) -> Pattern {
        match self.peek() {
            Minus => {
                self.advance();
                let lit_node = self.parse_primary();
                match self.ast.kind(lit_node).clone() {
                    NodeKind::Literal { value: Literal::Int(n), .. } => Pattern::Literal(Literal::Int(-n)),
                    NodeKind::Literal { value: Literal::Float(f), .. } => Pattern::Literal(Literal::Float(-f)),
                    _ => Pattern::Wildcard,
                }
            }
            Number | String | KwTrue | KwFalse => {
                let lit_node = self.parse_primary();
                match self.ast.kind(lit_node).clone() {
                    NodeKind::Literal { value, .. } => Pattern::Literal(value),
                    _ => Pattern::Wildcard,
                }
            }
            Identifier => {
                let tok = self.advance();
                let name = self.text(tok).to_string();
                if name == "_" {
                    return Pattern::Wildcard;
                }
                if self.at(Dot) {
                    self.advance();
                    let variant = self
                        .expect(Identifier, DiagnosticCode::UnexpectedToken, "expected a variant name after '.'")
                        .map(|t| self.text(t).to_string())
                        .unwrap_or_default();
                    let mut bindings = Vec::new();
                    if self.at(LeftParen) {
                        self.advance();
                        if !self.at(RightParen) {
                            loop {
                                if let Some(b_tok) =
                                    self.expect(Identifier, DiagnosticCode::UnexpectedToken, "expected a binding name")
                                {
                                    bindings.push(self.text(b_tok).to_string());
                                }
                                if self.at(Comma) {
                                    self.advance();
                                    continue;
                                }
                                break;
                            }
                        }
                        self.expect(RightParen, DiagnosticCode::MissingDelimiter, "expected ')' to close pattern bindings");
                    }
                    Pattern::EnumVariant { type_name: name, variant, bindings }
                } else {
                    // A bare-name binding pattern isn't distinguished from a
                    // wildcard at this level; exhaustiveness only cares
                    // whether a catch-all arm is present.
                    Pattern::Wildcard
                }
            }
            _ => {
                self.error(DiagnosticCode::UnexpectedToken, "expected a pattern in match arm");
                Pattern::Wildcard
            }
        }
    }

    fn parse_arm_body(&mut self) -> Vec<NodeId> {
        if self.at(Newline) {
            self.advance();
            if self.expect(Indent, DiagnosticCode::MissingDelimiter, "expected an indented match-arm body").is_none() {
                return Vec::new();
            }
            let mut stmts = Vec::new();
            while !self.at(Dedent) && !self.at(Eof) {
                if let Some(s) = self.parse_statement(false) {
                    stmts.push(s);
                }
                self.skip_newlines();
            }
            self.expect(Dedent, DiagnosticCode::MissingDelimiter, "expected a dedent to close the match-arm body");
            stmts
        } else {
            match self.parse_simple_stmt() {
                Some(s) => vec![s],
                None => Vec::new(),
            }
        }
    }

    fn parse_match(&mut self) -> Option<NodeId> {
        let loc = self.loc();
        self.advance(); // 'match'
        let subject = self.parse_expr();
        self.expect(Colon, DiagnosticCode::MissingDelimiter, "expected ':' after match subject")?;
        self.expect(Newline, DiagnosticCode::MissingDelimiter, "expected a newline before match arms")?;
        self.expect(Indent, DiagnosticCode::MissingDelimiter, "expected indented match arms")?;
        self.push_scope();
        let mut arms = Vec::new();
        let mut has_wildcard = false;
        while !self.at(Dedent) && !self.at(Eof) {
            let arm_loc = self.loc();
            let pattern = self.parse_pattern();
            if matches!(pattern, Pattern::Wildcard) {
                has_wildcard = true;
            }
            if self.expect(Arrow, DiagnosticCode::MissingDelimiter, "expected '->' in match arm").is_none() {
                self.synchronize();
                self.skip_newlines();
                continue;
            }
            let body = self.parse_arm_body();
            arms.push(MatchArm { pattern, body, location: arm_loc });
            self.skip_newlines();
        }
        self.pop_scope();
        self.expect(Dedent, DiagnosticCode::MissingDelimiter, "expected a dedent to close match arms");
        Some(self.ast.alloc(NodeKind::Match { subject, arms, has_wildcard }, loc))
    }

    // ---------------------------------------------------------------
    // Declarations / assignments / expression statements
    // ---------------------------------------------------------------

    fn parse_mut_decl(&mut self) -> Option<NodeId> {
        let loc = self.loc();
        self.advance(); // 'mut'
        let name_tok = self.expect(Identifier, DiagnosticCode::UnexpectedToken, "expected a variable name after 'mut'")?;
        let name = self.text(name_tok).to_string();
        let type_ann = if self.at(Colon) {
            self.advance();
            Some(self.parse_type_annotation_node())
        } else {
            None
        };
        if self.at(ColonEq) {
            self.error(DiagnosticCode::ConstMutConflict, "'mut' cannot be combined with ':='");
            self.advance();
        } else {
            self.expect(Eq, DiagnosticCode::MissingDelimiter, "expected '=' after 'mut NAME'")?;
        }
        let init = self.parse_expr();
        self.expect_newline();
        self.declare_name(&name);
        Some(self.ast.alloc(NodeKind::VarDecl { name, is_mut: true, is_const: false, type_ann, init: Some(init) }, loc))
    }

    fn parse_const_decl(&mut self) -> Option<NodeId> {
        let loc = self.loc();
        self.advance(); // 'const'
        let name_tok = self.expect(Identifier, DiagnosticCode::UnexpectedToken, "expected a constant name after 'const'")?;
        let name = self.text(name_tok).to_string();
        let type_ann = if self.at(Colon) {
            self.advance();
            Some(self.parse_type_annotation_node())
        } else {
            None
        };
        if self.at(ColonEq) {
            self.advance();
        } else {
            self.expect(Eq, DiagnosticCode::MissingDelimiter, "expected '=' after constant name")?;
        }
        let init = self.parse_expr();
        self.expect_newline();
        self.declare_name(&name);
        Some(self.ast.alloc(NodeKind::VarDecl { name, is_mut: false, is_const: true, type_ann, init: Some(init) }, loc))
    }

    /// Speculatively tries `NAME (, NAME)+ = expr`, the multi-name
    /// destructuring form, restoring the cursor if the pattern doesn't
    /// match.
    fn try_parse_destructure(&mut self) -> Option<NodeId> {
        let start = self.pos;
        if !self.at(Identifier) {
            return None;
        }
        let loc = self.loc();
        let mut names = Vec::new();
        loop {
            if !self.at(Identifier) {
                self.pos = start;
                return None;
            }
            let tok = self.advance();
            names.push(self.text(tok).to_string());
            if self.at(Comma) {
                self.advance();
                continue;
            }
            break;
        }
        if names.len() < 2 || !self.at(Eq) {
            self.pos = start;
            return None;
        }
        self.advance(); // '='
        let rhs = self.parse_expr();
        self.expect_newline();
        Some(self.build_destructure(loc, names, rhs))
    }

    fn build_destructure(&mut self, loc: Location, names: Vec<String>, rhs: NodeId) -> NodeId {
        let tmp_name = format!("_tuple_tmp{}", self.tuple_tmp_counter);
        self.tuple_tmp_counter += 1;
        let mut stmts = Vec::new();
        let tmp_decl = self.ast.alloc(
            NodeKind::VarDecl { name: tmp_name.clone(), is_mut: false, is_const: false, type_ann: None, init: Some(rhs) },
            loc,
        );
        self.declare_name(&tmp_name);
        stmts.push(tmp_decl);
        for (i, name) in names.iter().enumerate() {
            let tmp_ref = self.ast.alloc(NodeKind::Identifier(tmp_name.clone()), loc);
            let idx_lit = self.ast.alloc(NodeKind::Literal { value: Literal::Int(i as i64), has_explicit_suffix: false }, loc);
            let index_access = self.ast.alloc(NodeKind::IndexAccess { object: tmp_ref, index: idx_lit }, loc);
            let decl = self.ast.alloc(
                NodeKind::VarDecl { name: name.clone(), is_mut: false, is_const: false, type_ann: None, init: Some(index_access) },
                loc,
            );
            self.declare_name(name);
            stmts.push(decl);
        }
        self.ast.alloc(NodeKind::Block(stmts), loc)
    }

    fn parse_simple_stmt(&mut self) -> Option<NodeId> {
        if self.at(KwMut) {
            return self.parse_mut_decl();
        }
        if self.at(KwConst) {
            return self.parse_const_decl();
        }
        if let Some(id) = self.try_parse_destructure() {
            return Some(id);
        }

        let loc = self.loc();
        let expr = self.parse_expr();

        if self.at(Colon) {
            if let NodeKind::Identifier(name) = self.ast.kind(expr).clone() {
                self.advance();
                let type_ann = Some(self.parse_type_annotation_node());
                self.expect(Eq, DiagnosticCode::MissingDelimiter, "expected '=' after a type annotation")?;
                let init = self.parse_expr();
                self.expect_newline();
                self.declare_name(&name);
                return Some(self.ast.alloc(
                    NodeKind::VarDecl { name, is_mut: false, is_const: false, type_ann, init: Some(init) },
                    loc,
                ));
            }
        }

        if self.at(Eq) {
            self.advance();
            let init = self.parse_expr();
            self.expect_newline();
            if let NodeKind::Identifier(name) = self.ast.kind(expr).clone() {
                if self.is_declared(&name) {
                    return Some(self.ast.alloc(NodeKind::Assign { op: AssignOp::Assign, target: expr, value: init }, loc));
                }
                self.declare_name(&name);
                return Some(self.ast.alloc(
                    NodeKind::VarDecl { name, is_mut: false, is_const: false, type_ann: None, init: Some(init) },
                    loc,
                ));
            }
            return Some(self.ast.alloc(NodeKind::Assign { op: AssignOp::Assign, target: expr, value: init }, loc));
        }

        if self.at(ColonEq) {
            self.advance();
            let init = self.parse_expr();
            self.expect_newline();
            if let NodeKind::Identifier(name) = self.ast.kind(expr).clone() {
                self.declare_name(&name);
                return Some(self.ast.alloc(
                    NodeKind::VarDecl { name, is_mut: false, is_const: true, type_ann: None, init: Some(init) },
                    loc,
                ));
            }
            self.error(DiagnosticCode::UnexpectedToken, "':=' requires a plain name on the left");
            return Some(expr);
        }

        if let Some(binop) = self.compound_assign_op() {
            self.advance();
            let rhs = self.parse_expr();
            self.expect_newline();
            let value = self.ast.alloc(NodeKind::Binary { op: binop, left: expr, right: rhs }, loc);
            return Some(self.ast.alloc(NodeKind::Assign { op: AssignOp::Assign, target: expr, value }, loc));
        }

        self.expect_newline();
        Some(expr)
    }

    // ---------------------------------------------------------------
    // Types
    // ---------------------------------------------------------------

    fn parse_type_name(&mut self) -> Type {
        if self.at(LeftBracket) {
            self.advance();
            let inner = self.parse_type_name();
            self.expect(RightBracket, DiagnosticCode::MissingDelimiter, "expected ']' to close array type");
            return Type::Array(Box::new(inner));
        }
        match self.expect(Identifier, DiagnosticCode::UndefinedType, "expected a type name") {
            Some(tok) => {
                let name = self.text(tok).to_string();
                Type::from_name(&name).unwrap_or(Type::Struct(name))
            }
            None => Type::Error,
        }
    }

    fn parse_type_annotation_node(&mut self) -> NodeId {
        let loc = self.loc();
        let ty = self.parse_type_name();
        self.ast.alloc(NodeKind::TypeAnnotation(ty), loc)
    }

    // ---------------------------------------------------------------
    // Expressions (Pratt-style precedence climbing)
    // ---------------------------------------------------------------

    fn parse_expr(&mut self) -> NodeId {
        self.depth += 1;
        if self.depth > MAX_RECURSION_DEPTH {
            self.error(DiagnosticCode::ExpressionTooComplex, "expression nesting exceeds the recursion limit");
            self.depth -= 1;
            let loc = self.loc();
            return self.ast.alloc(NodeKind::Literal { value: Literal::Int(0), has_explicit_suffix: false }, loc);
        }
        let result = self.parse_python_ternary();
        self.depth -= 1;
        result
    }

    fn parse_python_ternary(&mut self) -> NodeId {
        let loc = self.loc();
        let left = self.parse_c_ternary();
        if self.at(KwIf) {
            self.advance();
            let cond = self.parse_c_ternary();
            self.expect(KwElse, DiagnosticCode::MissingDelimiter, "expected 'else' in inline conditional");
            let else_expr = self.parse_python_ternary();
            return self.ast.alloc(NodeKind::Ternary { cond, then_expr: left, else_expr }, loc);
        }
        left
    }

    fn parse_c_ternary(&mut self) -> NodeId {
        let loc = self.loc();
        let cond = self.parse_or();
        if self.at(Question) {
            self.advance();
            let then_expr = self.parse_c_ternary();
            self.expect(Colon, DiagnosticCode::MissingDelimiter, "expected ':' in ternary expression");
            let else_expr = self.parse_c_ternary();
            return self.ast.alloc(NodeKind::Ternary { cond, then_expr, else_expr }, loc);
        }
        cond
    }

    fn parse_or(&mut self) -> NodeId {
        let mut left = self.parse_and();
        while self.at(KwOr) {
            let loc = self.loc();
            self.advance();
            let right = self.parse_and();
            left = self.ast.alloc(NodeKind::Binary { op: BinaryOp::Or, left, right }, loc);
        }
        left
    }

    fn parse_and(&mut self) -> NodeId {
        let mut left = self.parse_equality();
        while self.at(KwAnd) {
            let loc = self.loc();
            self.advance();
            let right = self.parse_equality();
            left = self.ast.alloc(NodeKind::Binary { op: BinaryOp::And, left, right }, loc);
        }
        left
    }

    /// Equality/relational, `matches`, and `as`-casts share a precedence
    /// tier; cast chaining without parentheses is rejected here.
    fn parse_equality(&mut self) -> NodeId {
        let mut left = self.parse_additive();
        loop {
            let loc = self.loc();
            let op = match self.peek() {
                EqEq => Some(BinaryOp::Eq),
                BangEq => Some(BinaryOp::NotEq),
                Less => Some(BinaryOp::Less),
                Greater => Some(BinaryOp::Greater),
                LessEq => Some(BinaryOp::LessEq),
                GreaterEq => Some(BinaryOp::GreaterEq),
                KwMatches => Some(BinaryOp::Matches),
                _ => None,
            };
            if let Some(op) = op {
                self.advance();
                let right = self.parse_additive();
                left = self.ast.alloc(NodeKind::Binary { op, left, right }, loc);
                continue;
            }
            if self.at(KwAs) {
                self.advance();
                let target_type = self.parse_type_name();
                let chained_unparenthesized = matches!(self.ast.kind(left), NodeKind::Cast { parenthesized: false, .. });
                if chained_unparenthesized {
                    self.error(
                        DiagnosticCode::ChainedCastUnparenthesized,
                        "chained 'as' casts require explicit parentheses, e.g. '((x as T) as U)'",
                    );
                }
                left = self.ast.alloc(NodeKind::Cast { expr: left, target_type, parenthesized: false }, loc);
                continue;
            }
            break;
        }
        left
    }

    fn parse_additive(&mut self) -> NodeId {
        let mut left = self.parse_multiplicative();
        loop {
            let loc = self.loc();
            let op = match self.peek() {
                Plus => Some(BinaryOp::Add),
                Minus => Some(BinaryOp::Sub),
                _ => None,
            };
            match op {
                Some(op) => {
                    self.advance();
                    let right = self.parse_multiplicative();
                    left = self.ast.alloc(NodeKind::Binary { op, left, right }, loc);
                }
                None => break,
            }
        }
        left
    }

    fn parse_multiplicative(&mut self) -> NodeId {
        let mut left = self.parse_unary();
        loop {
            let loc = self.loc();
            let op = match self.peek() {
                Star => Some(BinaryOp::Mul),
                Slash => Some(BinaryOp::Div),
                Percent => Some(BinaryOp::Mod),
                ShiftLeft => Some(BinaryOp::ShiftLeft),
                ShiftRight => Some(BinaryOp::ShiftRight),
                Amp => Some(BinaryOp::BitAnd),
                Pipe => Some(BinaryOp::BitOr),
                Caret => Some(BinaryOp::BitXor),
                _ => None,
            };
            match op {
                Some(op) => {
                    self.advance();
                    let right = self.parse_unary();
                    left = self.ast.alloc(NodeKind::Binary { op, left, right }, loc);
                }
                None => break,
            }
        }
        left
    }

    fn parse_unary(&mut self) -> NodeId {
        let loc = self.loc();
        match self.peek() {
            Minus => {
                self.advance();
                let operand = self.parse_unary();
                self.ast.alloc(NodeKind::Unary { op: UnaryOp::Neg, operand }, loc)
            }
            KwNot => {
                self.advance();
                let operand = self.parse_unary();
                self.ast.alloc(NodeKind::Unary { op: UnaryOp::Not, operand }, loc)
            }
            Tilde => {
                self.advance();
                let operand = self.parse_unary();
                self.ast.alloc(NodeKind::Unary { op: UnaryOp::BitNot, operand }, loc)
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> NodeId {
        let mut expr = self.parse_primary();
        loop {
            let loc = self.loc();
            match self.peek() {
                Dot => {
                    self.advance();
                    let Some(tok) = self.expect(Identifier, DiagnosticCode::UnexpectedToken, "expected a field name after '.'") else {
                        break;
                    };
                    let field = self.text(tok).to_string();
                    expr = self.ast.alloc(NodeKind::MemberAccess { object: expr, field }, loc);
                }
                LeftBracket => {
                    self.advance();
                    if self.at(Range) || self.at(RangeInclusive) {
                        self.advance();
                        let end = if self.at(RightBracket) { None } else { Some(self.parse_expr()) };
                        self.expect(RightBracket, DiagnosticCode::MissingDelimiter, "expected ']' to close a slice");
                        expr = self.ast.alloc(NodeKind::ArraySlice { object: expr, start: None, end }, loc);
                        continue;
                    }
                    let start = self.parse_expr();
                    if self.at(Range) || self.at(RangeInclusive) {
                        self.advance();
                        let end = if self.at(RightBracket) { None } else { Some(self.parse_expr()) };
                        self.expect(RightBracket, DiagnosticCode::MissingDelimiter, "expected ']' to close a slice");
                        expr = self.ast.alloc(NodeKind::ArraySlice { object: expr, start: Some(start), end }, loc);
                    } else {
                        self.expect(RightBracket, DiagnosticCode::MissingDelimiter, "expected ']' to close an index expression");
                        expr = self.ast.alloc(NodeKind::IndexAccess { object: expr, index: start }, loc);
                    }
                }
                LeftBrace => {
                    let Some(type_name) = (match self.ast.kind(expr).clone() {
                        NodeKind::Identifier(name) => Some(name),
                        _ => None,
                    }) else {
                        break;
                    };
                    self.advance();
                    let mut fields = Vec::new();
                    if !self.at(RightBrace) {
                        loop {
                            let Some(f_tok) = self.expect(Identifier, DiagnosticCode::UnexpectedToken, "expected a field name") else {
                                break;
                            };
                            let f_name = self.text(f_tok).to_string();
                            self.expect(Colon, DiagnosticCode::MissingDelimiter, "expected ':' after field name");
                            let f_val = self.parse_expr();
                            fields.push((f_name, f_val));
                            if self.at(Comma) {
                                self.advance();
                                if self.at(RightBrace) {
                                    break;
                                }
                                continue;
                            }
                            break;
                        }
                    }
                    self.expect(RightBrace, DiagnosticCode::MissingDelimiter, "expected '}' to close a struct literal");
                    expr = self.ast.alloc(NodeKind::StructLiteral { type_name, fields }, loc);
                }
                LeftParen => {
                    let Some(callee) = (match self.ast.kind(expr).clone() {
                        NodeKind::Identifier(name) => Some(name),
                        _ => None,
                    }) else {
                        break;
                    };
                    self.advance();
                    let mut args = Vec::new();
                    if !self.at(RightParen) {
                        loop {
                            args.push(self.parse_expr());
                            if self.at(Comma) {
                                self.advance();
                                if self.at(RightParen) {
                                    break;
                                }
                                continue;
                            }
                            break;
                        }
                    }
                    self.expect(RightParen, DiagnosticCode::MissingDelimiter, "expected ')' to close call arguments");
                    expr = self.ast.alloc(NodeKind::Call { callee, args }, loc);
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_primary(&mut self) -> NodeId {
        let loc = self.loc();
        match self.peek() {
            Number => {
                let tok = self.advance();
                let (value, has_explicit_suffix) = parse_number_literal(self.text(tok));
                self.ast.alloc(NodeKind::Literal { value, has_explicit_suffix }, loc)
            }
            String => {
                let tok = self.advance();
                let value = Literal::Str(unescape_string(self.text(tok)));
                self.ast.alloc(NodeKind::Literal { value, has_explicit_suffix: false }, loc)
            }
            KwTrue => {
                self.advance();
                self.ast.alloc(NodeKind::Literal { value: Literal::Bool(true), has_explicit_suffix: false }, loc)
            }
            KwFalse => {
                self.advance();
                self.ast.alloc(NodeKind::Literal { value: Literal::Bool(false), has_explicit_suffix: false }, loc)
            }
            Identifier => {
                let tok = self.advance();
                let name = self.text(tok).to_string();
                self.ast.alloc(NodeKind::Identifier(name), loc)
            }
            LeftParen => {
                self.advance();
                let inner = self.parse_expr();
                self.expect(RightParen, DiagnosticCode::MissingDelimiter, "expected ')' to close a parenthesized expression");
                // Parenthesizing a cast licenses it to be the base of a
                // further chained `as`.
                if let NodeKind::Cast { parenthesized, .. } = &mut self.ast.get_mut(inner).kind {
                    *parenthesized = true;
                }
                inner
            }
            LeftBracket => self.parse_array_literal(loc),
            _ => {
                self.error(DiagnosticCode::UnexpectedToken, "unexpected token in expression");
                self.advance();
                self.ast.alloc(NodeKind::Literal { value: Literal::Int(0), has_explicit_suffix: false }, loc)
            }
        }
    }

    fn parse_array_literal(&mut self, loc: Location) -> NodeId {
        self.advance(); // '['
        let mut items = Vec::new();
        if !self.at(RightBracket) {
            loop {
                items.push(self.parse_expr());
                if self.at(Comma) {
                    self.advance();
                    if self.at(RightBracket) {
                        break;
                    }
                    continue;
                }
                break;
            }
        }
        self.expect(RightBracket, DiagnosticCode::MissingDelimiter, "expected ']' to close an array literal");
        self.ast.alloc(NodeKind::ArrayLiteral(items), loc)
    }
}

/// Parses a lexed numeric literal's text into its value and whether it
/// carried an explicit type suffix.
fn parse_number_literal(text: &str) -> (Literal, bool) {
    const SUFFIXES: [&str; 5] = ["i32", "i64", "u32", "u64", "f64"];
    let mut body = text;
    let mut suffix = "";
    if text.len() > 3 {
        let tail = &text[text.len() - 3..];
        if SUFFIXES.contains(&tail) {
            suffix = tail;
            body = &text[..text.len() - 3];
        }
    }
    let has_explicit_suffix = !suffix.is_empty();
    let cleaned: String = body.chars().filter(|c| *c != '_').collect();

    if cleaned.starts_with("0x") || cleaned.starts_with("0X") {
        let n = i64::from_str_radix(&cleaned[2..], 16).unwrap_or(0);
        return (Literal::Int(n), has_explicit_suffix);
    }
    if suffix == "f64" || cleaned.contains('.') || cleaned.contains('e') || cleaned.contains('E') {
        let f: f64 = cleaned.parse().unwrap_or(0.0);
        return (Literal::Float(f), has_explicit_suffix);
    }
    let n: i64 = cleaned.parse().unwrap_or(0);
    (Literal::Int(n), has_explicit_suffix)
}

/// Unescapes a string literal's lexeme, including its surrounding quotes.
fn unescape_string(text: &str) -> String {
    let inner = &text[1..text.len().saturating_sub(1)];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program_stmts(src: &str) -> (Ast, Vec<NodeId>, DiagnosticBag) {
        let (ast, root, diags) = parse(src);
        let stmts = match ast.kind(root) {
            NodeKind::Program(s) => s.clone(),
            _ => panic!("root is not a Program"),
        };
        (ast, stmts, diags)
    }

    #[test]
    fn first_assignment_to_a_name_is_a_var_decl() {
        let (ast, stmts, diags) = program_stmts("x = 1\n");
        assert!(!diags.had_error());
        assert!(matches!(ast.kind(stmts[0]), NodeKind::VarDecl { is_mut: false, is_const: false, .. }));
    }

    #[test]
    fn second_assignment_to_a_name_is_a_reassignment() {
        let (ast, stmts, diags) = program_stmts("x = 1\nx = 2\n");
        assert!(!diags.had_error());
        assert!(matches!(ast.kind(stmts[0]), NodeKind::VarDecl { .. }));
        assert!(matches!(ast.kind(stmts[1]), NodeKind::Assign { .. }));
    }

    #[test]
    fn mut_and_const_declarations_parse() {
        let (ast, stmts, diags) = program_stmts("mut s = 0\nCONST_X := 5\n");
        assert!(!diags.had_error());
        assert!(matches!(ast.kind(stmts[0]), NodeKind::VarDecl { is_mut: true, .. }));
        assert!(matches!(ast.kind(stmts[1]), NodeKind::VarDecl { is_const: true, .. }));
    }

    #[test]
    fn compound_assignment_desugars_to_assign_of_binary() {
        let (ast, stmts, diags) = program_stmts("x = 1\nx += 2\n");
        assert!(!diags.had_error());
        match ast.kind(stmts[1]) {
            NodeKind::Assign { value, .. } => {
                assert!(matches!(ast.kind(*value), NodeKind::Binary { op: BinaryOp::Add, .. }));
            }
            other => panic!("expected Assign, got {other:?}"),
        }
    }

    #[test]
    fn matches_keyword_parses_as_a_binary_operator() {
        let (ast, stmts, diags) = program_stmts("x = 1\ny = x matches 1\n");
        assert!(!diags.had_error());
        match ast.kind(stmts[1]) {
            NodeKind::VarDecl { init: Some(init), .. } => {
                assert!(matches!(ast.kind(*init), NodeKind::Binary { op: BinaryOp::Matches, .. }));
            }
            other => panic!("expected VarDecl, got {other:?}"),
        }
    }

    #[test]
    fn inline_if_else_parses_like_scenario_two() {
        let (ast, stmts, diags) = program_stmts("if 1 + 2 == 3: print(\"yes\")\nelse: print(\"no\")\n");
        assert!(!diags.had_error());
        match ast.kind(stmts[0]) {
            NodeKind::If { then_branch, else_branch, .. } => {
                assert_eq!(then_branch.len(), 1);
                assert_eq!(else_branch.as_ref().unwrap().len(), 1);
            }
            other => panic!("expected If, got {other:?}"),
        }
    }

    #[test]
    fn inclusive_for_range_sets_the_flag() {
        let (ast, stmts, diags) = program_stmts("for i in 1..=3:\n    print(i)\n");
        assert!(!diags.had_error());
        assert!(matches!(ast.kind(stmts[0]), NodeKind::ForRange { inclusive: true, .. }));
    }

    #[test]
    fn chained_cast_without_parens_is_rejected() {
        let (_, _, diags) = program_stmts("x = 1\ny = x as i64 as f64\n");
        assert!(diags.iter().any(|d| d.code == DiagnosticCode::ChainedCastUnparenthesized));
    }

    #[test]
    fn parenthesized_chained_cast_is_accepted() {
        let (_, _, diags) = program_stmts("x = 1\ny = ((x as i64) as f64)\n");
        assert!(!diags.iter().any(|d| d.code == DiagnosticCode::ChainedCastUnparenthesized));
    }

    #[test]
    fn match_without_wildcard_has_wildcard_false() {
        let (ast, stmts, diags) = program_stmts(
            "enum Color:\n    Red\n    Green\n    Blue\nmatch c:\n    Color.Red -> 1\n    Color.Green -> 2\n",
        );
        assert!(!diags.had_error());
        match ast.kind(stmts[1]) {
            NodeKind::Match { has_wildcard, .. } => assert!(!has_wildcard),
            other => panic!("expected Match, got {other:?}"),
        }
    }

    #[test]
    fn match_with_wildcard_arm_is_exhaustive() {
        let (ast, stmts, diags) = program_stmts(
            "enum Color:\n    Red\n    Green\n    Blue\nmatch c:\n    Color.Red -> 1\n    _ -> 2\n",
        );
        assert!(!diags.had_error());
        match ast.kind(stmts[1]) {
            NodeKind::Match { has_wildcard, .. } => assert!(has_wildcard),
            other => panic!("expected Match, got {other:?}"),
        }
    }

    #[test]
    fn destructuring_assignment_expands_to_a_temp_and_indexed_decls() {
        let (ast, stmts, diags) = program_stmts("a, b = pair\n");
        assert!(!diags.had_error());
        match ast.kind(stmts[0]) {
            NodeKind::Block(inner) => {
                assert_eq!(inner.len(), 3);
                assert!(matches!(ast.kind(inner[0]), NodeKind::VarDecl { name, .. } if name.starts_with("_tuple_tmp")));
                assert!(matches!(ast.kind(inner[1]), NodeKind::VarDecl { name, .. } if name == "a"));
                assert!(matches!(ast.kind(inner[2]), NodeKind::VarDecl { name, .. } if name == "b"));
            }
            other => panic!("expected Block, got {other:?}"),
        }
    }

    #[test]
    fn function_definition_with_params_and_return_type_parses() {
        let (ast, stmts, diags) = program_stmts("fn add(a: i32, b: i32) -> i32:\n    return a + b\n");
        assert!(!diags.had_error());
        match ast.kind(stmts[0]) {
            NodeKind::Function { name, params, .. } => {
                assert_eq!(name, "add");
                assert_eq!(params.len(), 2);
            }
            other => panic!("expected Function, got {other:?}"),
        }
    }

    #[test]
    fn break_and_continue_with_labels_parse() {
        let (ast, stmts, diags) = program_stmts("'outer: while true:\n    break 'outer\n");
        assert!(!diags.had_error());
        match ast.kind(stmts[0]) {
            NodeKind::While { label, body, .. } => {
                assert_eq!(label.as_deref(), Some("outer"));
                assert!(matches!(ast.kind(body[0]), NodeKind::Break { label } if label.as_deref() == Some("outer")));
            }
            other => panic!("expected While, got {other:?}"),
        }
    }
}
