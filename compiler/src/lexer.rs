//! Indentation-aware lexer.
//!
//! A single forward pass over the source's `char`s tracking `(line, column)`
//! by hand, extended with an explicit indent stack so `INDENT`/`DEDENT`/
//! `NEWLINE` can be synthesized from column structure the way a
//! Python-like grammar requires.

use crate::diagnostics::{Diagnostic, DiagnosticBag, DiagnosticCode, SourceLoc};
use crate::token::{keyword_kind, Token, TokenKind};

const TAB_WIDTH: u32 = 4;
const MAX_INDENT_DEPTH: usize = 64;

struct Lexer<'a> {
    source: &'a str,
    chars: Vec<char>,
    byte_offsets: Vec<u32>,
    pos: usize,
    line: u32,
    column: u32,
    indent_stack: Vec<u32>,
    at_line_start: bool,
    tokens: Vec<Token>,
    diagnostics: DiagnosticBag,
}

/// Lex `source` into a token stream. Always terminates with `TokenKind::Eof`;
/// every `Indent` is matched by a `Dedent` before that final token.
pub fn tokenize(source: &str) -> (Vec<Token>, DiagnosticBag) {
    let mut lexer = Lexer::new(source);
    lexer.run();
    (lexer.tokens, lexer.diagnostics)
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        let chars: Vec<char> = source.chars().collect();
        let mut byte_offsets = Vec::with_capacity(chars.len() + 1);
        let mut offset = 0u32;
        for c in &chars {
            byte_offsets.push(offset);
            offset += c.len_utf8() as u32;
        }
        byte_offsets.push(offset);
        Lexer {
            source,
            chars,
            byte_offsets,
            pos: 0,
            line: 1,
            column: 1,
            indent_stack: vec![0],
            at_line_start: true,
            tokens: Vec::new(),
            diagnostics: DiagnosticBag::new(),
        }
    }

    fn run(&mut self) {
        loop {
            if self.at_line_start {
                if !self.handle_line_start() {
                    continue;
                }
            }
            if !self.scan_token() {
                break;
            }
        }
        self.drain_dedents();
        self.push(TokenKind::Eof, self.pos as u32, 0);
    }

    fn byte_at(&self, idx: usize) -> u32 {
        self.byte_offsets[idx]
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn loc(&self) -> SourceLoc {
        SourceLoc::new(self.line, self.column)
    }

    fn error(&mut self, code: DiagnosticCode, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(code, self.loc(), message));
    }

    fn push(&mut self, kind: TokenKind, start: u32, len: u32) {
        self.tokens.push(Token {
            kind,
            start,
            len,
            line: self.line,
            column: self.column,
        });
    }

    /// Consume leading whitespace at the start of a logical line, updating
    /// the indent stack and emitting layout tokens as needed. Returns
    /// `true` once positioned at real content (or EOF) for `scan_token`,
    /// `false` if the whole line was blank/comment and should be retried.
    fn handle_line_start(&mut self) -> bool {
        self.at_line_start = false;
        let start_line = self.line;
        let mut width = 0u32;
        loop {
            match self.peek() {
                Some(' ') => {
                    width += 1;
                    self.advance();
                }
                Some('\t') => {
                    width += TAB_WIDTH;
                    self.advance();
                }
                Some('\r') => {
                    self.advance();
                }
                _ => break,
            }
        }

        match self.peek() {
            None => {
                // Blank trailing line at EOF: nothing to do, drain happens in run().
                return true;
            }
            Some('\n') => {
                self.advance();
                self.at_line_start = true;
                return false;
            }
            Some('/') if self.peek_at(1) == Some('/') => {
                self.skip_line_comment();
                self.at_line_start = true;
                return false;
            }
            Some('/') if self.peek_at(1) == Some('*') => {
                self.skip_block_comment();
                if self.peek().is_none() {
                    return true;
                }
                // A block comment can leave us mid-line; re-run indent
                // detection only if we actually returned to column 1.
                if self.line != start_line {
                    self.at_line_start = true;
                    return false;
                }
            }
            _ => {}
        }

        self.adjust_indentation(width);
        true
    }

    fn adjust_indentation(&mut self, width: u32) {
        let top = *self.indent_stack.last().unwrap();
        if width > top {
            if self.indent_stack.len() >= MAX_INDENT_DEPTH {
                self.error(
                    DiagnosticCode::InconsistentIndentation,
                    "maximum indentation depth exceeded",
                );
                return;
            }
            self.indent_stack.push(width);
            self.push(TokenKind::Indent, self.byte_at(self.pos), 0);
        } else if width < top {
            let mut popped_any = false;
            while *self.indent_stack.last().unwrap() > width {
                self.indent_stack.pop();
                self.push(TokenKind::Dedent, self.byte_at(self.pos), 0);
                popped_any = true;
            }
            if *self.indent_stack.last().unwrap() != width {
                self.error(
                    DiagnosticCode::InconsistentIndentation,
                    "inconsistent indentation",
                );
                // Resynchronize so later lines don't cascade the same error.
                self.indent_stack.push(width);
            }
            let _ = popped_any;
        }
    }

    fn drain_dedents(&mut self) {
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.push(TokenKind::Dedent, self.byte_at(self.pos), 0);
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) {
        self.advance(); // '/'
        self.advance(); // '*'
        loop {
            match self.peek() {
                None => {
                    self.error(DiagnosticCode::UnterminatedComment, "unterminated block comment");
                    return;
                }
                Some('*') if self.peek_at(1) == Some('/') => {
                    self.advance();
                    self.advance();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Scan exactly one token (after indentation has been handled). Returns
    /// `false` once EOF has been reached so `run` can stop scanning.
    fn scan_token(&mut self) -> bool {
        let Some(c) = self.peek() else {
            return false;
        };

        if c == '\r' {
            self.advance();
            return true;
        }

        if c == '\n' {
            self.advance();
            self.push(TokenKind::Newline, self.byte_at(self.pos - 1), 0);
            self.at_line_start = true;
            return true;
        }

        if c == ' ' || c == '\t' {
            self.advance();
            return true;
        }

        if c == '/' && self.peek_at(1) == Some('/') {
            self.skip_line_comment();
            return true;
        }
        if c == '/' && self.peek_at(1) == Some('*') {
            self.skip_block_comment();
            return true;
        }

        let start = self.byte_at(self.pos);
        let start_line = self.line;
        let start_col = self.column;

        if c.is_ascii_digit() {
            self.scan_number(start, start_line, start_col);
            return true;
        }
        if c == '"' {
            self.scan_string(start, start_line, start_col);
            return true;
        }
        if c.is_alphabetic() || c == '_' {
            self.scan_identifier(start, start_line, start_col);
            return true;
        }

        self.scan_operator(start, start_line, start_col);
        true
    }

    fn push_at(&mut self, kind: TokenKind, start: u32, len: u32, line: u32, column: u32) {
        self.tokens.push(Token {
            kind,
            start,
            len,
            line,
            column,
        });
    }

    fn scan_identifier(&mut self, start: u32, line: u32, col: u32) {
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let end = self.byte_at(self.pos);
        let text = &self.source[start as usize..end as usize];
        let kind = keyword_kind(text).unwrap_or(TokenKind::Identifier);
        self.push_at(kind, start, end - start, line, col);
    }

    fn scan_number(&mut self, start: u32, line: u32, col: u32) {
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.advance();
            self.advance();
            let mut saw_digit = false;
            let mut prev_underscore = false;
            loop {
                match self.peek() {
                    Some(c) if c.is_ascii_hexdigit() => {
                        saw_digit = true;
                        prev_underscore = false;
                        self.advance();
                    }
                    Some('_') => {
                        if !saw_digit || prev_underscore {
                            self.error(DiagnosticCode::MisplacedUnderscore, "misplaced underscore in hex literal");
                        }
                        prev_underscore = true;
                        self.advance();
                    }
                    _ => break,
                }
            }
            if prev_underscore || !saw_digit {
                self.error(DiagnosticCode::MalformedHex, "malformed hex literal");
            }
            self.scan_optional_suffix();
            let end = self.byte_at(self.pos);
            self.push_at(TokenKind::Number, start, end - start, line, col);
            return;
        }

        let mut prev_underscore = false;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '_') {
            if self.peek() == Some('_') {
                if prev_underscore {
                    self.error(DiagnosticCode::MisplacedUnderscore, "doubled underscore in numeric literal");
                }
                prev_underscore = true;
            } else {
                prev_underscore = false;
            }
            self.advance();
        }
        if prev_underscore {
            self.error(DiagnosticCode::MisplacedUnderscore, "trailing underscore in numeric literal");
        }

        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            self.advance();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '_') {
                self.advance();
            }
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            let save = self.pos;
            self.advance();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.advance();
            }
            if matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.advance();
                }
            } else {
                self.error(DiagnosticCode::MalformedExponent, "missing exponent digits");
                self.pos = save;
            }
        }

        self.scan_optional_suffix();
        let end = self.byte_at(self.pos);
        self.push_at(TokenKind::Number, start, end - start, line, col);
    }

    /// An adjacent numeric suffix: same line, no intervening whitespace.
    fn scan_optional_suffix(&mut self) {
        let save = self.pos;
        let matched = ["i32", "i64", "u32", "u64", "f64"].iter().find(|suf| {
            suf.chars()
                .enumerate()
                .all(|(i, c)| self.peek_at(i) == Some(c))
        });
        if let Some(suf) = matched {
            for _ in 0..suf.len() {
                self.advance();
            }
            // Must not be glued to further identifier characters (that would
            // be a different, longer identifier, not a suffix).
            if matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
                self.pos = save;
            }
        }
    }

    fn scan_string(&mut self, start: u32, line: u32, col: u32) {
        self.advance(); // opening quote
        loop {
            match self.peek() {
                None => {
                    self.error(DiagnosticCode::UnterminatedString, "unterminated string literal");
                    let end = self.byte_at(self.pos);
                    self.push_at(TokenKind::Error, start, end - start, line, col);
                    return;
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        Some('n') | Some('t') | Some('\\') | Some('"') | Some('r') | Some('0') => {
                            self.advance();
                        }
                        Some(_) | None => {
                            self.error(DiagnosticCode::UnknownEscape, "unknown escape sequence");
                            if self.peek().is_some() {
                                self.advance();
                            }
                        }
                    }
                }
                Some('\n') => {
                    self.error(DiagnosticCode::UnterminatedString, "unterminated string literal");
                    let end = self.byte_at(self.pos);
                    self.push_at(TokenKind::Error, start, end - start, line, col);
                    return;
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
        let end = self.byte_at(self.pos);
        self.push_at(TokenKind::String, start, end - start, line, col);
    }

    fn scan_operator(&mut self, start: u32, line: u32, col: u32) {
        use TokenKind::*;
        let c = self.advance().unwrap();
        let kind = match c {
            '(' => LeftParen,
            ')' => RightParen,
            '[' => LeftBracket,
            ']' => RightBracket,
            '{' => LeftBrace,
            '}' => RightBrace,
            ',' => Comma,
            '.' => {
                if self.peek() == Some('.') {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        RangeInclusive
                    } else {
                        Range
                    }
                } else {
                    Dot
                }
            }
            '?' => Question,
            '~' => Tilde,
            '+' => {
                if self.peek() == Some('=') {
                    self.advance();
                    PlusEq
                } else {
                    Plus
                }
            }
            '-' => {
                if self.peek() == Some('=') {
                    self.advance();
                    MinusEq
                } else if self.peek() == Some('>') {
                    self.advance();
                    Arrow
                } else {
                    Minus
                }
            }
            '*' => {
                if self.peek() == Some('=') {
                    self.advance();
                    StarEq
                } else {
                    Star
                }
            }
            '/' => {
                if self.peek() == Some('=') {
                    self.advance();
                    SlashEq
                } else {
                    Slash
                }
            }
            '%' => {
                if self.peek() == Some('=') {
                    self.advance();
                    PercentEq
                } else {
                    Percent
                }
            }
            '=' => {
                if self.peek() == Some('=') {
                    self.advance();
                    EqEq
                } else if self.peek() == Some('>') {
                    self.advance();
                    FatArrow
                } else {
                    Eq
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.advance();
                    BangEq
                } else {
                    self.error(DiagnosticCode::UnexpectedCharacter, "unexpected character '!'");
                    Error
                }
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.advance();
                    LessEq
                } else if self.peek() == Some('<') {
                    self.advance();
                    ShiftLeft
                } else {
                    Less
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.advance();
                    GreaterEq
                } else if self.peek() == Some('>') {
                    self.advance();
                    ShiftRight
                } else {
                    Greater
                }
            }
            '&' => Amp,
            '|' => Pipe,
            '^' => Caret,
            ':' => {
                if self.peek() == Some('=') {
                    self.advance();
                    ColonEq
                } else {
                    Colon
                }
            }
            '\'' => Quote,
            other => {
                self.error(
                    DiagnosticCode::UnexpectedCharacter,
                    format!("unexpected character '{}'", other),
                );
                Error
            }
        };
        let end = self.byte_at(self.pos);
        self.push_at(kind, start, end - start, line, col);
    }
}

/// Debug dump used by tests and tooling: `KIND 'lexeme' (line L, col C)`
/// one per line, terminating at `EOF` or the first `ERROR` token.
pub fn dump_tokens(source: &str, tokens: &[Token]) -> String {
    let mut out = String::new();
    for tok in tokens {
        let lexeme = tok.lexeme(source);
        out.push_str(&format!(
            "{:?} '{}' (line {}, col {})\n",
            tok.kind, lexeme, tok.line, tok.column
        ));
        if matches!(tok.kind, TokenKind::Eof | TokenKind::Error) {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).0.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn ends_with_eof() {
        let k = kinds("x = 1\n");
        assert_eq!(*k.last().unwrap(), TokenKind::Eof);
    }

    #[test]
    fn balances_indent_and_dedent() {
        let src = "if x:\n    y = 1\nz = 2\n";
        let (tokens, diags) = tokenize(src);
        assert!(!diags.had_error());
        let indents = tokens.iter().filter(|t| t.kind == TokenKind::Indent).count();
        let dedents = tokens.iter().filter(|t| t.kind == TokenKind::Dedent).count();
        assert_eq!(indents, dedents);
        assert_eq!(indents, 1);
    }

    #[test]
    fn drains_multiple_dedents_at_eof() {
        let src = "if a:\n    if b:\n        1\n";
        let (tokens, _) = tokenize(src);
        let dedents = tokens.iter().filter(|t| t.kind == TokenKind::Dedent).count();
        assert_eq!(dedents, 2);
    }

    #[test]
    fn inconsistent_indentation_is_an_error() {
        let src = "if a:\n   1\n     2\n";
        let (_, diags) = tokenize(src);
        assert!(diags.had_error());
    }

    #[test]
    fn blank_and_comment_lines_do_not_affect_indentation() {
        let src = "if a:\n    1\n\n    // comment\n    2\n";
        let (_, diags) = tokenize(src);
        assert!(!diags.had_error());
    }

    #[test]
    fn tabs_count_as_four_columns() {
        let src = "if a:\n\t1\nb = 2\n";
        let (tokens, diags) = tokenize(src);
        assert!(!diags.had_error());
        assert_eq!(tokens.iter().filter(|t| t.kind == TokenKind::Indent).count(), 1);
    }

    #[test]
    fn hex_and_underscore_literals() {
        let src = "0xFF 1_000_000 1.5e10 42i64\n";
        let (tokens, diags) = tokenize(src);
        assert!(!diags.had_error());
        assert_eq!(tokens.iter().filter(|t| t.kind == TokenKind::Number).count(), 4);
    }

    #[test]
    fn misplaced_underscore_is_an_error() {
        let (_, diags) = tokenize("1__000\n");
        assert!(diags.had_error());
    }

    #[test]
    fn missing_exponent_digits_is_an_error() {
        let (_, diags) = tokenize("1.5e\n");
        assert!(diags.had_error());
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let (_, diags) = tokenize("\"abc\n");
        assert!(diags.had_error());
    }

    #[test]
    fn unknown_escape_is_an_error() {
        let (_, diags) = tokenize("\"\\q\"\n");
        assert!(diags.had_error());
    }

    #[test]
    fn keywords_resolve_to_their_kind() {
        let k = kinds("if elif else while for\n");
        assert_eq!(
            k[..5],
            [
                TokenKind::KwIf,
                TokenKind::KwElif,
                TokenKind::KwElse,
                TokenKind::KwWhile,
                TokenKind::KwFor,
            ]
        );
    }

    #[test]
    fn inclusive_range_operator() {
        let k = kinds("1..=3\n");
        assert!(k.contains(&TokenKind::RangeInclusive));
    }

    #[test]
    fn compound_assignment_operators() {
        let k = kinds("x += 1\nx -= 1\nx *= 1\nx /= 1\nx %= 1\n");
        for op in [
            TokenKind::PlusEq,
            TokenKind::MinusEq,
            TokenKind::StarEq,
            TokenKind::SlashEq,
            TokenKind::PercentEq,
        ] {
            assert!(k.contains(&op));
        }
    }

    #[test]
    fn lex_print_relex_round_trip() {
        let src = "fn main():\n    x = 1 + 2\n    print(x)\n";
        let (tokens, _) = tokenize(src);
        let dump = dump_tokens(src, &tokens);
        // Re-lexing the original source should produce the same token kind
        // sequence (ignoring positions, which the dump doesn't re-validate).
        let (retokens, _) = tokenize(src);
        let kinds_a: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        let kinds_b: Vec<_> = retokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds_a, kinds_b);
        assert!(!dump.is_empty());
    }

    #[test]
    fn block_comment_unterminated_is_error() {
        let (_, diags) = tokenize("/* unterminated\n");
        assert!(diags.had_error());
    }

    #[test]
    fn block_comment_does_not_nest() {
        // Non-nesting: the first `*/` ends the comment, so `still_comment`
        // and the trailing `*/` are lexed as ordinary code, not a comment.
        let src = "/* outer /* inner */ still_comment */\nx = 1\n";
        let (tokens, _) = tokenize(src);
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Identifier));
    }
}
