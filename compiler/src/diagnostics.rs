//! Diagnostics shared across every compiler phase.
//!
//! Every phase reports failures through [`Diagnostic`] so that a single
//! `compile()` call can collect errors from independent statements into one
//! ordered report instead of aborting on the first one.

use std::fmt;

/// Stable, user-facing diagnostic code families, grouped by phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCode {
    // Lexical (E1xxx)
    UnterminatedString,
    UnknownEscape,
    MisplacedUnderscore,
    MalformedHex,
    MalformedExponent,
    InconsistentIndentation,
    UnexpectedCharacter,
    SuffixOverflow,
    UnterminatedComment,
    // Syntactic (E1xxx continued)
    MissingDelimiter,
    UnexpectedToken,
    MissingComma,
    ReservedKeyword,
    ConstMutConflict,
    ChainedCastUnparenthesized,
    ExpressionTooComplex,
    // Scope/name (E3xxx)
    UndefinedVariable,
    DuplicateGlobal,
    InvalidVariableName,
    InvalidConstantName,
    AssignToImmutable,
    // Type (E2xxx)
    TypeMismatch,
    InvalidCast,
    MixedArithmetic,
    UndefinedType,
    // Control flow (E4xxx)
    BreakOutsideLoop,
    ContinueOutsideLoop,
    UndefinedLabel,
    EmptyBlock,
    AssignmentInCondition,
    // Match (E4xxx continued)
    DuplicateMatchArm,
    NonExhaustiveMatch,
    // Emission
    JumpTooFar,
}

impl DiagnosticCode {
    /// The stable string code, e.g. `E1001`.
    pub fn as_str(&self) -> &'static str {
        use DiagnosticCode::*;
        match self {
            UnterminatedString => "E1001",
            UnknownEscape => "E1002",
            MisplacedUnderscore => "E1003",
            MalformedHex => "E1004",
            MalformedExponent => "E1005",
            InconsistentIndentation => "E1006",
            UnexpectedCharacter => "E1007",
            SuffixOverflow => "E1008",
            UnterminatedComment => "E1009",
            MissingDelimiter => "E1010",
            UnexpectedToken => "E1011",
            MissingComma => "E1012",
            ReservedKeyword => "E1013",
            ConstMutConflict => "E1014",
            ChainedCastUnparenthesized => "E1015",
            ExpressionTooComplex => "E1016",
            UndefinedVariable => "E3001",
            DuplicateGlobal => "E3002",
            InvalidVariableName => "E3003",
            InvalidConstantName => "E3004",
            AssignToImmutable => "E3005",
            TypeMismatch => "E2001",
            InvalidCast => "E2002",
            MixedArithmetic => "E2003",
            UndefinedType => "E2004",
            BreakOutsideLoop => "E4001",
            ContinueOutsideLoop => "E4002",
            UndefinedLabel => "E4003",
            EmptyBlock => "E4004",
            AssignmentInCondition => "E4005",
            DuplicateMatchArm => "E4006",
            NonExhaustiveMatch => "E4007",
            JumpTooFar => "E4008",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A source location: 1-indexed line/column, matching the lexer's public
/// contract (tokens are reported 1-indexed even though the scanner counts
/// from zero internally).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLoc {
    pub line: u32,
    pub column: u32,
}

impl SourceLoc {
    pub fn new(line: u32, column: u32) -> Self {
        SourceLoc { line, column }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One compiler diagnostic: a stable code, a location, and a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub location: SourceLoc,
    pub message: String,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, location: SourceLoc, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            location,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.code, self.location, self.message)
    }
}

/// Accumulates diagnostics across a compilation so independent statements
/// can each be attempted even after one fails.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn had_error(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn extend(&mut self, other: DiagnosticBag) {
        self.diagnostics.extend(other.diagnostics);
    }
}

impl fmt::Display for DiagnosticBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", d)?;
        }
        Ok(())
    }
}

impl std::error::Error for DiagnosticBag {}

impl From<Diagnostic> for DiagnosticBag {
    fn from(d: Diagnostic) -> Self {
        let mut bag = DiagnosticBag::new();
        bag.push(d);
        bag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_in_source_order() {
        let mut bag = DiagnosticBag::new();
        bag.push(Diagnostic::new(
            DiagnosticCode::UndefinedVariable,
            SourceLoc::new(1, 1),
            "undefined variable 'x'",
        ));
        bag.push(Diagnostic::new(
            DiagnosticCode::BreakOutsideLoop,
            SourceLoc::new(3, 5),
            "break outside loop",
        ));
        let rendered = bag.to_string();
        let first = rendered.find("E3001").unwrap();
        let second = rendered.find("E4001").unwrap();
        assert!(first < second);
    }

    #[test]
    fn empty_bag_has_no_error() {
        assert!(!DiagnosticBag::new().had_error());
    }
}
