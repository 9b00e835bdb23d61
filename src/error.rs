//! Error types for every phase of the pipeline: lexing, parsing, semantic
//! analysis, and execution.
//!
//! Mirrors monty's `parse_error.rs` / `exception_private.rs` split: plain
//! enums with a hand-written `Display` impl rather than a derive-macro
//! crate, since the phases need slightly different fields (line numbers,
//! lexemes, opcodes) that don't compress well into one generic shape.

use std::fmt;

/// A 1-based source line number, as produced by the lexer's position
/// tracking (see `lexer::Position`).
pub type Line = u32;

/// Error raised while turning source text into tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    /// `/* ...` reached end of file without a closing `*/`. The line is
    /// the line the comment *opened* on, per spec.md §8.
    UnterminatedComment { line: Line },
    /// An unterminated `"..."` string literal (newline or EOF before the
    /// closing quote).
    UnterminatedString { line: Line },
    /// A numeric literal didn't match the INT/HEX/FLOAT grammar, e.g.
    /// `0x` with no hex digits, or a float DFA dead end.
    MalformedNumber { line: Line, lexeme: String },
    /// `\x` escape inside a string without hex digits following it.
    InvalidEscape { line: Line, found: char },
    /// A character that is neither whitespace, a punctuator, nor part of
    /// an identifier/number/string.
    StrayCharacter { line: Line, found: char },
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnterminatedComment { line } => write!(f, "{line}: unterminated multi-line comment"),
            Self::UnterminatedString { line } => write!(f, "{line}: unterminated string literal"),
            Self::MalformedNumber { line, lexeme } => write!(f, "{line}: malformed numeric literal '{lexeme}'"),
            Self::InvalidEscape { line, found } => write!(f, "{line}: invalid escape sequence '\\{found}'"),
            Self::StrayCharacter { line, found } => write!(f, "{line}: stray character '{found}'"),
        }
    }
}

impl std::error::Error for LexError {}

/// Error raised while building the AST from a token stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Expected one kind of token, found another.
    Expected { line: Line, expected: String, found: String },
    /// Reached a token that cannot start a primary expression.
    NotAPrimary { line: Line, found: String },
    /// `yield` is parsed but always rejected (coroutines are reserved,
    /// not implemented — spec.md §1 Non-goals).
    YieldUnsupported { line: Line },
    /// `local` was not followed by an identifier or `function`.
    MalformedLocal { line: Line, found: String },
    /// Forwarded lexer failure encountered while parsing.
    Lex(LexError),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expected { line, expected, found } => {
                write!(f, "{line}: expected {expected}, found '{found}'")
            }
            Self::NotAPrimary { line, found } => write!(f, "{line}: unexpected token '{found}' in expression"),
            Self::YieldUnsupported { line } => {
                write!(f, "{line}: 'yield' is reserved for unimplemented coroutine support")
            }
            Self::MalformedLocal { line, found } => {
                write!(f, "{line}: expected identifier or 'function' after 'local', found '{found}'")
            }
            Self::Lex(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        Self::Lex(e)
    }
}

/// Error raised by the semantic analyzer (name resolution, l-value
/// validation, table-shape checking).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// `break`/`continue` outside of any enclosing loop in this function.
    JumpOutsideLoop { line: Line, keyword: &'static str },
    /// Assignment or increment/decrement target is not an l-value.
    NotAnLValue { line: Line },
    /// An `array { ... }` literal had a non-integer-literal key.
    NonIntegerArrayKey { line: Line },
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JumpOutsideLoop { line, keyword } => write!(f, "{line}: '{keyword}' used outside of a loop"),
            Self::NotAnLValue { line } => write!(f, "{line}: left-hand side of assignment is not an l-value"),
            Self::NonIntegerArrayKey { line } => {
                write!(f, "{line}: 'array' literal requires integer-literal keys")
            }
        }
    }
}

impl std::error::Error for AnalysisError {}

/// Umbrella error returned by [`crate::context::Context::load`], covering
/// every phase that runs before bytecode starts executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    Lex(LexError),
    Parse(ParseError),
    Analysis(AnalysisError),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lex(e) => write!(f, "{e}"),
            Self::Parse(e) => write!(f, "{e}"),
            Self::Analysis(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<LexError> for CompileError {
    fn from(e: LexError) -> Self {
        Self::Lex(e)
    }
}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<AnalysisError> for CompileError {
    fn from(e: AnalysisError) -> Self {
        Self::Analysis(e)
    }
}

/// Error raised by the VM while executing bytecode, or by the embedding
/// API's buffer primitives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Attempted to `CALL` a value that is neither `Func` nor `CFunc`.
    NotCallable,
    /// Arithmetic attempted on a non-numeric, non-string operand.
    NotANumber,
    /// A bitwise/`%` operation was attempted on a non-integer operand.
    NotAnInteger,
    /// Integer division or modulo by zero.
    DivisionByZero,
    /// Indexed a value that is neither `Table` nor `Array`.
    NotIndexable,
    /// Indexed an `Array` with a non-integer key.
    NonIntegerArrayIndex,
    /// The host called `run` while the VM was already executing (possibly
    /// from inside a native function callback).
    Reentrant,
    /// A buffer index was outside `0..stack_size()`.
    BufferIndexOutOfRange { index: i64 },
    /// A buffer slot held a different tag than the caller expected.
    BufferTypeMismatch { index: i64, expected: &'static str },
    /// Pushing to the communication buffer would exceed its 100-entry
    /// capacity.
    BufferOverflow,
    /// `run`'s argument count didn't match the buffer's contents.
    ArgumentCountMismatch,
    /// `YIELD` executed; coroutines are reserved, not implemented.
    YieldUnsupported,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotCallable => write!(f, "wrong attempt to call a non-function value"),
            Self::NotANumber => write!(f, "wrong attempt to perform arithmetic on a non-numeric value"),
            Self::NotAnInteger => write!(f, "wrong attempt to perform an integer operation on a non-integer value"),
            Self::DivisionByZero => write!(f, "attempt to divide an integer by zero"),
            Self::NotIndexable => write!(f, "wrong type for index operation"),
            Self::NonIntegerArrayIndex => write!(f, "non-integer value used as index into array type"),
            Self::Reentrant => write!(f, "attempt to reentrantly run an already-active context"),
            Self::BufferIndexOutOfRange { index } => write!(f, "buffer index {index} is out of range"),
            Self::BufferTypeMismatch { index, expected } => {
                write!(f, "buffer index {index} does not hold a {expected} value")
            }
            Self::BufferOverflow => write!(f, "communication buffer overflowed its 100-entry capacity"),
            Self::ArgumentCountMismatch => write!(f, "argument count does not match buffer contents"),
            Self::YieldUnsupported => write!(f, "coroutine/yield is not supported"),
        }
    }
}

impl std::error::Error for RuntimeError {}
