//! Lexer: turns source text into a lazy stream of [`Token`]s.
//!
//! Grounded in `examples/original_source/cmm-lang/Scanner.cpp`: punctuator
//! classification by ASCII range, the `/* */` and `//` comment skippers, the
//! per-character compound-operator dispatch (`&` -> `&=` / `&&` / `&`), and
//! the numeric-literal DFA described in spec.md §4.1. The original is
//! wide-character (`wchar_t`) oriented; `weave` standardizes on UTF-8 and
//! works over `char`, per spec.md §9's design note.

use crate::error::LexError;

/// Source position of a token: 1-based start/end line and column.
///
/// Columns advance by 1 per character except for tab, which advances by 8
/// (`examples/original_source/cmm-lang/Scanner.h`'s `SCANNER_TAP_SIZE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub start_line: u32,
    pub end_line: u32,
    pub start_col: u32,
    pub end_col: u32,
}

const TAB_SIZE: u32 = 8;

#[derive(Debug, Clone, PartialEq, strum::Display)]
pub enum TokenKind {
    // Literals
    Int(i64),
    Hex(i64),
    Float(f64),
    Str(String),
    Identifier(String),

    // Keywords
    Null,
    Array,
    Table,
    Function,
    True,
    False,
    Break,
    Continue,
    If,
    Else,
    Do,
    While,
    For,
    Foreach,
    Return,
    Yield,
    Local,

    // Punctuators
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    LeftParen,
    RightParen,
    Comma,
    Dot,
    Semicolon,
    Colon,
    Question,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    Lt,
    Gt,
    Shl,
    Shr,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    ShlAssign,
    ShrAssign,
    Eq,
    NotEq,
    Le,
    Ge,
    AndAnd,
    OrOr,
    Inc,
    Dec,

    /// Lexer-level failure already converted to a token so the parser can
    /// report a position-bearing error uniformly.
    Err,
    /// End of input.
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub position: Position,
}

pub struct Lexer {
    chars: Vec<char>,
    offset: usize,
    line: u32,
    col: u32,
}

impl Lexer {
    #[must_use]
    pub fn new(source: &str) -> Self {
        Self { chars: source.chars().collect(), offset: 0, line: 1, col: 1 }
    }

    fn current(&self) -> char {
        self.chars.get(self.offset).copied().unwrap_or('\0')
    }

    fn peek(&self, n: usize) -> char {
        self.chars.get(self.offset + n).copied().unwrap_or('\0')
    }

    fn advance(&mut self) -> char {
        let c = self.current();
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else if c != '\0' {
            self.col += if c == '\t' { TAB_SIZE } else { 1 };
        }
        self.offset += 1;
        c
    }

    fn skip_blank_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            if self.current().is_whitespace() {
                self.advance();
            } else if self.current() == '/' && self.peek(1) == '*' {
                let start_line = self.line;
                self.advance();
                self.advance();
                loop {
                    if self.current() == '\0' {
                        return Err(LexError::UnterminatedComment { line: start_line });
                    }
                    if self.current() == '*' && self.peek(1) == '/' {
                        self.advance();
                        self.advance();
                        break;
                    }
                    self.advance();
                }
            } else if self.current() == '/' && self.peek(1) == '/' {
                while self.current() != '\n' && self.current() != '\0' {
                    self.advance();
                }
            } else {
                break;
            }
        }
        Ok(())
    }

    /// Produces the next token. Returns an `End` token forever once the
    /// input is exhausted.
    ///
    /// # Errors
    /// Returns a [`LexError`] for unterminated comments/strings, malformed
    /// numeric literals, and stray characters.
    pub fn scan(&mut self) -> Result<Token, LexError> {
        self.skip_blank_and_comments()?;

        let start_line = self.line;
        let start_col = self.col;
        let mut lexeme = String::new();

        let kind = self.scan_token(&mut lexeme)?;

        Ok(Token {
            kind,
            lexeme,
            position: Position {
                start_line,
                end_line: self.line,
                start_col,
                end_col: self.col.saturating_sub(1),
            },
        })
    }

    fn take(&mut self, lexeme: &mut String) -> char {
        let c = self.advance();
        lexeme.push(c);
        c
    }

    fn scan_token(&mut self, lexeme: &mut String) -> Result<TokenKind, LexError> {
        let c = self.current();

        if c == '\0' {
            return Ok(TokenKind::End);
        }
        if c.is_ascii_digit() || (c == '.' && self.peek(1).is_ascii_digit()) {
            return self.scan_number(lexeme);
        }
        if is_identifier_start(c) {
            self.take(lexeme);
            while is_identifier_continue(self.current()) {
                self.take(lexeme);
            }
            return Ok(classify_keyword(lexeme));
        }

        match c {
            '"' => self.scan_string(lexeme),
            '{' => { self.take(lexeme); Ok(TokenKind::LeftBrace) }
            '}' => { self.take(lexeme); Ok(TokenKind::RightBrace) }
            '[' => { self.take(lexeme); Ok(TokenKind::LeftBracket) }
            ']' => { self.take(lexeme); Ok(TokenKind::RightBracket) }
            '(' => { self.take(lexeme); Ok(TokenKind::LeftParen) }
            ')' => { self.take(lexeme); Ok(TokenKind::RightParen) }
            ',' => { self.take(lexeme); Ok(TokenKind::Comma) }
            '.' => { self.take(lexeme); Ok(TokenKind::Dot) }
            ';' => { self.take(lexeme); Ok(TokenKind::Semicolon) }
            ':' => { self.take(lexeme); Ok(TokenKind::Colon) }
            '?' => { self.take(lexeme); Ok(TokenKind::Question) }
            '~' => { self.take(lexeme); Ok(TokenKind::Tilde) }
            '!' => {
                self.take(lexeme);
                if self.current() == '=' {
                    self.take(lexeme);
                    Ok(TokenKind::NotEq)
                } else {
                    Ok(TokenKind::Bang)
                }
            }
            '+' => {
                self.take(lexeme);
                match self.current() {
                    '=' => { self.take(lexeme); Ok(TokenKind::PlusAssign) }
                    '+' => { self.take(lexeme); Ok(TokenKind::Inc) }
                    _ => Ok(TokenKind::Plus),
                }
            }
            '-' => {
                self.take(lexeme);
                match self.current() {
                    '=' => { self.take(lexeme); Ok(TokenKind::MinusAssign) }
                    '-' => { self.take(lexeme); Ok(TokenKind::Dec) }
                    _ => Ok(TokenKind::Minus),
                }
            }
            '*' => {
                self.take(lexeme);
                if self.current() == '=' {
                    self.take(lexeme);
                    Ok(TokenKind::StarAssign)
                } else {
                    Ok(TokenKind::Star)
                }
            }
            '/' => {
                self.take(lexeme);
                if self.current() == '=' {
                    self.take(lexeme);
                    Ok(TokenKind::SlashAssign)
                } else {
                    Ok(TokenKind::Slash)
                }
            }
            '%' => {
                self.take(lexeme);
                if self.current() == '=' {
                    self.take(lexeme);
                    Ok(TokenKind::PercentAssign)
                } else {
                    Ok(TokenKind::Percent)
                }
            }
            '&' => {
                self.take(lexeme);
                match self.current() {
                    '=' => { self.take(lexeme); Ok(TokenKind::AmpAssign) }
                    '&' => { self.take(lexeme); Ok(TokenKind::AndAnd) }
                    _ => Ok(TokenKind::Amp),
                }
            }
            '|' => {
                self.take(lexeme);
                match self.current() {
                    // `ASSIGN_OR`'s token is `|=`; see DESIGN.md for the
                    // `// !=` comment copy/paste artifact this preserves
                    // the *behavior* of (not the stray comment itself).
                    '=' => { self.take(lexeme); Ok(TokenKind::PipeAssign) }
                    '|' => { self.take(lexeme); Ok(TokenKind::OrOr) }
                    _ => Ok(TokenKind::Pipe),
                }
            }
            '^' => {
                self.take(lexeme);
                if self.current() == '=' {
                    self.take(lexeme);
                    Ok(TokenKind::CaretAssign)
                } else {
                    Ok(TokenKind::Caret)
                }
            }
            '=' => {
                self.take(lexeme);
                if self.current() == '=' {
                    self.take(lexeme);
                    Ok(TokenKind::Eq)
                } else {
                    Ok(TokenKind::Assign)
                }
            }
            '<' => {
                self.take(lexeme);
                match self.current() {
                    '=' => { self.take(lexeme); Ok(TokenKind::Le) }
                    '<' => {
                        self.take(lexeme);
                        if self.current() == '=' {
                            self.take(lexeme);
                            Ok(TokenKind::ShlAssign)
                        } else {
                            Ok(TokenKind::Shl)
                        }
                    }
                    _ => Ok(TokenKind::Lt),
                }
            }
            '>' => {
                self.take(lexeme);
                match self.current() {
                    '=' => { self.take(lexeme); Ok(TokenKind::Ge) }
                    '>' => {
                        self.take(lexeme);
                        if self.current() == '=' {
                            self.take(lexeme);
                            Ok(TokenKind::ShrAssign)
                        } else {
                            Ok(TokenKind::Shr)
                        }
                    }
                    _ => Ok(TokenKind::Gt),
                }
            }
            other => Err(LexError::StrayCharacter { line: self.line, found: other }),
        }
    }

    fn scan_string(&mut self, lexeme: &mut String) -> Result<TokenKind, LexError> {
        let start_line = self.line;
        self.take(lexeme); // opening quote
        let mut value = String::new();
        loop {
            match self.current() {
                '"' => {
                    self.take(lexeme);
                    break;
                }
                '\0' | '\n' => return Err(LexError::UnterminatedString { line: start_line }),
                '\\' => {
                    self.take(lexeme);
                    let escaped = self.current();
                    match escaped {
                        'n' => { self.take(lexeme); value.push('\n'); }
                        't' => { self.take(lexeme); value.push('\t'); }
                        '\\' => { self.take(lexeme); value.push('\\'); }
                        '\'' => { self.take(lexeme); value.push('\''); }
                        '"' => { self.take(lexeme); value.push('"'); }
                        'x' => {
                            self.take(lexeme);
                            let mut hex = String::new();
                            while self.current().is_ascii_hexdigit() {
                                hex.push(self.take(lexeme));
                            }
                            if hex.is_empty() {
                                return Err(LexError::InvalidEscape { line: self.line, found: 'x' });
                            }
                            let code = u32::from_str_radix(&hex, 16)
                                .map_err(|_| LexError::InvalidEscape { line: self.line, found: 'x' })?;
                            value.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                        }
                        '\0' | '\n' => return Err(LexError::UnterminatedString { line: start_line }),
                        other => return Err(LexError::InvalidEscape { line: self.line, found: other }),
                    }
                }
                _ => value.push(self.take(lexeme)),
            }
        }
        Ok(TokenKind::Str(value))
    }

    fn scan_number(&mut self, lexeme: &mut String) -> Result<TokenKind, LexError> {
        // Leading-dot float: DFA state S0 ("have `.` only") -> S1 (require
        // a digit) -> S2.
        if self.current() == '.' {
            self.take(lexeme);
            let mut frac = String::new();
            while self.current().is_ascii_digit() {
                frac.push(self.take(lexeme));
            }
            if frac.is_empty() {
                return Err(LexError::MalformedNumber { line: self.line, lexeme: lexeme.clone() });
            }
            return self.finish_float(lexeme, "", &frac);
        }

        if self.current() == '0' && (self.peek(1) == 'x' || self.peek(1) == 'X') {
            self.take(lexeme);
            self.take(lexeme);
            let mut digits = String::new();
            while self.current().is_ascii_hexdigit() {
                digits.push(self.take(lexeme));
            }
            if digits.is_empty() {
                return Err(LexError::MalformedNumber { line: self.line, lexeme: lexeme.clone() });
            }
            let value = i64::from_str_radix(&digits, 16)
                .map_err(|_| LexError::MalformedNumber { line: self.line, lexeme: lexeme.clone() })?;
            return Ok(TokenKind::Hex(value));
        }

        let mut int_part = String::new();
        while self.current().is_ascii_digit() {
            int_part.push(self.take(lexeme));
        }

        // Float DFA (spec.md §4.1): a `.` or `e/E` turns this into a FLOAT.
        if self.current() == '.' {
            self.take(lexeme); // S3 -> S2 via '.'
            let mut frac = String::new();
            while self.current().is_ascii_digit() {
                frac.push(self.take(lexeme));
            }
            return self.finish_float(lexeme, &int_part, &frac);
        }
        if self.current() == 'e' || self.current() == 'E' {
            return self.finish_float(lexeme, &int_part, "");
        }
        if self.current() == 'f' || self.current() == 'F' {
            self.take(lexeme);
            let value = int_part
                .parse::<f64>()
                .map_err(|_| LexError::MalformedNumber { line: self.line, lexeme: lexeme.clone() })?;
            return Ok(TokenKind::Float(value));
        }

        let value = int_part
            .parse::<i64>()
            .map_err(|_| LexError::MalformedNumber { line: self.line, lexeme: lexeme.clone() })?;
        Ok(TokenKind::Int(value))
    }

    /// Completes float scanning from state S2/S3 in spec.md's DFA: optional
    /// exponent (S4 -> S5: sign, then required digit) and optional trailing
    /// `f`/`F` suffix.
    fn finish_float(&mut self, lexeme: &mut String, int_part: &str, frac_part: &str) -> Result<TokenKind, LexError> {
        let mut text = format!("{int_part}.{frac_part}");
        if frac_part.is_empty() && int_part.is_empty() {
            return Err(LexError::MalformedNumber { line: self.line, lexeme: lexeme.clone() });
        }

        if self.current() == 'e' || self.current() == 'E' {
            let mut exp = String::new();
            exp.push(self.take(lexeme));
            if self.current() == '+' || self.current() == '-' {
                exp.push(self.take(lexeme));
            }
            let mut exp_digits = String::new();
            while self.current().is_ascii_digit() {
                exp_digits.push(self.take(lexeme));
            }
            if exp_digits.is_empty() {
                return Err(LexError::MalformedNumber { line: self.line, lexeme: lexeme.clone() });
            }
            exp.push_str(&exp_digits);
            text.push_str(&exp);
        }

        if self.current() == 'f' || self.current() == 'F' {
            self.take(lexeme);
        }

        let value = text
            .parse::<f64>()
            .map_err(|_| LexError::MalformedNumber { line: self.line, lexeme: lexeme.clone() })?;
        Ok(TokenKind::Float(value))
    }
}

fn is_identifier_start(c: char) -> bool {
    c == '_' || (c.is_alphabetic() && !is_punctuator(c))
}

fn is_identifier_continue(c: char) -> bool {
    c != '\0' && !c.is_whitespace() && !is_punctuator(c)
}

/// ASCII punctuator ranges from `Scanner.cpp`'s `isPunctuator`, minus `_`
/// (which is valid inside identifiers).
fn is_punctuator(c: char) -> bool {
    let b = c as u32;
    matches!(b, 0x21..=0x2f | 0x3a..=0x40 | 0x5b..=0x5e | 0x7b..=0x7e) && c != '_'
}

fn classify_keyword(lexeme: &str) -> TokenKind {
    match lexeme {
        "null" => TokenKind::Null,
        "array" => TokenKind::Array,
        "table" => TokenKind::Table,
        "function" => TokenKind::Function,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "do" => TokenKind::Do,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "foreach" => TokenKind::Foreach,
        "return" => TokenKind::Return,
        "yield" => TokenKind::Yield,
        "local" => TokenKind::Local,
        other => TokenKind::Identifier(other.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let tok = lexer.scan().expect("lex error");
            if tok.kind == TokenKind::End {
                break;
            }
            out.push(tok.kind);
        }
        out
    }

    #[test]
    fn skips_whitespace_and_comments() {
        assert_eq!(
            kinds("local /* comment */ x = 1; // trailing\n"),
            vec![
                TokenKind::Local,
                TokenKind::Identifier("x".into()),
                TokenKind::Assign,
                TokenKind::Int(1),
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn compound_operators() {
        assert_eq!(
            kinds("a <<= 2; b &&= true; c != d; e >= f;"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::ShlAssign,
                TokenKind::Int(2),
                TokenKind::Semicolon,
                TokenKind::Identifier("b".into()),
                TokenKind::AndAnd,
                TokenKind::Assign,
                TokenKind::True,
                TokenKind::Semicolon,
                TokenKind::Identifier("c".into()),
                TokenKind::NotEq,
                TokenKind::Identifier("d".into()),
                TokenKind::Semicolon,
                TokenKind::Identifier("e".into()),
                TokenKind::Ge,
                TokenKind::Identifier("f".into()),
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn numeric_literals() {
        assert_eq!(
            kinds("10 0x1F 3.14 2. .5e3 1f"),
            vec![
                TokenKind::Int(10),
                TokenKind::Hex(31),
                TokenKind::Float(3.14),
                TokenKind::Float(2.0),
                TokenKind::Float(500.0),
                TokenKind::Float(1.0),
            ]
        );
    }

    #[test]
    fn string_escapes() {
        let toks = kinds(r#""a\nb\tc\x41""#);
        assert_eq!(toks, vec![TokenKind::Str("a\nb\tc\u{41}".into())]);
    }

    #[test]
    fn unterminated_comment_reports_opening_line() {
        let mut lexer = Lexer::new("x;\n/* never closed");
        lexer.scan().unwrap();
        lexer.scan().unwrap();
        let err = lexer.scan().unwrap_err();
        assert_eq!(err, LexError::UnterminatedComment { line: 2 });
    }

    #[test]
    fn tab_advances_column_by_eight() {
        let mut lexer = Lexer::new("\tx");
        let tok = lexer.scan().unwrap();
        assert_eq!(tok.position.start_col, 9);
    }

    #[test]
    fn token_stream_stable_regardless_of_surrounding_whitespace() {
        let compact = kinds("x=1+2;");
        let spaced = kinds("  x  =  1  +  2  ;  ");
        assert_eq!(compact, spaced);
    }
}
