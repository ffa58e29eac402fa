//! Tokenizer
//!
//! Converts preprocessed source into a flat token list with explicit
//! line/column tracking. Comments and newlines are kept as tokens so tooling
//! can see them; the parser filters them out.

use crate::keywords;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenKind {
    Keyword,
    IoType,
    VarType,
    Builtin,
    Directive,
    Identifier,
    Number,
    Str,
    Operator,
    Punct,
    Comment,
    Newline,
    Eof,
}

/// A token with source position information
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw lexeme exactly as written (string tokens keep quotes and escapes)
    pub text: String,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub col: usize,
}

impl Token {
    fn new(kind: TokenKind, text: String, line: usize, col: usize) -> Self {
        Token {
            kind,
            text,
            line,
            col,
        }
    }

    /// Case-insensitive comparison against a keyword or symbol
    pub fn is(&self, text: &str) -> bool {
        self.text.eq_ignore_ascii_case(text)
    }

    pub fn upper(&self) -> String {
        self.text.to_ascii_uppercase()
    }

    /// Tokens the parser never sees
    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Comment | TokenKind::Newline)
    }
}

const TWO_CHAR_OPERATORS: &[&str] = &["==", "!=", "<>", "<=", ">=", "&&", "||", "<<", ">>"];
const ONE_CHAR_OPERATORS: &str = "+-*/%=<>&|^!~";
const PUNCTUATION: &str = "()[]{},;.:";

struct Cursor {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Cursor {
    fn new(source: &str) -> Self {
        Cursor {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(ch) = self.peek() {
            if !pred(ch) {
                break;
            }
            out.push(ch);
            self.bump();
        }
        out
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '$'
}

fn classify(word: &str) -> TokenKind {
    if keywords::is_control_keyword(word) {
        TokenKind::Keyword
    } else if keywords::is_io_type(word) {
        TokenKind::IoType
    } else if keywords::is_var_type(word) {
        TokenKind::VarType
    } else if keywords::is_builtin(word) {
        TokenKind::Builtin
    } else {
        TokenKind::Identifier
    }
}

pub fn tokenize(source: &str) -> Vec<Token> {
    let mut cur = Cursor::new(source);
    let mut tokens = Vec::new();

    while let Some(ch) = cur.peek() {
        let (line, col) = (cur.line, cur.col);

        if ch == '\n' {
            cur.bump();
            tokens.push(Token::new(TokenKind::Newline, "\n".to_string(), line, col));
            continue;
        }
        if ch.is_whitespace() {
            cur.bump();
            continue;
        }

        // Comments
        if ch == '/' && cur.peek_at(1) == Some('/') {
            let text = cur.take_while(|c| c != '\n');
            tokens.push(Token::new(TokenKind::Comment, text, line, col));
            continue;
        }
        if ch == '/' && cur.peek_at(1) == Some('*') {
            let mut text = String::new();
            text.push(cur.bump().unwrap_or('/'));
            text.push(cur.bump().unwrap_or('*'));
            while let Some(c) = cur.bump() {
                text.push(c);
                if c == '*' && cur.peek() == Some('/') {
                    text.push('/');
                    cur.bump();
                    break;
                }
            }
            tokens.push(Token::new(TokenKind::Comment, text, line, col));
            continue;
        }

        // Directives
        if ch == '#' {
            cur.bump();
            let name = cur.take_while(is_ident_char);
            tokens.push(Token::new(
                TokenKind::Directive,
                format!("#{}", name),
                line,
                col,
            ));
            continue;
        }

        // Strings keep their raw spelling; escapes are decoded by the parser
        if ch == '"' || ch == '\'' {
            let quote = ch;
            let mut text = String::new();
            text.push(quote);
            cur.bump();
            let mut escaped = false;
            while let Some(c) = cur.peek() {
                if c == '\n' && !escaped {
                    // Unterminated string: stop at end of line
                    break;
                }
                text.push(c);
                cur.bump();
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == quote {
                    break;
                }
            }
            tokens.push(Token::new(TokenKind::Str, text, line, col));
            continue;
        }

        // Numbers: decimal or 0x hex
        if ch.is_ascii_digit() {
            let text = if ch == '0' && matches!(cur.peek_at(1), Some('x') | Some('X')) {
                let mut t = String::new();
                t.push(cur.bump().unwrap_or('0'));
                t.push(cur.bump().unwrap_or('x'));
                t.push_str(&cur.take_while(|c| c.is_ascii_hexdigit()));
                t
            } else {
                cur.take_while(|c| c.is_ascii_digit())
            };
            tokens.push(Token::new(TokenKind::Number, text, line, col));
            continue;
        }

        if is_ident_start(ch) {
            let word = cur.take_while(is_ident_char);
            let kind = classify(&word);
            tokens.push(Token::new(kind, word, line, col));
            continue;
        }

        if let Some(next) = cur.peek_at(1) {
            let pair: String = [ch, next].iter().collect();
            if TWO_CHAR_OPERATORS.contains(&pair.as_str()) {
                cur.bump();
                cur.bump();
                tokens.push(Token::new(TokenKind::Operator, pair, line, col));
                continue;
            }
        }

        if ONE_CHAR_OPERATORS.contains(ch) {
            cur.bump();
            tokens.push(Token::new(TokenKind::Operator, ch.to_string(), line, col));
            continue;
        }

        if PUNCTUATION.contains(ch) {
            cur.bump();
            tokens.push(Token::new(TokenKind::Punct, ch.to_string(), line, col));
            continue;
        }

        // Unknown character: skip it
        cur.bump();
    }

    tokens.push(Token::new(TokenKind::Eof, String::new(), cur.line, cur.col));
    tokens
}

/// Decode a raw string token (quotes included) into its value
///
/// Supports `\n`, `\t`, `\r`, `\\`, `\"`, `\'` and `\xHH`. Unknown escapes
/// keep the escaped character.
pub fn decode_string(raw: &str) -> String {
    let mut chars = raw.chars();
    let quote = chars.next();
    let mut body: Vec<char> = chars.collect();
    if body.last().copied() == quote && !body.is_empty() {
        // Only strip the closing quote if it is not itself escaped
        let trailing_backslashes = body[..body.len() - 1]
            .iter()
            .rev()
            .take_while(|c| **c == '\\')
            .count();
        if trailing_backslashes % 2 == 0 {
            body.pop();
        }
    }

    let mut out = String::new();
    let mut i = 0;
    while i < body.len() {
        let c = body[i];
        if c != '\\' || i + 1 >= body.len() {
            out.push(c);
            i += 1;
            continue;
        }
        let esc = body[i + 1];
        i += 2;
        match esc {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            'x' | 'X' => {
                let hex: String = body[i..]
                    .iter()
                    .take(2)
                    .take_while(|c| c.is_ascii_hexdigit())
                    .collect();
                if hex.is_empty() {
                    out.push(esc);
                } else {
                    i += hex.len();
                    let byte = u8::from_str_radix(&hex, 16).unwrap_or(0);
                    out.push(byte as char);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Parse a number token (`42`, `0x2A`)
pub fn parse_number(text: &str) -> Option<i64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}
