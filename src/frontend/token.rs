use std::fmt;

use crate::ir::OpKind;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Sigil-prefixed names
    Var(String),
    Label(String),
    Function(String),
    // Bare words: keywords, type names and runtime symbols
    Word(String),
    Number(i64),
    // Punctuation
    Arrow,
    Op(OpKind),
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Comma,
    Newline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, line: usize) -> Self {
        Token { kind, line }
    }

    pub fn is_word(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Word(w) if w == word)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Var(name)
            | TokenKind::Label(name)
            | TokenKind::Function(name)
            | TokenKind::Word(name) => f.write_str(name),
            TokenKind::Number(n) => write!(f, "{}", n),
            TokenKind::Arrow => f.write_str("<-"),
            TokenKind::Op(op) => f.write_str(op.symbol()),
            TokenKind::LeftParen => f.write_str("("),
            TokenKind::RightParen => f.write_str(")"),
            TokenKind::LeftBracket => f.write_str("["),
            TokenKind::RightBracket => f.write_str("]"),
            TokenKind::LeftBrace => f.write_str("{"),
            TokenKind::RightBrace => f.write_str("}"),
            TokenKind::Comma => f.write_str(","),
            TokenKind::Newline => f.write_str("end of line"),
        }
    }
}
