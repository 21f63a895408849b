use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

use crate::error::{ErrorKind, LoxError, Location};

/*
The lexer's job is to walk the source byte stream and group runs of
characters into lexemes, then tag each lexeme with the token type the
rest of the pipeline cares about. It never looks at more than one
character past `current` (the lookahead needed to split `!` from `!=`,
`/` from `//`, and an integer literal from one with a fractional part).
*/

pub static KEYWORDS: Lazy<HashMap<&'static str, TokenType>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("and", TokenType::And);
    m.insert("class", TokenType::Class);
    m.insert("else", TokenType::Else);
    m.insert("false", TokenType::False);
    m.insert("for", TokenType::For);
    m.insert("fun", TokenType::Fun);
    m.insert("if", TokenType::If);
    m.insert("nil", TokenType::Nil);
    m.insert("or", TokenType::Or);
    m.insert("print", TokenType::Print);
    m.insert("return", TokenType::Return);
    m.insert("super", TokenType::Super);
    m.insert("this", TokenType::This);
    m.insert("true", TokenType::True);
    m.insert("var", TokenType::Var);
    m.insert("while", TokenType::While);
    m
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // single character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Minus,
    Plus,
    SemiColon,
    Slash,
    Star,

    // one or two character tokens
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // literals
    Identifier,
    String,
    Number,

    // keywords
    And,
    Class,
    Else,
    False,
    Fun,
    For,
    If,
    Nil,
    Or,
    Print,
    Return,
    Super,
    This,
    True,
    Var,
    While,

    Eof,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// Nil doubles as the "no payload" case for every non-literal token.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Bool(bool),
    Nil,
}

// Tokens never change after the lexer emits them, the parser only ever
// clones them onto AST nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub literal: Literal,
    pub file: String,
    pub line: usize,
    pub col: usize,
}

impl Token {
    pub fn new(
        token_type: TokenType,
        lexeme: String,
        literal: Literal,
        file: String,
        line: usize,
        col: usize,
    ) -> Self {
        Self {
            token_type,
            lexeme,
            literal,
            file,
            line,
            col,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {:?}", self.token_type, self.lexeme, self.literal)
    }
}

// `file` is only used to stamp locations for error messages, it doesn't
// need to be a real path (the REPL passes "<stdin>")
pub struct Lexer {
    source: Vec<char>,
    file: String,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: usize,
    col: usize,
    token_start_line: usize,
    token_start_col: usize,
}

impl Lexer {
    pub fn new(source: &str, file: impl Into<String>) -> Self {
        Self {
            source: source.chars().collect(),
            file: file.into(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
            col: 1,
            token_start_line: 1,
            token_start_col: 1,
        }
    }

    pub fn scan_tokens(mut self) -> Result<Vec<Token>, LoxError> {
        while !self.is_at_end() {
            self.start = self.current;
            self.token_start_line = self.line;
            self.token_start_col = self.col;
            self.scan_token()?;
        }
        self.tokens.push(Token::new(
            TokenType::Eof,
            String::new(),
            Literal::Nil,
            self.file.clone(),
            self.line,
            self.col,
        ));
        Ok(self.tokens)
    }

    fn scan_token(&mut self) -> Result<(), LoxError> {
        let ch = self.advance();
        match ch {
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            '{' => self.add_token(TokenType::LeftBrace),
            '}' => self.add_token(TokenType::RightBrace),
            ',' => self.add_token(TokenType::Comma),
            '.' => self.add_token(TokenType::Dot),
            '-' => self.add_token(TokenType::Minus),
            '+' => self.add_token(TokenType::Plus),
            ';' => self.add_token(TokenType::SemiColon),
            '*' => self.add_token(TokenType::Star),
            '!' => {
                let tt = if self.match_char('=') {
                    TokenType::BangEqual
                } else {
                    TokenType::Bang
                };
                self.add_token(tt);
            }
            '=' => {
                let tt = if self.match_char('=') {
                    TokenType::EqualEqual
                } else {
                    TokenType::Equal
                };
                self.add_token(tt);
            }
            '<' => {
                let tt = if self.match_char('=') {
                    TokenType::LessEqual
                } else {
                    TokenType::Less
                };
                self.add_token(tt);
            }
            '>' => {
                let tt = if self.match_char('=') {
                    TokenType::GreaterEqual
                } else {
                    TokenType::Greater
                };
                self.add_token(tt);
            }
            '/' => {
                if self.match_char('/') {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else {
                    self.add_token(TokenType::Slash);
                }
            }
            ' ' | '\r' | '\t' => {}
            '\n' => {}
            '"' => self.string()?,
            c if c.is_ascii_digit() => self.number(),
            c if is_alpha(c) => self.identifier(),
            _ => {
                return Err(LoxError::new(
                    ErrorKind::UnexpectedChar,
                    self.token_location(),
                    "Unexpected character.",
                ));
            }
        }
        Ok(())
    }

    fn string(&mut self) -> Result<(), LoxError> {
        while self.peek() != '"' && !self.is_at_end() {
            self.advance();
        }

        if self.is_at_end() {
            return Err(LoxError::new(
                ErrorKind::UnterminatedString,
                self.token_location(),
                "Unterminated string.",
            ));
        }

        // the closing quote
        self.advance();

        // raw bytes between the quotes, no escape processing
        let value: String = self.source[self.start + 1..self.current - 1].iter().collect();
        self.add_token_with_literal(TokenType::String, Literal::String(value));
        Ok(())
    }

    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let text: String = self.source[self.start..self.current].iter().collect();
        let value: f64 = text.parse().expect("lexer only admits valid digit runs");
        self.add_token_with_literal(TokenType::Number, Literal::Number(value));
    }

    fn identifier(&mut self) {
        while is_alphanumeric(self.peek()) {
            self.advance();
        }

        let text: String = self.source[self.start..self.current].iter().collect();
        let token_type = KEYWORDS.get(text.as_str()).copied().unwrap_or(TokenType::Identifier);
        self.add_token(token_type);
    }

    fn advance(&mut self) -> char {
        let ch = self.source[self.current];
        self.current += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        ch
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.source[self.current] != expected {
            return false;
        }
        self.advance();
        true
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.source[self.current]
        }
    }

    fn peek_next(&self) -> char {
        if self.current + 1 >= self.source.len() {
            '\0'
        } else {
            self.source[self.current + 1]
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn token_location(&self) -> Location {
        Location {
            file: self.file.clone(),
            line: self.token_start_line,
            col: self.token_start_col,
        }
    }

    fn add_token(&mut self, token_type: TokenType) {
        self.add_token_with_literal(token_type, Literal::Nil);
    }

    fn add_token_with_literal(&mut self, token_type: TokenType, literal: Literal) {
        let text: String = self.source[self.start..self.current].iter().collect();
        log::trace!("lexer: emit {:?} {:?} at {}:{}", token_type, text, self.token_start_line, self.token_start_col);
        let token = Token::new(
            token_type,
            text,
            literal,
            self.file.clone(),
            self.token_start_line,
            self.token_start_col,
        );
        self.tokens.push(token);
    }
}

fn is_alpha(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_alphanumeric(c: char) -> bool {
    is_alpha(c) || c.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(src: &str) -> Vec<TokenType> {
        Lexer::new(src, "<test>")
            .scan_tokens()
            .unwrap()
            .into_iter()
            .map(|t| t.token_type)
            .collect()
    }

    #[test]
    fn single_and_double_char_operators() {
        assert_eq!(
            scan("!= == <= >= < > ! ="),
            vec![
                TokenType::BangEqual,
                TokenType::EqualEqual,
                TokenType::LessEqual,
                TokenType::GreaterEqual,
                TokenType::Less,
                TokenType::Greater,
                TokenType::Bang,
                TokenType::Equal,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn keywords_are_recognized_by_longest_match() {
        assert_eq!(
            scan("forest for"),
            vec![TokenType::Identifier, TokenType::For, TokenType::Eof]
        );
    }

    #[test]
    fn line_comment_runs_to_end_of_line() {
        let tokens = Lexer::new("1 // comment\n2", "<test>").scan_tokens().unwrap();
        assert_eq!(tokens[0].token_type, TokenType::Number);
        assert_eq!(tokens[1].token_type, TokenType::Number);
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = Lexer::new("\"abc", "<test>").scan_tokens().unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnterminatedString);
    }

    #[test]
    fn string_permits_embedded_newline_and_advances_line() {
        let tokens = Lexer::new("\"a\nb\"", "<test>").scan_tokens().unwrap();
        match &tokens[0].literal {
            Literal::String(s) => assert_eq!(s, "a\nb"),
            other => panic!("expected string literal, got {:?}", other),
        }
    }

    #[test]
    fn number_literal_decodes_to_f64() {
        let tokens = Lexer::new("12.5", "<test>").scan_tokens().unwrap();
        assert_eq!(tokens[0].literal, Literal::Number(12.5));
    }

    #[test]
    fn unexpected_character_is_an_error() {
        let err = Lexer::new("@", "<test>").scan_tokens().unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedChar);
    }

    // concatenating the lexemes of a token stream (joined by a single
    // space) and relexing should yield the same type sequence
    #[test]
    fn round_trip_of_simple_tokens() {
        let src = "var x = 1 + 2 * (3 - 4) / 5 ;";
        let first = scan(src);

        let tokens = Lexer::new(src, "<test>").scan_tokens().unwrap();
        let rebuilt = tokens
            .iter()
            .filter(|t| t.token_type != TokenType::Eof)
            .map(|t| t.lexeme.clone())
            .collect::<Vec<_>>()
            .join(" ");
        let second = scan(&rebuilt);

        assert_eq!(first, second);
    }
}
