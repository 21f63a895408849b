use std::fmt;

use crate::lexer::Token;

// one tag per failure mode a phase of the pipeline can produce, kept as
// a single closed enum rather than one per phase so every layer reports
// through the same format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    // Lexer
    UnexpectedChar,
    UnterminatedString,

    // Parser
    UnfinishedExpression,
    InvalidAssignment,
    ArgumentLimitExceeded,
    ParamLimitExceeded,
    InvalidParamName,

    // Resolver
    NameAlreadyDefined,
    SelfInitialization,
    ReturnOutsideFunc,
    ThisOutsideMethod,

    // Evaluator
    UndefinedVariable,
    UnassignedVariable,
    InvalidCall,
    InvalidArity,
    NonInstanceProperty,
    UndefinedProperty,
    RuntimeError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// 1-based line and column, mirroring the token locations they're derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub line: usize,
    pub col: usize,
}

// one error value shared by every phase: lexer, parser, resolver, and
// evaluator all construct LoxError rather than rolling their own type,
// so a REPL or file runner has exactly one format to print
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoxError {
    pub kind: ErrorKind,
    pub location: Location,
    pub message: String,
}

impl LoxError {
    pub fn new(kind: ErrorKind, location: Location, message: impl Into<String>) -> Self {
        Self {
            kind,
            location,
            message: message.into(),
        }
    }

    // anchored to a token's position, the common case: nearly every error
    // in the parser, resolver, and evaluator is tied to the token that
    // triggered it
    pub fn at(kind: ErrorKind, token: &Token, message: impl Into<String>) -> Self {
        Self::new(
            kind,
            Location {
                file: token.file.clone(),
                line: token.line,
                col: token.col,
            },
            message,
        )
    }
}

impl fmt::Display for LoxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ERR '{}': {}:{}:{}: {}",
            self.kind, self.location.file, self.location.line, self.location.col, self.message
        )
    }
}

impl std::error::Error for LoxError {}
