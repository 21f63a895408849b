pub mod class;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod function;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod runner;

pub use error::{ErrorKind, LoxError};
pub use evaluator::{Interpreter, Value};

use lexer::Lexer;
use parser::Parser;
use resolver::Resolver;

// which phase of the pipeline rejected a program. each variant wraps
// that phase's native error value(s) so a caller can match on .kind()
// without caring whether it was one bad character, one bad token, or
// one unresolved name
#[derive(Debug)]
pub enum RunError {
    Lex(LoxError),
    Parse(Vec<LoxError>),
    Resolve(LoxError),
    Runtime(LoxError),
}

impl RunError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunError::Lex(e) | RunError::Resolve(e) | RunError::Runtime(e) => e.kind,
            RunError::Parse(errs) => errs.first().expect("Parser::parse never returns an empty Err").kind,
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Lex(e) | RunError::Resolve(e) | RunError::Runtime(e) => write!(f, "{e}"),
            RunError::Parse(errs) => {
                for (i, e) in errs.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{e}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for RunError {}

// lexes, parses, resolves, and evaluates one chunk of source against an
// existing interpreter. a REPL reuses the same Interpreter across calls
// since global state (variables, functions, classes) must persist
// between lines; a one-shot file run just constructs a fresh one first
pub fn run_source(interpreter: &mut Interpreter, source: &str, file: &str) -> Result<Option<Value>, RunError> {
    let tokens = Lexer::new(source, file).scan_tokens().map_err(RunError::Lex)?;
    let statements = Parser::new(tokens).parse().map_err(RunError::Parse)?;

    {
        let mut resolver = Resolver::new(interpreter);
        resolver.resolve(&statements).map_err(RunError::Resolve)?;
    }

    interpreter.interpret(&statements).map_err(RunError::Runtime)
}
