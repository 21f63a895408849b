use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::class::LoxClass;
use crate::environment::{Env, Environment};
use crate::error::{ErrorKind, LoxError};
use crate::evaluator::value::{Callable, Value};
use crate::function::LoxFunction;
use crate::lexer::{Token, TokenType};
use crate::parser::{Expr, ExprKind, NodeId, Stmt};

/*
The evaluator walks the resolved AST directly with `match` on the
ExprKind/Stmt variants instead of going through a visitor interface.
Rust's exhaustive pattern matching already gives the "every variant is
handled" guarantee, so there's no need for an extra trait per node kind.

Two handles into the environment chain are kept: `globals`, the root
frame that survives for the lifetime of one interpreter (shared across
REPL submissions), and `environment`, the active innermost frame. Only
a block/call/method invocation ever swaps `environment`, and it's
always restored before control returns to the caller, on every exit
path including a propagated error or a return.
*/

// the non-local control signal a return statement carries, kept
// distinct from LoxError so only a call site ever interprets it
#[derive(Debug, Clone)]
pub enum Flow {
    Normal,
    Return(Value),
}

pub struct Interpreter {
    pub globals: Env,
    environment: Env,
    locals: HashMap<NodeId, usize>,
    out: Box<dyn Write>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_writer(Box::new(io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write>) -> Self {
        let globals = Environment::new_global();
        globals
            .borrow_mut()
            .define("clock".to_string(), Value::Callable(Rc::new(NativeClock)));
        Self {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
            out,
        }
    }

    // called by the resolver: records that the expression with this id
    // binds `distance` enclosing frames out from wherever it is evaluated.
    // anything never registered here falls back to a global lookup
    pub fn resolve(&mut self, id: NodeId, distance: usize) {
        self.locals.insert(id, distance);
    }

    // runs a whole program, returns the value of the final top-level
    // expression statement if it ends with one. the REPL uses this to
    // echo a bare expression's result
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<Option<Value>, LoxError> {
        let mut last = None;
        for stmt in statements {
            last = match stmt {
                Stmt::Expression(expr) => Some(self.evaluate(expr)?),
                _ => {
                    self.execute(stmt)?;
                    None
                }
            };
        }
        Ok(last)
    }

    fn execute(&mut self, stmt: &Stmt) -> Result<Flow, LoxError> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::Print(expr) => {
                let value = self.evaluate(expr)?;
                writeln!(self.out, "{value}").expect("stdout/writer should not fail");
                Ok(Flow::Normal)
            }
            Stmt::Var { name, initializer } => {
                // install the sentinel first, so a global initializer that
                // reads its own name fails at the read instead of seeing
                // stale state (the resolver only catches this locally)
                self.environment
                    .borrow_mut()
                    .define(name.lexeme.clone(), Value::Uninitialized);
                // no initializer: leave the sentinel in place. a read
                // before the first assignment is UnassignedVariable, not nil
                if let Some(init) = initializer {
                    let value = self.evaluate(init)?;
                    self.environment.borrow_mut().define(name.lexeme.clone(), value);
                }
                Ok(Flow::Normal)
            }
            Stmt::Block(statements) => {
                let env = Environment::new_enclosed(&self.environment);
                self.execute_block(statements, env)
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    match self.execute(body)? {
                        Flow::Normal => {}
                        signal @ Flow::Return(_) => return Ok(signal),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Function(decl) => {
                let function = LoxFunction::new(Rc::clone(decl), Rc::clone(&self.environment));
                self.environment
                    .borrow_mut()
                    .define(decl.name.lexeme.clone(), Value::Callable(Rc::new(function)));
                Ok(Flow::Normal)
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Class { name, methods } => {
                let mut table = HashMap::new();
                for decl in methods {
                    let method = LoxFunction::new(Rc::clone(decl), Rc::clone(&self.environment));
                    table.insert(decl.name.lexeme.clone(), method);
                }
                let class = LoxClass::new(name.lexeme.clone(), table);
                self.environment
                    .borrow_mut()
                    .define(name.lexeme.clone(), Value::Callable(Rc::new(class)));
                Ok(Flow::Normal)
            }
        }
    }

    // executes statements under env, restoring the previous environment
    // handle on every exit path: normal completion, a propagated error,
    // or a return threading through
    pub fn execute_block(&mut self, statements: &[Stmt], env: Env) -> Result<Flow, LoxError> {
        let previous = std::mem::replace(&mut self.environment, env);

        let result = (|| {
            for stmt in statements {
                match self.execute(stmt)? {
                    Flow::Normal => continue,
                    signal @ Flow::Return(_) => return Ok(signal),
                }
            }
            Ok(Flow::Normal)
        })();

        self.environment = previous;
        result
    }

    fn evaluate(&mut self, expr: &Expr) -> Result<Value, LoxError> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(Value::from_literal(literal)),
            ExprKind::Grouping(inner) => self.evaluate(inner),
            ExprKind::Unary { operator, right } => self.evaluate_unary(operator, right),
            ExprKind::Binary { left, operator, right } => self.evaluate_binary(left, operator, right),
            ExprKind::Logical { left, operator, right } => self.evaluate_logical(left, operator, right),
            ExprKind::Variable(name) => self.lookup_variable(expr.id, name),
            ExprKind::This(token) => self.lookup_variable(expr.id, token),
            ExprKind::Assign { name, value } => {
                let value = self.evaluate(value)?;
                self.assign_variable(expr.id, name, value.clone())?;
                Ok(value)
            }
            ExprKind::Call { callee, paren, arguments } => self.evaluate_call(callee, paren, arguments),
            ExprKind::Get { object, name } => {
                let object = self.evaluate(object)?;
                match object {
                    Value::Instance(instance) => {
                        let result = instance.borrow().get(name, Rc::clone(&instance));
                        result
                    }
                    _ => Err(LoxError::at(
                        ErrorKind::NonInstanceProperty,
                        name,
                        "Only instances have properties.",
                    )),
                }
            }
            ExprKind::Set { object, name, value } => {
                let object = self.evaluate(object)?;
                match object {
                    Value::Instance(instance) => {
                        let value = self.evaluate(value)?;
                        instance.borrow_mut().set(name, value.clone());
                        Ok(value)
                    }
                    _ => Err(LoxError::at(
                        ErrorKind::NonInstanceProperty,
                        name,
                        "Only instances have fields.",
                    )),
                }
            }
        }
    }

    fn lookup_variable(&self, id: NodeId, name: &Token) -> Result<Value, LoxError> {
        match self.locals.get(&id) {
            Some(&distance) => Environment::get_at(&self.environment, distance, name),
            None => Environment::get(&self.globals, name),
        }
    }

    fn assign_variable(&mut self, id: NodeId, name: &Token, value: Value) -> Result<(), LoxError> {
        match self.locals.get(&id) {
            Some(&distance) => Environment::assign_at(&self.environment, distance, name, value),
            None => Environment::assign(&self.globals, name, value),
        }
    }

    fn evaluate_unary(&mut self, operator: &Token, right: &Expr) -> Result<Value, LoxError> {
        let right = self.evaluate(right)?;
        match operator.token_type {
            TokenType::Minus => match right {
                Value::Number(n) => Ok(Value::Number(-n)),
                _ => Err(type_error(operator, "Operand must be a number.")),
            },
            TokenType::Bang => Ok(Value::Bool(!right.is_truthy())),
            _ => unreachable!("unary operator restricted to '-' and '!' by the parser"),
        }
    }

    fn evaluate_logical(&mut self, left: &Expr, operator: &Token, right: &Expr) -> Result<Value, LoxError> {
        let left = self.evaluate(left)?;
        match operator.token_type {
            TokenType::Or if left.is_truthy() => Ok(left),
            TokenType::Or => self.evaluate(right),
            TokenType::And if !left.is_truthy() => Ok(left),
            TokenType::And => self.evaluate(right),
            _ => unreachable!("logical operator restricted to 'and'/'or' by the parser"),
        }
    }

    fn evaluate_binary(&mut self, left: &Expr, operator: &Token, right: &Expr) -> Result<Value, LoxError> {
        let left = self.evaluate(left)?;
        let right = self.evaluate(right)?;

        use TokenType::*;
        match operator.token_type {
            Minus => numeric_op(operator, left, right, |a, b| a - b),
            Star => numeric_op(operator, left, right, |a, b| a * b),
            Slash => numeric_op(operator, left, right, |a, b| a / b),
            Plus => match (left, right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::String(a), Value::String(b)) => {
                    Ok(Value::String(Rc::from(format!("{a}{b}").as_str())))
                }
                _ => Err(type_error(operator, "Operands must be two numbers or two strings.")),
            },
            Greater => numeric_cmp(operator, left, right, |a, b| a > b),
            GreaterEqual => numeric_cmp(operator, left, right, |a, b| a >= b),
            Less => numeric_cmp(operator, left, right, |a, b| a < b),
            LessEqual => numeric_cmp(operator, left, right, |a, b| a <= b),
            BangEqual => Ok(Value::Bool(left != right)),
            EqualEqual => Ok(Value::Bool(left == right)),
            _ => unreachable!("binary operator set is fixed by the parser"),
        }
    }

    fn evaluate_call(&mut self, callee: &Expr, paren: &Token, arguments: &[Expr]) -> Result<Value, LoxError> {
        let callee = self.evaluate(callee)?;

        let callable = match callee {
            Value::Callable(c) => c,
            _ => {
                return Err(LoxError::at(
                    ErrorKind::InvalidCall,
                    paren,
                    "Can only call functions and classes.",
                ));
            }
        };

        if arguments.len() != callable.arity() {
            return Err(LoxError::at(
                ErrorKind::InvalidArity,
                paren,
                format!("Expected {} arguments but got {}.", callable.arity(), arguments.len()),
            ));
        }

        // arity is already settled against the syntactic argument count
        // above, so arguments only get evaluated (left-to-right, with
        // whatever side effects they carry) once the call is known-valid
        let mut args = Vec::with_capacity(arguments.len());
        for arg in arguments {
            args.push(self.evaluate(arg)?);
        }

        callable.call(self, args)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn type_error(operator: &Token, message: &str) -> LoxError {
    LoxError::at(ErrorKind::RuntimeError, operator, message)
}

fn numeric_op(
    operator: &Token,
    left: Value,
    right: Value,
    op: impl FnOnce(f64, f64) -> f64,
) -> Result<Value, LoxError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(op(a, b))),
        _ => Err(type_error(operator, "Operands must be numbers.")),
    }
}

fn numeric_cmp(
    operator: &Token,
    left: Value,
    right: Value,
    op: impl FnOnce(f64, f64) -> bool,
) -> Result<Value, LoxError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(op(a, b))),
        _ => Err(type_error(operator, "Operands must be numbers.")),
    }
}

// the sole standard-library builtin: arity 0, returns wall-clock
// seconds since the Unix epoch as a float
#[derive(Debug)]
struct NativeClock;

impl Callable for NativeClock {
    fn arity(&self) -> usize {
        0
    }

    fn call(&self, _interpreter: &mut Interpreter, _arguments: Vec<Value>) -> Result<Value, LoxError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock should postdate the Unix epoch");
        Ok(Value::Number(now.as_secs_f64()))
    }

    fn describe(&self) -> String {
        "<native fn>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::resolver::Resolver;
    use std::cell::RefCell as StdRefCell;

    // a Write sink backed by a shared buffer, so tests can assert on
    // captured print output after the interpreter (which owns the boxed
    // writer) has run
    #[derive(Clone, Default)]
    struct SharedBuffer(Rc<StdRefCell<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn run(src: &str) -> (String, Option<Value>) {
        let tokens = Lexer::new(src, "<test>").scan_tokens().unwrap();
        let statements = Parser::new(tokens).parse().unwrap();

        let buffer = SharedBuffer::default();
        let mut interpreter = Interpreter::with_writer(Box::new(buffer.clone()));
        let mut resolver = Resolver::new(&mut interpreter);
        resolver.resolve(&statements).unwrap();

        let result = interpreter.interpret(&statements).unwrap();
        let output = String::from_utf8(buffer.0.borrow().clone()).unwrap();
        (output, result)
    }

    #[test]
    fn arithmetic_precedence() {
        let (_out, value) = run("1 + 2 * 3;");
        assert_eq!(value, Some(Value::Number(7.0)));
    }

    #[test]
    fn string_concatenation() {
        let (_out, value) = run("\"hi\" + \" there\";");
        assert_eq!(value, Some(Value::String(Rc::from("hi there"))));
    }

    #[test]
    fn closures_capture_frames_not_values() {
        let src = "fun mk(n) { fun add(x) { return x + n; } return add; } var a = mk(10); a(5);";
        let (_out, value) = run(src);
        assert_eq!(value, Some(Value::Number(15.0)));
    }

    #[test]
    fn blocks_shadow_and_restore_outer_binding() {
        let src = "var a = \"g\"; { var a = \"l\"; } a;";
        let (_out, value) = run(src);
        assert_eq!(value, Some(Value::String(Rc::from("g"))));
    }

    #[test]
    fn print_statement_writes_stringified_value() {
        let (out, _value) = run("print 1 + 1;");
        assert_eq!(out, "2\n");
    }

    #[test]
    fn classes_store_fields_and_bind_methods() {
        let src = r#"
            class Counter {
                bump() { this.n = this.n + 1; return this.n; }
            }
            var c = Counter();
            c.n = 0;
            c.bump();
            c.bump();
        "#;
        let (_out, value) = run(src);
        assert_eq!(value, Some(Value::Number(2.0)));
    }

    #[test]
    fn type_error_on_string_minus_number() {
        let tokens = Lexer::new("\"a\" - 1;", "<test>").scan_tokens().unwrap();
        let statements = Parser::new(tokens).parse().unwrap();
        let mut interpreter = Interpreter::new();
        let mut resolver = Resolver::new(&mut interpreter);
        resolver.resolve(&statements).unwrap();
        let err = interpreter.interpret(&statements).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RuntimeError);
    }

    #[test]
    fn invalid_call_on_non_callable() {
        let tokens = Lexer::new("1();", "<test>").scan_tokens().unwrap();
        let statements = Parser::new(tokens).parse().unwrap();
        let mut interpreter = Interpreter::new();
        let mut resolver = Resolver::new(&mut interpreter);
        resolver.resolve(&statements).unwrap();
        let err = interpreter.interpret(&statements).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidCall);
    }

    #[test]
    fn arity_mismatch_is_invalid_arity() {
        let tokens = Lexer::new("fun f() {} f(1);", "<test>").scan_tokens().unwrap();
        let statements = Parser::new(tokens).parse().unwrap();
        let mut interpreter = Interpreter::new();
        let mut resolver = Resolver::new(&mut interpreter);
        resolver.resolve(&statements).unwrap();
        let err = interpreter.interpret(&statements).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArity);
    }

    // callee and arity are checked against the syntactic argument count
    // before any argument expression runs, so a non-callable or a wrong
    // arity count must fail before printing anything an argument would do
    #[test]
    fn invalid_call_does_not_evaluate_arguments_first() {
        let tokens = Lexer::new("1(print(\"should not run\"));", "<test>")
            .scan_tokens()
            .unwrap();
        let statements = Parser::new(tokens).parse().unwrap();
        let buffer = SharedBuffer::default();
        let mut interpreter = Interpreter::with_writer(Box::new(buffer.clone()));
        let mut resolver = Resolver::new(&mut interpreter);
        resolver.resolve(&statements).unwrap();
        let err = interpreter.interpret(&statements).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidCall);
        assert!(buffer.0.borrow().is_empty());
    }

    #[test]
    fn arity_mismatch_does_not_evaluate_arguments_first() {
        let tokens = Lexer::new("fun f() {} f(print(\"should not run\"));", "<test>")
            .scan_tokens()
            .unwrap();
        let statements = Parser::new(tokens).parse().unwrap();
        let buffer = SharedBuffer::default();
        let mut interpreter = Interpreter::with_writer(Box::new(buffer.clone()));
        let mut resolver = Resolver::new(&mut interpreter);
        resolver.resolve(&statements).unwrap();
        let err = interpreter.interpret(&statements).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArity);
        assert!(buffer.0.borrow().is_empty());
    }

    #[test]
    fn short_circuit_or_skips_right_side_call() {
        let src = "fun boom() { return boom(); } true or boom();";
        let (_out, value) = run(src);
        assert_eq!(value, Some(Value::Bool(true)));
    }

    #[test]
    fn environment_handle_is_restored_after_error() {
        let src = "var x = 1; { var y = x - \"a\"; }";
        let tokens = Lexer::new(src, "<test>").scan_tokens().unwrap();
        let statements = Parser::new(tokens).parse().unwrap();
        let mut interpreter = Interpreter::new();
        let mut resolver = Resolver::new(&mut interpreter);
        resolver.resolve(&statements).unwrap();
        let before = Rc::as_ptr(&interpreter.environment);
        let _ = interpreter.interpret(&statements);
        let after = Rc::as_ptr(&interpreter.environment);
        assert_eq!(before, after);
    }
}
