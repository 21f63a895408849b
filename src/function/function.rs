use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::class::LoxInstance;
use crate::environment::{Env, Environment};
use crate::error::LoxError;
use crate::evaluator::{Callable, Flow, Interpreter, Value};
use crate::parser::FunctionDecl;

/*
A closure pairs a function declaration with the environment frame that
was active when the declaration was evaluated. Declarations are shared
via `Rc` so methods and plain functions can be cloned cheaply when
bound to an instance (see `bind`) without duplicating the body.
*/
#[derive(Clone, Debug)]
pub struct LoxFunction {
    declaration: Rc<FunctionDecl>,
    closure: Env,
}

impl LoxFunction {
    pub fn new(declaration: Rc<FunctionDecl>, closure: Env) -> Self {
        Self { declaration, closure }
    }

    pub fn name(&self) -> &str {
        &self.declaration.name.lexeme
    }

    /// Returns a new closure whose captured frame is an ephemeral frame
    /// binding `this` to `instance`, chained to the method's original
    /// closure. Ordinary call semantics apply from there on.
    pub fn bind(&self, instance: Rc<RefCell<LoxInstance>>) -> LoxFunction {
        let env = Environment::new_enclosed(&self.closure);
        env.borrow_mut().define("this".to_string(), Value::Instance(instance));
        LoxFunction {
            declaration: Rc::clone(&self.declaration),
            closure: env,
        }
    }
}

impl Callable for LoxFunction {
    fn arity(&self) -> usize {
        self.declaration.params.len()
    }

    fn call(&self, interpreter: &mut Interpreter, arguments: Vec<Value>) -> Result<Value, LoxError> {
        let env = Environment::new_enclosed(&self.closure);
        for (param, arg) in self.declaration.params.iter().zip(arguments.into_iter()) {
            env.borrow_mut().define(param.lexeme.clone(), arg);
        }

        match interpreter.execute_block(&self.declaration.body, env)? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Nil),
        }
    }

    fn describe(&self) -> String {
        format!("<fn {}>", self.name())
    }
}

impl fmt::Display for LoxFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}
