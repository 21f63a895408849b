use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{ErrorKind, LoxError};
use crate::evaluator::Value;
use crate::lexer::Token;

/*
Environments form a singly linked chain of frames: each frame owns a
name-to-value map and an optional link to its enclosing frame. Frames
are reference-counted (`Rc<RefCell<_>>`) rather than owned (`Box`)
because closures alias them. A function captures the frame chain live
at its creation point, and that alias must stay valid even after the
block that created the frame has exited. Cloning a frame chain would
silently break every closure captured against it, so `Env` is always
shared, never deep-copied.
*/

pub type Env = Rc<RefCell<Environment>>;

#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<Env>,
}

impl Environment {
    pub fn new_global() -> Env {
        Rc::new(RefCell::new(Environment {
            values: HashMap::new(),
            enclosing: None,
        }))
    }

    pub fn new_enclosed(enclosing: &Env) -> Env {
        log::debug!("environment: new frame enclosed");
        Rc::new(RefCell::new(Environment {
            values: HashMap::new(),
            enclosing: Some(Rc::clone(enclosing)),
        }))
    }

    pub fn define(&mut self, name: String, value: Value) {
        self.values.insert(name, value);
    }

    fn ancestor(env: &Env, distance: usize) -> Env {
        let mut current = Rc::clone(env);
        for _ in 0..distance {
            let next = current
                .borrow()
                .enclosing
                .as_ref()
                .expect("resolver-computed distance must stay within the frame chain")
                .clone();
            current = next;
        }
        current
    }

    // walks enclosing links to the global frame. only for unresolved
    // (global) references, the evaluator never chain-walks a resolved local
    pub fn get(env: &Env, name: &Token) -> Result<Value, LoxError> {
        if let Some(value) = env.borrow().values.get(&name.lexeme) {
            return checked(value.clone(), name);
        }
        let enclosing = env.borrow().enclosing.clone();
        match enclosing {
            Some(parent) => Environment::get(&parent, name),
            None => Err(LoxError::at(
                ErrorKind::UndefinedVariable,
                name,
                format!("Undefined variable '{}'.", name.lexeme),
            )),
        }
    }

    /// Ascends `distance` enclosing links, then looks up in that frame
    /// only. Used for every variable the resolver managed to bind.
    pub fn get_at(env: &Env, distance: usize, name: &Token) -> Result<Value, LoxError> {
        let frame = Environment::ancestor(env, distance);
        let value = frame.borrow().values.get(&name.lexeme).cloned();
        match value {
            Some(v) => checked(v, name),
            None => Err(LoxError::at(
                ErrorKind::UndefinedVariable,
                name,
                format!("Undefined variable '{}'.", name.lexeme),
            )),
        }
    }

    pub fn assign(env: &Env, name: &Token, value: Value) -> Result<(), LoxError> {
        if env.borrow().values.contains_key(&name.lexeme) {
            env.borrow_mut().values.insert(name.lexeme.clone(), value);
            return Ok(());
        }
        let enclosing = env.borrow().enclosing.clone();
        match enclosing {
            Some(parent) => Environment::assign(&parent, name, value),
            None => Err(LoxError::at(
                ErrorKind::UndefinedVariable,
                name,
                format!("Undefined variable '{}'.", name.lexeme),
            )),
        }
    }

    pub fn assign_at(env: &Env, distance: usize, name: &Token, value: Value) -> Result<(), LoxError> {
        let frame = Environment::ancestor(env, distance);
        frame.borrow_mut().values.insert(name.lexeme.clone(), value);
        Ok(())
    }
}

fn checked(value: Value, name: &Token) -> Result<Value, LoxError> {
    match value {
        Value::Uninitialized => Err(LoxError::at(
            ErrorKind::UnassignedVariable,
            name,
            format!("Variable '{}' used before it was assigned.", name.lexeme),
        )),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{Literal, TokenType};

    fn tok(name: &str) -> Token {
        Token::new(
            TokenType::Identifier,
            name.to_string(),
            Literal::Nil,
            "<test>".to_string(),
            1,
            1,
        )
    }

    #[test]
    fn shadowing_resolves_to_innermost_frame() {
        let global = Environment::new_global();
        global.borrow_mut().define("x".to_string(), Value::Number(1.0));

        let inner = Environment::new_enclosed(&global);
        inner.borrow_mut().define("x".to_string(), Value::Number(2.0));

        assert_eq!(Environment::get_at(&inner, 0, &tok("x")).unwrap(), Value::Number(2.0));
        assert_eq!(Environment::get_at(&inner, 1, &tok("x")).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn assign_mutates_through_closure_alias() {
        let global = Environment::new_global();
        global.borrow_mut().define("x".to_string(), Value::Number(1.0));

        let alias = Rc::clone(&global);
        Environment::assign(&alias, &tok("x"), Value::Number(42.0)).unwrap();

        assert_eq!(Environment::get(&global, &tok("x")).unwrap(), Value::Number(42.0));
    }

    #[test]
    fn undefined_variable_is_an_error() {
        let global = Environment::new_global();
        let err = Environment::get(&global, &tok("missing")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UndefinedVariable);
    }

    #[test]
    fn reading_uninitialized_sentinel_is_unassigned_variable() {
        let global = Environment::new_global();
        global.borrow_mut().define("a".to_string(), Value::Uninitialized);
        let err = Environment::get(&global, &tok("a")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnassignedVariable);
    }
}
