use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{ErrorKind, LoxError};
use crate::evaluator::{Callable, Interpreter, Value};
use crate::function::LoxFunction;
use crate::lexer::Token;

/*
The class system here is deliberately minimal: no inheritance (`super`
is reserved but never implemented), no constructor arguments. `class C
{}` followed by `C()` always yields a fresh instance with an empty field
map. Methods are plain closures over the scope the class was declared
in, looked up by name in a flat table.
*/
#[derive(Debug)]
pub struct LoxClass {
    name: String,
    methods: HashMap<String, LoxFunction>,
}

impl LoxClass {
    pub fn new(name: String, methods: HashMap<String, LoxFunction>) -> Self {
        Self { name, methods }
    }

    pub fn find_method(&self, name: &str) -> Option<LoxFunction> {
        self.methods.get(name).cloned()
    }
}

impl Callable for LoxClass {
    fn arity(&self) -> usize {
        0
    }

    fn call(&self, _interpreter: &mut Interpreter, _arguments: Vec<Value>) -> Result<Value, LoxError> {
        let instance = LoxInstance::new(self);
        Ok(Value::Instance(Rc::new(RefCell::new(instance))))
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

impl fmt::Display for LoxClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

// the instance keeps its own copy of the method table at construction
// rather than a link back to an Rc<LoxClass>. classes are immutable once
// declared, so cloning the table (cheap, it clones LoxFunctions, not
// their bodies) costs nothing observable
#[derive(Debug)]
pub struct LoxInstance {
    class_name: String,
    methods: Rc<HashMap<String, LoxFunction>>,
    fields: HashMap<String, Value>,
}

impl LoxInstance {
    fn new(class: &LoxClass) -> Self {
        LoxInstance {
            class_name: class.name.clone(),
            methods: Rc::new(class.methods.clone()),
            fields: HashMap::new(),
        }
    }

    pub fn get(&self, name: &Token, this: Rc<RefCell<LoxInstance>>) -> Result<Value, LoxError> {
        if let Some(value) = self.fields.get(&name.lexeme) {
            return Ok(value.clone());
        }

        if let Some(method) = self.methods.get(&name.lexeme) {
            let bound = method.bind(this);
            return Ok(Value::Callable(Rc::new(bound)));
        }

        Err(LoxError::at(
            ErrorKind::UndefinedProperty,
            name,
            format!("Undefined property '{}'.", name.lexeme),
        ))
    }

    pub fn set(&mut self, name: &Token, value: Value) {
        self.fields.insert(name.lexeme.clone(), value);
    }

    pub fn describe(&self) -> String {
        format!("{} instance", self.class_name)
    }
}
