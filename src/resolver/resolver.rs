use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{ErrorKind, LoxError};
use crate::evaluator::Interpreter;
use crate::lexer::Token;
use crate::parser::{Expr, ExprKind, FunctionDecl, NodeId, Stmt};

/*
The resolver is a static pass over the same AST the evaluator walks
later. It never executes anything, it just computes, for every
variable reference, how many enclosing block/function scopes separate
it from its declaration. That distance gets recorded against the
interpreter's side table keyed by the expression's NodeId, so the
evaluator can jump straight to the right frame instead of walking the
chain and hoping the first match by name is the right one (which
breaks under shadowing).

Only local scopes are tracked on `scopes`. The global scope is never
pushed here, so a name that isn't found in any tracked scope is left
unresolved and the evaluator's fallback (Environment::get, walking
from globals) handles it. The resolver doesn't know or care what's in
the global frame, only what's nested inside the function/block
structure it's currently walking.
*/

#[derive(Clone, Copy, PartialEq)]
enum FunctionKind {
    None,
    Function,
    Method,
}

pub struct Resolver<'a> {
    interpreter: &'a mut Interpreter,
    scopes: Vec<HashMap<String, bool>>,
    current_function: FunctionKind,
}

impl<'a> Resolver<'a> {
    pub fn new(interpreter: &'a mut Interpreter) -> Self {
        Self {
            interpreter,
            scopes: Vec::new(),
            current_function: FunctionKind::None,
        }
    }

    // stops at the first error: a resolver error means the program
    // never runs at all, so there's nothing to gain from collecting more
    pub fn resolve(&mut self, statements: &[Stmt]) -> Result<(), LoxError> {
        for stmt in statements {
            self.resolve_stmt(stmt)?;
        }
        Ok(())
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &Token) -> Result<(), LoxError> {
        if let Some(scope) = self.scopes.last_mut() {
            if scope.contains_key(&name.lexeme) {
                return Err(LoxError::at(
                    ErrorKind::NameAlreadyDefined,
                    name,
                    format!("Already a variable named '{}' in this scope.", name.lexeme),
                ));
            }
            scope.insert(name.lexeme.clone(), false);
        }
        Ok(())
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), true);
        }
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) -> Result<(), LoxError> {
        match stmt {
            Stmt::Expression(expr) => self.resolve_expr(expr),
            Stmt::Print(expr) => self.resolve_expr(expr),
            Stmt::Var { name, initializer } => {
                self.declare(name)?;
                if let Some(init) = initializer {
                    self.resolve_expr(init)?;
                }
                self.define(name);
                Ok(())
            }
            Stmt::Block(statements) => {
                self.begin_scope();
                let result = self.resolve(statements);
                self.end_scope();
                result
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition)?;
                self.resolve_stmt(then_branch)?;
                if let Some(branch) = else_branch {
                    self.resolve_stmt(branch)?;
                }
                Ok(())
            }
            Stmt::While { condition, body } => {
                self.resolve_expr(condition)?;
                self.resolve_stmt(body)
            }
            Stmt::Function(decl) => {
                self.declare(&decl.name)?;
                self.define(&decl.name);
                self.resolve_function(decl, FunctionKind::Function)
            }
            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionKind::None {
                    return Err(LoxError::at(
                        ErrorKind::ReturnOutsideFunc,
                        keyword,
                        "Can't return from top-level code.",
                    ));
                }
                if let Some(value) = value {
                    self.resolve_expr(value)?;
                }
                Ok(())
            }
            Stmt::Class { name, methods } => {
                self.declare(name)?;
                self.define(name);
                for method in methods {
                    self.begin_scope();
                    self.scopes
                        .last_mut()
                        .expect("scope just pushed")
                        .insert("this".to_string(), true);
                    self.resolve_function(method, FunctionKind::Method)?;
                    self.end_scope();
                }
                Ok(())
            }
        }
    }

    fn resolve_function(&mut self, decl: &Rc<FunctionDecl>, kind: FunctionKind) -> Result<(), LoxError> {
        let enclosing = std::mem::replace(&mut self.current_function, kind);
        self.begin_scope();
        for param in &decl.params {
            self.declare(param)?;
            self.define(param);
        }
        let result = self.resolve(&decl.body);
        self.end_scope();
        self.current_function = enclosing;
        result
    }

    fn resolve_expr(&mut self, expr: &Expr) -> Result<(), LoxError> {
        match &expr.kind {
            ExprKind::Literal(_) => Ok(()),
            ExprKind::Grouping(inner) => self.resolve_expr(inner),
            ExprKind::Unary { right, .. } => self.resolve_expr(right),
            ExprKind::Binary { left, right, .. } => {
                self.resolve_expr(left)?;
                self.resolve_expr(right)
            }
            ExprKind::Logical { left, right, .. } => {
                self.resolve_expr(left)?;
                self.resolve_expr(right)
            }
            ExprKind::Variable(name) => {
                if let Some(scope) = self.scopes.last() {
                    if scope.get(&name.lexeme) == Some(&false) {
                        return Err(LoxError::at(
                            ErrorKind::SelfInitialization,
                            name,
                            "Can't read local variable in its own initializer.",
                        ));
                    }
                }
                self.resolve_local(expr.id, name);
                Ok(())
            }
            ExprKind::This(token) => {
                if self.current_function != FunctionKind::Method {
                    return Err(LoxError::at(
                        ErrorKind::ThisOutsideMethod,
                        token,
                        "Can't use 'this' outside of a method.",
                    ));
                }
                self.resolve_local(expr.id, token);
                Ok(())
            }
            ExprKind::Assign { name, value } => {
                self.resolve_expr(value)?;
                self.resolve_local(expr.id, name);
                Ok(())
            }
            ExprKind::Call { callee, arguments, .. } => {
                self.resolve_expr(callee)?;
                for arg in arguments {
                    self.resolve_expr(arg)?;
                }
                Ok(())
            }
            ExprKind::Get { object, .. } => self.resolve_expr(object),
            ExprKind::Set { object, value, .. } => {
                self.resolve_expr(object)?;
                self.resolve_expr(value)
            }
        }
    }

    fn resolve_local(&mut self, id: NodeId, name: &Token) {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(&name.lexeme) {
                self.interpreter.resolve(id, depth);
                return;
            }
        }
        // Not found in any tracked local scope: left unresolved, so the
        // evaluator falls back to a global lookup.
    }
}
