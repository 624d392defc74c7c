use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::token::Token;
use crate::value::Value;

/// A single scope frame: a name→value map plus an optional parent pointer.
/// Every `Function` value captures the environment active at its
/// definition site by cloning this `Rc`, which is what makes closures
/// share mutable state with their defining scope rather than snapshot it.
pub struct Environment {
    values: HashMap<Rc<str>, Value>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

pub type EnvRef = Rc<RefCell<Environment>>;

impl Environment {
    pub fn new() -> EnvRef {
        Rc::new(RefCell::new(Environment {
            values: HashMap::new(),
            enclosing: None,
        }))
    }

    pub fn with_enclosing(enclosing: &EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Environment {
            values: HashMap::new(),
            enclosing: Some(Rc::clone(enclosing)),
        }))
    }

    /// Insertion always establishes a binding, shadowing anything of the
    /// same name already visible from an enclosing scope (I4 in spec.md §3).
    pub fn define(&mut self, name: Rc<str>, value: Value) {
        self.values.insert(name, value);
    }

    pub fn get(&self, name: &Token) -> Result<Value, RuntimeError> {
        if let Some(value) = self.values.get(&name.lexeme) {
            return Ok(value.clone());
        }
        if let Some(enclosing) = &self.enclosing {
            return enclosing.borrow().get(name);
        }
        Err(RuntimeError::new(
            name,
            format!("Undefined variable '{}'.", name.lexeme),
        ))
    }

    /// Assignment walks the chain upward looking for an *existing* binding;
    /// it never creates a new one (I4).
    pub fn assign(&mut self, name: &Token, value: Value) -> Result<(), RuntimeError> {
        if self.values.contains_key(&name.lexeme) {
            self.values.insert(Rc::clone(&name.lexeme), value);
            return Ok(());
        }
        if let Some(enclosing) = &self.enclosing {
            return enclosing.borrow_mut().assign(name, value);
        }
        Err(RuntimeError::new(
            name,
            format!("Undefined variable '{}'.", name.lexeme),
        ))
    }

    /// Walk exactly `distance` enclosing links, as resolved ahead of time by
    /// the resolver, giving O(1) variable lookup instead of a name search.
    fn ancestor(env: &EnvRef, distance: usize) -> EnvRef {
        let mut current = Rc::clone(env);
        for _ in 0..distance {
            let parent = current
                .borrow()
                .enclosing
                .as_ref()
                .expect("resolver-computed depth must stay within the environment chain")
                .clone();
            current = parent;
        }
        current
    }

    pub fn get_at(env: &EnvRef, distance: usize, name: &Token) -> Result<Value, RuntimeError> {
        let target = Self::ancestor(env, distance);
        let value = target.borrow().values.get(&name.lexeme).cloned();
        value.ok_or_else(|| {
            RuntimeError::new(name, format!("Undefined variable '{}'.", name.lexeme))
        })
    }

    /// Same lookup, but by raw name rather than a `Token` — used to fetch
    /// the synthetic `this`/`super` bindings the resolver introduces.
    pub fn get_at_named(env: &EnvRef, distance: usize, name: &str) -> Option<Value> {
        let target = Self::ancestor(env, distance);
        let value = target.borrow().values.get(name).cloned();
        value
    }

    pub fn assign_at(
        env: &EnvRef,
        distance: usize,
        name: &Token,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let target = Self::ancestor(env, distance);
        target.borrow_mut().values.insert(Rc::clone(&name.lexeme), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;

    fn tok(name: &str) -> Token {
        Token::new(TokenType::Identifier, name, 1)
    }

    #[test]
    fn shadowing_resolves_to_innermost_binding() {
        let globals = Environment::new();
        globals.borrow_mut().define("x".into(), Value::Number(1.0));
        let inner = Environment::with_enclosing(&globals);
        inner.borrow_mut().define("x".into(), Value::Number(2.0));

        match inner.borrow().get(&tok("x")).unwrap() {
            Value::Number(n) => assert_eq!(n, 2.0),
            _ => panic!("expected number"),
        }
    }

    #[test]
    fn assign_walks_up_to_the_defining_scope() {
        let globals = Environment::new();
        globals.borrow_mut().define("x".into(), Value::Number(1.0));
        let inner = Environment::with_enclosing(&globals);

        inner.borrow_mut().assign(&tok("x"), Value::Number(9.0)).unwrap();
        match globals.borrow().get(&tok("x")).unwrap() {
            Value::Number(n) => assert_eq!(n, 9.0),
            _ => panic!("expected number"),
        }
    }

    #[test]
    fn assign_to_undefined_variable_is_a_runtime_error() {
        let globals = Environment::new();
        assert!(globals.borrow_mut().assign(&tok("x"), Value::Nil).is_err());
    }

    #[test]
    fn get_at_jumps_directly_to_the_resolved_depth() {
        let globals = Environment::new();
        globals.borrow_mut().define("x".into(), Value::Number(1.0));
        let a = Environment::with_enclosing(&globals);
        let b = Environment::with_enclosing(&a);
        b.borrow_mut().define("x".into(), Value::Number(2.0));

        match Environment::get_at(&b, 0, &tok("x")).unwrap() {
            Value::Number(n) => assert_eq!(n, 2.0),
            _ => panic!(),
        }
        match Environment::get_at(&b, 2, &tok("x")).unwrap() {
            Value::Number(n) => assert_eq!(n, 1.0),
            _ => panic!(),
        }
    }
}
