use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::function::LoxFunction;
use crate::token::Token;
use crate::value::Value;

/// The class stores behavior; `LoxInstance` stores state. `methods` holds
/// unbound functions — `find_method` walks the superclass chain and the
/// caller (`LoxInstance::get`) binds the result to the accessing instance.
pub struct LoxClass {
    pub name: Rc<str>,
    pub superclass: Option<Rc<LoxClass>>,
    pub methods: HashMap<Rc<str>, Rc<LoxFunction>>,
}

impl LoxClass {
    pub fn find_method(&self, name: &str) -> Option<Rc<LoxFunction>> {
        if let Some(method) = self.methods.get(name) {
            return Some(Rc::clone(method));
        }
        self.superclass.as_ref()?.find_method(name)
    }

    pub fn arity(&self) -> usize {
        self.find_method("init").map(|f| f.arity()).unwrap_or(0)
    }
}

/// Lox instances are loose bags of data: fields are never declared ahead
/// of time, so `set` never needs to check whether the key already exists.
pub struct LoxInstance {
    pub class: Rc<LoxClass>,
    fields: HashMap<Rc<str>, Value>,
}

impl LoxInstance {
    pub fn new(class: Rc<LoxClass>) -> Rc<RefCell<LoxInstance>> {
        Rc::new(RefCell::new(LoxInstance {
            class,
            fields: HashMap::new(),
        }))
    }

    /// Field lookup takes precedence over methods — shadowing a method
    /// name with an instance field is legal, if unusual, Lox.
    pub fn get(this: &Rc<RefCell<LoxInstance>>, name: &Token) -> Result<Value, RuntimeError> {
        if let Some(value) = this.borrow().fields.get(&name.lexeme) {
            return Ok(value.clone());
        }

        let method = this.borrow().class.find_method(&name.lexeme);
        if let Some(method) = method {
            let bound = method.bind(Value::Instance(Rc::clone(this)));
            return Ok(Value::Function(Rc::new(bound)));
        }

        Err(RuntimeError::new(
            name,
            format!("Undefined property '{}'.", name.lexeme),
        ))
    }

    pub fn set(&mut self, name: &Token, value: Value) {
        self.fields.insert(Rc::clone(&name.lexeme), value);
    }
}
