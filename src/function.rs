use std::rc::Rc;

use crate::environment::{EnvRef, Environment};
use crate::syntax::Stmt;
use crate::token::Token;
use crate::value::Value;

/// The name/params/body a `Function` closes over. Shared via `Rc` across
/// every rebind of a method so that `LoxInstance::get` never clones an AST
/// subtree — only the `Rc` pointer — when it returns a bound method.
pub struct FunctionDecl {
    pub name: Option<Token>,
    pub params: Vec<Token>,
    pub body: Rc<[Stmt]>,
    pub is_initializer: bool,
}

/// A callable Lox function or method: a declaration plus the environment
/// captured at its definition site (its closure).
pub struct LoxFunction {
    pub decl: Rc<FunctionDecl>,
    pub closure: EnvRef,
}

impl LoxFunction {
    pub fn new(decl: Rc<FunctionDecl>, closure: EnvRef) -> Self {
        LoxFunction { decl, closure }
    }

    pub fn arity(&self) -> usize {
        self.decl.params.len()
    }

    pub fn name(&self) -> &str {
        self.decl
            .name
            .as_ref()
            .map(|t| &*t.lexeme)
            .unwrap_or("anonymous")
    }

    pub fn is_initializer(&self) -> bool {
        self.decl.is_initializer
    }

    /// Nests a fresh environment inside this method's original closure and
    /// binds `this`. Sharing `decl` means this is one `Rc` clone, not a
    /// re-parse or a body copy.
    pub fn bind(&self, instance: Value) -> LoxFunction {
        let env = Environment::with_enclosing(&self.closure);
        env.borrow_mut().define("this".into(), instance);
        LoxFunction {
            decl: Rc::clone(&self.decl),
            closure: env,
        }
    }

    /// A fresh environment for one call, parented on the closure rather
    /// than on whatever environment happens to be active at the call site
    /// — this is what makes closures capture their defining scope.
    pub fn call_environment(&self, arguments: &[Value]) -> EnvRef {
        let env = Environment::with_enclosing(&self.closure);
        for (param, argument) in self.decl.params.iter().zip(arguments.iter()) {
            env.borrow_mut()
                .define(Rc::clone(&param.lexeme), argument.clone());
        }
        env
    }
}
