use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use crate::diagnostics::Diagnostics;
use crate::interpreter::Interpreter;
use crate::syntax::{Expr, FunctionExpr, Stmt};
use crate::token::Token;

// Much like we track scopes as we walk the tree, we track whether the code
// currently being visited is inside a function (and which kind), a class
// (and whether it has a superclass), or a loop.
#[derive(Clone, Copy, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
    Initializer,
    Method,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LoopType {
    None,
    Loop,
}

/// The static scope-resolution pass. Walks the same AST the interpreter
/// will later walk and, for every variable reference, records how many
/// enclosing scopes separate it from its declaration — keyed on the
/// address of the referencing `Expr` node itself, via `Interpreter::resolve`.
/// This only works because the parser never clones a `Stmt`/`Expr` once
/// built: the addresses this pass records are the same ones the
/// interpreter dereferences later.
pub struct Resolver<'i, 'd> {
    interpreter: &'i mut Interpreter,
    diagnostics: &'d Diagnostics,
    scopes: Vec<HashMap<Rc<str>, bool>>,
    current_function: FunctionType,
    current_class: ClassType,
    current_loop: LoopType,
}

impl<'i, 'd> Resolver<'i, 'd> {
    pub fn new(interpreter: &'i mut Interpreter, diagnostics: &'d Diagnostics) -> Self {
        Resolver {
            interpreter,
            diagnostics,
            scopes: Vec::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
            current_loop: LoopType::None,
        }
    }

    pub fn resolve_stmts(&mut self, statements: &[Stmt]) {
        for statement in statements {
            self.resolve_stmt(statement);
        }
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    /// Declaration adds the name to the innermost scope, bound to `false`
    /// ("not ready yet") so that a reference inside its own initializer
    /// (`var a = a;`) can be caught.
    fn declare(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            if scope.contains_key(&name.lexeme) {
                self.diagnostics
                    .token_error(name, "Variable with this name already declared in this scope.");
            }
            scope.insert(Rc::clone(&name.lexeme), false);
        }
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(Rc::clone(&name.lexeme), true);
        }
    }

    /// Starts at the innermost scope and works outward, stopping at the
    /// first scope that declares the name — unresolved names are assumed
    /// global, resolved dynamically by the interpreter at call time.
    fn resolve_local(&mut self, expr: &Expr, name: &Token) {
        for (i, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(&name.lexeme) {
                self.interpreter.resolve(expr as *const Expr, i);
                return;
            }
        }
    }

    /// A function body gets its own scope holding its parameters. Loop
    /// context does not extend into a nested function: `break`/`continue`
    /// may not jump out of the function they're textually inside.
    fn resolve_function(&mut self, func: &FunctionExpr, kind: FunctionType) {
        let enclosing_function = mem::replace(&mut self.current_function, kind);
        let enclosing_loop = mem::replace(&mut self.current_loop, LoopType::None);

        self.begin_scope();
        for param in &func.params {
            self.declare(param);
            self.define(param);
        }
        self.resolve_stmts(&func.body);
        self.end_scope();

        self.current_function = enclosing_function;
        self.current_loop = enclosing_loop;
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expression(expr) => self.resolve_expr(expr),
            Stmt::Print(expr) => self.resolve_expr(expr),
            Stmt::Var { name, initializer } => {
                self.declare(name);
                if let Some(init) = initializer {
                    self.resolve_expr(init);
                }
                self.define(name);
            }
            Stmt::Block(statements) => {
                self.begin_scope();
                self.resolve_stmts(statements);
                self.end_scope();
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_stmt(else_branch);
                }
            }
            Stmt::Loop {
                condition,
                body,
                increment,
            } => {
                self.resolve_expr(condition);
                let enclosing_loop = mem::replace(&mut self.current_loop, LoopType::Loop);
                self.resolve_stmt(body);
                self.current_loop = enclosing_loop;
                if let Some(increment) = increment {
                    self.resolve_expr(increment);
                }
            }
            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.diagnostics
                        .token_error(keyword, "Can't return from top-level code.");
                }
                if let Some(value) = value {
                    if self.current_function == FunctionType::Initializer {
                        self.diagnostics
                            .token_error(keyword, "Can't return a value from an initializer.");
                    }
                    self.resolve_expr(value);
                }
            }
            Stmt::Break(keyword) => {
                if self.current_loop == LoopType::None {
                    self.diagnostics
                        .token_error(keyword, "Can't use 'break' outside of a loop.");
                }
            }
            Stmt::Continue(keyword) => {
                if self.current_loop == LoopType::None {
                    self.diagnostics
                        .token_error(keyword, "Can't use 'continue' outside of a loop.");
                }
            }
            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.resolve_class(name, superclass, methods),
        }
    }

    // Whenever `this` is encountered inside a method, it resolves to a
    // "local variable" defined in an implicit scope just outside the
    // method body; `super`, when present, lives in a scope outside that.
    fn resolve_class(&mut self, name: &Token, superclass: &Option<Expr>, methods: &[FunctionExpr]) {
        let enclosing_class = mem::replace(&mut self.current_class, ClassType::Class);

        self.declare(name);
        self.define(name);

        if let Some(superclass_expr) = superclass {
            if let Expr::Variable { name: super_name } = superclass_expr {
                if super_name.lexeme == name.lexeme {
                    self.diagnostics
                        .token_error(super_name, "A class can't inherit from itself.");
                }
            }
            self.current_class = ClassType::Subclass;
            self.resolve_expr(superclass_expr);
            self.begin_scope();
            self.scopes
                .last_mut()
                .expect("scope just pushed")
                .insert("super".into(), true);
        }

        self.begin_scope();
        self.scopes
            .last_mut()
            .expect("scope just pushed")
            .insert("this".into(), true);

        for method in methods {
            let is_initializer = method.name.as_ref().map(|n| &*n.lexeme) == Some("init");
            let kind = if is_initializer {
                FunctionType::Initializer
            } else {
                FunctionType::Method
            };
            self.resolve_function(method, kind);
        }

        self.end_scope();
        if superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing_class;
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) => {}
            Expr::Unary { right, .. } => self.resolve_expr(right),
            Expr::Binary { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expr::Grouping { expression } => self.resolve_expr(expression),
            Expr::Variable { name } => {
                if let Some(scope) = self.scopes.last() {
                    if scope.get(&name.lexeme) == Some(&false) {
                        self.diagnostics
                            .token_error(name, "Can't read local variable in its own initializer.");
                    }
                }
                self.resolve_local(expr, name);
            }
            Expr::Assign { name, value } => {
                self.resolve_expr(value);
                self.resolve_local(expr, name);
            }
            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee);
                for argument in arguments {
                    self.resolve_expr(argument);
                }
            }
            Expr::Get { object, .. } => self.resolve_expr(object),
            Expr::Set { object, value, .. } => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            }
            Expr::This { keyword } => {
                if self.current_class == ClassType::None {
                    self.diagnostics
                        .token_error(keyword, "Can't use 'this' outside of a class.");
                } else {
                    self.resolve_local(expr, keyword);
                }
            }
            Expr::Super { keyword, .. } => {
                match self.current_class {
                    ClassType::None => self
                        .diagnostics
                        .token_error(keyword, "Can't use 'super' outside of a class."),
                    ClassType::Class => self.diagnostics.token_error(
                        keyword,
                        "Can't use 'super' in a class with no superclass.",
                    ),
                    ClassType::Subclass => {}
                }
                self.resolve_local(expr, keyword);
            }
            // A named `fun` expression — whether a top-level/local
            // declaration (`Expression(Function(Some(name)))`) or nested
            // anywhere else — has its own name declared and defined in the
            // current scope *before* its body is resolved, so the function
            // can recursively call itself (spec §4.4).
            Expr::Function(func) => {
                if let Some(name) = &func.name {
                    self.declare(name);
                    self.define(name);
                }
                self.resolve_function(func, FunctionType::Function);
            }
        }
    }
}
