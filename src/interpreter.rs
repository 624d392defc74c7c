use std::collections::HashMap;
use std::mem;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::class::{LoxClass, LoxInstance};
use crate::control_flow::ControlFlow;
use crate::diagnostics::Diagnostics;
use crate::environment::{EnvRef, Environment};
use crate::error::RuntimeError;
use crate::function::{FunctionDecl, LoxFunction};
use crate::syntax::{Expr, FunctionExpr, Stmt};
use crate::token::{Token, TokenType};
use crate::value::{stringify, CallTarget, NativeFunction, Value};

/// The tree-walking evaluator. `locals` is the side-table the resolver
/// fills in ahead of time, keyed on the address of the `Expr` node that
/// references a variable — looking it up is how `evaluate` tells a local
/// read from a global one without a name search.
pub struct Interpreter {
    globals: EnvRef,
    environment: EnvRef,
    locals: HashMap<*const Expr, usize>,
}

impl Interpreter {
    pub fn new() -> Self {
        let globals = Environment::new();
        register_natives(&globals);
        Interpreter {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
        }
    }

    /// Called by the resolver as it walks the same tree this interpreter
    /// will later evaluate; never called from anywhere else.
    pub fn resolve(&mut self, expr: *const Expr, depth: usize) {
        self.locals.insert(expr, depth);
    }

    /// Runs a program top to bottom, stopping and reporting at the first
    /// runtime error. Diagnostics are threaded in explicitly rather than
    /// stored on `self`, since one `Interpreter` persists across many REPL
    /// lines while a fresh `Diagnostics` is created for each.
    pub fn interpret(&mut self, statements: &[Stmt], diagnostics: &Diagnostics) {
        for statement in statements {
            match self.execute(statement) {
                Ok(_) => {}
                Err(error) => {
                    diagnostics.runtime_error(&error);
                    break;
                }
            }
        }
    }

    fn execute(&mut self, stmt: &Stmt) -> Result<ControlFlow, RuntimeError> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
                Ok(ControlFlow::Normal)
            }
            Stmt::Print(expr) => {
                let value = self.evaluate(expr)?;
                println!("{}", stringify(&value));
                Ok(ControlFlow::Normal)
            }
            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(init) => self.evaluate(init)?,
                    None => Value::Nil,
                };
                self.environment
                    .borrow_mut()
                    .define(Rc::clone(&name.lexeme), value);
                Ok(ControlFlow::Normal)
            }
            Stmt::Block(statements) => {
                let env = Environment::with_enclosing(&self.environment);
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
                    Ok(ControlFlow::Normal)
                }
            }
            Stmt::Loop {
                condition,
                body,
                increment,
            } => self.execute_loop(condition, body, increment.as_ref()),
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                Ok(ControlFlow::Return(value))
            }
            Stmt::Break(_) => Ok(ControlFlow::Break),
            Stmt::Continue(_) => Ok(ControlFlow::Continue),
            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.execute_class(name, superclass, methods),
        }
    }

    /// Runs `increment` after every iteration of the body, including one
    /// that ended in `continue` — which is exactly why `increment` lives
    /// on this node rather than folded into `body`: a `continue` that
    /// exits the body block early must still reach it.
    fn execute_loop(
        &mut self,
        condition: &Expr,
        body: &Stmt,
        increment: Option<&Expr>,
    ) -> Result<ControlFlow, RuntimeError> {
        while self.evaluate(condition)?.is_truthy() {
            match self.execute(body)? {
                ControlFlow::Break => break,
                ControlFlow::Normal | ControlFlow::Continue => {}
                returning @ ControlFlow::Return(_) => return Ok(returning),
            }
            if let Some(increment) = increment {
                self.evaluate(increment)?;
            }
        }
        Ok(ControlFlow::Normal)
    }

    /// Swaps in a fresh environment for the duration of the block, always
    /// restoring the previous one even when a statement inside returns an
    /// error or a non-`Normal` control flow signal.
    fn execute_block(
        &mut self,
        statements: &[Stmt],
        env: EnvRef,
    ) -> Result<ControlFlow, RuntimeError> {
        let previous = mem::replace(&mut self.environment, env);
        let result = self.run_block(statements);
        self.environment = previous;
        result
    }

    fn run_block(&mut self, statements: &[Stmt]) -> Result<ControlFlow, RuntimeError> {
        for statement in statements {
            match self.execute(statement)? {
                ControlFlow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(ControlFlow::Normal)
    }

    fn execute_class(
        &mut self,
        name: &Token,
        superclass: &Option<Expr>,
        methods: &[FunctionExpr],
    ) -> Result<ControlFlow, RuntimeError> {
        let superclass_class = match superclass {
            Some(Expr::Variable { name: super_name }) => {
                match self.evaluate(superclass.as_ref().expect("Some checked above"))? {
                    Value::Class(class) => Some(class),
                    _ => return Err(RuntimeError::new(super_name, "Superclass must be a class.")),
                }
            }
            Some(_) => unreachable!("the parser only produces Expr::Variable for a superclass"),
            None => None,
        };

        // The class's own name is bound before its methods are built so a
        // method body can refer to the class (e.g. to call another of its
        // own constructors), matching how function declarations work.
        self.environment
            .borrow_mut()
            .define(Rc::clone(&name.lexeme), Value::Nil);

        let previous_env = superclass_class.as_ref().map(|superclass_class| {
            let env = Environment::with_enclosing(&self.environment);
            env.borrow_mut()
                .define("super".into(), Value::Class(Rc::clone(superclass_class)));
            mem::replace(&mut self.environment, env)
        });

        let mut class_methods = HashMap::new();
        for method in methods {
            let method_name = method
                .name
                .as_ref()
                .expect("class methods are always named")
                .lexeme
                .clone();
            let is_initializer = &*method_name == "init";
            let function = self.make_function(method, is_initializer);
            class_methods.insert(method_name, Rc::new(function));
        }

        if let Some(previous) = previous_env {
            self.environment = previous;
        }

        let class = LoxClass {
            name: Rc::clone(&name.lexeme),
            superclass: superclass_class,
            methods: class_methods,
        };
        self.environment
            .borrow_mut()
            .assign(name, Value::Class(Rc::new(class)))?;
        Ok(ControlFlow::Normal)
    }

    fn make_function(&self, func: &FunctionExpr, is_initializer: bool) -> LoxFunction {
        let decl = Rc::new(FunctionDecl {
            name: func.name.clone(),
            params: func.params.clone(),
            body: Rc::clone(&func.body),
            is_initializer,
        });
        LoxFunction::new(decl, Rc::clone(&self.environment))
    }

    fn evaluate(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Grouping { expression } => self.evaluate(expression),
            Expr::Unary { operator, right } => self.evaluate_unary(operator, right),
            Expr::Binary {
                left,
                operator,
                right,
            } => self.evaluate_binary(left, operator, right),
            Expr::Logical {
                left,
                operator,
                right,
            } => self.evaluate_logical(left, operator, right),
            Expr::Variable { name } => self.look_up_variable(name, expr),
            Expr::Assign { name, value } => self.evaluate_assign(expr, name, value),
            Expr::Call {
                callee,
                paren,
                arguments,
            } => self.evaluate_call(callee, paren, arguments),
            Expr::Get { object, name } => self.evaluate_get(object, name),
            Expr::Set {
                object,
                name,
                value,
            } => self.evaluate_set(object, name, value),
            Expr::This { keyword } => self.look_up_variable(keyword, expr),
            Expr::Super { keyword, method } => self.evaluate_super(expr, keyword, method),
            Expr::Function(func) => self.evaluate_function(func),
        }
    }

    /// A named `fun` expression — whether a bare top-level declaration
    /// (`Stmt::Expression(Expr::Function(Some(name)))`) or nested anywhere
    /// else (a `Var` initializer, a call argument, ...) — defines its own
    /// name in the current environment before the closure is handed back,
    /// so the function body can call itself by name (spec §4.4).
    fn evaluate_function(&mut self, func: &FunctionExpr) -> Result<Value, RuntimeError> {
        let function = Value::Function(Rc::new(self.make_function(func, false)));
        if let Some(name) = &func.name {
            self.environment
                .borrow_mut()
                .define(Rc::clone(&name.lexeme), function.clone());
        }
        Ok(function)
    }

    fn evaluate_unary(&mut self, operator: &Token, right: &Expr) -> Result<Value, RuntimeError> {
        let right = self.evaluate(right)?;
        match operator.token_type {
            TokenType::Minus => match right {
                Value::Number(n) => Ok(Value::Number(-n)),
                _ => Err(RuntimeError::new(operator, "Operand must be a number.")),
            },
            TokenType::Bang => Ok(Value::Bool(!right.is_truthy())),
            _ => unreachable!("the parser never produces a unary operator other than - or !"),
        }
    }

    fn evaluate_binary(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<Value, RuntimeError> {
        let left = self.evaluate(left)?;
        let right = self.evaluate(right)?;

        use TokenType::*;
        match operator.token_type {
            Minus => numeric_op(operator, left, right, |a, b| a - b),
            Slash => numeric_op(operator, left, right, |a, b| a / b),
            Star => numeric_op(operator, left, right, |a, b| a * b),
            Greater => numeric_cmp(operator, left, right, |a, b| a > b),
            GreaterEqual => numeric_cmp(operator, left, right, |a, b| a >= b),
            Less => numeric_cmp(operator, left, right, |a, b| a < b),
            LessEqual => numeric_cmp(operator, left, right, |a, b| a <= b),
            Plus => match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::String(_), Value::String(_))
                | (Value::String(_), Value::Number(_))
                | (Value::Number(_), Value::String(_)) => Ok(Value::String(
                    format!("{}{}", stringify(&left), stringify(&right)).into(),
                )),
                _ => Err(RuntimeError::new(
                    operator,
                    "Operands must be two numbers or two strings.",
                )),
            },
            BangEqual => Ok(Value::Bool(!left.is_equal(&right))),
            EqualEqual => Ok(Value::Bool(left.is_equal(&right))),
            _ => unreachable!("the parser never produces a binary operator outside this set"),
        }
    }

    fn evaluate_logical(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> Result<Value, RuntimeError> {
        let left = self.evaluate(left)?;
        match operator.token_type {
            TokenType::Or if left.is_truthy() => return Ok(left),
            TokenType::And if !left.is_truthy() => return Ok(left),
            TokenType::Or | TokenType::And => {}
            _ => unreachable!("the parser never produces a logical operator outside or/and"),
        }
        self.evaluate(right)
    }

    fn evaluate_assign(
        &mut self,
        expr: &Expr,
        name: &Token,
        value: &Expr,
    ) -> Result<Value, RuntimeError> {
        let value = self.evaluate(value)?;
        match self.locals.get(&(expr as *const Expr)) {
            Some(distance) => Environment::assign_at(&self.environment, *distance, name, value.clone())?,
            None => self.globals.borrow_mut().assign(name, value.clone())?,
        }
        Ok(value)
    }

    fn evaluate_call(
        &mut self,
        callee: &Expr,
        paren: &Token,
        arguments: &[Expr],
    ) -> Result<Value, RuntimeError> {
        let callee = self.evaluate(callee)?;
        let mut args = Vec::with_capacity(arguments.len());
        for argument in arguments {
            args.push(self.evaluate(argument)?);
        }
        self.call_value(callee, paren, args)
    }

    fn call_value(
        &mut self,
        callee: Value,
        paren: &Token,
        arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let target = callee
            .call(paren, arguments)
            .ok_or_else(|| RuntimeError::new(paren, "Can only call functions and classes."))?;

        match target {
            CallTarget::Function(function, args) => {
                check_arity(paren, function.arity(), args.len())?;
                self.call_function(&function, args)
            }
            CallTarget::Class(class, args) => {
                check_arity(paren, class.arity(), args.len())?;
                self.instantiate(&class, args)
            }
            CallTarget::Native(native, args) => {
                check_arity(paren, native.arity, args.len())?;
                (native.func)(&args)
            }
        }
    }

    fn call_function(
        &mut self,
        function: &Rc<LoxFunction>,
        arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let env = function.call_environment(&arguments);
        let result = self.execute_block(&function.decl.body, env)?;

        // An initializer's `return;` (no value) and falling off the end of
        // `init` both yield the instance, never `nil` — the one spot where
        // Lox's implicit-return rule doesn't hold (spec Open Question).
        if function.is_initializer() {
            return Ok(Environment::get_at_named(&function.closure, 0, "this")
                .expect("an initializer's closure always binds 'this' one scope in"));
        }

        match result {
            ControlFlow::Return(value) => Ok(value),
            _ => Ok(Value::Nil),
        }
    }

    fn instantiate(
        &mut self,
        class: &Rc<LoxClass>,
        arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let instance = LoxInstance::new(Rc::clone(class));
        if let Some(initializer) = class.find_method("init") {
            let bound = initializer.bind(Value::Instance(Rc::clone(&instance)));
            self.call_function(&Rc::new(bound), arguments)?;
        }
        Ok(Value::Instance(instance))
    }

    fn evaluate_get(&mut self, object: &Expr, name: &Token) -> Result<Value, RuntimeError> {
        match self.evaluate(object)? {
            Value::Instance(instance) => LoxInstance::get(&instance, name),
            _ => Err(RuntimeError::new(name, "Only instances have properties.")),
        }
    }

    fn evaluate_set(
        &mut self,
        object: &Expr,
        name: &Token,
        value: &Expr,
    ) -> Result<Value, RuntimeError> {
        match self.evaluate(object)? {
            Value::Instance(instance) => {
                let value = self.evaluate(value)?;
                instance.borrow_mut().set(name, value.clone());
                Ok(value)
            }
            _ => Err(RuntimeError::new(name, "Only instances have fields.")),
        }
    }

    fn evaluate_super(
        &mut self,
        expr: &Expr,
        keyword: &Token,
        method: &Token,
    ) -> Result<Value, RuntimeError> {
        let distance = *self
            .locals
            .get(&(expr as *const Expr))
            .expect("the resolver always resolves a 'super' expression");
        let superclass = match Environment::get_at_named(&self.environment, distance, "super") {
            Some(Value::Class(class)) => class,
            _ => unreachable!("'super' is only ever bound to a Value::Class"),
        };
        let instance = Environment::get_at_named(&self.environment, distance - 1, "this")
            .expect("'this' is always bound one scope inside the 'super' scope");

        let found = superclass.find_method(&method.lexeme).ok_or_else(|| {
            RuntimeError::new(method, format!("Undefined property '{}'.", method.lexeme))
        })?;
        Ok(Value::Function(Rc::new(found.bind(instance))))
    }

    fn look_up_variable(&self, name: &Token, expr: &Expr) -> Result<Value, RuntimeError> {
        match self.locals.get(&(expr as *const Expr)) {
            Some(distance) => Environment::get_at(&self.environment, *distance, name),
            None => self.globals.borrow().get(name),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn check_arity(paren: &Token, expected: usize, got: usize) -> Result<(), RuntimeError> {
    if expected == got {
        Ok(())
    } else {
        Err(RuntimeError::new(
            paren,
            format!("Expected {expected} arguments but got {got}."),
        ))
    }
}

fn numeric_op(
    operator: &Token,
    left: Value,
    right: Value,
    op: impl Fn(f64, f64) -> f64,
) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(op(a, b))),
        _ => Err(RuntimeError::new(operator, "Operands must be numbers.")),
    }
}

fn numeric_cmp(
    operator: &Token,
    left: Value,
    right: Value,
    op: impl Fn(f64, f64) -> bool,
) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(op(a, b))),
        _ => Err(RuntimeError::new(operator, "Operands must be numbers.")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::parser::Parser;
    use crate::resolver::Resolver;
    use crate::scanner::Scanner;

    fn run(source: &str) -> (Interpreter, Diagnostics) {
        let diagnostics = Diagnostics::new();
        let tokens = Scanner::new(source, &diagnostics).scan_tokens();
        let statements = Parser::new(&tokens, &diagnostics).parse();
        assert!(!diagnostics.had_error(), "fixture failed to parse");

        let mut interpreter = Interpreter::new();
        Resolver::new(&mut interpreter, &diagnostics).resolve_stmts(&statements);
        assert!(!diagnostics.had_error(), "fixture failed to resolve");

        interpreter.interpret(&statements, &diagnostics);
        (interpreter, diagnostics)
    }

    fn global(interpreter: &Interpreter, name: &str) -> Value {
        interpreter
            .globals
            .borrow()
            .get(&Token::new(TokenType::Identifier, name, 1))
            .unwrap_or_else(|_| panic!("expected global '{name}' to be defined"))
    }

    #[test]
    fn string_plus_number_concatenates_with_stringified_number() {
        let (interpreter, diagnostics) = run(r#"var r = "count: " + 3;"#);
        assert!(!diagnostics.had_runtime_error());
        match global(&interpreter, "r") {
            Value::String(s) => assert_eq!(&*s, "count: 3"),
            other => panic!("expected String, got {other:?}"),
        }
    }

    #[test]
    fn number_plus_string_concatenates_in_order() {
        let (interpreter, diagnostics) = run(r#"var r = 3 + "!";"#);
        assert!(!diagnostics.had_runtime_error());
        match global(&interpreter, "r") {
            Value::String(s) => assert_eq!(&*s, "3!"),
            other => panic!("expected String, got {other:?}"),
        }
    }

    #[test]
    fn number_plus_number_sums() {
        let (interpreter, diagnostics) = run("var r = 1 + 2;");
        assert!(!diagnostics.had_runtime_error());
        match global(&interpreter, "r") {
            Value::Number(n) => assert_eq!(n, 3.0),
            other => panic!("expected Number, got {other:?}"),
        }
    }

    #[test]
    fn adding_a_bool_to_a_number_is_a_runtime_error() {
        let (_, diagnostics) = run("var r = 1 + true;");
        assert!(diagnostics.had_runtime_error());
    }

    #[test]
    fn equality_is_by_value_for_scalars_and_by_identity_for_instances() {
        let (interpreter, diagnostics) = run(
            r#"
            class C {}
            var a = C();
            var b = C();
            var sameA = a;
            var numbersEqual = (1 == 1.0);
            var instancesEqual = (a == b);
            var identityHolds = (a == sameA);
            "#,
        );
        assert!(!diagnostics.had_runtime_error());
        assert!(matches!(global(&interpreter, "numbersEqual"), Value::Bool(true)));
        assert!(matches!(global(&interpreter, "instancesEqual"), Value::Bool(false)));
        assert!(matches!(global(&interpreter, "identityHolds"), Value::Bool(true)));
    }

    #[test]
    fn closure_mutates_its_captured_environment_across_calls() {
        let (interpreter, diagnostics) = run(
            r#"
            fun makeCounter() {
                var i = 0;
                fun inc() { i = i + 1; return i; }
                return inc;
            }
            var counter = makeCounter();
            var first = counter();
            var second = counter();
            "#,
        );
        assert!(!diagnostics.had_runtime_error());
        assert!(matches!(global(&interpreter, "first"), Value::Number(n) if n == 1.0));
        assert!(matches!(global(&interpreter, "second"), Value::Number(n) if n == 2.0));
    }

    #[test]
    fn calling_with_the_wrong_number_of_arguments_is_a_runtime_error() {
        let (_, diagnostics) = run("fun f(a, b) { return a + b; } f(1);");
        assert!(diagnostics.had_runtime_error());
    }

    #[test]
    fn calling_a_non_callable_is_a_runtime_error() {
        let (_, diagnostics) = run(r#"var x = 1; x();"#);
        assert!(diagnostics.had_runtime_error());
    }

    #[test]
    fn accessing_a_property_on_a_non_instance_is_a_runtime_error() {
        let (_, diagnostics) = run(r#"var x = 1; print x.y;"#);
        assert!(diagnostics.had_runtime_error());
    }

    #[test]
    fn bound_method_stored_in_a_variable_keeps_its_this() {
        let (interpreter, diagnostics) = run(
            r#"
            class Box {
                init(v) { this.v = v; }
                get() { return this.v; }
            }
            var b = Box(7);
            var m = b.get;
            var result = m();
            "#,
        );
        assert!(!diagnostics.had_runtime_error());
        assert!(matches!(global(&interpreter, "result"), Value::Number(n) if n == 7.0));
    }

    #[test]
    fn falsy_values_are_exactly_nil_and_false() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Number(0.0).is_truthy());
        assert!(Value::String("".into()).is_truthy());
    }
}

/// The one native function the core interpreter ships with; anything else
/// an embedder wants is registered the same way at this same call site.
fn register_natives(globals: &EnvRef) {
    globals.borrow_mut().define(
        "clock".into(),
        Value::NativeFn(Rc::new(NativeFunction {
            name: "clock",
            arity: 0,
            func: Box::new(|_args| {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .expect("system clock is set before the Unix epoch")
                    .as_secs_f64();
                Ok(Value::Number(now))
            }),
        })),
    );
}
