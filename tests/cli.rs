//! Black-box end-to-end tests driving the compiled `lox` binary against
//! whole programs, exactly as a user would invoke `lox <path>`. Covers the
//! six scenarios from spec.md §8 plus a handful of the testable properties
//! it lists (closure capture, method binding, left-to-right evaluation).

use std::io::Write;
use std::process::{Command, Output};

fn run(source: &str) -> Output {
    let mut file = tempfile::Builder::new()
        .suffix(".lox")
        .tempfile()
        .expect("create temp script");
    file.write_all(source.as_bytes()).expect("write script");

    Command::new(env!("CARGO_BIN_EXE_lox"))
        .arg(file.path())
        .output()
        .expect("run lox binary")
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_owned)
        .collect()
}

// 1. Closure counter.
#[test]
fn closure_counter_shares_state_across_calls() {
    let output = run(
        r#"
        fun makeCounter() {
            var i = 0;
            fun c() {
                i = i + 1;
                return i;
            }
            return c;
        }
        var c = makeCounter();
        print c();
        print c();
        print c();
        "#,
    );
    assert_eq!(stdout_lines(&output), vec!["1", "2", "3"]);
    assert_eq!(output.status.code(), Some(0));
}

// 2. Inheritance and super.
#[test]
fn super_call_reaches_base_method_then_continues_subclass() {
    let output = run(
        r#"
        class A { greet() { print "A"; } }
        class B < A { greet() { super.greet(); print "B"; } }
        B().greet();
        "#,
    );
    assert_eq!(stdout_lines(&output), vec!["A", "B"]);
    assert_eq!(output.status.code(), Some(0));
}

// 3. Initializer returns this.
#[test]
fn initializer_always_yields_the_new_instance() {
    let output = run(
        r#"
        class P { init(x) { this.x = x; } }
        var p = P(42);
        print p.x;
        "#,
    );
    assert_eq!(stdout_lines(&output), vec!["42"]);
    assert_eq!(output.status.code(), Some(0));
}

// 4. for + continue executes the increment.
#[test]
fn continue_still_runs_the_for_increment() {
    let output = run(
        r#"
        for (var i = 0; i < 5; i = i + 1) {
            if (i == 2) continue;
            print i;
        }
        "#,
    );
    assert_eq!(stdout_lines(&output), vec!["0", "1", "3", "4"]);
    assert_eq!(output.status.code(), Some(0));
}

// 5. Scope self-reference diagnostic.
#[test]
fn reading_own_initializer_is_a_static_error() {
    let output = run(r#"var a = "outer"; { var a = a; }"#);
    assert_eq!(output.status.code(), Some(65));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Can't read local variable in its own initializer"),
        "stderr was: {stderr}"
    );
}

// 6. Runtime arity mismatch.
#[test]
fn wrong_arity_call_is_a_runtime_error() {
    let output = run(
        r#"
        fun f(a, b) { return a + b; }
        print f(1);
        "#,
    );
    assert_eq!(output.status.code(), Some(70));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Expected 2 arguments but got 1"),
        "stderr was: {stderr}"
    );
}

#[test]
fn break_exits_the_innermost_loop_only() {
    let output = run(
        r#"
        var count = 0;
        for (var i = 0; i < 3; i = i + 1) {
            for (var j = 0; j < 3; j = j + 1) {
                if (j == 1) break;
                count = count + 1;
            }
        }
        print count;
        "#,
    );
    assert_eq!(stdout_lines(&output), vec!["3"]);
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn method_binding_is_stable_when_stored_off_the_instance() {
    let output = run(
        r#"
        class Greeter {
            init(name) { this.name = name; }
            greet() { print "Hello, " + this.name; }
        }
        var g = Greeter("Ada");
        var m = g.greet;
        m();
        "#,
    );
    assert_eq!(stdout_lines(&output), vec!["Hello, Ada"]);
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn left_to_right_argument_evaluation_order_is_observable() {
    let output = run(
        r#"
        fun trace(tag) { print tag; return tag; }
        fun combine(a, b) { return a; }
        combine(trace("first"), trace("second"));
        "#,
    );
    assert_eq!(stdout_lines(&output), vec!["first", "second"]);
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn mixed_string_and_number_concatenation() {
    let output = run(
        r#"
        print "count: " + 3;
        print 3 + "!";
        "#,
    );
    assert_eq!(stdout_lines(&output), vec!["count: 3", "3!"]);
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn integer_valued_doubles_print_without_trailing_zero() {
    let output = run(r#"print 1 + 1; print 10 / 4;"#);
    assert_eq!(stdout_lines(&output), vec!["2", "2.5"]);
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn anonymous_function_expression_is_callable() {
    let output = run(
        r#"
        var square = fun (n) { return n * n; };
        print square(5);
        "#,
    );
    assert_eq!(stdout_lines(&output), vec!["25"]);
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn named_function_expression_can_recurse_through_its_own_name() {
    let output = run(
        r#"
        var fact = fun factorial(n) {
            if (n <= 1) return 1;
            return n * factorial(n - 1);
        };
        print fact(5);
        "#,
    );
    assert_eq!(stdout_lines(&output), vec!["120"]);
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn repl_style_reuse_is_not_needed_but_globals_persist_within_one_file() {
    let output = run(
        r#"
        var total = 0;
        fun add(n) { total = total + n; }
        add(2);
        add(3);
        print total;
        "#,
    );
    assert_eq!(stdout_lines(&output), vec!["5"]);
    assert_eq!(output.status.code(), Some(0));
}
