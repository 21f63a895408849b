use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use lox_interpreter::{run_source, ErrorKind, Interpreter, Value};

/// A `Write` sink backed by a shared buffer, so a test can run a
/// program and then inspect everything it printed.
#[derive(Clone, Default)]
struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn run(src: &str) -> (String, Option<Value>) {
    let buffer = SharedBuffer::default();
    let mut interpreter = Interpreter::with_writer(Box::new(buffer.clone()));
    let value = run_source(&mut interpreter, src, "<test>").expect("program should run to completion");
    (String::from_utf8(buffer.0.borrow().clone()).unwrap(), value)
}

fn run_err(src: &str) -> ErrorKind {
    let mut interpreter = Interpreter::new();
    run_source(&mut interpreter, src, "<test>").unwrap_err().kind()
}

// ---- positive end-to-end scenarios --------------------------------------

#[test]
fn arithmetic_and_print() {
    let (out, _) = run("print 1 + 2 * 3 - 4 / 2;");
    assert_eq!(out, "5\n");
}

#[test]
fn string_concatenation_and_comparison() {
    let (out, _) = run(r#"print "foo" + "bar"; print 1 < 2; print "a" == "a";"#);
    assert_eq!(out, "foobar\ntrue\ntrue\n");
}

#[test]
fn lexical_scoping_and_shadowing() {
    let src = r#"
        var a = "outer";
        {
            var a = "inner";
            print a;
        }
        print a;
    "#;
    let (out, _) = run(src);
    assert_eq!(out, "inner\nouter\n");
}

#[test]
fn control_flow_while_and_for() {
    let src = r#"
        var i = 0;
        while (i < 3) { print i; i = i + 1; }
        for (var j = 0; j < 3; j = j + 1) print j * 2;
    "#;
    let (out, _) = run(src);
    assert_eq!(out, "0\n1\n2\n0\n2\n4\n");
}

#[test]
fn closures_capture_enclosing_variables() {
    let src = r#"
        fun makeCounter() {
            var count = 0;
            fun increment() {
                count = count + 1;
                return count;
            }
            return increment;
        }
        var counter = makeCounter();
        print counter();
        print counter();
        print counter();
    "#;
    let (out, _) = run(src);
    assert_eq!(out, "1\n2\n3\n");
}

#[test]
fn classes_with_fields_and_bound_methods() {
    let src = r#"
        class Accumulator {
            add(n) {
                this.total = this.total + n;
                return this.total;
            }
        }
        var acc = Accumulator();
        acc.total = 0;
        print acc.add(3);
        print acc.add(4);
    "#;
    let (out, _) = run(src);
    assert_eq!(out, "3\n7\n");
}

// ---- negative scenarios: one per error tier -----------------------------

#[test]
fn unterminated_string_is_a_lex_error() {
    assert_eq!(run_err("\"oops"), ErrorKind::UnterminatedString);
}

#[test]
fn missing_semicolon_is_a_parse_error() {
    assert_eq!(run_err("var a = 1"), ErrorKind::UnfinishedExpression);
}

#[test]
fn local_self_initialization_is_a_resolve_error() {
    assert_eq!(run_err("{ var a = a; }"), ErrorKind::SelfInitialization);
}

#[test]
fn adding_number_and_string_is_a_runtime_error() {
    assert_eq!(run_err("1 + \"a\";"), ErrorKind::RuntimeError);
}

#[test]
fn calling_undefined_function_is_a_runtime_error() {
    assert_eq!(run_err("undefined_fn();"), ErrorKind::UndefinedVariable);
}
