//! End-to-end scenarios driving the compiled binary: literal script in,
//! stdout/stderr/exit code out.

use std::io::Write;
use std::process::{Command, Output};

fn run_script(source: &str) -> Output {
    let mut path = std::env::temp_dir();
    path.push(format!("dynac-conformance-{}.lox", std::process::id()));
    {
        let mut file = std::fs::File::create(&path).expect("create temp script");
        file.write_all(source.as_bytes()).expect("write temp script");
    }
    let binary = env!("CARGO_BIN_EXE_dynac");
    let output = Command::new(binary)
        .arg(&path)
        .output()
        .expect("run dynac binary");
    let _ = std::fs::remove_file(&path);
    output
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn arithmetic_precedence() {
    let output = run_script("print 1 + 2 * 3;");
    assert_eq!(stdout(&output), "7\n");
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn interned_strings_compare_equal() {
    let output = run_script("var a = \"hi\"; var b = \"hi\"; print a == b;");
    assert_eq!(stdout(&output), "true\n");
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn recursive_fibonacci() {
    let output = run_script("fun f(n){ if (n<2) return n; return f(n-1)+f(n-2); } print f(10);");
    assert_eq!(stdout(&output), "55\n");
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn closures_over_closed_upvalues() {
    let output = run_script(
        "fun make(){ var x=\"hi\"; fun get(){ return x; } return get; } print make()();",
    );
    assert_eq!(stdout(&output), "hi\n");
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn inheritance_and_super_calls() {
    let output = run_script(
        "class A{ m(){ print \"A\"; } } class B < A { m(){ super.m(); print \"B\"; } } B().m();",
    );
    assert_eq!(stdout(&output), "A\nB\n");
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn assigning_to_an_undefined_global_is_a_runtime_error() {
    let output = run_script("var x = 1; x = y;");
    assert!(stderr(&output).contains("Undefined variable 'y'."));
    assert_eq!(output.status.code(), Some(70));
}

#[test]
fn mixed_type_addition_is_a_runtime_error() {
    let output = run_script("\"a\" + 1;");
    assert!(stderr(&output).contains("Operands must be two numbers or two strings."));
    assert_eq!(output.status.code(), Some(70));
}

#[test]
fn redeclaring_a_local_is_a_compile_error() {
    let output = run_script("{ var x; var x; }");
    assert!(stderr(&output).contains("Variable with this name already declared in this scope."));
    assert_eq!(output.status.code(), Some(65));
}

#[test]
fn missing_script_file_is_a_usage_error() {
    let binary = env!("CARGO_BIN_EXE_dynac");
    let output = Command::new(binary)
        .arg("/nonexistent/path/to/a/script.lox")
        .output()
        .expect("run dynac binary");
    assert_eq!(output.status.code(), Some(64));
}
