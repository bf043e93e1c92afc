use std::env;
use std::io::{self, Write};
use std::process::ExitCode;

use dynac::{RunError, Vm};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    let mut debug = false;
    let mut script = None;
    for arg in args {
        if arg == "--debug" {
            debug = true;
        } else if script.is_some() {
            eprintln!("Usage: dynac [--debug] [script]");
            return ExitCode::from(64);
        } else {
            script = Some(arg);
        }
    }

    match script {
        Some(path) => run_file(&path, debug),
        None => {
            run_repl(debug);
            ExitCode::SUCCESS
        }
    }
}

fn run_file(path: &str, debug: bool) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Could not read file '{}': {}", path, err);
            return ExitCode::from(64);
        }
    };

    let mut vm = Vm::new().with_trace(debug);
    match vm.interpret(&source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => ExitCode::from(exit_code(&err)),
    }
}

fn run_repl(debug: bool) {
    let mut vm = Vm::new().with_trace(debug);
    let stdin = io::stdin();
    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }
        let mut line = String::new();
        match stdin.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                // Diagnostics are already written to stderr by the
                // compiler/VM error paths before `RunError` comes back.
                let _ = vm.interpret(&line);
            }
            Err(err) => {
                eprintln!("Error reading stdin: {}", err);
                break;
            }
        }
    }
}

fn exit_code(err: &RunError) -> u8 {
    err.exit_code() as u8
}
