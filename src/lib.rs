pub mod call_frame;
pub mod chunk;
pub mod compiler;
pub mod debug;
pub mod error;
pub mod gc;
pub mod heap;
pub mod interner;
pub mod natives;
pub mod objects;
pub mod scanner;
pub mod table;
pub mod value;
pub mod vm;

pub use error::RunError;
pub use vm::Vm;

/// Compiles and runs `source` in a fresh VM, printing diagnostics to
/// stderr on failure. Convenience wrapper for one-shot callers (tests, the
/// script-mode CLI); the REPL drives `Vm::interpret` directly so state
/// persists across lines.
pub fn run_source(source: &str) -> Result<(), RunError> {
    Vm::new().interpret(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_source_compiles_and_executes_a_fresh_vm() {
        assert!(run_source("print 1 + 2;").is_ok());
    }

    #[test]
    fn run_source_surfaces_compile_errors() {
        assert!(matches!(run_source("var;"), Err(RunError::Compile)));
    }
}
