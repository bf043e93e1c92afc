use std::fmt;

/// Top-level outcome of running a script, carrying the process exit code a
/// CLI driver should use (matching the conventions of `sysexits.h`: 65 for
/// bad input, 70 for an internal/runtime failure).
#[derive(Debug)]
pub enum RunError {
    /// The scanner or compiler rejected the source. Diagnostics have already
    /// been written to stderr by the time this is returned.
    Compile,
    /// The program compiled but raised an uncaught error while executing.
    /// Diagnostics have already been written to stderr.
    Runtime(String),
}

impl RunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Compile => 65,
            RunError::Runtime(_) => 70,
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Compile => write!(f, "compilation failed"),
            RunError::Runtime(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for RunError {}
