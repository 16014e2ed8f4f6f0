//! Host-script error types.

/// Error raised while compiling or executing a host script.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptError {
    /// The script text is malformed (1-based line).
    Syntax { line: usize, message: String },
    /// A runtime failure inside the named function.
    Runtime { function: String, message: String },
    /// The program executed more instructions than allowed.
    StepLimit(u64),
}

impl ScriptError {
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        ScriptError::Syntax {
            line,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptError::Syntax { line, message } => {
                write!(f, "script syntax error at line {}: {}", line, message)
            }
            ScriptError::Runtime { function, message } => {
                write!(f, "runtime error in '{}': {}", function, message)
            }
            ScriptError::StepLimit(limit) => {
                write!(f, "step limit of {} instructions exceeded", limit)
            }
        }
    }
}

impl std::error::Error for ScriptError {}
