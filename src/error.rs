use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while parsing, analysing or allocating a program.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{function}: branch to undefined label '{label}'")]
    UnresolvedLabel { function: String, label: String },

    #[error("{function}: ill-typed operand in '{instruction}': expected {expected}")]
    IllTypedOperand {
        function: String,
        instruction: String,
        expected: &'static str,
    },

    #[error("{function}: register allocation did not converge after {rounds} spill rounds")]
    AllocationNonTermination { function: String, rounds: usize },

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            line,
            message: message.into(),
        }
    }
}
