//! Error types for the command-line interface.

use markweave_compiler::CompileError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// `--var` argument without a `=`.
    #[error("Invalid variable '{0}'. Expected NAME=VALUE (e.g., user=Ada)")]
    InvalidVariable(String),

    #[error("{count} validation error(s) in {file}")]
    Invalid { file: String, count: usize },

    #[error("Compilation of {file} aborted: {message}")]
    Aborted { file: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
