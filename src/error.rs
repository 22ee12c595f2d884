use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Interpreter not found: {0}")]
    InterpreterNotFound(String),

    #[error("Failed to spawn interpreter: {0}")]
    Spawn(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
