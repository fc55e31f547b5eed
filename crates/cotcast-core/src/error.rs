//! Error types for cotcast core primitives.

use thiserror::Error;

/// Errors raised by the core primitives.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The cancel signal's endpoint pair failed an I/O operation.
    #[error("cancel signal I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
