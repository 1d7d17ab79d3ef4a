//! Error module for the Rusty NEF library.
use std::error::Error;
use std::fmt;

/// Error types for the library.
#[derive(Debug, PartialEq, Clone)]
pub enum NEFError {
    /// Error for an invalid network description, e.g., dimension mismatch, invalid population size or slice.
    ConfigurationError(String),
    /// Error while computing the decoders of a connection, e.g., singular activity matrix.
    OptimizationError(String),
    /// Error for I/O operations.
    IOError(String),
}

impl fmt::Display for NEFError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NEFError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            NEFError::OptimizationError(e) => write!(f, "Optimization error: {}", e),
            NEFError::IOError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl Error for NEFError {}
