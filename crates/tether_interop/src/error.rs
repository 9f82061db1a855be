//! Error types for the interop layer

use std::path::PathBuf;
use thiserror::Error;

/// Result type for interop operations
pub type Result<T> = std::result::Result<T, InteropError>;

/// Errors that can occur while marshaling data across the bridge
#[derive(Debug, Error)]
pub enum InteropError {
    /// Value does not fit a fixed-length wire string
    #[error("String '{value}' is {len} bytes, exceeds capacity of {capacity}")]
    StringTooLong {
        value: String,
        len: usize,
        capacity: usize,
    },

    /// Value contains a NUL byte and cannot be NUL-terminated
    #[error("String '{0}' contains an interior NUL byte")]
    InteriorNul(String),

    /// A property value has no interop representation
    #[error("Property '{property}' cannot be converted: {reason}")]
    TypeConversion {
        property: String,
        reason: String,
    },

    /// Unknown property type tag read back from the wire
    #[error("Unknown property type tag {0}")]
    UnknownPropertyKind(i32),

    /// Failed to load the bridge library
    #[error("Failed to load bridge library '{path}': {message}")]
    LoadError {
        path: PathBuf,
        message: String,
    },

    /// Bridge library does not export a required symbol
    #[error("Symbol '{symbol}' not found in bridge library '{library}'")]
    SymbolNotFound {
        library: String,
        symbol: String,
    },

    /// A bridge call returned a failure status
    #[error("Bridge call '{function}' failed with status {status}")]
    CallFailed {
        function: &'static str,
        status: i32,
    },

    /// Mesh buffers are inconsistent with each other
    #[error("Invalid mesh buffers for '{mesh}': {reason}")]
    InvalidMesh {
        mesh: String,
        reason: String,
    },
}

impl InteropError {
    /// Create a type conversion error
    pub fn type_conversion(property: impl Into<String>, reason: impl Into<String>) -> Self {
        InteropError::TypeConversion {
            property: property.into(),
            reason: reason.into(),
        }
    }

    /// Create a load error
    pub fn load_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        InteropError::LoadError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a symbol not found error
    pub fn symbol_not_found(library: impl Into<String>, symbol: impl Into<String>) -> Self {
        InteropError::SymbolNotFound {
            library: library.into(),
            symbol: symbol.into(),
        }
    }

    /// Map a native status code to a result
    pub fn check_status(function: &'static str, status: i32) -> Result<()> {
        if status == 0 {
            Ok(())
        } else {
            Err(InteropError::CallFailed { function, status })
        }
    }
}
