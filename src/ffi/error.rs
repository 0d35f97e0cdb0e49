//! FFI Errors
//!
//! Error taxonomy for resolving, loading, binding and calling native modules.

use std::path::PathBuf;

use thiserror::Error;

use super::types::FfiType;

/// Error type for FFI operations
#[derive(Debug, Clone, Error)]
pub enum FfiError {
    /// The resolved path does not exist for this platform.
    ///
    /// Not fatal: the caller may retry with an explicit path. `candidates`
    /// lists files next to the expected one that share its stem.
    #[error("Module not found at '{}'{}", .path.display(), format_candidates(.candidates))]
    ResolutionAmbiguity {
        path: PathBuf,
        candidates: Vec<PathBuf>,
    },

    /// Module file missing, corrupt or built for another architecture
    #[error("Load error: {0}")]
    LoadError(String),

    /// Entry point absent from the loaded module
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// Signature declaration is malformed
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Argument count does not match the signature
    #[error("Invalid argument count: expected {expected}, got {got}")]
    InvalidArgCount { expected: usize, got: usize },

    /// Argument type does not match the signature
    #[error("Invalid argument type at position {position}: expected {expected}, got {got}")]
    InvalidArgType {
        position: usize,
        expected: FfiType,
        got: FfiType,
    },

    /// Length argument disagrees with the buffer it describes
    #[error("Buffer length mismatch: length argument is {declared}, buffer holds {actual} bytes")]
    LengthMismatch { declared: i64, actual: usize },

    /// Argument value cannot be marshaled (e.g. interior NUL in text)
    #[error("Invalid argument at position {position}: {reason}")]
    InvalidArgument { position: usize, reason: String },

    /// The module handle was released before the call
    #[error("Module '{}' has been released", .0.display())]
    Released(PathBuf),

    /// Entry point returned a null pointer
    #[error("Entry point '{0}' returned null")]
    NullResponse(String),

    /// Returned text could not be converted
    #[error("Type conversion error: {0}")]
    Conversion(String),

    /// Entry point reported failure through its text channel
    #[error("Native error from '{entry_point}': {message}")]
    Native {
        entry_point: String,
        message: String,
    },
}

impl FfiError {
    /// Whether this error was raised while performing a call.
    ///
    /// Resolution, load and bind failures return `false`.
    pub fn is_call_error(&self) -> bool {
        matches!(
            self,
            FfiError::InvalidArgCount { .. }
                | FfiError::InvalidArgType { .. }
                | FfiError::LengthMismatch { .. }
                | FfiError::InvalidArgument { .. }
                | FfiError::Released(_)
                | FfiError::NullResponse(_)
                | FfiError::Conversion(_)
                | FfiError::Native { .. }
        )
    }
}

fn format_candidates(candidates: &[PathBuf]) -> String {
    if candidates.is_empty() {
        return String::new();
    }
    let names: Vec<String> = candidates
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    format!(" (found: {})", names.join(", "))
}

/// Result type for FFI operations.
pub type FfiResult<T> = Result<T, FfiError>;
