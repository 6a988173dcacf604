//! Unified error types for the gridplan workspace
//!
//! [`GridError`] is the error type returned at library boundaries. Crates
//! with richer internal errors convert into it so callers can use `?`
//! uniformly across topology edits, power flow and reinforcement.
//!
//! # Example
//!
//! ```ignore
//! use gridplan_core::{GridError, GridResult};
//!
//! fn reinforce_feeder(topology: &mut Topology) -> GridResult<()> {
//!     topology.change_line_type(&["Line_1".into()], "NAYY 4x1x300")?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all gridplan operations.
#[derive(Error, Debug)]
pub enum GridError {
    /// I/O errors (file access etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid topology edits (unknown buses, missing impedances, ...)
    #[error("Topology error: {0}")]
    Topology(String),

    /// A referenced component does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Power flow did not converge or could not be set up
    #[error("Power flow error: {0}")]
    PowerFlow(String),

    /// Grid reinforcement could not resolve all issues
    #[error("Reinforcement error: {0}")]
    Reinforcement(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using GridError.
pub type GridResult<T> = Result<T, GridError>;

impl From<anyhow::Error> for GridError {
    fn from(err: anyhow::Error) -> Self {
        GridError::Other(err.to_string())
    }
}

impl From<String> for GridError {
    fn from(s: String) -> Self {
        GridError::Other(s)
    }
}

impl From<&str> for GridError {
    fn from(s: &str) -> Self {
        GridError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for GridError {
    fn from(err: serde_json::Error) -> Self {
        GridError::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for GridError {
    fn from(err: toml::de::Error) -> Self {
        GridError::Config(err.to_string())
    }
}
