//! Error types for the engine.
//!
//! Protocol-level garbage is never an error: the parser discards malformed
//! sequences and resets to ground. These variants cover caller misuse and
//! child I/O failures only.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TermError {
    /// Resize with a zero dimension; state is left untouched.
    #[error("invalid terminal dimensions: {cols}x{rows}")]
    InvalidDimensions { cols: u16, rows: u16 },

    /// No child writer attached; input cannot be delivered.
    #[error("no child process attached")]
    NotAttached,

    /// Writing to the child's input stream failed.
    #[error("child I/O error: {0}")]
    ChildIo(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
