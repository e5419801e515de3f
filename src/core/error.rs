use std::io;
use thiserror::Error;

/// Error types for the CFM codec and ERPS engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Structurally invalid frame; dropped silently by the engine
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Well-formed frame that does not match what the receiver expects
    #[error("Filter mismatch: {0}")]
    FilterMismatch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Frame too large: {len} octets (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Task error: {0}")]
    Task(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new malformed frame error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedFrame(msg.into())
    }

    /// Creates a new filter mismatch error
    pub fn mismatch(msg: impl Into<String>) -> Self {
        Error::FilterMismatch(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    /// Creates a new task error
    pub fn task(msg: impl Into<String>) -> Self {
        Error::Task(msg.into())
    }

    /// Returns true for errors that only mean "this frame is not for us"
    pub fn is_drop(&self) -> bool {
        matches!(self, Error::MalformedFrame(_) | Error::FilterMismatch(_))
    }
}
