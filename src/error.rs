//! Error types for the studio core
//!
//! Codec failures and unrecognised messages are fatal for the operation that
//! hit them. Rejected edits and empty queries are not errors and never show
//! up here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StudioError {
    /// Standard MIDI File could not be parsed or written
    #[error("midi codec error: {0}")]
    Codec(String),

    /// Only metrical (ticks per quarter note) timing is supported
    #[error("unsupported timing: {0}")]
    UnsupportedTiming(String),

    /// A raw message the note builder has no mapping for
    #[error("unsupported midi message at tick {tick}: {message}")]
    UnsupportedMessage { tick: u64, message: String },

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A chat block that does not follow `<prefix>num,count=<chunk>`
    #[error("malformed block: {0}")]
    MalformedBlock(String),

    #[error("xml error: {0}")]
    Xml(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StudioError>;
