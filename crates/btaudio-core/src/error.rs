//! Error types shared by the Bluetooth audio crates.

use thiserror::Error;

/// Primary error type for bus-independent operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Invalid sample spec: {rate} Hz, {channels} channel(s)")]
    InvalidSampleSpec { rate: u32, channels: u8 },
}

/// Errors during SBC capability negotiation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid SBC element length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("No suitable sample rate")]
    NoSampleRate,

    #[error("No supported channel modes")]
    NoChannelMode,

    #[error("No supported block lengths")]
    NoBlockLength,

    #[error("No supported subbands")]
    NoSubbands,

    #[error("Invalid SBC configuration: {0}")]
    InvalidConfiguration(&'static str),
}

/// Convenience Result type.
pub type Result<T> = std::result::Result<T, Error>;
