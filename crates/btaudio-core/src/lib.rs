//! # btaudio-core
//!
//! Bus-independent types shared by the Bluetooth audio crates.
//!
//! This crate provides:
//! - The server sample specification
//! - SBC capability parsing and configuration negotiation
//! - Common error types

pub mod codec;
pub mod error;
pub mod sample;

pub use codec::{
    default_bitpool, select_configuration, AllocationMethod, BlockLength, ChannelMode,
    SamplingFrequency, SbcInfo, SbcParameters, Subbands, MAX_BITPOOL, MIN_BITPOOL, SBC_INFO_LEN,
};
pub use error::{CodecError, Error, Result};
pub use sample::{SampleSpec, CHANNELS_MAX};
