//! Sample specification of the sound server.

use crate::error::{Error, Result};

/// Maximum number of channels a sample spec may carry.
pub const CHANNELS_MAX: u8 = 32;

/// Default sample rate and channel count the server mixes at.
///
/// Codec negotiation uses this to choose the closest matching SBC
/// sampling frequency and channel mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSpec {
    pub rate: u32,
    pub channels: u8,
}

impl SampleSpec {
    /// Create a validated sample spec.
    pub fn new(rate: u32, channels: u8) -> Result<Self> {
        let spec = Self { rate, channels };
        if !spec.is_valid() {
            return Err(Error::InvalidSampleSpec { rate, channels });
        }
        Ok(spec)
    }

    /// A spec is valid with a non-zero rate and 1..=CHANNELS_MAX channels.
    pub fn is_valid(&self) -> bool {
        self.rate > 0 && self.channels > 0 && self.channels <= CHANNELS_MAX
    }
}

impl Default for SampleSpec {
    fn default() -> Self {
        Self {
            rate: 44100,
            channels: 2,
        }
    }
}
