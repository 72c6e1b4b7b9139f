//! SBC codec capabilities and configuration negotiation for A2DP endpoints.
//!
//! The remote media stack hands us a 4-byte SBC information element listing
//! everything it supports. We answer with the same element narrowed to one
//! choice per field.
//!
//! Wire layout (little-endian bitfields):
//!
//! | byte | bits 7..4        | bits 3..2 | bits 1..0         |
//! |------|------------------|-----------|-------------------|
//! | 0    | frequency        | channel mode (bits 3..0)      ||
//! | 1    | block length     | subbands  | allocation method |
//! | 2    | minimum bitpool                                  |||
//! | 3    | maximum bitpool                                  |||

use tracing::warn;

use crate::error::CodecError;
use crate::sample::SampleSpec;

/// Lowest bitpool ever negotiated.
pub const MIN_BITPOOL: u8 = 2;

/// Highest bitpool we advertise.
pub const MAX_BITPOOL: u8 = 64;

/// Size of the SBC information element.
pub const SBC_INFO_LEN: usize = 4;

/// Bitpool used when the frequency/channel-mode pair is not in the table.
const FALLBACK_BITPOOL: u8 = 53;

/// SBC sampling frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingFrequency {
    Hz16000,
    Hz32000,
    Hz44100,
    Hz48000,
}

impl SamplingFrequency {
    /// All frequencies, lowest first.
    pub const ALL: [Self; 4] = [Self::Hz16000, Self::Hz32000, Self::Hz44100, Self::Hz48000];

    pub fn bit(self) -> u8 {
        match self {
            Self::Hz16000 => 1 << 3,
            Self::Hz32000 => 1 << 2,
            Self::Hz44100 => 1 << 1,
            Self::Hz48000 => 1,
        }
    }

    pub fn as_hz(self) -> u32 {
        match self {
            Self::Hz16000 => 16000,
            Self::Hz32000 => 32000,
            Self::Hz44100 => 44100,
            Self::Hz48000 => 48000,
        }
    }

    pub fn from_bit(bit: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.bit() == bit)
    }
}

/// SBC channel mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Mono,
    DualChannel,
    Stereo,
    JointStereo,
}

impl ChannelMode {
    /// Preference order for a server mixing two or more channels.
    pub const STEREO_PREFERENCE: [Self; 4] =
        [Self::JointStereo, Self::Stereo, Self::DualChannel, Self::Mono];

    pub fn bit(self) -> u8 {
        match self {
            Self::Mono => 1 << 3,
            Self::DualChannel => 1 << 2,
            Self::Stereo => 1 << 1,
            Self::JointStereo => 1,
        }
    }

    pub fn from_bit(bit: u8) -> Option<Self> {
        Self::STEREO_PREFERENCE.into_iter().find(|m| m.bit() == bit)
    }

    /// Number of audio channels carried in this mode.
    pub fn channels(self) -> u8 {
        match self {
            Self::Mono => 1,
            _ => 2,
        }
    }
}

/// SBC block length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockLength {
    Four,
    Eight,
    Twelve,
    Sixteen,
}

impl BlockLength {
    /// Preference order, longest first.
    pub const PREFERENCE: [Self; 4] = [Self::Sixteen, Self::Twelve, Self::Eight, Self::Four];

    pub fn bit(self) -> u8 {
        match self {
            Self::Four => 1 << 3,
            Self::Eight => 1 << 2,
            Self::Twelve => 1 << 1,
            Self::Sixteen => 1,
        }
    }

    pub fn from_bit(bit: u8) -> Option<Self> {
        Self::PREFERENCE.into_iter().find(|b| b.bit() == bit)
    }

    pub fn blocks(self) -> u8 {
        match self {
            Self::Four => 4,
            Self::Eight => 8,
            Self::Twelve => 12,
            Self::Sixteen => 16,
        }
    }
}

/// SBC subband count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subbands {
    Four,
    Eight,
}

impl Subbands {
    pub const PREFERENCE: [Self; 2] = [Self::Eight, Self::Four];

    pub fn bit(self) -> u8 {
        match self {
            Self::Four => 1 << 1,
            Self::Eight => 1,
        }
    }

    pub fn from_bit(bit: u8) -> Option<Self> {
        Self::PREFERENCE.into_iter().find(|s| s.bit() == bit)
    }

    pub fn count(self) -> u8 {
        match self {
            Self::Four => 4,
            Self::Eight => 8,
        }
    }
}

/// SBC bit allocation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationMethod {
    Snr,
    Loudness,
}

impl AllocationMethod {
    pub const PREFERENCE: [Self; 2] = [Self::Loudness, Self::Snr];

    pub fn bit(self) -> u8 {
        match self {
            Self::Snr => 1 << 1,
            Self::Loudness => 1,
        }
    }

    pub fn from_bit(bit: u8) -> Option<Self> {
        Self::PREFERENCE.into_iter().find(|a| a.bit() == bit)
    }
}

/// SBC information element: capability bitmasks or a negotiated configuration.
///
/// In a configuration each bitmask has at most one bit set. A field left at
/// zero means negotiation did not pick a value for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SbcInfo {
    pub channel_mode: u8,
    pub frequency: u8,
    pub allocation_method: u8,
    pub subbands: u8,
    pub block_length: u8,
    pub min_bitpool: u8,
    pub max_bitpool: u8,
}

impl SbcInfo {
    /// Everything our endpoints can decode and encode.
    pub fn full_capabilities() -> Self {
        Self {
            channel_mode: 0x0f,
            frequency: 0x0f,
            allocation_method: 0x03,
            subbands: 0x03,
            block_length: 0x0f,
            min_bitpool: MIN_BITPOOL,
            max_bitpool: MAX_BITPOOL,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let [b0, b1, min_bitpool, max_bitpool] = <[u8; SBC_INFO_LEN]>::try_from(bytes)
            .map_err(|_| CodecError::InvalidLength {
                expected: SBC_INFO_LEN,
                actual: bytes.len(),
            })?;

        Ok(Self {
            channel_mode: b0 & 0x0f,
            frequency: b0 >> 4,
            allocation_method: b1 & 0x03,
            subbands: (b1 >> 2) & 0x03,
            block_length: b1 >> 4,
            min_bitpool,
            max_bitpool,
        })
    }

    pub fn to_bytes(&self) -> [u8; SBC_INFO_LEN] {
        [
            (self.frequency << 4) | (self.channel_mode & 0x0f),
            (self.block_length << 4) | ((self.subbands & 0x03) << 2) | (self.allocation_method & 0x03),
            self.min_bitpool,
            self.max_bitpool,
        ]
    }
}

/// Recommended maximum bitpool for a frequency/channel-mode pair.
///
/// Both arguments are single configuration bits.
pub fn default_bitpool(frequency: u8, channel_mode: u8) -> u8 {
    let mode = ChannelMode::from_bit(channel_mode);

    match SamplingFrequency::from_bit(frequency) {
        Some(SamplingFrequency::Hz16000) | Some(SamplingFrequency::Hz32000) => 53,
        Some(SamplingFrequency::Hz44100) => match mode {
            Some(ChannelMode::Mono) | Some(ChannelMode::DualChannel) => 31,
            Some(ChannelMode::Stereo) | Some(ChannelMode::JointStereo) => 53,
            None => {
                warn!("Invalid channel mode {}", channel_mode);
                FALLBACK_BITPOOL
            }
        },
        Some(SamplingFrequency::Hz48000) => match mode {
            Some(ChannelMode::Mono) | Some(ChannelMode::DualChannel) => 29,
            Some(ChannelMode::Stereo) | Some(ChannelMode::JointStereo) => 51,
            None => {
                warn!("Invalid channel mode {}", channel_mode);
                FALLBACK_BITPOOL
            }
        },
        None => {
            warn!("Invalid sampling frequency {}", frequency);
            FALLBACK_BITPOOL
        }
    }
}

fn first_supported<T: Copy>(mask: u8, preference: &[T], bit: impl Fn(T) -> u8) -> Option<T> {
    preference.iter().copied().find(|&v| mask & bit(v) != 0)
}

/// Narrow a remote capability element to a single SBC configuration.
///
/// Deterministic in its inputs. Fails if any mandatory field has no
/// acceptable bit; allocation method and (for mono servers) channel mode
/// may be left unset.
pub fn select_configuration(caps: &SbcInfo, spec: &SampleSpec) -> Result<SbcInfo, CodecError> {
    let mut config = SbcInfo::default();

    // Lowest offered frequency at or above the server rate, else the highest below it.
    let frequency = SamplingFrequency::ALL
        .into_iter()
        .find(|f| f.as_hz() >= spec.rate && caps.frequency & f.bit() != 0)
        .or_else(|| {
            SamplingFrequency::ALL
                .into_iter()
                .rev()
                .find(|f| caps.frequency & f.bit() != 0)
        })
        .ok_or(CodecError::NoSampleRate)?;
    config.frequency = frequency.bit();

    if spec.channels <= 1 {
        if caps.channel_mode & ChannelMode::Mono.bit() != 0 {
            config.channel_mode = ChannelMode::Mono.bit();
        }
    } else {
        let mode = first_supported(caps.channel_mode, &ChannelMode::STEREO_PREFERENCE, ChannelMode::bit)
            .ok_or(CodecError::NoChannelMode)?;
        config.channel_mode = mode.bit();
    }

    let blocks = first_supported(caps.block_length, &BlockLength::PREFERENCE, BlockLength::bit)
        .ok_or(CodecError::NoBlockLength)?;
    config.block_length = blocks.bit();

    let subbands = first_supported(caps.subbands, &Subbands::PREFERENCE, Subbands::bit)
        .ok_or(CodecError::NoSubbands)?;
    config.subbands = subbands.bit();

    if let Some(allocation) =
        first_supported(caps.allocation_method, &AllocationMethod::PREFERENCE, AllocationMethod::bit)
    {
        config.allocation_method = allocation.bit();
    }

    config.min_bitpool = MIN_BITPOOL.max(caps.min_bitpool);
    config.max_bitpool = default_bitpool(config.frequency, config.channel_mode).min(caps.max_bitpool);

    Ok(config)
}

/// Numeric encoder parameters decoded from a negotiated configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbcParameters {
    pub frequency: SamplingFrequency,
    pub channel_mode: ChannelMode,
    pub block_length: BlockLength,
    pub subbands: Subbands,
    pub allocation_method: AllocationMethod,
    pub min_bitpool: u8,
    pub max_bitpool: u8,
}

impl SbcParameters {
    /// Decode a configuration with exactly one bit per field.
    ///
    /// An unset allocation method falls back to loudness, the SBC default.
    pub fn from_configuration(config: &SbcInfo) -> Result<Self, CodecError> {
        let frequency = SamplingFrequency::from_bit(config.frequency)
            .ok_or(CodecError::InvalidConfiguration("frequency"))?;
        let channel_mode = ChannelMode::from_bit(config.channel_mode)
            .ok_or(CodecError::InvalidConfiguration("channel mode"))?;
        let block_length = BlockLength::from_bit(config.block_length)
            .ok_or(CodecError::InvalidConfiguration("block length"))?;
        let subbands = Subbands::from_bit(config.subbands)
            .ok_or(CodecError::InvalidConfiguration("subbands"))?;
        let allocation_method =
            AllocationMethod::from_bit(config.allocation_method).unwrap_or(AllocationMethod::Loudness);

        if config.min_bitpool > config.max_bitpool {
            return Err(CodecError::InvalidConfiguration("bitpool range"));
        }

        Ok(Self {
            frequency,
            channel_mode,
            block_length,
            subbands,
            allocation_method,
            min_bitpool: config.min_bitpool,
            max_bitpool: config.max_bitpool,
        })
    }

    pub fn rate(&self) -> u32 {
        self.frequency.as_hz()
    }

    pub fn channels(&self) -> u8 {
        self.channel_mode.channels()
    }
}
