//! Configured media transports.

use std::os::unix::io::{AsRawFd, RawFd};

use dbus::arg::OwnedFd;

use btaudio_core::{CodecError, SbcInfo, SbcParameters};

use crate::profile::{AudioState, Profile, TransportState};

/// Highest gain value of the headset profile.
pub const HSP_MAX_GAIN: u16 = 15;

/// Audio data path for one (device, profile) pair.
///
/// Created when the remote media stack calls SetConfiguration on one of our
/// endpoints; the owning device holds it in its profile slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transport {
    /// Object path of the owning device.
    pub device_path: String,
    pub profile: Profile,
    /// Bus name of the peer that configured the transport. Acquire and
    /// Release must be addressed to it.
    pub owner: String,
    pub path: String,
    /// Negotiated codec configuration as received.
    pub configuration: Vec<u8>,
    pub state: TransportState,
    /// Echo cancellation and noise reduction requested by the remote.
    pub nrec: bool,
    pub microphone_gain: u16,
    pub speaker_gain: u16,
}

impl Transport {
    pub fn new(
        device_path: impl Into<String>,
        owner: impl Into<String>,
        path: impl Into<String>,
        profile: Profile,
        configuration: Vec<u8>,
        profile_state: AudioState,
    ) -> Self {
        Self {
            device_path: device_path.into(),
            profile,
            owner: owner.into(),
            path: path.into(),
            configuration,
            state: profile_state.into(),
            nrec: false,
            microphone_gain: 0,
            speaker_gain: 0,
        }
    }

    /// Decode the SBC encoder parameters of an A2DP transport.
    pub fn sbc_parameters(&self) -> Result<SbcParameters, CodecError> {
        let info = SbcInfo::from_bytes(&self.configuration)?;
        SbcParameters::from_configuration(&info)
    }
}

/// Clamp a gain to the headset range.
pub fn clamp_gain(value: u16) -> u16 {
    value.min(HSP_MAX_GAIN)
}

/// Socket handed out by a successful Acquire.
#[derive(Debug)]
pub struct AcquiredTransport {
    pub fd: OwnedFd,
    /// Input MTU.
    pub imtu: u16,
    /// Output MTU.
    pub omtu: u16,
}

impl AcquiredTransport {
    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}
