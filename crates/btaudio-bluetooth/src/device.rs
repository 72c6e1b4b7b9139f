//! Remote Bluetooth device representation.

use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use crate::profile::{AudioState, Profile, PROFILE_COUNT};
use crate::transport::Transport;

/// Boolean property that may not have been reported yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriState {
    #[default]
    Unknown,
    False,
    True,
}

impl From<bool> for TriState {
    fn from(value: bool) -> Self {
        if value {
            TriState::True
        } else {
            TriState::False
        }
    }
}

/// Outcome of the base `org.bluez.Device.GetProperties` fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InfoState {
    /// Request still outstanding.
    #[default]
    Pending,
    Failed,
    Valid,
}

/// Form factor derived from the device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormFactor {
    Headset,
    HandsFree,
    Microphone,
    Speaker,
    Headphone,
    Portable,
    Car,
    Hifi,
    Unknown,
}

impl FormFactor {
    pub fn as_str(self) -> &'static str {
        match self {
            FormFactor::Headset => "headset",
            FormFactor::HandsFree => "hands-free",
            FormFactor::Microphone => "microphone",
            FormFactor::Speaker => "speaker",
            FormFactor::Headphone => "headphone",
            FormFactor::Portable => "portable",
            FormFactor::Car => "car",
            FormFactor::Hifi => "hifi",
            FormFactor::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FormFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Major device class for audio/video equipment.
const MAJOR_CLASS_AUDIO_VIDEO: u32 = 4;

/// Classify a device class into an audio form factor.
///
/// Only the audio/video major class is recognized; everything else is
/// [`FormFactor::Unknown`].
pub fn form_factor(class: u32) -> FormFactor {
    if (class >> 8) & 31 != MAJOR_CLASS_AUDIO_VIDEO {
        return FormFactor::Unknown;
    }

    let minor = (class >> 2) & 63;
    match minor {
        1 => FormFactor::Headset,
        2 => FormFactor::HandsFree,
        4 => FormFactor::Microphone,
        5 => FormFactor::Speaker,
        6 => FormFactor::Headphone,
        7 => FormFactor::Portable,
        8 => FormFactor::Car,
        10 => FormFactor::Hifi,
        _ => {
            debug!("Unknown Bluetooth minor device class {}", minor);
            FormFactor::Unknown
        }
    }
}

/// Sanitize a remote device name for display.
///
/// Leading control and non-ASCII bytes are dropped. Any later run of control
/// characters, non-ASCII bytes or underscores collapses to a single space,
/// and trailing runs are dropped entirely.
pub fn cleanup_name(name: &str) -> String {
    let bytes = name.as_bytes();
    let start = bytes
        .iter()
        .position(|&b| !(1..=32).contains(&b) && b < 127)
        .unwrap_or(bytes.len());

    let mut out = Vec::with_capacity(bytes.len() - start);
    let mut space = false;
    for &b in &bytes[start..] {
        if b <= 32 || b >= 127 || b == b'_' {
            space = true;
            continue;
        }
        if space {
            out.push(b' ');
            space = false;
        }
        out.push(b);
    }

    // Only ASCII bytes survive the filter.
    String::from_utf8_lossy(&out).into_owned()
}

/// A remote Bluetooth device known to BlueZ.
///
/// Created on first sighting and filled in as property replies and signals
/// arrive. The device owns at most one [`Transport`] per profile slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    /// Object path, the stable key.
    pub path: String,
    pub address: Option<String>,
    pub name: Option<String>,
    pub alias: Option<String>,
    pub class: Option<u32>,
    pub paired: TriState,
    pub trusted: TriState,
    /// Service UUIDs as advertised.
    pub uuids: HashSet<String>,
    /// State of the aggregate `org.bluez.Audio` interface.
    pub audio_state: AudioState,
    pub profile_state: [AudioState; PROFILE_COUNT],
    pub transports: [Option<Transport>; PROFILE_COUNT],
    pub info_valid: InfoState,
    /// Set while the device is being torn down.
    pub dead: bool,
}

impl Device {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            address: None,
            name: None,
            alias: None,
            class: None,
            paired: TriState::Unknown,
            trusted: TriState::Unknown,
            uuids: HashSet::new(),
            audio_state: AudioState::Invalid,
            profile_state: [AudioState::Invalid; PROFILE_COUNT],
            transports: Default::default(),
            info_valid: InfoState::Pending,
            dead: false,
        }
    }

    /// Base info loaded, the Audio interface reported and at least one
    /// profile reported.
    pub fn is_audio_ready(&self) -> bool {
        self.info_valid == InfoState::Valid
            && self.audio_state != AudioState::Invalid
            && self.profile_state.iter().any(|s| *s != AudioState::Invalid)
    }

    /// Whether the device should be exposed as connected.
    ///
    /// Sink and headset states are intentionally ignored: they are reflected
    /// in the aggregate state, which only turns connected once every profile
    /// of a dual-profile headset is up.
    pub fn any_audio_connected(&self) -> bool {
        if self.dead || !self.is_audio_ready() {
            return false;
        }

        self.audio_state >= AudioState::Connected
            || self.state(Profile::A2dpSource) >= AudioState::Connected
            || self.state(Profile::Hfgw) >= AudioState::Connected
    }

    pub fn state(&self, profile: Profile) -> AudioState {
        self.profile_state[profile.index()]
    }

    pub fn transport(&self, profile: Profile) -> Option<&Transport> {
        self.transports[profile.index()].as_ref()
    }

    pub fn transport_mut(&mut self, profile: Profile) -> Option<&mut Transport> {
        self.transports[profile.index()].as_mut()
    }

    /// Alias if known, else name.
    pub fn display_name(&self) -> Option<&str> {
        self.alias.as_deref().or(self.name.as_deref())
    }

    pub fn form_factor(&self) -> FormFactor {
        self.class.map(form_factor).unwrap_or(FormFactor::Unknown)
    }

    /// UUIDs compare case-insensitively.
    pub fn has_uuid(&self, uuid: &str) -> bool {
        self.uuids.iter().any(|known| known.eq_ignore_ascii_case(uuid))
    }
}
