//! Audio profiles, profile UUIDs and the BlueZ interfaces that expose them.

use std::fmt;

/// Headset profile, headset role.
pub const HSP_HS_UUID: &str = "00001108-0000-1000-8000-00805f9b34fb";

/// Headset profile, audio gateway role.
pub const HSP_AG_UUID: &str = "00001112-0000-1000-8000-00805f9b34fb";

/// Hands-free profile, hands-free unit role.
pub const HFP_HS_UUID: &str = "0000111e-0000-1000-8000-00805f9b34fb";

/// Hands-free profile, audio gateway role.
pub const HFP_AG_UUID: &str = "0000111f-0000-1000-8000-00805f9b34fb";

/// A2DP Source UUID (the remote device sends audio to us).
pub const A2DP_SOURCE_UUID: &str = "0000110a-0000-1000-8000-00805f9b34fb";

/// A2DP Sink UUID (the remote device plays audio we send).
pub const A2DP_SINK_UUID: &str = "0000110b-0000-1000-8000-00805f9b34fb";

/// Number of profile slots per device.
pub const PROFILE_COUNT: usize = 4;

/// Audio use-case negotiated with a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Profile {
    /// We stream to a remote A2DP sink.
    A2dp,
    /// A remote A2DP source streams to us.
    A2dpSource,
    /// Headset profile.
    Hsp,
    /// Hands-free gateway.
    Hfgw,
}

impl Profile {
    /// All profiles in slot order.
    pub const ALL: [Profile; PROFILE_COUNT] =
        [Profile::A2dp, Profile::A2dpSource, Profile::Hsp, Profile::Hfgw];

    /// Slot index into per-profile arrays.
    pub fn index(self) -> usize {
        match self {
            Profile::A2dp => 0,
            Profile::A2dpSource => 1,
            Profile::Hsp => 2,
            Profile::Hfgw => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Profile::A2dp => "a2dp",
            Profile::A2dpSource => "a2dp_source",
            Profile::Hsp => "hsp",
            Profile::Hfgw => "hfgw",
        }
    }

    /// Telephony profiles carry no SBC negotiation.
    pub fn is_a2dp(self) -> bool {
        matches!(self, Profile::A2dp | Profile::A2dpSource)
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state BlueZ reports on the audio interfaces.
///
/// Ordered so that `state >= AudioState::Connected` means "usable".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum AudioState {
    /// Not reported yet.
    #[default]
    Invalid,
    Disconnected,
    Connecting,
    Connected,
    Playing,
}

impl AudioState {
    /// Parse the BlueZ state string. Matching is case-exact.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "disconnected" => Some(AudioState::Disconnected),
            "connecting" => Some(AudioState::Connecting),
            "connected" => Some(AudioState::Connected),
            "playing" => Some(AudioState::Playing),
            _ => None,
        }
    }
}

/// State of a configured transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportState {
    Disconnected,
    Idle,
    Playing,
}

impl TransportState {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportState::Disconnected => "disconnected",
            TransportState::Idle => "idle",
            TransportState::Playing => "playing",
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AudioState> for TransportState {
    fn from(state: AudioState) -> Self {
        audio_state_to_transport_state(state)
    }
}

/// Derive a transport state from a profile's audio state.
pub fn audio_state_to_transport_state(state: AudioState) -> TransportState {
    match state {
        // Invalid typically means the state has not been received yet.
        AudioState::Invalid | AudioState::Disconnected | AudioState::Connecting => {
            TransportState::Disconnected
        }
        AudioState::Connected => TransportState::Idle,
        AudioState::Playing => TransportState::Playing,
    }
}

/// BlueZ 4 interfaces this crate talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteInterface {
    Manager,
    Adapter,
    Device,
    Audio,
    AudioSink,
    AudioSource,
    Headset,
    HandsfreeGateway,
    MediaTransport,
}

impl RemoteInterface {
    pub fn as_str(self) -> &'static str {
        match self {
            RemoteInterface::Manager => "org.bluez.Manager",
            RemoteInterface::Adapter => "org.bluez.Adapter",
            RemoteInterface::Device => "org.bluez.Device",
            RemoteInterface::Audio => "org.bluez.Audio",
            RemoteInterface::AudioSink => "org.bluez.AudioSink",
            RemoteInterface::AudioSource => "org.bluez.AudioSource",
            RemoteInterface::Headset => "org.bluez.Headset",
            RemoteInterface::HandsfreeGateway => "org.bluez.HandsfreeGateway",
            RemoteInterface::MediaTransport => "org.bluez.MediaTransport",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            RemoteInterface::Manager,
            RemoteInterface::Adapter,
            RemoteInterface::Device,
            RemoteInterface::Audio,
            RemoteInterface::AudioSink,
            RemoteInterface::AudioSource,
            RemoteInterface::Headset,
            RemoteInterface::HandsfreeGateway,
            RemoteInterface::MediaTransport,
        ]
        .into_iter()
        .find(|iface| iface.as_str() == name)
    }

    /// Profile whose state this interface reports, if any.
    pub fn profile(self) -> Option<Profile> {
        match self {
            RemoteInterface::AudioSink => Some(Profile::A2dp),
            RemoteInterface::AudioSource => Some(Profile::A2dpSource),
            RemoteInterface::Headset => Some(Profile::Hsp),
            RemoteInterface::HandsfreeGateway => Some(Profile::Hfgw),
            _ => None,
        }
    }

    /// Interfaces that carry per-device audio properties.
    pub fn is_audio(self) -> bool {
        self == RemoteInterface::Audio || self.profile().is_some()
    }
}

impl fmt::Display for RemoteInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile interface to query when a device advertises `uuid`.
///
/// Comparison is case-insensitive.
pub fn interface_for_uuid(uuid: &str) -> Option<RemoteInterface> {
    let is = |known: &str| uuid.eq_ignore_ascii_case(known);

    if is(HSP_AG_UUID) || is(HFP_AG_UUID) {
        Some(RemoteInterface::HandsfreeGateway)
    } else if is(HSP_HS_UUID) || is(HFP_HS_UUID) {
        Some(RemoteInterface::Headset)
    } else if is(A2DP_SINK_UUID) {
        Some(RemoteInterface::AudioSink)
    } else if is(A2DP_SOURCE_UUID) {
        Some(RemoteInterface::AudioSource)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod profile {
        use super::*;

        #[test]
        fn indices_match_slot_order() {
            for (i, profile) in Profile::ALL.iter().enumerate() {
                assert_eq!(profile.index(), i);
            }
        }

        #[test]
        fn names() {
            let names: Vec<_> = Profile::ALL.iter().map(|p| p.to_string()).collect();
            assert_eq!(names, ["a2dp", "a2dp_source", "hsp", "hfgw"]);
        }

        #[test]
        fn only_a2dp_profiles_negotiate() {
            assert!(Profile::A2dp.is_a2dp());
            assert!(Profile::A2dpSource.is_a2dp());
            assert!(!Profile::Hsp.is_a2dp());
            assert!(!Profile::Hfgw.is_a2dp());
        }
    }

    mod audio_state {
        use super::*;

        #[test]
        fn parses_case_exact() {
            assert_eq!(AudioState::parse("connected"), Some(AudioState::Connected));
            assert_eq!(AudioState::parse("playing"), Some(AudioState::Playing));
            assert_eq!(AudioState::parse("Connected"), None);
            assert_eq!(AudioState::parse(""), None);
        }

        #[test]
        fn ordering() {
            assert!(AudioState::Invalid < AudioState::Disconnected);
            assert!(AudioState::Connecting < AudioState::Connected);
            assert!(AudioState::Playing >= AudioState::Connected);
            assert_eq!(AudioState::default(), AudioState::Invalid);
        }

        #[test]
        fn transport_mapping_is_total() {
            use TransportState::*;
            let expected = [
                (AudioState::Invalid, Disconnected),
                (AudioState::Disconnected, Disconnected),
                (AudioState::Connecting, Disconnected),
                (AudioState::Connected, Idle),
                (AudioState::Playing, Playing),
            ];
            for (audio, transport) in expected {
                assert_eq!(audio_state_to_transport_state(audio), transport);
                assert_eq!(TransportState::from(audio), transport);
                // Same input, same output.
                assert_eq!(
                    audio_state_to_transport_state(audio),
                    audio_state_to_transport_state(audio)
                );
            }
        }
    }

    mod remote_interface {
        use super::*;

        #[test]
        fn name_round_trip() {
            assert_eq!(
                RemoteInterface::from_name("org.bluez.HandsfreeGateway"),
                Some(RemoteInterface::HandsfreeGateway)
            );
            assert_eq!(RemoteInterface::from_name("org.bluez.Media"), None);
        }

        #[test]
        fn profile_interfaces() {
            assert_eq!(RemoteInterface::AudioSink.profile(), Some(Profile::A2dp));
            assert_eq!(RemoteInterface::AudioSource.profile(), Some(Profile::A2dpSource));
            assert_eq!(RemoteInterface::Headset.profile(), Some(Profile::Hsp));
            assert_eq!(RemoteInterface::HandsfreeGateway.profile(), Some(Profile::Hfgw));
            assert_eq!(RemoteInterface::Audio.profile(), None);
            assert!(RemoteInterface::Audio.is_audio());
            assert!(!RemoteInterface::Device.is_audio());
        }

        #[test]
        fn uuid_lookup_ignores_case() {
            assert_eq!(
                interface_for_uuid("0000110B-0000-1000-8000-00805F9B34FB"),
                Some(RemoteInterface::AudioSink)
            );
            assert_eq!(interface_for_uuid(HSP_AG_UUID), Some(RemoteInterface::HandsfreeGateway));
            assert_eq!(interface_for_uuid(HFP_AG_UUID), Some(RemoteInterface::HandsfreeGateway));
            assert_eq!(interface_for_uuid(HSP_HS_UUID), Some(RemoteInterface::Headset));
            assert_eq!(interface_for_uuid(HFP_HS_UUID), Some(RemoteInterface::Headset));
            assert_eq!(interface_for_uuid(A2DP_SOURCE_UUID), Some(RemoteInterface::AudioSource));
            assert_eq!(interface_for_uuid("00001101-0000-1000-8000-00805f9b34fb"), None);
        }
    }
}
