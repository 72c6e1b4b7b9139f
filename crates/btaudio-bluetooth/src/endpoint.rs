//! Media endpoint service.
//!
//! BlueZ calls back into these objects to negotiate, create and tear down
//! transports. One object path per endpoint, each bound to a profile.

use btaudio_core::{select_configuration, SbcInfo};
use dbus::arg::{ArgType, Iter};
use dbus::strings::Path;
use dbus::Message;
use tracing::{debug, warn};

use crate::bus::{self, Bus, INTROSPECTABLE_INTERFACE, MEDIA_ENDPOINT_INTERFACE};
use crate::discovery::State;
use crate::error::{BluetoothError, Result};
use crate::events::DiscoveryEvent;
use crate::profile::{
    Profile, TransportState, A2DP_SINK_UUID, A2DP_SOURCE_UUID, HFP_AG_UUID, HFP_HS_UUID,
};
use crate::transport::Transport;
use crate::variant::{read_property, PropertyValue};

/// Error name of every failed endpoint call.
pub const ENDPOINT_ERROR: &str = "org.bluez.MediaEndpoint.Error.InvalidArguments";

pub const INTROSPECT_XML: &str = concat!(
    "<!DOCTYPE node PUBLIC \"-//freedesktop//DTD D-BUS Object Introspection 1.0//EN\"\n",
    "\"http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd\">\n",
    "<node>",
    " <interface name=\"org.bluez.MediaEndpoint\">",
    "  <method name=\"SetConfiguration\">",
    "   <arg name=\"transport\" direction=\"in\" type=\"o\"/>",
    "   <arg name=\"configuration\" direction=\"in\" type=\"ay\"/>",
    "  </method>",
    "  <method name=\"SelectConfiguration\">",
    "   <arg name=\"capabilities\" direction=\"in\" type=\"ay\"/>",
    "   <arg name=\"configuration\" direction=\"out\" type=\"ay\"/>",
    "  </method>",
    "  <method name=\"ClearConfiguration\">",
    "  </method>",
    "  <method name=\"Release\">",
    "  </method>",
    " </interface>",
    " <interface name=\"org.freedesktop.DBus.Introspectable\">",
    "  <method name=\"Introspect\">",
    "   <arg name=\"data\" type=\"s\" direction=\"out\"/>",
    "  </method>",
    " </interface>",
    "</node>",
);

/// Endpoint objects we export, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    HfpAg,
    HfpHs,
    A2dpSource,
    A2dpSink,
}

impl Endpoint {
    pub const ALL: [Endpoint; 4] = [
        Endpoint::HfpAg,
        Endpoint::HfpHs,
        Endpoint::A2dpSource,
        Endpoint::A2dpSink,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Endpoint::HfpAg => "/MediaEndpoint/HFPAG",
            Endpoint::HfpHs => "/MediaEndpoint/HFPHS",
            Endpoint::A2dpSource => "/MediaEndpoint/A2DPSource",
            Endpoint::A2dpSink => "/MediaEndpoint/A2DPSink",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.path() == path)
    }

    pub fn uuid(self) -> &'static str {
        match self {
            Endpoint::HfpAg => HFP_AG_UUID,
            Endpoint::HfpHs => HFP_HS_UUID,
            Endpoint::A2dpSource => A2DP_SOURCE_UUID,
            Endpoint::A2dpSink => A2DP_SINK_UUID,
        }
    }

    /// Profile of transports configured through this endpoint.
    pub fn profile(self) -> Profile {
        match self {
            Endpoint::HfpAg => Profile::Hsp,
            Endpoint::HfpHs => Profile::Hfgw,
            Endpoint::A2dpSource => Profile::A2dp,
            Endpoint::A2dpSink => Profile::A2dpSource,
        }
    }

    /// Capabilities advertised at registration.
    pub fn capabilities(self) -> Vec<u8> {
        if self.profile().is_a2dp() {
            SbcInfo::full_capabilities().to_bytes().to_vec()
        } else {
            vec![0]
        }
    }
}

/// Transport properties passed to SetConfiguration.
#[derive(Debug, Default)]
struct TransportProperties {
    uuid: Option<String>,
    device: Option<String>,
    nrec: bool,
    configuration: Vec<u8>,
}

fn read_transport_properties(args: &mut Iter<'_>) -> Result<TransportProperties> {
    if args.arg_type() != ArgType::Array {
        return Err(BluetoothError::Malformed("Properties argument missing".into()));
    }
    let mut entries = args
        .recurse(ArgType::Array)
        .ok_or_else(|| BluetoothError::Malformed("Properties argument missing".into()))?;
    if entries.arg_type() != ArgType::DictEntry {
        return Err(BluetoothError::Malformed("Empty transport properties".into()));
    }

    let mut props = TransportProperties::default();
    while entries.arg_type() == ArgType::DictEntry {
        let mut entry = entries
            .recurse(ArgType::DictEntry)
            .ok_or_else(|| BluetoothError::Malformed("Unreadable transport property".into()))?;
        let prop = read_property(&mut entry)?;
        let key = prop.key.as_str();

        if key.eq_ignore_ascii_case("UUID") {
            match prop.value {
                PropertyValue::String(uuid) => props.uuid = Some(uuid),
                _ => return Err(BluetoothError::Malformed("UUID is not a string".into())),
            }
        } else if key.eq_ignore_ascii_case("Device") {
            match prop.value {
                PropertyValue::ObjectPath(path) => props.device = Some(path),
                _ => return Err(BluetoothError::Malformed("Device is not an object path".into())),
            }
        } else if key.eq_ignore_ascii_case("NREC") {
            match prop.value {
                PropertyValue::Boolean(nrec) => props.nrec = nrec,
                _ => return Err(BluetoothError::Malformed("NREC is not a boolean".into())),
            }
        } else if key.eq_ignore_ascii_case("Configuration") {
            match prop.value {
                PropertyValue::ByteArray(bytes) => props.configuration = bytes,
                _ => return Err(BluetoothError::Malformed("Configuration is not a byte array".into())),
            }
        }

        entries.next();
    }

    Ok(props)
}

fn error_reply(msg: &Message, text: &str) -> Result<Message> {
    bus::error_reply(msg, ENDPOINT_ERROR, text)
}

impl<B: Bus> State<B> {
    /// Answer a method call addressed to one of our endpoints.
    ///
    /// Returns false if the call is not ours.
    pub(crate) fn handle_endpoint_call(&mut self, msg: &Message) -> bool {
        let Some(endpoint) = msg.path().and_then(|p| Endpoint::from_path(&p)) else {
            return false;
        };
        let interface = msg.interface();
        let member = msg.member();

        let reply = match (interface.as_deref(), member.as_deref()) {
            (Some(INTROSPECTABLE_INTERFACE), Some("Introspect")) => {
                Ok(msg.method_return().append1(INTROSPECT_XML))
            }
            (Some(MEDIA_ENDPOINT_INTERFACE), Some("SetConfiguration")) => {
                match self.set_configuration(msg, endpoint) {
                    Ok(()) => Ok(msg.method_return()),
                    Err(e) => {
                        warn!("{}.SetConfiguration: {}", MEDIA_ENDPOINT_INTERFACE, e);
                        error_reply(msg, "Unable to set configuration")
                    }
                }
            }
            (Some(MEDIA_ENDPOINT_INTERFACE), Some("SelectConfiguration")) => {
                match self.select_configuration(msg, endpoint) {
                    Ok(config) => Ok(msg.method_return().append1(config)),
                    Err(e) => {
                        warn!("{}.SelectConfiguration: {}", MEDIA_ENDPOINT_INTERFACE, e);
                        error_reply(msg, "Unable to select configuration")
                    }
                }
            }
            (Some(MEDIA_ENDPOINT_INTERFACE), Some("ClearConfiguration")) => {
                match self.clear_configuration(msg) {
                    Ok(()) => Ok(msg.method_return()),
                    Err(e) => {
                        warn!("{}.ClearConfiguration: {}", MEDIA_ENDPOINT_INTERFACE, e);
                        error_reply(msg, "Unable to clear configuration")
                    }
                }
            }
            _ => return false,
        };

        match reply {
            Ok(reply) => {
                if let Err(e) = self.bus.send(reply) {
                    warn!("Failed to reply to {}: {}", endpoint.path(), e);
                }
            }
            Err(e) => warn!("Could not build reply for {}: {}", endpoint.path(), e),
        }

        true
    }

    fn set_configuration(&mut self, msg: &Message, endpoint: Endpoint) -> Result<()> {
        let mut args = msg.iter_init();
        let path: Path<'_> = args.read()?;
        let path = path.to_string();

        if self.store.contains_transport(&path) {
            return Err(BluetoothError::AlreadyConfigured(path));
        }

        let props = read_transport_properties(&mut args)?;
        let device_path = props
            .device
            .ok_or_else(|| BluetoothError::Malformed("Device property missing".into()))?;

        self.found_device(&device_path);

        let profile = endpoint.profile();
        let profile_state = match self.store.device(&device_path) {
            Some(device) if device.transport(profile).is_some() => {
                return Err(BluetoothError::ProfileInUse {
                    device: device_path,
                    profile,
                });
            }
            Some(device) => device.state(profile),
            None => return Err(BluetoothError::Malformed(format!("Unknown device {}", device_path))),
        };

        let owner = msg
            .sender()
            .map(|s| s.to_string())
            .ok_or_else(|| BluetoothError::Malformed("Call has no sender".into()))?;

        let mut transport = Transport::new(
            device_path.clone(),
            owner,
            path.clone(),
            profile,
            props.configuration,
            profile_state,
        );
        transport.nrec = props.nrec;

        self.store
            .attach_transport(transport)
            .map_err(|_| BluetoothError::ProfileInUse {
                device: device_path,
                profile,
            })?;

        debug!(
            "Transport {} profile {} available (uuid {})",
            path,
            profile,
            props.uuid.as_deref().unwrap_or("unknown")
        );
        Ok(())
    }

    fn select_configuration(&self, msg: &Message, endpoint: Endpoint) -> Result<Vec<u8>> {
        let capabilities: Vec<u8> = msg.read1()?;

        if !endpoint.profile().is_a2dp() {
            return Ok(capabilities);
        }

        let caps = SbcInfo::from_bytes(&capabilities)?;
        let config = select_configuration(&caps, &self.config.sample_spec)?;
        Ok(config.to_bytes().to_vec())
    }

    fn clear_configuration(&mut self, msg: &Message) -> Result<()> {
        let path: Path<'_> = msg.read1()?;

        if let Some(mut transport) = self.store.detach_transport(&path) {
            debug!("Clearing transport {} profile {}", transport.path, transport.profile);
            transport.state = TransportState::Disconnected;
            self.events.push(DiscoveryEvent::TransportStateChanged(transport));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::MockBus;
    use crate::config::DiscoveryConfig;
    use crate::profile::AudioState;
    use dbus::arg::{PropMap, RefArg, Variant};
    use dbus::message::MessageType;
    use dbus::strings::BusName;

    const DEV: &str = "/org/bluez/hci0/dev_00_11_22_33_44_55";
    const FD: &str = "/org/bluez/hci0/dev_00_11_22_33_44_55/fd0";
    const PEER: &str = ":1.7";

    fn state() -> State<MockBus> {
        State::new(MockBus::default(), DiscoveryConfig::default())
    }

    fn call(endpoint: &str, interface: &str, member: &str) -> Message {
        let mut msg = Message::new_method_call(":1.42", endpoint, interface, member).unwrap();
        msg.set_serial(500);
        msg.set_sender(Some(BusName::new(PEER).unwrap()));
        msg
    }

    fn transport_props(device: &str, config: Vec<u8>) -> PropMap {
        let mut props = PropMap::new();
        props.insert("UUID".into(), Variant(Box::new(A2DP_SINK_UUID.to_string()) as Box<dyn RefArg>));
        props.insert("Device".into(), Variant(Box::new(Path::from(device.to_string())) as Box<dyn RefArg>));
        props.insert("Configuration".into(), Variant(Box::new(config) as Box<dyn RefArg>));
        props
    }

    fn set_configuration(endpoint: Endpoint, transport: &str, props: PropMap) -> Message {
        call(endpoint.path(), MEDIA_ENDPOINT_INTERFACE, "SetConfiguration")
            .append2(Path::from(transport.to_string()), props)
    }

    fn last_reply(state: &State<MockBus>) -> Message {
        state.bus.sent.borrow_mut().pop().expect("no reply sent")
    }

    fn error_name(mut reply: Message) -> String {
        reply.as_result().unwrap_err().name().unwrap().to_string()
    }

    mod endpoint {
        use super::*;

        #[test]
        fn paths_map_to_profiles() {
            assert_eq!(Endpoint::from_path("/MediaEndpoint/HFPAG"), Some(Endpoint::HfpAg));
            assert_eq!(Endpoint::HfpAg.profile(), Profile::Hsp);
            assert_eq!(Endpoint::HfpHs.profile(), Profile::Hfgw);
            assert_eq!(Endpoint::A2dpSource.profile(), Profile::A2dp);
            assert_eq!(Endpoint::A2dpSink.profile(), Profile::A2dpSource);
            assert_eq!(Endpoint::from_path("/MediaEndpoint/Other"), None);
        }

        #[test]
        fn capabilities() {
            assert_eq!(Endpoint::HfpHs.capabilities(), vec![0]);
            assert_eq!(Endpoint::A2dpSink.capabilities(), vec![0xff, 0xff, 2, 64]);
        }
    }

    mod dispatch {
        use super::*;

        #[test]
        fn introspect_returns_xml() {
            let mut state = state();
            assert!(state.handle_endpoint_call(&call(
                "/MediaEndpoint/A2DPSink",
                INTROSPECTABLE_INTERFACE,
                "Introspect"
            )));
            let reply = last_reply(&state);
            assert_eq!(reply.msg_type(), MessageType::MethodReturn);
            let xml: &str = reply.read1().unwrap();
            assert!(xml.contains("SelectConfiguration"));
            assert!(xml.contains("org.freedesktop.DBus.Introspectable"));
        }

        #[test]
        fn foreign_paths_and_methods_are_not_ours() {
            let mut state = state();
            assert!(!state.handle_endpoint_call(&call("/Other", MEDIA_ENDPOINT_INTERFACE, "SetConfiguration")));
            assert!(!state.handle_endpoint_call(&call("/MediaEndpoint/HFPAG", MEDIA_ENDPOINT_INTERFACE, "Release")));
            assert!(state.bus.sent.borrow().is_empty());
        }
    }

    mod set_configuration {
        use super::*;

        #[test]
        fn creates_transport() {
            let mut state = state();
            let msg = set_configuration(Endpoint::A2dpSource, FD, transport_props(DEV, vec![0x21, 0x15, 2, 53]));
            assert!(state.handle_endpoint_call(&msg));

            let reply = last_reply(&state);
            assert_eq!(reply.msg_type(), MessageType::MethodReturn);

            let transport = state.store.transport(FD).unwrap();
            assert_eq!(transport.profile, Profile::A2dp);
            assert_eq!(transport.owner, PEER);
            assert_eq!(transport.device_path, DEV);
            assert_eq!(transport.configuration, vec![0x21, 0x15, 2, 53]);
            assert_eq!(transport.state, TransportState::Disconnected);

            // Unknown device was created and its properties requested.
            let sent = state.bus.take_sent();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].interface().as_deref(), Some("org.bluez.Device"));
        }

        #[test]
        fn transport_state_follows_profile_state() {
            let mut state = state();
            state.found_device(DEV);
            state.store.device_mut(DEV).unwrap().profile_state[Profile::Hsp.index()] = AudioState::Playing;

            let mut props = transport_props(DEV, vec![0]);
            props.insert("nrec".into(), Variant(Box::new(true) as Box<dyn RefArg>));
            state.handle_endpoint_call(&set_configuration(Endpoint::HfpAg, FD, props));

            let transport = state.store.transport(FD).unwrap();
            assert_eq!(transport.state, TransportState::Playing);
            assert!(transport.nrec);
        }

        #[test]
        fn rejects_already_configured_path() {
            let mut state = state();
            state.handle_endpoint_call(&set_configuration(Endpoint::A2dpSource, FD, transport_props(DEV, vec![])));
            last_reply(&state);

            state.handle_endpoint_call(&set_configuration(Endpoint::HfpAg, FD, transport_props(DEV, vec![])));
            assert_eq!(error_name(last_reply(&state)), ENDPOINT_ERROR);
            assert_eq!(state.store.transport_count(), 1);
        }

        #[test]
        fn rejects_second_transport_for_profile() {
            let mut state = state();
            state.handle_endpoint_call(&set_configuration(Endpoint::A2dpSource, FD, transport_props(DEV, vec![])));
            state.handle_endpoint_call(&set_configuration(
                Endpoint::A2dpSource,
                "/org/bluez/hci0/dev_00_11_22_33_44_55/fd1",
                transport_props(DEV, vec![]),
            ));

            assert_eq!(error_name(last_reply(&state)), ENDPOINT_ERROR);
            assert_eq!(state.store.transport_count(), 1);
        }

        #[test]
        fn rejects_mistyped_property() {
            let mut state = state();
            let mut props = transport_props(DEV, vec![]);
            props.insert("UUID".into(), Variant(Box::new(5u32) as Box<dyn RefArg>));
            state.handle_endpoint_call(&set_configuration(Endpoint::A2dpSource, FD, props));

            let mut reply = last_reply(&state);
            let err = reply.as_result().unwrap_err();
            assert_eq!(err.name(), Some(ENDPOINT_ERROR));
            assert_eq!(err.message(), Some("Unable to set configuration"));
            assert_eq!(state.store.transport_count(), 0);
        }

        #[test]
        fn rejects_empty_properties() {
            let mut state = state();
            state.handle_endpoint_call(&set_configuration(Endpoint::A2dpSource, FD, PropMap::new()));
            assert_eq!(error_name(last_reply(&state)), ENDPOINT_ERROR);
        }

        #[test]
        fn rejects_missing_device() {
            let mut state = state();
            let mut props = transport_props(DEV, vec![]);
            props.remove("Device");
            state.handle_endpoint_call(&set_configuration(Endpoint::A2dpSource, FD, props));
            assert_eq!(error_name(last_reply(&state)), ENDPOINT_ERROR);
            assert_eq!(state.store.device_count(), 0);
        }
    }

    mod select_configuration {
        use super::*;

        fn select(endpoint: Endpoint, capabilities: Vec<u8>) -> Message {
            call(endpoint.path(), MEDIA_ENDPOINT_INTERFACE, "SelectConfiguration").append1(capabilities)
        }

        #[test]
        fn negotiates_sbc() {
            let mut state = state();
            state.handle_endpoint_call(&select(Endpoint::A2dpSource, vec![0xff, 0xff, 2, 64]));

            let reply = last_reply(&state);
            let config: Vec<u8> = reply.read1().unwrap();
            // 44.1 kHz joint stereo, 16 blocks, 8 subbands, loudness, bitpool 2..53
            assert_eq!(config, vec![0x21, 0x15, 2, 53]);
        }

        #[test]
        fn telephony_echoes_capabilities() {
            let mut state = state();
            state.handle_endpoint_call(&select(Endpoint::HfpHs, vec![0]));
            let config: Vec<u8> = last_reply(&state).read1().unwrap();
            assert_eq!(config, vec![0]);
        }

        #[test]
        fn failed_negotiation_is_an_error() {
            let mut state = state();
            // No frequencies offered.
            state.handle_endpoint_call(&select(Endpoint::A2dpSink, vec![0x0f, 0xff, 2, 64]));
            let mut reply = last_reply(&state);
            assert_eq!(reply.as_result().unwrap_err().message(), Some("Unable to select configuration"));
        }

        #[test]
        fn wrong_length_is_an_error() {
            let mut state = state();
            state.handle_endpoint_call(&select(Endpoint::A2dpSink, vec![0xff, 0xff]));
            assert_eq!(error_name(last_reply(&state)), ENDPOINT_ERROR);
        }
    }

    mod clear_configuration {
        use super::*;

        fn clear(transport: &str) -> Message {
            call("/MediaEndpoint/A2DPSource", MEDIA_ENDPOINT_INTERFACE, "ClearConfiguration")
                .append1(Path::from(transport.to_string()))
        }

        #[test]
        fn removes_known_transport() {
            let mut state = state();
            state.handle_endpoint_call(&set_configuration(Endpoint::A2dpSource, FD, transport_props(DEV, vec![])));
            state.events.clear();

            state.handle_endpoint_call(&clear(FD));
            assert_eq!(last_reply(&state).msg_type(), MessageType::MethodReturn);
            assert!(!state.store.contains_transport(FD));
            assert!(state.store.device(DEV).unwrap().transport(Profile::A2dp).is_none());

            assert_eq!(state.events.len(), 1);
            match &state.events[0] {
                DiscoveryEvent::TransportStateChanged(t) => {
                    assert_eq!(t.path, FD);
                    assert_eq!(t.state, TransportState::Disconnected);
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }

        #[test]
        fn unknown_path_is_a_no_op() {
            let mut state = state();
            state.handle_endpoint_call(&clear(FD));
            assert_eq!(last_reply(&state).msg_type(), MessageType::MethodReturn);
            assert!(state.events.is_empty());
        }

        #[test]
        fn missing_argument_is_an_error() {
            let mut state = state();
            state.handle_endpoint_call(&call(
                "/MediaEndpoint/A2DPSource",
                MEDIA_ENDPOINT_INTERFACE,
                "ClearConfiguration",
            ));
            assert_eq!(error_name(last_reply(&state)), ENDPOINT_ERROR);
        }
    }
}
