//! Outgoing asynchronous calls to BlueZ.

use dbus::arg::{PropMap, RefArg, Variant};
use dbus::Message;
use tracing::{debug, warn};

use crate::bus::{self, Bus, BLUEZ_SERVICE, MEDIA_INTERFACE};
use crate::discovery::State;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::pending::PendingCall;
use crate::profile::RemoteInterface;

/// Build `org.bluez.Media.RegisterEndpoint` for one endpoint on an adapter.
pub fn register_endpoint_call(adapter: &str, endpoint: Endpoint) -> Result<Message> {
    let mut props = PropMap::new();
    props.insert(
        "UUID".to_string(),
        Variant(Box::new(endpoint.uuid().to_string()) as Box<dyn RefArg>),
    );
    props.insert("Codec".to_string(), Variant(Box::new(0u8) as Box<dyn RefArg>));
    props.insert(
        "Capabilities".to_string(),
        Variant(Box::new(endpoint.capabilities()) as Box<dyn RefArg>),
    );

    let msg = bus::method_call(BLUEZ_SERVICE, adapter, MEDIA_INTERFACE, "RegisterEndpoint")?;
    Ok(msg.append2(bus::object_path(endpoint.path())?, props))
}

impl<B: Bus> State<B> {
    fn send_tracked(&mut self, msg: Result<Message>, call: PendingCall) {
        match msg.and_then(|m| self.bus.send(m)) {
            Ok(serial) => self.pending.insert(serial, call),
            Err(e) => warn!("Failed to send {:?}: {}", call, e),
        }
    }

    /// Request all properties of `interface` at `path`.
    pub(crate) fn get_properties(&mut self, interface: RemoteInterface, path: &str) {
        let msg = bus::method_call(BLUEZ_SERVICE, path, interface.as_str(), "GetProperties");
        self.send_tracked(
            msg,
            PendingCall::GetProperties {
                interface,
                path: path.to_string(),
            },
        );
    }

    /// Start enumeration from the manager object.
    pub(crate) fn list_adapters(&mut self) {
        self.get_properties(RemoteInterface::Manager, "/");
    }

    pub(crate) fn found_adapter(&mut self, path: &str) {
        self.get_properties(RemoteInterface::Adapter, path);

        if self.config.register_endpoints {
            for endpoint in Endpoint::ALL {
                self.register_endpoint(path, endpoint);
            }
        }
    }

    fn register_endpoint(&mut self, adapter: &str, endpoint: Endpoint) {
        debug!("Registering {} on adapter {}", endpoint.path(), adapter);

        self.send_tracked(
            register_endpoint_call(adapter, endpoint),
            PendingCall::RegisterEndpoint {
                adapter: adapter.to_string(),
                endpoint: endpoint.path().to_string(),
            },
        );
    }

    /// Make sure a device exists, fetching its properties on first sighting.
    ///
    /// Profile interfaces are queried later, once its UUIDs are known.
    pub(crate) fn found_device(&mut self, path: &str) {
        if self.store.insert_device(path) {
            self.get_properties(RemoteInterface::Device, path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::MockBus;
    use crate::config::DiscoveryConfig;
    use dbus::arg::prop_cast;

    fn state(config: DiscoveryConfig) -> State<MockBus> {
        State::new(MockBus::default(), config)
    }

    #[test]
    fn get_properties_is_tracked() {
        let mut state = state(DiscoveryConfig::default());
        state.list_adapters();

        let sent = state.bus.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].path().as_deref(), Some("/"));
        assert_eq!(sent[0].interface().as_deref(), Some("org.bluez.Manager"));
        assert_eq!(sent[0].member().as_deref(), Some("GetProperties"));
        assert_eq!(sent[0].destination().as_deref(), Some(BLUEZ_SERVICE));

        let serial = sent[0].get_serial().unwrap();
        assert_eq!(
            state.pending.complete(serial),
            Some(PendingCall::GetProperties {
                interface: RemoteInterface::Manager,
                path: "/".into()
            })
        );
    }

    #[test]
    fn found_adapter_registers_every_endpoint() {
        let mut state = state(DiscoveryConfig::default());
        state.found_adapter("/org/bluez/hci0");

        let sent = state.bus.take_sent();
        assert_eq!(sent.len(), 5);
        assert_eq!(sent[0].interface().as_deref(), Some("org.bluez.Adapter"));

        let endpoints: Vec<String> = sent[1..]
            .iter()
            .map(|m| {
                assert_eq!(m.member().as_deref(), Some("RegisterEndpoint"));
                m.read1::<dbus::Path>().unwrap().to_string()
            })
            .collect();
        assert_eq!(
            endpoints,
            [
                "/MediaEndpoint/HFPAG",
                "/MediaEndpoint/HFPHS",
                "/MediaEndpoint/A2DPSource",
                "/MediaEndpoint/A2DPSink"
            ]
        );
        assert_eq!(state.pending.len(), 5);
    }

    #[test]
    fn endpoint_registration_can_be_disabled() {
        let mut state = state(DiscoveryConfig::default().with_endpoint_registration(false));
        state.found_adapter("/org/bluez/hci0");
        assert_eq!(state.bus.take_sent().len(), 1);
    }

    #[test]
    fn register_endpoint_properties() {
        let msg = register_endpoint_call("/org/bluez/hci0", Endpoint::A2dpSource).unwrap();
        let (path, props): (dbus::Path, PropMap) = msg.read2().unwrap();
        assert_eq!(&*path, "/MediaEndpoint/A2DPSource");
        assert_eq!(
            prop_cast::<String>(&props, "UUID").map(String::as_str),
            Some(crate::profile::A2DP_SOURCE_UUID)
        );
        assert_eq!(prop_cast::<u8>(&props, "Codec"), Some(&0));
        assert_eq!(
            prop_cast::<Vec<u8>>(&props, "Capabilities"),
            Some(&vec![0xff, 0xff, 2, 64])
        );

        let msg = register_endpoint_call("/org/bluez/hci0", Endpoint::HfpAg).unwrap();
        let (_, props): (dbus::Path, PropMap) = msg.read2().unwrap();
        assert_eq!(prop_cast::<Vec<u8>>(&props, "Capabilities"), Some(&vec![0]));
    }

    #[test]
    fn found_device_only_fetches_once() {
        let mut state = state(DiscoveryConfig::default());
        state.found_device("/org/bluez/hci0/dev_00");
        state.found_device("/org/bluez/hci0/dev_00");

        let sent = state.bus.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].interface().as_deref(), Some("org.bluez.Device"));
        assert!(state.store.contains_device("/org/bluez/hci0/dev_00"));
    }
}
