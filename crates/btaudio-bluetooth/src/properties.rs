//! Property synchronisation.
//!
//! Applies decoded BlueZ properties to the entity store, issuing follow-up
//! requests as new adapters, devices and profiles show up.

use dbus::Message;
use tracing::{debug, info, warn};

use crate::bus::Bus;
use crate::device::{InfoState, TriState};
use crate::discovery::State;
use crate::error::{BluetoothError, Result, NOT_SUPPORTED_ERROR};
use crate::events::DiscoveryEvent;
use crate::pending::PendingCall;
use crate::profile::{interface_for_uuid, AudioState, RemoteInterface, TransportState};
use crate::transport::clamp_gain;
use crate::variant::{message_properties, Property, PropertyValue};

impl<B: Bus> State<B> {
    /// Route a method return or error to the request it answers.
    pub(crate) fn handle_reply(&mut self, call: PendingCall, reply: Message) {
        match call {
            PendingCall::GetProperties { interface, path } => {
                self.get_properties_reply(interface, &path, reply)
            }
            PendingCall::RegisterEndpoint { adapter, endpoint } => {
                self.register_endpoint_reply(&adapter, &endpoint, reply)
            }
        }
    }

    fn get_properties_reply(&mut self, interface: RemoteInterface, path: &str, mut reply: Message) {
        let device_path = match interface {
            RemoteInterface::Manager | RemoteInterface::Adapter => None,
            _ => Some(path),
        };

        let old_any = match device_path {
            Some(path) => match self.store.device(path) {
                Some(device) => device.any_audio_connected(),
                None => {
                    debug!("Dropping {}.GetProperties() reply for removed device {}", interface, path);
                    return;
                }
            },
            None => false,
        };

        let result = reply.as_result().map(|_| ()).map_err(BluetoothError::from);

        if interface == RemoteInterface::Device {
            if let Some(device) = self.store.device_mut(path) {
                device.info_valid = if result.is_ok() {
                    InfoState::Valid
                } else {
                    InfoState::Failed
                };
            }
        }

        match result {
            Err(BluetoothError::ServiceUnknown) => {
                debug!("Bluetooth daemon is apparently not available.");
                self.remove_all_devices();
                return;
            }
            Err(e) => warn!("{}.GetProperties() failed: {}", interface, e),
            Ok(()) => match message_properties(&reply) {
                Ok(properties) => {
                    for property in properties {
                        if let Err(e) = self.apply_property(interface, path, property) {
                            warn!("Failed to apply {} property of {}: {}", interface, path, e);
                            break;
                        }
                    }
                }
                Err(e) => warn!("{}.GetProperties() reply for {}: {}", interface, path, e),
            },
        }

        if let Some(path) = device_path {
            self.check_connection_changed(path, old_any);
        }
    }

    fn register_endpoint_reply(&mut self, adapter: &str, endpoint: &str, mut reply: Message) {
        let Err(e) = reply.as_result().map(|_| ()) else {
            debug!("Endpoint {} registered on {}", endpoint, adapter);
            return;
        };

        if e.name() == Some(NOT_SUPPORTED_ERROR) {
            info!("Couldn't register endpoint {}, because BlueZ is configured to disable the endpoint type.", endpoint);
            return;
        }

        match BluetoothError::from(e) {
            BluetoothError::ServiceUnknown => {
                debug!("Bluetooth daemon is apparently not available.");
                self.remove_all_devices();
            }
            e => warn!("org.bluez.Media.RegisterEndpoint() of {} failed: {}", endpoint, e),
        }
    }

    /// Apply one property reported on `interface` at `path`.
    pub(crate) fn apply_property(&mut self, interface: RemoteInterface, path: &str, property: Property) -> Result<()> {
        match interface {
            RemoteInterface::Manager => {
                if let ("Adapters", PropertyValue::ObjectPathArray(adapters)) =
                    (property.key.as_str(), &property.value)
                {
                    for adapter in adapters {
                        self.found_adapter(adapter);
                    }
                }
                Ok(())
            }
            RemoteInterface::Adapter => {
                if let ("Devices", PropertyValue::ObjectPathArray(devices)) =
                    (property.key.as_str(), &property.value)
                {
                    for device in devices {
                        self.found_device(device);
                    }
                }
                Ok(())
            }
            RemoteInterface::Device => self.apply_device_property(path, property),
            RemoteInterface::MediaTransport => Ok(()),
            audio => self.apply_audio_property(audio, path, property),
        }
    }

    fn apply_device_property(&mut self, path: &str, property: Property) -> Result<()> {
        let Some(device) = self.store.device_mut(path) else {
            return Ok(());
        };

        match (property.key.as_str(), property.value) {
            ("Name", PropertyValue::String(name)) => device.name = Some(name),
            ("Alias", PropertyValue::String(alias)) => device.alias = Some(alias),
            ("Address", PropertyValue::String(address)) => device.address = Some(address),
            ("Paired", PropertyValue::Boolean(paired)) => device.paired = TriState::from(paired),
            ("Trusted", PropertyValue::Boolean(trusted)) => device.trusted = TriState::from(trusted),
            ("Class", PropertyValue::UInt32(class)) => device.class = Some(class),
            ("UUIDs", PropertyValue::StringArray(uuids)) => self.add_uuids(path, uuids),
            _ => {}
        }

        Ok(())
    }

    fn add_uuids(&mut self, path: &str, uuids: Vec<String>) {
        let mut has_audio = false;

        for uuid in uuids {
            let Some(device) = self.store.device_mut(path) else {
                return;
            };
            if device.has_uuid(&uuid) {
                continue;
            }
            device.uuids.insert(uuid.clone());

            let snapshot = device.clone();
            self.events.push(DiscoveryEvent::DeviceUuidAdded {
                device: snapshot,
                uuid: uuid.clone(),
            });

            if let Some(interface) = interface_for_uuid(&uuid) {
                self.get_properties(interface, path);
                has_audio = true;
            }
        }

        if has_audio {
            self.get_properties(RemoteInterface::Audio, path);
        }
    }

    fn apply_audio_property(&mut self, interface: RemoteInterface, path: &str, property: Property) -> Result<()> {
        let profile = interface.profile();
        let Some(device) = self.store.device_mut(path) else {
            return Ok(());
        };

        match (property.key.as_str(), property.value) {
            ("State", PropertyValue::String(value)) => {
                debug!("Device {} interface {} property 'State' changed to value '{}'", path, interface, value);

                let state = AudioState::parse(&value)
                    .ok_or_else(|| BluetoothError::Malformed(format!("Invalid audio state '{}'", value)))?;

                let Some(profile) = profile else {
                    device.audio_state = state;
                    return Ok(());
                };

                device.profile_state[profile.index()] = state;

                if let Some(transport) = device.transport_mut(profile) {
                    let new_state = TransportState::from(state);
                    if transport.state != new_state {
                        transport.state = new_state;
                        let snapshot = transport.clone();
                        self.events.push(DiscoveryEvent::TransportStateChanged(snapshot));
                    }
                }
            }
            ("MicrophoneGain", PropertyValue::UInt16(value)) => {
                debug!("Device {} property 'MicrophoneGain' changed to value '{}'", path, value);

                let transport = profile
                    .and_then(|p| device.transport_mut(p))
                    .ok_or_else(|| BluetoothError::NoTransport { device: path.to_string() })?;

                let gain = clamp_gain(value);
                if transport.microphone_gain != gain {
                    transport.microphone_gain = gain;
                    let snapshot = transport.clone();
                    self.events.push(DiscoveryEvent::TransportMicrophoneGainChanged(snapshot));
                }
            }
            ("SpeakerGain", PropertyValue::UInt16(value)) => {
                debug!("Device {} property 'SpeakerGain' changed to value '{}'", path, value);

                let transport = profile
                    .and_then(|p| device.transport_mut(p))
                    .ok_or_else(|| BluetoothError::NoTransport { device: path.to_string() })?;

                let gain = clamp_gain(value);
                if transport.speaker_gain != gain {
                    transport.speaker_gain = gain;
                    let snapshot = transport.clone();
                    self.events.push(DiscoveryEvent::TransportSpeakerGainChanged(snapshot));
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Apply a MediaTransport property. Only NREC is tracked.
    pub(crate) fn apply_transport_property(&mut self, path: &str, property: Property) -> Result<()> {
        let Some(transport) = self.store.transport_mut(path) else {
            return Err(BluetoothError::UnknownTransport(path.to_string()));
        };

        if let ("NREC", PropertyValue::Boolean(nrec)) = (property.key.as_str(), property.value) {
            debug!("Transport {} property 'NREC' changed to value '{}'", path, nrec);
            if transport.nrec != nrec {
                transport.nrec = nrec;
                let snapshot = transport.clone();
                self.events.push(DiscoveryEvent::TransportNrecChanged(snapshot));
            }
        }

        Ok(())
    }

    /// Raise a connection change if the device's connected state flipped.
    pub(crate) fn check_connection_changed(&mut self, path: &str, old_any: bool) {
        let flipped = self
            .store
            .device(path)
            .map_or(false, |d| d.any_audio_connected() != old_any);
        if flipped {
            self.run_callback(path, false);
        }
    }

    fn run_callback(&mut self, path: &str, dead: bool) {
        let Some(device) = self.store.device_mut(path) else {
            return;
        };
        if !device.is_audio_ready() {
            return;
        }

        device.dead = dead;
        let snapshot = device.clone();
        self.events.push(DiscoveryEvent::DeviceConnectionChanged(snapshot));
    }

    /// Forget a device, disconnecting its transports.
    pub(crate) fn remove_device(&mut self, path: &str) {
        self.run_callback(path, true);

        let Some(device) = self.store.remove_device(path) else {
            return;
        };
        debug!("Removed device {}", path);

        for mut transport in device.transports.into_iter().flatten() {
            transport.state = TransportState::Disconnected;
            self.events.push(DiscoveryEvent::TransportStateChanged(transport));
        }
    }

    pub(crate) fn remove_all_devices(&mut self) {
        for path in self.store.device_paths() {
            self.remove_device(&path);
        }
    }
}
