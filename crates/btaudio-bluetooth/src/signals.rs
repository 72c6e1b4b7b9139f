//! Routing of unsolicited bus signals.

use dbus::strings::Path;
use dbus::Message;
use tracing::{debug, info, trace, warn};

use crate::bus::{Bus, BLUEZ_SERVICE, DBUS_INTERFACE};
use crate::discovery::State;
use crate::error::Result;
use crate::profile::RemoteInterface;
use crate::variant::signal_property;

fn read_path(msg: &Message) -> Result<String> {
    let path: Path<'_> = msg.read1()?;
    Ok(path.to_string())
}

impl<B: Bus> State<B> {
    /// Apply one signal. Signals that fail to parse are logged and dropped.
    pub(crate) fn handle_signal(&mut self, msg: &Message) {
        let (Some(interface), Some(member)) = (msg.interface(), msg.member()) else {
            return;
        };
        let object = msg.path().map(|p| p.to_string()).unwrap_or_default();

        match (&*interface, &*member) {
            ("org.bluez.Adapter", "DeviceRemoved") => match read_path(msg) {
                Ok(path) => {
                    debug!("Device {} removed", path);
                    self.remove_device(&path);
                }
                Err(e) => warn!("Failed to parse org.bluez.Adapter.DeviceRemoved: {}", e),
            },
            ("org.bluez.Adapter", "DeviceCreated") => match read_path(msg) {
                Ok(path) => {
                    debug!("Device {} created", path);
                    self.found_device(&path);
                }
                Err(e) => warn!("Failed to parse org.bluez.Adapter.DeviceCreated: {}", e),
            },
            ("org.bluez.Manager", "AdapterAdded") => match read_path(msg) {
                Ok(path) => {
                    debug!("Adapter {} created", path);
                    self.found_adapter(&path);
                }
                Err(e) => warn!("Failed to parse org.bluez.Manager.AdapterAdded: {}", e),
            },
            (DBUS_INTERFACE, "NameOwnerChanged") => self.name_owner_changed(msg),
            ("org.bluez.MediaTransport", "PropertyChanged") => self.transport_property_changed(&object, msg),
            (name, "PropertyChanged") => match RemoteInterface::from_name(name) {
                Some(iface) if iface == RemoteInterface::Device || iface.is_audio() => {
                    self.device_property_changed(iface, &object, msg)
                }
                _ => trace!("Ignoring {}.PropertyChanged on {}", name, object),
            },
            _ => trace!("Ignoring signal {}.{} on {}", &*interface, &*member, object),
        }
    }

    fn name_owner_changed(&mut self, msg: &Message) {
        let (name, old_owner, new_owner): (&str, &str, &str) = match msg.read3() {
            Ok(args) => args,
            Err(e) => {
                warn!("Failed to parse org.freedesktop.DBus.NameOwnerChanged: {}", e);
                return;
            }
        };

        if name != BLUEZ_SERVICE {
            return;
        }

        if !old_owner.is_empty() {
            info!("Bluetooth daemon disappeared.");
            self.remove_all_devices();
        }

        if !new_owner.is_empty() {
            info!("Bluetooth daemon appeared.");
            self.list_adapters();
        }
    }

    fn transport_property_changed(&mut self, path: &str, msg: &Message) {
        if !self.store.contains_transport(path) {
            trace!("PropertyChanged for unknown transport {}", path);
            return;
        }

        let result = signal_property(msg).and_then(|prop| self.apply_transport_property(path, prop));
        if let Err(e) = result {
            warn!("Failed to parse MediaTransport.PropertyChanged on {}: {}", path, e);
        }
    }

    fn device_property_changed(&mut self, interface: RemoteInterface, path: &str, msg: &Message) {
        let Some(old_any) = self.store.device(path).map(|d| d.any_audio_connected()) else {
            return;
        };

        let result = signal_property(msg).and_then(|prop| self.apply_property(interface, path, prop));
        if let Err(e) = result {
            warn!("Failed to parse {}.PropertyChanged on {}: {}", interface, path, e);
            return;
        }

        self.check_connection_changed(path, old_any);
    }
}
