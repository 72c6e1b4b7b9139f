//! Connection seam to the system bus.
//!
//! Discovery only needs a handful of primitives from the bus library: queue an
//! outgoing message, make a blocking round-trip, pump the socket and pop
//! whatever arrived. [`Bus`] captures exactly that, so the state machine can be
//! driven by a real [`Channel`] or by a scripted bus in tests.

use std::ffi::CString;
use std::time::Duration;

use dbus::channel::{BusType, Channel, Sender};
use dbus::strings::{BusName, ErrorName, Interface, Member, Path};
use dbus::Message;

use crate::error::{BluetoothError, Result};
use crate::profile::RemoteInterface;

/// Well-known name of the Bluetooth daemon.
pub const BLUEZ_SERVICE: &str = "org.bluez";

/// Bus daemon name, path and interface.
pub const DBUS_SERVICE: &str = "org.freedesktop.DBus";
pub const DBUS_PATH: &str = "/org/freedesktop/DBus";
pub const DBUS_INTERFACE: &str = "org.freedesktop.DBus";

pub const INTROSPECTABLE_INTERFACE: &str = "org.freedesktop.DBus.Introspectable";
pub const MEDIA_INTERFACE: &str = "org.bluez.Media";
pub const MEDIA_ENDPOINT_INTERFACE: &str = "org.bluez.MediaEndpoint";

/// Blocking calls made on behalf of the audio thread never time out.
pub const BLOCKING_CALL_TIMEOUT: Duration = Duration::from_millis(i32::MAX as u64);

/// Minimal bus surface used by discovery.
pub trait Bus {
    /// Our unique connection name, if registered.
    fn unique_name(&self) -> Option<String>;

    /// Queue a message and return the serial assigned to it.
    fn send(&self, msg: Message) -> Result<u32>;

    /// Send a method call and wait for its reply.
    fn call_blocking(&self, msg: Message, timeout: Duration) -> Result<Message>;

    /// Flush outgoing and read incoming data, waiting at most `timeout`.
    fn read_write(&self, timeout: Option<Duration>) -> Result<()>;

    /// Take the next received message.
    fn pop_message(&self) -> Option<Message>;

    /// Block until everything queued has been written out.
    fn flush(&self);
}

impl Bus for Channel {
    fn unique_name(&self) -> Option<String> {
        Channel::unique_name(self).map(str::to_owned)
    }

    fn send(&self, msg: Message) -> Result<u32> {
        Sender::send(self, msg).map_err(|_| BluetoothError::Disconnected)
    }

    fn call_blocking(&self, msg: Message, timeout: Duration) -> Result<Message> {
        Ok(self.send_with_reply_and_block(msg, timeout)?)
    }

    fn read_write(&self, timeout: Option<Duration>) -> Result<()> {
        Channel::read_write(self, timeout).map_err(|_| BluetoothError::Disconnected)
    }

    fn pop_message(&self) -> Option<Message> {
        Channel::pop_message(self)
    }

    fn flush(&self) {
        Channel::flush(self)
    }
}

/// Open a private connection to the given bus.
pub fn open(bus_type: BusType) -> Result<Channel> {
    Ok(Channel::get_private(bus_type)?)
}

/// Build a method call, mapping invalid names to [`BluetoothError::Malformed`].
pub fn method_call(destination: &str, path: &str, interface: &str, member: &str) -> Result<Message> {
    let destination = BusName::new(destination).map_err(BluetoothError::Malformed)?;
    let path = Path::new(path).map_err(BluetoothError::Malformed)?;
    let interface = Interface::new(interface).map_err(BluetoothError::Malformed)?;
    let member = Member::new(member).map_err(BluetoothError::Malformed)?;

    Message::new_method_call(destination, path, interface, member).map_err(BluetoothError::Malformed)
}

/// Error reply to `msg` with the given error name and message text.
pub fn error_reply(msg: &Message, name: &str, text: &str) -> Result<Message> {
    let name = ErrorName::new(name.to_owned()).map_err(BluetoothError::Malformed)?;
    let text = CString::new(text).map_err(|e| BluetoothError::Malformed(e.to_string()))?;
    Ok(msg.error(&name, &text))
}

/// Validate an object path received as a plain string.
pub fn object_path(path: &str) -> Result<Path<'static>> {
    Path::new(path.to_owned()).map_err(BluetoothError::Malformed)
}

/// Signal subscriptions installed while discovery runs.
pub fn match_rules() -> Vec<String> {
    let mut rules = vec![format!(
        "type='signal',sender='{}',interface='{}',member='NameOwnerChanged',arg0='{}'",
        DBUS_SERVICE, DBUS_INTERFACE, BLUEZ_SERVICE
    )];

    let bluez_signals = [
        (RemoteInterface::Manager, "AdapterAdded"),
        (RemoteInterface::Manager, "AdapterRemoved"),
        (RemoteInterface::Adapter, "DeviceRemoved"),
        (RemoteInterface::Adapter, "DeviceCreated"),
        (RemoteInterface::Device, "PropertyChanged"),
        (RemoteInterface::Audio, "PropertyChanged"),
        (RemoteInterface::Headset, "PropertyChanged"),
        (RemoteInterface::AudioSink, "PropertyChanged"),
        (RemoteInterface::AudioSource, "PropertyChanged"),
        (RemoteInterface::HandsfreeGateway, "PropertyChanged"),
        (RemoteInterface::MediaTransport, "PropertyChanged"),
    ];

    rules.extend(bluez_signals.iter().map(|(iface, member)| {
        format!(
            "type='signal',sender='{}',interface='{}',member='{}'",
            BLUEZ_SERVICE,
            iface.as_str(),
            member
        )
    }));

    rules
}

/// `AddMatch` or `RemoveMatch` call to the bus daemon.
pub fn match_call(member: &str, rule: &str) -> Result<Message> {
    Ok(method_call(DBUS_SERVICE, DBUS_PATH, DBUS_INTERFACE, member)?.append1(rule))
}
