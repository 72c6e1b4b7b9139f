//! Discovery context.
//!
//! Owns the bus connection, the entity store and the event hooks, and runs
//! the single-threaded dispatch loop: every inbound message is applied in
//! full, then the events it raised are delivered to the hooks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dbus::arg::{OwnedFd, Variant};
use dbus::channel::Channel;
use dbus::message::MessageType;
use dbus::Message;
use tracing::{debug, info, trace, warn};

use crate::bus::{self, Bus, BLOCKING_CALL_TIMEOUT, BLUEZ_SERVICE};
use crate::config::DiscoveryConfig;
use crate::device::Device;
use crate::error::{BluetoothError, Result};
use crate::events::{DiscoveryEvent, EventHandler, HookId, HookKind, Hooks};
use crate::pending::PendingCalls;
use crate::profile::{Profile, RemoteInterface};
use crate::store::EntityStore;
use crate::transport::{clamp_gain, AcquiredTransport, Transport};

const UNKNOWN_METHOD_ERROR: &str = "org.freedesktop.DBus.Error.UnknownMethod";

/// Mutable discovery state shared by the request, reply, signal and
/// endpoint handlers.
pub(crate) struct State<B: Bus> {
    pub(crate) bus: B,
    pub(crate) pending: PendingCalls,
    pub(crate) store: EntityStore,
    /// Events raised by the message being processed.
    pub(crate) events: Vec<DiscoveryEvent>,
    pub(crate) config: DiscoveryConfig,
}

impl<B: Bus> State<B> {
    pub(crate) fn new(bus: B, config: DiscoveryConfig) -> Self {
        Self {
            bus,
            pending: PendingCalls::new(),
            store: EntityStore::new(),
            events: Vec::new(),
            config,
        }
    }
}

/// Bluetooth audio discovery over BlueZ 4.
///
/// Create one per process and keep it for the process lifetime. Dropping it
/// tears everything down: outstanding calls are discarded, every device is
/// removed (firing the usual events) and signal subscriptions are removed.
pub struct Discovery<B: Bus = Channel> {
    state: State<B>,
    hooks: Hooks,
    started: bool,
}

impl Discovery<Channel> {
    /// Connect to the configured bus and start discovery.
    pub fn connect(config: DiscoveryConfig) -> Result<Self> {
        let channel = bus::open(config.bus_type)?;
        let mut discovery = Self::with_bus(channel, config)?;
        discovery.start()?;
        Ok(discovery)
    }
}

impl<B: Bus> Discovery<B> {
    /// Wrap an existing bus connection. Call [`Discovery::start`] to begin.
    pub fn with_bus(bus: B, config: DiscoveryConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            state: State::new(bus, config),
            hooks: Hooks::new(),
            started: false,
        })
    }

    /// Subscribe to BlueZ signals and enumerate adapters.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }

        for rule in bus::match_rules() {
            self.state.bus.send(bus::match_call("AddMatch", &rule)?)?;
        }
        self.started = true;

        info!(
            "Bluetooth discovery started on {}",
            self.state.bus.unique_name().unwrap_or_else(|| "unnamed connection".into())
        );

        self.state.list_adapters();
        Ok(())
    }

    /// Register an event handler.
    pub fn connect_hook(&mut self, kind: HookKind, handler: impl EventHandler + 'static) -> HookId {
        self.hooks.connect(kind, Box::new(handler))
    }

    pub fn disconnect_hook(&mut self, id: HookId) -> bool {
        self.hooks.disconnect(id)
    }

    /// Process one inbound message and deliver the events it raised.
    pub fn dispatch(&mut self, msg: Message) {
        debug!(
            "dbus: interface={}, path={}, member={}",
            msg.interface().as_deref().unwrap_or("-"),
            msg.path().as_deref().unwrap_or("-"),
            msg.member().as_deref().unwrap_or("-"),
        );

        match msg.msg_type() {
            MessageType::MethodReturn | MessageType::Error => {
                match msg.get_reply_serial().and_then(|s| self.state.pending.complete(s)) {
                    Some(call) => self.state.handle_reply(call, msg),
                    None => trace!("Reply to unknown serial {:?}", msg.get_reply_serial()),
                }
            }
            MessageType::Signal => self.state.handle_signal(&msg),
            MessageType::MethodCall => {
                if !self.state.handle_endpoint_call(&msg) && !msg.get_no_reply() {
                    self.reply_unknown_method(&msg);
                }
            }
        }

        self.flush_events();
    }

    fn reply_unknown_method(&self, msg: &Message) {
        let text = format!(
            "No such method {} on {}",
            msg.member().as_deref().unwrap_or("-"),
            msg.path().as_deref().unwrap_or("-")
        );
        let sent = bus::error_reply(msg, UNKNOWN_METHOD_ERROR, &text).and_then(|reply| self.state.bus.send(reply));
        if let Err(e) = sent {
            warn!("Failed to reply to unknown method call: {}", e);
        }
    }

    fn flush_events(&mut self) {
        if self.state.events.is_empty() {
            return;
        }

        let events = std::mem::take(&mut self.state.events);
        let lookup = self.state.store.lookup();
        for event in &events {
            self.hooks.fire(event, &lookup);
        }
    }

    /// Pump the bus once and dispatch whatever arrived.
    ///
    /// Returns the number of messages processed.
    pub fn process(&mut self, timeout: Duration) -> Result<usize> {
        self.state.bus.read_write(Some(timeout))?;

        let mut count = 0;
        while let Some(msg) = self.state.bus.pop_message() {
            self.dispatch(msg);
            count += 1;
        }
        Ok(count)
    }

    /// Run the dispatch loop until `stop` is set or the connection fails.
    pub fn run_until(&mut self, stop: &AtomicBool, tick: Duration) -> Result<()> {
        while !stop.load(Ordering::Relaxed) {
            self.process(tick)?;
        }
        Ok(())
    }

    /// Block until every outstanding request has been answered.
    pub fn sync(&mut self) {
        while !self.state.pending.is_empty() {
            if let Err(e) = self.state.bus.read_write(None) {
                warn!("Bus flush failed with {} calls outstanding: {}", self.state.pending.len(), e);
                break;
            }
            while let Some(msg) = self.state.bus.pop_message() {
                self.dispatch(msg);
            }
        }
    }

    /// Audio-ready device with this Bluetooth address, after a sync.
    pub fn device_by_address(&mut self, address: &str) -> Option<&Device> {
        self.sync();
        self.state.store.lookup().by_address(address)
    }

    /// Audio-ready device at this object path, after a sync.
    pub fn device_by_path(&mut self, path: &str) -> Option<&Device> {
        self.sync();
        self.state.store.lookup().by_path(path)
    }

    /// Every known device, without syncing.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.state.store.lookup().all()
    }

    pub fn transport(&self, path: &str) -> Option<&Transport> {
        self.state.store.transport(path)
    }

    fn headset_transport(&self, path: &str) -> Result<&Transport> {
        let transport = self
            .state
            .store
            .transport(path)
            .ok_or_else(|| BluetoothError::UnknownTransport(path.to_string()))?;
        if transport.profile != Profile::Hsp {
            return Err(BluetoothError::NotHeadset(path.to_string()));
        }
        Ok(transport)
    }

    fn set_gain(&self, path: &str, property: &str, gain: u16) -> Result<()> {
        let transport = self.headset_transport(path)?;
        let mut msg = bus::method_call(
            BLUEZ_SERVICE,
            &transport.device_path,
            RemoteInterface::Headset.as_str(),
            "SetProperty",
        )?
        .append2(property, Variant(clamp_gain(gain)));
        msg.set_no_reply(true);

        self.state.bus.send(msg)?;
        Ok(())
    }

    /// Ask the headset to change its microphone gain. No reply is awaited.
    pub fn set_microphone_gain(&self, path: &str, gain: u16) -> Result<()> {
        self.set_gain(path, "MicrophoneGain", gain)
    }

    /// Ask the headset to change its speaker gain. No reply is awaited.
    pub fn set_speaker_gain(&self, path: &str, gain: u16) -> Result<()> {
        self.set_gain(path, "SpeakerGain", gain)
    }

    /// Acquire the transport socket from its owner.
    ///
    /// Blocks without a timeout; do not call from an event handler.
    pub fn acquire_transport(&self, path: &str, access_type: &str) -> Result<AcquiredTransport> {
        let transport = self
            .state
            .store
            .transport(path)
            .ok_or_else(|| BluetoothError::UnknownTransport(path.to_string()))?;

        let msg = bus::method_call(&transport.owner, path, RemoteInterface::MediaTransport.as_str(), "Acquire")?
            .append1(access_type);
        let mut reply = self.state.bus.call_blocking(msg, BLOCKING_CALL_TIMEOUT)?;
        reply.as_result()?;

        let (fd, imtu, omtu): (OwnedFd, u16, u16) = reply.read3().map_err(|e| {
            warn!("Failed to parse org.bluez.MediaTransport.Acquire(): {}", e);
            BluetoothError::from(e)
        })?;

        debug!("Acquired transport {} (imtu {}, omtu {})", path, imtu, omtu);
        Ok(AcquiredTransport { fd, imtu, omtu })
    }

    /// Hand the transport socket back to its owner. Failures are logged.
    pub fn release_transport(&self, path: &str, access_type: &str) {
        let Some(transport) = self.state.store.transport(path) else {
            warn!("Release of unknown transport {}", path);
            return;
        };

        let result = bus::method_call(&transport.owner, path, RemoteInterface::MediaTransport.as_str(), "Release")
            .map(|msg| msg.append1(access_type))
            .and_then(|msg| self.state.bus.call_blocking(msg, BLOCKING_CALL_TIMEOUT))
            .and_then(|mut reply| reply.as_result().map(|_| ()).map_err(BluetoothError::from));

        match result {
            Ok(()) => info!("Transport {} released", path),
            Err(e) => warn!("Failed to release transport {}: {}", path, e),
        }
    }

    /// Number of requests still awaiting a reply.
    pub fn pending_calls(&self) -> usize {
        self.state.pending.len()
    }

    pub fn bus(&self) -> &B {
        &self.state.bus
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.state.config
    }

    /// Tear everything down. Also runs on drop.
    pub fn shutdown(&mut self) {
        let dropped = self.state.pending.drain();
        if dropped > 0 {
            debug!("Discarded {} outstanding calls", dropped);
        }

        self.state.remove_all_devices();
        self.flush_events();

        if !self.started {
            return;
        }
        self.started = false;

        for rule in bus::match_rules() {
            match bus::match_call("RemoveMatch", &rule) {
                Ok(mut msg) => {
                    msg.set_no_reply(true);
                    if let Err(e) = self.state.bus.send(msg) {
                        warn!("Failed to remove match rule: {}", e);
                    }
                }
                Err(e) => warn!("Failed to build RemoveMatch: {}", e),
            }
        }
        self.state.bus.flush();

        info!("Bluetooth discovery stopped");
    }
}

impl<B: Bus> Drop for Discovery<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
