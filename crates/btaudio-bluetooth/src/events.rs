//! Discovery events and handlers.
//!
//! Events are raised while a bus message is applied and delivered once the
//! message has been fully processed, in the order they were raised.

use std::fmt;

use tokio::sync::mpsc;
use tracing::trace;

use crate::device::Device;
use crate::store::DeviceLookup;
use crate::transport::Transport;

/// Events emitted by discovery.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    /// A device became connected, disconnected or is going away.
    DeviceConnectionChanged(Device),
    /// A device advertised a service UUID for the first time.
    DeviceUuidAdded { device: Device, uuid: String },
    /// A transport changed state.
    TransportStateChanged(Transport),
    /// The remote toggled echo cancellation.
    TransportNrecChanged(Transport),
    TransportMicrophoneGainChanged(Transport),
    TransportSpeakerGainChanged(Transport),
}

impl DiscoveryEvent {
    pub fn kind(&self) -> HookKind {
        match self {
            DiscoveryEvent::DeviceConnectionChanged(_) => HookKind::DeviceConnectionChanged,
            DiscoveryEvent::DeviceUuidAdded { .. } => HookKind::DeviceUuidAdded,
            DiscoveryEvent::TransportStateChanged(_) => HookKind::TransportStateChanged,
            DiscoveryEvent::TransportNrecChanged(_) => HookKind::TransportNrecChanged,
            DiscoveryEvent::TransportMicrophoneGainChanged(_) => {
                HookKind::TransportMicrophoneGainChanged
            }
            DiscoveryEvent::TransportSpeakerGainChanged(_) => HookKind::TransportSpeakerGainChanged,
        }
    }
}

/// Event categories handlers subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    DeviceConnectionChanged,
    DeviceUuidAdded,
    TransportStateChanged,
    TransportNrecChanged,
    TransportMicrophoneGainChanged,
    TransportSpeakerGainChanged,
}

impl HookKind {
    pub const ALL: [HookKind; 6] = [
        HookKind::DeviceConnectionChanged,
        HookKind::DeviceUuidAdded,
        HookKind::TransportStateChanged,
        HookKind::TransportNrecChanged,
        HookKind::TransportMicrophoneGainChanged,
        HookKind::TransportSpeakerGainChanged,
    ];

    fn index(self) -> usize {
        match self {
            HookKind::DeviceConnectionChanged => 0,
            HookKind::DeviceUuidAdded => 1,
            HookKind::TransportStateChanged => 2,
            HookKind::TransportNrecChanged => 3,
            HookKind::TransportMicrophoneGainChanged => 4,
            HookKind::TransportSpeakerGainChanged => 5,
        }
    }
}

/// Handler for discovery events.
///
/// Runs on the dispatch thread and must not block. `devices` reflects the
/// state after the message that raised the event.
pub trait EventHandler {
    fn on_event(&mut self, event: &DiscoveryEvent, devices: &DeviceLookup<'_>);
}

/// No-op event handler.
pub struct NoOpHandler;

impl EventHandler for NoOpHandler {
    fn on_event(&mut self, _event: &DiscoveryEvent, _devices: &DeviceLookup<'_>) {}
}

/// Callback-based event handler.
pub struct CallbackHandler<F>
where
    F: FnMut(&DiscoveryEvent, &DeviceLookup<'_>),
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: FnMut(&DiscoveryEvent, &DeviceLookup<'_>),
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> EventHandler for CallbackHandler<F>
where
    F: FnMut(&DiscoveryEvent, &DeviceLookup<'_>),
{
    fn on_event(&mut self, event: &DiscoveryEvent, devices: &DeviceLookup<'_>) {
        (self.callback)(event, devices);
    }
}

/// Forwards owned events to an async consumer.
#[derive(Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<DiscoveryEvent>,
}

impl ChannelHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DiscoveryEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventHandler for ChannelHandler {
    fn on_event(&mut self, event: &DiscoveryEvent, _devices: &DeviceLookup<'_>) {
        if self.tx.send(event.clone()).is_err() {
            trace!("Event receiver dropped");
        }
    }
}

/// Identifies a connected handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// Handler lists, one per event kind.
#[derive(Default)]
pub struct Hooks {
    slots: [Vec<(HookId, Box<dyn EventHandler>)>; 6],
    next_id: u64,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, kind: HookKind, handler: Box<dyn EventHandler>) -> HookId {
        self.next_id += 1;
        let id = HookId(self.next_id);
        self.slots[kind.index()].push((id, handler));
        id
    }

    /// Remove a handler. Returns false if it was not connected.
    pub fn disconnect(&mut self, id: HookId) -> bool {
        for slot in self.slots.iter_mut() {
            if let Some(pos) = slot.iter().position(|(hid, _)| *hid == id) {
                slot.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn handler_count(&self, kind: HookKind) -> usize {
        self.slots[kind.index()].len()
    }

    /// Deliver one event to every handler of its kind, in connection order.
    pub fn fire(&mut self, event: &DiscoveryEvent, devices: &DeviceLookup<'_>) {
        for (_, handler) in self.slots[event.kind().index()].iter_mut() {
            handler.on_event(event, devices);
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<_> = HookKind::ALL
            .iter()
            .map(|k| (*k, self.handler_count(*k)))
            .collect();
        f.debug_struct("Hooks").field("handlers", &counts).finish()
    }
}
