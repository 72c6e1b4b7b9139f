//! # btaudio-bluetooth
//!
//! Bluetooth audio discovery for a sound server, speaking the BlueZ 4 D-Bus
//! API.
//!
//! This crate tracks adapters, devices and their audio profile states,
//! exports the media endpoints BlueZ calls back into to configure transports,
//! negotiates SBC configurations and reports changes to registered handlers.
//!
//! ## Features
//!
//! - Adapter and device enumeration through `GetProperties`
//! - Live updates from BlueZ `PropertyChanged` and add/remove signals
//! - Media endpoints for A2DP (both roles), HSP and HFP gateway
//! - SBC capability negotiation against the server sample spec
//! - Typed event hooks, including a channel handler for async consumers
//! - Transport acquire/release and headset gain control
//!
//! ## Requirements
//!
//! This crate is Linux-only and talks to a BlueZ 4 daemon on the system bus.
//!
//! ## Example
//!
//! ```ignore
//! // This example only compiles on Linux
//! use std::sync::atomic::AtomicBool;
//! use std::time::Duration;
//!
//! use btaudio_bluetooth::{ChannelHandler, Discovery, DiscoveryConfig, HookKind};
//!
//! fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut discovery = Discovery::connect(DiscoveryConfig::default())?;
//!
//!     let (handler, mut events) = ChannelHandler::new();
//!     discovery.connect_hook(HookKind::DeviceConnectionChanged, handler.clone());
//!     discovery.connect_hook(HookKind::TransportStateChanged, handler);
//!
//!     let stop = AtomicBool::new(false);
//!     discovery.run_until(&stop, Duration::from_millis(500))?;
//!     Ok(())
//! }
//! ```

#![cfg(target_os = "linux")]

pub mod bus;
pub mod config;
pub mod device;
pub mod discovery;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod pending;
pub mod profile;
mod properties;
pub mod requests;
mod signals;
pub mod store;
pub mod transport;
pub mod variant;

// Re-exports for convenience
pub use bus::Bus;
pub use config::DiscoveryConfig;
pub use device::{cleanup_name, form_factor, Device, FormFactor, InfoState, TriState};
pub use discovery::Discovery;
pub use endpoint::Endpoint;
pub use error::{BluetoothError, Result};
pub use events::{
    CallbackHandler, ChannelHandler, DiscoveryEvent, EventHandler, HookId, HookKind, Hooks,
    NoOpHandler,
};
pub use profile::{
    audio_state_to_transport_state, AudioState, Profile, RemoteInterface, TransportState,
};
pub use store::{DeviceLookup, EntityStore};
pub use transport::{AcquiredTransport, Transport};

pub use dbus::channel::BusType;
