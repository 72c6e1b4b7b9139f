//! Device and transport bookkeeping.

use std::collections::HashMap;

use crate::device::Device;
use crate::profile::Profile;
use crate::transport::Transport;

/// Devices keyed by object path plus an index of transport paths.
///
/// Transports live inside their device's profile slot; the index maps a
/// transport path to the slot that holds it.
#[derive(Debug, Default)]
pub struct EntityStore {
    devices: HashMap<String, Device>,
    transports: HashMap<String, (String, Profile)>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(&self, path: &str) -> Option<&Device> {
        self.devices.get(path)
    }

    pub fn device_mut(&mut self, path: &str) -> Option<&mut Device> {
        self.devices.get_mut(path)
    }

    pub fn contains_device(&self, path: &str) -> bool {
        self.devices.contains_key(path)
    }

    /// Insert a fresh device unless one already exists. Returns true if inserted.
    pub fn insert_device(&mut self, path: &str) -> bool {
        if self.devices.contains_key(path) {
            return false;
        }
        self.devices.insert(path.to_string(), Device::new(path));
        true
    }

    /// Remove a device and drop its transports from the index.
    ///
    /// The returned device still owns its transports.
    pub fn remove_device(&mut self, path: &str) -> Option<Device> {
        let device = self.devices.remove(path)?;
        for transport in device.transports.iter().flatten() {
            self.transports.remove(&transport.path);
        }
        Some(device)
    }

    pub fn device_paths(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn contains_transport(&self, path: &str) -> bool {
        self.transports.contains_key(path)
    }

    pub fn transport(&self, path: &str) -> Option<&Transport> {
        let (device, profile) = self.transports.get(path)?;
        self.devices.get(device)?.transport(*profile)
    }

    pub fn transport_mut(&mut self, path: &str) -> Option<&mut Transport> {
        let (device, profile) = self.transports.get(path)?;
        self.devices.get_mut(device)?.transport_mut(*profile)
    }

    pub fn transport_count(&self) -> usize {
        self.transports.len()
    }

    /// Attach a transport to its device's profile slot.
    ///
    /// Returns the transport back if the device is unknown or the slot is
    /// already taken.
    pub fn attach_transport(&mut self, transport: Transport) -> Result<(), Transport> {
        let Some(device) = self.devices.get_mut(&transport.device_path) else {
            return Err(transport);
        };
        let slot = &mut device.transports[transport.profile.index()];
        if slot.is_some() {
            return Err(transport);
        }

        self.transports.insert(
            transport.path.clone(),
            (transport.device_path.clone(), transport.profile),
        );
        *slot = Some(transport);
        Ok(())
    }

    /// Detach a transport from its device and the index.
    pub fn detach_transport(&mut self, path: &str) -> Option<Transport> {
        let (device, profile) = self.transports.remove(path)?;
        self.devices.get_mut(&device)?.transports[profile.index()].take()
    }

    /// Read-only view for event handlers.
    pub fn lookup(&self) -> DeviceLookup<'_> {
        DeviceLookup { store: self }
    }
}

/// Read-only device queries.
///
/// Only audio-ready devices are visible. Queries through this view never
/// touch the bus.
#[derive(Debug, Clone, Copy)]
pub struct DeviceLookup<'a> {
    store: &'a EntityStore,
}

impl<'a> DeviceLookup<'a> {
    /// First device with this address, if it is audio ready.
    pub fn by_address(&self, address: &str) -> Option<&'a Device> {
        self.store
            .devices
            .values()
            .find(|d| d.address.as_deref() == Some(address))
            .filter(|d| d.is_audio_ready())
    }

    pub fn by_path(&self, path: &str) -> Option<&'a Device> {
        self.store.devices.get(path).filter(|d| d.is_audio_ready())
    }

    pub fn transport(&self, path: &str) -> Option<&'a Transport> {
        self.store.transport(path)
    }

    /// Every known device, ready or not.
    pub fn all(&self) -> impl Iterator<Item = &'a Device> {
        self.store.devices.values()
    }
}
