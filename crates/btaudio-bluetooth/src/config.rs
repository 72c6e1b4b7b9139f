//! Discovery configuration.

use btaudio_core::SampleSpec;
use dbus::channel::BusType;

use crate::error::Result;

/// Discovery settings.
///
/// Defaults match a system-wide daemon mixing CD-quality stereo.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Server sample spec used to pick SBC frequency and channel mode.
    pub sample_spec: SampleSpec,
    /// Bus to connect to. BlueZ lives on the system bus.
    pub bus_type: BusType,
    /// Register media endpoints on every adapter found.
    pub register_endpoints: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            sample_spec: SampleSpec::default(),
            bus_type: BusType::System,
            register_endpoints: true,
        }
    }
}

impl DiscoveryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server sample spec.
    pub fn with_sample_spec(mut self, spec: SampleSpec) -> Self {
        self.sample_spec = spec;
        self
    }

    /// Set rate and channel count, validating them.
    pub fn with_rate_and_channels(self, rate: u32, channels: u8) -> Result<Self> {
        Ok(self.with_sample_spec(SampleSpec::new(rate, channels)?))
    }

    pub fn with_bus_type(mut self, bus_type: BusType) -> Self {
        self.bus_type = bus_type;
        self
    }

    pub fn with_endpoint_registration(mut self, enabled: bool) -> Self {
        self.register_endpoints = enabled;
        self
    }

    /// Check the configuration before connecting.
    pub fn validate(&self) -> Result<()> {
        SampleSpec::new(self.sample_spec.rate, self.sample_spec.channels)?;
        Ok(())
    }
}
