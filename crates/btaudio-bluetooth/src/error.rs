//! Error types for Bluetooth discovery and endpoint operations.

use btaudio_core::CodecError;
use thiserror::Error;

use crate::profile::Profile;

/// Error name the bus uses when the destination service is not running.
pub const SERVICE_UNKNOWN_ERROR: &str = "org.freedesktop.DBus.Error.ServiceUnknown";

/// Error name BlueZ returns for endpoint types it has been configured to disable.
pub const NOT_SUPPORTED_ERROR: &str = "org.bluez.Error.NotSupported";

/// Bluetooth-specific error types.
#[derive(Error, Debug)]
pub enum BluetoothError {
    /// Generic bus failure carrying the remote error name.
    #[error("D-Bus error {name}: {message}")]
    Bus { name: String, message: String },

    /// The Bluetooth daemon is not running.
    #[error("Bluetooth daemon is not available")]
    ServiceUnknown,

    /// The bus connection was closed.
    #[error("D-Bus connection lost")]
    Disconnected,

    /// Remote data did not have the expected shape.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// A transport path was configured twice.
    #[error("Transport {0} is already configured")]
    AlreadyConfigured(String),

    /// The device already has a transport for this profile.
    #[error("Profile {profile} of device {device} is already in use")]
    ProfileInUse { device: String, profile: Profile },

    /// A gain change arrived for a profile without a transport.
    #[error("Volume change for {device} has no associated transport")]
    NoTransport { device: String },

    /// Gain control is only available on headset transports.
    #[error("Transport {0} is not a headset transport")]
    NotHeadset(String),

    /// No transport is known under this path.
    #[error("Unknown transport: {0}")]
    UnknownTransport(String),

    /// Codec negotiation failed.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] btaudio_core::Error),
}

impl From<dbus::Error> for BluetoothError {
    fn from(err: dbus::Error) -> Self {
        match err.name() {
            Some(SERVICE_UNKNOWN_ERROR) => BluetoothError::ServiceUnknown,
            name => BluetoothError::Bus {
                name: name.unwrap_or("unknown").to_string(),
                message: err.message().unwrap_or_default().to_string(),
            },
        }
    }
}

impl From<dbus::arg::TypeMismatchError> for BluetoothError {
    fn from(err: dbus::arg::TypeMismatchError) -> Self {
        BluetoothError::Malformed(err.to_string())
    }
}

/// Convenience Result type for Bluetooth operations.
pub type Result<T> = std::result::Result<T, BluetoothError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        let err = BluetoothError::AlreadyConfigured("/org/bluez/hci0/fd0".to_string());
        assert!(err.to_string().contains("already configured"));
        assert!(err.to_string().contains("/org/bluez/hci0/fd0"));

        let err = BluetoothError::ProfileInUse {
            device: "/org/bluez/hci0/dev_00".to_string(),
            profile: Profile::Hsp,
        };
        assert!(err.to_string().contains("hsp"));

        let err = BluetoothError::Malformed("Property name not a string".to_string());
        assert!(err.to_string().contains("Malformed"));
    }

    #[test]
    fn service_unknown_is_classified() {
        let err: BluetoothError = dbus::Error::new_custom(SERVICE_UNKNOWN_ERROR, "gone").into();
        assert!(matches!(err, BluetoothError::ServiceUnknown));

        let err: BluetoothError = dbus::Error::new_custom(NOT_SUPPORTED_ERROR, "disabled").into();
        match err {
            BluetoothError::Bus { name, message } => {
                assert_eq!(name, NOT_SUPPORTED_ERROR);
                assert_eq!(message, "disabled");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn codec_error_conversion() {
        let err: BluetoothError = CodecError::NoSubbands.into();
        assert!(matches!(err, BluetoothError::Codec(CodecError::NoSubbands)));
    }
}
