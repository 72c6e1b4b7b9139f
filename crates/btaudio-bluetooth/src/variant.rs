//! Decoding of `{sv}` property entries.
//!
//! BlueZ 4 reports properties as string keys paired with variant values,
//! either as a whole `a{sv}` dictionary (GetProperties replies) or as a single
//! `(s, v)` pair (PropertyChanged signals). The decoder checks the shape and
//! yields owned values; callers decide which keys and types they care about.

use dbus::arg::{ArgType, Iter};
use dbus::strings::Path;
use dbus::Message;

use crate::error::{BluetoothError, Result};

/// Decoded variant payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    String(String),
    ObjectPath(String),
    Boolean(bool),
    Byte(u8),
    UInt16(u16),
    UInt32(u32),
    StringArray(Vec<String>),
    ObjectPathArray(Vec<String>),
    ByteArray(Vec<u8>),
    /// Any other type, kept as its signature.
    Other(String),
}

/// One property: key plus value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub key: String,
    pub value: PropertyValue,
}

impl Property {
    pub fn new(key: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

fn malformed(what: impl Into<String>) -> BluetoothError {
    BluetoothError::Malformed(what.into())
}

/// Read a key/variant pair starting at the iterator's position.
///
/// The key must be a string and must be followed by a variant.
pub fn read_property(iter: &mut Iter<'_>) -> Result<Property> {
    if iter.arg_type() != ArgType::String {
        return Err(malformed("Property name not a string"));
    }
    let key: String = iter
        .get::<&str>()
        .map(str::to_owned)
        .ok_or_else(|| malformed("Property name not a string"))?;

    if !iter.next() {
        return Err(malformed(format!("Property value missing for {}", key)));
    }

    if iter.arg_type() != ArgType::Variant {
        return Err(malformed(format!("Property value of {} not a variant", key)));
    }

    let mut inner = iter
        .recurse(ArgType::Variant)
        .ok_or_else(|| malformed(format!("Property value of {} not a variant", key)))?;
    let value = read_value(&mut inner)?;

    Ok(Property { key, value })
}

fn read_value(inner: &mut Iter<'_>) -> Result<PropertyValue> {
    let value = match inner.arg_type() {
        ArgType::String => inner.get::<String>().map(PropertyValue::String),
        ArgType::ObjectPath => inner
            .get::<Path<'_>>()
            .map(|p| PropertyValue::ObjectPath(p.to_string())),
        ArgType::Boolean => inner.get::<bool>().map(PropertyValue::Boolean),
        ArgType::Byte => inner.get::<u8>().map(PropertyValue::Byte),
        ArgType::UInt16 => inner.get::<u16>().map(PropertyValue::UInt16),
        ArgType::UInt32 => inner.get::<u32>().map(PropertyValue::UInt32),
        ArgType::Array => {
            let signature = inner.signature();
            match &*signature {
                "as" => inner.get::<Vec<String>>().map(PropertyValue::StringArray),
                "ao" => inner.get::<Vec<Path<'_>>>().map(|paths| {
                    PropertyValue::ObjectPathArray(paths.iter().map(|p| p.to_string()).collect())
                }),
                "ay" => inner.get::<Vec<u8>>().map(PropertyValue::ByteArray),
                other => Some(PropertyValue::Other(other.to_string())),
            }
        }
        ArgType::Invalid => return Err(malformed("Empty variant")),
        _ => Some(PropertyValue::Other(inner.signature().to_string())),
    };

    value.ok_or_else(|| malformed("Variant payload could not be read"))
}

/// Decode an `a{sv}` argument at the iterator's position.
///
/// Non-entry elements are skipped. Any malformed entry fails the whole
/// dictionary, so callers never apply half of a reply.
pub fn read_property_dict(iter: &mut Iter<'_>) -> Result<Vec<Property>> {
    if iter.arg_type() == ArgType::Invalid {
        return Err(malformed("Reply has no arguments"));
    }
    if iter.arg_type() != ArgType::Array {
        return Err(malformed("Properties argument is not an array"));
    }

    let mut elements = iter
        .recurse(ArgType::Array)
        .ok_or_else(|| malformed("Properties argument is not an array"))?;

    let mut properties = Vec::new();
    while elements.arg_type() != ArgType::Invalid {
        if elements.arg_type() == ArgType::DictEntry {
            let mut entry = elements
                .recurse(ArgType::DictEntry)
                .ok_or_else(|| malformed("Unreadable dictionary entry"))?;
            properties.push(read_property(&mut entry)?);
        }
        elements.next();
    }

    Ok(properties)
}

/// Decode the `a{sv}` first argument of a message.
pub fn message_properties(msg: &Message) -> Result<Vec<Property>> {
    read_property_dict(&mut msg.iter_init())
}

/// Decode the `(s, v)` arguments of a PropertyChanged signal.
pub fn signal_property(msg: &Message) -> Result<Property> {
    read_property(&mut msg.iter_init())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbus::arg::{PropMap, RefArg, Variant};

    fn signal() -> Message {
        Message::new_signal("/org/bluez/hci0/dev_00", "org.bluez.Device", "PropertyChanged").unwrap()
    }

    mod single_property {
        use super::*;

        #[test]
        fn reads_string() {
            let msg = signal().append2("Name", Variant("Headphones"));
            let prop = signal_property(&msg).unwrap();
            assert_eq!(prop, Property::new("Name", PropertyValue::String("Headphones".into())));
        }

        #[test]
        fn reads_scalars() {
            let msg = signal().append2("Paired", Variant(true));
            assert_eq!(signal_property(&msg).unwrap().value, PropertyValue::Boolean(true));

            let msg = signal().append2("Class", Variant(0x240404u32));
            assert_eq!(signal_property(&msg).unwrap().value, PropertyValue::UInt32(0x240404));

            let msg = signal().append2("SpeakerGain", Variant(7u16));
            assert_eq!(signal_property(&msg).unwrap().value, PropertyValue::UInt16(7));
        }

        #[test]
        fn reads_arrays() {
            let msg = signal().append2("UUIDs", Variant(vec!["a".to_string(), "b".to_string()]));
            assert_eq!(
                signal_property(&msg).unwrap().value,
                PropertyValue::StringArray(vec!["a".into(), "b".into()])
            );

            let devices = vec![Path::from("/org/bluez/hci0/dev_00")];
            let msg = signal().append2("Devices", Variant(devices));
            assert_eq!(
                signal_property(&msg).unwrap().value,
                PropertyValue::ObjectPathArray(vec!["/org/bluez/hci0/dev_00".into()])
            );

            let msg = signal().append2("Configuration", Variant(vec![0x21u8, 0x15, 2, 53]));
            assert_eq!(
                signal_property(&msg).unwrap().value,
                PropertyValue::ByteArray(vec![0x21, 0x15, 2, 53])
            );
        }

        #[test]
        fn keeps_unknown_types_as_signature() {
            let msg = signal().append2("RSSI", Variant(-40i16));
            assert_eq!(
                signal_property(&msg).unwrap().value,
                PropertyValue::Other("n".into())
            );
        }

        #[test]
        fn rejects_non_string_key() {
            let msg = signal().append2(5u32, Variant(true));
            assert!(matches!(signal_property(&msg), Err(BluetoothError::Malformed(_))));
        }

        #[test]
        fn rejects_missing_value() {
            let msg = signal().append1("Name");
            let err = signal_property(&msg).unwrap_err();
            assert!(err.to_string().contains("missing"));
        }

        #[test]
        fn rejects_bare_value() {
            let msg = signal().append2("Name", "not a variant");
            let err = signal_property(&msg).unwrap_err();
            assert!(err.to_string().contains("not a variant"));
        }
    }

    mod dictionary {
        use super::*;

        #[test]
        fn reads_every_entry() {
            let mut props = PropMap::new();
            props.insert("Address".into(), Variant(Box::new("00:11:22:33:44:55".to_string()) as Box<dyn RefArg>));
            props.insert("Trusted".into(), Variant(Box::new(false) as Box<dyn RefArg>));
            let msg = signal().append1(props);

            let mut decoded = message_properties(&msg).unwrap();
            decoded.sort_by(|a, b| a.key.cmp(&b.key));
            assert_eq!(
                decoded,
                vec![
                    Property::new("Address", PropertyValue::String("00:11:22:33:44:55".into())),
                    Property::new("Trusted", PropertyValue::Boolean(false)),
                ]
            );
        }

        #[test]
        fn empty_dictionary() {
            let msg = signal().append1(PropMap::new());
            assert!(message_properties(&msg).unwrap().is_empty());
        }

        #[test]
        fn rejects_missing_argument() {
            assert!(message_properties(&signal()).is_err());
        }

        #[test]
        fn rejects_non_array() {
            let msg = signal().append1("Name");
            let err = message_properties(&msg).unwrap_err();
            assert!(err.to_string().contains("not an array"));
        }

        #[test]
        fn skips_non_entry_elements() {
            let msg = signal().append1(vec!["stray".to_string()]);
            assert!(message_properties(&msg).unwrap().is_empty());
        }
    }
}
