//! In-flight asynchronous calls, keyed by request serial.

use std::collections::HashMap;

use crate::profile::RemoteInterface;

/// What an outstanding request was for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingCall {
    /// `GetProperties` on `interface` at `path`.
    GetProperties {
        interface: RemoteInterface,
        path: String,
    },
    /// `org.bluez.Media.RegisterEndpoint` of `endpoint` on `adapter`.
    RegisterEndpoint { adapter: String, endpoint: String },
}

/// Outstanding requests awaiting a reply.
///
/// Each entry is removed exactly once, when its reply (or error) arrives or
/// when the map is drained on teardown.
#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: HashMap<u32, PendingCall>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, serial: u32, call: PendingCall) {
        self.calls.insert(serial, call);
    }

    /// Claim the request a reply answers.
    pub fn complete(&mut self, reply_serial: u32) -> Option<PendingCall> {
        self.calls.remove(&reply_serial)
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Drop every outstanding request, returning how many there were.
    pub fn drain(&mut self) -> usize {
        let count = self.calls.len();
        self.calls.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call() -> PendingCall {
        PendingCall::GetProperties {
            interface: RemoteInterface::Manager,
            path: "/".into(),
        }
    }

    #[test]
    fn completes_once() {
        let mut pending = PendingCalls::new();
        pending.insert(7, call());
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.complete(7), Some(call()));
        assert_eq!(pending.complete(7), None);
        assert!(pending.is_empty());
    }

    #[test]
    fn unknown_serial_is_ignored() {
        let mut pending = PendingCalls::new();
        pending.insert(1, call());
        assert_eq!(pending.complete(2), None);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn drain_clears_everything() {
        let mut pending = PendingCalls::new();
        pending.insert(1, call());
        pending.insert(
            2,
            PendingCall::RegisterEndpoint {
                adapter: "/org/bluez/hci0".into(),
                endpoint: "/MediaEndpoint/A2DPSource".into(),
            },
        );
        assert_eq!(pending.drain(), 2);
        assert!(pending.is_empty());
    }
}
