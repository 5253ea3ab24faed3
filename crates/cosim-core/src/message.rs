//! Point-to-point messages exchanged between endpoints

use crate::Time;
use serde::{Deserialize, Serialize};

/// A message travelling between endpoints
///
/// `original_source`/`original_dest` keep the addressing the sender used,
/// so filters that reroute or clone a message do not lose it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    /// Delivery time
    pub time: Time,
    /// Name of the sending endpoint (or publication for bridged values)
    pub source: String,
    /// Name of the destination endpoint
    pub dest: String,
    /// Source as first set by the sender
    pub original_source: String,
    /// Destination as first set by the sender
    pub original_dest: String,
    /// Payload bytes
    pub data: Vec<u8>,
}

impl Message {
    /// Create a message with matching original addressing
    pub fn new(source: impl Into<String>, dest: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let source = source.into();
        let dest = dest.into();
        Self {
            time: Time::ZERO,
            original_source: source.clone(),
            original_dest: dest.clone(),
            source,
            dest,
            data: data.into(),
        }
    }

    /// Set the delivery time
    pub fn at(mut self, time: Time) -> Self {
        self.time = time;
        self
    }

    /// A message is valid once it has somewhere to go
    pub fn is_valid(&self) -> bool {
        !self.dest.is_empty()
    }

    /// Payload interpreted as UTF-8 text, lossily
    pub fn data_as_string(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sets_original_addressing() {
        let msg = Message::new("fedA/out", "fedB/in", b"hello".to_vec()).at(Time::from_secs(2.0));
        assert_eq!(msg.original_source, "fedA/out");
        assert_eq!(msg.original_dest, "fedB/in");
        assert_eq!(msg.time, Time::from_secs(2.0));
        assert_eq!(msg.data_as_string(), "hello");
        assert!(msg.is_valid());
    }

    #[test]
    fn test_default_is_invalid() {
        let msg = Message::default();
        assert!(!msg.is_valid());
        assert!(msg.is_empty());
    }
}
