//! Local identifiers for a federate's interfaces
//!
//! Local ids are the registration ordinal of an interface within its
//! collection. They are never reused and stay valid for the lifetime of
//! the federate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Local id of a publication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicationId(pub usize);

impl PublicationId {
    /// Get the raw index
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for PublicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pub:{}", self.0)
    }
}

/// Local id of an input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InputId(pub usize);

impl InputId {
    /// Get the raw index
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "input:{}", self.0)
    }
}

/// Local id of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointId(pub usize);

impl EndpointId {
    /// Get the raw index
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(PublicationId(2).to_string(), "pub:2");
        assert_eq!(InputId(0).to_string(), "input:0");
        assert_eq!(EndpointId(5).to_string(), "endpoint:5");
    }
}
