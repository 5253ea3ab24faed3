//! Identity types for federates and Core-side interfaces

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a federate, assigned by the Core at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FederateId(pub i32);

impl FederateId {
    /// Get the raw ID value
    pub fn raw(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for FederateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fed:{}", self.0)
    }
}

/// Opaque Core-assigned identifier for a registered interface
///
/// Publications, inputs, endpoints, filters and translators all share the
/// same handle space inside a Core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterfaceHandle(pub i32);

impl InterfaceHandle {
    /// Handle value that never refers to a registered interface
    pub const INVALID: InterfaceHandle = InterfaceHandle(-1);

    /// Check whether this handle may refer to a registered interface
    pub fn is_valid(&self) -> bool {
        self.0 >= 0
    }

    /// Get the raw handle value
    pub fn raw(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for InterfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle:{}", self.0)
    }
}

/// Identifier of an in-flight asynchronous query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryId(pub u64);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query:{}", self.0)
    }
}
