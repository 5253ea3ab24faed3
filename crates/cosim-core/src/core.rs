//! Core trait - The contract between a federate and its coordination engine
//!
//! The federate runtime never computes granted times, routes data or talks
//! to brokers itself. It drives a `Core` and reacts to what the Core reports.
//! Everything behind this trait (network transports, time consensus across
//! the federation) is opaque to the runtime.
//!
//! ## Threading
//!
//! All methods take `&self`: a federate's asynchronous operations call the
//! Core from background threads while the application thread keeps using
//! it for lookups, so implementations must be `Send + Sync` and guard their
//! own state.
//!
//! ## Value updates
//!
//! [`Core::value_updates`] reports the input handles that changed at the
//! most recent grant. It is idempotent within a grant: both the value and
//! the message managers of a federate call it during the same time update
//! and must see the same set.

use crate::{
    FederateId, FilterOperator, InterfaceHandle, IterationRequest, IterationResult, IterationTime,
    Message, Result, Time, TranslatorOperator,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Time-valued federate properties forwarded to the Core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeProperty {
    /// Minimum step between granted times
    TimeDelta,
    /// Granted times are multiples of this period
    Period,
    /// Offset applied to the period
    Offset,
    /// Delay before received values become visible
    InputDelay,
    /// Delay before published values leave the federate
    OutputDelay,
}

/// Boolean options forwarded to the Core, per federate or per interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlagOption {
    /// The federate only observes; it never publishes or sends
    Observer,
    /// Time requests may not be interrupted by earlier events
    Uninterruptible,
    /// Grant only once the requested time can be fully honored
    WaitForCurrentTimeUpdate,
    /// Allow the federate to be granted times earlier than requested
    SourceOnly,
    /// An input must be connected before entering executing mode
    Required,
    /// Only publish when the value changed
    OnlyTransmitOnChange,
    /// Only report updates when the value changed
    OnlyUpdateOnChange,
}

/// The coordination engine a federate attaches to
///
/// Registration methods return a Core-side [`InterfaceHandle`]. Data
/// methods are addressed by those handles; lifecycle and time methods are
/// addressed by the federate's [`FederateId`].
pub trait Core: Send + Sync {
    // ------------------------------------------------------------------
    // Federate lifecycle
    // ------------------------------------------------------------------

    /// Register a federate and return its id
    fn register_federate(&self, name: &str) -> Result<FederateId>;

    /// Enter initializing mode; may block until the federation agrees
    fn enter_initializing_mode(&self, fed: FederateId) -> Result<()>;

    /// Enter executing mode; may block until the federation agrees
    fn enter_executing_mode(
        &self,
        fed: FederateId,
        iterate: IterationRequest,
    ) -> Result<IterationResult>;

    /// Last time granted to the federate
    fn current_time(&self, fed: FederateId) -> Time;

    /// Request the next time; blocks until a time is granted
    fn time_request(&self, fed: FederateId, next: Time) -> Result<Time>;

    /// Request the next time with iteration control
    fn request_time_iterative(
        &self,
        fed: FederateId,
        next: Time,
        iterate: IterationRequest,
    ) -> Result<IterationTime>;

    /// Leave the federation
    fn finalize(&self, fed: FederateId) -> Result<()>;

    /// Answer a query about `target` (a federate name, "federation", ...)
    fn query(&self, target: &str, query: &str) -> String;

    /// Forward a log record
    fn log_message(&self, fed: FederateId, level: i32, message: &str);

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Set a time-valued property
    fn set_time_property(&self, fed: FederateId, property: TimeProperty, value: Time) -> Result<()>;

    /// Get a time-valued property
    fn time_property(&self, fed: FederateId, property: TimeProperty) -> Time;

    /// Set a flag option on a federate
    fn set_flag_option(&self, fed: FederateId, flag: FlagOption, value: bool) -> Result<()>;

    /// Get a flag option of a federate
    fn flag_option(&self, fed: FederateId, flag: FlagOption) -> bool;

    // ------------------------------------------------------------------
    // Interface registration
    // ------------------------------------------------------------------

    /// Register a publication
    fn register_publication(
        &self,
        fed: FederateId,
        key: &str,
        type_name: &str,
        units: &str,
    ) -> Result<InterfaceHandle>;

    /// Register an input
    fn register_input(
        &self,
        fed: FederateId,
        key: &str,
        type_name: &str,
        units: &str,
    ) -> Result<InterfaceHandle>;

    /// Register an endpoint
    fn register_endpoint(&self, fed: FederateId, name: &str, type_name: &str)
        -> Result<InterfaceHandle>;

    /// Register a filter
    fn register_filter(&self, name: &str, type_in: &str, type_out: &str) -> Result<InterfaceHandle>;

    /// Register a cloning filter
    fn register_cloning_filter(
        &self,
        name: &str,
        type_in: &str,
        type_out: &str,
    ) -> Result<InterfaceHandle>;

    /// Register a translator
    fn register_translator(&self, name: &str, endpoint_type: &str, units: &str)
        -> Result<InterfaceHandle>;

    /// Name the Core assigned to a handle
    fn handle_name(&self, handle: InterfaceHandle) -> String;

    /// Type of the publication feeding an input (empty if unconnected)
    fn publisher_type(&self, handle: InterfaceHandle) -> String;

    /// Connect a handle to a source (publication key, endpoint name)
    fn add_source_target(&self, handle: InterfaceHandle, target: &str) -> Result<()>;

    /// Connect a handle to a destination (input key, endpoint name)
    fn add_destination_target(&self, handle: InterfaceHandle, target: &str) -> Result<()>;

    /// Hint that two endpoints exchange messages frequently
    fn register_communication_path(&self, source: &str, dest: &str) {
        let _ = (source, dest);
    }

    /// Close a handle; closed handles stop sending and receiving
    fn close_handle(&self, handle: InterfaceHandle);

    /// Set a flag option on a single interface
    fn set_handle_option(&self, handle: InterfaceHandle, flag: FlagOption, value: bool) -> Result<()>;

    /// Get a flag option of a single interface
    fn handle_option(&self, handle: InterfaceHandle, flag: FlagOption) -> bool;

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    /// Publish raw bytes on a publication handle
    fn set_value(&self, handle: InterfaceHandle, data: &[u8]) -> Result<()>;

    /// Current raw value visible to an input handle
    fn value(&self, handle: InterfaceHandle) -> Vec<u8>;

    /// All values visible to an input connected to several publications
    fn all_values(&self, handle: InterfaceHandle) -> Vec<Vec<u8>>;

    /// Inputs of the federate updated at the most recent grant
    fn value_updates(&self, fed: FederateId) -> Vec<InterfaceHandle>;

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Send bytes from an endpoint at the federate's current time
    fn send(&self, source: InterfaceHandle, dest: &str, data: &[u8]) -> Result<()>;

    /// Send bytes from an endpoint for delivery at a given time
    fn send_event(&self, time: Time, source: InterfaceHandle, dest: &str, data: &[u8]) -> Result<()>;

    /// Send a fully formed message from an endpoint
    fn send_message(&self, source: InterfaceHandle, message: Message) -> Result<()>;

    /// Pop the next message ready for a specific endpoint
    fn receive(&self, endpoint: InterfaceHandle) -> Option<Message>;

    /// Pop the next message ready for any endpoint of the federate
    fn receive_any(&self, fed: FederateId) -> Option<(InterfaceHandle, Message)>;

    /// Number of messages ready for an endpoint
    fn receive_count(&self, endpoint: InterfaceHandle) -> usize;

    // ------------------------------------------------------------------
    // Connectors
    // ------------------------------------------------------------------

    /// Install the operator run by a filter
    fn set_filter_operator(&self, filter: InterfaceHandle, operator: Arc<dyn FilterOperator>)
        -> Result<()>;

    /// Install the operator run by a translator
    fn set_translator_operator(
        &self,
        translator: InterfaceHandle,
        operator: Arc<dyn TranslatorOperator>,
    ) -> Result<()>;
}
