//! EmptyCore - A stateless Core for detached federates
//!
//! Once a federate disconnects, its managers keep answering calls but route
//! them here instead of to a real Core. Teardown calls (`finalize`,
//! `close_handle`) succeed silently; anything that would need a live
//! federation reports [`Error::Disconnected`].
//!
//! `EmptyCore` carries no state, so a fresh value can be constructed
//! wherever one is needed.

use crate::{
    Core, Error, FederateId, FilterOperator, FlagOption, InterfaceHandle, IterationRequest,
    IterationResult, IterationTime, Message, Result, Time, TimeProperty, TranslatorOperator,
};
use std::sync::Arc;

/// A Core that is attached to nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyCore;

impl EmptyCore {
    /// Create a new empty core
    pub fn new() -> Self {
        Self
    }

    /// Shared handle to a fresh empty core
    pub fn shared() -> Arc<dyn Core> {
        Arc::new(Self)
    }
}

impl Core for EmptyCore {
    fn register_federate(&self, _name: &str) -> Result<FederateId> {
        Err(Error::RegistrationFailure(
            "no core available to register with".to_string(),
        ))
    }

    fn enter_initializing_mode(&self, _fed: FederateId) -> Result<()> {
        Err(Error::Disconnected)
    }

    fn enter_executing_mode(
        &self,
        _fed: FederateId,
        _iterate: IterationRequest,
    ) -> Result<IterationResult> {
        Err(Error::Disconnected)
    }

    fn current_time(&self, _fed: FederateId) -> Time {
        Time::ZERO
    }

    fn time_request(&self, _fed: FederateId, _next: Time) -> Result<Time> {
        Err(Error::Disconnected)
    }

    fn request_time_iterative(
        &self,
        _fed: FederateId,
        _next: Time,
        _iterate: IterationRequest,
    ) -> Result<IterationTime> {
        Err(Error::Disconnected)
    }

    fn finalize(&self, _fed: FederateId) -> Result<()> {
        Ok(())
    }

    fn query(&self, _target: &str, _query: &str) -> String {
        "#disconnected".to_string()
    }

    fn log_message(&self, _fed: FederateId, _level: i32, _message: &str) {}

    fn set_time_property(&self, _fed: FederateId, _property: TimeProperty, _value: Time) -> Result<()> {
        Err(Error::Disconnected)
    }

    fn time_property(&self, _fed: FederateId, _property: TimeProperty) -> Time {
        Time::ZERO
    }

    fn set_flag_option(&self, _fed: FederateId, _flag: FlagOption, _value: bool) -> Result<()> {
        Err(Error::Disconnected)
    }

    fn flag_option(&self, _fed: FederateId, _flag: FlagOption) -> bool {
        false
    }

    fn register_publication(
        &self,
        _fed: FederateId,
        _key: &str,
        _type_name: &str,
        _units: &str,
    ) -> Result<InterfaceHandle> {
        Err(Error::Disconnected)
    }

    fn register_input(
        &self,
        _fed: FederateId,
        _key: &str,
        _type_name: &str,
        _units: &str,
    ) -> Result<InterfaceHandle> {
        Err(Error::Disconnected)
    }

    fn register_endpoint(
        &self,
        _fed: FederateId,
        _name: &str,
        _type_name: &str,
    ) -> Result<InterfaceHandle> {
        Err(Error::Disconnected)
    }

    fn register_filter(&self, _name: &str, _type_in: &str, _type_out: &str) -> Result<InterfaceHandle> {
        Err(Error::Disconnected)
    }

    fn register_cloning_filter(
        &self,
        _name: &str,
        _type_in: &str,
        _type_out: &str,
    ) -> Result<InterfaceHandle> {
        Err(Error::Disconnected)
    }

    fn register_translator(
        &self,
        _name: &str,
        _endpoint_type: &str,
        _units: &str,
    ) -> Result<InterfaceHandle> {
        Err(Error::Disconnected)
    }

    fn handle_name(&self, _handle: InterfaceHandle) -> String {
        String::new()
    }

    fn publisher_type(&self, _handle: InterfaceHandle) -> String {
        String::new()
    }

    fn add_source_target(&self, _handle: InterfaceHandle, _target: &str) -> Result<()> {
        Err(Error::Disconnected)
    }

    fn add_destination_target(&self, _handle: InterfaceHandle, _target: &str) -> Result<()> {
        Err(Error::Disconnected)
    }

    fn close_handle(&self, _handle: InterfaceHandle) {}

    fn set_handle_option(&self, _handle: InterfaceHandle, _flag: FlagOption, _value: bool) -> Result<()> {
        Err(Error::Disconnected)
    }

    fn handle_option(&self, _handle: InterfaceHandle, _flag: FlagOption) -> bool {
        false
    }

    fn set_value(&self, _handle: InterfaceHandle, _data: &[u8]) -> Result<()> {
        Err(Error::Disconnected)
    }

    fn value(&self, _handle: InterfaceHandle) -> Vec<u8> {
        Vec::new()
    }

    fn all_values(&self, _handle: InterfaceHandle) -> Vec<Vec<u8>> {
        Vec::new()
    }

    fn value_updates(&self, _fed: FederateId) -> Vec<InterfaceHandle> {
        Vec::new()
    }

    fn send(&self, _source: InterfaceHandle, _dest: &str, _data: &[u8]) -> Result<()> {
        Err(Error::Disconnected)
    }

    fn send_event(&self, _time: Time, _source: InterfaceHandle, _dest: &str, _data: &[u8]) -> Result<()> {
        Err(Error::Disconnected)
    }

    fn send_message(&self, _source: InterfaceHandle, _message: Message) -> Result<()> {
        Err(Error::Disconnected)
    }

    fn receive(&self, _endpoint: InterfaceHandle) -> Option<Message> {
        None
    }

    fn receive_any(&self, _fed: FederateId) -> Option<(InterfaceHandle, Message)> {
        None
    }

    fn receive_count(&self, _endpoint: InterfaceHandle) -> usize {
        0
    }

    fn set_filter_operator(
        &self,
        _filter: InterfaceHandle,
        _operator: Arc<dyn FilterOperator>,
    ) -> Result<()> {
        Err(Error::Disconnected)
    }

    fn set_translator_operator(
        &self,
        _translator: InterfaceHandle,
        _operator: Arc<dyn TranslatorOperator>,
    ) -> Result<()> {
        Err(Error::Disconnected)
    }
}
