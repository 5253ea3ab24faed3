//! MessageFederate - Endpoint interfaces of a federate
//!
//! A borrowed view pairing a [`Federate`] with its
//! [`MessageExchangeManager`]. Endpoints are registered in startup; sending
//! and receiving work in any state the Core accepts.

use crate::federate::Federate;
use crate::identity::EndpointId;
use crate::messages::{EndpointInfo, MessageCallback, MessageExchangeManager};
use cosim_core::{Message, Result, Time};

/// Message interfaces of one federate
#[derive(Clone, Copy)]
pub struct MessageFederate<'a> {
    fed: &'a Federate,
    messages: &'a MessageExchangeManager,
}

impl<'a> MessageFederate<'a> {
    pub(crate) fn new(fed: &'a Federate, messages: &'a MessageExchangeManager) -> Self {
        Self { fed, messages }
    }

    /// The owning federate
    pub fn federate(&self) -> &'a Federate {
        self.fed
    }

    /// Register an endpoint named `<federate><sep><name>`
    pub fn register_endpoint(&self, name: &str, type_name: &str) -> Result<EndpointId> {
        self.register_endpoint_global(&self.fed.local_name(name), type_name)
    }

    /// Register an endpoint under a federation-wide name
    pub fn register_endpoint_global(&self, name: &str, type_name: &str) -> Result<EndpointId> {
        self.fed.ensure_startup("register_endpoint")?;
        self.messages
            .register_endpoint(&*self.fed.core(), name, type_name)
    }

    /// Deliver values of a publication to an endpoint as messages
    pub fn subscribe(&self, endpoint: EndpointId, publication: &str, type_name: &str) -> Result<()> {
        self.fed.ensure_startup("subscribe")?;
        self.messages
            .subscribe(&*self.fed.core(), endpoint, publication, type_name)
    }

    /// Hint to the Core that `endpoint` talks to `target`
    pub fn register_known_communication_path(&self, endpoint: EndpointId, target: &str) -> Result<()> {
        self.messages
            .register_known_communication_path(&*self.fed.core(), endpoint, target)
    }

    /// Destination used when a send names none
    pub fn set_default_destination(&self, endpoint: EndpointId, dest: &str) -> Result<()> {
        self.messages.set_default_destination(endpoint, dest)
    }

    /// Endpoint by full name or local name
    pub fn endpoint_id(&self, name: &str) -> Option<EndpointId> {
        self.messages
            .endpoint_id(name)
            .or_else(|| self.messages.endpoint_id(&self.fed.local_name(name)))
    }

    /// Endpoint record
    pub fn endpoint(&self, id: EndpointId) -> Option<EndpointInfo> {
        self.messages.endpoint(id)
    }

    /// Number of endpoints
    pub fn endpoint_count(&self) -> usize {
        self.messages.endpoint_count()
    }

    /// Send bytes now; an empty `dest` uses the default destination
    pub fn send(&self, source: EndpointId, dest: &str, data: &[u8]) -> Result<()> {
        self.messages.send(&*self.fed.core(), source, dest, data)
    }

    /// Send bytes for delivery at `time`
    pub fn send_at(&self, source: EndpointId, dest: &str, data: &[u8], time: Time) -> Result<()> {
        self.messages
            .send_at(&*self.fed.core(), source, dest, data, time)
    }

    /// Send a fully formed message
    pub fn send_message(&self, source: EndpointId, message: Message) -> Result<()> {
        self.messages
            .send_message(&*self.fed.core(), source, message)
    }

    /// Pop the oldest message of an endpoint
    pub fn get_message(&self, endpoint: EndpointId) -> Option<Message> {
        self.messages.get_message(endpoint)
    }

    /// Pop the oldest message of the first endpoint with one queued
    pub fn get_any_message(&self) -> Option<Message> {
        self.messages.get_any_message()
    }

    /// Whether any endpoint has a queued message
    pub fn has_message(&self) -> bool {
        self.messages.has_message()
    }

    /// Whether an endpoint has a queued message
    pub fn has_message_for(&self, endpoint: EndpointId) -> bool {
        self.messages.has_message_for(endpoint)
    }

    /// Messages queued over all endpoints
    pub fn pending_messages(&self) -> usize {
        self.messages.pending_messages()
    }

    /// Messages queued on one endpoint
    pub fn pending_messages_for(&self, endpoint: EndpointId) -> usize {
        self.messages.pending_messages_for(endpoint)
    }

    /// Callback for endpoints without their own
    pub fn set_catch_all_callback(&self, callback: MessageCallback) {
        self.messages.set_catch_all_callback(callback);
    }

    /// Callback for one endpoint
    pub fn set_endpoint_callback(&self, endpoint: EndpointId, callback: MessageCallback) -> Result<()> {
        self.messages.set_endpoint_callback(endpoint, callback)
    }

    /// One callback shared by several endpoints
    pub fn set_multi_endpoint_callback(&self, endpoints: &[EndpointId], callback: MessageCallback) -> Result<()> {
        self.messages
            .set_multi_endpoint_callback(endpoints, callback)
    }
}

impl std::fmt::Debug for MessageFederate<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageFederate")
            .field("federate", &self.fed.name())
            .field("endpoints", &self.messages.endpoint_count())
            .field("pending", &self.messages.pending_messages())
            .finish()
    }
}
