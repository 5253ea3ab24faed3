//! MessageExchangeManager - Endpoints, message queues and message callbacks
//!
//! Each endpoint owns a FIFO queue. Queues are filled during
//! [`MessageExchangeManager::update_time`] from two sources, in this order:
//!
//! 1. Messages the Core reports ready for any endpoint of the federate.
//! 2. Value updates on publications an endpoint subscribed to, turned into
//!    messages from the publication key to the endpoint.
//!
//! Callbacks run after the message has been queued and with no manager lock
//! held, exactly as for value callbacks.

use crate::identity::EndpointId;
use crate::sync::{lock, read, write};
use cosim_core::{Core, Error, FederateId, InterfaceHandle, Message, Result, Time};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, trace, warn};

/// Callback fired when a message is queued on an endpoint
pub type MessageCallback = Arc<dyn Fn(EndpointId, Time) + Send + Sync>;

/// A registered endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    /// Local id
    pub id: EndpointId,
    /// Registered name
    pub name: String,
    /// Declared type
    pub type_name: String,
    /// Core handle
    pub handle: InterfaceHandle,
    /// Destination used when a send names none
    pub default_destination: String,
}

struct EndpointRecord {
    info: EndpointInfo,
    callback: Option<MessageCallback>,
}

/// A publication feeding an endpoint through a hidden input
#[derive(Debug, Clone)]
struct Subscription {
    input: InterfaceHandle,
    endpoint: EndpointId,
    publication: String,
}

/// Tracks one federate's endpoints and their queues
pub struct MessageExchangeManager {
    fed: FederateId,
    endpoints: RwLock<Vec<EndpointRecord>>,
    queues: Mutex<Vec<VecDeque<Message>>>,
    subscriptions: RwLock<Vec<Subscription>>,
    catch_all: Mutex<Option<MessageCallback>>,
}

impl MessageExchangeManager {
    /// Create an empty manager for a federate
    pub fn new(fed: FederateId) -> Self {
        Self {
            fed,
            endpoints: RwLock::new(Vec::new()),
            queues: Mutex::new(Vec::new()),
            subscriptions: RwLock::new(Vec::new()),
            catch_all: Mutex::new(None),
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register an endpoint under its full name
    pub fn register_endpoint(&self, core: &dyn Core, name: &str, type_name: &str) -> Result<EndpointId> {
        let handle = core.register_endpoint(self.fed, name, type_name)?;
        let id = {
            let mut endpoints = write(&self.endpoints);
            let id = EndpointId(endpoints.len());
            endpoints.push(EndpointRecord {
                info: EndpointInfo {
                    id,
                    name: name.to_string(),
                    type_name: type_name.to_string(),
                    handle,
                    default_destination: String::new(),
                },
                callback: None,
            });
            id
        };
        lock(&self.queues).push(VecDeque::new());
        debug!(federate = %self.fed, %id, %name, "registered endpoint");
        Ok(id)
    }

    /// Deliver future values of a publication to an endpoint as messages
    pub fn subscribe(
        &self,
        core: &dyn Core,
        endpoint: EndpointId,
        publication: &str,
        type_name: &str,
    ) -> Result<()> {
        self.info(endpoint)?;
        let input = core.register_input(self.fed, "", type_name, "")?;
        core.add_source_target(input, publication)?;
        write(&self.subscriptions).push(Subscription {
            input,
            endpoint,
            publication: publication.to_string(),
        });
        debug!(federate = %self.fed, %endpoint, %publication, "endpoint subscribed");
        Ok(())
    }

    /// Tell the Core two endpoints exchange messages
    pub fn register_known_communication_path(
        &self,
        core: &dyn Core,
        endpoint: EndpointId,
        target: &str,
    ) -> Result<()> {
        let info = self.info(endpoint)?;
        core.register_communication_path(&info.name, target);
        Ok(())
    }

    /// Destination used by sends that name none
    pub fn set_default_destination(&self, endpoint: EndpointId, dest: &str) -> Result<()> {
        let mut endpoints = write(&self.endpoints);
        let record = endpoints
            .get_mut(endpoint.0)
            .ok_or_else(|| Error::InvalidIdentifier(format!("{} is out of range", endpoint)))?;
        record.info.default_destination = dest.to_string();
        Ok(())
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Id of an endpoint by name
    pub fn endpoint_id(&self, name: &str) -> Option<EndpointId> {
        read(&self.endpoints)
            .iter()
            .find(|e| e.info.name == name)
            .map(|e| e.info.id)
    }

    /// Endpoint record by id
    pub fn endpoint(&self, id: EndpointId) -> Option<EndpointInfo> {
        read(&self.endpoints).get(id.0).map(|e| e.info.clone())
    }

    /// Number of endpoints
    pub fn endpoint_count(&self) -> usize {
        read(&self.endpoints).len()
    }

    fn info(&self, id: EndpointId) -> Result<EndpointInfo> {
        self.endpoint(id)
            .ok_or_else(|| Error::InvalidIdentifier(format!("{} is out of range", id)))
    }

    fn resolve_dest(info: &EndpointInfo, dest: &str) -> Result<String> {
        if !dest.is_empty() {
            return Ok(dest.to_string());
        }
        if info.default_destination.is_empty() {
            return Err(Error::InvalidParameter(format!(
                "endpoint '{}' has no destination to send to",
                info.name
            )));
        }
        Ok(info.default_destination.clone())
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Send bytes at the federate's current time
    pub fn send(&self, core: &dyn Core, source: EndpointId, dest: &str, data: &[u8]) -> Result<()> {
        let info = self.info(source)?;
        let dest = Self::resolve_dest(&info, dest)?;
        trace!(federate = %self.fed, %source, %dest, bytes = data.len(), "send");
        core.send(info.handle, &dest, data)
    }

    /// Send bytes for delivery at `time`
    pub fn send_at(
        &self,
        core: &dyn Core,
        source: EndpointId,
        dest: &str,
        data: &[u8],
        time: Time,
    ) -> Result<()> {
        let info = self.info(source)?;
        let dest = Self::resolve_dest(&info, dest)?;
        trace!(federate = %self.fed, %source, %dest, %time, "send event");
        core.send_event(time, info.handle, &dest, data)
    }

    /// Send a fully formed message
    pub fn send_message(&self, core: &dyn Core, source: EndpointId, mut message: Message) -> Result<()> {
        let info = self.info(source)?;
        message.dest = Self::resolve_dest(&info, &message.dest)?;
        core.send_message(info.handle, message)
    }

    // ========================================================================
    // Receiving
    // ========================================================================

    /// Pop the oldest message of an endpoint
    pub fn get_message(&self, endpoint: EndpointId) -> Option<Message> {
        lock(&self.queues).get_mut(endpoint.0)?.pop_front()
    }

    /// Pop the oldest message of the first endpoint, in registration order,
    /// that has one
    pub fn get_any_message(&self) -> Option<Message> {
        lock(&self.queues)
            .iter_mut()
            .find(|q| !q.is_empty())
            .and_then(VecDeque::pop_front)
    }

    /// Whether any endpoint has a queued message
    pub fn has_message(&self) -> bool {
        lock(&self.queues).iter().any(|q| !q.is_empty())
    }

    /// Whether an endpoint has a queued message
    pub fn has_message_for(&self, endpoint: EndpointId) -> bool {
        self.pending_messages_for(endpoint) > 0
    }

    /// Number of queued messages across all endpoints
    pub fn pending_messages(&self) -> usize {
        lock(&self.queues).iter().map(VecDeque::len).sum()
    }

    /// Number of queued messages for an endpoint
    pub fn pending_messages_for(&self, endpoint: EndpointId) -> usize {
        lock(&self.queues)
            .get(endpoint.0)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    // ========================================================================
    // Callbacks
    // ========================================================================

    /// Callback for endpoints without their own callback
    pub fn set_catch_all_callback(&self, callback: MessageCallback) {
        *lock(&self.catch_all) = Some(callback);
    }

    /// Callback for one endpoint
    pub fn set_endpoint_callback(&self, endpoint: EndpointId, callback: MessageCallback) -> Result<()> {
        let mut endpoints = write(&self.endpoints);
        let record = endpoints
            .get_mut(endpoint.0)
            .ok_or_else(|| Error::InvalidIdentifier(format!("{} is out of range", endpoint)))?;
        record.callback = Some(callback);
        Ok(())
    }

    /// One callback shared by several endpoints
    pub fn set_multi_endpoint_callback(
        &self,
        endpoints: &[EndpointId],
        callback: MessageCallback,
    ) -> Result<()> {
        let mut records = write(&self.endpoints);
        if let Some(bad) = endpoints.iter().find(|id| id.0 >= records.len()) {
            return Err(Error::InvalidIdentifier(format!("{} is out of range", bad)));
        }
        for id in endpoints {
            records[id.0].callback = Some(Arc::clone(&callback));
        }
        Ok(())
    }

    // ========================================================================
    // Time hooks
    // ========================================================================

    /// Make sure every endpoint has a queue
    pub fn startup_to_initialize(&self) {
        let count = self.endpoint_count();
        let mut queues = lock(&self.queues);
        if queues.len() < count {
            queues.resize_with(count, VecDeque::new);
        }
    }

    /// Pull ready messages and subscription updates from the Core
    pub fn update_time(&self, core: &dyn Core, new_time: Time, old_time: Time) {
        trace!(federate = %self.fed, %new_time, %old_time, "message update");
        while let Some((handle, message)) = core.receive_any(self.fed) {
            let endpoint = read(&self.endpoints)
                .iter()
                .find(|e| e.info.handle == handle)
                .map(|e| e.info.id);
            match endpoint {
                Some(endpoint) => self.deliver(endpoint, message, new_time),
                None => warn!(federate = %self.fed, %handle, "message for unknown endpoint dropped"),
            }
        }

        let subscriptions = read(&self.subscriptions).clone();
        if subscriptions.is_empty() {
            return;
        }
        for handle in core.value_updates(self.fed) {
            for sub in subscriptions.iter().filter(|s| s.input == handle) {
                let Some(info) = self.endpoint(sub.endpoint) else {
                    continue;
                };
                let message = Message::new(sub.publication.as_str(), info.name, core.value(handle))
                    .at(new_time);
                self.deliver(sub.endpoint, message, new_time);
            }
        }
    }

    fn deliver(&self, endpoint: EndpointId, message: Message, time: Time) {
        {
            let mut queues = lock(&self.queues);
            if queues.len() <= endpoint.0 {
                queues.resize_with(endpoint.0 + 1, VecDeque::new);
            }
            queues[endpoint.0].push_back(message);
        }
        let callback = read(&self.endpoints)
            .get(endpoint.0)
            .and_then(|e| e.callback.clone())
            .or_else(|| lock(&self.catch_all).clone());
        if let Some(callback) = callback {
            callback(endpoint, time);
        }
    }
}

impl std::fmt::Debug for MessageExchangeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageExchangeManager")
            .field("fed", &self.fed)
            .field("endpoints", &self.endpoint_count())
            .field("pending", &self.pending_messages())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosim_core::{IterationRequest, LoopbackCore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup() -> (LoopbackCore, FederateId, MessageExchangeManager) {
        let core = LoopbackCore::new();
        let fed = core.register_federate("fed").unwrap();
        (core, fed, MessageExchangeManager::new(fed))
    }

    fn execute(core: &LoopbackCore, fed: FederateId) {
        core.enter_initializing_mode(fed).unwrap();
        core.enter_executing_mode(fed, IterationRequest::NoIterations)
            .unwrap();
    }

    #[test]
    fn test_any_message_scans_in_registration_order() {
        let (core, fed, messages) = setup();
        let ids: Vec<EndpointId> = ["e0", "e1", "e2"]
            .iter()
            .map(|name| messages.register_endpoint(&core, name, "").unwrap())
            .collect();
        assert_eq!(ids, vec![EndpointId(0), EndpointId(1), EndpointId(2)]);
        messages.startup_to_initialize();
        execute(&core, fed);

        core.inject_message("e2", Message::new("remote", "e2", b"two".to_vec()))
            .unwrap();
        core.inject_message("e1", Message::new("remote", "e1", b"one".to_vec()))
            .unwrap();
        messages.update_time(&core, Time::ZERO, Time::ZERO);
        assert_eq!(messages.pending_messages(), 2);

        assert_eq!(messages.get_any_message().unwrap().data, b"one".to_vec());
        assert_eq!(messages.get_any_message().unwrap().data, b"two".to_vec());
        assert!(!messages.has_message());
        assert!(messages.get_any_message().is_none());
    }

    #[test]
    fn test_send_requires_destination() {
        let (core, fed, messages) = setup();
        let src = messages.register_endpoint(&core, "src", "").unwrap();
        let dst = messages.register_endpoint(&core, "dst", "").unwrap();
        execute(&core, fed);

        assert!(matches!(
            messages.send(&core, src, "", b"x"),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            messages.send(&core, EndpointId(9), "dst", b"x"),
            Err(Error::InvalidIdentifier(_))
        ));

        messages.set_default_destination(src, "dst").unwrap();
        messages.send(&core, src, "", b"x").unwrap();
        messages.update_time(&core, Time::ZERO, Time::ZERO);
        assert!(messages.has_message_for(dst));
        let msg = messages.get_message(dst).unwrap();
        assert_eq!(msg.source, "src");
        assert_eq!(msg.dest, "dst");
    }

    #[test]
    fn test_timed_send_waits_for_grant() {
        let (core, fed, messages) = setup();
        let src = messages.register_endpoint(&core, "src", "").unwrap();
        let dst = messages.register_endpoint(&core, "dst", "").unwrap();
        execute(&core, fed);

        messages
            .send_at(&core, src, "dst", b"later", Time::from_secs(2.0))
            .unwrap();
        messages.update_time(&core, Time::ZERO, Time::ZERO);
        assert_eq!(messages.pending_messages_for(dst), 0);

        let t = core.time_request(fed, Time::from_secs(2.0)).unwrap();
        messages.update_time(&core, t, Time::ZERO);
        let msg = messages.get_message(dst).unwrap();
        assert_eq!(msg.time, Time::from_secs(2.0));
    }

    #[test]
    fn test_subscription_bridges_values() {
        let (core, fed, messages) = setup();
        let pub_handle = core.register_publication(fed, "sensor", "double", "").unwrap();
        let ep = messages.register_endpoint(&core, "listener", "").unwrap();
        messages.subscribe(&core, ep, "sensor", "double").unwrap();
        execute(&core, fed);

        core.set_value(pub_handle, b"reading").unwrap();
        let t = core.time_request(fed, Time::from_secs(1.0)).unwrap();
        messages.update_time(&core, t, Time::ZERO);

        let msg = messages.get_message(ep).unwrap();
        assert_eq!(msg.source, "sensor");
        assert_eq!(msg.dest, "listener");
        assert_eq!(msg.data, b"reading".to_vec());
        assert_eq!(msg.time, t);
    }

    #[test]
    fn test_callbacks_fire_after_queueing() {
        let (core, fed, messages) = setup();
        let messages = Arc::new(messages);
        let ep = messages.register_endpoint(&core, "inbox", "").unwrap();
        execute(&core, fed);

        let seen = Arc::new(AtomicUsize::new(0));
        let (seen_cb, manager) = (Arc::clone(&seen), Arc::clone(&messages));
        messages
            .set_endpoint_callback(
                ep,
                Arc::new(move |id: EndpointId, _: Time| {
                    // re-entering the manager must not deadlock
                    assert!(manager.get_message(id).is_some());
                    seen_cb.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        core.inject_message("inbox", Message::new("x", "inbox", b"1".to_vec()))
            .unwrap();
        messages.update_time(&core, Time::ZERO, Time::ZERO);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(messages.pending_messages(), 0);
    }

    #[test]
    fn test_catch_all_callback() {
        let (core, fed, messages) = setup();
        let a = messages.register_endpoint(&core, "a", "").unwrap();
        let b = messages.register_endpoint(&core, "b", "").unwrap();
        execute(&core, fed);

        let hits = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&hits);
        messages.set_catch_all_callback(Arc::new(move |id: EndpointId, _: Time| {
            sink.lock().unwrap().push(id);
        }));
        messages
            .set_multi_endpoint_callback(&[b], Arc::new(|_: EndpointId, _: Time| {}))
            .unwrap();

        core.inject_message("a", Message::new("x", "a", b"1".to_vec()))
            .unwrap();
        core.inject_message("b", Message::new("x", "b", b"2".to_vec()))
            .unwrap();
        messages.update_time(&core, Time::ZERO, Time::ZERO);
        assert_eq!(*hits.lock().unwrap(), vec![a]);
    }
}
