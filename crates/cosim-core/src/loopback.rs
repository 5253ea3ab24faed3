//! LoopbackCore - An in-process Core for federates sharing one process
//!
//! This Core hosts any number of federates behind a single mutex. It is
//! deliberately simple about time: each federate is granted
//! `max(requested, current + time_delta)` (rounded up to its period) without
//! waiting for its peers, so there is no federation-wide consensus. Data
//! routing is complete:
//!
//! - Publications are matched to inputs by key; an input sees an update at
//!   the first grant after a new value was published.
//! - Messages are routed by endpoint name and delivered once the receiving
//!   federate has been granted their delivery time.
//! - Source and destination filters run their operators on messages in
//!   transit; cloning filters deliver copies in addition to the original.
//! - Translators turn messages addressed to them into values, and values
//!   published on their source targets into messages.
//!
//! # Scripting
//!
//! Tests drive edge cases through a few hooks:
//! [`LoopbackCore::script_iteration`] queues iteration results,
//! [`LoopbackCore::fail_next_time_request`] makes the next time request
//! fail, and [`LoopbackCore::inject_message`] delivers a message as if it
//! came from a remote federate.
//!
//! Operators run while the core lock is held; they must not call back into
//! the core.

use crate::{
    Core, Error, FederateId, FilterOperator, FlagOption, InterfaceHandle, IterationRequest,
    IterationResult, IterationTime, Message, Result, Time, TimeProperty, TranslatorOperator,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Lifecycle of a federate as seen by the loopback core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Startup,
    Initializing,
    Executing,
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleKind {
    Publication,
    Input,
    Endpoint,
    Filter { cloning: bool },
    Translator,
}

struct FederateSlot {
    name: String,
    mode: Mode,
    time: Time,
    updates: Vec<InterfaceHandle>,
    scripted: VecDeque<IterationResult>,
    fail_next: Option<String>,
    time_properties: HashMap<TimeProperty, Time>,
    flags: HashMap<FlagOption, bool>,
    log: Vec<(i32, String)>,
}

impl FederateSlot {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: Mode::Startup,
            time: Time::ZERO,
            updates: Vec::new(),
            scripted: VecDeque::new(),
            fail_next: None,
            time_properties: HashMap::new(),
            flags: HashMap::new(),
            log: Vec::new(),
        }
    }

    fn property(&self, property: TimeProperty) -> Time {
        self.time_properties
            .get(&property)
            .copied()
            .unwrap_or(Time::ZERO)
    }

    /// Next grantable time for a request
    fn grant(&self, next: Time) -> Time {
        let mut granted = next.max(self.time + self.property(TimeProperty::TimeDelta));
        let period = self.property(TimeProperty::Period);
        if period > Time::ZERO && granted != Time::MAX {
            let offset = self.property(TimeProperty::Offset);
            let span = (granted - offset).as_nanos();
            let steps = span.div_euclid(period.as_nanos())
                + i64::from(span.rem_euclid(period.as_nanos()) != 0);
            granted = offset + Time::from_nanos(steps.saturating_mul(period.as_nanos()));
        }
        granted
    }
}

struct HandleRecord {
    kind: HandleKind,
    fed: Option<FederateId>,
    key: String,
    type_name: String,
    sources: Vec<String>,
    destinations: Vec<String>,
    closed: bool,
    value: Vec<u8>,
    version: u64,
    seen: HashMap<InterfaceHandle, u64>,
    options: HashMap<FlagOption, bool>,
    filter_op: Option<Arc<dyn FilterOperator>>,
    translator_op: Option<Arc<dyn TranslatorOperator>>,
}

impl HandleRecord {
    fn new(kind: HandleKind, fed: Option<FederateId>, key: &str, type_name: &str) -> Self {
        Self {
            kind,
            fed,
            key: key.to_string(),
            type_name: type_name.to_string(),
            sources: Vec::new(),
            destinations: Vec::new(),
            closed: false,
            value: Vec::new(),
            version: 0,
            seen: HashMap::new(),
            options: HashMap::new(),
            filter_op: None,
            translator_op: None,
        }
    }

    fn carries_values(&self) -> bool {
        matches!(self.kind, HandleKind::Publication | HandleKind::Translator)
    }
}

struct PendingMessage {
    seq: u64,
    dest: InterfaceHandle,
    message: Message,
}

#[derive(Default)]
struct LoopbackState {
    federates: Vec<FederateSlot>,
    handles: Vec<HandleRecord>,
    pending: Vec<PendingMessage>,
    sequence: u64,
}

impl LoopbackState {
    fn slot(&self, fed: FederateId) -> Result<&FederateSlot> {
        usize::try_from(fed.0)
            .ok()
            .and_then(|i| self.federates.get(i))
            .ok_or_else(|| Error::InvalidIdentifier(format!("unknown federate {}", fed)))
    }

    fn slot_mut(&mut self, fed: FederateId) -> Result<&mut FederateSlot> {
        usize::try_from(fed.0)
            .ok()
            .and_then(|i| self.federates.get_mut(i))
            .ok_or_else(|| Error::InvalidIdentifier(format!("unknown federate {}", fed)))
    }

    fn record(&self, handle: InterfaceHandle) -> Option<&HandleRecord> {
        usize::try_from(handle.0).ok().and_then(|i| self.handles.get(i))
    }

    fn record_mut(&mut self, handle: InterfaceHandle) -> Result<&mut HandleRecord> {
        usize::try_from(handle.0)
            .ok()
            .and_then(|i| self.handles.get_mut(i))
            .ok_or_else(|| Error::InvalidIdentifier(format!("unknown {}", handle)))
    }

    fn find(&self, key: &str, pred: impl Fn(&HandleRecord) -> bool) -> Option<InterfaceHandle> {
        self.handles
            .iter()
            .position(|h| h.key == key && pred(h))
            .map(|i| InterfaceHandle(i as i32))
    }

    fn add_handle(&mut self, record: HandleRecord) -> Result<InterfaceHandle> {
        let duplicate = !record.key.is_empty()
            && self
                .handles
                .iter()
                .any(|h| h.key == record.key && h.kind == record.kind);
        if duplicate {
            return Err(Error::RegistrationFailure(format!(
                "duplicate interface name '{}'",
                record.key
            )));
        }
        let handle = InterfaceHandle(self.handles.len() as i32);
        self.handles.push(record);
        Ok(handle)
    }

    /// Recompute which inputs of `fed` saw new values since the last grant
    fn refresh_updates(&mut self, fed: FederateId) {
        let mut updated = Vec::new();
        for idx in 0..self.handles.len() {
            let (is_input, sources) = {
                let h = &self.handles[idx];
                (
                    h.kind == HandleKind::Input && h.fed == Some(fed) && !h.closed,
                    h.sources.clone(),
                )
            };
            if !is_input {
                continue;
            }
            let mut changed = false;
            for key in &sources {
                let Some(src) = self.find(key, |h| h.carries_values() && !h.closed) else {
                    continue;
                };
                let version = self.handles[src.0 as usize].version;
                let seen = self.handles[idx].seen.entry(src).or_insert(0);
                if version > *seen {
                    *seen = version;
                    changed = true;
                }
            }
            if changed {
                updated.push(InterfaceHandle(idx as i32));
            }
        }
        if let Ok(slot) = self.slot_mut(fed) {
            slot.updates = updated;
        }
    }

    fn enqueue(&mut self, dest: InterfaceHandle, message: Message) {
        self.sequence += 1;
        self.pending.push(PendingMessage {
            seq: self.sequence,
            dest,
            message,
        });
    }

    /// Run a message through filters and translators, then queue it
    fn route(&mut self, message: Message) {
        let mut batch = vec![message];

        // source filters, then destination filters
        for stage in [true, false] {
            let filters: Vec<(bool, Vec<String>, Option<Arc<dyn FilterOperator>>)> = self
                .handles
                .iter()
                .filter(|h| matches!(h.kind, HandleKind::Filter { .. }) && !h.closed)
                .map(|h| {
                    let cloning = matches!(h.kind, HandleKind::Filter { cloning: true });
                    let targets = if stage {
                        h.sources.clone()
                    } else {
                        h.destinations.clone()
                    };
                    (cloning, targets, h.filter_op.clone())
                })
                .collect();

            let mut next = Vec::new();
            for msg in batch {
                let mut current = Some(msg);
                let mut clones = Vec::new();
                for (cloning, targets, op) in &filters {
                    let Some(msg) = current.take() else { break };
                    let address = if stage { &msg.source } else { &msg.dest };
                    if !targets.iter().any(|t| t == address) {
                        current = Some(msg);
                        continue;
                    }
                    match (cloning, op) {
                        (true, Some(op)) => {
                            clones.extend(op.process_vector(msg.clone()));
                            current = Some(msg);
                        }
                        (false, Some(op)) => current = op.process(msg),
                        (_, None) => current = Some(msg),
                    }
                }
                next.extend(current);
                next.extend(clones);
            }
            batch = next;
        }

        for msg in batch {
            self.deliver(msg);
        }
    }

    fn deliver(&mut self, message: Message) {
        if let Some(translator) = self.find(&message.dest, |h| {
            h.kind == HandleKind::Translator && !h.closed
        }) {
            let op = self.handles[translator.0 as usize].translator_op.clone();
            if let Some(op) = op {
                let value = op.convert_to_value(&message);
                let record = &mut self.handles[translator.0 as usize];
                record.value = value;
                record.version += 1;
            }
            return;
        }

        match self.find(&message.dest, |h| h.kind == HandleKind::Endpoint && !h.closed) {
            Some(endpoint) => self.enqueue(endpoint, message),
            None => warn!(dest = %message.dest, "LoopbackCore: no endpoint for message, dropped"),
        }
    }

    fn sender_time(&self, source: InterfaceHandle) -> Time {
        self.record(source)
            .and_then(|h| h.fed)
            .and_then(|fed| self.slot(fed).ok())
            .map(|slot| slot.time + slot.property(TimeProperty::OutputDelay))
            .unwrap_or(Time::ZERO)
    }

    fn endpoint_key(&self, source: InterfaceHandle) -> Result<String> {
        match self.record(source) {
            Some(h) if h.kind == HandleKind::Endpoint && !h.closed => Ok(h.key.clone()),
            Some(_) => Err(Error::InvalidIdentifier(format!(
                "{} is not an open endpoint",
                source
            ))),
            None => Err(Error::InvalidIdentifier(format!("unknown {}", source))),
        }
    }

    /// Index of the earliest deliverable message matching `accept`
    fn next_ready(&self, accept: impl Fn(InterfaceHandle) -> bool) -> Option<usize> {
        self.pending
            .iter()
            .enumerate()
            .filter(|(_, p)| accept(p.dest))
            .filter(|(_, p)| {
                self.record(p.dest)
                    .and_then(|h| h.fed)
                    .and_then(|fed| self.slot(fed).ok())
                    .map(|slot| p.message.time <= slot.time)
                    .unwrap_or(false)
            })
            .min_by_key(|(_, p)| (p.message.time, p.seq))
            .map(|(i, _)| i)
    }

    fn first_source_value(&self, handle: InterfaceHandle) -> Option<&HandleRecord> {
        let input = self.record(handle)?;
        input
            .sources
            .iter()
            .filter_map(|key| self.find(key, |h| h.carries_values()))
            .filter_map(|h| self.record(h))
            .find(|h| h.version > 0)
    }
}

/// In-process Core for federates living in the same process
#[derive(Default)]
pub struct LoopbackCore {
    state: Mutex<LoopbackState>,
}

impl LoopbackCore {
    /// Create an empty loopback core
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared loopback core
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Scripting hooks
    // ========================================================================

    /// Queue iteration results returned by the next executing-mode entries
    /// or iterative time requests of `fed`
    pub fn script_iteration(&self, fed: FederateId, results: impl IntoIterator<Item = IterationResult>) {
        if let Ok(slot) = self.lock().slot_mut(fed) {
            slot.scripted.extend(results);
        }
    }

    /// Make the next time request of `fed` fail with an execution failure
    pub fn fail_next_time_request(&self, fed: FederateId, reason: impl Into<String>) {
        if let Ok(slot) = self.lock().slot_mut(fed) {
            slot.fail_next = Some(reason.into());
        }
    }

    /// Deliver a message to a named endpoint as if from a remote federate
    ///
    /// Filters are bypassed; the message is ready once the receiver has
    /// been granted `message.time`.
    pub fn inject_message(&self, endpoint: &str, mut message: Message) -> Result<()> {
        let mut state = self.lock();
        let handle = state
            .find(endpoint, |h| h.kind == HandleKind::Endpoint && !h.closed)
            .ok_or_else(|| Error::InvalidIdentifier(format!("no endpoint named '{}'", endpoint)))?;
        message.dest = endpoint.to_string();
        if message.original_dest.is_empty() {
            message.original_dest = endpoint.to_string();
        }
        state.enqueue(handle, message);
        Ok(())
    }

    /// Log records forwarded by a federate
    pub fn logged_messages(&self, fed: FederateId) -> Vec<(i32, String)> {
        self.lock()
            .slot(fed)
            .map(|slot| slot.log.clone())
            .unwrap_or_default()
    }

    /// Whether a handle has been closed
    pub fn is_closed(&self, handle: InterfaceHandle) -> bool {
        self.lock().record(handle).map(|h| h.closed).unwrap_or(false)
    }

    /// Whether a federate has finalized
    pub fn is_finalized(&self, fed: FederateId) -> bool {
        self.lock()
            .slot(fed)
            .map(|slot| slot.mode == Mode::Finalized)
            .unwrap_or(false)
    }

    /// Number of messages in flight, delivered or not
    pub fn messages_in_flight(&self) -> usize {
        self.lock().pending.len()
    }

    fn scripted_or(&self, state: &mut LoopbackState, fed: FederateId, iterate: IterationRequest) -> Result<IterationResult> {
        let slot = state.slot_mut(fed)?;
        Ok(slot.scripted.pop_front().unwrap_or(match iterate {
            IterationRequest::ForceIteration => IterationResult::Iterating,
            _ => IterationResult::NextStep,
        }))
    }
}

impl Core for LoopbackCore {
    fn register_federate(&self, name: &str) -> Result<FederateId> {
        let mut state = self.lock();
        if state.federates.iter().any(|f| f.name == name) {
            return Err(Error::RegistrationFailure(format!(
                "duplicate federate name '{}'",
                name
            )));
        }
        let id = FederateId(state.federates.len() as i32);
        state.federates.push(FederateSlot::new(name));
        debug!(%name, %id, "LoopbackCore::register_federate");
        Ok(id)
    }

    fn enter_initializing_mode(&self, fed: FederateId) -> Result<()> {
        let mut state = self.lock();
        let slot = state.slot_mut(fed)?;
        match slot.mode {
            Mode::Startup | Mode::Initializing => {
                slot.mode = Mode::Initializing;
                Ok(())
            }
            mode => Err(Error::InvalidFunctionCall(format!(
                "cannot enter initializing mode from {:?}",
                mode
            ))),
        }
    }

    fn enter_executing_mode(
        &self,
        fed: FederateId,
        iterate: IterationRequest,
    ) -> Result<IterationResult> {
        let mut state = self.lock();
        let result = self.scripted_or(&mut state, fed, iterate)?;
        match result {
            IterationResult::NextStep => {
                let slot = state.slot_mut(fed)?;
                slot.mode = Mode::Executing;
                slot.time = Time::ZERO;
                state.refresh_updates(fed);
            }
            IterationResult::Iterating => state.refresh_updates(fed),
            IterationResult::Halted => state.slot_mut(fed)?.mode = Mode::Finalized,
            IterationResult::Error => {}
        }
        Ok(result)
    }

    fn current_time(&self, fed: FederateId) -> Time {
        self.lock()
            .slot(fed)
            .map(|slot| slot.time)
            .unwrap_or(Time::ZERO)
    }

    fn time_request(&self, fed: FederateId, next: Time) -> Result<Time> {
        let mut state = self.lock();
        let slot = state.slot_mut(fed)?;
        if let Some(reason) = slot.fail_next.take() {
            return Err(Error::ExecutionFailure(reason));
        }
        if slot.mode != Mode::Executing {
            return Err(Error::InvalidFunctionCall(
                "time request outside executing mode".to_string(),
            ));
        }
        let granted = slot.grant(next);
        slot.time = granted;
        state.refresh_updates(fed);
        Ok(granted)
    }

    fn request_time_iterative(
        &self,
        fed: FederateId,
        next: Time,
        iterate: IterationRequest,
    ) -> Result<IterationTime> {
        let mut state = self.lock();
        {
            let slot = state.slot_mut(fed)?;
            if let Some(reason) = slot.fail_next.take() {
                return Err(Error::ExecutionFailure(reason));
            }
            if slot.mode != Mode::Executing {
                return Err(Error::InvalidFunctionCall(
                    "time request outside executing mode".to_string(),
                ));
            }
        }
        let result = self.scripted_or(&mut state, fed, iterate)?;
        let slot = state.slot_mut(fed)?;
        match result {
            IterationResult::NextStep => {
                slot.time = slot.grant(next);
                state.refresh_updates(fed);
            }
            IterationResult::Iterating => state.refresh_updates(fed),
            IterationResult::Halted => {
                // the halting grant still carries the last round of data
                slot.time = slot.grant(next);
                slot.mode = Mode::Finalized;
                state.refresh_updates(fed);
            }
            IterationResult::Error => {}
        }
        let granted = state.slot(fed)?.time;
        Ok(IterationTime::new(granted, result))
    }

    fn finalize(&self, fed: FederateId) -> Result<()> {
        let mut state = self.lock();
        state.slot_mut(fed)?.mode = Mode::Finalized;
        debug!(%fed, "LoopbackCore::finalize");
        Ok(())
    }

    fn query(&self, target: &str, query: &str) -> String {
        let state = self.lock();
        match (target, query) {
            ("federation" | "root", "federates") => {
                let names: Vec<&str> = state.federates.iter().map(|f| f.name.as_str()).collect();
                format!("[{}]", names.join(";"))
            }
            ("federation" | "root", "federate_count") => state.federates.len().to_string(),
            (name, "exists") => state.federates.iter().any(|f| f.name == name).to_string(),
            (name, "current_time") => state
                .federates
                .iter()
                .find(|f| f.name == name)
                .map(|f| f.time.as_secs_f64().to_string())
                .unwrap_or_else(|| "#invalid".to_string()),
            _ => "#invalid".to_string(),
        }
    }

    fn log_message(&self, fed: FederateId, level: i32, message: &str) {
        if let Ok(slot) = self.lock().slot_mut(fed) {
            slot.log.push((level, message.to_string()));
        }
    }

    fn set_time_property(&self, fed: FederateId, property: TimeProperty, value: Time) -> Result<()> {
        if value.is_negative() {
            return Err(Error::InvalidParameter(format!(
                "{:?} must be non-negative",
                property
            )));
        }
        self.lock()
            .slot_mut(fed)?
            .time_properties
            .insert(property, value);
        Ok(())
    }

    fn time_property(&self, fed: FederateId, property: TimeProperty) -> Time {
        self.lock()
            .slot(fed)
            .map(|slot| slot.property(property))
            .unwrap_or(Time::ZERO)
    }

    fn set_flag_option(&self, fed: FederateId, flag: FlagOption, value: bool) -> Result<()> {
        self.lock().slot_mut(fed)?.flags.insert(flag, value);
        Ok(())
    }

    fn flag_option(&self, fed: FederateId, flag: FlagOption) -> bool {
        self.lock()
            .slot(fed)
            .ok()
            .and_then(|slot| slot.flags.get(&flag).copied())
            .unwrap_or(false)
    }

    fn register_publication(
        &self,
        fed: FederateId,
        key: &str,
        type_name: &str,
        _units: &str,
    ) -> Result<InterfaceHandle> {
        let mut state = self.lock();
        state.slot(fed)?;
        if key.is_empty() {
            return Err(Error::RegistrationFailure(
                "publications require a key".to_string(),
            ));
        }
        state.add_handle(HandleRecord::new(
            HandleKind::Publication,
            Some(fed),
            key,
            type_name,
        ))
    }

    fn register_input(
        &self,
        fed: FederateId,
        key: &str,
        type_name: &str,
        _units: &str,
    ) -> Result<InterfaceHandle> {
        let mut state = self.lock();
        state.slot(fed)?;
        state.add_handle(HandleRecord::new(HandleKind::Input, Some(fed), key, type_name))
    }

    fn register_endpoint(
        &self,
        fed: FederateId,
        name: &str,
        type_name: &str,
    ) -> Result<InterfaceHandle> {
        let mut state = self.lock();
        state.slot(fed)?;
        if name.is_empty() {
            return Err(Error::RegistrationFailure(
                "endpoints require a name".to_string(),
            ));
        }
        state.add_handle(HandleRecord::new(
            HandleKind::Endpoint,
            Some(fed),
            name,
            type_name,
        ))
    }

    fn register_filter(&self, name: &str, type_in: &str, _type_out: &str) -> Result<InterfaceHandle> {
        let mut state = self.lock();
        let key = if name.is_empty() {
            format!("_filter_{}", state.handles.len())
        } else {
            name.to_string()
        };
        state.add_handle(HandleRecord::new(
            HandleKind::Filter { cloning: false },
            None,
            &key,
            type_in,
        ))
    }

    fn register_cloning_filter(
        &self,
        name: &str,
        type_in: &str,
        _type_out: &str,
    ) -> Result<InterfaceHandle> {
        let mut state = self.lock();
        let key = if name.is_empty() {
            format!("_cloning_filter_{}", state.handles.len())
        } else {
            name.to_string()
        };
        state.add_handle(HandleRecord::new(
            HandleKind::Filter { cloning: true },
            None,
            &key,
            type_in,
        ))
    }

    fn register_translator(
        &self,
        name: &str,
        endpoint_type: &str,
        _units: &str,
    ) -> Result<InterfaceHandle> {
        let mut state = self.lock();
        let key = if name.is_empty() {
            format!("_translator_{}", state.handles.len())
        } else {
            name.to_string()
        };
        state.add_handle(HandleRecord::new(
            HandleKind::Translator,
            None,
            &key,
            endpoint_type,
        ))
    }

    fn handle_name(&self, handle: InterfaceHandle) -> String {
        self.lock()
            .record(handle)
            .map(|h| h.key.clone())
            .unwrap_or_default()
    }

    fn publisher_type(&self, handle: InterfaceHandle) -> String {
        let state = self.lock();
        state
            .record(handle)
            .and_then(|input| {
                input
                    .sources
                    .iter()
                    .find_map(|key| state.find(key, |h| h.carries_values()))
            })
            .and_then(|src| state.record(src))
            .map(|src| src.type_name.clone())
            .unwrap_or_default()
    }

    fn add_source_target(&self, handle: InterfaceHandle, target: &str) -> Result<()> {
        let mut state = self.lock();
        let record = state.record_mut(handle)?;
        if !record.sources.iter().any(|s| s == target) {
            record.sources.push(target.to_string());
        }
        Ok(())
    }

    fn add_destination_target(&self, handle: InterfaceHandle, target: &str) -> Result<()> {
        let mut state = self.lock();
        let key = state.record_mut(handle)?.key.clone();
        let kind = state.record_mut(handle)?.kind;

        // a publication feeding an input is the input's source
        if kind == HandleKind::Publication {
            if let Some(input) = state.find(target, |h| h.kind == HandleKind::Input) {
                let input = state.record_mut(input)?;
                if !input.sources.contains(&key) {
                    input.sources.push(key);
                }
                return Ok(());
            }
        }
        let record = state.record_mut(handle)?;
        if !record.destinations.iter().any(|d| d == target) {
            record.destinations.push(target.to_string());
        }
        Ok(())
    }

    fn register_communication_path(&self, source: &str, dest: &str) {
        debug!(%source, %dest, "LoopbackCore: communication path hint ignored");
    }

    fn close_handle(&self, handle: InterfaceHandle) {
        if let Ok(record) = self.lock().record_mut(handle) {
            record.closed = true;
        }
    }

    fn set_handle_option(&self, handle: InterfaceHandle, flag: FlagOption, value: bool) -> Result<()> {
        self.lock().record_mut(handle)?.options.insert(flag, value);
        Ok(())
    }

    fn handle_option(&self, handle: InterfaceHandle, flag: FlagOption) -> bool {
        self.lock()
            .record(handle)
            .and_then(|h| h.options.get(&flag).copied())
            .unwrap_or(false)
    }

    fn set_value(&self, handle: InterfaceHandle, data: &[u8]) -> Result<()> {
        let mut state = self.lock();
        let (key, fed) = {
            let record = state.record_mut(handle)?;
            if record.kind != HandleKind::Publication || record.closed {
                return Err(Error::InvalidIdentifier(format!(
                    "{} is not an open publication",
                    handle
                )));
            }
            if record.options.get(&FlagOption::OnlyTransmitOnChange) == Some(&true)
                && record.version > 0
                && record.value == data
            {
                return Ok(());
            }
            record.value = data.to_vec();
            record.version += 1;
            (record.key.clone(), record.fed)
        };

        // translators listening to this publication emit messages
        let now = fed
            .and_then(|f| state.slot(f).ok())
            .map(|slot| slot.time)
            .unwrap_or(Time::ZERO);
        let translators: Vec<(String, Vec<String>, Arc<dyn TranslatorOperator>)> = state
            .handles
            .iter()
            .filter(|h| h.kind == HandleKind::Translator && !h.closed)
            .filter(|h| h.sources.iter().any(|s| *s == key))
            .filter_map(|h| {
                h.translator_op
                    .clone()
                    .map(|op| (h.key.clone(), h.destinations.clone(), op))
            })
            .collect();
        for (name, destinations, op) in translators {
            for dest in destinations {
                let mut msg = op.convert_to_message(data);
                msg.source = name.clone();
                msg.original_source = name.clone();
                msg.dest = dest.clone();
                msg.original_dest = dest;
                msg.time = now + op.message_time_shift();
                state.route(msg);
            }
        }
        Ok(())
    }

    fn value(&self, handle: InterfaceHandle) -> Vec<u8> {
        self.lock()
            .first_source_value(handle)
            .map(|src| src.value.clone())
            .unwrap_or_default()
    }

    fn all_values(&self, handle: InterfaceHandle) -> Vec<Vec<u8>> {
        let state = self.lock();
        let Some(input) = state.record(handle) else {
            return Vec::new();
        };
        input
            .sources
            .iter()
            .filter_map(|key| state.find(key, |h| h.carries_values()))
            .filter_map(|h| state.record(h))
            .map(|src| src.value.clone())
            .collect()
    }

    fn value_updates(&self, fed: FederateId) -> Vec<InterfaceHandle> {
        self.lock()
            .slot(fed)
            .map(|slot| slot.updates.clone())
            .unwrap_or_default()
    }

    fn send(&self, source: InterfaceHandle, dest: &str, data: &[u8]) -> Result<()> {
        let mut state = self.lock();
        let key = state.endpoint_key(source)?;
        let time = state.sender_time(source);
        state.route(Message::new(key, dest, data.to_vec()).at(time));
        Ok(())
    }

    fn send_event(&self, time: Time, source: InterfaceHandle, dest: &str, data: &[u8]) -> Result<()> {
        let mut state = self.lock();
        let key = state.endpoint_key(source)?;
        let time = time.max(state.sender_time(source));
        state.route(Message::new(key, dest, data.to_vec()).at(time));
        Ok(())
    }

    fn send_message(&self, source: InterfaceHandle, mut message: Message) -> Result<()> {
        let mut state = self.lock();
        let key = state.endpoint_key(source)?;
        if message.source.is_empty() {
            message.source = key.clone();
        }
        if message.original_source.is_empty() {
            message.original_source = key;
        }
        if message.original_dest.is_empty() {
            message.original_dest = message.dest.clone();
        }
        message.time = message.time.max(state.sender_time(source));
        state.route(message);
        Ok(())
    }

    fn receive(&self, endpoint: InterfaceHandle) -> Option<Message> {
        let mut state = self.lock();
        let idx = state.next_ready(|dest| dest == endpoint)?;
        Some(state.pending.remove(idx).message)
    }

    fn receive_any(&self, fed: FederateId) -> Option<(InterfaceHandle, Message)> {
        let mut state = self.lock();
        let owned: Vec<InterfaceHandle> = state
            .handles
            .iter()
            .enumerate()
            .filter(|(_, h)| h.kind == HandleKind::Endpoint && h.fed == Some(fed))
            .map(|(i, _)| InterfaceHandle(i as i32))
            .collect();
        let idx = state.next_ready(|dest| owned.contains(&dest))?;
        let pending = state.pending.remove(idx);
        Some((pending.dest, pending.message))
    }

    fn receive_count(&self, endpoint: InterfaceHandle) -> usize {
        let state = self.lock();
        let time = state
            .record(endpoint)
            .and_then(|h| h.fed)
            .and_then(|fed| state.slot(fed).ok())
            .map(|slot| slot.time);
        match time {
            Some(time) => state
                .pending
                .iter()
                .filter(|p| p.dest == endpoint && p.message.time <= time)
                .count(),
            None => 0,
        }
    }

    fn set_filter_operator(
        &self,
        filter: InterfaceHandle,
        operator: Arc<dyn FilterOperator>,
    ) -> Result<()> {
        let mut state = self.lock();
        let record = state.record_mut(filter)?;
        if !matches!(record.kind, HandleKind::Filter { .. }) {
            return Err(Error::InvalidIdentifier(format!("{} is not a filter", filter)));
        }
        record.filter_op = Some(operator);
        Ok(())
    }

    fn set_translator_operator(
        &self,
        translator: InterfaceHandle,
        operator: Arc<dyn TranslatorOperator>,
    ) -> Result<()> {
        let mut state = self.lock();
        let record = state.record_mut(translator)?;
        if record.kind != HandleKind::Translator {
            return Err(Error::InvalidIdentifier(format!(
                "{} is not a translator",
                translator
            )));
        }
        record.translator_op = Some(operator);
        Ok(())
    }
}

impl std::fmt::Debug for LoopbackCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("LoopbackCore")
            .field("federates", &state.federates.len())
            .field("handles", &state.handles.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}
