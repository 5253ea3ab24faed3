//! Federate - Lifecycle state machine and time advancement
//!
//! A `Federate` drives one [`Core`] through the co-simulation lifecycle and
//! owns the capability managers selected at construction. Every lifecycle
//! and time operation comes in a blocking form and an `_async`/`_complete`
//! pair:
//!
//! ```text
//! enter_initializing_mode()            enter_initializing_mode_async()
//!                                      is_async_operation_completed()
//!                                      enter_initializing_mode_complete()
//! ```
//!
//! An async call moves the federate into a pending state with a
//! compare-and-swap and spawns one background thread running the blocking
//! Core call. Post-conditions (state change, time update, callbacks) run on
//! the thread that calls `_complete`.
//!
//! ## Time updates
//!
//! Whenever time is granted the value and message managers pull fresh data
//! from the Core and fire their callbacks, then the time-update callback
//! runs. No federate lock is held while user callbacks execute.
//!
//! # Example
//!
//! ```
//! use cosim_core::{LoopbackCore, IterationRequest, Time};
//! use cosim_federate::{Federate, FederateInfo, FederateState};
//! use std::sync::Arc;
//!
//! let core = Arc::new(LoopbackCore::new());
//! let fed = Federate::new(core, FederateInfo::new("sim")).unwrap();
//! fed.enter_executing_mode(IterationRequest::NoIterations).unwrap();
//! assert_eq!(fed.request_time(Time::from_secs(1.0)).unwrap(), Time::from_secs(1.0));
//! fed.finalize().unwrap();
//! assert_eq!(fed.state(), FederateState::Finalize);
//! ```

use crate::async_calls::{AsyncCallCoordinator, ExecAttempt, Pending, Slot};
use crate::config::FederateInfo;
use crate::connectors::{ConnectorManager, Filter, Translator};
use crate::filter_ops::FilterKind;
use crate::messages::MessageExchangeManager;
use crate::state::{AtomicState, FederateState};
use crate::sync::{lock, read, write};
use crate::translator_ops::TranslatorKind;
use crate::values::ValueExchangeManager;
use crate::{MessageFederate, ValueFederate};
use cosim_core::{
    Core, EmptyCore, Error, FederateId, FilterOperator, FlagOption, IterationRequest,
    IterationResult, IterationTime, QueryId, Result, Time, TimeProperty, TranslatorOperator,
};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Callback fired on every state change with `(new, old)`
pub type ModeCallback = Arc<dyn Fn(FederateState, FederateState) + Send + Sync>;

/// Callback fired after each time update with `(new_time, iterating)`
pub type TimeUpdateCallback = Arc<dyn Fn(Time, bool) + Send + Sync>;

/// Log level used for records forwarded by [`Federate::error`]
const ERROR_LEVEL: i32 = 0;

/// Which data managers a federate carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Publications and inputs
    pub values: bool,
    /// Endpoints
    pub messages: bool,
}

impl Capabilities {
    /// Values only
    pub const VALUE: Capabilities = Capabilities {
        values: true,
        messages: false,
    };
    /// Messages only
    pub const MESSAGE: Capabilities = Capabilities {
        values: false,
        messages: true,
    };
    /// Values and messages
    pub const COMBINED: Capabilities = Capabilities {
        values: true,
        messages: true,
    };
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::COMBINED
    }
}

/// One participant in a co-simulation
pub struct Federate {
    name: String,
    id: FederateId,
    separator: char,
    log_level: i32,
    core: RwLock<Arc<dyn Core>>,
    attached: AtomicBool,
    core_finalized: AtomicBool,
    state: AtomicState,
    current_time: AtomicI64,
    async_calls: AsyncCallCoordinator,
    values: Option<ValueExchangeManager>,
    messages: Option<MessageExchangeManager>,
    connectors: ConnectorManager,
    mode_callback: Mutex<Option<ModeCallback>>,
    time_callback: Mutex<Option<TimeUpdateCallback>>,
}

impl Federate {
    /// Register a federate with values and messages
    pub fn new(core: Arc<dyn Core>, info: FederateInfo) -> Result<Self> {
        Self::with_capabilities(core, info, Capabilities::COMBINED)
    }

    /// Register a federate carrying only the selected managers
    pub fn with_capabilities(
        core: Arc<dyn Core>,
        info: FederateInfo,
        capabilities: Capabilities,
    ) -> Result<Self> {
        info.validate()?;
        let id = core.register_federate(&info.name)?;
        for (property, value) in info.time_properties() {
            if value != Time::ZERO {
                core.set_time_property(id, property, value)?;
            }
        }
        for (flag, value) in info.flags() {
            if value {
                core.set_flag_option(id, flag, true)?;
            }
        }
        info!(federate = %info.name, %id, ?capabilities, "federate registered");

        Ok(Self {
            name: info.name,
            id,
            separator: info.separator,
            log_level: info.log_level,
            core: RwLock::new(core),
            attached: AtomicBool::new(true),
            core_finalized: AtomicBool::new(false),
            state: AtomicState::new(FederateState::Startup),
            current_time: AtomicI64::new(Time::ZERO.as_nanos()),
            async_calls: AsyncCallCoordinator::new(),
            values: capabilities.values.then(|| ValueExchangeManager::new(id)),
            messages: capabilities.messages.then(|| MessageExchangeManager::new(id)),
            connectors: ConnectorManager::new(),
            mode_callback: Mutex::new(None),
            time_callback: Mutex::new(None),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Federate name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id assigned by the Core
    pub fn id(&self) -> FederateId {
        self.id
    }

    /// Separator between the federate name and local interface keys
    pub fn separator(&self) -> char {
        self.separator
    }

    /// Current lifecycle state
    pub fn state(&self) -> FederateState {
        self.state.load()
    }

    /// Last granted time
    pub fn current_time(&self) -> Time {
        Time::from_nanos(self.current_time.load(Ordering::Acquire))
    }

    /// Whether the federate is still attached to its Core
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// The Core calls are routed to; an [`EmptyCore`] once disconnected
    pub fn core(&self) -> Arc<dyn Core> {
        Arc::clone(&read(&self.core))
    }

    /// Value interfaces, if the federate carries them
    pub fn values(&self) -> Result<ValueFederate<'_>> {
        self.values
            .as_ref()
            .map(|values| ValueFederate::new(self, values))
            .ok_or_else(|| {
                Error::InvalidFunctionCall(format!("federate '{}' has no value interfaces", self.name))
            })
    }

    /// Message interfaces, if the federate carries them
    pub fn messages(&self) -> Result<MessageFederate<'_>> {
        self.messages
            .as_ref()
            .map(|messages| MessageFederate::new(self, messages))
            .ok_or_else(|| {
                Error::InvalidFunctionCall(format!(
                    "federate '{}' has no message interfaces",
                    self.name
                ))
            })
    }

    /// Full name of a local interface key
    pub fn local_name(&self, key: &str) -> String {
        if key.is_empty() {
            String::new()
        } else {
            format!("{}{}{}", self.name, self.separator, key)
        }
    }

    pub(crate) fn ensure_startup(&self, operation: &str) -> Result<()> {
        match self.state() {
            FederateState::Startup => Ok(()),
            state => Err(Error::InvalidFunctionCall(format!(
                "{} is only allowed in startup, federate is {}",
                operation, state
            ))),
        }
    }

    // ========================================================================
    // State bookkeeping
    // ========================================================================

    fn set_state(&self, new: FederateState) {
        let old = self.state.swap(new);
        self.notify_mode(new, old);
    }

    /// Move from `from` into a pending state and store its background task
    ///
    /// The slot stays locked across the transition and the spawn, so a
    /// `_complete` racing on another thread blocks until the task is stored.
    /// A failed spawn restores `from` without announcing the pending state.
    fn start_pending<T, F>(
        &self,
        slot: &Slot<T>,
        from: FederateState,
        to: FederateState,
        name: &str,
        task: F,
    ) -> Result<()>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        {
            let mut pending = slot.guard();
            self.state.transition(from, to).map_err(|actual| {
                Error::InvalidFunctionCall(format!(
                    "cannot move from {} to {}, federate is {}",
                    from, to, actual
                ))
            })?;
            match Pending::spawn(name, task) {
                Ok(task) => *pending = Some(task),
                Err(e) => {
                    self.state.swap(from);
                    return Err(e);
                }
            }
        }
        self.notify_mode(to, from);
        Ok(())
    }

    fn notify_mode(&self, new: FederateState, old: FederateState) {
        if new == old {
            return;
        }
        debug!(federate = %self.name, %old, %new, "state change");
        let callback = lock(&self.mode_callback).clone();
        if let Some(callback) = callback {
            callback(new, old);
        }
    }

    fn set_time(&self, time: Time) {
        self.current_time.store(time.as_nanos(), Ordering::Release);
    }

    /// Force the error state for failures that leave the federate unusable
    fn fail_on_fatal(&self, err: Error) -> Error {
        if err.is_fatal() {
            warn!(federate = %self.name, error = %err, "core failure, federate enters error state");
            self.set_state(FederateState::Error);
        }
        err
    }

    fn initialize_hook(&self) {
        let core = self.core();
        self.set_time(core.current_time(self.id));
        if let Some(values) = &self.values {
            values.startup_to_initialize(&*core);
        }
        if let Some(messages) = &self.messages {
            messages.startup_to_initialize();
        }
    }

    fn update_hook(&self, new_time: Time, old_time: Time, iterating: bool) {
        let core = self.core();
        if let Some(values) = &self.values {
            values.update_time(&*core, new_time, old_time);
        }
        if let Some(messages) = &self.messages {
            messages.update_time(&*core, new_time, old_time);
        }
        let callback = lock(&self.time_callback).clone();
        if let Some(callback) = callback {
            callback(new_time, iterating);
        }
    }

    /// Apply an iteration result returned when entering executing mode
    fn apply_exec_result(&self, result: IterationResult) {
        match result {
            IterationResult::NextStep => {
                let old = self.current_time();
                self.set_time(Time::ZERO);
                self.set_state(FederateState::Executing);
                info!(federate = %self.name, "entered executing mode");
                self.update_hook(Time::ZERO, old, false);
            }
            IterationResult::Iterating => {
                self.set_state(FederateState::Initializing);
                let now = self.current_time();
                self.update_hook(now, now, true);
            }
            IterationResult::Error => self.set_state(FederateState::Error),
            IterationResult::Halted => {
                info!(federate = %self.name, "federation halted");
                self.set_state(FederateState::Finalize);
            }
        }
    }

    /// Apply a granted time
    fn apply_grant(&self, granted: Time, old: Time, iterating: bool) -> Time {
        let granted = if granted < old {
            warn!(federate = %self.name, %granted, current = %old, "granted time before current time");
            old
        } else {
            granted
        };
        self.set_time(granted);
        self.update_hook(granted, old, iterating);
        granted
    }

    /// Apply the outcome of an iterative time request
    fn apply_iterative(&self, result: IterationTime, old: Time) -> IterationTime {
        match result.state {
            IterationResult::NextStep => {
                let granted = self.apply_grant(result.granted_time, old, false);
                IterationTime::new(granted, result.state)
            }
            IterationResult::Iterating => {
                let granted = self.apply_grant(result.granted_time, old, true);
                IterationTime::new(granted, result.state)
            }
            IterationResult::Halted => {
                let granted = self.apply_grant(result.granted_time, old, false);
                info!(federate = %self.name, "federation halted");
                self.set_state(FederateState::Finalize);
                IterationTime::new(granted, result.state)
            }
            IterationResult::Error => {
                self.set_state(FederateState::Error);
                result
            }
        }
    }

    // ========================================================================
    // Initializing mode
    // ========================================================================

    /// Enter initializing mode
    ///
    /// A no-op when already initializing; completes a pending async entry.
    pub fn enter_initializing_mode(&self) -> Result<()> {
        match self.state() {
            FederateState::Startup => {
                let core = self.core();
                core.enter_initializing_mode(self.id)?;
                self.set_state(FederateState::Initializing);
                self.initialize_hook();
                Ok(())
            }
            FederateState::PendingInit => self.enter_initializing_mode_complete(),
            FederateState::Initializing => Ok(()),
            state => Err(Error::InvalidFunctionCall(format!(
                "cannot enter initializing mode from {}",
                state
            ))),
        }
    }

    /// Start entering initializing mode in the background
    pub fn enter_initializing_mode_async(&self) -> Result<()> {
        match self.state() {
            FederateState::Startup => {
                let (core, id) = (self.core(), self.id);
                self.start_pending(
                    &self.async_calls.init,
                    FederateState::Startup,
                    FederateState::PendingInit,
                    "enter-init",
                    move || core.enter_initializing_mode(id),
                )
            }
            FederateState::PendingInit | FederateState::Initializing => Ok(()),
            state => Err(Error::InvalidFunctionCall(format!(
                "cannot enter initializing mode from {}",
                state
            ))),
        }
    }

    /// Finish an asynchronous entry into initializing mode
    pub fn enter_initializing_mode_complete(&self) -> Result<()> {
        match self.state() {
            FederateState::PendingInit => {
                let result = match self.async_calls.init.take() {
                    Some(pending) => pending.join().and_then(|r| r),
                    None => Err(Error::AsyncTaskLost("no pending init".to_string())),
                };
                match result {
                    Ok(()) => {
                        self.set_state(FederateState::Initializing);
                        self.initialize_hook();
                        Ok(())
                    }
                    Err(e) => {
                        self.set_state(FederateState::Startup);
                        Err(e)
                    }
                }
            }
            FederateState::Initializing => Ok(()),
            state => Err(Error::InvalidFunctionCall(format!(
                "no asynchronous initialization to complete, federate is {}",
                state
            ))),
        }
    }

    // ========================================================================
    // Executing mode
    // ========================================================================

    /// Enter executing mode
    ///
    /// From startup this enters initializing mode first. The returned
    /// iteration result decides the next state.
    pub fn enter_executing_mode(&self, iterate: IterationRequest) -> Result<IterationResult> {
        match self.state() {
            FederateState::Startup | FederateState::PendingInit => {
                self.enter_initializing_mode()?;
                self.exec_from_initializing(iterate)
            }
            FederateState::Initializing => self.exec_from_initializing(iterate),
            FederateState::PendingExec => self.enter_executing_mode_complete(),
            FederateState::Executing => Ok(IterationResult::NextStep),
            state => Err(Error::InvalidFunctionCall(format!(
                "cannot enter executing mode from {}",
                state
            ))),
        }
    }

    fn exec_from_initializing(&self, iterate: IterationRequest) -> Result<IterationResult> {
        let core = self.core();
        let result = core
            .enter_executing_mode(self.id, iterate)
            .map_err(|e| self.fail_on_fatal(e))?;
        self.apply_exec_result(result);
        Ok(result)
    }

    /// Start entering executing mode in the background
    pub fn enter_executing_mode_async(&self, iterate: IterationRequest) -> Result<()> {
        let (core, id) = (self.core(), self.id);
        let from = match self.state() {
            FederateState::Startup => FederateState::Startup,
            FederateState::PendingInit | FederateState::Initializing => {
                self.enter_initializing_mode_complete()?;
                FederateState::Initializing
            }
            FederateState::PendingExec => return Ok(()),
            state => {
                return Err(Error::InvalidFunctionCall(format!(
                    "cannot enter executing mode from {}",
                    state
                )))
            }
        };
        let from_startup = from == FederateState::Startup;
        let task = move || {
            if from_startup {
                if let Err(e) = core.enter_initializing_mode(id) {
                    return ExecAttempt {
                        from_startup,
                        initialized: false,
                        result: Err(e),
                    };
                }
            }
            ExecAttempt {
                from_startup,
                initialized: from_startup,
                result: core.enter_executing_mode(id, iterate),
            }
        };
        self.start_pending(
            &self.async_calls.exec,
            from,
            FederateState::PendingExec,
            "enter-exec",
            task,
        )
    }

    /// Finish an asynchronous entry into executing mode
    ///
    /// Without one in flight this behaves as [`Federate::enter_executing_mode`].
    pub fn enter_executing_mode_complete(&self) -> Result<IterationResult> {
        if self.state() != FederateState::PendingExec {
            return self.enter_executing_mode(IterationRequest::NoIterations);
        }
        let attempt = match self.async_calls.exec.take() {
            Some(pending) => pending.join(),
            None => Err(Error::AsyncTaskLost("no pending exec".to_string())),
        };
        let attempt = match attempt {
            Ok(attempt) => attempt,
            Err(e) => {
                self.set_state(FederateState::Error);
                return Err(e);
            }
        };

        if attempt.initialized {
            self.set_state(FederateState::Initializing);
            self.initialize_hook();
        }
        match attempt.result {
            Ok(result) => {
                self.apply_exec_result(result);
                Ok(result)
            }
            Err(e) => {
                if attempt.from_startup && !attempt.initialized {
                    self.set_state(FederateState::Startup);
                } else {
                    self.set_state(FederateState::Initializing);
                }
                Err(self.fail_on_fatal(e))
            }
        }
    }

    // ========================================================================
    // Time requests
    // ========================================================================

    fn ensure_executing(&self, operation: &str) -> Result<()> {
        match self.state() {
            FederateState::Executing => Ok(()),
            state => Err(Error::InvalidFunctionCall(format!(
                "{} is only allowed in executing mode, federate is {}",
                operation, state
            ))),
        }
    }

    /// Request the next time and block until it is granted
    pub fn request_time(&self, next: Time) -> Result<Time> {
        self.ensure_executing("request_time")?;
        let old = self.current_time();
        let granted = self
            .core()
            .time_request(self.id, next)
            .map_err(|e| self.fail_on_fatal(e))?;
        Ok(self.apply_grant(granted, old, false))
    }

    /// Request the next time with iteration control
    pub fn request_time_iterative(&self, next: Time, iterate: IterationRequest) -> Result<IterationTime> {
        self.ensure_executing("request_time_iterative")?;
        let old = self.current_time();
        let result = self
            .core()
            .request_time_iterative(self.id, next, iterate)
            .map_err(|e| self.fail_on_fatal(e))?;
        Ok(self.apply_iterative(result, old))
    }

    /// Request a time step relative to the current time
    pub fn request_time_advance(&self, delta: Time) -> Result<Time> {
        self.request_time(self.current_time() + delta)
    }

    /// Request the next time in the background
    pub fn request_time_async(&self, next: Time) -> Result<()> {
        let (core, id) = (self.core(), self.id);
        self.start_pending(
            &self.async_calls.time,
            FederateState::Executing,
            FederateState::PendingTime,
            "time-request",
            move || core.time_request(id, next),
        )
    }

    /// Finish an asynchronous time request
    pub fn request_time_complete(&self) -> Result<Time> {
        if self.state() != FederateState::PendingTime {
            return Err(Error::InvalidFunctionCall(format!(
                "no asynchronous time request to complete, federate is {}",
                self.state()
            )));
        }
        let result = match self.async_calls.time.take() {
            Some(pending) => pending.join().and_then(|r| r),
            None => Err(Error::AsyncTaskLost("no pending time request".to_string())),
        };
        self.set_state(FederateState::Executing);
        let old = self.current_time();
        let granted = result.map_err(|e| self.fail_on_fatal(e))?;
        Ok(self.apply_grant(granted, old, false))
    }

    /// Request the next time with iteration control in the background
    pub fn request_time_iterative_async(&self, next: Time, iterate: IterationRequest) -> Result<()> {
        let (core, id) = (self.core(), self.id);
        self.start_pending(
            &self.async_calls.iterative,
            FederateState::Executing,
            FederateState::PendingIterativeTime,
            "iterative-time-request",
            move || core.request_time_iterative(id, next, iterate),
        )
    }

    /// Finish an asynchronous iterative time request
    pub fn request_time_iterative_complete(&self) -> Result<IterationTime> {
        if self.state() != FederateState::PendingIterativeTime {
            return Err(Error::InvalidFunctionCall(format!(
                "no asynchronous iterative time request to complete, federate is {}",
                self.state()
            )));
        }
        let result = match self.async_calls.iterative.take() {
            Some(pending) => pending.join().and_then(|r| r),
            None => Err(Error::AsyncTaskLost("no pending time request".to_string())),
        };
        self.set_state(FederateState::Executing);
        let old = self.current_time();
        let result = result.map_err(|e| self.fail_on_fatal(e))?;
        Ok(self.apply_iterative(result, old))
    }

    /// Non-blocking check whether the pending async operation finished
    ///
    /// False when nothing is pending.
    pub fn is_async_operation_completed(&self) -> bool {
        match self.state() {
            FederateState::PendingInit => self.async_calls.init.is_ready(),
            FederateState::PendingExec => self.async_calls.exec.is_ready(),
            FederateState::PendingTime => self.async_calls.time.is_ready(),
            FederateState::PendingIterativeTime => self.async_calls.iterative.is_ready(),
            FederateState::PendingFinalize => self.async_calls.finalize.is_ready(),
            _ => false,
        }
    }

    // ========================================================================
    // Finalize, disconnect, error
    // ========================================================================

    /// Join whatever async operation is in flight, discarding its outcome
    fn complete_pending(&self) {
        let outcome = match self.state() {
            FederateState::PendingInit => self.enter_initializing_mode_complete().map(|_| ()),
            FederateState::PendingExec => self.enter_executing_mode_complete().map(|_| ()),
            FederateState::PendingTime => self.request_time_complete().map(|_| ()),
            FederateState::PendingIterativeTime => {
                self.request_time_iterative_complete().map(|_| ())
            }
            _ => Ok(()),
        };
        if let Err(e) = outcome {
            debug!(federate = %self.name, error = %e, "pending operation failed during finalize");
        }
    }

    /// Leave the federation
    ///
    /// Idempotent: a federate already finalized or in error returns at once.
    pub fn finalize(&self) -> Result<()> {
        match self.state() {
            FederateState::Finalize | FederateState::Error => return Ok(()),
            FederateState::PendingFinalize => return self.finalize_complete(),
            _ => self.complete_pending(),
        }
        self.core().finalize(self.id)?;
        self.core_finalized.store(true, Ordering::Release);
        self.set_state(FederateState::Finalize);
        info!(federate = %self.name, time = %self.current_time(), "finalized");
        Ok(())
    }

    /// Start leaving the federation in the background
    pub fn finalize_async(&self) -> Result<()> {
        match self.state() {
            FederateState::Finalize | FederateState::Error | FederateState::PendingFinalize => {
                return Ok(())
            }
            state if state.is_pending() => self.complete_pending(),
            _ => {}
        }
        let from = self.state();
        if from.is_terminal() {
            return Ok(());
        }
        let (core, id) = (self.core(), self.id);
        self.start_pending(
            &self.async_calls.finalize,
            from,
            FederateState::PendingFinalize,
            "finalize",
            move || core.finalize(id),
        )
    }

    /// Finish an asynchronous finalize
    ///
    /// Without one in flight this behaves as [`Federate::finalize`].
    pub fn finalize_complete(&self) -> Result<()> {
        if self.state() != FederateState::PendingFinalize {
            return self.finalize();
        }
        let result = match self.async_calls.finalize.take() {
            Some(pending) => pending.join().and_then(|r| r),
            None => Err(Error::AsyncTaskLost("no pending finalize".to_string())),
        };
        if result.is_ok() {
            self.core_finalized.store(true, Ordering::Release);
        }
        self.set_state(FederateState::Finalize);
        info!(federate = %self.name, "finalized");
        result
    }

    /// Detach from the Core unconditionally
    ///
    /// Tells the Core to finalize if still attached, even from the error
    /// state or after a halt the Core was never told about. Closes every
    /// connector and routes all later calls to an [`EmptyCore`]. An error
    /// state is preserved. Never fails and may be called repeatedly.
    pub fn disconnect(&self) {
        if let Err(e) = self.finalize() {
            warn!(federate = %self.name, error = %e, "finalize failed during disconnect");
        }
        let core = self.core();
        if self.is_attached() && !self.core_finalized.swap(true, Ordering::AcqRel) {
            if let Err(e) = core.finalize(self.id) {
                warn!(federate = %self.name, error = %e, "core finalize failed during disconnect");
            }
        }
        self.connectors.disconnect_all(&*core);
        *write(&self.core) = EmptyCore::shared();
        if self.attached.swap(false, Ordering::AcqRel) {
            info!(federate = %self.name, "disconnected");
        }
        if self.state() != FederateState::Error {
            self.set_state(FederateState::Finalize);
        }
    }

    /// Report a fatal error of the federate
    ///
    /// Moves to the error state and forwards a log record to the Core.
    pub fn error(&self, code: i32, message: &str) {
        error!(federate = %self.name, code, reason = %message, "federate error");
        self.set_state(FederateState::Error);
        self.core()
            .log_message(self.id, ERROR_LEVEL, &format!("error {}: {}", code, message));
    }

    /// Forward a log record to the Core
    ///
    /// Records above the configured log level are dropped.
    pub fn log_message(&self, level: i32, message: &str) {
        if level > self.log_level {
            return;
        }
        debug!(federate = %self.name, level, record = %message, "log");
        self.core().log_message(self.id, level, message);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Query this federate
    ///
    /// `"name"` is answered locally; everything else goes to the Core.
    pub fn query(&self, query: &str) -> String {
        match query {
            "name" => self.name.clone(),
            _ => self.core().query(&self.name, query),
        }
    }

    /// Query any member of the federation
    pub fn query_target(&self, target: &str, query: &str) -> String {
        if target.is_empty() || target == "federate" || target == self.name {
            return self.query(query);
        }
        self.core().query(target, query)
    }

    /// Start a query in the background
    pub fn query_async(&self, target: &str, query: &str) -> Result<QueryId> {
        let target = if target.is_empty() || target == "federate" {
            self.name.as_str()
        } else {
            target
        };
        self.async_calls.query_async(self.core(), target, query)
    }

    /// Block on a background query; unknown ids answer `"#invalid"`
    pub fn query_complete(&self, id: QueryId) -> String {
        self.async_calls.query_complete(id)
    }

    /// Non-blocking check for a background query
    pub fn is_query_completed(&self, id: QueryId) -> bool {
        self.async_calls.is_query_completed(id)
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// Set a time property; negative values are rejected
    pub fn set_time_property(&self, property: TimeProperty, value: Time) -> Result<()> {
        if value.is_negative() {
            return Err(Error::InvalidParameter(format!(
                "{:?} must be non-negative, got {}",
                property, value
            )));
        }
        self.core().set_time_property(self.id, property, value)
    }

    /// Get a time property
    pub fn time_property(&self, property: TimeProperty) -> Time {
        self.core().time_property(self.id, property)
    }

    /// Set a federate flag option
    pub fn set_flag_option(&self, flag: FlagOption, value: bool) -> Result<()> {
        self.core().set_flag_option(self.id, flag, value)
    }

    /// Get a federate flag option
    pub fn flag_option(&self, flag: FlagOption) -> bool {
        self.core().flag_option(self.id, flag)
    }

    // ========================================================================
    // Callbacks
    // ========================================================================

    /// Callback fired on every state change
    pub fn set_mode_update_callback(&self, callback: ModeCallback) {
        *lock(&self.mode_callback) = Some(callback);
    }

    /// Callback fired after each time update
    pub fn set_time_update_callback(&self, callback: TimeUpdateCallback) {
        *lock(&self.time_callback) = Some(callback);
    }

    // ========================================================================
    // Connectors
    // ========================================================================

    /// Register a filter of a given kind
    pub fn register_filter(&self, kind: FilterKind, name: &str) -> Result<Filter> {
        self.ensure_startup("register_filter")?;
        self.connectors
            .register_filter(&*self.core(), kind, name, "", "")
    }

    /// Register a filter with explicit input and output types
    pub fn register_typed_filter(
        &self,
        kind: FilterKind,
        name: &str,
        type_in: &str,
        type_out: &str,
    ) -> Result<Filter> {
        self.ensure_startup("register_filter")?;
        self.connectors
            .register_filter(&*self.core(), kind, name, type_in, type_out)
    }

    /// Register a cloning filter whose operator the application supplies
    pub fn register_cloning_filter(&self, name: &str) -> Result<Filter> {
        self.ensure_startup("register_cloning_filter")?;
        self.connectors
            .register_cloning_filter(&*self.core(), name, "", "")
    }

    /// Register a translator
    pub fn register_translator(
        &self,
        kind: TranslatorKind,
        name: &str,
        endpoint_type: &str,
        units: &str,
    ) -> Result<Translator> {
        self.ensure_startup("register_translator")?;
        self.connectors
            .register_translator(&*self.core(), kind, name, endpoint_type, units)
    }

    /// Filter by name
    pub fn filter(&self, name: &str) -> Option<Filter> {
        self.connectors.filter(name)
    }

    /// Filter by registration index
    pub fn filter_at(&self, index: usize) -> Option<Filter> {
        self.connectors.filter_at(index)
    }

    /// Number of filters, closed ones included
    pub fn filter_count(&self) -> usize {
        self.connectors.filter_count()
    }

    /// Translator by name
    pub fn translator(&self, name: &str) -> Option<Translator> {
        self.connectors.translator(name)
    }

    /// Translator by registration index
    pub fn translator_at(&self, index: usize) -> Option<Translator> {
        self.connectors.translator_at(index)
    }

    /// Number of translators, closed ones included
    pub fn translator_count(&self) -> usize {
        self.connectors.translator_count()
    }

    /// Attach a connector to messages or values leaving `target`
    pub fn add_connector_source_target(&self, name: &str, target: &str) -> Result<()> {
        self.connectors
            .add_source_target(&*self.core(), name, target)
    }

    /// Attach a connector to messages or values addressed to `target`
    pub fn add_connector_destination_target(&self, name: &str, target: &str) -> Result<()> {
        self.connectors
            .add_destination_target(&*self.core(), name, target)
    }

    /// Install a custom filter operator
    pub fn set_filter_operator(&self, name: &str, operator: Arc<dyn FilterOperator>) -> Result<()> {
        self.connectors
            .set_filter_operator(&*self.core(), name, operator)
    }

    /// Install a custom translator operator
    pub fn set_translator_operator(
        &self,
        name: &str,
        operator: Arc<dyn TranslatorOperator>,
    ) -> Result<()> {
        self.connectors
            .set_translator_operator(&*self.core(), name, operator)
    }

    /// Set a numeric property of a built-in connector
    pub fn set_connector_property(&self, name: &str, property: &str, value: f64) -> Result<()> {
        self.connectors.set_property(name, property, value)
    }

    /// Set a string property of a built-in connector
    pub fn set_connector_string(&self, name: &str, property: &str, value: &str) -> Result<()> {
        self.connectors.set_string_property(name, property, value)
    }

    /// Close every connector; records are kept
    pub fn close_all_connectors(&self) {
        self.connectors.close_all(&*self.core());
    }

    /// Detach every connector from the Core; records are kept
    pub fn disconnect_all_connectors(&self) {
        self.connectors.disconnect_all(&*self.core());
    }
}

impl Drop for Federate {
    fn drop(&mut self) {
        if self.is_attached() && !self.state().is_terminal() {
            if let Err(e) = self.finalize() {
                warn!(federate = %self.name, error = %e, "finalize on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for Federate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Federate")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("state", &self.state())
            .field("current_time", &self.current_time())
            .field("values", &self.values)
            .field("messages", &self.messages)
            .field("connectors", &self.connectors)
            .finish()
    }
}
