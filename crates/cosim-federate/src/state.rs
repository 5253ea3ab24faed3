//! Federate lifecycle states
//!
//! ```text
//! Startup ──► Initializing ──► Executing ──► Finalize
//!    │             ▲  │            │
//!    │   iterating └──┘            └──► Error
//!    ▼
//! PendingInit / PendingExec / PendingTime / PendingIterativeTime / PendingFinalize
//! ```
//!
//! The pending states mark an asynchronous operation in flight. The state is
//! stored in an [`AtomicState`]; starting an async operation is a
//! compare-and-swap into the matching pending state, which is what keeps at
//! most one operation outstanding per federate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a federate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FederateState {
    /// Registering interfaces
    Startup = 0,
    /// Exchanging initial values, time not yet running
    Initializing = 1,
    /// Time is advancing
    Executing = 2,
    /// Left the federation normally
    Finalize = 3,
    /// Left the federation because of a failure
    Error = 4,
    /// Asynchronous entry into initializing mode in flight
    PendingInit = 5,
    /// Asynchronous entry into executing mode in flight
    PendingExec = 6,
    /// Asynchronous time request in flight
    PendingTime = 7,
    /// Asynchronous iterative time request in flight
    PendingIterativeTime = 8,
    /// Asynchronous finalize in flight
    PendingFinalize = 9,
}

impl FederateState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => FederateState::Startup,
            1 => FederateState::Initializing,
            2 => FederateState::Executing,
            3 => FederateState::Finalize,
            5 => FederateState::PendingInit,
            6 => FederateState::PendingExec,
            7 => FederateState::PendingTime,
            8 => FederateState::PendingIterativeTime,
            9 => FederateState::PendingFinalize,
            _ => FederateState::Error,
        }
    }

    /// Whether an asynchronous operation is in flight
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            FederateState::PendingInit
                | FederateState::PendingExec
                | FederateState::PendingTime
                | FederateState::PendingIterativeTime
                | FederateState::PendingFinalize
        )
    }

    /// Whether the federate has left the federation
    pub fn is_terminal(&self) -> bool {
        matches!(self, FederateState::Finalize | FederateState::Error)
    }
}

impl fmt::Display for FederateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FederateState::Startup => "startup",
            FederateState::Initializing => "initializing",
            FederateState::Executing => "executing",
            FederateState::Finalize => "finalize",
            FederateState::Error => "error",
            FederateState::PendingInit => "pending_init",
            FederateState::PendingExec => "pending_exec",
            FederateState::PendingTime => "pending_time",
            FederateState::PendingIterativeTime => "pending_iterative_time",
            FederateState::PendingFinalize => "pending_finalize",
        };
        write!(f, "{}", s)
    }
}

/// Atomically updated federate state
#[derive(Debug)]
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) fn new(state: FederateState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> FederateState {
        FederateState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Store a new state and return the previous one
    pub(crate) fn swap(&self, state: FederateState) -> FederateState {
        FederateState::from_u8(self.0.swap(state as u8, Ordering::AcqRel))
    }

    /// Move from `current` to `new`; on failure returns the actual state
    pub(crate) fn transition(
        &self,
        current: FederateState,
        new: FederateState,
    ) -> Result<(), FederateState> {
        self.0
            .compare_exchange(
                current as u8,
                new as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(FederateState::from_u8)
    }
}
