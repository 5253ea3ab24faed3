//! Cosim Core - The contract between federates and their coordination engine
//!
//! This crate provides the types every federate shares with its Core:
//! - Simulated time and iteration control (`Time`, `IterationRequest`, `IterationResult`)
//! - Federate and interface identifiers (`FederateId`, `InterfaceHandle`, `QueryId`)
//! - Point-to-point `Message`s
//! - The `Core` trait a federate runtime drives
//! - Operator traits run by the Core on filters and translators
//!
//! ## Cores
//!
//! Two implementations ship with the crate:
//! - `EmptyCore` - Stateless stub used once a federate has disconnected
//! - `LoopbackCore` - In-process Core for federates sharing one process,
//!   with scripting hooks for tests
//!
//! Distributed Cores (brokers, network transports) implement the same trait
//! in their own crates.

mod core;
mod empty;
mod error;
mod identity;
pub mod loopback;
mod message;
mod operator;
pub mod time;

pub use crate::core::{Core, FlagOption, TimeProperty};
pub use empty::EmptyCore;
pub use error::{Error, Result};
pub use identity::{FederateId, InterfaceHandle, QueryId};
pub use loopback::LoopbackCore;
pub use message::Message;
pub use operator::{FilterOperator, FnFilterOperator, TranslatorOperator};
pub use time::{IterationRequest, IterationResult, IterationTime, Time};
