//! Cosim Federate - Runtime for one participant of a co-simulation
//!
//! A federate attaches to a [`Core`], walks through the co-simulation
//! lifecycle and exchanges data with the rest of the federation while
//! simulated time advances.
//!
//! ## Architecture
//!
//! ```text
//! Federate (state machine, owns the Core handle)
//!  │
//!  ├── AsyncCallCoordinator ← background tasks for *_async calls
//!  ├── ValueExchangeManager ← publications, inputs      (optional)
//!  ├── MessageExchangeManager ← endpoints, queues       (optional)
//!  └── ConnectorManager ← filters, translators
//! ```
//!
//! ## Key Components
//!
//! - [`Federate`]: Lifecycle state machine and time requests
//! - [`ValueFederate`] / [`MessageFederate`]: Capability views handed out
//!   by the federate when it carries the matching manager
//! - [`FederateInfo`]: Serializable federate configuration
//! - [`FilterKind`] / [`TranslatorKind`]: Built-in connector behaviors
//!
//! ## Lifecycle
//!
//! ```text
//! startup ──► initializing ──► executing ──► finalize
//!    │             │               │
//!    └─────────────┴───────────────┴──► error
//! ```
//!
//! Each transition has a blocking form and an `_async`/`_complete` pair;
//! at most one asynchronous operation is in flight per federate.
//!
//! # Example
//!
//! ```
//! use cosim_core::{IterationRequest, LoopbackCore, Time};
//! use cosim_federate::{Federate, FederateInfo};
//!
//! let core = LoopbackCore::shared();
//! let sender = Federate::new(core.clone(), FederateInfo::new("sender")).unwrap();
//! let receiver = Federate::new(core, FederateInfo::new("receiver")).unwrap();
//!
//! let out = sender.messages().unwrap().register_endpoint("out", "").unwrap();
//! let inbox = receiver.messages().unwrap().register_endpoint("inbox", "").unwrap();
//!
//! sender.enter_executing_mode(IterationRequest::NoIterations).unwrap();
//! receiver.enter_executing_mode(IterationRequest::NoIterations).unwrap();
//!
//! sender.messages().unwrap().send(out, "receiver/inbox", b"hello").unwrap();
//! receiver.request_time(Time::from_secs(1.0)).unwrap();
//!
//! let msg = receiver.messages().unwrap().get_message(inbox).unwrap();
//! assert_eq!(msg.data_as_string(), "hello");
//! ```

pub mod async_calls;
pub mod config;
pub mod connectors;
mod federate;
pub mod filter_ops;
mod identity;
mod message_federate;
pub mod messages;
mod state;
mod sync;
pub mod translator_ops;
mod value_federate;
pub mod values;

pub use async_calls::{AsyncCallCoordinator, Pending, INVALID_QUERY, QUERY_RETENTION};
pub use config::FederateInfo;
pub use connectors::{ConnectorManager, Filter, Translator};
pub use federate::{Capabilities, Federate, ModeCallback, TimeUpdateCallback};
pub use filter_ops::{FilterKind, FilterOperation};
pub use identity::{EndpointId, InputId, PublicationId};
pub use message_federate::MessageFederate;
pub use messages::{EndpointInfo, MessageCallback, MessageExchangeManager};
pub use state::FederateState;
pub use translator_ops::{TranslatorKind, TranslatorOperation};
pub use value_federate::ValueFederate;
pub use values::{InputInfo, PublicationInfo, ValueCallback, ValueExchangeManager};

pub use cosim_core::{
    Core, EmptyCore, Error, FederateId, FlagOption, InterfaceHandle, IterationRequest,
    IterationResult, IterationTime, Message, QueryId, Result, Time, TimeProperty,
};
