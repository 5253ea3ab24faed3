//! Filter operations - Configurable message transformations
//!
//! A `FilterOperation` owns the configuration of a filter and hands the Core
//! an operator that reads it. Both share state, so properties changed after
//! the operator is installed apply to later messages.
//!
//! | Kind          | Properties                                           |
//! |---------------|------------------------------------------------------|
//! | `delay`       | `delay` (seconds)                                    |
//! | `random_drop` | `prob` / `dropprob` (0..=1)                          |
//! | `reroute`     | `target` (endpoint), `filter` (regex on destination) |
//! | `clone`       | `delivery`, `add delivery`, `remove delivery`        |

use crate::sync::{read, write};
use cosim_core::{Error, FilterOperator, Message, Result, Time};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Built-in filter kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterKind {
    /// Operator supplied by the application
    Custom,
    /// Shift delivery time
    Delay,
    /// Drop messages at random
    RandomDrop,
    /// Send messages elsewhere
    Reroute,
    /// Copy messages to extra destinations
    Clone,
}

impl FilterKind {
    /// Whether filters of this kind are registered as cloning filters
    pub fn is_cloning(&self) -> bool {
        matches!(self, FilterKind::Clone)
    }
}

impl FromStr for FilterKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != ' ')
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "custom" => Ok(FilterKind::Custom),
            "delay" => Ok(FilterKind::Delay),
            "randomdrop" | "drop" => Ok(FilterKind::RandomDrop),
            "reroute" | "redirect" => Ok(FilterKind::Reroute),
            "clone" | "cloning" => Ok(FilterKind::Clone),
            _ => Err(Error::InvalidParameter(format!("unknown filter kind '{}'", s))),
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilterKind::Custom => "custom",
            FilterKind::Delay => "delay",
            FilterKind::RandomDrop => "random_drop",
            FilterKind::Reroute => "reroute",
            FilterKind::Clone => "clone",
        };
        write!(f, "{}", s)
    }
}

/// Configuration side of a filter
pub trait FilterOperation: Send + Sync {
    /// Set a numeric property
    fn set(&self, property: &str, value: f64) -> Result<()>;

    /// Set a string property
    fn set_string(&self, property: &str, value: &str) -> Result<()>;

    /// Operator to install on the Core
    fn operator(&self) -> Arc<dyn FilterOperator>;
}

/// Build the operation for a built-in kind; `Custom` has none
pub fn make_filter_operation(kind: FilterKind) -> Option<Arc<dyn FilterOperation>> {
    match kind {
        FilterKind::Custom => None,
        FilterKind::Delay => Some(Arc::new(DelayFilterOperation::default())),
        FilterKind::RandomDrop => Some(Arc::new(RandomDropFilterOperation::default())),
        FilterKind::Reroute => Some(Arc::new(RerouteFilterOperation::default())),
        FilterKind::Clone => Some(Arc::new(CloneFilterOperation::default())),
    }
}

fn ignored(kind: &str, property: &str) -> Result<()> {
    debug!(%kind, %property, "filter property ignored");
    Ok(())
}

// ============================================================================
// Delay
// ============================================================================

/// Operator shifting messages by a shared delay
#[derive(Debug, Default)]
pub struct DelayOperator {
    delay: AtomicI64,
}

impl FilterOperator for DelayOperator {
    fn process(&self, mut message: Message) -> Option<Message> {
        message.time += Time::from_nanos(self.delay.load(Ordering::Relaxed));
        Some(message)
    }
}

/// Delays delivery of every message by a fixed amount
#[derive(Debug, Default)]
pub struct DelayFilterOperation {
    state: Arc<DelayOperator>,
}

impl DelayFilterOperation {
    /// Current delay
    pub fn delay(&self) -> Time {
        Time::from_nanos(self.state.delay.load(Ordering::Relaxed))
    }
}

impl FilterOperation for DelayFilterOperation {
    fn set(&self, property: &str, value: f64) -> Result<()> {
        if property != "delay" {
            return ignored("delay", property);
        }
        let delay = Time::from_secs(value);
        if delay.is_negative() {
            return Err(Error::InvalidParameter(format!(
                "delay must be non-negative, got {}",
                value
            )));
        }
        self.state.delay.store(delay.as_nanos(), Ordering::Relaxed);
        Ok(())
    }

    fn set_string(&self, property: &str, value: &str) -> Result<()> {
        let seconds: f64 = value
            .trim()
            .parse()
            .map_err(|_| Error::InvalidParameter(format!("'{}' is not a time", value)))?;
        self.set(property, seconds)
    }

    fn operator(&self) -> Arc<dyn FilterOperator> {
        self.state.clone()
    }
}

// ============================================================================
// Random drop
// ============================================================================

/// Operator dropping messages with a shared probability
#[derive(Debug, Default)]
pub struct RandomDropOperator {
    // f64 bits
    probability: AtomicU64,
}

impl RandomDropOperator {
    fn probability(&self) -> f64 {
        f64::from_bits(self.probability.load(Ordering::Relaxed))
    }
}

impl FilterOperator for RandomDropOperator {
    fn process(&self, message: Message) -> Option<Message> {
        let p = self.probability();
        if p > 0.0 && rand::rng().random::<f64>() < p {
            None
        } else {
            Some(message)
        }
    }
}

/// Drops each message with a fixed probability
#[derive(Debug, Default)]
pub struct RandomDropFilterOperation {
    state: Arc<RandomDropOperator>,
}

impl RandomDropFilterOperation {
    /// Current drop probability
    pub fn probability(&self) -> f64 {
        self.state.probability()
    }
}

impl FilterOperation for RandomDropFilterOperation {
    fn set(&self, property: &str, value: f64) -> Result<()> {
        if property != "prob" && property != "dropprob" {
            return ignored("random_drop", property);
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(Error::InvalidParameter(format!(
                "drop probability must lie in [0, 1], got {}",
                value
            )));
        }
        self.state
            .probability
            .store(value.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    fn set_string(&self, property: &str, value: &str) -> Result<()> {
        let p: f64 = value
            .trim()
            .parse()
            .map_err(|_| Error::InvalidParameter(format!("'{}' is not a probability", value)))?;
        self.set(property, p)
    }

    fn operator(&self) -> Arc<dyn FilterOperator> {
        self.state.clone()
    }
}

// ============================================================================
// Reroute
// ============================================================================

/// Operator sending matching messages to a new destination
#[derive(Debug, Default)]
pub struct RerouteOperator {
    target: RwLock<String>,
    conditions: RwLock<Vec<Regex>>,
}

impl FilterOperator for RerouteOperator {
    fn process(&self, mut message: Message) -> Option<Message> {
        let target = read(&self.target).clone();
        if target.is_empty() {
            return Some(message);
        }
        let conditions = read(&self.conditions);
        if conditions.is_empty() || conditions.iter().any(|re| re.is_match(&message.dest)) {
            message.dest = target;
        }
        Some(message)
    }
}

/// Redirects messages, optionally only those whose destination matches
#[derive(Debug, Default)]
pub struct RerouteFilterOperation {
    state: Arc<RerouteOperator>,
}

impl FilterOperation for RerouteFilterOperation {
    fn set(&self, property: &str, _value: f64) -> Result<()> {
        ignored("reroute", property)
    }

    fn set_string(&self, property: &str, value: &str) -> Result<()> {
        match property {
            "target" | "newdestination" => {
                *write(&self.state.target) = value.to_string();
                Ok(())
            }
            "filter" | "condition" => {
                let re = Regex::new(value).map_err(|e| {
                    Error::InvalidParameter(format!("invalid reroute filter '{}': {}", value, e))
                })?;
                write(&self.state.conditions).push(re);
                Ok(())
            }
            _ => ignored("reroute", property),
        }
    }

    fn operator(&self) -> Arc<dyn FilterOperator> {
        self.state.clone()
    }
}

// ============================================================================
// Clone
// ============================================================================

/// Operator producing one copy per delivery address
#[derive(Debug, Default)]
pub struct CloneOperator {
    deliveries: RwLock<Vec<String>>,
}

impl FilterOperator for CloneOperator {
    fn process(&self, message: Message) -> Option<Message> {
        Some(message)
    }

    fn process_vector(&self, message: Message) -> Vec<Message> {
        read(&self.deliveries)
            .iter()
            .map(|dest| {
                let mut copy = message.clone();
                copy.dest = dest.clone();
                copy
            })
            .collect()
    }
}

/// Copies messages to extra destinations
#[derive(Debug, Default)]
pub struct CloneFilterOperation {
    state: Arc<CloneOperator>,
}

impl CloneFilterOperation {
    /// Current delivery addresses
    pub fn deliveries(&self) -> Vec<String> {
        read(&self.state.deliveries).clone()
    }
}

impl FilterOperation for CloneFilterOperation {
    fn set(&self, property: &str, _value: f64) -> Result<()> {
        ignored("clone", property)
    }

    fn set_string(&self, property: &str, value: &str) -> Result<()> {
        let mut deliveries = write(&self.state.deliveries);
        match property {
            "delivery" => {
                deliveries.clear();
                deliveries.push(value.to_string());
            }
            "add delivery" => {
                if !deliveries.iter().any(|d| d == value) {
                    deliveries.push(value.to_string());
                }
            }
            "remove delivery" => deliveries.retain(|d| d != value),
            _ => return ignored("clone", property),
        }
        Ok(())
    }

    fn operator(&self) -> Arc<dyn FilterOperator> {
        self.state.clone()
    }
}
