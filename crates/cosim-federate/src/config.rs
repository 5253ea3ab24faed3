//! Federate Configuration - Identity, timing and flag options
//!
//! `FederateInfo` carries everything a federate hands to its Core right
//! after registration. It derives serde traits so callers can load it from
//! whatever format they use; file loading itself is left to the caller.

use cosim_core::{Error, FlagOption, Result, Time, TimeProperty};
use serde::{Deserialize, Serialize};

/// Separators accepted between a federate name and a local interface key
pub const VALID_SEPARATORS: [char; 5] = ['/', '.', ':', '_', '-'];

/// Configuration for a federate
///
/// # Example
///
/// ```
/// use cosim_federate::FederateInfo;
/// use cosim_core::Time;
///
/// let info = FederateInfo::new("controller").with_period(Time::from_secs(1.0));
/// assert_eq!(info.separator, '/');
/// assert!(info.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederateInfo {
    /// Federate name, unique within the federation
    pub name: String,
    /// Separator between the federate name and local interface keys
    pub separator: char,
    /// Minimum step between granted times
    pub time_delta: Time,
    /// Granted times are multiples of this period
    pub period: Time,
    /// Offset applied to the period
    pub offset: Time,
    /// Delay before received values become visible
    pub input_delay: Time,
    /// Delay before published values leave the federate
    pub output_delay: Time,
    /// The federate only observes
    pub observer: bool,
    /// Time requests may not be interrupted by earlier events
    pub uninterruptible: bool,
    /// Grant only once the requested time can be fully honored
    pub wait_for_current_time_update: bool,
    /// Allow grants earlier than requested
    pub source_only: bool,
    /// Level forwarded with log records
    pub log_level: i32,
}

impl Default for FederateInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            separator: '/',
            time_delta: Time::ZERO,
            period: Time::ZERO,
            offset: Time::ZERO,
            input_delay: Time::ZERO,
            output_delay: Time::ZERO,
            observer: false,
            uninterruptible: false,
            wait_for_current_time_update: false,
            source_only: false,
            log_level: 1,
        }
    }
}

impl FederateInfo {
    /// Create a configuration with default settings for a named federate
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the name separator
    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Set the minimum time step
    pub fn with_time_delta(mut self, delta: Time) -> Self {
        self.time_delta = delta;
        self
    }

    /// Set the period
    pub fn with_period(mut self, period: Time) -> Self {
        self.period = period;
        self
    }

    /// Set a flag option
    pub fn with_flag(mut self, flag: FlagOption, value: bool) -> Self {
        match flag {
            FlagOption::Observer => self.observer = value,
            FlagOption::Uninterruptible => self.uninterruptible = value,
            FlagOption::WaitForCurrentTimeUpdate => self.wait_for_current_time_update = value,
            FlagOption::SourceOnly => self.source_only = value,
            // interface-level options have no federate-wide default
            FlagOption::Required
            | FlagOption::OnlyTransmitOnChange
            | FlagOption::OnlyUpdateOnChange => {}
        }
        self
    }

    /// Check the configuration before registering with a Core
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidParameter(
                "federate name must not be empty".to_string(),
            ));
        }
        if !VALID_SEPARATORS.contains(&self.separator) {
            return Err(Error::InvalidParameter(format!(
                "'{}' is not a valid name separator",
                self.separator
            )));
        }
        for (property, value) in self.time_properties() {
            if value.is_negative() {
                return Err(Error::InvalidParameter(format!(
                    "{:?} must be non-negative, got {}",
                    property, value
                )));
            }
        }
        Ok(())
    }

    /// Time properties in the order they are applied
    pub fn time_properties(&self) -> [(TimeProperty, Time); 5] {
        [
            (TimeProperty::TimeDelta, self.time_delta),
            (TimeProperty::Period, self.period),
            (TimeProperty::Offset, self.offset),
            (TimeProperty::InputDelay, self.input_delay),
            (TimeProperty::OutputDelay, self.output_delay),
        ]
    }

    /// Federate-wide flag options
    pub fn flags(&self) -> [(FlagOption, bool); 4] {
        [
            (FlagOption::Observer, self.observer),
            (FlagOption::Uninterruptible, self.uninterruptible),
            (
                FlagOption::WaitForCurrentTimeUpdate,
                self.wait_for_current_time_update,
            ),
            (FlagOption::SourceOnly, self.source_only),
        ]
    }
}
