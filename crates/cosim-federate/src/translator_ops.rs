//! Translator operations - Conversions between messages and values
//!
//! - `Binary` copies bytes verbatim in both directions.
//! - `Json` wraps a value in a JSON document `{"value": ...}` when sending
//!   it as a message, and unwraps such documents back into value bytes.
//! - `Custom` leaves the operator to the application.

use cosim_core::{Error, Message, Result, Time, TranslatorOperator};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Built-in translator kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TranslatorKind {
    /// Operator supplied by the application
    Custom,
    /// JSON documents on the message side
    Json,
    /// Raw bytes on both sides
    Binary,
}

impl FromStr for TranslatorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "custom" => Ok(TranslatorKind::Custom),
            "json" => Ok(TranslatorKind::Json),
            "binary" | "raw" => Ok(TranslatorKind::Binary),
            _ => Err(Error::InvalidParameter(format!(
                "unknown translator kind '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for TranslatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TranslatorKind::Custom => "custom",
            TranslatorKind::Json => "json",
            TranslatorKind::Binary => "binary",
        };
        write!(f, "{}", s)
    }
}

/// Configuration side of a translator
pub trait TranslatorOperation: Send + Sync {
    /// Set a numeric property
    fn set(&self, property: &str, value: f64) -> Result<()>;

    /// Set a string property
    fn set_string(&self, property: &str, value: &str) -> Result<()>;

    /// Operator to install on the Core
    fn operator(&self) -> Arc<dyn TranslatorOperator>;
}

/// Build the operation for a built-in kind; `Custom` has none
pub fn make_translator_operation(kind: TranslatorKind) -> Option<Arc<dyn TranslatorOperation>> {
    match kind {
        TranslatorKind::Custom => None,
        TranslatorKind::Json => Some(Arc::new(StandardTranslatorOperation::new(
            JsonTranslator::default(),
        ))),
        TranslatorKind::Binary => Some(Arc::new(StandardTranslatorOperation::new(
            BinaryTranslator::default(),
        ))),
    }
}

/// Time shifts shared by the built-in translators
#[derive(Debug, Default)]
pub struct TimeShifts {
    message: AtomicI64,
    value: AtomicI64,
}

impl TimeShifts {
    fn message(&self) -> Time {
        Time::from_nanos(self.message.load(Ordering::Relaxed))
    }

    fn value(&self) -> Time {
        Time::from_nanos(self.value.load(Ordering::Relaxed))
    }
}

/// Built-in translator operator with configurable time shifts
pub trait ShiftedTranslator: TranslatorOperator {
    /// Shared time shifts
    fn shifts(&self) -> &TimeShifts;
}

/// Copies bytes verbatim
#[derive(Debug, Default)]
pub struct BinaryTranslator {
    shifts: TimeShifts,
}

impl TranslatorOperator for BinaryTranslator {
    fn convert_to_value(&self, message: &Message) -> Vec<u8> {
        message.data.clone()
    }

    fn convert_to_message(&self, value: &[u8]) -> Message {
        Message {
            data: value.to_vec(),
            ..Message::default()
        }
    }

    fn message_time_shift(&self) -> Time {
        self.shifts.message()
    }

    fn value_time_shift(&self) -> Time {
        self.shifts.value()
    }
}

impl ShiftedTranslator for BinaryTranslator {
    fn shifts(&self) -> &TimeShifts {
        &self.shifts
    }
}

/// Wraps values in JSON documents
#[derive(Debug, Default)]
pub struct JsonTranslator {
    shifts: TimeShifts,
}

impl TranslatorOperator for JsonTranslator {
    fn convert_to_value(&self, message: &Message) -> Vec<u8> {
        let doc: JsonValue = match serde_json::from_slice(&message.data) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(source = %message.source, error = %e, "json translator: payload is not JSON, passing through");
                return message.data.clone();
            }
        };
        match doc.get("value").unwrap_or(&doc) {
            JsonValue::String(s) => s.as_bytes().to_vec(),
            JsonValue::Array(items) => {
                let bytes: Option<Vec<u8>> = items
                    .iter()
                    .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                    .collect();
                bytes.unwrap_or_else(|| JsonValue::Array(items.clone()).to_string().into_bytes())
            }
            other => other.to_string().into_bytes(),
        }
    }

    fn convert_to_message(&self, value: &[u8]) -> Message {
        let doc = match std::str::from_utf8(value) {
            Ok(text) => json!({ "value": text }),
            Err(_) => json!({ "value": value }),
        };
        Message {
            data: doc.to_string().into_bytes(),
            ..Message::default()
        }
    }

    fn message_time_shift(&self) -> Time {
        self.shifts.message()
    }

    fn value_time_shift(&self) -> Time {
        self.shifts.value()
    }
}

impl ShiftedTranslator for JsonTranslator {
    fn shifts(&self) -> &TimeShifts {
        &self.shifts
    }
}

/// Operation wrapping a built-in translator
///
/// Properties `message_delay` and `value_delay` (seconds) shift the
/// delivery time of converted data.
pub struct StandardTranslatorOperation<T> {
    translator: Arc<T>,
}

impl<T: ShiftedTranslator + 'static> StandardTranslatorOperation<T> {
    /// Wrap a translator
    pub fn new(translator: T) -> Self {
        Self {
            translator: Arc::new(translator),
        }
    }
}

impl<T: ShiftedTranslator + 'static> TranslatorOperation for StandardTranslatorOperation<T> {
    fn set(&self, property: &str, value: f64) -> Result<()> {
        let shift = Time::from_secs(value);
        if shift.is_negative() {
            return Err(Error::InvalidParameter(format!(
                "{} must be non-negative, got {}",
                property, value
            )));
        }
        let shifts = self.translator.shifts();
        match property {
            "message_delay" => shifts.message.store(shift.as_nanos(), Ordering::Relaxed),
            "value_delay" => shifts.value.store(shift.as_nanos(), Ordering::Relaxed),
            _ => debug!(%property, "translator property ignored"),
        }
        Ok(())
    }

    fn set_string(&self, property: &str, value: &str) -> Result<()> {
        let seconds: f64 = value
            .trim()
            .parse()
            .map_err(|_| Error::InvalidParameter(format!("'{}' is not a time", value)))?;
        self.set(property, seconds)
    }

    fn operator(&self) -> Arc<dyn TranslatorOperator> {
        self.translator.clone()
    }
}
