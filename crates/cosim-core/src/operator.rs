//! Operator traits installed on filters and translators
//!
//! The Core runs these on messages in transit. They are defined here, next
//! to the `Core` contract, so that any Core implementation can execute the
//! operators built by the federate runtime.

use crate::{Message, Time};

/// Transformation applied by a filter to a message in transit
pub trait FilterOperator: Send + Sync {
    /// Process one message
    ///
    /// Returning `None` drops the message.
    fn process(&self, message: Message) -> Option<Message>;

    /// Process one message into any number of messages
    ///
    /// Cloning filters override this to emit copies; the default wraps
    /// [`FilterOperator::process`].
    fn process_vector(&self, message: Message) -> Vec<Message> {
        self.process(message).into_iter().collect()
    }
}

/// Conversion between message and value representations
pub trait TranslatorOperator: Send + Sync {
    /// Convert a message payload into a value
    fn convert_to_value(&self, message: &Message) -> Vec<u8>;

    /// Convert a published value into a message payload
    fn convert_to_message(&self, value: &[u8]) -> Message;

    /// Extra delay applied when a value becomes a message
    fn message_time_shift(&self) -> Time {
        Time::ZERO
    }

    /// Extra delay applied when a message becomes a value
    fn value_time_shift(&self) -> Time {
        Time::ZERO
    }
}

/// Filter operator built from a closure
pub struct FnFilterOperator<F>(pub F);

impl<F> FilterOperator for FnFilterOperator<F>
where
    F: Fn(Message) -> Option<Message> + Send + Sync,
{
    fn process(&self, message: Message) -> Option<Message> {
        (self.0)(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_process_vector() {
        let keep = FnFilterOperator(|m: Message| Some(m));
        let drop = FnFilterOperator(|_: Message| None);

        let msg = Message::new("a", "b", b"x".to_vec());
        assert_eq!(keep.process_vector(msg.clone()).len(), 1);
        assert!(drop.process_vector(msg).is_empty());
    }
}
