//! ValueFederate - Value interfaces of a federate
//!
//! A borrowed view pairing a [`Federate`] with its [`ValueExchangeManager`].
//! Registration is only allowed in startup. Local keys are prefixed with the
//! federate name; `*_global` variants register the name as given.

use crate::federate::Federate;
use crate::identity::{InputId, PublicationId};
use crate::values::{InputInfo, PublicationInfo, ValueCallback, ValueExchangeManager};
use cosim_core::{Error, FlagOption, Result, Time};

/// Value interfaces of one federate
#[derive(Clone, Copy)]
pub struct ValueFederate<'a> {
    fed: &'a Federate,
    values: &'a ValueExchangeManager,
}

impl<'a> ValueFederate<'a> {
    pub(crate) fn new(fed: &'a Federate, values: &'a ValueExchangeManager) -> Self {
        Self { fed, values }
    }

    /// The owning federate
    pub fn federate(&self) -> &'a Federate {
        self.fed
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register a publication named `<federate><sep><key>`
    pub fn register_publication(&self, key: &str, type_name: &str, units: &str) -> Result<PublicationId> {
        self.register_publication_global(&self.fed.local_name(key), type_name, units)
    }

    /// Register a publication under a federation-wide name
    pub fn register_publication_global(
        &self,
        name: &str,
        type_name: &str,
        units: &str,
    ) -> Result<PublicationId> {
        self.fed.ensure_startup("register_publication")?;
        if name.is_empty() {
            return Err(Error::InvalidParameter("publication key must not be empty".to_string()));
        }
        self.values
            .register_publication(&*self.fed.core(), name, type_name, units)
    }

    /// Register an input named `<federate><sep><key>`; an empty key registers an unnamed input
    pub fn register_input(&self, key: &str, type_name: &str, units: &str) -> Result<InputId> {
        self.register_input_global(&self.fed.local_name(key), type_name, units)
    }

    /// Register an input under a federation-wide name
    pub fn register_input_global(&self, name: &str, type_name: &str, units: &str) -> Result<InputId> {
        self.fed.ensure_startup("register_input")?;
        self.values
            .register_input(&*self.fed.core(), name, type_name, units)
    }

    /// Register an unnamed input fed by the publication `target`
    pub fn register_subscription(&self, target: &str, units: &str) -> Result<InputId> {
        self.fed.ensure_startup("register_subscription")?;
        self.values
            .register_subscription(&*self.fed.core(), target, units)
    }

    /// Feed an input from another publication
    pub fn add_input_target(&self, id: InputId, target: &str) -> Result<()> {
        self.values.add_input_target(&*self.fed.core(), id, target)
    }

    /// Send a publication to another input
    pub fn add_publication_target(&self, id: PublicationId, target: &str) -> Result<()> {
        self.values
            .add_publication_target(&*self.fed.core(), id, target)
    }

    /// Set an interface option such as `OnlyTransmitOnChange` on a publication
    pub fn set_publication_option(&self, id: PublicationId, flag: FlagOption, value: bool) -> Result<()> {
        let info = self
            .values
            .publication(id)
            .ok_or_else(|| Error::InvalidIdentifier(format!("{} is out of range", id)))?;
        self.fed.core().set_handle_option(info.handle, flag, value)
    }

    /// Set an interface option such as `OnlyUpdateOnChange` on an input
    pub fn set_input_option(&self, id: InputId, flag: FlagOption, value: bool) -> Result<()> {
        let info = self
            .values
            .input(id)
            .ok_or_else(|| Error::InvalidIdentifier(format!("{} is out of range", id)))?;
        self.fed.core().set_handle_option(info.handle, flag, value)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Publication by full name or local key
    pub fn publication_id(&self, name: &str) -> Option<PublicationId> {
        self.values
            .publication_id(name)
            .or_else(|| self.values.publication_id(&self.fed.local_name(name)))
    }

    /// Input by full name or local key
    pub fn input_id(&self, name: &str) -> Option<InputId> {
        self.values
            .input_id(name)
            .or_else(|| self.values.input_id(&self.fed.local_name(name)))
    }

    /// Publication record
    pub fn publication(&self, id: PublicationId) -> Option<PublicationInfo> {
        self.values.publication(id)
    }

    /// Input record
    pub fn input(&self, id: InputId) -> Option<InputInfo> {
        self.values.input(id)
    }

    /// Number of publications
    pub fn publication_count(&self) -> usize {
        self.values.publication_count()
    }

    /// Number of inputs
    pub fn input_count(&self) -> usize {
        self.values.input_count()
    }

    // ========================================================================
    // Data
    // ========================================================================

    /// Publish raw bytes
    pub fn publish(&self, id: PublicationId, data: &[u8]) -> Result<()> {
        self.values.publish(&*self.fed.core(), id, data)
    }

    /// Value returned before any update arrives
    pub fn set_default_value(&self, id: InputId, data: &[u8]) -> Result<()> {
        self.values.set_default_value(id, data)
    }

    /// Latest snapshot of an input; clears its update flag
    pub fn get_value(&self, id: InputId) -> Result<Vec<u8>> {
        self.values.get_value(id, self.fed.current_time())
    }

    /// Whether an input was updated and not read since
    pub fn is_updated(&self, id: InputId) -> bool {
        self.values.is_updated(id)
    }

    /// Time of the last update of an input
    pub fn last_update_time(&self, id: InputId) -> Option<Time> {
        self.values.last_update_time(id)
    }

    /// Time an input was last read
    pub fn last_query_time(&self, id: InputId) -> Option<Time> {
        self.values.last_query_time(id)
    }

    /// Inputs with unread updates
    pub fn query_updates(&self) -> Vec<InputId> {
        self.values.query_updates()
    }

    // ========================================================================
    // Callbacks
    // ========================================================================

    /// Callback for inputs without their own
    pub fn set_catch_all_callback(&self, callback: ValueCallback) {
        self.values.set_catch_all_callback(callback);
    }

    /// Callback for one input
    pub fn set_input_callback(&self, id: InputId, callback: ValueCallback) -> Result<()> {
        self.values.set_input_callback(id, callback)
    }

    /// One callback shared by several inputs
    pub fn set_multi_input_callback(&self, ids: &[InputId], callback: ValueCallback) -> Result<()> {
        self.values.set_multi_input_callback(ids, callback)
    }
}

impl std::fmt::Debug for ValueFederate<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueFederate")
            .field("federate", &self.fed.name())
            .field("publications", &self.values.publication_count())
            .field("inputs", &self.values.input_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Federate, FederateInfo, FederateState};
    use cosim_core::{Error, FlagOption, IterationRequest, LoopbackCore, Time};

    #[test]
    fn test_local_and_global_names() {
        let core = LoopbackCore::shared();
        let fed = Federate::new(core, FederateInfo::new("gen")).unwrap();
        let values = fed.values().unwrap();

        let local = values.register_publication("power", "double", "MW").unwrap();
        let global = values.register_publication_global("bus_voltage", "double", "").unwrap();
        assert_eq!(values.publication(local).unwrap().name, "gen/power");
        assert_eq!(values.publication_id("power"), Some(local));
        assert_eq!(values.publication_id("gen/power"), Some(local));
        assert_eq!(values.publication_id("bus_voltage"), Some(global));
        assert_eq!(values.publication_id("missing"), None);
    }

    #[test]
    fn test_registration_after_startup_fails() {
        let core = LoopbackCore::shared();
        let fed = Federate::new(core, FederateInfo::new("late")).unwrap();
        fed.enter_initializing_mode().unwrap();
        assert!(matches!(
            fed.values().unwrap().register_input("x", "double", ""),
            Err(Error::InvalidFunctionCall(_))
        ));
    }

    #[test]
    fn test_publish_to_subscription() {
        let core = LoopbackCore::shared();
        let producer = Federate::new(core.clone(), FederateInfo::new("src")).unwrap();
        let consumer = Federate::new(core, FederateInfo::new("dst")).unwrap();

        let out = producer.values().unwrap().register_publication("level", "", "").unwrap();
        let input = consumer.values().unwrap().register_subscription("src/level", "").unwrap();
        consumer.values().unwrap().set_default_value(input, b"none").unwrap();

        producer.enter_executing_mode(IterationRequest::NoIterations).unwrap();
        consumer.enter_executing_mode(IterationRequest::NoIterations).unwrap();
        assert_eq!(consumer.values().unwrap().get_value(input).unwrap(), b"none".to_vec());

        producer.values().unwrap().publish(out, b"high").unwrap();
        consumer.request_time(Time::from_secs(1.0)).unwrap();

        let values = consumer.values().unwrap();
        assert!(values.is_updated(input));
        assert_eq!(values.query_updates(), vec![input]);
        assert_eq!(values.get_value(input).unwrap(), b"high".to_vec());
        assert!(!values.is_updated(input));
        assert_eq!(values.last_query_time(input), Some(Time::from_secs(1.0)));
        assert_eq!(consumer.state(), FederateState::Executing);
    }

    #[test]
    fn test_only_transmit_on_change() {
        let core = LoopbackCore::shared();
        let producer = Federate::new(core.clone(), FederateInfo::new("p")).unwrap();
        let consumer = Federate::new(core, FederateInfo::new("c")).unwrap();
        let out = producer.values().unwrap().register_publication("v", "", "").unwrap();
        producer
            .values()
            .unwrap()
            .set_publication_option(out, FlagOption::OnlyTransmitOnChange, true)
            .unwrap();
        let input = consumer.values().unwrap().register_subscription("p/v", "").unwrap();

        producer.enter_executing_mode(IterationRequest::NoIterations).unwrap();
        consumer.enter_executing_mode(IterationRequest::NoIterations).unwrap();

        producer.values().unwrap().publish(out, b"1").unwrap();
        consumer.request_time(Time::from_secs(1.0)).unwrap();
        assert!(consumer.values().unwrap().is_updated(input));

        producer.values().unwrap().publish(out, b"1").unwrap();
        consumer.request_time(Time::from_secs(2.0)).unwrap();
        assert!(!consumer.values().unwrap().is_updated(input));
    }
}
