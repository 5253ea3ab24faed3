//! ConnectorManager - Filters and translators of a federate
//!
//! Connectors are kept in insertion order and indexed by name, so they can
//! be looked up either way. Lookups hand out cheap snapshots ([`Filter`],
//! [`Translator`]) and return `None` when nothing matches.
//!
//! Records are never removed. Closing or disconnecting marks them
//! disconnected and closes their Core handles; counts stay unchanged.

use crate::filter_ops::{make_filter_operation, FilterKind, FilterOperation};
use crate::sync::{read, write};
use crate::translator_ops::{make_translator_operation, TranslatorKind, TranslatorOperation};
use cosim_core::{Core, Error, FilterOperator, InterfaceHandle, Result, TranslatorOperator};
use indexmap::IndexMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Snapshot of a registered filter
#[derive(Clone)]
pub struct Filter {
    /// Name, unique among the federate's filters
    pub name: String,
    /// Core handle
    pub handle: InterfaceHandle,
    /// Built-in kind
    pub kind: FilterKind,
    /// Whether the filter delivers copies rather than replacing messages
    pub cloning: bool,
    /// Set once the filter was closed or disconnected
    pub disconnected: bool,
    operation: Option<Arc<dyn FilterOperation>>,
}

impl Filter {
    /// Whether the filter still has a live Core handle
    pub fn is_valid(&self) -> bool {
        self.handle.is_valid() && !self.disconnected
    }

    /// Configuration of a built-in filter
    pub fn operation(&self) -> Option<&Arc<dyn FilterOperation>> {
        self.operation.as_ref()
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("kind", &self.kind)
            .field("cloning", &self.cloning)
            .field("disconnected", &self.disconnected)
            .finish()
    }
}

/// Snapshot of a registered translator
#[derive(Clone)]
pub struct Translator {
    /// Name, unique among the federate's translators
    pub name: String,
    /// Core handle
    pub handle: InterfaceHandle,
    /// Built-in kind
    pub kind: TranslatorKind,
    /// Set once the translator was closed or disconnected
    pub disconnected: bool,
    operation: Option<Arc<dyn TranslatorOperation>>,
}

impl Translator {
    /// Whether the translator still has a live Core handle
    pub fn is_valid(&self) -> bool {
        self.handle.is_valid() && !self.disconnected
    }

    /// Configuration of a built-in translator
    pub fn operation(&self) -> Option<&Arc<dyn TranslatorOperation>> {
        self.operation.as_ref()
    }
}

impl std::fmt::Debug for Translator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Translator")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("kind", &self.kind)
            .field("disconnected", &self.disconnected)
            .finish()
    }
}

/// Tracks one federate's filters and translators
#[derive(Default)]
pub struct ConnectorManager {
    filters: RwLock<IndexMap<String, Filter>>,
    translators: RwLock<IndexMap<String, Translator>>,
}

impl ConnectorManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register a filter of a given kind
    ///
    /// Built-in kinds get their operation and operator installed; `Custom`
    /// filters pass messages through until an operator is set. A blank name
    /// takes the name the Core assigned.
    pub fn register_filter(
        &self,
        core: &dyn Core,
        kind: FilterKind,
        name: &str,
        type_in: &str,
        type_out: &str,
    ) -> Result<Filter> {
        self.ensure_unique_filter(name)?;
        let cloning = kind.is_cloning();
        let handle = if cloning {
            core.register_cloning_filter(name, type_in, type_out)?
        } else {
            core.register_filter(name, type_in, type_out)?
        };
        let operation = make_filter_operation(kind);
        if let Some(op) = &operation {
            core.set_filter_operator(handle, op.operator())?;
        }

        let name = if name.is_empty() {
            core.handle_name(handle)
        } else {
            name.to_string()
        };
        let filter = self.insert_filter(Filter {
            name,
            handle,
            kind,
            cloning,
            disconnected: false,
            operation,
        })?;
        debug!(name = %filter.name, %kind, %handle, "registered filter");
        Ok(filter)
    }

    /// Register a cloning filter with a custom operator slot
    pub fn register_cloning_filter(
        &self,
        core: &dyn Core,
        name: &str,
        type_in: &str,
        type_out: &str,
    ) -> Result<Filter> {
        self.ensure_unique_filter(name)?;
        let handle = core.register_cloning_filter(name, type_in, type_out)?;
        let name = if name.is_empty() {
            core.handle_name(handle)
        } else {
            name.to_string()
        };
        let filter = self.insert_filter(Filter {
            name,
            handle,
            kind: FilterKind::Custom,
            cloning: true,
            disconnected: false,
            operation: None,
        })?;
        debug!(name = %filter.name, %handle, "registered cloning filter");
        Ok(filter)
    }

    /// Register a translator of a given kind
    pub fn register_translator(
        &self,
        core: &dyn Core,
        kind: TranslatorKind,
        name: &str,
        endpoint_type: &str,
        units: &str,
    ) -> Result<Translator> {
        if !name.is_empty() && read(&self.translators).contains_key(name) {
            return Err(Error::RegistrationFailure(format!(
                "translator '{}' already registered",
                name
            )));
        }
        let handle = core.register_translator(name, endpoint_type, units)?;
        let operation = make_translator_operation(kind);
        if let Some(op) = &operation {
            core.set_translator_operator(handle, op.operator())?;
        }

        let name = if name.is_empty() {
            core.handle_name(handle)
        } else {
            name.to_string()
        };
        let translator = Translator {
            name: name.clone(),
            handle,
            kind,
            disconnected: false,
            operation,
        };
        let mut translators = write(&self.translators);
        if translators.contains_key(&name) {
            return Err(Error::RegistrationFailure(format!(
                "translator '{}' already registered",
                name
            )));
        }
        translators.insert(name.clone(), translator.clone());
        debug!(%name, %kind, %handle, "registered translator");
        Ok(translator)
    }

    /// Store a new filter record; an existing record is never replaced
    fn insert_filter(&self, filter: Filter) -> Result<Filter> {
        let mut filters = write(&self.filters);
        if filters.contains_key(&filter.name) {
            return Err(Error::RegistrationFailure(format!(
                "filter '{}' already registered",
                filter.name
            )));
        }
        filters.insert(filter.name.clone(), filter.clone());
        Ok(filter)
    }

    fn ensure_unique_filter(&self, name: &str) -> Result<()> {
        if !name.is_empty() && read(&self.filters).contains_key(name) {
            return Err(Error::RegistrationFailure(format!(
                "filter '{}' already registered",
                name
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Filter by name
    pub fn filter(&self, name: &str) -> Option<Filter> {
        read(&self.filters).get(name).cloned()
    }

    /// Filter by registration index
    pub fn filter_at(&self, index: usize) -> Option<Filter> {
        read(&self.filters).get_index(index).map(|(_, f)| f.clone())
    }

    /// Number of filters, closed ones included
    pub fn filter_count(&self) -> usize {
        read(&self.filters).len()
    }

    /// Translator by name
    pub fn translator(&self, name: &str) -> Option<Translator> {
        read(&self.translators).get(name).cloned()
    }

    /// Translator by registration index
    pub fn translator_at(&self, index: usize) -> Option<Translator> {
        read(&self.translators)
            .get_index(index)
            .map(|(_, t)| t.clone())
    }

    /// Number of translators, closed ones included
    pub fn translator_count(&self) -> usize {
        read(&self.translators).len()
    }

    fn handle_of(&self, name: &str) -> Result<InterfaceHandle> {
        if let Some(filter) = read(&self.filters).get(name) {
            return Ok(filter.handle);
        }
        if let Some(translator) = read(&self.translators).get(name) {
            return Ok(translator.handle);
        }
        Err(Error::InvalidIdentifier(format!("no connector named '{}'", name)))
    }

    // ========================================================================
    // Wiring and configuration
    // ========================================================================

    /// Attach a connector to the messages sent by `target`
    pub fn add_source_target(&self, core: &dyn Core, name: &str, target: &str) -> Result<()> {
        core.add_source_target(self.handle_of(name)?, target)
    }

    /// Attach a connector to the messages addressed to `target`
    pub fn add_destination_target(&self, core: &dyn Core, name: &str, target: &str) -> Result<()> {
        core.add_destination_target(self.handle_of(name)?, target)
    }

    /// Replace the operator of a filter
    pub fn set_filter_operator(
        &self,
        core: &dyn Core,
        name: &str,
        operator: Arc<dyn FilterOperator>,
    ) -> Result<()> {
        let filter = self
            .filter(name)
            .ok_or_else(|| Error::InvalidIdentifier(format!("no filter named '{}'", name)))?;
        core.set_filter_operator(filter.handle, operator)
    }

    /// Replace the operator of a translator
    pub fn set_translator_operator(
        &self,
        core: &dyn Core,
        name: &str,
        operator: Arc<dyn TranslatorOperator>,
    ) -> Result<()> {
        let translator = self
            .translator(name)
            .ok_or_else(|| Error::InvalidIdentifier(format!("no translator named '{}'", name)))?;
        core.set_translator_operator(translator.handle, operator)
    }

    /// Set a numeric property on a built-in connector
    pub fn set_property(&self, name: &str, property: &str, value: f64) -> Result<()> {
        if let Some(filter) = self.filter(name) {
            return match filter.operation {
                Some(op) => op.set(property, value),
                None => Err(Error::InvalidParameter(format!(
                    "filter '{}' has no configurable operation",
                    name
                ))),
            };
        }
        match self.translator(name).and_then(|t| t.operation) {
            Some(op) => op.set(property, value),
            None => Err(Error::InvalidIdentifier(format!(
                "no configurable connector named '{}'",
                name
            ))),
        }
    }

    /// Set a string property on a built-in connector
    pub fn set_string_property(&self, name: &str, property: &str, value: &str) -> Result<()> {
        if let Some(filter) = self.filter(name) {
            return match filter.operation {
                Some(op) => op.set_string(property, value),
                None => Err(Error::InvalidParameter(format!(
                    "filter '{}' has no configurable operation",
                    name
                ))),
            };
        }
        match self.translator(name).and_then(|t| t.operation) {
            Some(op) => op.set_string(property, value),
            None => Err(Error::InvalidIdentifier(format!(
                "no configurable connector named '{}'",
                name
            ))),
        }
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Close every connector's Core handle and mark it disconnected
    pub fn close_all(&self, core: &dyn Core) {
        let mut filters = write(&self.filters);
        for filter in filters.values_mut() {
            core.close_handle(filter.handle);
            filter.disconnected = true;
        }
        let mut translators = write(&self.translators);
        for translator in translators.values_mut() {
            core.close_handle(translator.handle);
            translator.disconnected = true;
        }
    }

    /// Detach every connector from the Core
    ///
    /// Safe to call repeatedly and after the Core was replaced by an
    /// [`EmptyCore`](cosim_core::EmptyCore).
    pub fn disconnect_all(&self, core: &dyn Core) {
        self.close_all(core);
        debug!(
            filters = self.filter_count(),
            translators = self.translator_count(),
            "connectors disconnected"
        );
    }
}

impl std::fmt::Debug for ConnectorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorManager")
            .field("filters", &self.filter_count())
            .field("translators", &self.translator_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosim_core::{EmptyCore, LoopbackCore};

    #[test]
    fn test_register_and_lookup() {
        let core = LoopbackCore::new();
        let connectors = ConnectorManager::new();
        let delay = connectors
            .register_filter(&core, FilterKind::Delay, "delay", "", "")
            .unwrap();
        connectors
            .register_filter(&core, FilterKind::Clone, "tap", "", "")
            .unwrap();

        assert_eq!(connectors.filter_count(), 2);
        assert_eq!(connectors.filter("delay").unwrap().handle, delay.handle);
        assert!(connectors.filter_at(1).unwrap().cloning);
        assert!(connectors.filter("missing").is_none());
        assert!(connectors.filter_at(5).is_none());
    }

    #[test]
    fn test_blank_name_uses_core_name() {
        let core = LoopbackCore::new();
        let connectors = ConnectorManager::new();
        let filter = connectors
            .register_filter(&core, FilterKind::Custom, "", "", "")
            .unwrap();
        assert!(!filter.name.is_empty());
        assert_eq!(filter.name, core.handle_name(filter.handle));
        assert!(connectors.filter(&filter.name).is_some());
    }

    #[test]
    fn test_blank_cloning_filter_never_replaces_existing() {
        let core = LoopbackCore::new();
        let connectors = ConnectorManager::new();
        // the Core names the next blank cloning filter after the handle count
        let first = connectors
            .register_filter(&core, FilterKind::Delay, "_cloning_filter_1", "", "")
            .unwrap();

        assert!(matches!(
            connectors.register_cloning_filter(&core, "", "", ""),
            Err(Error::RegistrationFailure(_))
        ));
        assert_eq!(connectors.filter_count(), 1);
        let kept = connectors.filter("_cloning_filter_1").unwrap();
        assert_eq!(kept.handle, first.handle);
        assert_eq!(kept.kind, FilterKind::Delay);
        assert!(!kept.cloning);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let core = LoopbackCore::new();
        let connectors = ConnectorManager::new();
        connectors
            .register_filter(&core, FilterKind::Delay, "f", "", "")
            .unwrap();
        assert!(matches!(
            connectors.register_filter(&core, FilterKind::Delay, "f", "", ""),
            Err(Error::RegistrationFailure(_))
        ));
        connectors
            .register_translator(&core, TranslatorKind::Json, "t", "", "")
            .unwrap();
        assert!(matches!(
            connectors.register_translator(&core, TranslatorKind::Json, "t", "", ""),
            Err(Error::RegistrationFailure(_))
        ));
    }

    #[test]
    fn test_properties_reach_operation() {
        let core = LoopbackCore::new();
        let connectors = ConnectorManager::new();
        connectors
            .register_filter(&core, FilterKind::RandomDrop, "lossy", "", "")
            .unwrap();
        connectors
            .register_filter(&core, FilterKind::Custom, "mine", "", "")
            .unwrap();

        assert!(connectors.set_property("lossy", "prob", 0.5).is_ok());
        assert!(connectors.set_property("lossy", "prob", 2.0).is_err());
        assert!(matches!(
            connectors.set_property("mine", "prob", 0.5),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            connectors.set_string_property("ghost", "target", "x"),
            Err(Error::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_close_keeps_records() {
        let core = LoopbackCore::new();
        let connectors = ConnectorManager::new();
        let a = connectors
            .register_filter(&core, FilterKind::Delay, "a", "", "")
            .unwrap();
        connectors
            .register_translator(&core, TranslatorKind::Binary, "t", "", "")
            .unwrap();

        connectors.close_all(&core);
        assert!(core.is_closed(a.handle));
        assert!(!connectors.filter("a").unwrap().is_valid());
        assert!(!connectors.translator_at(0).unwrap().is_valid());

        connectors.disconnect_all(&EmptyCore::new());
        connectors.disconnect_all(&EmptyCore::new());
        assert_eq!(connectors.filter_count(), 1);
        assert_eq!(connectors.translator_count(), 1);
    }
}
