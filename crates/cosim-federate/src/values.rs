//! ValueExchangeManager - Publications, inputs and value callbacks
//!
//! Publications push raw bytes to the Core; inputs hold the snapshot taken
//! at the most recent time update. Ids are the registration ordinal within
//! each collection.
//!
//! ## Update cycle
//!
//! At every granted time the federate calls [`ValueExchangeManager::update_time`]:
//!
//! 1. Every input's update flag is cleared.
//! 2. The Core reports which input handles changed.
//! 3. Each changed input takes a fresh snapshot, is stamped with the new
//!    time and flagged as updated.
//! 4. The input's own callback runs, or the catch-all callback if it has
//!    none.
//!
//! Callbacks run with no manager lock held, so a callback may read other
//! inputs or register further callbacks. It may also observe later updates
//! of the same cycle.

use crate::identity::{InputId, PublicationId};
use crate::sync::{lock, read, write};
use cosim_core::{Core, Error, FederateId, InterfaceHandle, Result, Time};
use indexmap::IndexMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, trace};

/// Callback fired when an input is updated
pub type ValueCallback = Arc<dyn Fn(InputId, Time) + Send + Sync>;

/// Encoded byte size of types with a fixed wire size
///
/// Values carry a one-byte type code ahead of the payload, so a double
/// occupies nine bytes.
pub fn type_size(type_name: &str) -> Option<usize> {
    let size = match type_name {
        "char" | "uchar" => 2,
        "block_4" => 5,
        "block_8" => 9,
        "block_12" => 13,
        "block_16" => 17,
        "block_20" => 24,
        "block_24" => 30,
        "double" => 9,
        "float" => 5,
        "int32" | "uint32" => 5,
        "int64" | "uint64" => 9,
        "complex" => 17,
        "complex_f" => 9,
        _ => return None,
    };
    Some(size)
}

/// A registered publication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationInfo {
    /// Local id
    pub id: PublicationId,
    /// Registered key
    pub name: String,
    /// Declared type
    pub type_name: String,
    /// Declared units
    pub units: String,
    /// Core handle
    pub handle: InterfaceHandle,
    /// Required payload size, if the type has one
    pub size: Option<usize>,
}

/// A registered input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputInfo {
    /// Local id
    pub id: InputId,
    /// Registered key, empty for unnamed subscriptions
    pub name: String,
    /// Declared type
    pub type_name: String,
    /// Declared units
    pub units: String,
    /// Core handle
    pub handle: InterfaceHandle,
    /// Type of the publication feeding this input, resolved at initialization
    pub publisher_type: String,
}

struct InputRecord {
    info: InputInfo,
    value: Vec<u8>,
    default_value: Vec<u8>,
    last_update: Time,
    last_query: Time,
    has_update: bool,
    callback: Option<ValueCallback>,
}

/// Tracks one federate's publications and inputs
pub struct ValueExchangeManager {
    fed: FederateId,
    publications: RwLock<IndexMap<String, PublicationInfo>>,
    inputs: RwLock<Vec<InputRecord>>,
    catch_all: Mutex<Option<ValueCallback>>,
}

impl ValueExchangeManager {
    /// Create an empty manager for a federate
    pub fn new(fed: FederateId) -> Self {
        Self {
            fed,
            publications: RwLock::new(IndexMap::new()),
            inputs: RwLock::new(Vec::new()),
            catch_all: Mutex::new(None),
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register a publication under its full key
    pub fn register_publication(
        &self,
        core: &dyn Core,
        key: &str,
        type_name: &str,
        units: &str,
    ) -> Result<PublicationId> {
        let handle = core.register_publication(self.fed, key, type_name, units)?;
        let mut publications = write(&self.publications);
        if publications.contains_key(key) {
            return Err(Error::RegistrationFailure(format!(
                "publication '{}' already registered",
                key
            )));
        }
        let id = PublicationId(publications.len());
        publications.insert(
            key.to_string(),
            PublicationInfo {
                id,
                name: key.to_string(),
                type_name: type_name.to_string(),
                units: units.to_string(),
                handle,
                size: type_size(type_name),
            },
        );
        debug!(federate = %self.fed, %id, %key, "registered publication");
        Ok(id)
    }

    /// Register an input under its full key
    pub fn register_input(
        &self,
        core: &dyn Core,
        key: &str,
        type_name: &str,
        units: &str,
    ) -> Result<InputId> {
        let handle = core.register_input(self.fed, key, type_name, units)?;
        let mut inputs = write(&self.inputs);
        let id = InputId(inputs.len());
        inputs.push(InputRecord {
            info: InputInfo {
                id,
                name: key.to_string(),
                type_name: type_name.to_string(),
                units: units.to_string(),
                handle,
                publisher_type: String::new(),
            },
            value: Vec::new(),
            default_value: Vec::new(),
            last_update: Time::ZERO,
            last_query: Time::ZERO,
            has_update: false,
            callback: None,
        });
        debug!(federate = %self.fed, %id, %key, "registered input");
        Ok(id)
    }

    /// Register an unnamed input fed by the publication `target`
    pub fn register_subscription(&self, core: &dyn Core, target: &str, units: &str) -> Result<InputId> {
        let id = self.register_input(core, "", "", units)?;
        self.add_input_target(core, id, target)?;
        Ok(id)
    }

    /// Connect an input to another publication
    pub fn add_input_target(&self, core: &dyn Core, id: InputId, target: &str) -> Result<()> {
        let handle = self.input_handle(id)?;
        core.add_source_target(handle, target)
    }

    /// Connect a publication to an input by key
    pub fn add_publication_target(&self, core: &dyn Core, id: PublicationId, target: &str) -> Result<()> {
        let handle = self.publication_handle(id)?;
        core.add_destination_target(handle, target)
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Id of a publication by key
    pub fn publication_id(&self, name: &str) -> Option<PublicationId> {
        read(&self.publications).get(name).map(|p| p.id)
    }

    /// Id of an input by key
    pub fn input_id(&self, name: &str) -> Option<InputId> {
        if name.is_empty() {
            return None;
        }
        read(&self.inputs)
            .iter()
            .find(|i| i.info.name == name)
            .map(|i| i.info.id)
    }

    /// Publication record by id
    pub fn publication(&self, id: PublicationId) -> Option<PublicationInfo> {
        read(&self.publications)
            .get_index(id.0)
            .map(|(_, p)| p.clone())
    }

    /// Input record by id
    pub fn input(&self, id: InputId) -> Option<InputInfo> {
        read(&self.inputs).get(id.0).map(|i| i.info.clone())
    }

    /// Number of publications
    pub fn publication_count(&self) -> usize {
        read(&self.publications).len()
    }

    /// Number of inputs
    pub fn input_count(&self) -> usize {
        read(&self.inputs).len()
    }

    fn publication_handle(&self, id: PublicationId) -> Result<InterfaceHandle> {
        self.publication(id)
            .map(|p| p.handle)
            .ok_or_else(|| Error::InvalidIdentifier(format!("{} is out of range", id)))
    }

    fn input_handle(&self, id: InputId) -> Result<InterfaceHandle> {
        read(&self.inputs)
            .get(id.0)
            .map(|i| i.info.handle)
            .ok_or_else(|| Error::InvalidIdentifier(format!("{} is out of range", id)))
    }

    // ========================================================================
    // Data
    // ========================================================================

    /// Publish raw bytes
    ///
    /// Publications of a fixed-size type only accept payloads of exactly
    /// that size.
    pub fn publish(&self, core: &dyn Core, id: PublicationId, data: &[u8]) -> Result<()> {
        let publication = self
            .publication(id)
            .ok_or_else(|| Error::InvalidIdentifier(format!("{} is out of range", id)))?;
        if let Some(size) = publication.size {
            if data.len() != size {
                return Err(Error::InvalidParameter(format!(
                    "publication '{}' of type {} requires {} bytes, got {}",
                    publication.name,
                    publication.type_name,
                    size,
                    data.len()
                )));
            }
        }
        trace!(federate = %self.fed, %id, bytes = data.len(), "publish");
        core.set_value(publication.handle, data)
    }

    /// Value returned by an input that has never been updated
    pub fn set_default_value(&self, id: InputId, data: &[u8]) -> Result<()> {
        let mut inputs = write(&self.inputs);
        let input = inputs
            .get_mut(id.0)
            .ok_or_else(|| Error::InvalidIdentifier(format!("{} is out of range", id)))?;
        input.default_value = data.to_vec();
        Ok(())
    }

    /// Read the latest snapshot of an input and clear its update flag
    pub fn get_value(&self, id: InputId, now: Time) -> Result<Vec<u8>> {
        let mut inputs = write(&self.inputs);
        let input = inputs
            .get_mut(id.0)
            .ok_or_else(|| Error::InvalidIdentifier(format!("{} is out of range", id)))?;
        input.has_update = false;
        input.last_query = now;
        if input.value.is_empty() {
            Ok(input.default_value.clone())
        } else {
            Ok(input.value.clone())
        }
    }

    /// Whether an input changed since it was last read
    pub fn is_updated(&self, id: InputId) -> bool {
        read(&self.inputs)
            .get(id.0)
            .map(|i| i.has_update)
            .unwrap_or(false)
    }

    /// Time of the last update of an input
    pub fn last_update_time(&self, id: InputId) -> Option<Time> {
        read(&self.inputs).get(id.0).map(|i| i.last_update)
    }

    /// Time an input was last read
    pub fn last_query_time(&self, id: InputId) -> Option<Time> {
        read(&self.inputs).get(id.0).map(|i| i.last_query)
    }

    /// Inputs holding an unread update
    pub fn query_updates(&self) -> Vec<InputId> {
        read(&self.inputs)
            .iter()
            .filter(|i| i.has_update)
            .map(|i| i.info.id)
            .collect()
    }

    // ========================================================================
    // Callbacks
    // ========================================================================

    /// Callback for updates of inputs without their own callback
    pub fn set_catch_all_callback(&self, callback: ValueCallback) {
        *lock(&self.catch_all) = Some(callback);
    }

    /// Callback for one input
    pub fn set_input_callback(&self, id: InputId, callback: ValueCallback) -> Result<()> {
        let mut inputs = write(&self.inputs);
        let input = inputs
            .get_mut(id.0)
            .ok_or_else(|| Error::InvalidIdentifier(format!("{} is out of range", id)))?;
        input.callback = Some(callback);
        Ok(())
    }

    /// One callback shared by several inputs
    pub fn set_multi_input_callback(&self, ids: &[InputId], callback: ValueCallback) -> Result<()> {
        let mut inputs = write(&self.inputs);
        if let Some(bad) = ids.iter().find(|id| id.0 >= inputs.len()) {
            return Err(Error::InvalidIdentifier(format!("{} is out of range", bad)));
        }
        for id in ids {
            inputs[id.0].callback = Some(Arc::clone(&callback));
        }
        Ok(())
    }

    // ========================================================================
    // Time hooks
    // ========================================================================

    /// Resolve the publisher type of every input
    pub fn startup_to_initialize(&self, core: &dyn Core) {
        let mut inputs = write(&self.inputs);
        for input in inputs.iter_mut() {
            input.info.publisher_type = core.publisher_type(input.info.handle);
        }
    }

    /// Snapshot the inputs the Core reports as updated and fire callbacks
    pub fn update_time(&self, core: &dyn Core, new_time: Time, old_time: Time) {
        for input in write(&self.inputs).iter_mut() {
            input.has_update = false;
        }

        let updates = core.value_updates(self.fed);
        trace!(federate = %self.fed, %new_time, %old_time, updates = updates.len(), "value update");
        for handle in updates {
            let data = core.value(handle);
            let dispatch = {
                let mut inputs = write(&self.inputs);
                match inputs.iter_mut().find(|i| i.info.handle == handle) {
                    Some(input) => {
                        input.value = data;
                        input.last_update = new_time;
                        input.has_update = true;
                        Some((input.info.id, input.callback.clone()))
                    }
                    // message subscriptions share the handle space
                    None => None,
                }
            };
            let Some((id, callback)) = dispatch else {
                continue;
            };
            let callback = callback.or_else(|| lock(&self.catch_all).clone());
            if let Some(callback) = callback {
                callback(id, new_time);
            }
        }
    }
}

impl std::fmt::Debug for ValueExchangeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueExchangeManager")
            .field("fed", &self.fed)
            .field("publications", &self.publication_count())
            .field("inputs", &self.input_count())
            .finish()
    }
}
