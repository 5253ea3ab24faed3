// Property-based tests for interface ids
//
// Publications, inputs and endpoints get the ordinal of their registration
// call as id, and the record behind an id is the one registered.

use cosim_core::LoopbackCore;
use cosim_federate::{EndpointId, Federate, FederateInfo, InputId, PublicationId};
use proptest::prelude::*;
use std::collections::HashSet;

fn unique_keys() -> impl Strategy<Value = Vec<String>> {
    prop::collection::hash_set("[a-z][a-z0-9_]{0,11}", 1..24)
        .prop_map(|keys: HashSet<String>| keys.into_iter().collect())
}

proptest! {
    #[test]
    fn publication_ids_are_ordinals(keys in unique_keys()) {
        let fed = Federate::new(LoopbackCore::shared(), FederateInfo::new("gen")).unwrap();
        let values = fed.values().unwrap();

        for (i, key) in keys.iter().enumerate() {
            let id = values.register_publication(key, "double", "").unwrap();
            prop_assert_eq!(id, PublicationId(i));
        }
        prop_assert_eq!(values.publication_count(), keys.len());
        for (i, key) in keys.iter().enumerate() {
            let info = values.publication(PublicationId(i)).unwrap();
            prop_assert_eq!(info.name, format!("gen/{}", key));
            prop_assert_eq!(info.size, Some(9));
        }
        prop_assert!(values.publication(PublicationId(keys.len())).is_none());
    }

    #[test]
    fn input_and_endpoint_ids_are_independent_ordinals(keys in unique_keys()) {
        let fed = Federate::new(LoopbackCore::shared(), FederateInfo::new("mixed")).unwrap();
        let values = fed.values().unwrap();
        let messages = fed.messages().unwrap();

        for (i, key) in keys.iter().enumerate() {
            prop_assert_eq!(values.register_input(key, "", "").unwrap(), InputId(i));
            prop_assert_eq!(messages.register_endpoint(key, "").unwrap(), EndpointId(i));
        }
        for (i, key) in keys.iter().enumerate() {
            prop_assert_eq!(values.input_id(key), Some(InputId(i)));
            prop_assert_eq!(messages.endpoint_id(key), Some(EndpointId(i)));
        }
    }
}
