// Filters and translators wired through a federate

use cosim_core::{FnFilterOperator, LoopbackCore};
use cosim_federate::{
    Error, Federate, FederateInfo, FilterKind, IterationRequest, Message, Time, TranslatorKind,
};
use std::sync::Arc;

fn federate(core: &Arc<LoopbackCore>, name: &str) -> Federate {
    Federate::new(core.clone(), FederateInfo::new(name)).unwrap()
}

#[test]
fn test_close_disconnect_keeps_filter_records() {
    let core = LoopbackCore::shared();
    let fed = federate(&core, "filters");
    let first = fed.register_filter(FilterKind::Delay, "slow").unwrap();
    let second = fed.register_filter(FilterKind::RandomDrop, "lossy").unwrap();
    fed.enter_executing_mode(IterationRequest::NoIterations).unwrap();

    fed.close_all_connectors();
    fed.disconnect_all_connectors();
    fed.disconnect();

    assert_eq!(fed.filter_count(), 2);
    assert!(core.is_closed(first.handle));
    assert!(core.is_closed(second.handle));
    assert!(fed.filter("slow").unwrap().disconnected);
    // lookups never fail, they just come back empty
    assert!(fed.filter("missing").is_none());
    assert!(fed.filter_at(7).is_none());
}

#[test]
fn test_duplicate_filter_name_rejected() {
    let core = LoopbackCore::shared();
    let fed = federate(&core, "dups");
    fed.register_filter(FilterKind::Delay, "f").unwrap();
    assert!(matches!(
        fed.register_filter(FilterKind::Reroute, "f"),
        Err(Error::RegistrationFailure(_))
    ));
    assert_eq!(fed.filter_count(), 1);
}

#[test]
fn test_blank_filter_name_uses_core_name() {
    let core = LoopbackCore::shared();
    let fed = federate(&core, "anon");
    let filter = fed.register_filter(FilterKind::Delay, "").unwrap();
    assert!(!filter.name.is_empty());
    assert_eq!(fed.filter(&filter.name).unwrap().handle, filter.handle);
    assert_eq!(fed.filter_at(0).unwrap().name, filter.name);
}

#[test]
fn test_delay_filter_on_source() {
    let core = LoopbackCore::shared();
    let a = federate(&core, "a");
    let b = federate(&core, "b");
    let out = a.messages().unwrap().register_endpoint("out", "").unwrap();
    let inbox = b.messages().unwrap().register_endpoint("in", "").unwrap();
    a.register_filter(FilterKind::Delay, "lag").unwrap();
    a.set_connector_property("lag", "delay", 2.0).unwrap();
    a.add_connector_source_target("lag", "a/out").unwrap();

    a.enter_executing_mode(IterationRequest::NoIterations).unwrap();
    b.enter_executing_mode(IterationRequest::NoIterations).unwrap();
    a.messages().unwrap().send(out, "b/in", b"late").unwrap();

    b.request_time(Time::from_secs(1.0)).unwrap();
    assert!(!b.messages().unwrap().has_message());
    b.request_time(Time::from_secs(3.0)).unwrap();
    let msg = b.messages().unwrap().get_message(inbox).unwrap();
    assert_eq!(msg.time, Time::from_secs(2.0));
}

#[test]
fn test_reroute_filter_with_condition() {
    let core = LoopbackCore::shared();
    let fed = federate(&core, "net");
    let messages = fed.messages().unwrap();
    let src = messages.register_endpoint("src", "").unwrap();
    let normal = messages.register_endpoint("normal", "").unwrap();
    let audit = messages.register_endpoint("audit", "").unwrap();
    let secret = messages.register_endpoint("secret", "").unwrap();

    fed.register_filter(FilterKind::Reroute, "tap").unwrap();
    fed.set_connector_string("tap", "newdestination", "net/audit").unwrap();
    fed.set_connector_string("tap", "condition", "secret$").unwrap();
    assert!(matches!(
        fed.set_connector_string("tap", "condition", "(unclosed"),
        Err(Error::InvalidParameter(_))
    ));
    fed.add_connector_source_target("tap", "net/src").unwrap();
    fed.enter_executing_mode(IterationRequest::NoIterations).unwrap();

    messages.send(src, "net/normal", b"plain").unwrap();
    messages.send(src, "net/secret", b"hidden").unwrap();
    fed.request_time(Time::from_secs(1.0)).unwrap();

    assert_eq!(messages.pending_messages_for(normal), 1);
    assert_eq!(messages.pending_messages_for(secret), 0);
    let diverted = messages.get_message(audit).unwrap();
    assert_eq!(diverted.data, b"hidden".to_vec());
    assert_eq!(diverted.original_dest, "net/secret");
}

#[test]
fn test_clone_filter_copies_messages() {
    let core = LoopbackCore::shared();
    let fed = federate(&core, "cc");
    let messages = fed.messages().unwrap();
    let src = messages.register_endpoint("src", "").unwrap();
    let dst = messages.register_endpoint("dst", "").unwrap();
    let copy = messages.register_endpoint("copy", "").unwrap();

    fed.register_filter(FilterKind::Clone, "cloner").unwrap();
    fed.set_connector_string("cloner", "delivery", "cc/copy").unwrap();
    fed.add_connector_source_target("cloner", "cc/src").unwrap();
    fed.enter_executing_mode(IterationRequest::NoIterations).unwrap();

    messages.send(src, "cc/dst", b"twice").unwrap();
    fed.request_time(Time::from_secs(1.0)).unwrap();

    assert_eq!(messages.get_message(dst).unwrap().data, b"twice".to_vec());
    assert_eq!(messages.get_message(copy).unwrap().data, b"twice".to_vec());
}

#[test]
fn test_custom_filter_operator() {
    let core = LoopbackCore::shared();
    let fed = federate(&core, "custom");
    let messages = fed.messages().unwrap();
    let src = messages.register_endpoint("src", "").unwrap();
    let dst = messages.register_endpoint("dst", "").unwrap();

    fed.register_filter(FilterKind::Custom, "upper").unwrap();
    fed.set_filter_operator(
        "upper",
        Arc::new(FnFilterOperator(|mut m: Message| {
            m.data = m.data.to_ascii_uppercase();
            Some(m)
        })),
    )
    .unwrap();
    fed.add_connector_destination_target("upper", "custom/dst").unwrap();
    fed.enter_executing_mode(IterationRequest::NoIterations).unwrap();

    messages.send(src, "custom/dst", b"shout").unwrap();
    fed.request_time(Time::from_secs(1.0)).unwrap();
    assert_eq!(messages.get_message(dst).unwrap().data, b"SHOUT".to_vec());
}

#[test]
fn test_json_translator_turns_value_into_message() {
    let core = LoopbackCore::shared();
    let source = federate(&core, "meter");
    let sink = federate(&core, "recorder");
    let out = source.values().unwrap().register_publication("kw", "", "").unwrap();
    let inbox = sink.messages().unwrap().register_endpoint("in", "").unwrap();

    source
        .register_translator(TranslatorKind::Json, "to_json", "", "")
        .unwrap();
    source.add_connector_source_target("to_json", "meter/kw").unwrap();
    source.add_connector_destination_target("to_json", "recorder/in").unwrap();

    source.enter_executing_mode(IterationRequest::NoIterations).unwrap();
    sink.enter_executing_mode(IterationRequest::NoIterations).unwrap();
    source.values().unwrap().publish(out, b"4.2").unwrap();
    sink.request_time(Time::from_secs(1.0)).unwrap();

    let msg = sink.messages().unwrap().get_message(inbox).unwrap();
    assert_eq!(msg.data_as_string(), r#"{"value":"4.2"}"#);
    assert_eq!(source.translator_count(), 1);
}

#[test]
fn test_connector_registration_requires_startup() {
    let core = LoopbackCore::shared();
    let fed = federate(&core, "late");
    fed.enter_initializing_mode().unwrap();
    assert!(matches!(
        fed.register_translator(TranslatorKind::Binary, "t", "", ""),
        Err(Error::InvalidFunctionCall(_))
    ));
    assert!(matches!(
        fed.register_cloning_filter("c"),
        Err(Error::InvalidFunctionCall(_))
    ));
}
