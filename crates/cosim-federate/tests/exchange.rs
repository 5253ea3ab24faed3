// Value and message exchange between federates sharing a LoopbackCore

use cosim_core::LoopbackCore;
use cosim_federate::{
    Error, Federate, FederateInfo, FederateState, InputId, IterationRequest, IterationResult,
    Message, Time,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

fn federate(core: &Arc<LoopbackCore>, name: &str) -> Federate {
    Federate::new(core.clone(), FederateInfo::new(name)).unwrap()
}

fn start(feds: &[&Federate]) {
    for fed in feds {
        fed.enter_executing_mode(IterationRequest::NoIterations).unwrap();
    }
}

#[test]
fn test_is_updated_only_for_reported_inputs() {
    let core = LoopbackCore::shared();
    let source = federate(&core, "source");
    let sink = federate(&core, "sink");

    let pubs = source.values().unwrap();
    let a = pubs.register_publication("a", "", "").unwrap();
    let _b = pubs.register_publication("b", "", "").unwrap();
    let subs = sink.values().unwrap();
    let in_a = subs.register_subscription("source/a", "").unwrap();
    let in_b = subs.register_subscription("source/b", "").unwrap();
    start(&[&source, &sink]);

    source.values().unwrap().publish(a, b"1").unwrap();
    sink.request_time(Time::from_secs(1.0)).unwrap();
    let values = sink.values().unwrap();
    assert!(values.is_updated(in_a));
    assert!(!values.is_updated(in_b));
    assert_eq!(values.last_update_time(in_a), Some(Time::from_secs(1.0)));

    // nothing published in the next step: the flag does not survive it
    sink.request_time(Time::from_secs(2.0)).unwrap();
    assert!(!values.is_updated(in_a));
    assert!(values.query_updates().is_empty());
}

#[test]
fn test_publish_size_checks() {
    let core = LoopbackCore::shared();
    let fed = federate(&core, "sizes");
    let values = fed.values().unwrap();
    let scalar = values.register_publication("x", "double", "").unwrap();
    let blob = values.register_publication("raw", "", "").unwrap();
    start(&[&fed]);

    assert!(matches!(
        values.publish(scalar, &[0u8; 8]),
        Err(Error::InvalidParameter(_))
    ));
    values.publish(scalar, &[0u8; 9]).unwrap();
    values.publish(blob, &[1, 2, 3]).unwrap();
    values.publish(blob, &[]).unwrap();
}

#[test]
fn test_get_any_message_scans_in_registration_order() {
    let core = LoopbackCore::shared();
    let fed = federate(&core, "fed");
    let messages = fed.messages().unwrap();
    let e0 = messages.register_endpoint("e0", "").unwrap();
    let e1 = messages.register_endpoint("e1", "").unwrap();
    let e2 = messages.register_endpoint("e2", "").unwrap();
    start(&[&fed]);

    core.inject_message("fed/e1", Message::new("remote/out", "", b"payload".to_vec()))
        .unwrap();
    fed.request_time(Time::from_secs(1.0)).unwrap();

    assert!(!messages.has_message_for(e0));
    assert!(!messages.has_message_for(e2));
    let msg = messages.get_any_message().unwrap();
    assert_eq!(msg.dest, "fed/e1");
    assert_eq!(msg.data, b"payload".to_vec());
    assert!(!messages.has_message());
    assert_eq!(messages.get_message(e1), None);
}

#[test]
fn test_messages_stay_fifo_per_endpoint() {
    let core = LoopbackCore::shared();
    let a = federate(&core, "a");
    let b = federate(&core, "b");
    let out = a.messages().unwrap().register_endpoint("out", "").unwrap();
    let inbox = b.messages().unwrap().register_endpoint("in", "").unwrap();
    start(&[&a, &b]);

    for i in 0..5u8 {
        a.messages().unwrap().send(out, "b/in", &[i]).unwrap();
    }
    b.request_time(Time::from_secs(1.0)).unwrap();

    let messages = b.messages().unwrap();
    assert_eq!(messages.pending_messages(), 5);
    let received: Vec<u8> = std::iter::from_fn(|| messages.get_message(inbox))
        .map(|m| m.data[0])
        .collect();
    assert_eq!(received, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_value_callback_may_reenter() {
    let core = LoopbackCore::shared();
    let source = federate(&core, "source");
    let sink = Arc::new(federate(&core, "sink"));

    let p0 = source.values().unwrap().register_publication("p0", "", "").unwrap();
    let p1 = source.values().unwrap().register_publication("p1", "", "").unwrap();
    let in0 = sink.values().unwrap().register_subscription("source/p0", "").unwrap();
    let in1 = sink.values().unwrap().register_subscription("source/p1", "").unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let weak: Weak<Federate> = Arc::downgrade(&sink);
    let log = Arc::clone(&seen);
    sink.values()
        .unwrap()
        .set_catch_all_callback(Arc::new(move |id: InputId, _: Time| {
            let Some(fed) = weak.upgrade() else { return };
            let values = fed.values().unwrap();
            // read every input from inside the callback
            let snapshot: Vec<Vec<u8>> = [in0, in1]
                .iter()
                .map(|input| values.get_value(*input).unwrap())
                .collect();
            log.lock().unwrap().push((id, snapshot));
        }));

    start(&[&source, &*sink]);
    source.values().unwrap().publish(p0, b"x").unwrap();
    source.values().unwrap().publish(p1, b"y").unwrap();
    sink.request_time(Time::from_secs(1.0)).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, in0);
    assert_eq!(seen[1].1, vec![b"x".to_vec(), b"y".to_vec()]);
}

#[test]
fn test_message_callback_may_send() {
    let core = LoopbackCore::shared();
    let echo = Arc::new(federate(&core, "echo"));
    let client = federate(&core, "client");

    let echo_ep = echo.messages().unwrap().register_endpoint("ep", "").unwrap();
    let client_ep = client.messages().unwrap().register_endpoint("ep", "").unwrap();

    let weak = Arc::downgrade(&echo);
    let handled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&handled);
    echo.messages()
        .unwrap()
        .set_endpoint_callback(
            echo_ep,
            Arc::new(move |ep: cosim_federate::EndpointId, _: Time| {
                let Some(fed) = weak.upgrade() else { return };
                let messages = fed.messages().unwrap();
                while let Some(msg) = messages.get_message(ep) {
                    messages.send(ep, &msg.source, &msg.data).unwrap();
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }),
        )
        .unwrap();

    start(&[&*echo, &client]);
    client.messages().unwrap().send(client_ep, "echo/ep", b"marco").unwrap();
    echo.request_time(Time::from_secs(1.0)).unwrap();
    client.request_time(Time::from_secs(1.0)).unwrap();

    assert_eq!(handled.load(Ordering::SeqCst), 1);
    let reply = client.messages().unwrap().get_message(client_ep).unwrap();
    assert_eq!(reply.data, b"marco".to_vec());
    assert_eq!(reply.source, "echo/ep");
}

#[test]
fn test_initialization_iteration_refreshes_values() {
    let core = LoopbackCore::shared();
    let source = federate(&core, "source");
    let sink = federate(&core, "sink");
    let out = source.values().unwrap().register_publication("init", "", "").unwrap();
    let input = sink.values().unwrap().register_subscription("source/init", "").unwrap();

    source.enter_initializing_mode().unwrap();
    sink.enter_initializing_mode().unwrap();
    source.values().unwrap().publish(out, b"seed").unwrap();

    core.script_iteration(sink.id(), [IterationResult::Iterating]);
    assert_eq!(
        sink.enter_executing_mode(IterationRequest::IterateIfNeeded).unwrap(),
        IterationResult::Iterating
    );
    assert!(sink.values().unwrap().is_updated(input));
    assert_eq!(sink.values().unwrap().get_value(input).unwrap(), b"seed".to_vec());
}

#[test]
fn test_subscribed_endpoint_and_input_see_the_same_update() {
    let core = LoopbackCore::shared();
    let sensor = federate(&core, "sensor");
    let station = federate(&core, "station");

    let temp = sensor.values().unwrap().register_publication("temp", "", "").unwrap();
    let input = station.values().unwrap().register_subscription("sensor/temp", "").unwrap();
    let messages = station.messages().unwrap();
    let log = messages.register_endpoint("log", "").unwrap();
    messages.subscribe(log, "sensor/temp", "").unwrap();

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    messages
        .set_endpoint_callback(
            log,
            Arc::new(move |_: cosim_federate::EndpointId, _: Time| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
    start(&[&sensor, &station]);

    sensor.values().unwrap().publish(temp, b"21.5").unwrap();
    station.request_time(Time::from_secs(1.0)).unwrap();

    let values = station.values().unwrap();
    assert!(values.is_updated(input));
    assert_eq!(values.get_value(input).unwrap(), b"21.5".to_vec());
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    let msg = messages.get_message(log).unwrap();
    assert_eq!(msg.source, "sensor/temp");
    assert_eq!(msg.dest, "station/log");
    assert_eq!(msg.data, b"21.5".to_vec());
    assert_eq!(msg.time, Time::from_secs(1.0));

    // no new publication, neither side sees anything
    station.request_time(Time::from_secs(2.0)).unwrap();
    assert!(!values.is_updated(input));
    assert!(!messages.has_message());
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
}

#[test]
fn test_halting_grant_delivers_last_values() {
    let core = LoopbackCore::shared();
    let source = federate(&core, "source");
    let sink = federate(&core, "sink");
    let out = source.values().unwrap().register_publication("final", "", "").unwrap();
    let input = sink.values().unwrap().register_subscription("source/final", "").unwrap();

    let updates = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&updates);
    sink.set_time_update_callback(Arc::new(move |time: Time, iterating: bool| {
        seen.lock().unwrap().push((time, iterating));
    }));
    start(&[&source, &sink]);
    updates.lock().unwrap().clear();

    source.values().unwrap().publish(out, b"last").unwrap();
    core.script_iteration(sink.id(), [IterationResult::Halted]);
    let it = sink
        .request_time_iterative(Time::from_secs(1.0), IterationRequest::NoIterations)
        .unwrap();

    assert_eq!(it.state, IterationResult::Halted);
    assert_eq!(it.granted_time, Time::from_secs(1.0));
    assert_eq!(sink.state(), FederateState::Finalize);
    assert_eq!(*updates.lock().unwrap(), vec![(Time::from_secs(1.0), false)]);
    let values = sink.values().unwrap();
    assert!(values.is_updated(input));
    assert_eq!(values.get_value(input).unwrap(), b"last".to_vec());
}
