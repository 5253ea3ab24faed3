// Lifecycle and time-advancement tests driven through LoopbackCore
//
// Covers:
// 1. Idempotent initializing-mode entry
// 2. Call-order violations leave the federate untouched
// 3. The single-outstanding async operation rule
// 4. Error propagation from the Core
// 5. Finalize and disconnect teardown

use cosim_federate::{
    Error, Federate, FederateInfo, FederateState, IterationRequest, IterationResult, Time,
};
use cosim_core::LoopbackCore;
use std::sync::{Arc, Mutex};

fn federate(core: &Arc<LoopbackCore>, name: &str) -> Federate {
    Federate::new(core.clone(), FederateInfo::new(name)).unwrap()
}

fn executing(core: &Arc<LoopbackCore>, name: &str) -> Federate {
    let fed = federate(core, name);
    fed.enter_executing_mode(IterationRequest::NoIterations).unwrap();
    fed
}

#[test]
fn test_enter_initializing_twice_is_idempotent() {
    let core = LoopbackCore::shared();
    let fed = federate(&core, "init");

    fed.enter_initializing_mode().unwrap();
    let time = fed.current_time();
    fed.enter_initializing_mode().unwrap();

    assert_eq!(fed.state(), FederateState::Initializing);
    assert_eq!(fed.current_time(), time);
}

#[test]
fn test_request_time_in_startup_fails() {
    let core = LoopbackCore::shared();
    let fed = federate(&core, "early");

    let err = fed.request_time(Time::from_secs(5.0)).unwrap_err();
    assert!(matches!(err, Error::InvalidFunctionCall(_)));
    assert_eq!(fed.current_time(), Time::ZERO);
    assert_eq!(fed.state(), FederateState::Startup);
}

#[test]
fn test_request_time_advances() {
    let core = LoopbackCore::shared();
    let fed = executing(&core, "stepper");

    for step in 1..=5 {
        let next = Time::from_secs(step as f64 * 0.1);
        assert_eq!(fed.request_time(next).unwrap(), next);
        assert_eq!(fed.current_time(), next);
    }
    assert_eq!(fed.query("current_time"), "0.5");
}

#[test]
fn test_period_rounds_grants_up() {
    let core = LoopbackCore::shared();
    let info = FederateInfo::new("periodic").with_period(Time::from_secs(1.0));
    let fed = Federate::new(core, info).unwrap();
    fed.enter_executing_mode(IterationRequest::NoIterations).unwrap();

    assert_eq!(fed.request_time(Time::from_secs(0.3)).unwrap(), Time::from_secs(1.0));
}

#[test]
fn test_double_request_time_async_fails() {
    let core = LoopbackCore::shared();
    let fed = executing(&core, "async");

    fed.request_time_async(Time::from_secs(1.0)).unwrap();
    assert_eq!(fed.state(), FederateState::PendingTime);
    assert!(matches!(
        fed.request_time_async(Time::from_secs(2.0)),
        Err(Error::InvalidFunctionCall(_))
    ));
    assert_eq!(fed.request_time_complete().unwrap(), Time::from_secs(1.0));
    assert_eq!(fed.state(), FederateState::Executing);
}

#[test]
fn test_async_grant_matches_blocking_grant() {
    let blocking_core = LoopbackCore::shared();
    let blocking = executing(&blocking_core, "blocking");
    let async_core = LoopbackCore::shared();
    let background = executing(&async_core, "background");

    for next in [0.25, 1.0, 0.5, 3.75] {
        let next = Time::from_secs(next);
        let expected = blocking.request_time(next).unwrap();

        background.request_time_async(next).unwrap();
        while !background.is_async_operation_completed() {
            std::thread::yield_now();
        }
        assert_eq!(background.request_time_complete().unwrap(), expected);
        assert_eq!(background.current_time(), blocking.current_time());
    }
}

#[test]
fn test_iterative_async() {
    let core = LoopbackCore::shared();
    let fed = executing(&core, "iter");
    core.script_iteration(fed.id(), [IterationResult::Iterating, IterationResult::NextStep]);

    fed.request_time_iterative_async(Time::from_secs(1.0), IterationRequest::IterateIfNeeded)
        .unwrap();
    let first = fed.request_time_iterative_complete().unwrap();
    assert_eq!(first.state, IterationResult::Iterating);
    assert_eq!(first.granted_time, Time::ZERO);

    let second = fed
        .request_time_iterative(Time::from_secs(1.0), IterationRequest::IterateIfNeeded)
        .unwrap();
    assert_eq!(second.state, IterationResult::NextStep);
    assert_eq!(second.granted_time, Time::from_secs(1.0));
}

#[test]
fn test_async_outside_executing_fails() {
    let core = LoopbackCore::shared();
    let fed = federate(&core, "notyet");
    assert!(matches!(
        fed.request_time_async(Time::from_secs(1.0)),
        Err(Error::InvalidFunctionCall(_))
    ));
    assert!(!fed.is_async_operation_completed());
    assert!(fed.request_time_complete().is_err());
}

#[test]
fn test_execution_failure_forces_error_state() {
    let core = LoopbackCore::shared();
    let fed = executing(&core, "doomed");
    core.fail_next_time_request(fed.id(), "broker gone");

    fed.request_time_async(Time::from_secs(1.0)).unwrap();
    let err = fed.request_time_complete().unwrap_err();
    assert_eq!(err, Error::ExecutionFailure("broker gone".to_string()));
    assert_eq!(fed.state(), FederateState::Error);
}

#[test]
fn test_finalize_completes_pending_operation() {
    let core = LoopbackCore::shared();
    let fed = executing(&core, "pending");

    fed.request_time_async(Time::from_secs(2.0)).unwrap();
    fed.finalize().unwrap();

    assert_eq!(fed.state(), FederateState::Finalize);
    assert_eq!(fed.current_time(), Time::from_secs(2.0));
    assert!(core.is_finalized(fed.id()));
}

#[test]
fn test_disconnect_never_fails() {
    let core = LoopbackCore::shared();
    let fed = executing(&core, "leaving");

    fed.disconnect();
    fed.disconnect();
    assert_eq!(fed.state(), FederateState::Finalize);
    assert!(!fed.is_attached());
    assert!(core.is_finalized(fed.id()));

    // later calls reach the empty core
    assert_eq!(fed.query("federates"), "#disconnected");
    assert!(fed.request_time(Time::from_secs(1.0)).is_err());
}

#[test]
fn test_disconnect_keeps_error_state() {
    let core = LoopbackCore::shared();
    let fed = executing(&core, "broken");
    fed.error(7, "solver diverged");
    assert!(!core.is_finalized(fed.id()));

    fed.disconnect();
    assert_eq!(fed.state(), FederateState::Error);
    assert!(!fed.is_attached());
    assert!(core.is_finalized(fed.id()));
}

#[test]
fn test_disconnect_after_execution_failure_finalizes_core() {
    let core = LoopbackCore::shared();
    let fed = executing(&core, "crashed");
    core.fail_next_time_request(fed.id(), "peer lost");
    assert!(fed.request_time(Time::from_secs(1.0)).is_err());
    assert_eq!(fed.state(), FederateState::Error);

    fed.disconnect();
    fed.disconnect();
    assert!(core.is_finalized(fed.id()));
    assert_eq!(fed.state(), FederateState::Error);
}

#[test]
fn test_pending_state_is_announced_with_its_task_stored() {
    let core = LoopbackCore::shared();
    let fed = Arc::new(executing(&core, "eager"));
    let weak = Arc::downgrade(&fed);
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&outcomes);
    fed.set_mode_update_callback(Arc::new(move |new: FederateState, _old: FederateState| {
        if new != FederateState::PendingTime {
            return;
        }
        let Some(fed) = weak.upgrade() else { return };
        let outcome = fed.request_time_complete();
        sink.lock().unwrap().push(outcome);
    }));

    fed.request_time_async(Time::from_secs(1.0)).unwrap();

    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(*outcomes[0].as_ref().unwrap(), Time::from_secs(1.0));
    assert_eq!(fed.state(), FederateState::Executing);
    assert_eq!(fed.current_time(), Time::from_secs(1.0));
}

#[test]
fn test_async_query() {
    let core = LoopbackCore::shared();
    let a = federate(&core, "a");
    let _b = federate(&core, "b");

    let count = a.query_async("federation", "federate_count").unwrap();
    let names = a.query_async("root", "federates").unwrap();
    assert_eq!(a.query_complete(names), "[a;b]");
    assert_eq!(a.query_complete(count), "2");
    assert!(!a.is_query_completed(count));
}
