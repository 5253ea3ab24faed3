//! Ping Pong Example
//!
//! Two federates share an in-process LoopbackCore. `ping` sends a message
//! every step and publishes its rally count; `pong` answers each message
//! from an endpoint callback and reads the count through a subscription.
//!
//! Run with `RUST_LOG=debug` to see the runtime's state transitions.

use cosim_core::LoopbackCore;
use cosim_federate::{EndpointId, Federate, FederateInfo, IterationRequest, Time};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const ROUNDS: u32 = 5;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Cosim Ping Pong Example ===\n");

    let configs: Vec<FederateInfo> = ron::from_str(include_str!("../federates.ron"))?;
    let [ping_info, pong_info]: [FederateInfo; 2] = configs
        .try_into()
        .map_err(|_| "federates.ron must describe exactly two federates")?;

    let core = LoopbackCore::shared();
    let ping = Federate::new(core.clone(), ping_info)?;
    let pong = Arc::new(Federate::new(core.clone(), pong_info)?);

    // ping: an endpoint and a publication
    let ping_port = ping.messages()?.register_endpoint("port", "")?;
    let rally = ping.values()?.register_publication("rally", "", "")?;

    // pong: an endpoint answering every message, and a subscription to the rally count
    let pong_port = pong.messages()?.register_endpoint("port", "")?;
    let count = pong.values()?.register_subscription("ping/rally", "")?;
    let responder = Arc::downgrade(&pong);
    pong.messages()?.set_endpoint_callback(
        pong_port,
        Arc::new(move |port: EndpointId, time: Time| {
            let Some(pong) = responder.upgrade() else {
                return;
            };
            let Ok(messages) = pong.messages() else {
                return;
            };
            while let Some(msg) = messages.get_message(port) {
                println!("  [{}] pong got '{}'", time, msg.data_as_string());
                let reply = msg.data_as_string().replace("ping", "pong");
                if let Err(e) = messages.send(port, &msg.source, reply.as_bytes()) {
                    tracing::warn!(error = %e, "pong could not reply");
                }
            }
        }),
    )?;

    ping.enter_executing_mode(IterationRequest::NoIterations)?;
    pong.enter_executing_mode(IterationRequest::NoIterations)?;
    println!(
        "Federation: {} ({} federates)\n",
        ping.query_target("federation", "federates"),
        ping.query_target("federation", "federate_count")
    );

    for round in 1..=ROUNDS {
        let payload = format!("ping #{}", round);
        ping.messages()?.send(ping_port, "pong/port", payload.as_bytes())?;
        ping.values()?.publish(rally, round.to_string().as_bytes())?;

        let next = ping.current_time() + Time::from_secs(0.1);
        let granted = pong.request_time(next)?;
        let values = pong.values()?;
        if values.is_updated(count) {
            let seen = values.get_value(count)?;
            println!("  [{}] pong sees rally {}", granted, String::from_utf8_lossy(&seen));
        }

        ping.request_time(next)?;
        while let Some(reply) = ping.messages()?.get_message(ping_port) {
            println!("  [{}] ping got '{}'\n", ping.current_time(), reply.data_as_string());
        }
    }

    ping.log_message(1, "rally finished");
    ping.finalize()?;
    pong.finalize()?;

    println!(
        "Done: ping at {}, pong at {}, {} messages left in flight",
        ping.current_time(),
        pong.current_time(),
        core.messages_in_flight()
    );
    Ok(())
}
