//! MQTT ingestion pipeline: subscribe, decode, persist, detect, broadcast.
//!
//! All detector state lives inside the single [`router::IngestionRouter`]
//! driven by the connection event loop, so messages are handled strictly
//! one at a time and the state machines never race.

pub mod aggregate;
pub mod deviation;
pub mod freshness;
pub mod messages;
pub mod prediction;
pub mod router;

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use tracing::{error, info};

use crate::db::models::NewLogEntry;

/// A detector state transition to be written to the event log.
///
/// `acknowledges` carries a description pattern: before the entry is
/// inserted, matching unacknowledged entries are acknowledged so that a
/// resolved incident stops driving the composite status.
#[derive(Debug)]
pub struct TransitionLog {
    pub entry: NewLogEntry,
    pub acknowledges: Option<String>,
}

/// Drive the MQTT connection forever. Subscriptions are re-issued on every
/// CONNACK, so they survive broker reconnects.
pub async fn run(
    client: AsyncClient,
    mut eventloop: EventLoop,
    topics: Vec<String>,
    mut router: router::IngestionRouter,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Connected to MQTT broker");
                for topic in &topics {
                    if let Err(e) = client.subscribe(topic, QoS::AtLeastOnce).await {
                        error!(topic, error = %e, "Failed to subscribe");
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                router.handle_message(&publish.topic, &publish.payload).await;
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "MQTT connection error, retrying in 1s");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
