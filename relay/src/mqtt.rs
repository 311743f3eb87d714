use crate::errors::{Error, Result};
use crate::hub::BroadcastHub;
use crate::metrics::{
    INGEST_LATENCY_SECONDS, INVALID_MESSAGES_TOTAL, MESSAGES_TOTAL, VALID_MESSAGES_TOTAL,
};
use crate::model::StoredReading;
use crate::store::ReadingStore;
use crate::validate::parse_reading;
use chrono::Utc;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub async fn run_mqtt(
    broker: String,
    port: u16,
    topic: String,
    client_id: String,
    store: Arc<dyn ReadingStore>,
    hub: Arc<BroadcastHub>,
) -> Result<()> {
    info!("Connecting to MQTT broker at {}:{}", broker, port);

    let mut mqtt_options = MqttOptions::new(client_id, broker, port);
    mqtt_options.set_keep_alive(std::time::Duration::from_secs(30));
    mqtt_options.set_clean_session(false);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 10000);

    client.subscribe(&topic, QoS::AtLeastOnce).await?;

    info!("Subscribed to {} with QoS 1", topic);

    loop {
        match eventloop.poll().await {
            Ok(notification) => {
                if let Event::Incoming(Packet::Publish(publish)) = notification {
                    MESSAGES_TOTAL.inc();

                    debug!(
                        "Received message on topic {}, size: {} bytes",
                        publish.topic,
                        publish.payload.len()
                    );

                    match process_message(&publish.payload, store.as_ref(), &hub).await {
                        Ok(seq) => {
                            VALID_MESSAGES_TOTAL.inc();
                            debug!(seq, "reading persisted and fanned out");
                        }
                        Err(Error::Validation(reasons)) => {
                            INVALID_MESSAGES_TOTAL.inc();
                            warn!("Rejected upstream payload: {}", reasons.join("; "));
                        }
                        Err(e) => {
                            error!("Failed to ingest reading: {}", e);
                        }
                    }
                }
            }
            Err(e) => {
                error!("MQTT error: {}", e);
                // rumqttc automatically reconnects, so we just log and continue
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}

/// One message through the pipeline: validate, persist, then fan out.
/// A reading that fails to save is never broadcast.
pub async fn process_message(
    payload: &[u8],
    store: &dyn ReadingStore,
    hub: &BroadcastHub,
) -> Result<i64> {
    let start = Instant::now();

    let raw: Value = serde_json::from_slice(payload)
        .map_err(|e| Error::Validation(vec![format!("JSON parse error: {}", e)]))?;

    let reading = parse_reading(&raw, Utc::now()).map_err(Error::Validation)?;

    let seq = store.append(&reading).await?;

    let delivered = hub.publish(&StoredReading { seq, reading });
    INGEST_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
    debug!(seq, delivered, "fan-out complete");

    Ok(seq)
}
