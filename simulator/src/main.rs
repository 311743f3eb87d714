mod payload;

use clap::{Parser, ValueEnum};
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Quiet structural readings.
    StructuralNormal,
    /// Structural stress, device faults and environmental extremes.
    StructuralDanger,
    /// Irrigation controller readings.
    Environmental,
}

/// Publishes synthetic device telemetry to the relay's MQTT topic.
#[derive(Debug, Parser)]
struct Args {
    #[arg(long, env = "MQTT_BROKER", default_value = "localhost")]
    broker: String,

    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    port: u16,

    #[arg(long, env = "MQTT_TOPIC", default_value = "iot")]
    topic: String,

    /// Publish interval, matching the firmware's cadence.
    #[arg(long, env = "INTERVAL_MS", default_value_t = 2000)]
    interval_ms: u64,

    #[arg(long, value_enum, default_value = "structural-normal")]
    scenario: Scenario,

    #[arg(long, default_value = "shm-node-alpha-01")]
    device: String,

    #[arg(long, default_value = "bridge-span-north")]
    location: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting telemetry simulator");
    info!(
        "Broker: {}:{}, topic: {}, scenario: {:?}, every {}ms",
        args.broker, args.port, args.topic, args.scenario, args.interval_ms
    );

    let client_id = format!("sim-{}", uuid::Uuid::new_v4());
    let mut mqtt_options = MqttOptions::new(&client_id, &args.broker, args.port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);

    // Spawn eventloop handler
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT eventloop error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    tokio::time::sleep(Duration::from_secs(2)).await;

    info!("Connected to MQTT broker, publishing telemetry");

    let mut rng = rand::thread_rng();
    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval_ms));
    let mut counter = 0u64;

    loop {
        ticker.tick().await;

        let json = match args.scenario {
            Scenario::StructuralNormal => serde_json::to_string(&payload::structural_normal(
                &mut rng,
                &args.device,
                &args.location,
            )),
            Scenario::StructuralDanger => serde_json::to_string(&payload::structural_danger(
                &mut rng,
                &args.device,
                &args.location,
            )),
            Scenario::Environmental => {
                serde_json::to_string(&payload::environmental(&mut rng, &args.device))
            }
        };

        let json = match json {
            Ok(j) => j,
            Err(e) => {
                error!("Failed to serialize payload: {}", e);
                continue;
            }
        };

        match client.publish(&args.topic, QoS::AtLeastOnce, false, json).await {
            Ok(_) => {
                counter += 1;
                if counter % 30 == 0 {
                    info!("Published {} messages", counter);
                }
            }
            Err(e) => {
                warn!("Failed to publish: {}", e);
            }
        }
    }
}
