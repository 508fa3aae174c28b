mod accessory;
mod config;
mod error;
mod mqtt;
mod purifier;

use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use accessory::{Characteristic, PurifierAccessory};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Starting purifier-to-mqtt bridge (mqtt={}:{}, purifier={} at {})",
        config.mqtt.broker_host,
        config.mqtt.broker_port,
        config.accessory.name,
        config.accessory.ip_address,
    );

    let mut accessory = match PurifierAccessory::new(&config.accessory, &config.purifier) {
        Ok(a) => a,
        Err(e) => {
            error!("Failed to create accessory {}: {}", config.accessory.name, e);
            std::process::exit(1);
        }
    };

    match accessory.refresh().await {
        Ok(()) => {
            for (characteristic, value) in accessory.values() {
                info!("  {}: {}", characteristic.code(), value);
            }
        }
        Err(e) => warn!("Initial refresh of {} failed: {}", accessory.name(), e),
    }
    accessory.start();

    let (mqtt_cmd_tx, mut mqtt_cmd_rx) = mpsc::channel::<mqtt::client::MqttMessage>(100);

    let mqtt_client = mqtt::client::MqttClient::new(&config);
    let state_rx = accessory.subscribe();
    let mqtt_handle = tokio::spawn(async move {
        mqtt_client.run(mqtt_cmd_tx, state_rx).await;
    });

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to register SIGTERM handler: {}", e);
            std::process::exit(1);
        }
    };

    let topic_prefix = config.mqtt.topic_prefix.clone();

    // Main loop: apply MQTT writes one at a time + handle shutdown
    loop {
        tokio::select! {
            Some(msg) = mqtt_cmd_rx.recv() => {
                let Some((topic_name, code)) = parse_command_topic(&msg.topic, &topic_prefix) else {
                    continue;
                };
                if topic_name != accessory.topic_name() {
                    warn!("Unknown accessory in command topic: {}", topic_name);
                    continue;
                }
                let Some(characteristic) = Characteristic::from_code(code) else {
                    warn!("Unknown characteristic in command topic: {}", code);
                    continue;
                };
                info!("Writing {}={} on {}", code, msg.payload, accessory.name());
                if let Err(e) = accessory.write(characteristic, &msg.payload).await {
                    error!("Write {}={} failed: {}", code, msg.payload, e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
                break;
            }
        }
    }

    accessory.shutdown().await;
    mqtt_handle.abort();
    info!("purifier-to-mqtt bridge stopped");
}

/// Parse a command topic into (topic_name, characteristic code).
/// Expected format: {prefix}/{topic_name}/command/{code}
fn parse_command_topic<'a>(topic: &'a str, prefix: &str) -> Option<(&'a str, &'a str)> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix('/')?;
    let (topic_name, rest) = rest.split_once('/')?;
    let code = rest.strip_prefix("command/")?;
    if topic_name.is_empty() || code.is_empty() {
        return None;
    }
    Some((topic_name, code))
}
