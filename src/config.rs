use serde::Deserialize;
use std::env;

use crate::purifier::sync::{FRESHNESS_WINDOW, POLL_INTERVAL};

#[derive(Debug, Clone)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub purifier: PurifierConfig,
    pub accessory: AccessoryConfig,
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
    pub client_id: String,
}

#[derive(Debug, Clone)]
pub struct PurifierConfig {
    pub poll_interval_secs: u64,
    /// How long a fetched state is trusted before the poller re-reads it.
    pub freshness_ms: u64,
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AccessoryConfig {
    pub name: String,
    /// Host (and optional port) of the purifier's HTTP API.
    pub ip_address: String,
    /// Sanitized name for use in MQTT topics (lowercase, spaces to underscores)
    pub topic_name: String,
}

#[derive(Deserialize)]
struct RawAccessory {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    ip_address: Option<String>,
}

fn env_required(key: &str) -> Result<String, String> {
    env::var(key).map_err(|_| format!("{key} environment variable is required"))
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let accessory_file = env_or_default("ACCESSORY_FILE", "accessory.json".to_string());
        let accessory = load_accessory(&accessory_file)?;

        let config = Self {
            mqtt: MqttConfig {
                broker_host: env_required("MQTT_BROKER_HOST")?,
                broker_port: env_or_default("MQTT_BROKER_PORT", 1883),
                username: env_optional("MQTT_USERNAME"),
                password: env_optional("MQTT_PASSWORD"),
                topic_prefix: env_or_default("MQTT_TOPIC_PREFIX", "purifier".to_string()),
                client_id: env_or_default("MQTT_CLIENT_ID", "purifier-to-mqtt".to_string()),
            },
            purifier: PurifierConfig {
                poll_interval_secs: env_or_default(
                    "PURIFIER_POLL_INTERVAL_SECS",
                    POLL_INTERVAL.as_secs(),
                ),
                freshness_ms: env_or_default(
                    "PURIFIER_FRESHNESS_MS",
                    FRESHNESS_WINDOW.as_millis() as u64,
                ),
                http_timeout_secs: env_or_default("PURIFIER_HTTP_TIMEOUT_SECS", 10),
            },
            accessory,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.mqtt.broker_host.is_empty() {
            return Err("MQTT_BROKER_HOST must not be empty".into());
        }
        if self.purifier.poll_interval_secs == 0 {
            return Err("PURIFIER_POLL_INTERVAL_SECS must be > 0".into());
        }
        if self.purifier.http_timeout_secs == 0 {
            return Err("PURIFIER_HTTP_TIMEOUT_SECS must be > 0".into());
        }
        Ok(())
    }

    pub fn status_topic(&self) -> String {
        format!(
            "{}/{}/bridge_status",
            self.mqtt.topic_prefix, self.accessory.topic_name
        )
    }

    pub fn state_topic(&self, code: &str) -> String {
        format!(
            "{}/{}/state/{}",
            self.mqtt.topic_prefix, self.accessory.topic_name, code
        )
    }

    pub fn command_topic(&self) -> String {
        format!(
            "{}/{}/command/#",
            self.mqtt.topic_prefix, self.accessory.topic_name
        )
    }
}

fn load_accessory(path: &str) -> Result<AccessoryConfig, String> {
    let content =
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read {path}: {e}"))?;
    parse_accessory(&content).map_err(|e| format!("{path}: {e}"))
}

fn parse_accessory(content: &str) -> Result<AccessoryConfig, String> {
    let raw: RawAccessory =
        serde_json::from_str(content).map_err(|e| format!("Failed to parse accessory: {e}"))?;

    let ip_address = raw
        .ip_address
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .ok_or_else(|| "Accessory missing 'ip_address' field".to_string())?;

    let name = raw
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| ip_address.clone());
    let topic_name = sanitize_topic_name(&name);

    Ok(AccessoryConfig {
        name,
        ip_address,
        topic_name,
    })
}

/// Convert an accessory name into a safe MQTT topic segment.
/// "Living Room Purifier" → "living_room_purifier"
fn sanitize_topic_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}
