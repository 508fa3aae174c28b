//! Accessory-facing view of the purifier.
//!
//! Characteristic reads are projections of the cached device state and never
//! touch the network. The only writable characteristic is power, which goes
//! through [`PurifierSync::set_power`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::config::{AccessoryConfig, PurifierConfig};
use crate::error::{Error, Result};
use crate::purifier::client::DeviceClient;
use crate::purifier::sync::{DeviceState, Poller, PurifierSync};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    Power,
    HumidifierActive,
    Temperature,
    Humidity,
}

impl Characteristic {
    pub const ALL: [Characteristic; 4] = [
        Characteristic::Power,
        Characteristic::HumidifierActive,
        Characteristic::Temperature,
        Characteristic::Humidity,
    ];

    /// Topic segment used for state and command topics.
    pub fn code(self) -> &'static str {
        match self {
            Characteristic::Power => "power",
            Characteristic::HumidifierActive => "humidifier",
            Characteristic::Temperature => "temperature",
            Characteristic::Humidity => "humidity",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    pub fn is_writable(self) -> bool {
        matches!(self, Characteristic::Power)
    }

    pub fn value_of(self, state: &DeviceState) -> CharacteristicValue {
        match self {
            Characteristic::Power => CharacteristicValue::Bool(state.control.power),
            Characteristic::HumidifierActive => {
                CharacteristicValue::Bool(state.control.humidifier)
            }
            Characteristic::Temperature => CharacteristicValue::Float(state.sensor.temperature),
            Characteristic::Humidity => CharacteristicValue::Float(state.sensor.humidity),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CharacteristicValue {
    Bool(bool),
    Float(f64),
}

impl fmt::Display for CharacteristicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CharacteristicValue::Bool(true) => f.write_str("ON"),
            CharacteristicValue::Bool(false) => f.write_str("OFF"),
            CharacteristicValue::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Parse a switch payload as sent by Home Assistant and friends.
fn parse_switch(payload: &str) -> Option<bool> {
    match payload.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" => Some(true),
        "false" | "0" | "off" => Some(false),
        _ => None,
    }
}

pub struct PurifierAccessory {
    name: String,
    topic_name: String,
    sync: Arc<PurifierSync>,
    poll_interval: Duration,
    poller: Option<Poller>,
}

impl PurifierAccessory {
    pub fn new(accessory: &AccessoryConfig, purifier: &PurifierConfig) -> Result<Self> {
        let client = DeviceClient::new(
            &accessory.ip_address,
            Duration::from_secs(purifier.http_timeout_secs),
        )?;
        let sync = PurifierSync::new(client, Duration::from_millis(purifier.freshness_ms));
        Ok(Self::with_sync(
            accessory,
            Arc::new(sync),
            Duration::from_secs(purifier.poll_interval_secs),
        ))
    }

    pub fn with_sync(
        accessory: &AccessoryConfig,
        sync: Arc<PurifierSync>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            name: accessory.name.clone(),
            topic_name: accessory.topic_name.clone(),
            sync,
            poll_interval,
            poller: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topic_name(&self) -> &str {
        &self.topic_name
    }

    /// Start background polling. Calling it twice keeps the running poller.
    pub fn start(&mut self) {
        if self.poller.is_none() {
            info!(
                "Polling {} every {:?} while stale",
                self.name, self.poll_interval
            );
            self.poller = Some(self.sync.spawn_poller(self.poll_interval));
        }
    }

    pub async fn shutdown(mut self) {
        if let Some(poller) = self.poller.take() {
            poller.shutdown().await;
        }
        info!("Accessory {} stopped", self.name);
    }

    pub async fn refresh(&self) -> Result<()> {
        self.sync.refresh().await
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<DeviceState>> {
        self.sync.subscribe()
    }

    pub fn read(&self, characteristic: Characteristic) -> CharacteristicValue {
        match characteristic {
            Characteristic::Power => CharacteristicValue::Bool(self.sync.current_power()),
            Characteristic::HumidifierActive => {
                CharacteristicValue::Bool(self.sync.current_humidifier_active())
            }
            Characteristic::Temperature => {
                CharacteristicValue::Float(self.sync.current_temperature())
            }
            Characteristic::Humidity => CharacteristicValue::Float(self.sync.current_humidity()),
        }
    }

    /// Formatted values of every characteristic from the cached state.
    pub fn values(&self) -> Vec<(Characteristic, String)> {
        characteristic_values(&self.sync.snapshot())
    }

    pub async fn write(&self, characteristic: Characteristic, payload: &str) -> Result<()> {
        if !characteristic.is_writable() {
            return Err(Error::ReadOnly(characteristic.code()));
        }
        let on = parse_switch(payload).ok_or_else(|| Error::InvalidPayload {
            characteristic: characteristic.code(),
            payload: payload.to_string(),
        })?;
        self.sync.set_power(on).await
    }
}

/// Formatted value of every characteristic, or nothing if the device has
/// never been read.
pub fn characteristic_values(state: &DeviceState) -> Vec<(Characteristic, String)> {
    if state.updated_at.is_none() {
        return Vec::new();
    }
    Characteristic::ALL
        .into_iter()
        .map(|c| (c, c.value_of(state).to_string()))
        .collect()
}
