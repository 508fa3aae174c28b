use std::collections::HashMap;
use std::sync::Arc;

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::accessory::{Characteristic, characteristic_values};
use crate::config::Config;
use crate::purifier::sync::DeviceState;

pub struct MqttMessage {
    pub topic: String,
    pub payload: String,
}

pub struct MqttClient {
    client: AsyncClient,
    eventloop: EventLoop,
    config: Config,
}

impl MqttClient {
    pub fn new(config: &Config) -> Self {
        let mut mqttopts = MqttOptions::new(
            &config.mqtt.client_id,
            &config.mqtt.broker_host,
            config.mqtt.broker_port,
        );
        mqttopts.set_keep_alive(std::time::Duration::from_secs(30));

        if let (Some(user), Some(pass)) = (&config.mqtt.username, &config.mqtt.password) {
            mqttopts.set_credentials(user, pass);
        }

        // LWT: the broker marks the accessory offline if the bridge disappears
        let lwt = rumqttc::LastWill::new(
            config.status_topic(),
            "offline".as_bytes().to_vec(),
            QoS::AtLeastOnce,
            true,
        );
        mqttopts.set_last_will(lwt);

        let (client, eventloop) = AsyncClient::new(mqttopts, 100);

        Self {
            client,
            eventloop,
            config: config.clone(),
        }
    }

    /// Run the MQTT event loop. Subscribes to the command topic on connect,
    /// forwards incoming publish messages through command_tx, and publishes
    /// characteristic values whenever a new device snapshot arrives.
    pub async fn run(
        mut self,
        command_tx: mpsc::Sender<MqttMessage>,
        mut state_rx: watch::Receiver<Arc<DeviceState>>,
    ) {
        let command_topic = self.config.command_topic();
        let mut last_values: HashMap<Characteristic, String> = HashMap::new();

        loop {
            tokio::select! {
                event = self.eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                            info!("Connected to MQTT broker");

                            if let Err(e) = self
                                .client
                                .publish(self.config.status_topic(), QoS::AtLeastOnce, true, "online")
                                .await
                            {
                                error!("Failed to publish online status: {}", e);
                            }

                            if let Err(e) = self
                                .client
                                .subscribe(&command_topic, QoS::AtLeastOnce)
                                .await
                            {
                                error!("Failed to subscribe to {}: {}", command_topic, e);
                            }

                            // Republish everything after a (re)connect
                            last_values.clear();
                            let state = state_rx.borrow_and_update().clone();
                            publish_changes(&self.client, &self.config, &state, &mut last_values)
                                .await;
                        }
                        Ok(Event::Incoming(Incoming::Publish(publish))) => {
                            let payload = String::from_utf8_lossy(&publish.payload).to_string();
                            let msg = MqttMessage {
                                topic: publish.topic.clone(),
                                payload,
                            };
                            if command_tx.send(msg).await.is_err() {
                                warn!("Command channel closed");
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!("MQTT connection error: {}. Reconnecting...", e);
                            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        }
                    }
                }
                Ok(()) = state_rx.changed() => {
                    let state = state_rx.borrow_and_update().clone();
                    publish_changes(&self.client, &self.config, &state, &mut last_values).await;
                }
            }
        }
    }
}

async fn publish_changes(
    client: &AsyncClient,
    config: &Config,
    state: &DeviceState,
    last_values: &mut HashMap<Characteristic, String>,
) {
    for (characteristic, value) in changed_values(state, last_values) {
        let topic = config.state_topic(characteristic.code());
        info!("Publishing {}: {}", topic, value);
        if let Err(e) = client
            .publish(&topic, QoS::AtLeastOnce, true, value.as_bytes())
            .await
        {
            warn!("Failed to publish {}: {}", topic, e);
            continue;
        }
        last_values.insert(characteristic, value);
    }
}

/// Characteristic values that differ from what was last published.
fn changed_values(
    state: &DeviceState,
    last_values: &HashMap<Characteristic, String>,
) -> Vec<(Characteristic, String)> {
    characteristic_values(state)
        .into_iter()
        .filter(|(c, value)| last_values.get(c) != Some(value))
        .collect()
}
