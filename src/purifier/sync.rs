//! Cached device state and the policy deciding when it is refreshed.
//!
//! The coordinator keeps one `Arc<DeviceState>` inside a watch channel. A
//! refresh builds a complete new snapshot and swaps it in with a single
//! `send_if_modified`, so readers see either the old snapshot or the new one.
//! Failed refreshes leave the previous snapshot in place.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;

use super::client::DeviceClient;
use super::{ControlCommand, ControlInfo, SensorInfo};

pub const FRESHNESS_WINDOW: Duration = Duration::from_millis(5000);
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Last known device state. Replaced wholesale, never mutated in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    /// `None` until the first successful refresh.
    pub updated_at: Option<Instant>,
    pub control: ControlInfo,
    pub sensor: SensorInfo,
}

impl DeviceState {
    pub fn is_stale_at(&self, now: Instant, window: Duration) -> bool {
        match self.updated_at {
            Some(updated_at) => now.saturating_duration_since(updated_at) > window,
            None => true,
        }
    }
}

pub struct PurifierSync {
    client: DeviceClient,
    freshness: Duration,
    state: watch::Sender<Arc<DeviceState>>,
}

impl PurifierSync {
    pub fn new(client: DeviceClient, freshness: Duration) -> Self {
        let (state, _) = watch::channel(Arc::new(DeviceState::default()));
        Self {
            client,
            freshness,
            state,
        }
    }

    pub fn snapshot(&self) -> Arc<DeviceState> {
        self.state.borrow().clone()
    }

    /// Receiver notified after every successful refresh.
    pub fn subscribe(&self) -> watch::Receiver<Arc<DeviceState>> {
        self.state.subscribe()
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Instant::now())
    }

    pub fn is_stale_at(&self, now: Instant) -> bool {
        self.state.borrow().is_stale_at(now, self.freshness)
    }

    pub fn current_power(&self) -> bool {
        self.state.borrow().control.power
    }

    pub fn current_humidifier_active(&self) -> bool {
        self.state.borrow().control.humidifier
    }

    pub fn current_temperature(&self) -> f64 {
        self.state.borrow().sensor.temperature
    }

    pub fn current_humidity(&self) -> f64 {
        self.state.borrow().sensor.humidity
    }

    /// Fetch sensor and control info and replace the cached state.
    ///
    /// The snapshot is stamped with the time the fetch started. A refresh
    /// that started before the cached snapshot was taken is discarded, so a
    /// slow background read cannot overwrite a newer confirmed state.
    pub async fn refresh(&self) -> Result<()> {
        let started = Instant::now();
        let (sensor, control) = tokio::try_join!(
            self.client.fetch_sensor_info(),
            self.client.fetch_control_info(),
        )?;

        let replaced = self.state.send_if_modified(|state| {
            if state.updated_at.is_some_and(|prev| started < prev) {
                return false;
            }
            *state = Arc::new(DeviceState {
                updated_at: Some(started),
                control,
                sensor,
            });
            true
        });

        if replaced {
            debug!(
                "Refreshed purifier state: power={} humidifier={} temperature={} humidity={}",
                control.power, control.humidifier, sensor.temperature, sensor.humidity
            );
        } else {
            debug!("Discarded purifier state older than the cached snapshot");
        }
        Ok(())
    }

    /// Returns whether a refresh was performed.
    pub async fn refresh_if_stale(&self) -> Result<bool> {
        if !self.is_stale() {
            return Ok(false);
        }
        self.refresh().await?;
        Ok(true)
    }

    /// Send the power command, then re-read the device regardless of cache age.
    pub async fn set_power(&self, on: bool) -> Result<()> {
        info!("Setting purifier power {}", if on { "on" } else { "off" });
        self.client
            .send_control_command(ControlCommand { power: on })
            .await?;
        self.refresh().await
    }

    /// Spawn the background poller. It refreshes on each tick only while the
    /// cache is stale and logs failures instead of returning them.
    pub fn spawn_poller(self: &Arc<Self>, period: Duration) -> Poller {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_task(Arc::clone(self), period, cancel.clone()));
        Poller {
            cancel,
            handle: Some(handle),
        }
    }
}

async fn poll_task(sync: Arc<PurifierSync>, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                match sync.refresh_if_stale().await {
                    Ok(true) => debug!("Background refresh completed"),
                    Ok(false) => {}
                    Err(e) => warn!("Background refresh failed: {}", e),
                }
            }
        }
    }
    debug!("Purifier poller stopped");
}

/// Handle to the background poller. Dropping it cancels the task.
pub struct Poller {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Purifier poller task failed: {}", e);
            }
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
