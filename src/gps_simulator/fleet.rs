use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::{ConfigError, SimulatorConfig};

use super::codec::DeviceIdentity;
use super::connector::{Connector, TcpConnector};
use super::device::{Device, DeviceStats};
use super::location::LocationSampler;

/// A set of independent devices sharing nothing but the connector.
pub struct Fleet<C: Connector = TcpConnector> {
    devices: Vec<Device>,
    connector: Arc<C>,
    reconnect_delay: Duration,
}

impl Fleet<TcpConnector> {
    pub fn from_config(config: &SimulatorConfig) -> Result<Self, ConfigError> {
        Self::with_connector(config, TcpConnector)
    }
}

impl<C: Connector> Fleet<C> {
    /// Builds `config.devices` devices. Each gets its own RNG, derived from
    /// `config.seed` when one is set.
    pub fn with_connector(config: &SimulatorConfig, connector: C) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut seeder = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let fixed_identities = config.parsed_identities()?;
        let settings = config.session_settings();

        let devices = (0..config.devices)
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(seeder.gen());
                let identity = fixed_identities
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| DeviceIdentity::random(&mut rng));
                let sampler = LocationSampler::new(
                    config.base_latitude,
                    config.base_longitude,
                    config.jitter_degrees,
                    rng,
                );
                Device::new(identity, settings.clone(), sampler)
            })
            .collect();

        Ok(Self {
            devices,
            connector: Arc::new(connector),
            reconnect_delay: config.reconnect_delay(),
        })
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Runs every device until `shutdown` flips to `true` (or its sender is
    /// dropped), then returns the per-device statistics.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Vec<DeviceStats> {
        let Fleet {
            devices,
            connector,
            reconnect_delay,
        } = self;

        info!(devices = devices.len(), "starting fleet");
        let mut tasks = JoinSet::new();
        for device in devices {
            tasks.spawn(supervise(
                device,
                Arc::clone(&connector),
                reconnect_delay,
                shutdown.clone(),
            ));
        }

        let mut stats = Vec::new();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(device_stats) => stats.push(device_stats),
                Err(e) => error!(error = %e, "device task failed"),
            }
        }

        for device_stats in &stats {
            match serde_json::to_string(device_stats) {
                Ok(line) => info!(summary = %line, "device finished"),
                Err(e) => warn!(error = %e, "failed to serialize device stats"),
            }
        }
        stats
    }
}

/// Keeps one device connected forever: every failed session is logged and
/// retried after `reconnect_delay` with the same identity.
pub async fn supervise<C: Connector>(
    mut device: Device,
    connector: Arc<C>,
    reconnect_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> DeviceStats {
    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        tokio::select! {
            result = device.run_session(connector.as_ref()) => {
                if let Err(e) = result {
                    warn!(
                        identity = %device.identity(),
                        error = %e,
                        retry_in_ms = reconnect_delay.as_millis() as u64,
                        "disconnected, reconnecting"
                    );
                }
            }
            _ = shutdown.changed() => break,
        }

        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    info!(identity = %device.identity(), "device stopped");
    device.into_stats()
}
