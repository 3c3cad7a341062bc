//! Background status poller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, error, info, warn};

use eqiva_core::{Connector, Operation};

use crate::state::{AppState, StatusEntry};

/// Refreshes every known thermostat on a fixed interval.
pub struct Collector<C: Connector> {
    state: Arc<AppState<C>>,
    period: Duration,
}

impl<C: Connector + 'static> Collector<C> {
    pub fn new(state: Arc<AppState<C>>, period: Duration) -> Self {
        Self { state, period }
    }

    /// Spawn the polling loop and return immediately.
    pub fn start(self) {
        info!("Starting poller (interval: {}s)", self.period.as_secs());
        tokio::spawn(async move {
            self.run().await;
        });
    }

    async fn run(&self) {
        let mut interval_timer = interval(self.period);
        let mut failures: HashMap<String, u32> = HashMap::new();

        loop {
            interval_timer.tick().await;

            for (address, result) in self.poll_once().await {
                match result {
                    Ok(entry) => {
                        failures.remove(&address);
                        debug!(
                            "Polled {}: {:.1}°C, state {}",
                            address, entry.target_temperature, entry.current_heating_cooling_state
                        );
                    }
                    Err(e) => {
                        let consecutive = failures.entry(address.clone()).or_insert(0);
                        *consecutive += 1;
                        if *consecutive <= 3 {
                            warn!("Failed to poll {}: {} (attempt {})", address, e, consecutive);
                        } else if *consecutive == 4 {
                            error!(
                                "Failed to poll {} after {} attempts, will continue trying silently",
                                address, consecutive
                            );
                        }
                    }
                }
            }

            if let Err(e) = self.state.store.save().await {
                warn!("{}", e);
            }
        }
    }

    /// Read the status of every known thermostat once, one after another.
    pub async fn poll_once(&self) -> Vec<(String, Result<StatusEntry, CollectorError>)> {
        let addresses = self.state.store.addresses().await;
        let mut results = Vec::with_capacity(addresses.len());
        for address in addresses {
            let result = self.poll_device(&address).await;
            results.push((address, result));
        }
        results
    }

    async fn poll_device(&self, address: &str) -> Result<StatusEntry, CollectorError> {
        let report = self
            .state
            .run(address, &[Operation::Status])
            .await
            .map_err(CollectorError::Device)?;
        StatusEntry::from_state(&report.state).ok_or(CollectorError::NoStatus)
    }
}

/// Poller errors.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to read status: {0}")]
    Device(eqiva_core::Error),
    #[error("Device sent no status")]
    NoStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StatusStore;
    use eqiva_core::{
        Aliases, Controller, MockConnector, MockTransport, SimulatedThermostat, ThermostatOptions,
    };

    const LIVING: &str = "00:1A:22:00:00:01";
    const GONE: &str = "00:1A:22:00:00:09";

    fn state(store: StatusStore) -> (MockTransport, Arc<AppState<MockConnector>>) {
        let living = MockTransport::with_simulator(
            LIVING,
            SimulatedThermostat::default().manual(22.5),
        );
        let connector = MockConnector::new().with_device(living.clone());
        let controller = Controller::new(connector, Aliases::new(), ThermostatOptions::default());
        (living, AppState::new(controller, store))
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_refreshes_known_devices() {
        let (living, state) = state(StatusStore::in_memory());
        state.store.get_or_insert_default(LIVING).await;
        state.store.get_or_insert_default(GONE).await;

        let collector = Collector::new(Arc::clone(&state), Duration::from_secs(30));
        let results = collector.poll_once().await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, LIVING);
        let entry = results[0].1.as_ref().unwrap();
        assert_eq!(entry.target_heating_cooling_state, 1);
        assert_eq!(entry.target_temperature, 22.5);
        assert!(matches!(results[1].1, Err(CollectorError::Device(_))));

        assert_eq!(state.store.get(LIVING).await, Some(*entry));
        assert_eq!(state.store.get(GONE).await, Some(StatusEntry::default()));
        assert!(living.connect_count() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_poller_saves_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status_store.json");
        let (_, state) = state(StatusStore::open(&path));
        state.store.get_or_insert_default(LIVING).await;

        Collector::new(Arc::clone(&state), Duration::from_secs(30)).start();
        tokio::time::sleep(Duration::from_secs(5)).await;

        let saved = StatusStore::open(&path);
        let entry = saved.get(LIVING).await.unwrap();
        assert_eq!(entry.target_temperature, 22.5);
        assert_eq!(entry.current_temperature, 22.5);
    }
}
