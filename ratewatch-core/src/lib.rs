//! Ratewatch Core
//!
//! Platform-agnostic income-rate tracking: derives which activity the host is
//! engaged in, turns observed resource deltas into windowed rate samples, keeps
//! a bounded persisted history per activity, and ranks activities by their
//! rolling average. This crate has no UI or platform-specific dependencies.

pub mod cleanup;
pub mod config;
pub mod constants;
pub mod history;
pub mod key;
pub mod numbers;
pub mod readout;
pub mod registry;
pub mod scheduler;
pub mod selector;
pub mod session;
pub mod store;
pub mod windower;

// Re-export commonly used types
pub use cleanup::prune;
pub use config::{ConfigError, SamplingParams, SchemaVersion, TrackerConfig};
pub use history::SampleHistory;
pub use key::{ActivityKey, KeyParseError};
pub use readout::{ActiveStatus, BestStatus, Readout, format_rate};
pub use registry::{HostMode, HostState, KnownKeys, refresh_known_keys, resolve_active_key};
pub use scheduler::{RunStats, Scheduler};
pub use selector::{RateRow, SortDirection, active_average, average, best, rate_table};
pub use session::{TickError, TrackerSession};
pub use store::{MemoryStorage, PersistentStore, QuotaExceeded, StorageError, Store};
pub use windower::{AccumulationState, RateSample, RateWindower};

/// Trait for abstracting blob persistence.
/// Platform-specific implementations should provide this
pub trait SampleStorage {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read the blob stored under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn read_blob(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Overwrite the blob stored under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be written (e.g. quota exceeded).
    fn write_blob(&self, key: &str, blob: &str) -> Result<(), Self::Error>;
}

/// Trait for reading the host application's state.
///
/// The tracker never writes to the host. An `Err` means the host could not be
/// read at all this tick; unresolvable mode context is expressed inside
/// [`HostMode`] instead.
pub trait HostOracle {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Observe the current resource total, mode, and unlock progress
    ///
    /// # Errors
    ///
    /// Returns an error if the host is unavailable.
    fn observe(&self) -> Result<HostState, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    struct StaticHost(HostState);

    impl HostOracle for StaticHost {
        type Error = Infallible;

        fn observe(&self) -> Result<HostState, Self::Error> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn session_ticks_against_host_oracle() {
        let storage = MemoryStorage::new();
        let mut session = TrackerSession::new(storage.clone(), TrackerConfig::default());
        let host = StaticHost(HostState {
            mode: HostMode::Gym {
                leader: Some("Sabrina".into()),
            },
            unlocked_gyms: vec!["Sabrina".into()],
            ..HostState::default()
        });

        let readout = session.tick(&host).unwrap();
        assert_eq!(readout.active, Some(ActivityKey::gym("Sabrina")));
        assert_eq!(readout.active_status().to_string(), "Gym: Sabrina (Measuring…)");
        assert!(storage.raw("ratewatch.samples.v2").is_some());
    }
}
