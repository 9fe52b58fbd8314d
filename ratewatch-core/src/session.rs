//! Tick-driving context object that owns all tracker state.
use thiserror::Error;

use crate::cleanup::prune;
use crate::config::TrackerConfig;
use crate::constants::LOG_TARGET;
use crate::key::ActivityKey;
use crate::readout::Readout;
use crate::registry::{HostState, KnownKeys, refresh_known_keys, resolve_active_key};
use crate::selector::{self, RateRow, SortDirection};
use crate::store::{PersistentStore, Store};
use crate::windower::{AccumulationState, RateSample, RateWindower};
use crate::{HostOracle, SampleStorage};

/// Reasons a tick was abandoned.
#[derive(Debug, Error)]
pub enum TickError<E: std::error::Error + 'static> {
    #[error("host oracle unavailable: {0}")]
    Host(#[source] E),
}

/// Context object owning all tracker state for one process lifetime.
///
/// Only completed samples are durable; the accumulation window and the
/// resource baseline are lost when the session is dropped.
pub struct TrackerSession<S: SampleStorage> {
    persistence: PersistentStore<S>,
    store: Store,
    known: KnownKeys,
    windower: RateWindower,
    last_total: Option<f64>,
    sort: SortDirection,
    last_readout: Readout,
}

impl<S: SampleStorage> TrackerSession<S> {
    /// Load persisted samples and start an empty session around them.
    ///
    /// Trainer keys that already carry samples are registered as known, since
    /// nothing else ever registers them.
    #[must_use]
    pub fn new(storage: S, config: TrackerConfig) -> Self {
        let params = config.params();
        let persistence =
            PersistentStore::new(storage, config.storage_key(), params.history_capacity);
        let store = persistence.load();
        let known: KnownKeys = store.keys().filter(|key| key.is_trainer()).cloned().collect();
        log::debug!(
            target: LOG_TARGET,
            "loaded {} histories from '{}' (schema {})",
            store.len(),
            persistence.storage_key(),
            config.schema
        );
        Self {
            sort: config.sort,
            windower: RateWindower::new(params.accumulation_window),
            persistence,
            store,
            known,
            last_total: None,
            last_readout: Readout::default(),
        }
    }

    /// Run one tick against the host, logging and swallowing any failure.
    pub fn tick<O: HostOracle>(&mut self, oracle: &O) -> Option<Readout> {
        match self.try_tick(oracle) {
            Ok(readout) => Some(readout),
            Err(err) => {
                log::error!(target: LOG_TARGET, "tick abandoned: {err}");
                None
            }
        }
    }

    /// Run one tick against the host.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot be observed. The tick then counts
    /// as one without an active key: the partial window is dropped and the
    /// next good observation only sets a new baseline.
    pub fn try_tick<O: HostOracle>(&mut self, oracle: &O) -> Result<Readout, TickError<O::Error>> {
        match oracle.observe() {
            Ok(host) => Ok(self.tick_with_state(&host)),
            Err(err) => {
                self.abandon_tick();
                Err(TickError::Host(err))
            }
        }
    }

    /// Treat the current tick as unobserved: drop the partial window and the
    /// resource baseline.
    pub(crate) fn abandon_tick(&mut self) {
        self.last_total = None;
        self.windower.observe(None, None);
    }

    /// Run one tick against an already observed host snapshot.
    ///
    /// Order: refresh known keys, prune, compute delta, resolve the active
    /// key, accumulate, then select.
    pub fn tick_with_state(&mut self, host: &HostState) -> Readout {
        refresh_known_keys(host, &mut self.known);
        prune(&mut self.store, &self.known, &self.persistence);

        let delta = self.take_delta(host.resource_total);
        let active = resolve_active_key(host);
        if let Some(sample) = self.windower.observe(active.as_ref(), delta) {
            self.record(sample);
        }

        self.last_readout = self.readout_for(active);
        self.last_readout.clone()
    }

    fn take_delta(&mut self, total: f64) -> Option<f64> {
        if !total.is_finite() {
            return None;
        }
        let delta = self.last_total.map(|previous| total - previous);
        self.last_total = Some(total);
        delta
    }

    fn record(&mut self, sample: RateSample) {
        let RateSample { key, rate } = sample;
        log::debug!(target: LOG_TARGET, "sample {key} = {rate:.3}/tick");
        if key.is_trainer() {
            self.known.insert(key.clone());
        }
        self.store.record(key, rate, self.persistence.capacity());
        self.persistence.save(&self.store);
    }

    fn readout_for(&self, active: Option<ActivityKey>) -> Readout {
        Readout {
            active_average: selector::active_average(active.as_ref(), &self.store),
            best: selector::best(&self.known, &self.store),
            active,
        }
    }

    /// Readout from the most recent tick, with averages recomputed from the
    /// current store.
    #[must_use]
    pub fn readout(&self) -> Readout {
        self.readout_for(self.last_readout.active.clone())
    }

    /// Full table of stored averages in the session's sort direction.
    #[must_use]
    pub fn rate_table(&self) -> Vec<RateRow> {
        selector::rate_table(&self.store, self.sort)
    }

    /// Flip the table sort direction, returning the new direction.
    pub fn toggle_sort(&mut self) -> SortDirection {
        self.sort = self.sort.toggle();
        self.sort
    }

    /// Clear every history and the partial window. Known keys are kept.
    pub fn reset(&mut self) {
        self.store = self.persistence.reset();
        self.windower.clear();
        self.last_readout = self.readout_for(self.last_readout.active.clone());
        log::info!(target: LOG_TARGET, "sample store reset");
    }

    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub const fn known_keys(&self) -> &KnownKeys {
        &self.known
    }

    #[must_use]
    pub const fn accumulation(&self) -> &AccumulationState {
        self.windower.state()
    }

    #[must_use]
    pub const fn sort_direction(&self) -> SortDirection {
        self.sort
    }
}
