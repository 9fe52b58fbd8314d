use anyhow::{Context, Result};
use chrono::Utc;
use ratewatch_core::{
    ActivityKey, MemoryStorage, RateRow, Readout, RunStats, SampleStorage, Scheduler,
    SchemaVersion, Store, TrackerConfig, TrackerSession,
};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::host::ScriptedHost;
use super::script::Script;
use crate::storage::FileStorage;

/// One process lifetime of the tracker: a fresh session over shared storage.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub script: Script,
    /// Reset the store after this many ticks.
    pub reset_at: Option<u64>,
}

impl SessionPlan {
    #[must_use]
    pub const fn new(script: Script) -> Self {
        Self {
            script,
            reset_at: None,
        }
    }

    #[must_use]
    pub const fn with_reset_at(mut self, tick: u64) -> Self {
        self.reset_at = Some(tick);
        self
    }
}

/// Sessions to play back to back against one storage backend, plus the
/// checks to run on the outcome.
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub config: TrackerConfig,
    pub sessions: Vec<SessionPlan>,
    /// Raw blobs written before the first session, keyed by schema.
    pub seeded_blobs: Vec<(SchemaVersion, String)>,
    pub expectations: Vec<SimulationExpectation>,
}

impl SimulationPlan {
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            sessions: Vec::new(),
            seeded_blobs: Vec::new(),
            expectations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_session(mut self, session: SessionPlan) -> Self {
        self.sessions.push(session);
        self
    }

    #[must_use]
    pub fn with_script(self, script: Script) -> Self {
        self.with_session(SessionPlan::new(script))
    }

    #[must_use]
    pub fn with_seeded_blob(mut self, schema: SchemaVersion, blob: impl Into<String>) -> Self {
        self.seeded_blobs.push((schema, blob.into()));
        self
    }

    #[must_use]
    pub fn with_expectation(mut self, expectation: impl Into<SimulationExpectation>) -> Self {
        self.expectations.push(expectation.into());
        self
    }
}

/// Assertion hook run after a simulation completes.
type SimulationExpectationFn =
    Arc<dyn Fn(&SimulationSummary) -> Result<()> + Send + Sync + 'static>;

#[derive(Clone)]
pub struct SimulationExpectation(SimulationExpectationFn);

impl std::fmt::Debug for SimulationExpectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationExpectation").finish()
    }
}

impl SimulationExpectation {
    /// Run the check against a finished simulation.
    ///
    /// # Errors
    ///
    /// Returns the check's failure.
    pub fn evaluate(&self, summary: &SimulationSummary) -> Result<()> {
        (self.0)(summary)
    }
}

impl<F> From<F> for SimulationExpectation
where
    F: Fn(&SimulationSummary) -> Result<()> + Send + Sync + 'static,
{
    fn from(f: F) -> Self {
        Self(Arc::new(f))
    }
}

/// State captured right after a mid-session reset.
#[derive(Debug, Clone)]
pub struct ResetSnapshot {
    pub known_before: usize,
    pub known_after: usize,
    pub store_empty: bool,
    pub readout: Readout,
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub stats: RunStats,
    /// Store as loaded when the session started.
    pub loaded: Store,
    pub readouts: Vec<Readout>,
    pub final_readout: Readout,
    pub store: Store,
    pub known: Vec<ActivityKey>,
    pub rate_table: Vec<RateRow>,
    pub reset: Option<ResetSnapshot>,
}

impl SessionSummary {
    /// Stored average for `key` at the end of the session.
    #[must_use]
    pub fn average(&self, key: &ActivityKey) -> Option<f64> {
        self.rate_table
            .iter()
            .find(|row| &row.key == key)
            .map(|row| row.average)
    }
}

/// Complete record of a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationSummary {
    pub seed: u64,
    pub jitter: f64,
    pub schema: SchemaVersion,
    pub sessions: Vec<SessionSummary>,
}

impl SimulationSummary {
    /// Last session played.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan had no sessions.
    pub fn last(&self) -> Result<&SessionSummary> {
        self.sessions
            .last()
            .context("simulation played no sessions")
    }

    /// Total abandoned ticks across every session.
    #[must_use]
    pub fn abandoned(&self) -> u64 {
        self.sessions.iter().map(|s| s.stats.abandoned).sum()
    }
}

/// Where simulated sessions persist their samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageTarget {
    Memory,
    /// A fresh directory per run under the given root.
    IsolatedFiles(PathBuf),
    /// Exactly this directory, shared across runs.
    SharedFiles(PathBuf),
}

/// Headless runner that plays simulation plans against scripted hosts.
#[derive(Debug, Clone)]
pub struct Simulator {
    jitter: f64,
    pace: Duration,
    storage: StorageTarget,
    verbose: bool,
}

impl Simulator {
    #[must_use]
    pub const fn new(jitter: f64, verbose: bool) -> Self {
        Self {
            jitter,
            pace: Duration::ZERO,
            storage: StorageTarget::Memory,
            verbose,
        }
    }

    #[must_use]
    pub fn with_storage(mut self, storage: StorageTarget) -> Self {
        self.storage = storage;
        self
    }

    /// Sleep between ticks instead of running them back to back.
    #[must_use]
    pub const fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    #[must_use]
    pub const fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Play every session of `plan` with host randomness derived from `seed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the storage
    /// backend cannot be prepared.
    pub fn run_plan(&self, label: &str, plan: &SimulationPlan, seed: u64) -> Result<SimulationSummary> {
        plan.config
            .validate()
            .with_context(|| format!("invalid tracker configuration for {label}"))?;
        match &self.storage {
            StorageTarget::Memory => self.run_with(MemoryStorage::new(), plan, seed),
            StorageTarget::IsolatedFiles(root) => {
                let dir = run_data_dir(root, label, seed);
                clear_dir(&dir)?;
                self.run_with(FileStorage::new(dir), plan, seed)
            }
            StorageTarget::SharedFiles(dir) => self.run_with(FileStorage::new(dir.clone()), plan, seed),
        }
    }

    fn run_with<S>(&self, storage: S, plan: &SimulationPlan, seed: u64) -> Result<SimulationSummary>
    where
        S: SampleStorage + Clone,
    {
        for (schema, blob) in &plan.seeded_blobs {
            let key = schema.storage_key(&plan.config.storage_namespace);
            storage
                .write_blob(&key, blob)
                .with_context(|| format!("failed to seed blob '{key}'"))?;
        }

        let sessions = plan
            .sessions
            .iter()
            .zip(0u64..)
            .map(|(session_plan, index)| {
                self.play_session(storage.clone(), plan, session_plan, seed.wrapping_add(index))
            })
            .collect();

        Ok(SimulationSummary {
            seed,
            jitter: self.jitter,
            schema: plan.config.schema,
            sessions,
        })
    }

    fn play_session<S: SampleStorage>(
        &self,
        storage: S,
        plan: &SimulationPlan,
        session_plan: &SessionPlan,
        seed: u64,
    ) -> SessionSummary {
        let mut session = TrackerSession::new(storage, plan.config.clone());
        let loaded = session.store().clone();
        let host = ScriptedHost::new(&session_plan.script, seed, self.jitter);
        let total_ticks = session_plan.script.total_ticks();
        let mut readouts = Vec::new();
        let mut stats = RunStats::default();
        let mut reset = None;

        let split = session_plan
            .reset_at
            .map_or(total_ticks, |tick| tick.min(total_ticks));
        stats = accumulate(stats, self.run_ticks(&mut session, &host, split, &mut readouts));

        if session_plan.reset_at.is_some() {
            let known_before = session.known_keys().len();
            session.reset();
            reset = Some(ResetSnapshot {
                known_before,
                known_after: session.known_keys().len(),
                store_empty: session.store().is_empty(),
                readout: session.readout(),
            });
            stats = accumulate(
                stats,
                self.run_ticks(&mut session, &host, total_ticks - split, &mut readouts),
            );
        }

        if self.verbose {
            println!(
                "  ↳ {} ticks ({} abandoned), {} histories, best: {}",
                stats.ticks,
                stats.abandoned,
                session.store().len(),
                session.readout().best_status()
            );
        }

        SessionSummary {
            stats,
            loaded,
            final_readout: session.readout(),
            store: session.store().clone(),
            known: session.known_keys().iter().cloned().collect(),
            rate_table: session.rate_table(),
            readouts,
            reset,
        }
    }

    fn run_ticks<S: SampleStorage>(
        &self,
        session: &mut TrackerSession<S>,
        host: &ScriptedHost,
        ticks: u64,
        readouts: &mut Vec<Readout>,
    ) -> RunStats {
        Scheduler::new(self.pace)
            .with_max_ticks(ticks)
            .run(session, host, |_, readout| readouts.push(readout.clone()))
    }
}

const fn accumulate(total: RunStats, part: RunStats) -> RunStats {
    RunStats {
        ticks: total.ticks + part.ticks,
        abandoned: total.abandoned + part.abandoned,
    }
}

/// Per-run storage directory: `<root>/<scenario>/seed-<seed>/<timestamp>`.
pub fn run_data_dir(root: &Path, scenario: &str, seed: u64) -> PathBuf {
    let ts = Utc::now().format("%Y%m%dT%H%M%S%3f");
    let slug: String = scenario
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    root.join(slug).join(format!("seed-{seed}")).join(ts.to_string())
}

fn clear_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("failed to clear {}", dir.display())),
    }
}
