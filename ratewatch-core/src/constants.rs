//! Centralized sampling constants for the Ratewatch tracker.
//!
//! The window width and history capacity define what a stored sample means.
//! Changing either one changes the persisted format, so they are pinned per
//! schema version here instead of being exposed as free configuration.

// Logging ------------------------------------------------------------------
pub(crate) const LOG_TARGET: &str = "ratewatch";

// Storage identifiers --------------------------------------------------------
pub(crate) const DEFAULT_STORAGE_NAMESPACE: &str = "ratewatch";
pub(crate) const STORAGE_SUFFIX_V1: &str = "samples.v1";
pub(crate) const STORAGE_SUFFIX_V2: &str = "samples.v2";

// Schema v1: raw per-tick deltas ---------------------------------------------
pub(crate) const V1_ACCUMULATION_WINDOW: u32 = 1;
pub(crate) const V1_HISTORY_CAPACITY: usize = 10;

// Schema v2: windowed rate samples -------------------------------------------
pub(crate) const V2_ACCUMULATION_WINDOW: u32 = 10;
pub(crate) const V2_HISTORY_CAPACITY: usize = 30;

// Scheduling ---------------------------------------------------------------
pub(crate) const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
pub(crate) const MIN_TICK_INTERVAL_MS: u64 = 50;
pub(crate) const MAX_TICK_INTERVAL_MS: u64 = 60_000;

// Key formatting -----------------------------------------------------------
pub(crate) const ROUTE_PREFIX: &str = "route-";
pub(crate) const GYM_PREFIX: &str = "gym-";
pub(crate) const TRAINER_PREFIX: &str = "trainer-";
