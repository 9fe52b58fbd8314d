//! Converts per-tick resource deltas into rate samples.
use crate::key::ActivityKey;

/// A completed accumulation window.
#[derive(Debug, Clone, PartialEq)]
pub struct RateSample {
    pub key: ActivityKey,
    /// Resource units per tick over the window.
    pub rate: f64,
}

/// Transient accumulation state for the window currently being filled.
///
/// Amount and tick count are tracked in parallel so the rate is one exact
/// division at flush time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccumulationState {
    pub current_key: Option<ActivityKey>,
    pub accumulated_amount: f64,
    pub accumulated_ticks: u32,
}

impl AccumulationState {
    fn restart(&mut self, key: Option<ActivityKey>) {
        self.current_key = key;
        self.accumulated_amount = 0.0;
        self.accumulated_ticks = 0;
    }
}

/// Tick-driven accumulation window feeding per-activity sample histories.
#[derive(Debug, Clone)]
pub struct RateWindower {
    width: u32,
    state: AccumulationState,
}

impl RateWindower {
    /// Create a windower emitting one sample every `width` contributing ticks.
    ///
    /// A zero width is treated as one.
    #[must_use]
    pub fn new(width: u32) -> Self {
        Self {
            width: width.max(1),
            state: AccumulationState::default(),
        }
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn state(&self) -> &AccumulationState {
        &self.state
    }

    /// Feed one tick.
    ///
    /// A change of active key discards the partial window and starts a new one
    /// for the new key. Ticks without an active key, without a delta, or with
    /// a negative delta leave the sums untouched.
    pub fn observe(&mut self, active: Option<&ActivityKey>, delta: Option<f64>) -> Option<RateSample> {
        if self.state.current_key.as_ref() != active {
            if self.state.accumulated_ticks > 0 {
                log::debug!(
                    target: crate::constants::LOG_TARGET,
                    "discarding partial window of {} ticks",
                    self.state.accumulated_ticks
                );
            }
            self.state.restart(active.cloned());
        }

        let key = active?;
        let delta = delta.filter(|d| d.is_finite() && *d >= 0.0)?;

        self.state.accumulated_amount += delta;
        self.state.accumulated_ticks += 1;
        if self.state.accumulated_ticks < self.width {
            return None;
        }

        let rate = self.state.accumulated_amount / f64::from(self.width);
        self.state.restart(Some(key.clone()));
        Some(RateSample {
            key: key.clone(),
            rate,
        })
    }

    /// Drop any partial window.
    pub fn clear(&mut self) {
        self.state.restart(None);
    }
}
