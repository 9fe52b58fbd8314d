//! Fixed-period driver for tracker sessions.
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::constants::LOG_TARGET;
use crate::readout::Readout;
use crate::session::TrackerSession;
use crate::{HostOracle, SampleStorage};

/// Totals reported when a scheduler run ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub ticks: u64,
    pub abandoned: u64,
}

/// Invokes the tick handler at a fixed period, one tick at a time.
///
/// Ticks never overlap: the next tick starts only after the previous one
/// returned. A tick that fails or panics is abandoned and the loop goes on.
#[derive(Debug, Clone)]
pub struct Scheduler {
    interval: Duration,
    max_ticks: Option<u64>,
    stop: Arc<AtomicBool>,
}

impl Scheduler {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_ticks: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop after `ticks` ticks instead of running until stopped.
    #[must_use]
    pub const fn with_max_ticks(mut self, ticks: u64) -> Self {
        self.max_ticks = Some(ticks);
        self
    }

    /// Flag that ends the run before the next tick when set.
    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Drive `session` against `oracle`, handing each readout to `on_readout`.
    pub fn run<S, O, F>(
        &self,
        session: &mut TrackerSession<S>,
        oracle: &O,
        mut on_readout: F,
    ) -> RunStats
    where
        S: SampleStorage,
        O: HostOracle,
        F: FnMut(u64, &Readout),
    {
        let mut stats = RunStats::default();
        while !self.stop.load(Ordering::Relaxed)
            && self.max_ticks.is_none_or(|max| stats.ticks < max)
        {
            let started = Instant::now();
            let outcome = catch_unwind(AssertUnwindSafe(|| session.tick(oracle)));
            match outcome {
                Ok(Some(readout)) => on_readout(stats.ticks, &readout),
                Ok(None) => stats.abandoned += 1,
                Err(_) => {
                    log::error!(target: LOG_TARGET, "tick {} panicked; continuing", stats.ticks);
                    session.abandon_tick();
                    stats.abandoned += 1;
                }
            }
            stats.ticks += 1;

            let remaining = self.interval.saturating_sub(started.elapsed());
            if !remaining.is_zero() {
                thread::sleep(remaining);
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::registry::{HostMode, HostState};
    use crate::store::MemoryStorage;
    use std::cell::Cell;
    use std::convert::Infallible;

    struct CountingHost {
        calls: Cell<u32>,
        panic_on: Option<u32>,
    }

    impl HostOracle for CountingHost {
        type Error = Infallible;

        fn observe(&self) -> Result<HostState, Self::Error> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            assert!(self.panic_on != Some(call), "host exploded");
            Ok(HostState {
                resource_total: f64::from(call) * 5.0,
                mode: HostMode::Fighting { route: 1 },
                region: 1,
                highest_route: 1,
                unlocked_gyms: Vec::new(),
            })
        }
    }

    #[test]
    fn runs_bounded_number_of_ticks() {
        let mut session = TrackerSession::new(MemoryStorage::new(), TrackerConfig::default());
        let host = CountingHost {
            calls: Cell::new(0),
            panic_on: None,
        };
        let mut last = Readout::default();
        let stats = Scheduler::new(Duration::ZERO)
            .with_max_ticks(11)
            .run(&mut session, &host, |_, readout| last = readout.clone());

        assert_eq!(stats, RunStats { ticks: 11, abandoned: 0 });
        assert_eq!(last.active_average, Some(5.0));
    }

    #[test]
    fn panicking_tick_is_abandoned_not_fatal() {
        let mut session = TrackerSession::new(MemoryStorage::new(), TrackerConfig::default());
        let host = CountingHost {
            calls: Cell::new(0),
            panic_on: Some(2),
        };
        let stats = Scheduler::new(Duration::ZERO)
            .with_max_ticks(5)
            .run(&mut session, &host, |_, _| {});
        assert_eq!(stats, RunStats { ticks: 5, abandoned: 1 });
        // Calls 3 and 4 follow the panic: a new baseline, then one delta.
        assert_eq!(session.accumulation().accumulated_ticks, 1);
    }

    #[test]
    fn stop_handle_ends_the_run() {
        let mut session = TrackerSession::new(MemoryStorage::new(), TrackerConfig::default());
        let host = CountingHost {
            calls: Cell::new(0),
            panic_on: None,
        };
        let scheduler = Scheduler::new(Duration::ZERO);
        let stop = scheduler.stop_handle();
        let stats = scheduler.run(&mut session, &host, |tick, _| {
            if tick == 3 {
                stop.store(true, Ordering::Relaxed);
            }
        });
        assert_eq!(stats.ticks, 4);
    }
}
