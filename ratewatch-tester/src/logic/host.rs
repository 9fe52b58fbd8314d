use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use ratewatch_core::{HostMode, HostOracle, HostState};
use std::cell::RefCell;
use std::collections::BTreeMap;

use super::script::{Activity, Script, ScriptStep};

pub const DEFAULT_STARTING_TOTAL: f64 = 1_000.0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("host offline (tick {0})")]
    Offline(u64),
    #[error("script exhausted after {0} ticks")]
    Exhausted(u64),
}

#[derive(Debug)]
struct HostSim {
    cursor: usize,
    served_in_step: u32,
    ticks: u64,
    total: f64,
    region: u32,
    highest_routes: BTreeMap<u32, u32>,
    gyms: Vec<String>,
    pending_spend: f64,
    rng: ChaCha20Rng,
}

impl HostSim {
    fn unlock_route(&mut self, region: u32, route: u32) {
        let highest = self.highest_routes.entry(region).or_insert(0);
        *highest = (*highest).max(route);
    }

    fn unlock_gym(&mut self, leader: &str) {
        if !self.gyms.iter().any(|gym| gym == leader) {
            self.gyms.push(leader.to_string());
        }
    }

    fn earn(&mut self, income: f64, jitter: f64) {
        let factor = if jitter > 0.0 {
            1.0 + jitter * self.rng.gen_range(-1.0..=1.0)
        } else {
            1.0
        };
        self.total = (self.total + income * factor - self.pending_spend).max(0.0);
        self.pending_spend = 0.0;
    }

    fn snapshot(&self, mode: HostMode) -> HostState {
        HostState {
            resource_total: self.total,
            mode,
            region: self.region,
            highest_route: self.highest_routes.get(&self.region).copied().unwrap_or(0),
            unlocked_gyms: self.gyms.clone(),
        }
    }
}

/// Simulated host that plays a [`Script`] one tick per observation.
///
/// Playing a route or gym unlocks it. Spend steps are charged on the next
/// played tick and the total never drops below zero. Offline steps keep
/// earning their income while the host cannot be read.
#[derive(Debug)]
pub struct ScriptedHost {
    steps: Vec<ScriptStep>,
    jitter: f64,
    sim: RefCell<HostSim>,
}

impl ScriptedHost {
    /// `jitter` scales each tick's income by a factor drawn from
    /// `1 ± jitter`, reproducibly for a given `seed`.
    #[must_use]
    pub fn new(script: &Script, seed: u64, jitter: f64) -> Self {
        Self {
            steps: script.steps().to_vec(),
            jitter: jitter.clamp(0.0, 1.0),
            sim: RefCell::new(HostSim {
                cursor: 0,
                served_in_step: 0,
                ticks: 0,
                total: DEFAULT_STARTING_TOTAL,
                region: 1,
                highest_routes: BTreeMap::new(),
                gyms: Vec::new(),
                pending_spend: 0.0,
                rng: ChaCha20Rng::seed_from_u64(seed),
            }),
        }
    }

    #[must_use]
    pub fn with_starting_total(self, total: f64) -> Self {
        self.sim.borrow_mut().total = total;
        self
    }

    /// Find the next played step, applying any unlock or spend steps on the way.
    fn next_play(&self, sim: &mut HostSim) -> Option<(Activity, f64)> {
        while let Some(step) = self.steps.get(sim.cursor) {
            match step {
                ScriptStep::Play {
                    activity,
                    ticks,
                    income,
                } => {
                    if sim.served_in_step < *ticks {
                        sim.served_in_step += 1;
                        return Some((activity.clone(), *income));
                    }
                }
                ScriptStep::Spend(amount) => sim.pending_spend += amount,
                ScriptStep::UnlockRoute { region, route } => sim.unlock_route(*region, *route),
                ScriptStep::UnlockGym(leader) => sim.unlock_gym(leader),
            }
            sim.cursor += 1;
            sim.served_in_step = 0;
        }
        None
    }
}

impl HostOracle for ScriptedHost {
    type Error = HostError;

    fn observe(&self) -> Result<HostState, Self::Error> {
        let mut sim = self.sim.borrow_mut();
        let Some((activity, income)) = self.next_play(&mut sim) else {
            return Err(HostError::Exhausted(sim.ticks));
        };
        let tick = sim.ticks;
        sim.ticks += 1;

        let mode = match activity {
            Activity::Offline => {
                sim.earn(income, self.jitter);
                return Err(HostError::Offline(tick));
            }
            Activity::Town => HostMode::Idle,
            Activity::Route { region, route } => {
                sim.region = region;
                sim.unlock_route(region, route);
                HostMode::Fighting { route }
            }
            Activity::Gym(leader) => {
                if let Some(leader) = &leader {
                    sim.unlock_gym(leader);
                }
                HostMode::Gym { leader }
            }
            Activity::Trainer(battle) => HostMode::TrainerBattle { battle },
            Activity::Unknown(name) => HostMode::Unrecognized { name },
        };
        sim.earn(income, self.jitter);
        Ok(sim.snapshot(mode))
    }
}
