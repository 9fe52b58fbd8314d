//! Active-activity resolution and the set of known activities.
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::key::ActivityKey;

/// What the host is doing right now, with the context each mode guarantees.
///
/// Context that the host could not resolve is `None`; the registry treats it
/// as "no active activity" rather than an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum HostMode {
    /// Town, menus, or anything else without an income source.
    #[default]
    Idle,
    /// Timed wild encounters on a route. Route 0 means "not on a route".
    Fighting { route: u32 },
    /// A gym battle against the given leader.
    Gym { leader: Option<String> },
    /// A scripted trainer battle.
    TrainerBattle { battle: Option<String> },
    /// A mode this tracker does not model.
    Unrecognized { name: String },
}

/// Snapshot of the host fields the tracker reads each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HostState {
    /// Current total of the tracked resource.
    pub resource_total: f64,
    pub mode: HostMode,
    /// Region the player is currently in.
    pub region: u32,
    /// Highest route reached in the current region.
    pub highest_route: u32,
    /// Leaders of every gym the host reports as unlocked.
    pub unlocked_gyms: Vec<String>,
}

/// Resolve the activity the host is currently engaged in.
///
/// An empty gym leader or battle name is unresolvable: it would format to a
/// key that cannot be parsed back after a restart.
#[must_use]
pub fn resolve_active_key(host: &HostState) -> Option<ActivityKey> {
    match &host.mode {
        HostMode::Fighting { route } if *route > 0 => {
            Some(ActivityKey::route(host.region, *route))
        }
        HostMode::Gym {
            leader: Some(leader),
        } if !leader.is_empty() => Some(ActivityKey::gym(leader.as_str())),
        HostMode::TrainerBattle {
            battle: Some(battle),
        } if !battle.is_empty() => Some(ActivityKey::trainer(battle.as_str())),
        _ => None,
    }
}

/// Insertion-ordered, grow-only set of activities considered for ranking.
///
/// Iteration order is observable: ranking ties resolve to the key inserted
/// first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownKeys {
    order: Vec<ActivityKey>,
    members: HashSet<ActivityKey>,
}

impl KnownKeys {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key, returning `true` if it was not known before.
    pub fn insert(&mut self, key: ActivityKey) -> bool {
        if self.members.contains(&key) {
            return false;
        }
        self.members.insert(key.clone());
        self.order.push(key);
        true
    }

    #[must_use]
    pub fn contains(&self, key: &ActivityKey) -> bool {
        self.members.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActivityKey> {
        self.order.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl FromIterator<ActivityKey> for KnownKeys {
    fn from_iter<I: IntoIterator<Item = ActivityKey>>(iter: I) -> Self {
        let mut known = Self::new();
        for key in iter {
            known.insert(key);
        }
        known
    }
}

/// Register every unlocked route and gym. Never removes keys.
///
/// Trainer battles are not registered here; they become known once a sample
/// is recorded for them.
pub fn refresh_known_keys(host: &HostState, known: &mut KnownKeys) -> usize {
    let mut added = 0;
    for route in 1..=host.highest_route {
        if known.insert(ActivityKey::route(host.region, route)) {
            added += 1;
        }
    }
    for leader in host.unlocked_gyms.iter().filter(|leader| !leader.is_empty()) {
        if known.insert(ActivityKey::gym(leader.as_str())) {
            added += 1;
        }
    }
    added
}
