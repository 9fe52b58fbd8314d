//! Activity identity keys.
//!
//! A key's formatted string is both the persistence key and the input for the
//! display label, so `Display` and `FromStr` must stay exact inverses.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::constants::{GYM_PREFIX, ROUTE_PREFIX, TRAINER_PREFIX};

/// Identity of one activity the resource can be farmed in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ActivityKey {
    /// A route encounter area within a region.
    Route { region: u32, route: u32 },
    /// A gym, identified by its leader.
    Gym(String),
    /// A scripted trainer battle, identified by its battle name.
    Trainer(String),
}

impl ActivityKey {
    #[must_use]
    pub const fn route(region: u32, route: u32) -> Self {
        Self::Route { region, route }
    }

    #[must_use]
    pub fn gym(leader: impl Into<String>) -> Self {
        Self::Gym(leader.into())
    }

    #[must_use]
    pub fn trainer(battle: impl Into<String>) -> Self {
        Self::Trainer(battle.into())
    }

    #[must_use]
    pub const fn is_trainer(&self) -> bool {
        matches!(self, Self::Trainer(_))
    }

    /// Human-readable label for display collaborators.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Route { route, .. } => format!("Route {route}"),
            Self::Gym(leader) => format!("Gym: {leader}"),
            Self::Trainer(battle) => format!("Trainer: {battle}"),
        }
    }
}

impl fmt::Display for ActivityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Route { region, route } => write!(f, "{ROUTE_PREFIX}{region}-{route}"),
            Self::Gym(leader) => write!(f, "{GYM_PREFIX}{leader}"),
            Self::Trainer(battle) => write!(f, "{TRAINER_PREFIX}{battle}"),
        }
    }
}

/// Raised when a stored key string does not follow the key format.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unrecognized activity key '{raw}'")]
pub struct KeyParseError {
    pub raw: String,
}

impl FromStr for ActivityKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || KeyParseError { raw: s.to_string() };

        if let Some(rest) = s.strip_prefix(ROUTE_PREFIX) {
            let (region, route) = rest.split_once('-').ok_or_else(invalid)?;
            let region = region.parse::<u32>().map_err(|_| invalid())?;
            let route = route.parse::<u32>().map_err(|_| invalid())?;
            return Ok(Self::Route { region, route });
        }
        if let Some(leader) = s.strip_prefix(GYM_PREFIX)
            && !leader.is_empty()
        {
            return Ok(Self::Gym(leader.to_string()));
        }
        if let Some(battle) = s.strip_prefix(TRAINER_PREFIX)
            && !battle.is_empty()
        {
            return Ok(Self::Trainer(battle.to_string()));
        }
        Err(invalid())
    }
}

impl From<ActivityKey> for String {
    fn from(value: ActivityKey) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for ActivityKey {
    type Error = KeyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
