//! Phase scripts driving the simulated host.
//!
//! A script is a comma-separated list of steps:
//!
//! - `town x5`, `idle x5`: no active activity for five ticks
//! - `route:1:2 x10 @20`: region 1, route 2, ten ticks earning 20 per tick
//! - `gym:Brock x10 @5`, `gym x3`: a gym battle (no leader when the name is omitted)
//! - `trainer:Rival x10 @50`: a trainer battle
//! - `unknown:safari x4`: a mode the tracker does not model
//! - `offline x3`: the host cannot be read for three ticks
//! - `spend:500`: subtract 500 from the total on the next played tick
//! - `unlock:route:1:4`, `unlock:gym:Misty`: unlock progress without playing
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::fmt;
use std::str::FromStr;

static PLAY_STEP: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"^(?P<kind>town|idle|route|gym|trainer|offline|unknown)(?::(?P<arg>[^@]+?))?\s*x(?P<ticks>\d+)(?:\s*@\s*(?P<income>\d+(?:\.\d+)?))?$",
    )
    .ok()
});
static SPEND_STEP: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^spend:(?P<amount>\d+(?:\.\d+)?)$").ok());
static UNLOCK_ROUTE_STEP: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^unlock:route:(?P<region>\d+):(?P<route>\d+)$").ok());
static UNLOCK_GYM_STEP: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^unlock:gym:(?P<leader>.+)$").ok());
static ROUTE_ARG: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^(?P<region>\d+):(?P<route>\d+)$").ok());

fn captures<'t>(pattern: &Lazy<Option<Regex>>, text: &'t str) -> Option<Captures<'t>> {
    pattern.as_ref()?.captures(text)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("script has no steps")]
    Empty,
    #[error("step {index} ('{step}') is not a valid script step")]
    InvalidStep { index: usize, step: String },
    #[error("route step needs REGION:ROUTE (got '{0}')")]
    RouteArgument(String),
}

/// What the simulated player is doing during a played phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activity {
    Town,
    Route { region: u32, route: u32 },
    Gym(Option<String>),
    Trainer(Option<String>),
    Unknown(String),
    Offline,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    Play {
        activity: Activity,
        ticks: u32,
        income: f64,
    },
    Spend(f64),
    UnlockRoute {
        region: u32,
        route: u32,
    },
    UnlockGym(String),
}

/// Ordered steps for a [`ScriptedHost`](super::ScriptedHost).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    steps: Vec<ScriptStep>,
}

impl Script {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the comma-separated step syntax described in the module docs.
    ///
    /// # Errors
    ///
    /// Returns the first step that does not parse, or [`ScriptError::Empty`].
    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        let steps = text
            .split(',')
            .map(str::trim)
            .filter(|step| !step.is_empty())
            .enumerate()
            .map(|(index, step)| parse_step(index, step))
            .collect::<Result<Vec<_>, _>>()?;
        if steps.is_empty() {
            return Err(ScriptError::Empty);
        }
        Ok(Self { steps })
    }

    #[must_use]
    pub fn play(mut self, activity: Activity, ticks: u32, income: f64) -> Self {
        self.steps.push(ScriptStep::Play {
            activity,
            ticks,
            income,
        });
        self
    }

    #[must_use]
    pub fn town(self, ticks: u32) -> Self {
        self.play(Activity::Town, ticks, 0.0)
    }

    #[must_use]
    pub fn route(self, region: u32, route: u32, ticks: u32, income: f64) -> Self {
        self.play(Activity::Route { region, route }, ticks, income)
    }

    #[must_use]
    pub fn gym(self, leader: &str, ticks: u32, income: f64) -> Self {
        self.play(Activity::Gym(Some(leader.to_string())), ticks, income)
    }

    #[must_use]
    pub fn trainer(self, battle: &str, ticks: u32, income: f64) -> Self {
        self.play(Activity::Trainer(Some(battle.to_string())), ticks, income)
    }

    #[must_use]
    pub fn offline(self, ticks: u32) -> Self {
        self.play(Activity::Offline, ticks, 0.0)
    }

    #[must_use]
    pub fn spend(mut self, amount: f64) -> Self {
        self.steps.push(ScriptStep::Spend(amount));
        self
    }

    #[must_use]
    pub fn unlock_route(mut self, region: u32, route: u32) -> Self {
        self.steps.push(ScriptStep::UnlockRoute { region, route });
        self
    }

    #[must_use]
    pub fn unlock_gym(mut self, leader: &str) -> Self {
        self.steps.push(ScriptStep::UnlockGym(leader.to_string()));
        self
    }

    #[must_use]
    pub fn steps(&self) -> &[ScriptStep] {
        &self.steps
    }

    /// Number of host observations the script serves before it runs out.
    #[must_use]
    pub fn total_ticks(&self) -> u64 {
        self.steps
            .iter()
            .map(|step| match step {
                ScriptStep::Play { ticks, .. } => u64::from(*ticks),
                _ => 0,
            })
            .sum()
    }
}

impl FromStr for Script {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_step(index: usize, step: &str) -> Result<ScriptStep, ScriptError> {
    let invalid = || ScriptError::InvalidStep {
        index,
        step: step.to_string(),
    };

    if let Some(caps) = captures(&SPEND_STEP, step) {
        let amount = caps["amount"].parse().map_err(|_| invalid())?;
        return Ok(ScriptStep::Spend(amount));
    }
    if let Some(caps) = captures(&UNLOCK_ROUTE_STEP, step) {
        let region = caps["region"].parse().map_err(|_| invalid())?;
        let route = caps["route"].parse().map_err(|_| invalid())?;
        return Ok(ScriptStep::UnlockRoute { region, route });
    }
    if let Some(caps) = captures(&UNLOCK_GYM_STEP, step) {
        return Ok(ScriptStep::UnlockGym(caps["leader"].trim().to_string()));
    }

    let caps = captures(&PLAY_STEP, step).ok_or_else(invalid)?;
    let ticks = caps["ticks"].parse().map_err(|_| invalid())?;
    let income = caps
        .name("income")
        .map_or(Ok(0.0), |m| m.as_str().parse())
        .map_err(|_| invalid())?;
    let arg = caps
        .name("arg")
        .map(|m| m.as_str().trim().to_string())
        .filter(|arg| !arg.is_empty());

    let activity = match (&caps["kind"], arg) {
        ("town" | "idle", None) => Activity::Town,
        ("offline", None) => Activity::Offline,
        ("route", Some(arg)) => {
            let route_caps =
                captures(&ROUTE_ARG, &arg).ok_or_else(|| ScriptError::RouteArgument(arg.clone()))?;
            Activity::Route {
                region: route_caps["region"].parse().map_err(|_| invalid())?,
                route: route_caps["route"].parse().map_err(|_| invalid())?,
            }
        }
        ("gym", leader) => Activity::Gym(leader),
        ("trainer", battle) => Activity::Trainer(battle),
        ("unknown", Some(name)) => Activity::Unknown(name),
        _ => return Err(invalid()),
    };
    Ok(ScriptStep::Play {
        activity,
        ticks,
        income,
    })
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Town => f.write_str("town"),
            Self::Route { region, route } => write!(f, "route:{region}:{route}"),
            Self::Gym(Some(leader)) => write!(f, "gym:{leader}"),
            Self::Gym(None) => f.write_str("gym"),
            Self::Trainer(Some(battle)) => write!(f, "trainer:{battle}"),
            Self::Trainer(None) => f.write_str("trainer"),
            Self::Unknown(name) => write!(f, "unknown:{name}"),
            Self::Offline => f.write_str("offline"),
        }
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for step in &self.steps {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            match step {
                ScriptStep::Play {
                    activity,
                    ticks,
                    income,
                } if *income > 0.0 => write!(f, "{activity} x{ticks} @{income}")?,
                ScriptStep::Play {
                    activity, ticks, ..
                } => write!(f, "{activity} x{ticks}")?,
                ScriptStep::Spend(amount) => write!(f, "spend:{amount}")?,
                ScriptStep::UnlockRoute { region, route } => {
                    write!(f, "unlock:route:{region}:{route}")?;
                }
                ScriptStep::UnlockGym(leader) => write!(f, "unlock:gym:{leader}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compact_and_spaced_play_steps() {
        let script = Script::parse("route:1:1x10@10, gym:Brock x10 @ 5.5,town x5").unwrap();
        assert_eq!(
            script.steps(),
            &[
                ScriptStep::Play {
                    activity: Activity::Route {
                        region: 1,
                        route: 1
                    },
                    ticks: 10,
                    income: 10.0,
                },
                ScriptStep::Play {
                    activity: Activity::Gym(Some("Brock".into())),
                    ticks: 10,
                    income: 5.5,
                },
                ScriptStep::Play {
                    activity: Activity::Town,
                    ticks: 5,
                    income: 0.0,
                },
            ]
        );
        assert_eq!(script.total_ticks(), 25);
    }

    #[test]
    fn parses_names_ending_in_x() {
        let script = Script::parse("trainer:Rox x3 @1").unwrap();
        assert_eq!(
            script.steps()[0],
            ScriptStep::Play {
                activity: Activity::Trainer(Some("Rox".into())),
                ticks: 3,
                income: 1.0,
            }
        );
    }

    #[test]
    fn parses_non_play_steps() {
        let script = Script::parse("unlock:route:2:4, unlock:gym:Lt. Surge, spend:250").unwrap();
        assert_eq!(
            script.steps(),
            &[
                ScriptStep::UnlockRoute {
                    region: 2,
                    route: 4
                },
                ScriptStep::UnlockGym("Lt. Surge".into()),
                ScriptStep::Spend(250.0),
            ]
        );
        assert_eq!(script.total_ticks(), 0);
    }

    #[test]
    fn gym_without_leader_and_unknown_modes() {
        let script = Script::parse("gym x2, unknown:safari x4, offline x1").unwrap();
        let activities: Vec<_> = script
            .steps()
            .iter()
            .filter_map(|step| match step {
                ScriptStep::Play { activity, .. } => Some(activity.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            activities,
            vec![
                Activity::Gym(None),
                Activity::Unknown("safari".into()),
                Activity::Offline
            ]
        );
    }

    #[test]
    fn rejects_malformed_steps() {
        assert_eq!(Script::parse(" , "), Err(ScriptError::Empty));
        assert!(matches!(
            Script::parse("town x1, swim x3"),
            Err(ScriptError::InvalidStep { index: 1, .. })
        ));
        assert!(matches!(
            Script::parse("route:7 x3"),
            Err(ScriptError::RouteArgument(arg)) if arg == "7"
        ));
        assert!(Script::parse("town:1 x3").is_err());
        assert!(Script::parse("route:1:1 x99999999999").is_err());
    }

    #[test]
    fn builder_matches_parsed_form() {
        let built = Script::new()
            .town(1)
            .route(1, 2, 10, 20.0)
            .spend(500.0)
            .unlock_gym("Misty")
            .trainer("Rival", 3, 50.0);
        let parsed: Script = built.to_string().parse().unwrap();
        assert_eq!(parsed, built);
    }
}
