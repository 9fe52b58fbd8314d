//! Data handed to display collaborators after each tick.
use serde::Serialize;
use std::fmt;

use crate::key::ActivityKey;

/// Per-tick presentation data.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Readout {
    pub active: Option<ActivityKey>,
    pub active_average: Option<f64>,
    pub best: Option<(ActivityKey, f64)>,
}

/// What the display should say about the active activity.
#[derive(Debug, Clone, PartialEq)]
pub enum ActiveStatus<'a> {
    /// No activity is active (town, menus).
    Idle,
    /// Active, but no completed samples yet.
    Measuring(&'a ActivityKey),
    Rated(&'a ActivityKey, f64),
}

/// What the display should say about the best activity.
#[derive(Debug, Clone, PartialEq)]
pub enum BestStatus<'a> {
    InsufficientData,
    Best(&'a ActivityKey, f64),
}

impl Readout {
    #[must_use]
    pub fn active_status(&self) -> ActiveStatus<'_> {
        match (&self.active, self.active_average) {
            (None, _) => ActiveStatus::Idle,
            (Some(key), None) => ActiveStatus::Measuring(key),
            (Some(key), Some(avg)) => ActiveStatus::Rated(key, avg),
        }
    }

    #[must_use]
    pub fn best_status(&self) -> BestStatus<'_> {
        self.best
            .as_ref()
            .map_or(BestStatus::InsufficientData, |(key, avg)| {
                BestStatus::Best(key, *avg)
            })
    }
}

/// Render a rate the way the income panel shows it.
#[must_use]
pub fn format_rate(rate: f64) -> String {
    format!("${rate:.1} / sec")
}

impl fmt::Display for ActiveStatus<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle / Town"),
            Self::Measuring(key) => write!(f, "{} (Measuring…)", key.label()),
            Self::Rated(key, avg) => write!(f, "{} {}", key.label(), format_rate(*avg)),
        }
    }
}

impl fmt::Display for BestStatus<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData => f.write_str("Insufficient data"),
            Self::Best(key, avg) => write!(f, "{} {}", key.label(), format_rate(*avg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_readout_fields() {
        let key = ActivityKey::route(1, 5);
        let idle = Readout::default();
        assert_eq!(idle.active_status(), ActiveStatus::Idle);
        assert_eq!(idle.best_status(), BestStatus::InsufficientData);
        assert_eq!(idle.best_status().to_string(), "Insufficient data");

        let measuring = Readout {
            active: Some(key.clone()),
            ..Readout::default()
        };
        assert_eq!(measuring.active_status().to_string(), "Route 5 (Measuring…)");

        let rated = Readout {
            active: Some(key.clone()),
            active_average: Some(12.34),
            best: Some((key.clone(), 12.34)),
        };
        assert_eq!(rated.active_status(), ActiveStatus::Rated(&key, 12.34));
        assert_eq!(rated.best_status().to_string(), "Route 5 $12.3 / sec");
    }

    #[test]
    fn format_rate_uses_one_decimal() {
        assert_eq!(format_rate(20.0), "$20.0 / sec");
        assert_eq!(format_rate(0.06), "$0.1 / sec");
    }
}
