//! Rolling-average queries over the sample store.
//!
//! Everything here is a pure read of `Store`/`KnownKeys`; it can be called at
//! any time, independent of the tick cadence.
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::history::SampleHistory;
use crate::key::ActivityKey;
use crate::numbers::usize_to_f64;
use crate::registry::KnownKeys;
use crate::store::Store;

/// Sort order for the full rate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    #[must_use]
    pub const fn toggle(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ascending => "ascending",
            Self::Descending => "descending",
        })
    }
}

/// One row of the full rate table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateRow {
    pub key: ActivityKey,
    pub average: f64,
}

/// Unweighted mean of a history, `None` when it is empty.
#[must_use]
pub fn average(history: &SampleHistory) -> Option<f64> {
    if history.is_empty() {
        return None;
    }
    Some(history.iter().sum::<f64>() / usize_to_f64(history.len()))
}

fn average_for(store: &Store, key: &ActivityKey) -> Option<f64> {
    store.get(key).and_then(average)
}

/// Highest-average known key. Ties keep the key iterated first.
#[must_use]
pub fn best(known: &KnownKeys, store: &Store) -> Option<(ActivityKey, f64)> {
    let mut best: Option<(&ActivityKey, f64)> = None;
    for key in known.iter() {
        let Some(value) = average_for(store, key) else {
            continue;
        };
        if best.is_none_or(|(_, current)| value > current) {
            best = Some((key, value));
        }
    }
    best.map(|(key, value)| (key.clone(), value))
}

/// Average of the active key's history.
#[must_use]
pub fn active_average(active: Option<&ActivityKey>, store: &Store) -> Option<f64> {
    active.and_then(|key| average_for(store, key))
}

/// Every stored key with samples, sorted by average.
///
/// Equal averages keep the store's key order in either direction.
#[must_use]
pub fn rate_table(store: &Store, direction: SortDirection) -> Vec<RateRow> {
    let mut rows: Vec<RateRow> = store
        .iter()
        .filter_map(|(key, history)| {
            average(history).map(|average| RateRow {
                key: key.clone(),
                average,
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        let ordering = a.average.partial_cmp(&b.average).unwrap_or(Ordering::Equal);
        match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn store_with(entries: &[(ActivityKey, Vec<f64>)]) -> Store {
        let mut store = Store::new();
        for (key, samples) in entries {
            for sample in samples {
                store.record(key.clone(), *sample, 30);
            }
        }
        store
    }

    #[test]
    fn average_of_empty_and_single() {
        assert_eq!(average(&SampleHistory::new()), None);
        let single: SampleHistory = [7.5].into_iter().collect();
        assert_eq!(average(&single), Some(7.5));
    }

    #[test]
    fn best_picks_highest_average_among_known_keys() {
        let a = ActivityKey::route(1, 1);
        let b = ActivityKey::route(1, 2);
        let stray = ActivityKey::gym("Giovanni");
        let store = store_with(&[
            (a.clone(), vec![10.0, 20.0]),
            (b.clone(), vec![30.0]),
            (stray, vec![999.0]),
        ]);
        let known: KnownKeys = [a, b.clone()].into_iter().collect();

        assert_eq!(best(&known, &store), Some((b, 30.0)));
    }

    #[test]
    fn best_tie_keeps_first_iterated_key() {
        let a = ActivityKey::gym("Misty");
        let b = ActivityKey::route(1, 4);
        let store = store_with(&[(a.clone(), vec![12.0]), (b.clone(), vec![12.0])]);

        let known: KnownKeys = [b.clone(), a.clone()].into_iter().collect();
        for _ in 0..3 {
            assert_eq!(best(&known, &store), Some((b.clone(), 12.0)));
        }
        let reversed: KnownKeys = [a.clone(), b].into_iter().collect();
        assert_eq!(best(&reversed, &store), Some((a, 12.0)));
    }

    #[test]
    fn best_without_samples_is_none() {
        let known: KnownKeys = [ActivityKey::route(1, 1)].into_iter().collect();
        assert_eq!(best(&known, &Store::new()), None);
    }

    #[test]
    fn active_average_requires_key_and_history() {
        let key = ActivityKey::route(1, 1);
        let store = store_with(&[(key.clone(), vec![2.0, 4.0])]);
        assert_eq!(active_average(Some(&key), &store), Some(3.0));
        assert_eq!(active_average(None, &store), None);
        assert_eq!(active_average(Some(&ActivityKey::route(1, 2)), &store), None);
    }

    #[test]
    fn rate_table_sorts_in_requested_direction() {
        let store = store_with(&[
            (ActivityKey::route(1, 1), vec![5.0]),
            (ActivityKey::route(1, 2), vec![15.0]),
            (ActivityKey::gym("Brock"), vec![10.0]),
        ]);
        let descending: Vec<f64> = rate_table(&store, SortDirection::Descending)
            .iter()
            .map(|row| row.average)
            .collect();
        assert_eq!(descending, vec![15.0, 10.0, 5.0]);

        let ascending = rate_table(&store, SortDirection::Descending.toggle());
        assert_eq!(ascending[0].key, ActivityKey::route(1, 1));
    }

    proptest! {
        #[test]
        fn average_ignores_insertion_order(
            mut samples in proptest::collection::vec(0u32..10_000, 1..30),
        ) {
            let forward: SampleHistory = samples.iter().map(|s| f64::from(*s)).collect();
            samples.reverse();
            let backward: SampleHistory = samples.iter().map(|s| f64::from(*s)).collect();
            let (Some(a), Some(b)) = (average(&forward), average(&backward)) else {
                return Err(TestCaseError::fail("non-empty history must average"));
            };
            prop_assert!((a - b).abs() < 1e-9);
        }
    }
}
