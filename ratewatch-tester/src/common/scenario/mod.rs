pub mod catalog;

use crate::logic::SimulationPlan;
use catalog::{CatalogEntry, catalog_entries};

/// A named simulation with its expectations attached.
#[derive(Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub plan: SimulationPlan,
}

impl TestScenario {
    #[must_use]
    pub fn simulation(name: impl Into<String>, plan: SimulationPlan) -> Self {
        Self {
            name: name.into(),
            plan,
        }
    }
}

impl From<&CatalogEntry> for TestScenario {
    fn from(entry: &CatalogEntry) -> Self {
        Self::simulation(entry.name, entry.plan())
    }
}

/// Look a scenario up by its CLI key (or its display name, ignoring case).
pub fn get_scenario(key: &str) -> Option<TestScenario> {
    let needle = key.trim().to_lowercase();
    catalog_entries()
        .iter()
        .find(|entry| entry.key == needle || entry.name.to_lowercase() == needle)
        .map(TestScenario::from)
}

/// `(key, description)` for every catalog scenario, in run order.
pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    catalog_entries()
        .iter()
        .map(|entry| (entry.key, entry.description))
        .collect()
}
