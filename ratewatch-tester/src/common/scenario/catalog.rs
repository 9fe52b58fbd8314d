use anyhow::{Result, anyhow};
use ratewatch_core::{ActivityKey, SchemaVersion, TrackerConfig};

use crate::logic::{Activity, Script, SessionPlan, SimulationPlan, SimulationSummary};

/// A catalog scenario: CLI key, display name, and a plan builder.
#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    build: fn() -> SimulationPlan,
}

impl CatalogEntry {
    #[must_use]
    pub fn plan(&self) -> SimulationPlan {
        (self.build)()
    }
}

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        key: "smoke",
        name: "Smoke",
        description: "One route window completes and is ranked",
        build: smoke_plan,
    },
    CatalogEntry {
        key: "end-to-end",
        name: "End To End",
        description: "Two routes at different incomes; the richer one wins",
        build: end_to_end_plan,
    },
    CatalogEntry {
        key: "key-switch",
        name: "Key Switch",
        description: "Switching activity before a window fills records nothing",
        build: key_switch_plan,
    },
    CatalogEntry {
        key: "negative-delta",
        name: "Negative Delta",
        description: "Spending mid-window is skipped without breaking the window",
        build: negative_delta_plan,
    },
    CatalogEntry {
        key: "reset",
        name: "Reset",
        description: "Reset clears histories but keeps known activities",
        build: reset_plan,
    },
    CatalogEntry {
        key: "trainer",
        name: "Trainer",
        description: "Trainer battles become known once sampled and survive cleanup",
        build: trainer_plan,
    },
    CatalogEntry {
        key: "persistence-restart",
        name: "Persistence Restart",
        description: "Completed samples survive a session restart",
        build: persistence_restart_plan,
    },
    CatalogEntry {
        key: "corrupt-blob",
        name: "Corrupt Blob",
        description: "An unreadable stored blob loads as an empty store",
        build: corrupt_blob_plan,
    },
    CatalogEntry {
        key: "schema-isolation",
        name: "Schema Isolation",
        description: "Samples stored under another schema are never read",
        build: schema_isolation_plan,
    },
    CatalogEntry {
        key: "host-outage",
        name: "Host Outage",
        description: "Unreadable ticks are abandoned and their income never reaches a sample",
        build: host_outage_plan,
    },
    CatalogEntry {
        key: "unrecognized-mode",
        name: "Unrecognized Mode",
        description: "Unmodelled host modes count as idle and discard partial windows",
        build: unrecognized_mode_plan,
    },
    CatalogEntry {
        key: "legacy-schema",
        name: "Legacy Schema",
        description: "The v1 schema records raw per-tick deltas with a short history",
        build: legacy_schema_plan,
    },
];

pub fn catalog_entries() -> &'static [CatalogEntry] {
    CATALOG
}

fn v2() -> TrackerConfig {
    TrackerConfig::default().with_schema(SchemaVersion::V2)
}

fn route_1_1() -> ActivityKey {
    ActivityKey::route(1, 1)
}

/// `actual` within the jitter band around `expected`.
fn ensure_close(what: &str, actual: Option<f64>, expected: f64, jitter: f64) -> Result<()> {
    let actual = actual.ok_or_else(|| anyhow!("{what}: no value, expected ~{expected}"))?;
    let tolerance = expected.abs() * jitter + 1e-9;
    anyhow::ensure!(
        (actual - expected).abs() <= tolerance,
        "{what}: {actual:.3} not within {tolerance:.3} of {expected}"
    );
    Ok(())
}

fn best_average(summary: &SimulationSummary, key: &ActivityKey) -> Result<f64> {
    match &summary.last()?.final_readout.best {
        Some((best, avg)) if best == key => Ok(*avg),
        Some((best, _)) => Err(anyhow!("best is {best}, expected {key}")),
        None => Err(anyhow!("no best activity, expected {key}")),
    }
}

fn history_len(summary: &SimulationSummary, key: &ActivityKey) -> Result<usize> {
    Ok(summary
        .last()?
        .store
        .get(key)
        .map_or(0, ratewatch_core::SampleHistory::len))
}

fn smoke_plan() -> SimulationPlan {
    SimulationPlan::new(v2())
        .with_script(Script::new().route(1, 1, 11, 10.0).town(3))
        .with_expectation(smoke_expectation)
}

fn smoke_expectation(summary: &SimulationSummary) -> Result<()> {
    let session = summary.last()?;
    anyhow::ensure!(summary.abandoned() == 0, "no tick should be abandoned");
    anyhow::ensure!(
        session.known.contains(&route_1_1()),
        "route-1-1 should be known"
    );
    anyhow::ensure!(
        history_len(summary, &route_1_1())? == 1,
        "expected exactly one completed window"
    );
    anyhow::ensure!(
        session.final_readout.active.is_none(),
        "town should leave no active activity"
    );
    ensure_close(
        "best average",
        Some(best_average(summary, &route_1_1())?),
        10.0,
        summary.jitter,
    )
}

fn end_to_end_plan() -> SimulationPlan {
    SimulationPlan::new(v2())
        .with_script(
            Script::new()
                .unlock_route(1, 2)
                .town(1)
                .route(1, 1, 10, 10.0)
                .route(1, 2, 10, 20.0),
        )
        .with_expectation(end_to_end_expectation)
}

fn end_to_end_expectation(summary: &SimulationSummary) -> Result<()> {
    let session = summary.last()?;
    let route_1_2 = ActivityKey::route(1, 2);
    ensure_close(
        "best average",
        Some(best_average(summary, &route_1_2)?),
        20.0,
        summary.jitter,
    )?;
    ensure_close(
        "route-1-1 average",
        session.average(&route_1_1()),
        10.0,
        summary.jitter,
    )?;
    anyhow::ensure!(
        session.known == vec![route_1_1(), route_1_2],
        "known keys out of order: {:?}",
        session.known
    );
    ensure_close(
        "active average",
        session.final_readout.active_average,
        20.0,
        summary.jitter,
    )
}

fn key_switch_plan() -> SimulationPlan {
    SimulationPlan::new(v2())
        .with_script(
            Script::new()
                .town(1)
                .route(1, 1, 5, 10.0)
                .route(1, 2, 5, 10.0)
                .route(1, 1, 9, 10.0)
                .route(1, 2, 9, 10.0),
        )
        .with_expectation(key_switch_expectation)
}

fn key_switch_expectation(summary: &SimulationSummary) -> Result<()> {
    let session = summary.last()?;
    anyhow::ensure!(
        session.store.is_empty(),
        "no window should complete, found {} histories",
        session.store.len()
    );
    anyhow::ensure!(
        session.final_readout.best.is_none(),
        "best must be insufficient data"
    );
    Ok(())
}

fn negative_delta_plan() -> SimulationPlan {
    SimulationPlan::new(v2())
        .with_script(
            Script::new()
                .town(1)
                .route(1, 1, 4, 10.0)
                .spend(500.0)
                .route(1, 1, 7, 10.0),
        )
        .with_expectation(negative_delta_expectation)
}

fn negative_delta_expectation(summary: &SimulationSummary) -> Result<()> {
    anyhow::ensure!(
        history_len(summary, &route_1_1())? == 1,
        "the spend tick should be skipped and the window still complete"
    );
    ensure_close(
        "route-1-1 average",
        summary.last()?.average(&route_1_1()),
        10.0,
        summary.jitter,
    )
}

fn reset_plan() -> SimulationPlan {
    SimulationPlan::new(v2())
        .with_session(
            SessionPlan::new(Script::new().town(1).route(1, 1, 30, 8.0)).with_reset_at(21),
        )
        .with_expectation(reset_expectation)
}

fn reset_expectation(summary: &SimulationSummary) -> Result<()> {
    let session = summary.last()?;
    let reset = session
        .reset
        .as_ref()
        .ok_or_else(|| anyhow!("reset never happened"))?;
    anyhow::ensure!(reset.store_empty, "store should be empty after reset");
    anyhow::ensure!(
        reset.readout.best.is_none(),
        "best should be insufficient data after reset"
    );
    anyhow::ensure!(
        reset.known_before == reset.known_after && reset.known_after > 0,
        "known keys changed across reset ({} -> {})",
        reset.known_before,
        reset.known_after
    );
    anyhow::ensure!(
        history_len(summary, &route_1_1())? == 1,
        "one window should complete after the reset"
    );
    ensure_close(
        "route-1-1 average",
        session.average(&route_1_1()),
        8.0,
        summary.jitter,
    )
}

fn trainer_plan() -> SimulationPlan {
    SimulationPlan::new(v2())
        .with_script(Script::new().town(1).trainer("Rival", 10, 50.0).town(2))
        .with_expectation(trainer_expectation)
}

fn trainer_expectation(summary: &SimulationSummary) -> Result<()> {
    let session = summary.last()?;
    let rival = ActivityKey::trainer("Rival");
    anyhow::ensure!(session.known.contains(&rival), "trainer should be known");
    anyhow::ensure!(
        session.store.contains(&rival),
        "trainer history should survive cleanup"
    );
    ensure_close(
        "best average",
        Some(best_average(summary, &rival)?),
        50.0,
        summary.jitter,
    )
}

fn persistence_restart_plan() -> SimulationPlan {
    SimulationPlan::new(v2())
        .with_script(Script::new().town(1).route(1, 1, 10, 10.0))
        .with_script(Script::new().unlock_route(1, 1).town(1))
        .with_expectation(persistence_restart_expectation)
}

fn persistence_restart_expectation(summary: &SimulationSummary) -> Result<()> {
    anyhow::ensure!(summary.sessions.len() == 2, "expected two sessions");
    let restarted = summary.last()?;
    anyhow::ensure!(
        restarted.loaded.contains(&route_1_1()),
        "restarted session did not load route-1-1"
    );
    ensure_close(
        "best average after restart",
        Some(best_average(summary, &route_1_1())?),
        10.0,
        summary.jitter,
    )
}

fn corrupt_blob_plan() -> SimulationPlan {
    SimulationPlan::new(v2())
        .with_seeded_blob(SchemaVersion::V2, "{not json")
        .with_script(Script::new().town(1).route(1, 1, 10, 10.0))
        .with_expectation(corrupt_blob_expectation)
}

fn corrupt_blob_expectation(summary: &SimulationSummary) -> Result<()> {
    let session = summary.last()?;
    anyhow::ensure!(session.loaded.is_empty(), "corrupt blob should load empty");
    ensure_close(
        "route-1-1 average",
        session.average(&route_1_1()),
        10.0,
        summary.jitter,
    )
}

fn schema_isolation_plan() -> SimulationPlan {
    SimulationPlan::new(v2())
        .with_seeded_blob(SchemaVersion::V1, r#"{"route-1-1":[999.0]}"#)
        .with_script(Script::new().route(1, 1, 3, 10.0))
        .with_expectation(schema_isolation_expectation)
}

fn schema_isolation_expectation(summary: &SimulationSummary) -> Result<()> {
    let session = summary.last()?;
    anyhow::ensure!(
        session.loaded.is_empty(),
        "v2 session must not read v1 samples"
    );
    anyhow::ensure!(
        session.final_readout.best.is_none(),
        "no best expected before a v2 window completes"
    );
    Ok(())
}

fn host_outage_plan() -> SimulationPlan {
    SimulationPlan::new(v2())
        .with_script(
            Script::new()
                .town(1)
                .route(1, 1, 4, 10.0)
                .play(Activity::Offline, 3, 10.0)
                .route(1, 1, 11, 10.0),
        )
        .with_expectation(host_outage_expectation)
}

fn host_outage_expectation(summary: &SimulationSummary) -> Result<()> {
    anyhow::ensure!(
        summary.abandoned() == 3,
        "expected 3 abandoned ticks, got {}",
        summary.abandoned()
    );
    anyhow::ensure!(
        summary.last()?.stats.ticks == 19,
        "every scheduled tick should run"
    );
    // The partial window before the outage is dropped and the first tick
    // back is a new baseline, so exactly one clean window completes.
    anyhow::ensure!(
        history_len(summary, &route_1_1())? == 1,
        "expected one route-1-1 sample"
    );
    ensure_close(
        "route-1-1 average",
        summary.last()?.average(&route_1_1()),
        10.0,
        summary.jitter,
    )
}

fn unrecognized_mode_plan() -> SimulationPlan {
    SimulationPlan::new(v2())
        .with_script(
            Script::new()
                .town(1)
                .route(1, 1, 5, 10.0)
                .play(crate::logic::Activity::Unknown("safari".into()), 3, 40.0)
                .route(1, 1, 10, 10.0),
        )
        .with_expectation(unrecognized_mode_expectation)
}

fn unrecognized_mode_expectation(summary: &SimulationSummary) -> Result<()> {
    let session = summary.last()?;
    let idle_ticks = session.readouts[6..9]
        .iter()
        .filter(|readout| readout.active.is_none())
        .count();
    anyhow::ensure!(idle_ticks == 3, "unknown mode should read as idle");
    anyhow::ensure!(
        history_len(summary, &route_1_1())? == 1,
        "partial window before the unknown mode should be discarded"
    );
    ensure_close(
        "route-1-1 average",
        session.average(&route_1_1()),
        10.0,
        summary.jitter,
    )
}

fn legacy_schema_plan() -> SimulationPlan {
    SimulationPlan::new(TrackerConfig::default().with_schema(SchemaVersion::V1))
        .with_script(Script::new().town(1).route(1, 1, 15, 10.0))
        .with_expectation(legacy_schema_expectation)
}

fn legacy_schema_expectation(summary: &SimulationSummary) -> Result<()> {
    anyhow::ensure!(summary.schema == SchemaVersion::V1, "plan must pin v1");
    let len = history_len(summary, &route_1_1())?;
    anyhow::ensure!(len == 10, "v1 history should cap at 10 samples, got {len}");
    ensure_close(
        "best average",
        Some(best_average(summary, &route_1_1())?),
        10.0,
        summary.jitter,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::Simulator;

    #[test]
    fn every_scenario_passes_with_and_without_jitter() {
        for jitter in [0.0, 0.05] {
            let simulator = Simulator::new(jitter, false);
            for entry in catalog_entries() {
                let plan = entry.plan();
                for seed in [1, 1337] {
                    let summary = simulator.run_plan(entry.key, &plan, seed).unwrap();
                    for expectation in &plan.expectations {
                        if let Err(err) = expectation.evaluate(&summary) {
                            panic!("{} (jitter {jitter}, seed {seed}): {err:#}", entry.key);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn expectations_catch_wrong_outcomes() {
        let simulator = Simulator::new(0.0, false);
        let summary = simulator
            .run_plan("key-switch", &key_switch_plan(), 1)
            .unwrap();
        assert!(smoke_expectation(&summary).is_err());
        assert!(trainer_expectation(&summary).is_err());
    }

    #[test]
    fn ensure_close_respects_jitter_band() {
        assert!(ensure_close("x", Some(10.4), 10.0, 0.05).is_ok());
        assert!(ensure_close("x", Some(10.6), 10.0, 0.05).is_err());
        assert!(ensure_close("x", None, 10.0, 0.05).is_err());
    }
}
