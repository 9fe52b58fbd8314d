mod common;
mod logic;
mod storage;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use ratewatch_core::{SchemaVersion, SortDirection, TrackerConfig, format_rate};
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use common::scenario::{TestScenario, get_scenario, list_scenarios};
use common::{parse_seeds, split_csv};
use logic::{
    LogicTester, Script, SessionPlan, SimulationPlan, SimulationSummary, Simulator, StorageTarget,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemaArg {
    /// Raw per-tick deltas, 10 samples per activity
    V1,
    /// 10-tick windows, 30 samples per activity
    V2,
}

impl From<SchemaArg> for SchemaVersion {
    fn from(arg: SchemaArg) -> Self {
        match arg {
            SchemaArg::V1 => Self::V1,
            SchemaArg::V2 => Self::V2,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "ratewatch-tester", version = "0.1.0")]
#[command(about = "Drives the Ratewatch income-rate tracker against a scripted host")]
struct Args {
    /// Scenarios to run (comma-separated, or "all")
    #[arg(long, default_value = "smoke")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Seeds for host income jitter (comma-separated)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Number of iterations per scenario and seed
    #[arg(long, default_value_t = 1)]
    iterations: usize,

    /// Relative income jitter per tick (0.05 = ±5%)
    #[arg(long, default_value_t = 0.05)]
    jitter: f64,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console"])]
    report: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// JSON tracker configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Schema override for --script runs (catalog scenarios pin their own)
    #[arg(long, value_enum)]
    schema: Option<SchemaArg>,

    /// Tick interval override in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Sort the rate table ascending instead of descending
    #[arg(long)]
    ascending: bool,

    /// Play an ad-hoc phase script instead of catalog scenarios,
    /// e.g. "route:1:1 x10 @10, route:1:2 x10 @20, town x5"
    #[arg(long)]
    script: Option<String>,

    /// Persist samples as files under this directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Clear stored samples before playing --script
    #[arg(long)]
    reset: bool,

    /// Sleep the configured tick interval between ticks
    #[arg(long)]
    realtime: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    announce_banner();

    let start_time = Instant::now();
    let config = load_config(&args)?;
    let simulator = build_simulator(&args, &config);

    if let Some(script) = &args.script {
        return run_script(&args, script, config, &simulator);
    }

    let seeds = parse_seeds(&args.seeds)?;
    let scenarios = expand_scenarios(&args.scenarios);
    let results = run_logic_scenarios(&args, &scenarios, &seeds, &config, simulator);

    write_reports(&args, &results, start_time)?;

    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .try_init();
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(output_target.writer(), "  {key:20} - {description}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "💰 Ratewatch Scenario Tester".bright_cyan().bold());
    println!("{}", "============================".cyan());
}

/// Read `--config` if given, apply CLI overrides, then validate.
fn load_config(args: &Args) -> Result<TrackerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            TrackerConfig::from_json(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => TrackerConfig::default(),
    };
    if let Some(schema) = args.schema {
        config.schema = schema.into();
    }
    if let Some(tick_ms) = args.tick_ms {
        config.tick_interval_ms = tick_ms;
    }
    if args.ascending {
        config.sort = SortDirection::Ascending;
    }
    config.validate().context("invalid tracker configuration")?;
    Ok(config)
}

fn build_simulator(args: &Args, config: &TrackerConfig) -> Simulator {
    let storage = match (&args.data_dir, args.script.is_some()) {
        (None, _) => StorageTarget::Memory,
        (Some(dir), true) => StorageTarget::SharedFiles(dir.clone()),
        (Some(dir), false) => StorageTarget::IsolatedFiles(dir.join("scenarios")),
    };
    let pace = if args.realtime {
        Duration::from_millis(config.tick_interval_ms)
    } else {
        Duration::ZERO
    };
    Simulator::new(args.jitter, args.verbose)
        .with_storage(storage)
        .with_pace(pace)
}

fn expand_scenarios(scenarios_arg: &str) -> Vec<String> {
    let mut scenarios = split_csv(scenarios_arg);
    if scenarios.iter().any(|s| s == "all") {
        scenarios.retain(|s| s != "all");
        scenarios.extend(list_scenarios().into_iter().map(|(key, _)| key.to_string()));
    }
    scenarios
}

/// Catalog plans keep their own schema; everything else comes from `config`.
fn with_user_config(mut scenario: TestScenario, config: &TrackerConfig) -> TestScenario {
    scenario.plan.config = TrackerConfig {
        schema: scenario.plan.config.schema,
        ..config.clone()
    };
    scenario
}

fn run_logic_scenarios(
    args: &Args,
    scenarios: &[String],
    seeds: &[u64],
    config: &TrackerConfig,
    simulator: Simulator,
) -> Vec<logic::ScenarioResult> {
    println!("{}", "🧠 Running Scenarios".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    let tester = LogicTester::new(simulator, args.verbose);
    let mut results = Vec::new();
    for scenario_name in scenarios {
        if let Some(scenario) = get_scenario(scenario_name) {
            let scenario = with_user_config(scenario, config);
            results.extend(tester.run_scenario(&scenario, seeds, args.iterations));
        } else {
            eprintln!("⚠️  Unknown scenario: {}", scenario_name.yellow());
        }
    }
    results
}

fn run_script(args: &Args, script: &str, config: TrackerConfig, simulator: &Simulator) -> Result<()> {
    let script = Script::parse(script).context("invalid --script")?;
    let mut session = SessionPlan::new(script);
    if args.reset {
        session = session.with_reset_at(0);
    }
    let plan = SimulationPlan::new(config).with_session(session);
    let seed = parse_seeds(&args.seeds)?.first().copied().unwrap_or_default();
    let summary = simulator.run_plan("script", &plan, seed)?;

    let mut output_target = OutputTarget::new(args.output.clone())?;
    write_script_summary(&mut output_target, &summary)?;
    output_target.flush_inner()?;
    Ok(())
}

fn write_script_summary<W: Write + ?Sized>(out: &mut W, summary: &SimulationSummary) -> Result<()> {
    let session = summary.last()?;
    writeln!(
        out,
        "Ticks: {} ({} abandoned) | schema {} | jitter {}",
        session.stats.ticks, session.stats.abandoned, summary.schema, summary.jitter
    )?;
    writeln!(out, "Active: {}", session.final_readout.active_status())?;
    writeln!(out, "Best:   {}", session.final_readout.best_status())?;
    writeln!(out)?;
    if session.rate_table.is_empty() {
        writeln!(out, "No completed samples yet.")?;
    }
    for row in &session.rate_table {
        let samples = session.store.get(&row.key).map_or(0, |h| h.len());
        writeln!(
            out,
            "  {:24} {:>14}  ({samples} samples)",
            row.key.label(),
            format_rate(row.average)
        )?;
    }
    Ok(())
}

fn write_reports(args: &Args, results: &[logic::ScenarioResult], start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report.as_str() {
        "json" => logic::reports::generate_json_report(&mut output_target, results)?,
        "markdown" => {
            if results.is_empty() {
                writeln!(
                    &mut output_target,
                    "# Ratewatch Scenario Results\n\n_No scenarios executed._"
                )?;
            } else {
                logic::reports::generate_markdown_report(&mut output_target, results)?;
            }
        }
        _ => {
            if results.is_empty() {
                writeln!(&mut output_target, "No scenarios executed.")?;
            } else {
                logic::reports::generate_console_report(
                    &mut output_target,
                    results,
                    start_time.elapsed(),
                )?;
            }
            writeln!(&mut output_target)?;
            writeln!(&mut output_target, "🏁 Total time: {:?}", start_time.elapsed())?;
        }
    }

    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args {
            scenarios: "smoke".to_string(),
            list_scenarios: false,
            seeds: "1337".to_string(),
            iterations: 1,
            jitter: 0.05,
            report: "json".to_string(),
            verbose: false,
            output: None,
            config: None,
            schema: None,
            tick_ms: None,
            ascending: false,
            script: None,
            data_dir: None,
            reset: false,
            realtime: false,
        }
    }

    fn sample_result(passed: bool) -> logic::ScenarioResult {
        logic::ScenarioResult {
            scenario_name: "Smoke".to_string(),
            seed: 1337,
            passed,
            iterations_run: 1,
            successful_iterations: usize::from(passed),
            failures: if passed {
                Vec::new()
            } else {
                vec!["failure".to_string()]
            },
            average_duration: Duration::from_millis(1),
            performance_data: vec![Duration::from_millis(1)],
        }
    }

    #[test]
    fn expands_all_scenarios_keyword() {
        let expanded = expand_scenarios("all");
        assert_eq!(expanded.len(), list_scenarios().len());
        assert!(expanded.contains(&"persistence-restart".to_string()));
    }

    #[test]
    fn expand_scenarios_without_all_preserves_order() {
        let expanded = expand_scenarios("reset, smoke");
        assert_eq!(expanded, vec!["reset".to_string(), "smoke".to_string()]);
    }

    #[test]
    fn load_config_applies_overrides_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.json");
        std::fs::write(&path, r#"{"storage_namespace":"qa","tick_interval_ms":250}"#).unwrap();
        let args = Args {
            config: Some(path),
            schema: Some(SchemaArg::V1),
            ascending: true,
            ..base_args()
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.schema, SchemaVersion::V1);
        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.storage_namespace, "qa");
        assert_eq!(config.sort, SortDirection::Ascending);

        let bad = Args {
            tick_ms: Some(5),
            ..base_args()
        };
        assert!(load_config(&bad).is_err());
    }

    #[test]
    fn catalog_scenarios_keep_their_schema() {
        let config = TrackerConfig {
            storage_namespace: "qa".into(),
            ..TrackerConfig::default().with_schema(SchemaVersion::V2)
        };
        let scenario = with_user_config(get_scenario("legacy-schema").unwrap(), &config);
        assert_eq!(scenario.plan.config.schema, SchemaVersion::V1);
        assert_eq!(scenario.plan.config.storage_namespace, "qa");
    }

    #[test]
    fn data_dir_selects_storage_target() {
        let config = TrackerConfig::default();
        let shared = Args {
            script: Some("town x1".into()),
            data_dir: Some(PathBuf::from("data")),
            ..base_args()
        };
        let simulator = build_simulator(&shared, &config);
        assert!(format!("{simulator:?}").contains("SharedFiles"));
        let isolated = Args {
            data_dir: Some(PathBuf::from("data")),
            ..base_args()
        };
        assert!(format!("{:?}", build_simulator(&isolated, &config)).contains("IsolatedFiles"));
    }

    #[test]
    fn runs_every_catalog_scenario() {
        let args = base_args();
        let scenarios = expand_scenarios("all");
        let results = run_logic_scenarios(
            &args,
            &scenarios,
            &[7],
            &TrackerConfig::default(),
            Simulator::new(args.jitter, false),
        );
        assert_eq!(results.len(), scenarios.len());
        for result in &results {
            assert!(result.passed, "{}: {:?}", result.scenario_name, result.failures);
        }
    }

    #[test]
    fn script_runs_persist_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("script.txt");
        let args = Args {
            script: Some("town x1, route:1:1 x10 @10".into()),
            data_dir: Some(dir.path().join("data")),
            jitter: 0.0,
            output: Some(output.clone()),
            ..base_args()
        };
        let config = load_config(&args).unwrap();
        let simulator = build_simulator(&args, &config);
        run_script(&args, "town x1, route:1:1 x10 @10", config, &simulator).unwrap();

        let content = std::fs::read_to_string(&output).unwrap();
        assert!(content.contains("Best:   Route 1 $10.0 / sec"));
        assert!(dir.path().join("data/ratewatch.samples.v2.json").exists());
    }

    #[test]
    fn maybe_list_scenarios_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("scenarios.txt");
        let args = Args {
            list_scenarios: true,
            output: Some(temp.clone()),
            ..base_args()
        };
        assert!(maybe_list_scenarios(&args).unwrap());
        let content = std::fs::read_to_string(temp).unwrap();
        assert!(content.contains("Available scenarios"));
        assert!(content.contains("key-switch"));
    }

    #[test]
    fn maybe_list_scenarios_returns_false_when_disabled() {
        assert!(!maybe_list_scenarios(&base_args()).unwrap());
    }

    #[test]
    fn write_reports_markdown_empty_results() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("report.md");
        let args = Args {
            report: "markdown".to_string(),
            output: Some(temp.clone()),
            ..base_args()
        };
        write_reports(&args, &[], Instant::now()).unwrap();
        let content = std::fs::read_to_string(temp).unwrap();
        assert!(content.contains("No scenarios executed"));
    }

    #[test]
    fn write_reports_emits_json_for_results() {
        let dir = tempfile::tempdir().unwrap();
        let temp = dir.path().join("report.json");
        let args = Args {
            output: Some(temp.clone()),
            ..base_args()
        };
        write_reports(&args, &[sample_result(false)], Instant::now()).unwrap();
        let content = std::fs::read_to_string(temp).unwrap();
        assert!(content.contains("scenario_name"));
        assert!(content.contains("failure"));
    }

    #[test]
    fn output_target_stdout_writes() {
        let mut target = OutputTarget::new(None).unwrap();
        target.write_all(b"ok").unwrap();
        target.flush().unwrap();
    }
}
