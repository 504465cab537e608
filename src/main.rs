//! Energy ledger entry point: CLI wiring, source construction, and one refresh.

use std::path::Path;
use std::process;

use chrono::{DateTime, Utc};
use tracing::info;
use tracing_subscriber::EnvFilter;

use energy_ledger::config::EngineConfig;
use energy_ledger::engine::pipeline::{Engine, Window};
use energy_ledger::engine::types::Channel;
use energy_ledger::error::Result;
use energy_ledger::io::export::export_ledger;
use energy_ledger::io::import::{import_prices, import_telemetry};
use energy_ledger::sources::{MemoryPrices, MemoryTelemetry};
use energy_ledger::synthetic::Scenario;

/// Parsed CLI arguments.
struct CliArgs {
    config_path: Option<String>,
    preset: Option<String>,
    scenario: String,
    telemetry: Option<String>,
    prices: Option<String>,
    now: Option<DateTime<Utc>>,
    include_fees: bool,
    seed_override: Option<u64>,
    ledger_out: Option<String>,
    #[cfg(feature = "api")]
    serve: bool,
    #[cfg(feature = "api")]
    port: u16,
}

fn print_help() {
    eprintln!("energy-ledger: reconcile household energy flows and price them per hour");
    eprintln!();
    eprintln!("Usage: energy-ledger [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>          Load engine configuration from a TOML file");
    eprintln!("  --preset <name>          Use a built-in configuration (default, strict)");
    eprintln!("  --scenario <name>        Synthetic day when no telemetry is given");
    eprintln!("                           (sunny, winter, flaky_load_sensor)");
    eprintln!("  --telemetry <path>       Read telemetry CSV (timestamp,channel,watts)");
    eprintln!("  --prices <path>          Read prices JSON (supplier priceInfo or day-ahead array)");
    eprintln!("  --now <rfc3339>          Evaluation instant (default: last sample or wall clock)");
    eprintln!("  --include-fees           Include taxes and grid fees in costs");
    eprintln!("  --seed <u64>             Override the synthetic scenario seed");
    eprintln!("  --ledger-out <path>      Export the hourly ledger to CSV");
    #[cfg(feature = "api")]
    {
        eprintln!("  --serve                  Start REST API server after the refresh");
        eprintln!("  --port <u16>             API server port (default: 3000)");
    }
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("Set RUST_LOG (e.g. RUST_LOG=debug) to see reconciliation diagnostics.");
}

fn require_value(args: &[String], i: usize, flag: &str, kind: &str) -> String {
    match args.get(i) {
        Some(v) => v.clone(),
        None => {
            eprintln!("error: {flag} requires a {kind} argument");
            process::exit(1);
        }
    }
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        config_path: None,
        preset: None,
        scenario: "sunny".to_string(),
        telemetry: None,
        prices: None,
        now: None,
        include_fees: false,
        seed_override: None,
        ledger_out: None,
        #[cfg(feature = "api")]
        serve: false,
        #[cfg(feature = "api")]
        port: 3000,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--config" => {
                i += 1;
                cli.config_path = Some(require_value(&args, i, "--config", "path"));
            }
            "--preset" => {
                i += 1;
                cli.preset = Some(require_value(&args, i, "--preset", "name"));
            }
            "--scenario" => {
                i += 1;
                cli.scenario = require_value(&args, i, "--scenario", "name");
            }
            "--telemetry" => {
                i += 1;
                cli.telemetry = Some(require_value(&args, i, "--telemetry", "path"));
            }
            "--prices" => {
                i += 1;
                cli.prices = Some(require_value(&args, i, "--prices", "path"));
            }
            "--now" => {
                i += 1;
                let raw = require_value(&args, i, "--now", "timestamp");
                match DateTime::parse_from_rfc3339(&raw) {
                    Ok(t) => cli.now = Some(t.with_timezone(&Utc)),
                    Err(e) => {
                        eprintln!("error: --now value \"{raw}\" is not RFC 3339: {e}");
                        process::exit(1);
                    }
                }
            }
            "--include-fees" => {
                cli.include_fees = true;
            }
            "--seed" => {
                i += 1;
                let raw = require_value(&args, i, "--seed", "u64");
                if let Ok(s) = raw.parse::<u64>() {
                    cli.seed_override = Some(s);
                } else {
                    eprintln!("error: --seed value \"{raw}\" is not a valid u64");
                    process::exit(1);
                }
            }
            "--ledger-out" => {
                i += 1;
                cli.ledger_out = Some(require_value(&args, i, "--ledger-out", "path"));
            }
            #[cfg(feature = "api")]
            "--serve" => {
                cli.serve = true;
            }
            #[cfg(feature = "api")]
            "--port" => {
                i += 1;
                let raw = require_value(&args, i, "--port", "u16");
                if let Ok(p) = raw.parse::<u16>() {
                    cli.port = p;
                } else {
                    eprintln!("error: --port value \"{raw}\" is not a valid u16");
                    process::exit(1);
                }
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn load_config(cli: &CliArgs) -> EngineConfig {
    // --config takes priority, then --preset, then defaults
    let loaded = if let Some(ref path) = cli.config_path {
        EngineConfig::from_toml_file(Path::new(path))
    } else if let Some(ref name) = cli.preset {
        EngineConfig::from_preset(name)
    } else {
        Ok(EngineConfig::default())
    };
    let mut config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    if cli.include_fees {
        config.tariff.include_fees_and_taxes = true;
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }
    config
}

fn run(cli: &CliArgs, config: EngineConfig) -> Result<()> {
    let clock = config.aggregation.clock()?;
    let mut scenario = Scenario::from_preset(&cli.scenario)?;
    if let Some(seed) = cli.seed_override {
        scenario = scenario.with_seed(seed);
    }

    let (channels, now) = match cli.telemetry {
        Some(ref path) => {
            let channels = import_telemetry(Path::new(path))?;
            let last = channels
                .get(config.reconciliation.reference_channel)
                .last()
                .map(|s| s.timestamp);
            (channels, cli.now.or(last).unwrap_or_else(Utc::now))
        }
        None => {
            let now = cli.now.unwrap_or_else(Utc::now);
            info!(scenario = %scenario.name, seed = scenario.seed, "generating synthetic day");
            (scenario.generate(&clock, now).channels, now)
        }
    };
    let prices = match cli.prices {
        Some(ref path) => import_prices(Path::new(path))?,
        None => scenario.prices(&clock, now),
    };

    let samples = channels.get(Channel::GridNet).len();
    let engine = Engine::new(config, MemoryTelemetry::new(channels), MemoryPrices::new(prices))?;
    let policy = engine.default_policy();
    let snapshot = engine.refresh(Window::today(now, engine.clock()), policy)?;
    info!(samples, now = %now, "refresh complete");

    for entry in &snapshot.ledger.entries {
        println!("{entry}");
    }
    println!("\n{}", snapshot.summary);

    if let Some(ref path) = cli.ledger_out {
        export_ledger(&snapshot.ledger.entries, Path::new(path))?;
        eprintln!("Ledger written to {path}");
    }

    #[cfg(feature = "api")]
    if cli.serve {
        use std::net::SocketAddr;
        use std::sync::Arc;

        let state = Arc::new(energy_ledger::api::AppState::new(engine, Some(now)));
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(energy_ledger::api::serve(state, addr))?;
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = parse_args();
    let config = load_config(&cli);

    if let Err(e) = run(&cli, config) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
