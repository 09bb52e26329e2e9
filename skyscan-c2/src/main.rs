//! skyscan-c2: CLI + service that points a camera at the best visible aircraft.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use comfy_table::{Cell, Table};
use tracing_subscriber::EnvFilter;

use skyscan_core::config::{self, Config, SwitchMargin};
use skyscan_core::{parse_ledger_str, CommandKind, DecisionEngine, PointingCommand};

mod service;
mod transport;
mod web;

use service::Service;
use transport::{LogTransport, Transport, WebhookTransport};

#[derive(Parser)]
#[command(
    name = "skyscan-c2",
    version,
    about = "Select the best visible aircraft for a steerable camera"
)]
struct Cli {
    /// Log filter (e.g. info, debug, skyscan_core=trace)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Config file (defaults to ~/.skyscan/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the selection service with its HTTP ingest API
    Serve {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Feed a JSON-lines file of ledger updates through an engine
    Replay {
        /// Path to file with one ledger update per line ("-" for stdin)
        file: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Print the effective configuration after validation
    CheckConfig {
        #[command(flatten)]
        overrides: Overrides,
    },
}

/// Settings that override the config file. Each also reads an env var.
#[derive(Args, Debug, Default)]
struct Overrides {
    #[arg(long, env = "TRIPOD_LATITUDE", allow_negative_numbers = true)]
    latitude: Option<f64>,
    #[arg(long, env = "TRIPOD_LONGITUDE", allow_negative_numbers = true)]
    longitude: Option<f64>,
    #[arg(long, env = "TRIPOD_ALTITUDE", allow_negative_numbers = true)]
    altitude: Option<f64>,

    /// Minimum elevation angle in degrees
    #[arg(long, env = "MIN_TILT", allow_negative_numbers = true)]
    min_tilt: Option<f64>,
    /// Maximum elevation angle in degrees
    #[arg(long, env = "MAX_TILT", allow_negative_numbers = true)]
    max_tilt: Option<f64>,
    /// Minimum aircraft altitude in meters
    #[arg(long, env = "MIN_ALTITUDE", allow_negative_numbers = true)]
    min_altitude: Option<f64>,
    /// Maximum aircraft altitude in meters
    #[arg(long, env = "MAX_ALTITUDE")]
    max_altitude: Option<f64>,
    /// Maximum ground range in meters
    #[arg(long, env = "OBJECT_DISTANCE_THRESHOLD")]
    max_range: Option<f64>,
    /// Improvement required to switch targets (meters, or a fraction when relative)
    #[arg(long, env = "DISTANCE_IMPROVEMENT_THRESHOLD")]
    switch_margin: Option<f64>,
    /// absolute or relative
    #[arg(long, env = "SWITCH_POLICY")]
    switch_policy: Option<String>,
    /// Seconds without a report before an aircraft is dropped
    #[arg(long, env = "STALE_TIMEOUT")]
    stale_timeout: Option<f64>,
    /// Seconds to project aircraft ahead before selection
    #[arg(long, env = "LEAD_TIME")]
    lead_time: Option<f64>,
    /// JSON occlusion map of {azimuth, elevation} points
    #[arg(long, env = "MAPPING_FILEPATH")]
    mapping_filepath: Option<String>,

    #[arg(long, env = "TICK_INTERVAL")]
    tick_interval: Option<f64>,
    #[arg(long, env = "REFRESH_INTERVAL")]
    refresh_interval: Option<f64>,
    #[arg(long, env = "HEARTBEAT_INTERVAL")]
    heartbeat_interval: Option<f64>,
    /// Base URL that topics are POSTed under; logs messages when unset
    #[arg(long, env = "PUBLISH_URL")]
    publish_url: Option<String>,
    #[arg(long, env = "HOSTNAME")]
    hostname: Option<String>,
    /// Bearer token required on POST routes
    #[arg(long, env = "AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,
    #[arg(long, env = "SKYSCAN_HOST")]
    host: Option<String>,
    #[arg(long, env = "SKYSCAN_PORT")]
    port: Option<u16>,
}

impl Overrides {
    fn apply(&self, config: &mut Config) -> skyscan_core::Result<()> {
        let obs = &mut config.observer;
        let svc = &mut config.service;

        if let Some(v) = self.latitude {
            obs.location.latitude = v;
        }
        if let Some(v) = self.longitude {
            obs.location.longitude = v;
        }
        if let Some(v) = self.altitude {
            obs.location.altitude = v;
        }
        if let Some(v) = self.min_tilt {
            obs.min_tilt_deg = v;
        }
        if let Some(v) = self.max_tilt {
            obs.max_tilt_deg = v;
        }
        if let Some(v) = self.min_altitude {
            obs.min_altitude_m = v;
        }
        if let Some(v) = self.max_altitude {
            obs.max_altitude_m = v;
        }
        if self.max_range.is_some() {
            obs.max_range_m = self.max_range;
        }
        if self.switch_policy.is_some() || self.switch_margin.is_some() {
            let policy = self
                .switch_policy
                .as_deref()
                .unwrap_or(obs.switch_margin.policy());
            let value = self.switch_margin.unwrap_or(obs.switch_margin.value());
            obs.switch_margin = SwitchMargin::from_policy(policy, value)?;
        }
        if let Some(v) = self.stale_timeout {
            obs.stale_after = v;
        }
        if let Some(v) = self.lead_time {
            obs.lead_time = v;
        }
        if let Some(v) = self.refresh_interval {
            obs.refresh_interval = v;
        }
        if self.mapping_filepath.is_some() {
            obs.mapping_filepath = self.mapping_filepath.clone();
        }

        if let Some(v) = self.tick_interval {
            svc.tick_interval = v;
        }
        if let Some(v) = self.heartbeat_interval {
            svc.heartbeat_interval = v;
        }
        if self.publish_url.is_some() {
            svc.publish_url = self.publish_url.clone();
        }
        if self.auth_token.is_some() {
            svc.auth_token = self.auth_token.clone();
        }
        if let Some(v) = &self.hostname {
            svc.hostname = v.clone();
        }
        if let Some(v) = &self.host {
            svc.host = v.clone();
        }
        if let Some(v) = self.port {
            svc.port = v;
        }
        Ok(())
    }
}

/// Load the config file, layer flags/env on top, load the occlusion map,
/// and validate.
fn resolve_config(path: Option<&Path>, overrides: &Overrides) -> skyscan_core::Result<Config> {
    let mut config = match path {
        Some(p) => config::load_config_from(p)?,
        None => config::load_config()?,
    };
    overrides.apply(&mut config)?;
    config.observer.load_occlusion()?;
    config.validate()?;
    Ok(config)
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn config_or_exit(path: Option<&Path>, overrides: &Overrides) -> Config {
    resolve_config(path, overrides).unwrap_or_else(|e| {
        tracing::error!(error = %e, "invalid configuration");
        eprintln!("Error: {e}");
        std::process::exit(1);
    })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve { overrides } => cmd_serve(config_or_exit(config_path, &overrides)).await,
        Commands::Replay { file, overrides } => {
            cmd_replay(&file, config_or_exit(config_path, &overrides))
        }
        Commands::CheckConfig { overrides } => {
            cmd_check_config(config_or_exit(config_path, &overrides))
        }
    }
}

// ---------------------------------------------------------------------------
// serve
// ---------------------------------------------------------------------------

async fn cmd_serve(config: Config) {
    let engine = DecisionEngine::new(config.observer.clone()).unwrap_or_else(|e| {
        tracing::error!(error = %e, "cannot start engine");
        std::process::exit(1);
    });

    let transport: Arc<dyn Transport> = match &config.service.publish_url {
        Some(url) => {
            tracing::info!(%url, "publishing to webhook");
            Arc::new(WebhookTransport::new(url))
        }
        None => {
            tracing::info!("no publish URL configured, logging output");
            Arc::new(LogTransport)
        }
    };

    let obs = &config.observer;
    tracing::info!(
        latitude = obs.location.latitude,
        longitude = obs.location.longitude,
        altitude = obs.location.altitude,
        min_tilt = obs.min_tilt_deg,
        max_tilt = obs.max_tilt_deg,
        min_altitude = obs.min_altitude_m,
        max_altitude = obs.max_altitude_m,
        margin = ?obs.switch_margin,
        "observer configured"
    );

    let service = Service::start(engine, transport, &config.service).unwrap_or_else(|e| {
        tracing::error!(error = %e, "cannot start service");
        std::process::exit(1);
    });
    let state = Arc::new(web::AppState {
        engine: service.handle(),
        auth_token: config.service.auth_token.clone(),
    });
    let mut server = tokio::spawn(web::serve(
        state,
        config.service.host.clone(),
        config.service.port,
        service.shutdown_signal(),
    ));

    let mut exit_code = 0;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("shutdown requested"),
        result = &mut server => {
            match result {
                Ok(Ok(())) => tracing::warn!("HTTP server exited"),
                Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed"),
                Err(e) => tracing::error!(error = %e, "HTTP server task failed"),
            }
            exit_code = 1;
        }
    }

    let stats = service.shutdown().await;
    if !server.is_finished() {
        if let Err(e) = server.await {
            tracing::warn!(error = %e, "HTTP server task failed during shutdown");
        }
    }

    tracing::info!(
        cycles = stats.cycles,
        updates = stats.updates_applied,
        evicted = stats.aircraft_evicted,
        commands = stats.commands_emitted,
        target_changes = stats.target_changes,
        "shutdown complete"
    );
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

// ---------------------------------------------------------------------------
// replay
// ---------------------------------------------------------------------------

/// A target transition seen during replay.
struct Transition {
    line: usize,
    command: PointingCommand,
}

fn cmd_replay(file: &Path, config: Config) {
    let reader: Box<dyn BufRead> = if file.to_str() == Some("-") {
        Box::new(io::stdin().lock())
    } else {
        let f = std::fs::File::open(file).unwrap_or_else(|e| {
            eprintln!("Error opening {}: {e}", file.display());
            std::process::exit(1);
        });
        Box::new(io::BufReader::new(f))
    };

    let mut engine = DecisionEngine::new(config.observer).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    let summary = replay(&mut engine, reader);

    println!();
    println!(
        "Lines: {} read, {} unparseable; reports: {} accepted, {} rejected",
        summary.lines, summary.bad_lines, summary.accepted, summary.rejected
    );
    println!(
        "Cycles: {}, evicted: {}, target changes: {}",
        engine.stats().cycles,
        engine.stats().aircraft_evicted,
        engine.stats().target_changes
    );
    println!();

    if summary.transitions.is_empty() {
        println!("No target was selected.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Line", "Time", "Event", "Target", "Flight", "Slant (m)", "Elev", "Bearing",
    ]);
    for t in &summary.transitions {
        let cmd = &t.command;
        let event = match (cmd.kind, cmd.is_override) {
            (CommandKind::Idle, _) => "idle",
            (_, true) => "override",
            _ => "new target",
        };
        table.add_row(vec![
            Cell::new(t.line),
            Cell::new(format!("{:.1}", cmd.timestamp)),
            Cell::new(event),
            Cell::new(cmd.target_id.as_deref().unwrap_or("-")),
            Cell::new(cmd.flight.as_deref().unwrap_or("-")),
            Cell::new(
                cmd.slant_distance
                    .map(|d| format!("{d:.0}"))
                    .unwrap_or("-".into()),
            ),
            Cell::new(
                cmd.elevation
                    .map(|e| format!("{e:.1}"))
                    .unwrap_or("-".into()),
            ),
            Cell::new(
                cmd.bearing
                    .map(|b| format!("{b:.1}"))
                    .unwrap_or("-".into()),
            ),
        ]);
    }
    println!("{table}");
}

#[derive(Default)]
struct ReplaySummary {
    lines: usize,
    bad_lines: usize,
    accepted: usize,
    rejected: usize,
    transitions: Vec<Transition>,
}

/// Drive `engine` from JSON-lines ledger updates. The clock is the newest
/// report timestamp seen so far; stale aircraft are evicted before each line.
fn replay(engine: &mut DecisionEngine, reader: impl BufRead) -> ReplaySummary {
    let mut summary = ReplaySummary::default();
    let mut clock = f64::MIN;

    for (idx, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };
        let text = line.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        summary.lines += 1;

        let parsed = match parse_ledger_str(text) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(line = idx + 1, error = %e, "skipping unparseable line");
                summary.bad_lines += 1;
                continue;
            }
        };
        for r in &parsed.rejected {
            tracing::warn!(line = idx + 1, entry = %r.entry, reason = %r.reason, "dropped report");
        }
        summary.accepted += parsed.accepted.len();
        summary.rejected += parsed.rejected.len();

        clock = parsed
            .accepted
            .iter()
            .map(|s| s.last_updated)
            .fold(clock, f64::max);
        if clock == f64::MIN {
            continue;
        }

        engine.evict_stale(clock);
        let outcome = engine.apply_batch(parsed.accepted, clock);
        summary.transitions.extend(
            outcome
                .commands
                .into_iter()
                .filter(|c| c.kind != CommandKind::Refresh)
                .map(|command| Transition {
                    line: idx + 1,
                    command,
                }),
        );
    }
    summary
}

// ---------------------------------------------------------------------------
// check-config
// ---------------------------------------------------------------------------

fn cmd_check_config(config: Config) {
    let obs = &config.observer;
    let svc = &config.service;

    println!();
    println!("Configuration OK");
    println!();
    println!(
        "  Observer:    {:.5}, {:.5} @ {:.0} m",
        obs.location.latitude, obs.location.longitude, obs.location.altitude
    );
    println!("  Tilt:        {} to {} deg", obs.min_tilt_deg, obs.max_tilt_deg);
    println!(
        "  Altitude:    {} to {} m",
        obs.min_altitude_m, obs.max_altitude_m
    );
    println!(
        "  Max range:   {}",
        obs.max_range_m
            .map(|r| format!("{r} m"))
            .unwrap_or("-".into())
    );
    println!(
        "  Switch:      {} {}",
        obs.switch_margin.policy(),
        obs.switch_margin.value()
    );
    println!("  Stale after: {} s", obs.stale_after);
    println!("  Lead time:   {} s", obs.lead_time);
    println!(
        "  Occlusion:   {}",
        match (&obs.mapping_filepath, &obs.occlusion) {
            (Some(path), Some(map)) => format!("{path} ({} points)", map.len()),
            _ => "-".into(),
        }
    );
    println!();
    println!("  Listen:      {}:{}", svc.host, svc.port);
    println!("  Publish:     {}", svc.publish_url.as_deref().unwrap_or("log"));
    println!(
        "  Intervals:   tick {} s, refresh {} s, heartbeat {} s",
        svc.tick_interval, obs.refresh_interval, svc.heartbeat_interval
    );
    println!("  Auth:        {}", if svc.auth_token.is_some() { "bearer" } else { "none" });
    println!();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
