//! SeaWatch console - Entry Point
//!
//! Drives a hosted maritime simulation from the terminal: creates a session,
//! lets it load and auto-start, and exposes the same controls the dashboard
//! offers (start, stop, step, speed, reset).

use seawatch_abm::api::wire::{GridSummary, SimulationParams};
use seawatch_abm::core::config::SeaWatchConfig;
use seawatch_abm::core::error::{Result, SeaWatchError};
use seawatch_abm::session::{spawn_sweep, Outcome, SessionManager, SessionState};

use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Interactive console for the hosted maritime simulation
#[derive(Parser, Debug)]
#[command(name = "seawatch")]
#[command(about = "Create and control a remote scrubber-policy simulation")]
struct Args {
    /// TOML configuration file (timings, retry bounds, API settings)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Base URL of the simulation service (overrides config and environment)
    #[arg(long)]
    api_url: Option<String>,

    /// Developer testing mode: 5 hour inactivity timeout, flagged to the server
    #[arg(long)]
    developer_test: bool,

    /// Country whose ports ban scrubber discharge
    #[arg(long, default_value = "None")]
    national_ban: String,

    /// Port-specific policy overrides
    #[arg(long, default_value = "None")]
    custom_port_policies: String,

    /// Initial speed in frames per second
    #[arg(long, default_value_t = 1.0)]
    fps: f64,

    /// Do not create a simulation on launch
    #[arg(long)]
    no_create: bool,
}

impl Args {
    fn params(&self) -> SimulationParams {
        SimulationParams {
            national_ban: self.national_ban.clone(),
            custom_port_policies: self.custom_port_policies.clone(),
            fps: self.fps,
            ..SimulationParams::default()
        }
    }

    fn load_config(&self) -> Result<SeaWatchConfig> {
        let mut config = match &self.config {
            Some(path) => SeaWatchConfig::load_from_toml(path)?,
            None => SeaWatchConfig::default(),
        }
        .with_env_overrides();
        if let Some(url) = &self.api_url {
            config.api.base_url = url.clone();
        }
        if self.developer_test {
            config.session.developer_test = true;
        }
        config.session.validate().map_err(SeaWatchError::Config)?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("seawatch_abm=info,seawatch=info")),
        )
        .with_writer(io::stderr)
        .init();

    let config = args.load_config()?;
    tracing::info!(
        api = %config.api.base_url,
        developer_test = config.session.developer_test,
        "SeaWatch console starting..."
    );

    let rt = Runtime::new()?;
    let _enter = rt.enter();

    let manager = SessionManager::connect(&config);
    let shutdown = CancellationToken::new();
    let sweep = spawn_sweep(manager.clone(), shutdown.clone());

    println!("\n=== SEAWATCH ===");
    println!("Scrubber discharge policy simulation");
    println!();
    println!("Commands:");
    println!("  create / c      - Create a new simulation");
    println!("  start           - Start (resume) the simulation");
    println!("  stop            - Pause the simulation");
    println!("  step            - Advance one step while paused");
    println!("  speed <fps>     - Change simulation speed");
    println!("  reset           - Delete and recreate the simulation");
    println!("  refresh / r     - Fetch the latest state");
    println!("  status / s      - Show detailed status");
    println!("  cleanup         - Delete the simulation");
    println!("  quit / q        - Exit");
    println!();

    if !args.no_create {
        report(rt.block_on(manager.create(args.params())));
    }

    loop {
        display_status(&manager.snapshot());

        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        match input {
            "quit" | "q" => break,
            "create" | "c" => report(rt.block_on(manager.create(args.params()))),
            "start" => report(rt.block_on(manager.start())),
            "stop" => report(rt.block_on(manager.stop())),
            "step" => report(rt.block_on(manager.step())),
            "reset" => report(rt.block_on(manager.reset(args.params()))),
            "refresh" | "r" => report(rt.block_on(manager.refresh())),
            "cleanup" => report(rt.block_on(manager.cleanup())),
            "status" | "s" => display_detailed_status(&manager.snapshot()),
            _ => {
                if let Some(value) = input.strip_prefix("speed ") {
                    match value.trim().parse::<f64>() {
                        Ok(fps) => report(rt.block_on(manager.set_speed(fps))),
                        Err(_) => println!("Usage: speed <fps>"),
                    }
                } else {
                    println!(
                        "Unknown command. Available: create, start, stop, step, speed <fps>, \
                         reset, refresh, status, cleanup, quit"
                    );
                }
            }
        }
    }

    rt.block_on(manager.unmount());
    shutdown.cancel();
    let _ = rt.block_on(sweep);

    println!("\nGoodbye!");
    Ok(())
}

fn report(result: Result<Outcome>) {
    match result {
        Ok(Outcome::Applied) => {}
        Ok(Outcome::Skipped(reason)) => println!("Skipped: {}", reason),
        Err(e) => println!("Failed: {}", e),
    }
}

fn display_status(state: &SessionState) {
    let session = state
        .session_id
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    let activity = if state.running {
        "running".to_string()
    } else if state.loading {
        format!(
            "{} ({:.0}%)",
            state.loading_stage.description(),
            state.loading_progress
        )
    } else {
        state.loading_stage.description().to_string()
    };
    println!(
        "\n[{}] step {} | {} | {:.1} fps",
        session, state.step_count, activity, state.speed
    );
    if let Some(error) = &state.error {
        println!("  ! {}", error);
    }
}

fn display_detailed_status(state: &SessionState) {
    let grid = GridSummary::of(&state.grid_state);
    let data = &state.model_data;
    println!();
    println!("Simulation: {:?}", state.session_id.as_ref().map(|id| id.as_str()));
    println!("  Stage:    {} ({:.0}%)", state.loading_stage, state.loading_progress);
    println!("  Running:  {}", state.running);
    println!("  Steps:    {}", state.step_count);
    println!("  Speed:    {:.1} fps", state.speed);
    println!(
        "  Grid:     {} ports, {} ships, {} trail points",
        grid.ports, grid.ships, grid.trails
    );
    println!(
        "  Ships:    {} total, {} with scrubbers, {} docked",
        data.num_ships(),
        data.num_scrubber_ships(),
        data.total_docked_ships()
    );
    println!("  Scrubber water: {:.1}", data.total_scrubber_water());
    for port in data.revenue_ports() {
        if let Some(revenue) = data.latest_port_revenue(&port) {
            println!("    {:<20} revenue {:.0}", port, revenue);
        }
    }
    if let Some(error) = &state.error {
        println!("  Error:    {}", error);
    }
}
