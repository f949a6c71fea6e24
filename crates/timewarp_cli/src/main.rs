//! Timewarp CLI
//!
//! Drives the rate-scaled timer layer from the command line:
//! - `simulate`: deterministic run on a manual clock, optionally switching rate
//! - `run`: real-time ticks at a chosen rate
//! - `shortcuts`: list configured keyboard shortcuts
//! - `init`: write a default `timewarp.toml`

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use timewarp_clock::ScaledTime;
use timewarp_core::{is_valid_rate, TimewarpConfig};
use timewarp_runtime::{EventLoop, Globals, ShortcutMap, Timewarp};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "timewarp")]
#[command(author, version, about = "Rate-scaled timers and clock", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ./timewarp.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate timers on a manual clock
    Simulate {
        /// Starting rate (defaults to the configured default rate)
        #[arg(short, long)]
        rate: Option<f64>,

        /// Requested delay in milliseconds
        #[arg(short, long, default_value = "1000")]
        delay: u64,

        /// Use a repeating timer instead of a one-shot
        #[arg(long)]
        repeat: bool,

        /// Real time in milliseconds at which to switch rate
        #[arg(long, requires = "switch_to")]
        switch_at: Option<u64>,

        /// Rate to switch to
        #[arg(long, requires = "switch_at")]
        switch_to: Option<f64>,

        /// Real time in milliseconds to simulate
        #[arg(long, default_value = "5000")]
        until: u64,
    },

    /// Tick a repeating timer in real time
    Run {
        /// Rate to run at (defaults to the configured default rate)
        #[arg(short, long)]
        rate: Option<f64>,

        /// Requested period in milliseconds
        #[arg(short, long, default_value = "500")]
        period: u64,

        /// Real time in milliseconds to run for
        #[arg(short, long, default_value = "3000")]
        duration: u64,
    },

    /// List configured keyboard shortcuts
    Shortcuts,

    /// Write a default config file
    Init {
        /// Output path
        #[arg(default_value = config::DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("timewarp=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("timewarp=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Simulate {
            rate,
            delay,
            repeat,
            switch_at,
            switch_to,
            until,
        } => {
            let config = with_rate(config::load(cli.config.as_deref())?, rate)?;
            let switch = switch_at.zip(switch_to);
            cmd_simulate(config, delay, repeat, switch, until)
        }
        Commands::Run {
            rate,
            period,
            duration,
        } => {
            let config = with_rate(config::load(cli.config.as_deref())?, rate)?;
            cmd_run(config, period, duration)
        }
        Commands::Shortcuts => cmd_shortcuts(config::load(cli.config.as_deref())?),
        Commands::Init { path, force } => cmd_init(path, force),
    }
}

/// Override the configured default rate from the command line
fn with_rate(mut config: TimewarpConfig, rate: Option<f64>) -> Result<TimewarpConfig> {
    if let Some(rate) = rate {
        if !is_valid_rate(rate) {
            anyhow::bail!("Rate must be a positive finite number, got {}", rate);
        }
        config.default_rate = rate;
    }
    Ok(config)
}

fn scaled_now(warp: &Timewarp) -> Option<ScaledTime> {
    warp.clock().map(|clock| clock.time())
}

fn cmd_simulate(
    config: TimewarpConfig,
    delay: u64,
    repeat: bool,
    switch: Option<(u64, f64)>,
    until: u64,
) -> Result<()> {
    let event_loop = EventLoop::manual();
    let globals = Globals::for_loop(&event_loop);
    let warp = Rc::new(
        Timewarp::builder()
            .config(config)
            .install(&globals)
            .context("Failed to install timewarp")?,
    );

    info!(
        "Simulating {} timer of {}ms at rate {}",
        if repeat { "repeating" } else { "one-shot" },
        delay,
        warp.rate()
    );

    let on_fire = {
        let event_loop = event_loop.clone();
        let warp = warp.clone();
        move || match scaled_now(&warp) {
            Some(scaled) => println!("fired at real {:?}, scaled {}", event_loop.now(), scaled),
            None => println!("fired at real {:?}", event_loop.now()),
        }
    };

    let requested = Duration::from_millis(delay);
    if repeat {
        globals.set_interval(on_fire, requested)?;
    } else {
        globals.set_timeout(on_fire, requested)?;
    }

    let until = Duration::from_millis(until);
    let mut fired = 0;
    if let Some((at, rate)) = switch {
        let at = Duration::from_millis(at).min(until);
        fired += event_loop.run_until(at);
        if warp.set_rate(rate) {
            println!("rate -> {} at real {:?}", rate, event_loop.now());
        } else {
            println!("rate {} rejected at real {:?}", rate, event_loop.now());
        }
    }
    fired += event_loop.run_until(until);

    println!(
        "{} callback(s) in {:?} real; {} timer(s) still pending",
        fired,
        until,
        warp.timers().map_or(0, |timers| timers.pending_count())
    );
    Ok(())
}

fn cmd_run(config: TimewarpConfig, period: u64, duration: u64) -> Result<()> {
    let event_loop = EventLoop::real();
    let globals = Globals::for_loop(&event_loop);
    let warp = Rc::new(
        Timewarp::builder()
            .config(config)
            .install(&globals)
            .context("Failed to install timewarp")?,
    );

    info!(
        "Ticking every {}ms (scaled) at rate {} for {}ms",
        period,
        warp.rate(),
        duration
    );

    let tick = {
        let event_loop = event_loop.clone();
        let warp = warp.clone();
        move || {
            let scaled = scaled_now(&warp).map(|time| time.to_string());
            println!(
                "tick real {:?} scaled {}",
                event_loop.now(),
                scaled.as_deref().unwrap_or("-")
            );
        }
    };
    globals.set_interval(tick, Duration::from_millis(period))?;

    let fired = event_loop.advance(Duration::from_millis(duration));
    info!("{} tick(s)", fired);
    Ok(())
}

fn cmd_shortcuts(config: TimewarpConfig) -> Result<()> {
    let shortcuts =
        ShortcutMap::from_config(&config.shortcuts).context("Invalid shortcut configuration")?;

    for binding in shortcuts.bindings() {
        let chords: Vec<String> = binding.chords.iter().map(|chord| chord.to_string()).collect();
        println!("{:<8} {}", binding.command.to_string(), chords.join(", "));
    }
    Ok(())
}

fn cmd_init(path: PathBuf, force: bool) -> Result<()> {
    config::write_default(&path, force)?;
    println!("Wrote {}", path.display());
    Ok(())
}
