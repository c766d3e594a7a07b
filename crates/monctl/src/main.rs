//! monctl command-line tool.
//!
//! # Usage
//!
//! ```text
//! monctl [--config <FILE>] <COMMAND>
//!
//! Commands:
//!   list [--json]                 List attached monitors
//!   primary                       Print the primary monitor
//!   at <X> <Y>                    Monitors containing a desktop point
//!   mouse                         Print the pointer position
//!   arrange <FILE> [--dry-run]    Apply an arrangement file
//!   save <FILE>                   Save the current setup
//!   restore <FILE>                Restore a saved setup
//!   set <NAME> [OPTIONS]          Change one monitor
//!   watch [--interval-ms <MS>]    Print plug/change events until Ctrl-C
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`, falling back to the
//! `log_level` in the config file.
//!
//! `watch` forwards events from the watchdog thread to the async main task
//! over a tokio channel, so printing never runs on the watchdog thread.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use monctl::infrastructure::backend::native_backend;
use monctl::infrastructure::storage::config::{load_config, load_config_from, AppConfig};
use monctl::infrastructure::storage::setup_file::{
    load_arrangement, load_setup_record, save_setup_record,
};
use monctl::{
    ChangeEvent, ChangeKind, DisplayMode, Monitor, MonitorManager, Orientation, Point, PowerState,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Query, arrange and watch the monitors attached to this machine.
#[derive(Debug, Parser)]
#[command(name = "monctl", version)]
struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true, env = "MONCTL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List attached monitors.
    List {
        /// Print the full state of every monitor as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the primary monitor.
    Primary,
    /// List the monitors containing a desktop point.
    At {
        #[arg(allow_hyphen_values = true)]
        x: i32,
        #[arg(allow_hyphen_values = true)]
        y: i32,
    },
    /// Print the pointer position.
    Mouse,
    /// Solve and apply an arrangement file.
    Arrange {
        file: PathBuf,
        /// Print the solved positions without applying them.
        #[arg(long)]
        dry_run: bool,
    },
    /// Save the current setup to a file.
    Save { file: PathBuf },
    /// Restore a setup saved with `save`.
    Restore { file: PathBuf },
    /// Change properties of one monitor.
    Set(SetArgs),
    /// Print plug and property-change events until Ctrl-C.
    Watch {
        /// Polling interval; defaults to the configured interval.
        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

#[derive(Debug, Args)]
struct SetArgs {
    name: String,
    /// Mode as WIDTHxHEIGHT or WIDTHxHEIGHT@HZ.
    #[arg(long, value_parser = parse_mode)]
    mode: Option<ModeArg>,
    #[arg(long, value_enum)]
    orientation: Option<OrientationArg>,
    /// Absolute position as X,Y.
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
    position: Option<Point>,
    /// Make this monitor primary.
    #[arg(long)]
    primary: bool,
    #[arg(long, value_enum)]
    power: Option<PowerArg>,
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    brightness: Option<u8>,
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    contrast: Option<u8>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OrientationArg {
    Normal,
    Right,
    Inverted,
    Left,
}

impl From<OrientationArg> for Orientation {
    fn from(arg: OrientationArg) -> Self {
        match arg {
            OrientationArg::Normal => Orientation::Normal,
            OrientationArg::Right => Orientation::Right,
            OrientationArg::Inverted => Orientation::Inverted,
            OrientationArg::Left => Orientation::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PowerArg {
    On,
    Off,
    Suspend,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ModeArg {
    width: u32,
    height: u32,
    rate: Option<f64>,
}

fn parse_mode(s: &str) -> Result<ModeArg, String> {
    let (size, rate) = match s.split_once('@') {
        Some((size, rate)) => {
            let rate: f64 = rate.parse().map_err(|_| format!("invalid refresh rate in {s:?}"))?;
            (size, Some(rate))
        }
        None => (s, None),
    };
    let (w, h) = size
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
    Ok(ModeArg {
        width: w.parse().map_err(|_| format!("invalid width in {s:?}"))?,
        height: h.parse().map_err(|_| format!("invalid height in {s:?}"))?,
        rate,
    })
}

fn parse_point(s: &str) -> Result<Point, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got {s:?}"))?;
    Ok(Point::new(
        x.trim().parse().map_err(|_| format!("invalid x in {s:?}"))?,
        y.trim().parse().map_err(|_| format!("invalid y in {s:?}"))?,
    ))
}

/// The monitor's mode matching `arg`: the closest rate when one is given,
/// otherwise the highest.
fn pick_mode(monitor: &Monitor, arg: ModeArg) -> Option<DisplayMode> {
    let candidates = monitor
        .all_modes()
        .into_iter()
        .filter(|m| m.width == arg.width && m.height == arg.height);
    match arg.rate {
        Some(rate) => candidates.min_by(|a, b| {
            (a.frequency - rate)
                .abs()
                .total_cmp(&(b.frequency - rate).abs())
        }),
        None => candidates.max_by(|a, b| a.frequency.total_cmp(&b.frequency)),
    }
}

// ── Output ────────────────────────────────────────────────────────────────────

fn describe(monitor: &Monitor) -> String {
    let rect = monitor.rect();
    let mut line = format!(
        "{}{} {}x{}{:+}{:+}",
        monitor.name(),
        if monitor.is_primary() { " (primary)" } else { "" },
        rect.width(),
        rect.height(),
        rect.left,
        rect.top,
    );
    if let Some(mode) = monitor.mode() {
        line.push_str(&format!(" {mode}"));
    }
    if let Some(orientation) = monitor.orientation() {
        line.push_str(&format!(" rot={}", orientation.degrees()));
    }
    if let Some((sx, sy)) = monitor.scale() {
        line.push_str(&format!(" scale={sx:.0}%x{sy:.0}%"));
    }
    if monitor.power() != PowerState::On {
        line.push_str(&format!(" [{:?}]", monitor.power()));
    }
    line
}

fn print_event(event: &ChangeEvent) {
    let label = match event.kind {
        ChangeKind::PlugCountChanged => "plug",
        ChangeKind::PropertyChanged => "change",
    };
    println!(
        "{label}: {} ({} attached)",
        event.names.join(", "),
        event.snapshot.len()
    );
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn set(manager: &MonitorManager, args: SetArgs) -> anyhow::Result<()> {
    let SetArgs {
        name,
        mode,
        orientation,
        position,
        primary,
        power,
        brightness,
        contrast,
    } = args;
    let monitor = manager
        .find_monitor_with_name(&name)
        .with_context(|| format!("no monitor named {name}"))?;

    if let Some(power) = power {
        match power {
            PowerArg::On => monitor.turn_on(),
            PowerArg::Off => monitor.turn_off(),
            PowerArg::Suspend => monitor.suspend(),
        }
        .context("changing power state")?;
    }
    if let Some(arg) = mode {
        let Some(mode) = pick_mode(&monitor, arg) else {
            bail!("{name} has no {}x{} mode", arg.width, arg.height);
        };
        monitor.set_mode(mode).context("changing mode")?;
    }
    if let Some(orientation) = orientation {
        monitor
            .set_orientation(orientation.into())
            .context("changing orientation")?;
    }
    if primary {
        monitor.set_primary().context("making monitor primary")?;
    }
    if let Some(position) = position {
        monitor.set_position(position).context("moving monitor")?;
    }
    if let Some(brightness) = brightness {
        monitor.set_brightness(brightness).context("changing brightness")?;
    }
    if let Some(contrast) = contrast {
        monitor.set_contrast(contrast).context("changing contrast")?;
    }

    println!("{}", describe(&monitor));
    Ok(())
}

async fn watch(manager: MonitorManager, interval: Duration) -> anyhow::Result<()> {
    manager.set_watchdog_interval(interval);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ChangeEvent>();
    let plug_tx = tx.clone();
    // A send error means the receiver is gone and we are shutting down.
    let plug = manager.register_plug_listener(move |event| {
        let _ = plug_tx.send(event.clone());
    })?;
    let change = manager.register_change_listener(move |event| {
        let _ = tx.send(event.clone());
    })?;

    info!(interval_ms = interval.as_millis() as u64, "watching monitors; press Ctrl-C to stop");
    for monitor in manager.all_monitors() {
        println!("{}", describe(&monitor));
    }

    loop {
        tokio::select! {
            Some(event) = rx.recv() => print_event(&event),
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let manager = Arc::new(manager);
    tokio::task::spawn_blocking(move || {
        manager.unregister_plug_listener(plug);
        manager.unregister_change_listener(change);
    })
    .await
    .context("stopping the watchdog")?;
    Ok(())
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    };
    let log_level = loaded
        .as_ref()
        .map(|c| c.logging.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();

    let config = match loaded {
        Ok(config) => config,
        Err(e) if cli.config.is_some() => {
            return Err(anyhow::Error::new(e).context("loading config"));
        }
        Err(e) => {
            warn!(error = %e, "using default configuration");
            AppConfig::default()
        }
    };

    let manager = MonitorManager::from_config(native_backend(), &config)
        .context("starting monitor manager")?;

    match cli.command {
        Command::List { json } => {
            if json {
                let states: std::collections::BTreeMap<String, _> = manager
                    .all_monitors()
                    .iter()
                    .map(|m| (m.name(), m.state()))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&states)?);
            } else {
                for monitor in manager.all_monitors() {
                    println!("{}", describe(&monitor));
                }
            }
        }
        Command::Primary => match manager.primary() {
            Some(monitor) => println!("{}", describe(&monitor)),
            None => println!("no primary monitor"),
        },
        Command::At { x, y } => {
            for monitor in manager.find_monitors_at_point(Point::new(x, y)) {
                println!("{}", describe(&monitor));
            }
        }
        Command::Mouse => match manager.mouse_position() {
            Some(p) => println!("{},{}", p.x, p.y),
            None => bail!("pointer position is not available on this platform"),
        },
        Command::Arrange { file, dry_run } => {
            let spec = load_arrangement(&file)
                .with_context(|| format!("reading arrangement {}", file.display()))?;
            let positions = if dry_run {
                manager.solve_arrangement(&spec)?
            } else {
                manager.arrange_monitors(&spec)?
            };
            for (name, p) in positions {
                println!("{name}: {},{}", p.x, p.y);
            }
        }
        Command::Save { file } => {
            let setup = manager.save_setup();
            save_setup_record(&setup.to_record(), &file)
                .with_context(|| format!("writing setup {}", file.display()))?;
            info!(monitors = setup.len(), path = %file.display(), "setup saved");
        }
        Command::Restore { file } => {
            let record = load_setup_record(&file)
                .with_context(|| format!("reading setup {}", file.display()))?;
            let report = manager.restore_setup_record(record);
            for failure in report.failures() {
                println!("{} {}: {:?}", failure.monitor, failure.field, failure.outcome);
            }
            report.into_result()?;
        }
        Command::Set(args) => set(&manager, args)?,
        Command::Watch { interval_ms } => {
            let interval = interval_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.watchdog.interval());
            watch(manager, interval).await?;
        }
    }

    Ok(())
}
