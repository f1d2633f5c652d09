//! # FreeD Reader
//!
//! Receive and inspect FreeD D1 camera tracking packets over UDP.
//!
//! `freed-reader listen` binds a UDP port and prints every decoded frame,
//! either as a labelled console block or as JSON Lines. `freed-reader simulate`
//! sends generated packets so a receiver can be tested without a tracking
//! system.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use freed_reader::config::Config;
use freed_reader::display::{
    ConsoleOptions, ConsolePrinter, FrameSink, JsonLinesPrinter, SnapshotFeed,
};
use freed_reader::session::{ReceiveSession, SessionState};
use freed_reader::simulator::{default_pose, Simulator};

/// How often the listener checks for a lost signal
const SIGNAL_CHECK_PERIOD: Duration = Duration::from_secs(1);

/// Log level used by `--debug`
const DEBUG_LOG_LEVEL: &str = "debug";

#[derive(Debug, Parser)]
#[command(name = "freed-reader", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose logging and packet hex dumps
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Receive and print FreeD packets
    Listen(ListenArgs),

    /// Send generated FreeD packets to a receiver
    Simulate(SimulateArgs),
}

#[derive(Debug, Args)]
struct ListenArgs {
    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// UDP port to bind
    #[arg(short, long)]
    port: Option<u16>,

    /// Print JSON Lines instead of the console layout
    #[arg(long)]
    json: bool,

    /// Show raw values only
    #[arg(long)]
    raw: bool,

    /// Discard packets with a bad checksum
    #[arg(long, conflicts_with = "ignore_checksum")]
    strict_checksum: bool,

    /// Do not check or report checksums
    #[arg(long)]
    ignore_checksum: bool,

    /// Render the spare word as timecode at this frame rate
    #[arg(long, value_name = "FPS")]
    timecode: Option<f64>,

    /// Wait for Enter before processing each packet
    #[arg(long)]
    step: bool,

    /// Pause after each packet
    #[arg(long, value_name = "SECS")]
    delay: Option<f64>,

    /// Redraw in place instead of scrolling
    #[arg(long)]
    clear: bool,
}

#[derive(Debug, Args)]
struct SimulateArgs {
    /// Receiver address as host:port
    #[arg(short, long)]
    target: Option<String>,

    /// Packets per second
    #[arg(short, long)]
    rate: Option<u32>,

    /// Stop after this many packets
    #[arg(short = 'n', long)]
    count: Option<u64>,

    /// Camera id to report
    #[arg(long)]
    camera_id: Option<u8>,

    /// Cycle the genlock phase counter in the spare word
    #[arg(long, value_name = "BOOL")]
    genlock: Option<bool>,

    /// Move the camera along a periodic path
    #[arg(long)]
    sweep: bool,
}

impl ListenArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.receiver.host = host.clone();
        }
        if let Some(port) = self.port {
            config.receiver.port = port;
        }
        if self.raw {
            config.decode.convert_units = false;
        }
        if self.strict_checksum {
            config.decode.checksum_fatal = true;
        }
        if self.ignore_checksum {
            config.decode.ignore_checksum = true;
            config.decode.checksum_fatal = false;
        }
        if let Some(fps) = self.timecode {
            config.spare.timecode_fps = Some(fps);
        }
    }

    fn per_packet_delay(&self) -> Result<Duration> {
        match self.delay {
            None => Ok(Duration::ZERO),
            Some(secs) => Duration::try_from_secs_f64(secs)
                .map_err(|e| anyhow!("invalid --delay {}: {}", secs, e)),
        }
    }
}

impl SimulateArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(target) = &self.target {
            config.simulator.target = target.clone();
        }
        if let Some(rate) = self.rate {
            config.simulator.rate_hz = rate;
        }
        if let Some(camera_id) = self.camera_id {
            config.simulator.camera_id = camera_id;
        }
        if let Some(genlock) = self.genlock {
            config.simulator.genlock = genlock;
        }
        if self.sweep {
            config.simulator.sweep = true;
        }
    }
}

/// Main entry point for FreeD Reader
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load the configuration file (if any) and apply command-line overrides
///    - Set up logging to stderr and optionally a daily log file
///
/// 2. **Main Loop**
///    - `listen`: bind, run the receive session and print each new snapshot
///    - `simulate`: send packets at the configured rate
///
/// 3. **Graceful Shutdown**
///    - Ctrl+C stops the session or simulator
///    - Totals are printed before exit
///
/// # Errors
///
/// Returns error if:
/// - The configuration is invalid
/// - The UDP socket cannot be bound
/// - The session stopped on a transport error
///
/// # Examples
///
/// ```bash
/// freed-reader listen --port 45000 --timecode 25
/// freed-reader simulate --target 127.0.0.1:45000 --rate 50 --sweep
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    match &cli.command {
        Command::Listen(args) => args.apply(&mut config),
        Command::Simulate(args) => args.apply(&mut config),
    }
    config.validate()?;

    let _log_guard = init_logging(&config, cli.debug)?;
    info!("FreeD Reader v{} starting...", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Command::Listen(args) => listen(&config, args, cli.debug).await,
        Command::Simulate(args) => simulate(&config, args.count).await,
    }
}

/// Install the tracing subscriber
///
/// `RUST_LOG` directives are combined with the configured level. The returned
/// guard flushes the log file and must live until exit.
fn init_logging(config: &Config, debug: bool) -> Result<Option<WorkerGuard>> {
    let level = if debug { DEBUG_LOG_LEVEL } else { config.logging.level.as_str() };
    let directive: Directive = level
        .parse()
        .with_context(|| format!("invalid log level {:?}", level))?;
    let filter = EnvFilter::from_default_env().add_directive(directive);

    let (file_layer, guard) = match &config.logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.logging.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Receive packets until Ctrl+C or a fatal session error
async fn listen(config: &Config, args: &ListenArgs, debug: bool) -> Result<()> {
    let mut session_config = config.session_config();
    session_config.options.step_by_step = args.step;
    session_config.options.per_packet_delay = args.per_packet_delay()?;

    let mut session = ReceiveSession::new(session_config)?;
    let local_addr = session.bind()?;

    let mut sink: Box<dyn FrameSink> = if args.json {
        Box::new(JsonLinesPrinter::stdout())
    } else {
        Box::new(ConsolePrinter::stdout(ConsoleOptions {
            ignore_checksum: config.decode.ignore_checksum,
            clear_screen: args.clear,
            debug,
            timecode_fps: config.spare.timecode_fps,
        }))
    };

    let mut updates = session.subscribe();
    session.run()?;

    info!("Listening for FreeD packets on {}", local_addr);
    info!("Press Ctrl+C to exit");

    // Enter presses release packets in step mode. A plain thread so exit never
    // waits on a blocked stdin read.
    let (step_tx, mut step_rx) = mpsc::channel::<()>(1);
    if args.step {
        info!("Step mode: press Enter to process each packet");
        std::thread::spawn(move || {
            for _ in io::stdin().lock().lines() {
                if step_tx.blocking_send(()).is_err() {
                    break;
                }
            }
        });
    } else {
        drop(step_tx);
    }

    let mut signal_check = interval(SIGNAL_CHECK_PERIOD);
    signal_check.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut feed = SnapshotFeed::new();
    let mut signal_lost = false;

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                feed.deliver(&snapshot, sink.as_mut())?;

                if snapshot.state == SessionState::Stopped {
                    break;
                }
            }

            Some(()) = step_rx.recv() => {
                debug!("Advancing one packet");
                session.advance();
            }

            _ = signal_check.tick() => {
                let stale = session.snapshot().is_stale(Instant::now());
                if stale && !signal_lost {
                    warn!("No FreeD signal: no packets for over 2 seconds");
                } else if !stale && signal_lost {
                    info!("FreeD signal restored");
                }
                signal_lost = stale;
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    session.stop().await?;
    let snapshot = session.snapshot();
    sink.on_finish(&snapshot)?;
    info!(
        packets = snapshot.counters.packets,
        errors = snapshot.counters.errors,
        "Session finished"
    );

    if let Some(error) = snapshot.last_error {
        bail!("session stopped: {}", error);
    }
    Ok(())
}

/// Send generated packets until the count is reached or Ctrl+C
async fn simulate(config: &Config, count: Option<u64>) -> Result<()> {
    let settings = &config.simulator;
    let mut simulator = Simulator::connect(
        &settings.target,
        default_pose(settings.camera_id),
        settings.genlock,
    )
    .await?;
    simulator.set_sweep(settings.sweep);

    info!("Press Ctrl+C to exit");
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl+C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };
    simulator.run(settings.rate_hz, count, shutdown).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_signal_check_constant() {
        assert_eq!(SIGNAL_CHECK_PERIOD, Duration::from_secs(1));
        assert!(
            SIGNAL_CHECK_PERIOD < freed_reader::session::STALE_AFTER,
            "lost signal should be noticed within the stale window"
        );
    }

    #[test]
    fn test_listen_overrides() {
        let cli = parse(&[
            "freed-reader", "listen", "--host", "127.0.0.1", "-p", "6301", "--raw",
            "--strict-checksum", "--timecode", "25",
        ]);
        let Command::Listen(args) = &cli.command else {
            panic!("expected listen");
        };

        let mut config = Config::default();
        args.apply(&mut config);
        assert!(config.validate().is_ok());
        assert_eq!(config.receiver.host, "127.0.0.1");
        assert_eq!(config.receiver.port, 6301);
        assert!(!config.decode.convert_units);
        assert!(config.decode.checksum_fatal);
        assert_eq!(config.spare.timecode_fps, Some(25.0));
    }

    #[test]
    fn test_listen_defaults_keep_config() {
        let cli = parse(&["freed-reader", "listen"]);
        let Command::Listen(args) = &cli.command else {
            panic!("expected listen");
        };

        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config, Config::default());
        assert_eq!(args.per_packet_delay().unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_checksum_flags_conflict() {
        let result = Cli::try_parse_from([
            "freed-reader", "listen", "--strict-checksum", "--ignore-checksum",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_delay_parsing() {
        let cli = parse(&["freed-reader", "listen", "--delay", "0.5"]);
        let Command::Listen(args) = &cli.command else {
            panic!("expected listen");
        };
        assert_eq!(args.per_packet_delay().unwrap(), Duration::from_millis(500));

        let cli = parse(&["freed-reader", "listen", "--delay=-1"]);
        let Command::Listen(args) = &cli.command else {
            panic!("expected listen");
        };
        assert!(args.per_packet_delay().is_err(), "negative delay must be rejected");
    }

    #[test]
    fn test_simulate_overrides() {
        let cli = parse(&[
            "freed-reader", "--debug", "simulate", "-t", "10.0.0.5:45000", "-r", "50",
            "-n", "100", "--camera-id", "7", "--genlock", "false", "--sweep",
        ]);
        assert!(cli.debug);
        let Command::Simulate(args) = &cli.command else {
            panic!("expected simulate");
        };

        let mut config = Config::default();
        args.apply(&mut config);
        assert!(config.validate().is_ok());
        assert_eq!(config.simulator.target, "10.0.0.5:45000");
        assert_eq!(config.simulator.rate_hz, 50);
        assert_eq!(config.simulator.camera_id, 7);
        assert!(!config.simulator.genlock);
        assert!(config.simulator.sweep);
        assert_eq!(args.count, Some(100));
    }

    #[test]
    fn test_simulate_rate_validated() {
        let cli = parse(&["freed-reader", "simulate", "--rate", "5000"]);
        let Command::Simulate(args) = &cli.command else {
            panic!("expected simulate");
        };

        let mut config = Config::default();
        args.apply(&mut config);
        assert!(config.validate().is_err());
    }
}
