//! TMSN Node - broadcast network peer
//!
//! Joins the mesh described by the configuration, broadcasts each stdin
//! line to every peer and prints every payload received from a peer.

mod cli;

use std::time::Duration;

use bytes::Bytes;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tmsn::config::{self, parse_peer_list, NodeConfig};
use tmsn::error::{Error, Result};
use tmsn::network::{start_network_with_config, NetworkHandle};
use tmsn::{logging, version};

use crate::cli::{Cli, Commands, ConfigSubcommand};

fn main() {
    if let Err(e) = real_main() {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn real_main() -> Result<()> {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    let (config_path, overrides) = match cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand);
        }
        Commands::Run {
            config,
            id,
            port,
            peers,
            late_joiners,
            exit_on_eof,
        } => (
            config,
            RunOverrides {
                id,
                port,
                peers,
                late_joiners,
                exit_on_eof,
            },
        ),
    };

    let mut config = NodeConfig::load(config_path.as_deref())?;
    overrides.apply(&mut config)?;

    // The guards must be kept alive for the lifetime of the program
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    let build = version::build_info();
    info!(
        version = %build.full_version(),
        target = %build.target,
        profile = %build.profile,
        "Starting TMSN node"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(num_cpus::get().clamp(2, 8))
        .thread_name("tmsn-node")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    let result = runtime.block_on(run_node(config, overrides.exit_on_eof));

    // The stdin reader sits on a blocking thread that never returns on its own
    runtime.shutdown_timeout(Duration::from_millis(200));
    result
}

/// `run` flags layered over the loaded configuration
struct RunOverrides {
    id: Option<String>,
    port: Option<u16>,
    peers: Vec<String>,
    late_joiners: bool,
    exit_on_eof: bool,
}

impl RunOverrides {
    fn apply(&self, config: &mut NodeConfig) -> Result<()> {
        if let Some(id) = &self.id {
            config.node.id = Some(id.clone());
        }
        if let Some(port) = self.port {
            config.node.listen_port = port;
        }
        if self.late_joiners {
            config.node.listen_for_late_joiners = true;
        }
        for entry in &self.peers {
            let parsed = parse_peer_list(entry);
            if parsed.is_empty() {
                return Err(Error::config_field_invalid(
                    "--peer",
                    format!("expected identity@address, got '{}'", entry),
                ));
            }
            config.peers.extend(parsed);
        }
        config.validate()
    }
}

/// Async node main loop
async fn run_node(config: NodeConfig, exit_on_eof: bool) -> Result<()> {
    let node_id = config.node_id();
    let capacity = config.network.channel_capacity;
    let network_config = config.network_config();
    let drain_timeout = network_config.drain_timeout;

    info!(
        node = %node_id,
        port = config.node.listen_port,
        peers = config.peers.len(),
        direction = ?network_config.direction,
        "Configuration loaded"
    );

    let (incoming_tx, mut incoming_rx) = mpsc::channel::<Bytes>(capacity);
    let (outgoing_tx, outgoing_rx) = mpsc::channel::<Bytes>(capacity);

    let network = start_network_with_config(
        &node_id,
        &config.peers,
        config.node.listen_port,
        config.node.listen_for_late_joiners,
        incoming_tx,
        outgoing_rx,
        network_config,
    )
    .await?;

    // stdin → outgoing channel
    let (eof_tx, mut eof_rx) = mpsc::channel::<()>(1);
    let stdin_tx = outgoing_tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if stdin_tx.send(Bytes::from(line)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
        let _ = eof_tx.send(()).await;
    });

    let shutdown_signal = tokio::signal::ctrl_c();
    tokio::pin!(shutdown_signal);

    let mut stats_timer = stats_interval(config.logging.stats_interval_secs);
    let mut stdout = tokio::io::stdout();
    let mut stdin_open = true;
    let mut incoming_open = true;

    info!("Node event loop started");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Shutdown signal received");
                break;
            }

            eof = eof_rx.recv(), if stdin_open => {
                stdin_open = false;
                debug!(received = eof.is_some(), "stdin closed");
                if exit_on_eof {
                    wait_for_fan_out(&outgoing_tx, drain_timeout).await;
                    break;
                }
            }

            payload = incoming_rx.recv(), if incoming_open => {
                match payload {
                    Some(payload) => {
                        let mut line = String::from_utf8_lossy(&payload).into_owned();
                        line.push('\n');
                        stdout.write_all(line.as_bytes()).await?;
                        stdout.flush().await?;
                    }
                    // Send-only sessions never deliver
                    None => {
                        debug!("Incoming channel closed");
                        incoming_open = false;
                    }
                }
            }

            _ = tick(&mut stats_timer) => {
                log_stats(&network);
            }
        }
    }

    log_stats(&network);
    drop(outgoing_tx);
    network.shutdown().await;

    // Print what was delivered before the channel closed
    while let Ok(payload) = incoming_rx.try_recv() {
        let mut line = String::from_utf8_lossy(&payload).into_owned();
        line.push('\n');
        stdout.write_all(line.as_bytes()).await?;
    }
    stdout.flush().await?;

    info!(node = %node_id, "Node stopped");
    Ok(())
}

/// Wait until the fan-out loop has taken every queued stdin line
async fn wait_for_fan_out(outgoing: &mpsc::Sender<Bytes>, limit: Duration) {
    let wait = async {
        while outgoing.capacity() < outgoing.max_capacity() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    if tokio::time::timeout(limit, wait).await.is_err() {
        warn!("Outgoing payloads still queued at shutdown");
    }
}

fn stats_interval(secs: u64) -> Option<tokio::time::Interval> {
    if secs == 0 {
        return None;
    }
    let period = Duration::from_secs(secs);
    let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    Some(timer)
}

async fn tick(timer: &mut Option<tokio::time::Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn log_stats(network: &NetworkHandle) {
    let stats = network.stats();
    debug!(
        links = network.link_count(),
        peers = ?network.connected_peers(),
        broadcasts = stats.broadcasts,
        frames_sent = stats.frames_sent,
        frames_received = stats.frames_received,
        dropped = stats.dropped_slow_peer,
        rejected = stats.handshakes_rejected,
        dial_failures = stats.dial_failures,
        "Network stats"
    );
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = NodeConfig::load(config.as_deref())?;
            println!("# node id: {}", cfg.node_id());
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Configuration file created: {}", written.display());
        }
        ConfigSubcommand::Validate { config } => {
            let cfg = NodeConfig::load(config.as_deref())?;
            println!(
                "Configuration is valid ({} peers, port {}).",
                cfg.peers.len(),
                cfg.node.listen_port
            );
        }
    }

    Ok(())
}
