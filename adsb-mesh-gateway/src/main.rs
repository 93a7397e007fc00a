//! adsb-mesh: forward dump1090 aircraft reports to a Meshtastic mesh.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use comfy_table::{Cell, Table};
use tokio::sync::mpsc;

use adsb_mesh_core::config::{load_config, Config};
use adsb_mesh_core::types::icao_to_string;
use adsb_mesh_core::{
    decode_line, Aggregator, AircraftRecord, DispatchReport, Ingest, MarkSentPolicy,
};

mod crypto;
mod dispatch;
mod feed;
mod gateway;
mod logging;
mod proto;
mod sink;

use dispatch::{Dispatcher, SINK_TIMEOUT};
use feed::FeedReader;
use gateway::Gateway;

/// Lines buffered between the feed reader and the aggregator.
const FEED_QUEUE: usize = 1024;

#[derive(Parser)]
#[command(name = "adsb-mesh", version, about = "ADS-B to Meshtastic gateway")]
struct Cli {
    /// TOML config file. It must exist and parse, or the gateway exits with
    /// an error. Command-line flags override its values
    #[arg(long, global = true, env = "ADSB_MESH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging (prints raw feed lines)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to dump1090 and broadcast aircraft to the mesh
    Run(RunArgs),

    /// Feed SBS lines from a capture file through the aggregator and print aircraft table
    Replay {
        /// Path to file containing SBS-1 lines, or `-` for stdin
        file: PathBuf,

        /// Print each decoded message as JSON instead of the summary table
        #[arg(short, long)]
        raw: bool,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// dump1090 host
    #[arg(long, env = "DUMP1090_HOST")]
    dump1090_host: Option<String>,

    /// dump1090 SBS-1 port
    #[arg(long)]
    dump1090_port: Option<u16>,

    /// Meshtastic device host (TCP stream API)
    #[arg(long, env = "MESHTASTIC_HOST")]
    meshtastic_host: Option<String>,

    /// Meshtastic device port
    #[arg(long)]
    meshtastic_port: Option<u16>,

    /// Meshtastic serial device, used when no host is given (default: auto-detect)
    #[arg(long, env = "MESHTASTIC_PORT_PATH")]
    meshtastic_port_path: Option<String>,

    /// Disable output to a Meshtastic device
    #[arg(long)]
    no_meshtastic: bool,

    /// Broadcast over MUDP (UDP multicast)
    #[arg(long)]
    mudp: bool,

    /// MUDP multicast group
    #[arg(long)]
    mudp_host: Option<String>,

    /// MUDP port
    #[arg(long)]
    mudp_port: Option<u16>,

    /// Gateway node id, `!xxxxxxxx`
    #[arg(long)]
    mudp_node_id: Option<String>,

    /// Gateway long name
    #[arg(long)]
    mudp_node_longname: Option<String>,

    /// Gateway short name
    #[arg(long)]
    mudp_node_shortname: Option<String>,

    /// MUDP channel name
    #[arg(long)]
    mudp_channel: Option<String>,

    /// MUDP channel key: default | none | 16 or 32 byte hex
    #[arg(long, env = "ADSB_MESH_MUDP_PSK")]
    mudp_psk: Option<String>,

    /// Seconds between broadcasts of the same aircraft
    #[arg(long)]
    update_interval: Option<f64>,

    /// When a dispatch counts as sent: attempted | any-success
    #[arg(long)]
    mark_sent_policy: Option<MarkSentPolicy>,

    /// Seconds of silence before an aircraft is forgotten (0 = never)
    #[arg(long = "retention")]
    retention_secs: Option<f64>,

    /// POST each aircraft summary as JSON to this URL
    #[arg(long, env = "ADSB_MESH_WEBHOOK")]
    webhook: Option<String>,
}

impl RunArgs {
    /// Layer the flags that were given over `config`.
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.dump1090_host {
            config.feed.host = host.clone();
        }
        if let Some(port) = self.dump1090_port {
            config.feed.port = port;
        }
        if let Some(host) = &self.meshtastic_host {
            config.meshtastic.host = Some(host.clone());
        }
        if let Some(port) = self.meshtastic_port {
            config.meshtastic.port = port;
        }
        if let Some(path) = &self.meshtastic_port_path {
            config.meshtastic.serial_port = Some(path.clone());
        }
        if self.no_meshtastic {
            config.meshtastic.enabled = false;
        }
        if self.mudp {
            config.mudp.enabled = true;
        }
        if let Some(group) = &self.mudp_host {
            config.mudp.group = group.clone();
        }
        if let Some(port) = self.mudp_port {
            config.mudp.port = port;
        }
        if let Some(id) = &self.mudp_node_id {
            config.mudp.node_id = id.clone();
        }
        if let Some(name) = &self.mudp_node_longname {
            config.mudp.long_name = name.clone();
        }
        if let Some(name) = &self.mudp_node_shortname {
            config.mudp.short_name = name.clone();
        }
        if let Some(channel) = &self.mudp_channel {
            config.mudp.channel = channel.clone();
        }
        if let Some(psk) = &self.mudp_psk {
            config.mudp.psk = psk.clone();
        }
        if let Some(secs) = self.update_interval {
            config.update_interval = secs;
        }
        if let Some(policy) = self.mark_sent_policy {
            config.mark_sent_policy = policy;
        }
        if let Some(secs) = self.retention_secs {
            config.retention_secs = secs;
        }
        if let Some(url) = &self.webhook {
            config.webhook.url = Some(url.clone());
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path).unwrap_or_else(|e| {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }),
        None => Config::default(),
    };
    config.debug |= cli.debug;

    logging::setup_logging(if config.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });

    match cli.command {
        Commands::Run(args) => {
            args.apply(&mut config);
            if let Err(e) = config.validate() {
                log::error!("{e}");
                std::process::exit(1);
            }
            cmd_run(config).await
        }
        Commands::Replay { file, raw } => cmd_replay(&config, file, raw),
    }
}

async fn cmd_run(config: Config) {
    log::info!(
        "Starting ADS-B gateway: dump1090 {}:{}, update interval {}s, mark sent when {}",
        config.feed.host,
        config.feed.port,
        config.update_interval,
        config.mark_sent_policy
    );

    let sinks = sink::build_sinks(&config).await;
    let dispatcher = Dispatcher::new(sinks, SINK_TIMEOUT);
    log::info!("Output sinks: {}", dispatcher.sink_names().join(", "));

    let agg = Aggregator::new(
        config.update_interval,
        config.mark_sent_policy,
        config.retention_secs,
    );
    let gateway = Gateway::new(agg, Arc::new(dispatcher));

    let (tx, rx) = mpsc::channel(FEED_QUEUE);
    let feed = FeedReader::new(&config.feed.host, config.feed.port, config.debug);
    let feed_task = tokio::spawn(feed.run(tx));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };
    gateway.run(rx, shutdown).await;

    feed_task.abort();
    match feed_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            log::error!("{e}");
            std::process::exit(1);
        }
        Err(e) if e.is_cancelled() => {}
        Err(e) => {
            log::error!("Feed task failed: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_replay(config: &Config, file: PathBuf, raw: bool) {
    let reader: Box<dyn BufRead> = if file.to_str() == Some("-") {
        Box::new(io::stdin().lock())
    } else {
        let f = std::fs::File::open(&file).unwrap_or_else(|e| {
            eprintln!("Error opening {}: {e}", file.display());
            std::process::exit(1);
        });
        Box::new(io::BufReader::new(f))
    };

    let (agg, _) = replay(reader, config, raw);
    if !raw {
        print_summary(&agg);
    }
}

/// Run captured lines through a fresh aggregator. Dispatches go nowhere and
/// count as sent. Returns the aggregator and the last synthetic timestamp.
fn replay(reader: impl BufRead, config: &Config, raw: bool) -> (Aggregator, f64) {
    let mut agg = Aggregator::new(
        config.update_interval,
        config.mark_sent_policy,
        config.retention_secs,
    );
    let mut timestamp = 0.0f64;

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }

        if raw {
            if let Ok(frame) = decode_line(&line) {
                match serde_json::to_string(&frame) {
                    Ok(json) => println!("{json}"),
                    Err(e) => eprintln!("Error encoding frame: {e}"),
                }
            }
        }

        // Captures carry no receive time; space lines 0.1 s apart
        if let Ingest::Dispatch { icao, summary, .. } = agg.ingest(&line, timestamp) {
            if !raw {
                println!("{timestamp:>9.1}  {}", summary.to_text());
            }
            agg.complete(&icao, timestamp, &DispatchReport::default());
        }
        timestamp += 0.1;
    }

    (agg, timestamp)
}

/// Every tracked aircraft, busiest first.
fn by_message_count(agg: &Aggregator) -> Vec<&AircraftRecord> {
    let mut sorted: Vec<_> = agg.store.iter().collect();
    sorted.sort_by_key(|a| std::cmp::Reverse(a.message_count));
    sorted
}

fn print_summary(agg: &Aggregator) {
    println!();
    println!(
        "Lines: {} total, {} decoded, {} errors, {} other records",
        agg.total_lines, agg.decoded, agg.parse_errors, agg.unsupported
    );
    println!(
        "Aircraft: {} tracked, {} with callsign and position, {} dispatches",
        agg.store.len(),
        agg.store.eligible_count(),
        agg.dispatches
    );
    println!();

    let aircraft = by_message_count(agg);
    if aircraft.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec![
        "ICAO", "Callsign", "Squawk", "Alt (ft)", "Speed (kts)", "Trk", "VRate", "Lat", "Lon",
        "Msgs", "Sent",
    ]);

    for ac in aircraft {
        table.add_row(vec![
            Cell::new(icao_to_string(&ac.icao)),
            Cell::new(ac.callsign.as_deref().unwrap_or("-")),
            Cell::new(ac.squawk.as_deref().unwrap_or("-")),
            Cell::new(
                ac.altitude_ft
                    .map(|a| a.to_string())
                    .unwrap_or("-".into()),
            ),
            Cell::new(
                ac.ground_speed_kts
                    .map(|s| format!("{s:.0}"))
                    .unwrap_or("-".into()),
            ),
            Cell::new(
                ac.track_deg
                    .map(|t| format!("{t:.1}"))
                    .unwrap_or("-".into()),
            ),
            Cell::new(
                ac.vertical_rate_fpm
                    .map(|v| format!("{v:+}"))
                    .unwrap_or("-".into()),
            ),
            Cell::new(ac.lat.map(|l| format!("{l:.4}")).unwrap_or("-".into())),
            Cell::new(ac.lon.map(|l| format!("{l:.4}")).unwrap_or("-".into())),
            Cell::new(ac.message_count),
            Cell::new(
                ac.last_broadcast
                    .map(|t| format!("{t:.1}"))
                    .unwrap_or("-".into()),
            ),
        ]);
    }

    println!("{table}");
}
