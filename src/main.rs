//! msp-osd - MSP display-port OSD client
//!
//! Connects to a flight controller over TCP and keeps an OSD character grid
//! in sync with its display-port stream.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use msp_osd::config::{self, Config};
use msp_osd::network::{Link, LinkEvent, TcpTransport, DEFAULT_RESPONSE_TIMEOUT_MS};
use msp_osd::osd::{OsdScreen, OsdUpdate};
use msp_osd::protocol::{self, command};

/// msp-osd - MSP display-port OSD client
#[derive(Parser)]
#[command(name = "msp-osd")]
#[command(author = "MSP OSD Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Mirror a flight controller's MSP display-port OSD", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a flight controller and follow its OSD
    Connect {
        /// Address of the MSP endpoint
        #[arg(short, long)]
        address: Option<String>,

        /// TCP port of the MSP endpoint
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show protocol information
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    match cli.command {
        Commands::Connect { address, port } => {
            run_connect(config, address, port).await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Info => {
            print_protocol_info();
        }
    }

    Ok(())
}

/// Connect and poll the flight controller until the link drops
async fn run_connect(config: Config, address: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let address = address.unwrap_or_else(|| config.connection.address.clone());
    let port = port.unwrap_or(config.connection.port);
    let net_config = config.network();
    let poll_interval = net_config.poll_interval();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let transport = TcpTransport::new(net_config.connect_timeout());
    let mut link = Link::new(transport, event_tx, net_config);
    let mut screen = OsdScreen::new();

    println!("Connecting to {}:{}...", address, port);
    link.connect(&address, port).await?;

    println!("\n========================================");
    println!("  MSP OSD Connected");
    println!("========================================");
    println!("  Endpoint: {}:{}", address, port);
    println!("  Poll interval: {} ms", poll_interval.as_millis());
    println!("========================================");
    println!("\nPress Ctrl+C to disconnect.\n");

    // The preferences reply tells us which video system the OSD targets
    link.send(command::MSP2_INAV_OSD_PREFERENCES, &[]);

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Main polling loop
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if link.is_connected() {
                    link.receive();
                    link.send(command::MSP_FC_VARIANT, &[]);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nDisconnecting...");
                link.disconnect();
            }
        }

        while let Ok(event) = event_rx.try_recv() {
            handle_event(&mut screen, event);
        }

        if !link.is_connected() {
            break;
        }
    }

    let stats = link.stats();
    tracing::info!(
        "Session ended: {} requests, {} messages, {} OSD frames",
        stats.requests_sent,
        stats.messages_received,
        screen.frames_drawn()
    );

    Ok(())
}

/// Apply a link event to the OSD state
fn handle_event(screen: &mut OsdScreen, event: LinkEvent) {
    match event {
        LinkEvent::MessageReceived { message } => {
            tracing::debug!(
                "Message {:#06x}: {} bytes",
                message.code,
                message.payload.len()
            );
            match screen.handle(&message) {
                Some(OsdUpdate::VideoSystemChanged(system)) => {
                    let (rows, cols) = system.dimensions();
                    println!("Video system: {} ({}x{})", system, cols, rows);
                }
                Some(OsdUpdate::Drawn) => {
                    tracing::trace!(
                        "OSD frame {} drawn, {} cells populated",
                        screen.frames_drawn(),
                        screen.populated()
                    );
                }
                _ => {}
            }
        }
        LinkEvent::Disconnected { reason } => {
            screen.clear();
            println!("Disconnected: {}", reason);
        }
    }
}

/// Print protocol information
fn print_protocol_info() {
    println!("MSP OSD Protocol Information");
    println!("============================\n");

    println!("Requests: MSP v2 ('$X<'), CRC-8/DVB-S2 (poly {:#04x})", protocol::CRC8_DVB_S2_POLY);
    println!("Replies: MSP v1 ('$M>', XOR, jumbo frames) and MSP v2");
    println!("Response timeout: {} ms", DEFAULT_RESPONSE_TIMEOUT_MS);
    println!("Default Port: {}", protocol::DEFAULT_PORT);
}
