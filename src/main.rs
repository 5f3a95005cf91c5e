use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use modem_rs::logging::init_logger_with_default;
use modem_rs::{log_info, DecodedMessage, IncomingMessageHandler, ModemConfig, ModemRegistry};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "modem-cli")]
#[command(about = "CLI tool for AT-command cellular modems")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Candidate port or pattern; replaces the configured list
    #[arg(short, long = "port")]
    ports: Vec<String>,

    #[arg(short, long)]
    baud: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List candidate ports without opening them
    Ports,
    /// Probe every candidate and show the modems found
    Scan,
    /// Send a raw AT command
    At { port: String, command: String },
    /// Show manufacturer, model, IMEI, IMSI, number and operator
    Info { port: String },
    Signal { port: String },
    /// List stored messages, concatenated parts merged
    List { port: String },
    Send { port: String, number: String, text: String },
    Delete { port: String, index: u32 },
    /// Print unsolicited output and incoming messages until Ctrl-C
    Monitor,
}

fn load_config(cli: &Cli) -> Result<ModemConfig> {
    let mut config = match &cli.config {
        Some(path) => ModemConfig::from_file(path)?,
        None => ModemConfig::default(),
    };
    config.apply_env().context("reading environment overrides")?;
    if !cli.ports.is_empty() {
        config.ports = cli.ports.clone();
    }
    if let Some(baud) = cli.baud {
        config.baud_rate = baud;
    }
    config.validate()?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_message(message: DecodedMessage, port: &str) {
    let when = message.timestamp.as_deref().unwrap_or("-");
    println!("[{port}] {when} {}: {}", message.sender, message.text);
}

async fn connect(registry: &ModemRegistry, port: &str) -> Result<String> {
    registry
        .connect(port)
        .await
        .with_context(|| format!("no modem answering on {port}"))
}

async fn monitor(registry: Arc<ModemRegistry>, buffer: usize) -> Result<()> {
    let ports = registry.scan().await;
    if ports.is_empty() {
        bail!("no modems found");
    }
    log_info(&format!("Monitoring {}", ports.join(", ")));

    let (mut events, cancel) = registry.subscribe(buffer);
    let health = registry.spawn_health_monitor();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => println!("[{}] {}", event.port, event.text.trim()),
                None => break,
            },
            _ = &mut ctrl_c => break,
        }
    }

    cancel.cancel();
    if let Some(health) = health {
        health.abort();
    }
    registry.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger_with_default("info");

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let buffer = config.event_buffer;
    let handler: Arc<dyn IncomingMessageHandler> =
        Arc::new(|message: DecodedMessage, port: &str| print_message(message, port));
    let registry = Arc::new(ModemRegistry::new(config).with_handler(handler));

    match cli.command {
        Commands::Ports => print_json(&registry.list_ports().await)?,
        Commands::Scan => {
            registry.scan().await;
            print_json(&registry.list_ports().await)?;
        }
        Commands::At { port, command } => {
            let port = connect(&registry, &port).await?;
            println!("{}", registry.send_command(&port, &command).await?);
        }
        Commands::Info { port } => {
            let port = connect(&registry, &port).await?;
            print_json(&registry.device_info(&port).await?)?;
        }
        Commands::Signal { port } => {
            let port = connect(&registry, &port).await?;
            print_json(&registry.signal_quality(&port).await?)?;
        }
        Commands::List { port } => {
            let port = connect(&registry, &port).await?;
            print_json(&registry.list_messages(&port).await?)?;
        }
        Commands::Send { port, number, text } => {
            let port = connect(&registry, &port).await?;
            let report = registry.send_message(&port, &number, &text).await?;
            log_info(&format!("Sent {} part(s) to {number}", report.parts));
        }
        Commands::Delete { port, index } => {
            let port = connect(&registry, &port).await?;
            registry.delete_message(&port, index).await?;
            log_info(&format!("Deleted message {index}"));
        }
        Commands::Monitor => return monitor(registry, buffer).await,
    }

    registry.shutdown().await;
    Ok(())
}
