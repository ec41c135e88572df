use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use bromic_link_lib::device::hub::{LEARN_ATTEMPTS, LEARN_SPACING};
use bromic_link_lib::{BromicProtocol, BromicResponse, DeviceHub, HubOptions, HubSettings};

/// Bench tool for Bromic Smart Heat Link bridges
#[derive(Parser)]
#[command(name = "bromic-link", version, about)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON file with hub settings (retries and timings)
    #[arg(long, global = true)]
    settings: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List serial ports
    Ports,
    /// Send a button press to a target
    Send {
        #[arg(long)]
        port: String,
        #[arg(long)]
        id: u16,
        #[arg(long)]
        button: u16,
    },
    /// Send a raw hex frame, e.g. 540001000156
    Raw {
        #[arg(long)]
        port: String,
        hex: String,
    },
    /// Teach a receiver a button
    Learn {
        #[arg(long)]
        port: String,
        #[arg(long)]
        id: u16,
        #[arg(long)]
        button: u16,
        #[arg(long, default_value_t = LEARN_ATTEMPTS)]
        attempts: u32,
    },
    /// Check that the bridge answers
    Probe {
        #[arg(long)]
        port: String,
    },
    /// Summarize the paired controllers in a stored options blob
    Controllers { options: std::path::PathBuf },
    /// Print example frames
    Examples,
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn load_settings(path: Option<&std::path::Path>) -> anyhow::Result<HubSettings> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Ok(HubSettings::from_json(&json)?)
        }
        None => Ok(HubSettings::default()),
    }
}

fn print_response(response: &BromicResponse) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}

async fn connected_hub(port: &str, settings: HubSettings) -> anyhow::Result<DeviceHub> {
    let hub = DeviceHub::new(port, settings);
    hub.connect().await?;
    Ok(hub)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let settings = load_settings(cli.settings.as_deref())?;

    match cli.command {
        Command::Ports => {
            let ports = DeviceHub::discover_ports().await?;
            println!("{}", serde_json::to_string_pretty(&ports)?);
        }
        Command::Send { port, id, button } => {
            let hub = connected_hub(&port, settings).await?;
            let result = hub.send(id, button).await;
            hub.disconnect().await;
            print_response(&result?)?;
        }
        Command::Raw { port, hex } => {
            let hub = connected_hub(&port, settings).await?;
            let result = hub.send_raw(&hex).await;
            hub.disconnect().await;
            print_response(&result?)?;
        }
        Command::Learn {
            port,
            id,
            button,
            attempts,
        } => {
            let hub = connected_hub(&port, settings).await?;
            let result = hub
                .learn_button_with_retries(id, button, attempts, LEARN_SPACING)
                .await;
            hub.disconnect().await;
            print_response(&result?)?;
        }
        Command::Probe { port } => {
            let hub = connected_hub(&port, settings).await?;
            let working = hub.test_connection().await;
            let stats = hub.statistics().await;
            hub.disconnect().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            if !working {
                bail!("no usable reply from bridge on {}", port);
            }
        }
        Command::Controllers { options } => {
            let json = std::fs::read_to_string(&options)
                .with_context(|| format!("reading {}", options.display()))?;
            let options = HubOptions::from_json(&json)?;
            println!(
                "Port: {}",
                options.serial_port.as_deref().unwrap_or("(not set)")
            );
            for (id, controller) in &options.controllers {
                println!(
                    "ID {:>2} {:?}: {} buttons learned{}",
                    id,
                    controller.controller_type,
                    controller.learned_count(),
                    if controller.is_complete() { "" } else { " (incomplete)" }
                );
            }
        }
        Command::Examples => {
            for (id, buttons) in BromicProtocol::command_examples() {
                for (button, hex) in buttons {
                    println!("ID {:>2} button {}: {}", id, button, hex);
                }
            }
        }
    }

    Ok(())
}
