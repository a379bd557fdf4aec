//! RemoSerial
//!
//! Drive a serial device on a remote host over TCP.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use relay::config::Config;
use relay::protocol::Command;
use relay::{
    CheckPoller, CommandRouter, Host, Listener, LoopExit, ReconnectLoop, RelayEvent, SerialBridge,
    ServeMode, SingleRequest, SystemHost, TurnRole,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Pause between `Check` polls.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// RemoSerial - remote serial device relay.
#[derive(Parser, Debug)]
#[command(name = "remoserial")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run one listener instance until no peer connects within the accept timeout
    Serve {
        /// Port to listen on
        #[arg(long, short)]
        port: Option<u16>,

        /// Pass every payload through to this serial device
        #[arg(long, value_name = "DEVICE")]
        bridge: Option<String>,

        /// Keep serving a connection after the first response
        #[arg(long)]
        keep_open: bool,

        /// Require the key exchange and sealed messages
        #[arg(long)]
        protected: bool,
    },

    /// Dial a control endpoint and serve or send one command per connection
    Connect {
        /// Host to dial (default: 0.0.0.0)
        host: Option<String>,

        /// Port to dial
        #[arg(long, short)]
        port: Option<u16>,

        /// Perform the key exchange and seal every message
        #[arg(long)]
        protected: bool,

        /// Send this request instead of answering requests
        #[arg(long, short, value_enum)]
        request: Option<RequestKind>,

        /// Device for the open request
        #[arg(long, short)]
        device: Option<String>,

        /// With `--request check`, repeat until the service has ended
        #[arg(long)]
        poll: bool,

        /// Print the answer as JSON
        #[arg(long)]
        json: bool,
    },

    /// Wait for one peer, send it one request and print the answer
    Issue {
        /// Request to send
        #[arg(value_enum)]
        kind: RequestKind,

        /// Device for the open request
        #[arg(long, short)]
        device: Option<String>,

        /// Port to listen on
        #[arg(long, short)]
        port: Option<u16>,

        /// Require the key exchange and sealed messages
        #[arg(long)]
        protected: bool,

        /// Print the answer as JSON
        #[arg(long)]
        json: bool,
    },

    /// List serial devices on this machine
    Ports {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Requests a control endpoint can send.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// List serial devices
    ListPorts,
    /// Associate a device (needs --device)
    Open,
    /// Drop the device association
    Close,
    /// Ask for the service status
    Check,
}

fn build_request(kind: RequestKind, device: Option<String>) -> anyhow::Result<Command> {
    Ok(match kind {
        RequestKind::ListPorts => Command::ListPorts,
        RequestKind::Open => Command::OpenConnection {
            device_id: device.context("--device is required for the open request")?,
        },
        RequestKind::Close => Command::CloseConnection,
        RequestKind::Check => Command::Check,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Apply environment variable overrides
    config.apply_env_overrides();

    // Initialize tracing
    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.general.log_level.to_lowercase()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(config_path) = &cli.config {
        tracing::info!("Using config file: {:?}", config_path);
    }

    // Validate configuration
    config.validate()?;

    match cli.command {
        Commands::Serve {
            port,
            bridge,
            keep_open,
            protected,
        } => {
            let mut options = config.listener_options();
            if let Some(port) = port {
                options.port = port;
            }
            options.protected |= protected;

            let mode = match bridge {
                Some(device) => ServeMode::Bridge { device },
                None => match config.serve_mode() {
                    Some(ServeMode::Command { keep_open: configured }) => ServeMode::Command {
                        keep_open: configured || keep_open,
                    },
                    Some(mode) => mode,
                    None => anyhow::bail!("bridge mode requires a device"),
                },
            };

            let host: Arc<dyn Host> = Arc::new(SystemHost::new());
            let bridge = Arc::new(SerialBridge::new(config.bridge_options()));
            let router = CommandRouter::new(host, bridge);

            let listener = Listener::bind(options)
                .await
                .context("Failed to bind listener")?;
            spawn_event_logger(listener.subscribe());
            cancel_on_ctrl_c(listener.shutdown_token());

            listener.serve(&router, &mode).await?;
            tracing::info!("Listener stopped");
        }
        Commands::Connect {
            host,
            port,
            protected,
            request,
            device,
            poll,
            json,
        } => {
            let mut options = config.reconnect_options();
            if let Some(host) = host {
                options.host = host;
            }
            if let Some(port) = port {
                options.port = port;
            }
            options.protected |= protected;

            let system: Arc<dyn Host> = Arc::new(SystemHost::new());
            let reconnect = ReconnectLoop::new(options, system.clone());

            let mut role = match request {
                None => {
                    let bridge = Arc::new(SerialBridge::new(config.bridge_options()));
                    TurnRole::Agent(Arc::new(CommandRouter::new(system, bridge)))
                }
                Some(kind) => {
                    let command = build_request(kind, device)?;
                    if poll && command == Command::Check {
                        TurnRole::Requester(Box::new(CheckPoller::new(
                            POLL_INTERVAL,
                            reconnect.event_sender(),
                        )))
                    } else {
                        TurnRole::Requester(Box::new(SingleRequest::new(command)))
                    }
                }
            };

            spawn_event_logger(reconnect.subscribe());
            cancel_on_ctrl_c(reconnect.shutdown_token());

            match reconnect.run(&mut role).await {
                LoopExit::Finished(response) => print_response(&response, json)?,
                LoopExit::LinkDown => anyhow::bail!("network link is down"),
                LoopExit::Cancelled => tracing::info!("Stopped"),
            }
        }
        Commands::Issue {
            kind,
            device,
            port,
            protected,
            json,
        } => {
            let command = build_request(kind, device)?;

            let mut options = config.listener_options();
            if let Some(port) = port {
                options.port = port;
            }
            options.protected |= protected;

            let listener = Listener::bind(options)
                .await
                .context("Failed to bind listener")?;
            spawn_event_logger(listener.subscribe());
            cancel_on_ctrl_c(listener.shutdown_token());

            let response = listener
                .issue(&command)
                .await
                .with_context(|| format!("No answer to {}", command.name()))?;
            print_response(&response, json)?;
        }
        Commands::Ports { json } => {
            let devices = SystemHost::new().list_devices();
            let response = Command::Ports { devices };
            print_response(&response, json)?;
        }
    }

    Ok(())
}

/// Log progress events as they arrive.
fn spawn_event_logger(mut events: broadcast::Receiver<RelayEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(RelayEvent::DeviceError { .. }) | Ok(RelayEvent::LinkDown { .. }) => {}
                Ok(event @ RelayEvent::RetryScheduled { .. }) => tracing::warn!("{}", event),
                Ok(event) => tracing::info!("{}", event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("Skipped {} progress events", n)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received interrupt");
                token.cancel();
            }
            Err(e) => tracing::warn!("Failed to listen for interrupt: {}", e),
        }
    });
}

fn response_json(response: &Command) -> serde_json::Value {
    match response {
        Command::Ports { devices } => serde_json::json!({ "comPorts": devices }),
        Command::OpenConnectionStatus(status) => serde_json::json!({ "openConnection": status }),
        Command::CloseConnectionStatus(status) => serde_json::json!({ "closeConnection": status }),
        Command::CheckStatus(status) => serde_json::json!({ "check": status }),
        Command::ErrorNotice { message } => serde_json::json!({ "error": message }),
        other => serde_json::json!({ "unexpected": other.name() }),
    }
}

fn print_response(response: &Command, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&response_json(response))?);
        if let Command::ErrorNotice { message } = response {
            anyhow::bail!("Remote error: {}", message);
        }
        return Ok(());
    }

    match response {
        Command::Ports { devices } if devices.is_empty() => println!("No serial devices found."),
        Command::Ports { devices } => {
            for device in devices {
                println!("{}", device);
            }
        }
        Command::OpenConnectionStatus(status) | Command::CloseConnectionStatus(status) => {
            println!("{}", status)
        }
        Command::CheckStatus(status) if status.is_empty() => println!("Service ended."),
        Command::CheckStatus(status) => print!("{}", status),
        Command::ErrorNotice { message } => anyhow::bail!("Remote error: {}", message),
        other => anyhow::bail!("Unexpected answer: {}", other.name()),
    }
    Ok(())
}
