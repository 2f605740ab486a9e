#![deny(unsafe_code)]

//! stevedore CLI: drive a container daemon from the command line.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use stevedore_config::AppConfig;
use stevedore_core::{
    CancellationToken, ContainerSpec, DaemonApi, DaemonClient, HostConfig, LogsOptions,
    Subscription, Tail,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// stevedore: a narrow client for a container daemon's HTTP API.
#[derive(Parser)]
#[command(name = "stevedore", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "stevedore.toml")]
    config: PathBuf,

    /// Daemon connection string, overriding the config file
    /// (e.g. unix:///var/run/docker.sock, tcp://127.0.0.1:2375).
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon-wide information.
    Info,

    /// List containers.
    Ps,

    /// Show one container's full record.
    Inspect { name: String },

    /// Pull an image.
    Pull { image: String },

    /// Create a container without starting it.
    Create(ContainerArgs),

    /// Start a created container.
    Start { id: String },

    /// Create and start a container.
    Run(ContainerArgs),

    /// Remove a container.
    Rm {
        name: String,
        /// Kill the container first if it is running.
        #[arg(short, long)]
        force: bool,
        /// Remove anonymous volumes too.
        #[arg(long)]
        volumes: bool,
    },

    /// Follow daemon events until interrupted.
    Events,

    /// Print a container's logs.
    Logs {
        id: String,
        /// Keep streaming new output.
        #[arg(short, long)]
        follow: bool,
        /// Prefix lines with timestamps.
        #[arg(short, long)]
        timestamps: bool,
        /// Number of trailing lines, or -1 for all.
        #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
        tail: i64,
        /// Skip stdout.
        #[arg(long)]
        no_stdout: bool,
        /// Skip stderr.
        #[arg(long)]
        no_stderr: bool,
    },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

impl Commands {
    /// Commands that hold a stream open until it ends or a signal arrives.
    fn is_streaming(&self) -> bool {
        matches!(self, Self::Events | Self::Logs { .. })
    }
}

#[derive(clap::Args)]
struct ContainerArgs {
    image: String,
    /// Container name.
    #[arg(long)]
    name: Option<String>,
    /// Environment entries, KEY=VALUE.
    #[arg(short, long)]
    env: Vec<String>,
    /// Publish a port, HOST:CONTAINER[/PROTO].
    #[arg(short, long)]
    publish: Vec<String>,
    /// Bind mounts, SRC:DST[:OPTS].
    #[arg(long)]
    volume: Vec<String>,
    /// Command to run in the container.
    #[arg(last = true)]
    cmd: Vec<String>,
}

impl ContainerArgs {
    fn into_spec(self) -> Result<ContainerSpec> {
        let mut spec = ContainerSpec::new(self.image).with_cmd(self.cmd);
        if let Some(name) = self.name {
            spec = spec.with_name(name);
        }
        for entry in self.env {
            spec = spec.with_env(entry);
        }
        for mapping in &self.publish {
            let (host_port, port) = parse_publish(mapping)?;
            spec = spec.publish(port, host_port);
        }
        if !self.volume.is_empty() {
            spec.host_config
                .get_or_insert_with(HostConfig::default)
                .binds
                .extend(self.volume);
        }
        Ok(spec)
    }
}

/// Split `HOST:CONTAINER[/PROTO]` into the host port and the daemon's
/// `CONTAINER/PROTO` key, defaulting the protocol to tcp.
fn parse_publish(mapping: &str) -> Result<(String, String)> {
    let Some((host, container)) = mapping.split_once(':') else {
        bail!("invalid port mapping '{mapping}', expected HOST:CONTAINER[/PROTO]");
    };
    let (port, proto) = container.split_once('/').unwrap_or((container, "tcp"));
    if host.parse::<u16>().is_err() || port.parse::<u16>().is_err() {
        bail!("invalid port mapping '{mapping}', ports must be numbers");
    }
    Ok((host.to_string(), format!("{port}/{proto}")))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config).await?;
    if let Some(host) = cli.host {
        config = config.with_host(host);
    }

    // Set up tracing subscriber: -v flags win over the config file
    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let client = DaemonClient::from_config(&config);
    let cancel = CancellationToken::new();
    // One-shot commands keep the default signal disposition so they stay
    // killable while blocked on the daemon
    if cli.command.is_streaming() {
        watch_signals(cancel.clone());
    }

    match cli.command {
        Commands::Info => print_json(&client.info().await?)?,
        Commands::Ps => print_json(&client.fetch_all_containers().await?)?,
        Commands::Inspect { name } => print_json(&client.fetch_container(&name).await?)?,
        Commands::Pull { image } => {
            client.pull_image(&image).await?;
            info!(%image, "image pulled");
        }
        Commands::Create(args) => {
            let id = client.create_container(&args.into_spec()?).await?;
            println!("{id}");
        }
        Commands::Start { id } => client.start_container(&id, None).await?,
        Commands::Run(args) => {
            let id = client.run_container(&args.into_spec()?).await?;
            println!("{id}");
        }
        Commands::Rm {
            name,
            force,
            volumes,
        } => client.remove_container(&name, force, volumes).await?,
        Commands::Events => drain(client.events(cancel)).await?,
        Commands::Logs {
            id,
            follow,
            timestamps,
            tail,
            no_stdout,
            no_stderr,
        } => {
            let options = LogsOptions {
                follow,
                stdout: !no_stdout,
                stderr: !no_stderr,
                timestamps,
                tail: Tail::from(tail),
            };
            drain(client.container_logs(&id, options, cancel)).await?;
        }
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
    }

    Ok(())
}

/// Print every item until the stream closes; a terminal error fails the
/// command.
async fn drain<T: std::fmt::Display>(mut stream: Subscription<T>) -> Result<()> {
    while let Some(item) = stream.next().await {
        println!("{}", item?);
    }
    Ok(())
}

/// Install the one process-wide signal watcher. A signal cancels open
/// streams so they close their connections and the command returns.
/// Installing it replaces the default disposition for these signals, so it
/// is only done for streaming commands.
fn watch_signals(cancel: CancellationToken) {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(name) => {
                warn!(signal = name, "received signal, closing streams");
                cancel.cancel();
            }
            Err(e) => warn!(error = %e, "failed to install signal handlers"),
        }
    });
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;
    tokio::select! {
        r = tokio::signal::ctrl_c() => r.map(|()| "interrupt"),
        _ = terminate.recv() => Ok("terminate"),
        _ = quit.recv() => Ok("quit"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "interrupt")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        let toml_str =
            toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("TOML error: {e}"))?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        AppConfig::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))
    } else {
        Ok(AppConfig::default())
    }
}
