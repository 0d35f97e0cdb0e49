//! Soratun - command-line front end for the libsoratun bridge
//!
//! Reads an Arc credential file and sends one HTTP request or UDP datagram
//! to the SORACOM Unified Endpoint through the native module.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use soratun_bridge::arc::ArcConfig;
use soratun_bridge::config::{BridgeConfig, CONFIG_FILE_NAME};
use soratun_bridge::ffi::{probe, resolve, FfiError, LibraryLoader, Platform};
use soratun_bridge::soratun::{Soratun, UdpOptions};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "soratun")]
#[command(version)]
#[command(about = "Send requests through the libsoratun native module", long_about = None)]
struct Cli {
    /// Bridge settings file (default: nearest soratun.toml)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Explicit path to the native module
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the parsed Arc credential file with secrets masked
    Inspect {
        /// Path to the Arc config file
        #[arg(short, long, default_value = "arc.json")]
        config: PathBuf,
    },

    /// Show which module file would be loaded
    Resolve {
        /// Platform to resolve for (linux, macos, windows, ...)
        #[arg(long)]
        platform: Option<String>,

        /// Directory to look in
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Logical module name
        #[arg(long)]
        name: Option<String>,
    },

    /// Send an HTTP request to the Unified Endpoint
    Send {
        /// Path to the Arc config file
        #[arg(short, long, default_value = "arc.json")]
        config: PathBuf,

        /// HTTP method. Only GET or POST (case insensitive) is supported.
        #[arg(short, long, default_value = "POST")]
        method: String,

        /// HTTP path
        #[arg(short, long, default_value = "/")]
        path: String,

        /// HTTP body
        body: String,
    },

    /// Send a UDP datagram to the Unified Endpoint
    Udp {
        /// Path to the Arc config file
        #[arg(short, long, default_value = "arc.json")]
        config: PathBuf,

        /// Destination port (requires --timeout-ms)
        #[arg(long, requires = "timeout_ms")]
        port: Option<u16>,

        /// Response timeout in milliseconds (requires --port)
        #[arg(long, requires = "port")]
        timeout_ms: Option<u64>,

        /// Payload as hex, e.g. 4d010351
        payload: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut settings = load_settings(cli.settings.as_ref())?;
    if let Some(library) = cli.library {
        settings.library.path = Some(library);
    }

    match cli.command {
        Commands::Inspect { config } => cmd_inspect(&config),
        Commands::Resolve {
            platform,
            dir,
            name,
        } => cmd_resolve(&settings, platform, dir, name),
        Commands::Send {
            config,
            method,
            path,
            body,
        } => cmd_send(&settings, &config, &method, &path, &body),
        Commands::Udp {
            config,
            port,
            timeout_ms,
            payload,
        } => cmd_udp(&settings, &config, port, timeout_ms, &payload),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose),
        )
        .with(filter)
        .init();
}

fn load_settings(path: Option<&PathBuf>) -> Result<BridgeConfig> {
    match path {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => BridgeConfig::load_from_cwd()
            .with_context(|| format!("Failed to load {}", CONFIG_FILE_NAME)),
    }
}

fn read_arc_config(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("Failed to read Arc config {}", path.display()))
}

fn open_client(settings: &BridgeConfig, loader: &mut LibraryLoader) -> Result<Soratun> {
    let path = settings.module_path();
    Soratun::open(settings, loader)
        .with_context(|| format!("Failed to open native module {}", path.display()))
}

fn cmd_inspect(config: &Path) -> Result<()> {
    let arc = ArcConfig::parse(&read_arc_config(config)?)
        .with_context(|| format!("Invalid Arc config {}", config.display()))?;
    print!("{}", arc.summary()?);
    Ok(())
}

fn cmd_resolve(
    settings: &BridgeConfig,
    platform: Option<String>,
    dir: Option<PathBuf>,
    name: Option<String>,
) -> Result<()> {
    let path = if platform.is_none() && dir.is_none() && name.is_none() {
        settings.module_path()
    } else {
        let platform = match platform {
            Some(id) => match Platform::from_id(&id) {
                Some(p) => p,
                None => bail!("Unknown platform '{}'", id),
            },
            None => Platform::current(),
        };
        let name = name.unwrap_or_else(|| settings.library.name.clone());
        let dir = dir.or_else(|| settings.library.dir.clone());
        resolve(platform, &name, dir.as_deref())
    };

    println!("{}", path.display());

    if let Err(e @ FfiError::ResolutionAmbiguity { .. }) = probe(&path) {
        eprintln!("warning: {}", e);
    }
    Ok(())
}

fn cmd_send(
    settings: &BridgeConfig,
    config: &Path,
    method: &str,
    path: &str,
    body: &str,
) -> Result<()> {
    let method = method.trim().to_uppercase();
    if method != "GET" && method != "POST" {
        bail!("Only GET or POST is supported, got '{}'", method);
    }
    let arc = read_arc_config(config)?;

    let mut loader = LibraryLoader::new();
    let client = open_client(settings, &mut loader)?;
    let response = client
        .send(&arc, &method, path, body)
        .with_context(|| format!("{} {} failed", method, path))?;

    println!("{}", response);
    Ok(())
}

fn cmd_udp(
    settings: &BridgeConfig,
    config: &Path,
    port: Option<u16>,
    timeout_ms: Option<u64>,
    payload: &str,
) -> Result<()> {
    let payload = hex::decode(payload.trim()).context("Payload must be hex encoded")?;
    let options = match (port, timeout_ms) {
        (Some(port), Some(timeout_ms)) => {
            Some(UdpOptions::new(port, Duration::from_millis(timeout_ms))?)
        }
        _ => settings.udp_options()?,
    };
    let arc = read_arc_config(config)?;

    let mut loader = LibraryLoader::new();
    let client = open_client(settings, &mut loader)?;
    let response = match options {
        Some(options) => client.send_udp_with(&arc, &payload, options),
        None => client.send_udp(&arc, &payload),
    }
    .context("UDP request failed")?;

    println!("{}", response);
    Ok(())
}
