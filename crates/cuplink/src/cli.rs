//! Clap derive structures for the `cuplink` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use cuplink_core::SensorKind;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// cuplink -- broker connector for connected cups
#[derive(Debug, Parser)]
#[command(
    name = "cuplink",
    version,
    about = "Connect connected cup devices to an MQTT broker",
    long_about = "Keeps a session open to the MQTT broker that connected cup devices \
        listen on, guards device pushes against spoofed origins, and sends \
        one-off commands to devices.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Path to the config file (defaults to the platform config directory)
    #[arg(long, env = "CUPLINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect to the broker and serve until interrupted (Ctrl-C)
    Run,

    /// Send one command to a device
    #[command(alias = "pub")]
    Publish(PublishArgs),

    /// Ask a configured device for a sensor reading
    Read(ReadArgs),

    /// Inspect configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct PublishArgs {
    /// Owner the device is registered under
    #[arg(long)]
    pub owner: String,

    /// Device identifier
    #[arg(long)]
    pub device: String,

    /// Resource on the device (e.g. LEVEL, TEMPERATURE)
    #[arg(long)]
    pub resource: String,

    /// Command state; empty asks the device to report the resource
    #[arg(long, default_value = "")]
    pub state: String,

    /// Seconds to wait for the broker connection
    #[arg(long, default_value = "10")]
    pub timeout_secs: u64,
}

#[derive(Debug, Args)]
pub struct ReadArgs {
    /// Owner the device is registered under
    #[arg(long)]
    pub owner: String,

    /// Device identifier, as listed under [[devices]]
    #[arg(long)]
    pub device: String,

    /// Sensor to read (temperature, level)
    #[arg(long)]
    pub sensor: SensorKind,

    /// Seconds to wait for the broker connection
    #[arg(long, default_value = "10")]
    pub timeout_secs: u64,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration (password redacted)
    Show,

    /// Print the config file path
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
