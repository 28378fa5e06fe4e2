use std::path::PathBuf;

use clap::Parser;

/// mcbridge - Minecraft console to Discord bridge
#[derive(Parser, Debug)]
#[command(name = "mcbridge")]
#[command(version)]
#[command(about = "Bridge a Minecraft server console and log file to Discord")]
#[command(long_about = "mcbridge relays the server log to Discord, relays Discord messages back \
into the game as console commands, and keeps the chat channel topic in sync with the player list.

It connects to the server's RCON port for commands and tails the live log file (surviving log
rotation) for output. Channels are optional: leave --chat-channel unset to disable the chat relay,
or --admin-channel unset to disable the raw mirror and console access.")]
pub struct Cli {
    /// Path to an optional TOML config file (flags override it)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Discord bot token
    #[arg(long)]
    pub token: Option<String>,

    /// Discord chat channel ID
    #[arg(long)]
    pub chat_channel: Option<String>,

    /// Discord admin channel ID
    #[arg(long)]
    pub admin_channel: Option<String>,

    /// Minecraft server host [default: localhost]
    #[arg(long)]
    pub host: Option<String>,

    /// Minecraft server rcon port [default: 25575]
    #[arg(long)]
    pub port: Option<u16>,

    /// Minecraft server rcon password
    #[arg(long)]
    pub pass: Option<String>,

    /// Path to the server's latest.log [default: logs/latest.log]
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Interval between status-topic refreshes, e.g. "5m"; "" disables
    /// [default: 5m]
    #[arg(long)]
    pub status_interval: Option<String>,

    /// Extra regex of log lines to keep out of the chat relay (repeatable)
    #[arg(long = "noise-filter")]
    pub noise_filter: Vec<String>,
}
