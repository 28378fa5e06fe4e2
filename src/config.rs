//! Runtime configuration: resolved once at startup from CLI flags plus an
//! optional TOML file (flags win), then passed around immutably.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::Cli;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 25575;
pub const DEFAULT_LOG_PATH: &str = "logs/latest.log";
pub const DEFAULT_STATUS_INTERVAL: &str = "5m";

const RCON_RETRY_DELAY: Duration = Duration::from_secs(2);
const LOG_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct Config {
    /// Discord bot token.
    pub token: String,
    /// Channel bridged to in-game chat; absent disables the chat relay.
    pub chat_channel: Option<String>,
    /// Channel mirroring the raw log and accepting console commands;
    /// absent disables both.
    pub admin_channel: Option<String>,
    pub host: String,
    pub port: u16,
    /// RCON password, sent in cleartext by the protocol.
    pub password: String,
    pub log_path: PathBuf,
    /// How often to republish the player list as the chat topic; `None`
    /// disables status sync.
    pub status_interval: Option<Duration>,
    /// Extra chat-relay noise patterns on top of the built-ins.
    pub noise_filters: Vec<String>,
    pub rcon_retry_delay: Duration,
    pub log_retry_delay: Duration,
}

/// The subset of settings a TOML config file can carry.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub token: Option<String>,
    pub chat_channel: Option<String>,
    pub admin_channel: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub log: Option<PathBuf>,
    pub status_interval: Option<String>,
    #[serde(default)]
    pub noise_filters: Vec<String>,
}

impl FileConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading config file {path}"))?;
        let config =
            toml::from_str(&content).with_context(|| format!("parsing config file {path}"))?;
        Ok(config)
    }
}

impl Config {
    /// Merge flags over the optional file and validate. Missing required
    /// settings and an unparsable interval are startup errors.
    pub fn resolve(cli: Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };

        let token = cli
            .token
            .or(file.token)
            .context("Discord bot token is required (--token)")?;
        let password = cli
            .pass
            .or(file.password)
            .context("rcon password is required (--pass)")?;

        let interval_raw = cli
            .status_interval
            .or(file.status_interval)
            .unwrap_or_else(|| DEFAULT_STATUS_INTERVAL.to_string());
        let status_interval = if interval_raw.is_empty() {
            None
        } else {
            let interval = parse_duration(&interval_raw)
                .with_context(|| format!("invalid status interval '{interval_raw}'"))?;
            anyhow::ensure!(interval > Duration::ZERO, "status interval must be positive");
            Some(interval)
        };

        let mut noise_filters = file.noise_filters;
        noise_filters.extend(cli.noise_filter);

        Ok(Self {
            token,
            chat_channel: cli.chat_channel.or(file.chat_channel),
            admin_channel: cli.admin_channel.or(file.admin_channel),
            host: cli
                .host
                .or(file.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli.port.or(file.port).unwrap_or(DEFAULT_PORT),
            password,
            log_path: cli
                .log
                .or(file.log)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH)),
            status_interval,
            noise_filters,
            rcon_retry_delay: RCON_RETRY_DELAY,
            log_retry_delay: LOG_RETRY_DELAY,
        })
    }

    /// `host:port` of the RCON endpoint.
    pub fn rcon_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse a Go-style duration: concatenated `<number><unit>` segments with
/// units `ms`, `s`, `m`, `h` (e.g. `90s`, `5m`, `1h30m`).
pub fn parse_duration(s: &str) -> Result<Duration> {
    anyhow::ensure!(!s.is_empty(), "empty duration");

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .with_context(|| format!("missing unit at end of '{s}'"))?;
        anyhow::ensure!(digits_end > 0, "expected a number in '{s}'");
        let value: u64 = rest[..digits_end].parse()?;

        let unit_end = rest[digits_end..]
            .find(|c: char| c.is_ascii_digit())
            .map(|i| digits_end + i)
            .unwrap_or(rest.len());
        let unit = &rest[digits_end..unit_end];
        total += match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 3600),
            other => anyhow::bail!("unknown unit '{other}' in duration '{s}'"),
        };
        rest = &rest[unit_end..];
    }
    Ok(total)
}
