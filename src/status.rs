//! Turns the console's `list` output into a channel-topic summary.

use regex::Regex;

/// Player-count snapshot parsed out of a `list` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    pub online: u32,
    pub max: u32,
    pub names: String,
}

impl ServerStatus {
    /// The topic line published to the chat channel.
    pub fn topic(&self) -> String {
        format!("{}/{} online: {}", self.online, self.max, self.names)
    }
}

pub struct StatusParser {
    list: Regex,
}

impl StatusParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            list: Regex::new(r"There are (\d+) of a max of (\d+) players online: ?(.*)")?,
        })
    }

    /// Parse a `list` response. `None` means the text did not have the
    /// expected shape; the caller reports and skips that refresh.
    pub fn parse(&self, text: &str) -> Option<ServerStatus> {
        let captures = self.list.captures(text)?;
        Some(ServerStatus {
            online: captures[1].parse().ok()?,
            max: captures[2].parse().ok()?,
            names: captures[3].to_string(),
        })
    }
}
