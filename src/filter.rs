//! Decides which log lines reach the chat relay, and trims them down to the
//! message body. The admin mirror is deliberately unfiltered; only the chat
//! path goes through here.

use regex::Regex;
use tracing::warn;

/// Lines the chat channel never wants to see, even at INFO level.
const DEFAULT_NOISE: &[&str] = &[
    r"Can't keep up! Is the server overloaded\?",
    r"\(vehicle of .+\) moved too quickly!",
    r"Thread RCON Client",
    r"logged in with entity id \d+ at \(.*\)",
];

pub struct LineFilter {
    info: Regex,
    prefix: Regex,
    noise: Vec<Regex>,
}

impl LineFilter {
    /// Compile the filter set: the built-in noise patterns plus any extras
    /// from configuration. Fails if a pattern does not compile.
    pub fn new(extra_noise: &[String]) -> Result<Self, regex::Error> {
        let mut noise = Vec::with_capacity(DEFAULT_NOISE.len() + extra_noise.len());
        for pattern in DEFAULT_NOISE {
            noise.push(Regex::new(pattern)?);
        }
        for pattern in extra_noise {
            noise.push(Regex::new(pattern)?);
        }

        Ok(Self {
            info: Regex::new(r"\[Server thread/INFO\]")?,
            prefix: Regex::new(r"^\[[^\]]*\] ?\[[^\]]*\]: (.*)$")?,
            noise,
        })
    }

    /// The chat-relay decision for one raw line: `None` drops it, `Some`
    /// carries the text to forward. Only INFO-level server lines that clear
    /// the noise set get through, stripped of their
    /// `[<timestamp>] [<thread/level>]: ` prefix.
    pub fn chat_line(&self, raw: &str) -> Option<String> {
        if !self.info.is_match(raw) {
            return None;
        }
        if self.noise.iter().any(|re| re.is_match(raw)) {
            return None;
        }
        Some(self.strip_prefix(raw))
    }

    /// Drop the structural prefix, keeping the message body. A line that
    /// does not have the expected shape passes through unmodified; that is
    /// worth a diagnostic but not an error.
    fn strip_prefix(&self, raw: &str) -> String {
        match self.prefix.captures(raw) {
            Some(captures) => captures[1].to_string(),
            None => {
                warn!(line = raw, "log line has an unexpected shape");
                raw.to_string()
            }
        }
    }
}
