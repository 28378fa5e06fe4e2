//! Rotation-aware tailing of a live-appended log file.
//!
//! The tailer starts at end-of-file (history is never replayed) and emits
//! complete lines in file order. Rename-style rotation and copy-truncate
//! both leave the sequence intact, with no line lost or duplicated: the old
//! handle is fully drained before the path is reopened from offset zero.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::event::ModifyKind;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Fallback re-poll for notifications the watcher missed.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// What a filesystem notification means for the tailed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeKind {
    Appended,
    Rotated,
}

fn classify(event: &Event) -> Option<ChangeKind> {
    match event.kind {
        // The watched path was renamed away or removed: log rotation.
        EventKind::Modify(ModifyKind::Name(_)) | EventKind::Remove(_) => Some(ChangeKind::Rotated),
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Any => Some(ChangeKind::Appended),
        _ => None,
    }
}

pub struct LogTailer {
    path: PathBuf,
    retry_delay: Duration,
}

impl LogTailer {
    pub fn new(path: impl Into<PathBuf>, retry_delay: Duration) -> Self {
        Self {
            path: path.into(),
            retry_delay,
        }
    }

    /// Start tailing. Lines arrive on the returned channel; the join handle
    /// resolves with an error if the watch layer fails, or `Ok` once the
    /// shutdown token fires.
    pub fn spawn(
        self,
        shutdown: CancellationToken,
    ) -> (mpsc::UnboundedReceiver<String>, JoinHandle<Result<()>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(tx, shutdown));
        (rx, task)
    }

    async fn run(
        self,
        lines: mpsc::UnboundedSender<String>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let (fs_tx, mut fs_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = fs_tx.send(res);
            },
            NotifyConfig::default(),
        )
        .context("creating filesystem watcher")?;

        let Some(mut cursor) =
            Cursor::open_with_retry(&self.path, &mut watcher, self.retry_delay, &shutdown).await?
        else {
            return Ok(());
        };
        // Everything written before we started stays out of chat.
        cursor.seek_to_end()?;

        info!(path = %self.path.display(), "tailing log file");
        loop {
            let change = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                ev = fs_rx.recv() => match ev {
                    None => anyhow::bail!("filesystem watcher channel closed"),
                    Some(Err(err)) => {
                        return Err(err).context("filesystem watch failed");
                    }
                    Some(Ok(event)) => classify(&event),
                },
                _ = tokio::time::sleep(POLL_INTERVAL) => Some(ChangeKind::Appended),
            };

            match change {
                None => {}
                Some(ChangeKind::Appended) => cursor.drain(&lines)?,
                Some(ChangeKind::Rotated) => {
                    debug!(path = %self.path.display(), "log rotated");
                    // Rotation can coincide with a final write; empty the old
                    // handle before letting go of it.
                    cursor.drain(&lines)?;
                    cursor.flush_partial(&lines);
                    if let Err(err) = watcher.unwatch(&self.path) {
                        debug!(%err, "stale watch already gone");
                    }

                    let Some(reopened) = Cursor::open_with_retry(
                        &self.path,
                        &mut watcher,
                        self.retry_delay,
                        &shutdown,
                    )
                    .await?
                    else {
                        return Ok(());
                    };
                    cursor = reopened;

                    // Notifications queued for the old file are meaningless
                    // against the fresh handle; a rotation among them would
                    // rewind us to offset zero and duplicate lines.
                    while fs_rx.try_recv().is_ok() {}

                    // The replacement file starts at the beginning.
                    cursor.drain(&lines)?;
                }
            }
        }
    }
}

/// An open handle on the tailed file plus the read position within it.
struct Cursor {
    reader: BufReader<File>,
    offset: u64,
    /// Trailing fragment with no newline yet; held until the rest arrives
    /// or the file rotates.
    partial: String,
}

impl Cursor {
    /// Retry until the file opens and a watch is registered on it. The loop
    /// never gives up on its own (the log may not exist until the server
    /// creates it); only the shutdown token bounds it, yielding `None`.
    /// A watch registration failure is fatal, not retried.
    async fn open_with_retry(
        path: &Path,
        watcher: &mut RecommendedWatcher,
        retry_delay: Duration,
        shutdown: &CancellationToken,
    ) -> Result<Option<Self>> {
        loop {
            match File::open(path) {
                Ok(file) => {
                    watcher
                        .watch(path, RecursiveMode::NonRecursive)
                        .with_context(|| format!("adding watch on {}", path.display()))?;
                    return Ok(Some(Self {
                        reader: BufReader::new(file),
                        offset: 0,
                        partial: String::new(),
                    }));
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        %err,
                        "failed to open log, retrying in {:?}",
                        retry_delay
                    );
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(None),
                _ = tokio::time::sleep(retry_delay) => {}
            }
        }
    }

    fn seek_to_end(&mut self) -> Result<()> {
        self.offset = self.reader.seek(SeekFrom::End(0))?;
        Ok(())
    }

    /// Read every complete new line and send it on. A file now shorter than
    /// our offset was truncated in place; start over from the top.
    fn drain(&mut self, lines: &mpsc::UnboundedSender<String>) -> Result<()> {
        let len = self.reader.get_ref().metadata()?.len();
        if len < self.offset {
            debug!("log shrank underneath us, rereading from the start");
            self.offset = self.reader.seek(SeekFrom::Start(0))?;
            self.partial.clear();
        }

        let mut chunk = String::new();
        loop {
            chunk.clear();
            let n = self.reader.read_line(&mut chunk)?;
            if n == 0 {
                return Ok(());
            }
            self.offset += n as u64;

            if chunk.ends_with('\n') {
                let mut line = std::mem::take(&mut self.partial);
                line.push_str(chunk.trim_end_matches(['\n', '\r']));
                if lines.send(line).is_err() {
                    // Receiver is gone; nothing left to tail for.
                    return Ok(());
                }
            } else {
                // Mid-line write; keep the fragment until the newline lands.
                self.partial.push_str(&chunk);
            }
        }
    }

    /// Emit a buffered final fragment as the file's last line.
    fn flush_partial(&mut self, lines: &mpsc::UnboundedSender<String>) {
        if !self.partial.is_empty() {
            let _ = lines.send(std::mem::take(&mut self.partial));
        }
    }
}
