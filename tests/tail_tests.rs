// End-to-end tests for the log tailer: tail-from-end semantics, append
// pickup, and the no-loss/no-duplication guarantee across rotation and
// truncation.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use mcbridge::tail::LogTailer;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const RETRY: Duration = Duration::from_millis(50);

fn append(path: &Path, text: &str) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
    file.sync_all().unwrap();
}

async fn recv_line(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for a line")
        .expect("line channel closed")
}

/// Spawn a tailer on `path` and give it time to arm its watch.
async fn start_tailer(
    path: &Path,
) -> (
    mpsc::UnboundedReceiver<String>,
    JoinHandle<anyhow::Result<()>>,
    CancellationToken,
) {
    let shutdown = CancellationToken::new();
    let (rx, task) = LogTailer::new(path, RETRY).spawn(shutdown.clone());
    tokio::time::sleep(Duration::from_millis(300)).await;
    (rx, task, shutdown)
}

#[tokio::test]
async fn existing_content_is_skipped() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("latest.log");
    append(&path, "old one\nold two\n");

    let (mut rx, task, shutdown) = start_tailer(&path).await;

    append(&path, "new line\n");
    assert_eq!(recv_line(&mut rx).await, "new line");
    assert!(rx.try_recv().is_err(), "history must not be replayed");

    shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn appended_lines_arrive_in_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("latest.log");
    append(&path, "boot\n");

    let (mut rx, task, shutdown) = start_tailer(&path).await;

    append(&path, "one\ntwo\nthree\n");
    assert_eq!(recv_line(&mut rx).await, "one");
    assert_eq!(recv_line(&mut rx).await, "two");
    assert_eq!(recv_line(&mut rx).await, "three");

    shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn waits_for_file_to_be_created() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("latest.log");

    // Spawn before the file exists; the open loop must keep retrying.
    let shutdown = CancellationToken::new();
    let (mut rx, task) = LogTailer::new(&path, RETRY).spawn(shutdown.clone());
    tokio::time::sleep(Duration::from_millis(200)).await;

    std::fs::write(&path, "").unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    append(&path, "first\n");
    assert_eq!(recv_line(&mut rx).await, "first");

    shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn partial_writes_emit_only_complete_lines() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("latest.log");
    append(&path, "boot\n");

    let (mut rx, task, shutdown) = start_tailer(&path).await;

    append(&path, "par");
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(rx.try_recv().is_err(), "fragment must wait for its newline");

    append(&path, "tial\n");
    assert_eq!(recv_line(&mut rx).await, "partial");

    shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn rotation_preserves_the_line_sequence() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("latest.log");
    append(&path, "boot\n");

    let (mut rx, task, shutdown) = start_tailer(&path).await;

    append(&path, "one\ntwo\n");
    assert_eq!(recv_line(&mut rx).await, "one");
    assert_eq!(recv_line(&mut rx).await, "two");

    // A final write can land just before the rename; it must still come
    // through, drained from the old handle.
    append(&path, "late\n");
    std::fs::rename(&path, dir.path().join("latest.log.1")).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    append(&path, "three\nfour\n");

    assert_eq!(recv_line(&mut rx).await, "late");
    assert_eq!(recv_line(&mut rx).await, "three");
    assert_eq!(recv_line(&mut rx).await, "four");

    // No duplicates from re-reading either file.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(rx.try_recv().is_err(), "no line may be delivered twice");

    shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn rotation_flushes_a_trailing_fragment() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("latest.log");
    append(&path, "boot\n");

    let (mut rx, task, shutdown) = start_tailer(&path).await;

    append(&path, "no newline at end");
    std::fs::rename(&path, dir.path().join("latest.log.1")).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    append(&path, "next\n");

    assert_eq!(recv_line(&mut rx).await, "no newline at end");
    assert_eq!(recv_line(&mut rx).await, "next");

    shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn truncation_rereads_from_the_start() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("latest.log");
    append(&path, "boot\n");

    let (mut rx, task, shutdown) = start_tailer(&path).await;

    append(&path, "a reasonably long line before truncation\n");
    assert_eq!(
        recv_line(&mut rx).await,
        "a reasonably long line before truncation"
    );

    // Copy-truncate style rotation: same inode, length drops to zero.
    OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(&path)
        .unwrap();
    append(&path, "fresh\n");

    assert_eq!(recv_line(&mut rx).await, "fresh");

    shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_stops_the_open_retry_loop() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("never-created.log");

    let shutdown = CancellationToken::new();
    let (_rx, task) = LogTailer::new(&path, RETRY).spawn(shutdown.clone());
    tokio::time::sleep(Duration::from_millis(120)).await;

    shutdown.cancel();
    // The retry loop observes the token instead of spinning forever.
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("tailer did not stop")
        .unwrap()
        .unwrap();
}
