//! End-to-end tests: real supervisor, real helper binary, real socket.
//!
//! The supervisor spawns the compiled helper with injected arguments,
//! adopts its key from stdout, and exchanges sealed traffic. Decrypting
//! a snapshot is itself proof the in-band key adoption worked.

use std::process::Stdio;
use std::time::Duration;

use tether_channel::{
    ChannelConfig, ChannelHooks, ChannelPhase, Suite, Supervisor, SystemEnv, suite_factory,
};
use tether_crypto::Session;
use tether_helper::StatusEntry;
use tokio::process::Command;
use tokio::sync::mpsc;

const HELPER_BIN: &str = env!("CARGO_BIN_EXE_tether-helper");

/// Grab a port the helper can claim. Racy in principle, fine for a test.
fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn helper_config(port: u16) -> ChannelConfig {
    ChannelConfig {
        port: Some(port),
        helper_bin: Some(HELPER_BIN.into()),
        watch_key_rotation: true,
        retry_on_exit: false,
        // Generous window: snapshots cross a process boundary before the
        // test thread gets to check their timestamps.
        replay_window_ms: 5_000,
        ..ChannelConfig::default()
    }
}

async fn recv_within<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(20), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Waits for a snapshot satisfying `accept`, skipping messages that fail
/// to decrypt (the key adoption may still be in flight for the first
/// update or two).
async fn wait_for_snapshot(
    sup: &Supervisor<SystemEnv>,
    rx: &mut mpsc::UnboundedReceiver<String>,
    accept: impl Fn(&[StatusEntry]) -> bool,
) -> Vec<StatusEntry> {
    loop {
        let sealed = recv_within(rx).await;
        if let Ok(entries) = sup.decrypt_and_decode::<Vec<StatusEntry>>(&sealed) {
            if accept(&entries) {
                return entries;
            }
        }
    }
}

#[tokio::test]
async fn full_channel_lifecycle_against_the_real_helper() {
    let port = free_port();
    let sup = Supervisor::with_system_env(helper_config(port), suite_factory(Suite::Sha256));

    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
    let (stdout_tx, mut stdout_rx) = mpsc::unbounded_channel();
    let (connected_tx, mut connected_rx) = mpsc::unbounded_channel();

    sup.connect_with_helper(
        ChannelHooks::new()
            .on_message(move |sealed| {
                let _ = msg_tx.send(sealed);
            })
            .on_stdout(move |chunk| {
                let _ = stdout_tx.send(chunk);
            })
            .on_connected(move || {
                let _ = connected_tx.send(());
            }),
    )
    .unwrap();

    // The key announcement reaches the stdout hook verbatim.
    let chunk = recv_within(&mut stdout_rx).await;
    assert!(chunk.contains("BEGIN PUBLIC KEY"), "got: {chunk}");

    // The helper seeds an entry shortly after startup and broadcasts it.
    let entries =
        wait_for_snapshot(&sup, &mut msg_rx, |entries| !entries.is_empty()).await;
    assert!(entries.iter().any(|entry| entry.name == "helper online"), "got: {entries:?}");

    recv_within(&mut connected_rx).await;
    assert_eq!(sup.phase(), ChannelPhase::Active);

    // Request a new item and watch it appear.
    let handle = sup.handle().expect("active channel has a handle");
    sup.publish_envelope(&handle, "addItem", "1", "compile").unwrap();
    let entries = wait_for_snapshot(&sup, &mut msg_rx, |entries| {
        entries.iter().any(|entry| entry.name == "compile")
    })
    .await;
    let compile_id =
        entries.iter().find(|entry| entry.name == "compile").map(|entry| entry.id).unwrap();

    // Delete it by envelope id and watch it disappear.
    sup.publish_envelope(&handle, "deleteItem", &compile_id.to_string(), "").unwrap();
    wait_for_snapshot(&sup, &mut msg_rx, |entries| {
        entries.iter().all(|entry| entry.id != compile_id)
    })
    .await;

    sup.cancel();
    assert_eq!(sup.phase(), ChannelPhase::Terminated);
}

#[tokio::test]
async fn helper_exits_when_the_watched_pid_disappears() {
    let port = free_port();
    let token = Session::generate(Suite::Sha256).local_public_key();

    // A short-lived stand-in for the host process.
    let mut stand_in =
        Command::new("/bin/sh").args(["-c", "sleep 0.3"]).spawn().unwrap();
    let watched_pid = stand_in.id().unwrap();

    let mut helper = Command::new(HELPER_BIN)
        .arg(format!("-port={port}"))
        .arg(format!("-token={token}"))
        .arg(format!("-pid={watched_pid}"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap();

    let status = tokio::time::timeout(Duration::from_secs(10), helper.wait())
        .await
        .expect("helper kept running after its watched pid vanished")
        .unwrap();
    assert!(status.success());
    let _ = stand_in.wait().await;
}

#[tokio::test]
async fn helper_fails_fast_on_a_malformed_token() {
    let mut helper = Command::new(HELPER_BIN)
        .args(["-port=1", "-token=!!!not-base64!!!"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap();

    let status = tokio::time::timeout(Duration::from_secs(10), helper.wait())
        .await
        .expect("helper kept running with a bad token")
        .unwrap();
    assert!(!status.success());
}

#[tokio::test]
async fn helper_rejects_missing_arguments_with_a_usage_error() {
    let mut helper = Command::new(HELPER_BIN)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap();

    let status = tokio::time::timeout(Duration::from_secs(10), helper.wait())
        .await
        .expect("helper kept running without arguments")
        .unwrap();
    assert_eq!(status.code(), Some(2));
}
