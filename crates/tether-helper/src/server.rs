//! Socket server and publish loop.
//!
//! Startup order mirrors what the host expects: pair the session with the
//! host key from `-token`, announce our own public key on stdout, then
//! listen. Every accepted client must greet with `CONNECT <path> <bearer>`
//! where the bearer equals the `-token` value; anything else is denied.
//!
//! Status updates are sealed once per change and broadcast to every
//! connected client. Requests arrive as sealed `{type, id, data}`
//! envelopes; stale or undecodable ones are logged and dropped, never
//! answered.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tether_core::ReplayGuard;
use tether_crypto::{CryptoError, Session, Suite};
use tether_proto::{CodecError, Envelope, encode_and_seal, open_and_decode};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::args::LaunchArgs;
use crate::store::StatusStore;

const TICK: Duration = Duration::from_millis(250);
/// Progress is re-rolled every Nth tick.
const RANDOMIZE_EVERY: u32 = 5;
const PARENT_POLL: Duration = Duration::from_millis(500);
const SEED_DELAY: Duration = Duration::from_secs(1);
const UPDATE_BUFFER: usize = 16;
/// Tolerated request staleness. Wider than the host side's window because
/// inbound requests cross a process boundary before they are checked.
const REQUEST_REPLAY_WINDOW_MS: i64 = 1_000;

/// Helper runtime failures.
#[derive(Debug, thiserror::Error)]
pub enum HelperError {
    /// The host token could not be adopted as the external key.
    #[error("invalid host token: {0}")]
    Token(#[from] CryptoError),

    /// Listener setup failed.
    #[error("socket setup failed: {0}")]
    Io(#[from] std::io::Error),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[allow(clippy::expect_used)]
fn wall_clock_millis() -> i64 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("invariant: system clock is after the Unix epoch");
    i64::try_from(since_epoch.as_millis())
        .expect("invariant: wall clock fits in 64-bit milliseconds")
}

/// Prints the PEM public key block for the host to adopt.
///
/// Stdout is reserved for exactly this; logs go to stderr.
#[allow(clippy::print_stdout)]
fn announce_key(session: &Arc<Mutex<Session>>) {
    let pem = { lock(session).public_key_pem() };
    println!("{pem}");
    use std::io::Write as _;
    let _ = std::io::stdout().flush();
}

/// Runs the helper until cancelled or the watched parent disappears.
pub async fn run(args: LaunchArgs) -> Result<(), HelperError> {
    let mut session = Session::generate(Suite::Sha256);
    session.set_external_public_key(&args.token)?;
    let session = Arc::new(Mutex::new(session));

    announce_key(&session);

    let listener = TcpListener::bind((args.addr.as_str(), args.port)).await?;
    tracing::info!(addr = %args.addr, port = args.port, "listening");

    let cancel = CancellationToken::new();
    if let Some(pid) = args.pid {
        tokio::spawn(watch_parent(pid, cancel.clone()));
    }

    let store = Arc::new(Mutex::new(StatusStore::new()));
    let (updates, _) = broadcast::channel(UPDATE_BUFFER);

    tokio::spawn(run_ticker(store.clone(), session.clone(), updates.clone(), cancel.clone()));
    tokio::spawn(seed_initial_entry(store.clone(), cancel.clone()));

    loop {
        let accepted = tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                tracing::info!(%peer, "client connected");
                tokio::spawn(serve_client(
                    stream,
                    args.token.clone(),
                    session.clone(),
                    store.clone(),
                    updates.subscribe(),
                    cancel.clone(),
                ));
            }
            Err(error) => tracing::warn!(%error, "accept failed"),
        }
    }
    tracing::info!("helper shutting down");
    Ok(())
}

/// Seals and broadcasts a store snapshot whenever something changed.
async fn run_ticker(
    store: Arc<Mutex<StatusStore>>,
    session: Arc<Mutex<Session>>,
    updates: broadcast::Sender<String>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(TICK);
    let mut ticks: u32 = 0;
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }
        ticks = ticks.wrapping_add(1);

        let snapshot = {
            let mut store = lock(&store);
            if ticks % RANDOMIZE_EVERY == 0 {
                store.randomize_progress();
            }
            if store.take_dirty() { Some(store.snapshot()) } else { None }
        };
        let Some(entries) = snapshot else { continue };

        let sealed = {
            let session = lock(&session);
            encode_and_seal(&session, &entries, &wall_clock_millis().to_string())
        };
        match sealed {
            // Send errors just mean nobody is subscribed yet.
            Ok(text) => {
                let receivers = updates.send(text).unwrap_or(0);
                tracing::debug!(entries = entries.len(), receivers, "update published");
            }
            Err(error) => tracing::warn!(%error, "failed to seal update"),
        }
    }
}

/// Adds a first entry shortly after startup so a freshly connected host
/// sees traffic without issuing a request.
async fn seed_initial_entry(store: Arc<Mutex<StatusStore>>, cancel: CancellationToken) {
    tokio::select! {
        () = cancel.cancelled() => return,
        () = tokio::time::sleep(SEED_DELAY) => {}
    }
    let id = lock(&store).add_item("helper online");
    tracing::debug!(id, "seeded initial entry");
}

/// Exits the helper when the watched host process disappears.
///
/// Liveness comes from `/proc/<pid>`; on systems without procfs the watch
/// is disabled and the helper relies on the host killing it.
async fn watch_parent(pid: u32, cancel: CancellationToken) {
    if !Path::new("/proc").exists() {
        tracing::debug!("procfs unavailable, parent watch disabled");
        return;
    }
    let entry = format!("/proc/{pid}");
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(PARENT_POLL) => {}
        }
        if !Path::new(&entry).exists() {
            tracing::info!(pid, "host process is gone, shutting down");
            cancel.cancel();
            return;
        }
    }
}

async fn serve_client(
    stream: TcpStream,
    token: String,
    session: Arc<Mutex<Session>>,
    store: Arc<Mutex<StatusStore>>,
    mut updates: broadcast::Receiver<String>,
    cancel: CancellationToken,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let Ok(Some(greeting)) = lines.next_line().await else { return };
    let mut parts = greeting.split(' ');
    let verb = parts.next();
    let _path = parts.next();
    let bearer = parts.next();
    if verb != Some("CONNECT") || bearer != Some(token.as_str()) {
        tracing::warn!("denying client with bad greeting");
        let _ = write_half.write_all(b"denied\n").await;
        return;
    }
    if write_half.write_all(b"ok\n").await.is_err() {
        return;
    }

    let mut replay = ReplayGuard::new(REQUEST_REPLAY_WINDOW_MS);
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            update = updates.recv() => match update {
                Ok(text) => {
                    if write_half.write_all(format!("{text}\n").as_bytes()).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "client fell behind on updates");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
            request = lines.next_line() => match request {
                Ok(Some(line)) => handle_request(&line, &session, &store, &mut replay),
                _ => {
                    tracing::info!("client disconnected");
                    return;
                }
            },
        }
    }
}

/// Opens one sealed request line and applies it to the store.
///
/// Undecodable or stale requests are dropped; the store only ever moves
/// on authenticated, fresh input.
fn handle_request(
    line: &str,
    session: &Arc<Mutex<Session>>,
    store: &Arc<Mutex<StatusStore>>,
    replay: &mut ReplayGuard,
) {
    let request: Envelope = {
        let session = lock(session);
        let opened =
            open_and_decode(&session, line, |stamp| replay.accept(stamp, wall_clock_millis()));
        match opened {
            Ok(envelope) => envelope,
            Err(CodecError::AuthRejected) => {
                tracing::warn!("dropping stale or replayed request");
                return;
            }
            Err(error) => {
                tracing::debug!(%error, "dropping undecodable request");
                return;
            }
        }
    };

    match request.kind.as_str() {
        "addItem" => {
            let id = lock(store).add_item(&request.data);
            tracing::info!(id, name = %request.data, "item added");
        }
        "deleteItem" => {
            // The target lives in the envelope id, not the payload.
            let Ok(id) = request.id.parse::<i64>() else {
                tracing::debug!(id = %request.id, "deleteItem without a numeric id");
                return;
            };
            let removed = lock(store).delete_item(id);
            tracing::info!(id, removed, "item deleted");
        }
        other => tracing::debug!(kind = %other, "ignoring unknown request type"),
    }
}
