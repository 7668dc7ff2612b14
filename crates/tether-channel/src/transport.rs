//! Line-delimited socket transport.
//!
//! One background task owns the TCP connection. Outbound text is written
//! as one line per message; inbound lines are forwarded on a channel. The
//! task greets the peer with `CONNECT <path> <bearer>` and expects an `ok`
//! line back before any traffic flows.
//!
//! Dialing retries with backoff inside the task, so a transport can be
//! opened before its peer is listening. A mid-cycle disconnect is also
//! redialed. Exhausting a dial budget is terminal: it reports through the
//! fatal hook and ends the task, leaving the owner to close out the cycle.

use std::time::Duration;

use tether_core::Environment;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::hooks::ErrorHook;

/// Outbound queue depth before `publish` starts shedding.
pub(crate) const OUTBOUND_BUFFER: usize = 64;
const INBOUND_BUFFER: usize = 64;
const DIAL_BACKOFF: Duration = Duration::from_millis(250);
const DIAL_JITTER_MS: u64 = 50;
/// Dial budget when the peer may still be starting up.
const LAZY_DIAL_ATTEMPTS: u32 = 40;
/// Dial budget when the caller wants a fast verdict.
const EAGER_DIAL_ATTEMPTS: u32 = 3;
const GREETING_TIMEOUT: Duration = Duration::from_secs(5);
const GREETING_OK: &str = "ok";

/// Socket transport failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to reach the peer within the dial budget.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The peer refused or garbled the greeting exchange.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// An established stream failed mid-session.
    #[error("stream error: {0}")]
    Stream(String),

    /// The peer closed the stream.
    #[error("stream closed by peer")]
    Closed,
}

/// Where the transport should connect and how to introduce itself.
#[derive(Debug, Clone)]
pub(crate) struct TransportOptions {
    /// `address:port` to dial.
    pub endpoint: String,
    /// Resource path announced in the greeting.
    pub path: String,
    /// Bearer token announced in the greeting.
    pub bearer: String,
}

/// Channel pair bridging the owner to the connection task.
pub(crate) struct Transport {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
}

/// How the connection task reports trouble.
///
/// `errors` carries recoverable stream failures; the task redials after
/// reporting one. `fatal` carries a dial budget running out, after which
/// the task is gone.
pub(crate) struct TransportHooks {
    pub errors: ErrorHook,
    pub fatal: ErrorHook,
}

type Connection = (Lines<BufReader<OwnedReadHalf>>, OwnedWriteHalf);

/// Dials immediately and fails fast when the peer is unreachable.
///
/// The fatal hook fires if a later redial runs out of budget.
pub(crate) async fn connect_eager<E: Environment>(
    env: &E,
    options: TransportOptions,
    cancel: CancellationToken,
    hooks: TransportHooks,
) -> Result<Transport, TransportError> {
    let connection = dial_with_retry(env, &options, EAGER_DIAL_ATTEMPTS, &cancel).await?;
    Ok(start(env, options, cancel, hooks, Some(connection)))
}

/// Returns at once; the background task dials with an extended budget.
///
/// Used when the peer process is spawned after the transport is created
/// and needs time to start listening. Running out of budget, on the
/// first dial or any redial, fires the fatal hook and ends the task.
pub(crate) fn open_lazy<E: Environment>(
    env: &E,
    options: TransportOptions,
    cancel: CancellationToken,
    hooks: TransportHooks,
) -> Transport {
    start(env, options, cancel, hooks, None)
}

fn start<E: Environment>(
    env: &E,
    options: TransportOptions,
    cancel: CancellationToken,
    hooks: TransportHooks,
    connection: Option<Connection>,
) -> Transport {
    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_BUFFER);
    let (in_tx, in_rx) = mpsc::channel(INBOUND_BUFFER);
    tokio::spawn(run_transport(
        env.clone(),
        options,
        cancel,
        hooks,
        connection,
        out_rx,
        in_tx,
    ));
    Transport { outbound: out_tx, inbound: in_rx }
}

async fn run_transport<E: Environment>(
    env: E,
    options: TransportOptions,
    cancel: CancellationToken,
    hooks: TransportHooks,
    mut connection: Option<Connection>,
    mut out_rx: mpsc::Receiver<String>,
    in_tx: mpsc::Sender<String>,
) {
    loop {
        let (reader, writer) = match connection.take() {
            Some(established) => established,
            None => {
                match dial_with_retry(&env, &options, LAZY_DIAL_ATTEMPTS, &cancel).await {
                    Ok(established) => established,
                    Err(error) => {
                        if !cancel.is_cancelled() {
                            (hooks.fatal)(error.into());
                        }
                        return;
                    }
                }
            }
        };
        tracing::debug!(endpoint = %options.endpoint, "transport established");

        match bridge(reader, writer, &mut out_rx, &in_tx, &cancel).await {
            BridgeEnd::Cancelled | BridgeEnd::OutboundClosed | BridgeEnd::InboundClosed => return,
            BridgeEnd::Eof => (hooks.errors)(TransportError::Closed.into()),
            BridgeEnd::Io(error) => {
                (hooks.errors)(TransportError::Stream(error.to_string()).into());
            }
        }
        if cancel.is_cancelled() {
            return;
        }
        // Lost the stream mid-cycle; dial again.
    }
}

enum BridgeEnd {
    Cancelled,
    Eof,
    OutboundClosed,
    InboundClosed,
    Io(std::io::Error),
}

async fn bridge(
    mut reader: Lines<BufReader<OwnedReadHalf>>,
    mut writer: OwnedWriteHalf,
    out_rx: &mut mpsc::Receiver<String>,
    in_tx: &mpsc::Sender<String>,
    cancel: &CancellationToken,
) -> BridgeEnd {
    loop {
        tokio::select! {
            () = cancel.cancelled() => return BridgeEnd::Cancelled,
            outbound = out_rx.recv() => match outbound {
                Some(text) => {
                    let line = format!("{text}\n");
                    if let Err(error) = writer.write_all(line.as_bytes()).await {
                        return BridgeEnd::Io(error);
                    }
                }
                None => return BridgeEnd::OutboundClosed,
            },
            inbound = reader.next_line() => match inbound {
                Ok(Some(line)) => {
                    if in_tx.send(line).await.is_err() {
                        return BridgeEnd::InboundClosed;
                    }
                }
                Ok(None) => return BridgeEnd::Eof,
                Err(error) => return BridgeEnd::Io(error),
            },
        }
    }
}

async fn dial_with_retry<E: Environment>(
    env: &E,
    options: &TransportOptions,
    attempts: u32,
    cancel: &CancellationToken,
) -> Result<Connection, TransportError> {
    let mut last_error = None;
    for attempt in 0..attempts {
        if cancel.is_cancelled() {
            return Err(TransportError::Connection("cancelled".to_string()));
        }
        match dial_once(env, options).await {
            Ok(connection) => return Ok(connection),
            Err(error) => {
                tracing::debug!(attempt, error = %error, "dial attempt failed");
                last_error = Some(error);
            }
        }
        // Back off between attempts, not after the last one.
        if attempt + 1 < attempts {
            let jitter = Duration::from_millis(env.random_u64() % DIAL_JITTER_MS);
            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(TransportError::Connection("cancelled".to_string()));
                }
                () = env.sleep(DIAL_BACKOFF + jitter) => {}
            }
        }
    }
    Err(last_error
        .unwrap_or_else(|| TransportError::Connection("dial budget exhausted".to_string())))
}

async fn dial_once<E: Environment>(
    env: &E,
    options: &TransportOptions,
) -> Result<Connection, TransportError> {
    let stream = TcpStream::connect(&options.endpoint)
        .await
        .map_err(|error| TransportError::Connection(error.to_string()))?;
    let (read_half, mut write_half) = stream.into_split();

    let greeting = format!("CONNECT {} {}\n", options.path, options.bearer);
    write_half
        .write_all(greeting.as_bytes())
        .await
        .map_err(|error| TransportError::Handshake(error.to_string()))?;

    let mut reader = BufReader::new(read_half).lines();
    let reply = tokio::select! {
        () = env.sleep(GREETING_TIMEOUT) => {
            return Err(TransportError::Handshake("greeting timed out".to_string()));
        }
        reply = reader.next_line() => reply,
    };
    match reply {
        Ok(Some(line)) if line == GREETING_OK => Ok((reader, write_half)),
        Ok(Some(line)) => Err(TransportError::Handshake(format!("peer refused: {line}"))),
        Ok(None) => Err(TransportError::Handshake("peer closed during greeting".to_string())),
        Err(error) => Err(TransportError::Handshake(error.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::net::TcpListener;

    use super::*;
    use crate::system_env::SystemEnv;

    async fn accepting_peer(reply: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        let task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let greeting = lines.next_line().await.unwrap().unwrap();
            write_half.write_all(format!("{reply}\n").as_bytes()).await.unwrap();
            write_half.write_all(b"welcome\n").await.unwrap();
            greeting
        });
        (endpoint, task)
    }

    fn options(endpoint: String) -> TransportOptions {
        TransportOptions {
            endpoint,
            path: "/status".to_string(),
            bearer: "token-123".to_string(),
        }
    }

    fn quiet() -> TransportHooks {
        TransportHooks { errors: Arc::new(|_| {}), fatal: Arc::new(|_| {}) }
    }

    /// Environment whose sleeps return at once.
    #[derive(Clone)]
    struct NoWaitEnv;

    impl Environment for NoWaitEnv {
        type Instant = std::time::Instant;

        fn now(&self) -> Self::Instant {
            std::time::Instant::now()
        }

        fn sleep(&self, _: Duration) -> impl std::future::Future<Output = ()> + Send {
            std::future::ready(())
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(3);
        }

        fn wall_clock_millis(&self) -> i64 {
            0
        }
    }

    #[tokio::test]
    async fn eager_connect_greets_and_receives() {
        let (endpoint, peer) = accepting_peer("ok").await;
        let cancel = CancellationToken::new();
        let mut transport = connect_eager(&SystemEnv, options(endpoint), cancel.clone(), quiet())
            .await
            .unwrap();

        let greeting = peer.await.unwrap();
        assert_eq!(greeting, "CONNECT /status token-123");
        assert_eq!(transport.inbound.recv().await.unwrap(), "welcome");
        cancel.cancel();
    }

    #[tokio::test]
    async fn refused_greeting_is_a_handshake_error() {
        let (endpoint, _peer) = accepting_peer("denied").await;
        let result =
            connect_eager(&SystemEnv, options(endpoint), CancellationToken::new(), quiet()).await;
        assert!(matches!(result, Err(TransportError::Handshake(_))));
    }

    #[tokio::test]
    async fn silent_peer_times_out_the_greeting() {
        // The kernel accepts the connection but nobody ever answers the
        // greeting; the deadline runs on the environment clock, so instant
        // sleeps must fail the whole dial budget without real waiting.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            connect_eager(&NoWaitEnv, options(endpoint), CancellationToken::new(), quiet()),
        )
        .await
        .expect("greeting deadline ignored the environment clock");
        assert!(matches!(result, Err(TransportError::Handshake(_))));
    }

    #[tokio::test]
    async fn unreachable_peer_exhausts_the_dial_budget() {
        // Bind then drop to get a port nobody is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result =
            connect_eager(&SystemEnv, options(endpoint), CancellationToken::new(), quiet()).await;
        assert!(matches!(result, Err(TransportError::Connection(_))));
    }

    #[tokio::test]
    async fn lazy_open_waits_for_a_late_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        drop(listener);
        let late_endpoint = endpoint.clone();

        let cancel = CancellationToken::new();
        let mut transport = open_lazy(&SystemEnv, options(endpoint), cancel.clone(), quiet());

        // Start listening only after the first dial round has failed.
        let peer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(400)).await;
            let listener = TcpListener::bind(late_endpoint).await.unwrap();
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            lines.next_line().await.unwrap().unwrap();
            write_half.write_all(b"ok\nlate\n").await.unwrap();
        });

        assert_eq!(transport.inbound.recv().await.unwrap(), "late");
        peer.await.unwrap();
        cancel.cancel();
    }

    #[tokio::test]
    async fn outbound_lines_reach_the_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        let peer = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            lines.next_line().await.unwrap().unwrap();
            write_half.write_all(b"ok\n").await.unwrap();
            lines.next_line().await.unwrap().unwrap()
        });

        let cancel = CancellationToken::new();
        let transport = connect_eager(&SystemEnv, options(endpoint), cancel.clone(), quiet())
            .await
            .unwrap();
        transport.outbound.send("sealed-payload".to_string()).await.unwrap();

        assert_eq!(peer.await.unwrap(), "sealed-payload");
        cancel.cancel();
    }
}
