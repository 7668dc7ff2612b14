//! Channel supervision.
//!
//! [`Supervisor`] owns one connection cycle at a time: a cryptographic
//! session, a socket transport, an optional helper process, and the
//! watchdog tying them together. Every cycle gets a generation number;
//! [`ChannelHandle`]s issued by one cycle are refused by the next, so a
//! publisher can never write into a connection it did not set up.
//!
//! Build order within a cycle: session, transport, launch arguments,
//! helper process, watchdog, stdout watch, inbound pump. A failure in any
//! build step, including a transport that runs out of dial budget, aborts
//! the cycle through the exit hook. A failure after the cycle is up
//! (liveness timeout, rejected key rotation, too many decrypt failures)
//! goes through [`Supervisor::reset`], which tears the cycle down and
//! rebuilds it when retry is enabled.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tether_core::{
    BindingContext, ChannelConfig, ChannelPhase, ConfigError, Environment, FailureCounter,
    KeyRotationWatcher, LivenessWatchdog, ReplayGuard, RotationScan,
};
use tether_crypto::{Session, SessionFactory};
use tether_proto::{Envelope, encode_and_seal, open_and_decode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ChannelError;
use crate::hooks::{ChannelHooks, ErrorHook};
use crate::process::{self, HelperSpec};
use crate::system_env::SystemEnv;
use crate::transport::{self, Transport, TransportError, TransportHooks, TransportOptions};

const REBUILD_BACKOFF: Duration = Duration::from_millis(500);
const STDOUT_BUFFER: usize = 32;

/// Locks a mutex, recovering the data from a poisoned guard.
///
/// Supervision state must stay reachable even if a hook panicked while
/// a guard was held; the state itself is kept consistent by writing it
/// in single lock scopes.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Write capability for one connection cycle.
///
/// Cheap to clone and safe to hold across cycles: once the cycle that
/// issued it ends, [`Supervisor::publish`] refuses the handle with
/// [`ChannelError::StaleHandle`].
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    generation: u64,
    outbound: mpsc::Sender<String>,
}

impl ChannelHandle {
    /// The connection cycle this handle belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Supervises a secure channel to a helper process.
///
/// Clones share one supervisor; all state lives behind an [`Arc`].
#[derive(Clone)]
pub struct Supervisor<E: Environment = SystemEnv> {
    inner: Arc<Inner<E>>,
}

struct Inner<E: Environment> {
    env: E,
    factory: SessionFactory,
    config: Mutex<ChannelConfig>,
    state: Mutex<Shared<E>>,
}

struct Shared<E: Environment> {
    phase: ChannelPhase,
    generation: u64,
    /// Whether the current cycle owns a helper process (and may rebuild).
    helper_cycle: bool,
    session: Option<Arc<Mutex<Session>>>,
    outbound: Option<mpsc::Sender<String>>,
    cycle: Option<CancellationToken>,
    hooks: Option<ChannelHooks>,
    watchdog: Option<Arc<Mutex<LivenessWatchdog<E::Instant>>>>,
    replay: ReplayGuard,
    failures: FailureCounter,
}

impl Supervisor<SystemEnv> {
    /// A supervisor on the system clock and OS entropy.
    pub fn with_system_env(config: ChannelConfig, factory: SessionFactory) -> Self {
        Self::new(SystemEnv, config, factory)
    }
}

impl<E: Environment> Supervisor<E> {
    /// Creates an idle supervisor. No work starts until a connect call.
    pub fn new(env: E, config: ChannelConfig, factory: SessionFactory) -> Self {
        let replay = ReplayGuard::new(config.replay_window_ms);
        Self {
            inner: Arc::new(Inner {
                env,
                factory,
                config: Mutex::new(config),
                state: Mutex::new(Shared {
                    phase: ChannelPhase::Idle,
                    generation: 0,
                    helper_cycle: false,
                    session: None,
                    outbound: None,
                    cycle: None,
                    hooks: None,
                    watchdog: None,
                    replay,
                    failures: FailureCounter::default(),
                }),
            }),
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ChannelPhase {
        lock(&self.inner.state).phase
    }

    /// A handle for the current cycle, if one is connected.
    pub fn handle(&self) -> Option<ChannelHandle> {
        let st = lock(&self.inner.state);
        let outbound = st.outbound.clone()?;
        Some(ChannelHandle { generation: st.generation, outbound })
    }

    /// Mutates the configuration used by future connect calls.
    ///
    /// The replay window takes effect immediately; everything else is
    /// read at the start of the next cycle.
    pub fn update_config(&self, mutate: impl FnOnce(&mut ChannelConfig)) {
        let window_ms = {
            let mut config = lock(&self.inner.config);
            mutate(&mut config);
            config.replay_window_ms
        };
        lock(&self.inner.state).replay.set_window(window_ms);
    }

    /// Pairs the current session with a peer public key supplied out of
    /// band, in PEM or base64 form.
    pub fn set_external_public_key(&self, text: &str) -> Result<(), ChannelError> {
        let session =
            { lock(&self.inner.state).session.clone() }.ok_or(ChannelError::NotConnected)?;
        let result = lock(&session).set_external_public_key(text);
        result.map_err(ChannelError::Crypto)
    }

    /// Opens a channel to an already-listening peer, without a helper.
    ///
    /// Dials eagerly and fails fast when the peer is unreachable. Must be
    /// called from within a Tokio runtime.
    pub async fn connect(&self, hooks: ChannelHooks) -> Result<ChannelHandle, ChannelError> {
        let config = { lock(&self.inner.config).clone() };
        config.validate(false)?;
        let endpoint = config.endpoint()?;
        let path = config.request_path().to_string();

        let session = Arc::new(Mutex::new((self.inner.factory)()?));
        let bearer = { lock(&session).local_public_key() };

        let (generation, cancel) = self.begin_cycle(&hooks, false);
        {
            let mut st = lock(&self.inner.state);
            if st.generation != generation {
                return Err(ChannelError::StaleHandle);
            }
            st.session = Some(session);
        }

        let fatal: ErrorHook = {
            let sup = self.clone();
            let hooks = hooks.clone();
            Arc::new(move |error| sup.abort_cycle(generation, &hooks, error))
        };
        let options = TransportOptions { endpoint, path, bearer };
        let transport = match transport::connect_eager(
            &self.inner.env,
            options,
            cancel.child_token(),
            TransportHooks { errors: hooks.error.clone(), fatal },
        )
        .await
        {
            Ok(transport) => transport,
            Err(error) => {
                self.fail_build(generation);
                return Err(error.into());
            }
        };

        self.install_transport(generation, &cancel, &hooks, transport, config.ping_time_limit)
    }

    /// Starts a full connection cycle: spawn the helper, open the channel.
    ///
    /// Validates the configuration synchronously and returns; the cycle
    /// itself proceeds in background tasks reporting through `hooks`.
    /// Must be called from within a Tokio runtime.
    pub fn connect_with_helper(&self, hooks: ChannelHooks) -> Result<(), ChannelError> {
        let config = { lock(&self.inner.config).clone() };
        config.validate(true)?;
        self.spawn_cycle(config, hooks);
        Ok(())
    }

    /// Seals `value` with the current wall clock as additional data and
    /// queues it for the peer.
    pub fn publish<T: Serialize>(
        &self,
        handle: &ChannelHandle,
        value: &T,
    ) -> Result<(), ChannelError> {
        let stamp = self.inner.env.wall_clock_millis().to_string();
        self.publish_with_additional_data(handle, value, &stamp)
    }

    /// Seals `value` with caller-chosen additional data and queues it.
    ///
    /// Encoding and sealing failures are returned. Delivery itself is
    /// fire-and-forget: a full or torn-down outbound queue drops the
    /// payload and reports through the error hook instead.
    pub fn publish_with_additional_data<T: Serialize>(
        &self,
        handle: &ChannelHandle,
        value: &T,
        additional_data: &str,
    ) -> Result<(), ChannelError> {
        let (session, hooks) = {
            let st = lock(&self.inner.state);
            if handle.generation != st.generation || st.outbound.is_none() {
                return Err(ChannelError::StaleHandle);
            }
            let session = st.session.clone().ok_or(ChannelError::NotConnected)?;
            (session, st.hooks.clone())
        };

        let sealed = {
            let session = lock(&session);
            encode_and_seal(&session, value, additional_data)
        }
        .map_err(ChannelError::Encode)?;

        match handle.outbound.try_send(sealed) {
            Ok(()) => Ok(()),
            Err(error) => {
                tracing::warn!(%error, "outbound queue unavailable, dropping payload");
                if let Some(hooks) = hooks {
                    (hooks.error)(ChannelError::Transport(TransportError::Stream(
                        error.to_string(),
                    )));
                }
                Ok(())
            }
        }
    }

    /// Publishes a `{type, id, data}` envelope.
    pub fn publish_envelope(
        &self,
        handle: &ChannelHandle,
        kind: &str,
        id: &str,
        data: &str,
    ) -> Result<(), ChannelError> {
        self.publish(handle, &Envelope::new(kind, id, data))
    }

    /// Opens a sealed inbound message, checks its timestamp against the
    /// replay guard, and decodes the plaintext as JSON.
    pub fn decrypt_and_decode<T: DeserializeOwned>(
        &self,
        message: &str,
    ) -> Result<T, ChannelError> {
        self.decrypt_and_decode_with(message, |additional_data| {
            self.auth_timestamp(additional_data)
        })
    }

    /// Like [`Supervisor::decrypt_and_decode`], but with a caller-supplied
    /// authentication predicate over the additional data.
    ///
    /// Every failure of this operation counts toward the consecutive
    /// decrypt-failure limit; reaching the limit resets the channel.
    pub fn decrypt_and_decode_with<T, F>(
        &self,
        message: &str,
        authenticate: F,
    ) -> Result<T, ChannelError>
    where
        T: DeserializeOwned,
        F: FnOnce(&str) -> bool,
    {
        let session =
            { lock(&self.inner.state).session.clone() }.ok_or(ChannelError::NotConnected)?;

        let result = {
            let session = lock(&session);
            open_and_decode(&session, message, authenticate)
        };
        match result {
            Ok(value) => {
                lock(&self.inner.state).failures.record_success();
                Ok(value)
            }
            Err(error) => {
                let tripped = lock(&self.inner.state).failures.record_failure();
                if tripped {
                    tracing::warn!("consecutive decrypt failures reached the limit, resetting");
                    self.reset();
                }
                Err(ChannelError::DecryptAndDecode(error))
            }
        }
    }

    /// Checks additional data against the replay guard and records it on
    /// success. Safe to call from the `decrypt_and_decode_with` predicate.
    pub fn auth_timestamp(&self, additional_data: &str) -> bool {
        let now_ms = self.inner.env.wall_clock_millis();
        lock(&self.inner.state).replay.accept(additional_data, now_ms)
    }

    /// Records peer liveness without delivering a message.
    pub fn pong(&self) {
        let watchdog = { lock(&self.inner.state).watchdog.clone() };
        if let Some(watchdog) = watchdog {
            lock(&watchdog).mark_alive(self.inner.env.now());
        }
    }

    /// Tears down the current cycle and rebuilds it when retry is enabled.
    ///
    /// Safe to call at any time and from any thread. Per teardown trigger
    /// at most one rebuild is scheduled; concurrent calls find the cycle
    /// already gone and return. The replay guard and failure counter
    /// survive, so a rebuilt cycle cannot be fed earlier traffic.
    pub fn reset(&self) {
        let generation = { lock(&self.inner.state).generation };
        self.reset_cycle(generation);
    }

    /// Permanently stops the channel. The session survives so already
    /// received messages can still be opened.
    ///
    /// Safe at any point, including while a cycle is still building.
    pub fn cancel(&self) {
        let mut st = lock(&self.inner.state);
        if let Some(token) = st.cycle.take() {
            token.cancel();
        }
        // A new generation strands any build step still in flight; its
        // install finds the number changed and stands down.
        st.generation += 1;
        st.phase = ChannelPhase::Terminated;
        st.outbound = None;
        st.watchdog = None;
        st.hooks = None;
        tracing::info!("channel cancelled");
    }

    /// Tears down `generation` if it is still the live cycle.
    ///
    /// Stale callers (a watchdog that lost a race with a rebuild, for
    /// example) find a different generation and leave the channel alone.
    fn reset_cycle(&self, generation: u64) {
        let rebuild = {
            let mut st = lock(&self.inner.state);
            if st.generation != generation {
                return;
            }
            let Some(token) = st.cycle.take() else {
                return;
            };
            token.cancel();
            st.phase = ChannelPhase::Faulted;
            st.outbound = None;
            st.watchdog = None;
            st.session = None;
            if st.helper_cycle { st.hooks.clone() } else { None }
        };
        tracing::info!(generation, "channel reset");

        match rebuild {
            Some(hooks) => {
                let config = { lock(&self.inner.config).clone() };
                if config.retry_on_exit {
                    self.schedule_rebuild(generation, config, hooks);
                } else {
                    self.terminate_idle();
                }
            }
            None => self.terminate_idle(),
        }
    }

    /// Moves a torn-down channel to `Terminated` unless a cycle restarted.
    fn terminate_idle(&self) {
        let mut st = lock(&self.inner.state);
        if st.cycle.is_none() {
            st.phase = ChannelPhase::Terminated;
            st.hooks = None;
        }
    }

    fn schedule_rebuild(&self, observed: u64, config: ChannelConfig, hooks: ChannelHooks) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime available, channel stays faulted");
            return;
        };
        let sup = self.clone();
        runtime.spawn(async move {
            sup.inner.env.sleep(REBUILD_BACKOFF).await;
            // Stand down if a new cycle raced in or the owner cancelled
            // during the backoff.
            let superseded = {
                let st = lock(&sup.inner.state);
                st.generation != observed || st.cycle.is_some() || st.phase.is_terminal()
            };
            if superseded {
                return;
            }
            tracing::info!("rebuilding channel after reset");
            sup.spawn_cycle(config, hooks);
        });
    }

    /// Cancels any previous cycle and opens a new generation.
    fn begin_cycle(&self, hooks: &ChannelHooks, helper_cycle: bool) -> (u64, CancellationToken) {
        let token = CancellationToken::new();
        let mut st = lock(&self.inner.state);
        if let Some(previous) = st.cycle.take() {
            previous.cancel();
        }
        st.generation += 1;
        st.phase = ChannelPhase::Connecting;
        st.helper_cycle = helper_cycle;
        st.session = None;
        st.outbound = None;
        st.watchdog = None;
        st.hooks = Some(hooks.clone());
        st.cycle = Some(token.clone());
        (st.generation, token)
    }

    fn spawn_cycle(&self, config: ChannelConfig, hooks: ChannelHooks) {
        let (generation, cancel) = self.begin_cycle(&hooks, true);
        tokio::spawn(run_helper_cycle(self.clone(), config, hooks, generation, cancel));
    }

    /// Marks a failed build step: cycle cancelled, phase `Faulted`.
    ///
    /// Returns false when `generation` is no longer the live cycle.
    fn fail_build(&self, generation: u64) -> bool {
        let mut st = lock(&self.inner.state);
        if st.generation != generation {
            return false;
        }
        if let Some(token) = st.cycle.take() {
            token.cancel();
        }
        st.phase = ChannelPhase::Faulted;
        st.outbound = None;
        st.watchdog = None;
        true
    }

    /// Aborts a cycle during its build steps and notifies the exit hook.
    ///
    /// Build failures point at something retrying cannot fix (bad config,
    /// missing binary, an endpoint that refused a whole dial budget), so
    /// they never auto-retry; the owner decides whether to reconnect.
    fn abort_cycle(&self, generation: u64, hooks: &ChannelHooks, error: ChannelError) {
        if !self.fail_build(generation) {
            return;
        }
        tracing::warn!(%error, "connection cycle aborted");
        (hooks.exit)(Some(error));
    }

    /// Stores the outbound queue and watchdog, then starts the cycle's
    /// pump and watchdog tasks.
    fn install_transport(
        &self,
        generation: u64,
        cancel: &CancellationToken,
        hooks: &ChannelHooks,
        transport: Transport,
        ping_time_limit: Duration,
    ) -> Result<ChannelHandle, ChannelError> {
        let Transport { outbound, inbound } = transport;
        let watchdog =
            Arc::new(Mutex::new(LivenessWatchdog::new(ping_time_limit, self.inner.env.now())));
        {
            let mut st = lock(&self.inner.state);
            if st.generation != generation {
                return Err(ChannelError::StaleHandle);
            }
            st.outbound = Some(outbound.clone());
            st.watchdog = Some(watchdog.clone());
        }
        if !ping_time_limit.is_zero() {
            tokio::spawn(run_watchdog(
                self.clone(),
                hooks.clone(),
                watchdog.clone(),
                generation,
                cancel.child_token(),
            ));
        }
        tokio::spawn(run_pump(
            self.clone(),
            hooks.clone(),
            watchdog,
            inbound,
            generation,
            cancel.child_token(),
        ));
        Ok(ChannelHandle { generation, outbound })
    }
}

/// Builds one helper-backed cycle, then pumps inbound messages until the
/// cycle ends.
async fn run_helper_cycle<E: Environment>(
    sup: Supervisor<E>,
    config: ChannelConfig,
    hooks: ChannelHooks,
    generation: u64,
    cancel: CancellationToken,
) {
    let env = sup.inner.env.clone();

    // Session first: its public key becomes the bearer token and the
    // helper's encryption target.
    let session = match (sup.inner.factory)() {
        Ok(session) => Arc::new(Mutex::new(session)),
        Err(error) => return sup.abort_cycle(generation, &hooks, error.into()),
    };
    let bearer = { lock(&session).local_public_key() };
    {
        let mut st = lock(&sup.inner.state);
        if st.generation != generation {
            return;
        }
        st.session = Some(session);
    }

    let fatal: ErrorHook = {
        let sup = sup.clone();
        let hooks = hooks.clone();
        Arc::new(move |error| sup.abort_cycle(generation, &hooks, error))
    };

    // Transport next. It dials in the background with a generous budget,
    // covering the gap until the helper starts listening. An exhausted
    // budget aborts the cycle.
    let Some(port) = config.port else {
        return sup.abort_cycle(generation, &hooks, ConfigError::MissingPort.into());
    };
    let options = TransportOptions {
        endpoint: format!("{}:{port}", config.addr),
        path: config.request_path().to_string(),
        bearer: bearer.clone(),
    };
    let transport = transport::open_lazy(
        &env,
        options,
        cancel.child_token(),
        TransportHooks { errors: hooks.error.clone(), fatal: fatal.clone() },
    );

    // Launch arguments from the live binding context.
    let Some(bin) = config.helper_bin.clone() else {
        return sup.abort_cycle(generation, &hooks, ConfigError::MissingHelperBinary.into());
    };
    let context = BindingContext {
        pid: std::process::id(),
        addr: &config.addr,
        port,
        bearer: &bearer,
    };
    let mut args = config.helper_args.clone();
    args.extend(config.bindings().render(&context));

    // Helper process.
    let (stdout_tx, stdout_rx) = mpsc::channel(STDOUT_BUFFER);
    tokio::spawn(process::run_helper(
        env.clone(),
        HelperSpec { bin, args, retry: config.retry_on_exit },
        stdout_tx,
        hooks.exit.clone(),
        fatal,
        cancel.child_token(),
    ));

    // Watchdog.
    let watchdog =
        Arc::new(Mutex::new(LivenessWatchdog::new(config.ping_time_limit, env.now())));
    {
        let mut st = lock(&sup.inner.state);
        if st.generation != generation {
            return;
        }
        st.outbound = Some(transport.outbound.clone());
        st.watchdog = Some(watchdog.clone());
    }
    if !config.ping_time_limit.is_zero() {
        tokio::spawn(run_watchdog(
            sup.clone(),
            hooks.clone(),
            watchdog.clone(),
            generation,
            cancel.child_token(),
        ));
    }

    // Stdout watch.
    let watcher = KeyRotationWatcher::new(config.watch_key_rotation);
    tokio::spawn(run_stdout_tap(
        sup.clone(),
        hooks.clone(),
        watcher,
        stdout_rx,
        generation,
        cancel.child_token(),
    ));

    // The cycle task itself becomes the inbound pump.
    run_pump(sup, hooks, watchdog, transport.inbound, generation, cancel).await;
}

/// Delivers inbound messages to the message hook, marking liveness and
/// flipping the phase to `Active` on the first one.
async fn run_pump<E: Environment>(
    sup: Supervisor<E>,
    hooks: ChannelHooks,
    watchdog: Arc<Mutex<LivenessWatchdog<E::Instant>>>,
    mut inbound: mpsc::Receiver<String>,
    generation: u64,
    cancel: CancellationToken,
) {
    let env = sup.inner.env.clone();
    let mut first = true;
    loop {
        let message = tokio::select! {
            () = cancel.cancelled() => return,
            message = inbound.recv() => message,
        };
        let Some(message) = message else { return };
        lock(&watchdog).mark_alive(env.now());
        if first {
            first = false;
            {
                let mut st = lock(&sup.inner.state);
                if st.generation == generation {
                    st.phase = ChannelPhase::Active;
                }
            }
            tracing::info!(generation, "channel active");
            (hooks.connected)();
        }
        (hooks.message)(message);
    }
}

/// Sleeps until the liveness deadline, then resets the cycle if nothing
/// moved the deadline forward in the meantime.
async fn run_watchdog<E: Environment>(
    sup: Supervisor<E>,
    hooks: ChannelHooks,
    watchdog: Arc<Mutex<LivenessWatchdog<E::Instant>>>,
    generation: u64,
    cancel: CancellationToken,
) {
    let env = sup.inner.env.clone();
    loop {
        let remaining = { lock(&watchdog).remaining(env.now()) };
        let Some(remaining) = remaining else { return };
        tokio::select! {
            () = cancel.cancelled() => return,
            () = env.sleep(remaining) => {}
        }
        let expired = { lock(&watchdog).expired(env.now()) };
        if let Some(elapsed) = expired {
            tracing::warn!(?elapsed, "liveness limit exceeded, resetting channel");
            (hooks.timeout)();
            sup.reset_cycle(generation);
            return;
        }
    }
}

/// Forwards helper stdout to the stdout hook and scans it for in-band
/// key announcements.
async fn run_stdout_tap<E: Environment>(
    sup: Supervisor<E>,
    hooks: ChannelHooks,
    watcher: KeyRotationWatcher,
    mut stdout: mpsc::Receiver<String>,
    generation: u64,
    cancel: CancellationToken,
) {
    loop {
        let chunk = tokio::select! {
            () = cancel.cancelled() => return,
            chunk = stdout.recv() => match chunk {
                Some(chunk) => chunk,
                None => return,
            },
        };
        (hooks.stdout)(chunk.clone());
        match watcher.scan(&chunk) {
            RotationScan::NoBlock => {}
            RotationScan::Key(key) => {
                let session = {
                    let st = lock(&sup.inner.state);
                    if st.generation != generation {
                        return;
                    }
                    st.session.clone()
                };
                let Some(session) = session else { continue };
                let adopted = { lock(&session).set_external_key(key) };
                match adopted {
                    Ok(()) => tracing::info!("adopted helper public key"),
                    Err(error) => {
                        tracing::warn!(%error, "rejected helper public key, resetting");
                        (hooks.error)(ChannelError::KeyRotation { reason: error.to_string() });
                        sup.reset_cycle(generation);
                        return;
                    }
                }
            }
            RotationScan::Malformed(error) => {
                tracing::warn!(%error, "malformed key block on helper output, resetting");
                (hooks.error)(ChannelError::KeyRotation { reason: error.to_string() });
                sup.reset_cycle(generation);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tether_crypto::{Suite, suite_factory};

    use super::*;

    fn config() -> ChannelConfig {
        // Wide replay window; a scheduler pause must not reject a stamp
        // minted moments earlier in the same test.
        ChannelConfig { port: Some(9_300), replay_window_ms: 5_000, ..ChannelConfig::default() }
    }

    fn supervisor() -> Supervisor<SystemEnv> {
        Supervisor::with_system_env(config(), suite_factory(Suite::Sha256))
    }

    #[test]
    fn starts_idle_without_a_handle() {
        let sup = supervisor();
        assert_eq!(sup.phase(), ChannelPhase::Idle);
        assert!(sup.handle().is_none());
    }

    #[test]
    fn decrypt_before_connect_is_not_connected() {
        let sup = supervisor();
        let result = sup.decrypt_and_decode::<Envelope>("{}");
        assert!(matches!(result, Err(ChannelError::NotConnected)));
    }

    #[test]
    fn connect_with_helper_requires_a_binary() {
        let sup = supervisor();
        let result = sup.connect_with_helper(ChannelHooks::new());
        assert!(matches!(
            result,
            Err(ChannelError::Config(ConfigError::MissingHelperBinary))
        ));
        assert_eq!(sup.phase(), ChannelPhase::Idle);
    }

    #[tokio::test]
    async fn connect_requires_a_port() {
        let sup = Supervisor::with_system_env(
            ChannelConfig::default(),
            suite_factory(Suite::Sha256),
        );
        let result = sup.connect(ChannelHooks::new()).await;
        assert!(matches!(result, Err(ChannelError::Config(ConfigError::MissingPort))));
    }

    #[test]
    fn auth_timestamp_accepts_fresh_and_rejects_replay() {
        let sup = supervisor();
        let stamp = SystemEnv.wall_clock_millis().to_string();
        assert!(sup.auth_timestamp(&stamp));
        assert!(!sup.auth_timestamp(&stamp));
    }

    #[test]
    fn update_config_retunes_the_replay_window() {
        let sup = supervisor();
        // A day of skew is rejected under the default window.
        let stale = (SystemEnv.wall_clock_millis() - 86_400_000).to_string();
        assert!(!sup.auth_timestamp(&stale));

        sup.update_config(|config| config.replay_window_ms = 172_800_000);
        assert!(sup.auth_timestamp(&stale));
    }

    #[test]
    fn reset_without_a_cycle_is_a_no_op() {
        let sup = supervisor();
        sup.reset();
        assert_eq!(sup.phase(), ChannelPhase::Idle);
    }

    #[test]
    fn cancel_is_terminal() {
        let sup = supervisor();
        sup.cancel();
        assert_eq!(sup.phase(), ChannelPhase::Terminated);
        sup.reset();
        assert_eq!(sup.phase(), ChannelPhase::Terminated);
    }
}
