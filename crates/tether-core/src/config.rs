//! Channel configuration and helper argument bindings.
//!
//! Configuration is owner-supplied and mutable between cycles; each cycle
//! snapshots it once at start, so mid-cycle edits only affect the next
//! rebuild. Validation happens up front when an operation starts, before
//! any process is spawned.

use std::{path::PathBuf, time::Duration};

use crate::{
    error::ConfigError, replay::DEFAULT_REPLAY_WINDOW_MS, watchdog::DEFAULT_PING_TIME_LIMIT,
};

/// Request descriptor announced to the transport peer on connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Path presented in the transport greeting.
    pub path: String,
}

impl Default for ConnectRequest {
    fn default() -> Self {
        Self { path: "/".to_string() }
    }
}

/// Where a rendered helper argument takes its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentSource {
    /// The supervisor's process id.
    ProcessId,
    /// The transport address.
    Address,
    /// The transport port.
    Port,
    /// The bearer token (the supervisor session's public key).
    BearerToken,
}

/// Runtime values substituted into argument bindings.
#[derive(Debug, Clone, Copy)]
pub struct BindingContext<'a> {
    /// The supervisor's process id.
    pub pid: u32,
    /// The transport address the helper should serve on.
    pub addr: &'a str,
    /// The transport port the helper should serve on.
    pub port: u16,
    /// The bearer token the helper must require.
    pub bearer: &'a str,
}

/// Ordered set of helper argument bindings.
///
/// Each binding renders as a single `-key=value` token, matching the flag
/// syntax helper binaries parse. Order is stable: process id, address,
/// port, bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentBindings {
    bindings: Vec<(String, ArgumentSource)>,
}

impl ArgumentBindings {
    /// Number of configured bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no bindings are configured.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Render every binding against the given context.
    pub fn render(&self, ctx: &BindingContext<'_>) -> Vec<String> {
        self.bindings
            .iter()
            .map(|(key, source)| {
                let value = match source {
                    ArgumentSource::ProcessId => ctx.pid.to_string(),
                    ArgumentSource::Address => ctx.addr.to_string(),
                    ArgumentSource::Port => ctx.port.to_string(),
                    ArgumentSource::BearerToken => ctx.bearer.to_string(),
                };
                format!("-{key}={value}")
            })
            .collect()
    }
}

/// Configuration for a supervised channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Transport address. Helpers are local, so this defaults to loopback.
    pub addr: String,

    /// Transport port. Required before any cycle can start.
    pub port: Option<u16>,

    /// Request descriptor announced on connect. `None` uses the default.
    pub request: Option<ConnectRequest>,

    /// Path of the helper binary to spawn.
    pub helper_bin: Option<PathBuf>,

    /// Caller-supplied arguments passed before the rendered bindings.
    pub helper_args: Vec<String>,

    /// Restart the helper if it exits on its own.
    pub retry_on_exit: bool,

    /// Watch helper stdout for in-band key rotation.
    pub watch_key_rotation: bool,

    /// Time without inbound traffic before the liveness watchdog resets the
    /// channel. Zero disables the watchdog.
    pub ping_time_limit: Duration,

    /// Replay-guard jitter window in milliseconds.
    pub replay_window_ms: i64,

    /// Argument key for the supervisor pid, rendered as `-key=value`.
    /// `None` omits the argument.
    pub pid_argument: Option<String>,

    /// Argument key for the transport address.
    pub addr_argument: Option<String>,

    /// Argument key for the transport port.
    pub port_argument: Option<String>,

    /// Argument key for the bearer token.
    pub bearer_argument: Option<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1".to_string(),
            port: None,
            request: None,
            helper_bin: None,
            helper_args: Vec::new(),
            retry_on_exit: true,
            watch_key_rotation: false,
            ping_time_limit: DEFAULT_PING_TIME_LIMIT,
            replay_window_ms: DEFAULT_REPLAY_WINDOW_MS,
            pid_argument: Some("pid".to_string()),
            addr_argument: None,
            port_argument: Some("port".to_string()),
            bearer_argument: Some("token".to_string()),
        }
    }
}

impl ChannelConfig {
    /// Check that the configuration can start a cycle.
    ///
    /// `needs_helper` is true for operations that spawn the helper binary;
    /// transport-only connects skip the binary check.
    pub fn validate(&self, needs_helper: bool) -> Result<(), ConfigError> {
        if self.addr.trim().is_empty() {
            return Err(ConfigError::EmptyAddress);
        }
        if self.port.is_none() {
            return Err(ConfigError::MissingPort);
        }
        if self.replay_window_ms < 0 {
            return Err(ConfigError::NegativeReplayWindow { window_ms: self.replay_window_ms });
        }
        if needs_helper && self.helper_bin.is_none() {
            return Err(ConfigError::MissingHelperBinary);
        }
        Ok(())
    }

    /// The `addr:port` endpoint string for the transport.
    pub fn endpoint(&self) -> Result<String, ConfigError> {
        let port = self.port.ok_or(ConfigError::MissingPort)?;
        Ok(format!("{}:{port}", self.addr))
    }

    /// The request path announced on connect.
    pub fn request_path(&self) -> &str {
        self.request.as_ref().map_or("/", |request| request.path.as_str())
    }

    /// The argument bindings in rendering order.
    pub fn bindings(&self) -> ArgumentBindings {
        let pairs = [
            (&self.pid_argument, ArgumentSource::ProcessId),
            (&self.addr_argument, ArgumentSource::Address),
            (&self.port_argument, ArgumentSource::Port),
            (&self.bearer_argument, ArgumentSource::BearerToken),
        ];

        let bindings = pairs
            .into_iter()
            .filter_map(|(key, source)| key.clone().map(|key| (key, source)))
            .collect();
        ArgumentBindings { bindings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_config() -> ChannelConfig {
        ChannelConfig {
            port: Some(8573),
            helper_bin: Some(PathBuf::from("/usr/local/bin/tether-helper")),
            ..ChannelConfig::default()
        }
    }

    #[test]
    fn default_config_values() {
        let config = ChannelConfig::default();
        assert_eq!(config.addr, "127.0.0.1");
        assert_eq!(config.ping_time_limit, Duration::from_secs(65));
        assert_eq!(config.replay_window_ms, 10);
        assert!(config.retry_on_exit);
        assert!(!config.watch_key_rotation);
    }

    #[test]
    fn validate_passes_for_complete_config() {
        assert!(ready_config().validate(true).is_ok());
    }

    #[test]
    fn validate_rejects_missing_port() {
        let config = ChannelConfig { port: None, ..ready_config() };
        assert_eq!(config.validate(false), Err(ConfigError::MissingPort));
    }

    #[test]
    fn validate_rejects_empty_address() {
        let config = ChannelConfig { addr: "  ".to_string(), ..ready_config() };
        assert_eq!(config.validate(false), Err(ConfigError::EmptyAddress));
    }

    #[test]
    fn validate_rejects_negative_replay_window() {
        let config = ChannelConfig { replay_window_ms: -1, ..ready_config() };
        assert_eq!(
            config.validate(false),
            Err(ConfigError::NegativeReplayWindow { window_ms: -1 })
        );
    }

    #[test]
    fn validate_requires_helper_only_when_spawning() {
        let config = ChannelConfig { helper_bin: None, ..ready_config() };
        assert!(config.validate(false).is_ok());
        assert_eq!(config.validate(true), Err(ConfigError::MissingHelperBinary));
    }

    #[test]
    fn endpoint_joins_addr_and_port() {
        let config = ready_config();
        assert_eq!(config.endpoint().unwrap(), "127.0.0.1:8573");
    }

    #[test]
    fn request_path_defaults_to_root() {
        let mut config = ready_config();
        assert_eq!(config.request_path(), "/");

        config.request = Some(ConnectRequest { path: "/status".to_string() });
        assert_eq!(config.request_path(), "/status");
    }

    #[test]
    fn bindings_render_in_stable_order() {
        let config = ChannelConfig {
            addr_argument: Some("addr".to_string()),
            ..ready_config()
        };
        let ctx = BindingContext { pid: 4242, addr: "127.0.0.1", port: 8573, bearer: "tok3n" };

        let rendered = config.bindings().render(&ctx);
        assert_eq!(rendered, vec!["-pid=4242", "-addr=127.0.0.1", "-port=8573", "-token=tok3n"]);
    }

    #[test]
    fn unset_keys_are_omitted() {
        let config = ChannelConfig {
            pid_argument: None,
            bearer_argument: None,
            ..ready_config()
        };
        let ctx = BindingContext { pid: 1, addr: "127.0.0.1", port: 2, bearer: "b" };

        let rendered = config.bindings().render(&ctx);
        assert_eq!(rendered, vec!["-port=2"]);
    }

    #[test]
    fn no_bindings_renders_nothing() {
        let config = ChannelConfig {
            pid_argument: None,
            addr_argument: None,
            port_argument: None,
            bearer_argument: None,
            ..ready_config()
        };

        assert!(config.bindings().is_empty());
        let ctx = BindingContext { pid: 1, addr: "a", port: 2, bearer: "b" };
        assert!(config.bindings().render(&ctx).is_empty());
    }

    #[test]
    fn rendered_arguments_use_single_dash_equals_form() {
        let config = ready_config();
        let ctx = BindingContext { pid: 9, addr: "127.0.0.1", port: 80, bearer: "x" };

        for arg in config.bindings().render(&ctx) {
            assert!(arg.starts_with('-') && !arg.starts_with("--"));
            assert!(arg.contains('='));
        }
    }
}
