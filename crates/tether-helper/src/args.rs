//! Launch argument parsing.
//!
//! The host injects arguments in `-key=value` form (single dash, no
//! spaces), with the key names under its control. A double dash is
//! tolerated for hand-launched runs. This format rules out the usual
//! argument-parsing crates, so the loop below does the whole job.

/// Parsed launch configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchArgs {
    /// Address to listen on.
    pub addr: String,
    /// Port to listen on.
    pub port: u16,
    /// Host process id to watch; the helper exits when it disappears.
    pub pid: Option<u32>,
    /// Base64 public key of the host, doubling as the connect bearer token.
    pub token: String,
}

/// Launch argument problems, each self-describing for the usage message.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ArgError {
    /// Argument did not match the `-key=value` shape or used an unknown key.
    #[error("unrecognized argument: {0}")]
    Unrecognized(String),

    /// Known key with an unparseable value.
    #[error("invalid value for -{key}: {value}")]
    Invalid {
        /// The argument key.
        key: String,
        /// The offending value.
        value: String,
    },

    /// A required argument was absent.
    #[error("missing required -{0}=... argument")]
    Missing(&'static str),
}

/// Usage text for launch errors.
pub const USAGE: &str =
    "usage: tether-helper -port=NUMBER -token=BASE64KEY [-addr=HOST] [-pid=NUMBER]";

/// Parses `-key=value` arguments (program name already stripped).
pub fn parse_args(args: &[String]) -> Result<LaunchArgs, ArgError> {
    let mut addr = None;
    let mut port = None;
    let mut pid = None;
    let mut token = None;

    for arg in args {
        let Some(stripped) = arg.strip_prefix('-') else {
            return Err(ArgError::Unrecognized(arg.clone()));
        };
        let stripped = stripped.strip_prefix('-').unwrap_or(stripped);
        let Some((key, value)) = stripped.split_once('=') else {
            return Err(ArgError::Unrecognized(arg.clone()));
        };
        let invalid = || ArgError::Invalid { key: key.to_string(), value: value.to_string() };
        match key {
            "addr" => addr = Some(value.to_string()),
            "port" => port = Some(value.parse::<u16>().map_err(|_| invalid())?),
            "pid" => pid = Some(value.parse::<u32>().map_err(|_| invalid())?),
            "token" => token = Some(value.to_string()),
            _ => return Err(ArgError::Unrecognized(arg.clone())),
        }
    }

    Ok(LaunchArgs {
        addr: addr.unwrap_or_else(|| "127.0.0.1".to_string()),
        port: port.ok_or(ArgError::Missing("port"))?,
        pid,
        token: token.ok_or(ArgError::Missing("token"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parses_a_full_invocation() {
        let args = strings(&["-port=8573", "-token=abc123=", "-pid=4242", "-addr=0.0.0.0"]);
        let parsed = parse_args(&args).unwrap();
        assert_eq!(
            parsed,
            LaunchArgs {
                addr: "0.0.0.0".to_string(),
                port: 8573,
                pid: Some(4242),
                token: "abc123=".to_string(),
            }
        );
    }

    #[test]
    fn addr_and_pid_are_optional() {
        let parsed = parse_args(&strings(&["-port=9000", "-token=k"])).unwrap();
        assert_eq!(parsed.addr, "127.0.0.1");
        assert_eq!(parsed.pid, None);
    }

    #[test]
    fn double_dash_is_tolerated() {
        let parsed = parse_args(&strings(&["--port=9000", "--token=k"])).unwrap();
        assert_eq!(parsed.port, 9000);
    }

    #[test]
    fn token_value_may_contain_equals() {
        // Base64 padding: only the first '=' splits key from value.
        let parsed = parse_args(&strings(&["-port=1", "-token=QUJDRA=="])).unwrap();
        assert_eq!(parsed.token, "QUJDRA==");
    }

    #[test]
    fn missing_port_is_reported() {
        let result = parse_args(&strings(&["-token=k"]));
        assert_eq!(result, Err(ArgError::Missing("port")));
    }

    #[test]
    fn missing_token_is_reported() {
        let result = parse_args(&strings(&["-port=1"]));
        assert_eq!(result, Err(ArgError::Missing("token")));
    }

    #[test]
    fn bad_port_is_invalid() {
        let result = parse_args(&strings(&["-port=many", "-token=k"]));
        assert_eq!(
            result,
            Err(ArgError::Invalid { key: "port".to_string(), value: "many".to_string() })
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = parse_args(&strings(&["-port=1", "-token=k", "-verbose=1"]));
        assert_eq!(result, Err(ArgError::Unrecognized("-verbose=1".to_string())));
    }

    #[test]
    fn bare_words_are_rejected() {
        let result = parse_args(&strings(&["port=1"]));
        assert_eq!(result, Err(ArgError::Unrecognized("port=1".to_string())));
    }
}
