//! In-band public-key rotation watcher.
//!
//! The helper announces each new identity by printing a PEM block to
//! stdout. The watcher scans every stdout chunk the process manager hands
//! over; ordinary log output passes through as [`RotationScan::NoBlock`].

use tether_crypto::{CryptoError, PublicKey, pem};

/// Outcome of scanning one chunk of helper stdout.
#[derive(Debug)]
pub enum RotationScan {
    /// The chunk carries no key block; regular output.
    NoBlock,
    /// A well-formed key block was found.
    Key(PublicKey),
    /// A key block was found but could not be parsed.
    Malformed(CryptoError),
}

/// Scans helper stdout for PEM-announced key rotations.
///
/// When disabled, every chunk scans as [`RotationScan::NoBlock`], so the
/// driver can keep a single code path. Only the first block per chunk is
/// considered.
#[derive(Debug, Clone)]
pub struct KeyRotationWatcher {
    enabled: bool,
}

impl KeyRotationWatcher {
    /// Create a watcher; a disabled watcher never reports keys.
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Whether this watcher reports key blocks at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Scan one chunk of stdout text.
    pub fn scan(&self, chunk: &str) -> RotationScan {
        if !self.enabled {
            return RotationScan::NoBlock;
        }

        let Some(block) = pem::find_block(chunk) else {
            return RotationScan::NoBlock;
        };

        match pem::parse_public_key(block) {
            Ok(key) => RotationScan::Key(key),
            Err(error) => RotationScan::Malformed(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use tether_crypto::{Session, Suite};

    use super::*;

    #[test]
    fn plain_output_is_no_block() {
        let watcher = KeyRotationWatcher::new(true);
        assert!(matches!(watcher.scan("listening on 8573\n"), RotationScan::NoBlock));
        assert!(matches!(watcher.scan(""), RotationScan::NoBlock));
    }

    #[test]
    fn finds_key_inside_log_noise() {
        let session = Session::from_secret_bytes(Suite::Sha256, [0x42; 32]);
        let chunk = format!("starting\n{}\nready\n", session.public_key_pem());

        let watcher = KeyRotationWatcher::new(true);
        match watcher.scan(&chunk) {
            RotationScan::Key(key) => {
                assert_eq!(pem::encode_public_key(&key), session.public_key_pem());
            }
            other => panic!("expected a key, got {other:?}"),
        }
    }

    #[test]
    fn malformed_block_is_reported() {
        let chunk = "-----BEGIN PUBLIC KEY-----\n!!!\n-----END PUBLIC KEY-----\n";
        let watcher = KeyRotationWatcher::new(true);
        assert!(matches!(watcher.scan(chunk), RotationScan::Malformed(_)));
    }

    #[test]
    fn truncated_block_is_not_a_block() {
        let chunk = "-----BEGIN PUBLIC KEY-----\nQUJD\n";
        let watcher = KeyRotationWatcher::new(true);
        assert!(matches!(watcher.scan(chunk), RotationScan::NoBlock));
    }

    #[test]
    fn disabled_watcher_ignores_valid_keys() {
        let session = Session::from_secret_bytes(Suite::Sha256, [0x42; 32]);
        let watcher = KeyRotationWatcher::new(false);
        assert!(matches!(watcher.scan(&session.public_key_pem()), RotationScan::NoBlock));
    }
}
