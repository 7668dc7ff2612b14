//! Composition of JSON encoding and session sealing.

use serde::{Serialize, de::DeserializeOwned};
use tether_crypto::{SealedMessage, Session};

use crate::error::CodecError;

/// Serialize `value` to JSON, seal it, and encode the sealed message as a
/// single line of JSON ready for the wire.
pub fn encode_and_seal<T: Serialize>(
    session: &Session,
    value: &T,
    additional_data: &str,
) -> Result<String, CodecError> {
    let plaintext = serde_json::to_vec(value).map_err(CodecError::Encode)?;
    let sealed = session.seal(&plaintext, additional_data)?;
    serde_json::to_string(&sealed).map_err(CodecError::Encode)
}

/// Parse a sealed message, open it, authenticate its additional data, and
/// decode the payload.
///
/// The order is fixed: decrypt first, so the GCM tag has authenticated the
/// additional data before `authenticate` sees it; then the predicate; then
/// the payload decode. A predicate that tracks replay state can rely on
/// never observing forged additional data.
///
/// # Errors
///
/// - `Parse`: `message` is not a sealed message
/// - `Crypto`: the session could not open the ciphertext
/// - `AuthRejected`: the predicate returned false
/// - `Decode`: the plaintext is not a valid `T`
pub fn open_and_decode<T, F>(
    session: &Session,
    message: &str,
    authenticate: F,
) -> Result<T, CodecError>
where
    T: DeserializeOwned,
    F: FnOnce(&str) -> bool,
{
    let sealed: SealedMessage = serde_json::from_str(message).map_err(CodecError::Parse)?;
    let plaintext = session.open(&sealed)?;

    if !authenticate(&sealed.additional_data) {
        return Err(CodecError::AuthRejected);
    }

    serde_json::from_slice(&plaintext).map_err(CodecError::Decode)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use tether_crypto::Suite;

    use super::*;
    use crate::envelope::Envelope;

    fn paired_sessions() -> (Session, Session) {
        let mut a = Session::from_secret_bytes(Suite::Sha256, [0xA1; 32]);
        let mut b = Session::from_secret_bytes(Suite::Sha256, [0xB2; 32]);
        a.set_external_public_key(&b.local_public_key()).unwrap();
        b.set_external_public_key(&a.local_public_key()).unwrap();
        (a, b)
    }

    #[test]
    fn envelope_roundtrips_through_sealing() {
        let (a, b) = paired_sessions();
        let envelope = Envelope::new("addItem", "1", "hello");

        let wire = encode_and_seal(&a, &envelope, "1700000000000").unwrap();
        let decoded: Envelope = open_and_decode(&b, &wire, |_| true).unwrap();

        assert_eq!(decoded, envelope);
    }

    #[test]
    fn wire_form_is_single_line() {
        let (a, _) = paired_sessions();
        let wire = encode_and_seal(&a, &Envelope::new("t", "i", "d"), "0").unwrap();
        assert!(!wire.contains('\n'));
    }

    #[test]
    fn predicate_sees_authenticated_additional_data() {
        let (a, b) = paired_sessions();
        let wire = encode_and_seal(&a, &Envelope::new("t", "i", "d"), "1234").unwrap();

        let seen = Cell::new(false);
        let _: Envelope = open_and_decode(&b, &wire, |ad| {
            seen.set(true);
            ad == "1234"
        })
        .unwrap();
        assert!(seen.get());
    }

    #[test]
    fn rejected_predicate_fails_open() {
        let (a, b) = paired_sessions();
        let wire = encode_and_seal(&a, &Envelope::new("t", "i", "d"), "0").unwrap();

        let result: Result<Envelope, _> = open_and_decode(&b, &wire, |_| false);
        assert!(matches!(result, Err(CodecError::AuthRejected)));
    }

    #[test]
    fn predicate_never_runs_on_forged_input() {
        let (a, b) = paired_sessions();
        let wire = encode_and_seal(&a, &Envelope::new("t", "i", "d"), "999").unwrap();

        // Flip the claimed additional data without re-sealing.
        let tampered = wire.replace("\"999\"", "\"998\"");
        assert_ne!(tampered, wire);

        let invoked = Cell::new(false);
        let result: Result<Envelope, _> = open_and_decode(&b, &tampered, |_| {
            invoked.set(true);
            true
        });

        assert!(matches!(result, Err(CodecError::Crypto(_))));
        assert!(!invoked.get(), "predicate must not run when decryption fails");
    }

    #[test]
    fn garbage_text_is_a_parse_error() {
        let (_, b) = paired_sessions();
        let result: Result<Envelope, _> = open_and_decode(&b, "not json at all", |_| true);
        assert!(matches!(result, Err(CodecError::Parse(_))));
    }

    #[test]
    fn wrong_payload_shape_is_a_decode_error() {
        let (a, b) = paired_sessions();

        // Seal a bare number where the receiver expects an envelope.
        let wire = encode_and_seal(&a, &42u32, "0").unwrap();
        let result: Result<Envelope, _> = open_and_decode(&b, &wire, |_| true);
        assert!(matches!(result, Err(CodecError::Decode(_))));
    }

    #[test]
    fn message_from_unpaired_peer_fails() {
        let (a, _) = paired_sessions();
        let mut outsider = Session::from_secret_bytes(Suite::Sha256, [0xC3; 32]);
        outsider.set_external_public_key(&a.local_public_key()).unwrap();

        let wire = encode_and_seal(&outsider, &Envelope::new("t", "i", "d"), "0").unwrap();
        let result: Result<Envelope, _> = open_and_decode(&a, &wire, |_| true);
        assert!(matches!(result, Err(CodecError::Crypto(_))));
    }
}
