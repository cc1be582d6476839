//! Pure building blocks of the link handshake.
//!
//! Nothing here touches time, sockets or shared state; the establishment
//! context composes these into the responder and initiator flows.

use reticulum_core::{DestinationHash, LinkId};
use reticulum_crypto::hkdf::hkdf_array;
use reticulum_crypto::{AgreementPublicKey, AgreementSecret, Signature, VerifyingKey, truncated_hash};

use super::constants::{
    DERIVED_KEY_SIZE, ECPUBSIZE, LINK_ID_SIZE, LINK_KEYSIZE, PROOF_SIZE, SIGNATURE_SIZE,
};
use super::types::DerivedKey;
use crate::error::LinkError;

/// Reject any payload whose length differs from `expected`.
pub fn check_request_length(payload: &[u8], expected: usize) -> Result<(), LinkError> {
    if payload.len() != expected {
        return Err(LinkError::MalformedRequest {
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

/// Split a request payload into the peer's agreement key (first half) and
/// signing key (second half).
pub fn split_request(payload: &[u8]) -> Result<(AgreementPublicKey, VerifyingKey), LinkError> {
    check_request_length(payload, ECPUBSIZE)?;
    let (agreement, signing) = payload.split_at(LINK_KEYSIZE);
    let agreement = AgreementPublicKey::from_slice(agreement)?;
    let signing = VerifyingKey::from_slice(signing)
        .map_err(|e| LinkError::HandshakeFailed(format!("peer signing key: {e}")))?;
    Ok((agreement, signing))
}

/// Build the request payload for our own ephemeral keys.
pub fn build_request_payload(agreement: &AgreementPublicKey, signing: &VerifyingKey) -> Vec<u8> {
    let mut payload = Vec::with_capacity(ECPUBSIZE);
    payload.extend_from_slice(&agreement.to_bytes());
    payload.extend_from_slice(&signing.to_bytes());
    payload
}

/// Request frame as it travels on an interface: target destination followed
/// by the payload.
pub fn build_request_frame(destination: &DestinationHash, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(DestinationHash::LEN + payload.len());
    frame.extend_from_slice(destination.as_ref());
    frame.extend_from_slice(payload);
    frame
}

/// Inverse of [`build_request_frame`]. The payload length is not checked
/// here; that is the validator's job.
pub fn parse_request_frame(frame: &[u8]) -> Result<(DestinationHash, &[u8]), LinkError> {
    if frame.len() < DestinationHash::LEN {
        return Err(LinkError::MalformedRequest {
            expected: DestinationHash::LEN + ECPUBSIZE,
            actual: frame.len(),
        });
    }
    let (dest, payload) = frame.split_at(DestinationHash::LEN);
    let dest = DestinationHash::try_from(dest).map_err(|_| LinkError::MalformedRequest {
        expected: DestinationHash::LEN + ECPUBSIZE,
        actual: frame.len(),
    })?;
    Ok((dest, payload))
}

/// Both ends hash the same bytes, so they agree on the id without
/// exchanging it.
pub fn link_id_from_request(hashable_part: &[u8]) -> LinkId {
    LinkId::new(truncated_hash(hashable_part))
}

/// ECDH with the peer's agreement key, then HKDF-SHA256 salted with the
/// link id.
pub fn derive_link_key(
    ours: &AgreementSecret,
    peer: &AgreementPublicKey,
    link_id: &LinkId,
) -> Result<DerivedKey, LinkError> {
    let shared = ours
        .agree(peer)
        .map_err(|e| LinkError::HandshakeFailed(format!("key agreement: {e}")))?;
    let okm: [u8; DERIVED_KEY_SIZE] = hkdf_array(shared.as_bytes(), Some(link_id.as_ref()), None);
    Ok(DerivedKey::new(okm))
}

/// Bytes covered by the responder's proof signature:
/// `link_id ‖ responder_x25519 ‖ responder_ed25519`.
pub fn proof_signed_data(
    link_id: &LinkId,
    agreement: &AgreementPublicKey,
    signing: &VerifyingKey,
) -> Vec<u8> {
    let mut data = Vec::with_capacity(LINK_ID_SIZE + 2 * LINK_KEYSIZE);
    data.extend_from_slice(link_id.as_ref());
    data.extend_from_slice(&agreement.to_bytes());
    data.extend_from_slice(&signing.to_bytes());
    data
}

pub fn build_proof(
    link_id: &LinkId,
    signature: &Signature,
    agreement: &AgreementPublicKey,
) -> [u8; PROOF_SIZE] {
    let mut proof = [0u8; PROOF_SIZE];
    proof[..LINK_ID_SIZE].copy_from_slice(link_id.as_ref());
    proof[LINK_ID_SIZE..LINK_ID_SIZE + SIGNATURE_SIZE].copy_from_slice(&signature.to_bytes());
    proof[LINK_ID_SIZE + SIGNATURE_SIZE..].copy_from_slice(&agreement.to_bytes());
    proof
}

/// Fields of a received proof frame.
#[derive(Debug, Clone, Copy)]
pub struct ParsedProof {
    pub link_id: LinkId,
    pub signature: Signature,
    pub agreement: AgreementPublicKey,
}

pub fn parse_proof(frame: &[u8]) -> Result<ParsedProof, LinkError> {
    if frame.len() != PROOF_SIZE {
        return Err(LinkError::InvalidProof);
    }
    let (id, rest) = frame.split_at(LINK_ID_SIZE);
    let (sig, agreement) = rest.split_at(SIGNATURE_SIZE);
    Ok(ParsedProof {
        link_id: LinkId::try_from(id).map_err(|_| LinkError::InvalidProof)?,
        signature: Signature::from_slice(sig).map_err(|_| LinkError::InvalidProof)?,
        agreement: AgreementPublicKey::from_slice(agreement).map_err(|_| LinkError::InvalidProof)?,
    })
}

#[cfg(test)]
mod tests {
    use reticulum_crypto::SigningKey;

    use super::*;

    #[test]
    fn length_check_is_exact() {
        for expected in [16usize, 32, 64, 96] {
            assert!(check_request_length(&vec![0u8; expected], expected).is_ok());
            for bad in [expected - 1, expected + 1] {
                let err = check_request_length(&vec![0u8; bad], expected).unwrap_err();
                assert!(matches!(
                    err,
                    LinkError::MalformedRequest { expected: e, actual: a } if e == expected && a == bad
                ));
            }
        }
    }

    #[test]
    fn split_request_returns_both_halves() {
        let agreement = AgreementSecret::generate().public_key();
        let signing = SigningKey::generate().verifying_key();
        let payload = build_request_payload(&agreement, &signing);
        assert_eq!(payload.len(), ECPUBSIZE);

        let (a, s) = split_request(&payload).unwrap();
        assert_eq!(a, agreement);
        assert_eq!(s, signing);
    }

    #[test]
    fn request_frame_round_trip() {
        let dest = DestinationHash::new([3; 16]);
        let frame = build_request_frame(&dest, &[9; ECPUBSIZE]);
        let (d, payload) = parse_request_frame(&frame).unwrap();
        assert_eq!(d, dest);
        assert_eq!(payload, &[9; ECPUBSIZE][..]);
        assert!(parse_request_frame(&[0u8; 4]).is_err());
    }

    #[test]
    fn link_id_is_deterministic_and_nonzero() {
        let a = link_id_from_request(b"hashable bytes");
        let b = link_id_from_request(b"hashable bytes");
        assert_eq!(a, b);
        assert_ne!(a.to_bytes(), [0u8; 16]);
        assert_ne!(a, link_id_from_request(b"other bytes"));
    }

    #[test]
    fn both_sides_derive_the_same_key() {
        let link_id = LinkId::new([5; 16]);
        let a = AgreementSecret::generate();
        let b = AgreementSecret::generate();
        let ka = derive_link_key(&a, &b.public_key(), &link_id).unwrap();
        let kb = derive_link_key(&b, &a.public_key(), &link_id).unwrap();
        assert_eq!(ka.as_bytes(), kb.as_bytes());

        let other = derive_link_key(&a, &b.public_key(), &LinkId::new([6; 16])).unwrap();
        assert_ne!(ka.as_bytes(), other.as_bytes());
    }

    #[test]
    fn degenerate_peer_key_fails_handshake() {
        let a = AgreementSecret::generate();
        let zero = AgreementPublicKey::from_bytes([0; 32]);
        let err = derive_link_key(&a, &zero, &LinkId::new([1; 16])).unwrap_err();
        assert!(matches!(err, LinkError::HandshakeFailed(_)));
    }

    #[test]
    fn proof_round_trip_and_signature() {
        let link_id = LinkId::new([7; 16]);
        let identity = SigningKey::generate();
        let eph = AgreementSecret::generate().public_key();
        let signed = proof_signed_data(&link_id, &eph, &identity.verifying_key());
        let sig = identity.sign(&signed);

        let proof = build_proof(&link_id, &sig, &eph);
        let parsed = parse_proof(&proof).unwrap();
        assert_eq!(parsed.link_id, link_id);
        assert_eq!(parsed.agreement, eph);
        assert!(
            identity
                .verifying_key()
                .verify(&signed, &parsed.signature)
                .is_ok()
        );

        assert!(matches!(
            parse_proof(&proof[..PROOF_SIZE - 1]),
            Err(LinkError::InvalidProof)
        ));
    }
}
