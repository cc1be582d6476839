//! Turning requests into registered links.
//!
//! [`LinkEstablishment::validate_request`] is the responder entry point used by
//! the inbound packet dispatcher. It either returns a registered, supervised
//! link or an error that has already been logged; a bad request never leaves
//! anything behind in the registry.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use reticulum_core::{ConnectionInterface, DestinationHash};
use reticulum_crypto::{AgreementSecret, SigningKey, VerifyingKey};

use super::constants::ECPUBSIZE;
use super::handshake::{
    build_proof, build_request_frame, build_request_payload, check_request_length,
    derive_link_key, link_id_from_request, parse_proof, parse_request_frame, proof_signed_data,
    split_request,
};
use super::registry::LinkRegistry;
use super::state::Link;
use super::types::{LinkRole, LinkTimings, TeardownReason};
use super::watchdog;
use crate::error::LinkError;

/// A destination hosted on this node that accepts links.
pub struct LocalDestination {
    hash: DestinationHash,
    identity: SigningKey,
}

impl LocalDestination {
    pub fn new(hash: DestinationHash, identity: SigningKey) -> Self {
        Self { hash, identity }
    }

    pub fn hash(&self) -> DestinationHash {
        self.hash
    }

    /// The key initiators verify our proofs with.
    pub fn identity_key(&self) -> VerifyingKey {
        self.identity.verifying_key()
    }
}

impl std::fmt::Debug for LocalDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDestination")
            .field("hash", &self.hash)
            .finish_non_exhaustive()
    }
}

/// The fields of an inbound link request that establishment looks at.
#[derive(Debug, Clone)]
pub struct RequestPacket {
    pub destination: DestinationHash,
    pub hops: u8,
    /// The complete frame as received, for cost accounting.
    pub raw: Vec<u8>,
    /// The bytes the link id is derived from.
    pub hashable_part: Vec<u8>,
    pub payload: Vec<u8>,
    pub receiving_interface: Arc<dyn ConnectionInterface>,
}

impl RequestPacket {
    /// Parse a request frame as produced by [`LinkEstablishment::initiate`].
    pub fn from_frame(
        frame: &[u8],
        hops: u8,
        receiving_interface: Arc<dyn ConnectionInterface>,
    ) -> Result<Self, LinkError> {
        let (destination, payload) = parse_request_frame(frame)?;
        Ok(Self {
            destination,
            hops,
            raw: frame.to_vec(),
            hashable_part: frame.to_vec(),
            payload: payload.to_vec(),
            receiving_interface,
        })
    }
}

/// Establishment context: where links get registered, and how they are
/// timed.
pub struct LinkEstablishment {
    registry: Arc<dyn LinkRegistry>,
    timings: LinkTimings,
}

impl LinkEstablishment {
    pub fn new(registry: Arc<dyn LinkRegistry>, timings: LinkTimings) -> Self {
        Self { registry, timings }
    }

    pub fn timings(&self) -> LinkTimings {
        self.timings
    }

    pub fn registry(&self) -> &Arc<dyn LinkRegistry> {
        &self.registry
    }

    /// Validate an inbound link request, answer it with a proof and register
    /// the resulting link.
    ///
    /// Every failure is logged here and returned; none of them registers a
    /// link or starts a watchdog. Must be called from within a Tokio runtime,
    /// which hosts the link's watchdog.
    pub fn validate_request(
        &self,
        destination: &LocalDestination,
        packet: &RequestPacket,
    ) -> Result<Arc<Link>, LinkError> {
        match self.accept(destination, packet) {
            Ok(link) => Ok(link),
            Err(e) => {
                match &e {
                    LinkError::MalformedRequest { .. } => {
                        error!(
                            destination = %destination.hash(),
                            interface = packet.receiving_interface.name(),
                            error = %e,
                            "dropping invalid link request"
                        );
                    }
                    _ => {
                        warn!(
                            destination = %destination.hash(),
                            interface = packet.receiving_interface.name(),
                            error = %e,
                            "link establishment failed"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    fn accept(
        &self,
        destination: &LocalDestination,
        packet: &RequestPacket,
    ) -> Result<Arc<Link>, LinkError> {
        check_request_length(&packet.payload, ECPUBSIZE)?;
        if packet.destination != destination.hash() {
            return Err(LinkError::HandshakeFailed(format!(
                "request addressed to {}, not {}",
                packet.destination,
                destination.hash()
            )));
        }
        let (peer_agreement, peer_signing) = split_request(&packet.payload)?;

        let now = Instant::now();
        let link_id = link_id_from_request(&packet.hashable_part);
        let link = Link::responder(
            link_id,
            destination.hash(),
            peer_agreement,
            peer_signing,
            Arc::clone(&packet.receiving_interface),
            self.timings.establishment_timeout(packet.hops),
            self.timings,
            now,
        );
        link.add_establishment_cost(packet.raw.len());

        let ephemeral = AgreementSecret::generate();
        let key = derive_link_key(&ephemeral, &peer_agreement, &link_id)?;
        link.activate(key, now)?;

        let ephemeral_public = ephemeral.public_key();
        let signed = proof_signed_data(&link_id, &ephemeral_public, &destination.identity_key());
        let signature = destination.identity.sign(&signed);
        let proof = build_proof(&link_id, &signature, &ephemeral_public);
        link.attached_interface().send(&proof)?;
        link.add_establishment_cost(proof.len());

        let link = Arc::new(link);
        self.register_and_supervise(&link)?;
        info!(
            link_id = %link_id,
            destination = %destination.hash(),
            hops = packet.hops,
            cost = link.establishment_cost(),
            "inbound link accepted"
        );
        Ok(link)
    }

    fn register_and_supervise(&self, link: &Arc<Link>) -> Result<(), LinkError> {
        if let Err(e) = self.registry.register_link(Arc::clone(link)) {
            link.close(TeardownReason::DestinationClosed);
            return Err(e);
        }
        watchdog::spawn(Arc::clone(link), Arc::clone(&self.registry));
        Ok(())
    }

    /// Request a link to `destination`, sending the request frame on
    /// `interface`. The returned link is `Handshaking` and registered; it
    /// becomes `Active` in [`receive_proof`](Self::receive_proof) or is closed by its
    /// watchdog when no proof arrives in time.
    pub fn initiate(
        &self,
        destination: DestinationHash,
        responder_identity: VerifyingKey,
        hops: u8,
        interface: Arc<dyn ConnectionInterface>,
    ) -> Result<Arc<Link>, LinkError> {
        let ephemeral = AgreementSecret::generate();
        let signing = SigningKey::generate();
        let payload = build_request_payload(&ephemeral.public_key(), &signing.verifying_key());
        let frame = build_request_frame(&destination, &payload);
        let link_id = link_id_from_request(&frame);

        let now = Instant::now();
        let link = Arc::new(Link::initiator(
            link_id,
            destination,
            responder_identity,
            ephemeral,
            Arc::clone(&interface),
            self.timings.establishment_timeout(hops),
            self.timings,
            now,
        ));
        link.add_establishment_cost(frame.len());

        interface.send(&frame)?;
        link.begin_handshake(now)?;
        self.register_and_supervise(&link)?;
        debug!(link_id = %link_id, %destination, "link request sent");
        Ok(link)
    }

    /// Handle a proof frame for one of our outgoing requests.
    ///
    /// A proof that fails verification is dropped without touching the
    /// link; if no valid proof arrives the watchdog closes it.
    pub fn receive_proof(&self, proof_frame: &[u8]) -> Result<Arc<Link>, LinkError> {
        let proof = parse_proof(proof_frame)?;
        let link = self
            .registry
            .find_link(&proof.link_id)
            .ok_or(LinkError::UnknownLink(proof.link_id))?;
        if link.role() != LinkRole::Initiator {
            return Err(LinkError::InvalidProof);
        }

        let signed = proof_signed_data(&proof.link_id, &proof.agreement, &link.peer_signing_key());
        if link.peer_signing_key().verify(&signed, &proof.signature).is_err() {
            warn!(link_id = %proof.link_id, "link proof signature invalid");
            return Err(LinkError::SignatureVerificationFailed);
        }

        let secret = link.accept_peer_agreement_key(proof.agreement)?;
        let key = derive_link_key(&secret, &proof.agreement, &proof.link_id)?;
        let now = Instant::now();
        link.record_inbound(proof_frame.len(), now);
        link.activate(key, now)?;
        Ok(link)
    }
}

impl std::fmt::Debug for LinkEstablishment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkEstablishment")
            .field("links", &self.registry.link_count())
            .field("timings", &self.timings)
            .finish()
    }
}
