//! The link itself: identity, keys and a serialized lifecycle.
//!
//! A [`Link`] is shared as `Arc<Link>` between the registry, its watchdog and
//! whoever sends on it. Everything that can change lives behind one mutex, and
//! every state change goes through [`LinkStatus::can_transition_to`], so
//! concurrent watchdog and handshake events cannot reorder or repeat a
//! transition.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

use reticulum_core::{ConnectionInterface, DestinationHash, LinkId};
use reticulum_crypto::{AgreementPublicKey, AgreementSecret, Token, VerifyingKey};

use super::types::{DerivedKey, LinkRole, LinkStats, LinkStatus, LinkTimings, TeardownReason};
use crate::error::LinkError;

struct LinkInner {
    status: LinkStatus,
    peer_agreement_key: Option<AgreementPublicKey>,
    /// Our ephemeral agreement secret while an outgoing request awaits proof.
    local_secret: Option<AgreementSecret>,
    token: Option<Token>,
    establishment_cost: usize,
    request_time: Instant,
    last_inbound: Instant,
    stale_since: Option<Instant>,
    teardown_reason: Option<TeardownReason>,
    stats: LinkStats,
}

/// Time-related fields the watchdog decides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessSnapshot {
    pub status: LinkStatus,
    pub request_time: Instant,
    pub last_inbound: Instant,
    pub stale_since: Option<Instant>,
    pub establishment_timeout: Duration,
    pub stale_time: Duration,
    pub stale_grace: Duration,
}

pub struct Link {
    id: LinkId,
    owner: DestinationHash,
    role: LinkRole,
    peer_signing_key: VerifyingKey,
    attached_interface: Arc<dyn ConnectionInterface>,
    establishment_timeout: Duration,
    timings: LinkTimings,
    inner: Mutex<LinkInner>,
    closed_tx: watch::Sender<bool>,
}

impl Link {
    #[allow(clippy::too_many_arguments)]
    fn build(
        id: LinkId,
        owner: DestinationHash,
        role: LinkRole,
        status: LinkStatus,
        peer_signing_key: VerifyingKey,
        peer_agreement_key: Option<AgreementPublicKey>,
        local_secret: Option<AgreementSecret>,
        attached_interface: Arc<dyn ConnectionInterface>,
        establishment_timeout: Duration,
        timings: LinkTimings,
        now: Instant,
    ) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            id,
            owner,
            role,
            peer_signing_key,
            attached_interface,
            establishment_timeout,
            timings,
            inner: Mutex::new(LinkInner {
                status,
                peer_agreement_key,
                local_secret,
                token: None,
                establishment_cost: 0,
                request_time: now,
                last_inbound: now,
                stale_since: None,
                teardown_reason: None,
                stats: LinkStats::default(),
            }),
            closed_tx,
        }
    }

    /// A link created from an inbound request. It starts in `Handshaking`:
    /// there is no pending phase on the responder side.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn responder(
        id: LinkId,
        owner: DestinationHash,
        peer_agreement_key: AgreementPublicKey,
        peer_signing_key: VerifyingKey,
        attached_interface: Arc<dyn ConnectionInterface>,
        establishment_timeout: Duration,
        timings: LinkTimings,
        now: Instant,
    ) -> Self {
        Self::build(
            id,
            owner,
            LinkRole::Responder,
            LinkStatus::Handshaking,
            peer_signing_key,
            Some(peer_agreement_key),
            None,
            attached_interface,
            establishment_timeout,
            timings,
            now,
        )
    }

    /// A link we are about to request. `responder_identity` is the signing
    /// key the destination will prove with.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn initiator(
        id: LinkId,
        destination: DestinationHash,
        responder_identity: VerifyingKey,
        local_secret: AgreementSecret,
        attached_interface: Arc<dyn ConnectionInterface>,
        establishment_timeout: Duration,
        timings: LinkTimings,
        now: Instant,
    ) -> Self {
        Self::build(
            id,
            destination,
            LinkRole::Initiator,
            LinkStatus::Pending,
            responder_identity,
            None,
            Some(local_secret),
            attached_interface,
            establishment_timeout,
            timings,
            now,
        )
    }

    fn lock(&self) -> MutexGuard<'_, LinkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, inner: &mut LinkInner, to: LinkStatus) -> Result<LinkStatus, LinkError> {
        let from = inner.status;
        if !from.can_transition_to(to) {
            return Err(LinkError::InvalidTransition { from, to });
        }
        inner.status = to;
        debug!(link_id = %self.id, %from, %to, "link transition");
        Ok(from)
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    /// Destination the link is bound to.
    pub fn owner(&self) -> DestinationHash {
        self.owner
    }

    pub fn role(&self) -> LinkRole {
        self.role
    }

    pub fn status(&self) -> LinkStatus {
        self.lock().status
    }

    pub fn is_closed(&self) -> bool {
        self.status() == LinkStatus::Closed
    }

    pub fn peer_agreement_key(&self) -> Option<AgreementPublicKey> {
        self.lock().peer_agreement_key
    }

    pub fn peer_signing_key(&self) -> VerifyingKey {
        self.peer_signing_key
    }

    /// The interface every frame on this link is sent through.
    pub fn attached_interface(&self) -> &Arc<dyn ConnectionInterface> {
        &self.attached_interface
    }

    pub fn establishment_timeout(&self) -> Duration {
        self.establishment_timeout
    }

    pub fn timings(&self) -> LinkTimings {
        self.timings
    }

    pub fn establishment_cost(&self) -> usize {
        self.lock().establishment_cost
    }

    pub fn request_time(&self) -> Instant {
        self.lock().request_time
    }

    pub fn last_inbound(&self) -> Instant {
        self.lock().last_inbound
    }

    pub fn stats(&self) -> LinkStats {
        self.lock().stats
    }

    pub fn teardown_reason(&self) -> Option<TeardownReason> {
        self.lock().teardown_reason
    }

    pub fn liveness(&self) -> LivenessSnapshot {
        let inner = self.lock();
        LivenessSnapshot {
            status: inner.status,
            request_time: inner.request_time,
            last_inbound: inner.last_inbound,
            stale_since: inner.stale_since,
            establishment_timeout: self.establishment_timeout,
            stale_time: self.timings.stale_time(),
            stale_grace: self.timings.stale_grace,
        }
    }

    /// Receiver that flips to `true` when the link closes.
    pub fn subscribe_closed(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }

    /// Account bytes spent negotiating this link.
    pub fn add_establishment_cost(&self, bytes: usize) {
        let mut inner = self.lock();
        inner.establishment_cost = inner.establishment_cost.saturating_add(bytes);
    }

    /// `Pending -> Handshaking`, once our request is on the wire.
    pub fn begin_handshake(&self, now: Instant) -> Result<(), LinkError> {
        let mut inner = self.lock();
        self.transition(&mut inner, LinkStatus::Handshaking)?;
        inner.request_time = now;
        Ok(())
    }

    /// `Handshaking -> Active` with the derived session key.
    pub fn activate(&self, key: DerivedKey, now: Instant) -> Result<(), LinkError> {
        let mut inner = self.lock();
        self.transition(&mut inner, LinkStatus::Active)?;
        inner.token = Some(Token::new(key.as_bytes()));
        inner.local_secret = None;
        inner.request_time = now;
        inner.last_inbound = now;
        info!(link_id = %self.id, role = ?self.role, "link established");
        Ok(())
    }

    /// Initiator side: record the responder's agreement key and hand back
    /// our ephemeral secret for the final key derivation.
    pub(crate) fn accept_peer_agreement_key(
        &self,
        key: AgreementPublicKey,
    ) -> Result<AgreementSecret, LinkError> {
        let mut inner = self.lock();
        if inner.status != LinkStatus::Handshaking {
            return Err(LinkError::InvalidTransition {
                from: inner.status,
                to: LinkStatus::Active,
            });
        }
        let secret = inner
            .local_secret
            .take()
            .ok_or_else(|| LinkError::HandshakeFailed("ephemeral secret already used".into()))?;
        inner.peer_agreement_key = Some(key);
        Ok(secret)
    }

    /// `Active -> Stale`.
    pub fn mark_stale(&self, now: Instant) -> Result<(), LinkError> {
        let mut inner = self.lock();
        self.transition(&mut inner, LinkStatus::Stale)?;
        inner.stale_since = Some(now);
        info!(link_id = %self.id, "link went stale");
        Ok(())
    }

    /// Move to `Closed` from any live state and wake everything waiting on
    /// the close signal. Returns `false` if the link was already closed.
    pub fn close(&self, reason: TeardownReason) -> bool {
        {
            let mut inner = self.lock();
            if self.transition(&mut inner, LinkStatus::Closed).is_err() {
                return false;
            }
            inner.teardown_reason = Some(reason);
            inner.token = None;
            inner.local_secret = None;
        }
        self.closed_tx.send_replace(true);
        info!(link_id = %self.id, %reason, "link closed");
        true
    }

    /// Note inbound traffic. A stale link stays stale: the lifecycle never
    /// moves backwards, so the watchdog still retires it after the grace.
    pub fn record_inbound(&self, bytes: usize, now: Instant) {
        let mut inner = self.lock();
        if inner.status == LinkStatus::Closed {
            return;
        }
        inner.last_inbound = now;
        inner.stats.rx_packets += 1;
        inner.stats.rx_bytes += bytes as u64;
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, LinkError> {
        let inner = self.lock();
        match &inner.token {
            Some(token) if inner.status.is_established() => Ok(token.encrypt(plaintext)),
            _ => Err(LinkError::NotEstablished(inner.status)),
        }
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, LinkError> {
        let inner = self.lock();
        match &inner.token {
            Some(token) if inner.status.is_established() => Ok(token.decrypt(ciphertext)?),
            _ => Err(LinkError::NotEstablished(inner.status)),
        }
    }

    /// Encrypt `plaintext` and send `link_id ‖ token` on the attached
    /// interface.
    pub fn send(&self, plaintext: &[u8]) -> Result<(), LinkError> {
        let token = self.encrypt(plaintext)?;
        let mut frame = Vec::with_capacity(LinkId::LEN + token.len());
        frame.extend_from_slice(self.id.as_ref());
        frame.extend_from_slice(&token);
        self.attached_interface.send(&frame)?;

        let mut inner = self.lock();
        inner.stats.tx_packets += 1;
        inner.stats.tx_bytes += frame.len() as u64;
        Ok(())
    }

    /// Decrypt a token received for this link and refresh liveness.
    pub fn receive(&self, token: &[u8], now: Instant) -> Result<Vec<u8>, LinkError> {
        let plaintext = self.decrypt(token)?;
        self.record_inbound(token.len(), now);
        Ok(plaintext)
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("role", &self.role)
            .field("status", &self.status())
            .field("interface", &self.attached_interface.name())
            .finish_non_exhaustive()
    }
}
