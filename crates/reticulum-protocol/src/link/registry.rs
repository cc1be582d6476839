//! Where established links live once the handshake hands them over.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use reticulum_core::LinkId;

use super::state::Link;
use super::types::TeardownReason;
use crate::error::LinkError;

/// The registry link establishment hands finished links to.
///
/// At most one link may be registered per id; a second registration for the
/// same id fails and leaves the first in place.
pub trait LinkRegistry: Send + Sync {
    fn register_link(&self, link: Arc<Link>) -> Result<(), LinkError>;

    /// Remove a link. Returns it if it was registered.
    fn deregister_link(&self, id: &LinkId) -> Option<Arc<Link>>;

    /// Remove `link` only if it is the link registered under its id. A link
    /// replaced by a newer one with the same id leaves the newer one alone.
    fn deregister_if(&self, link: &Arc<Link>) -> bool;

    fn find_link(&self, id: &LinkId) -> Option<Arc<Link>>;

    fn link_count(&self) -> usize;
}

/// Concurrent link map, sharded by id.
#[derive(Debug, Default)]
pub struct LinkTable {
    links: DashMap<LinkId, Arc<Link>>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> Vec<LinkId> {
        self.links.iter().map(|e| *e.key()).collect()
    }

    /// Close and remove every link.
    pub fn close_all(&self, reason: TeardownReason) -> usize {
        let ids = self.ids();
        let mut closed = 0;
        for id in ids {
            if let Some((_, link)) = self.links.remove(&id) {
                link.close(reason);
                closed += 1;
            }
        }
        closed
    }
}

impl LinkRegistry for LinkTable {
    fn register_link(&self, link: Arc<Link>) -> Result<(), LinkError> {
        match self.links.entry(link.id()) {
            Entry::Occupied(_) => Err(LinkError::DuplicateLink(link.id())),
            Entry::Vacant(slot) => {
                slot.insert(link);
                Ok(())
            }
        }
    }

    fn deregister_link(&self, id: &LinkId) -> Option<Arc<Link>> {
        self.links.remove(id).map(|(_, link)| link)
    }

    fn deregister_if(&self, link: &Arc<Link>) -> bool {
        self.links
            .remove_if(&link.id(), |_, stored| Arc::ptr_eq(stored, link))
            .is_some()
    }

    fn find_link(&self, id: &LinkId) -> Option<Arc<Link>> {
        self.links.get(id).map(|e| Arc::clone(e.value()))
    }

    fn link_count(&self) -> usize {
        self.links.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reticulum_core::DestinationHash;
    use reticulum_core::testing::RecordingInterface;
    use reticulum_crypto::{AgreementSecret, SigningKey};
    use tokio::time::Instant;

    use super::*;
    use crate::link::types::LinkTimings;

    fn link(id: u8) -> Arc<Link> {
        Arc::new(Link::responder(
            LinkId::new([id; 16]),
            DestinationHash::new([9; 16]),
            AgreementSecret::generate().public_key(),
            SigningKey::generate().verifying_key(),
            Arc::new(RecordingInterface::new(1, "t0")),
            Duration::from_secs(6),
            LinkTimings::default(),
            Instant::now(),
        ))
    }

    #[tokio::test]
    async fn second_registration_for_an_id_fails() {
        let table = LinkTable::new();
        table.register_link(link(1)).unwrap();
        assert!(matches!(
            table.register_link(link(1)),
            Err(LinkError::DuplicateLink(_))
        ));
        assert_eq!(table.link_count(), 1);
    }

    #[tokio::test]
    async fn deregister_if_only_removes_the_same_link() {
        let table = LinkTable::new();
        let old = link(1);
        let current = link(1);
        table.register_link(Arc::clone(&current)).unwrap();

        assert!(!table.deregister_if(&old));
        assert_eq!(table.link_count(), 1);
        assert!(table.deregister_if(&current));
        assert_eq!(table.link_count(), 0);
        assert!(!table.deregister_if(&current));
    }
}
