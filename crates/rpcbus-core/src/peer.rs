use std::collections::BTreeMap;

use rpcbus_socket::PeerId;

use crate::error::{BusError, Result};

/// A connected remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    id: PeerId,
    name: Option<String>,
}

impl Peer {
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Well-known name, once announced.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Peers indexed by connection id and by well-known name.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    by_id: BTreeMap<PeerId, Peer>,
    by_name: BTreeMap<String, PeerId>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new connection. An existing entry for `id` is kept as is.
    pub fn create(&mut self, id: PeerId) -> &Peer {
        self.by_id.entry(id).or_insert(Peer { id, name: None })
    }

    pub fn find_by_id(&self, id: PeerId) -> Option<&Peer> {
        self.by_id.get(&id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Peer> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    /// Give `id` a well-known name. The first live claimant keeps a name;
    /// on conflict neither peer changes.
    pub fn set_name(&mut self, id: PeerId, name: &str) -> Result<()> {
        if let Some(&holder) = self.by_name.get(name) {
            if holder != id {
                return Err(BusError::NameConflict {
                    name: name.to_string(),
                    holder,
                });
            }
        }
        let peer = self.by_id.get_mut(&id).ok_or(BusError::UnknownPeer(id))?;
        if let Some(old) = peer.name.replace(name.to_string()) {
            self.by_name.remove(&old);
        }
        self.by_name.insert(name.to_string(), id);
        Ok(())
    }

    /// Forget a peer, releasing its name.
    pub fn remove(&mut self, id: PeerId) -> Option<Peer> {
        let peer = self.by_id.remove(&id)?;
        if let Some(name) = &peer.name {
            self.by_name.remove(name);
        }
        Some(peer)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.by_id.clear();
        self.by_name.clear();
    }
}
