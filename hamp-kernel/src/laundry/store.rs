use crate::laundry::fanout::{FanOut, Subscription};
use crate::models::{Machine, RoomSnapshot};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Dernier état connu d'une laverie.
///
/// Le snapshot est un `Arc` remplacé d'un bloc : un lecteur obtient toujours
/// un état complet, jamais une liste à moitié écrite. La publication se fait
/// sous le verrou d'écriture, ce qui ordonne publications et abonnements.
pub struct SnapshotStore {
    current: RwLock<Arc<RoomSnapshot>>,
    fanout: FanOut,
}

impl SnapshotStore {
    pub fn new(initial: RoomSnapshot, fanout: FanOut) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            fanout,
        }
    }

    pub fn current(&self) -> Arc<RoomSnapshot> {
        self.current.read().clone()
    }

    /// Remplace la liste des machines, date la mise à jour et publie
    pub fn replace(&self, machines: Vec<Machine>, now: OffsetDateTime, interval: Duration) -> Arc<RoomSnapshot> {
        let mut current = self.current.write();
        let next = Arc::new(RoomSnapshot {
            id: current.id.clone(),
            name: current.name.clone(),
            machines,
            last_update: Some(now),
            next_update: Some(now + interval),
        });
        *current = next.clone();
        self.fanout.publish(next.clone());
        next
    }

    pub fn subscribe(&self) -> Subscription {
        let current = self.current.read();
        self.fanout.subscribe_with(current.clone())
    }

    pub fn viewer_count(&self) -> usize {
        self.fanout.viewer_count()
    }
}
