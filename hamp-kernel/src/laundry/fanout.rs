use crate::models::RoomSnapshot;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

/// Diffusion des snapshots d'une laverie vers tous les viewers live.
/// Publier ne bloque jamais ; sans viewer le message est simplement perdu.
pub struct FanOut {
    room: String,
    tx: broadcast::Sender<Arc<RoomSnapshot>>,
}

impl FanOut {
    pub fn new(room: &str, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            room: room.to_string(),
            tx,
        }
    }

    /// Retourne le nombre de viewers qui recevront ce snapshot
    pub fn publish(&self, snapshot: Arc<RoomSnapshot>) -> usize {
        self.tx.send(snapshot).unwrap_or(0)
    }

    /// Abonnement amorcé avec `seed`, puis chaque publication suivante.
    /// L'appelant garantit qu'aucune publication n'a lieu entre la lecture de
    /// `seed` et cet appel (cf. SnapshotStore::subscribe).
    pub fn subscribe_with(&self, seed: Arc<RoomSnapshot>) -> Subscription {
        Subscription {
            room: self.room.clone(),
            seed: Some(seed),
            rx: self.tx.subscribe(),
        }
    }

    pub fn viewer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Flux privé d'un viewer. Le drop vaut désabonnement.
pub struct Subscription {
    room: String,
    seed: Option<Arc<RoomSnapshot>>,
    rx: broadcast::Receiver<Arc<RoomSnapshot>>,
}

impl Subscription {
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Prochain snapshot : d'abord l'état courant au moment de l'abonnement,
    /// puis les publications dans l'ordre. None quand la laverie disparaît.
    pub async fn next(&mut self) -> Option<Arc<RoomSnapshot>> {
        if let Some(seed) = self.seed.take() {
            return Some(seed);
        }
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                // chaque snapshot est complet : sauter les plus anciens ne perd rien
                Err(RecvError::Lagged(skipped)) => {
                    warn!(room = %self.room, skipped, "live viewer lagging, skipping to newest snapshot");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(n: usize) -> Arc<RoomSnapshot> {
        Arc::new(RoomSnapshot::empty(&format!("room-{n}"), "Room"))
    }

    #[tokio::test]
    async fn test_seed_then_publishes_in_order() {
        let fanout = FanOut::new("dakin", 8);
        let mut sub = fanout.subscribe_with(snapshot(0));

        for n in 1..=3 {
            assert_eq!(fanout.publish(snapshot(n)), 1);
        }

        for n in 0..=3 {
            assert_eq!(sub.next().await.unwrap().id, format!("room-{n}"));
        }
        drop(fanout);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_publish_without_viewer_is_dropped() {
        let fanout = FanOut::new("dakin", 8);
        assert_eq!(fanout.publish(snapshot(1)), 0);

        // pas de rattrapage : un viewer arrivé ensuite ne voit que son seed puis la suite
        let mut sub = fanout.subscribe_with(snapshot(2));
        fanout.publish(snapshot(3));
        assert_eq!(sub.next().await.unwrap().id, "room-2");
        assert_eq!(sub.next().await.unwrap().id, "room-3");
    }

    #[tokio::test]
    async fn test_dropped_viewer_does_not_affect_others() {
        let fanout = FanOut::new("dakin", 8);
        let mut stays = fanout.subscribe_with(snapshot(0));
        let leaves = fanout.subscribe_with(snapshot(0));
        assert_eq!(fanout.viewer_count(), 2);

        fanout.publish(snapshot(1));
        drop(leaves);
        assert_eq!(fanout.viewer_count(), 1);
        assert_eq!(fanout.publish(snapshot(2)), 1);

        let ids: Vec<String> = [
            stays.next().await.unwrap(),
            stays.next().await.unwrap(),
            stays.next().await.unwrap(),
        ]
        .iter()
        .map(|s| s.id.clone())
        .collect();
        assert_eq!(ids, vec!["room-0", "room-1", "room-2"]);
    }

    #[tokio::test]
    async fn test_lagging_viewer_skips_to_retained_snapshots() {
        let fanout = FanOut::new("dakin", 2);
        let mut slow = fanout.subscribe_with(snapshot(0));
        for n in 1..=5 {
            fanout.publish(snapshot(n));
        }

        assert_eq!(slow.next().await.unwrap().id, "room-0");
        assert_eq!(slow.next().await.unwrap().id, "room-4");
        assert_eq!(slow.next().await.unwrap().id, "room-5");
    }
}
