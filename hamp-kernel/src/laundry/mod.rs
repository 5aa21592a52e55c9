/**
 * LAUNDRY - Synchronisation live de l'état des laveries
 *
 * RÔLE :
 * Registre des laveries suivies. Chaque laverie possède son snapshot, son
 * canal de diffusion et son poller ; rien n'est partagé entre laveries.
 *
 * FONCTIONNEMENT :
 * - Poller (45s) -> Fetcher -> swap du snapshot -> diffusion aux viewers
 * - Le refresh forcé (`?cache=false`) passe par le même chemin
 * - Poll et refresh forcé d'une même laverie sont sérialisés : un fetch
 *   ancien ne peut jamais écraser un plus récent
 * - Un refresh forcé qui attend un fetch en cours réutilise son résultat
 */

pub mod fanout;
pub mod fetcher;
pub mod poller;
pub mod query;
pub mod store;

use crate::config::{KernelConfig, RoomConf};
use crate::health::HealthTracker;
use crate::models::RoomSnapshot;
use fanout::{FanOut, Subscription};
use fetcher::{FetchError, MachineSource};
use poller::{spawn_poller, PollerHandle};
use std::sync::Arc;
use std::time::Duration;
use store::SnapshotStore;
use time::OffsetDateTime;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum LaundryError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Laundry room not found: {0}")]
    RoomNotFound(String),
    #[error("Machine {machine} not found in {room}")]
    MachineNotFound { room: String, machine: String },
}

pub struct LaundryRoom {
    conf: RoomConf,
    store: SnapshotStore,
    source: Arc<dyn MachineSource>,
    health: HealthTracker,
    interval: Duration,
    /// Sérialise les fetchs de la laverie (poll et refresh forcé)
    refresh_gate: tokio::sync::Mutex<()>,
}

impl LaundryRoom {
    pub fn new(
        conf: RoomConf,
        source: Arc<dyn MachineSource>,
        health: HealthTracker,
        interval: Duration,
        channel_capacity: usize,
    ) -> Self {
        let store = SnapshotStore::new(
            RoomSnapshot::empty(&conf.slug, &conf.name),
            FanOut::new(&conf.slug, channel_capacity),
        );
        Self {
            conf,
            store,
            source,
            health,
            interval,
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn slug(&self) -> &str {
        &self.conf.slug
    }

    /// Identifiant exposé dans le JSON (`dakink` pour Dakin)
    pub fn upstream_id(&self) -> &str {
        self.conf.upstream_id()
    }

    pub fn snapshot(&self) -> Arc<RoomSnapshot> {
        self.store.current()
    }

    pub fn subscribe(&self) -> Subscription {
        self.store.subscribe()
    }

    pub fn viewer_count(&self) -> usize {
        self.store.viewer_count()
    }

    /// Un tick du poller : fetch, puis swap + publication si succès
    pub async fn poll_once(&self) -> Result<Arc<RoomSnapshot>, FetchError> {
        let _gate = self.refresh_gate.lock().await;
        self.fetch_and_apply().await
    }

    /// Refresh hors planning pour une lecture. Si un fetch réussi s'est
    /// terminé depuis l'arrivée de la requête, son snapshot est réutilisé.
    pub async fn refresh_now(&self) -> Result<Arc<RoomSnapshot>, FetchError> {
        let requested_at = OffsetDateTime::now_utc();
        let _gate = self.refresh_gate.lock().await;

        let current = self.store.current();
        if current.last_update.is_some_and(|t| t > requested_at) {
            debug!(room = %self.conf.slug, "joining refresh completed while waiting");
            return Ok(current);
        }
        self.fetch_and_apply().await
    }

    async fn fetch_and_apply(&self) -> Result<Arc<RoomSnapshot>, FetchError> {
        match self.source.fetch(&self.conf).await {
            Ok(machines) => {
                let now = OffsetDateTime::now_utc();
                let snapshot = self.store.replace(machines, now, self.interval);
                self.health.record_poll_success(&self.conf.slug, now);
                debug!(
                    room = %self.conf.slug,
                    machines = snapshot.machines.len(),
                    viewers = self.viewer_count(),
                    "snapshot updated"
                );
                Ok(snapshot)
            }
            Err(e) => {
                warn!(room = %self.conf.slug, "fetch failed, keeping last snapshot: {e}");
                self.health.record_poll_failure(&self.conf.slug, &e);
                Err(e)
            }
        }
    }
}

/// Registre des laveries, seul propriétaire des pollers
pub struct LaundryRegistry {
    rooms: Vec<Arc<LaundryRoom>>,
    interval: Duration,
    pollers: parking_lot::Mutex<Vec<PollerHandle>>,
}

impl LaundryRegistry {
    pub fn new(cfg: &KernelConfig, source: Arc<dyn MachineSource>, health: HealthTracker) -> Self {
        let interval = cfg.poll_interval();
        let mut rooms: Vec<Arc<LaundryRoom>> = Vec::new();

        for conf in &cfg.rooms {
            if rooms.iter().any(|r| r.slug() == conf.slug) {
                warn!("duplicate laundry room {} in config, ignoring", conf.slug);
                continue;
            }
            rooms.push(Arc::new(LaundryRoom::new(
                conf.clone(),
                source.clone(),
                health.clone(),
                interval,
                cfg.live.channel_capacity,
            )));
        }

        Self {
            rooms,
            interval,
            pollers: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn rooms(&self) -> &[Arc<LaundryRoom>] {
        &self.rooms
    }

    pub fn room(&self, slug: &str) -> Result<&Arc<LaundryRoom>, LaundryError> {
        self.rooms
            .iter()
            .find(|r| r.slug() == slug)
            .ok_or_else(|| LaundryError::RoomNotFound(slug.to_string()))
    }

    /// Démarre un poller par laverie sans poller actif
    pub fn start_pollers(&self) {
        let mut pollers = self.pollers.lock();
        pollers.retain(|p| p.is_running());
        for room in &self.rooms {
            if pollers.iter().any(|p| p.room() == room.slug()) {
                continue;
            }
            pollers.push(spawn_poller(room.clone(), self.interval));
        }
    }

    pub async fn stop_pollers(&self) {
        let pollers = std::mem::take(&mut *self.pollers.lock());
        for poller in pollers {
            poller.stop().await;
        }
    }

    pub fn running_pollers(&self) -> usize {
        self.pollers.lock().iter().filter(|p| p.is_running()).count()
    }

    pub fn live_viewers(&self) -> usize {
        self.rooms.iter().map(|r| r.viewer_count()).sum()
    }
}
