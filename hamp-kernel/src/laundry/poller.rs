use crate::laundry::LaundryRoom;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Poller d'une laverie, arrêt coopératif via `stop()`.
/// Un tick raté (fetch plus long que l'intervalle) décale les suivants.
pub struct PollerHandle {
    room: String,
    stop: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl PollerHandle {
    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Demande l'arrêt et attend la fin du tick en cours
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.join.await {
            warn!(room = %self.room, "poller task ended abnormally: {e}");
        }
    }
}

/// Démarre le poll périodique : premier fetch immédiat, puis toutes les `interval`.
/// Les échecs sont journalisés par `LaundryRoom::poll_once` ; le tick suivant fait office de retry.
pub fn spawn_poller(room: Arc<LaundryRoom>, interval: Duration) -> PollerHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let slug = room.slug().to_string();
    info!(room = %slug, "starting poller (every {}s)", interval.as_secs());

    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = room.poll_once().await;
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
        info!(room = %room.slug(), "poller stopped");
    });

    PollerHandle {
        room: slug,
        stop: stop_tx,
        join,
    }
}
