use crate::laundry::fanout::Subscription;
use crate::laundry::{LaundryError, LaundryRegistry};
use crate::models::{Machine, RoomSnapshot};
use std::sync::Arc;

// Chemin de lecture synchrone utilisé par les routes HTTP
impl LaundryRegistry {
    /// Snapshot courant ; `force_refresh` fait un fetch avant de répondre
    pub async fn get(&self, slug: &str, force_refresh: bool) -> Result<Arc<RoomSnapshot>, LaundryError> {
        let room = self.room(slug)?;
        if force_refresh {
            return Ok(room.refresh_now().await?);
        }
        Ok(room.snapshot())
    }

    pub fn get_machine(&self, slug: &str, machine: &str) -> Result<Machine, LaundryError> {
        let snapshot = self.room(slug)?.snapshot();
        snapshot
            .machine(machine)
            .cloned()
            .ok_or_else(|| LaundryError::MachineNotFound {
                room: slug.to_string(),
                machine: machine.to_string(),
            })
    }

    pub fn subscribe(&self, slug: &str) -> Result<Subscription, LaundryError> {
        Ok(self.room(slug)?.subscribe())
    }
}
