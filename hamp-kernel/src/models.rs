use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Type de machine annoncé par la page upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineKind {
    Washer,
    Dryer,
}

impl MachineKind {
    /// "Washer", "washer ", "Dryer"... ; tout le reste => None
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        if label.starts_with("wash") {
            Some(Self::Washer)
        } else if label.starts_with("dry") {
            Some(Self::Dryer)
        } else {
            None
        }
    }
}

/// Temps restant tel qu'affiché upstream + estimation de fin si parsable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remaining {
    pub text: String,
    pub estimated_completion: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    pub name: String,
    pub kind: Option<MachineKind>,
    pub status: String,
    pub remaining: Option<Remaining>,
}

/// État complet d'une laverie à un instant donné.
/// Jamais modifié en place : chaque poll réussi produit un nouveau snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub id: String,
    pub name: String,
    pub machines: Vec<Machine>,
    pub last_update: Option<OffsetDateTime>,
    pub next_update: Option<OffsetDateTime>,
}

impl RoomSnapshot {
    /// Snapshot vide créé au démarrage, avant le premier poll
    pub fn empty(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            machines: Vec::new(),
            last_update: None,
            next_update: None,
        }
    }

    pub fn machine(&self, name: &str) -> Option<&Machine> {
        self.machines.iter().find(|m| m.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_kind_from_label() {
        assert_eq!(MachineKind::from_label("Washer"), Some(MachineKind::Washer));
        assert_eq!(MachineKind::from_label(" dryer "), Some(MachineKind::Dryer));
        assert_eq!(MachineKind::from_label("Folding table"), None);
        assert_eq!(MachineKind::from_label(""), None);
    }

    #[test]
    fn test_snapshot_machine_lookup() {
        let mut room = RoomSnapshot::empty("dakin", "Dakin");
        room.machines.push(Machine {
            name: "Washer 3".into(),
            kind: Some(MachineKind::Washer),
            status: "Available".into(),
            remaining: None,
        });
        assert!(room.machine("Washer 3").is_some());
        assert!(room.machine("Washer 4").is_none());
    }

    #[test]
    fn test_snapshot_machine_lookup_returns_first_row() {
        let mut room = RoomSnapshot::empty("dakin", "Dakin");
        for status in ["In Use", "Available"] {
            room.machines.push(Machine {
                name: "Washer 1".into(),
                kind: Some(MachineKind::Washer),
                status: status.into(),
                remaining: None,
            });
        }
        assert_eq!(room.machine("Washer 1").unwrap().status, "In Use");
    }
}
