//! Entities that other tables point at but that carry no rules of their own.

use serde::{Deserialize, Serialize};

use super::entity::{DomainEntity, EntityKind, Identity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub identity: Identity,
    pub name: String,
}

impl Region {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            identity: Identity::transient(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub identity: Identity,
    /// In-game name.
    pub ign: String,
    pub discord_id: String,
    pub faction_id: Option<u64>,
}

impl Player {
    pub fn new(ign: impl Into<String>, discord_id: impl Into<String>) -> Self {
        Self {
            identity: Identity::transient(),
            ign: ign.into(),
            discord_id: discord_id.into(),
            faction_id: None,
        }
    }
}

/// Role-play character an army can be bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpChar {
    pub identity: Identity,
    pub name: String,
    pub player_id: u64,
}

impl RpChar {
    pub fn new(name: impl Into<String>, player_id: u64) -> Self {
        Self {
            identity: Identity::transient(),
            name: name.into(),
            player_id,
        }
    }
}

macro_rules! plain_entity {
    ($ty:ty, $kind:expr) => {
        impl DomainEntity for $ty {
            const KIND: EntityKind = $kind;

            fn identity(&self) -> &Identity {
                &self.identity
            }

            fn identity_mut(&mut self) -> &mut Identity {
                &mut self.identity
            }
        }
    };
}

plain_entity!(Region, EntityKind::Region);
plain_entity!(Player, EntityKind::Player);
plain_entity!(RpChar, EntityKind::RpChar);
