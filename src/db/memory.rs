use std::collections::{BTreeMap, BTreeSet};

use super::store::Store;
use crate::error::{DomainError, Result};
use crate::id::IdSequences;
use crate::model::{
    Army, ClaimBuild, CreatedArmy, DomainEntity, EntityKind, Faction, Player, Region, RpChar,
};

/// In-process store with the same id, version and uniqueness rules as the
/// PostgreSQL schema. Every check runs before anything is written.
#[derive(Debug, Default)]
pub struct MemoryStore {
    ids: IdSequences,
    regions: BTreeMap<u64, Region>,
    players: BTreeMap<u64, Player>,
    rp_chars: BTreeMap<u64, RpChar>,
    factions: BTreeMap<u64, Faction>,
    claim_builds: BTreeMap<u64, ClaimBuild>,
    armies: BTreeMap<u64, Army>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn army_count(&self) -> usize {
        self.armies.len()
    }
}

fn get<T: DomainEntity + Clone>(table: &BTreeMap<u64, T>, id: u64) -> Result<T> {
    table.get(&id).cloned().ok_or(DomainError::NotFound { kind: T::KIND, id })
}

/// Version check for a save; transient entities always pass.
fn check_version<T: DomainEntity>(table: &BTreeMap<u64, T>, entity: &T) -> Result<()> {
    if entity.identity().is_transient() {
        return Ok(());
    }
    let id = entity.id();
    let stored = table.get(&id).ok_or(DomainError::NotFound { kind: T::KIND, id })?;
    let version = entity.identity().version();
    if stored.identity().version() != version {
        return Err(DomainError::StaleVersion {
            kind: T::KIND,
            id,
            version,
        });
    }
    Ok(())
}

/// Assign an id or bump the version, then store a copy.
fn put<T: DomainEntity + Clone>(ids: &mut IdSequences, table: &mut BTreeMap<u64, T>, entity: &mut T) {
    if entity.identity().is_transient() {
        entity.identity_mut().assign(ids.next_id(T::KIND));
    } else {
        entity.identity_mut().bump_version();
    }
    table.insert(entity.id(), entity.clone());
}

fn require<T>(table: &BTreeMap<u64, T>, id: u64, owner: &str, kind: EntityKind) -> Result<()> {
    if table.contains_key(&id) {
        Ok(())
    } else {
        Err(DomainError::invalid_argument(format!(
            "{owner} references missing {kind} {id}"
        )))
    }
}

impl Store for MemoryStore {
    async fn load_army(&mut self, id: u64) -> Result<Army> {
        get(&self.armies, id)
    }

    async fn save_army(&mut self, army: &mut Army) -> Result<()> {
        let owner = format!("army [{}]", army.name());
        require(&self.factions, army.faction_id(), &owner, EntityKind::Faction)?;
        require(&self.regions, army.current_region_id(), &owner, EntityKind::Region)?;
        for cb in [army.stationed_at(), army.origin_claim_build_id()].into_iter().flatten() {
            require(&self.claim_builds, cb, &owner, EntityKind::ClaimBuild)?;
        }
        if let Some(rp_char) = army.bound_to() {
            require(&self.rp_chars, rp_char, &owner, EntityKind::RpChar)?;
        }
        check_version(&self.armies, army)?;

        let unit_ids: Vec<u64> = army
            .units()
            .iter()
            .map(|u| {
                if u.identity().is_transient() {
                    self.ids.next_id(EntityKind::Unit)
                } else {
                    u.id()
                }
            })
            .collect();
        let movement_ids: Vec<u64> = army
            .movements()
            .iter()
            .map(|m| {
                if m.identity.is_transient() {
                    self.ids.next_id(EntityKind::Movement)
                } else {
                    m.identity.id()
                }
            })
            .collect();
        army.assign_child_ids(&unit_ids, &movement_ids);
        put(&mut self.ids, &mut self.armies, army);
        Ok(())
    }

    async fn delete_army(&mut self, id: u64) -> Result<()> {
        self.armies
            .remove(&id)
            .map(|_| ())
            .ok_or(DomainError::NotFound {
                kind: EntityKind::Army,
                id,
            })
    }

    async fn healing_armies(&mut self) -> Result<Vec<Army>> {
        Ok(self
            .armies
            .values()
            .filter(|a| a.is_healing())
            .cloned()
            .collect())
    }

    async fn load_claim_build(&mut self, id: u64) -> Result<ClaimBuild> {
        let mut claim_build = get(&self.claim_builds, id)?;
        let created = self
            .armies
            .values()
            .filter(|a| a.origin_claim_build_id() == Some(id))
            .map(|a| CreatedArmy {
                army_id: a.id(),
                army_type: a.army_type(),
            })
            .collect();
        let stationed: BTreeSet<u64> = self
            .armies
            .values()
            .filter(|a| a.stationed_at() == Some(id))
            .map(|a| a.id())
            .collect();
        claim_build.set_army_links(created, stationed);
        Ok(claim_build)
    }

    async fn save_claim_build(&mut self, claim_build: &mut ClaimBuild) -> Result<()> {
        let owner = format!("claimbuild [{}]", claim_build.name());
        require(&self.regions, claim_build.region_id(), &owner, EntityKind::Region)?;
        require(&self.factions, claim_build.owned_by(), &owner, EntityKind::Faction)?;
        for player in claim_build.built_by() {
            require(&self.players, *player, &owner, EntityKind::Player)?;
        }
        let id = claim_build.id();
        if self
            .claim_builds
            .values()
            .any(|other| other.id() != id && other.name() == claim_build.name())
        {
            return Err(DomainError::Duplicate {
                kind: EntityKind::ClaimBuild,
                constraint: "claimbuilds_name_key".to_string(),
            });
        }
        check_version(&self.claim_builds, claim_build)?;
        put(&mut self.ids, &mut self.claim_builds, claim_build);
        Ok(())
    }

    async fn load_faction(&mut self, id: u64) -> Result<Faction> {
        get(&self.factions, id)
    }

    async fn find_faction_by_name(&mut self, name: &str) -> Result<Option<Faction>> {
        Ok(self.factions.values().find(|f| f.name() == name).cloned())
    }

    async fn save_faction(&mut self, faction: &mut Faction) -> Result<()> {
        let owner = format!("faction [{}]", faction.name());
        if let Some(leader) = faction.leader_id() {
            require(&self.players, leader, &owner, EntityKind::Player)?;
        }
        for region in faction.region_ids().iter().chain(faction.home_region_id().iter()) {
            require(&self.regions, *region, &owner, EntityKind::Region)?;
        }
        for ally in faction.ally_ids() {
            require(&self.factions, *ally, &owner, EntityKind::Faction)?;
        }
        let id = faction.id();
        for other in self.factions.values().filter(|f| f.id() != id) {
            let constraint = if other.name() == faction.name() {
                "factions_name_key"
            } else if other.role_id() == faction.role_id() {
                "factions_role_id_key"
            } else {
                continue;
            };
            return Err(DomainError::Duplicate {
                kind: EntityKind::Faction,
                constraint: constraint.to_string(),
            });
        }
        check_version(&self.factions, faction)?;
        put(&mut self.ids, &mut self.factions, faction);
        Ok(())
    }

    async fn save_region(&mut self, region: &mut Region) -> Result<()> {
        check_version(&self.regions, region)?;
        put(&mut self.ids, &mut self.regions, region);
        Ok(())
    }

    async fn save_player(&mut self, player: &mut Player) -> Result<()> {
        if let Some(faction) = player.faction_id {
            require(&self.factions, faction, &format!("player [{}]", player.ign), EntityKind::Faction)?;
        }
        check_version(&self.players, player)?;
        put(&mut self.ids, &mut self.players, player);
        Ok(())
    }

    async fn save_rp_char(&mut self, rp_char: &mut RpChar) -> Result<()> {
        require(
            &self.players,
            rp_char.player_id,
            &format!("rpchar [{}]", rp_char.name),
            EntityKind::Player,
        )?;
        check_version(&self.rp_chars, rp_char)?;
        put(&mut self.ids, &mut self.rp_chars, rp_char);
        Ok(())
    }
}
