use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::army::{Army, ArmyType};
use super::entity::{DomainEntity, EntityKind, Identity, same_entity};
use super::reference::ClaimBuildType;
use crate::error::{DomainError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialBuilding {
    Embassy,
    Harbour,
    HouseOfHealing,
    Stables,
    Watchtower,
    Bank,
}

string_enum!(SpecialBuilding {
    Embassy => "embassy",
    Harbour => "harbour",
    HouseOfHealing => "house_of_healing",
    Stables => "stables",
    Watchtower => "watchtower",
    Bank => "bank",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionSite {
    pub site_type: String,
    pub resource: String,
    pub count: u32,
}

/// Projection of an army this claim-build raised: enough to count by type
/// without holding the army itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedArmy {
    pub army_id: u64,
    pub army_type: ArmyType,
}

#[derive(Debug, Clone)]
pub struct NewClaimBuild {
    pub name: String,
    pub region_id: u64,
    pub claim_build_type: ClaimBuildType,
    pub owned_by: u64,
    pub coordinates: Coordinate,
}

/// Stored shape of a claim-build, used by the store to rebuild one.
#[derive(Debug, Clone)]
pub struct ClaimBuildParts {
    pub identity: Identity,
    pub name: String,
    pub region_id: u64,
    pub claim_build_type: ClaimBuildType,
    pub owned_by: u64,
    pub coordinates: Coordinate,
    pub stationed_armies: BTreeSet<u64>,
    pub created_armies: Vec<CreatedArmy>,
    pub production_sites: Vec<ProductionSite>,
    pub special_buildings: Vec<SpecialBuilding>,
    pub traders: Option<String>,
    pub siege: Option<String>,
    pub number_of_houses: Option<String>,
    pub built_by: BTreeSet<u64>,
    pub free_armies_remaining: u32,
    pub free_trading_companies_remaining: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimBuild {
    identity: Identity,
    name: String,
    region_id: u64,
    claim_build_type: ClaimBuildType,
    owned_by: u64,
    coordinates: Coordinate,
    stationed_armies: BTreeSet<u64>,
    created_armies: Vec<CreatedArmy>,
    production_sites: Vec<ProductionSite>,
    special_buildings: Vec<SpecialBuilding>,
    traders: Option<String>,
    siege: Option<String>,
    number_of_houses: Option<String>,
    built_by: BTreeSet<u64>,
    free_armies_remaining: u32,
    free_trading_companies_remaining: u32,
}

impl ClaimBuild {
    /// A new claim-build with its free-slot counters seeded from its type.
    pub fn new(new: NewClaimBuild) -> Result<Self> {
        if new.name.trim().is_empty() {
            return Err(DomainError::invalid_argument("claimbuild name cannot be empty"));
        }
        let ty = new.claim_build_type;
        Ok(Self {
            identity: Identity::transient(),
            name: new.name,
            region_id: new.region_id,
            claim_build_type: new.claim_build_type,
            owned_by: new.owned_by,
            coordinates: new.coordinates,
            stationed_armies: BTreeSet::new(),
            created_armies: Vec::new(),
            production_sites: Vec::new(),
            special_buildings: Vec::new(),
            traders: None,
            siege: None,
            number_of_houses: None,
            built_by: BTreeSet::new(),
            free_armies_remaining: ty.free_armies(),
            free_trading_companies_remaining: ty.free_trading_companies(),
        })
    }

    pub fn from_parts(parts: ClaimBuildParts) -> Result<Self> {
        let ty = parts.claim_build_type;
        if parts.free_armies_remaining > ty.free_armies()
            || parts.free_trading_companies_remaining > ty.free_trading_companies()
        {
            return Err(DomainError::invalid_argument(format!(
                "claimbuild [{}] has more free slots than its type allows",
                parts.name
            )));
        }
        Ok(Self {
            identity: parts.identity,
            name: parts.name,
            region_id: parts.region_id,
            claim_build_type: parts.claim_build_type,
            owned_by: parts.owned_by,
            coordinates: parts.coordinates,
            stationed_armies: parts.stationed_armies,
            created_armies: parts.created_armies,
            production_sites: parts.production_sites,
            special_buildings: parts.special_buildings,
            traders: parts.traders,
            siege: parts.siege,
            number_of_houses: parts.number_of_houses,
            built_by: parts.built_by,
            free_armies_remaining: parts.free_armies_remaining,
            free_trading_companies_remaining: parts.free_trading_companies_remaining,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region_id(&self) -> u64 {
        self.region_id
    }

    pub fn claim_build_type(&self) -> ClaimBuildType {
        self.claim_build_type
    }

    pub fn owned_by(&self) -> u64 {
        self.owned_by
    }

    pub fn coordinates(&self) -> Coordinate {
        self.coordinates
    }

    pub fn stationed_armies(&self) -> &BTreeSet<u64> {
        &self.stationed_armies
    }

    pub fn created_armies(&self) -> &[CreatedArmy] {
        &self.created_armies
    }

    pub fn production_sites(&self) -> &[ProductionSite] {
        &self.production_sites
    }

    pub fn special_buildings(&self) -> &[SpecialBuilding] {
        &self.special_buildings
    }

    pub fn traders(&self) -> Option<&str> {
        self.traders.as_deref()
    }

    pub fn siege(&self) -> Option<&str> {
        self.siege.as_deref()
    }

    pub fn number_of_houses(&self) -> Option<&str> {
        self.number_of_houses.as_deref()
    }

    pub fn built_by(&self) -> &BTreeSet<u64> {
        &self.built_by
    }

    pub fn free_armies_remaining(&self) -> u32 {
        self.free_armies_remaining
    }

    pub fn free_trading_companies_remaining(&self) -> u32 {
        self.free_trading_companies_remaining
    }

    pub fn count_created(&self, army_type: ArmyType) -> u32 {
        let count = self
            .created_armies
            .iter()
            .filter(|a| a.army_type == army_type)
            .count() as u32;
        debug!(
            claim_build = %self.name,
            army_type = army_type.label(),
            count,
            "counted created armies"
        );
        count
    }

    pub fn count_armies_created(&self) -> u32 {
        self.count_created(ArmyType::Army)
    }

    pub fn count_trading_companies_created(&self) -> u32 {
        self.count_created(ArmyType::TradingCompany)
    }

    pub fn max_created(&self, army_type: ArmyType) -> u32 {
        match army_type {
            ArmyType::Army => self.claim_build_type.max_armies(),
            ArmyType::TradingCompany => self.claim_build_type.max_trading_companies(),
        }
    }

    /// True when no further armies of `army_type` may be raised here.
    pub fn at_max(&self, army_type: ArmyType) -> bool {
        let count = self.count_created(army_type);
        let max = self.max_created(army_type);
        let at_max = count >= max;
        debug!(
            claim_build = %self.name,
            army_type = army_type.label(),
            count,
            max,
            at_max,
            "checked claimbuild capacity"
        );
        at_max
    }

    pub fn at_max_armies(&self) -> bool {
        self.at_max(ArmyType::Army)
    }

    pub fn at_max_trading_companies(&self) -> bool {
        self.at_max(ArmyType::TradingCompany)
    }

    /// Add a saved army that was raised here to the created set.
    pub fn record_created_army(&mut self, army: &Army) -> Result<()> {
        if army.identity().is_transient() {
            return Err(DomainError::invalid_argument(format!(
                "army [{}] must be saved before it is recorded",
                army.name()
            )));
        }
        if army.origin_claim_build_id() != Some(self.id()) {
            return Err(DomainError::invalid_argument(format!(
                "army [{}] was not raised at claimbuild [{}]",
                army.name(),
                self.name
            )));
        }
        if !self.created_armies.iter().any(|a| a.army_id == army.id()) {
            self.created_armies.push(CreatedArmy {
                army_id: army.id(),
                army_type: army.army_type(),
            });
        }
        Ok(())
    }

    /// Returns whether the army was in the created set.
    pub fn forget_created_army(&mut self, army_id: u64) -> bool {
        let before = self.created_armies.len();
        self.created_armies.retain(|a| a.army_id != army_id);
        self.created_armies.len() != before
    }

    pub fn record_stationed(&mut self, army_id: u64) -> bool {
        self.stationed_armies.insert(army_id)
    }

    pub fn remove_stationed(&mut self, army_id: u64) -> bool {
        self.stationed_armies.remove(&army_id)
    }

    /// Use one upkeep-free slot for `army_type` if any is left.
    pub fn take_free_slot(&mut self, army_type: ArmyType) -> bool {
        let remaining = match army_type {
            ArmyType::Army => &mut self.free_armies_remaining,
            ArmyType::TradingCompany => &mut self.free_trading_companies_remaining,
        };
        if *remaining == 0 {
            return false;
        }
        *remaining -= 1;
        true
    }

    /// Replace the army links with those derived from the stored army rows.
    pub(crate) fn set_army_links(&mut self, created: Vec<CreatedArmy>, stationed: BTreeSet<u64>) {
        self.created_armies = created;
        self.stationed_armies = stationed;
    }

    pub fn add_builder(&mut self, player_id: u64) -> bool {
        self.built_by.insert(player_id)
    }

    pub fn add_special_building(&mut self, building: SpecialBuilding) {
        self.special_buildings.push(building);
    }

    pub fn add_production_site(&mut self, site: ProductionSite) {
        self.production_sites.push(site);
    }

    pub fn describe(
        &mut self,
        traders: Option<String>,
        siege: Option<String>,
        number_of_houses: Option<String>,
    ) {
        self.traders = traders;
        self.siege = siege;
        self.number_of_houses = number_of_houses;
    }
}

impl DomainEntity for ClaimBuild {
    const KIND: EntityKind = EntityKind::ClaimBuild;

    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn identity_mut(&mut self) -> &mut Identity {
        &mut self.identity
    }
}

impl PartialEq for ClaimBuild {
    fn eq(&self, other: &Self) -> bool {
        same_entity(self, other)
    }
}

impl Eq for ClaimBuild {}

impl std::fmt::Display for ClaimBuild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
