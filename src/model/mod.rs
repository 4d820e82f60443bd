#[macro_use]
mod macros;

pub mod army;
pub mod claim_build;
pub mod entity;
pub mod faction;
pub mod reference;
pub mod region;

pub use army::{
    Army, ArmyParts, ArmyType, HealTick, HealingState, Movement, NewArmy, Unit,
};
pub use claim_build::{
    ClaimBuild, ClaimBuildParts, Coordinate, CreatedArmy, NewClaimBuild, ProductionSite,
    SpecialBuilding,
};
pub use entity::{DomainEntity, EntityKind, EqualityKey, Identity, same_entity};
pub use faction::{Faction, FactionParts, NewFaction};
pub use reference::{ClaimBuildLimits, ClaimBuildType, UnitCatalog, UnitTypeEntry};
pub use region::{Player, Region, RpChar};
