//! Request-level commands. Each one loads what it needs from a `Store`,
//! runs the entity rules, and saves only after every check has passed.
//!
//! Callers wrap a command in one unit of work and commit it; a
//! `StaleVersion` error means a concurrent command won and the caller may
//! retry from a fresh load.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::db::Store;
use crate::error::{DomainError, Result};
use crate::model::{Army, ArmyType, ClaimBuild, DomainEntity, HealingState, NewArmy, Unit, UnitCatalog};

#[derive(Debug, Clone)]
pub struct CreateArmy {
    pub name: String,
    pub army_type: ArmyType,
    pub faction_id: u64,
    pub claim_build_id: u64,
    /// Unit type name and count, resolved against the unit catalog.
    pub units: Vec<(String, u32)>,
    pub bound_to: Option<u64>,
    pub free_tokens: f64,
}

/// Raise an army at a claim-build owned by the requesting faction.
///
/// Refused with `CapacityExceeded` once the claim-build has created as many
/// armies of that type as its type allows. The first armies raised use the
/// claim-build's upkeep-free slots and start out paid.
pub async fn create_army<S: Store>(
    store: &mut S,
    catalog: &UnitCatalog,
    cmd: CreateArmy,
    now: DateTime<Utc>,
) -> Result<Army> {
    let faction = store.load_faction(cmd.faction_id).await?;
    let mut claim_build = store.load_claim_build(cmd.claim_build_id).await?;
    if claim_build.owned_by() != faction.id() {
        return Err(DomainError::invalid_argument(format!(
            "claimbuild [{}] is not owned by faction [{}]",
            claim_build.name(),
            faction.name()
        )));
    }
    if claim_build.at_max(cmd.army_type) {
        warn!(
            claim_build = %claim_build.name(),
            army_type = cmd.army_type.label(),
            "army creation refused at capacity"
        );
        return Err(DomainError::CapacityExceeded {
            claim_build: claim_build.name().to_string(),
            army_type: cmd.army_type,
            max: claim_build.max_created(cmd.army_type),
        });
    }
    if cmd.units.is_empty() {
        return Err(DomainError::invalid_argument(format!(
            "army [{}] needs at least one unit",
            cmd.name
        )));
    }
    let units = cmd
        .units
        .iter()
        .map(|(unit_type, count)| Unit::from_catalog(catalog, unit_type, *count))
        .collect::<Result<Vec<_>>>()?;

    let mut army = Army::raise(
        NewArmy {
            name: cmd.name,
            army_type: cmd.army_type,
            faction_id: faction.id(),
            units,
            bound_to: cmd.bound_to,
            free_tokens: cmd.free_tokens,
        },
        &claim_build,
        now,
    )?;
    let free = claim_build.take_free_slot(cmd.army_type);
    army.set_paid(free);

    store.save_army(&mut army).await?;
    claim_build.record_created_army(&army)?;
    claim_build.record_stationed(army.id());
    // Always saved: concurrent creations serialize on the claim-build version.
    store.save_claim_build(&mut claim_build).await?;

    info!(
        army = %army.name(),
        id = army.id(),
        claim_build = %claim_build.name(),
        free_slot = free,
        "army created"
    );
    Ok(army)
}

/// Remove an army; its origin claim-build regains the capacity.
pub async fn disband_army<S: Store>(store: &mut S, army_id: u64) -> Result<()> {
    let army = store.load_army(army_id).await?;
    if army.is_healing() {
        return Err(DomainError::invalid_state(format!(
            "army [{}] cannot be disbanded while healing",
            army.name()
        )));
    }
    if let Some(origin) = army.origin_claim_build_id() {
        let mut claim_build = store.load_claim_build(origin).await?;
        claim_build.forget_created_army(army_id);
        claim_build.remove_stationed(army_id);
        store.save_claim_build(&mut claim_build).await?;
        store.delete_army(army_id).await?;
    } else {
        store.delete_army(army_id).await?;
    }
    info!(army = %army.name(), id = army_id, "army disbanded");
    Ok(())
}

/// Apply `(unit index, casualties)` pairs from one battle. Returns the
/// number of casualties actually applied.
pub async fn record_battle_losses<S: Store>(
    store: &mut S,
    army_id: u64,
    losses: &[(usize, u32)],
) -> Result<u32> {
    let mut army = store.load_army(army_id).await?;
    let mut applied = 0;
    for (unit_index, casualties) in losses {
        applied += army.record_losses(*unit_index, *casualties)?;
    }
    store.save_army(&mut army).await?;
    info!(army = %army.name(), applied, "battle losses recorded");
    Ok(applied)
}

/// Start healing an army at the claim-build it is stationed at.
pub async fn start_healing<S: Store>(
    store: &mut S,
    army_id: u64,
    now: DateTime<Utc>,
) -> Result<HealingState> {
    let mut army = store.load_army(army_id).await?;
    let Some(station_id) = army.stationed_at() else {
        return Err(DomainError::invalid_state(format!(
            "army [{}] must be stationed to heal",
            army.name()
        )));
    };
    let station = store.load_claim_build(station_id).await?;
    let state = *army.start_healing(&station, now)?;
    store.save_army(&mut army).await?;
    Ok(state)
}

pub async fn stop_healing<S: Store>(store: &mut S, army_id: u64) -> Result<()> {
    let mut army = store.load_army(army_id).await?;
    army.stop_healing()?;
    store.save_army(&mut army).await
}

/// Station an army at a claim-build of its own faction or an ally.
pub async fn station_army<S: Store>(store: &mut S, army_id: u64, claim_build_id: u64) -> Result<()> {
    let mut army = store.load_army(army_id).await?;
    let claim_build = store.load_claim_build(claim_build_id).await?;
    ensure_may_station(store, &army, &claim_build).await?;
    army.station(&claim_build)?;
    store.save_army(&mut army).await?;
    info!(army = %army.name(), claim_build = %claim_build.name(), "army stationed");
    Ok(())
}

pub async fn unstation_army<S: Store>(store: &mut S, army_id: u64) -> Result<()> {
    let mut army = store.load_army(army_id).await?;
    army.unstation()?;
    store.save_army(&mut army).await?;
    info!(army = %army.name(), "army unstationed");
    Ok(())
}

async fn ensure_may_station<S: Store>(store: &mut S, army: &Army, claim_build: &ClaimBuild) -> Result<()> {
    if claim_build.owned_by() == army.faction_id() {
        return Ok(());
    }
    let owner = store.load_faction(claim_build.owned_by()).await?;
    if owner.is_allied_with(army.faction_id()) {
        return Ok(());
    }
    Err(DomainError::invalid_argument(format!(
        "army [{}] cannot station at claimbuild [{}] of faction [{}]",
        army.name(),
        claim_build.name(),
        owner.name()
    )))
}

/// Returns the new stockpile.
pub async fn add_food<S: Store>(store: &mut S, faction_id: u64, amount: i64) -> Result<i64> {
    let mut faction = store.load_faction(faction_id).await?;
    faction.add_food_to_stockpile(amount)?;
    store.save_faction(&mut faction).await?;
    Ok(faction.food_stockpile())
}

/// Returns the new stockpile.
pub async fn spend_food<S: Store>(store: &mut S, faction_id: u64, amount: i64) -> Result<i64> {
    let mut faction = store.load_faction(faction_id).await?;
    faction.subtract_food_from_stockpile(amount)?;
    store.save_faction(&mut faction).await?;
    Ok(faction.food_stockpile())
}
