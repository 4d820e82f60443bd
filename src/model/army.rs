use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::claim_build::ClaimBuild;
use super::entity::{DomainEntity, EntityKind, EqualityKey, Identity, same_entity};
use super::reference::{ClaimBuildType, UnitCatalog};
use crate::error::{DomainError, Result};

/// Tokens of unit strength recovered per day of healing.
pub const HEALING_TOKENS_PER_DAY: f64 = 6.0;
pub const HOURS_PER_DAY: u32 = 24;
/// Healing cadence at the top fortification tier.
pub const FORTIFIED_CADENCE_HOURS: u32 = 12;
/// Longest healing duration; hours are stored in an `INTEGER` column.
pub const MAX_HEAL_HOURS: u32 = i32::MAX as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmyType {
    Army,
    TradingCompany,
}

string_enum!(ArmyType {
    Army => "army",
    TradingCompany => "trading_company",
});

impl ArmyType {
    /// Human-readable name for messages.
    pub fn label(self) -> &'static str {
        match self {
            ArmyType::Army => "army",
            ArmyType::TradingCompany => "trading company",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unit {
    identity: Identity,
    unit_type: String,
    count: u32,
    amount_alive: u32,
    token_cost: f64,
}

impl Unit {
    /// A fresh unit at full strength.
    pub fn new(unit_type: impl Into<String>, count: u32, token_cost: f64) -> Result<Self> {
        Self::restore(Identity::transient(), unit_type, count, count, token_cost)
    }

    pub fn from_catalog(catalog: &UnitCatalog, unit_type: &str, count: u32) -> Result<Self> {
        let token_cost = catalog.token_cost(unit_type)?;
        Self::new(unit_type, count, token_cost)
    }

    /// Rebuild a unit from stored values, rejecting impossible rows.
    pub fn restore(
        identity: Identity,
        unit_type: impl Into<String>,
        count: u32,
        amount_alive: u32,
        token_cost: f64,
    ) -> Result<Self> {
        let unit_type = unit_type.into();
        if amount_alive > count {
            return Err(DomainError::invalid_argument(format!(
                "unit [{unit_type}] has {amount_alive} alive out of {count}"
            )));
        }
        if !(token_cost.is_finite() && token_cost >= 0.0) {
            return Err(DomainError::invalid_argument(format!(
                "unit [{unit_type}] has invalid token cost {token_cost}"
            )));
        }
        Ok(Self {
            identity,
            unit_type,
            count,
            amount_alive,
            token_cost,
        })
    }

    pub fn unit_type(&self) -> &str {
        &self.unit_type
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn amount_alive(&self) -> u32 {
        self.amount_alive
    }

    pub fn token_cost(&self) -> f64 {
        self.token_cost
    }

    pub fn is_full_strength(&self) -> bool {
        self.amount_alive == self.count
    }

    pub fn missing(&self) -> u32 {
        self.count - self.amount_alive
    }

    pub fn missing_tokens(&self) -> f64 {
        f64::from(self.missing()) * self.token_cost
    }

    /// Returns how many casualties were actually applied.
    fn take_casualties(&mut self, casualties: u32) -> u32 {
        let applied = casualties.min(self.amount_alive);
        self.amount_alive -= applied;
        applied
    }

    fn heal_fully(&mut self) {
        self.amount_alive = self.count;
    }
}

impl DomainEntity for Unit {
    const KIND: EntityKind = EntityKind::Unit;

    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn identity_mut(&mut self) -> &mut Identity {
        &mut self.identity
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub identity: Identity,
    /// Region ids from start to destination.
    pub path: Vec<u64>,
    pub is_currently_active: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub hours_moved: u32,
}

impl Movement {
    pub fn begin(path: Vec<u64>, start_time: DateTime<Utc>) -> Self {
        Self {
            identity: Identity::transient(),
            path,
            is_currently_active: true,
            start_time,
            end_time: None,
            hours_moved: 0,
        }
    }

    pub fn destination(&self) -> Option<u64> {
        self.path.last().copied()
    }
}

/// Healing bookkeeping, present only while an army is healing.
///
/// `hours_healed + hours_left` always equals the duration computed when
/// healing started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingState {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub hours_healed: u32,
    pub hours_left: u32,
    pub last_updated_at: DateTime<Utc>,
}

impl HealingState {
    pub fn total_hours(&self) -> u32 {
        self.hours_healed + self.hours_left
    }
}

/// Outcome of one scheduler tick on a healing army.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealTick {
    Progressed { hours: u32, hours_left: u32 },
    Completed,
}

/// Everything needed to raise a new army at a claim-build.
#[derive(Debug, Clone)]
pub struct NewArmy {
    pub name: String,
    pub army_type: ArmyType,
    pub faction_id: u64,
    pub units: Vec<Unit>,
    pub bound_to: Option<u64>,
    pub free_tokens: f64,
}

/// Stored shape of an army, used by the store to rebuild one.
#[derive(Debug, Clone)]
pub struct ArmyParts {
    pub identity: Identity,
    pub name: String,
    pub army_type: ArmyType,
    pub faction_id: u64,
    pub current_region_id: u64,
    pub bound_to: Option<u64>,
    pub units: Vec<Unit>,
    pub sieges: BTreeSet<String>,
    pub stationed_at: Option<u64>,
    pub free_tokens: f64,
    pub healing: Option<HealingState>,
    pub origin_claim_build_id: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub movements: Vec<Movement>,
    pub is_paid: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Army {
    identity: Identity,
    name: String,
    army_type: ArmyType,
    faction_id: u64,
    current_region_id: u64,
    bound_to: Option<u64>,
    units: Vec<Unit>,
    sieges: BTreeSet<String>,
    stationed_at: Option<u64>,
    free_tokens: f64,
    healing: Option<HealingState>,
    origin_claim_build_id: Option<u64>,
    created_at: DateTime<Utc>,
    movements: Vec<Movement>,
    is_paid: bool,
}

impl Army {
    /// Raise a new army at `origin`. The army starts stationed there.
    pub fn raise(new: NewArmy, origin: &ClaimBuild, now: DateTime<Utc>) -> Result<Self> {
        if new.name.trim().is_empty() {
            return Err(DomainError::invalid_argument("army name cannot be empty"));
        }
        if origin.identity().is_transient() {
            return Err(DomainError::invalid_argument(format!(
                "claimbuild [{}] must be saved before raising armies",
                origin.name()
            )));
        }
        if !(new.free_tokens.is_finite() && new.free_tokens >= 0.0) {
            return Err(DomainError::invalid_argument(format!(
                "free tokens must be non-negative, got {}",
                new.free_tokens
            )));
        }
        Ok(Self {
            identity: Identity::transient(),
            name: new.name,
            army_type: new.army_type,
            faction_id: new.faction_id,
            current_region_id: origin.region_id(),
            bound_to: new.bound_to,
            units: new.units,
            sieges: BTreeSet::new(),
            stationed_at: Some(origin.id()),
            free_tokens: new.free_tokens,
            healing: None,
            origin_claim_build_id: Some(origin.id()),
            created_at: now,
            movements: Vec::new(),
            is_paid: false,
        })
    }

    pub fn from_parts(parts: ArmyParts) -> Result<Self> {
        if let Some(h) = &parts.healing {
            if parts.stationed_at.is_none() {
                return Err(DomainError::invalid_argument(format!(
                    "army [{}] is healing without being stationed",
                    parts.name
                )));
            }
            if h.end < h.start {
                return Err(DomainError::invalid_argument(format!(
                    "army [{}] heal end precedes heal start",
                    parts.name
                )));
            }
        }
        let active = parts.movements.iter().filter(|m| m.is_currently_active).count();
        if active > 1 {
            return Err(DomainError::invalid_argument(format!(
                "army [{}] has {active} active movements",
                parts.name
            )));
        }
        Ok(Self {
            identity: parts.identity,
            name: parts.name,
            army_type: parts.army_type,
            faction_id: parts.faction_id,
            current_region_id: parts.current_region_id,
            bound_to: parts.bound_to,
            units: parts.units,
            sieges: parts.sieges,
            stationed_at: parts.stationed_at,
            free_tokens: parts.free_tokens,
            healing: parts.healing,
            origin_claim_build_id: parts.origin_claim_build_id,
            created_at: parts.created_at,
            movements: parts.movements,
            is_paid: parts.is_paid,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn army_type(&self) -> ArmyType {
        self.army_type
    }

    pub fn faction_id(&self) -> u64 {
        self.faction_id
    }

    pub fn current_region_id(&self) -> u64 {
        self.current_region_id
    }

    pub fn bound_to(&self) -> Option<u64> {
        self.bound_to
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn sieges(&self) -> &BTreeSet<String> {
        &self.sieges
    }

    pub fn stationed_at(&self) -> Option<u64> {
        self.stationed_at
    }

    pub fn free_tokens(&self) -> f64 {
        self.free_tokens
    }

    pub fn healing(&self) -> Option<&HealingState> {
        self.healing.as_ref()
    }

    pub fn is_healing(&self) -> bool {
        self.healing.is_some()
    }

    pub fn origin_claim_build_id(&self) -> Option<u64> {
        self.origin_claim_build_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn movements(&self) -> &[Movement] {
        &self.movements
    }

    pub fn is_paid(&self) -> bool {
        self.is_paid
    }

    /// Give transient units and movements the ids the store generated for
    /// them, position by position.
    pub(crate) fn assign_child_ids(&mut self, unit_ids: &[u64], movement_ids: &[u64]) {
        for (unit, id) in self.units.iter_mut().zip(unit_ids) {
            if unit.identity.is_transient() {
                unit.identity.assign(*id);
            }
        }
        for (movement, id) in self.movements.iter_mut().zip(movement_ids) {
            if movement.identity.is_transient() {
                movement.identity.assign(*id);
            }
        }
    }

    pub fn all_units_alive(&self) -> bool {
        self.units.iter().all(Unit::is_full_strength)
    }

    pub fn has_units_left(&self) -> bool {
        self.units.iter().any(|u| u.amount_alive > 0)
    }

    pub fn tokens_missing(&self) -> f64 {
        self.units.iter().map(Unit::missing_tokens).sum()
    }

    /// Hours until the current losses are healed when stationed at a
    /// claim-build of type `station`.
    ///
    /// The result is always a whole multiple of the healing cadence (12 hours
    /// at the top fortification tier, 24 elsewhere). An exact multiple is
    /// kept as is, so an army without losses needs 0 hours. Durations are
    /// capped at the largest cadence multiple that fits `MAX_HEAL_HOURS`.
    pub fn compute_heal_hours(&self, station: Option<ClaimBuildType>) -> u32 {
        let mut hours = self.tokens_missing() * f64::from(HOURS_PER_DAY) / HEALING_TOKENS_PER_DAY;
        let mut cadence = HOURS_PER_DAY;
        if station.is_some_and(ClaimBuildType::is_top_fortification) {
            hours /= 2.0;
            cadence = FORTIFIED_CADENCE_HOURS;
        }
        let cadence = u64::from(cadence);
        let cap = u64::from(MAX_HEAL_HOURS) / cadence * cadence;
        let hours = hours.ceil();
        let whole = if hours >= cap as f64 { cap } else { hours as u64 };
        let rounded = whole
            .div_ceil(cadence)
            .checked_mul(cadence)
            .map_or(cap, |h| h.min(cap));
        u32::try_from(rounded).unwrap_or(MAX_HEAL_HOURS)
    }

    /// Idle → Healing.
    pub fn start_healing(&mut self, station: &ClaimBuild, now: DateTime<Utc>) -> Result<&HealingState> {
        if self.is_healing() {
            return Err(DomainError::invalid_state(format!(
                "army [{}] is already healing",
                self.name
            )));
        }
        if self.stationed_at != Some(station.id()) {
            return Err(DomainError::invalid_state(format!(
                "army [{}] is not stationed at claimbuild [{}]",
                self.name,
                station.name()
            )));
        }
        if !self.has_units_left() {
            return Err(DomainError::invalid_state(format!(
                "army [{}] has no units left to heal",
                self.name
            )));
        }
        if self.all_units_alive() {
            return Err(DomainError::invalid_state(format!(
                "army [{}] has no losses to heal",
                self.name
            )));
        }

        let hours = self.compute_heal_hours(Some(station.claim_build_type()));
        let end = now
            .checked_add_signed(Duration::hours(i64::from(hours)))
            .ok_or_else(|| {
                DomainError::invalid_argument(format!(
                    "army [{}] heal end is out of range ({hours} hours)",
                    self.name
                ))
            })?;
        info!(army = %self.name, claim_build = %station.name(), hours, "army started healing");
        Ok(&*self.healing.insert(HealingState {
            start: now,
            end,
            hours_healed: 0,
            hours_left: hours,
            last_updated_at: now,
        }))
    }

    /// Healing self-transition driven by the scheduler.
    ///
    /// Whole hours elapsed since the last update move from `hours_left` to
    /// `hours_healed`; the remainder carries over to the next tick. Once no
    /// hours are left the units are restored and the army returns to idle.
    pub fn advance_healing(&mut self, now: DateTime<Utc>) -> Result<HealTick> {
        let Some(state) = self.healing.as_mut() else {
            return Err(DomainError::invalid_state(format!(
                "army [{}] is not healing",
                self.name
            )));
        };

        let elapsed = u32::try_from((now - state.last_updated_at).num_hours().max(0))
            .unwrap_or(u32::MAX);
        let step = elapsed.min(state.hours_left);
        state.hours_healed += step;
        state.hours_left -= step;
        state.last_updated_at += Duration::hours(i64::from(elapsed));

        if state.hours_left > 0 {
            debug!(army = %self.name, step, hours_left = state.hours_left, "healing progressed");
            return Ok(HealTick::Progressed {
                hours: step,
                hours_left: state.hours_left,
            });
        }

        self.units.iter_mut().for_each(Unit::heal_fully);
        self.reset_healing_stats();
        info!(army = %self.name, "army finished healing");
        Ok(HealTick::Completed)
    }

    /// Healing → Idle. All healing fields are cleared together.
    pub fn reset_healing_stats(&mut self) {
        self.healing = None;
    }

    /// Cancel healing without restoring any units.
    pub fn stop_healing(&mut self) -> Result<()> {
        if !self.is_healing() {
            return Err(DomainError::invalid_state(format!(
                "army [{}] is not healing",
                self.name
            )));
        }
        self.reset_healing_stats();
        info!(army = %self.name, "army stopped healing");
        Ok(())
    }

    /// Apply battle casualties to the unit at `unit_index`; casualties beyond
    /// the survivors are ignored. Losses taken while healing cancel healing,
    /// since the planned duration no longer matches the losses.
    pub fn record_losses(&mut self, unit_index: usize, casualties: u32) -> Result<u32> {
        let unit_count = self.units.len();
        let Some(unit) = self.units.get_mut(unit_index) else {
            return Err(DomainError::invalid_argument(format!(
                "army [{}] has no unit at index {unit_index} ({unit_count} units)",
                self.name
            )));
        };
        let applied = unit.take_casualties(casualties);
        if applied > 0 && self.healing.take().is_some() {
            info!(army = %self.name, "healing interrupted by losses");
        }
        Ok(applied)
    }

    pub fn station(&mut self, claim_build: &ClaimBuild) -> Result<()> {
        if claim_build.identity().is_transient() {
            return Err(DomainError::invalid_argument(format!(
                "claimbuild [{}] must be saved before stationing armies",
                claim_build.name()
            )));
        }
        if self.is_healing() && self.stationed_at != Some(claim_build.id()) {
            return Err(DomainError::invalid_state(format!(
                "army [{}] cannot move station while healing",
                self.name
            )));
        }
        self.stationed_at = Some(claim_build.id());
        self.current_region_id = claim_build.region_id();
        Ok(())
    }

    pub fn unstation(&mut self) -> Result<()> {
        if self.is_healing() {
            return Err(DomainError::invalid_state(format!(
                "army [{}] cannot unstation while healing",
                self.name
            )));
        }
        self.stationed_at = None;
        Ok(())
    }

    /// Record a new movement. A second active movement is refused.
    pub fn push_movement(&mut self, movement: Movement) -> Result<()> {
        if movement.is_currently_active && self.active_movement().is_some() {
            return Err(DomainError::invalid_state(format!(
                "army [{}] already has an active movement",
                self.name
            )));
        }
        self.movements.push(movement);
        Ok(())
    }

    pub fn active_movement(&self) -> Option<&Movement> {
        self.movements.iter().find(|m| m.is_currently_active)
    }

    pub fn is_younger_than_24h(&self, now: DateTime<Utc>) -> bool {
        now < self.created_at + Duration::hours(i64::from(HOURS_PER_DAY))
    }

    pub fn bind_to(&mut self, rp_char_id: Option<u64>) {
        self.bound_to = rp_char_id;
    }

    pub fn set_paid(&mut self, paid: bool) {
        self.is_paid = paid;
    }

    pub fn begin_siege(&mut self, target: impl Into<String>) -> bool {
        self.sieges.insert(target.into())
    }

    pub fn end_siege(&mut self, target: &str) -> bool {
        self.sieges.remove(target)
    }
}

impl DomainEntity for Army {
    const KIND: EntityKind = EntityKind::Army;

    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn identity_mut(&mut self) -> &mut Identity {
        &mut self.identity
    }

    fn equality_key(&self) -> EqualityKey<'_> {
        EqualityKey::Natural(&self.name)
    }
}

impl PartialEq for Army {
    fn eq(&self, other: &Self) -> bool {
        same_entity(self, other)
    }
}

impl Eq for Army {}

impl std::fmt::Display for Army {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
