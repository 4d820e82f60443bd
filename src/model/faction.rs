use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, warn};

use super::entity::{DomainEntity, EntityKind, EqualityKey, Identity, same_entity};
use crate::error::{DomainError, Result};

pub const MAX_BUFF_DESCRIPTION_LEN: usize = 512;

#[derive(Debug, Clone)]
pub struct NewFaction {
    pub name: String,
    pub colorcode: String,
    pub role_id: u64,
    pub buff_description: String,
}

/// Stored shape of a faction, used by the store to rebuild one.
#[derive(Debug, Clone)]
pub struct FactionParts {
    pub identity: Identity,
    pub name: String,
    pub leader_id: Option<u64>,
    pub region_ids: BTreeSet<u64>,
    pub ally_ids: BTreeSet<u64>,
    pub colorcode: String,
    pub role_id: u64,
    pub home_region_id: Option<u64>,
    pub buff_description: String,
    pub food_stockpile: i64,
    pub aliases: Vec<String>,
}

/// Members, armies and claim-builds reference the faction by id and are
/// looked up through the store rather than held here.
#[derive(Debug, Clone, Serialize)]
pub struct Faction {
    identity: Identity,
    name: String,
    leader_id: Option<u64>,
    region_ids: BTreeSet<u64>,
    ally_ids: BTreeSet<u64>,
    colorcode: String,
    role_id: u64,
    home_region_id: Option<u64>,
    buff_description: String,
    food_stockpile: i64,
    aliases: Vec<String>,
}

fn check_buff_description(name: &str, buff: &str) -> Result<()> {
    let len = buff.chars().count();
    if len > MAX_BUFF_DESCRIPTION_LEN {
        return Err(DomainError::invalid_argument(format!(
            "buff description of faction [{name}] is {len} characters, max {MAX_BUFF_DESCRIPTION_LEN}"
        )));
    }
    Ok(())
}

impl Faction {
    pub fn new(new: NewFaction) -> Result<Self> {
        if new.name.trim().is_empty() {
            return Err(DomainError::invalid_argument("faction name cannot be empty"));
        }
        check_buff_description(&new.name, &new.buff_description)?;
        Ok(Self {
            identity: Identity::transient(),
            name: new.name,
            leader_id: None,
            region_ids: BTreeSet::new(),
            ally_ids: BTreeSet::new(),
            colorcode: new.colorcode,
            role_id: new.role_id,
            home_region_id: None,
            buff_description: new.buff_description,
            food_stockpile: 0,
            aliases: Vec::new(),
        })
    }

    pub fn from_parts(parts: FactionParts) -> Result<Self> {
        check_buff_description(&parts.name, &parts.buff_description)?;
        if parts.food_stockpile < 0 {
            return Err(DomainError::invalid_argument(format!(
                "faction [{}] has negative food stockpile {}",
                parts.name, parts.food_stockpile
            )));
        }
        Ok(Self {
            identity: parts.identity,
            name: parts.name,
            leader_id: parts.leader_id,
            region_ids: parts.region_ids,
            ally_ids: parts.ally_ids,
            colorcode: parts.colorcode,
            role_id: parts.role_id,
            home_region_id: parts.home_region_id,
            buff_description: parts.buff_description,
            food_stockpile: parts.food_stockpile,
            aliases: parts.aliases,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn leader_id(&self) -> Option<u64> {
        self.leader_id
    }

    pub fn region_ids(&self) -> &BTreeSet<u64> {
        &self.region_ids
    }

    pub fn ally_ids(&self) -> &BTreeSet<u64> {
        &self.ally_ids
    }

    pub fn colorcode(&self) -> &str {
        &self.colorcode
    }

    pub fn role_id(&self) -> u64 {
        self.role_id
    }

    pub fn home_region_id(&self) -> Option<u64> {
        self.home_region_id
    }

    pub fn buff_description(&self) -> &str {
        &self.buff_description
    }

    pub fn food_stockpile(&self) -> i64 {
        self.food_stockpile
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn add_food_to_stockpile(&mut self, amount: i64) -> Result<()> {
        if amount < 0 {
            warn!(faction = %self.name, amount, "refused negative food add");
            return Err(DomainError::invalid_argument(
                "adding a negative amount of food to the stockpile is not supported",
            ));
        }
        let total = self.food_stockpile.checked_add(amount).ok_or_else(|| {
            DomainError::invalid_argument(format!(
                "food stockpile of faction [{}] would overflow",
                self.name
            ))
        })?;
        self.food_stockpile = total;
        info!(faction = %self.name, amount, stockpile = total, "food added to stockpile");
        Ok(())
    }

    pub fn subtract_food_from_stockpile(&mut self, amount: i64) -> Result<()> {
        if amount < 0 {
            warn!(faction = %self.name, amount, "refused negative food subtract");
            return Err(DomainError::invalid_argument(
                "subtracting a negative amount of food from the stockpile is not supported",
            ));
        }
        if self.food_stockpile - amount < 0 {
            warn!(
                faction = %self.name,
                stockpile = self.food_stockpile,
                amount,
                "not enough food in stockpile"
            );
            return Err(DomainError::InsufficientResource {
                faction: self.name.clone(),
                stockpile: self.food_stockpile,
                requested: amount,
            });
        }
        self.food_stockpile -= amount;
        info!(faction = %self.name, amount, stockpile = self.food_stockpile, "food taken from stockpile");
        Ok(())
    }

    pub fn set_leader(&mut self, player_id: Option<u64>) {
        self.leader_id = player_id;
    }

    pub fn set_home_region(&mut self, region_id: Option<u64>) {
        self.home_region_id = region_id;
    }

    pub fn claim_region(&mut self, region_id: u64) -> bool {
        self.region_ids.insert(region_id)
    }

    pub fn release_region(&mut self, region_id: u64) -> bool {
        self.region_ids.remove(&region_id)
    }

    /// One-sided: the other faction's ally set is not touched.
    pub fn add_ally(&mut self, faction_id: u64) -> Result<bool> {
        if faction_id == self.id() && !self.identity.is_transient() {
            return Err(DomainError::invalid_argument(format!(
                "faction [{}] cannot ally itself",
                self.name
            )));
        }
        Ok(self.ally_ids.insert(faction_id))
    }

    pub fn remove_ally(&mut self, faction_id: u64) -> bool {
        self.ally_ids.remove(&faction_id)
    }

    pub fn is_allied_with(&self, faction_id: u64) -> bool {
        self.ally_ids.contains(&faction_id)
    }

    pub fn add_alias(&mut self, alias: impl Into<String>) -> bool {
        let alias = alias.into();
        if alias == self.name || self.aliases.contains(&alias) {
            return false;
        }
        self.aliases.push(alias);
        true
    }

    /// Matches the faction name or any alias, ignoring ASCII case.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    pub fn set_buff_description(&mut self, buff: String) -> Result<()> {
        check_buff_description(&self.name, &buff)?;
        self.buff_description = buff;
        Ok(())
    }
}

impl DomainEntity for Faction {
    const KIND: EntityKind = EntityKind::Faction;

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

impl PartialEq for Faction {
    fn eq(&self, other: &Self) -> bool {
        same_entity(self, other)
    }
}

impl Eq for Faction {}

impl std::fmt::Display for Faction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gondor() -> Faction {
        Faction::new(NewFaction {
            name: "Gondor".to_string(),
            colorcode: "#FFFFFF".to_string(),
            role_id: 1001,
            buff_description: "Stone walls".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn new_faction_has_empty_stockpile() {
        assert_eq!(gondor().food_stockpile(), 0);
    }

    #[test]
    fn add_then_subtract_round_trips() {
        let mut f = gondor();
        f.add_food_to_stockpile(40).unwrap();
        f.add_food_to_stockpile(25).unwrap();
        f.subtract_food_from_stockpile(25).unwrap();
        assert_eq!(f.food_stockpile(), 40);
    }

    #[test]
    fn subtract_more_than_stockpile_leaves_it_unchanged() {
        let mut f = gondor();
        f.add_food_to_stockpile(10).unwrap();
        let err = f.subtract_food_from_stockpile(11).unwrap_err();
        match err {
            DomainError::InsufficientResource {
                faction,
                stockpile,
                requested,
            } => {
                assert_eq!(faction, "Gondor");
                assert_eq!(stockpile, 10);
                assert_eq!(requested, 11);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(f.food_stockpile(), 10);
    }

    #[test]
    fn subtract_entire_stockpile_reaches_zero() {
        let mut f = gondor();
        f.add_food_to_stockpile(5).unwrap();
        f.subtract_food_from_stockpile(5).unwrap();
        assert_eq!(f.food_stockpile(), 0);
    }

    #[test]
    fn negative_amounts_are_invalid_arguments() {
        let mut f = gondor();
        f.add_food_to_stockpile(3).unwrap();
        assert!(matches!(
            f.add_food_to_stockpile(-1),
            Err(DomainError::InvalidArgument(_))
        ));
        assert!(matches!(
            f.subtract_food_from_stockpile(-1),
            Err(DomainError::InvalidArgument(_))
        ));
        assert_eq!(f.food_stockpile(), 3);
    }

    #[test]
    fn overflow_is_refused() {
        let mut f = gondor();
        f.add_food_to_stockpile(i64::MAX).unwrap();
        assert!(f.add_food_to_stockpile(1).is_err());
        assert_eq!(f.food_stockpile(), i64::MAX);
    }

    #[test]
    fn buff_description_is_bounded() {
        let long = "x".repeat(MAX_BUFF_DESCRIPTION_LEN + 1);
        let err = Faction::new(NewFaction {
            name: "Harad".to_string(),
            colorcode: "#AA0000".to_string(),
            role_id: 7,
            buff_description: long.clone(),
        })
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(_)));

        let mut f = gondor();
        assert!(f.set_buff_description(long).is_err());
        assert_eq!(f.buff_description(), "Stone walls");
        f.set_buff_description("x".repeat(MAX_BUFF_DESCRIPTION_LEN)).unwrap();
    }

    #[test]
    fn from_parts_rejects_negative_stockpile() {
        let parts = FactionParts {
            identity: Identity::persisted(3, 1),
            name: "Rohan".to_string(),
            leader_id: None,
            region_ids: BTreeSet::new(),
            ally_ids: BTreeSet::new(),
            colorcode: "#00AA00".to_string(),
            role_id: 3,
            home_region_id: None,
            buff_description: String::new(),
            food_stockpile: -4,
            aliases: vec![],
        };
        assert!(Faction::from_parts(parts).is_err());
    }

    #[test]
    fn allies_are_one_sided_and_not_self() {
        let mut f = gondor();
        f.identity_mut().assign(1);
        assert!(f.add_ally(2).unwrap());
        assert!(!f.add_ally(2).unwrap());
        assert!(f.is_allied_with(2));
        assert!(f.add_ally(1).is_err());
        assert!(f.remove_ally(2));
        assert!(!f.is_allied_with(2));
    }

    #[test]
    fn claim_and_release_regions() {
        let mut f = gondor();
        assert!(f.claim_region(4));
        assert!(!f.claim_region(4));
        assert!(f.claim_region(9));
        assert!(f.release_region(4));
        assert!(!f.release_region(4));
        assert_eq!(f.region_ids().iter().copied().collect::<Vec<_>>(), vec![9]);
    }

    #[test]
    fn aliases_and_lookup() {
        let mut f = gondor();
        assert!(f.add_alias("Kingdom of Gondor"));
        assert!(!f.add_alias("Kingdom of Gondor"));
        assert!(!f.add_alias("Gondor"));
        assert!(f.answers_to("kingdom of gondor"));
        assert!(f.answers_to("GONDOR"));
        assert!(!f.answers_to("Arnor"));
    }

    #[test]
    fn factions_equal_by_name() {
        let a = gondor();
        let mut b = gondor();
        b.identity_mut().assign(9);
        assert_eq!(a, b);
    }
}
