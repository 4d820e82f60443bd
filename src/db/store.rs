use crate::error::Result;
use crate::model::{Army, ClaimBuild, Faction, Player, Region, RpChar};

/// Persistence collaborator.
///
/// Saving a transient entity inserts it and assigns its id. Saving a
/// persisted entity is a compare-and-swap on its version: if the stored
/// version differs the save fails with `DomainError::StaleVersion` and
/// nothing is written; on success the version is bumped in place.
///
/// A `ClaimBuild` is always loaded with its created and stationed armies
/// derived from the current army rows; saving one never writes those links.
#[allow(async_fn_in_trait)]
pub trait Store {
    async fn load_army(&mut self, id: u64) -> Result<Army>;

    async fn save_army(&mut self, army: &mut Army) -> Result<()>;

    async fn delete_army(&mut self, id: u64) -> Result<()>;

    /// Every army currently in the healing state, ordered by id.
    async fn healing_armies(&mut self) -> Result<Vec<Army>>;

    async fn load_claim_build(&mut self, id: u64) -> Result<ClaimBuild>;

    async fn save_claim_build(&mut self, claim_build: &mut ClaimBuild) -> Result<()>;

    async fn load_faction(&mut self, id: u64) -> Result<Faction>;

    async fn find_faction_by_name(&mut self, name: &str) -> Result<Option<Faction>>;

    async fn save_faction(&mut self, faction: &mut Faction) -> Result<()>;

    async fn save_region(&mut self, region: &mut Region) -> Result<()>;

    async fn save_player(&mut self, player: &mut Player) -> Result<()>;

    async fn save_rp_char(&mut self, rp_char: &mut RpChar) -> Result<()>;
}
