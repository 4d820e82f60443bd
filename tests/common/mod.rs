#![allow(dead_code)]

use ardas_legends::db::Store;
use ardas_legends::model::*;
use ardas_legends::service::CreateArmy;
use chrono::{DateTime, TimeZone, Utc};

/// Ids of the seeded rows.
#[derive(Debug, Clone, Copy)]
pub struct Seed {
    pub anorien: u64,
    pub rohan_region: u64,
    pub mordor_region: u64,
    pub player: u64,
    pub gondor: u64,
    pub rohan: u64,
    pub mordor: u64,
    /// Stronghold owned by Gondor.
    pub minas_tirith: u64,
    /// Town owned by Gondor.
    pub pelargir: u64,
    /// Capital owned by Rohan, which is allied with Gondor.
    pub edoras: u64,
    /// Keep owned by Mordor.
    pub barad_dur: u64,
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn new_faction(name: &str, role_id: u64) -> Faction {
    Faction::new(NewFaction {
        name: name.to_string(),
        colorcode: "#ffffff".to_string(),
        role_id,
        buff_description: format!("{name} buff"),
    })
    .unwrap()
}

fn new_claim_build(name: &str, region: u64, ty: ClaimBuildType, owner: u64) -> ClaimBuild {
    ClaimBuild::new(NewClaimBuild {
        name: name.to_string(),
        region_id: region,
        claim_build_type: ty,
        owned_by: owner,
        coordinates: Coordinate { x: 10, y: 64, z: -20 },
    })
    .unwrap()
}

pub async fn seed<S: Store>(store: &mut S) -> Seed {
    let mut anorien = Region::new("Anorien");
    let mut rohan_region = Region::new("Westfold");
    let mut mordor_region = Region::new("Gorgoroth");
    store.save_region(&mut anorien).await.unwrap();
    store.save_region(&mut rohan_region).await.unwrap();
    store.save_region(&mut mordor_region).await.unwrap();

    let mut player = Player::new("Luktrob", "1234567890");
    store.save_player(&mut player).await.unwrap();

    let mut rohan = new_faction("Rohan", 2);
    rohan.claim_region(rohan_region.identity.id());
    store.save_faction(&mut rohan).await.unwrap();

    let mut gondor = new_faction("Gondor", 1);
    gondor.claim_region(anorien.identity.id());
    gondor.set_home_region(Some(anorien.identity.id()));
    gondor.set_leader(Some(player.identity.id()));
    gondor.add_ally(rohan.id()).unwrap();
    store.save_faction(&mut gondor).await.unwrap();

    rohan.add_ally(gondor.id()).unwrap();
    store.save_faction(&mut rohan).await.unwrap();

    let mut mordor = new_faction("Mordor", 3);
    mordor.claim_region(mordor_region.identity.id());
    store.save_faction(&mut mordor).await.unwrap();

    let mut minas_tirith = new_claim_build(
        "Minas Tirith",
        anorien.identity.id(),
        ClaimBuildType::Stronghold,
        gondor.id(),
    );
    minas_tirith.add_builder(player.identity.id());
    minas_tirith.add_special_building(SpecialBuilding::HouseOfHealing);
    minas_tirith.add_production_site(ProductionSite {
        site_type: "Farm".to_string(),
        resource: "Wheat".to_string(),
        count: 2,
    });
    store.save_claim_build(&mut minas_tirith).await.unwrap();

    let mut pelargir = new_claim_build("Pelargir", anorien.identity.id(), ClaimBuildType::Town, gondor.id());
    store.save_claim_build(&mut pelargir).await.unwrap();

    let mut edoras = new_claim_build(
        "Edoras",
        rohan_region.identity.id(),
        ClaimBuildType::Capital,
        rohan.id(),
    );
    store.save_claim_build(&mut edoras).await.unwrap();

    let mut barad_dur = new_claim_build(
        "Barad-dur",
        mordor_region.identity.id(),
        ClaimBuildType::Keep,
        mordor.id(),
    );
    store.save_claim_build(&mut barad_dur).await.unwrap();

    Seed {
        anorien: anorien.identity.id(),
        rohan_region: rohan_region.identity.id(),
        mordor_region: mordor_region.identity.id(),
        player: player.identity.id(),
        gondor: gondor.id(),
        rohan: rohan.id(),
        mordor: mordor.id(),
        minas_tirith: minas_tirith.id(),
        pelargir: pelargir.id(),
        edoras: edoras.id(),
        barad_dur: barad_dur.id(),
    }
}

pub fn army_cmd(name: &str, army_type: ArmyType, faction_id: u64, claim_build_id: u64) -> CreateArmy {
    let unit = match army_type {
        ArmyType::Army => "Gondor Soldier",
        ArmyType::TradingCompany => "Trading Caravan",
    };
    CreateArmy {
        name: name.to_string(),
        army_type,
        faction_id,
        claim_build_id,
        units: vec![(unit.to_string(), 120)],
        bound_to: None,
        free_tokens: 0.0,
    }
}
