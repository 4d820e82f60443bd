mod common;

use std::collections::BTreeSet;

use ardas_legends::db::{MemoryStore, Store};
use ardas_legends::model::*;
use ardas_legends::scheduler::run_healing_tick;
use ardas_legends::service::{create_army, record_battle_losses, start_healing, stop_healing};
use ardas_legends::DomainError;
use chrono::Duration;
use common::{army_cmd, seed, t0};

async fn wounded_army(store: &mut MemoryStore, claim_build: u64, faction: u64, casualties: u32) -> u64 {
    let catalog = UnitCatalog::builtin();
    let army = create_army(
        store,
        &catalog,
        army_cmd("Host of the White Tower", ArmyType::Army, faction, claim_build),
        t0(),
    )
    .await
    .unwrap();
    record_battle_losses(store, army.id(), &[(0, casualties)]).await.unwrap();
    army.id()
}

#[tokio::test]
async fn heal_duration_depends_on_station_tier() {
    let mut store = MemoryStore::new();
    let s = seed(&mut store).await;

    // 60 tokens missing: 240h in a town, halved to 120h at a stronghold.
    let at_stronghold = wounded_army(&mut store, s.minas_tirith, s.gondor, 60).await;
    let state = start_healing(&mut store, at_stronghold, t0()).await.unwrap();
    assert_eq!(state.hours_left, 120);
    assert_eq!(state.end, t0() + Duration::hours(120));

    let catalog = UnitCatalog::builtin();
    let town_army = create_army(
        &mut store,
        &catalog,
        army_cmd("Pelargir Guard", ArmyType::Army, s.gondor, s.pelargir),
        t0(),
    )
    .await
    .unwrap();
    record_battle_losses(&mut store, town_army.id(), &[(0, 60)]).await.unwrap();
    let state = start_healing(&mut store, town_army.id(), t0()).await.unwrap();
    assert_eq!(state.hours_left, 240);
    assert_eq!(state.hours_healed + state.hours_left, state.total_hours());
}

#[tokio::test]
async fn start_healing_refuses_unhurt_and_unstationed_armies() {
    let mut store = MemoryStore::new();
    let s = seed(&mut store).await;

    let army = wounded_army(&mut store, s.minas_tirith, s.gondor, 0).await;
    let err = start_healing(&mut store, army, t0()).await.unwrap_err();
    assert!(matches!(err, DomainError::InvalidState(_)));

    let mut loaded = store.load_army(army).await.unwrap();
    loaded.unstation().unwrap();
    store.save_army(&mut loaded).await.unwrap();
    let err = start_healing(&mut store, army, t0()).await.unwrap_err();
    assert!(matches!(err, DomainError::InvalidState(_)));
}

#[tokio::test]
async fn scheduler_progresses_then_completes() {
    let mut store = MemoryStore::new();
    let s = seed(&mut store).await;
    let army = wounded_army(&mut store, s.minas_tirith, s.gondor, 60).await;
    start_healing(&mut store, army, t0()).await.unwrap();

    let report = run_healing_tick(&mut store, t0() + Duration::hours(50)).await.unwrap();
    assert_eq!(report.progressed, vec![army]);
    let state = *store.load_army(army).await.unwrap().healing().unwrap();
    assert_eq!((state.hours_healed, state.hours_left), (50, 70));
    assert_eq!(state.last_updated_at, t0() + Duration::hours(50));

    // Under an hour since the last update: nothing is saved.
    let version = store.load_army(army).await.unwrap().identity().version();
    let report = run_healing_tick(&mut store, t0() + Duration::minutes(50 * 60 + 40)).await.unwrap();
    assert_eq!(report.touched(), 0);
    assert_eq!(store.load_army(army).await.unwrap().identity().version(), version);

    // A long gap is one large step, never past the total.
    let report = run_healing_tick(&mut store, t0() + Duration::hours(400)).await.unwrap();
    assert_eq!(report.completed, vec![army]);
    let healed = store.load_army(army).await.unwrap();
    assert!(!healed.is_healing());
    assert!(healed.all_units_alive());
    assert!(store.healing_armies().await.unwrap().is_empty());
}

#[tokio::test]
async fn stopped_healing_keeps_losses() {
    let mut store = MemoryStore::new();
    let s = seed(&mut store).await;
    let army = wounded_army(&mut store, s.minas_tirith, s.gondor, 30).await;
    start_healing(&mut store, army, t0()).await.unwrap();
    run_healing_tick(&mut store, t0() + Duration::hours(24)).await.unwrap();

    stop_healing(&mut store, army).await.unwrap();
    let army = store.load_army(army).await.unwrap();
    assert!(army.healing().is_none());
    assert_eq!(army.units()[0].amount_alive(), 90);
    assert!(matches!(
        stop_healing(&mut store, army.id()).await,
        Err(DomainError::InvalidState(_))
    ));
}

#[tokio::test]
async fn tick_completes_army_with_nothing_left() {
    let mut store = MemoryStore::new();
    let s = seed(&mut store).await;

    let mut army = Army::from_parts(ArmyParts {
        identity: Identity::transient(),
        name: "Rangers of Ithilien".to_string(),
        army_type: ArmyType::Army,
        faction_id: s.gondor,
        current_region_id: s.anorien,
        bound_to: None,
        units: vec![Unit::restore(Identity::transient(), "Gondor Archer", 40, 20, 1.0).unwrap()],
        sieges: BTreeSet::new(),
        stationed_at: Some(s.minas_tirith),
        free_tokens: 0.0,
        healing: Some(HealingState {
            start: t0(),
            end: t0() + Duration::hours(24),
            hours_healed: 24,
            hours_left: 0,
            last_updated_at: t0() + Duration::hours(24),
        }),
        origin_claim_build_id: None,
        created_at: t0(),
        movements: Vec::new(),
        is_paid: false,
    })
    .unwrap();
    store.save_army(&mut army).await.unwrap();

    let report = run_healing_tick(&mut store, t0() + Duration::hours(24)).await.unwrap();
    assert_eq!(report.completed, vec![army.id()]);
    let healed = store.load_army(army.id()).await.unwrap();
    assert_eq!(healed.units()[0].amount_alive(), 40);
    assert!(healed.healing().is_none());
}

#[tokio::test]
async fn losses_during_healing_cancel_it() {
    let mut store = MemoryStore::new();
    let s = seed(&mut store).await;
    let army = wounded_army(&mut store, s.minas_tirith, s.gondor, 30).await;
    start_healing(&mut store, army, t0()).await.unwrap();

    let applied = record_battle_losses(&mut store, army, &[(0, 500)]).await.unwrap();
    assert_eq!(applied, 90);
    let loaded = store.load_army(army).await.unwrap();
    assert!(!loaded.is_healing());
    assert!(!loaded.has_units_left());
    assert!(run_healing_tick(&mut store, t0() + Duration::hours(48)).await.unwrap().touched() == 0);
}
