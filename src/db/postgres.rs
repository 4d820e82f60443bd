use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgQueryResult, Postgres};
use sqlx::{FromRow, Transaction};
use tracing::debug;

use super::store::Store;
use crate::config::AppConfig;
use crate::error::{DomainError, Result};
use crate::model::{
    Army, ArmyParts, ArmyType, ClaimBuild, ClaimBuildParts, ClaimBuildType, Coordinate,
    CreatedArmy, DomainEntity, EntityKind, Faction, FactionParts, HealingState, Identity,
    Movement, Player, ProductionSite, Region, RpChar, SpecialBuilding, Unit,
};

macro_rules! army_columns {
    () => {
        "id, version, name, army_type, faction_id, current_region_id, bound_to, sieges, \
         stationed_at, free_tokens, is_healing, heal_start, heal_end, hours_healed, \
         hours_left_healing, heal_last_updated_at, origin_claim_build_id, created_at, is_paid"
    };
}

macro_rules! claim_build_columns {
    () => {
        "id, version, name, region_id, claim_build_type, owned_by, x, y, z, special_buildings, \
         traders, siege, number_of_houses, free_armies_remaining, free_trading_companies_remaining"
    };
}

macro_rules! faction_columns {
    () => {
        "id, version, name, leader_id, colorcode, role_id, home_region_id, buff_description, \
         food_stockpile, aliases"
    };
}

/// Pool handle. All reads and writes go through a `PgUnitOfWork`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Open one transaction; nothing is visible to others until `commit`.
    pub async fn begin(&self) -> Result<PgUnitOfWork> {
        Ok(PgUnitOfWork {
            tx: self.pool.begin().await?,
        })
    }
}

/// One PostgreSQL transaction. Dropping it without `commit` rolls back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PgUnitOfWork {
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[derive(FromRow)]
struct ArmyRow {
    id: i64,
    version: i32,
    name: String,
    army_type: String,
    faction_id: i64,
    current_region_id: i64,
    bound_to: Option<i64>,
    sieges: Vec<String>,
    stationed_at: Option<i64>,
    free_tokens: f64,
    is_healing: bool,
    heal_start: Option<DateTime<Utc>>,
    heal_end: Option<DateTime<Utc>>,
    hours_healed: Option<i32>,
    hours_left_healing: Option<i32>,
    heal_last_updated_at: Option<DateTime<Utc>>,
    origin_claim_build_id: Option<i64>,
    created_at: DateTime<Utc>,
    is_paid: bool,
}

#[derive(FromRow)]
struct UnitRow {
    id: i64,
    version: i32,
    unit_type: String,
    count: i32,
    amount_alive: i32,
    token_cost: f64,
}

#[derive(FromRow)]
struct MovementRow {
    id: i64,
    version: i32,
    path: Vec<i64>,
    is_currently_active: bool,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    hours_moved: i32,
}

#[derive(FromRow)]
struct ClaimBuildRow {
    id: i64,
    version: i32,
    name: String,
    region_id: i64,
    claim_build_type: String,
    owned_by: i64,
    x: i32,
    y: i32,
    z: i32,
    special_buildings: Vec<String>,
    traders: Option<String>,
    siege: Option<String>,
    number_of_houses: Option<String>,
    free_armies_remaining: i32,
    free_trading_companies_remaining: i32,
}

#[derive(FromRow)]
struct ProductionSiteRow {
    site_type: String,
    resource: String,
    count: i32,
}

#[derive(FromRow)]
struct CreatedArmyRow {
    id: i64,
    army_type: String,
}

#[derive(FromRow)]
struct FactionRow {
    id: i64,
    version: i32,
    name: String,
    leader_id: Option<i64>,
    colorcode: String,
    role_id: i64,
    home_region_id: Option<i64>,
    buff_description: String,
    food_stockpile: i64,
    aliases: Vec<String>,
}

// BIGSERIAL ids are always positive, so the casts are lossless.
fn db_id(id: u64) -> i64 {
    id as i64
}

fn opt_db_id(id: Option<u64>) -> Option<i64> {
    id.map(db_id)
}

fn from_db_id(id: i64) -> u64 {
    id as u64
}

fn ids_to_db<'a>(ids: impl IntoIterator<Item = &'a u64>) -> Vec<i64> {
    ids.into_iter().copied().map(db_id).collect()
}

fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        DomainError::invalid_argument(format!("column {column} holds negative value {value}"))
    })
}

fn to_i32(value: u32, column: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| {
        DomainError::invalid_argument(format!("value {value} does not fit column {column}"))
    })
}

fn parse_text<T: FromStr<Err = String>>(value: &str) -> Result<T> {
    value.parse().map_err(DomainError::InvalidArgument)
}

/// Turn constraint violations into domain errors; anything else stays a
/// database error.
fn constraint_error(kind: EntityKind, err: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(db) = &err {
        let constraint = db.constraint().unwrap_or("unknown").to_string();
        if db.is_unique_violation() {
            return DomainError::Duplicate { kind, constraint };
        }
        if db.is_foreign_key_violation() {
            return DomainError::invalid_argument(format!(
                "{kind} references a missing row ({constraint})"
            ));
        }
        if db.is_check_violation() {
            return DomainError::invalid_argument(format!(
                "{kind} violates check constraint ({constraint})"
            ));
        }
    }
    DomainError::Database(err)
}

/// A guarded update that touched no row lost the version race.
fn check_updated(result: PgQueryResult, kind: EntityKind, identity: &Identity) -> Result<()> {
    if result.rows_affected() == 0 {
        return Err(DomainError::StaleVersion {
            kind,
            id: identity.id(),
            version: identity.version(),
        });
    }
    Ok(())
}

fn healing_from_row(row: &ArmyRow) -> Result<Option<HealingState>> {
    if !row.is_healing {
        return Ok(None);
    }
    match (
        row.heal_start,
        row.heal_end,
        row.hours_healed,
        row.hours_left_healing,
        row.heal_last_updated_at,
    ) {
        (Some(start), Some(end), Some(healed), Some(left), Some(last_updated_at)) => {
            Ok(Some(HealingState {
                start,
                end,
                hours_healed: to_u32(healed, "hours_healed")?,
                hours_left: to_u32(left, "hours_left_healing")?,
                last_updated_at,
            }))
        }
        _ => Err(DomainError::invalid_argument(format!(
            "army {} is healing with incomplete healing columns",
            row.id
        ))),
    }
}

async fn fetch_army_children(conn: &mut PgConnection, army_id: i64) -> Result<(Vec<Unit>, Vec<Movement>)> {
    let unit_rows: Vec<UnitRow> = sqlx::query_as(
        "SELECT id, version, unit_type, count, amount_alive, token_cost \
         FROM units WHERE army_id = $1 ORDER BY position",
    )
    .bind(army_id)
    .fetch_all(&mut *conn)
    .await?;
    let units = unit_rows
        .into_iter()
        .map(|r| {
            Unit::restore(
                Identity::persisted(from_db_id(r.id), r.version),
                r.unit_type,
                to_u32(r.count, "count")?,
                to_u32(r.amount_alive, "amount_alive")?,
                r.token_cost,
            )
        })
        .collect::<Result<Vec<_>>>()?;

    let movement_rows: Vec<MovementRow> = sqlx::query_as(
        "SELECT id, version, path, is_currently_active, start_time, end_time, hours_moved \
         FROM movements WHERE army_id = $1 ORDER BY start_time, id",
    )
    .bind(army_id)
    .fetch_all(&mut *conn)
    .await?;
    let movements = movement_rows
        .into_iter()
        .map(|r| {
            Ok(Movement {
                identity: Identity::persisted(from_db_id(r.id), r.version),
                path: r.path.into_iter().map(from_db_id).collect(),
                is_currently_active: r.is_currently_active,
                start_time: r.start_time,
                end_time: r.end_time,
                hours_moved: to_u32(r.hours_moved, "hours_moved")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((units, movements))
}

async fn army_from_row(conn: &mut PgConnection, row: ArmyRow) -> Result<Army> {
    let healing = healing_from_row(&row)?;
    let (units, movements) = fetch_army_children(conn, row.id).await?;
    Army::from_parts(ArmyParts {
        identity: Identity::persisted(from_db_id(row.id), row.version),
        name: row.name,
        army_type: parse_text(&row.army_type)?,
        faction_id: from_db_id(row.faction_id),
        current_region_id: from_db_id(row.current_region_id),
        bound_to: row.bound_to.map(from_db_id),
        units,
        sieges: row.sieges.into_iter().collect(),
        stationed_at: row.stationed_at.map(from_db_id),
        free_tokens: row.free_tokens,
        healing,
        origin_claim_build_id: row.origin_claim_build_id.map(from_db_id),
        created_at: row.created_at,
        movements,
        is_paid: row.is_paid,
    })
}

async fn fetch_army(conn: &mut PgConnection, id: u64) -> Result<Army> {
    let row: ArmyRow = sqlx::query_as(concat!("SELECT ", army_columns!(), " FROM armies WHERE id = $1"))
        .bind(db_id(id))
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(DomainError::NotFound {
            kind: EntityKind::Army,
            id,
        })?;
    army_from_row(conn, row).await
}

/// Write units in order, deleting rows no longer present. Returns the id of
/// every unit by position.
async fn write_units(conn: &mut PgConnection, army_id: i64, units: &[Unit]) -> Result<Vec<u64>> {
    let kept: Vec<i64> = units
        .iter()
        .filter(|u| !u.identity().is_transient())
        .map(|u| db_id(u.id()))
        .collect();
    sqlx::query("DELETE FROM units WHERE army_id = $1 AND NOT (id = ANY($2))")
        .bind(army_id)
        .bind(&kept[..])
        .execute(&mut *conn)
        .await?;

    let mut ids = Vec::with_capacity(units.len());
    for (position, unit) in units.iter().enumerate() {
        let position = i32::try_from(position).unwrap_or(i32::MAX);
        let count = to_i32(unit.count(), "count")?;
        let alive = to_i32(unit.amount_alive(), "amount_alive")?;
        if unit.identity().is_transient() {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO units (army_id, position, unit_type, count, amount_alive, token_cost) \
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
            )
            .bind(army_id)
            .bind(position)
            .bind(unit.unit_type())
            .bind(count)
            .bind(alive)
            .bind(unit.token_cost())
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| constraint_error(EntityKind::Unit, e))?;
            ids.push(from_db_id(id));
        } else {
            sqlx::query(
                "UPDATE units SET position = $3, unit_type = $4, count = $5, amount_alive = $6, \
                 token_cost = $7 WHERE id = $1 AND army_id = $2",
            )
            .bind(db_id(unit.id()))
            .bind(army_id)
            .bind(position)
            .bind(unit.unit_type())
            .bind(count)
            .bind(alive)
            .bind(unit.token_cost())
            .execute(&mut *conn)
            .await
            .map_err(|e| constraint_error(EntityKind::Unit, e))?;
            ids.push(unit.id());
        }
    }
    Ok(ids)
}

async fn write_movements(conn: &mut PgConnection, army_id: i64, movements: &[Movement]) -> Result<Vec<u64>> {
    let kept: Vec<i64> = movements
        .iter()
        .filter(|m| !m.identity.is_transient())
        .map(|m| db_id(m.identity.id()))
        .collect();
    sqlx::query("DELETE FROM movements WHERE army_id = $1 AND NOT (id = ANY($2))")
        .bind(army_id)
        .bind(&kept[..])
        .execute(&mut *conn)
        .await?;

    // Deactivate first so the one-active index never sees two rows mid-write.
    sqlx::query("UPDATE movements SET is_currently_active = FALSE WHERE army_id = $1")
        .bind(army_id)
        .execute(&mut *conn)
        .await?;

    let mut ids = Vec::with_capacity(movements.len());
    for movement in movements {
        let path = ids_to_db(&movement.path);
        let hours_moved = to_i32(movement.hours_moved, "hours_moved")?;
        if movement.identity.is_transient() {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO movements (army_id, path, is_currently_active, start_time, end_time, hours_moved) \
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
            )
            .bind(army_id)
            .bind(&path[..])
            .bind(movement.is_currently_active)
            .bind(movement.start_time)
            .bind(movement.end_time)
            .bind(hours_moved)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| constraint_error(EntityKind::Movement, e))?;
            ids.push(from_db_id(id));
        } else {
            sqlx::query(
                "UPDATE movements SET path = $3, is_currently_active = $4, start_time = $5, \
                 end_time = $6, hours_moved = $7 WHERE id = $1 AND army_id = $2",
            )
            .bind(db_id(movement.identity.id()))
            .bind(army_id)
            .bind(&path[..])
            .bind(movement.is_currently_active)
            .bind(movement.start_time)
            .bind(movement.end_time)
            .bind(hours_moved)
            .execute(&mut *conn)
            .await
            .map_err(|e| constraint_error(EntityKind::Movement, e))?;
            ids.push(movement.identity.id());
        }
    }
    Ok(ids)
}

async fn fetch_claim_build(conn: &mut PgConnection, id: u64) -> Result<ClaimBuild> {
    let row: ClaimBuildRow = sqlx::query_as(concat!(
        "SELECT ",
        claim_build_columns!(),
        " FROM claimbuilds WHERE id = $1"
    ))
    .bind(db_id(id))
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(DomainError::NotFound {
        kind: EntityKind::ClaimBuild,
        id,
    })?;

    let created: Vec<CreatedArmyRow> = sqlx::query_as(
        "SELECT id, army_type FROM armies WHERE origin_claim_build_id = $1 ORDER BY id",
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;
    let created_armies = created
        .into_iter()
        .map(|r| {
            Ok(CreatedArmy {
                army_id: from_db_id(r.id),
                army_type: parse_text::<ArmyType>(&r.army_type)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let stationed: Vec<i64> = sqlx::query_scalar("SELECT id FROM armies WHERE stationed_at = $1")
        .bind(row.id)
        .fetch_all(&mut *conn)
        .await?;

    let builders: Vec<i64> =
        sqlx::query_scalar("SELECT player_id FROM claimbuild_builders WHERE claimbuild_id = $1")
            .bind(row.id)
            .fetch_all(&mut *conn)
            .await?;

    let sites: Vec<ProductionSiteRow> = sqlx::query_as(
        "SELECT site_type, resource, count FROM production_sites \
         WHERE claimbuild_id = $1 ORDER BY position",
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;
    let production_sites = sites
        .into_iter()
        .map(|s| {
            Ok(ProductionSite {
                site_type: s.site_type,
                resource: s.resource,
                count: to_u32(s.count, "count")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let special_buildings = row
        .special_buildings
        .iter()
        .map(|s| parse_text::<SpecialBuilding>(s))
        .collect::<Result<Vec<_>>>()?;

    ClaimBuild::from_parts(ClaimBuildParts {
        identity: Identity::persisted(from_db_id(row.id), row.version),
        name: row.name,
        region_id: from_db_id(row.region_id),
        claim_build_type: parse_text::<ClaimBuildType>(&row.claim_build_type)?,
        owned_by: from_db_id(row.owned_by),
        coordinates: Coordinate {
            x: row.x,
            y: row.y,
            z: row.z,
        },
        stationed_armies: stationed.into_iter().map(from_db_id).collect(),
        created_armies,
        production_sites,
        special_buildings,
        traders: row.traders,
        siege: row.siege,
        number_of_houses: row.number_of_houses,
        built_by: builders.into_iter().map(from_db_id).collect(),
        free_armies_remaining: to_u32(row.free_armies_remaining, "free_armies_remaining")?,
        free_trading_companies_remaining: to_u32(
            row.free_trading_companies_remaining,
            "free_trading_companies_remaining",
        )?,
    })
}

async fn fetch_faction(conn: &mut PgConnection, id: u64) -> Result<Faction> {
    let row: FactionRow = sqlx::query_as(concat!("SELECT ", faction_columns!(), " FROM factions WHERE id = $1"))
        .bind(db_id(id))
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(DomainError::NotFound {
            kind: EntityKind::Faction,
            id,
        })?;

    let regions: Vec<i64> =
        sqlx::query_scalar("SELECT region_id FROM faction_regions WHERE faction_id = $1")
            .bind(row.id)
            .fetch_all(&mut *conn)
            .await?;
    let allies: Vec<i64> =
        sqlx::query_scalar("SELECT ally_faction_id FROM faction_allies WHERE faction_id = $1")
            .bind(row.id)
            .fetch_all(&mut *conn)
            .await?;

    Faction::from_parts(FactionParts {
        identity: Identity::persisted(from_db_id(row.id), row.version),
        name: row.name,
        leader_id: row.leader_id.map(from_db_id),
        region_ids: regions.into_iter().map(from_db_id).collect::<BTreeSet<_>>(),
        ally_ids: allies.into_iter().map(from_db_id).collect::<BTreeSet<_>>(),
        colorcode: row.colorcode,
        role_id: from_db_id(row.role_id),
        home_region_id: row.home_region_id.map(from_db_id),
        buff_description: row.buff_description,
        food_stockpile: row.food_stockpile,
        aliases: row.aliases,
    })
}

impl Store for PgUnitOfWork {
    async fn load_army(&mut self, id: u64) -> Result<Army> {
        fetch_army(&mut self.tx, id).await
    }

    async fn save_army(&mut self, army: &mut Army) -> Result<()> {
        let conn: &mut PgConnection = &mut self.tx;
        let healing = army.healing().copied();
        let hours_healed = healing.map(|h| to_i32(h.hours_healed, "hours_healed")).transpose()?;
        let hours_left = healing.map(|h| to_i32(h.hours_left, "hours_left_healing")).transpose()?;
        let sieges: Vec<String> = army.sieges().iter().cloned().collect();

        let army_id = if army.identity().is_transient() {
            sqlx::query_scalar::<_, i64>(
                "INSERT INTO armies (name, army_type, faction_id, current_region_id, bound_to, sieges, \
                 stationed_at, free_tokens, is_healing, heal_start, heal_end, hours_healed, \
                 hours_left_healing, heal_last_updated_at, origin_claim_build_id, created_at, is_paid) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
                 RETURNING id",
            )
            .bind(army.name())
            .bind(army.army_type().as_str())
            .bind(db_id(army.faction_id()))
            .bind(db_id(army.current_region_id()))
            .bind(opt_db_id(army.bound_to()))
            .bind(&sieges[..])
            .bind(opt_db_id(army.stationed_at()))
            .bind(army.free_tokens())
            .bind(healing.is_some())
            .bind(healing.map(|h| h.start))
            .bind(healing.map(|h| h.end))
            .bind(hours_healed)
            .bind(hours_left)
            .bind(healing.map(|h| h.last_updated_at))
            .bind(opt_db_id(army.origin_claim_build_id()))
            .bind(army.created_at())
            .bind(army.is_paid())
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| constraint_error(EntityKind::Army, e))?
        } else {
            let result = sqlx::query(
                "UPDATE armies SET name = $3, army_type = $4, faction_id = $5, current_region_id = $6, \
                 bound_to = $7, sieges = $8, stationed_at = $9, free_tokens = $10, is_healing = $11, \
                 heal_start = $12, heal_end = $13, hours_healed = $14, hours_left_healing = $15, \
                 heal_last_updated_at = $16, origin_claim_build_id = $17, is_paid = $18, \
                 version = version + 1 \
                 WHERE id = $1 AND version = $2",
            )
            .bind(db_id(army.id()))
            .bind(army.identity().version())
            .bind(army.name())
            .bind(army.army_type().as_str())
            .bind(db_id(army.faction_id()))
            .bind(db_id(army.current_region_id()))
            .bind(opt_db_id(army.bound_to()))
            .bind(&sieges[..])
            .bind(opt_db_id(army.stationed_at()))
            .bind(army.free_tokens())
            .bind(healing.is_some())
            .bind(healing.map(|h| h.start))
            .bind(healing.map(|h| h.end))
            .bind(hours_healed)
            .bind(hours_left)
            .bind(healing.map(|h| h.last_updated_at))
            .bind(opt_db_id(army.origin_claim_build_id()))
            .bind(army.is_paid())
            .execute(&mut *conn)
            .await
            .map_err(|e| constraint_error(EntityKind::Army, e))?;
            check_updated(result, EntityKind::Army, army.identity())?;
            db_id(army.id())
        };

        let unit_ids = write_units(conn, army_id, army.units()).await?;
        let movement_ids = write_movements(conn, army_id, army.movements()).await?;

        if army.identity().is_transient() {
            army.identity_mut().assign(from_db_id(army_id));
        } else {
            army.identity_mut().bump_version();
        }
        army.assign_child_ids(&unit_ids, &movement_ids);
        debug!(army = %army.name(), id = army.id(), version = army.identity().version(), "saved army");
        Ok(())
    }

    async fn delete_army(&mut self, id: u64) -> Result<()> {
        let result = sqlx::query("DELETE FROM armies WHERE id = $1")
            .bind(db_id(id))
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound {
                kind: EntityKind::Army,
                id,
            });
        }
        Ok(())
    }

    async fn healing_armies(&mut self) -> Result<Vec<Army>> {
        let conn: &mut PgConnection = &mut self.tx;
        let rows: Vec<ArmyRow> =
            sqlx::query_as(concat!("SELECT ", army_columns!(), " FROM armies WHERE is_healing ORDER BY id"))
                .fetch_all(&mut *conn)
                .await?;
        let mut armies = Vec::with_capacity(rows.len());
        for row in rows {
            armies.push(army_from_row(conn, row).await?);
        }
        Ok(armies)
    }

    async fn load_claim_build(&mut self, id: u64) -> Result<ClaimBuild> {
        fetch_claim_build(&mut self.tx, id).await
    }

    async fn save_claim_build(&mut self, claim_build: &mut ClaimBuild) -> Result<()> {
        let conn: &mut PgConnection = &mut self.tx;
        let special: Vec<String> = claim_build
            .special_buildings()
            .iter()
            .map(|b| b.as_str().to_string())
            .collect();
        let coords = claim_build.coordinates();
        let free_armies = to_i32(claim_build.free_armies_remaining(), "free_armies_remaining")?;
        let free_tcs = to_i32(
            claim_build.free_trading_companies_remaining(),
            "free_trading_companies_remaining",
        )?;

        let cb_id = if claim_build.identity().is_transient() {
            sqlx::query_scalar::<_, i64>(
                "INSERT INTO claimbuilds (name, region_id, claim_build_type, owned_by, x, y, z, \
                 special_buildings, traders, siege, number_of_houses, free_armies_remaining, \
                 free_trading_companies_remaining) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) RETURNING id",
            )
            .bind(claim_build.name())
            .bind(db_id(claim_build.region_id()))
            .bind(claim_build.claim_build_type().as_str())
            .bind(db_id(claim_build.owned_by()))
            .bind(coords.x)
            .bind(coords.y)
            .bind(coords.z)
            .bind(&special[..])
            .bind(claim_build.traders())
            .bind(claim_build.siege())
            .bind(claim_build.number_of_houses())
            .bind(free_armies)
            .bind(free_tcs)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| constraint_error(EntityKind::ClaimBuild, e))?
        } else {
            let result = sqlx::query(
                "UPDATE claimbuilds SET name = $3, region_id = $4, claim_build_type = $5, owned_by = $6, \
                 x = $7, y = $8, z = $9, special_buildings = $10, traders = $11, siege = $12, \
                 number_of_houses = $13, free_armies_remaining = $14, \
                 free_trading_companies_remaining = $15, version = version + 1 \
                 WHERE id = $1 AND version = $2",
            )
            .bind(db_id(claim_build.id()))
            .bind(claim_build.identity().version())
            .bind(claim_build.name())
            .bind(db_id(claim_build.region_id()))
            .bind(claim_build.claim_build_type().as_str())
            .bind(db_id(claim_build.owned_by()))
            .bind(coords.x)
            .bind(coords.y)
            .bind(coords.z)
            .bind(&special[..])
            .bind(claim_build.traders())
            .bind(claim_build.siege())
            .bind(claim_build.number_of_houses())
            .bind(free_armies)
            .bind(free_tcs)
            .execute(&mut *conn)
            .await
            .map_err(|e| constraint_error(EntityKind::ClaimBuild, e))?;
            check_updated(result, EntityKind::ClaimBuild, claim_build.identity())?;
            db_id(claim_build.id())
        };

        sqlx::query("DELETE FROM claimbuild_builders WHERE claimbuild_id = $1")
            .bind(cb_id)
            .execute(&mut *conn)
            .await?;
        let builders = ids_to_db(claim_build.built_by());
        sqlx::query(
            "INSERT INTO claimbuild_builders (claimbuild_id, player_id) SELECT $1, UNNEST($2::bigint[])",
        )
        .bind(cb_id)
        .bind(&builders[..])
        .execute(&mut *conn)
        .await
        .map_err(|e| constraint_error(EntityKind::ClaimBuild, e))?;

        sqlx::query("DELETE FROM production_sites WHERE claimbuild_id = $1")
            .bind(cb_id)
            .execute(&mut *conn)
            .await?;
        for (position, site) in claim_build.production_sites().iter().enumerate() {
            sqlx::query(
                "INSERT INTO production_sites (claimbuild_id, position, site_type, resource, count) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(cb_id)
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .bind(&site.site_type)
            .bind(&site.resource)
            .bind(to_i32(site.count, "count")?)
            .execute(&mut *conn)
            .await?;
        }

        if claim_build.identity().is_transient() {
            claim_build.identity_mut().assign(from_db_id(cb_id));
        } else {
            claim_build.identity_mut().bump_version();
        }
        debug!(claim_build = %claim_build.name(), id = claim_build.id(), "saved claimbuild");
        Ok(())
    }

    async fn load_faction(&mut self, id: u64) -> Result<Faction> {
        fetch_faction(&mut self.tx, id).await
    }

    async fn find_faction_by_name(&mut self, name: &str) -> Result<Option<Faction>> {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM factions WHERE name = $1")
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?;
        match id {
            Some(id) => Ok(Some(fetch_faction(&mut self.tx, from_db_id(id)).await?)),
            None => Ok(None),
        }
    }

    async fn save_faction(&mut self, faction: &mut Faction) -> Result<()> {
        let conn: &mut PgConnection = &mut self.tx;
        let role_id = db_id(faction.role_id());

        let faction_id = if faction.identity().is_transient() {
            sqlx::query_scalar::<_, i64>(
                "INSERT INTO factions (name, leader_id, colorcode, role_id, home_region_id, \
                 buff_description, food_stockpile, aliases) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
            )
            .bind(faction.name())
            .bind(opt_db_id(faction.leader_id()))
            .bind(faction.colorcode())
            .bind(role_id)
            .bind(opt_db_id(faction.home_region_id()))
            .bind(faction.buff_description())
            .bind(faction.food_stockpile())
            .bind(faction.aliases())
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| constraint_error(EntityKind::Faction, e))?
        } else {
            let result = sqlx::query(
                "UPDATE factions SET name = $3, leader_id = $4, colorcode = $5, role_id = $6, \
                 home_region_id = $7, buff_description = $8, food_stockpile = $9, aliases = $10, \
                 version = version + 1 \
                 WHERE id = $1 AND version = $2",
            )
            .bind(db_id(faction.id()))
            .bind(faction.identity().version())
            .bind(faction.name())
            .bind(opt_db_id(faction.leader_id()))
            .bind(faction.colorcode())
            .bind(role_id)
            .bind(opt_db_id(faction.home_region_id()))
            .bind(faction.buff_description())
            .bind(faction.food_stockpile())
            .bind(faction.aliases())
            .execute(&mut *conn)
            .await
            .map_err(|e| constraint_error(EntityKind::Faction, e))?;
            check_updated(result, EntityKind::Faction, faction.identity())?;
            db_id(faction.id())
        };

        let regions = ids_to_db(faction.region_ids());
        sqlx::query("DELETE FROM faction_regions WHERE faction_id = $1")
            .bind(faction_id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("INSERT INTO faction_regions (faction_id, region_id) SELECT $1, UNNEST($2::bigint[])")
            .bind(faction_id)
            .bind(&regions[..])
            .execute(&mut *conn)
            .await
            .map_err(|e| constraint_error(EntityKind::Faction, e))?;

        let allies = ids_to_db(faction.ally_ids());
        sqlx::query("DELETE FROM faction_allies WHERE faction_id = $1")
            .bind(faction_id)
            .execute(&mut *conn)
            .await?;
        sqlx::query(
            "INSERT INTO faction_allies (faction_id, ally_faction_id) SELECT $1, UNNEST($2::bigint[])",
        )
        .bind(faction_id)
        .bind(&allies[..])
        .execute(&mut *conn)
        .await
        .map_err(|e| constraint_error(EntityKind::Faction, e))?;

        if faction.identity().is_transient() {
            faction.identity_mut().assign(from_db_id(faction_id));
        } else {
            faction.identity_mut().bump_version();
        }
        debug!(faction = %faction.name(), id = faction.id(), "saved faction");
        Ok(())
    }

    async fn save_region(&mut self, region: &mut Region) -> Result<()> {
        let conn: &mut PgConnection = &mut self.tx;
        if region.identity.is_transient() {
            let id: i64 = sqlx::query_scalar("INSERT INTO regions (name) VALUES ($1) RETURNING id")
                .bind(&region.name)
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| constraint_error(EntityKind::Region, e))?;
            region.identity.assign(from_db_id(id));
        } else {
            let result = sqlx::query(
                "UPDATE regions SET name = $3, version = version + 1 WHERE id = $1 AND version = $2",
            )
            .bind(db_id(region.identity.id()))
            .bind(region.identity.version())
            .bind(&region.name)
            .execute(&mut *conn)
            .await?;
            check_updated(result, EntityKind::Region, &region.identity)?;
            region.identity.bump_version();
        }
        Ok(())
    }

    async fn save_player(&mut self, player: &mut Player) -> Result<()> {
        let conn: &mut PgConnection = &mut self.tx;
        if player.identity.is_transient() {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO players (ign, discord_id, faction_id) VALUES ($1, $2, $3) RETURNING id",
            )
            .bind(&player.ign)
            .bind(&player.discord_id)
            .bind(opt_db_id(player.faction_id))
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| constraint_error(EntityKind::Player, e))?;
            player.identity.assign(from_db_id(id));
        } else {
            let result = sqlx::query(
                "UPDATE players SET ign = $3, discord_id = $4, faction_id = $5, version = version + 1 \
                 WHERE id = $1 AND version = $2",
            )
            .bind(db_id(player.identity.id()))
            .bind(player.identity.version())
            .bind(&player.ign)
            .bind(&player.discord_id)
            .bind(opt_db_id(player.faction_id))
            .execute(&mut *conn)
            .await
            .map_err(|e| constraint_error(EntityKind::Player, e))?;
            check_updated(result, EntityKind::Player, &player.identity)?;
            player.identity.bump_version();
        }
        Ok(())
    }

    async fn save_rp_char(&mut self, rp_char: &mut RpChar) -> Result<()> {
        let conn: &mut PgConnection = &mut self.tx;
        if rp_char.identity.is_transient() {
            let id: i64 =
                sqlx::query_scalar("INSERT INTO rpchars (name, player_id) VALUES ($1, $2) RETURNING id")
                    .bind(&rp_char.name)
                    .bind(db_id(rp_char.player_id))
                    .fetch_one(&mut *conn)
                    .await
                    .map_err(|e| constraint_error(EntityKind::RpChar, e))?;
            rp_char.identity.assign(from_db_id(id));
        } else {
            let result = sqlx::query(
                "UPDATE rpchars SET name = $3, player_id = $4, version = version + 1 \
                 WHERE id = $1 AND version = $2",
            )
            .bind(db_id(rp_char.identity.id()))
            .bind(rp_char.identity.version())
            .bind(&rp_char.name)
            .bind(db_id(rp_char.player_id))
            .execute(&mut *conn)
            .await
            .map_err(|e| constraint_error(EntityKind::RpChar, e))?;
            check_updated(result, EntityKind::RpChar, &rp_char.identity)?;
            rp_char.identity.bump_version();
        }
        Ok(())
    }
}
