pub mod config;
pub mod db;
pub mod error;
pub mod id;
pub mod model;
pub mod scheduler;
pub mod service;

pub use config::AppConfig;
pub use error::{DomainError, Result};
pub use id::IdSequences;
pub use model::{
    Army, ArmyType, ClaimBuild, ClaimBuildType, DomainEntity, EntityKind, Faction, Identity,
    UnitCatalog,
};
