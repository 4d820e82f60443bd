use thiserror::Error;

use crate::model::{ArmyType, EntityKind};

/// Every failure a domain operation or the store can report.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(
        "not enough food in stockpile of faction [{faction}]: stockpile [{stockpile}], requested [{requested}]"
    )]
    InsufficientResource {
        faction: String,
        stockpile: i64,
        requested: i64,
    },

    #[error(
        "claimbuild [{claim_build}] is at max {label} capacity ({max})",
        label = .army_type.label()
    )]
    CapacityExceeded {
        claim_build: String,
        army_type: ArmyType,
        max: u32,
    },

    /// A lifecycle transition was requested from a state that does not allow it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: u64 },

    /// Optimistic version check failed; the caller may reload and retry.
    #[error("stale {kind} {id}: version {version} was modified concurrently")]
    StaleVersion {
        kind: EntityKind,
        id: u64,
        version: i32,
    },

    #[error("{kind} violates unique constraint [{constraint}]")]
    Duplicate {
        kind: EntityKind,
        constraint: String,
    },

    #[error("unit catalog: {0}")]
    Catalog(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl DomainError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        DomainError::InvalidArgument(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        DomainError::InvalidState(msg.into())
    }

    /// True only for conflicts that a fresh load-and-retry can resolve.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::StaleVersion { .. })
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_resource_message_names_everything() {
        let err = DomainError::InsufficientResource {
            faction: "Gondor".to_string(),
            stockpile: 3,
            requested: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("Gondor"));
        assert!(msg.contains("[3]"));
        assert!(msg.contains("[10]"));
    }

    #[test]
    fn only_stale_version_is_retryable() {
        let stale = DomainError::StaleVersion {
            kind: EntityKind::Faction,
            id: 4,
            version: 2,
        };
        assert!(stale.is_retryable());
        assert!(!DomainError::invalid_argument("negative").is_retryable());
        assert!(
            !DomainError::NotFound {
                kind: EntityKind::Army,
                id: 1
            }
            .is_retryable()
        );
    }

    #[test]
    fn capacity_message_uses_army_type_label() {
        let err = DomainError::CapacityExceeded {
            claim_build: "Minas Tirith".to_string(),
            army_type: ArmyType::TradingCompany,
            max: 2,
        };
        assert_eq!(
            err.to_string(),
            "claimbuild [Minas Tirith] is at max trading company capacity (2)"
        );
    }
}
