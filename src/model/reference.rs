//! Static game-balance lookups consulted by the rule engines.
//!
//! Nothing here is mutated at runtime: the claim-build table is compiled in,
//! and the unit catalog is loaded once (built-in or from a JSON file) and then
//! shared read-only.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

pub const BUILTIN_UNIT_CATALOG: &str = include_str!("../../data/unit_types.json");

/// Claim-build tier. `Stronghold` is the top fortification tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimBuildType {
    Hamlet,
    Village,
    Town,
    Capital,
    Keep,
    Castle,
    Stronghold,
}

string_enum!(ClaimBuildType {
    Hamlet => "hamlet",
    Village => "village",
    Town => "town",
    Capital => "capital",
    Keep => "keep",
    Castle => "castle",
    Stronghold => "stronghold",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimBuildLimits {
    pub max_armies: u32,
    pub max_trading_companies: u32,
    pub free_armies: u32,
    pub free_trading_companies: u32,
}

impl ClaimBuildLimits {
    const fn new(
        max_armies: u32,
        max_trading_companies: u32,
        free_armies: u32,
        free_trading_companies: u32,
    ) -> Self {
        Self {
            max_armies,
            max_trading_companies,
            free_armies,
            free_trading_companies,
        }
    }
}

impl ClaimBuildType {
    pub fn limits(self) -> ClaimBuildLimits {
        match self {
            ClaimBuildType::Hamlet => ClaimBuildLimits::new(0, 0, 0, 0),
            ClaimBuildType::Village => ClaimBuildLimits::new(0, 1, 0, 1),
            ClaimBuildType::Town => ClaimBuildLimits::new(1, 2, 1, 1),
            ClaimBuildType::Capital => ClaimBuildLimits::new(2, 3, 1, 2),
            ClaimBuildType::Keep => ClaimBuildLimits::new(1, 0, 1, 0),
            ClaimBuildType::Castle => ClaimBuildLimits::new(2, 0, 1, 0),
            ClaimBuildType::Stronghold => ClaimBuildLimits::new(3, 0, 2, 0),
        }
    }

    pub fn max_armies(self) -> u32 {
        self.limits().max_armies
    }

    pub fn max_trading_companies(self) -> u32 {
        self.limits().max_trading_companies
    }

    pub fn free_armies(self) -> u32 {
        self.limits().free_armies
    }

    pub fn free_trading_companies(self) -> u32 {
        self.limits().free_trading_companies
    }

    /// Armies stationed here heal at half duration on a 12-hour cadence.
    pub fn is_top_fortification(self) -> bool {
        self == ClaimBuildType::Stronghold
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitTypeEntry {
    pub name: String,
    pub token_cost: f64,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    unit_types: Vec<UnitTypeEntry>,
}

/// Unit type name → token cost.
#[derive(Debug, Clone, Default)]
pub struct UnitCatalog {
    costs: BTreeMap<String, f64>,
}

impl UnitCatalog {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            Self::from_json_str(BUILTIN_UNIT_CATALOG)
                .expect("builtin unit catalog should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: CatalogFile =
            serde_json::from_str(json).map_err(|e| DomainError::Catalog(e.to_string()))?;
        Self::from_entries(file.unit_types)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| DomainError::Catalog(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&contents)
    }

    pub fn from_entries(entries: impl IntoIterator<Item = UnitTypeEntry>) -> Result<Self> {
        let mut costs = BTreeMap::new();
        for entry in entries {
            if !(entry.token_cost.is_finite() && entry.token_cost >= 0.0) {
                return Err(DomainError::Catalog(format!(
                    "unit type [{}] has invalid token cost {}",
                    entry.name, entry.token_cost
                )));
            }
            if costs.insert(entry.name.clone(), entry.token_cost).is_some() {
                return Err(DomainError::Catalog(format!(
                    "duplicate unit type [{}]",
                    entry.name
                )));
            }
        }
        Ok(Self { costs })
    }

    pub fn token_cost(&self, unit_type: &str) -> Result<f64> {
        self.costs.get(unit_type).copied().ok_or_else(|| {
            DomainError::invalid_argument(format!("unknown unit type [{unit_type}]"))
        })
    }

    pub fn len(&self) -> usize {
        self.costs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }
}
