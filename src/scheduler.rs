use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::db::Store;
use crate::error::Result;
use crate::model::{DomainEntity, HealTick};

/// Outcome of one pass over the healing armies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealingTickReport {
    pub progressed: Vec<u64>,
    pub completed: Vec<u64>,
    /// Armies whose save lost a version race; they are picked up next tick.
    pub conflicts: Vec<u64>,
}

impl HealingTickReport {
    pub fn touched(&self) -> usize {
        self.progressed.len() + self.completed.len()
    }
}

/// Advance every healing army to `now` and save it.
///
/// Armies with less than a whole hour elapsed are left untouched. A stale
/// save is logged and skipped; any other error aborts the tick.
pub async fn run_healing_tick<S: Store>(store: &mut S, now: DateTime<Utc>) -> Result<HealingTickReport> {
    let mut report = HealingTickReport::default();
    for mut army in store.healing_armies().await? {
        let tick = army.advance_healing(now)?;
        if matches!(tick, HealTick::Progressed { hours: 0, .. }) {
            continue;
        }
        match store.save_army(&mut army).await {
            Ok(()) => {}
            Err(err) if err.is_retryable() => {
                warn!(army = %army.name(), error = %err, "healing tick conflict");
                report.conflicts.push(army.id());
                continue;
            }
            Err(err) => return Err(err),
        }
        match tick {
            HealTick::Progressed { hours, hours_left } => {
                debug!(army = %army.name(), hours, hours_left, "healing advanced");
                report.progressed.push(army.id());
            }
            HealTick::Completed => report.completed.push(army.id()),
        }
    }
    info!(
        progressed = report.progressed.len(),
        completed = report.completed.len(),
        conflicts = report.conflicts.len(),
        "healing tick finished"
    );
    Ok(report)
}
