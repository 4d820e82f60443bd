use std::collections::HashMap;

use crate::model::EntityKind;

/// One monotonic id sequence per entity kind, the in-process counterpart of
/// a `BIGSERIAL` column per table. Every sequence starts at 1; 0 is the
/// transient id.
#[derive(Debug, Default)]
pub struct IdSequences {
    issued: HashMap<EntityKind, u64>,
}

impl IdSequences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self, kind: EntityKind) -> u64 {
        let last = self.issued.entry(kind).or_insert(0);
        *last += 1;
        *last
    }

    /// The most recent id handed out for `kind`, if any.
    pub fn last_issued(&self, kind: EntityKind) -> Option<u64> {
        self.issued.get(&kind).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_are_independent() {
        let mut ids = IdSequences::new();
        assert_eq!(ids.next_id(EntityKind::Army), 1);
        assert_eq!(ids.next_id(EntityKind::Army), 2);
        assert_eq!(ids.next_id(EntityKind::Faction), 1);
        assert_eq!(ids.last_issued(EntityKind::Army), Some(2));
        assert_eq!(ids.last_issued(EntityKind::Unit), None);
    }
}
