use serde::{Deserialize, Serialize};

/// The persisted entity types, used to label errors and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Army,
    Unit,
    Movement,
    ClaimBuild,
    Faction,
    Region,
    Player,
    RpChar,
}

string_enum!(EntityKind {
    Army => "army",
    Unit => "unit",
    Movement => "movement",
    ClaimBuild => "claimbuild",
    Faction => "faction",
    Region => "region",
    Player => "player",
    RpChar => "rpchar",
});

/// Surrogate id plus optimistic version counter, embedded in every entity.
///
/// `id == 0` marks an entity that has never been saved. Only the store
/// assigns ids and bumps versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Identity {
    id: u64,
    version: i32,
}

impl Identity {
    pub const fn transient() -> Self {
        Self { id: 0, version: 0 }
    }

    /// Identity of a row loaded from the store.
    pub const fn persisted(id: u64, version: i32) -> Self {
        Self { id, version }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn is_transient(&self) -> bool {
        self.id == 0
    }

    pub(crate) fn assign(&mut self, id: u64) {
        debug_assert!(self.is_transient(), "id already assigned: {}", self.id);
        self.id = id;
        self.version = 0;
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }
}

/// What two entities of the same type are compared by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqualityKey<'a> {
    Identity(u64),
    Natural(&'a str),
}

pub trait DomainEntity {
    const KIND: EntityKind;

    fn identity(&self) -> &Identity;

    fn identity_mut(&mut self) -> &mut Identity;

    /// Identity-based by default; entities with a natural key override this.
    fn equality_key(&self) -> EqualityKey<'_> {
        EqualityKey::Identity(self.identity().id())
    }

    fn id(&self) -> u64 {
        self.identity().id()
    }
}

/// Entity equality: the same reference, the same natural key, or the same
/// assigned id. Two distinct transient entities are never equal by identity.
pub fn same_entity<T: DomainEntity>(a: &T, b: &T) -> bool {
    if std::ptr::eq(a, b) {
        return true;
    }
    match (a.equality_key(), b.equality_key()) {
        (EqualityKey::Natural(x), EqualityKey::Natural(y)) => x == y,
        (EqualityKey::Identity(x), EqualityKey::Identity(y)) => x != 0 && x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain(Identity);

    impl DomainEntity for Plain {
        const KIND: EntityKind = EntityKind::Region;

        fn identity(&self) -> &Identity {
            &self.0
        }

        fn identity_mut(&mut self) -> &mut Identity {
            &mut self.0
        }
    }

    struct Named(Identity, String);

    impl DomainEntity for Named {
        const KIND: EntityKind = EntityKind::Faction;

        fn identity(&self) -> &Identity {
            &self.0
        }

        fn identity_mut(&mut self) -> &mut Identity {
            &mut self.0
        }

        fn equality_key(&self) -> EqualityKey<'_> {
            EqualityKey::Natural(&self.1)
        }
    }

    #[test]
    fn identity_equality_by_assigned_id() {
        let a = Plain(Identity::persisted(7, 0));
        let b = Plain(Identity::persisted(7, 3));
        let c = Plain(Identity::persisted(8, 0));
        assert!(same_entity(&a, &b));
        assert!(!same_entity(&a, &c));
    }

    #[test]
    fn transient_entities_only_equal_themselves() {
        let a = Plain(Identity::transient());
        let b = Plain(Identity::transient());
        assert!(same_entity(&a, &a));
        assert!(!same_entity(&a, &b));
    }

    #[test]
    fn natural_key_ignores_ids() {
        let a = Named(Identity::persisted(1, 0), "Mordor".to_string());
        let b = Named(Identity::transient(), "Mordor".to_string());
        let c = Named(Identity::persisted(1, 0), "Rohan".to_string());
        assert!(same_entity(&a, &b));
        assert!(!same_entity(&a, &c));
    }

    #[test]
    fn assign_then_bump() {
        let mut identity = Identity::transient();
        assert!(identity.is_transient());
        identity.assign(12);
        identity.bump_version();
        assert_eq!(identity.id(), 12);
        assert_eq!(identity.version(), 1);
        assert!(!identity.is_transient());
    }

    #[test]
    fn kind_labels() {
        assert_eq!(EntityKind::ClaimBuild.to_string(), "claimbuild");
        assert_eq!(EntityKind::RpChar.as_str(), "rpchar");
    }
}
