use std::fmt;

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-row counter bumped on every write to that row.
pub type RowVersion = u64;

/// Per-client-group generation number assigned to each recorded pull.
pub type SyncOrder = u64;

/// Per-client-group counter bumped by every accepted mutation.
pub type ClientVersion = u64;

/// Per-client sequence number of a pushed mutation, starting at 1.
pub type MutationId = u64;

/// The entity tables that are replicated to clients.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum EntityKind {
    Issue,
    Description,
    Comment,
}

impl EntityKind {
    /// Page-fill priority order: owners before the rows that depend on them.
    pub const ALL: [EntityKind; 3] = [EntityKind::Issue, EntityKind::Description, EntityKind::Comment];

    /// Stable ordinal persisted in the client view entry table.
    pub const fn ordinal(self) -> i16 {
        match self {
            EntityKind::Issue => 1,
            EntityKind::Description => 2,
            EntityKind::Comment => 3,
        }
    }

    pub fn from_ordinal(ordinal: i16) -> Result<Self> {
        match ordinal {
            1 => Ok(EntityKind::Issue),
            2 => Ok(EntityKind::Description),
            3 => Ok(EntityKind::Comment),
            other => Err(Error::InconsistentState(format!(
                "unknown entity kind ordinal {other}"
            ))),
        }
    }

    pub const fn table(self) -> &'static str {
        match self {
            EntityKind::Issue => "issue",
            EntityKind::Description => "description",
            EntityKind::Comment => "comment",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// One value per entity kind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ByKind<T> {
    pub issues: T,
    pub descriptions: T,
    pub comments: T,
}

impl<T> ByKind<T> {
    /// Builds a value per kind, visiting kinds in [`EntityKind::ALL`] order and stopping at the
    /// first error so that no kind is ever silently dropped.
    pub fn try_from_fn(mut f: impl FnMut(EntityKind) -> Result<T>) -> Result<Self> {
        Ok(Self {
            issues: f(EntityKind::Issue)?,
            descriptions: f(EntityKind::Description)?,
            comments: f(EntityKind::Comment)?,
        })
    }

    pub fn get(&self, kind: EntityKind) -> &T {
        match kind {
            EntityKind::Issue => &self.issues,
            EntityKind::Description => &self.descriptions,
            EntityKind::Comment => &self.comments,
        }
    }

    pub fn get_mut(&mut self, kind: EntityKind) -> &mut T {
        match kind {
            EntityKind::Issue => &mut self.issues,
            EntityKind::Description => &mut self.descriptions,
            EntityKind::Comment => &mut self.comments,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityKind, &T)> {
        EntityKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }
}

impl<T> ByKind<Vec<T>> {
    /// Total number of items across all kinds.
    pub fn len(&self) -> usize {
        self.issues.len() + self.descriptions.len() + self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_round_trip_and_reject_unknown() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_ordinal(kind.ordinal()).unwrap(), kind);
        }
        let err = EntityKind::from_ordinal(9).unwrap_err();
        assert!(matches!(err, Error::InconsistentState(_)));
    }

    #[test]
    fn try_from_fn_stops_at_first_failing_kind() {
        let mut visited = Vec::new();
        let res: Result<ByKind<u8>> = ByKind::try_from_fn(|kind| {
            visited.push(kind);
            if kind == EntityKind::Description {
                return Err(Error::Storage("boom".into()));
            }
            Ok(0)
        });
        assert!(res.is_err());
        assert_eq!(visited, vec![EntityKind::Issue, EntityKind::Description]);
    }
}
