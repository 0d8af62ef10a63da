use chrono::{DateTime, Utc};

use crate::ids::{ClientVersion, EntityKind, MutationId, RowVersion, SyncOrder};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Opaque-to-the-client position in a client group's view history.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Cookie {
    pub order: SyncOrder,
    pub client_version: ClientVersion,
}

/// CVR: the client version a client group had reached as of a sync order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientViewRecord {
    pub client_group_id: String,
    pub order: SyncOrder,
    pub client_version: ClientVersion,
}

/// CVE: the last version of one entity communicated to a client group.
///
/// `entity_version == None` records that the entity was communicated as deleted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientViewEntry {
    pub client_group_id: String,
    pub kind: EntityKind,
    pub entity_id: String,
    pub entity_version: Option<RowVersion>,
    pub order: SyncOrder,
}

impl ClientViewEntry {
    pub fn is_delete(&self) -> bool {
        self.entity_version.is_none()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientGroupRecord {
    pub id: String,
    pub client_version: ClientVersion,
    pub last_modified: DateTime<Utc>,
}

/// One replica (tab/worker) of a client group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientRecord {
    pub id: String,
    pub client_group_id: String,
    pub last_mutation_id: MutationId,
    /// Group client version at which `last_mutation_id` was accepted.
    pub client_version: ClientVersion,
    pub last_modified: DateTime<Utc>,
}
