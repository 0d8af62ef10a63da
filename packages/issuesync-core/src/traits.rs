use std::collections::BTreeMap;

use crate::error::Result;
use crate::ids::{ClientVersion, EntityKind, MutationId, RowVersion, SyncOrder};
use crate::rows::{Comment, Description, EntityRow, Issue};
use crate::view::{ClientRecord, ClientViewRecord};

/// Transaction-scoped access to the versioned row store and the client view ledger.
///
/// Every method observes the same snapshot for the lifetime of the implementor; backends open
/// the transaction before handing out a ledger and commit only after the pull has been recorded.
/// Row-returning queries order their results by entity id.
pub trait ViewLedger {
    /// Current client version of the group, `0` for a group that never pushed.
    fn client_version(&mut self, client_group_id: &str) -> Result<ClientVersion>;

    fn client_view(
        &mut self,
        client_group_id: &str,
        order: SyncOrder,
    ) -> Result<Option<ClientViewRecord>>;

    /// Highest recorded sync order of the group, `0` when nothing was recorded.
    fn max_order(&mut self, client_group_id: &str) -> Result<SyncOrder>;

    /// Current rows whose ledger entry was recorded after `order`, minus `exclude`.
    fn find_fast_forward(
        &mut self,
        kind: EntityKind,
        client_group_id: &str,
        order: SyncOrder,
        exclude: &[String],
    ) -> Result<Vec<EntityRow>>;

    /// Current rows whose ledger entry carries a different version. Unbounded.
    fn find_updates(&mut self, kind: EntityKind, client_group_id: &str) -> Result<Vec<EntityRow>>;

    /// Ids with a ledger entry but no row, skipping deletes already recorded at or before
    /// `order`.
    fn find_deletes(
        &mut self,
        kind: EntityKind,
        client_group_id: &str,
        order: SyncOrder,
    ) -> Result<Vec<String>>;

    /// Rows whose `(id, version)` has no ledger entry at or before `order`, minus `exclude`,
    /// at most `limit` of them.
    fn find_creates(
        &mut self,
        kind: EntityKind,
        client_group_id: &str,
        order: SyncOrder,
        limit: usize,
        exclude: &[String],
    ) -> Result<Vec<EntityRow>>;

    /// Upserts `(version, order)` entries for rows sent in this pull.
    fn record_puts(
        &mut self,
        kind: EntityKind,
        client_group_id: &str,
        order: SyncOrder,
        rows: &[EntityRow],
    ) -> Result<()>;

    /// Upserts deleted-sentinel entries for ids sent as deletes in this pull.
    fn record_deletes(
        &mut self,
        kind: EntityKind,
        client_group_id: &str,
        order: SyncOrder,
        ids: &[String],
    ) -> Result<()>;

    /// Inserts a CVR row. An existing `(client group, order)` is an [`Error::Conflict`].
    ///
    /// [`Error::Conflict`]: crate::Error::Conflict
    fn put_client_view(&mut self, record: &ClientViewRecord) -> Result<()>;

    /// Last mutation id of every client in the group that pushed after `since`.
    fn last_mutation_ids(
        &mut self,
        client_group_id: &str,
        since: ClientVersion,
    ) -> Result<BTreeMap<String, MutationId>>;
}

/// Transaction-scoped writes honouring the row-write contract: every insert or update bumps the
/// row version, every delete is physical and cascades from issues to their dependents.
pub trait RowWriter {
    fn put_issue(&mut self, issue: &Issue) -> Result<RowVersion>;
    fn put_description(&mut self, description: &Description) -> Result<RowVersion>;
    fn put_comment(&mut self, comment: &Comment) -> Result<RowVersion>;

    /// Returns whether a row was removed.
    fn delete_entity(&mut self, kind: EntityKind, id: &str) -> Result<bool>;

    fn client(&mut self, client_id: &str) -> Result<Option<ClientRecord>>;

    /// Bumps the group's client version and stores `mutation_id` as the client's last one.
    fn advance_client(
        &mut self,
        client_group_id: &str,
        client_id: &str,
        mutation_id: MutationId,
    ) -> Result<ClientVersion>;
}
