//! Per-kind diff queries composed across every replicated table.
//!
//! Each helper visits the kinds in [`EntityKind::ALL`] order and fails as a whole if any kind
//! fails: a pull missing one table is indistinguishable from data loss for the client.

use crate::error::{Error, Result};
use crate::ids::{ByKind, EntityKind, SyncOrder};
use crate::rows::EntityRow;
use crate::traits::ViewLedger;

/// Ids to delete on the client, per kind.
pub type Deletes = ByKind<Vec<String>>;

/// Rows to put on the client, per kind.
pub type Puts = ByKind<Vec<EntityRow>>;

/// Every row the client group holds at a stale version. Never truncated, so a multi-row
/// mutation always reaches the client as a whole.
pub fn find_all_updates<L: ViewLedger + ?Sized>(
    ledger: &mut L,
    client_group_id: &str,
) -> Result<Puts> {
    ByKind::try_from_fn(|kind| {
        let rows = ledger.find_updates(kind, client_group_id)?;
        check_kind(kind, rows)
    })
}

pub fn find_all_deletes<L: ViewLedger + ?Sized>(
    ledger: &mut L,
    client_group_id: &str,
    order: SyncOrder,
) -> Result<Deletes> {
    ByKind::try_from_fn(|kind| ledger.find_deletes(kind, client_group_id, order))
}

/// Rows another replica of the same group already received after `order`.
///
/// Ids already present in `deletes` or `updates` are skipped so nothing is delivered twice.
pub fn fast_forward<L: ViewLedger + ?Sized>(
    ledger: &mut L,
    client_group_id: &str,
    order: SyncOrder,
    deletes: &Deletes,
    updates: &Puts,
) -> Result<Puts> {
    ByKind::try_from_fn(|kind| {
        let exclude = exclusion_list(deletes.get(kind), [updates.get(kind)]);
        let rows = ledger.find_fast_forward(kind, client_group_id, order, &exclude)?;
        check_kind(kind, rows)
    })
}

pub(crate) fn exclusion_list<'a>(
    ids: &[String],
    rows: impl IntoIterator<Item = &'a Vec<EntityRow>>,
) -> Vec<String> {
    let mut out: Vec<String> = ids.to_vec();
    for group in rows {
        out.extend(group.iter().map(|row| row.id().to_string()));
    }
    out
}

/// Rejects rows that a backend returned for the wrong table.
pub(crate) fn check_kind(kind: EntityKind, rows: Vec<EntityRow>) -> Result<Vec<EntityRow>> {
    if let Some(row) = rows.iter().find(|row| row.kind() != kind) {
        return Err(Error::InconsistentState(format!(
            "{} row {} returned for {kind} query",
            row.kind(),
            row.id()
        )));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::{Description, Issue};

    fn issue(id: &str) -> EntityRow {
        EntityRow::Issue(Issue {
            id: id.into(),
            title: String::new(),
            priority: None,
            status: None,
            modified: 0,
            created: 0,
            creator: "u".into(),
            kanban_order: None,
            version: 1,
        })
    }

    #[test]
    fn check_kind_rejects_foreign_rows() {
        let rows = vec![
            issue("a"),
            EntityRow::Description(Description {
                id: "a".into(),
                body: String::new(),
                version: 1,
            }),
        ];
        let err = check_kind(EntityKind::Issue, rows).unwrap_err();
        assert!(matches!(err, Error::InconsistentState(_)));
    }

    #[test]
    fn exclusion_list_concatenates_deletes_and_row_ids() {
        let updates = vec![issue("b"), issue("c")];
        let out = exclusion_list(&["a".to_string()], [&updates]);
        assert_eq!(out, vec!["a", "b", "c"]);
    }
}
