use crate::diff::{Deletes, Puts};
use crate::error::Result;
use crate::ids::{ClientVersion, EntityKind, SyncOrder};
use crate::traits::ViewLedger;
use crate::view::ClientViewRecord;

/// Persists a computed diff as generation `order` of the client group's view.
///
/// Must run on the same ledger (and so the same transaction) that computed `puts` and `deletes`;
/// a write landing in between would otherwise be missed by both the page and the ledger.
pub fn record_diff<L: ViewLedger + ?Sized>(
    ledger: &mut L,
    client_group_id: &str,
    order: SyncOrder,
    client_version: ClientVersion,
    puts: &Puts,
    deletes: &Deletes,
) -> Result<()> {
    ledger.put_client_view(&ClientViewRecord {
        client_group_id: client_group_id.to_string(),
        order,
        client_version,
    })?;
    for kind in EntityKind::ALL {
        let rows = puts.get(kind);
        if !rows.is_empty() {
            ledger.record_puts(kind, client_group_id, order, rows)?;
        }
        let ids = deletes.get(kind);
        if !ids.is_empty() {
            ledger.record_deletes(kind, client_group_id, order, ids)?;
        }
    }
    Ok(())
}
