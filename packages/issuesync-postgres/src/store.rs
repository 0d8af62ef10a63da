use std::cell::RefCell;
use std::rc::Rc;

use postgres::Client;

use issuesync_core::{
    apply_mutation, pull_in_tx, ClientViewEntry, ClientViewRecord, EntityKind, EntityRow, Mutation,
    MutationId, PullOptions, PullRequest, PullResponse, Result,
};

use crate::error::storage_err;
use crate::ledger::PgLedger;

/// Runs `f` inside one serializable transaction, committing only if it succeeds.
fn in_serializable_tx<T>(
    client: &Rc<RefCell<Client>>,
    f: &mut impl FnMut(&mut PgLedger) -> Result<T>,
) -> Result<T> {
    {
        let mut c = client.borrow_mut();
        c.batch_execute("BEGIN ISOLATION LEVEL SERIALIZABLE")
            .map_err(storage_err)?;
    }

    let mut ledger = PgLedger::new(client.clone());
    let res = f(&mut ledger);

    let mut c = client.borrow_mut();
    match res {
        Ok(v) => {
            // Serialization failures can surface at commit time.
            if let Err(e) = c.batch_execute("COMMIT") {
                let _ = c.batch_execute("ROLLBACK");
                return Err(storage_err(e));
            }
            Ok(v)
        }
        Err(e) => {
            let _ = c.batch_execute("ROLLBACK");
            Err(e)
        }
    }
}

/// Re-runs the whole transaction while it loses races, up to `max_attempts` times.
fn with_retries<T>(
    client: &Rc<RefCell<Client>>,
    max_attempts: u32,
    operation: &'static str,
    mut f: impl FnMut(&mut PgLedger) -> Result<T>,
) -> Result<T> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match in_serializable_tx(client, &mut f) {
            Err(e) if e.is_conflict() && attempt < max_attempts => {
                tracing::debug!(operation, attempt, error = %e, "transaction conflict; retrying");
                attempt += 1;
            }
            Err(e) if e.is_conflict() => {
                tracing::warn!(operation, attempts = attempt, error = %e, "giving up after repeated conflicts");
                return Err(e);
            }
            other => return other,
        }
    }
}

/// Serves one pull: computes the next page for the group, records it and returns it.
///
/// On error nothing is recorded and the client keeps its previous cookie.
pub fn pull(
    client: &Rc<RefCell<Client>>,
    request: &PullRequest,
    options: &PullOptions,
) -> Result<PullResponse> {
    with_retries(client, options.max_attempts, "pull", |ledger| {
        pull_in_tx(ledger, request, options)
    })
}

/// Applies one client mutation. Returns `false` when the mutation was already applied.
pub fn push(
    client: &Rc<RefCell<Client>>,
    client_group_id: &str,
    client_id: &str,
    mutation_id: MutationId,
    mutation: &Mutation,
    options: &PullOptions,
) -> Result<bool> {
    with_retries(client, options.max_attempts, "push", |ledger| {
        apply_mutation(ledger, client_group_id, client_id, mutation_id, mutation)
    })
}

/// Every row of `kind` ordered by id.
pub fn entity_rows(client: &Rc<RefCell<Client>>, kind: EntityKind) -> Result<Vec<EntityRow>> {
    PgLedger::new(client.clone()).rows(kind)
}

/// Ledger entries recorded for a client group, ordered by kind then entity id.
pub fn view_entries(
    client: &Rc<RefCell<Client>>,
    client_group_id: &str,
) -> Result<Vec<ClientViewEntry>> {
    PgLedger::new(client.clone()).entries(client_group_id)
}

/// CVRs recorded for a client group, oldest first.
pub fn client_views(
    client: &Rc<RefCell<Client>>,
    client_group_id: &str,
) -> Result<Vec<ClientViewRecord>> {
    PgLedger::new(client.clone()).client_views(client_group_id)
}
