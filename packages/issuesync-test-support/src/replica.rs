use std::collections::BTreeMap;

use issuesync_core::{
    is_page_empty, Cookie, EntityKind, EntityRow, Error, Mutation, MutationId, PullRequest,
    PullResponse, Result,
};

use crate::SyncBackend;

/// Rows keyed by kind and id, the shape both a replica and the store are compared in.
pub type RowSet = BTreeMap<(EntityKind, String), EntityRow>;

/// Upper bound on pulls in [`Replica::pull_until_empty`]; hitting it means the protocol failed
/// to converge.
const MAX_PULLS: usize = 10_000;

pub fn row_set(rows: impl IntoIterator<Item = EntityRow>) -> RowSet {
    rows.into_iter()
        .map(|row| ((row.kind(), row.id().to_string()), row))
        .collect()
}

/// Minimal client replica: a local cache of rows plus the cookie it was last synced to.
#[derive(Clone, Debug)]
pub struct Replica {
    pub client_group_id: String,
    pub client_id: String,
    pub cookie: Option<Cookie>,
    pub rows: RowSet,
    pub last_mutation_id: MutationId,
}

impl Replica {
    pub fn new(client_group_id: &str, client_id: &str) -> Self {
        Self {
            client_group_id: client_group_id.to_string(),
            client_id: client_id.to_string(),
            cookie: None,
            rows: BTreeMap::new(),
            last_mutation_id: 0,
        }
    }

    /// Pushes `mutation` as this replica's next mutation.
    pub fn mutate<B: SyncBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        mutation: Mutation,
    ) -> Result<bool> {
        self.last_mutation_id += 1;
        backend.push(
            &self.client_group_id,
            &self.client_id,
            self.last_mutation_id,
            &mutation,
        )
    }

    /// Pulls and applies one page.
    pub fn pull<B: SyncBackend + ?Sized>(&mut self, backend: &mut B) -> Result<PullResponse> {
        let response = backend.pull(&PullRequest::new(&self.client_group_id, self.cookie))?;
        self.apply(&response);
        Ok(response)
    }

    /// Pulls until a page comes back empty and returns every response in order.
    pub fn pull_until_empty<B: SyncBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Result<Vec<PullResponse>> {
        let mut responses = Vec::new();
        for _ in 0..MAX_PULLS {
            let response = self.pull(backend)?;
            let done = is_page_empty(&response.page);
            responses.push(response);
            if done {
                return Ok(responses);
            }
        }
        Err(Error::InconsistentState(format!(
            "replica {} did not converge after {MAX_PULLS} pulls",
            self.client_id
        )))
    }

    pub fn apply(&mut self, response: &PullResponse) {
        let page = &response.page;
        for kind in EntityKind::ALL {
            for id in page.deletes(kind) {
                self.rows.remove(&(kind, id.clone()));
            }
        }
        let puts = page
            .issues
            .iter()
            .cloned()
            .map(EntityRow::Issue)
            .chain(page.descriptions.iter().cloned().map(EntityRow::Description))
            .chain(page.comments.iter().cloned().map(EntityRow::Comment));
        for row in puts {
            self.rows.insert((row.kind(), row.id().to_string()), row);
        }
        self.cookie = Some(response.cookie);
    }
}
