//! Shared fixtures, a client replica model and conformance scenarios that every issuesync
//! backend must pass.

pub mod conformance;
pub mod fixtures;
pub mod replica;

use issuesync_core::{
    EntityKind, EntityRow, MemoryStore, Mutation, MutationId, PullOptions, PullRequest,
    PullResponse, Result,
};

pub use replica::{row_set, Replica, RowSet};

/// A complete backend as seen from the transport layer: push, pull and a view of the
/// authoritative rows for assertions.
pub trait SyncBackend {
    fn push(
        &mut self,
        client_group_id: &str,
        client_id: &str,
        mutation_id: MutationId,
        mutation: &Mutation,
    ) -> Result<bool>;

    fn pull(&mut self, request: &PullRequest) -> Result<PullResponse>;

    /// Every row currently in the store.
    fn rows(&mut self) -> Result<Vec<EntityRow>>;

    fn set_page_size(&mut self, page_size: usize);
}

#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    pub store: MemoryStore,
    pub options: PullOptions,
}

impl SyncBackend for MemoryBackend {
    fn push(
        &mut self,
        client_group_id: &str,
        client_id: &str,
        mutation_id: MutationId,
        mutation: &Mutation,
    ) -> Result<bool> {
        self.store
            .push(client_group_id, client_id, mutation_id, mutation)
    }

    fn pull(&mut self, request: &PullRequest) -> Result<PullResponse> {
        self.store.pull(request, &self.options)
    }

    fn rows(&mut self) -> Result<Vec<EntityRow>> {
        Ok(EntityKind::ALL
            .into_iter()
            .flat_map(|kind| self.store.rows(kind))
            .collect())
    }

    fn set_page_size(&mut self, page_size: usize) {
        self.options.page_size = page_size;
    }
}
