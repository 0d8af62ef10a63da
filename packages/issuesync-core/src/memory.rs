//! In-memory backend for tests, benchmarks and embedding.
//!
//! Transactions are snapshots: an operation runs against a clone of the store and replaces it
//! only on success, so a failed pull or push leaves nothing behind.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;

use crate::error::{Error, Result};
use crate::ids::{ClientVersion, EntityKind, MutationId, RowVersion, SyncOrder};
use crate::mutation::{apply_mutation, Mutation};
use crate::pull::{pull_in_tx, PullOptions, PullRequest, PullResponse};
use crate::rows::{Comment, Description, EntityRow, Issue};
use crate::traits::{RowWriter, ViewLedger};
use crate::view::{ClientGroupRecord, ClientRecord, ClientViewEntry, ClientViewRecord};

type EntryKey = (String, EntityKind, String);

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    issues: BTreeMap<String, Issue>,
    descriptions: BTreeMap<String, Description>,
    comments: BTreeMap<String, Comment>,
    client_groups: BTreeMap<String, ClientGroupRecord>,
    clients: BTreeMap<String, ClientRecord>,
    views: BTreeMap<(String, SyncOrder), ClientVersion>,
    entries: BTreeMap<EntryKey, ClientViewEntry>,
    /// Last version of every deleted row, so a re-created id continues above it.
    retired: BTreeMap<(EntityKind, String), RowVersion>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` against a snapshot and keeps its writes only if it succeeds.
    pub fn transact<T>(&mut self, f: impl FnOnce(&mut MemoryStore) -> Result<T>) -> Result<T> {
        let mut staged = self.clone();
        let out = f(&mut staged)?;
        *self = staged;
        Ok(out)
    }

    pub fn pull(&mut self, request: &PullRequest, options: &PullOptions) -> Result<PullResponse> {
        self.transact(|tx| pull_in_tx(tx, request, options))
    }

    pub fn push(
        &mut self,
        client_group_id: &str,
        client_id: &str,
        mutation_id: MutationId,
        mutation: &Mutation,
    ) -> Result<bool> {
        self.transact(|tx| apply_mutation(tx, client_group_id, client_id, mutation_id, mutation))
    }

    pub fn row(&self, kind: EntityKind, id: &str) -> Option<EntityRow> {
        match kind {
            EntityKind::Issue => self.issues.get(id).cloned().map(EntityRow::Issue),
            EntityKind::Description => {
                self.descriptions.get(id).cloned().map(EntityRow::Description)
            }
            EntityKind::Comment => self.comments.get(id).cloned().map(EntityRow::Comment),
        }
    }

    /// All rows of one kind ordered by id.
    pub fn rows(&self, kind: EntityKind) -> Vec<EntityRow> {
        match kind {
            EntityKind::Issue => self.issues.values().cloned().map(EntityRow::Issue).collect(),
            EntityKind::Description => self
                .descriptions
                .values()
                .cloned()
                .map(EntityRow::Description)
                .collect(),
            EntityKind::Comment => {
                self.comments.values().cloned().map(EntityRow::Comment).collect()
            }
        }
    }

    /// Ledger entries of one client group ordered by kind, then id.
    pub fn entries(&self, client_group_id: &str) -> Vec<ClientViewEntry> {
        EntityKind::ALL
            .into_iter()
            .flat_map(|kind| self.entries_for(kind, client_group_id).cloned().collect::<Vec<_>>())
            .collect()
    }

    pub fn client_views(&self, client_group_id: &str) -> Vec<ClientViewRecord> {
        self.views_for(client_group_id)
            .map(|(&(_, order), &client_version)| ClientViewRecord {
                client_group_id: client_group_id.to_string(),
                order,
                client_version,
            })
            .collect()
    }

    pub fn client_group(&self, client_group_id: &str) -> Option<&ClientGroupRecord> {
        self.client_groups.get(client_group_id)
    }

    fn entries_for<'a>(
        &'a self,
        kind: EntityKind,
        client_group_id: &'a str,
    ) -> impl Iterator<Item = &'a ClientViewEntry> + 'a {
        let start = (client_group_id.to_string(), kind, String::new());
        self.entries
            .range(start..)
            .take_while(move |((cg, k, _), _)| cg == client_group_id && *k == kind)
            .map(|(_, entry)| entry)
    }

    fn views_for<'a>(
        &'a self,
        client_group_id: &'a str,
    ) -> impl DoubleEndedIterator<Item = (&'a (String, SyncOrder), &'a ClientVersion)> + 'a {
        let cg = client_group_id.to_string();
        self.views.range((cg.clone(), 0)..=(cg, SyncOrder::MAX))
    }

    fn exists(&self, kind: EntityKind, id: &str) -> bool {
        match kind {
            EntityKind::Issue => self.issues.contains_key(id),
            EntityKind::Description => self.descriptions.contains_key(id),
            EntityKind::Comment => self.comments.contains_key(id),
        }
    }

    fn upsert_entry(
        &mut self,
        kind: EntityKind,
        client_group_id: &str,
        entity_id: &str,
        entity_version: Option<RowVersion>,
        order: SyncOrder,
    ) {
        let key = (client_group_id.to_string(), kind, entity_id.to_string());
        self.entries.insert(
            key,
            ClientViewEntry {
                client_group_id: client_group_id.to_string(),
                kind,
                entity_id: entity_id.to_string(),
                entity_version,
                order,
            },
        );
    }

    fn require_issue(&self, issue_id: &str, what: &str) -> Result<()> {
        if self.issues.contains_key(issue_id) {
            return Ok(());
        }
        Err(Error::InvalidOperation(format!(
            "{what} references missing issue {issue_id}"
        )))
    }

    fn next_version(&self, kind: EntityKind, id: &str, live: Option<RowVersion>) -> RowVersion {
        let retired = self.retired.get(&(kind, id.to_string())).copied();
        live.max(retired).map_or(1, |v| v + 1)
    }

    fn retire(&mut self, kind: EntityKind, id: &str, version: RowVersion) {
        let slot = self.retired.entry((kind, id.to_string())).or_insert(0);
        *slot = (*slot).max(version);
    }
}

impl ViewLedger for MemoryStore {
    fn client_version(&mut self, client_group_id: &str) -> Result<ClientVersion> {
        Ok(self
            .client_groups
            .get(client_group_id)
            .map_or(0, |g| g.client_version))
    }

    fn client_view(
        &mut self,
        client_group_id: &str,
        order: SyncOrder,
    ) -> Result<Option<ClientViewRecord>> {
        Ok(self
            .views
            .get(&(client_group_id.to_string(), order))
            .map(|&client_version| ClientViewRecord {
                client_group_id: client_group_id.to_string(),
                order,
                client_version,
            }))
    }

    fn max_order(&mut self, client_group_id: &str) -> Result<SyncOrder> {
        Ok(self
            .views_for(client_group_id)
            .next_back()
            .map_or(0, |((_, order), _)| *order))
    }

    fn find_fast_forward(
        &mut self,
        kind: EntityKind,
        client_group_id: &str,
        order: SyncOrder,
        exclude: &[String],
    ) -> Result<Vec<EntityRow>> {
        let exclude: HashSet<&str> = exclude.iter().map(String::as_str).collect();
        Ok(self
            .entries_for(kind, client_group_id)
            .filter(|e| e.order > order && !exclude.contains(e.entity_id.as_str()))
            .filter_map(|e| self.row(kind, &e.entity_id))
            .collect())
    }

    fn find_updates(&mut self, kind: EntityKind, client_group_id: &str) -> Result<Vec<EntityRow>> {
        Ok(self
            .entries_for(kind, client_group_id)
            .filter_map(|e| {
                let row = self.row(kind, &e.entity_id)?;
                let recorded = e.entity_version?;
                (recorded != row.version()).then_some(row)
            })
            .collect())
    }

    fn find_deletes(
        &mut self,
        kind: EntityKind,
        client_group_id: &str,
        order: SyncOrder,
    ) -> Result<Vec<String>> {
        Ok(self
            .entries_for(kind, client_group_id)
            .filter(|e| e.entity_version.is_some() || e.order > order)
            .filter(|e| !self.exists(kind, &e.entity_id))
            .map(|e| e.entity_id.clone())
            .collect())
    }

    fn find_creates(
        &mut self,
        kind: EntityKind,
        client_group_id: &str,
        order: SyncOrder,
        limit: usize,
        exclude: &[String],
    ) -> Result<Vec<EntityRow>> {
        let exclude: HashSet<&str> = exclude.iter().map(String::as_str).collect();
        let seen = |row: &EntityRow| {
            let key = (client_group_id.to_string(), kind, row.id().to_string());
            matches!(
                self.entries.get(&key),
                Some(e) if e.order <= order && e.entity_version == Some(row.version())
            )
        };
        Ok(self
            .rows(kind)
            .into_iter()
            .filter(|row| !exclude.contains(row.id()) && !seen(row))
            .take(limit)
            .collect())
    }

    fn record_puts(
        &mut self,
        kind: EntityKind,
        client_group_id: &str,
        order: SyncOrder,
        rows: &[EntityRow],
    ) -> Result<()> {
        for row in rows {
            self.upsert_entry(kind, client_group_id, row.id(), Some(row.version()), order);
        }
        Ok(())
    }

    fn record_deletes(
        &mut self,
        kind: EntityKind,
        client_group_id: &str,
        order: SyncOrder,
        ids: &[String],
    ) -> Result<()> {
        for id in ids {
            self.upsert_entry(kind, client_group_id, id, None, order);
        }
        Ok(())
    }

    fn put_client_view(&mut self, record: &ClientViewRecord) -> Result<()> {
        let key = (record.client_group_id.clone(), record.order);
        if self.views.contains_key(&key) {
            return Err(Error::Conflict(format!(
                "client view {} of group {} already recorded",
                record.order, record.client_group_id
            )));
        }
        self.views.insert(key, record.client_version);
        Ok(())
    }

    fn last_mutation_ids(
        &mut self,
        client_group_id: &str,
        since: ClientVersion,
    ) -> Result<BTreeMap<String, MutationId>> {
        Ok(self
            .clients
            .values()
            .filter(|c| c.client_group_id == client_group_id && c.client_version > since)
            .map(|c| (c.id.clone(), c.last_mutation_id))
            .collect())
    }
}

impl RowWriter for MemoryStore {
    fn put_issue(&mut self, issue: &Issue) -> Result<RowVersion> {
        let live = self.issues.get(&issue.id).map(|r| r.version);
        let version = self.next_version(EntityKind::Issue, &issue.id, live);
        let mut row = issue.clone();
        row.version = version;
        self.issues.insert(row.id.clone(), row);
        Ok(version)
    }

    fn put_description(&mut self, description: &Description) -> Result<RowVersion> {
        self.require_issue(&description.id, "description")?;
        let live = self.descriptions.get(&description.id).map(|r| r.version);
        let version = self.next_version(EntityKind::Description, &description.id, live);
        let mut row = description.clone();
        row.version = version;
        self.descriptions.insert(row.id.clone(), row);
        Ok(version)
    }

    fn put_comment(&mut self, comment: &Comment) -> Result<RowVersion> {
        self.require_issue(&comment.issue_id, "comment")?;
        let live = self.comments.get(&comment.id).map(|r| r.version);
        let version = self.next_version(EntityKind::Comment, &comment.id, live);
        let mut row = comment.clone();
        row.version = version;
        self.comments.insert(row.id.clone(), row);
        Ok(version)
    }

    fn delete_entity(&mut self, kind: EntityKind, id: &str) -> Result<bool> {
        let mut retired = Vec::new();
        match kind {
            EntityKind::Issue => {
                if let Some(issue) = self.issues.remove(id) {
                    retired.push((EntityKind::Issue, issue.id, issue.version));
                    if let Some(d) = self.descriptions.remove(id) {
                        retired.push((EntityKind::Description, d.id, d.version));
                    }
                    let orphans: Vec<String> = self
                        .comments
                        .values()
                        .filter(|c| c.issue_id == id)
                        .map(|c| c.id.clone())
                        .collect();
                    for comment_id in orphans {
                        if let Some(c) = self.comments.remove(&comment_id) {
                            retired.push((EntityKind::Comment, c.id, c.version));
                        }
                    }
                }
            }
            EntityKind::Description => {
                if let Some(d) = self.descriptions.remove(id) {
                    retired.push((kind, d.id, d.version));
                }
            }
            EntityKind::Comment => {
                if let Some(c) = self.comments.remove(id) {
                    retired.push((kind, c.id, c.version));
                }
            }
        }
        let removed = !retired.is_empty();
        for (kind, id, version) in retired {
            self.retire(kind, &id, version);
        }
        Ok(removed)
    }

    fn client(&mut self, client_id: &str) -> Result<Option<ClientRecord>> {
        Ok(self.clients.get(client_id).cloned())
    }

    fn advance_client(
        &mut self,
        client_group_id: &str,
        client_id: &str,
        mutation_id: MutationId,
    ) -> Result<ClientVersion> {
        let now = Utc::now();
        let group = self
            .client_groups
            .entry(client_group_id.to_string())
            .or_insert_with(|| ClientGroupRecord {
                id: client_group_id.to_string(),
                client_version: 0,
                last_modified: now,
            });
        group.client_version += 1;
        group.last_modified = now;
        let client_version = group.client_version;

        self.clients.insert(
            client_id.to_string(),
            ClientRecord {
                id: client_id.to_string(),
                client_group_id: client_group_id.to_string(),
                last_mutation_id: mutation_id,
                client_version,
                last_modified: now,
            },
        );
        Ok(client_version)
    }
}
