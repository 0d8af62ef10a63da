use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use postgres::types::ToSql;
use postgres::{Client, Row, Statement};

use issuesync_core::{
    ClientRecord, ClientVersion, ClientViewEntry, ClientViewRecord, Comment, Description,
    EntityKind, EntityRow, Error, Issue, MutationId, Priority, Result, RowVersion, RowWriter,
    Status, SyncOrder, ViewLedger,
};

use crate::error::storage_err;

/// Select list per kind, aliased as `t`. Column order is what [`decode_row`] expects.
fn columns(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Issue => {
            "t.id, t.title, t.priority::text, t.status::text, t.modified, t.created, t.creator, \
             t.kanbanorder, t.rowversion"
        }
        EntityKind::Description => "t.id, t.body, t.rowversion",
        EntityKind::Comment => "t.id, t.issueid, t.created, t.body, t.creator, t.rowversion",
    }
}

pub(crate) fn decode_row(kind: EntityKind, row: &Row) -> Result<EntityRow> {
    Ok(match kind {
        EntityKind::Issue => {
            let priority: Option<String> = row.get(2);
            let status: Option<String> = row.get(3);
            EntityRow::Issue(Issue {
                id: row.get(0),
                title: row.get(1),
                priority: priority.as_deref().map(str::parse::<Priority>).transpose()?,
                status: status.as_deref().map(str::parse::<Status>).transpose()?,
                modified: row.get(4),
                created: row.get(5),
                creator: row.get(6),
                kanban_order: row.get(7),
                version: from_db("rowversion", row.get(8))?,
            })
        }
        EntityKind::Description => EntityRow::Description(Description {
            id: row.get(0),
            body: row.get(1),
            version: from_db("rowversion", row.get(2))?,
        }),
        EntityKind::Comment => EntityRow::Comment(Comment {
            id: row.get(0),
            issue_id: row.get(1),
            created: row.get(2),
            body: row.get(3),
            creator: row.get(4),
            version: from_db("rowversion", row.get(5))?,
        }),
    })
}

/// Converts a stored counter, surfacing a negative value as corruption instead of clamping it.
fn from_db(column: &str, v: i64) -> Result<u64> {
    u64::try_from(v)
        .map_err(|_| Error::InconsistentState(format!("negative {column} {v} in store")))
}

/// Connection plus the statements prepared on it so far.
#[derive(Clone)]
pub(crate) struct PgCtx {
    client: Rc<RefCell<Client>>,
    stmts: Rc<RefCell<HashMap<String, Statement>>>,
}

impl PgCtx {
    pub(crate) fn new(client: Rc<RefCell<Client>>) -> Self {
        Self {
            client,
            stmts: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    fn stmt(&self, c: &mut Client, sql: &str) -> Result<Statement> {
        if let Some(stmt) = self.stmts.borrow().get(sql) {
            return Ok(stmt.clone());
        }
        let stmt = c.prepare(sql).map_err(storage_err)?;
        self.stmts.borrow_mut().insert(sql.to_string(), stmt.clone());
        Ok(stmt)
    }

    fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>> {
        let mut c = self.client.borrow_mut();
        let stmt = self.stmt(&mut c, sql)?;
        c.query(&stmt, params).map_err(storage_err)
    }

    fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64> {
        let mut c = self.client.borrow_mut();
        let stmt = self.stmt(&mut c, sql)?;
        c.execute(&stmt, params).map_err(storage_err)
    }

    fn query_entities(
        &self,
        kind: EntityKind,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<EntityRow>> {
        self.query(sql, params)?
            .iter()
            .map(|row| decode_row(kind, row))
            .collect()
    }
}

/// [`ViewLedger`] and [`RowWriter`] over an open transaction.
///
/// Holds no state beyond prepared statements; the caller owns `BEGIN`/`COMMIT`.
pub struct PgLedger {
    ctx: PgCtx,
}

impl PgLedger {
    pub fn new(client: Rc<RefCell<Client>>) -> Self {
        Self {
            ctx: PgCtx::new(client),
        }
    }

    /// Every row of `kind` ordered by id.
    pub fn rows(&mut self, kind: EntityKind) -> Result<Vec<EntityRow>> {
        let sql = format!(
            "SELECT {} FROM {} t ORDER BY t.id COLLATE \"C\"",
            columns(kind),
            kind.table()
        );
        self.ctx.query_entities(kind, &sql, &[])
    }

    /// Ledger entries of one client group ordered by kind, then entity id.
    pub fn entries(&mut self, client_group_id: &str) -> Result<Vec<ClientViewEntry>> {
        let rows = self.ctx.query(
            "SELECT kind, entity_id, entity_version, sync_order FROM issuesync_cve \
             WHERE client_group_id = $1 \
             ORDER BY kind, entity_id COLLATE \"C\"",
            &[&client_group_id],
        )?;
        rows.iter()
            .map(|row| {
                let version: Option<i64> = row.get(2);
                Ok(ClientViewEntry {
                    client_group_id: client_group_id.to_string(),
                    kind: EntityKind::from_ordinal(row.get(0))?,
                    entity_id: row.get(1),
                    entity_version: version
                        .map(|v| from_db("entity_version", v))
                        .transpose()?,
                    order: from_db("sync_order", row.get(3))?,
                })
            })
            .collect()
    }

    pub fn client_views(&mut self, client_group_id: &str) -> Result<Vec<ClientViewRecord>> {
        let rows = self.ctx.query(
            "SELECT sync_order, client_version FROM issuesync_cvr \
             WHERE client_group_id = $1 ORDER BY sync_order",
            &[&client_group_id],
        )?;
        rows.iter()
            .map(|row| {
                Ok(ClientViewRecord {
                    client_group_id: client_group_id.to_string(),
                    order: from_db("sync_order", row.get(0))?,
                    client_version: from_db("client_version", row.get(1))?,
                })
            })
            .collect()
    }

    fn record_entries(
        &mut self,
        kind: EntityKind,
        client_group_id: &str,
        order: SyncOrder,
        ids: Vec<String>,
        versions: Vec<Option<i64>>,
    ) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.ctx.execute(
            "INSERT INTO issuesync_cve (client_group_id, kind, entity_id, entity_version, sync_order) \
             SELECT $1::text, $2::int2, u.entity_id, u.entity_version, $3::int8 \
             FROM unnest($4::text[], $5::int8[]) AS u(entity_id, entity_version) \
             ON CONFLICT (client_group_id, kind, entity_id) DO UPDATE \
             SET entity_version = EXCLUDED.entity_version, sync_order = EXCLUDED.sync_order",
            &[
                &client_group_id,
                &kind.ordinal(),
                &(order as i64),
                &ids,
                &versions,
            ],
        )?;
        Ok(())
    }
}

impl ViewLedger for PgLedger {
    fn client_version(&mut self, client_group_id: &str) -> Result<ClientVersion> {
        let rows = self.ctx.query(
            "SELECT client_version FROM issuesync_client_group WHERE id = $1",
            &[&client_group_id],
        )?;
        rows.first()
            .map_or(Ok(0), |row| from_db("client_version", row.get(0)))
    }

    fn client_view(
        &mut self,
        client_group_id: &str,
        order: SyncOrder,
    ) -> Result<Option<ClientViewRecord>> {
        let rows = self.ctx.query(
            "SELECT client_version FROM issuesync_cvr \
             WHERE client_group_id = $1 AND sync_order = $2",
            &[&client_group_id, &(order as i64)],
        )?;
        rows.first()
            .map(|row| {
                Ok(ClientViewRecord {
                    client_group_id: client_group_id.to_string(),
                    order,
                    client_version: from_db("client_version", row.get(0))?,
                })
            })
            .transpose()
    }

    fn max_order(&mut self, client_group_id: &str) -> Result<SyncOrder> {
        let rows = self.ctx.query(
            "SELECT COALESCE(MAX(sync_order), 0) FROM issuesync_cvr WHERE client_group_id = $1",
            &[&client_group_id],
        )?;
        let row = rows
            .first()
            .ok_or_else(|| Error::Storage("missing MAX(sync_order) row".into()))?;
        from_db("sync_order", row.get(0))
    }

    fn find_fast_forward(
        &mut self,
        kind: EntityKind,
        client_group_id: &str,
        order: SyncOrder,
        exclude: &[String],
    ) -> Result<Vec<EntityRow>> {
        let sql = format!(
            "SELECT {} FROM {} t \
             JOIN issuesync_cve e ON e.entity_id = t.id \
             WHERE e.client_group_id = $1 AND e.kind = $2 AND e.sync_order > $3 \
               AND NOT (t.id = ANY($4::text[])) \
             ORDER BY t.id COLLATE \"C\"",
            columns(kind),
            kind.table()
        );
        self.ctx.query_entities(
            kind,
            &sql,
            &[&client_group_id, &kind.ordinal(), &(order as i64), &exclude],
        )
    }

    fn find_updates(&mut self, kind: EntityKind, client_group_id: &str) -> Result<Vec<EntityRow>> {
        let sql = format!(
            "SELECT {} FROM {} t \
             JOIN issuesync_cve e ON e.entity_id = t.id \
             WHERE e.client_group_id = $1 AND e.kind = $2 \
               AND e.entity_version IS NOT NULL AND e.entity_version <> t.rowversion \
             ORDER BY t.id COLLATE \"C\"",
            columns(kind),
            kind.table()
        );
        self.ctx
            .query_entities(kind, &sql, &[&client_group_id, &kind.ordinal()])
    }

    fn find_deletes(
        &mut self,
        kind: EntityKind,
        client_group_id: &str,
        order: SyncOrder,
    ) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT e.entity_id FROM issuesync_cve e \
             WHERE e.client_group_id = $1 AND e.kind = $2 \
               AND (e.entity_version IS NOT NULL OR e.sync_order > $3) \
               AND NOT EXISTS (SELECT 1 FROM {} t WHERE t.id = e.entity_id) \
             ORDER BY e.entity_id COLLATE \"C\"",
            kind.table()
        );
        let rows = self.ctx.query(
            &sql,
            &[&client_group_id, &kind.ordinal(), &(order as i64)],
        )?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    fn find_creates(
        &mut self,
        kind: EntityKind,
        client_group_id: &str,
        order: SyncOrder,
        limit: usize,
        exclude: &[String],
    ) -> Result<Vec<EntityRow>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM {} t \
             WHERE NOT (t.id = ANY($4::text[])) \
               AND NOT EXISTS ( \
                 SELECT 1 FROM issuesync_cve e \
                 WHERE e.client_group_id = $1 AND e.kind = $2 AND e.entity_id = t.id \
                   AND e.sync_order <= $3 AND e.entity_version = t.rowversion) \
             ORDER BY t.id COLLATE \"C\" \
             LIMIT $5",
            columns(kind),
            kind.table()
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.ctx.query_entities(
            kind,
            &sql,
            &[
                &client_group_id,
                &kind.ordinal(),
                &(order as i64),
                &exclude,
                &limit,
            ],
        )
    }

    fn record_puts(
        &mut self,
        kind: EntityKind,
        client_group_id: &str,
        order: SyncOrder,
        rows: &[EntityRow],
    ) -> Result<()> {
        let ids = rows.iter().map(|r| r.id().to_string()).collect();
        let versions = rows.iter().map(|r| Some(r.version() as i64)).collect();
        self.record_entries(kind, client_group_id, order, ids, versions)
    }

    fn record_deletes(
        &mut self,
        kind: EntityKind,
        client_group_id: &str,
        order: SyncOrder,
        ids: &[String],
    ) -> Result<()> {
        let versions = vec![None; ids.len()];
        self.record_entries(kind, client_group_id, order, ids.to_vec(), versions)
    }

    fn put_client_view(&mut self, record: &ClientViewRecord) -> Result<()> {
        // A duplicate primary key means a concurrent pull claimed this order first.
        self.ctx.execute(
            "INSERT INTO issuesync_cvr (client_group_id, sync_order, client_version) \
             VALUES ($1, $2, $3)",
            &[
                &record.client_group_id,
                &(record.order as i64),
                &(record.client_version as i64),
            ],
        )?;
        Ok(())
    }

    fn last_mutation_ids(
        &mut self,
        client_group_id: &str,
        since: ClientVersion,
    ) -> Result<BTreeMap<String, MutationId>> {
        let rows = self.ctx.query(
            "SELECT id, last_mutation_id FROM issuesync_client \
             WHERE client_group_id = $1 AND client_version > $2",
            &[&client_group_id, &(since as i64)],
        )?;
        rows.iter()
            .map(|row| Ok((row.get::<_, String>(0), from_db("last_mutation_id", row.get(1))?)))
            .collect()
    }
}

fn returned_version(rows: Vec<Row>) -> Result<RowVersion> {
    let row = rows
        .first()
        .ok_or_else(|| Error::Storage("upsert returned no rowversion".into()))?;
    from_db("rowversion", row.get(0))
}

impl RowWriter for PgLedger {
    fn put_issue(&mut self, issue: &Issue) -> Result<RowVersion> {
        let priority = issue.priority.map(|p| p.as_str());
        let status = issue.status.map(|s| s.as_str());
        let rows = self.ctx.query(
            "INSERT INTO issue \
               (id, title, priority, status, modified, created, creator, kanbanorder, rowversion) \
             VALUES ($1, $2, $3::text::issue_priority, $4::text::issue_status, $5, $6, $7, $8, \
               COALESCE((SELECT r.rowversion FROM issuesync_retired_version r \
                         WHERE r.kind = 1 AND r.entity_id = $1), 0) + 1) \
             ON CONFLICT (id) DO UPDATE SET \
               title = EXCLUDED.title, priority = EXCLUDED.priority, status = EXCLUDED.status, \
               modified = EXCLUDED.modified, created = EXCLUDED.created, \
               creator = EXCLUDED.creator, kanbanorder = EXCLUDED.kanbanorder, \
               rowversion = issue.rowversion + 1 \
             RETURNING rowversion",
            &[
                &issue.id,
                &issue.title,
                &priority,
                &status,
                &issue.modified,
                &issue.created,
                &issue.creator,
                &issue.kanban_order,
            ],
        )?;
        returned_version(rows)
    }

    fn put_description(&mut self, description: &Description) -> Result<RowVersion> {
        let rows = self.ctx.query(
            "INSERT INTO description (id, body, rowversion) \
             VALUES ($1, $2, \
               COALESCE((SELECT r.rowversion FROM issuesync_retired_version r \
                         WHERE r.kind = 2 AND r.entity_id = $1), 0) + 1) \
             ON CONFLICT (id) DO UPDATE SET \
               body = EXCLUDED.body, rowversion = description.rowversion + 1 \
             RETURNING rowversion",
            &[&description.id, &description.body],
        )?;
        returned_version(rows)
    }

    fn put_comment(&mut self, comment: &Comment) -> Result<RowVersion> {
        let rows = self.ctx.query(
            "INSERT INTO comment (id, issueid, created, body, creator, rowversion) \
             VALUES ($1, $2, $3, $4, $5, \
               COALESCE((SELECT r.rowversion FROM issuesync_retired_version r \
                         WHERE r.kind = 3 AND r.entity_id = $1), 0) + 1) \
             ON CONFLICT (id) DO UPDATE SET \
               issueid = EXCLUDED.issueid, created = EXCLUDED.created, body = EXCLUDED.body, \
               creator = EXCLUDED.creator, rowversion = comment.rowversion + 1 \
             RETURNING rowversion",
            &[
                &comment.id,
                &comment.issue_id,
                &comment.created,
                &comment.body,
                &comment.creator,
            ],
        )?;
        returned_version(rows)
    }

    fn delete_entity(&mut self, kind: EntityKind, id: &str) -> Result<bool> {
        // Descriptions and comments go with their issue through ON DELETE CASCADE.
        let sql = format!("DELETE FROM {} WHERE id = $1", kind.table());
        Ok(self.ctx.execute(&sql, &[&id])? > 0)
    }

    fn client(&mut self, client_id: &str) -> Result<Option<ClientRecord>> {
        let rows = self.ctx.query(
            "SELECT client_group_id, last_mutation_id, client_version, last_modified \
             FROM issuesync_client WHERE id = $1",
            &[&client_id],
        )?;
        rows.first()
            .map(|row| {
                Ok(ClientRecord {
                    id: client_id.to_string(),
                    client_group_id: row.get(0),
                    last_mutation_id: from_db("last_mutation_id", row.get(1))?,
                    client_version: from_db("client_version", row.get(2))?,
                    last_modified: row.get::<_, DateTime<Utc>>(3),
                })
            })
            .transpose()
    }

    fn advance_client(
        &mut self,
        client_group_id: &str,
        client_id: &str,
        mutation_id: MutationId,
    ) -> Result<ClientVersion> {
        let now = Utc::now();
        let rows = self.ctx.query(
            "INSERT INTO issuesync_client_group (id, client_version, last_modified) \
             VALUES ($1, 1, $2) \
             ON CONFLICT (id) DO UPDATE SET \
               client_version = issuesync_client_group.client_version + 1, \
               last_modified = EXCLUDED.last_modified \
             RETURNING client_version",
            &[&client_group_id, &now],
        )?;
        let row = rows
            .first()
            .ok_or_else(|| Error::Storage("client group upsert returned no row".into()))?;
        let client_version: i64 = row.get(0);

        self.ctx.execute(
            "INSERT INTO issuesync_client \
               (id, client_group_id, last_mutation_id, client_version, last_modified) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET \
               client_group_id = EXCLUDED.client_group_id, \
               last_mutation_id = EXCLUDED.last_mutation_id, \
               client_version = EXCLUDED.client_version, \
               last_modified = EXCLUDED.last_modified",
            &[
                &client_id,
                &client_group_id,
                &(mutation_id as i64),
                &client_version,
                &now,
            ],
        )?;
        from_db("client_version", client_version)
    }
}
