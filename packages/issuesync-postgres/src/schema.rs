use postgres::Client;
use serde::Serialize;

use issuesync_core::{Error, Result};

use crate::error::storage_err;

const SCHEMA_LOCK_KEY: i64 = 0x6973737565737963; // "issuesyc"

/// Highest schema version this build knows how to run against.
pub const SCHEMA_VERSION: i64 = 1;

const META_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS issuesync_meta (
  key TEXT PRIMARY KEY,
  value JSONB NOT NULL
);
"#;

const SCHEMA_V1: &str = r#"
CREATE TABLE issuesync_client_group (
  id TEXT PRIMARY KEY,
  client_version BIGINT NOT NULL,
  last_modified TIMESTAMPTZ NOT NULL
);

CREATE TABLE issuesync_client (
  id TEXT PRIMARY KEY,
  client_group_id TEXT NOT NULL,
  last_mutation_id BIGINT NOT NULL,
  client_version BIGINT NOT NULL,
  last_modified TIMESTAMPTZ NOT NULL
);

CREATE INDEX idx_issuesync_client_group_version
  ON issuesync_client (client_group_id, client_version);

CREATE TYPE issue_priority AS ENUM ('NONE', 'LOW', 'MEDIUM', 'HIGH', 'URGENT');
CREATE TYPE issue_status AS ENUM ('BACKLOG', 'TODO', 'IN_PROGRESS', 'DONE', 'CANCELED');

CREATE TABLE issue (
  id TEXT PRIMARY KEY,
  title TEXT NOT NULL,
  priority issue_priority,
  status issue_status,
  modified BIGINT NOT NULL,
  created BIGINT NOT NULL,
  creator TEXT NOT NULL,
  kanbanorder TEXT,
  rowversion BIGINT NOT NULL
);

CREATE TABLE description (
  id TEXT PRIMARY KEY REFERENCES issue(id) ON DELETE CASCADE,
  body TEXT NOT NULL,
  rowversion BIGINT NOT NULL
);

CREATE TABLE comment (
  id TEXT PRIMARY KEY,
  issueid TEXT NOT NULL REFERENCES issue(id) ON DELETE CASCADE,
  created BIGINT NOT NULL,
  body TEXT NOT NULL,
  creator TEXT NOT NULL,
  rowversion BIGINT NOT NULL
);

CREATE INDEX idx_comment_issue ON comment (issueid);

-- Highest version each deleted row reached. A re-created id continues above it, so no
-- (kind, id, version) is ever handed out twice.
CREATE TABLE issuesync_retired_version (
  kind SMALLINT NOT NULL,
  entity_id TEXT NOT NULL,
  rowversion BIGINT NOT NULL,
  PRIMARY KEY (kind, entity_id)
);

-- Row triggers also see rows removed by ON DELETE CASCADE.
CREATE FUNCTION issuesync_retire_version() RETURNS trigger AS $$
BEGIN
  INSERT INTO issuesync_retired_version (kind, entity_id, rowversion)
  VALUES (TG_ARGV[0]::int2, OLD.id, OLD.rowversion)
  ON CONFLICT (kind, entity_id) DO UPDATE
  SET rowversion = GREATEST(issuesync_retired_version.rowversion, EXCLUDED.rowversion);
  RETURN OLD;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER issue_retire_version AFTER DELETE ON issue
  FOR EACH ROW EXECUTE FUNCTION issuesync_retire_version('1');
CREATE TRIGGER description_retire_version AFTER DELETE ON description
  FOR EACH ROW EXECUTE FUNCTION issuesync_retire_version('2');
CREATE TRIGGER comment_retire_version AFTER DELETE ON comment
  FOR EACH ROW EXECUTE FUNCTION issuesync_retire_version('3');

CREATE TABLE issuesync_cvr (
  client_group_id TEXT NOT NULL,
  sync_order BIGINT NOT NULL,
  client_version BIGINT NOT NULL,
  PRIMARY KEY (client_group_id, sync_order)
);

-- One entry per (group, kind, entity): a later pull's observation replaces the earlier one.
-- A NULL entity_version records that the entity was sent as deleted.
CREATE TABLE issuesync_cve (
  client_group_id TEXT NOT NULL,
  kind SMALLINT NOT NULL,
  entity_id TEXT NOT NULL,
  entity_version BIGINT,
  sync_order BIGINT NOT NULL,
  PRIMARY KEY (client_group_id, kind, entity_id)
);

CREATE INDEX idx_issuesync_cve_order
  ON issuesync_cve (client_group_id, kind, sync_order);
"#;

/// Ordered migrations; entry `i` moves the store from version `i` to `i + 1`.
const MIGRATIONS: &[(i64, &str)] = &[(1, SCHEMA_V1)];

/// Outcome of [`ensure_schema`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaReport {
    pub previous_version: i64,
    pub current_version: i64,
}

impl SchemaReport {
    pub fn migrated(&self) -> bool {
        self.previous_version != self.current_version
    }
}

/// Brings the store to [`SCHEMA_VERSION`]. Safe to call from every process at startup.
pub fn ensure_schema(client: &mut Client) -> Result<SchemaReport> {
    // Concurrent DDL can still collide on catalog entries; serialize bootstrap across processes.
    client
        .query_one("SELECT pg_advisory_lock($1)", &[&SCHEMA_LOCK_KEY])
        .map_err(storage_err)?;

    let res = migrate(client);

    // Best-effort unlock. Locks are also released when the connection is dropped.
    let _ = client.query_one("SELECT pg_advisory_unlock($1)", &[&SCHEMA_LOCK_KEY]);

    res
}

fn migrate(client: &mut Client) -> Result<SchemaReport> {
    client.batch_execute(META_SQL).map_err(storage_err)?;
    let previous = schema_version(client)?;
    if !(0..=SCHEMA_VERSION).contains(&previous) {
        return Err(Error::UnsupportedSchemaVersion {
            found: previous,
            supported: SCHEMA_VERSION,
        });
    }

    let mut current = previous;
    for &(version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > previous) {
        apply_migration(client, version, sql)?;
        tracing::info!(from = current, to = version, "applied schema migration");
        current = version;
    }
    if current == previous {
        tracing::debug!(version = current, "schema up to date");
    }

    Ok(SchemaReport {
        previous_version: previous,
        current_version: current,
    })
}

fn apply_migration(client: &mut Client, version: i64, sql: &str) -> Result<()> {
    let mut tx = client.transaction().map_err(storage_err)?;
    tx.batch_execute(sql).map_err(storage_err)?;
    let marker = serde_json::Value::from(version);
    tx.execute(
        "INSERT INTO issuesync_meta (key, value) VALUES ('schemaVersion', $1) \
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        &[&marker],
    )
    .map_err(storage_err)?;
    tx.commit().map_err(storage_err)
}

/// Stored schema version, `0` for a database that was never bootstrapped.
pub fn schema_version(client: &mut Client) -> Result<i64> {
    let row = client
        .query_one(
            "SELECT to_regclass('issuesync_meta') IS NOT NULL",
            &[],
        )
        .map_err(storage_err)?;
    if !row.get::<_, bool>(0) {
        return Ok(0);
    }

    let rows = client
        .query(
            "SELECT value FROM issuesync_meta WHERE key = 'schemaVersion'",
            &[],
        )
        .map_err(storage_err)?;
    let Some(row) = rows.first() else {
        return Ok(0);
    };
    let value: serde_json::Value = row.get(0);
    value
        .as_i64()
        .ok_or_else(|| Error::InconsistentState(format!("schemaVersion marker is not an integer: {value}")))
}

/// Removes every row from every table. Test-only; the entity tables are shared by all groups.
pub fn reset_for_tests(client: &mut Client) -> Result<()> {
    client
        .batch_execute(
            "TRUNCATE issuesync_cve, issuesync_cvr, issuesync_client, issuesync_client_group, \
             issuesync_retired_version, comment, description, issue",
        )
        .map_err(storage_err)
}
