#![forbid(unsafe_code)]
//! PostgreSQL backend for `issuesync-core`.
//!
//! The diff queries and ledger writes run as SQL against the entity tables and the CVR/CVE
//! ledger, inside one serializable transaction per pull or push. Racing pulls of the same client
//! group collide on the CVR primary key and the loser is re-run from scratch.

mod config;
mod error;
mod ledger;
mod schema;
mod store;

pub use config::{PgConfig, PAGE_SIZE_ENV, PULL_ATTEMPTS_ENV, URL_ENV};
pub use ledger::PgLedger;
pub use schema::{ensure_schema, reset_for_tests, schema_version, SchemaReport, SCHEMA_VERSION};
pub use store::{client_views, entity_rows, pull, push, view_entries};
