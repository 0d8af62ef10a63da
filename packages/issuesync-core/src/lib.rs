#![forbid(unsafe_code)]
//! Core of the issue tracker's incremental pull-sync protocol.
//!
//! Given a client group's last acknowledged sync order, the pull computes the creates, updates
//! and deletes needed to bring that group's cached replica up to date, records what was sent in
//! the client view ledger, and hands back a bounded page plus the next cookie. Storage engines
//! plug in through [`ViewLedger`] and [`RowWriter`]; [`MemoryStore`] is the in-process backend.

pub mod diff;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod memory;
pub mod mutation;
pub mod page;
pub mod pull;
pub mod rows;
pub mod traits;
pub mod view;

pub use diff::{fast_forward, find_all_deletes, find_all_updates, Deletes, Puts};
pub use error::{Error, Result};
pub use ids::{ByKind, ClientVersion, EntityKind, MutationId, RowVersion, SyncOrder};
pub use ledger::record_diff;
pub use memory::MemoryStore;
pub use mutation::{apply_mutation, Mutation};
pub use page::{has_next_page, is_page_empty, read_next_page, Page, MAX_PAGE_SIZE};
pub use pull::{pull_in_tx, PullOptions, PullRequest, PullResponse};
pub use rows::{Comment, Description, EntityRow, Issue, Priority, Status};
pub use traits::{RowWriter, ViewLedger};
pub use view::{ClientGroupRecord, ClientRecord, ClientViewEntry, ClientViewRecord, Cookie};
