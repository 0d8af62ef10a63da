//! Bounded page assembly.
//!
//! Deletes and updates are always delivered in full. Whatever is left of the row budget is
//! filled with creates, one kind at a time in [`EntityKind::ALL`] order.

use crate::diff::{check_kind, exclusion_list, Deletes, Puts};
use crate::error::Result;
use crate::ids::{ByKind, EntityKind, SyncOrder};
use crate::rows::{Comment, Description, EntityRow, Issue};
use crate::traits::ViewLedger;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default row budget of one page.
pub const MAX_PAGE_SIZE: usize = 3000;

/// What one pull hands to the client.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Page {
    pub issues: Vec<Issue>,
    pub descriptions: Vec<Description>,
    pub comments: Vec<Comment>,
    pub issue_deletes: Vec<String>,
    pub description_deletes: Vec<String>,
    pub comment_deletes: Vec<String>,
}

impl Page {
    pub fn from_parts(puts: Puts, deletes: Deletes) -> Self {
        let mut page = Page {
            issue_deletes: deletes.issues,
            description_deletes: deletes.descriptions,
            comment_deletes: deletes.comments,
            ..Page::default()
        };
        let ByKind {
            issues,
            descriptions,
            comments,
        } = puts;
        for row in issues.into_iter().chain(descriptions).chain(comments) {
            match row {
                EntityRow::Issue(r) => page.issues.push(r),
                EntityRow::Description(r) => page.descriptions.push(r),
                EntityRow::Comment(r) => page.comments.push(r),
            }
        }
        page
    }

    /// Rows across all six categories.
    pub fn row_count(&self) -> usize {
        self.issues.len()
            + self.descriptions.len()
            + self.comments.len()
            + self.issue_deletes.len()
            + self.description_deletes.len()
            + self.comment_deletes.len()
    }

    pub fn deletes(&self, kind: EntityKind) -> &[String] {
        match kind {
            EntityKind::Issue => &self.issue_deletes,
            EntityKind::Description => &self.description_deletes,
            EntityKind::Comment => &self.comment_deletes,
        }
    }

    pub fn put_ids(&self, kind: EntityKind) -> Vec<&str> {
        match kind {
            EntityKind::Issue => self.issues.iter().map(|r| r.id.as_str()).collect(),
            EntityKind::Description => self.descriptions.iter().map(|r| r.id.as_str()).collect(),
            EntityKind::Comment => self.comments.iter().map(|r| r.id.as_str()).collect(),
        }
    }
}

/// `true` tells the caller there is nothing left to request.
pub fn is_page_empty(page: &Page) -> bool {
    page.row_count() == 0
}

/// `true` tells the caller to pull again right away with the returned cookie.
pub fn has_next_page(page: &Page, page_size: usize) -> bool {
    page.row_count() >= page_size
}

/// Fills the remaining row budget with rows the client group has never seen at their current
/// version.
///
/// `delivered` holds rows already placed on this page (updates, fast-forward); their ids are
/// excluded from the creates. Only deletes and updates count against the budget.
pub fn read_next_page<L: ViewLedger + ?Sized>(
    ledger: &mut L,
    client_group_id: &str,
    order: SyncOrder,
    page_size: usize,
    deletes: &Deletes,
    updates: &Puts,
    delivered: &Puts,
) -> Result<Puts> {
    let mut creates = Puts::default();
    let used = deletes.len() + updates.len();
    let mut remaining = page_size.saturating_sub(used);

    for kind in EntityKind::ALL {
        if remaining == 0 {
            break;
        }
        let exclude = exclusion_list(&[], [updates.get(kind), delivered.get(kind)]);
        let rows = ledger.find_creates(kind, client_group_id, order, remaining, &exclude)?;
        let rows = check_kind(kind, rows)?;
        remaining = remaining.saturating_sub(rows.len());
        *creates.get_mut(kind) = rows;
    }

    Ok(creates)
}
