use std::collections::BTreeMap;

use crate::diff::{fast_forward, find_all_deletes, find_all_updates, Puts};
use crate::error::{Error, Result};
use crate::ids::{ByKind, MutationId, SyncOrder};
use crate::ledger::record_diff;
use crate::page::{has_next_page, is_page_empty, read_next_page, Page, MAX_PAGE_SIZE};
use crate::traits::ViewLedger;
use crate::view::Cookie;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct PullRequest {
    pub client_group_id: String,
    pub cookie: Option<Cookie>,
}

impl PullRequest {
    pub fn new(client_group_id: impl Into<String>, cookie: Option<Cookie>) -> Self {
        Self {
            client_group_id: client_group_id.into(),
            cookie,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct PullResponse {
    pub cookie: Cookie,
    pub last_mutation_ids: BTreeMap<String, MutationId>,
    pub page: Page,
    /// The caller must pull again with `cookie` before exposing the page to readers.
    pub has_more: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PullOptions {
    /// Row budget of one page. Updates and deletes may exceed it.
    pub page_size: usize,
    /// Attempts made by backends that detect transaction conflicts before giving up.
    pub max_attempts: u32,
}

impl Default for PullOptions {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            max_attempts: 5,
        }
    }
}

/// Computes, records and returns the next page for a client group.
///
/// Runs entirely against `ledger`; the caller owns the transaction and must discard every write
/// if this returns an error.
pub fn pull_in_tx<L: ViewLedger + ?Sized>(
    ledger: &mut L,
    request: &PullRequest,
    options: &PullOptions,
) -> Result<PullResponse> {
    if options.page_size == 0 {
        return Err(Error::InvalidOperation("page size must be positive".into()));
    }
    let cg = request.client_group_id.as_str();
    let client_version = ledger.client_version(cg)?;
    let (order, reset) = resolve_cookie_order(ledger, cg, request.cookie)?;

    let deletes = find_all_deletes(ledger, cg, order)?;
    let updates = find_all_updates(ledger, cg)?;
    let forwarded = fast_forward(ledger, cg, order, &deletes, &updates)?;
    let creates = read_next_page(
        ledger,
        cg,
        order,
        options.page_size,
        &deletes,
        &updates,
        &forwarded,
    )?;

    let puts = merge_puts(updates, forwarded, creates);
    let page = Page::from_parts(puts.clone(), deletes.clone());

    let since = match request.cookie {
        Some(cookie) if !reset => cookie.client_version,
        _ => 0,
    };
    if let Some(cookie) = request.cookie {
        if !reset && is_page_empty(&page) && cookie.client_version == client_version {
            tracing::trace!(client_group_id = cg, order = cookie.order, "pull found nothing new");
            return Ok(PullResponse {
                cookie,
                last_mutation_ids: BTreeMap::new(),
                page,
                has_more: false,
            });
        }
    }

    let next_order = ledger.max_order(cg)? + 1;
    record_diff(ledger, cg, next_order, client_version, &puts, &deletes)?;
    let last_mutation_ids = ledger.last_mutation_ids(cg, since)?;
    let has_more = has_next_page(&page, options.page_size);

    tracing::debug!(
        client_group_id = cg,
        from_order = order,
        order = next_order,
        client_version,
        puts = puts.len(),
        deletes = deletes.len(),
        has_more,
        "pull page recorded"
    );

    Ok(PullResponse {
        cookie: Cookie {
            order: next_order,
            client_version,
        },
        last_mutation_ids,
        page,
        has_more,
    })
}

/// Returns the order to diff against and whether the cookie had to be reset.
///
/// A cookie naming a view the ledger never recorded (e.g. the server database was restored) is
/// treated as a client that never synced.
fn resolve_cookie_order<L: ViewLedger + ?Sized>(
    ledger: &mut L,
    client_group_id: &str,
    cookie: Option<Cookie>,
) -> Result<(SyncOrder, bool)> {
    let Some(cookie) = cookie else {
        return Ok((0, false));
    };
    if cookie.order == 0 {
        return Ok((0, false));
    }
    if ledger.client_view(client_group_id, cookie.order)?.is_some() {
        return Ok((cookie.order, false));
    }
    tracing::warn!(
        client_group_id,
        order = cookie.order,
        "cookie references an unknown client view; resyncing from scratch"
    );
    Ok((0, true))
}

fn merge_puts(updates: Puts, forwarded: Puts, creates: Puts) -> Puts {
    let mut out = updates;
    for part in [forwarded, creates] {
        let ByKind {
            issues,
            descriptions,
            comments,
        } = part;
        out.issues.extend(issues);
        out.descriptions.extend(descriptions);
        out.comments.extend(comments);
    }
    out
}
