use issuesync_core::{
    ByKind, ClientViewRecord, Comment, Description, EntityKind, EntityRow, Issue, MemoryStore,
    RowWriter, ViewLedger,
};

fn issue(n: usize) -> Issue {
    Issue {
        id: format!("iss-{n}"),
        title: format!("Issue {n}"),
        priority: None,
        status: None,
        modified: 0,
        created: 0,
        creator: "user".into(),
        kanban_order: None,
        version: 0,
    }
}

fn description(n: usize) -> Description {
    Description {
        id: format!("iss-{n}"),
        body: format!("Body {n}"),
        version: 0,
    }
}

fn comment(n: usize, issue: usize) -> Comment {
    Comment {
        id: format!("com-{n}"),
        issue_id: format!("iss-{issue}"),
        created: 0,
        body: "comment".into(),
        creator: "user".into(),
        version: 0,
    }
}

fn seed_one_of_each(store: &mut MemoryStore) {
    store.put_issue(&issue(0)).unwrap();
    store.put_description(&description(0)).unwrap();
    store.put_comment(&comment(0, 0)).unwrap();
}

/// Records every current row for `cg` at `order`, like a completed pull would.
fn record_everything(store: &mut MemoryStore, cg: &str, order: u64) {
    for kind in EntityKind::ALL {
        let rows = store.find_creates(kind, cg, 0, 100, &[]).unwrap();
        store.record_puts(kind, cg, order, &rows).unwrap();
    }
}

fn ids(rows: &[EntityRow]) -> Vec<&str> {
    rows.iter().map(EntityRow::id).collect()
}

fn per_kind<T>(mut f: impl FnMut(EntityKind) -> T) -> ByKind<T> {
    ByKind {
        issues: f(EntityKind::Issue),
        descriptions: f(EntityKind::Description),
        comments: f(EntityKind::Comment),
    }
}

#[test]
fn fast_forward_on_empty_tables_returns_nothing() {
    let mut store = MemoryStore::new();
    for kind in EntityKind::ALL {
        assert!(store.find_fast_forward(kind, "g", 0, &[]).unwrap().is_empty());
    }
}

#[test]
fn fast_forward_ignores_rows_never_recorded_for_the_group() {
    let mut store = MemoryStore::new();
    seed_one_of_each(&mut store);
    for kind in EntityKind::ALL {
        assert!(store.find_fast_forward(kind, "g", 0, &[]).unwrap().is_empty());
    }
}

#[test]
fn fast_forward_is_empty_when_cookie_is_current() {
    let mut store = MemoryStore::new();
    seed_one_of_each(&mut store);
    record_everything(&mut store, "g", 1);
    for kind in EntityKind::ALL {
        assert!(store.find_fast_forward(kind, "g", 1, &[]).unwrap().is_empty());
    }
}

#[test]
fn fast_forward_returns_rows_recorded_after_a_stale_cookie() {
    let mut store = MemoryStore::new();
    seed_one_of_each(&mut store);
    record_everything(&mut store, "g", 1);

    let got = per_kind(|kind| store.find_fast_forward(kind, "g", 0, &[]).unwrap());
    assert_eq!(ids(&got.issues), vec!["iss-0"]);
    assert_eq!(ids(&got.descriptions), vec!["iss-0"]);
    assert_eq!(ids(&got.comments), vec!["com-0"]);
}

#[test]
fn fast_forward_honours_exclusions() {
    let mut store = MemoryStore::new();
    seed_one_of_each(&mut store);
    record_everything(&mut store, "g", 1);

    let exclude = vec!["iss-0".to_string(), "com-0".to_string()];
    for kind in EntityKind::ALL {
        assert!(store.find_fast_forward(kind, "g", 0, &exclude).unwrap().is_empty());
    }
}

#[test]
fn updates_find_rows_whose_version_moved_on() {
    let mut store = MemoryStore::new();
    seed_one_of_each(&mut store);
    store.put_issue(&issue(1)).unwrap();
    record_everything(&mut store, "g", 1);

    store.put_issue(&issue(1)).unwrap();
    store.put_comment(&comment(0, 0)).unwrap();

    let got = per_kind(|kind| store.find_updates(kind, "g").unwrap());
    assert_eq!(ids(&got.issues), vec!["iss-1"]);
    assert_eq!(got.issues[0].version(), 2);
    assert!(got.descriptions.is_empty());
    assert_eq!(ids(&got.comments), vec!["com-0"]);

    // Another group has never seen anything, so nothing is an update for it.
    assert!(store.find_updates(EntityKind::Issue, "other").unwrap().is_empty());
}

#[test]
fn deletes_on_empty_tables_and_empty_ledger_return_nothing() {
    let mut store = MemoryStore::new();
    for kind in EntityKind::ALL {
        assert!(store.find_deletes(kind, "g", 0).unwrap().is_empty());
    }
}

#[test]
fn deletes_report_recorded_rows_that_are_gone() {
    let mut store = MemoryStore::new();
    seed_one_of_each(&mut store);
    record_everything(&mut store, "g", 1);
    store.delete_entity(EntityKind::Issue, "iss-0").unwrap();

    let got = per_kind(|kind| store.find_deletes(kind, "g", 1).unwrap());
    assert_eq!(got.issues, vec!["iss-0"]);
    assert_eq!(got.descriptions, vec!["iss-0"]);
    assert_eq!(got.comments, vec!["com-0"]);
}

#[test]
fn deletes_already_sent_at_or_before_the_cookie_are_not_resent() {
    let mut store = MemoryStore::new();
    seed_one_of_each(&mut store);
    record_everything(&mut store, "g", 1);
    store.delete_entity(EntityKind::Comment, "com-0").unwrap();
    store
        .record_deletes(EntityKind::Comment, "g", 2, &["com-0".to_string()])
        .unwrap();

    // Recorded exactly at the cookie's order: the client already has it.
    assert!(store.find_deletes(EntityKind::Comment, "g", 2).unwrap().is_empty());
    assert!(store.find_deletes(EntityKind::Comment, "g", 3).unwrap().is_empty());
    // A replica still at order 1 has not seen it yet.
    assert_eq!(store.find_deletes(EntityKind::Comment, "g", 1).unwrap(), vec!["com-0"]);
}

#[test]
fn creates_skip_rows_recorded_at_the_same_version_and_respect_the_limit() {
    let mut store = MemoryStore::new();
    for n in 0..5 {
        store.put_issue(&issue(n)).unwrap();
    }
    let first = store.find_creates(EntityKind::Issue, "g", 0, 2, &[]).unwrap();
    assert_eq!(ids(&first), vec!["iss-0", "iss-1"]);
    store.record_puts(EntityKind::Issue, "g", 1, &first).unwrap();
    store
        .put_client_view(&ClientViewRecord {
            client_group_id: "g".into(),
            order: 1,
            client_version: 0,
        })
        .unwrap();

    let next = store.find_creates(EntityKind::Issue, "g", 1, 10, &[]).unwrap();
    assert_eq!(ids(&next), vec!["iss-2", "iss-3", "iss-4"]);

    let excluded = store
        .find_creates(EntityKind::Issue, "g", 1, 10, &["iss-3".to_string()])
        .unwrap();
    assert_eq!(ids(&excluded), vec!["iss-2", "iss-4"]);

    // Entries recorded after the requested order do not count as seen.
    let stale = store.find_creates(EntityKind::Issue, "g", 0, 10, &[]).unwrap();
    assert_eq!(stale.len(), 5);
}

#[test]
fn recording_a_put_over_a_delete_sentinel_revives_the_entry() {
    let mut store = MemoryStore::new();
    store.put_issue(&issue(0)).unwrap();
    store
        .record_deletes(EntityKind::Issue, "g", 1, &["iss-0".to_string()])
        .unwrap();
    let rows = store.find_creates(EntityKind::Issue, "g", 1, 10, &[]).unwrap();
    assert_eq!(ids(&rows), vec!["iss-0"]);

    store.record_puts(EntityKind::Issue, "g", 2, &rows).unwrap();
    let entries = store.entries("g");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entity_version, Some(1));
    assert_eq!(entries[0].order, 2);
}
