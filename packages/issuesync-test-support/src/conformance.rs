//! Scenarios every backend must pass. Each expects an empty store and panics on failure.

use std::collections::{BTreeMap, BTreeSet};

use issuesync_core::{Cookie, EntityKind, EntityRow, Mutation, PullRequest};

use crate::fixtures::{make_comment, make_description, make_issue, retitled};
use crate::{row_set, Replica, SyncBackend};

fn assert_converged<B: SyncBackend + ?Sized>(backend: &mut B, replica: &Replica) {
    let expected = row_set(backend.rows().unwrap());
    assert_eq!(
        replica.rows,
        expected,
        "replica {} diverged from the store",
        replica.client_id
    );
}

/// An unsynced group receives an issue and its body, then the cascade delete of both.
pub fn first_pull_then_cascade_delete<B: SyncBackend + ?Sized>(backend: &mut B) {
    let mut tab = Replica::new("g1", "c1");
    let issue = make_issue(0);
    tab.mutate(
        backend,
        Mutation::PutIssue {
            issue: issue.clone(),
            description: Some(make_description(0)),
        },
    )
    .unwrap();

    let first = tab.pull(backend).unwrap();
    assert_eq!(
        first.cookie,
        Cookie {
            order: 1,
            client_version: 1
        }
    );
    assert_eq!(first.page.issues.len(), 1);
    assert_eq!(first.page.issues[0].id, issue.id);
    assert_eq!(first.page.issues[0].version, 1);
    assert_eq!(first.page.descriptions.len(), 1);
    assert_eq!(first.page.descriptions[0].version, 1);
    for kind in EntityKind::ALL {
        assert!(first.page.deletes(kind).is_empty());
    }
    assert!(!first.has_more);
    assert_eq!(first.last_mutation_ids, BTreeMap::from([("c1".to_string(), 1)]));

    tab.mutate(
        backend,
        Mutation::DeleteIssues {
            ids: vec![issue.id.clone()],
        },
    )
    .unwrap();
    let second = tab.pull(backend).unwrap();
    assert_eq!(second.cookie.order, 2);
    assert_eq!(second.page.issue_deletes, vec![issue.id.clone()]);
    assert_eq!(second.page.description_deletes, vec![issue.id.clone()]);
    assert!(second.page.issues.is_empty());
    assert!(tab.rows.is_empty());
}

/// Same or newer cookies never see a delete again; an older cookie may.
pub fn deletes_are_not_resent<B: SyncBackend + ?Sized>(backend: &mut B) {
    let mut tab = Replica::new("g1", "c1");
    tab.mutate(
        backend,
        Mutation::PutIssue {
            issue: make_issue(0),
            description: None,
        },
    )
    .unwrap();
    tab.mutate(backend, Mutation::PutIssueComment(make_comment(0, 0)))
        .unwrap();
    let synced = tab.pull(backend).unwrap().cookie;

    let comment_id = make_comment(0, 0).id;
    tab.mutate(
        backend,
        Mutation::DeleteIssueComment {
            id: comment_id.clone(),
        },
    )
    .unwrap();
    let deleted = tab.pull(backend).unwrap();
    assert_eq!(deleted.page.comment_deletes, vec![comment_id.clone()]);

    let again = backend
        .pull(&PullRequest::new("g1", Some(deleted.cookie)))
        .unwrap();
    assert!(again.page.comment_deletes.is_empty());
    assert_eq!(again.cookie, deleted.cookie);

    // A replica still at the earlier cookie has not been told yet.
    let stale = backend
        .pull(&PullRequest::new("g1", Some(synced)))
        .unwrap();
    assert_eq!(stale.page.comment_deletes, vec![comment_id]);
    assert!(stale.cookie.order > deleted.cookie.order);
}

/// A tab pulling with a cookie that predates another tab's pulls catches up from the ledger.
pub fn fast_forward_catches_up_a_stale_tab<B: SyncBackend + ?Sized>(backend: &mut B) {
    let mut a = Replica::new("g1", "tab-a");
    let mut b = Replica::new("g1", "tab-b");

    for n in 0..3 {
        a.mutate(
            backend,
            Mutation::PutIssue {
                issue: make_issue(n),
                description: None,
            },
        )
        .unwrap();
    }
    a.pull_until_empty(backend).unwrap();
    b.pull_until_empty(backend).unwrap();
    let stale = b.cookie.unwrap();

    a.mutate(
        backend,
        Mutation::UpdateIssues {
            issues: vec![retitled(make_issue(0), "edited")],
        },
    )
    .unwrap();
    a.pull(backend).unwrap();
    a.mutate(
        backend,
        Mutation::PutIssue {
            issue: make_issue(3),
            description: Some(make_description(3)),
        },
    )
    .unwrap();
    a.pull(backend).unwrap();
    a.mutate(
        backend,
        Mutation::DeleteIssues {
            ids: vec![make_issue(1).id],
        },
    )
    .unwrap();
    let a_last = a.pull(backend).unwrap();
    assert!(a_last.cookie.order >= stale.order + 3);

    let caught_up = b.pull(backend).unwrap();
    let put_ids: BTreeSet<&str> = caught_up.page.put_ids(EntityKind::Issue).into_iter().collect();
    assert!(put_ids.contains(make_issue(0).id.as_str()));
    assert!(put_ids.contains(make_issue(3).id.as_str()));
    assert_eq!(caught_up.page.put_ids(EntityKind::Description), vec![make_issue(3).id.as_str()]);
    assert_eq!(caught_up.page.issue_deletes, vec![make_issue(1).id]);
    let edited = caught_up
        .page
        .issues
        .iter()
        .find(|i| i.id == make_issue(0).id)
        .unwrap();
    assert_eq!(edited.title, "edited");

    b.pull_until_empty(backend).unwrap();
    a.pull_until_empty(backend).unwrap();
    assert_converged(backend, &a);
    assert_converged(backend, &b);
}

/// A create backlog larger than a page arrives across pages with no gaps or duplicates.
pub fn pagination_is_gapless<B: SyncBackend + ?Sized>(backend: &mut B) {
    backend.set_page_size(10);
    let mut writer = Replica::new("writer", "w1");
    let issues: Vec<_> = (0..25).map(make_issue).collect();
    for issue in &issues {
        writer
            .mutate(
                backend,
                Mutation::PutIssue {
                    issue: issue.clone(),
                    description: None,
                },
            )
            .unwrap();
    }

    let mut tab = Replica::new("reader", "r1");
    let responses = tab.pull_until_empty(backend).unwrap();
    let has_more: Vec<bool> = responses.iter().map(|r| r.has_more).collect();
    assert_eq!(has_more, vec![true, true, false, false]);

    let mut seen = Vec::new();
    for response in &responses {
        seen.extend(response.page.issues.iter().map(|i| i.id.clone()));
    }
    let expected: Vec<String> = issues.iter().map(|i| i.id.clone()).collect();
    assert_eq!(seen, expected);
    assert_converged(backend, &tab);
}

/// Rows of one multi-row mutation are delivered together even past the page budget.
pub fn multi_row_updates_are_never_split<B: SyncBackend + ?Sized>(backend: &mut B) {
    let mut tab = Replica::new("g1", "c1");
    for n in 0..5 {
        tab.mutate(
            backend,
            Mutation::PutIssue {
                issue: make_issue(n),
                description: None,
            },
        )
        .unwrap();
    }
    tab.pull_until_empty(backend).unwrap();

    backend.set_page_size(2);
    let edited: Vec<_> = (0..4)
        .map(|n| retitled(make_issue(n), "moved"))
        .collect();
    tab.mutate(backend, Mutation::UpdateIssues { issues: edited })
        .unwrap();
    let response = tab.pull(backend).unwrap();
    assert_eq!(response.page.issues.len(), 4);
    assert!(response.page.issues.iter().all(|i| i.title == "moved" && i.version == 2));
    assert!(response.has_more);

    tab.pull_until_empty(backend).unwrap();
    assert_converged(backend, &tab);
}

/// Every client of the group that pushed since the cookie is reported.
pub fn last_mutation_ids_follow_the_cookie<B: SyncBackend + ?Sized>(backend: &mut B) {
    let mut a = Replica::new("g1", "tab-a");
    let mut b = Replica::new("g1", "tab-b");
    a.mutate(
        backend,
        Mutation::PutIssue {
            issue: make_issue(0),
            description: None,
        },
    )
    .unwrap();
    b.mutate(backend, Mutation::PutIssueComment(make_comment(0, 0)))
        .unwrap();
    b.mutate(backend, Mutation::PutIssueComment(make_comment(1, 0)))
        .unwrap();

    let first = a.pull(backend).unwrap();
    assert_eq!(first.cookie.client_version, 3);
    assert_eq!(
        first.last_mutation_ids,
        BTreeMap::from([("tab-a".to_string(), 1), ("tab-b".to_string(), 2)])
    );

    a.mutate(backend, Mutation::PutIssueComment(make_comment(2, 0)))
        .unwrap();
    let second = a.pull(backend).unwrap();
    assert_eq!(
        second.last_mutation_ids,
        BTreeMap::from([("tab-a".to_string(), 2)])
    );

    // Retrying an already-applied mutation is a no-op.
    assert!(!backend
        .push("g1", "tab-a", 2, &Mutation::DeleteIssues { ids: vec![make_issue(0).id] })
        .unwrap());
    assert_eq!(backend.rows().unwrap().len(), 4);
}

/// An id deleted and created again between pulls reaches a replica that saw the old row.
pub fn recreated_ids_reach_replicas<B: SyncBackend + ?Sized>(backend: &mut B) {
    let mut tab = Replica::new("g1", "c1");
    let mut other = Replica::new("g1", "c2");
    let issue = make_issue(0);
    tab.mutate(
        backend,
        Mutation::PutIssue {
            issue: issue.clone(),
            description: Some(make_description(0)),
        },
    )
    .unwrap();
    tab.mutate(backend, Mutation::PutIssueComment(make_comment(0, 0)))
        .unwrap();
    tab.pull_until_empty(backend).unwrap();
    other.pull_until_empty(backend).unwrap();

    tab.mutate(
        backend,
        Mutation::DeleteIssues {
            ids: vec![issue.id.clone()],
        },
    )
    .unwrap();
    let mut description = make_description(0);
    description.body = "rewritten".into();
    tab.mutate(
        backend,
        Mutation::PutIssue {
            issue: retitled(issue.clone(), "new"),
            description: Some(description),
        },
    )
    .unwrap();
    let mut comment = make_comment(0, 0);
    comment.body = "posted again".into();
    tab.mutate(backend, Mutation::PutIssueComment(comment))
        .unwrap();

    let responses = tab.pull_until_empty(backend).unwrap();
    let recreated = responses
        .iter()
        .flat_map(|r| r.page.issues.iter())
        .find(|i| i.id == issue.id)
        .expect("re-created issue was not sent");
    assert_eq!(recreated.title, "new");
    assert!(recreated.version > 1, "version {} was reused", recreated.version);

    other.pull_until_empty(backend).unwrap();
    assert_converged(backend, &tab);
    assert_converged(backend, &other);

    // The second tab saw the old rows and never the delete in between.
    let key = (EntityKind::Description, issue.id.clone());
    match other.rows.get(&key) {
        Some(EntityRow::Description(d)) => assert_eq!(d.body, "rewritten"),
        row => panic!("expected the new description, got {row:?}"),
    }
}

/// Two groups share the store but never each other's ledger.
pub fn client_groups_are_isolated<B: SyncBackend + ?Sized>(backend: &mut B) {
    let mut one = Replica::new("g1", "c1");
    let mut two = Replica::new("g2", "c2");
    one.mutate(
        backend,
        Mutation::PutIssue {
            issue: make_issue(0),
            description: Some(make_description(0)),
        },
    )
    .unwrap();
    one.pull_until_empty(backend).unwrap();

    let first = two.pull(backend).unwrap();
    assert_eq!(first.cookie.order, 1);
    assert_eq!(first.page.issues.len(), 1);
    assert!(first.last_mutation_ids.is_empty());
    two.pull_until_empty(backend).unwrap();
    assert_converged(backend, &one);
    assert_converged(backend, &two);
}
