use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Barrier, Mutex, MutexGuard, OnceLock, PoisonError};

use postgres::{Client, NoTls};
use uuid::Uuid;

use issuesync_core::{
    Cookie, EntityKind, EntityRow, Error, Mutation, MutationId, PullOptions, PullRequest,
    PullResponse, Result,
};
use issuesync_postgres::{
    client_views, ensure_schema, entity_rows, pull, push, reset_for_tests, schema_version,
    view_entries, SCHEMA_VERSION, URL_ENV,
};
use issuesync_test_support::fixtures::{make_description, make_issue};
use issuesync_test_support::{conformance, SyncBackend};

fn connect() -> Option<Rc<RefCell<Client>>> {
    let url = std::env::var(URL_ENV).ok()?;
    let client = Client::connect(&url, NoTls).ok()?;
    Some(Rc::new(RefCell::new(client)))
}

fn ensure_schema_once(client: &Rc<RefCell<Client>>) {
    static ONCE: OnceLock<()> = OnceLock::new();
    ONCE.get_or_init(|| {
        let mut c = client.borrow_mut();
        ensure_schema(&mut c).unwrap();
    });
}

/// The entity tables are shared by every group, so tests take turns on an emptied store.
fn exclusive_store() -> Option<(MutexGuard<'static, ()>, Rc<RefCell<Client>>)> {
    static LOCK: Mutex<()> = Mutex::new(());
    let client = connect()?;
    let guard = LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    ensure_schema_once(&client);
    reset_for_tests(&mut client.borrow_mut()).unwrap();
    Some((guard, client))
}

struct PgBackend {
    client: Rc<RefCell<Client>>,
    options: PullOptions,
}

impl PgBackend {
    fn new(client: Rc<RefCell<Client>>) -> Self {
        Self {
            client,
            options: PullOptions::default(),
        }
    }
}

impl SyncBackend for PgBackend {
    fn push(
        &mut self,
        client_group_id: &str,
        client_id: &str,
        mutation_id: MutationId,
        mutation: &Mutation,
    ) -> Result<bool> {
        push(
            &self.client,
            client_group_id,
            client_id,
            mutation_id,
            mutation,
            &self.options,
        )
    }

    fn pull(&mut self, request: &PullRequest) -> Result<PullResponse> {
        pull(&self.client, request, &self.options)
    }

    fn rows(&mut self) -> Result<Vec<EntityRow>> {
        let mut out = Vec::new();
        for kind in EntityKind::ALL {
            out.extend(entity_rows(&self.client, kind)?);
        }
        Ok(out)
    }

    fn set_page_size(&mut self, page_size: usize) {
        self.options.page_size = page_size;
    }
}

macro_rules! conformance_test {
    ($name:ident) => {
        #[test]
        fn $name() {
            let Some((_guard, client)) = exclusive_store() else {
                return;
            };
            conformance::$name(&mut PgBackend::new(client));
        }
    };
}

conformance_test!(first_pull_then_cascade_delete);
conformance_test!(deletes_are_not_resent);
conformance_test!(fast_forward_catches_up_a_stale_tab);
conformance_test!(pagination_is_gapless);
conformance_test!(multi_row_updates_are_never_split);
conformance_test!(last_mutation_ids_follow_the_cookie);
conformance_test!(client_groups_are_isolated);
conformance_test!(recreated_ids_reach_replicas);

#[test]
fn postgres_first_pull_records_ledger_entries() {
    let Some((_guard, client)) = exclusive_store() else {
        return;
    };
    let group = format!("g-{}", Uuid::new_v4());
    let issue = make_issue(0);
    let options = PullOptions::default();
    push(
        &client,
        &group,
        "c1",
        1,
        &Mutation::PutIssue {
            issue: issue.clone(),
            description: Some(make_description(0)),
        },
        &options,
    )
    .unwrap();

    let res = pull(&client, &PullRequest::new(&group, None), &options).unwrap();
    assert_eq!(
        res.cookie,
        Cookie {
            order: 1,
            client_version: 1
        }
    );

    let entries = view_entries(&client, &group).unwrap();
    let summary: Vec<_> = entries
        .iter()
        .map(|e| (e.kind, e.entity_id.as_str(), e.entity_version, e.order))
        .collect();
    assert_eq!(
        summary,
        vec![
            (EntityKind::Issue, issue.id.as_str(), Some(1), 1),
            (EntityKind::Description, issue.id.as_str(), Some(1), 1),
        ]
    );

    push(
        &client,
        &group,
        "c1",
        2,
        &Mutation::DeleteIssues {
            ids: vec![issue.id.clone()],
        },
        &options,
    )
    .unwrap();
    pull(&client, &PullRequest::new(&group, Some(res.cookie)), &options).unwrap();
    let entries = view_entries(&client, &group).unwrap();
    assert!(entries.iter().all(|e| e.is_delete() && e.order == 2));
    assert_eq!(client_views(&client, &group).unwrap().len(), 2);
}

#[test]
fn postgres_dependent_without_issue_is_rejected_atomically() {
    let Some((_guard, client)) = exclusive_store() else {
        return;
    };
    let group = format!("g-{}", Uuid::new_v4());
    let options = PullOptions::default();

    let err = push(
        &client,
        &group,
        "c1",
        1,
        &Mutation::PutDescription(make_description(7)),
        &options,
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidOperation(_)), "{err:?}");

    // The failed mutation did not advance the client, so id 1 is still expected next.
    assert!(push(
        &client,
        &group,
        "c1",
        1,
        &Mutation::PutIssue {
            issue: make_issue(7),
            description: Some(make_description(7)),
        },
        &options,
    )
    .unwrap());
    assert_eq!(entity_rows(&client, EntityKind::Description).unwrap().len(), 1);
}

#[test]
fn postgres_racing_pulls_get_distinct_orders() {
    let Some((_guard, client)) = exclusive_store() else {
        return;
    };
    let Ok(url) = std::env::var(URL_ENV) else {
        return;
    };
    let group = format!("g-{}", Uuid::new_v4());
    let options = PullOptions {
        max_attempts: 20,
        ..PullOptions::default()
    };
    for n in 0..3 {
        push(
            &client,
            &group,
            "c1",
            n as MutationId + 1,
            &Mutation::PutIssue {
                issue: make_issue(n),
                description: None,
            },
            &options,
        )
        .unwrap();
    }

    let barrier = Barrier::new(2);
    let (url, group_ref, barrier, options) = (&url, &group, &barrier, &options);
    let mut orders: Vec<u64> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                s.spawn(move || {
                    let tab = Rc::new(RefCell::new(Client::connect(url, NoTls).unwrap()));
                    barrier.wait();
                    pull(&tab, &PullRequest::new(group_ref, None), options)
                        .unwrap()
                        .cookie
                        .order
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    orders.sort_unstable();
    assert_eq!(orders, vec![1, 2]);
    assert_eq!(client_views(&client, &group).unwrap().len(), 2);
}

#[test]
fn postgres_schema_bootstrap_is_idempotent_and_rejects_unknown_versions() {
    let Some((_guard, client)) = exclusive_store() else {
        return;
    };
    let mut c = client.borrow_mut();

    let report = ensure_schema(&mut c).unwrap();
    assert!(!report.migrated());
    assert_eq!(report.current_version, SCHEMA_VERSION);
    assert_eq!(schema_version(&mut c).unwrap(), SCHEMA_VERSION);

    c.execute(
        "UPDATE issuesync_meta SET value = '99'::jsonb WHERE key = 'schemaVersion'",
        &[],
    )
    .unwrap();
    let res = ensure_schema(&mut c);
    c.execute(
        "UPDATE issuesync_meta SET value = to_jsonb($1::int8) WHERE key = 'schemaVersion'",
        &[&SCHEMA_VERSION],
    )
    .unwrap();

    assert!(matches!(
        res,
        Err(Error::UnsupportedSchemaVersion {
            found: 99,
            supported: SCHEMA_VERSION
        })
    ));
    assert_eq!(schema_version(&mut c).unwrap(), SCHEMA_VERSION);
}
