use std::collections::BTreeSet;

use proptest::prelude::*;

use issuesync_core::{Description, EntityKind, Issue, Mutation};
use issuesync_test_support::fixtures::{
    comment_id, issue_id, make_comment, make_description, make_issue, retitled,
};
use issuesync_test_support::{row_set, MemoryBackend, Replica, SyncBackend};

#[derive(Clone, Debug)]
enum Step {
    Push { tab: usize, mutation: Mutation },
    Pull { tab: usize },
}

/// Content variant `take` of issue `n`; re-creating a deleted id usually brings new content.
fn issue_take(n: usize, take: usize) -> Issue {
    match take {
        0 => make_issue(n),
        _ => retitled(make_issue(n), &format!("take {take}")),
    }
}

fn description_take(n: usize, take: usize) -> Description {
    let mut description = make_description(n);
    if take > 0 {
        description.body = format!("body take {take}");
    }
    description
}

fn mutation() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        (0usize..6, 0usize..3, any::<bool>()).prop_map(|(n, take, described)| {
            Mutation::PutIssue {
                issue: issue_take(n, take),
                description: described.then(|| description_take(n, take)),
            }
        }),
        prop::collection::vec(0usize..6, 1..4).prop_map(|ns| Mutation::UpdateIssues {
            issues: ns
                .into_iter()
                .map(|n| retitled(make_issue(n), "edited"))
                .collect(),
        }),
        (0usize..6, 0usize..3)
            .prop_map(|(n, take)| Mutation::PutDescription(description_take(n, take))),
        (0usize..8, 0usize..6, 0usize..3).prop_map(|(c, n, take)| {
            let mut comment = make_comment(c, n);
            comment.body = format!("{} take {take}", comment.body);
            Mutation::PutIssueComment(comment)
        }),
        (0usize..8).prop_map(|c| Mutation::DeleteIssueComment { id: comment_id(c) }),
        prop::collection::vec(0usize..6, 1..3).prop_map(|ns| Mutation::DeleteIssues {
            ids: ns.into_iter().map(issue_id).collect(),
        }),
    ]
}

fn steps() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(
        prop_oneof![
            (0usize..2, mutation()).prop_map(|(tab, mutation)| Step::Push { tab, mutation }),
            (0usize..2).prop_map(|tab| Step::Pull { tab }),
        ],
        1..40,
    )
}

/// Pushes through `tab`, rewinding its mutation id when the store rejects the mutation.
fn try_mutate(tab: &mut Replica, backend: &mut MemoryBackend, mutation: Mutation) {
    if tab.mutate(backend, mutation).is_err() {
        tab.last_mutation_id -= 1;
    }
}

proptest! {
    #[test]
    fn tabs_converge_after_draining(steps in steps(), page_size in 1usize..6) {
        let mut backend = MemoryBackend::default();
        backend.set_page_size(page_size);
        let mut tabs = [Replica::new("g1", "tab-a"), Replica::new("g1", "tab-b")];

        for step in steps {
            match step {
                Step::Push { tab, mutation } => try_mutate(&mut tabs[tab], &mut backend, mutation),
                Step::Pull { tab } => {
                    tabs[tab].pull(&mut backend).unwrap();
                }
            }
        }

        let expected = row_set(backend.rows().unwrap());
        for tab in &mut tabs {
            tab.pull_until_empty(&mut backend).unwrap();
            prop_assert_eq!(&tab.rows, &expected);
        }
    }

    #[test]
    fn pages_never_repeat_a_row(steps in steps()) {
        let mut backend = MemoryBackend::default();
        backend.set_page_size(2);
        let mut tab = Replica::new("g1", "tab-a");
        for step in steps {
            if let Step::Push { mutation, .. } = step {
                try_mutate(&mut tab, &mut backend, mutation);
            }
        }

        for response in tab.pull_until_empty(&mut backend).unwrap() {
            let page = &response.page;
            for kind in EntityKind::ALL {
                let puts = page.put_ids(kind);
                let unique: BTreeSet<&str> = puts.iter().copied().collect();
                prop_assert_eq!(unique.len(), puts.len());
                for id in page.deletes(kind) {
                    prop_assert!(!unique.contains(id.as_str()));
                }
            }
        }
    }
}
