use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use issuesync_core::{
    Comment, Issue, MemoryStore, PullOptions, PullRequest, RowWriter, MAX_PAGE_SIZE,
};

fn seeded_store(issues: usize) -> MemoryStore {
    let mut store = MemoryStore::new();
    for n in 0..issues {
        let id = format!("iss-{n:08}");
        store
            .put_issue(&Issue {
                id: id.clone(),
                title: format!("Issue {n}"),
                priority: None,
                status: None,
                modified: n as i64,
                created: n as i64,
                creator: "bench".into(),
                kanban_order: None,
                version: 0,
            })
            .unwrap();
        store
            .put_comment(&Comment {
                id: format!("com-{n:08}"),
                issue_id: id,
                created: n as i64,
                body: "comment".into(),
                creator: "bench".into(),
                version: 0,
            })
            .unwrap();
    }
    store
}

/// Pulls until the backlog is drained and returns the number of pages.
fn drain(store: &mut MemoryStore, options: &PullOptions) -> usize {
    let mut cookie = None;
    let mut pages = 0;
    loop {
        let res = store
            .pull(&PullRequest::new("bench", cookie), options)
            .unwrap();
        pages += 1;
        cookie = Some(res.cookie);
        if !res.has_more {
            return pages;
        }
    }
}

fn bench_initial_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("initial_sync");
    group.sample_size(10);
    let options = PullOptions::default();
    for &count in &[100usize, 1_000, 5_000] {
        let store = seeded_store(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                let mut store = store.clone();
                black_box(drain(&mut store, &options))
            });
        });
    }
    group.finish();
}

fn bench_fast_forward(c: &mut Criterion) {
    let mut store = seeded_store(MAX_PAGE_SIZE / 2);
    let options = PullOptions::default();
    drain(&mut store, &options);

    c.bench_function("fast_forward_from_empty_cookie", |b| {
        b.iter(|| {
            let mut store = store.clone();
            black_box(store.pull(&PullRequest::new("bench", None), &options).unwrap())
        });
    });
}

criterion_group!(benches, bench_initial_sync, bench_fast_forward);
criterion_main!(benches);
