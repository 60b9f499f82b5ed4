use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use repovis::git::CommitStream;
use repovis::ingest::{reconcile, IngestOptions, Ingestor};
use repovis::model::{ContributorFilter, DateWindow, MetricSelector, TreeOutput};
use repovis::{QueryService, RepoVisError, Store};
use std::collections::HashSet;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SEP: char = '\u{1f}';

// C1: 2024-01-01 alice touches a/b.txt (+2/-0)
// C2: 2024-01-02 bob touches a/b.txt (+0/-1) and a/c.txt (+3/-0)
fn history() -> String {
    [
        format!("c2{SEP}Bob{SEP}bob@example.com{SEP}1704196800{SEP}second"),
        String::new(),
        "0\t1\ta/b.txt".to_string(),
        "3\t0\ta/c.txt".to_string(),
        String::new(),
        format!("c1{SEP}Alice{SEP}alice@example.com{SEP}1704110400{SEP}first"),
        String::new(),
        "2\t0\ta/b.txt".to_string(),
        String::new(),
    ]
    .join("\n")
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn build(dir: &TempDir, text: &str, batch_size: usize) -> PathBuf {
    let path = dir.path().join("scenario.db");
    let mut store = Store::create(&path).unwrap();
    Ingestor::new(&mut store, IngestOptions { batch_size, ..Default::default() })
        .run(CommitStream::new(Cursor::new(text.to_string())))
        .unwrap();
    path
}

fn totals(tree: &TreeOutput, path: &str) -> Option<(u64, u64, u64)> {
    tree.files
        .iter()
        .find(|f| f.node.path == path)
        .and_then(|f| f.metrics.as_ref())
        .map(|m| (m.commit_count, m.lines_added, m.lines_deleted))
}

fn service(path: &Path) -> QueryService {
    QueryService::open(path).unwrap()
}

fn everything() -> DateWindow {
    DateWindow::new(Some(day(1)), Some(day(31)))
}

#[test]
fn file_and_directory_totals() {
    let dir = tempfile::tempdir().unwrap();
    let path = build(&dir, &history(), 1000);
    let tree = service(&path)
        .get_tree(&everything(), &ContributorFilter::All, MetricSelector::CommitCount)
        .unwrap();

    assert_eq!(totals(&tree, "a/b.txt"), Some((2, 2, 1)));
    assert_eq!(totals(&tree, "a/c.txt"), Some((1, 3, 0)));
    // one event from C1, two from C2
    assert_eq!(totals(&tree, "a/"), Some((3, 5, 1)));
    assert_eq!(tree.date_range.min_date, Some(day(1)));
    assert_eq!(tree.date_range.max_date, Some(day(2)));
}

#[test]
fn malformed_header_is_skipped_and_neighbours_kept() {
    let broken = [
        format!("c2{SEP}Bob{SEP}bob@example.com{SEP}1704196800{SEP}second"),
        "0\t1\ta/b.txt".to_string(),
        "3\t0\ta/c.txt".to_string(),
        format!("bad{SEP}Mallory{SEP}m@example.com{SEP}not-a-time{SEP}broken"),
        "9\t9\ta/b.txt".to_string(),
        "9\t9\tghost.txt".to_string(),
        format!("c1{SEP}Alice{SEP}alice@example.com{SEP}1704110400{SEP}first"),
        "2\t0\ta/b.txt".to_string(),
    ]
    .join("\n");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario.db");
    let summary = {
        let mut store = Store::create(&path).unwrap();
        let mut stream = CommitStream::new(Cursor::new(broken));
        let summary = Ingestor::new(&mut store, IngestOptions::default())
            .run(&mut stream)
            .unwrap();
        assert_eq!(stream.malformed_count(), 1);
        summary
    };
    assert_eq!(summary.commits, 2);

    let svc = service(&path);
    let tree = svc
        .get_tree(&everything(), &ContributorFilter::All, MetricSelector::CommitCount)
        .unwrap();
    assert_eq!(totals(&tree, "a/b.txt"), Some((2, 2, 1)));
    assert_eq!(totals(&tree, "a/"), Some((3, 5, 1)));
    assert!(tree.files.iter().all(|f| f.node.path != "ghost.txt"));

    let names: Vec<_> = svc.get_contributors().unwrap().into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["Alice", "Bob"]);
}

#[test]
fn batch_size_does_not_change_results() {
    let dir = tempfile::tempdir().unwrap();
    let big = service(&build(&dir, &history(), 1000))
        .get_tree(&everything(), &ContributorFilter::All, MetricSelector::LinesAdded)
        .unwrap();
    let other = tempfile::tempdir().unwrap();
    let small = service(&build(&other, &history(), 1))
        .get_tree(&everything(), &ContributorFilter::All, MetricSelector::LinesAdded)
        .unwrap();
    assert_eq!(big, small);
}

#[test]
fn window_limits_to_first_day() {
    let dir = tempfile::tempdir().unwrap();
    let path = build(&dir, &history(), 1000);
    let window = DateWindow::new(Some(day(1)), Some(day(1)));
    let tree = service(&path)
        .get_tree(&window, &ContributorFilter::All, MetricSelector::CommitCount)
        .unwrap();

    assert_eq!(totals(&tree, "a/b.txt"), Some((1, 2, 0)));
    assert_eq!(totals(&tree, "a/c.txt"), None);
    assert!(tree.files.iter().any(|f| f.node.path == "a/c.txt"));
}

#[test]
fn no_window_means_no_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let path = build(&dir, &history(), 1000);
    let tree = service(&path)
        .get_tree(&DateWindow::default(), &ContributorFilter::All, MetricSelector::CommitCount)
        .unwrap();
    assert_eq!(tree.files.len(), 3);
    assert!(tree.files.iter().all(|f| f.metrics.is_none()));
    let paths: Vec<_> = tree.files.iter().map(|f| f.node.path.as_str()).collect();
    assert_eq!(paths, vec!["a/", "a/b.txt", "a/c.txt"]);
}

#[test]
fn selector_and_contributor_filters() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&build(&dir, &history(), 1000));
    let people = svc.get_contributors().unwrap();
    let names: Vec<_> = people.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Alice", "Bob"]);
    let alice = people[0].id;

    let only_alice = svc
        .get_tree(&everything(), &ContributorFilter::Include(vec![alice]), MetricSelector::LinesAdded)
        .unwrap();
    let b = only_alice.files.iter().find(|f| f.node.path == "a/b.txt").unwrap();
    assert_eq!(b.metrics.as_ref().unwrap().value, 2);
    assert_eq!(totals(&only_alice, "a/c.txt"), None);

    let without_alice = svc
        .get_tree(&everything(), &ContributorFilter::Exclude(vec![alice]), MetricSelector::LinesDeleted)
        .unwrap();
    let b = without_alice.files.iter().find(|f| f.node.path == "a/b.txt").unwrap();
    assert_eq!(b.metrics.as_ref().unwrap().value, 1);
    assert_eq!(without_alice.metric_type, MetricSelector::LinesDeleted);
}

#[test]
fn commit_count_matches_touching_commits() {
    let dir = tempfile::tempdir().unwrap();
    let path = build(&dir, &history(), 1);
    let svc = service(&path);
    let tree = svc
        .get_tree(&everything(), &ContributorFilter::All, MetricSelector::CommitCount)
        .unwrap();

    let commits = repovis::git::parser::parse_all(Cursor::new(history())).unwrap();
    for file in ["a/b.txt", "a/c.txt"] {
        let touching = commits
            .iter()
            .filter(|c| c.changed_paths.iter().any(|p| p.path == file))
            .count() as u64;
        assert_eq!(totals(&tree, file).unwrap().0, touching, "{file}");
    }
    let events_under_a: u64 = commits
        .iter()
        .map(|c| c.changed_paths.iter().filter(|p| p.path.starts_with("a/")).count() as u64)
        .sum();
    assert_eq!(totals(&tree, "a/").unwrap().0, events_under_a);
}

#[test]
fn reconciliation_drops_removed_file_but_not_timeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = build(&dir, &history(), 1000);
    {
        let mut store = Store::create(&path).unwrap();
        let snapshot: HashSet<String> = ["a/", "a/b.txt"].iter().map(|s| s.to_string()).collect();
        assert_eq!(reconcile(&mut store, &snapshot).unwrap(), 1);
    }

    let svc = service(&path);
    let tree = svc
        .get_tree(&everything(), &ContributorFilter::All, MetricSelector::CommitCount)
        .unwrap();
    assert!(tree.files.iter().all(|f| f.node.path != "a/c.txt"));
    assert_eq!(totals(&tree, "a/b.txt"), Some((2, 2, 1)));

    let timeline = svc.get_timeline(&DateWindow::default()).unwrap();
    let counts: Vec<_> = timeline.iter().map(|b| (b.date, b.count)).collect();
    assert_eq!(counts, vec![(day(1), 1), (day(2), 1)]);

    let only_second = svc.get_timeline(&DateWindow::new(Some(day(2)), None)).unwrap();
    assert_eq!(only_second.len(), 1);
}

#[test]
fn file_detail_and_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&build(&dir, &history(), 1000));
    let tree = svc
        .get_tree(&DateWindow::default(), &ContributorFilter::All, MetricSelector::CommitCount)
        .unwrap();
    let b = tree.files.iter().find(|f| f.node.path == "a/b.txt").unwrap();
    let a = tree.files.iter().find(|f| f.node.path == "a/").unwrap();
    assert_eq!(b.node.parent_id, Some(a.node.id));
    assert!(a.node.is_directory);

    let detail = svc.get_file_detail(b.node.id).unwrap();
    assert_eq!(detail.node.name, "b.txt");
    // equal commit counts fall back to contributor id order
    let top: Vec<_> = detail.top_contributors.iter().map(|c| (c.name.as_str(), c.commits)).collect();
    assert_eq!(top, vec![("Bob", 1), ("Alice", 1)]);

    let dir_detail = svc.get_file_detail(a.node.id).unwrap();
    assert_eq!(dir_detail.top_contributors[0].name, "Bob");
    assert_eq!(dir_detail.top_contributors[0].commits, 2);

    let err = svc.get_file_detail(9999).unwrap_err();
    assert!(matches!(err, RepoVisError::NotFound(9999)));
    assert!(err.is_client_error());
}

#[test]
fn duplicate_revision_keeps_one_commit_row() {
    let dir = tempfile::tempdir().unwrap();
    let doubled = format!("{}\n{}", history(), history());
    let svc = service(&build(&dir, &doubled, 1));
    let timeline = svc.get_timeline(&DateWindow::default()).unwrap();
    let total: u64 = timeline.iter().map(|b| b.count).sum();
    assert_eq!(total, 2);
    let tree = svc
        .get_tree(&everything(), &ContributorFilter::All, MetricSelector::CommitCount)
        .unwrap();
    assert_eq!(totals(&tree, "a/b.txt"), Some((2, 2, 1)));
}

#[test]
fn missing_store_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let err = QueryService::open(dir.path().join("never-built.db")).unwrap_err();
    assert!(matches!(err, RepoVisError::StoreMissing(_)));
}

#[test]
fn concurrent_readers() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(&build(&dir, &history(), 1000));
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    svc.get_tree(&everything(), &ContributorFilter::All, MetricSelector::CommitCount)
                        .unwrap()
                        .files
                        .len()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 3);
        }
    });
}
