mod common;

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use common::{p, read, write, FakeRemote};
use galley_core::{IgnoreRules, KitchenName, RecipeName};
use galley_sync::remote::MergeFileResponse;
use galley_sync::{GetOptions, GetOutcome, LocalStateTracker, RecipeSyncOrchestrator};
use tempfile::TempDir;

fn kitchen() -> KitchenName {
    KitchenName::from("dev")
}

fn recipe() -> RecipeName {
    RecipeName::from("demo")
}

fn get(remote: &FakeRemote, kitchen_dir: &Path, options: GetOptions) -> GetOutcome {
    let sync = RecipeSyncOrchestrator::new(remote, IgnoreRules::default());
    sync.get(
        &kitchen(),
        &recipe(),
        kitchen_dir,
        options,
        &|_: &[PathBuf], _: &[PathBuf]| true,
    )
    .expect("get")
}

fn fresh(remote: &FakeRemote) -> (TempDir, PathBuf) {
    let workspace = TempDir::new().expect("workspace");
    let outcome = get(remote, workspace.path(), GetOptions::default());
    assert!(outcome.fresh);
    let recipe_dir = workspace.path().join("demo");
    (workspace, recipe_dir)
}

#[test]
fn fresh_get_writes_every_file_and_sets_baseline() {
    let remote = FakeRemote::new("demo", &[("a.txt", "A"), ("res/c.sql", "select 1;")]);
    let workspace = TempDir::new().expect("workspace");

    let outcome = get(&remote, workspace.path(), GetOptions::default());

    assert!(outcome.fresh);
    assert_eq!(outcome.fetched, vec![p("a.txt"), p("res/c.sql")]);
    assert_eq!(outcome.baseline.as_ref().map(|b| b.0.as_str()), Some("head-1"));

    let recipe_dir = workspace.path().join("demo");
    assert_eq!(read(&recipe_dir, "res/c.sql"), "select 1;");
    let tracker = LocalStateTracker::open(&recipe_dir).expect("tracker");
    assert_eq!(tracker.lookup(&p("a.txt")), Some(&remote.id_of("a.txt")));
    assert_eq!(tracker.baseline().map(|b| b.0.as_str()), Some("head-1"));
}

#[test]
fn freshly_fetched_recipe_reports_clean_status() {
    let remote = FakeRemote::new("demo", &[("a.txt", "A"), ("res/deep/c.sql", "select 1;")]);
    let (_workspace, recipe_dir) = fresh(&remote);

    let sync = RecipeSyncOrchestrator::new(&remote, IgnoreRules::default());
    let report = sync.status(&kitchen(), &recipe(), &recipe_dir).expect("status");

    assert!(report.is_clean(), "{}", report.render());
    assert_eq!(report.unchanged, 2);
}

#[test]
fn only_remote_modified_files_are_rewritten() {
    let remote = FakeRemote::new("demo", &[("a.txt", "A"), ("b.txt", "B1")]);
    let (workspace, recipe_dir) = fresh(&remote);
    remote.edit("b.txt", "B2");

    let outcome = get(&remote, workspace.path(), GetOptions::default());

    assert!(!outcome.fresh);
    assert_eq!(outcome.merged, vec![p("b.txt")]);
    assert!(outcome.written.is_empty());
    assert_eq!(*remote.merge_requests.borrow(), vec![p("b.txt")]);
    assert_eq!(read(&recipe_dir, "a.txt"), "A");
    assert_eq!(read(&recipe_dir, "b.txt"), "B2");

    let tracker = LocalStateTracker::open(&recipe_dir).expect("tracker");
    assert_eq!(tracker.lookup(&p("b.txt")), Some(&remote.id_of("b.txt")));
    assert_eq!(tracker.baseline(), Some(&*remote.head.borrow()));
}

#[test]
fn conflicting_merge_is_written_and_recorded() {
    let remote = FakeRemote::new("demo", &[("b.txt", "base\n")]);
    let (workspace, recipe_dir) = fresh(&remote);
    remote.edit("b.txt", "theirs\n");
    write(&recipe_dir, "b.txt", "mine\n");
    let conflicted = "<<<<<<< local\nmine\n=======\ntheirs\n>>>>>>> remote\n";
    remote.merge_responses.borrow_mut().insert(
        p("b.txt"),
        MergeFileResponse {
            merged_content: Some(conflicted.as_bytes().to_vec()),
            error: None,
        },
    );

    let outcome = get(&remote, workspace.path(), GetOptions::default());

    assert_eq!(outcome.conflicted, vec![p("b.txt")]);
    assert!(outcome.render().contains("CONFLICT (content): Merge conflict in b.txt"));
    assert_eq!(read(&recipe_dir, "b.txt"), conflicted);
    let tracker = LocalStateTracker::open(&recipe_dir).expect("tracker");
    assert_eq!(tracker.conflicts().collect::<Vec<_>>(), vec!["b.txt"]);
}

#[test]
fn failed_merge_keeps_local_file_and_baseline() {
    let remote = FakeRemote::new("demo", &[("b.txt", "one")]);
    let (workspace, recipe_dir) = fresh(&remote);
    remote.edit("b.txt", "two");
    remote.merge_responses.borrow_mut().insert(
        p("b.txt"),
        MergeFileResponse {
            merged_content: None,
            error: Some("merge service unavailable".to_string()),
        },
    );

    let outcome = get(&remote, workspace.path(), GetOptions::default());

    assert!(!outcome.is_success());
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].0, "b.txt");
    assert!(outcome.baseline.is_none());
    assert_eq!(read(&recipe_dir, "b.txt"), "one");
    let tracker = LocalStateTracker::open(&recipe_dir).expect("tracker");
    assert_eq!(tracker.baseline().map(|b| b.0.as_str()), Some("head-1"));
}

#[test]
fn binary_files_are_not_merged() {
    let remote = FakeRemote::new("demo", &[("logo.png", "v1")]);
    let (workspace, recipe_dir) = fresh(&remote);
    remote.edit("logo.png", "v2");

    let outcome = get(&remote, workspace.path(), GetOptions::default());

    assert_eq!(outcome.skipped_binary, vec![p("logo.png")]);
    assert!(remote.merge_requests.borrow().is_empty());
    assert_eq!(read(&recipe_dir, "logo.png"), "v1");
}

#[test]
fn overwrite_takes_remote_copy_of_local_edits() {
    let remote = FakeRemote::new("demo", &[("a.txt", "A"), ("b.txt", "B")]);
    let (workspace, recipe_dir) = fresh(&remote);
    write(&recipe_dir, "a.txt", "local edit");

    let options = GetOptions {
        overwrite: true,
        ..GetOptions::default()
    };
    let outcome = get(&remote, workspace.path(), options);

    assert_eq!(outcome.written, vec![p("a.txt")]);
    assert_eq!(read(&recipe_dir, "a.txt"), "A");
    assert!(remote.merge_requests.borrow().is_empty());
    let requests = remote.get_requests.borrow();
    assert_eq!(requests.last(), Some(&Some(vec!["a.txt".to_string()])));
}

#[test]
fn local_edits_survive_get_without_overwrite() {
    let remote = FakeRemote::new("demo", &[("a.txt", "A")]);
    let (workspace, recipe_dir) = fresh(&remote);
    write(&recipe_dir, "a.txt", "local edit");

    let outcome = get(&remote, workspace.path(), GetOptions::default());

    assert!(outcome.is_success());
    assert_eq!(read(&recipe_dir, "a.txt"), "local edit");
}

#[test]
fn remote_only_directory_is_fetched_with_one_request() {
    let remote = FakeRemote::new("demo", &[("a.txt", "A")]);
    let (workspace, recipe_dir) = fresh(&remote);
    remote.edit("res/2.txt", "two");
    remote.edit("res/x/1.txt", "one");
    remote.edit("top.txt", "top");

    let outcome = get(&remote, workspace.path(), GetOptions::default());

    assert_eq!(outcome.fetched, vec![p("res/2.txt"), p("res/x/1.txt"), p("top.txt")]);
    let requests = remote.get_requests.borrow();
    assert_eq!(
        requests.last(),
        Some(&Some(vec!["res/*".to_string(), "top.txt".to_string()]))
    );
    assert_eq!(read(&recipe_dir, "res/x/1.txt"), "one");
}

#[test]
fn declined_confirmation_keeps_local_only_items() {
    let remote = FakeRemote::new("demo", &[("a.txt", "A")]);
    let (workspace, recipe_dir) = fresh(&remote);
    write(&recipe_dir, "scratch.txt", "s");
    write(&recipe_dir, "tmp/x.txt", "x");

    let asked = RefCell::new(None);
    let confirm = |files: &[PathBuf], dirs: &[PathBuf]| {
        *asked.borrow_mut() = Some((files.to_vec(), dirs.to_vec()));
        false
    };
    let sync = RecipeSyncOrchestrator::new(&remote, IgnoreRules::default());
    let options = GetOptions {
        delete_local: true,
        ..GetOptions::default()
    };
    let outcome = sync
        .get(&kitchen(), &recipe(), workspace.path(), options, &confirm)
        .expect("get");

    assert_eq!(
        asked.into_inner(),
        Some((vec![recipe_dir.join("scratch.txt")], vec![recipe_dir.join("tmp")]))
    );
    assert!(outcome.deleted.is_empty());
    assert!(outcome
        .warnings
        .contains(&"Skipping deletion of local items.".to_string()));
    assert!(recipe_dir.join("scratch.txt").is_file());
    assert!(recipe_dir.join("tmp/x.txt").is_file());
}

#[test]
fn confirmed_deletion_removes_local_only_items() {
    let remote = FakeRemote::new("demo", &[("a.txt", "A")]);
    let (workspace, recipe_dir) = fresh(&remote);
    write(&recipe_dir, "scratch.txt", "s");
    write(&recipe_dir, "tmp/x.txt", "x");

    let options = GetOptions {
        delete_local: true,
        ..GetOptions::default()
    };
    let outcome = get(&remote, workspace.path(), options);

    assert_eq!(outcome.deleted, vec![p("scratch.txt"), p("tmp")]);
    assert!(!recipe_dir.join("scratch.txt").exists());
    assert!(!recipe_dir.join("tmp").exists());
    assert!(recipe_dir.join("a.txt").is_file());
}

#[test]
fn merge_without_baseline_fails_with_hint() {
    let remote = FakeRemote::new("demo", &[("a.txt", "remote")]);
    let workspace = TempDir::new().expect("workspace");
    let recipe_dir = workspace.path().join("demo");
    write(&recipe_dir, "a.txt", "local");

    let outcome = get(&remote, workspace.path(), GetOptions::default());

    assert_eq!(outcome.failed.len(), 1);
    assert!(outcome.failed[0].1.contains("--overwrite"));
    assert!(outcome.baseline.is_none());
    assert_eq!(read(&recipe_dir, "a.txt"), "local");
}

#[test]
fn invalid_recipe_name_is_rejected_before_any_request() {
    let remote = FakeRemote::new("demo", &[]);
    let workspace = TempDir::new().expect("workspace");
    let sync = RecipeSyncOrchestrator::new(&remote, IgnoreRules::default());

    let err = sync
        .get(
            &kitchen(),
            &RecipeName::from("../escape"),
            workspace.path(),
            GetOptions::default(),
            &|_: &[PathBuf], _: &[PathBuf]| true,
        )
        .expect_err("invalid name");

    assert_eq!(err.kind(), galley_sync::ErrorKind::Validation);
    assert!(remote.get_requests.borrow().is_empty());
}

#[cfg(unix)]
#[test]
fn unrecorded_write_is_reported_as_failed() {
    use std::os::unix::fs::PermissionsExt;

    let remote = FakeRemote::new("demo", &[("a.txt", "A")]);
    let (workspace, recipe_dir) = fresh(&remote);
    remote.edit("c.txt", "C");
    let meta_dir = recipe_dir.join(".galley");
    let set_mode = |mode| {
        let mut perms = std::fs::metadata(&meta_dir).expect("meta dir").permissions();
        perms.set_mode(mode);
        std::fs::set_permissions(&meta_dir, perms).expect("chmod");
    };
    set_mode(0o555);

    let outcome = get(&remote, workspace.path(), GetOptions::default());

    set_mode(0o755);
    assert_eq!(read(&recipe_dir, "c.txt"), "C");
    // Root ignores directory permissions; only assert when recording failed.
    if outcome.is_success() {
        return;
    }
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].0, "c.txt");
    assert!(outcome.fetched.is_empty());
    assert!(outcome.baseline.is_none());
    let tracker = LocalStateTracker::open(&recipe_dir).expect("tracker");
    assert_eq!(tracker.lookup(&p("c.txt")), None);
    assert_eq!(tracker.baseline().map(|b| b.0.as_str()), Some("head-1"));
}
