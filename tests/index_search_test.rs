use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use tempfile::TempDir;

use notedeck::{ChangeScope, NotesConfig, Session};

fn write_note(path: &Path, content: &str, secs: u64) {
    fs::write(path, content).unwrap();
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs))
        .unwrap();
}

fn indexed_session(root: &Path) -> Session {
    let mut config = NotesConfig::with_directories([root]);
    config.index.enabled = true;
    Session::from_config(config).unwrap()
}

fn as_set(files: &[PathBuf]) -> HashSet<PathBuf> {
    files.iter().cloned().collect()
}

#[test]
fn test_empty_query_lists_newest_first() {
    let temp = TempDir::new().unwrap();
    let old = temp.path().join("old.org");
    let new = temp.path().join("new.org");
    write_note(&old, "Old\n\napple pie", 10);
    write_note(&new, "New\n\nbanana bread", 20);

    let session = indexed_session(temp.path());
    assert_eq!(session.all_files(), &[new.clone(), old.clone()]);
    assert_eq!(session.title(&old), Some("Old"));
}

#[test]
fn test_query_narrows_all_files() {
    let temp = TempDir::new().unwrap();
    let apple = temp.path().join("apple.org");
    let banana = temp.path().join("banana.org");
    write_note(&apple, "Fruit one\n\napple pie recipe", 10);
    write_note(&banana, "Fruit two\n\nbanana bread recipe", 20);
    let mut session = indexed_session(temp.path());

    session.query_changed(Some("apple"));
    assert_eq!(session.query(), Some("apple"));
    assert_eq!(session.all_files(), &[apple.clone()]);

    session.query_changed(Some("recipe"));
    assert_eq!(as_set(session.all_files()), as_set(&[apple.clone(), banana.clone()]));

    session.query_changed(Some("   "));
    assert_eq!(session.query(), None);
    assert_eq!(session.all_files(), &[banana, apple]);
}

#[test]
fn test_files_change_reindexes_before_sourcing() {
    let temp = TempDir::new().unwrap();
    let first = temp.path().join("first.org");
    write_note(&first, "First\n\ncherry", 10);
    let mut session = indexed_session(temp.path());
    session.query_changed(Some("cherry"));
    assert_eq!(session.all_files(), &[first.clone()]);

    let second = temp.path().join("second.org");
    write_note(&second, "Second\n\ncherry tart", 20);
    session.filesystem_changed(ChangeScope::Files, &[second.clone()]);
    assert_eq!(as_set(session.all_files()), as_set(&[first.clone(), second.clone()]));

    fs::remove_file(&first).unwrap();
    session.filesystem_changed(ChangeScope::Files, &[first]);
    assert_eq!(session.all_files(), &[second]);
}

#[test]
fn test_invalid_query_keeps_previous_list() {
    let temp = TempDir::new().unwrap();
    let a = temp.path().join("a.org");
    let b = temp.path().join("b.org");
    write_note(&a, "A\n\nplum", 10);
    write_note(&b, "B\n\npear", 20);
    let mut session = indexed_session(temp.path());

    session.query_changed(Some("plum"));
    assert_eq!(session.all_files(), &[a.clone()]);

    session.query_changed(Some("nosuchfield:plum"));
    assert_eq!(session.all_files(), &[a]);
}
