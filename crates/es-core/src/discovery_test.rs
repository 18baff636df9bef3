use super::*;
use std::fs;
use tempfile::TempDir;

fn suite(files: &[&str]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for file in files {
        let path = dir.path().join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "SELECT 1 WHERE 1 = 0;\n").unwrap();
    }
    dir
}

#[test]
fn test_discovers_root_and_one_level_of_subfolders() {
    let dir = suite(&[
        "Orders_Not_Null.es.sql",
        "finance/revenue_positive.es.sql",
        "finance/deep/ignored.es.sql",
        "notes.sql",
    ]);

    let tests = discover_tests(dir.path(), None).unwrap();

    assert_eq!(
        tests.keys().collect::<Vec<_>>(),
        vec!["orders_not_null", "revenue_positive"]
    );
    let orders = &tests["orders_not_null"];
    assert_eq!(orders.subgroup, None);
    assert_eq!(orders.path, dir.path().join("Orders_Not_Null.es.sql"));

    let revenue = &tests["revenue_positive"];
    assert_eq!(revenue.subgroup.as_deref(), Some("finance"));
    assert_eq!(revenue.display_name(), "finance/revenue_positive");
}

#[test]
fn test_subgroup_filter() {
    let dir = suite(&[
        "top.es.sql",
        "finance/a.es.sql",
        "marketing/b.es.sql",
    ]);

    let tests = discover_tests(dir.path(), Some("finance")).unwrap();
    assert_eq!(tests.keys().collect::<Vec<_>>(), vec!["a"]);
}

#[test]
fn test_missing_root_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let tests = discover_tests(&dir.path().join("es_suite"), None).unwrap();
    assert!(tests.is_empty());
}

#[test]
fn test_duplicate_names_rejected() {
    let dir = suite(&["dupe.es.sql", "finance/DUPE.es.sql"]);

    let err = discover_tests(dir.path(), None).unwrap_err();
    match err {
        CoreError::DuplicateTest { name, .. } => assert_eq!(name, "dupe"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_directories_with_test_suffix_are_skipped() {
    let dir = suite(&["real.es.sql"]);
    fs::create_dir_all(dir.path().join("folder.es.sql")).unwrap();

    let tests = discover_tests(dir.path(), None).unwrap();
    assert_eq!(tests.len(), 1);
}

#[test]
fn test_root_with_glob_metacharacters() {
    let parent = tempfile::tempdir().unwrap();
    let root = parent.path().join("suite[1]");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("check.es.sql"), "SELECT 1").unwrap();

    let tests = discover_tests(&root, None).unwrap();
    assert!(tests.contains_key("check"));
}

#[test]
fn test_find_test_by_name_and_subgroup() {
    let dir = suite(&["Top.es.sql", "finance/rev.es.sql"]);

    let top = find_test(dir.path(), "TOP").unwrap().unwrap();
    assert_eq!(top.name, "top");

    let rev = find_test(dir.path(), "finance/REV").unwrap().unwrap();
    assert_eq!(rev.subgroup.as_deref(), Some("finance"));

    assert!(find_test(dir.path(), "marketing/rev").unwrap().is_none());
    assert!(find_test(dir.path(), "missing").unwrap().is_none());
}

#[test]
fn test_subgroup_matches_case_insensitively() {
    let dir = suite(&["checks/orders.es.sql"]);

    let found = find_test(dir.path(), "Checks/orders").unwrap().unwrap();
    assert_eq!(found.subgroup.as_deref(), Some("checks"));
    assert!(find_test(dir.path(), "CHECKS/ORDERS").unwrap().is_some());

    let tests = discover_tests(dir.path(), Some("CHECKS")).unwrap();
    assert!(tests.contains_key("orders"));
}
