use predicates::prelude::*;

use super::{set_value, setup, strongbox_cmd};

#[test]
fn test_set_and_get() {
    let home = setup();
    set_value(&home, "/db/password", "hunter2\n");

    strongbox_cmd(&home)
        .args(["get", "db/password"])
        .assert()
        .success()
        .stdout("hunter2");
}

#[test]
fn test_set_password_type() {
    let home = setup();
    strongbox_cmd(&home)
        .args(["set", "/pw", "--type", "password"])
        .write_stdin("s3cret")
        .assert()
        .success()
        .stderr(predicate::str::contains("Credential '/pw' stored"));

    strongbox_cmd(&home)
        .args(["get", "/pw"])
        .assert()
        .success()
        .stdout("s3cret");
}

#[test]
fn test_set_json_type() {
    let home = setup();
    strongbox_cmd(&home)
        .args(["set", "/config", "--type", "json"])
        .write_stdin(r#"{"host": "db.internal", "port": 5432}"#)
        .assert()
        .success();

    strongbox_cmd(&home)
        .args(["get", "/config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"port\": 5432"));
}

#[test]
fn test_get_versions_newest_first() {
    let home = setup();
    set_value(&home, "/rotated", "one");
    set_value(&home, "/rotated", "two");
    set_value(&home, "/rotated", "three");

    let output = strongbox_cmd(&home)
        .args(["get", "/rotated", "--versions", "2", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["value"], "three");
    assert_eq!(data[1]["value"], "two");
}

#[test]
fn test_get_by_id() {
    let home = setup();
    let output = strongbox_cmd(&home)
        .args(["set", "/by-id", "--json"])
        .write_stdin("first")
        .output()
        .unwrap();
    let written: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let id = written["id"].as_str().unwrap().to_string();
    set_value(&home, "/by-id", "second");

    strongbox_cmd(&home)
        .args(["get", "--id", &id])
        .assert()
        .success()
        .stdout("first");
}

#[test]
fn test_converge_mode_keeps_identical_value() {
    let home = setup();
    for _ in 0..2 {
        strongbox_cmd(&home)
            .args(["set", "/stable", "--mode", "converge"])
            .write_stdin("same")
            .assert()
            .success();
    }

    let output = strongbox_cmd(&home)
        .args(["get", "/stable", "--versions", "10", "--json"])
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
}

#[test]
fn test_find_lists_names_under_path() {
    let home = setup();
    set_value(&home, "/team/a", "1");
    set_value(&home, "/team/b", "2");
    set_value(&home, "/elsewhere", "3");

    strongbox_cmd(&home)
        .args(["find", "/team"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/team/a"))
        .stdout(predicate::str::contains("/team/b"))
        .stdout(predicate::str::contains("/elsewhere").not());
}

#[test]
fn test_delete() {
    let home = setup();
    set_value(&home, "/doomed", "v");

    strongbox_cmd(&home)
        .args(["delete", "/doomed"])
        .assert()
        .success()
        .stderr(predicate::str::contains("deleted"));

    strongbox_cmd(&home)
        .args(["get", "/doomed"])
        .assert()
        .failure()
        .code(3);

    strongbox_cmd(&home)
        .args(["delete", "/doomed"])
        .assert()
        .failure()
        .code(3);
}

#[test]
fn test_store_file_is_not_plaintext() {
    let home = setup();
    set_value(&home, "/plain", "very-recognisable-secret");

    let bytes = std::fs::read(home.path().join("store.db")).unwrap();
    let needle = b"very-recognisable-secret";
    assert!(!bytes.windows(needle.len()).any(|w| w == needle));
}
