use predicates::prelude::*;

use super::{as_actor, json_error, set_value, setup, strongbox_cmd};

const BOB: &str = "uaa-user:bob";

#[test]
fn test_unauthorized_read_looks_like_not_found() {
    let home = setup();
    set_value(&home, "/private", "secret");

    let denied = as_actor(&home, BOB).args(["get", "/private", "--json"]).output().unwrap();
    let missing = as_actor(&home, BOB).args(["get", "/absent", "--json"]).output().unwrap();

    assert_eq!(denied.status.code(), Some(3));
    assert_eq!(json_error(&denied), json_error(&missing));
}

#[test]
fn test_grant_list_revoke() {
    let home = setup();
    set_value(&home, "/team/db", "pw");

    strongbox_cmd(&home)
        .args(["permission", "grant", "/team/*", "--grantee", BOB, "--operations", "read"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Granted read"));

    as_actor(&home, BOB)
        .args(["get", "/team/db"])
        .assert()
        .success()
        .stdout("pw");
    as_actor(&home, BOB)
        .args(["set", "/team/db"])
        .write_stdin("changed")
        .assert()
        .failure()
        .code(3);

    let output = strongbox_cmd(&home)
        .args(["permission", "list", "/team/*", "--json"])
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let entries = json["permissions"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["actor"], BOB);
    assert_eq!(entries[0]["operations"], serde_json::json!(["read"]));

    strongbox_cmd(&home)
        .args(["permission", "revoke", "/team/*", "--grantee", BOB])
        .assert()
        .success();
    as_actor(&home, BOB)
        .args(["get", "/team/db"])
        .assert()
        .failure()
        .code(3);
}

#[test]
fn test_update_replaces_operations() {
    let home = setup();
    set_value(&home, "/svc/token", "t");

    let output = strongbox_cmd(&home)
        .args(["permission", "grant", "/svc/token", "--grantee", BOB, "--operations", "read", "--json"])
        .output()
        .unwrap();
    let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let id = entries[0]["uuid"].as_str().unwrap().to_string();

    strongbox_cmd(&home)
        .args(["permission", "update", &id, "--operations", "write"])
        .assert()
        .success();

    as_actor(&home, BOB).args(["get", "/svc/token"]).assert().failure().code(3);
    as_actor(&home, BOB)
        .args(["set", "/svc/token"])
        .write_stdin("rotated")
        .assert()
        .success();
}

#[test]
fn test_acl_management_denial_is_explicit() {
    let home = setup();
    as_actor(&home, BOB)
        .args(["permission", "grant", "/*", "--grantee", "uaa-user:eve", "--operations", "read"])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("Permission denied"));
}

#[test]
fn test_cannot_modify_own_entry() {
    let home = setup();
    strongbox_cmd(&home)
        .args(["permission", "revoke", "/*", "--grantee", super::ADMIN])
        .assert()
        .failure()
        .code(2);
}
