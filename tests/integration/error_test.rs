use tempfile::TempDir;

use super::{set_value, setup, strongbox_cmd, write_config, KEY_B};

#[test]
fn test_exit_code_no_keys_configured() {
    let home = TempDir::new().unwrap();
    let output = strongbox_cmd(&home).args(["check"]).output().unwrap();
    assert_eq!(output.status.code(), Some(7)); // Config
}

#[test]
fn test_exit_code_missing_actor() {
    let home = setup();
    let output = strongbox_cmd(&home)
        .env_remove("STRONGBOX_ACTOR")
        .args(["get", "/anything"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2)); // Validation
}

#[test]
fn test_exit_code_not_found() {
    let home = setup();
    let output = strongbox_cmd(&home).args(["get", "/nonexistent"]).output().unwrap();
    assert_eq!(output.status.code(), Some(3)); // NotFound
}

#[test]
fn test_exit_code_invalid_name() {
    let home = setup();
    let output = strongbox_cmd(&home)
        .args(["set", "/bad//name"])
        .write_stdin("v")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2)); // InvalidName
}

#[test]
fn test_exit_code_type_mismatch() {
    let home = setup();
    set_value(&home, "/typed", "v");
    let output = strongbox_cmd(&home)
        .args(["set", "/typed", "--type", "password"])
        .write_stdin("p")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2)); // TypeMismatch
}

#[test]
fn test_exit_code_invalid_versions() {
    let home = setup();
    set_value(&home, "/v", "v");
    let output = strongbox_cmd(&home)
        .args(["get", "/v", "--versions", "0"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2)); // InvalidQueryParameter
}

#[test]
fn test_exit_code_unrecoverable_key_set() {
    let home = setup();
    set_value(&home, "/locked", "v");
    write_config(&home, &[(KEY_B, true)]);

    let output = strongbox_cmd(&home).args(["check"]).output().unwrap();
    assert_eq!(output.status.code(), Some(7)); // UnrecoverableKeySet
    assert!(String::from_utf8_lossy(&output.stderr).contains("cannot decrypt any"));
}
