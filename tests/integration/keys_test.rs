use predicates::prelude::*;

use super::{set_value, setup, strongbox_cmd, write_config, KEY_A, KEY_B};

#[test]
fn test_check_marks_active_key() {
    let home = setup();
    set_value(&home, "/one", "1");

    strongbox_cmd(&home)
        .args(["check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(active): 1 value(s)"))
        .stdout(predicate::str::contains("pending rotation: 0"));
}

#[test]
fn test_rotate_keys_then_drop_old_key() {
    let home = setup();
    set_value(&home, "/rotating", "survives");
    set_value(&home, "/also", "rotated");

    write_config(&home, &[(KEY_A, false), (KEY_B, true)]);
    let output = strongbox_cmd(&home).args(["check", "--json"]).output().unwrap();
    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["pending_rotation"], 2);
    assert_eq!(status["configured"].as_array().unwrap().len(), 2);

    let output = strongbox_cmd(&home).args(["rotate-keys", "--json"]).output().unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["rotated"], 2);
    assert_eq!(report["remaining_after"], 0);

    write_config(&home, &[(KEY_B, true)]);
    strongbox_cmd(&home)
        .args(["get", "/rotating"])
        .assert()
        .success()
        .stdout("survives");
}

#[test]
fn test_old_values_readable_before_rotation() {
    let home = setup();
    set_value(&home, "/legacy", "still-here");
    write_config(&home, &[(KEY_A, false), (KEY_B, true)]);

    strongbox_cmd(&home)
        .args(["get", "/legacy"])
        .assert()
        .success()
        .stdout("still-here");
}
