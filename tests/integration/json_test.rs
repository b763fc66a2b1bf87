use super::{json_error, set_value, setup, strongbox_cmd};

#[test]
fn test_json_error_format() {
    let home = setup();
    let output = strongbox_cmd(&home)
        .args(["get", "/nonexistent", "--json"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let json = json_error(&output);
    assert_eq!(json["error"]["code"], "not_found");
    assert_eq!(json["error"]["exit_code"].as_i64().unwrap(), 3);
    assert_eq!(json["error"]["retryable"], false);
}

#[test]
fn test_set_json_does_not_echo_value() {
    let home = setup();
    let output = strongbox_cmd(&home)
        .args(["set", "/quiet", "--json"])
        .write_stdin("do-not-print-me")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("do-not-print-me"));
    let json: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(json["name"], "/quiet");
    assert_eq!(json["type"], "value");
    assert!(json["id"].as_str().is_some());
}

#[test]
fn test_get_json() {
    let home = setup();
    set_value(&home, "/api-key", "sk-test-123");

    let output = strongbox_cmd(&home)
        .args(["get", "/api-key", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let version = &json["data"][0];
    assert_eq!(version["name"], "/api-key");
    assert_eq!(version["type"], "value");
    assert_eq!(version["value"], "sk-test-123");
    assert!(version["version_created_at"].as_str().is_some());
}

#[test]
fn test_find_json() {
    let home = setup();
    set_value(&home, "/svc/one", "1");

    let output = strongbox_cmd(&home).args(["find", "/svc", "--json"]).output().unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["credentials"][0]["name"], "/svc/one");
}
