use predicates::prelude::*;

use super::{setup, strongbox_cmd};

#[test]
fn test_generate_password() {
    let home = setup();
    let output = strongbox_cmd(&home)
        .args(["generate", "/gen/pw", "--type", "password", "--length", "12"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let password = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
    assert_eq!(password.len(), 12);

    strongbox_cmd(&home)
        .args(["get", "/gen/pw"])
        .assert()
        .success()
        .stdout(password);
}

#[test]
fn test_generate_no_overwrite_keeps_value() {
    let home = setup();
    let first = strongbox_cmd(&home)
        .args(["generate", "/keep", "--type", "password"])
        .output()
        .unwrap();
    let second = strongbox_cmd(&home)
        .args(["generate", "/keep", "--type", "password", "--mode", "no-overwrite"])
        .output()
        .unwrap();
    assert!(second.status.success());
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn test_generate_user_json() {
    let home = setup();
    let output = strongbox_cmd(&home)
        .args(["generate", "/gen/user", "--type", "user", "--username", "svc", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["type"], "user");
    assert_eq!(json["value"]["username"], "svc");
    assert!(json["value"]["password_hash"].as_str().unwrap().starts_with("$argon2"));
}

#[test]
fn test_generate_ssh_with_comment() {
    let home = setup();
    strongbox_cmd(&home)
        .args(["generate", "/gen/ssh", "--type", "ssh", "--ssh-comment", "ops@bastion"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ssh-rsa "))
        .stdout(predicate::str::contains("ops@bastion"));
}

#[test]
fn test_generate_value_type_rejected() {
    let home = setup();
    strongbox_cmd(&home)
        .args(["generate", "/gen/value", "--type", "value"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_generate_unknown_key_usage_names_flag() {
    let home = setup();
    strongbox_cmd(&home)
        .args([
            "generate",
            "/gen/cert",
            "--type",
            "certificate",
            "--common-name",
            "example.com",
            "--self-sign",
            "--key-usage",
            "digital_signature,teleportation",
        ])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("teleportation"));
}

#[test]
fn test_regenerate_changes_value() {
    let home = setup();
    let first = strongbox_cmd(&home)
        .args(["generate", "/regen", "--type", "password"])
        .output()
        .unwrap();
    let second = strongbox_cmd(&home).args(["regenerate", "/regen"]).output().unwrap();
    assert!(second.status.success());
    assert_ne!(first.stdout, second.stdout);
}

#[test]
fn test_regenerate_static_value_rejected() {
    let home = setup();
    strongbox_cmd(&home)
        .args(["set", "/static", "--type", "password"])
        .write_stdin("typed-by-hand")
        .assert()
        .success();

    strongbox_cmd(&home)
        .args(["regenerate", "/static"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("statically set"));
}

#[test]
fn test_ca_signed_certificate_and_bulk_regenerate() {
    let home = setup();
    strongbox_cmd(&home)
        .args(["generate", "/pki/ca", "--type", "certificate", "--common-name", "Root CA", "--is-ca"])
        .assert()
        .success();
    strongbox_cmd(&home)
        .args([
            "generate",
            "/pki/web",
            "--type",
            "certificate",
            "--common-name",
            "web.internal",
            "--alternative-name",
            "web.internal",
            "--alternative-name",
            "10.0.0.5",
            "--extended-key-usage",
            "server_auth",
            "--ca",
            "/pki/ca",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("BEGIN CERTIFICATE"));

    let output = strongbox_cmd(&home)
        .args(["get", "/pki/web", "--json"])
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["data"][0]["metadata"]["certificate"]["ca_name"], "/pki/ca");

    let output = strongbox_cmd(&home)
        .args(["bulk-regenerate", "/pki/ca", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["regenerated_credentials"], serde_json::json!(["/pki/web"]));
}
