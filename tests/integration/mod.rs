mod cli_test;
mod error_test;
mod generate_test;
mod json_test;
mod keys_test;
mod permission_test;

use assert_cmd::Command;
use tempfile::TempDir;

pub const ADMIN: &str = "uaa-client:admin";
pub const KEY_A: &str = "first-master-passphrase-aaaa";
pub const KEY_B: &str = "second-master-passphrase-bbbb";

/// Write `strongbox.toml` into `home` with the given password keys and a
/// bootstrap entry granting ADMIN everything.
pub fn write_config(home: &TempDir, keys: &[(&str, bool)]) {
    let mut config = format!("[store]\npath = '{}'\n\n", home.path().join("store.db").display());
    for (passphrase, active) in keys {
        config.push_str(&format!(
            "[[encryption.keys]]\nprovider = \"password\"\npassphrase = \"{passphrase}\"\nactive = {active}\n\n"
        ));
    }
    config.push_str(&format!(
        "[[permissions.bootstrap]]\npath = \"/*\"\nactors = [\"{ADMIN}\"]\noperations = [\"read\", \"write\", \"delete\", \"read_acl\", \"write_acl\"]\n"
    ));
    std::fs::write(home.path().join("strongbox.toml"), config).unwrap();
}

pub fn setup() -> TempDir {
    let home = TempDir::new().unwrap();
    write_config(&home, &[(KEY_A, true)]);
    home
}

/// A command acting as ADMIN against the store in `home`.
pub fn strongbox_cmd(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("strongbox").unwrap();
    cmd.env("HOME", home.path())
        .env("STRONGBOX_CONFIG", home.path().join("strongbox.toml"))
        .env("STRONGBOX_ACTOR", ADMIN)
        .env("RUST_LOG", "off");
    cmd
}

pub fn as_actor(home: &TempDir, actor: &str) -> Command {
    let mut cmd = strongbox_cmd(home);
    cmd.env("STRONGBOX_ACTOR", actor);
    cmd
}

pub fn set_value(home: &TempDir, name: &str, value: &str) {
    strongbox_cmd(home)
        .args(["set", name])
        .write_stdin(value)
        .assert()
        .success();
}

/// Parse the JSON error line a failed `--json` command leaves on stderr.
pub fn json_error(output: &std::process::Output) -> serde_json::Value {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let line = stderr.lines().last().unwrap_or_default();
    serde_json::from_str(line.trim()).unwrap()
}
