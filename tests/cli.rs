use assert_cmd::Command;
use predicates::prelude::*;

const ENV_VARS: &[&str] = &[
    "PROXMOX_HOST",
    "PROXMOX_PORT",
    "PROXMOX_USER",
    "PROXMOX_PASSWORD",
    "PROXMOX_TOKEN_NAME",
    "PROXMOX_TOKEN_VALUE",
    "PROXMOX_VERIFY_SSL",
    "PROXMOX_TIMEOUT_SECS",
    "PROXMOX_DANGEROUS_MODE",
    "PROXMOX_CONNECT_MODE",
];

fn proxgate() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("proxgate").unwrap();
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_help_exits_successfully() {
    proxgate().arg("--help").assert().success();
}

#[test]
fn test_version_exits_successfully() {
    proxgate()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("proxgate"));
}

#[test]
fn test_no_args_shows_usage() {
    proxgate()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_unknown_subcommand_fails() {
    proxgate()
        .arg("nonexistent")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_help_lists_all_subcommands() {
    let assert = proxgate().arg("--help").assert().success();
    let output = String::from_utf8(assert.get_output().stdout.clone()).unwrap();

    for cmd in ["serve", "call", "tools", "nodes", "resources", "backups", "task"] {
        assert!(
            output.contains(cmd),
            "Help output should list '{}' subcommand",
            cmd
        );
    }
}

#[test]
fn test_tools_lists_catalog_without_cluster() {
    proxgate()
        .arg("tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("start_vm"))
        .stdout(predicate::str::contains("restore_backup"));
}

#[test]
fn test_tools_json_output_parses() {
    let assert = proxgate().args(["tools", "-o", "json"]).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let names: Vec<&str> = parsed
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert!(names.contains(&"shutdown_container"));
    assert!(names.contains(&"get_task_status"));
}

#[test]
fn test_call_without_host_fails() {
    proxgate()
        .args(["call", "get_nodes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No cluster host configured"));
}

#[test]
fn test_malformed_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proxgate.toml");
    std::fs::write(&path, "[cluster\nhost = ").unwrap();

    proxgate()
        .args(["nodes", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse gateway config TOML"));
}
