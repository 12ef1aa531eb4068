use std::path::PathBuf;
use std::{fs, path::Path};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

#[test]
fn compile_prints_summary_and_artifacts() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("vlanctl"));
    cmd.arg("compile")
        .arg(fixture("fixtures/home-router.toml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("plan interfaces=4 tables=3"))
        .stdout(predicate::str::contains("- eth0.10 -> 101"))
        .stdout(predicate::str::contains("# netplan"))
        .stdout(predicate::str::contains(
            r#"add rule ip vlanctl postrouting oifname "eth0" masquerade"#,
        ));
}

#[test]
fn compile_json_lists_tables_and_services() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("vlanctl"));
    let output = cmd
        .arg("compile")
        .arg(fixture("fixtures/home-router.toml"))
        .arg("--format")
        .arg("json")
        .output()
        .expect("run");
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(json["tables"][0]["interface"], "eth0");
    assert_eq!(json["tables"][0]["table"], 100);
    assert_eq!(json["services"][0]["proxy"]["https"], 10443);
    assert_eq!(json["services"][1]["dhcp_server"], true);
}

#[test]
fn compile_writes_every_artifact_into_out_dir() {
    let dir = tempdir().expect("tempdir");
    let out = dir.path().join("out");

    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("vlanctl"));
    cmd.arg("compile")
        .arg(fixture("fixtures/home-router.toml"))
        .arg("--out-dir")
        .arg(path_as_str(&out))
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote"));

    let netplan = fs::read_to_string(out.join("netplan.yaml")).expect("netplan");
    assert!(netplan.contains("eth0.10:"));
    assert!(netplan.contains("vlanctl0:"));
    let nft = fs::read_to_string(out.join("vlanctl.nft")).expect("nft");
    assert!(nft.starts_with("table ip vlanctl {"));
    assert!(out.join("dhcp-hook.sh").exists());
    let dnsmasq = fs::read_to_string(out.join("dnsmasq").join("eth0.10.conf")).expect("dnsmasq");
    assert!(dnsmasq.contains("dhcp-host=aa:bb:cc:dd:ee:ff"));
    let caddy = fs::read_to_string(out.join("caddy").join("wan").join("Caddyfile")).expect("caddy");
    assert!(caddy.contains("ha.example.net {"));
}

#[test]
fn compile_refuses_input_file_as_out_dir() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("networks.toml");
    fs::copy(fixture("fixtures/home-router.toml"), &input).expect("copy");

    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("vlanctl"));
    cmd.arg("compile")
        .arg(path_as_str(&input))
        .arg("--out-dir")
        .arg(path_as_str(&input))
        .assert()
        .failure()
        .stderr(predicate::str::contains("refusing to overwrite network file"));
}

#[test]
fn apply_dry_run_writes_without_running_commands() {
    let dir = tempdir().expect("tempdir");
    let out = dir.path().join("dry");

    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("vlanctl"));
    cmd.arg("apply")
        .arg(fixture("fixtures/home-router.toml"))
        .arg("--dry-run")
        .arg(path_as_str(&out))
        .assert()
        .success()
        .stdout(predicate::str::contains("netplan.yaml"));
    assert!(out.join("vlanctl.nft").exists());
}

#[test]
fn compile_reports_unreadable_file() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("broken.toml");
    fs::write(&input, "[[network]\nid = ").expect("write");

    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("vlanctl"));
    cmd.arg("compile")
        .arg(path_as_str(&input))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse network file"));
}

fn path_as_str(path: &Path) -> &str {
    path.to_str().expect("utf-8 path")
}
