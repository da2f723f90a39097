//! Directory-level runs against the builtin migrators.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tfmigrate_cli::{run, FileOutcome, RunConfig, RunStatus};
use tfmigrate_core::recovery::{RecoveryConfig, RecoveryStrategy};

const DNS: &str = "resource \"cloudflare_record\" \"www\" {\n  zone_id = var.zone_id\n  value   = \"192.0.2.1\"\n}\n";
const DNS_MIGRATED: &str = "resource \"cloudflare_dns_record\" \"www\" {\n  zone_id = var.zone_id\n  content = \"192.0.2.1\"\n  ttl     = 1\n}\n";
const BROKEN: &str = "resource \"test\" {{{";

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

fn read(dir: &Path, name: &str) -> String {
    fs::read_to_string(dir.join(name)).unwrap()
}

fn state() -> Value {
    json!({
        "version": 4,
        "terraform_version": "1.5.7",
        "resources": [{
            "mode": "managed",
            "type": "cloudflare_record",
            "name": "www",
            "instances": [{
                "schema_version": 2,
                "attributes": { "id": "r1", "value": "192.0.2.1", "ttl": 1 }
            }]
        }]
    })
}

#[test]
fn test_migrates_config_and_state() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "dns.tf", DNS);
    write(dir.path(), "variables.tf", "variable \"zone_id\" {}\n");
    let state_path = dir.path().join("terraform.tfstate");
    fs::write(&state_path, serde_json::to_vec_pretty(&state()).unwrap()).unwrap();

    let config = RunConfig::new(dir.path()).with_state_file(&state_path);
    let report = run(&config, &tfmigrate_migrators::builtin_table()).unwrap();

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(read(dir.path(), "dns.tf"), DNS_MIGRATED);
    assert_eq!(report.count(FileOutcome::Changed), 2);
    assert_eq!(report.count(FileOutcome::Unchanged), 1);

    let migrated: Value = serde_json::from_slice(&fs::read(&state_path).unwrap()).unwrap();
    let resource = &migrated["resources"][0];
    assert_eq!(resource["type"], json!("cloudflare_dns_record"));
    assert_eq!(resource["instances"][0]["attributes"]["content"], json!("192.0.2.1"));
    assert_eq!(resource["instances"][0]["schema_version"], json!(0));

    assert!(!dir.path().join("dns.tf.backup").exists());
    assert!(!dir.path().join("terraform.tfstate.backup").exists());
}

#[test]
fn test_failure_rolls_back_earlier_files() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.tf", DNS);
    write(dir.path(), "b.tf", BROKEN);

    let report = run(&RunConfig::new(dir.path()), &tfmigrate_migrators::builtin_table()).unwrap();

    assert_eq!(report.status, RunStatus::RolledBack);
    assert_eq!(read(dir.path(), "a.tf"), DNS);
    assert_eq!(read(dir.path(), "b.tf"), BROKEN);
    assert_eq!(report.files[1].outcome, FileOutcome::Failed);
    assert!(report.files[1].errors[0].message.contains("parse error"));
    assert!(!dir.path().join("a.tf.backup").exists());
}

#[test]
fn test_continue_on_error_keeps_good_files() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.tf", DNS);
    write(dir.path(), "b.tf", BROKEN);
    write(dir.path(), "c.tf", DNS);

    let config = RunConfig::new(dir.path())
        .with_recovery(RecoveryConfig::default().with_strategy(RecoveryStrategy::ContinueOnError));
    let report = run(&config, &tfmigrate_migrators::builtin_table()).unwrap();

    assert_eq!(report.status, RunStatus::CompletedWithErrors);
    assert_eq!(read(dir.path(), "a.tf"), DNS_MIGRATED);
    assert_eq!(read(dir.path(), "b.tf"), BROKEN);
    assert_eq!(read(dir.path(), "c.tf"), DNS_MIGRATED);
}

#[test]
fn test_dry_run_writes_nothing() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "dns.tf", DNS);

    let config = RunConfig::new(dir.path()).with_dry_run(true);
    let report = run(&config, &tfmigrate_migrators::builtin_table()).unwrap();

    assert_eq!(report.files[0].outcome, FileOutcome::Changed);
    assert_eq!(read(dir.path(), "dns.tf"), DNS);
    assert!(!dir.path().join("dns.tf.backup").exists());
}

#[test]
fn test_resource_allowlist() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "dns.tf", DNS);

    let config = RunConfig::new(dir.path()).with_resources(vec!["cloudflare_list".to_string()]);
    let report = run(&config, &tfmigrate_migrators::builtin_table()).unwrap();

    assert_eq!(report.files[0].outcome, FileOutcome::Unchanged);
    assert_eq!(read(dir.path(), "dns.tf"), DNS);
}

#[test]
fn test_unknown_versions_fail_before_any_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "dns.tf", DNS);

    let mut config = RunConfig::new(dir.path());
    config.source_version = "v3".to_string();
    let err = run(&config, &tfmigrate_migrators::builtin_table()).unwrap_err();
    assert!(err.to_string().contains("no migrations registered"));
    assert_eq!(read(dir.path(), "dns.tf"), DNS);
}

#[test]
fn test_second_run_changes_nothing() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "dns.tf", DNS);
    let table = tfmigrate_migrators::builtin_table();

    run(&RunConfig::new(dir.path()).without_backup(), &table).unwrap();
    let report = run(&RunConfig::new(dir.path()).without_backup(), &table).unwrap();

    assert_eq!(report.count(FileOutcome::Changed), 0);
    assert_eq!(read(dir.path(), "dns.tf"), DNS_MIGRATED);
}

const LIST: &str = "resource \"cloudflare_list\" \"ips\" {\n  account_id = \"abc\"\n  name       = \"ips\"\n  kind       = \"ip\"\n}\n";
const LIST_ITEMS: &str = "resource \"cloudflare_list_item\" \"a\" {\n  account_id = \"abc\"\n  list_id    = cloudflare_list.ips.id\n  ip         = \"192.0.2.1\"\n}\n";

#[test]
fn test_list_items_in_another_file_merge_into_their_list() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "items.tf", LIST_ITEMS);
    write(dir.path(), "list.tf", LIST);
    let state_path = dir.path().join("terraform.tfstate");
    let state = json!({
        "version": 4,
        "resources": [
            {
                "mode": "managed",
                "type": "cloudflare_list",
                "name": "ips",
                "instances": [{
                    "schema_version": 0,
                    "attributes": { "id": "L1", "kind": "ip", "item": [], "num_items": 0 }
                }]
            },
            {
                "mode": "managed",
                "type": "cloudflare_list_item",
                "name": "a",
                "instances": [{
                    "schema_version": 0,
                    "attributes": { "list_id": "L1", "ip": "192.0.2.1", "comment": null }
                }]
            }
        ]
    });
    fs::write(&state_path, serde_json::to_vec_pretty(&state).unwrap()).unwrap();

    let config = RunConfig::new(dir.path()).with_state_file(&state_path);
    let report = run(&config, &tfmigrate_migrators::builtin_table()).unwrap();

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(read(dir.path(), "items.tf"), "");
    assert_eq!(
        read(dir.path(), "list.tf"),
        "resource \"cloudflare_list\" \"ips\" {\n  account_id = \"abc\"\n  name       = \"ips\"\n  kind       = \"ip\"\n  items      = [{ ip = \"192.0.2.1\" }]\n}\n"
    );

    let migrated: Value = serde_json::from_slice(&fs::read(&state_path).unwrap()).unwrap();
    let resources = migrated["resources"].as_array().unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(
        resources[0]["instances"][0]["attributes"]["items"],
        json!([{ "ip": "192.0.2.1" }])
    );
}
