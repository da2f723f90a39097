//! End-to-end pipeline behaviour through the public engine API.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tfmigrate_core::primitives::{hcl, json as state};
use tfmigrate_core::{
    EngineConfig, ErrorKind, MergeField, MergeRule, MigrationContext, MigrationEngine,
    MigratorTable, Result, TransformResult, Transformer,
};
use tfmigrate_hcl::{Block, Expression};

/// Renames `value` to `content` and splits `example_pair` into two resources.
struct Example;

impl Transformer for Example {
    fn can_handle(&self, resource_type: &str) -> bool {
        matches!(resource_type, "example_record" | "example_pair")
    }

    fn resource_type(&self) -> &str {
        "example_record"
    }

    fn target_resource_type(&self) -> Option<&str> {
        Some("example_dns_record")
    }

    fn transform_config(&self, _ctx: &MigrationContext, mut block: Block) -> Result<TransformResult> {
        if block.resource_type() == Some("example_pair") {
            let name = block.resource_name().unwrap_or_default().to_string();
            return Ok(TransformResult::replace(vec![
                hcl::derive_block(
                    &block,
                    &hcl::DeriveSpec::new("example_left", &name).copy("zone").with_meta_arguments(),
                ),
                hcl::derive_block(
                    &block,
                    &hcl::DeriveSpec::new("example_right", &name)
                        .copy("zone")
                        .set("side", Expression::string("right")),
                ),
            ]));
        }
        block.set_label(0, "example_dns_record");
        hcl::rename_attribute(&mut block.body, "value", "content");
        Ok(TransformResult::in_place(block))
    }

    fn transform_state(&self, _ctx: &MigrationContext, mut instance: Value, _path: &str) -> Result<Value> {
        if let Some(attrs) = instance.get_mut("attributes") {
            state::rename_field(attrs, "value", "content");
        }
        state::set_schema_version(&mut instance, 0);
        Ok(instance)
    }
}

fn example() -> Box<dyn Transformer> {
    Box::new(Example)
}

fn engine() -> MigrationEngine {
    let mut table = MigratorTable::new();
    table.register_migrator("example_record", "v4", "v5", example);
    table.register_merge_rule(
        "v4",
        "v5",
        MergeRule::new("example_member", "example_group", "members")
            .with_parent_ref("group_id")
            .with_count("member_count")
            .with_field(MergeField::scalar("value")),
    );
    let registry = table.build_registry("v4", "v5", &[]).unwrap();
    MigrationEngine::new(Arc::new(registry), EngineConfig::default())
}

fn config(engine: &MigrationEngine, source: &str) -> String {
    let output = engine
        .process_config(source.as_bytes(), "main.tf", &MigrationContext::default())
        .unwrap();
    String::from_utf8(output).unwrap()
}

const CONFIG: &str = r#"# DNS
resource "example_record" "www" {
  zone  = var.zone
  value = "1.2.3.4"
}

resource "example_pair" "both" {
  count = 2
  zone  = var.zone
}

resource "example_group" "g" {
  name = "group"
}

resource "example_member" "one" {
  group_id = example_group.g.id
  value    = "a"
}

resource "unrelated" "x" {
  keep = true
}
"#;

#[test]
fn test_config_migration() {
    let engine = engine();
    assert_eq!(
        config(&engine, CONFIG),
        r#"# DNS
resource "example_dns_record" "www" {
  zone    = var.zone
  content = "1.2.3.4"
}

resource "example_left" "both" {
  count = 2
  zone  = var.zone
}

resource "example_right" "both" {
  zone = var.zone
  side = "right"
}

resource "example_group" "g" {
  name    = "group"
  members = [{ value = "a" }]
}

resource "unrelated" "x" {
  keep = true
}
"#
    );
}

#[test]
fn test_config_migration_is_idempotent() {
    let engine = engine();
    let once = config(&engine, CONFIG);
    assert_eq!(config(&engine, &once), once);
}

#[test]
fn test_unregistered_types_only_reformatted() {
    let engine = engine();
    let source = "resource \"unrelated\" \"x\" {\nkeep=true\nname=\"n\"\n}\n";
    assert_eq!(
        config(&engine, source),
        "resource \"unrelated\" \"x\" {\n  keep = true\n  name = \"n\"\n}\n"
    );
}

#[test]
fn test_split_yields_exactly_the_new_blocks() {
    let engine = engine();
    let output = config(&engine, "resource \"example_pair\" \"p\" {\n  zone = \"z\"\n}\n");
    assert_eq!(output.matches("resource ").count(), 2);
    assert!(!output.contains("example_pair"));
}

#[test]
fn test_merge_can_be_disabled() {
    let table = {
        let mut table = MigratorTable::new();
        table.register_migrator("example_record", "v4", "v5", example);
        table.register_merge_rule("v4", "v5", MergeRule::new("example_member", "example_group", "members"));
        table
    };
    let registry = table.build_registry("v4", "v5", &[]).unwrap();
    let engine = MigrationEngine::new(Arc::new(registry), EngineConfig::default().with_merge(false));
    let output = config(&engine, CONFIG);
    assert!(output.contains("resource \"example_member\" \"one\""));
}

#[test]
fn test_merge_resolves_parents_in_other_files() {
    let engine = engine();
    let groups = "resource \"example_group\" \"g\" {\n  name = \"group\"\n}\n";
    let members = "# members\nresource \"example_member\" \"one\" {\n  group_id = example_group.g.id\n  value    = \"a\"\n}\n";
    let ctx = MigrationContext::default()
        .with_file("groups.tf", tfmigrate_hcl::parse_body(groups).unwrap())
        .with_file("members.tf", tfmigrate_hcl::parse_body(members).unwrap());
    let run = |source: &str, name: &str| {
        String::from_utf8(engine.process_config(source.as_bytes(), name, &ctx).unwrap()).unwrap()
    };

    assert_eq!(
        run(groups, "groups.tf"),
        "resource \"example_group\" \"g\" {\n  name    = \"group\"\n  members = [{ value = \"a\" }]\n}\n"
    );
    assert_eq!(run(members, "members.tf"), "");
}

#[test]
fn test_parse_failure_reports_file_and_line() {
    let engine = engine();
    let errors = engine
        .process_config(b"resource \"a\" \"b\" {\n  x = \n}\n", "broken.tf", &MigrationContext::default())
        .unwrap_err();
    let err = errors.iter().next().unwrap();
    assert_eq!(err.kind, ErrorKind::Parse);
    assert_eq!(err.file.as_deref(), Some("broken.tf"));
    assert!(err.line.is_some());
}

fn state_doc() -> Value {
    json!({
        "version": 4,
        "terraform_version": "1.5.7",
        "resources": [
            {
                "mode": "managed",
                "type": "example_record",
                "name": "www",
                "instances": [{ "schema_version": 2, "attributes": { "id": "r1", "value": "1.2.3.4" } }]
            },
            {
                "mode": "managed",
                "type": "example_group",
                "name": "g",
                "instances": [{ "schema_version": 0, "attributes": { "id": "G1", "name": "group" } }]
            },
            {
                "mode": "managed",
                "type": "example_member",
                "name": "one",
                "instances": [{ "schema_version": 0, "attributes": { "group_id": "G1", "value": "a" } }]
            }
        ]
    })
}

fn migrate_state(engine: &MigrationEngine, input: &[u8]) -> Vec<u8> {
    engine
        .process_state(input, "terraform.tfstate", &MigrationContext::default())
        .unwrap()
}

#[test]
fn test_state_migration() {
    let engine = engine();
    let input = serde_json::to_vec_pretty(&state_doc()).unwrap();
    let output: Value = serde_json::from_slice(&migrate_state(&engine, &input)).unwrap();

    assert_eq!(
        output["resources"],
        json!([
            {
                "mode": "managed",
                "type": "example_dns_record",
                "name": "www",
                "instances": [{ "schema_version": 0, "attributes": { "id": "r1", "content": "1.2.3.4" } }]
            },
            {
                "mode": "managed",
                "type": "example_group",
                "name": "g",
                "instances": [{
                    "schema_version": 0,
                    "attributes": {
                        "id": "G1",
                        "name": "group",
                        "members": [{ "value": "a" }],
                        "member_count": 1
                    }
                }]
            }
        ])
    );
    assert_eq!(output["terraform_version"], json!("1.5.7"));
}

#[test]
fn test_state_migration_is_idempotent() {
    let engine = engine();
    let input = serde_json::to_vec_pretty(&state_doc()).unwrap();
    let once = migrate_state(&engine, &input);
    assert_eq!(migrate_state(&engine, &once), once);
}
