//! `cloudflare_record` becomes `cloudflare_dns_record`.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tfmigrate_core::primitives::{hcl, json as state};
use tfmigrate_core::{MigrationContext, Result, TransformResult, Transformer};
use tfmigrate_hcl::{Block, Expression};
use tracing::debug;

pub const SOURCE_TYPE: &str = "cloudflare_record";
pub const TARGET_TYPE: &str = "cloudflare_dns_record";

/// Attributes with no counterpart in the new schema.
const REMOVED: &[&str] = &["hostname", "allow_overwrite"];

const DEFAULT_TTL: i64 = 1;

fn type_name() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bcloudflare_record\b").ok())
        .as_ref()
}

/// Migrates DNS records.
///
/// The type identifier is rewritten in the raw text so that references from
/// other resources (`cloudflare_record.www.hostname`) follow the rename.
#[derive(Debug, Default, Clone, Copy)]
pub struct DnsRecordMigrator;

impl DnsRecordMigrator {
    pub fn new() -> Self {
        Self
    }
}

impl Transformer for DnsRecordMigrator {
    fn can_handle(&self, resource_type: &str) -> bool {
        resource_type == SOURCE_TYPE || resource_type == TARGET_TYPE
    }

    fn resource_type(&self) -> &str {
        SOURCE_TYPE
    }

    fn target_resource_type(&self) -> Option<&str> {
        Some(TARGET_TYPE)
    }

    fn preprocess(&self, content: String) -> String {
        match type_name() {
            Some(re) if re.is_match(&content) => re.replace_all(&content, TARGET_TYPE).into_owned(),
            _ => content,
        }
    }

    fn transform_config(&self, _ctx: &MigrationContext, mut block: Block) -> Result<TransformResult> {
        block.set_label(0, TARGET_TYPE);
        let body = &mut block.body;
        // A record that already sets `content` keeps it.
        if !hcl::rename_attribute(body, "value", "content") {
            hcl::remove_attribute(body, "value");
        }
        // `ttl` became required; 1 means automatic.
        hcl::ensure_attribute(body, "ttl", Expression::number(DEFAULT_TTL));
        hcl::block_to_attribute(body, "data");
        let removed = hcl::remove_attributes(body, REMOVED);
        debug!(
            resource = block.resource_name().unwrap_or_default(),
            removed, "migrated dns record"
        );
        Ok(TransformResult::in_place(block))
    }

    fn transform_state(&self, _ctx: &MigrationContext, mut instance: Value, _path: &str) -> Result<Value> {
        if let Some(attrs) = instance.get_mut("attributes") {
            state::rename_field(attrs, "value", "content");
            state::remove_field(attrs, "value");
            state::array_to_object(attrs, "data", &state::ArrayToObjectOptions::new());
            if let Some(data) = attrs.get_mut("data") {
                state::drop_nulls(data);
            }
            state::coerce_field(attrs, "ttl", state::coerce_float);
            state::coerce_field(attrs, "priority", state::coerce_float);
            state::ensure_field(attrs, "ttl", Value::from(DEFAULT_TTL));
            state::remove_fields(attrs, REMOVED);
        }
        state::set_schema_version(&mut instance, 0);
        Ok(instance)
    }
}
