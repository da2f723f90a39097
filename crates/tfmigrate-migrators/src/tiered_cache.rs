//! `cloudflare_tiered_cache`: `cache_type` becomes `value`, and generic
//! tiered caching moves to `cloudflare_argo_tiered_caching`.

use serde_json::Value;
use tfmigrate_core::primitives::{hcl, json as state};
use tfmigrate_core::{MigrationContext, MigrationError, Result, TransformResult, Transformer};
use tfmigrate_hcl::{BinaryOp, BinaryOperation, Block, Conditional, Expression};
use tracing::{debug, warn};

pub const SOURCE_TYPE: &str = "cloudflare_tiered_cache";
pub const ARGO_TYPE: &str = "cloudflare_argo_tiered_caching";

/// Where a v4 `cache_type` lands in v5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mapping {
    /// Stays a tiered cache resource with this `value`.
    TieredCache(&'static str),
    /// Becomes an argo tiered caching resource set to `on`.
    Argo,
}

fn mapping(cache_type: &str) -> Option<Mapping> {
    match cache_type {
        "generic" => Some(Mapping::Argo),
        "smart" => Some(Mapping::TieredCache("on")),
        "off" => Some(Mapping::TieredCache("off")),
        _ => None,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TieredCacheMigrator;

impl TieredCacheMigrator {
    pub fn new() -> Self {
        Self
    }
}

impl Transformer for TieredCacheMigrator {
    fn can_handle(&self, resource_type: &str) -> bool {
        resource_type == SOURCE_TYPE
    }

    fn resource_type(&self) -> &str {
        SOURCE_TYPE
    }

    /// Only generic tiered caching changes type.
    fn target_resource_type_for(&self, resource: &Value) -> Option<String> {
        let cache_type = resource
            .get("instances")?
            .as_array()?
            .first()?
            .get("attributes")?
            .get("cache_type")?
            .as_str()?;
        (mapping(cache_type) == Some(Mapping::Argo)).then(|| ARGO_TYPE.to_string())
    }

    fn transform_config(&self, ctx: &MigrationContext, mut block: Block) -> Result<TransformResult> {
        let name = block.resource_name().unwrap_or_default().to_string();
        let Some(cache_type) = block.body.get("cache_type").cloned() else {
            return Ok(TransformResult::in_place(block));
        };

        let resolved = ctx
            .resolve(&cache_type)
            .and_then(|v| v.as_str().map(str::to_string));
        let value = match resolved.as_deref() {
            Some(literal) => match mapping(literal) {
                Some(Mapping::TieredCache(value)) => Expression::string(value),
                Some(Mapping::Argo) => return Ok(to_argo(ctx, block, &name)),
                None => {
                    return Err(MigrationError::transform(format!(
                        "unknown cache_type {:?}",
                        literal
                    ))
                    .with_operation("transform_config")
                    .with_resource(format!("{}.{}", SOURCE_TYPE, name)));
                }
            },
            None => {
                warn!(
                    resource = %name,
                    "cache_type is not statically known, emitting a conditional value"
                );
                conditional_value(cache_type)
            }
        };

        hcl::rename_attribute(&mut block.body, "cache_type", "value");
        hcl::set_attribute(&mut block.body, "value", value);
        Ok(TransformResult::in_place(block))
    }

    fn transform_state(&self, _ctx: &MigrationContext, mut instance: Value, path: &str) -> Result<Value> {
        if let Some(attrs) = instance.get_mut("attributes") {
            if let Some(cache_type) = state::remove_field(attrs, "cache_type") {
                let value = match cache_type.as_str().and_then(mapping) {
                    Some(Mapping::Argo) => "on",
                    Some(Mapping::TieredCache(value)) => value,
                    None => {
                        return Err(MigrationError::state(format!(
                            "unknown cache_type {}",
                            cache_type
                        ))
                        .with_operation("transform_state")
                        .with_context("path", path));
                    }
                };
                state::set(attrs, "value", Value::from(value));
            }
        }
        state::set_schema_version(&mut instance, 0);
        Ok(instance)
    }
}

/// Replace the block with an argo tiered caching resource of the same name.
fn to_argo(ctx: &MigrationContext, mut block: Block, name: &str) -> TransformResult {
    block.set_label(0, ARGO_TYPE);
    hcl::rename_attribute(&mut block.body, "cache_type", "value");
    hcl::set_attribute(&mut block.body, "value", Expression::string("on"));
    debug!(resource = %name, target = ARGO_TYPE, "generic tiered cache changes type");

    if !ctx.options.emit_moved_blocks {
        return TransformResult::replace(vec![block]);
    }
    let moved = hcl::moved_block(&[SOURCE_TYPE, name], &[ARGO_TYPE, name]);
    TransformResult::replace(vec![block, moved])
}

/// `cache_type == "off" ? "off" : "on"`
fn conditional_value(cache_type: Expression) -> Expression {
    Expression::Conditional(Box::new(Conditional {
        condition: Expression::Binary(Box::new(BinaryOperation {
            lhs: cache_type,
            op: BinaryOp::Eq,
            rhs: Expression::string("off"),
        })),
        true_expr: Expression::string("off"),
        false_expr: Expression::string("on"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tfmigrate_core::MigrationOptions;
    use tfmigrate_hcl::{format_block, parse_body};

    fn block(source: &str) -> Block {
        parse_body(source).unwrap().blocks().next().unwrap().clone()
    }

    fn migrate(ctx: &MigrationContext, source: &str) -> Vec<String> {
        TieredCacheMigrator::new()
            .transform_config(ctx, block(source))
            .unwrap()
            .blocks
            .iter()
            .map(format_block)
            .collect()
    }

    #[test]
    fn test_smart_and_off() {
        let ctx = MigrationContext::default();
        let smart = "resource \"cloudflare_tiered_cache\" \"t\" {\n  zone_id    = \"z\"\n  cache_type = \"smart\"\n}\n";
        assert_eq!(
            migrate(&ctx, smart),
            vec!["resource \"cloudflare_tiered_cache\" \"t\" {\n  zone_id = \"z\"\n  value   = \"on\"\n}\n"]
        );
        let off = "resource \"cloudflare_tiered_cache\" \"t\" {\n  cache_type = \"off\"\n}\n";
        assert_eq!(
            migrate(&ctx, off),
            vec!["resource \"cloudflare_tiered_cache\" \"t\" {\n  value = \"off\"\n}\n"]
        );
    }

    #[test]
    fn test_generic_changes_type() {
        let source = "resource \"cloudflare_tiered_cache\" \"t\" {\n  zone_id    = \"z\"\n  cache_type = \"generic\"\n}\n";
        let result = TieredCacheMigrator::new()
            .transform_config(&MigrationContext::default(), block(source))
            .unwrap();
        assert!(result.remove_original);
        assert_eq!(
            result.blocks.iter().map(format_block).collect::<Vec<_>>(),
            vec!["resource \"cloudflare_argo_tiered_caching\" \"t\" {\n  zone_id = \"z\"\n  value   = \"on\"\n}\n"]
        );
    }

    #[test]
    fn test_generic_with_moved_block() {
        let ctx = MigrationContext::default()
            .with_options(MigrationOptions::default().with_moved_blocks(true));
        let out = migrate(&ctx, "resource \"cloudflare_tiered_cache\" \"t\" {\n  cache_type = \"generic\"\n}\n");
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[1],
            "moved {\n  from = cloudflare_tiered_cache.t\n  to   = cloudflare_argo_tiered_caching.t\n}\n"
        );
    }

    #[test]
    fn test_variable_resolved_from_default() {
        let vars = parse_body("variable \"cache\" {\n  default = \"generic\"\n}\n").unwrap();
        let ctx = MigrationContext::default().with_file("variables.tf", vars);
        let out = migrate(&ctx, "resource \"cloudflare_tiered_cache\" \"t\" {\n  cache_type = var.cache\n}\n");
        assert!(out[0].starts_with("resource \"cloudflare_argo_tiered_caching\" \"t\""));
    }

    #[test]
    fn test_unresolved_becomes_conditional() {
        let ctx = MigrationContext::default();
        let out = migrate(&ctx, "resource \"cloudflare_tiered_cache\" \"t\" {\n  cache_type = local.mode\n}\n");
        assert_eq!(
            out,
            vec!["resource \"cloudflare_tiered_cache\" \"t\" {\n  value = local.mode == \"off\" ? \"off\" : \"on\"\n}\n"]
        );
    }

    #[test]
    fn test_unknown_literal_is_an_error() {
        let err = TieredCacheMigrator::new()
            .transform_config(
                &MigrationContext::default(),
                block("resource \"cloudflare_tiered_cache\" \"t\" {\n  cache_type = \"fast\"\n}\n"),
            )
            .unwrap_err();
        assert!(err.to_string().contains("fast"));
    }

    #[test]
    fn test_state() {
        let migrator = TieredCacheMigrator::new();
        let resource = json!({
            "type": "cloudflare_tiered_cache",
            "instances": [{ "schema_version": 1, "attributes": { "id": "z", "cache_type": "generic" } }]
        });
        assert_eq!(
            migrator.target_resource_type_for(&resource).as_deref(),
            Some(ARGO_TYPE)
        );

        let out = migrator
            .transform_state(&MigrationContext::default(), resource["instances"][0].clone(), "p")
            .unwrap();
        assert_eq!(out, json!({ "schema_version": 0, "attributes": { "id": "z", "value": "on" } }));
    }

    #[test]
    fn test_smart_state_keeps_type() {
        let migrator = TieredCacheMigrator::new();
        let resource = json!({
            "instances": [{ "attributes": { "cache_type": "smart" } }]
        });
        assert_eq!(migrator.target_resource_type_for(&resource), None);
        let out = migrator
            .transform_state(&MigrationContext::default(), resource["instances"][0].clone(), "p")
            .unwrap();
        assert_eq!(out["attributes"], json!({ "value": "on" }));
    }
}
