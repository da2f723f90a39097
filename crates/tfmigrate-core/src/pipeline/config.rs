//! Configuration (HCL) pipeline.

use crate::context::MigrationContext;
use crate::engine::EngineConfig;
use crate::error::{ErrorList, MigrationError};
use crate::merge::merge_config;
use crate::registry::Registry;
use tfmigrate_hcl::span::offset_to_line_col;
use tfmigrate_hcl::{format_body, parse_body, Block, Structure};
use tracing::{debug, info};

/// Per-file counters of a configuration run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigStats {
    /// Resource blocks handed to a transformer.
    pub transformed: usize,
    /// Resource blocks with no registered transformer.
    pub untouched: usize,
    /// Item resources folded into a parent by a merge rule.
    pub merged: usize,
}

/// Runs one configuration file through the registered transformers.
pub struct ConfigPipeline<'a> {
    registry: &'a Registry,
    config: &'a EngineConfig,
}

impl<'a> ConfigPipeline<'a> {
    pub fn new(registry: &'a Registry, config: &'a EngineConfig) -> Self {
        Self { registry, config }
    }

    /// Transform a file, returning the canonical rewritten text.
    ///
    /// Any recorded error aborts the file: nothing is returned but the errors.
    pub fn run(
        &self,
        bytes: &[u8],
        filename: &str,
        ctx: &MigrationContext,
    ) -> Result<(Vec<u8>, ConfigStats), ErrorList> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            MigrationError::parse("file is not valid UTF-8")
                .with_operation("read")
                .with_file(filename)
                .with_source(e)
        })?;

        let source = self
            .registry
            .transformers()
            .fold(text.to_string(), |text, t| t.preprocess(text));

        let mut body = parse_body(&source).map_err(|e| {
            MigrationError::from_parse_error(e, &source, filename).with_operation("parse")
        })?;

        let mut errors = ErrorList::new(self.config.max_errors);
        let mut stats = ConfigStats::default();
        let structures = std::mem::take(&mut body.structures);
        let mut rewritten = Vec::with_capacity(structures.len());
        for structure in structures {
            match structure {
                Structure::Block(block) if block.is_resource() => {
                    let blocks =
                        self.transform_block(block, &source, filename, ctx, &mut errors, &mut stats);
                    rewritten.extend(blocks.into_iter().map(Structure::Block));
                }
                other => rewritten.push(other),
            }
        }
        body.structures = rewritten;

        if errors.has_errors() {
            return Err(errors);
        }

        if self.config.merge_enabled {
            let siblings = self.sibling_blocks(filename, ctx);
            for rule in self.registry.merge_rules() {
                stats.merged += merge_config(&mut body, rule, &siblings).merged;
            }
        }

        info!(
            file = filename,
            transformed = stats.transformed,
            untouched = stats.untouched,
            merged = stats.merged,
            "migrated configuration"
        );
        Ok((format_body(&body).into_bytes(), stats))
    }

    /// Migrated resource blocks of the other files in the module that take
    /// part in a merge rule, as either parent or item.
    ///
    /// A block whose transform fails is left out; its own file reports the
    /// failure.
    fn sibling_blocks(&self, filename: &str, ctx: &MigrationContext) -> Vec<Block> {
        let rules = self.registry.merge_rules();
        if rules.is_empty() {
            return Vec::new();
        }
        let merged_type = |block: &Block| {
            block.resource_type().map_or(false, |t| {
                rules.iter().any(|r| r.parent_type == t || r.item_type == t)
            })
        };

        let mut siblings = Vec::new();
        for (name, body) in ctx.files().filter(|(name, _)| *name != filename) {
            for block in body.blocks().filter(|b| b.is_resource() && merged_type(b)) {
                let Some(transformer) = block.resource_type().and_then(|t| self.registry.find(t)) else {
                    siblings.push(block.clone());
                    continue;
                };
                match transformer.transform_config(ctx, block.clone()) {
                    Ok(result) => siblings.extend(result.blocks.into_iter().filter(|b| merged_type(b))),
                    Err(err) => debug!(file = name, error = %err, "skipping sibling block that fails to migrate"),
                }
            }
        }
        siblings
    }

    /// Transform one resource block. On failure the error is recorded and the
    /// original block is returned.
    fn transform_block(
        &self,
        block: Block,
        source: &str,
        filename: &str,
        ctx: &MigrationContext,
        errors: &mut ErrorList,
        stats: &mut ConfigStats,
    ) -> Vec<Block> {
        let (line, _) = offset_to_line_col(source, block.span.start);

        if block.labels.len() != 2 {
            errors.push(
                MigrationError::validation(format!(
                    "resource block must have exactly 2 labels, found {}",
                    block.labels.len()
                ))
                .with_operation("validate")
                .with_file(filename)
                .with_line(line),
            );
            return vec![block];
        }

        let (resource_type, name) = (
            block.label(0).unwrap_or_default().to_string(),
            block.label(1).unwrap_or_default().to_string(),
        );
        let address = format!("{}.{}", resource_type, name);
        let Some(transformer) = self.registry.find(&resource_type) else {
            stats.untouched += 1;
            return vec![block];
        };

        debug!(resource = %address, file = filename, "transforming resource block");
        let result = match transformer.transform_config(ctx, block.clone()) {
            Ok(result) => result,
            Err(err) => {
                errors.push(tag(err, "transform_config", &address, filename, line, ctx));
                return vec![block];
            }
        };

        if !result.remove_original {
            if result.blocks.len() != 1 {
                errors.push(tag(
                    MigrationError::validation(format!(
                        "in-place transform must return exactly 1 block, got {}",
                        result.blocks.len()
                    )),
                    "transform_config",
                    &address,
                    filename,
                    line,
                    ctx,
                ));
                return vec![block];
            }
            let returned = &result.blocks[0];
            if returned.labels.len() != 2 || returned.resource_name() != Some(name.as_str()) {
                errors.push(tag(
                    MigrationError::validation(format!(
                        "in-place transform must keep the resource name {:?}, got labels {:?}",
                        name,
                        returned.labels.iter().map(|l| l.as_str()).collect::<Vec<_>>()
                    )),
                    "transform_config",
                    &address,
                    filename,
                    line,
                    ctx,
                ));
                return vec![block];
            }
            stats.transformed += 1;
            return result.blocks;
        }

        stats.transformed += 1;
        let mut blocks = result.blocks;
        if let Some(first) = blocks.first_mut() {
            if first.decor.leading_comments.is_empty() {
                first.decor.leading_comments = block.decor.leading_comments.clone();
            }
            first.decor.blank_line_before = block.decor.blank_line_before;
        }
        debug!(resource = %address, replacements = blocks.len(), "replaced resource block");
        blocks
    }
}

fn tag(
    err: MigrationError,
    operation: &str,
    address: &str,
    filename: &str,
    line: usize,
    ctx: &MigrationContext,
) -> MigrationError {
    let mut err = err;
    if err.operation.is_none() {
        err = err.with_operation(operation);
    }
    if err.resource.is_none() {
        err = err.with_resource(address);
    }
    if err.version.is_none() {
        err = err.with_version(ctx.version_label());
    }
    err.with_file(filename).with_line(line)
}
