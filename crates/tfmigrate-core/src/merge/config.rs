//! Configuration side of the cross-resource merge.

use super::rule::{FieldKind, MergeField, MergeRule};
use crate::primitives::hcl::enabled_to_bool_expr;
use std::collections::HashSet;
use tfmigrate_hcl::visit::{collect_body_references, collect_references};
use tfmigrate_hcl::{
    format_expression, rename_reference, Block, Body, Expression, ForExpr, ObjectItem,
    Structure,
};
use tracing::{debug, warn};

/// Marker prefixed to comments the merge attaches to a parent block.
pub const MERGE_COMMENT_PREFIX: &str = "# tfmigrate:";

/// Counters from one merge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Item resources folded into a parent.
    pub merged: usize,
    /// Item resources removed because a parent in another file absorbs them.
    pub relocated: usize,
    /// Item resources whose parent was not found in the module.
    pub orphaned: usize,
    /// Parents skipped because the target attribute was already set.
    pub aborted: usize,
    /// References to merged items left in the document.
    pub dangling: usize,
}

/// A merged item: where it was and which parent absorbed it.
struct Absorbed {
    item: [String; 2],
    parent: [String; 2],
}

/// Fold item resource blocks into their parent's collection attribute.
///
/// `siblings` are the already migrated resource blocks of the other files in
/// the module. A parent in `body` also absorbs sibling items that reference
/// it, and an item in `body` whose parent is declared in a sibling file is
/// removed, because migrating that file folds it in.
pub fn merge_config(body: &mut Body, rule: &MergeRule, siblings: &[Block]) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    let mut parents: Vec<(usize, String)> = Vec::new();
    let mut items: Vec<(usize, Option<String>)> = Vec::new();
    for (index, structure) in body.structures.iter().enumerate() {
        let Some(block) = structure.as_block() else {
            continue;
        };
        let (Some(resource_type), Some(name)) = (block.resource_type(), block.resource_name()) else {
            continue;
        };
        if resource_type == rule.parent_type {
            parents.push((index, name.to_string()));
        } else if resource_type == rule.item_type {
            items.push((index, referenced_parent(block, rule)));
        }
    }

    let foreign_parents: Vec<&Block> = siblings
        .iter()
        .filter(|b| b.resource_type() == Some(rule.parent_type.as_str()))
        .collect();
    let foreign_items: Vec<(&Block, String)> = siblings
        .iter()
        .filter(|b| b.resource_type() == Some(rule.item_type.as_str()))
        .filter_map(|b| Some((b, referenced_parent(b, rule)?)))
        .filter(|(_, parent)| parents.iter().any(|(_, name)| name == parent))
        .collect();

    let mut removed: Vec<usize> = Vec::new();
    let mut absorbed: Vec<Absorbed> = Vec::new();
    for (index, parent) in &items {
        let Some(parent) = parent.as_deref() else {
            warn_orphan(body, *index, None, rule);
            outcome.orphaned += 1;
            continue;
        };
        if parents.iter().any(|(_, name)| name == parent) {
            continue;
        }
        match foreign_parents.iter().find(|b| b.resource_name() == Some(parent)) {
            Some(foreign) if !foreign.body.has_attribute(&rule.target_attribute) => {
                let name = body.structures[*index]
                    .as_block()
                    .and_then(Block::resource_name)
                    .unwrap_or_default()
                    .to_string();
                debug!(
                    item = %format!("{}.{}", rule.item_type, name),
                    parent = %format!("{}.{}", rule.parent_type, parent),
                    "parent is declared in another file, moving item there"
                );
                absorbed.push(Absorbed {
                    item: [rule.item_type.clone(), name],
                    parent: [rule.parent_type.clone(), parent.to_string()],
                });
                removed.push(*index);
                outcome.relocated += 1;
            }
            // The parent's own file reports the abort.
            Some(_) => {}
            None => {
                warn_orphan(body, *index, Some(parent), rule);
                outcome.orphaned += 1;
            }
        }
    }

    for (parent_index, parent_name) in &parents {
        let members: Vec<usize> = items
            .iter()
            .filter(|(_, p)| p.as_deref() == Some(parent_name.as_str()))
            .map(|(i, _)| *i)
            .collect();
        let foreign: Vec<&Block> = foreign_items
            .iter()
            .filter(|(_, p)| p == parent_name)
            .map(|(b, _)| *b)
            .collect();
        if members.is_empty() && foreign.is_empty() {
            continue;
        }

        let Some(parent) = body.structures[*parent_index].as_block() else {
            continue;
        };
        if parent.body.has_attribute(&rule.target_attribute) {
            outcome.aborted += 1;
            warn!(
                parent = %format!("{}.{}", rule.parent_type, parent_name),
                attribute = %rule.target_attribute,
                items = members.len() + foreign.len(),
                "parent already sets the target attribute, not merging"
            );
            let comment = format!(
                "{} {} resources referencing this resource were not merged because {} is already set",
                MERGE_COMMENT_PREFIX, rule.item_type, rule.target_attribute
            );
            if let Some(parent) = body.structures[*parent_index].as_block_mut() {
                if !parent.decor.leading_comments.contains(&comment) {
                    parent.decor.leading_comments.push(comment);
                }
            }
            continue;
        }

        let kind = rule
            .kind_attribute
            .as_deref()
            .and_then(|k| parent.body.get(k))
            .and_then(Expression::as_str)
            .map(str::to_string);
        let blocks: Vec<&Block> = members
            .iter()
            .filter_map(|i| body.structures[*i].as_block())
            .chain(foreign.iter().copied())
            .collect();
        let collection = build_collection(rule, kind.as_deref(), &blocks);

        for block in &blocks {
            absorbed.push(Absorbed {
                item: [
                    rule.item_type.clone(),
                    block.resource_name().unwrap_or_default().to_string(),
                ],
                parent: [rule.parent_type.clone(), parent_name.clone()],
            });
        }
        debug!(
            parent = %format!("{}.{}", rule.parent_type, parent_name),
            items = blocks.len(),
            from_other_files = foreign.len(),
            "merged items into parent"
        );
        let merged_count = blocks.len();

        if let Some(parent) = body.structures[*parent_index].as_block_mut() {
            parent
                .body
                .set_attribute(rule.target_attribute.clone(), collection);
        }
        outcome.merged += merged_count;
        removed.extend(members);
    }

    removed.sort_unstable();
    for index in removed.into_iter().rev() {
        body.structures.remove(index);
    }
    if let Some(first) = body.structures.first_mut() {
        first.decor_mut().blank_line_before = false;
    }

    for structure in &mut body.structures {
        if let Structure::Block(block) = structure {
            retarget_depends_on(&mut block.body, &absorbed);
        }
    }
    outcome.dangling = report_dangling(body, &absorbed);
    outcome
}

fn warn_orphan(body: &Body, index: usize, parent: Option<&str>, rule: &MergeRule) {
    let name = body.structures[index]
        .as_block()
        .and_then(Block::resource_name)
        .unwrap_or_default();
    warn!(
        item = %format!("{}.{}", rule.item_type, name),
        parent = parent.unwrap_or("<unresolved>"),
        "item references no {} in this module, leaving it in place",
        rule.parent_type
    );
}

/// Resolve the parent name from the item's reference attribute.
///
/// Accepts `type.name`, `type.name.attr` and `type["name"].attr`.
fn referenced_parent(block: &Block, rule: &MergeRule) -> Option<String> {
    let path = block
        .body
        .get(&rule.parent_ref_attribute)?
        .as_reference_path()?;
    match path.as_slice() {
        [resource_type, name] | [resource_type, name, _] if *resource_type == rule.parent_type => {
            Some(name.clone())
        }
        _ => None,
    }
}

enum Part {
    Static(Vec<Expression>),
    Dynamic(Expression),
}

/// Build the collection expression for the items of one parent.
///
/// Consecutive static items share one tuple; each repeated item becomes a
/// `for` expression. More than one part is joined with `concat(...)`.
fn build_collection(rule: &MergeRule, kind: Option<&str>, blocks: &[&Block]) -> Expression {
    let mut parts: Vec<Part> = Vec::new();
    for block in blocks {
        let object = item_object(rule, kind, &block.body);
        if let Some(collection) = block.body.get("for_each") {
            parts.push(Part::Dynamic(for_each_expression(collection.clone(), object)));
        } else if let Some(count) = block.body.get("count") {
            parts.push(Part::Dynamic(count_expression(count.clone(), object)));
        } else {
            match parts.last_mut() {
                Some(Part::Static(objects)) => objects.push(object),
                _ => parts.push(Part::Static(vec![object])),
            }
        }
    }

    let mut expressions: Vec<Expression> = parts
        .into_iter()
        .map(|part| match part {
            Part::Static(objects) => Expression::tuple(objects),
            Part::Dynamic(expr) => expr,
        })
        .collect();
    if expressions.len() == 1 {
        expressions.remove(0)
    } else {
        Expression::call("concat", expressions)
    }
}

fn for_each_expression(collection: Expression, mut object: Expression) -> Expression {
    rename_reference(&mut object, &["each", "key"], &["key"]);
    rename_reference(&mut object, &["each", "value"], &["value"]);
    Expression::For(Box::new(ForExpr {
        key_var: Some("key".to_string()),
        value_var: "value".to_string(),
        collection,
        key_expr: None,
        value_expr: object,
        grouping: false,
        condition: None,
    }))
}

fn count_expression(count: Expression, mut object: Expression) -> Expression {
    rename_reference(&mut object, &["count", "index"], &["i"]);
    Expression::For(Box::new(ForExpr {
        key_var: None,
        value_var: "i".to_string(),
        collection: Expression::call("range", vec![count]),
        key_expr: None,
        value_expr: object,
        grouping: false,
        condition: None,
    }))
}

/// The object literal for one item, restricted to the fields of `kind`.
fn item_object(rule: &MergeRule, kind: Option<&str>, body: &Body) -> Expression {
    let fields: Vec<&MergeField> = rule.fields_for(kind).collect();
    object_from_body(&fields, body)
}

fn object_from_body(fields: &[&MergeField], body: &Body) -> Expression {
    let mut items = Vec::new();
    for field in fields {
        let value = match (&field.kind, body.get(&field.name)) {
            (FieldKind::Scalar, Some(value)) => value.clone(),
            (FieldKind::Boolean, Some(value)) => enabled_to_bool_expr(value.clone()),
            (FieldKind::Object(nested), Some(value)) => nested_object(nested, value),
            (FieldKind::Object(nested), None) => {
                match body.blocks_of_type(&field.name).next() {
                    Some(block) => {
                        let nested: Vec<&MergeField> = nested.iter().collect();
                        object_from_body(&nested, &block.body)
                    }
                    None => continue,
                }
            }
            (_, None) => continue,
        };
        items.push(ObjectItem::named(field.name.clone(), value));
    }
    Expression::Object(items)
}

/// Normalize an object-valued attribute. A legacy one-element tuple is
/// unwrapped; non-literal values pass through untouched.
fn nested_object(fields: &[MergeField], value: &Expression) -> Expression {
    let value = match value {
        Expression::Tuple(items) if items.len() == 1 => &items[0].value,
        other => other,
    };
    let Some(items) = value.as_object() else {
        return value.clone();
    };
    let mut out = Vec::new();
    for field in fields {
        let Some(item) = items.iter().find(|i| i.key.as_str() == Some(field.name.as_str())) else {
            continue;
        };
        let value = match &field.kind {
            FieldKind::Scalar => item.value.clone(),
            FieldKind::Boolean => enabled_to_bool_expr(item.value.clone()),
            FieldKind::Object(nested) => nested_object(nested, &item.value),
        };
        out.push(ObjectItem::named(field.name.clone(), value));
    }
    Expression::Object(out)
}

fn starts_with(path: &[String], prefix: &[String; 2]) -> bool {
    path.len() >= 2 && path[0] == prefix[0] && path[1] == prefix[1]
}

/// Point `depends_on` entries naming a merged item at its parent instead.
fn retarget_depends_on(body: &mut Body, absorbed: &[Absorbed]) {
    if absorbed.is_empty() {
        return;
    }
    let Some(attr) = body.get_attribute_mut("depends_on") else {
        return;
    };
    let Expression::Tuple(entries) = &mut attr.value else {
        return;
    };

    let mut changed = false;
    for entry in entries.iter_mut() {
        let Some(path) = entry.value.as_reference_path() else {
            continue;
        };
        if let Some(a) = absorbed.iter().find(|a| starts_with(&path, &a.item)) {
            entry.value = Expression::reference(&a.parent);
            changed = true;
        }
    }
    if changed {
        let mut seen = HashSet::new();
        entries.retain(|entry| seen.insert(format_expression(&entry.value)));
    }
}

/// Warn about references to merged items that survived the merge.
fn report_dangling(body: &Body, absorbed: &[Absorbed]) -> usize {
    if absorbed.is_empty() {
        return 0;
    }
    let mut dangling = 0;
    for structure in &body.structures {
        let (location, references) = match structure {
            Structure::Attribute(attr) => (attr.key.clone(), collect_references(&attr.value)),
            Structure::Block(block) => {
                let mut location = block.ident.clone();
                for label in &block.labels {
                    location.push('.');
                    location.push_str(label.as_str());
                }
                (location, collect_body_references(&block.body))
            }
        };
        for path in references {
            if absorbed.iter().any(|a| starts_with(&path, &a.item)) {
                dangling += 1;
                warn!(
                    location = %location,
                    reference = %path.join("."),
                    "reference to a merged resource remains, update it by hand"
                );
            }
        }
    }
    dangling
}
