//! Expression traversal and reference rewriting.

use crate::ast::*;

/// Direct child expressions, in source order.
pub fn children(expr: &Expression) -> Vec<&Expression> {
    let mut out = Vec::new();
    match expr {
        Expression::Null
        | Expression::Bool(_)
        | Expression::Number(_)
        | Expression::Variable(_) => {}
        Expression::Template(t) => out.extend(template_exprs(t)),
        Expression::Heredoc(h) => out.extend(template_exprs(&h.template)),
        Expression::Tuple(items) => out.extend(items.iter().map(|item| &item.value)),
        Expression::Object(items) => {
            for item in items {
                if let ObjectKey::Expression(key) = &item.key {
                    out.push(key);
                }
                out.push(&item.value);
            }
        }
        Expression::Traversal(t) => {
            out.push(t.expr.as_ref());
            out.extend(index_exprs(&t.operators));
        }
        Expression::FuncCall(call) => out.extend(call.args.iter()),
        Expression::Parenthesis(inner) | Expression::Unary(_, inner) => out.push(inner.as_ref()),
        Expression::Conditional(c) => {
            out.push(&c.condition);
            out.push(&c.true_expr);
            out.push(&c.false_expr);
        }
        Expression::Binary(b) => {
            out.push(&b.lhs);
            out.push(&b.rhs);
        }
        Expression::For(fe) => {
            out.push(&fe.collection);
            out.extend(fe.key_expr.as_ref());
            out.push(&fe.value_expr);
            out.extend(fe.condition.as_ref());
        }
    }
    out
}

fn template_exprs(template: &Template) -> impl Iterator<Item = &Expression> {
    template.parts.iter().filter_map(|part| match part {
        TemplatePart::Interpolation(interp) => Some(&interp.expr),
        TemplatePart::Directive(directive) => directive.expr.as_ref(),
        TemplatePart::Literal(_) => None,
    })
}

fn index_exprs(operators: &[TraversalOperator]) -> impl Iterator<Item = &Expression> {
    operators.iter().filter_map(|op| match op {
        TraversalOperator::Index(index) => Some(index),
        _ => None,
    })
}

/// Visit every expression in pre-order.
pub fn walk<'a>(expr: &'a Expression, f: &mut dyn FnMut(&'a Expression)) {
    f(expr);
    for child in children(expr) {
        walk(child, f);
    }
}

/// Visit every attribute value in a body, including nested blocks.
pub fn for_each_attribute_mut(body: &mut Body, f: &mut dyn FnMut(&mut Attribute)) {
    for structure in &mut body.structures {
        match structure {
            Structure::Attribute(attr) => f(attr),
            Structure::Block(block) => for_each_attribute_mut(&mut block.body, f),
        }
    }
}

/// The static reference prefix of an expression.
///
/// `cloudflare_list.main.id` gives `["cloudflare_list", "main", "id"]`, and
/// `var.items[count.index].ip` gives `["var", "items"]`.
pub fn reference_prefix(expr: &Expression) -> Option<Vec<String>> {
    match expr {
        Expression::Variable(name) => Some(vec![name.clone()]),
        Expression::Traversal(t) => {
            let Expression::Variable(root) = t.expr.as_ref() else {
                return None;
            };
            let mut path = vec![root.clone()];
            for op in &t.operators {
                match op {
                    TraversalOperator::GetAttr(name) => path.push(name.clone()),
                    TraversalOperator::Index(index) => match index.as_str() {
                        Some(key) => path.push(key.to_string()),
                        None => break,
                    },
                    _ => break,
                }
            }
            Some(path)
        }
        _ => None,
    }
}

/// Collect the static reference prefixes used anywhere in an expression.
pub fn collect_references(expr: &Expression) -> Vec<Vec<String>> {
    let mut refs = Vec::new();
    collect_into(expr, &mut refs);
    refs
}

fn collect_into(expr: &Expression, refs: &mut Vec<Vec<String>>) {
    match expr {
        Expression::Variable(name) => refs.push(vec![name.clone()]),
        Expression::Traversal(t) if matches!(t.expr.as_ref(), Expression::Variable(_)) => {
            refs.extend(reference_prefix(expr));
            for index in index_exprs(&t.operators) {
                collect_into(index, refs);
            }
        }
        _ => {
            for child in children(expr) {
                collect_into(child, refs);
            }
        }
    }
}

/// Collect the static reference prefixes used in a body, including nested blocks.
pub fn collect_body_references(body: &Body) -> Vec<Vec<String>> {
    let mut refs = Vec::new();
    for structure in &body.structures {
        match structure {
            Structure::Attribute(attr) => refs.extend(collect_references(&attr.value)),
            Structure::Block(block) => refs.extend(collect_body_references(&block.body)),
        }
    }
    refs
}

fn build_reference(to: &[&str], rest: Vec<TraversalOperator>) -> Expression {
    let mut operators: Vec<TraversalOperator> = to
        .iter()
        .skip(1)
        .map(|s| TraversalOperator::GetAttr((*s).to_string()))
        .collect();
    operators.extend(rest);

    let root = Expression::variable(to.first().copied().unwrap_or_default());
    if operators.is_empty() {
        root
    } else {
        Expression::Traversal(Traversal {
            expr: Box::new(root),
            operators,
        })
    }
}

fn matches_prefix(operators: &[TraversalOperator], segments: &[&str]) -> bool {
    operators.len() >= segments.len()
        && operators.iter().zip(segments).all(|(op, seg)| match op {
            TraversalOperator::GetAttr(name) => name == seg,
            TraversalOperator::Index(index) => index.as_str() == Some(seg),
            _ => false,
        })
}

/// Replace the reference prefix `from` with `to` everywhere in `expr`.
///
/// Matching is structural: `each.value` matches `each.value.ip` but not
/// `each.values` or `other.each.value`. Variables bound by an enclosing `for`
/// expression shadow the reference. Returns the number of replacements.
pub fn rename_reference(expr: &mut Expression, from: &[&str], to: &[&str]) -> usize {
    let Some(root) = from.first() else {
        return 0;
    };
    if to.is_empty() {
        return 0;
    }

    let mut count = 0;
    match expr {
        Expression::Variable(name) => {
            if from.len() == 1 && name.as_str() == *root {
                *expr = build_reference(to, Vec::new());
                count += 1;
            }
        }
        Expression::Traversal(t) => {
            let rooted_here = matches!(t.expr.as_ref(), Expression::Variable(name) if name.as_str() == *root);
            if rooted_here && matches_prefix(&t.operators, &from[1..]) {
                let rest: Vec<TraversalOperator> = t.operators.drain(from.len() - 1..).collect();
                *expr = build_reference(to, rest);
                count += 1;
                if let Expression::Traversal(t) = expr {
                    count += rename_in_operators(&mut t.operators, from, to);
                }
            } else {
                count += rename_reference(&mut t.expr, from, to);
                count += rename_in_operators(&mut t.operators, from, to);
            }
        }
        Expression::Null | Expression::Bool(_) | Expression::Number(_) => {}
        Expression::Template(t) => count += rename_in_template(t, from, to),
        Expression::Heredoc(h) => count += rename_in_template(&mut h.template, from, to),
        Expression::Tuple(items) => {
            for item in items {
                count += rename_reference(&mut item.value, from, to);
            }
        }
        Expression::Object(items) => {
            for item in items {
                if let ObjectKey::Expression(key) = &mut item.key {
                    count += rename_reference(key, from, to);
                }
                count += rename_reference(&mut item.value, from, to);
            }
        }
        Expression::FuncCall(call) => {
            for arg in &mut call.args {
                count += rename_reference(arg, from, to);
            }
        }
        Expression::Parenthesis(inner) | Expression::Unary(_, inner) => {
            count += rename_reference(inner, from, to);
        }
        Expression::Conditional(c) => {
            count += rename_reference(&mut c.condition, from, to);
            count += rename_reference(&mut c.true_expr, from, to);
            count += rename_reference(&mut c.false_expr, from, to);
        }
        Expression::Binary(b) => {
            count += rename_reference(&mut b.lhs, from, to);
            count += rename_reference(&mut b.rhs, from, to);
        }
        Expression::For(fe) => {
            count += rename_reference(&mut fe.collection, from, to);
            let shadowed = fe.value_var == *root || fe.key_var.as_deref() == Some(*root);
            if !shadowed {
                if let Some(key) = &mut fe.key_expr {
                    count += rename_reference(key, from, to);
                }
                count += rename_reference(&mut fe.value_expr, from, to);
                if let Some(cond) = &mut fe.condition {
                    count += rename_reference(cond, from, to);
                }
            }
        }
    }
    count
}

fn rename_in_operators(operators: &mut [TraversalOperator], from: &[&str], to: &[&str]) -> usize {
    operators
        .iter_mut()
        .map(|op| match op {
            TraversalOperator::Index(index) => rename_reference(index, from, to),
            _ => 0,
        })
        .sum()
}

fn rename_in_template(template: &mut Template, from: &[&str], to: &[&str]) -> usize {
    template
        .parts
        .iter_mut()
        .map(|part| match part {
            TemplatePart::Interpolation(interp) => rename_reference(&mut interp.expr, from, to),
            TemplatePart::Directive(directive) => directive
                .expr
                .as_mut()
                .map_or(0, |expr| rename_reference(expr, from, to)),
            TemplatePart::Literal(_) => 0,
        })
        .sum()
}

/// Replace a reference prefix in every attribute of a body.
pub fn rename_reference_in_body(body: &mut Body, from: &[&str], to: &[&str]) -> usize {
    let mut count = 0;
    for_each_attribute_mut(body, &mut |attr| {
        count += rename_reference(&mut attr.value, from, to);
    });
    count
}
