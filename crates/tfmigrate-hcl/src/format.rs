//! Canonical HCL formatter.
//!
//! Output uses two-space indentation, aligns `=` across runs of consecutive
//! attributes, separates top-level blocks with a blank line and keeps every
//! comment and author-inserted blank line recorded in the tree.

use crate::ast::*;

const INDENT: &str = "  ";

/// Tuples whose single-line rendering exceeds this are split over lines.
/// Objects stay on one line only when they hold a single short item.
const MAX_INLINE_WIDTH: usize = 80;

/// Format a body as a complete file.
pub fn format_body(body: &Body) -> String {
    let mut out = String::new();
    write_body(&mut out, body, 0);

    let trimmed = out.trim_end_matches('\n').len();
    out.truncate(trimmed);
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Format a single expression.
pub fn format_expression(expr: &Expression) -> String {
    render(expr, 0)
}

/// Format a single block at the top level.
pub fn format_block(block: &Block) -> String {
    let mut out = String::new();
    write_block(&mut out, block, 0);
    out.push('\n');
    out
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn is_block(structure: &Structure) -> bool {
    matches!(structure, Structure::Block(_))
}

/// Key widths for `=` alignment, one per structure.
///
/// A run ends at a block, a blank line or an attribute whose value spans
/// several lines; such an attribute is never padded.
fn alignment_widths(structures: &[Structure], depth: usize) -> Vec<usize> {
    let mut widths = vec![0; structures.len()];
    let mut run_start = 0;

    let close_run = |widths: &mut Vec<usize>, start: usize, end: usize| {
        let width = structures[start..end]
            .iter()
            .filter_map(Structure::as_attribute)
            .map(|a| a.key.chars().count())
            .max()
            .unwrap_or(0);
        for w in &mut widths[start..end] {
            *w = width;
        }
    };

    for (i, structure) in structures.iter().enumerate() {
        let standalone = is_block(structure) || is_multiline(structure, depth);
        let breaks = standalone || structure.decor().blank_line_before;
        if breaks && i > run_start {
            close_run(&mut widths, run_start, i);
            run_start = i;
        }
        if standalone {
            run_start = i + 1;
        }
    }
    if run_start < structures.len() {
        close_run(&mut widths, run_start, structures.len());
    }

    widths
}

fn is_multiline(structure: &Structure, depth: usize) -> bool {
    match structure {
        Structure::Attribute(attr) => render(&attr.value, depth).contains('\n'),
        Structure::Block(_) => false,
    }
}

fn write_body(out: &mut String, body: &Body, depth: usize) {
    let widths = alignment_widths(&body.structures, depth);

    for (i, structure) in body.structures.iter().enumerate() {
        if i > 0 {
            let previous = &body.structures[i - 1];
            let top_level_gap = depth == 0 && (is_block(previous) || is_block(structure));
            if structure.decor().blank_line_before || top_level_gap {
                out.push('\n');
            }
        }

        for comment in &structure.decor().leading_comments {
            push_indent(out, depth);
            out.push_str(comment);
            out.push('\n');
        }

        match structure {
            Structure::Attribute(attr) => write_attribute(out, attr, widths[i], depth),
            Structure::Block(block) => write_block(out, block, depth),
        }
        out.push('\n');
    }

    for comment in &body.trailing_comments {
        push_indent(out, depth);
        out.push_str(comment);
        out.push('\n');
    }
}

fn write_attribute(out: &mut String, attr: &Attribute, width: usize, depth: usize) {
    push_indent(out, depth);
    out.push_str(&attr.key);
    for _ in attr.key.chars().count()..width {
        out.push(' ');
    }
    out.push_str(" = ");
    out.push_str(&render(&attr.value, depth));

    if let Some(comment) = &attr.decor.trailing_comment {
        // A heredoc's closing marker must stand alone on its line.
        if matches!(attr.value, Expression::Heredoc(_)) {
            out.push('\n');
            push_indent(out, depth);
        } else {
            out.push(' ');
        }
        out.push_str(comment);
    }
}

fn write_block(out: &mut String, block: &Block, depth: usize) {
    push_indent(out, depth);
    out.push_str(&block.ident);
    for label in &block.labels {
        out.push(' ');
        match label {
            BlockLabel::String(s) => out.push_str(&quote(s)),
            BlockLabel::Identifier(s) => out.push_str(s),
        }
    }

    if block.body.is_empty() {
        out.push_str(" {}");
    } else {
        out.push_str(" {\n");
        write_body(out, &block.body, depth + 1);
        push_indent(out, depth);
        out.push('}');
    }

    if let Some(comment) = &block.decor.trailing_comment {
        out.push(' ');
        out.push_str(comment);
    }
}

/// Render an expression. `depth` is the indentation of the line the
/// expression starts on; continuation lines are indented relative to it.
fn render(expr: &Expression, depth: usize) -> String {
    match expr {
        Expression::Null => "null".to_string(),
        Expression::Bool(b) => b.to_string(),
        Expression::Number(n) => n.to_string(),
        Expression::Template(t) => render_quoted(t),
        Expression::Heredoc(h) => render_heredoc(h),
        Expression::Variable(name) => name.clone(),
        Expression::Tuple(items) => render_tuple(items, depth),
        Expression::Object(items) => render_object(items, depth),
        Expression::Traversal(t) => render_traversal(t, depth),
        Expression::FuncCall(call) => render_call(call, depth),
        Expression::Parenthesis(inner) => format!("({})", render(inner, depth)),
        Expression::Conditional(c) => format!(
            "{} ? {} : {}",
            render(&c.condition, depth),
            render(&c.true_expr, depth),
            render(&c.false_expr, depth)
        ),
        Expression::Unary(op, inner) => format!("{}{}", op.as_str(), render(inner, depth)),
        Expression::Binary(b) => format!(
            "{} {} {}",
            render(&b.lhs, depth),
            b.op.as_str(),
            render(&b.rhs, depth)
        ),
        Expression::For(f) => render_for(f, depth),
    }
}

fn fits_inline(text: &str) -> bool {
    !text.contains('\n') && text.chars().count() <= MAX_INLINE_WIDTH
}

fn write_leading_decor(out: &mut String, decor: &Decor, depth: usize) {
    if decor.blank_line_before {
        out.push('\n');
    }
    for comment in &decor.leading_comments {
        push_indent(out, depth);
        out.push_str(comment);
        out.push('\n');
    }
}

/// Append a same-line comment. A heredoc's closing marker must stand alone,
/// so after one the comment moves to its own line.
fn write_trailing_comment(out: &mut String, decor: &Decor, after_heredoc: bool, depth: usize) {
    let Some(comment) = &decor.trailing_comment else {
        return;
    };
    if after_heredoc {
        out.push('\n');
        push_indent(out, depth);
    } else {
        out.push(' ');
    }
    out.push_str(comment);
}

/// Write one element of a multi-line tuple or argument list.
fn write_list_item(out: &mut String, value: &Expression, decor: &Decor, last: bool, depth: usize) {
    write_leading_decor(out, decor, depth + 1);
    push_indent(out, depth + 1);
    out.push_str(&render(value, depth + 1));
    let heredoc = matches!(value, Expression::Heredoc(_));
    if heredoc {
        if !last {
            out.push('\n');
            push_indent(out, depth + 1);
            out.push(',');
        }
    } else {
        out.push(',');
    }
    write_trailing_comment(out, decor, heredoc && last, depth + 1);
    out.push('\n');
}

fn render_tuple(items: &[TupleItem], depth: usize) -> String {
    if items.is_empty() {
        return "[]".to_string();
    }

    if !items.iter().any(|item| item.decor.has_comments()) {
        let inline = format!(
            "[{}]",
            items
                .iter()
                .map(|item| render(&item.value, depth))
                .collect::<Vec<_>>()
                .join(", ")
        );
        if fits_inline(&inline) {
            return inline;
        }
    }

    let mut out = String::from("[\n");
    for (i, item) in items.iter().enumerate() {
        write_list_item(&mut out, &item.value, &item.decor, i + 1 == items.len(), depth);
    }
    push_indent(&mut out, depth);
    out.push(']');
    out
}

fn render_object_key(key: &ObjectKey, depth: usize) -> String {
    match key {
        ObjectKey::Identifier(name) => name.clone(),
        ObjectKey::Expression(expr) => render(expr, depth),
    }
}

fn render_object(items: &[ObjectItem], depth: usize) -> String {
    if items.is_empty() {
        return "{}".to_string();
    }

    let inline = format!(
        "{{ {} }}",
        items
            .iter()
            .map(|item| format!(
                "{} = {}",
                render_object_key(&item.key, depth),
                render(&item.value, depth)
            ))
            .collect::<Vec<_>>()
            .join(", ")
    );
    if items.len() == 1 && !items[0].decor.has_comments() && fits_inline(&inline) {
        return inline;
    }

    let keys: Vec<String> = items
        .iter()
        .map(|item| render_object_key(&item.key, depth + 1))
        .collect();
    let width = keys.iter().map(|k| k.chars().count()).max().unwrap_or(0);

    let mut out = String::from("{\n");
    for (item, key) in items.iter().zip(&keys) {
        write_leading_decor(&mut out, &item.decor, depth + 1);
        push_indent(&mut out, depth + 1);
        out.push_str(key);
        for _ in key.chars().count()..width {
            out.push(' ');
        }
        out.push_str(" = ");
        out.push_str(&render(&item.value, depth + 1));
        let heredoc = matches!(item.value, Expression::Heredoc(_));
        write_trailing_comment(&mut out, &item.decor, heredoc, depth + 1);
        out.push('\n');
    }
    push_indent(&mut out, depth);
    out.push('}');
    out
}

fn render_traversal(traversal: &Traversal, depth: usize) -> String {
    let mut out = render(&traversal.expr, depth);
    for op in &traversal.operators {
        match op {
            TraversalOperator::GetAttr(name) => {
                out.push('.');
                out.push_str(name);
            }
            TraversalOperator::Index(index) => {
                out.push('[');
                out.push_str(&render(index, depth));
                out.push(']');
            }
            TraversalOperator::LegacyIndex(index) => {
                out.push('.');
                out.push_str(&index.to_string());
            }
            TraversalOperator::AttrSplat => out.push_str(".*"),
            TraversalOperator::FullSplat => out.push_str("[*]"),
        }
    }
    out
}

fn render_call(call: &FuncCall, depth: usize) -> String {
    let ellipsis = if call.expand_final { "..." } else { "" };
    let args: Vec<String> = call.args.iter().map(|arg| render(arg, depth)).collect();
    let inline = format!("{}({}{})", call.name, args.join(", "), ellipsis);
    if !inline.contains('\n') {
        return inline;
    }

    let mut out = format!("{}(\n", call.name);
    let plain = Decor::default();
    for (i, arg) in call.args.iter().enumerate() {
        write_list_item(&mut out, arg, &plain, i + 1 == call.args.len(), depth);
    }
    if call.expand_final {
        // `...` must follow the final argument directly.
        let trimmed = out.trim_end_matches(['\n', ',']).len();
        out.truncate(trimmed);
        out.push_str("...\n");
    }
    push_indent(&mut out, depth);
    out.push(')');
    out
}

fn render_for(f: &ForExpr, depth: usize) -> String {
    let vars = match &f.key_var {
        Some(key) => format!("{}, {}", key, f.value_var),
        None => f.value_var.clone(),
    };
    let head = format!("for {} in {} : ", vars, render(&f.collection, depth));
    let condition = f
        .condition
        .as_ref()
        .map(|c| format!(" if {}", render(c, depth)))
        .unwrap_or_default();

    match &f.key_expr {
        Some(key) => format!(
            "{{ {}{} => {}{}{} }}",
            head,
            render(key, depth),
            render(&f.value_expr, depth),
            if f.grouping { "..." } else { "" },
            condition
        ),
        None => format!("[{}{}{}]", head, render(&f.value_expr, depth), condition),
    }
}

fn render_template_parts(parts: &[TemplatePart], escape_literal: fn(&str) -> String) -> String {
    let mut out = String::new();
    for part in parts {
        match part {
            TemplatePart::Literal(text) => out.push_str(&escape_literal(text)),
            TemplatePart::Interpolation(interp) => {
                out.push_str("${");
                if interp.strip_left {
                    out.push('~');
                }
                out.push_str(&render(&interp.expr, 0));
                if interp.strip_right {
                    out.push('~');
                }
                out.push('}');
            }
            TemplatePart::Directive(directive) => {
                out.push_str(&directive.head);
                if let Some(expr) = &directive.expr {
                    out.push_str(&render(expr, 0));
                }
                out.push_str(&directive.tail);
            }
        }
    }
    out
}

fn render_quoted(template: &Template) -> String {
    format!("\"{}\"", render_template_parts(&template.parts, escape_quoted))
}

fn render_heredoc(heredoc: &Heredoc) -> String {
    let mut out = String::new();
    out.push_str(if heredoc.strip_indent { "<<-" } else { "<<" });
    out.push_str(&heredoc.delimiter);
    out.push('\n');

    let content = render_template_parts(&heredoc.template.parts, escape_markers);
    out.push_str(&content);
    if !content.is_empty() && !content.ends_with('\n') {
        out.push('\n');
    }

    out.push_str(&heredoc.closing_indent);
    out.push_str(&heredoc.delimiter);
    out
}

/// Quote a string as an HCL literal.
pub fn quote(text: &str) -> String {
    format!("\"{}\"", escape_quoted(text))
}

fn escape_markers(text: &str) -> String {
    text.replace("${", "$${").replace("%{", "%%{")
}

fn escape_quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    escape_markers(&out)
}
