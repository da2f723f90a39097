//! Abstract Syntax Tree types for HCL documents.
//!
//! The tree keeps what a canonical re-emit needs to stay faithful to the
//! author: attribute and block order, comments attached to body items, blank
//! lines between items, number source text and template structure.

use crate::span::Span;

/// Comments and spacing attached to a body item, tuple element or object
/// item.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Decor {
    /// Comment lines preceding the item, verbatim (including `#`, `//`, `/*`).
    pub leading_comments: Vec<String>,
    /// Comment on the same line after the item.
    pub trailing_comment: Option<String>,
    /// Whether a blank line separated this item from the previous one.
    pub blank_line_before: bool,
}

impl Decor {
    pub fn has_comments(&self) -> bool {
        !self.leading_comments.is_empty() || self.trailing_comment.is_some()
    }
}

/// A body: the content of a file or of a block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Body {
    /// Attributes and blocks in source order.
    pub structures: Vec<Structure>,
    /// Comments after the last item.
    pub trailing_comments: Vec<String>,
}

/// A body item.
#[derive(Debug, Clone, PartialEq)]
pub enum Structure {
    Attribute(Attribute),
    Block(Block),
}

impl Structure {
    /// Get the attribute, if this is one.
    pub fn as_attribute(&self) -> Option<&Attribute> {
        match self {
            Structure::Attribute(attr) => Some(attr),
            Structure::Block(_) => None,
        }
    }

    /// Get the block, if this is one.
    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Structure::Block(block) => Some(block),
            Structure::Attribute(_) => None,
        }
    }

    /// Get the block mutably, if this is one.
    pub fn as_block_mut(&mut self) -> Option<&mut Block> {
        match self {
            Structure::Block(block) => Some(block),
            Structure::Attribute(_) => None,
        }
    }

    /// Get the item's decorations.
    pub fn decor(&self) -> &Decor {
        match self {
            Structure::Attribute(attr) => &attr.decor,
            Structure::Block(block) => &block.decor,
        }
    }

    /// Get the item's decorations mutably.
    pub fn decor_mut(&mut self) -> &mut Decor {
        match self {
            Structure::Attribute(attr) => &mut attr.decor,
            Structure::Block(block) => &mut block.decor,
        }
    }
}

/// An attribute: `key = expression`.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub key: String,
    pub value: Expression,
    pub decor: Decor,
    pub span: Span,
}

impl Attribute {
    /// Create a new attribute.
    pub fn new(key: impl Into<String>, value: Expression) -> Self {
        Self {
            key: key.into(),
            value,
            decor: Decor::default(),
            span: Span::default(),
        }
    }
}

/// A block label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockLabel {
    /// Quoted label: `resource "type" "name"`.
    String(String),
    /// Bare identifier label: `dynamic item`.
    Identifier(String),
}

impl BlockLabel {
    /// Get the label text.
    pub fn as_str(&self) -> &str {
        match self {
            BlockLabel::String(s) | BlockLabel::Identifier(s) => s,
        }
    }
}

/// A block: `ident "label" ... { body }`.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub ident: String,
    pub labels: Vec<BlockLabel>,
    pub body: Body,
    pub decor: Decor,
    pub span: Span,
}

impl Block {
    /// Create a new block with no labels.
    pub fn new(ident: impl Into<String>) -> Self {
        Self {
            ident: ident.into(),
            labels: Vec::new(),
            body: Body::default(),
            decor: Decor::default(),
            span: Span::default(),
        }
    }

    /// Create a `resource "type" "name" {}` block.
    pub fn resource(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new("resource")
            .with_label(resource_type)
            .with_label(name)
    }

    /// Add a quoted label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(BlockLabel::String(label.into()));
        self
    }

    /// Add an attribute to the body.
    pub fn with_attribute(mut self, key: impl Into<String>, value: Expression) -> Self {
        self.body.set_attribute(key, value);
        self
    }

    /// Add a nested block to the body.
    pub fn with_block(mut self, block: Block) -> Self {
        self.body.push_block(block);
        self
    }

    /// Get a label by position.
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(BlockLabel::as_str)
    }

    /// Replace a label, keeping its quoting style.
    pub fn set_label(&mut self, index: usize, value: impl Into<String>) {
        if let Some(label) = self.labels.get_mut(index) {
            *label = match label {
                BlockLabel::String(_) => BlockLabel::String(value.into()),
                BlockLabel::Identifier(_) => BlockLabel::Identifier(value.into()),
            };
        }
    }

    /// Whether this is a `resource` block.
    pub fn is_resource(&self) -> bool {
        self.ident == "resource"
    }

    /// The resource type label of a `resource` block.
    pub fn resource_type(&self) -> Option<&str> {
        if self.is_resource() {
            self.label(0)
        } else {
            None
        }
    }

    /// The resource name label of a `resource` block.
    pub fn resource_name(&self) -> Option<&str> {
        if self.is_resource() {
            self.label(1)
        } else {
            None
        }
    }
}

impl Body {
    /// Create an empty body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the body has no items and no comments.
    pub fn is_empty(&self) -> bool {
        self.structures.is_empty() && self.trailing_comments.is_empty()
    }

    /// Iterate over attributes.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.structures.iter().filter_map(Structure::as_attribute)
    }

    /// Iterate over blocks.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.structures.iter().filter_map(Structure::as_block)
    }

    /// Iterate over blocks mutably.
    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut Block> {
        self.structures.iter_mut().filter_map(Structure::as_block_mut)
    }

    /// Iterate over nested blocks with the given type.
    pub fn blocks_of_type<'a>(&'a self, ident: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks().filter(move |b| b.ident == ident)
    }

    /// Get an attribute by name.
    pub fn get_attribute(&self, key: &str) -> Option<&Attribute> {
        self.attributes().find(|a| a.key == key)
    }

    /// Get an attribute by name, mutably.
    pub fn get_attribute_mut(&mut self, key: &str) -> Option<&mut Attribute> {
        self.structures.iter_mut().find_map(|s| match s {
            Structure::Attribute(attr) if attr.key == key => Some(attr),
            _ => None,
        })
    }

    /// Get an attribute's expression by name.
    pub fn get(&self, key: &str) -> Option<&Expression> {
        self.get_attribute(key).map(|a| &a.value)
    }

    /// Whether an attribute with the given name exists.
    pub fn has_attribute(&self, key: &str) -> bool {
        self.get_attribute(key).is_some()
    }

    /// Set an attribute's value.
    ///
    /// An existing attribute keeps its position and comments. A new attribute
    /// is placed after the last existing attribute, before any nested block.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: Expression) {
        let key = key.into();
        if let Some(attr) = self.get_attribute_mut(&key) {
            attr.value = value;
            return;
        }
        self.insert_attribute(Attribute::new(key, value));
    }

    /// Insert a new attribute after the last existing attribute.
    pub fn insert_attribute(&mut self, attr: Attribute) {
        let position = self
            .structures
            .iter()
            .rposition(|s| matches!(s, Structure::Attribute(_)))
            .map(|i| i + 1)
            .or_else(|| {
                self.structures
                    .iter()
                    .position(|s| matches!(s, Structure::Block(_)))
            })
            .unwrap_or(self.structures.len());
        self.structures.insert(position, Structure::Attribute(attr));
    }

    /// Remove an attribute, returning it.
    pub fn remove_attribute(&mut self, key: &str) -> Option<Attribute> {
        let index = self
            .structures
            .iter()
            .position(|s| matches!(s, Structure::Attribute(a) if a.key == key))?;
        match self.structures.remove(index) {
            Structure::Attribute(attr) => Some(attr),
            Structure::Block(_) => None,
        }
    }

    /// Append a block.
    pub fn push_block(&mut self, block: Block) {
        self.structures.push(Structure::Block(block));
    }

    /// Remove every nested block with the given type, returning them in order.
    pub fn remove_blocks(&mut self, ident: &str) -> Vec<Block> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.structures.len());
        for structure in self.structures.drain(..) {
            match structure {
                Structure::Block(block) if block.ident == ident => removed.push(block),
                other => kept.push(other),
            }
        }
        self.structures = kept;
        removed
    }
}

/// A number literal, kept as source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Number(String);

impl Number {
    /// Create a number from its source representation.
    pub fn from_source(text: impl Into<String>) -> Self {
        Number(text.into())
    }

    /// Get the source text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interpret as an integer.
    pub fn as_i64(&self) -> Option<i64> {
        self.0.parse().ok()
    }

    /// Interpret as a float.
    pub fn as_f64(&self) -> Option<f64> {
        self.0.parse().ok()
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number(value.to_string())
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number(value.to_string())
    }
}

impl std::fmt::Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A string template: literal text mixed with interpolations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    pub parts: Vec<TemplatePart>,
}

impl Template {
    /// A template holding only literal text.
    pub fn literal(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            Template::default()
        } else {
            Template {
                parts: vec![TemplatePart::Literal(text)],
            }
        }
    }

    /// The literal text, if the template has no interpolations or directives.
    pub fn as_literal(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [] => Some(""),
            [TemplatePart::Literal(text)] => Some(text),
            _ => None,
        }
    }
}

/// A piece of a template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Decoded literal text.
    Literal(String),
    /// `${ expr }`, with optional `~` strip markers.
    Interpolation(Interpolation),
    /// `%{ ... }` directive.
    Directive(Directive),
}

/// A template directive such as `%{ if cond }`, `%{ for x in list }` or
/// `%{ endfor }`.
///
/// Only the controlling expression of `if` and `for` is parsed; the text
/// around it is kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    /// Text up to the expression, e.g. `%{ for ip in `. Holds the whole
    /// directive when there is no expression.
    pub head: String,
    pub expr: Option<Expression>,
    /// Text after the expression, e.g. ` ~}`.
    pub tail: String,
}

impl Directive {
    /// A directive with no expression, such as `%{ else }`.
    pub fn verbatim(text: impl Into<String>) -> Self {
        Self {
            head: text.into(),
            expr: None,
            tail: String::new(),
        }
    }
}

/// A template interpolation.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolation {
    pub expr: Expression,
    pub strip_left: bool,
    pub strip_right: bool,
}

/// A heredoc template.
#[derive(Debug, Clone, PartialEq)]
pub struct Heredoc {
    pub delimiter: String,
    pub strip_indent: bool,
    pub template: Template,
    pub closing_indent: String,
}

/// A tuple element.
#[derive(Debug, Clone, PartialEq)]
pub struct TupleItem {
    pub value: Expression,
    pub decor: Decor,
}

impl From<Expression> for TupleItem {
    fn from(value: Expression) -> Self {
        Self {
            value,
            decor: Decor::default(),
        }
    }
}

/// An object constructor item.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectItem {
    pub key: ObjectKey,
    pub value: Expression,
    pub decor: Decor,
}

impl ObjectItem {
    pub fn new(key: ObjectKey, value: Expression) -> Self {
        Self {
            key,
            value,
            decor: Decor::default(),
        }
    }

    /// An item with a bare identifier key.
    pub fn named(key: impl Into<String>, value: Expression) -> Self {
        Self::new(ObjectKey::Identifier(key.into()), value)
    }
}

/// An object key.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKey {
    /// Bare identifier key.
    Identifier(String),
    /// Any other key expression, e.g. a quoted string or `(var.key)`.
    Expression(Expression),
}

impl ObjectKey {
    /// The key name if it is an identifier or a literal string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ObjectKey::Identifier(name) => Some(name),
            ObjectKey::Expression(expr) => expr.as_str(),
        }
    }
}

/// A traversal step.
#[derive(Debug, Clone, PartialEq)]
pub enum TraversalOperator {
    /// `.name`
    GetAttr(String),
    /// `[expr]`
    Index(Expression),
    /// `.0`
    LegacyIndex(u64),
    /// `.*`
    AttrSplat,
    /// `[*]`
    FullSplat,
}

/// An expression followed by traversal steps: `aws_instance.web.id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Traversal {
    pub expr: Box<Expression>,
    pub operators: Vec<TraversalOperator>,
}

/// A function call.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncCall {
    pub name: String,
    pub args: Vec<Expression>,
    /// Whether the final argument is expanded with `...`.
    pub expand_final: bool,
}

/// `condition ? true_expr : false_expr`.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub condition: Expression,
    pub true_expr: Expression,
    pub false_expr: Expression,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::NotEq => 3,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 6,
        }
    }
}

/// A binary operation.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOperation {
    pub lhs: Expression,
    pub op: BinaryOp,
    pub rhs: Expression,
}

/// A `for` expression producing a tuple or (when `key_expr` is set) an object.
#[derive(Debug, Clone, PartialEq)]
pub struct ForExpr {
    pub key_var: Option<String>,
    pub value_var: String,
    pub collection: Expression,
    pub key_expr: Option<Expression>,
    pub value_expr: Expression,
    pub grouping: bool,
    pub condition: Option<Expression>,
}

/// An HCL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Null,
    Bool(bool),
    Number(Number),
    Template(Template),
    Heredoc(Box<Heredoc>),
    Tuple(Vec<TupleItem>),
    Object(Vec<ObjectItem>),
    Variable(String),
    Traversal(Traversal),
    FuncCall(FuncCall),
    Parenthesis(Box<Expression>),
    Conditional(Box<Conditional>),
    Unary(UnaryOp, Box<Expression>),
    Binary(Box<BinaryOperation>),
    For(Box<ForExpr>),
}

impl Expression {
    /// A literal string.
    pub fn string(value: impl Into<String>) -> Self {
        Expression::Template(Template::literal(value))
    }

    /// An integer literal.
    pub fn number(value: i64) -> Self {
        Expression::Number(Number::from(value))
    }

    /// A variable reference.
    pub fn variable(name: impl Into<String>) -> Self {
        Expression::Variable(name.into())
    }

    /// A reference built from dotted segments: `["aws_instance", "web", "id"]`.
    pub fn reference<S: AsRef<str>>(segments: &[S]) -> Self {
        let Some((root, rest)) = segments.split_first() else {
            return Expression::Null;
        };
        let root = Expression::variable(root.as_ref());
        if rest.is_empty() {
            return root;
        }
        Expression::Traversal(Traversal {
            expr: Box::new(root),
            operators: rest
                .iter()
                .map(|s| TraversalOperator::GetAttr(s.as_ref().to_string()))
                .collect(),
        })
    }

    /// An object constructor from identifier keys.
    pub fn object<K: Into<String>>(items: impl IntoIterator<Item = (K, Expression)>) -> Self {
        Expression::Object(
            items
                .into_iter()
                .map(|(k, v)| ObjectItem::named(k, v))
                .collect(),
        )
    }

    /// A tuple constructor.
    pub fn tuple(items: impl IntoIterator<Item = Expression>) -> Self {
        Expression::Tuple(items.into_iter().map(TupleItem::from).collect())
    }

    /// A function call.
    pub fn call(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::FuncCall(FuncCall {
            name: name.into(),
            args,
            expand_final: false,
        })
    }

    /// The literal string value, if this is a plain string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expression::Template(t) => t.as_literal(),
            _ => None,
        }
    }

    /// The boolean value, if this is a boolean literal.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Expression::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The number, if this is a number literal.
    pub fn as_number(&self) -> Option<&Number> {
        match self {
            Expression::Number(n) => Some(n),
            _ => None,
        }
    }

    /// Object items, if this is an object constructor.
    pub fn as_object(&self) -> Option<&[ObjectItem]> {
        match self {
            Expression::Object(items) => Some(items),
            _ => None,
        }
    }

    /// Whether the expression is a literal with no references.
    pub fn is_literal(&self) -> bool {
        match self {
            Expression::Null | Expression::Bool(_) | Expression::Number(_) => true,
            Expression::Template(t) => t.as_literal().is_some(),
            Expression::Unary(UnaryOp::Neg, inner) => inner.as_number().is_some(),
            _ => false,
        }
    }

    /// Dotted segments of a static reference.
    ///
    /// `cloudflare_list.main.id` and `cloudflare_list["main"].id` both yield
    /// `["cloudflare_list", "main", "id"]`. Returns `None` for anything that is
    /// not a variable followed by attribute or literal-string index steps.
    pub fn as_reference_path(&self) -> Option<Vec<String>> {
        match self {
            Expression::Variable(name) => Some(vec![name.clone()]),
            Expression::Traversal(traversal) => {
                let Expression::Variable(root) = traversal.expr.as_ref() else {
                    return None;
                };
                let mut path = vec![root.clone()];
                for op in &traversal.operators {
                    match op {
                        TraversalOperator::GetAttr(name) => path.push(name.clone()),
                        TraversalOperator::Index(index) => path.push(index.as_str()?.to_string()),
                        _ => return None,
                    }
                }
                Some(path)
            }
            _ => None,
        }
    }
}

impl From<&str> for Expression {
    fn from(value: &str) -> Self {
        Expression::string(value)
    }
}

impl From<bool> for Expression {
    fn from(value: bool) -> Self {
        Expression::Bool(value)
    }
}

impl From<i64> for Expression {
    fn from(value: i64) -> Self {
        Expression::number(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_attribute_places_before_blocks() {
        let mut body = Body::new();
        body.set_attribute("a", Expression::number(1));
        body.push_block(Block::new("nested"));
        body.set_attribute("b", Expression::number(2));

        let keys: Vec<_> = body
            .structures
            .iter()
            .map(|s| match s {
                Structure::Attribute(a) => a.key.clone(),
                Structure::Block(b) => b.ident.clone(),
            })
            .collect();
        assert_eq!(keys, vec!["a", "b", "nested"]);
    }

    #[test]
    fn test_set_attribute_replaces_in_place() {
        let mut body = Body::new();
        body.set_attribute("a", Expression::number(1));
        body.set_attribute("b", Expression::number(2));
        body.set_attribute("a", Expression::number(3));

        assert_eq!(body.structures.len(), 2);
        assert_eq!(body.get("a"), Some(&Expression::number(3)));
    }

    #[test]
    fn test_remove_blocks() {
        let mut body = Body::new();
        body.push_block(Block::new("item"));
        body.set_attribute("a", Expression::number(1));
        body.push_block(Block::new("other"));
        body.push_block(Block::new("item"));

        let removed = body.remove_blocks("item");
        assert_eq!(removed.len(), 2);
        assert_eq!(body.structures.len(), 2);
    }

    #[test]
    fn test_reference_path() {
        let expr = Expression::reference(&["cloudflare_list", "main", "id"]);
        assert_eq!(
            expr.as_reference_path(),
            Some(vec![
                "cloudflare_list".to_string(),
                "main".to_string(),
                "id".to_string()
            ])
        );

        let indexed = Expression::Traversal(Traversal {
            expr: Box::new(Expression::variable("cloudflare_list")),
            operators: vec![TraversalOperator::Index(Expression::string("main"))],
        });
        assert_eq!(
            indexed.as_reference_path(),
            Some(vec!["cloudflare_list".to_string(), "main".to_string()])
        );

        let numeric = Expression::Traversal(Traversal {
            expr: Box::new(Expression::variable("list")),
            operators: vec![TraversalOperator::Index(Expression::number(0))],
        });
        assert_eq!(numeric.as_reference_path(), None);
    }

    #[test]
    fn test_resource_labels() {
        let block = Block::resource("cloudflare_record", "www");
        assert_eq!(block.resource_type(), Some("cloudflare_record"));
        assert_eq!(block.resource_name(), Some("www"));
        assert_eq!(Block::new("moved").resource_type(), None);
    }
}
