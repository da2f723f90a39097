//! HCL front end for tfmigrate
//!
//! This crate parses Terraform configuration files into an editable syntax
//! tree and writes them back in canonical form. Comments, blank lines between
//! items and the source text of numbers are kept, so a file whose tree is not
//! touched comes back formatting-equivalent to the input.
//!
//! # Usage
//!
//! ```rust
//! use tfmigrate_hcl::{format_body, parse_body, Expression};
//!
//! let mut body = parse_body("resource \"cloudflare_record\" \"www\" {\n  value = \"1.2.3.4\"\n}\n").unwrap();
//! let block = body.blocks_mut().next().unwrap();
//! let value = block.body.remove_attribute("value").unwrap();
//! block.body.set_attribute("content", value.value);
//!
//! assert_eq!(
//!     format_body(&body),
//!     "resource \"cloudflare_record\" \"www\" {\n  content = \"1.2.3.4\"\n}\n"
//! );
//! ```

pub mod ast;
pub mod error;
pub mod format;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod visit;

// Re-export main types
pub use ast::{
    Attribute, BinaryOp, BinaryOperation, Block, BlockLabel, Body, Conditional, Decor,
    Directive, Expression, ForExpr, FuncCall, Heredoc, Interpolation, Number, ObjectItem, ObjectKey,
    Structure, Template, TemplatePart, Traversal, TraversalOperator, TupleItem, UnaryOp,
};
pub use error::ParseError;
pub use format::{format_block, format_body, format_expression, quote};
pub use span::Span;
pub use visit::{collect_body_references, collect_references, rename_reference, rename_reference_in_body};

/// Parse a configuration file into a body.
pub fn parse_body(source: &str) -> Result<Body, ParseError> {
    parser::Parser::new(source)?.parse_file()
}

/// Parse a standalone expression.
///
/// # Example
///
/// ```rust
/// use tfmigrate_hcl::parse_expression;
///
/// let expr = parse_expression("cloudflare_list.main.id").unwrap();
/// assert_eq!(expr.as_reference_path().unwrap().join("."), "cloudflare_list.main.id");
/// ```
pub fn parse_expression(source: &str) -> Result<Expression, ParseError> {
    parser::Parser::new(source)?.parse_standalone_expression()
}
