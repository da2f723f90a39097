//! Recursive descent parser for HCL bodies and expressions.

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{scan_braces, tokenize, SpannedToken, Token};
use crate::span::Span;

/// Parser for HCL source text.
///
/// Newlines are significant in bodies (they terminate attributes) and
/// insignificant inside brackets, braces and parentheses. `nesting` tracks
/// how deep inside such delimiters the cursor is.
///
/// Comments before a tuple element or object item become that element's
/// decor. Comments anywhere else inside an expression are collected in
/// `stray_comments` and moved in front of the enclosing attribute.
pub struct Parser<'source> {
    source: &'source str,
    tokens: Vec<SpannedToken>,
    pos: usize,
    nesting: usize,
    end: usize,
    stray_comments: Vec<String>,
}

impl<'source> Parser<'source> {
    /// Create a parser for the whole source.
    pub fn new(source: &'source str) -> Result<Self, ParseError> {
        Self::for_range(source, 0, source.len())
    }

    /// Create a parser for a byte range of the source.
    ///
    /// Token spans stay absolute so diagnostics point into the full text.
    fn for_range(source: &'source str, start: usize, end: usize) -> Result<Self, ParseError> {
        let text = source.get(start..end).ok_or_else(|| {
            ParseError::new("invalid source range", Span::new(start, end))
        })?;
        let tokens = tokenize(text)
            .map_err(|mut e| {
                e.span = e.span.offset(start);
                e
            })?
            .into_iter()
            .map(|t| SpannedToken {
                token: t.token,
                span: t.span.offset(start),
            })
            .collect();

        Ok(Self {
            source,
            tokens,
            pos: 0,
            nesting: 0,
            end,
            stray_comments: Vec::new(),
        })
    }

    /// Parse a complete file body.
    pub fn parse_file(&mut self) -> Result<Body, ParseError> {
        self.parse_body(false)
    }

    /// Parse a standalone expression, requiring all input to be consumed.
    pub fn parse_standalone_expression(&mut self) -> Result<Expression, ParseError> {
        self.nesting = 1;
        let expr = self.parse_expression()?;
        if let Some(tok) = self.peek() {
            return Err(ParseError::new(
                format!("unexpected {} after expression", tok.token.describe()),
                tok.span,
            ));
        }
        Ok(expr)
    }

    // ---- token cursor ------------------------------------------------------

    fn skip_trivia_if_nested(&mut self) {
        if self.nesting == 0 {
            return;
        }
        while let Some(tok) = self.tokens.get(self.pos) {
            match &tok.token {
                Token::Newline => {}
                Token::LineComment(text) | Token::BlockComment(text) => {
                    self.stray_comments.push(text.clone());
                }
                _ => break,
            }
            self.pos += 1;
        }
    }

    /// Consume newlines and comments in front of a collection element.
    fn element_decor(&mut self) -> Decor {
        let mut decor = Decor::default();
        let mut newlines = 0usize;
        while let Some(tok) = self.tokens.get(self.pos) {
            match &tok.token {
                Token::Newline => newlines += 1,
                Token::LineComment(text) | Token::BlockComment(text) => {
                    if decor.leading_comments.is_empty() {
                        decor.blank_line_before = newlines >= 2;
                    }
                    decor.leading_comments.push(text.clone());
                    newlines = 0;
                }
                _ => break,
            }
            self.pos += 1;
        }
        if decor.leading_comments.is_empty() {
            decor.blank_line_before = newlines >= 2;
        }
        decor
    }

    /// A comment directly after an element, on the same line.
    fn same_line_comment(&mut self) -> Option<String> {
        match self.tokens.get(self.pos).map(|t| &t.token) {
            Some(Token::LineComment(text)) | Some(Token::BlockComment(text)) => {
                let text = text.clone();
                self.pos += 1;
                Some(text)
            }
            _ => None,
        }
    }

    /// The `n`th significant token from the cursor.
    fn significant(&self, n: usize) -> Option<&SpannedToken> {
        let nested = self.nesting > 0;
        self.tokens
            .get(self.pos..)?
            .iter()
            .filter(|t| !(nested && t.token.is_trivia()))
            .nth(n)
    }

    fn peek(&self) -> Option<&SpannedToken> {
        self.significant(0)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.significant(0).map(|t| &t.token)
    }

    fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.significant(n).map(|t| &t.token)
    }

    /// Consume the current significant token.
    fn bump(&mut self) {
        self.skip_trivia_if_nested();
        self.pos += 1;
    }

    fn peek_raw(&self) -> Option<&SpannedToken> {
        self.tokens.get(self.pos)
    }

    fn next_token(&mut self) -> Result<SpannedToken, ParseError> {
        self.skip_trivia_if_nested();
        match self.tokens.get(self.pos) {
            Some(tok) => {
                self.pos += 1;
                Ok(tok.clone())
            }
            None => Err(self.eof_error("unexpected end of input")),
        }
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek_token() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_token(&mut self, expected: Token) -> Result<Span, ParseError> {
        let tok = self.next_token()?;
        if std::mem::discriminant(&tok.token) == std::mem::discriminant(&expected) {
            Ok(tok.span)
        } else {
            Err(ParseError::new(
                format!(
                    "expected {}, found {}",
                    expected.describe(),
                    tok.token.describe()
                ),
                tok.span,
            ))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<Span, ParseError> {
        let tok = self.next_token()?;
        match &tok.token {
            Token::Ident(name) if name == keyword => Ok(tok.span),
            other => Err(ParseError::new(
                format!("expected `{}`, found {}", keyword, other.describe()),
                tok.span,
            )),
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Span), ParseError> {
        let tok = self.next_token()?;
        match tok.token {
            Token::Ident(name) => Ok((name, tok.span)),
            other => Err(ParseError::new(
                format!("expected identifier, found {}", other.describe()),
                tok.span,
            )),
        }
    }

    fn eof_error(&self, message: &str) -> ParseError {
        ParseError::new(message, Span::new(self.end, self.end))
    }

    // ---- bodies ------------------------------------------------------------

    fn parse_body(&mut self, in_block: bool) -> Result<Body, ParseError> {
        let mut body = Body::default();
        let mut pending_comments: Vec<String> = Vec::new();
        let mut pending_blank = false;
        let mut newlines = 0usize;

        loop {
            let Some(tok) = self.peek_raw() else {
                if in_block {
                    return Err(self
                        .eof_error("unexpected end of input, expected '}'")
                        .with_hint("every block body must be closed with '}'"));
                }
                break;
            };

            match &tok.token {
                Token::Newline => {
                    newlines += 1;
                    self.pos += 1;
                }
                Token::LineComment(text) | Token::BlockComment(text) => {
                    if pending_comments.is_empty() {
                        pending_blank = newlines >= 2;
                    }
                    pending_comments.push(text.clone());
                    newlines = 0;
                    self.pos += 1;
                }
                Token::RBrace if in_block => break,
                Token::Ident(_) => {
                    let blank = if pending_comments.is_empty() {
                        newlines >= 2
                    } else {
                        pending_blank
                    };
                    let mut structure = self.parse_structure()?;
                    let trailing = self.parse_trailing_comment();
                    self.expect_item_end(in_block)?;

                    pending_comments.append(&mut self.stray_comments);
                    let decor = structure.decor_mut();
                    decor.leading_comments = std::mem::take(&mut pending_comments);
                    decor.trailing_comment = trailing;
                    decor.blank_line_before = blank && !body.structures.is_empty();
                    body.structures.push(structure);

                    newlines = 0;
                    pending_blank = false;
                }
                other => {
                    return Err(ParseError::new(
                        format!("expected attribute or block, found {}", other.describe()),
                        tok.span,
                    ));
                }
            }
        }

        body.trailing_comments = pending_comments;
        Ok(body)
    }

    fn parse_trailing_comment(&mut self) -> Option<String> {
        match self.peek_raw().map(|t| &t.token) {
            Some(Token::LineComment(text)) | Some(Token::BlockComment(text)) => {
                let text = text.clone();
                self.pos += 1;
                Some(text)
            }
            _ => None,
        }
    }

    fn expect_item_end(&self, in_block: bool) -> Result<(), ParseError> {
        match self.peek_raw() {
            None | Some(SpannedToken { token: Token::Newline, .. }) => Ok(()),
            Some(SpannedToken { token: Token::RBrace, .. }) if in_block => Ok(()),
            Some(tok) => Err(ParseError::new(
                format!("expected newline, found {}", tok.token.describe()),
                tok.span,
            )
            .with_hint("each attribute and block must end with a newline")),
        }
    }

    fn parse_structure(&mut self) -> Result<Structure, ParseError> {
        let (ident, start) = self.expect_ident()?;

        if matches!(self.peek_raw().map(|t| &t.token), Some(Token::Equals)) {
            self.pos += 1;
            let value = self.parse_expression()?;
            let end = self.prev_span_end(start);
            return Ok(Structure::Attribute(Attribute {
                key: ident,
                value,
                decor: Decor::default(),
                span: Span::new(start.start, end),
            }));
        }

        let mut labels = Vec::new();
        loop {
            let Some(tok) = self.peek_raw().cloned() else {
                return Err(self.eof_error("unexpected end of input, expected '{'"));
            };
            match tok.token {
                Token::Quoted(raw) => {
                    self.pos += 1;
                    let template = self.parse_template(&raw, tok.span.start + 1, true)?;
                    let label = template.as_literal().map(str::to_string).ok_or_else(|| {
                        ParseError::new("block labels cannot contain interpolations", tok.span)
                    })?;
                    labels.push(BlockLabel::String(label));
                }
                Token::Ident(name) => {
                    self.pos += 1;
                    labels.push(BlockLabel::Identifier(name));
                }
                Token::LBrace => break,
                other => {
                    return Err(ParseError::new(
                        format!("expected block label or '{{', found {}", other.describe()),
                        tok.span,
                    )
                    .with_hint(format!("`{}` needs either `= value` or a body", ident)));
                }
            }
        }

        self.expect_token(Token::LBrace)?;
        let body = self.parse_body(true)?;
        let end = self.expect_token(Token::RBrace)?;

        Ok(Structure::Block(Block {
            ident,
            labels,
            body,
            decor: Decor::default(),
            span: start.merge(end),
        }))
    }

    fn prev_span_end(&self, fallback: Span) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.span.end)
            .unwrap_or(fallback.end)
    }

    // ---- expressions -------------------------------------------------------

    /// Parse an expression, including conditionals.
    pub fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        let condition = self.parse_binary(0)?;

        if self.eat(&Token::Question) {
            let true_expr = self.parse_expression()?;
            self.expect_token(Token::Colon)?;
            let false_expr = self.parse_expression()?;
            return Ok(Expression::Conditional(Box::new(Conditional {
                condition,
                true_expr,
                false_expr,
            })));
        }

        Ok(condition)
    }

    fn peek_binary_op(&mut self) -> Option<BinaryOp> {
        let op = match self.peek_token()? {
            Token::Or => BinaryOp::Or,
            Token::And => BinaryOp::And,
            Token::EqEq => BinaryOp::Eq,
            Token::NotEq => BinaryOp::NotEq,
            Token::Lt => BinaryOp::Lt,
            Token::Le => BinaryOp::Le,
            Token::Gt => BinaryOp::Gt,
            Token::Ge => BinaryOp::Ge,
            Token::Plus => BinaryOp::Add,
            Token::Minus => BinaryOp::Sub,
            Token::Star => BinaryOp::Mul,
            Token::Slash => BinaryOp::Div,
            Token::Percent => BinaryOp::Mod,
            _ => return None,
        };
        Some(op)
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expression, ParseError> {
        let mut lhs = self.parse_unary()?;

        while let Some(op) = self.peek_binary_op() {
            if op.precedence() <= min_precedence {
                break;
            }
            self.bump();
            let rhs = self.parse_binary(op.precedence())?;
            lhs = Expression::Binary(Box::new(BinaryOperation { lhs, op, rhs }));
        }

        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        let op = match self.peek_token() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Bang) => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        self.bump();
        let operand = self.parse_unary()?;
        Ok(Expression::Unary(op, Box::new(operand)))
    }

    fn parse_postfix(&mut self) -> Result<Expression, ParseError> {
        let primary = self.parse_primary()?;
        let mut operators = Vec::new();

        loop {
            match self.peek_token() {
                Some(Token::Dot) => {
                    self.bump();
                    let tok = self.next_token()?;
                    match tok.token {
                        Token::Ident(name) => operators.push(TraversalOperator::GetAttr(name)),
                        Token::Star => operators.push(TraversalOperator::AttrSplat),
                        Token::Number(text) => {
                            // `a.0.1` lexes the trailing indices as one number
                            for part in text.split('.') {
                                let index = part.parse::<u64>().map_err(|_| {
                                    ParseError::new("invalid legacy index", tok.span)
                                })?;
                                operators.push(TraversalOperator::LegacyIndex(index));
                            }
                        }
                        other => {
                            return Err(ParseError::new(
                                format!("expected attribute name, found {}", other.describe()),
                                tok.span,
                            ));
                        }
                    }
                }
                Some(Token::LBracket) => {
                    self.bump();
                    self.nesting += 1;
                    if matches!(self.peek_token(), Some(Token::Star))
                        && matches!(self.peek_nth(1), Some(Token::RBracket))
                    {
                        self.bump();
                        self.expect_token(Token::RBracket)?;
                        operators.push(TraversalOperator::FullSplat);
                    } else {
                        let index = self.parse_expression()?;
                        self.expect_token(Token::RBracket)?;
                        operators.push(TraversalOperator::Index(index));
                    }
                    self.nesting -= 1;
                }
                _ => break,
            }
        }

        if operators.is_empty() {
            Ok(primary)
        } else {
            Ok(Expression::Traversal(Traversal {
                expr: Box::new(primary),
                operators,
            }))
        }
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        let tok = self.next_token()?;

        match tok.token {
            Token::Number(text) => Ok(Expression::Number(Number::from_source(text))),
            Token::Quoted(raw) => {
                let template = self.parse_template(&raw, tok.span.start + 1, true)?;
                Ok(Expression::Template(template))
            }
            Token::Heredoc(heredoc) => {
                let content_start = self.source[tok.span.start..]
                    .find('\n')
                    .map(|i| tok.span.start + i + 1)
                    .unwrap_or(tok.span.end);
                let template = self.parse_template(&heredoc.content, content_start, false)?;
                Ok(Expression::Heredoc(Box::new(Heredoc {
                    delimiter: heredoc.delimiter,
                    strip_indent: heredoc.strip_indent,
                    template,
                    closing_indent: heredoc.closing_indent,
                })))
            }
            Token::Ident(name) if name == "true" => Ok(Expression::Bool(true)),
            Token::Ident(name) if name == "false" => Ok(Expression::Bool(false)),
            Token::Ident(name) if name == "null" => Ok(Expression::Null),
            Token::Ident(name) => {
                if matches!(self.peek_raw().map(|t| &t.token), Some(Token::LParen)) {
                    self.parse_function_call(name)
                } else {
                    Ok(Expression::Variable(name))
                }
            }
            Token::LBracket => {
                self.nesting += 1;
                let expr = if self.at_for_keyword() {
                    self.parse_for(false)?
                } else {
                    self.parse_tuple()?
                };
                self.nesting -= 1;
                Ok(expr)
            }
            Token::LBrace => {
                self.nesting += 1;
                let expr = if self.at_for_keyword() {
                    self.parse_for(true)?
                } else {
                    self.parse_object()?
                };
                self.nesting -= 1;
                Ok(expr)
            }
            Token::LParen => {
                self.nesting += 1;
                let inner = self.parse_expression()?;
                self.expect_token(Token::RParen)?;
                self.nesting -= 1;
                Ok(Expression::Parenthesis(Box::new(inner)))
            }
            other => Err(ParseError::new(
                format!("expected expression, found {}", other.describe()),
                tok.span,
            )),
        }
    }

    fn at_for_keyword(&self) -> bool {
        matches!(self.peek_token(), Some(Token::Ident(kw)) if kw == "for")
            && matches!(self.peek_nth(1), Some(Token::Ident(_)))
    }

    fn parse_function_call(&mut self, name: String) -> Result<Expression, ParseError> {
        self.expect_token(Token::LParen)?;
        self.nesting += 1;

        let mut args = Vec::new();
        let mut expand_final = false;
        while !self.eat(&Token::RParen) {
            args.push(self.parse_expression()?);
            if self.eat(&Token::Ellipsis) {
                expand_final = true;
                self.expect_token(Token::RParen)?;
                break;
            }
            if !self.eat(&Token::Comma) {
                self.expect_token(Token::RParen)?;
                break;
            }
        }

        self.nesting -= 1;
        Ok(Expression::FuncCall(FuncCall {
            name,
            args,
            expand_final,
        }))
    }

    fn parse_tuple(&mut self) -> Result<Expression, ParseError> {
        let mut items: Vec<TupleItem> = Vec::new();
        loop {
            let mut decor = self.element_decor();
            if self.eat(&Token::RBracket) {
                self.stray_comments.append(&mut decor.leading_comments);
                break;
            }
            decor.blank_line_before &= !items.is_empty();

            let value = self.parse_expression()?;
            let comma = self.eat(&Token::Comma);
            decor.trailing_comment = self.same_line_comment();
            items.push(TupleItem { value, decor });

            if !comma {
                let mut rest = self.element_decor();
                self.stray_comments.append(&mut rest.leading_comments);
                self.expect_token(Token::RBracket)?;
                break;
            }
        }
        Ok(Expression::Tuple(items))
    }

    fn parse_object(&mut self) -> Result<Expression, ParseError> {
        let mut items: Vec<ObjectItem> = Vec::new();
        loop {
            let mut decor = self.element_decor();
            if self.eat(&Token::RBrace) {
                self.stray_comments.append(&mut decor.leading_comments);
                break;
            }
            decor.blank_line_before &= !items.is_empty();

            let key = match (self.peek_token(), self.peek_nth(1)) {
                (Some(Token::Ident(_)), Some(Token::Equals | Token::Colon)) => {
                    let (name, _) = self.expect_ident()?;
                    ObjectKey::Identifier(name)
                }
                _ => ObjectKey::Expression(self.parse_expression()?),
            };

            let tok = self.next_token()?;
            if !matches!(tok.token, Token::Equals | Token::Colon) {
                return Err(ParseError::new(
                    format!("expected '=' or ':', found {}", tok.token.describe()),
                    tok.span,
                ));
            }

            let value = self.parse_expression()?;
            self.eat(&Token::Comma);
            decor.trailing_comment = self.same_line_comment();
            items.push(ObjectItem { key, value, decor });
        }
        Ok(Expression::Object(items))
    }

    fn parse_for(&mut self, object: bool) -> Result<Expression, ParseError> {
        self.expect_keyword("for")?;
        let (first, _) = self.expect_ident()?;
        let (key_var, value_var) = if self.eat(&Token::Comma) {
            let (second, _) = self.expect_ident()?;
            (Some(first), second)
        } else {
            (None, first)
        };
        self.expect_keyword("in")?;
        let collection = self.parse_expression()?;
        self.expect_token(Token::Colon)?;

        let (key_expr, value_expr) = if object {
            let key = self.parse_expression()?;
            self.expect_token(Token::FatArrow)?;
            (Some(key), self.parse_expression()?)
        } else {
            (None, self.parse_expression()?)
        };
        let grouping = object && self.eat(&Token::Ellipsis);

        let condition = if matches!(self.peek_token(), Some(Token::Ident(kw)) if kw == "if") {
            self.bump();
            Some(self.parse_expression()?)
        } else {
            None
        };

        self.expect_token(if object { Token::RBrace } else { Token::RBracket })?;

        Ok(Expression::For(Box::new(ForExpr {
            key_var,
            value_var,
            collection,
            key_expr,
            value_expr,
            grouping,
            condition,
        })))
    }

    // ---- templates ---------------------------------------------------------

    /// Split raw template text into literal, interpolation and directive parts.
    ///
    /// `offset` is the absolute position of `raw` in the source. Escape
    /// sequences are decoded for quoted templates only.
    fn parse_template(
        &self,
        raw: &str,
        offset: usize,
        decode_escapes: bool,
    ) -> Result<Template, ParseError> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let bytes = raw.as_bytes();
        let mut i = 0;

        while i < raw.len() {
            let rest = &raw[i..];

            if rest.starts_with("$${") || rest.starts_with("%%{") {
                literal.push_str(&rest[1..3]);
                i += 3;
                continue;
            }

            if rest.starts_with("${") || rest.starts_with("%{") {
                let close = scan_braces(&rest[2..]).ok_or_else(|| {
                    ParseError::new("unterminated template sequence", Span::new(offset + i, offset + raw.len()))
                })?;
                let inner_start = i + 2;
                let inner_end = inner_start + close;

                if !literal.is_empty() {
                    parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
                }

                if bytes[i] == b'%' {
                    let directive = self.parse_directive(raw, i, inner_end, offset)?;
                    parts.push(TemplatePart::Directive(directive));
                } else {
                    let inner = &raw[inner_start..inner_end];
                    let strip_left = inner.starts_with('~');
                    let strip_right = inner.len() > usize::from(strip_left) && inner.ends_with('~');
                    let expr_start = offset + inner_start + usize::from(strip_left);
                    let expr_end = offset + inner_end - usize::from(strip_right);

                    let mut sub = Parser::for_range(self.source, expr_start, expr_end)?;
                    let expr = sub.parse_standalone_expression()?;
                    parts.push(TemplatePart::Interpolation(Interpolation {
                        expr,
                        strip_left,
                        strip_right,
                    }));
                }

                i = inner_end + 1;
                continue;
            }

            if decode_escapes && bytes[i] == b'\\' {
                let (decoded, consumed) = decode_escape(&raw[i..]).ok_or_else(|| {
                    ParseError::new("invalid escape sequence", Span::new(offset + i, offset + i + 2))
                        .with_hint("valid escapes are \\n \\r \\t \\\" \\\\ \\uNNNN and \\UNNNNNNNN")
                })?;
                literal.push(decoded);
                i += consumed;
                continue;
            }

            let Some(ch) = rest.chars().next() else {
                break;
            };
            literal.push(ch);
            i += ch.len_utf8();
        }

        if !literal.is_empty() {
            parts.push(TemplatePart::Literal(literal));
        }

        Ok(Template { parts })
    }
}

impl<'source> Parser<'source> {
    /// Parse the `%{ ... }` directive spanning `raw[start..=end]`.
    ///
    /// The expression after `if`, or after `in` in a `for`, is parsed so
    /// that reference rewriting reaches it. Other directives stay verbatim.
    fn parse_directive(
        &self,
        raw: &str,
        start: usize,
        end: usize,
        offset: usize,
    ) -> Result<Directive, ParseError> {
        let verbatim = || -> Result<Directive, ParseError> { Ok(Directive::verbatim(&raw[start..=end])) };

        let mut body_start = start + 2;
        let mut body_end = end;
        if raw[body_start..body_end].starts_with('~') {
            body_start += 1;
        }
        if raw[body_start..body_end].ends_with('~') {
            body_end -= 1;
        }
        let body = &raw[body_start..body_end];
        let keyword_at = body_start + (body.len() - body.trim_start().len());
        let words = &raw[keyword_at..body_end];

        let after_keyword = |keyword: &str| {
            words
                .strip_prefix(keyword)
                .filter(|rest| rest.starts_with(char::is_whitespace))
                .is_some()
        };
        let expr_from = if after_keyword("if") {
            keyword_at + 2
        } else if after_keyword("for") {
            match find_in_keyword(words) {
                Some(at) => keyword_at + at + 2,
                None => return verbatim(),
            }
        } else {
            return verbatim();
        };

        let expr_text = &raw[expr_from..body_end];
        let expr_start = expr_from + (expr_text.len() - expr_text.trim_start().len());
        let expr_end = expr_from + expr_text.trim_end().len();
        if expr_start >= expr_end {
            return verbatim();
        }

        let mut sub = Parser::for_range(self.source, offset + expr_start, offset + expr_end)?;
        let expr = sub.parse_standalone_expression()?;
        Ok(Directive {
            head: raw[start..expr_start].to_string(),
            expr: Some(expr),
            tail: raw[expr_end..=end].to_string(),
        })
    }
}

/// Byte index of a standalone `in` keyword.
fn find_in_keyword(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    (1..bytes.len().saturating_sub(2)).find(|&i| {
        &bytes[i..i + 2] == b"in"
            && bytes[i - 1].is_ascii_whitespace()
            && bytes[i + 2].is_ascii_whitespace()
    })
}

/// Decode one escape sequence at the start of `text`, returning the character
/// and the number of bytes consumed.
fn decode_escape(text: &str) -> Option<(char, usize)> {
    let mut chars = text.chars();
    chars.next()?;
    let decoded = match chars.next()? {
        'n' => ('\n', 2),
        'r' => ('\r', 2),
        't' => ('\t', 2),
        '"' => ('"', 2),
        '\\' => ('\\', 2),
        'u' => (decode_hex(text.get(2..6)?)?, 6),
        'U' => (decode_hex(text.get(2..10)?)?, 10),
        _ => return None,
    };
    Some(decoded)
}

fn decode_hex(digits: &str) -> Option<char> {
    u32::from_str_radix(digits, 16).ok().and_then(char::from_u32)
}
