//! Lexer for HCL using logos.
//!
//! Quoted strings and heredocs are lexed as raw template text; the parser
//! splits them into literal and interpolation parts afterwards.

use crate::error::ParseError;
use crate::span::Span;
use logos::Logos;

/// Raw heredoc payload produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct HeredocToken {
    /// Closing marker, e.g. `EOT`.
    pub delimiter: String,
    /// Whether the heredoc used the indented `<<-` form.
    pub strip_indent: bool,
    /// Raw content between the opening line and the closing marker.
    pub content: String,
    /// Whitespace preceding the closing marker.
    pub closing_indent: String,
}

/// Token types for HCL.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+")]
pub enum Token {
    #[token("\n")]
    Newline,

    #[regex(r"#[^\n]*", |lex| lex.slice().trim_end().to_string())]
    #[regex(r"//[^\n]*", |lex| lex.slice().trim_end().to_string())]
    LineComment(String),

    #[token("/*", lex_block_comment)]
    BlockComment(String),

    // Identifiers (keywords such as `true`, `for` and `in` are contextual)
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_-]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Numbers keep their source text so formatting round-trips exactly
    #[regex(r"[0-9]+", |lex| lex.slice().to_string())]
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().to_string())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().to_string())]
    Number(String),

    // Quoted template, raw content without the surrounding quotes
    #[token("\"", lex_quoted)]
    Quoted(String),

    #[regex(r"<<-?[A-Za-z_][A-Za-z0-9_-]*\r?\n", lex_heredoc)]
    Heredoc(HeredocToken),

    // Punctuation
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("...")]
    Ellipsis,
    #[token("=")]
    Equals,
    #[token("=>")]
    FatArrow,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,

    // Operators
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("&&")]
    And,
    #[token("||")]
    Or,
    #[token("!")]
    Bang,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
}

impl Token {
    /// Human readable description used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Token::Newline => "newline".to_string(),
            Token::LineComment(_) | Token::BlockComment(_) => "comment".to_string(),
            Token::Ident(name) => format!("identifier `{}`", name),
            Token::Number(n) => format!("number `{}`", n),
            Token::Quoted(_) => "string".to_string(),
            Token::Heredoc(_) => "heredoc".to_string(),
            Token::LBrace => "'{'".to_string(),
            Token::RBrace => "'}'".to_string(),
            Token::LBracket => "'['".to_string(),
            Token::RBracket => "']'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::Ellipsis => "'...'".to_string(),
            Token::Equals => "'='".to_string(),
            Token::FatArrow => "'=>'".to_string(),
            Token::Question => "'?'".to_string(),
            Token::Colon => "':'".to_string(),
            Token::EqEq => "'=='".to_string(),
            Token::NotEq => "'!='".to_string(),
            Token::Le => "'<='".to_string(),
            Token::Ge => "'>='".to_string(),
            Token::Lt => "'<'".to_string(),
            Token::Gt => "'>'".to_string(),
            Token::And => "'&&'".to_string(),
            Token::Or => "'||'".to_string(),
            Token::Bang => "'!'".to_string(),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Percent => "'%'".to_string(),
        }
    }

    /// Whether the token is a newline or a comment.
    pub fn is_trivia(&self) -> bool {
        matches!(
            self,
            Token::Newline | Token::LineComment(_) | Token::BlockComment(_)
        )
    }
}

fn lex_block_comment(lex: &mut logos::Lexer<Token>) -> Option<String> {
    let end = lex.remainder().find("*/")?;
    lex.bump(end + 2);
    Some(lex.slice().to_string())
}

fn lex_quoted(lex: &mut logos::Lexer<Token>) -> Option<String> {
    let rest = lex.remainder();
    let end = scan_quoted(rest)?;
    let content = rest[..end].to_string();
    lex.bump(end + 1);
    Some(content)
}

/// Find the closing quote of a quoted template.
///
/// `text` starts right after the opening quote. Returns the byte index of the
/// closing quote, skipping over escapes and nested `${ ... }` sequences (which
/// may themselves contain quoted strings).
pub(crate) fn scan_quoted(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            b'\n' => return None,
            b'$' | b'%' if bytes.get(i + 1) == Some(&bytes[i]) && bytes.get(i + 2) == Some(&b'{') => {
                i += 3;
            }
            b'$' | b'%' if bytes.get(i + 1) == Some(&b'{') => {
                let close = scan_braces(&text[i + 2..])?;
                i += 2 + close + 1;
            }
            _ => i += 1,
        }
    }

    None
}

/// Find the `}` closing an already opened brace.
///
/// `text` starts right after the opening brace. Nested braces and quoted
/// strings are skipped.
pub(crate) fn scan_braces(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 1usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            b'"' => {
                let close = scan_quoted(&text[i + 1..])?;
                i += close + 1;
            }
            _ => {}
        }
        i += 1;
    }

    None
}

fn lex_heredoc(lex: &mut logos::Lexer<Token>) -> Option<HeredocToken> {
    let opener = lex.slice().trim_end();
    let strip_indent = opener.starts_with("<<-");
    let delimiter = opener.trim_start_matches("<<-").trim_start_matches("<<").to_string();

    let rest = lex.remainder();
    let mut consumed = 0usize;

    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed == delimiter {
            let content = rest[..consumed].to_string();
            let closing_indent: String = line
                .chars()
                .take_while(|c| *c == ' ' || *c == '\t')
                .collect();
            // Leave the newline after the closing marker for the body parser.
            let marker_len = line.trim_end_matches(['\n', '\r']).len();
            lex.bump(consumed + marker_len);
            return Some(HeredocToken {
                delimiter,
                strip_indent,
                content,
                closing_indent,
            });
        }
        consumed += line.len();
    }

    None
}

/// A token with its span in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Tokenize a source string into a vector of spanned tokens.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, ParseError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let span: Span = lexer.span().into();
        match result {
            Ok(token) => tokens.push(SpannedToken { token, span }),
            Err(()) => return Err(invalid_token(source, span)),
        }
    }

    Ok(tokens)
}

fn invalid_token(source: &str, span: Span) -> ParseError {
    let slice = source.get(span.start..span.end).unwrap_or("");
    if slice.starts_with('"') {
        ParseError::new("unterminated string literal", span)
            .with_hint("quoted strings must close on the same line")
    } else if slice.starts_with("/*") {
        ParseError::new("unterminated block comment", span)
            .with_hint("block comments must be closed with `*/`")
    } else if slice.starts_with("<<") {
        ParseError::new("unterminated heredoc", span)
            .with_hint("the closing marker must appear alone on its own line")
    } else {
        ParseError::new(format!("unexpected character `{}`", slice), span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_attribute_tokens() {
        let tokens = kinds("name = \"web\"\n");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("name".to_string()),
                Token::Equals,
                Token::Quoted("web".to_string()),
                Token::Newline,
            ]
        );
    }

    #[test]
    fn test_identifiers_allow_dashes() {
        let tokens = kinds("my-name_1");
        assert_eq!(tokens, vec![Token::Ident("my-name_1".to_string())]);
    }

    #[test]
    fn test_numbers() {
        let tokens = kinds("1 2.5 3e10");
        assert_eq!(
            tokens,
            vec![
                Token::Number("1".to_string()),
                Token::Number("2.5".to_string()),
                Token::Number("3e10".to_string()),
            ]
        );
    }

    #[test]
    fn test_quoted_with_nested_interpolation() {
        let tokens = kinds(r#""a-${lookup(m, "k")}-b""#);
        assert_eq!(
            tokens,
            vec![Token::Quoted(r#"a-${lookup(m, "k")}-b"#.to_string())]
        );
    }

    #[test]
    fn test_quoted_escaped_quote() {
        let tokens = kinds(r#""say \"hi\"""#);
        assert_eq!(tokens, vec![Token::Quoted(r#"say \"hi\""#.to_string())]);
    }

    #[test]
    fn test_comments() {
        let tokens = kinds("# one\n// two\n/* three */");
        assert_eq!(
            tokens,
            vec![
                Token::LineComment("# one".to_string()),
                Token::Newline,
                Token::LineComment("// two".to_string()),
                Token::Newline,
                Token::BlockComment("/* three */".to_string()),
            ]
        );
    }

    #[test]
    fn test_block_comment_spans_lines() {
        let tokens = kinds("/* a * b\n   c */ x /**/");
        assert_eq!(
            tokens,
            vec![
                Token::BlockComment("/* a * b\n   c */".to_string()),
                Token::Ident("x".to_string()),
                Token::BlockComment("/**/".to_string()),
            ]
        );
    }

    #[test]
    fn test_unterminated_block_comment() {
        let err = tokenize("a = 1 /* open").unwrap_err();
        assert!(err.message.contains("unterminated block comment"));
    }

    #[test]
    fn test_heredoc() {
        let tokens = kinds("x = <<EOT\nhello\n  world\nEOT\n");
        assert_eq!(tokens[2], Token::Heredoc(HeredocToken {
            delimiter: "EOT".to_string(),
            strip_indent: false,
            content: "hello\n  world\n".to_string(),
            closing_indent: String::new(),
        }));
        assert_eq!(tokens[3], Token::Newline);
    }

    #[test]
    fn test_operators() {
        let tokens = kinds("a == b && c != d || e <= f => ...");
        assert!(tokens.contains(&Token::EqEq));
        assert!(tokens.contains(&Token::And));
        assert!(tokens.contains(&Token::NotEq));
        assert!(tokens.contains(&Token::Or));
        assert!(tokens.contains(&Token::Le));
        assert!(tokens.contains(&Token::FatArrow));
        assert!(tokens.contains(&Token::Ellipsis));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("name = \"oops\n").unwrap_err();
        assert!(err.message.contains("unterminated string"));
    }

    #[test]
    fn test_spans() {
        let tokens = tokenize("ab = 1").unwrap();
        assert_eq!(tokens[0].span, Span::new(0, 2));
        assert_eq!(tokens[2].span, Span::new(5, 6));
    }
}
