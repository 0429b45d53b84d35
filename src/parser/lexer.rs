//! Lexer for template source using logos
//!
//! Template source interleaves raw text with `<% ... %>` tags, so lexing
//! happens in two layers: a scanner that splits text chunks from tag
//! bodies and a logos lexer for the expression language inside tags.
//! All spans are byte ranges into the original input.

use logos::Logos;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// Token stream consumed by the parser
///
/// `Text`, `ExprOpen`, `StmtOpen` and `TagClose` are produced by the tag
/// scanner; everything else comes from the expression lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Raw text between tags
    Text(String),
    /// `<%=`
    ExprOpen,
    /// `<%`
    StmtOpen,
    /// `%>`
    TagClose,

    // Keywords
    If,
    Else,
    For,
    In,
    Let,
    True,
    False,
    Nil,

    // Operators (longer patterns first)
    EqEq,
    NotEq,
    LessEq,
    GreaterEq,
    AndAnd,
    OrOr,
    Less,
    Greater,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Equals,
    DotDot,
    Dot,

    // Delimiters
    ParenOpen,
    ParenClose,
    BracketOpen,
    BracketClose,
    BraceOpen,
    BraceClose,
    Comma,

    // Literals
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
}

/// Expression-language tokens, valid only inside a tag body
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
enum ExprToken {
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("let")]
    Let,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("nil")]
    Nil,

    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LessEq,
    #[token(">=")]
    GreaterEq,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
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
    #[token("!")]
    Bang,
    #[token("=")]
    Equals,
    #[token("..")]
    DotDot,
    #[token(".")]
    Dot,

    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token("[")]
    BracketOpen,
    #[token("]")]
    BracketClose,
    #[token("{")]
    BraceOpen,
    #[token("}")]
    BraceClose,
    #[token(",")]
    Comma,

    // Identifiers must come after keywords
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        unescape(&s[1..s.len()-1])
    })]
    Str(String),

    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),
}

fn map_token(tok: ExprToken) -> Token {
    match tok {
        ExprToken::If => Token::If,
        ExprToken::Else => Token::Else,
        ExprToken::For => Token::For,
        ExprToken::In => Token::In,
        ExprToken::Let => Token::Let,
        ExprToken::True => Token::True,
        ExprToken::False => Token::False,
        ExprToken::Nil => Token::Nil,
        ExprToken::EqEq => Token::EqEq,
        ExprToken::NotEq => Token::NotEq,
        ExprToken::LessEq => Token::LessEq,
        ExprToken::GreaterEq => Token::GreaterEq,
        ExprToken::AndAnd => Token::AndAnd,
        ExprToken::OrOr => Token::OrOr,
        ExprToken::Less => Token::Less,
        ExprToken::Greater => Token::Greater,
        ExprToken::Plus => Token::Plus,
        ExprToken::Minus => Token::Minus,
        ExprToken::Star => Token::Star,
        ExprToken::Slash => Token::Slash,
        ExprToken::Percent => Token::Percent,
        ExprToken::Bang => Token::Bang,
        ExprToken::Equals => Token::Equals,
        ExprToken::DotDot => Token::DotDot,
        ExprToken::Dot => Token::Dot,
        ExprToken::ParenOpen => Token::ParenOpen,
        ExprToken::ParenClose => Token::ParenClose,
        ExprToken::BracketOpen => Token::BracketOpen,
        ExprToken::BracketClose => Token::BracketClose,
        ExprToken::BraceOpen => Token::BraceOpen,
        ExprToken::BraceClose => Token::BraceClose,
        ExprToken::Comma => Token::Comma,
        ExprToken::Ident(s) => Token::Ident(s),
        ExprToken::Str(s) => Token::Str(s),
        ExprToken::Float(f) => Token::Float(f),
        ExprToken::Int(i) => Token::Int(i),
    }
}

/// Process escape sequences in a string literal body
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Lexer failure with source location
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

enum TagKind {
    Output,
    Statement,
    Comment,
}

/// Lex template source into tokens with spans
///
/// Text outside tags becomes `Token::Text`; `<%# ... %>` comment tags
/// are dropped entirely.
pub fn lex(input: &str) -> Result<Vec<(Token, Span)>, LexError> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < input.len() {
        let rest = &input[pos..];
        let Some(offset) = rest.find("<%") else {
            tokens.push((Token::Text(rest.to_string()), pos..input.len()));
            break;
        };
        if offset > 0 {
            tokens.push((Token::Text(rest[..offset].to_string()), pos..pos + offset));
        }

        let tag_start = pos + offset;
        let (kind, body_start) = match input.as_bytes().get(tag_start + 2) {
            Some(b'=') => (TagKind::Output, tag_start + 3),
            Some(b'#') => (TagKind::Comment, tag_start + 3),
            _ => (TagKind::Statement, tag_start + 2),
        };

        let Some(body_end) = find_tag_close(input, body_start) else {
            return Err(LexError {
                span: tag_start..input.len(),
                message: "unclosed tag: expected '%>'".to_string(),
            });
        };

        match kind {
            TagKind::Comment => {}
            TagKind::Output => {
                tokens.push((Token::ExprOpen, tag_start..body_start));
                lex_body(input, body_start, body_end, &mut tokens)?;
                tokens.push((Token::TagClose, body_end..body_end + 2));
            }
            TagKind::Statement => {
                tokens.push((Token::StmtOpen, tag_start..body_start));
                lex_body(input, body_start, body_end, &mut tokens)?;
                tokens.push((Token::TagClose, body_end..body_end + 2));
            }
        }

        pos = body_end + 2;
    }

    Ok(tokens)
}

/// Find the `%>` that closes the tag body starting at `from`, skipping
/// over double-quoted string literals (with `\"` escapes) so a `%>`
/// inside a string does not end the tag.
fn find_tag_close(input: &str, from: usize) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if bytes.get(i + 1) == Some(&b'>') => return Some(i),
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    // An escape consumes the following byte too
                    i += if bytes[i] == b'\\' { 2 } else { 1 };
                }
                // An unterminated string runs to end of input and the
                // tag reports as unclosed
                i += 1;
            }
            _ => i += 1,
        }
    }
    None
}

/// Run the expression lexer over one tag body, offsetting spans into the
/// original input.
fn lex_body(
    input: &str,
    start: usize,
    end: usize,
    tokens: &mut Vec<(Token, Span)>,
) -> Result<(), LexError> {
    for (tok, span) in ExprToken::lexer(&input[start..end]).spanned() {
        let span = start + span.start..start + span.end;
        match tok {
            Ok(t) => tokens.push((map_token(t), span)),
            Err(()) => {
                return Err(LexError {
                    span,
                    message: "unrecognized character in tag".to_string(),
                })
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        lex(input).expect("should lex").into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(
            tokens("hello world"),
            vec![Token::Text("hello world".to_string())]
        );
    }

    #[test]
    fn test_output_tag() {
        assert_eq!(
            tokens("<%= 1 + 1 %>"),
            vec![
                Token::ExprOpen,
                Token::Int(1),
                Token::Plus,
                Token::Int(1),
                Token::TagClose,
            ]
        );
    }

    #[test]
    fn test_statement_tag() {
        assert_eq!(
            tokens(r#"<% let name = "bob" %>"#),
            vec![
                Token::StmtOpen,
                Token::Let,
                Token::Ident("name".to_string()),
                Token::Equals,
                Token::Str("bob".to_string()),
                Token::TagClose,
            ]
        );
    }

    #[test]
    fn test_comment_tag_dropped() {
        assert_eq!(
            tokens("a<%# ignored %>b"),
            vec![
                Token::Text("a".to_string()),
                Token::Text("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_text_around_tags() {
        assert_eq!(
            tokens("Hello <%= name %>!"),
            vec![
                Token::Text("Hello ".to_string()),
                Token::ExprOpen,
                Token::Ident("name".to_string()),
                Token::TagClose,
                Token::Text("!".to_string()),
            ]
        );
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            tokens("<% if else for in let true false nil %>"),
            vec![
                Token::StmtOpen,
                Token::If,
                Token::Else,
                Token::For,
                Token::In,
                Token::Let,
                Token::True,
                Token::False,
                Token::Nil,
                Token::TagClose,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tokens("<% == != <= >= && || < > %>"),
            vec![
                Token::StmtOpen,
                Token::EqEq,
                Token::NotEq,
                Token::LessEq,
                Token::GreaterEq,
                Token::AndAnd,
                Token::OrOr,
                Token::Less,
                Token::Greater,
                Token::TagClose,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("<%= 42 3.14 %>"),
            vec![
                Token::ExprOpen,
                Token::Int(42),
                Token::Float(3.14),
                Token::TagClose,
            ]
        );
    }

    #[test]
    fn test_range_all_ints() {
        // `1..5` must lex as int, range operator, int - not a float
        assert_eq!(
            tokens("<% 1..5 %>"),
            vec![
                Token::StmtOpen,
                Token::Int(1),
                Token::DotDot,
                Token::Int(5),
                Token::TagClose,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            tokens(r#"<%= "a\"b\n" %>"#),
            vec![
                Token::ExprOpen,
                Token::Str("a\"b\n".to_string()),
                Token::TagClose,
            ]
        );
    }

    #[test]
    fn test_block_statement_spanning_tags() {
        assert_eq!(
            tokens("<% if x { %>yes<% } %>"),
            vec![
                Token::StmtOpen,
                Token::If,
                Token::Ident("x".to_string()),
                Token::BraceOpen,
                Token::TagClose,
                Token::Text("yes".to_string()),
                Token::StmtOpen,
                Token::BraceClose,
                Token::TagClose,
            ]
        );
    }

    #[test]
    fn test_tag_close_inside_string_literal() {
        assert_eq!(
            tokens(r#"<%= "a%>b" %>"#),
            vec![
                Token::ExprOpen,
                Token::Str("a%>b".to_string()),
                Token::TagClose,
            ]
        );
    }

    #[test]
    fn test_tag_close_after_escaped_quote() {
        assert_eq!(
            tokens(r#"<%= "\"%>" %>"#),
            vec![
                Token::ExprOpen,
                Token::Str("\"%>".to_string()),
                Token::TagClose,
            ]
        );
    }

    #[test]
    fn test_unterminated_string_reports_unclosed_tag() {
        let err = lex(r#"<%= "oops %>"#).expect_err("should fail");
        assert!(err.message.contains("unclosed tag"));
    }

    #[test]
    fn test_unclosed_tag() {
        let err = lex("text <%= name").expect_err("should fail");
        assert_eq!(err.span, 5..13);
        assert!(err.message.contains("unclosed tag"));
    }

    #[test]
    fn test_unrecognized_character() {
        let err = lex("<%= @ %>").expect_err("should fail");
        assert!(err.message.contains("unrecognized character"));
    }

    #[test]
    fn test_spans_are_absolute() {
        let toks = lex("ab<%= cd %>").expect("should lex");
        let (tok, span) = &toks[1];
        assert_eq!(*tok, Token::ExprOpen);
        assert_eq!(*span, 2..5);
        let (tok, span) = &toks[2];
        assert_eq!(*tok, Token::Ident("cd".to_string()));
        assert_eq!(*span, 6..8);
    }
}
