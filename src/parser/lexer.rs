//! Lexer for Jinja-style templates using logos
//!
//! Template text and tag contents need different token sets, so scanning
//! alternates between two logos lexers: [`DataToken`] outside of tags and
//! [`TagToken`] between `{{ }}` / `{% %}` delimiters. Both are folded into the
//! single [`Token`] stream the grammar consumes.

use std::fmt;

use logos::Logos;

use crate::error::ParseError;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// Tokens of template data, outside of any tag
#[derive(Logos, Debug, Clone, PartialEq)]
enum DataToken {
    #[regex(r"([^{]|\{[^{%#])+")]
    Text,

    #[token("{")]
    LoneBrace,

    #[token("{{-")]
    #[token("{{")]
    VariableStart,

    #[token("{%-")]
    #[token("{%")]
    BlockStart,

    /// `{% raw %}`; everything up to `{% endraw %}` is template data
    #[regex(r"\{%-?[ \t\n\r]*raw[ \t\n\r]*-?%\}")]
    RawStart,

    #[regex(r"\{#([^#]|#[^}])*#\}", logos::skip)]
    Comment,
}

/// Tokens inside a `{{ ... }}` or `{% ... %}` tag
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
enum TagToken {
    #[token("-}}")]
    #[token("}}")]
    VariableEnd,
    #[token("-%}")]
    #[token("%}")]
    BlockEnd,

    // Statement keywords
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("endfor")]
    EndFor,
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("endif")]
    EndIf,
    #[token("set")]
    Set,
    #[token("endset")]
    EndSet,
    #[token("include")]
    Include,
    #[token("extends")]
    Extends,
    #[token("import")]
    Import,
    #[token("from")]
    From,
    #[token("as")]
    As,
    #[token("macro")]
    Macro,
    #[token("endmacro")]
    EndMacro,
    #[token("call")]
    Call,
    #[token("endcall")]
    EndCall,
    #[token("filter")]
    Filter,
    #[token("endfilter")]
    EndFilter,
    #[token("with")]
    With,
    #[token("without")]
    Without,
    #[token("endwith")]
    EndWith,
    #[token("block")]
    Block,
    #[token("endblock")]
    EndBlock,
    #[token("recursive")]
    Recursive,

    // Word operators
    #[token("not")]
    Not,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("is")]
    Is,

    // Delimiters
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("|")]
    Pipe,
    #[token("~")]
    Tilde,
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

    // Operators (longer patterns first)
    #[token("==")]
    Eq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=")]
    Assign,
    #[token("**")]
    Pow,
    #[token("*")]
    Star,
    #[token("//")]
    FloorDiv,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,

    // Literals - names must come after keywords
    #[regex(r"[_\p{XID_Start}]\p{XID_Continue}*", |lex| lex.slice().to_string(), priority = 1)]
    Name(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| unescape(lex.slice()))]
    Str(String),

    /// Digits only; converted to a number when folded into [`Token`]
    #[regex(r"[0-9][0-9_]*", |lex| lex.slice().replace('_', ""))]
    Integer(String),

    #[regex(
        r"[0-9][0-9_]*(\.[0-9][0-9_]*([eE][+-]?[0-9]+)?|[eE][+-]?[0-9]+)",
        |lex| lex.slice().replace('_', "").parse::<f64>().ok()
    )]
    Float(f64),
}

/// Token stream element consumed by the grammar
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Raw template text between tags
    Data(String),
    VariableStart,
    VariableEnd,
    BlockStart,
    BlockEnd,

    For,
    In,
    EndFor,
    If,
    Elif,
    Else,
    EndIf,
    Set,
    EndSet,
    Include,
    Extends,
    Import,
    From,
    As,
    Macro,
    EndMacro,
    Call,
    EndCall,
    Filter,
    EndFilter,
    With,
    Without,
    EndWith,
    Block,
    EndBlock,
    Recursive,

    Not,
    And,
    Or,
    Is,

    Dot,
    Comma,
    Colon,
    Pipe,
    Tilde,
    ParenOpen,
    ParenClose,
    BracketOpen,
    BracketClose,
    BraceOpen,
    BraceClose,

    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    Assign,
    Pow,
    Star,
    FloorDiv,
    Slash,
    Percent,
    Plus,
    Minus,

    Name(String),
    Str(String),
    Integer(i64),
    Float(f64),
}

impl Token {
    /// Source spelling of keyword tokens
    ///
    /// Keywords are still valid attribute names (`loop.block`, `user.filter`),
    /// so the grammar uses this to accept them after a dot.
    pub fn keyword(&self) -> Option<&'static str> {
        let kw = match self {
            Token::For => "for",
            Token::In => "in",
            Token::EndFor => "endfor",
            Token::If => "if",
            Token::Elif => "elif",
            Token::Else => "else",
            Token::EndIf => "endif",
            Token::Set => "set",
            Token::EndSet => "endset",
            Token::Include => "include",
            Token::Extends => "extends",
            Token::Import => "import",
            Token::From => "from",
            Token::As => "as",
            Token::Macro => "macro",
            Token::EndMacro => "endmacro",
            Token::Call => "call",
            Token::EndCall => "endcall",
            Token::Filter => "filter",
            Token::EndFilter => "endfilter",
            Token::With => "with",
            Token::Without => "without",
            Token::EndWith => "endwith",
            Token::Block => "block",
            Token::EndBlock => "endblock",
            Token::Recursive => "recursive",
            Token::Not => "not",
            Token::And => "and",
            Token::Or => "or",
            Token::Is => "is",
            _ => return None,
        };
        Some(kw)
    }
}

impl From<TagToken> for Token {
    fn from(tok: TagToken) -> Self {
        match tok {
            TagToken::VariableEnd => Token::VariableEnd,
            TagToken::BlockEnd => Token::BlockEnd,
            TagToken::For => Token::For,
            TagToken::In => Token::In,
            TagToken::EndFor => Token::EndFor,
            TagToken::If => Token::If,
            TagToken::Elif => Token::Elif,
            TagToken::Else => Token::Else,
            TagToken::EndIf => Token::EndIf,
            TagToken::Set => Token::Set,
            TagToken::EndSet => Token::EndSet,
            TagToken::Include => Token::Include,
            TagToken::Extends => Token::Extends,
            TagToken::Import => Token::Import,
            TagToken::From => Token::From,
            TagToken::As => Token::As,
            TagToken::Macro => Token::Macro,
            TagToken::EndMacro => Token::EndMacro,
            TagToken::Call => Token::Call,
            TagToken::EndCall => Token::EndCall,
            TagToken::Filter => Token::Filter,
            TagToken::EndFilter => Token::EndFilter,
            TagToken::With => Token::With,
            TagToken::Without => Token::Without,
            TagToken::EndWith => Token::EndWith,
            TagToken::Block => Token::Block,
            TagToken::EndBlock => Token::EndBlock,
            TagToken::Recursive => Token::Recursive,
            TagToken::Not => Token::Not,
            TagToken::And => Token::And,
            TagToken::Or => Token::Or,
            TagToken::Is => Token::Is,
            TagToken::Dot => Token::Dot,
            TagToken::Comma => Token::Comma,
            TagToken::Colon => Token::Colon,
            TagToken::Pipe => Token::Pipe,
            TagToken::Tilde => Token::Tilde,
            TagToken::ParenOpen => Token::ParenOpen,
            TagToken::ParenClose => Token::ParenClose,
            TagToken::BracketOpen => Token::BracketOpen,
            TagToken::BracketClose => Token::BracketClose,
            TagToken::BraceOpen => Token::BraceOpen,
            TagToken::BraceClose => Token::BraceClose,
            TagToken::Eq => Token::Eq,
            TagToken::Ne => Token::Ne,
            TagToken::Le => Token::Le,
            TagToken::Ge => Token::Ge,
            TagToken::Lt => Token::Lt,
            TagToken::Gt => Token::Gt,
            TagToken::Assign => Token::Assign,
            TagToken::Pow => Token::Pow,
            TagToken::Star => Token::Star,
            TagToken::FloorDiv => Token::FloorDiv,
            TagToken::Slash => Token::Slash,
            TagToken::Percent => Token::Percent,
            TagToken::Plus => Token::Plus,
            TagToken::Minus => Token::Minus,
            TagToken::Name(s) => Token::Name(s),
            TagToken::Str(s) => Token::Str(s),
            // Past i64 the value is kept approximately
            TagToken::Integer(digits) => match digits.parse::<i64>() {
                Ok(n) => Token::Integer(n),
                Err(_) => Token::Float(digits.parse().unwrap_or(f64::INFINITY)),
            },
            TagToken::Float(n) => Token::Float(n),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(kw) = self.keyword() {
            return write!(f, "keyword '{}'", kw);
        }
        match self {
            Token::Data(_) => write!(f, "template data"),
            Token::VariableStart => write!(f, "'{{{{'"),
            Token::VariableEnd => write!(f, "'}}}}'"),
            Token::BlockStart => write!(f, "'{{%'"),
            Token::BlockEnd => write!(f, "'%}}'"),
            Token::Name(s) => write!(f, "name '{}'", s),
            Token::Str(s) => write!(f, "string \"{}\"", s),
            Token::Integer(n) => write!(f, "integer {}", n),
            Token::Float(n) => write!(f, "float {}", n),
            Token::Dot => write!(f, "'.'"),
            Token::Comma => write!(f, "','"),
            Token::Colon => write!(f, "':'"),
            Token::Pipe => write!(f, "'|'"),
            Token::Tilde => write!(f, "'~'"),
            Token::ParenOpen => write!(f, "'('"),
            Token::ParenClose => write!(f, "')'"),
            Token::BracketOpen => write!(f, "'['"),
            Token::BracketClose => write!(f, "']'"),
            Token::BraceOpen => write!(f, "'{{'"),
            Token::BraceClose => write!(f, "'}}'"),
            Token::Eq => write!(f, "'=='"),
            Token::Ne => write!(f, "'!='"),
            Token::Le => write!(f, "'<='"),
            Token::Ge => write!(f, "'>='"),
            Token::Lt => write!(f, "'<'"),
            Token::Gt => write!(f, "'>'"),
            Token::Assign => write!(f, "'='"),
            Token::Pow => write!(f, "'**'"),
            Token::Star => write!(f, "'*'"),
            Token::FloorDiv => write!(f, "'//'"),
            Token::Slash => write!(f, "'/'"),
            Token::Percent => write!(f, "'%'"),
            Token::Plus => write!(f, "'+'"),
            Token::Minus => write!(f, "'-'"),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Strip quotes from a string literal and resolve backslash escapes
fn unescape(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Lex template source into tokens with spans
///
/// Fails on the first character that fits neither mode, or on a tag that is
/// still open at end of input.
pub fn lex(input: &str) -> Result<Vec<(Token, Span)>, ParseError> {
    let mut tokens = Vec::new();
    let mut data = DataToken::lexer(input);

    while let Some(tok) = data.next() {
        let span = data.span();
        match tok {
            Ok(DataToken::Text) | Ok(DataToken::LoneBrace) => {
                tokens.push((Token::Data(data.slice().to_string()), span));
            }
            Ok(DataToken::VariableStart) | Ok(DataToken::BlockStart) => {
                let (start, end) = if tok == Ok(DataToken::VariableStart) {
                    (Token::VariableStart, TagToken::VariableEnd)
                } else {
                    (Token::BlockStart, TagToken::BlockEnd)
                };
                tokens.push((start, span.clone()));
                let mut tag = data.morph::<TagToken>();
                lex_tag(&mut tag, end, span.start, &mut tokens)?;
                data = tag.morph();
            }
            Ok(DataToken::RawStart) => {
                let rest = data.remainder();
                let (body_len, end_len) = find_endraw(rest).ok_or_else(|| {
                    ParseError::syntax(
                        span.start..input.len(),
                        "unclosed raw block at end of template",
                    )
                })?;
                if body_len > 0 {
                    let body = span.end..span.end + body_len;
                    tokens.push((Token::Data(rest[..body_len].to_string()), body));
                }
                data.bump(body_len + end_len);
            }
            Ok(DataToken::Comment) => {}
            Err(()) => {
                return Err(ParseError::syntax(
                    span.clone(),
                    format!("unexpected character {:?}", &input[span]),
                ));
            }
        }
    }

    Ok(tokens)
}

/// Offset and length of the first `{% endraw %}` tag in `rest`
fn find_endraw(rest: &str) -> Option<(usize, usize)> {
    rest.match_indices("{%")
        .find_map(|(at, _)| endraw_len(&rest[at..]).map(|len| (at, len)))
}

fn endraw_len(tag: &str) -> Option<usize> {
    let inner = tag.strip_prefix("{%")?;
    let inner = inner.strip_prefix('-').unwrap_or(inner);
    let inner = inner.trim_start().strip_prefix("endraw")?.trim_start();
    let inner = inner.strip_prefix('-').unwrap_or(inner);
    let after = inner.strip_prefix("%}")?;
    Some(tag.len() - after.len())
}

/// Lex the inside of one tag, up to and including its closing delimiter
fn lex_tag(
    lexer: &mut logos::Lexer<'_, TagToken>,
    closer: TagToken,
    open_at: usize,
    tokens: &mut Vec<(Token, Span)>,
) -> Result<(), ParseError> {
    // Open `{` of dict literals; `}}` closes them before it closes the tag
    let mut depth = 0usize;

    while let Some(tok) = lexer.next() {
        let span = lexer.span();
        let tok = tok.map_err(|()| {
            ParseError::syntax(
                span.clone(),
                format!("unexpected character {:?} inside tag", lexer.slice()),
            )
        })?;

        match tok {
            TagToken::BraceOpen => depth += 1,
            TagToken::BraceClose => depth = depth.saturating_sub(1),
            TagToken::VariableEnd if depth > 0 => {
                let first = span.end - 2;
                if first > span.start {
                    tokens.push((Token::Minus, span.start..first));
                }
                tokens.push((Token::BraceClose, first..first + 1));
                depth -= 1;

                // `{{ {'a': 1}}}`: the second brace starts the closing `}}`
                if depth == 0
                    && closer == TagToken::VariableEnd
                    && lexer.remainder().starts_with('}')
                {
                    lexer.bump(1);
                    tokens.push((Token::VariableEnd, first + 1..span.end + 1));
                    return Ok(());
                }
                tokens.push((Token::BraceClose, first + 1..span.end));
                depth = depth.saturating_sub(1);
                continue;
            }
            _ => {}
        }

        if tok == closer {
            tokens.push((tok.into(), span));
            return Ok(());
        }
        if matches!(tok, TagToken::VariableEnd | TagToken::BlockEnd) {
            return Err(ParseError::syntax(
                span,
                format!("mismatched tag delimiter {:?}", lexer.slice()),
            ));
        }
        tokens.push((tok.into(), span));
    }

    Err(ParseError::syntax(
        open_at..lexer.source().len(),
        "unclosed tag at end of template",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        lex(input).expect("Should lex").into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(
            kinds("hello world\n"),
            vec![Token::Data("hello world\n".to_string())]
        );
    }

    #[test]
    fn test_variable_tag() {
        assert_eq!(
            kinds("Hi {{ user.name }}!"),
            vec![
                Token::Data("Hi ".to_string()),
                Token::VariableStart,
                Token::Name("user".to_string()),
                Token::Dot,
                Token::Name("name".to_string()),
                Token::VariableEnd,
                Token::Data("!".to_string()),
            ]
        );
    }

    #[test]
    fn test_block_keywords() {
        assert_eq!(
            kinds("{% for x in items %}{% endfor %}"),
            vec![
                Token::BlockStart,
                Token::For,
                Token::Name("x".to_string()),
                Token::In,
                Token::Name("items".to_string()),
                Token::BlockEnd,
                Token::BlockStart,
                Token::EndFor,
                Token::BlockEnd,
            ]
        );
    }

    #[test]
    fn test_whitespace_control_delimiters() {
        assert_eq!(
            kinds("{%- if a -%}{{- b -}}{% endif %}"),
            vec![
                Token::BlockStart,
                Token::If,
                Token::Name("a".to_string()),
                Token::BlockEnd,
                Token::VariableStart,
                Token::Name("b".to_string()),
                Token::VariableEnd,
                Token::BlockStart,
                Token::EndIf,
                Token::BlockEnd,
            ]
        );
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            kinds("a{# ignored {{ x }} #}b"),
            vec![Token::Data("a".to_string()), Token::Data("b".to_string())]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            kinds(r#"{{ 'one' "two" 3 4.5 }}"#),
            vec![
                Token::VariableStart,
                Token::Str("one".to_string()),
                Token::Str("two".to_string()),
                Token::Integer(3),
                Token::Float(4.5),
                Token::VariableEnd,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#"{{ "a\"b" }}"#),
            vec![
                Token::VariableStart,
                Token::Str("a\"b".to_string()),
                Token::VariableEnd,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("{{ a == b != c <= d // e ** f }}"),
            vec![
                Token::VariableStart,
                Token::Name("a".to_string()),
                Token::Eq,
                Token::Name("b".to_string()),
                Token::Ne,
                Token::Name("c".to_string()),
                Token::Le,
                Token::Name("d".to_string()),
                Token::FloorDiv,
                Token::Name("e".to_string()),
                Token::Pow,
                Token::Name("f".to_string()),
                Token::VariableEnd,
            ]
        );
    }

    #[test]
    fn test_nested_dict_braces_split() {
        let tokens = kinds("{% set x = {'a': {'b': 1}} %}");
        let closes = tokens.iter().filter(|t| **t == Token::BraceClose).count();
        assert_eq!(closes, 2);
        assert_eq!(tokens.last(), Some(&Token::BlockEnd));
        assert!(!tokens.contains(&Token::VariableEnd));
    }

    #[test]
    fn test_dict_closing_brace_before_tag_end() {
        let tokens = kinds("{{ {'a': 1}}}");
        assert_eq!(
            tokens,
            vec![
                Token::VariableStart,
                Token::BraceOpen,
                Token::Str("a".to_string()),
                Token::Colon,
                Token::Integer(1),
                Token::BraceClose,
                Token::VariableEnd,
            ]
        );

        let tokens = kinds("{{ {'a': {'b': 1}}}}");
        assert_eq!(tokens.iter().filter(|t| **t == Token::BraceClose).count(), 2);
        assert_eq!(tokens.last(), Some(&Token::VariableEnd));
    }

    #[test]
    fn test_raw_block_is_data() {
        assert_eq!(
            kinds("a{% raw %}{{ x }}{% if %}{%- endraw -%}b"),
            vec![
                Token::Data("a".to_string()),
                Token::Data("{{ x }}{% if %}".to_string()),
                Token::Data("b".to_string()),
            ]
        );
        assert_eq!(kinds("{%- raw -%}{% endraw %}"), vec![]);
    }

    #[test]
    fn test_unclosed_raw_block_is_error() {
        let err = lex("{% raw %}{{ x }}").unwrap_err();
        assert!(err.to_string().contains("unclosed raw block"));
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(
            kinds("{{ 1e3 2.5E-1 1_000 99999999999999999999 }}"),
            vec![
                Token::VariableStart,
                Token::Float(1000.0),
                Token::Float(0.25),
                Token::Integer(1000),
                Token::Float(1e20),
                Token::VariableEnd,
            ]
        );
    }

    #[test]
    fn test_unicode_names() {
        assert_eq!(
            kinds("ünïcödé {{ größe }}"),
            vec![
                Token::Data("ünïcödé ".to_string()),
                Token::VariableStart,
                Token::Name("größe".to_string()),
                Token::VariableEnd,
            ]
        );
    }

    #[test]
    fn test_lone_brace_is_data() {
        assert_eq!(
            kinds("a { b"),
            vec![Token::Data("a { b".to_string())]
        );
    }

    #[test]
    fn test_unclosed_tag_is_error() {
        let err = lex("{{ user").unwrap_err();
        assert!(err.to_string().contains("unclosed tag"));
    }

    #[test]
    fn test_mismatched_delimiter_is_error() {
        let err = lex("{{ user %}").unwrap_err();
        assert!(err.to_string().contains("mismatched"));
    }

    #[test]
    fn test_unknown_character_is_error() {
        assert!(lex("{{ a ? b }}").is_err());
    }

    #[test]
    fn test_spans_point_into_source() {
        let source = "ab{{ name }}";
        let tokens = lex(source).expect("Should lex");
        let (tok, span) = &tokens[2];
        assert_eq!(tok, &Token::Name("name".to_string()));
        assert_eq!(&source[span.clone()], "name");
    }
}
