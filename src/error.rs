//! Error types for lexing and parsing templates

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Parse error at {span:?}: {message}")]
    Syntax {
        span: Span,
        message: String,
        expected: Vec<String>,
    },
}

impl ParseError {
    /// Create a syntax error with no expectation list
    pub fn syntax(span: Span, message: impl Into<String>) -> Self {
        ParseError::Syntax {
            span,
            message: message.into(),
            expected: Vec::new(),
        }
    }

    /// Byte range the error points at
    pub fn span(&self) -> &Span {
        match self {
            ParseError::Syntax { span, .. } => span,
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str, filename: &str) -> String {
        let mut buf = Vec::new();
        match self {
            ParseError::Syntax {
                span,
                message,
                expected,
            } => {
                let expected_str = if expected.is_empty() {
                    String::new()
                } else {
                    format!("\nExpected: {}", expected.join(", "))
                };

                let written = Report::build(ReportKind::Error, filename, span.start)
                    .with_message(message)
                    .with_label(
                        Label::new((filename, span.clone()))
                            .with_message(format!("{}{}", message, expected_str))
                            .with_color(Color::Red),
                    )
                    .finish()
                    .write((filename, Source::from(source)), &mut buf);
                if written.is_err() {
                    return self.to_string();
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl<'a> From<chumsky::error::Rich<'a, crate::parser::lexer::Token>> for ParseError {
    fn from(err: chumsky::error::Rich<'a, crate::parser::lexer::Token>) -> Self {
        use chumsky::error::RichReason;

        let message = match err.reason() {
            RichReason::ExpectedFound { found, .. } => match found {
                Some(tok) => format!("Unexpected {}", describe(tok)),
                None => "Unexpected end of template".to_string(),
            },
            RichReason::Custom(msg) => msg.to_string(),
        };

        let expected: Vec<String> = err
            .expected()
            .filter_map(|e| match e {
                chumsky::error::RichPattern::Token(tok) => Some(describe(tok)),
                chumsky::error::RichPattern::Label(label) => Some(label.to_string()),
                chumsky::error::RichPattern::EndOfInput => Some("end of template".to_string()),
                chumsky::error::RichPattern::Identifier(s) => Some(format!("identifier '{}'", s)),
                chumsky::error::RichPattern::Any => Some("any token".to_string()),
                chumsky::error::RichPattern::SomethingElse => None,
            })
            .collect();

        ParseError::Syntax {
            span: err.span().into_range(),
            message,
            expected,
        }
    }
}

/// Format a token for human-readable error messages
fn describe(tok: &crate::parser::lexer::Token) -> String {
    tok.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_includes_filename_and_message() {
        let err = ParseError::syntax(3..7, "Unexpected name 'oops'");
        let rendered = err.format("{% oops %}", "page.html");
        assert!(rendered.contains("page.html"));
        assert!(rendered.contains("Unexpected name 'oops'"));
    }

    #[test]
    fn test_display_shows_span() {
        let err = ParseError::syntax(1..2, "boom");
        assert_eq!(err.to_string(), "Parse error at 1..2: boom");
    }
}
