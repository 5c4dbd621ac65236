pub use anyhow::Result;

use ariadne::{Cache, Config, Label, Report, ReportKind, Source};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::ops::{Add, Range};

use crate::ast::types::{Monoid, Ty};

#[derive(Clone, PartialEq, Eq, Copy, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub kind: Kind,
    pub span: Option<Span>,

    /// Secondary position, for errors relating two sites (e.g. the two sides
    /// of a failed unification).
    pub span2: Option<Span>,

    pub help: Option<String>,
}

/// The wire-stable error kinds. [Kind::as_ref] yields the stable name.
#[derive(Debug, Clone, strum::AsRefStr)]
pub enum Kind {
    IncompatibleTypes {
        left: Ty,
        right: Ty,
    },
    UnexpectedType {
        found: Ty,
        expected: String,
        who: Option<String>,
    },
    IncompatibleMonoids {
        monoid: Monoid,
        source: Ty,
    },
    PatternMismatch {
        pattern: String,
        ty: Ty,
    },
    MultipleDecl {
        name: String,
    },
    UnknownDecl {
        name: String,
    },
    AmbiguousIdn {
        name: String,
    },
    UnknownPartition,
    UnknownStar,
    IllegalStar,
    InvalidRegexSyntax {
        detail: String,
    },
    InvalidDateTimeFormatSyntax {
        detail: String,
    },
    InternalError {
        message: String,
    },
}

/// Location within the source file.
/// Tuples contain:
/// - line number (0-based),
/// - column number within that line (0-based),
#[derive(Debug, Clone, Serialize)]
pub struct SourceLocation {
    pub start: (usize, usize),

    pub end: (usize, usize),
}

impl Error {
    pub fn new(kind: Kind) -> Self {
        Error {
            kind,
            span: None,
            span2: None,
            help: None,
        }
    }

    pub fn internal<S: ToString>(message: S) -> Self {
        Error::new(Kind::InternalError {
            message: message.to_string(),
        })
    }

    pub fn with_help<S: Into<String>>(mut self, help: S) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_span(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }

    pub fn with_span2(mut self, span: Option<Span>) -> Self {
        self.span2 = span;
        self
    }
}

impl Kind {
    fn message(&self) -> String {
        match self {
            Kind::IncompatibleTypes { left, right } => {
                format!("incompatible types `{left}` and `{right}`")
            }
            Kind::UnexpectedType {
                found,
                expected,
                who,
            } => {
                let who = who.clone().map(|w| format!("{w} ")).unwrap_or_default();
                format!("{who}expected {expected}, but found `{found}`")
            }
            Kind::IncompatibleMonoids { monoid, source } => {
                format!("cannot aggregate `{source}` with monoid `{monoid}`")
            }
            Kind::PatternMismatch { pattern, ty } => {
                format!("pattern `{pattern}` does not match type `{ty}`")
            }
            Kind::MultipleDecl { name } => format!("`{name}` is declared more than once"),
            Kind::UnknownDecl { name } => format!("unknown identifier `{name}`"),
            Kind::AmbiguousIdn { name } => format!("`{name}` is ambiguous"),
            Kind::UnknownPartition => "`partition` is not defined here".to_string(),
            Kind::UnknownStar => "`*` is not defined here".to_string(),
            Kind::IllegalStar => {
                "`*` cannot be combined with other projections without a group by".to_string()
            }
            Kind::InvalidRegexSyntax { detail } => format!("invalid regular expression: {detail}"),
            Kind::InvalidDateTimeFormatSyntax { detail } => {
                format!("invalid datetime format: {detail}")
            }
            Kind::InternalError { message } => format!("internal compiler error: {message}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorMessage {
    /// Stable name of the error kind.
    pub kind: String,
    /// Plain text of the error
    pub reason: String,
    /// A list of suggestions of how to fix the error
    pub hint: Option<String>,
    /// Character offset of error origin within a source file
    pub span: Option<Span>,
    /// Secondary character offset, when the error relates two sites
    pub span2: Option<Span>,

    /// Annotated code, containing cause and hints.
    pub display: Option<String>,
    /// Line and column number of error origin within a source file
    pub location: Option<SourceLocation>,
}

impl From<Error> for ErrorMessage {
    fn from(e: Error) -> Self {
        ErrorMessage {
            kind: e.kind.as_ref().to_string(),
            reason: e.kind.message(),
            hint: e.help,
            span: e.span,
            span2: e.span2,
            display: None,
            location: None,
        }
    }
}

impl Display for ErrorMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // https://github.com/zesterer/ariadne/issues/52
        if let Some(display) = &self.display {
            let message_without_trailing_spaces = display
                .split('\n')
                .map(str::trim)
                .collect::<Vec<_>>()
                .join("\n");
            f.write_str(&message_without_trailing_spaces)?;
        } else {
            f.write_str(&self.reason)?;
        }
        Ok(())
    }
}

// Needed for anyhow
impl StdError for Error {}

// Needed for StdError
impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind.message())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorMessages {
    pub inner: Vec<ErrorMessage>,
}

impl From<Error> for ErrorMessages {
    fn from(e: Error) -> Self {
        ErrorMessages {
            inner: vec![e.into()],
        }
    }
}

impl Display for ErrorMessages {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for e in &self.inner {
            Display::fmt(&e, f)?;
            f.write_str("\n")?;
        }
        Ok(())
    }
}

/// Converts an internal [anyhow::Error] into user-facing messages.
///
/// Structured errors pass through; anything else surfaces as an internal
/// compiler error, because user errors must have been reported by the
/// semantic analyzer already.
pub fn downcast(error: anyhow::Error) -> ErrorMessages {
    let error = match error.downcast::<ErrorMessages>() {
        Ok(messages) => return messages,
        Err(error) => error,
    };

    let error = match error.downcast::<Error>() {
        Ok(error) => return error.into(),
        Err(error) => error,
    };

    Error::internal(format!("{error:#}")).into()
}

impl StdError for ErrorMessages {}

impl ErrorMessages {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap()
    }

    /// Computes message locations and builds the pretty displays.
    pub fn composed(mut self, source_id: &str, source: &str, color: bool) -> Self {
        for e in &mut self.inner {
            let source = Source::from(source);
            let cache = (source_id, source);

            e.location = e.compose_location(&cache.1);
            e.display = e.compose_display(source_id, cache, color);
        }
        self
    }
}

impl ErrorMessage {
    fn compose_display<'a, C>(&self, source_id: &'a str, cache: C, color: bool) -> Option<String>
    where
        C: Cache<&'a str>,
    {
        let config = Config::default().with_color(color);

        let span = Range::from(self.span?);

        let mut report = Report::build(ReportKind::Error, source_id, span.start)
            .with_config(config)
            .with_message("")
            .with_label(Label::new((source_id, span)).with_message(&self.reason));

        if let Some(span2) = self.span2 {
            report.add_label(Label::new((source_id, Range::from(span2))));
        }

        if let Some(hint) = &self.hint {
            report.set_help(hint);
        }

        let mut out = Vec::new();
        report.finish().write(cache, &mut out).ok()?;
        String::from_utf8(out).ok()
    }

    fn compose_location(&self, source: &Source) -> Option<SourceLocation> {
        let span = self.span?;

        let start = source.get_offset_line(span.start)?;
        let end = source.get_offset_line(span.end)?;
        Some(SourceLocation {
            start: (start.1, start.2),
            end: (end.1, end.2),
        })
    }
}

pub trait WithErrorInfo {
    fn with_help<S: Into<String>>(self, help: S) -> Self;

    fn with_span(self, span: Option<Span>) -> Self;
}

impl<T> WithErrorInfo for Result<T, Error> {
    fn with_help<S: Into<String>>(self, help: S) -> Self {
        self.map_err(|e| e.with_help(help))
    }

    fn with_span(self, span: Option<Span>) -> Self {
        self.map_err(|e| e.with_span(span))
    }
}

impl From<Span> for Range<usize> {
    fn from(a: Span) -> Self {
        a.start..a.end
    }
}

impl Add<Span> for Span {
    type Output = Span;

    fn add(self, rhs: Span) -> Span {
        Span {
            start: self.start.min(rhs.start),
            end: self.end.max(rhs.end),
        }
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "span-chars-{}-{}", self.start, self.end)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::types::TyKind;

    #[test]
    fn stable_kind_names() {
        let e = Error::new(Kind::UnknownDecl {
            name: "t".to_string(),
        });
        let msg = ErrorMessage::from(e);
        assert_eq!(msg.kind, "UnknownDecl");
        assert_eq!(msg.reason, "unknown identifier `t`");
    }

    #[test]
    fn incompatible_monoids_message() {
        let e = Error::new(Kind::IncompatibleMonoids {
            monoid: Monoid::List,
            source: Ty::collection(Monoid::Set, Ty::new(TyKind::Int)),
        });
        assert_eq!(
            e.to_string(),
            "cannot aggregate `set(int)` with monoid `list`"
        );
    }
}
