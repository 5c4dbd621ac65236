//! Syntax validation of regex, datetime and interval literals.

use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::calculus::Literal;
use crate::error::Kind;

/// ISO-8601 durations, e.g. `P1Y2M`, `PT30S`, `P1DT12H`.
static INTERVAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^P(\d+Y)?(\d+M)?(\d+W)?(\d+D)?(T(\d+H)?(\d+M)?(\d+(\.\d+)?S)?)?$").unwrap()
});

/// Checks the syntax of a literal. `None` means the literal is well-formed.
pub fn validate(literal: &Literal) -> Option<Kind> {
    match literal {
        Literal::Regex(pattern) => match Regex::new(pattern) {
            Ok(_) => None,
            Err(err) => Some(Kind::InvalidRegexSyntax {
                detail: err.to_string(),
            }),
        },
        Literal::DateTime(value) => match DateTime::parse_from_rfc3339(value) {
            Ok(_) => None,
            Err(err) => Some(Kind::InvalidDateTimeFormatSyntax {
                detail: format!("`{value}` is not RFC 3339: {err}"),
            }),
        },
        Literal::Interval(value) => {
            if value == "P" || !INTERVAL.is_match(value) {
                Some(Kind::InvalidDateTimeFormatSyntax {
                    detail: format!("`{value}` is not an ISO 8601 duration"),
                })
            } else {
                None
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn regex_literals() {
        assert!(validate(&Literal::Regex("a+b*".to_string())).is_none());
        assert!(matches!(
            validate(&Literal::Regex("(unclosed".to_string())),
            Some(Kind::InvalidRegexSyntax { .. })
        ));
    }

    #[test]
    fn datetime_literals() {
        assert!(validate(&Literal::DateTime("2024-03-01T12:00:00Z".to_string())).is_none());
        assert!(matches!(
            validate(&Literal::DateTime("yesterday".to_string())),
            Some(Kind::InvalidDateTimeFormatSyntax { .. })
        ));
    }

    #[test]
    fn interval_literals() {
        assert!(validate(&Literal::Interval("P1Y2M".to_string())).is_none());
        assert!(validate(&Literal::Interval("PT30S".to_string())).is_none());
        assert!(matches!(
            validate(&Literal::Interval("P".to_string())),
            Some(Kind::InvalidDateTimeFormatSyntax { .. })
        ));
    }
}
