//! Action-attribute parsing.
//!
//! Declarative triggers embed their target in an attribute value of the
//! form `...#(selector=<expr>)...`. This module extracts the structured
//! descriptor; what callers do with it (the form-expansion feature) lives
//! outside this system.

use thiserror::Error;

const MARKER: &str = "#(selector=";

/// Errors raised while parsing an action attribute.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionParseError {
    /// The `#(selector=` marker was absent.
    #[error("action value does not contain a '#(selector=' marker")]
    MissingMarker,

    /// The selector expression never closed its parenthesis.
    #[error("unterminated selector expression in action value")]
    Unterminated,

    /// The selector expression was empty.
    #[error("empty selector expression in action value")]
    EmptySelector,
}

/// The structured descriptor extracted from an action attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorRequest {
    /// The target selector expression.
    pub selector: String,
}

/// Extracts the selector descriptor from an action-attribute value.
///
/// Parentheses inside the expression (for example `:nth-child(2)`) are
/// balanced against the closing delimiter.
///
/// # Errors
///
/// Returns an [`ActionParseError`] when the marker is absent, the
/// expression is unterminated, or the expression is empty.
pub fn parse_selector_request(value: &str) -> Result<SelectorRequest, ActionParseError> {
    let start = value.find(MARKER).ok_or(ActionParseError::MissingMarker)?;
    let expr = &value[start + MARKER.len()..];
    let mut depth = 1usize;
    for (idx, ch) in expr.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    let selector = expr[..idx].trim();
                    if selector.is_empty() {
                        return Err(ActionParseError::EmptySelector);
                    }
                    return Ok(SelectorRequest {
                        selector: selector.to_string(),
                    });
                }
            }
            _ => {}
        }
    }
    Err(ActionParseError::Unterminated)
}
