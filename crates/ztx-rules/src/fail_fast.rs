//! Classification of remote errors that retrying cannot fix.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{error, warn};

use crate::error::ApiError;

/// Codes that end the apply immediately.
pub const FAIL_FAST_CODES: &[&str] = &[
    "INVALID_INPUT_ARGUMENT",
    "TRIAL_EXPIRED",
    "EDIT_LOCK_NOT_AVAILABLE",
    "DUPLICATE_ITEM",
];

const CONFLICT_CODE: &str = "INVALID_INPUT_ARGUMENT";

/// Engine message for a rank that is not allowed at the requested order.
static RANK_ORDER_CONFLICT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Rule with rank [0-9]+ is not allowed at order [0-9]+")
        .expect("Invalid regex pattern")
});

/// Where a fail-fast code was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodeSource {
    /// The parsed `code` field of the response body.
    Structured,
    /// A `"code":"<CODE>"` substring of the error text.
    Fallback,
}

fn find_fail_fast(err: &ApiError) -> Option<(&'static str, CodeSource)> {
    if let Some(code) = err.code() {
        if let Some(matched) = FAIL_FAST_CODES.iter().copied().find(|c| *c == code) {
            return Some((matched, CodeSource::Structured));
        }
    }

    let text = err.to_string();
    FAIL_FAST_CODES
        .iter()
        .copied()
        .find(|code| text.contains(&format!(r#""code":"{code}""#)))
        .map(|code| (code, CodeSource::Fallback))
}

/// Returns the fail-fast code carried by `err`, if any.
///
/// The structured code in the response body is checked first. Errors that
/// never parsed into a body fall back to looking for `"code":"<CODE>"` in
/// the error text.
pub fn fail_fast_code(err: &ApiError) -> Option<&'static str> {
    let (code, source) = find_fail_fast(err)?;
    match source {
        CodeSource::Structured => {
            error!(code, error = %err, "Failing immediately due to API error code")
        }
        CodeSource::Fallback => {
            warn!(code, error = %err, "Failing due to fallback match for API error code")
        }
    }
    Some(code)
}

/// Returns true if `err` is the engine refusing a rank at an order.
pub fn is_rank_order_conflict(err: &ApiError) -> bool {
    let text = err.to_string();
    text.contains(CONFLICT_CODE) && RANK_ORDER_CONFLICT_RE.is_match(&text)
}
