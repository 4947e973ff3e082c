//! Compliance verdicts and the tolerant parser that produces them from gateway text.
//!
//! The parser never fails. Whatever the gateway hands back (model text, an abort error, the
//! exhausted sentinel) degrades to a well-formed [`Verdict`] whose status is exactly PASS or
//! FAIL. Every fallback lands on FAIL so that an unanswered or garbled request can never be
//! recorded as compliant.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved text returned by the gateway when every candidate failed transiently.
pub const SERVICE_UNAVAILABLE_SENTINEL: &str = "SERVICE_UNAVAILABLE";

/// Prefix of the text surfaced when a candidate rejects the request outright.
pub const ABORT_MARKER: &str = "AI Error";

/// Prefix of transport-level failure text produced outside the gateway.
pub const TRANSPORT_FAULT_MARKER: &str = "Connection Error";

/// Reason recorded when no model answered.
pub const RETRY_MESSAGE: &str = "System Error - Please Retry";

/// Category used when the model did not name one.
pub const DEFAULT_CATEGORY: &str = "General";

const DELIMITER: char = '|';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Fail,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pass => "PASS",
            Status::Fail => "FAIL",
        }
    }

    /// Normalise a labelled `Result:` value. Only an explicit PASS passes.
    fn from_label_value(value: &str) -> Self {
        let word = value.trim_matches(|c: char| !c.is_ascii_alphanumeric());
        if word.eq_ignore_ascii_case("PASS") {
            Status::Pass
        } else {
            Status::Fail
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The structured compliance outcome for one capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub category: String,
    pub status: Status,
    pub reason: String,
}

impl Verdict {
    /// Verdict recorded when the gateway produced no model answer.
    pub fn unavailable() -> Self {
        Self {
            category: DEFAULT_CATEGORY.to_string(),
            status: Status::Fail,
            reason: RETRY_MESSAGE.to_string(),
        }
    }

    /// Parse gateway output into a verdict.
    ///
    /// Recognised shapes, in order:
    /// 1. the exhausted sentinel or a transport-fault marker: FAIL with [`RETRY_MESSAGE`]
    /// 2. abort error text: FAIL with the error text as the reason
    /// 3. `Category: <name> | Result: <PASS|FAIL> | Reason: <sentence>` in any segment order;
    ///    absent labels keep their defaults (`General`, FAIL, the raw input)
    /// 4. free-form text: FAIL iff it contains "FAIL" case-insensitively
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();

        if trimmed == SERVICE_UNAVAILABLE_SENTINEL || trimmed.starts_with(TRANSPORT_FAULT_MARKER) {
            return Self::unavailable();
        }

        if trimmed.starts_with(ABORT_MARKER) {
            return Self {
                category: DEFAULT_CATEGORY.to_string(),
                status: Status::Fail,
                reason: text.to_string(),
            };
        }

        if text.contains(DELIMITER) {
            return Self::parse_labelled(text);
        }

        let status = if text.to_uppercase().contains("FAIL") {
            Status::Fail
        } else {
            Status::Pass
        };
        Self {
            category: DEFAULT_CATEGORY.to_string(),
            status,
            reason: text.to_string(),
        }
    }

    fn parse_labelled(text: &str) -> Self {
        let mut verdict = Self {
            category: DEFAULT_CATEGORY.to_string(),
            status: Status::Fail,
            reason: text.to_string(),
        };

        for segment in text.split(DELIMITER) {
            let Some((label, value)) = split_label(segment) else {
                continue;
            };
            match label {
                Label::Category => {
                    if !value.is_empty() {
                        verdict.category = value.to_string();
                    }
                }
                Label::Result => verdict.status = Status::from_label_value(value),
                Label::Reason => {
                    if !value.is_empty() {
                        verdict.reason = value.to_string();
                    }
                }
            }
        }

        verdict
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Category,
    Result,
    Reason,
}

/// Split `"  **Category:** Trial Room "` into its label and trimmed value.
fn split_label(segment: &str) -> Option<(Label, &str)> {
    let segment = segment.trim().trim_start_matches('*');
    let (name, rest) = segment.split_once(':')?;

    let label = match name.trim().to_ascii_lowercase().as_str() {
        "category" => Label::Category,
        "result" => Label::Result,
        "reason" => Label::Reason,
        _ => return None,
    };

    // Markdown bolding around the label ("**Result:** PASS") leaves stars behind
    let value = rest.trim_start_matches('*').trim().trim_end_matches('*').trim();
    Some((label, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_labelled_contract_text() {
        let verdict = Verdict::parse("Category: Trial Room | Result: FAIL | Reason: Messy desk");
        assert_eq!(verdict.category, "Trial Room");
        assert_eq!(verdict.status, Status::Fail);
        assert_eq!(verdict.reason, "Messy desk");
    }

    #[test]
    fn test_segment_order_does_not_matter() {
        let verdict = Verdict::parse("Reason:   Shelves fully stocked  |Result: PASS|   Category: Merchandise Display ");
        assert_eq!(verdict.category, "Merchandise Display");
        assert_eq!(verdict.status, Status::Pass);
        assert_eq!(verdict.reason, "Shelves fully stocked");
    }

    #[test]
    fn test_missing_labels_keep_safe_defaults() {
        let raw = "Category: Greeter | something unlabelled";
        let verdict = Verdict::parse(raw);
        assert_eq!(verdict.category, "Greeter");
        assert_eq!(verdict.status, Status::Fail);
        assert_eq!(verdict.reason, raw);
    }

    #[test]
    fn test_empty_category_value_keeps_general() {
        let verdict = Verdict::parse("Category:   | Result: PASS | Reason: Clean entrance");
        assert_eq!(verdict.category, DEFAULT_CATEGORY);
        assert_eq!(verdict.status, Status::Pass);
    }

    #[test]
    fn test_result_value_is_normalised() {
        assert_eq!(Verdict::parse("Result: pass. | Reason: ok").status, Status::Pass);
        assert_eq!(Verdict::parse("**Result:** PASS | Reason: ok").status, Status::Pass);
        assert_eq!(Verdict::parse("Result: PASSED? | Reason: ok").status, Status::Fail);
        assert_eq!(Verdict::parse("Result: unclear | Reason: blurry photo").status, Status::Fail);
    }

    #[test]
    fn test_sentinel_is_a_retry_failure() {
        let verdict = Verdict::parse(SERVICE_UNAVAILABLE_SENTINEL);
        assert_eq!(verdict, Verdict::unavailable());
        assert_eq!(verdict.reason, "System Error - Please Retry");
    }

    #[test]
    fn test_transport_fault_is_a_retry_failure() {
        let verdict = Verdict::parse("Connection Error: dns error | Result: PASS");
        assert_eq!(verdict.category, "General");
        assert_eq!(verdict.status, Status::Fail);
        assert_eq!(verdict.reason, RETRY_MESSAGE);
    }

    #[test]
    fn test_abort_text_fails_with_raw_reason() {
        let text = "AI Error 403: {\"error\":{\"message\":\"API key not valid\"}}";
        let verdict = Verdict::parse(text);
        assert_eq!(verdict.category, "General");
        assert_eq!(verdict.status, Status::Fail);
        assert_eq!(verdict.reason, text);
    }

    #[test]
    fn test_free_form_text_fails_only_on_fail_substring() {
        let passing = Verdict::parse("Looks fine, PASS");
        assert_eq!(passing.status, Status::Pass);
        assert_eq!(passing.category, "General");
        assert_eq!(passing.reason, "Looks fine, PASS");

        assert_eq!(Verdict::parse("this one would fail inspection").status, Status::Fail);
        assert_eq!(Verdict::parse("FAILURE: mirror dirty").status, Status::Fail);
        assert_eq!(Verdict::parse("All good").status, Status::Pass);
    }

    #[test]
    fn test_status_serialises_uppercase() {
        assert_eq!(serde_json::to_string(&Status::Pass).unwrap(), "\"PASS\"");
        assert_eq!(Status::Fail.to_string(), "FAIL");
    }
}
