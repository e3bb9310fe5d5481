//! Consent-decision replies from the inner-task provider

use kiosk_sdk::types::{ConsentAnswer, ConsentDecision};

/// Coerce a raw inner-task reply into an answer.
///
/// Anything other than an exact `{"task":"consent_decision","answer":...}`
/// object (malformed JSON, extra or missing fields, another task) is `Unknown`.
pub fn parse_consent_answer(raw: &str) -> ConsentAnswer {
    serde_json::from_str::<ConsentDecision>(raw.trim())
        .map(|decision| decision.answer)
        .unwrap_or(ConsentAnswer::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_answers() {
        assert_eq!(
            parse_consent_answer(r#"{"task":"consent_decision","answer":"yes"}"#),
            ConsentAnswer::Yes
        );
        assert_eq!(
            parse_consent_answer(r#" {"answer":"no","task":"consent_decision"} "#),
            ConsentAnswer::No
        );
        assert_eq!(
            parse_consent_answer(r#"{"task":"consent_decision","answer":"unknown"}"#),
            ConsentAnswer::Unknown
        );
    }

    #[test]
    fn test_malformed_is_unknown() {
        assert_eq!(parse_consent_answer("yes"), ConsentAnswer::Unknown);
        assert_eq!(parse_consent_answer("{"), ConsentAnswer::Unknown);
        assert_eq!(parse_consent_answer(""), ConsentAnswer::Unknown);
    }

    #[test]
    fn test_schema_mismatch_is_unknown() {
        assert_eq!(
            parse_consent_answer(r#"{"task":"summarize","answer":"yes"}"#),
            ConsentAnswer::Unknown
        );
        assert_eq!(
            parse_consent_answer(r#"{"task":"consent_decision","answer":"maybe"}"#),
            ConsentAnswer::Unknown
        );
        assert_eq!(
            parse_consent_answer(r#"{"task":"consent_decision"}"#),
            ConsentAnswer::Unknown
        );
        assert_eq!(
            parse_consent_answer(r#"{"task":"consent_decision","answer":"yes","why":"x"}"#),
            ConsentAnswer::Unknown
        );
    }
}
