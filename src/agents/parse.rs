//! Structured-output recovery.
//!
//! Models are prompted to answer in a JSON shape, but they drift: code
//! fences, prose around the object, bare numbers. The parse path is strict
//! JSON first, then a fenced/embedded-object extraction, then regex field
//! extraction, then safe defaults. Only when all of that fails does the
//! turn surface a parse failure.

use regex::Regex;
use serde_json::Value;

/// Try hard to get a JSON object out of a model response.
pub fn parse_json_object(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }

    // Fenced block.
    if let Some(inner) = extract_fenced(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(inner.trim()) {
            if value.is_object() {
                return Some(value);
            }
        }
    }

    // First balanced-looking object slice.
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                if value.is_object() {
                    return Some(value);
                }
            }
        }
    }

    None
}

fn extract_fenced(raw: &str) -> Option<&str> {
    let start = raw.find("```")?;
    let after = &raw[start + 3..];
    // Skip an optional language tag on the fence line.
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

/// Regex fallback: `"field": 7` / `field: 7` / `field = 7`.
pub fn extract_int_field(raw: &str, field: &str) -> Option<i64> {
    let pattern = format!(r#"(?i)"?{}"?\s*[:=]\s*(-?\d+)"#, regex::escape(field));
    let re = Regex::new(&pattern).ok()?;
    re.captures(raw)?.get(1)?.as_str().parse().ok()
}

/// Regex fallback for short string fields.
pub fn extract_string_field(raw: &str, field: &str) -> Option<String> {
    let pattern = format!(r#"(?i)"?{}"?\s*[:=]\s*"([^"]+)""#, regex::escape(field));
    let re = Regex::new(&pattern).ok()?;
    Some(re.captures(raw)?.get(1)?.as_str().to_string())
}

/// Clamp to the crowd vote range.
pub fn clamp_vote_score(score: i64) -> u8 {
    score.clamp(1, 100) as u8
}

/// Clamp to the verification score range.
pub fn clamp_verification_score(score: i64) -> u8 {
    score.clamp(1, 10) as u8
}

/// Parse a crowd vote response to `(score, rationale)`. Falls back through
/// regex extraction; `None` means even the fallback found nothing.
pub fn parse_vote(raw: &str) -> Option<(u8, Option<String>)> {
    if let Some(value) = parse_json_object(raw) {
        if let Some(score) = value.get("score").and_then(Value::as_i64) {
            let rationale = value
                .get("reasoning")
                .or_else(|| value.get("rationale"))
                .and_then(Value::as_str)
                .map(|s| truncate(s, 200));
            return Some((clamp_vote_score(score), rationale));
        }
    }
    if let Some(score) = extract_int_field(raw, "score") {
        return Some((clamp_vote_score(score), None));
    }
    // A bare number is accepted as a score.
    let bare = raw.trim();
    if let Ok(score) = bare.parse::<i64>() {
        return Some((clamp_vote_score(score), None));
    }
    None
}

/// Truncate on a char boundary.
pub fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_json() {
        let value = parse_json_object(r#"{"score": 72, "reasoning": "solid data"}"#).unwrap();
        assert_eq!(value["score"], 72);
    }

    #[test]
    fn test_fenced_json() {
        let raw = "Here is my vote:\n```json\n{\"score\": 33}\n```\nThanks!";
        let value = parse_json_object(raw).unwrap();
        assert_eq!(value["score"], 33);
    }

    #[test]
    fn test_embedded_object() {
        let raw = "I would say {\"score\": 55, \"reasoning\": \"mixed\"} overall.";
        let value = parse_json_object(raw).unwrap();
        assert_eq!(value["score"], 55);
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(parse_json_object("[1, 2, 3]").is_none());
        assert!(parse_json_object("just words").is_none());
    }

    #[test]
    fn test_int_field_variants() {
        assert_eq!(extract_int_field("score: 88", "score"), Some(88));
        assert_eq!(extract_int_field("\"score\" = 12", "score"), Some(12));
        assert_eq!(
            extract_int_field("credibility score: 7 out of 10", "credibility score"),
            Some(7)
        );
        assert_eq!(extract_int_field("no numbers here", "score"), None);
    }

    #[test]
    fn test_string_field() {
        assert_eq!(
            extract_string_field(r#"verdict: "needs context""#, "verdict"),
            Some("needs context".to_string())
        );
    }

    #[test]
    fn test_vote_parsing_paths() {
        assert_eq!(
            parse_vote(r#"{"score": 64, "reasoning": "fair point"}"#),
            Some((64, Some("fair point".to_string())))
        );
        assert_eq!(parse_vote("Score: 91"), Some((91, None)));
        assert_eq!(parse_vote("57"), Some((57, None)));
        assert_eq!(parse_vote("I abstain entirely"), None);
    }

    #[test]
    fn test_vote_clamping() {
        assert_eq!(parse_vote(r#"{"score": 400}"#), Some((100, None)));
        assert_eq!(parse_vote(r#"{"score": 0}"#), Some((1, None)));
        assert_eq!(clamp_verification_score(0), 1);
        assert_eq!(clamp_verification_score(15), 10);
    }

    #[test]
    fn test_truncate_char_boundary() {
        assert_eq!(truncate("héllo wörld", 5), "héllo");
        assert_eq!(truncate("ab", 5), "ab");
    }
}
