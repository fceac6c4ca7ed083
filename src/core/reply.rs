use crate::utils::error::{AnalyzerError, Result};
use serde::de::DeserializeOwned;

/// Removes markdown code fences the model sometimes wraps JSON in.
pub fn strip_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// Parses a model reply as `T`. Falls back to the outermost `{...}` span
/// when the reply carries prose around the JSON object.
pub fn parse_reply<T: DeserializeOwned>(stage: &str, text: &str) -> Result<T> {
    let cleaned = strip_fences(text);
    if cleaned.is_empty() {
        return Err(AnalyzerError::MalformedResponse {
            stage: stage.to_string(),
            message: "reply contained no text".to_string(),
        });
    }

    let first_error = match serde_json::from_str::<T>(&cleaned) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end && (start > 0 || end < cleaned.len() - 1) {
            if let Ok(value) = serde_json::from_str::<T>(&cleaned[start..=end]) {
                tracing::debug!("🧹 {}: recovered JSON object from surrounding text", stage);
                return Ok(value);
            }
        }
    }

    Err(AnalyzerError::MalformedResponse {
        stage: stage.to_string(),
        message: format!("{} (reply: {})", first_error, preview(&cleaned)),
    })
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 200;
    match text.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        value: i64,
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_fences("```json\n{\"value\": 1}\n```"), "{\"value\": 1}");
        assert_eq!(strip_fences("  {\"value\": 1}  "), "{\"value\": 1}");
    }

    #[test]
    fn test_parse_plain_and_fenced() {
        let plain: Sample = parse_reply("test", "{\"value\": 3}").unwrap();
        assert_eq!(plain, Sample { value: 3 });

        let fenced: Sample = parse_reply("test", "```json\n{\"value\": 4}\n```").unwrap();
        assert_eq!(fenced, Sample { value: 4 });
    }

    #[test]
    fn test_parse_recovers_object_from_prose() {
        let reply = "Based on my research, here is the data:\n{\"value\": 5}\nLet me know!";
        let parsed: Sample = parse_reply("test", reply).unwrap();
        assert_eq!(parsed, Sample { value: 5 });
    }

    #[test]
    fn test_parse_failure_names_stage() {
        let err = parse_reply::<Sample>("bill_analyzer", "I could not read the bill.").unwrap_err();
        match err {
            AnalyzerError::MalformedResponse { stage, message } => {
                assert_eq!(stage, "bill_analyzer");
                assert!(message.contains("I could not read the bill."));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_empty_reply_is_malformed() {
        assert!(matches!(
            parse_reply::<Sample>("test", "```json\n```"),
            Err(AnalyzerError::MalformedResponse { .. })
        ));
    }
}
