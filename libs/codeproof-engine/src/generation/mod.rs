//! Generation backend capability.
//!
//! The controller only ever sees `GenerationResult`s; how candidates are
//! produced stays behind this trait. A transport failure is an `Err`, a
//! backend that judged the input invalid still returns `Ok` with the
//! judgment attached.

mod openai;
mod prompts;

pub use openai::ChatCompletionsBackend;

use crate::error::GenerationError;
use async_trait::async_trait;
use codeproof_common::GenerationResult;

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Produce initial candidates for `tests`, written in `language`
    async fn generate(
        &self,
        language: &str,
        tests: &str,
    ) -> Result<GenerationResult, GenerationError>;

    /// Produce a revised candidate given the failure digest of the last round
    async fn revise(
        &self,
        language: &str,
        tests: &str,
        implementation: &str,
        digest: &str,
    ) -> Result<GenerationResult, GenerationError>;
}

/// Parse a model reply into a `GenerationResult`, tolerating a markdown
/// code fence around the JSON.
pub fn parse_reply(reply: &str) -> Result<GenerationResult, GenerationError> {
    let body = strip_fence(reply);
    if body.is_empty() {
        return Err(GenerationError::UnexpectedResponse(
            "empty completion".to_string(),
        ));
    }

    serde_json::from_str(body).map_err(|e| {
        GenerationError::UnexpectedResponse(format!("reply is not a generation result: {}", e))
    })
}

fn strip_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (```json) up to the first newline
    let rest = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeproof_common::{JudgmentKind, JudgmentSource};

    const REPLY: &str = r#"{
        "test2code": [{"testcase": "def test_a():\n    assert a() == 1", "implementation": "def a():\n    return 1"}],
        "error": {"source": "", "type": "", "message": ""}
    }"#;

    #[test]
    fn test_parse_plain_reply() {
        let result = parse_reply(REPLY).unwrap();
        assert_eq!(result.pairs.len(), 1);
        assert_eq!(result.implementation(), "def a():\n    return 1");
        assert!(!result.error.is_error());
    }

    #[test]
    fn test_parse_fenced_reply() {
        let fenced = format!("```json\n{}\n```", REPLY);
        assert_eq!(parse_reply(&fenced).unwrap(), parse_reply(REPLY).unwrap());

        let bare = format!("```\n{}\n```\n", REPLY);
        assert_eq!(parse_reply(&bare).unwrap().pairs.len(), 1);
    }

    #[test]
    fn test_parse_testcase_judgment() {
        let result = parse_reply(
            r#"{"test2code": [], "error": {"source": "testcases", "type": "syntaxError", "message": "missing colon"}}"#,
        )
        .unwrap();
        assert_eq!(result.error.source, JudgmentSource::Testcase);
        assert_eq!(result.error.kind, JudgmentKind::Syntax);
        assert!(result.error.blames_testcase());
    }

    #[test]
    fn test_non_json_reply_is_unexpected() {
        assert!(matches!(
            parse_reply("Sure! Here is your code:"),
            Err(GenerationError::UnexpectedResponse(_))
        ));
        assert!(matches!(
            parse_reply("   "),
            Err(GenerationError::UnexpectedResponse(_))
        ));
    }
}
