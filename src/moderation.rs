//! Word-list screening for peer chat messages.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

pub const FLAG_REASON: &str = "Contains inappropriate language";

static BLOCKED: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        r"(?i)\b(hate|kill|die|suicide)\b",
        r"(?i)\b(stupid|idiot|moron)\b",
        r"(?i)\b(spam|scam|fake)\b",
    ]
    .map(|pattern| Regex::new(pattern).expect("moderation pattern compiles"))
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub flagged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

/// Flags a message containing any blocked word as a whole word, in any case.
pub fn screen(message: &str) -> Verdict {
    if BLOCKED.iter().any(|pattern| pattern.is_match(message)) {
        Verdict { flagged: true, reason: Some(FLAG_REASON) }
    } else {
        Verdict { flagged: false, reason: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("I hate mondays", true)]
    #[case("what an IDIOT", true)]
    #[case("this looks like a Scam.", true)]
    #[case("don't die on me", true)]
    #[case("feeling much better today", false)]
    #[case("the killer whale documentary", false)]
    #[case("diet going well", false)]
    #[case("", false)]
    fn whole_words_only(#[case] message: &str, #[case] flagged: bool) {
        assert_eq!(screen(message).flagged, flagged);
    }

    #[test]
    fn clean_message_serializes_without_reason() {
        let body = serde_json::to_value(screen("hello there")).unwrap();
        assert_eq!(body, serde_json::json!({ "flagged": false }));
    }

    #[test]
    fn flagged_message_carries_reason() {
        assert_eq!(screen("spam spam spam").reason, Some(FLAG_REASON));
    }
}
