// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Parsing boundary for generation output.
//!
//! The model's reply is tolerated in more than one JSON shape (`answer` as
//! a string or a list of fragments; follow-ups as a bare list or a wrapped
//! object). The unions live only in this module: everything is normalized
//! to one canonical shape before it leaves the parser, and a reply that
//! cannot satisfy the contract becomes [`ParsedAnswer::Ungroundable`]
//! rather than an error.

use serde::Deserialize;

/// Canonical, normalized generation output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerEnvelope {
    pub answer: String,
    pub thoughts: String,
}

/// Outcome of parsing the generation reply. `Ungroundable` is an expected,
/// non-fatal result that maps to the canned fallback response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedAnswer {
    Grounded(AnswerEnvelope),
    Ungroundable,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    answer: RawAnswer,
    // A reply without thoughts fails the output contract and falls back,
    // same as unparsable JSON.
    thoughts: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAnswer {
    Text(String),
    Fragments(Vec<String>),
}

impl RawAnswer {
    fn normalize(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Fragments(fragments) => fragments.join("\n"),
        }
    }
}

/// Parse the answer-generation reply.
pub fn parse_answer(raw: &str) -> ParsedAnswer {
    let Ok(envelope) = serde_json::from_str::<RawEnvelope>(raw) else {
        return ParsedAnswer::Ungroundable;
    };
    let Some(thoughts) = envelope.thoughts else {
        return ParsedAnswer::Ungroundable;
    };
    ParsedAnswer::Grounded(AnswerEnvelope {
        answer: envelope.answer.normalize(),
        thoughts,
    })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FollowupPayload {
    List(Vec<String>),
    Wrapped {
        #[serde(rename = "followUpQuestions")]
        follow_up_questions: Vec<String>,
    },
}

/// Parse the follow-up reply. `None` means the reply was unusable; the
/// caller degrades to no follow-ups.
pub fn parse_followups(raw: &str) -> Option<Vec<String>> {
    match serde_json::from_str::<FollowupPayload>(raw).ok()? {
        FollowupPayload::List(questions) => Some(questions),
        FollowupPayload::Wrapped {
            follow_up_questions,
        } => Some(follow_up_questions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer_string() {
        let parsed = parse_answer(r#"{"answer": "Epic prevailed [r1.pdf]", "thoughts": "used r1"}"#);
        assert_eq!(
            parsed,
            ParsedAnswer::Grounded(AnswerEnvelope {
                answer: "Epic prevailed [r1.pdf]".to_string(),
                thoughts: "used r1".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_answer_fragments_joined_with_newlines() {
        let parsed =
            parse_answer(r#"{"answer": ["first [a.pdf]", "second [b.pdf]"], "thoughts": "t"}"#);
        match parsed {
            ParsedAnswer::Grounded(envelope) => {
                assert_eq!(envelope.answer, "first [a.pdf]\nsecond [b.pdf]");
            }
            ParsedAnswer::Ungroundable => panic!("expected grounded answer"),
        }
    }

    #[test]
    fn test_parse_answer_malformed_json() {
        assert_eq!(parse_answer("I think the answer is"), ParsedAnswer::Ungroundable);
        assert_eq!(parse_answer(""), ParsedAnswer::Ungroundable);
    }

    #[test]
    fn test_parse_answer_missing_thoughts_falls_back() {
        assert_eq!(
            parse_answer(r#"{"answer": "text"}"#),
            ParsedAnswer::Ungroundable
        );
    }

    #[test]
    fn test_parse_answer_wrong_types_fall_back() {
        assert_eq!(
            parse_answer(r#"{"answer": 42, "thoughts": "t"}"#),
            ParsedAnswer::Ungroundable
        );
        assert_eq!(
            parse_answer(r#"{"answer": "a", "thoughts": ["not", "a", "string"]}"#),
            ParsedAnswer::Ungroundable
        );
    }

    #[test]
    fn test_parse_followups_bare_list() {
        let questions = parse_followups(r#"["one?", "two?", "three?"]"#).unwrap();
        assert_eq!(questions, vec!["one?", "two?", "three?"]);
    }

    #[test]
    fn test_parse_followups_wrapped_object() {
        let questions =
            parse_followups(r#"{"followUpQuestions": ["one?", "two?", "three?"]}"#).unwrap();
        assert_eq!(questions.len(), 3);
    }

    #[test]
    fn test_parse_followups_unusable() {
        assert!(parse_followups("```json\n[]\n```").is_none());
        assert!(parse_followups(r#"{"somethingElse": []}"#).is_none());
    }
}
