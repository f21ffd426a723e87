// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Fixed prompt text for the answer orchestrator.

/// System instruction for the query-rewrite call.
pub(crate) const QUERY_SYSTEM: &str = "You are a helpful legal AI assistant answering questions about the Apple vs Epic case. \
You interact with people who have a legal background. Be brief in your answer, generate a search query for the followup question.\n\
Make your response simple and precise. Return the query only, do not return any other text.\n\
e.g.\n\
gov.uscourts.cand.364265.1.0_2-0 AND gov.uscourts.cand.364265.1.0_2-1\n\
AND gov.uscourts.cand.364265.1.0_2-10.\n";

/// System instruction establishing persona and domain restriction for
/// answer generation.
pub(crate) const ANSWER_SYSTEM: &str = "You are a helpful legal AI assistant answering questions about the Apple vs Epic case. \
You interact with people who have a legal background. Your answers are related to the Apple vs Epic legal case.";

/// System instruction for the follow-up call.
pub(crate) const FOLLOWUP_SYSTEM: &str = "You are a helpful AI assistant";

/// Grounding context stand-in when retrieval produced nothing. Never an
/// empty string, so the model can acknowledge the absence of sources.
pub(crate) const NO_SOURCE_SENTINEL: &str = "no source available.";

/// Message text of the canned response when generation output cannot be
/// used.
pub(crate) const FALLBACK_ANSWER: &str = "I'm sorry. I could not formulate a valid response.";

/// Final user turn for answer generation: the assembled source block plus
/// the strict output-format instruction.
pub(crate) fn answer_prompt(context: &str) -> String {
    format!(
        r#" ## Source ##
{context}
## End ##

Your answer needs to be a valid json object with the following format. Please escape all special characters and return the answers as valid json string.
{{
"answer": // the answer to the question, add a source reference to the end of each sentence. e.g. Apple is a fruit [reference1.pdf][reference2.pdf]. If no source available elaborate why as answer.
"thoughts": // brief thoughts on how you came up with the answer, e.g. what sources you used, what you thought about, etc.
}}"#
    )
}

/// User turn for the follow-up call.
pub(crate) fn followup_prompt(answer: &str) -> String {
    format!(
        r#"Generate three follow-up question based on the answer you just generated.
# Answer
{answer}

# Format of the response
Return the follow-up question as a json string list. Don't put your answer between ```json and ```, return the json string directly.
e.g.
{{
    "followUpQuestions": [
        "What did the court decide about the anti-steering provisions?",
        "What remedies were ordered?",
        "Which claims did Epic prevail on?"
    ]
}}"#
    )
}
