// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The answer orchestrator.
//!
//! Turns a conversation plus request options into a grounded, cited,
//! optionally follow-up-augmented [`StructuredResponse`]. The flow is a
//! linear state machine with conditional branches and no backtracking:
//!
//! 1. validate that the last turn is the user's question
//! 2. embed the question (skipped in text mode; degrades on failure)
//! 3. rewrite the question into a search query (skipped in vector mode)
//! 4. retrieve the top passages from the document store
//! 5. assemble the grounding context
//! 6. generate the answer with a strict JSON output contract
//! 7. parse, normalize, or fall back to the canned response
//! 8. optionally generate follow-up questions
//! 9. assemble the response
//!
//! Every network call is an `.await` point; dropping the returned future
//! cancels whichever call is in flight. Nothing here retries — that is the
//! transport's business.

pub mod answer;
mod prompts;

pub use answer::{AnswerEnvelope, ParsedAnswer};

use std::sync::Arc;

use tracing::{debug, warn};

use crate::clients::{ClientRegistry, SharedStore};
use crate::embeddings::EmbeddingProvider;
use crate::error::ChatError;
use crate::providers::{ChatProvider, CompletionOptions};
use crate::store::{ConsistencyLevel, SearchRequest};
use crate::types::{ChatTurn, RequestOptions, RetrievalMode, StructuredResponse};

/// Generation-length cap for every LLM call the orchestrator makes.
const MAX_ANSWER_TOKENS: u32 = 1024;

/// The retrieval-augmented answer orchestrator.
pub struct ChatOrchestrator {
    chat: Arc<dyn ChatProvider>,
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
    store: SharedStore,
    citation_base_url: String,
}

impl ChatOrchestrator {
    pub fn new(
        chat: Arc<dyn ChatProvider>,
        embeddings: Option<Arc<dyn EmbeddingProvider>>,
        store: SharedStore,
        citation_base_url: impl Into<String>,
    ) -> Self {
        Self {
            chat,
            embeddings,
            store,
            citation_base_url: citation_base_url.into(),
        }
    }

    /// Wire an orchestrator from the shared client registry.
    pub async fn from_registry(registry: &ClientRegistry) -> Result<Self, ChatError> {
        Ok(Self::new(
            registry.chat().await?,
            registry.embeddings().await?,
            registry.store().await?,
            registry.config().citation_base_url(),
        ))
    }

    /// Answer the active question in `history`, grounding the reply in
    /// retrieved passages.
    ///
    /// Only fatal conditions return `Err`: a conversation not ending in a
    /// user turn, unusable options, an empty query rewrite, or a
    /// gateway/store failure on a step that cannot degrade. A generation
    /// reply that fails the output contract is a normal outcome and yields
    /// the canned fallback response.
    pub async fn reply(
        &self,
        history: &[ChatTurn],
        options: &RequestOptions,
    ) -> Result<StructuredResponse, ChatError> {
        if options.top_k == 0 {
            return Err(ChatError::InvalidOptions(
                "top_k must be greater than zero".to_string(),
            ));
        }

        let question = match history.last() {
            Some(turn) if turn.is_user() => turn.text.clone(),
            _ => return Err(ChatError::NoUserTurn),
        };

        // Step 2: embedding, unless retrieval is lexical-only.
        let embedding = if options.retrieval_mode != RetrievalMode::Text {
            self.compute_embedding(&question).await
        } else {
            None
        };

        // Step 3: query rewrite, unless retrieval is vector-only. Without
        // a usable query there is nothing to search with, so an empty
        // reply here is fatal.
        let query = if options.retrieval_mode != RetrievalMode::Vector {
            let turns = [ChatTurn::user(question.clone())];
            let reply = self
                .chat
                .complete(&turns, prompts::QUERY_SYSTEM, &CompletionOptions::default())
                .await?;
            let reply = reply.trim().to_string();
            if reply.is_empty() {
                return Err(ChatError::EmptyQuery);
            }
            debug!(query = %reply, "rewrote question into search query");
            Some(reply)
        } else {
            None
        };

        // Step 4: retrieval.
        let supporting = {
            let store = self.store.lock().await;
            store.load()?;
            store.search(&SearchRequest {
                query,
                embedding,
                top_k: options.top_k,
                exclude_category: options.exclude_category.clone(),
                consistency: ConsistencyLevel::Strong,
            })?
        };
        debug!(retrieved = supporting.len(), "retrieval complete");

        // Step 5: grounding context, best match first.
        let context = if supporting.is_empty() {
            prompts::NO_SOURCE_SENTINEL.to_string()
        } else {
            supporting
                .iter()
                .map(|record| format!("{}:{}", record.title, record.content))
                .collect::<Vec<_>>()
                .join("\r")
        };

        // Step 6: grounded generation over the full conversation.
        let mut turns: Vec<ChatTurn> = history.to_vec();
        turns.push(ChatTurn::user(prompts::answer_prompt(&context)));

        let generation = CompletionOptions {
            max_tokens: MAX_ANSWER_TOKENS,
            temperature: options.temperature,
            stop_sequences: Vec::new(),
            json_response: true,
        };
        let reply = self
            .chat
            .complete(&turns, prompts::ANSWER_SYSTEM, &generation)
            .await?;

        // Step 7: parse or fall back.
        let envelope = match answer::parse_answer(&reply) {
            ParsedAnswer::Grounded(envelope) => envelope,
            ParsedAnswer::Ungroundable => {
                warn!("generation reply failed the output contract; returning fallback response");
                return Ok(self.fallback_response());
            }
        };
        let mut answer_text = envelope.answer;

        // Step 8: follow-up questions. These augment a valid answer, so
        // any failure degrades to an empty list instead of discarding it.
        let mut followups = Vec::new();
        if options.suggest_followups {
            let turns = [ChatTurn::user(prompts::followup_prompt(&answer_text))];
            match self
                .chat
                .complete(&turns, prompts::FOLLOWUP_SYSTEM, &generation)
                .await
            {
                Ok(reply) => match answer::parse_followups(&reply) {
                    Some(questions) => {
                        for question in &questions {
                            answer_text.push_str(&format!(" <<{}>> ", question));
                        }
                        followups = questions;
                    }
                    None => warn!("follow-up reply was not a usable JSON list; continuing without follow-ups"),
                },
                Err(error) => {
                    warn!(%error, "follow-up call failed; continuing without follow-ups");
                }
            }
        }

        // Step 9: response assembly.
        Ok(StructuredResponse {
            message: ChatTurn::assistant(answer_text),
            supporting_content: supporting,
            followup_questions: followups,
            thoughts: envelope.thoughts,
            citation_base_url: self.citation_base_url.clone(),
        })
    }

    /// Embed the question, degrading to `None` when the gateway is absent,
    /// unavailable, or explicitly returned no embedding.
    async fn compute_embedding(&self, question: &str) -> Option<Vec<f32>> {
        let provider = self.embeddings.as_ref()?;
        match provider.embed(question).await {
            Ok(embedding) if embedding.is_empty() => {
                warn!("embedding service returned no embedding; degrading to text-only retrieval");
                None
            }
            Ok(embedding) => Some(embedding),
            Err(error) => {
                warn!(%error, "embedding unavailable; degrading to text-only retrieval");
                None
            }
        }
    }

    /// The canned response for generation output that cannot be used.
    fn fallback_response(&self) -> StructuredResponse {
        StructuredResponse {
            message: ChatTurn::assistant(prompts::FALLBACK_ANSWER),
            supporting_content: Vec::new(),
            followup_questions: Vec::new(),
            thoughts: String::new(),
            citation_base_url: self.citation_base_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{MockEmbeddingProvider, EMBEDDING_DIM};
    use crate::error::ProviderError;
    use crate::providers::MockChatProvider;
    use crate::store::DocumentStore;
    use crate::types::PageRecord;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    const VALID_REPLY: &str =
        r#"{"answer": "The provisions were enjoined [steering.pdf].", "thoughts": "used steering.pdf"}"#;

    fn axis_embedding(axis: usize, value: f32) -> Vec<f32> {
        let mut v = vec![0.0; EMBEDDING_DIM];
        v[axis] = value;
        v
    }

    fn page(id: &str, content: &str, category: Option<&str>) -> PageRecord {
        PageRecord {
            id: id.to_string(),
            content: content.to_string(),
            category: category.map(str::to_string),
            sourcepage: format!("{}.pdf", id),
            sourcefile: "ruling.pdf".to_string(),
        }
    }

    fn seeded_store(dir: &TempDir, pages: &[(PageRecord, Vec<f32>)]) -> SharedStore {
        let store = DocumentStore::open(&dir.path().join("documents.db")).unwrap();
        store.ensure_collection().unwrap();
        if !pages.is_empty() {
            store.upsert(pages).unwrap();
        }
        Arc::new(Mutex::new(store))
    }

    fn expect_rewrite(mock: &mut MockChatProvider, query: &'static str) {
        mock.expect_complete()
            .withf(|_, system, _| system == prompts::QUERY_SYSTEM)
            .times(1)
            .returning(move |_, _, _| Ok(query.to_string()));
    }

    fn expect_no_rewrite(mock: &mut MockChatProvider) {
        mock.expect_complete()
            .withf(|_, system, _| system == prompts::QUERY_SYSTEM)
            .times(0)
            .returning(|_, _, _| Ok(String::new()));
    }

    fn expect_generation(mock: &mut MockChatProvider, reply: &'static str) {
        mock.expect_complete()
            .withf(|_, system, options| system == prompts::ANSWER_SYSTEM && options.json_response)
            .times(1)
            .returning(move |_, _, _| Ok(reply.to_string()));
    }

    fn embedding_mock(times: usize, embedding: Vec<f32>) -> Arc<MockEmbeddingProvider> {
        let mut mock = MockEmbeddingProvider::new();
        mock.expect_embed()
            .times(times)
            .returning(move |_| Ok(embedding.clone()));
        Arc::new(mock)
    }

    fn orchestrator(
        chat: MockChatProvider,
        embeddings: Option<Arc<MockEmbeddingProvider>>,
        store: SharedStore,
    ) -> ChatOrchestrator {
        ChatOrchestrator::new(
            Arc::new(chat),
            embeddings.map(|e| e as Arc<dyn EmbeddingProvider>),
            store,
            "https://docs.example.net/corpus",
        )
    }

    fn history() -> Vec<ChatTurn> {
        vec![ChatTurn::user(
            "What did the court hold on anti-steering provisions?",
        )]
    }

    #[tokio::test]
    async fn test_vector_mode_makes_no_rewrite_call() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(
            &dir,
            &[(
                page("steering", "anti-steering passage", None),
                axis_embedding(0, 1.0),
            )],
        );

        let mut chat = MockChatProvider::new();
        expect_no_rewrite(&mut chat);
        expect_generation(&mut chat, VALID_REPLY);

        let orchestrator = orchestrator(chat, Some(embedding_mock(1, axis_embedding(0, 0.5))), store);
        let options = RequestOptions {
            retrieval_mode: RetrievalMode::Vector,
            ..Default::default()
        };

        let response = orchestrator.reply(&history(), &options).await.unwrap();
        assert_eq!(response.supporting_content.len(), 1);
        assert!(response.message.text.contains("[steering.pdf]"));
    }

    #[tokio::test]
    async fn test_text_mode_makes_no_embedding_call() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, &[]);

        let mut chat = MockChatProvider::new();
        expect_rewrite(&mut chat, "anti-steering provisions");
        expect_generation(&mut chat, VALID_REPLY);

        let embeddings = embedding_mock(0, Vec::new());
        let orchestrator = orchestrator(chat, Some(embeddings), store);
        let options = RequestOptions {
            retrieval_mode: RetrievalMode::Text,
            ..Default::default()
        };

        orchestrator.reply(&history(), &options).await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_generation_falls_back() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, &[]);

        let mut chat = MockChatProvider::new();
        expect_rewrite(&mut chat, "query");
        expect_generation(&mut chat, "The answer is probably yes.");

        let orchestrator = orchestrator(chat, None, store);
        let options = RequestOptions {
            retrieval_mode: RetrievalMode::Text,
            suggest_followups: true,
            ..Default::default()
        };

        let response = orchestrator.reply(&history(), &options).await.unwrap();
        assert_eq!(
            response.message.text,
            "I'm sorry. I could not formulate a valid response."
        );
        assert!(response.supporting_content.is_empty());
        assert!(response.followup_questions.is_empty());
        assert_eq!(response.thoughts, "");
        assert_eq!(response.citation_base_url, "https://docs.example.net/corpus");
    }

    #[tokio::test]
    async fn test_missing_thoughts_falls_back() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, &[]);

        let mut chat = MockChatProvider::new();
        expect_rewrite(&mut chat, "query");
        expect_generation(&mut chat, r#"{"answer": "grounded answer [a.pdf]"}"#);

        let orchestrator = orchestrator(chat, None, store);
        let options = RequestOptions {
            retrieval_mode: RetrievalMode::Text,
            ..Default::default()
        };

        let response = orchestrator.reply(&history(), &options).await.unwrap();
        assert_eq!(
            response.message.text,
            "I'm sorry. I could not formulate a valid response."
        );
    }

    #[tokio::test]
    async fn test_zero_results_prompt_carries_sentinel() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, &[]);

        let mut chat = MockChatProvider::new();
        expect_rewrite(&mut chat, "query with no matches");
        chat.expect_complete()
            .withf(|turns, system, _| {
                system == prompts::ANSWER_SYSTEM
                    && turns
                        .last()
                        .is_some_and(|t| t.text.contains("no source available.") && !t.text.is_empty())
            })
            .times(1)
            .returning(|_, _, _| Ok(VALID_REPLY.to_string()));

        let orchestrator = orchestrator(chat, None, store);
        let options = RequestOptions {
            retrieval_mode: RetrievalMode::Text,
            ..Default::default()
        };

        let response = orchestrator.reply(&history(), &options).await.unwrap();
        assert!(response.supporting_content.is_empty());
    }

    #[tokio::test]
    async fn test_context_is_title_content_joined_by_carriage_returns() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(
            &dir,
            &[
                (page("b", "second passage", None), axis_embedding(0, 2.0)),
                (page("a", "first passage", None), axis_embedding(0, 1.0)),
            ],
        );

        let mut chat = MockChatProvider::new();
        chat.expect_complete()
            .withf(|turns, system, _| {
                system == prompts::ANSWER_SYSTEM
                    && turns
                        .last()
                        .is_some_and(|t| t.text.contains("a.pdf:first passage\rb.pdf:second passage"))
            })
            .times(1)
            .returning(|_, _, _| Ok(VALID_REPLY.to_string()));

        let orchestrator = orchestrator(chat, Some(embedding_mock(1, axis_embedding(0, 0.0))), store);
        let options = RequestOptions {
            retrieval_mode: RetrievalMode::Vector,
            ..Default::default()
        };

        orchestrator.reply(&history(), &options).await.unwrap();
    }

    #[tokio::test]
    async fn test_excluded_category_never_appears() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(
            &dir,
            &[
                (page("sealed", "sealed passage", Some("X")), axis_embedding(0, 1.0)),
                (page("open", "open passage", None), axis_embedding(0, 2.0)),
            ],
        );

        let mut chat = MockChatProvider::new();
        expect_no_rewrite(&mut chat);
        expect_generation(&mut chat, VALID_REPLY);

        let orchestrator = orchestrator(chat, Some(embedding_mock(1, axis_embedding(0, 0.0))), store);
        let options = RequestOptions {
            retrieval_mode: RetrievalMode::Vector,
            exclude_category: Some("X".to_string()),
            top_k: 10,
            ..Default::default()
        };

        let response = orchestrator.reply(&history(), &options).await.unwrap();
        let titles: Vec<&str> = response
            .supporting_content
            .iter()
            .map(|r| r.title.as_str())
            .collect();
        assert_eq!(titles, vec!["open.pdf"]);
    }

    #[tokio::test]
    async fn test_hybrid_scenario_embeds_rewrites_and_cites() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(
            &dir,
            &[
                (page("steering", "anti-steering holding", None), axis_embedding(0, 1.0)),
                (page("fees", "commission fees", None), axis_embedding(0, 2.0)),
                (page("remedy", "injunctive remedy", None), axis_embedding(0, 3.0)),
                (page("appeal", "appellate history", None), axis_embedding(0, 4.0)),
            ],
        );

        let mut chat = MockChatProvider::new();
        expect_rewrite(&mut chat, "anti-steering provisions holding");
        expect_generation(&mut chat, VALID_REPLY);

        let orchestrator = orchestrator(chat, Some(embedding_mock(1, axis_embedding(0, 0.0))), store);

        let response = orchestrator
            .reply(&history(), &RequestOptions::default())
            .await
            .unwrap();

        assert_eq!(response.supporting_content.len(), 3);
        assert_eq!(response.supporting_content[0].title, "steering.pdf");
        assert!(response.message.text.contains("[steering.pdf]"));
        assert_eq!(response.thoughts, "used steering.pdf");
    }

    #[tokio::test]
    async fn test_followups_listed_and_marked() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, &[]);

        let mut chat = MockChatProvider::new();
        expect_rewrite(&mut chat, "query");
        expect_generation(&mut chat, VALID_REPLY);
        chat.expect_complete()
            .withf(|_, system, _| system == prompts::FOLLOWUP_SYSTEM)
            .times(1)
            .returning(|_, _, _| {
                Ok(r#"{"followUpQuestions": ["What remedies?", "Which claims?", "What next?"]}"#
                    .to_string())
            });

        let orchestrator = orchestrator(chat, None, store);
        let options = RequestOptions {
            retrieval_mode: RetrievalMode::Text,
            suggest_followups: true,
            ..Default::default()
        };

        let response = orchestrator.reply(&history(), &options).await.unwrap();
        assert_eq!(
            response.followup_questions,
            vec!["What remedies?", "Which claims?", "What next?"]
        );
        assert_eq!(response.message.text.matches("<<").count(), 3);
        assert!(response.message.text.contains(" <<What remedies?>> "));
    }

    #[tokio::test]
    async fn test_followups_accept_bare_list() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, &[]);

        let mut chat = MockChatProvider::new();
        expect_rewrite(&mut chat, "query");
        expect_generation(&mut chat, VALID_REPLY);
        chat.expect_complete()
            .withf(|_, system, _| system == prompts::FOLLOWUP_SYSTEM)
            .times(1)
            .returning(|_, _, _| Ok(r#"["one?", "two?", "three?"]"#.to_string()));

        let orchestrator = orchestrator(chat, None, store);
        let options = RequestOptions {
            retrieval_mode: RetrievalMode::Text,
            suggest_followups: true,
            ..Default::default()
        };

        let response = orchestrator.reply(&history(), &options).await.unwrap();
        assert_eq!(response.followup_questions.len(), 3);
    }

    #[tokio::test]
    async fn test_unusable_followups_degrade() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, &[]);

        let mut chat = MockChatProvider::new();
        expect_rewrite(&mut chat, "query");
        expect_generation(&mut chat, VALID_REPLY);
        chat.expect_complete()
            .withf(|_, system, _| system == prompts::FOLLOWUP_SYSTEM)
            .times(1)
            .returning(|_, _, _| Ok("```json\n[]\n```".to_string()));

        let orchestrator = orchestrator(chat, None, store);
        let options = RequestOptions {
            retrieval_mode: RetrievalMode::Text,
            suggest_followups: true,
            ..Default::default()
        };

        let response = orchestrator.reply(&history(), &options).await.unwrap();
        assert!(response.followup_questions.is_empty());
        assert!(!response.message.text.contains("<<"));
    }

    #[tokio::test]
    async fn test_conversation_must_end_with_user_turn() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, &[]);
        let orchestrator = orchestrator(MockChatProvider::new(), None, store);

        let ended_by_assistant = vec![
            ChatTurn::user("question"),
            ChatTurn::assistant("answer"),
        ];
        let result = orchestrator
            .reply(&ended_by_assistant, &RequestOptions::default())
            .await;
        assert!(matches!(result, Err(ChatError::NoUserTurn)));

        let result = orchestrator.reply(&[], &RequestOptions::default()).await;
        assert!(matches!(result, Err(ChatError::NoUserTurn)));
    }

    #[tokio::test]
    async fn test_zero_top_k_rejected() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, &[]);
        let orchestrator = orchestrator(MockChatProvider::new(), None, store);

        let options = RequestOptions {
            top_k: 0,
            ..Default::default()
        };
        let result = orchestrator.reply(&history(), &options).await;
        assert!(matches!(result, Err(ChatError::InvalidOptions(_))));
    }

    #[tokio::test]
    async fn test_empty_rewrite_is_fatal() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, &[]);

        let mut chat = MockChatProvider::new();
        expect_rewrite(&mut chat, "   ");

        let orchestrator = orchestrator(chat, None, store);
        let options = RequestOptions {
            retrieval_mode: RetrievalMode::Text,
            ..Default::default()
        };

        let result = orchestrator.reply(&history(), &options).await;
        assert!(matches!(result, Err(ChatError::EmptyQuery)));
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_text_retrieval() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, &[]);

        let mut chat = MockChatProvider::new();
        expect_rewrite(&mut chat, "query");
        expect_generation(&mut chat, VALID_REPLY);

        let mut embeddings = MockEmbeddingProvider::new();
        embeddings
            .expect_embed()
            .times(1)
            .returning(|_| Err(ProviderError::NetworkError("unreachable".to_string())));

        let orchestrator = orchestrator(chat, Some(Arc::new(embeddings)), store);

        let response = orchestrator
            .reply(&history(), &RequestOptions::default())
            .await
            .unwrap();
        assert!(response.supporting_content.is_empty());
    }

    #[tokio::test]
    async fn test_vector_mode_without_embedding_is_contract_violation() {
        // Pure-vector retrieval has no query to fall back to, so a dead
        // embedding gateway leaves the search call with nothing to run on.
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, &[]);

        let mut embeddings = MockEmbeddingProvider::new();
        embeddings
            .expect_embed()
            .times(1)
            .returning(|_| Err(ProviderError::NetworkError("unreachable".to_string())));

        let orchestrator = orchestrator(MockChatProvider::new(), Some(Arc::new(embeddings)), store);
        let options = RequestOptions {
            retrieval_mode: RetrievalMode::Vector,
            ..Default::default()
        };

        let result = orchestrator.reply(&history(), &options).await;
        assert!(matches!(
            result,
            Err(ChatError::Store(crate::error::StoreError::InvalidRequest(_)))
        ));
    }

    #[tokio::test]
    async fn test_empty_embedding_also_degrades() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, &[]);

        let mut chat = MockChatProvider::new();
        expect_rewrite(&mut chat, "query");
        expect_generation(&mut chat, VALID_REPLY);

        let orchestrator = orchestrator(chat, Some(embedding_mock(1, Vec::new())), store);

        let response = orchestrator
            .reply(&history(), &RequestOptions::default())
            .await
            .unwrap();
        assert!(response.supporting_content.is_empty());
    }
}
