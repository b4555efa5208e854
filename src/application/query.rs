use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::QueryConfig;
use crate::domain::document::RetrievedChunk;
use crate::domain::language_model::{ChatMessage, ChatProvider, EmbeddingProvider};
use crate::domain::vector_repository::VectorRepository;

/// Errors a query can surface. `NoDocument` and `NoMatches` are client
/// errors (nothing to search yet / nothing relevant found); everything else
/// is a provider or infrastructure fault.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("No documents uploaded. Please upload a PDF first.")]
    NoDocument,
    #[error("No relevant information found in the uploaded documents.")]
    NoMatches,
    #[error(transparent)]
    Provider(#[from] anyhow::Error),
}

/// Verdict for one sub-query of the decomposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SubQueryVerdict {
    query: String,
    answer: String,
    justification: String,
}

const DECOMPOSITION_INSTRUCTIONS: &str = "\
You are an expert insurance assistant specialized in semantic retrieval from \
policy documents. Rewrite the user's plain-English question into 4 to 5 \
formal, semantically distinct search queries suitable for embedding-based \
retrieval. Explore different angles: coverage eligibility, waiting periods, \
exclusion clauses, day care versus hospitalization classification, and \
geographic or network-hospital constraints.

Respond with ONLY a JSON array of strings, one entry per search query. \
No commentary, no code fences.";

const REPHRASE_INSTRUCTIONS: &str = "\
The following insurance policy search query retrieved vague or insufficient \
evidence. Rephrase it to be more specific and legally precise so that \
embedding-based retrieval is more likely to find the relevant clause. \
Respond with ONLY the rephrased query text.";

fn evaluation_prompt(context: &str) -> String {
    format!(
        "You are an expert insurance assistant. Using ONLY the retrieved \
policy clauses below, evaluate the search query you are given and return a \
verdict as a JSON object of the form \
{{\"answer\": \"Yes | No | Not sure\", \"justification\": \"<short legal-style \
justification based on the retrieved text>\"}}.

Answer \"Yes\" or \"No\" only when the clauses support it. Answer \"Not sure\" \
only if the retrieved text is truly insufficient or ambiguous. Avoid \
assumptions; rely on the retrieved text only. No commentary, no code fences.

Retrieved clauses:
{context}"
    )
}

fn synthesis_prompt(context: &str, verdicts: &str) -> String {
    format!(
        "You are an expert insurance assistant helping the user understand \
whether their policy covers a specific situation. Several formal sub-queries \
were evaluated against the policy document; their verdicts are listed below, \
followed by the policy clauses retrieved for the user's original question.

Synthesize one final judgment for the user's question: Yes or No, based on \
the majority or most decisive verdicts. Justify it formally and objectively, \
referring to waiting-period and exclusion clauses and mentioning any \
exceptions. Never return a partial or vague answer.

Respond as a JSON object of the form \
{{\"final_answer\": {{\"answer\": \"Yes | No\", \"justification\": \"<formal \
summary combining all findings>\"}}}}.

Sub-query verdicts:
{verdicts}

Context:
{context}"
    )
}

/// Single-prompt protocol carried over from the original service: the whole
/// decompose-retrieve-retry procedure is described to the model as
/// instructions over one context block. Used when decomposition output
/// cannot be parsed.
fn one_shot_prompt(context: &str) -> String {
    format!(
        "YOU ARE AN EXPERT INSURANCE ASSISTANT SPECIALIZED IN SEMANTIC \
RETRIEVAL FROM POLICY DOCUMENTS.

YOUR OBJECTIVE is to help the user understand if their insurance policy \
covers a specific situation by:
1. Rewriting their query into 4-5 formal, semantically diverse search queries \
spanning coverage eligibility, waiting periods, exclusion clauses, day care \
versus hospitalization classification, and geographic or network constraints.
2. Evaluating each query against the retrieved policy clauses below.
3. Answering each with a formal Yes, No, or Not sure plus a legal-style \
justification, retrying rephrased queries (at most 4 attempts each) when the \
answer is Not sure due to poor retrieval.
4. Producing a final combined answer: Yes or No plus a justification using \
all the retrieved context.

RULES: Only say Not sure if retrieval was truly insufficient. Avoid \
assumptions; rely on the retrieved text only. Be formal, factual, and \
contract-aware. Never return a partial or vague final answer.

Context:
{context}"
    )
}

/// Joins retrieved chunks into the context block handed to the model, one
/// entry per chunk, separated by blank lines.
fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("page_content: {}\npage_label: {}", c.text, c.page_label))
        .collect::<Vec<_>>()
        .join("\n\n\n")
}

/// Pulls the first JSON value delimited by `open`..`close` out of a model
/// response, tolerating code fences and surrounding prose.
fn json_slice(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Answers a user question by retrieving policy chunks and running the
/// decomposition-and-retry protocol as an explicit loop: decompose into
/// sub-queries, retrieve and evaluate each (with bounded rephrase retries),
/// then synthesize a single final answer.
pub struct QueryOrchestrator {
    embedder: Arc<dyn EmbeddingProvider>,
    vector_db: Arc<dyn VectorRepository>,
    chat: Arc<dyn ChatProvider>,
    config: QueryConfig,
}

impl QueryOrchestrator {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        vector_db: Arc<dyn VectorRepository>,
        chat: Arc<dyn ChatProvider>,
        config: QueryConfig,
    ) -> Self {
        Self {
            embedder,
            vector_db,
            chat,
            config,
        }
    }

    pub async fn answer(&self, query: &str) -> Result<String, QueryError> {
        info!("Processing query: '{}'", query);

        if !self.vector_db.collection_exists().await? {
            warn!("Query received before any document was ingested.");
            return Err(QueryError::NoDocument);
        }

        let primary_hits = self.retrieve(query).await?;
        if primary_hits.is_empty() {
            warn!("No relevant chunks found for query: '{}'", query);
            return Err(QueryError::NoMatches);
        }
        let primary_context = format_context(&primary_hits);

        match self.decompose(query).await? {
            Some(sub_queries) => {
                info!("Decomposed query into {} sub-queries", sub_queries.len());
                let mut verdicts = Vec::with_capacity(sub_queries.len());
                for sub_query in sub_queries {
                    verdicts.push(self.resolve_sub_query(sub_query).await?);
                }
                self.synthesize(query, &primary_context, &verdicts).await
            }
            None => {
                warn!("Decomposition output was not parseable; falling back to one-shot prompt.");
                let messages = [
                    ChatMessage::system(one_shot_prompt(&primary_context)),
                    ChatMessage::user(query),
                ];
                Ok(self.chat.complete(&messages).await?)
            }
        }
    }

    async fn retrieve(&self, text: &str) -> Result<Vec<RetrievedChunk>> {
        let vector = self
            .embedder
            .embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| anyhow!("Failed to generate embedding for query: {}", text))?;
        self.vector_db
            .search(vector, self.config.top_k, self.config.score_threshold)
            .await
    }

    /// Asks the model for 4-5 formal sub-queries. `Ok(None)` means the
    /// response was not a parseable JSON array (triggers the fallback path);
    /// provider failures propagate.
    async fn decompose(&self, query: &str) -> Result<Option<Vec<String>>> {
        let messages = [
            ChatMessage::system(DECOMPOSITION_INSTRUCTIONS),
            ChatMessage::user(query),
        ];
        let response = self.chat.complete(&messages).await?;

        let parsed = json_slice(&response, '[', ']')
            .and_then(|s| serde_json::from_str::<Vec<String>>(s).ok());
        let Some(sub_queries) = parsed else {
            debug!("Unparseable decomposition response: {}", response);
            return Ok(None);
        };

        let mut sub_queries: Vec<String> = sub_queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        sub_queries.truncate(self.config.max_sub_queries);
        if sub_queries.is_empty() {
            return Ok(None);
        }
        Ok(Some(sub_queries))
    }

    /// Retrieves and evaluates one sub-query, rephrasing and retrying while
    /// the verdict is "Not sure", up to the configured attempt bound.
    async fn resolve_sub_query(&self, sub_query: String) -> Result<SubQueryVerdict> {
        let mut current = sub_query;
        let mut last_verdict: Option<SubQueryVerdict> = None;

        for attempt in 1..=self.config.max_attempts_per_sub_query {
            debug!(
                "Evaluating sub-query (attempt {}/{}): '{}'",
                attempt, self.config.max_attempts_per_sub_query, current
            );

            let hits = self.retrieve(&current).await?;
            let verdict = if hits.is_empty() {
                SubQueryVerdict {
                    query: current.clone(),
                    answer: "Not sure".to_string(),
                    justification: "No relevant clauses were retrieved for this sub-query."
                        .to_string(),
                }
            } else {
                self.evaluate(&current, &hits).await?
            };

            let unsure = verdict.answer.eq_ignore_ascii_case("not sure");
            last_verdict = Some(verdict);
            if !unsure {
                break;
            }
            if attempt < self.config.max_attempts_per_sub_query {
                current = self.rephrase(&current).await?;
            }
        }

        // The loop always runs at least once.
        Ok(last_verdict.expect("at least one evaluation attempt"))
    }

    async fn evaluate(
        &self,
        sub_query: &str,
        hits: &[RetrievedChunk],
    ) -> Result<SubQueryVerdict> {
        let context = format_context(hits);
        let messages = [
            ChatMessage::system(evaluation_prompt(&context)),
            ChatMessage::user(sub_query),
        ];
        let response = self.chat.complete(&messages).await?;

        #[derive(Deserialize)]
        struct RawVerdict {
            answer: String,
            justification: String,
        }

        let parsed = json_slice(&response, '{', '}')
            .and_then(|s| serde_json::from_str::<RawVerdict>(s).ok());
        match parsed {
            Some(raw) => Ok(SubQueryVerdict {
                query: sub_query.to_string(),
                answer: raw.answer,
                justification: raw.justification,
            }),
            None => {
                // A malformed verdict counts as inconclusive retrieval.
                debug!("Unparseable verdict response: {}", response);
                Ok(SubQueryVerdict {
                    query: sub_query.to_string(),
                    answer: "Not sure".to_string(),
                    justification: response,
                })
            }
        }
    }

    async fn rephrase(&self, sub_query: &str) -> Result<String> {
        let messages = [
            ChatMessage::system(REPHRASE_INSTRUCTIONS),
            ChatMessage::user(sub_query),
        ];
        let response = self.chat.complete(&messages).await?;
        let rephrased = response.trim();
        if rephrased.is_empty() {
            // Keep the current phrasing rather than retrieving for nothing.
            Ok(sub_query.to_string())
        } else {
            Ok(rephrased.to_string())
        }
    }

    async fn synthesize(
        &self,
        query: &str,
        primary_context: &str,
        verdicts: &[SubQueryVerdict],
    ) -> Result<String, QueryError> {
        let verdicts_json = serde_json::to_string_pretty(verdicts)
            .map_err(|e| QueryError::Provider(anyhow!("Failed to serialize verdicts: {}", e)))?;
        let messages = [
            ChatMessage::system(synthesis_prompt(primary_context, &verdicts_json)),
            ChatMessage::user(query),
        ];
        Ok(self.chat.complete(&messages).await?)
    }
}
