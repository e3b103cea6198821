//! Question sourcing
//!
//! The pipeline assembles an ordered question list for a category by
//! mixing two sources: the catalog of previously stored questions
//! (least-asked first, excluding ids already used) and an AI-backed
//! provider that generates fresh ones on demand. Provider output is free
//! text; the first bracketed JSON array in it is parsed and the whole
//! batch is rejected if any element fails validation. Neither source is
//! allowed to break gameplay: failures degrade to fewer (or zero)
//! questions and the caller decides what to surface.

use std::{error::Error, sync::Arc, time::Duration};

use async_trait::async_trait;
use itertools::Itertools;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    constants::timing::PROVIDER_TIMEOUT_SECS,
    room::{AnswerOptions, Choice, Difficulty, Question},
};

/// Error raised by the catalog backend.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The backend could not be reached or rejected the operation.
    #[error("catalog unavailable: {message}")]
    Unavailable {
        /// What the pipeline was trying to do.
        message: String,
        /// The backend's own failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

/// Error raised by the question provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider call failed or returned an unusable response.
    #[error("provider failed: {0}")]
    Failed(String),
}

/// Read/write port to the durable question catalog.
///
/// Never consulted on the hot path of a running game; only during quiz
/// setup in the lobby.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Up to `limit` questions in the category, excluding the given ids,
    /// ordered by ascending times-asked counter.
    async fn fetch(
        &self,
        category: &str,
        limit: usize,
        exclude: &[String],
    ) -> Result<Vec<Question>, CatalogError>;

    /// Increments the times-asked counter for the given question ids.
    async fn bump_usage(&self, ids: &[String]) -> Result<(), CatalogError>;

    /// Persists generated questions into the category; duplicates are the
    /// backend's problem and are swallowed there.
    async fn insert(&self, category: &str, questions: &[Question]) -> Result<(), CatalogError>;
}

/// What the pipeline asks the provider for.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Category or free-form topic.
    pub category: String,
    /// How many questions are wanted.
    pub count: usize,
    /// Requested difficulty.
    pub difficulty: Difficulty,
}

/// Port to the AI-backed question generator.
#[async_trait]
pub trait QuestionProvider: Send + Sync {
    /// Returns the provider's raw response text; the pipeline does the
    /// parsing.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError>;
}

/// Raw element of a provider response, before validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuestion {
    text: String,
    options: RawOptions,
    correct_answer: String,
    #[serde(default)]
    time_limit: Option<u32>,
    #[serde(default)]
    image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawOptions {
    #[serde(rename = "A")]
    a: String,
    #[serde(rename = "B")]
    b: String,
    #[serde(rename = "C")]
    c: String,
    #[serde(rename = "D")]
    d: String,
}

/// Extracts and validates the first bracketed JSON array in a provider
/// response.
///
/// Returns `None` when no array can be found or when any element fails
/// validation; a partially valid batch is rejected as a whole.
pub fn parse_provider_questions(text: &str) -> Option<Vec<Question>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    let raw: Vec<RawQuestion> = serde_json::from_str(&text[start..=end]).ok()?;
    if raw.is_empty() {
        return None;
    }

    raw.into_iter()
        .map(|question| {
            let RawQuestion {
                text,
                options,
                correct_answer,
                time_limit,
                image_url,
            } = question;
            let correct = Choice::parse(&correct_answer)?;
            if text.is_empty()
                || options.a.is_empty()
                || options.b.is_empty()
                || options.c.is_empty()
                || options.d.is_empty()
            {
                return None;
            }
            Some(Question {
                id: uuid::Uuid::new_v4().to_string(),
                text,
                options: AnswerOptions {
                    a: options.a,
                    b: options.b,
                    c: options.c,
                    d: options.d,
                },
                correct_answer: correct,
                time_limit,
                image_url,
            })
        })
        .collect()
}

/// Assembles question lists for games.
pub struct QuestionPipeline {
    catalog: Arc<dyn Catalog>,
    provider: Arc<dyn QuestionProvider>,
    provider_timeout: Duration,
}

impl QuestionPipeline {
    /// Creates a pipeline over the given sources with the standard
    /// provider timeout.
    pub fn new(catalog: Arc<dyn Catalog>, provider: Arc<dyn QuestionProvider>) -> Self {
        Self {
            catalog,
            provider,
            provider_timeout: Duration::from_secs(PROVIDER_TIMEOUT_SECS),
        }
    }

    /// Produces up to `count` questions for the category.
    ///
    /// Prefers the least-used cached questions, topping up from the
    /// provider when the cache runs short. May return fewer than `count`
    /// (or none); the caller surfaces that as a generation failure.
    pub async fn fetch_questions(
        &self,
        category: &str,
        count: usize,
        difficulty: Difficulty,
        exclude: &[String],
    ) -> Vec<Question> {
        let mut cached = match self.catalog.fetch(category, count * 2, exclude).await {
            Ok(questions) => questions,
            Err(err) => {
                tracing::warn!(category, error = %err, "catalog fetch failed");
                Vec::new()
            }
        };

        if cached.len() >= count {
            fastrand::shuffle(&mut cached);
            cached.truncate(count);
            let ids = cached.iter().map(|q| q.id.clone()).collect_vec();
            if let Err(err) = self.catalog.bump_usage(&ids).await {
                tracing::warn!(category, error = %err, "usage bump failed");
            }
            return cached;
        }

        let needed = count - cached.len();
        let request = GenerationRequest {
            category: category.to_owned(),
            count: needed,
            difficulty,
        };
        let generated =
            match tokio::time::timeout(self.provider_timeout, self.provider.generate(&request))
                .await
            {
                Ok(Ok(text)) => parse_provider_questions(&text).unwrap_or_default(),
                Ok(Err(err)) => {
                    tracing::warn!(category, error = %err, "provider call failed");
                    Vec::new()
                }
                Err(_) => {
                    tracing::warn!(category, "provider call timed out");
                    Vec::new()
                }
            };

        if generated.is_empty() {
            return cached;
        }

        if let Err(err) = self.catalog.insert(category, &generated).await {
            tracing::warn!(category, error = %err, "persisting generated questions failed");
        }

        cached.extend(generated.into_iter().take(needed));
        cached
    }
}
