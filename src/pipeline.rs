use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Mutex;

use crate::budget::{Budgeter, SentenceSegmenter, TokenCounter};
use crate::config::AppConfig;
use crate::document::{BookDocument, DocumentParser};
use crate::error::QuizError;
use crate::extract::extract_section;
use crate::fetch::{DocumentFetcher, RetryPolicy};
use crate::interleave::{interleave_questions, validate_quiz};
use crate::llm::QuestionGenerator;
use crate::models::{PromptBatch, QuestionItem, Quiz, QuizRequest, SectionText, SplitStrategy};
use crate::store::ContentStore;
use crate::toc::{flatten_toc, resolve_selection};

/// The quiz-generation pipeline: one call per user request.
///
/// Every collaborator is injected, so requests share the content store (and
/// its cache) while tests swap in deterministic fakes.
pub struct QuizService {
    config: AppConfig,
    store: Arc<dyn ContentStore>,
    fetcher: Arc<dyn DocumentFetcher>,
    parser: Arc<dyn DocumentParser>,
    generator: Arc<dyn QuestionGenerator>,
    counter: Arc<dyn TokenCounter>,
    segmenter: Arc<dyn SentenceSegmenter>,
    rng: Mutex<StdRng>,
}

impl QuizService {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn ContentStore>,
        fetcher: Arc<dyn DocumentFetcher>,
        parser: Arc<dyn DocumentParser>,
        generator: Arc<dyn QuestionGenerator>,
        counter: Arc<dyn TokenCounter>,
        segmenter: Arc<dyn SentenceSegmenter>,
    ) -> Self {
        Self {
            config,
            store,
            fetcher,
            parser,
            generator,
            counter,
            segmenter,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Replaces the randomness source, letting tests run seeded.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    /// Generates a quiz of `num_questions` questions from the selected hrefs
    /// of one document.
    pub async fn generate_quiz(&self, request: &QuizRequest) -> Result<Quiz, QuizError> {
        let bytes = self.document_bytes(&request.doc_ref).await?;
        let book = self.parser.parse(&bytes)?;
        let sections = self
            .collect_sections(&request.doc_ref, book.as_ref(), &request.selected_hrefs)
            .await?;

        let budgeter = Budgeter::new(
            self.counter.as_ref(),
            self.segmenter.as_ref(),
            self.config.token_budget,
        );
        let full = budgeter.pass_through(&sections);
        let total_tokens = full.token_count;

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let questions = self
                .questions_for_attempt(&budgeter, &sections, &full, request.num_questions)
                .await?;

            if validate_quiz(&questions, request.num_questions) {
                return Ok(Quiz {
                    questions,
                    model_used: self.generator.model_id().to_string(),
                    total_tokens,
                });
            }

            if attempts > self.config.max_validation_retries {
                tracing::error!(attempts, "quiz validation kept failing; giving up");
                return Err(QuizError::Validation { attempts });
            }
            tracing::warn!(attempt = attempts, "quiz failed validation; regenerating");
        }
    }

    async fn questions_for_attempt(
        &self,
        budgeter: &Budgeter<'_>,
        sections: &[SectionText],
        full: &PromptBatch,
        num_questions: usize,
    ) -> Result<Vec<QuestionItem>, QuizError> {
        if full.token_count <= self.config.token_budget {
            tracing::info!(tokens = full.token_count, "content fits the budget as one batch");
            return self.generate_batch(&full.text, num_questions).await;
        }

        match self.config.split_strategy {
            SplitStrategy::Sample => {
                let batch = {
                    let mut rng = self.rng.lock().await;
                    budgeter.sample_batch(sections, &mut *rng)
                };
                tracing::info!(
                    tokens = batch.token_count,
                    "sampled one budget-filling batch"
                );
                self.generate_batch(&batch.text, num_questions).await
            }
            SplitStrategy::Batch => {
                let batches = budgeter.greedy_batches(sections);
                let per_batch = num_questions / batches.len().max(1) + 1;
                tracing::info!(
                    batches = batches.len(),
                    per_batch,
                    "partitioned content into budget-sized batches"
                );

                let mut sets = Vec::with_capacity(batches.len());
                for batch in &batches {
                    sets.push(self.generate_batch(&batch.text, per_batch).await?);
                }

                let mut rng = self.rng.lock().await;
                Ok(interleave_questions(sets, num_questions, &mut *rng))
            }
        }
    }

    async fn generate_batch(
        &self,
        text: &str,
        count: usize,
    ) -> Result<Vec<QuestionItem>, QuizError> {
        self.generator
            .generate(text, count)
            .await
            .map_err(|err| QuizError::Generation(format!("{err:#}")))
    }

    async fn collect_sections(
        &self,
        doc_ref: &str,
        book: &dyn BookDocument,
        selected: &[String],
    ) -> Result<Vec<SectionText>, QuizError> {
        let flattened = flatten_toc(book.toc());
        let resolved = resolve_selection(selected, &flattened);
        tracing::info!(
            selected = selected.len(),
            resolved = resolved.len(),
            "resolved selection against the table of contents"
        );

        let mut sections = Vec::with_capacity(resolved.len());
        for href in &resolved {
            let text = match self
                .store
                .get_section(doc_ref, href)
                .await
                .map_err(store_err)?
            {
                Some(text) => {
                    tracing::info!(href = %href, "section cache hit");
                    text
                }
                None => {
                    tracing::info!(href = %href, "section cache miss; extracting");
                    let section = extract_section(book, href, &flattened);
                    self.store
                        .put_section(doc_ref, href, &section.text)
                        .await
                        .map_err(store_err)?;
                    section.text
                }
            };

            sections.push(SectionText {
                href: href.clone(),
                text,
            });
        }

        Ok(sections)
    }

    async fn document_bytes(&self, doc_ref: &str) -> Result<Vec<u8>, QuizError> {
        if let Some(bytes) = self.store.get_document(doc_ref).await.map_err(store_err)? {
            tracing::info!(doc_ref, "document cache hit");
            return Ok(bytes);
        }

        tracing::info!(doc_ref, "document cache miss; fetching from origin");
        let policy = RetryPolicy::new(&self.config.fetch);
        let bytes = policy
            .fetch_with_retry(self.fetcher.as_ref(), doc_ref)
            .await?;

        self.store
            .put_document(doc_ref, &bytes)
            .await
            .map_err(store_err)?;
        Ok(bytes)
    }
}

fn store_err(err: anyhow::Error) -> QuizError {
    QuizError::Store(format!("{err:#}"))
}
