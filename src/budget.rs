use rand::Rng;
use tiktoken_rs::{cl100k_base, CoreBPE};
use unicode_segmentation::UnicodeSegmentation;

use crate::extract::{strip_markers, wrap_section};
use crate::models::{PromptBatch, SectionText};

/// Counts tokens the way the target model does.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// BPE token counter matching OpenAI-style chat models.
pub struct TiktokenCounter {
    bpe: CoreBPE,
}

impl TiktokenCounter {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self { bpe: cl100k_base()? })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Cheap whitespace-token counter for tests and rough estimates.
pub struct WhitespaceCounter;

impl TokenCounter for WhitespaceCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Splits text into sentences.
pub trait SentenceSegmenter: Send + Sync {
    fn sentences(&self, text: &str) -> Vec<String>;
}

/// UAX #29 sentence boundaries.
pub struct UnicodeSegmenter;

impl SentenceSegmenter for UnicodeSegmenter {
    fn sentences(&self, text: &str) -> Vec<String> {
        text.unicode_sentences().map(str::to_string).collect()
    }
}

/// Packs extracted sections into prompt batches under a token budget.
pub struct Budgeter<'a> {
    counter: &'a dyn TokenCounter,
    segmenter: &'a dyn SentenceSegmenter,
    budget: usize,
}

impl<'a> Budgeter<'a> {
    pub fn new(
        counter: &'a dyn TokenCounter,
        segmenter: &'a dyn SentenceSegmenter,
        budget: usize,
    ) -> Self {
        Self {
            counter,
            segmenter,
            budget,
        }
    }

    /// All sections concatenated in document order, unconditionally.
    ///
    /// The caller compares the returned token count against the budget to
    /// decide whether this single batch can be used as-is.
    pub fn pass_through(&self, sections: &[SectionText]) -> PromptBatch {
        let text = sections
            .iter()
            .map(|section| section.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let token_count = self.counter.count(&text);

        PromptBatch { text, token_count }
    }

    /// Walks sections in document order, closing a batch whenever the next
    /// section would overflow the budget. A section that alone exceeds the
    /// budget is resplit at sentence level instead of being batched whole.
    pub fn greedy_batches(&self, sections: &[SectionText]) -> Vec<PromptBatch> {
        let mut batches = Vec::new();
        let mut current = String::new();
        let mut current_tokens = 0usize;

        let flush = |current: &mut String, current_tokens: &mut usize, batches: &mut Vec<PromptBatch>| {
            if !current.is_empty() {
                batches.push(PromptBatch {
                    text: std::mem::take(current),
                    token_count: std::mem::take(current_tokens),
                });
            }
        };

        for section in sections {
            let tokens = self.counter.count(&section.text);

            if tokens > self.budget {
                flush(&mut current, &mut current_tokens, &mut batches);
                batches.extend(self.resplit_sentences(section));
                continue;
            }

            if current_tokens + tokens > self.budget {
                flush(&mut current, &mut current_tokens, &mut batches);
            }

            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&section.text);
            current_tokens += tokens;
        }

        flush(&mut current, &mut current_tokens, &mut batches);
        batches
    }

    /// Splits one oversized section into sentence-packed sub-batches, each
    /// re-wrapped with the section's own marker pair. A sentence that alone
    /// exceeds the budget is emitted intact; that is the only place the
    /// ceiling can be crossed, and it is logged.
    fn resplit_sentences(&self, section: &SectionText) -> Vec<PromptBatch> {
        let body = strip_markers(&section.text);
        let overhead = self.counter.count(&wrap_section(&section.href, ""));
        let effective = self.budget.saturating_sub(overhead);

        let mut batches = Vec::new();
        let mut current = String::new();
        let mut current_tokens = 0usize;

        for sentence in self.segmenter.sentences(&body) {
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }
            let tokens = self.counter.count(sentence);

            if current_tokens + tokens > effective && !current.is_empty() {
                batches.push(self.wrap_batch(&section.href, current.trim_end()));
                current.clear();
                current_tokens = 0;
            }

            if tokens > effective {
                tracing::warn!(
                    href = %section.href,
                    tokens,
                    budget = self.budget,
                    "single sentence exceeds the token budget; emitting it intact"
                );
                batches.push(self.wrap_batch(&section.href, sentence));
                continue;
            }

            current.push_str(sentence);
            current.push(' ');
            current_tokens += tokens;
        }

        if !current.trim().is_empty() {
            batches.push(self.wrap_batch(&section.href, current.trim_end()));
        }

        batches
    }

    fn wrap_batch(&self, href: &str, body: &str) -> PromptBatch {
        let text = wrap_section(href, body);
        let token_count = self.counter.count(&text);

        PromptBatch { text, token_count }
    }

    /// Fills a single batch by drawing sections uniformly at random from the
    /// remaining pool, keeping only draws that fit the budget, until nothing
    /// left fits. Consumed sections leave the pool, so no section repeats.
    pub fn sample_batch<R: Rng + ?Sized>(
        &self,
        sections: &[SectionText],
        rng: &mut R,
    ) -> PromptBatch {
        let mut pool: Vec<(usize, &SectionText)> = sections
            .iter()
            .map(|section| (self.counter.count(&section.text), section))
            .collect();

        let mut text = String::new();
        let mut total = 0usize;

        loop {
            let any_fits = pool
                .iter()
                .any(|(tokens, _)| total + tokens <= self.budget);
            if !any_fits {
                break;
            }

            let index = rng.gen_range(0..pool.len());
            let (tokens, section) = pool[index];
            if total + tokens > self.budget {
                continue;
            }

            pool.remove(index);
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(&section.text);
            total += tokens;
        }

        PromptBatch {
            text,
            token_count: total,
        }
    }
}
