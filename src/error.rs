use thiserror::Error;

/// Failure taxonomy for the quiz pipeline.
///
/// Extraction-level problems (a missing resource, an anchor that never
/// appears) intentionally do not show up here: they degrade to empty
/// sections so that a partially corrupt book still yields a quiz from
/// whatever content could be read.
#[derive(Debug, Error)]
pub enum QuizError {
    /// The document origin stayed unreachable through the whole retry budget.
    #[error("could not fetch document {url} after {attempts} attempts: {reason}")]
    TransientFetch {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// The downloaded bytes are not a parseable EPUB container.
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// The generation backend produced no usable output after its own
    /// internal retries.
    #[error("question generation failed: {0}")]
    Generation(String),

    /// The assembled quiz failed the field/count check even after the
    /// configured number of regeneration attempts.
    #[error("quiz failed validation after {attempts} attempts")]
    Validation { attempts: u32 },

    /// The content store could not be read or written.
    #[error("content store error: {0}")]
    Store(String),
}
