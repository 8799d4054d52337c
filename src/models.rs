use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One node of the book's table of contents.
///
/// Document order is the pre-order traversal of this tree. Sections do not
/// always carry an href of their own (some books only link their children).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TocNode {
    Section {
        href: Option<String>,
        children: Vec<TocNode>,
    },
    Leaf {
        href: String,
    },
}

/// Splits an href into its resource path and optional `#anchor` suffix.
pub fn split_href(href: &str) -> (&str, Option<&str>) {
    match href.split_once('#') {
        Some((resource, anchor)) => (resource, Some(anchor)),
        None => (href, None),
    }
}

/// Plain text extracted for exactly one href, already wrapped in its
/// `[HREF START]` / `[HREF END]` marker pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionText {
    pub href: String,
    pub text: String,
}

/// One token-budget-respecting unit of text handed to the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptBatch {
    pub text: String,
    pub token_count: usize,
}

/// How to cut content down when it exceeds the token budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Partition everything into budget-sized batches and generate per batch.
    Batch,
    /// Fill a single batch with randomly drawn sections and generate once.
    Sample,
}

/// A single generated question as the model returns it.
///
/// Every field is optional at the deserialization boundary: a model that
/// drops a field produces an incomplete item, which the validation step
/// rejects, rather than a parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionItem {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub correct_answer: Option<Vec<String>>,
    #[serde(default)]
    pub options: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub answer_location: Option<String>,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub question_number: Option<serde_json::Value>,
}

impl QuestionItem {
    /// Whether every required field is present and non-empty.
    pub fn is_complete(&self) -> bool {
        let filled = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());

        filled(&self.question)
            && self
                .correct_answer
                .as_ref()
                .is_some_and(|answers| !answers.is_empty())
            && self
                .options
                .as_ref()
                .is_some_and(|options| !options.is_empty())
            && filled(&self.explanation)
            && filled(&self.answer_location)
            && filled(&self.href)
            && self
                .question_number
                .as_ref()
                .is_some_and(|number| !number.is_null())
    }
}

/// The JSON shape the generator is asked to produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSet {
    pub questions: Vec<QuestionItem>,
}

/// Final pipeline result: the assembled quiz plus provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub questions: Vec<QuestionItem>,
    pub model_used: String,
    pub total_tokens: usize,
}

/// One quiz-generation request against a single document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizRequest {
    pub doc_ref: String,
    pub selected_hrefs: Vec<String>,
    pub num_questions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_item() -> QuestionItem {
        QuestionItem {
            question: Some("What is the capital of France?".to_string()),
            correct_answer: Some(vec!["C".to_string()]),
            options: Some(BTreeMap::from([
                ("A".to_string(), "Zurich".to_string()),
                ("B".to_string(), "Berlin".to_string()),
                ("C".to_string(), "Paris".to_string()),
                ("D".to_string(), "Madrid".to_string()),
            ])),
            explanation: Some("Paris is the French capital.".to_string()),
            answer_location: Some("Paris is the capital of France.".to_string()),
            href: Some("ch01.xhtml".to_string()),
            question_number: Some(serde_json::json!(1)),
        }
    }

    #[test]
    fn split_href_handles_anchors() {
        assert_eq!(split_href("ch01.xhtml"), ("ch01.xhtml", None));
        assert_eq!(
            split_href("ch01.xhtml#section2"),
            ("ch01.xhtml", Some("section2"))
        );
    }

    #[test]
    fn complete_item_passes_field_check() {
        assert!(complete_item().is_complete());
    }

    #[test]
    fn missing_or_empty_fields_fail_field_check() {
        let mut item = complete_item();
        item.explanation = None;
        assert!(!item.is_complete());

        let mut item = complete_item();
        item.question = Some("   ".to_string());
        assert!(!item.is_complete());

        let mut item = complete_item();
        item.correct_answer = Some(vec![]);
        assert!(!item.is_complete());
    }

    #[test]
    fn question_item_survives_missing_json_fields() {
        let item: QuestionItem =
            serde_json::from_str(r#"{"question": "Only a question"}"#).expect("partial item");
        assert!(!item.is_complete());
        assert_eq!(item.question.as_deref(), Some("Only a question"));
    }
}
