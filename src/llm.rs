use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::models::{QuestionItem, QuestionSet};

/// Produces quiz questions for one batch of text.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    fn model_id(&self) -> &str;

    async fn generate(&self, text: &str, num_questions: usize) -> Result<Vec<QuestionItem>>;
}

/// OpenAI-compatible chat-completions backend.
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    options_per_question: usize,
    max_invalid_attempts: u32,
}

impl OpenAiClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.generation.api_base_url.clone(),
            api_key: config.generation.api_key.clone(),
            model: config.generation.model.clone(),
            options_per_question: config.generation.options_per_question,
            max_invalid_attempts: config.generation.max_invalid_attempts.max(1),
        }
    }

    async fn chat_json(&self, prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct ResponseFormat<'a> {
            #[serde(rename = "type")]
            kind: &'a str,
        }

        #[derive(Serialize)]
        struct ChatReq<'a> {
            model: &'a str,
            messages: Vec<Message<'a>>,
            response_format: ResponseFormat<'a>,
        }

        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: String,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }

        #[derive(Deserialize)]
        struct ChatResp {
            choices: Vec<Choice>,
        }

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&ChatReq {
                model: &self.model,
                messages: vec![
                    Message {
                        role: "system",
                        content: "You are a helpful assistant designed to output JSON.",
                    },
                    Message {
                        role: "user",
                        content: prompt,
                    },
                ],
                response_format: ResponseFormat { kind: "json_object" },
            })
            .send()
            .await
            .context("failed to call chat completions endpoint")?
            .error_for_status()
            .context("chat completions returned non-success status")?
            .json::<ChatResp>()
            .await
            .context("failed to decode chat completions response")?;

        let content = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .context("chat completions returned no choices")?;

        Ok(content)
    }
}

#[async_trait]
impl QuestionGenerator for OpenAiClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, text: &str, num_questions: usize) -> Result<Vec<QuestionItem>> {
        let prompt = build_question_prompt(text, num_questions, self.options_per_question);

        let mut last_error = String::new();
        for attempt in 1..=self.max_invalid_attempts {
            let content = match self.chat_json(&prompt).await {
                Ok(content) => content,
                Err(err) => {
                    tracing::warn!(attempt, error = %format!("{err:#}"), "generation request failed");
                    last_error = format!("{err:#}");
                    continue;
                }
            };

            match serde_json::from_str::<QuestionSet>(strip_code_fences(&content)) {
                Ok(set) => return Ok(set.questions),
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "model output was not valid quiz JSON");
                    last_error = err.to_string();
                }
            }
        }

        anyhow::bail!(
            "no usable quiz output after {} attempts: {last_error}",
            self.max_invalid_attempts
        )
    }
}

/// Some models wrap JSON answers in markdown fences despite the JSON
/// response format; peel those off before parsing.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    inner
        .trim_start_matches("json")
        .trim_start_matches("JSON")
        .trim_end_matches("```")
        .trim()
}

fn build_question_prompt(text: &str, num_questions: usize, options_per_question: usize) -> String {
    format!(
        r#"Text:
----
{}
----

Based on the text above, generate {num_questions} meaningful multiple-choice questions with
{options_per_question} answer choices each, ensuring one correct answer. Follow the principles of
constructing multiple-choice items in education. Do not repeat options. Pretend that the user will
not have access to the text when answering the questions, so the questions should be self-contained.

Format the output as JSON and follow the template below.

Output Template:
{{
    "questions": [
        {{
            "question": "[insert plausible question based on the text]",
            "correct_answer": ["A"],
            "options": {{
                "A": "insert correct plausible option",
                "B": "insert plausible option",
                "C": "insert plausible option",
                "D": "insert plausible option"
            }},
            "explanation": "[helps the user understand why the other options are incorrect]",
            "answer_location": "[word for word, (part of) the sentence where the answer is found in the text]",
            "href": "[the href the answer is found in; boundaries in the text are denoted by HREF START and HREF END]",
            "question_number": "[insert question number as integer]"
        }}
    ]
}}"#,
        text.trim()
    )
}
