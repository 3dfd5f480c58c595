use crate::config::Config;
use crate::error::{Result, SplitError};
use crate::split::ClassificationDirective;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use ureq::{Agent, AgentBuilder};

const SYSTEM_PROMPT: &str =
    "You sort songs into playlists. Answer with a single JSON object and nothing else.";

/// Turns an encoded corpus into the classifier's raw text answer.
#[cfg_attr(test, mockall::automock)]
pub trait Classifier: Send + Sync {
    /// One synchronous attempt; an empty answer is an error.
    fn classify(&self, corpus: &str, directive: &ClassificationDirective) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct Instruction<'a> {
    task: &'a str,
    requirements: String,
    num_playlists: usize,
    output_format: serde_json::Value,
    songs: &'a str,
}

/// OpenAI chat-completions classifier
pub struct OpenAiClassifier {
    agent: Agent,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiClassifier {
    pub fn new(config: &Config) -> Self {
        let agent = AgentBuilder::new()
            .timeout_connect(config.http_timeout)
            .timeout_read(config.classify_timeout)
            .timeout_write(config.http_timeout)
            .build();

        Self {
            agent,
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
            temperature: config.openai_temperature,
        }
    }
}

impl Classifier for OpenAiClassifier {
    fn classify(&self, corpus: &str, directive: &ClassificationDirective) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(corpus, directive)?,
                },
            ],
            temperature: self.temperature,
        };

        info!(
            "Requesting {} groups from {} for {} tracks",
            directive.group_count,
            self.model,
            corpus.lines().count()
        );

        let response = self
            .agent
            .post(&format!("{}/chat/completions", self.base_url))
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(&request)
            .map_err(|e| match SplitError::from(e) {
                SplitError::Upstream { status, body } => {
                    SplitError::Classification(format!("HTTP {status}: {body}"))
                }
                other => SplitError::Classification(other.to_string()),
            })?;

        let body: ChatResponse = response
            .into_json()
            .map_err(|e| SplitError::Classification(format!("Unreadable response: {e}")))?;
        content_of(body)
    }
}

fn content_of(response: ChatResponse) -> Result<String> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default();

    if content.trim().is_empty() {
        return Err(SplitError::Classification(
            "empty response from classifier".to_string(),
        ));
    }
    debug!("Classifier returned {} characters", content.len());
    Ok(content)
}

/// Build the user message: a JSON instruction object embedding the corpus
pub fn build_prompt(corpus: &str, directive: &ClassificationDirective) -> Result<String> {
    let track_count = corpus.lines().count();
    let instruction = Instruction {
        task: &directive.style,
        requirements: format!(
            "Create exactly {} playlists. Each song line is `{{index: name, artist, ...}}`. \
             Refer to songs only by their index. Every one of the {} songs must appear in \
             exactly one playlist's song_ids.",
            directive.group_count, track_count
        ),
        num_playlists: directive.group_count,
        output_format: serde_json::json!({
            "playlists": [
                {
                    "id": "p1",
                    "name": "Example Name",
                    "description": "Example description",
                    "song_ids": [0, 1, 2]
                }
            ]
        }),
        songs: corpus,
    };

    let body = serde_json::to_string(&instruction)
        .map_err(|e| SplitError::Classification(format!("Failed to build prompt: {e}")))?;
    Ok(format!("Here's your instruction: {body}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directive() -> ClassificationDirective {
        ClassificationDirective {
            group_count: 3,
            style: "Split by mood".to_string(),
        }
    }

    #[test]
    fn test_prompt_embeds_corpus_and_counts() {
        let corpus = "{0: Song A, Artist}\n{1: Song B, Artist}";
        let prompt = build_prompt(corpus, &directive()).unwrap();

        let json = prompt.trim_start_matches("Here's your instruction: ");
        let value: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(value["num_playlists"], 3);
        assert_eq!(value["task"], "Split by mood");
        assert_eq!(value["songs"], corpus);
        assert!(value["requirements"].as_str().unwrap().contains("2 songs"));
    }

    #[test]
    fn test_content_extracted_from_first_choice() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "{\"playlists\": []}"}}]}"#,
        )
        .unwrap();
        assert_eq!(content_of(response).unwrap(), "{\"playlists\": []}");
    }

    #[test]
    fn test_empty_or_missing_content_is_an_error() {
        let empty: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": "  "}}]}"#).unwrap();
        assert!(matches!(
            content_of(empty),
            Err(SplitError::Classification(_))
        ));

        let none: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(content_of(none), Err(SplitError::Classification(_))));
    }
}
