//! Cohere chat client for clip titles.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TitleError, TitleResult};
use crate::generator::{TitleGenerator, MAX_TITLE_CHARS};

/// Chat endpoint (v2 API).
pub const DEFAULT_COHERE_ENDPOINT: &str = "https://api.cohere.com/v2/chat";
/// Default chat model.
pub const DEFAULT_TITLE_MODEL: &str = "command-a-03-2025";

const TEMPERATURE: f32 = 0.8;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Cohere chat request.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// Cohere chat response.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Vec<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    text: Option<String>,
}

/// Title generator backed by the Cohere chat API.
#[derive(Debug, Clone)]
pub struct CohereTitleGenerator {
    api_key: String,
    model: String,
    endpoint: String,
    show_context: Option<String>,
    client: Client,
}

impl CohereTitleGenerator {
    /// Create a client for the public endpoint.
    pub fn new(api_key: impl Into<String>) -> TitleResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            api_key: api_key.into(),
            model: DEFAULT_TITLE_MODEL.to_string(),
            endpoint: DEFAULT_COHERE_ENDPOINT.to_string(),
            show_context: None,
            client,
        })
    }

    /// Use a different chat model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point at a different endpoint (proxies, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Background about the show, added to the system prompt.
    pub fn with_show_context(mut self, context: impl Into<String>) -> Self {
        self.show_context = Some(context.into());
        self
    }

    fn system_prompt(&self) -> String {
        let mut prompt = String::from(
            "You write magnetic, honest titles for short clips cut from a podcast episode.\n",
        );
        if let Some(context) = &self.show_context {
            prompt.push_str(&format!("About the show: {}\n", context));
        }
        prompt.push_str(&format!(
            "\nFormat rules:\n\
             1. Return only the title text, with no explanation or labels.\n\
             2. At most {} characters.\n\
             3. Write in the language of the transcript.\n\
             4. Do not use quotes, hash signs or a final period.\n\
             5. Stay faithful to what is actually said in the clip.",
            MAX_TITLE_CHARS
        ));
        prompt
    }

    fn user_prompt(fragment: &str, original_title: &str) -> String {
        format!(
            "Original episode title: \"{}\"\nClip transcript: \"{}\"\n\nWrite a high impact title for this clip:",
            original_title, fragment
        )
    }
}

#[async_trait]
impl TitleGenerator for CohereTitleGenerator {
    async fn generate(&self, fragment: &str, original_title: &str) -> TitleResult<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: self.system_prompt(),
                },
                ChatMessage {
                    role: "user",
                    content: Self::user_prompt(fragment, original_title),
                },
            ],
            temperature: TEMPERATURE,
        };

        debug!(model = %self.model, fragment_chars = fragment.len(), "Requesting clip title");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TitleError::Status { status, body });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| TitleError::Malformed(e.to_string()))?;

        chat.message
            .and_then(|m| m.content.into_iter().find_map(|c| c.text))
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| TitleError::Malformed("no text in response".to_string()))
    }

    fn name(&self) -> &'static str {
        "cohere"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::suggest_title;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn generator(server: &MockServer) -> CohereTitleGenerator {
        CohereTitleGenerator::new("test-key")
            .unwrap()
            .with_endpoint(format!("{}/v2/chat", server.uri()))
    }

    #[tokio::test]
    async fn test_generate_reads_first_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/chat"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": DEFAULT_TITLE_MODEL,
                "temperature": 0.8
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "abc",
                "message": {
                    "role": "assistant",
                    "content": [{"type": "text", "text": "  He said WHAT?  "}]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let title = generator(&server).await.generate("[10] words", "Episode 1").await.unwrap();
        assert_eq!(title, "He said WHAT?");
    }

    #[tokio::test]
    async fn test_server_error_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let gen = generator(&server).await;
        assert!(matches!(
            gen.generate("x", "Episode 1").await,
            Err(TitleError::Status { status: 500, .. })
        ));
        assert_eq!(suggest_title(&gen, "x", "Episode 1").await, "Episode 1");
    }

    #[tokio::test]
    async fn test_malformed_body_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"message": {"content": []}})))
            .mount(&server)
            .await;

        let gen = generator(&server).await;
        assert!(matches!(gen.generate("x", "Ep").await, Err(TitleError::Malformed(_))));
        assert_eq!(suggest_title(&gen, "x", "Ep").await, "Ep");
    }

    #[test]
    fn test_prompts() {
        let gen = CohereTitleGenerator::new("k").unwrap().with_show_context("A chaotic comedy podcast.");
        let system = gen.system_prompt();
        assert!(system.contains("A chaotic comedy podcast."));
        assert!(system.contains("At most 60 characters"));

        let user = CohereTitleGenerator::user_prompt("[5] hello", "Ep 9");
        assert!(user.contains("\"Ep 9\""));
        assert!(user.contains("[5] hello"));
    }
}
