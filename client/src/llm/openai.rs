use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use regent_common::{ChatCompletionRequest, ChatCompletionResponse};

use crate::config::CompletionConfig;

use super::{CompletionClient, CompletionError};

/// Client for an OpenAI-compatible chat completion API.
pub struct OpenAiClient {
    http_client: Client,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(config: &CompletionConfig) -> Result<Self, CompletionError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CompletionError::RequestFailed(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(
        &self,
        credential: &str,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);

        tracing::debug!(
            "Sending completion request to {} ({} messages)",
            url,
            request.messages.len()
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(credential)
            .json(request)
            .send()
            .await
            .map_err(|e| CompletionError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Completion API returned {}", status);
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))
    }

    async fn validate_credential(&self, credential: &str) -> Result<bool, CompletionError> {
        let url = format!("{}/models", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(credential)
            .send()
            .await
            .map_err(|e| CompletionError::RequestFailed(e.to_string()))?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(CompletionError::Api {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::mock_openai::{completion_json, error_json};
    use regent_common::ChatMessage;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OpenAiClient {
        let config = CompletionConfig {
            base_url: format!("{}/", server.uri()),
            ..CompletionConfig::default()
        };
        OpenAiClient::new(&config).unwrap()
    }

    fn request() -> ChatCompletionRequest {
        ChatCompletionRequest {
            messages: vec![ChatMessage::system("Be brief."), ChatMessage::user("Hello")],
            model: Some("gpt-3.5-turbo".to_string()),
            temperature: Some(0.7),
            max_tokens: Some(1000),
        }
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = CompletionConfig {
            base_url: "https://api.example.com/v1/".to_string(),
            ..CompletionConfig::default()
        };
        let client = OpenAiClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "https://api.example.com/v1");
    }

    #[tokio::test]
    async fn test_complete_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-3.5-turbo",
                "max_tokens": 1000,
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "Hello"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_json("Hi there")))
            .expect(1)
            .mount(&server)
            .await;

        let response = client_for(&server).complete("sk-test", &request()).await.unwrap();
        assert_eq!(response.first_content(), Some("Hi there"));
    }

    #[tokio::test]
    async fn test_complete_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(error_json("Incorrect API key")))
            .mount(&server)
            .await;

        let err = client_for(&server).complete("sk-bad", &request()).await.unwrap_err();
        match err {
            CompletionError::Api { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("Incorrect API key"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_complete_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client_for(&server).complete("sk-test", &request()).await.unwrap_err();
        assert!(matches!(err, CompletionError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_complete_connection_refused() {
        let config = CompletionConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..CompletionConfig::default()
        };
        let client = OpenAiClient::new(&config).unwrap();

        let err = client.complete("sk-test", &request()).await.unwrap_err();
        assert!(matches!(err, CompletionError::RequestFailed(_)));
    }

    #[tokio::test]
    async fn test_validate_credential() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(header("authorization", "Bearer sk-good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(header("authorization", "Bearer sk-bad"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.validate_credential("sk-good").await.unwrap());
        assert!(!client.validate_credential("sk-bad").await.unwrap());
    }

    #[tokio::test]
    async fn test_validate_credential_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).validate_credential("sk").await.unwrap_err();
        assert!(matches!(err, CompletionError::Api { status: 503, .. }));
    }
}
