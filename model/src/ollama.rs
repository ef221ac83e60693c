use crate::config::OllamaConfig;
use crate::provider::{ModelError, ModelProvider, ModelResult};
use crate::types::{
    ChatMessage, ChatRequest, ChatResponse, Choice, FinishReason, MessageRole, ModelInfo, Usage,
};
use async_trait::async_trait;
use ollama_rs::Ollama;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error, info};

#[derive(Serialize)]
struct OllamaApiRequest {
    model: String,
    messages: Vec<OllamaApiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaApiOptions>,
}

#[derive(Serialize)]
struct OllamaApiMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OllamaApiOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaApiResponse {
    message: OllamaApiResponseMessage,
    #[serde(default)]
    done_reason: Option<String>,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

#[derive(Deserialize)]
struct OllamaApiResponseMessage {
    #[allow(dead_code)]
    role: String,
    content: String,
}

pub struct OllamaProvider {
    client: Ollama,
    http_client: reqwest::Client,
    base_url: String,
    config: OllamaConfig,
}

impl OllamaProvider {
    pub fn new(config: OllamaConfig) -> ModelResult<Self> {
        config
            .validate()
            .map_err(|msg| ModelError::InvalidConfig { message: msg })?;

        let base_url = config
            .api_root()
            .map_err(|message| ModelError::InvalidConfig { message })?;

        let client =
            Ollama::try_new(base_url.as_str()).map_err(|e| ModelError::InvalidConfig {
                message: format!("Invalid Ollama URL {}: {}", base_url, e),
            })?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ModelError::Unknown {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            http_client,
            base_url,
            config,
        })
    }

    pub fn with_default_config() -> ModelResult<Self> {
        Self::new(OllamaConfig::default())
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn convert_message_to_api(msg: &ChatMessage) -> OllamaApiMessage {
        let role = match &msg.role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };

        OllamaApiMessage {
            role: role.to_string(),
            content: msg.content.clone().unwrap_or_default(),
        }
    }

    /// Request-level sampling settings win over the provider defaults.
    fn build_request_body(&self, request: &ChatRequest) -> OllamaApiRequest {
        let messages = request
            .messages
            .iter()
            .map(Self::convert_message_to_api)
            .collect();

        let sampling = &self.config.sampling;
        let options = OllamaApiOptions {
            temperature: request.temperature.or(Some(sampling.temperature)),
            top_p: request.top_p.or(Some(sampling.top_p)),
            num_predict: request.max_tokens.or(sampling.max_tokens),
        };

        OllamaApiRequest {
            model: request.model.clone(),
            messages,
            stream: false,
            options: Some(options),
        }
    }

    fn parse_response(response: OllamaApiResponse) -> ChatResponse {
        let content = if response.message.content.is_empty() {
            None
        } else {
            Some(response.message.content)
        };

        let finish_reason = match response.done_reason.as_deref() {
            Some("length") => Some(FinishReason::Length),
            _ => Some(FinishReason::Stop),
        };

        let message = ChatMessage {
            role: MessageRole::Assistant,
            content,
        };

        let usage = Some(Usage {
            prompt_tokens: response.prompt_eval_count.unwrap_or(0) as u32,
            completion_tokens: response.eval_count.unwrap_or(0) as u32,
            total_tokens: (response.prompt_eval_count.unwrap_or(0)
                + response.eval_count.unwrap_or(0)) as u32,
        });

        ChatResponse {
            choices: vec![Choice {
                message,
                finish_reason,
            }],
            usage,
        }
    }

    fn map_transport_error(e: reqwest::Error) -> ModelError {
        if e.is_timeout() {
            ModelError::ServiceUnavailable {
                message: "Request timeout".to_string(),
            }
        } else if e.is_connect() {
            ModelError::ServiceUnavailable {
                message: "Cannot connect to Ollama service".to_string(),
            }
        } else {
            ModelError::Network(e)
        }
    }

    fn map_status(status: reqwest::StatusCode, body: String, model: &str) -> ModelError {
        match status.as_u16() {
            401 | 403 => ModelError::Authentication,
            404 => ModelError::ModelNotFound {
                model: model.to_string(),
            },
            429 => ModelError::RateLimit,
            503 => ModelError::ServiceUnavailable {
                message: "Model is loading. Please try again in a few seconds.".to_string(),
            },
            _ => ModelError::Unknown {
                message: format!("Ollama API returned {}: {}", status, body),
            },
        }
    }

    fn handle_ollama_error(err: ollama_rs::error::OllamaError) -> ModelError {
        match err {
            ollama_rs::error::OllamaError::ReqwestError(e) => {
                if e.is_timeout() {
                    ModelError::ServiceUnavailable {
                        message: "Request timeout".to_string(),
                    }
                } else if e.is_connect() {
                    ModelError::ServiceUnavailable {
                        message: "Cannot connect to Ollama service".to_string(),
                    }
                } else {
                    ModelError::Unknown {
                        message: format!("Network error: {}", e),
                    }
                }
            }
            ollama_rs::error::OllamaError::JsonError(e) => ModelError::Serialization(e),
            _ => ModelError::Unknown {
                message: format!("Ollama error: {}", err),
            },
        }
    }
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    async fn chat(&self, request: ChatRequest) -> ModelResult<ChatResponse> {
        debug!("Starting chat request with model: {}", request.model);
        let started = Instant::now();

        let body = self.build_request_body(&request);
        let url = format!("{}api/chat", self.base_url);

        let http_response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let err = Self::map_transport_error(e);
                error!(
                    "Chat request failed after {}ms: {}",
                    started.elapsed().as_millis(),
                    err
                );
                err
            })?;

        let status = http_response.status();
        if !status.is_success() {
            let error_text = http_response.text().await.unwrap_or_default();
            let err = Self::map_status(status, error_text, &request.model);
            error!(
                "Chat request failed after {}ms: {}",
                started.elapsed().as_millis(),
                err
            );
            return Err(err);
        }

        let api_response: OllamaApiResponse =
            http_response.json().await.map_err(ModelError::Network)?;

        let chat_response = Self::parse_response(api_response);

        info!(
            "Chat request completed in {}ms ({} chars)",
            started.elapsed().as_millis(),
            chat_response.first_content().map_or(0, str::len)
        );

        Ok(chat_response)
    }

    async fn list_models(&self) -> ModelResult<Vec<ModelInfo>> {
        debug!("Listing available models");

        let models = self
            .client
            .list_local_models()
            .await
            .map_err(Self::handle_ollama_error)?;

        let model_infos: Vec<ModelInfo> = models
            .into_iter()
            .map(|model| ModelInfo {
                name: model.name,
                size: Some(model.size),
                digest: None,
                modified_at: Some(model.modified_at),
            })
            .collect();

        info!("Retrieved {} models", model_infos.len());
        Ok(model_infos)
    }

    async fn health_check(&self) -> ModelResult<()> {
        debug!("Performing health check");

        match self.list_models().await {
            Ok(_) => {
                info!("Health check passed");
                Ok(())
            }
            Err(e) => {
                error!("Health check failed: {}", e);
                Err(e)
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Sampling;

    fn response(content: &str, done_reason: Option<&str>) -> OllamaApiResponse {
        OllamaApiResponse {
            message: OllamaApiResponseMessage {
                role: "assistant".to_string(),
                content: content.to_string(),
            },
            done_reason: done_reason.map(str::to_string),
            prompt_eval_count: Some(10),
            eval_count: Some(5),
        }
    }

    #[test]
    fn test_parse_chat_response() {
        let parsed = OllamaProvider::parse_response(response("Hello! How can I help?", None));
        assert_eq!(parsed.choices.len(), 1);
        assert_eq!(parsed.first_content(), Some("Hello! How can I help?"));
        assert!(matches!(
            parsed.choices[0].finish_reason,
            Some(FinishReason::Stop)
        ));

        let usage = parsed.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 5);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn test_parse_empty_and_truncated_response() {
        let parsed = OllamaProvider::parse_response(response("", Some("stop")));
        assert!(parsed.first_content().is_none());

        let truncated = OllamaProvider::parse_response(response("The answer is", Some("length")));
        assert!(matches!(
            truncated.choices[0].finish_reason,
            Some(FinishReason::Length)
        ));
    }

    #[test]
    fn test_build_chat_request_body() {
        let provider = OllamaProvider::with_default_config().unwrap();
        let request = ChatRequest::new(
            "llama3.1:8b",
            vec![
                ChatMessage::system("You are an English examiner"),
                ChatMessage::user("Hello"),
            ],
        )
        .with_temperature(0.2)
        .with_max_tokens(100);

        let body = provider.build_request_body(&request);

        assert_eq!(body.model, "llama3.1:8b");
        assert!(!body.stream);
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].role, "system");
        assert_eq!(body.messages[0].content, "You are an English examiner");
        assert_eq!(body.messages[1].role, "user");
        assert_eq!(body.messages[1].content, "Hello");

        let options = body.options.unwrap();
        assert_eq!(options.temperature, Some(0.2));
        assert_eq!(options.top_p, Some(0.9));
        assert_eq!(options.num_predict, Some(100));
    }

    #[test]
    fn test_build_request_body_uses_config_defaults() {
        let sampling = Sampling {
            temperature: 0.3,
            ..Sampling::default()
        };
        let provider =
            OllamaProvider::new(OllamaConfig::default().with_sampling(sampling)).unwrap();
        let request = ChatRequest::prompt("llama3.1:8b", "Hello");
        let options = provider.build_request_body(&request).options.unwrap();
        assert_eq!(options.temperature, Some(0.3));
        assert_eq!(options.num_predict, Some(250));
    }

    #[test]
    fn test_status_mapping() {
        use reqwest::StatusCode;

        assert!(matches!(
            OllamaProvider::map_status(StatusCode::NOT_FOUND, String::new(), "missing"),
            ModelError::ModelNotFound { model } if model == "missing"
        ));
        assert!(matches!(
            OllamaProvider::map_status(StatusCode::TOO_MANY_REQUESTS, String::new(), "m"),
            ModelError::RateLimit
        ));
        assert!(matches!(
            OllamaProvider::map_status(StatusCode::SERVICE_UNAVAILABLE, String::new(), "m"),
            ModelError::ServiceUnavailable { .. }
        ));
        assert!(matches!(
            OllamaProvider::map_status(StatusCode::UNAUTHORIZED, String::new(), "m"),
            ModelError::Authentication
        ));
    }

    #[tokio::test]
    async fn test_provider_creation() {
        let config = OllamaConfig::default();
        let provider = OllamaProvider::new(config);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().provider_name(), "ollama");
    }

    #[test]
    fn test_provider_rejects_invalid_config() {
        let config = OllamaConfig::default().with_base_url("localhost");
        assert!(matches!(
            OllamaProvider::new(config),
            Err(ModelError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_provider_creation_url_normalization() {
        let config = OllamaConfig::default().with_base_url("http://localhost:11434/v1");
        let provider = OllamaProvider::new(config).unwrap();
        assert_eq!(provider.base_url, "http://localhost:11434/");

        let config = OllamaConfig::default().with_base_url("http://localhost:11434");
        let provider = OllamaProvider::new(config).unwrap();
        assert_eq!(provider.base_url, "http://localhost:11434/");
    }

    #[test]
    fn test_handle_ollama_error_json_error() {
        let json_err = serde_json::from_str::<i32>("invalid").unwrap_err();
        let ollama_err = ollama_rs::error::OllamaError::JsonError(json_err);
        let result = OllamaProvider::handle_ollama_error(ollama_err);
        assert!(matches!(result, ModelError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_chat_round_trip_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(
                r#"{"message":{"role":"assistant","content":"{\"level\":\"B2\",\"explanation\":\"ok\"}"},"done":true,"done_reason":"stop","prompt_eval_count":12,"eval_count":8}"#,
            )
            .create_async()
            .await;

        let config = OllamaConfig::default().with_base_url(server.url());
        let provider = OllamaProvider::new(config).unwrap();
        let response = provider
            .chat(ChatRequest::prompt("test-model", "hi"))
            .await
            .unwrap();
        assert_eq!(
            response.first_content(),
            Some(r#"{"level":"B2","explanation":"ok"}"#)
        );
        assert_eq!(response.usage.unwrap().total_tokens, 20);
    }

    const TAGS_BODY: &str = r#"{"models":[{"name":"qwen3:0.6b","modified_at":"2024-01-01T00:00:00Z","size":523000000},{"name":"llama3.1:8b","modified_at":"2024-02-01T00:00:00Z","size":4920000000}]}"#;

    #[tokio::test]
    async fn test_list_models_uses_configured_port() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(TAGS_BODY)
            .create_async()
            .await;

        let config = OllamaConfig::default().with_base_url(server.url());
        let provider = OllamaProvider::new(config).unwrap();
        let models = provider.list_models().await.unwrap();

        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "qwen3:0.6b");
        assert_eq!(models[0].size, Some(523000000));
        assert_eq!(models[1].name, "llama3.1:8b");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_health_check_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(TAGS_BODY)
            .create_async()
            .await;

        let config = OllamaConfig::default().with_base_url(format!("{}/v1", server.url()));
        let provider = OllamaProvider::new(config).unwrap();
        assert!(provider.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_health_check_fails_on_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/tags")
            .with_status(500)
            .with_body("Internal Server Error")
            .create_async()
            .await;

        let config = OllamaConfig::default().with_base_url(server.url());
        let provider = OllamaProvider::new(config).unwrap();
        assert!(provider.health_check().await.is_err());
    }

    #[tokio::test]
    async fn test_list_models_reports_unreachable_server() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let config = OllamaConfig::default().with_base_url(format!("http://127.0.0.1:{}", port));
        let provider = OllamaProvider::new(config).unwrap();
        let result = provider.list_models().await;
        assert!(matches!(
            result,
            Err(ModelError::ServiceUnavailable { message }) if message.contains("connect")
        ));
    }

    #[tokio::test]
    async fn test_chat_returns_error_on_non_success_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/chat")
            .with_status(500)
            .with_body("Internal Server Error")
            .create_async()
            .await;

        let config = OllamaConfig::default().with_base_url(server.url());
        let provider = OllamaProvider::new(config).unwrap();
        let request = ChatRequest::prompt("test-model", "hi");
        let result = provider.chat(request).await;
        assert!(matches!(result, Err(ModelError::Unknown { .. })));
    }

    #[tokio::test]
    async fn test_chat_returns_error_on_invalid_json() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body("not valid json")
            .create_async()
            .await;

        let config = OllamaConfig::default().with_base_url(server.url());
        let provider = OllamaProvider::new(config).unwrap();
        let request = ChatRequest::prompt("test-model", "hi");
        let result = provider.chat(request).await;
        assert!(matches!(result, Err(ModelError::Network(_))));
    }
}
