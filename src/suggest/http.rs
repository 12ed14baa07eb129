//! HTTP client for the recommendation service

use async_trait::async_trait;
use serde::Deserialize;
use std::error::Error as StdError;
use std::time::Duration;
use tracing::{debug, warn};

use super::{RecommendationService, SuggestError, SuggestRequest, SuggestResponse};

/// Health check body returned by `GET /`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
}

impl ServiceHealth {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

pub struct HttpRecommendationService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRecommendationService {
    /// Client for the service at `base_url`.
    ///
    /// With no timeout a hung request waits as long as the transport does.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, SuggestError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| SuggestError::Transport(describe(&e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check the service is up
    pub async fn health(&self) -> Result<ServiceHealth, SuggestError> {
        let response = self
            .client
            .get(self.url("/"))
            .send()
            .await
            .map_err(|e| SuggestError::Transport(describe(&e)))?;

        let body = response
            .text()
            .await
            .map_err(|e| SuggestError::Transport(describe(&e)))?;

        serde_json::from_str(&body)
            .map_err(|e| SuggestError::Malformed(format!("unexpected health response: {}", e)))
    }
}

/// Error message including every source in the chain.
///
/// reqwest hides the cause ("operation timed out", "connection refused")
/// behind a generic top-level message.
fn describe(e: &reqwest::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    if e.is_timeout() {
        format!("timeout: {}", message)
    } else {
        message
    }
}

#[async_trait]
impl RecommendationService for HttpRecommendationService {
    async fn suggest(&self, request: &SuggestRequest) -> Result<SuggestResponse, SuggestError> {
        let response = self
            .client
            .post(self.url("/suggest"))
            .json(request)
            .send()
            .await
            .map_err(|e| SuggestError::Transport(describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Recommendation service answered {}", status);
        }

        let body = response
            .text()
            .await
            .map_err(|e| SuggestError::Transport(describe(&e)))?;
        debug!("Recommendation service body: {} bytes", body.len());

        SuggestResponse::parse(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suggest::SubjectSummary;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> SuggestRequest {
        SuggestRequest {
            subjects: vec![SubjectSummary {
                name: "Math".to_string(),
                attended: 7,
                total: 10,
                target_attendance: 75,
            }],
        }
    }

    #[tokio::test]
    async fn test_posts_snake_case_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/suggest"))
            .and(body_json(serde_json::json!({
                "subjects": [{"name": "Math", "attended": 7, "total": 10, "target_attendance": 75}]
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"suggestion": "Attend Math"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let service = HttpRecommendationService::new(&server.uri(), None).unwrap();
        let response = service.suggest(&request()).await.unwrap();
        assert_eq!(response.suggestion.as_deref(), Some("Attend Math"));
    }

    #[tokio::test]
    async fn test_empty_object_has_no_suggestion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/suggest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let service = HttpRecommendationService::new(&server.uri(), None).unwrap();
        let response = service.suggest(&request()).await.unwrap();
        assert_eq!(response.into_text(), "No suggestion returned");
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/suggest"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
            .mount(&server)
            .await;

        let service = HttpRecommendationService::new(&server.uri(), None).unwrap();
        let err = service.suggest(&request()).await.unwrap_err();
        assert!(matches!(err, SuggestError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/suggest"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"suggestion": "late"}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let service =
            HttpRecommendationService::new(&server.uri(), Some(Duration::from_millis(100))).unwrap();
        let err = service.suggest(&request()).await.unwrap_err();
        match err {
            SuggestError::Transport(msg) => assert!(msg.contains("timeout"), "{}", msg),
            other => panic!("expected transport error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        // Nothing listens on the discard port
        let service = HttpRecommendationService::new("http://127.0.0.1:9", None).unwrap();
        let err = service.suggest(&request()).await.unwrap_err();
        assert!(matches!(err, SuggestError::Transport(_)));
    }

    #[tokio::test]
    async fn test_health() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
            .mount(&server)
            .await;

        let service = HttpRecommendationService::new(&format!("{}/", server.uri()), None).unwrap();
        assert!(service.health().await.unwrap().is_ok());
    }
}
