//! Suggestion requestor
//!
//! Sends the ledger's aggregate attendance to the recommendation service and
//! turns whatever comes back into display text. One request per call: no
//! retries, no batching, no caching.
//!
//! Wire contract (field names are fixed by the service):
//! - Request: `POST /suggest` with `{"subjects": [{"name", "attended", "total", "target_attendance"}]}`
//! - Response: `{"suggestion"?: string}`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::ledger::Subject;

pub mod http;

pub use http::{HttpRecommendationService, ServiceHealth};

/// Shown when the service answers without a suggestion
pub const NO_SUGGESTION: &str = "No suggestion returned";

/// One subject as the service sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectSummary {
    pub name: String,
    pub attended: u32,
    pub total: u32,
    pub target_attendance: u8,
}

impl From<&Subject> for SubjectSummary {
    fn from(subject: &Subject) -> Self {
        Self {
            name: subject.name().to_string(),
            attended: subject.attended(),
            total: subject.total(),
            target_attendance: subject.target_attendance(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestRequest {
    pub subjects: Vec<SubjectSummary>,
}

impl SuggestRequest {
    pub fn from_subjects(subjects: &[Subject]) -> Self {
        Self {
            subjects: subjects.iter().map(SubjectSummary::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl SuggestResponse {
    /// Parse a response body.
    ///
    /// The body must be a JSON object. `suggestion` may be absent or null;
    /// if present it must be a string.
    pub fn parse(body: &str) -> std::result::Result<Self, SuggestError> {
        let value: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| SuggestError::Malformed(format!("body is not JSON: {}", e)))?;

        let object = value
            .as_object()
            .ok_or_else(|| SuggestError::Malformed("body is not a JSON object".to_string()))?;

        let suggestion = match object.get("suggestion") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(SuggestError::Malformed(format!(
                    "suggestion is not a string: {}",
                    other
                )))
            }
        };

        Ok(Self { suggestion })
    }

    /// Suggestion verbatim, or the fallback when there is none
    pub fn into_text(self) -> String {
        match self.suggestion {
            Some(s) if !s.is_empty() => s,
            _ => NO_SUGGESTION.to_string(),
        }
    }
}

/// Recommendation service failure
#[derive(Debug, Error)]
pub enum SuggestError {
    /// Network failure, timeout, unreadable body
    #[error("{0}")]
    Transport(String),

    /// Body was read but is not a valid response
    #[error("{0}")]
    Malformed(String),
}

/// External service that turns attendance data into advice
#[async_trait]
pub trait RecommendationService: Send + Sync {
    async fn suggest(&self, request: &SuggestRequest) -> std::result::Result<SuggestResponse, SuggestError>;
}

/// Where the requestor is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Idle,
    Requesting,
    Succeeded,
    Failed,
}

/// What a UI shows for the suggestion panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionView {
    pub phase: RequestPhase,
    /// Text of the most recently completed request
    pub text: Option<String>,
}

/// Outcome of a single suggestion request
#[derive(Debug)]
pub enum SuggestionOutcome {
    Succeeded(String),
    Failed(Error),
}

impl SuggestionOutcome {
    /// Text to display inline
    pub fn text(&self) -> String {
        match self {
            SuggestionOutcome::Succeeded(text) => text.clone(),
            SuggestionOutcome::Failed(e) => format!("Error calling AI service: {}", e),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SuggestionOutcome::Succeeded(_))
    }
}

pub struct SuggestionRequestor {
    service: Arc<dyn RecommendationService>,
    view: watch::Sender<SuggestionView>,
    in_flight: AtomicUsize,
}

impl SuggestionRequestor {
    pub fn new(service: Arc<dyn RecommendationService>) -> Self {
        let (view, _rx) = watch::channel(SuggestionView {
            phase: RequestPhase::Idle,
            text: None,
        });
        Self {
            service,
            view,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Watch phase transitions and results
    pub fn watch(&self) -> watch::Receiver<SuggestionView> {
        self.view.subscribe()
    }

    pub fn view(&self) -> SuggestionView {
        self.view.borrow().clone()
    }

    /// Ask the service which classes to prioritise.
    ///
    /// Fails fast with `EmptyLedger` when there are no subjects; the service
    /// is not called. Service failures come back as
    /// [`SuggestionOutcome::Failed`], never as `Err`. Concurrent calls each
    /// resolve on their own and the last one to finish owns the view.
    pub async fn request_suggestion(&self, subjects: &[Subject]) -> Result<SuggestionOutcome> {
        if subjects.is_empty() {
            return Err(Error::EmptyLedger);
        }

        let request = SuggestRequest::from_subjects(subjects);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.view.send_modify(|v| v.phase = RequestPhase::Requesting);
        info!("Requesting suggestion for {} subjects", request.subjects.len());

        let outcome = match self.service.suggest(&request).await {
            Ok(response) => {
                if response.suggestion.is_none() {
                    debug!("Service returned no suggestion");
                }
                SuggestionOutcome::Succeeded(response.into_text())
            }
            Err(e) => {
                warn!("Suggestion request failed: {}", e);
                SuggestionOutcome::Failed(e.into())
            }
        };

        let phase = if outcome.is_success() {
            RequestPhase::Succeeded
        } else {
            RequestPhase::Failed
        };
        let text = outcome.text();
        self.view.send_modify(|v| {
            v.phase = phase;
            v.text = Some(text);
        });

        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.view.send_modify(|v| v.phase = RequestPhase::Idle);
        }
        Ok(outcome)
    }
}
