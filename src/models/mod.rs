use base64::{engine::general_purpose, Engine};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;

/// A still frame handed over by a capture source, already JPEG-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

impl CapturedImage {
    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: "image/jpeg",
        }
    }

    /// Accepts either a bare base64 payload or a `data:image/jpeg;base64,...` URL.
    pub fn from_base64(payload: &str) -> Result<Self, base64::DecodeError> {
        let payload = payload.trim();
        let encoded = match payload.split_once(',') {
            Some((prefix, rest)) if prefix.starts_with("data:") => rest,
            _ => payload,
        };
        let bytes = general_purpose::STANDARD.decode(encoded)?;
        Ok(Self::jpeg(bytes))
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyRating {
    Safe,
    Caution,
    Avoid,
}

impl SafetyRating {
    pub const ALL: [SafetyRating; 3] = [
        SafetyRating::Safe,
        SafetyRating::Caution,
        SafetyRating::Avoid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyRating::Safe => "SAFE",
            SafetyRating::Caution => "CAUTION",
            SafetyRating::Avoid => "AVOID",
        }
    }
}

impl std::fmt::Display for SafetyRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sources {
    pub fda: String,
    pub academic: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Additive {
    pub name: String,
    /// E-number style code; blank values from the model are treated as absent.
    #[serde(default, deserialize_with = "blank_as_none", skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub purpose: String,
    pub fda_status: String,
    pub health_risks: Vec<String>,
    pub sources: Sources,
    pub safety_rating: SafetyRating,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    pub summary: String,
    pub additives: Vec<Additive>,
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Idle,
    Analyzing,
    Result,
    Error,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Idle => "IDLE",
            Phase::Analyzing => "ANALYZING",
            Phase::Result => "RESULT",
            Phase::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

/// What the operator is looking at. The response only exists in `Result`
/// and the message only in `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InteractionState {
    #[default]
    Idle,
    Analyzing,
    Result(Arc<AnalysisResponse>),
    Error(String),
}

impl InteractionState {
    pub fn phase(&self) -> Phase {
        match self {
            InteractionState::Idle => Phase::Idle,
            InteractionState::Analyzing => Phase::Analyzing,
            InteractionState::Result(_) => Phase::Result,
            InteractionState::Error(_) => Phase::Error,
        }
    }

    pub fn response(&self) -> Option<&AnalysisResponse> {
        match self {
            InteractionState::Result(response) => Some(response),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            InteractionState::Error(message) => Some(message),
            _ => None,
        }
    }
}
