use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use super::LabelAnalyzer;
use crate::config::AnalysisConfig;
use crate::models::{AnalysisResponse, CapturedImage, SafetyRating};

/// The only text an operator ever sees for a failed analysis.
pub const ANALYSIS_FAILED_MESSAGE: &str =
    "No se pudo analizar la imagen. Asegúrate de que la etiqueta sea legible.";

const SYSTEM_INSTRUCTION: &str = "Eres un experto científico de alimentos especializado en aditivos y normativas de la FDA.\n\
Tu tarea es identificar aditivos alimentarios de las etiquetas en la imagen proporcionada.\n\
Para cada aditivo identificado, proporciona:\n\
1. Nombre del aditivo.\n\
2. Código E (si aplica).\n\
3. Propósito (ej. conservante, colorante).\n\
4. Estatus según la FDA (GRAS, prohibido, regulado).\n\
5. Riesgos potenciales para la salud, citando fuentes de la FDA y tesis académicas o estudios científicos.\n\
6. Calificación de seguridad: SAFE (seguro), CAUTION (precaución), AVOID (evitar).\n\
\n\
Responde ÚNICAMENTE en formato JSON con la estructura definida, sin texto adicional.";

const USER_PROMPT: &str = "Analiza esta etiqueta de ingredientes e identifica todos los aditivos alimentarios. \
Proporciona detalles sobre su seguridad basándote en la FDA y estudios académicos.";

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("request to inference service failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("inference service error ({status}): {body}")]
    Service { status: u16, body: String },
    #[error("inference service returned no text")]
    EmptyReply,
    #[error("reply is not valid JSON: {0}")]
    MalformedJson(serde_json::Error),
    #[error("reply does not match the response schema: {0}")]
    SchemaViolation(serde_json::Error),
}

impl AnalysisError {
    pub fn user_message(&self) -> &'static str {
        ANALYSIS_FAILED_MESSAGE
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
    Other(Value),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

/// Output shape declared to the model. Mirrors `AnalysisResponse`.
pub fn response_schema() -> Value {
    let ratings: Vec<&str> = SafetyRating::ALL.iter().map(|r| r.as_str()).collect();
    json!({
        "type": "OBJECT",
        "properties": {
            "productName": { "type": "STRING" },
            "summary": { "type": "STRING" },
            "additives": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": { "type": "STRING" },
                        "code": { "type": "STRING" },
                        "purpose": { "type": "STRING" },
                        "fdaStatus": { "type": "STRING" },
                        "healthRisks": {
                            "type": "ARRAY",
                            "items": { "type": "STRING" }
                        },
                        "sources": {
                            "type": "OBJECT",
                            "properties": {
                                "fda": { "type": "STRING" },
                                "academic": { "type": "STRING" }
                            },
                            "required": ["fda", "academic"]
                        },
                        "safetyRating": {
                            "type": "STRING",
                            "enum": ratings,
                            "description": "Must be SAFE, CAUTION, or AVOID"
                        }
                    },
                    "required": [
                        "name", "purpose", "fdaStatus", "healthRisks", "sources", "safetyRating"
                    ]
                }
            }
        },
        "required": ["additives", "summary"]
    })
}

/// Parses the model's text reply. Leading and trailing whitespace is ignored;
/// anything that is not a complete `AnalysisResponse` is rejected.
pub fn parse_reply(text: &str) -> Result<AnalysisResponse, AnalysisError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AnalysisError::EmptyReply);
    }

    let value: Value = serde_json::from_str(trimmed).map_err(AnalysisError::MalformedJson)?;
    serde_json::from_value(value).map_err(AnalysisError::SchemaViolation)
}

/// Gemini `generateContent` client for label analysis.
pub struct GeminiService {
    config: AnalysisConfig,
    client: reqwest::Client,
}

impl GeminiService {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        self.config.model()
    }

    fn build_request(&self, image: &CapturedImage) -> GenerateContentRequest {
        GenerateContentRequest {
            system_instruction: Content {
                parts: vec![Part::Text {
                    text: SYSTEM_INSTRUCTION.to_string(),
                }],
            },
            contents: vec![Content {
                parts: vec![
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: image.mime_type.to_string(),
                            data: image.to_base64(),
                        },
                    },
                    Part::Text {
                        text: USER_PROMPT.to_string(),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: response_schema(),
            },
        }
    }

    async fn request_analysis(
        &self,
        image: &CapturedImage,
    ) -> Result<AnalysisResponse, AnalysisError> {
        log::debug!("📊 Image payload size: {} bytes", image.len());

        let request = self.build_request(image);

        log::info!("🤖 Sending label to Gemini with model: {}", self.config.model());

        let response = self
            .client
            .post(self.config.generate_content_url())
            .header("x-goog-api-key", self.config.api_key())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        log::debug!("📥 Gemini response status: {}", status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let response_text = response.text().await?;
        log::debug!("📄 Raw Gemini response size: {} bytes", response_text.len());

        let envelope: GenerateContentResponse =
            serde_json::from_str(&response_text).map_err(AnalysisError::MalformedJson)?;
        let reply = reply_text(envelope).ok_or(AnalysisError::EmptyReply)?;

        parse_reply(&reply)
    }
}

fn reply_text(envelope: GenerateContentResponse) -> Option<String> {
    let content = envelope.candidates.into_iter().next()?.content?;
    let text: String = content
        .parts
        .into_iter()
        .filter_map(|part| match part {
            Part::Text { text } => Some(text),
            _ => None,
        })
        .collect();

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait::async_trait]
impl LabelAnalyzer for GeminiService {
    async fn analyze(&self, image: &CapturedImage) -> Result<AnalysisResponse, AnalysisError> {
        match self.request_analysis(image).await {
            Ok(response) => {
                log::info!(
                    "✅ Label analyzed: {} additive(s) found",
                    response.additives.len()
                );
                Ok(response)
            }
            Err(e) => {
                log::error!("❌ Gemini analysis error: {}", e);
                Err(e)
            }
        }
    }
}
