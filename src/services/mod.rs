pub mod capture; // Camera / still-image capture boundary
pub mod gemini; // Gemini vision analysis client

use crate::models::{AnalysisResponse, CapturedImage};

pub use capture::{CaptureConstraints, StillImageSource};
pub use gemini::{AnalysisError, GeminiService};

/// Anything that can turn a label photo into an `AnalysisResponse`.
/// One call, one attempt: implementations never retry.
#[async_trait::async_trait]
pub trait LabelAnalyzer: Send + Sync {
    async fn analyze(&self, image: &CapturedImage) -> Result<AnalysisResponse, AnalysisError>;
}
