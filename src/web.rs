use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::handlers::ScanController;
use crate::models::{AnalysisResponse, InteractionState, Phase};
use crate::views::View;

/// Body of `POST /api/capture`: the frame grabbed by the browser.
#[derive(Debug, Deserialize)]
pub struct CaptureRequest {
    /// Base64 JPEG, with or without the `data:` prefix
    pub image: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub state: Phase,
    pub view: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<AnalysisResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StateSnapshot {
    pub fn from_state(state: &InteractionState) -> Self {
        Self {
            state: state.phase(),
            view: View::for_state(state).name(),
            response: state.response().cloned(),
            error_message: state.error_message().map(str::to_string),
        }
    }
}

#[cfg(feature = "web-server")]
pub mod server {
    use super::*;
    use axum::{
        extract::State,
        http::StatusCode,
        response::{Html, IntoResponse},
        routing::{get, post},
        Json, Router,
    };
    use tower_http::services::ServeDir;

    use crate::handlers::CaptureOutcome;
    use crate::models::CapturedImage;
    use crate::services::CaptureConstraints;
    use crate::views::render_html;

    pub struct AppState {
        pub controller: Arc<ScanController>,
        pub constraints: CaptureConstraints,
    }

    pub fn create_router(
        controller: Arc<ScanController>,
        constraints: CaptureConstraints,
    ) -> Router {
        let state = Arc::new(AppState {
            controller,
            constraints,
        });

        Router::new()
            .route("/", get(index_page))
            .route("/api/state", get(get_state))
            .route("/api/view", get(get_view))
            .route("/api/capture-constraints", get(get_constraints))
            .route("/api/capture", post(capture_handler))
            .route("/api/reset", post(reset_handler))
            .route("/health", get(health_check))
            .nest_service("/static", ServeDir::new("static"))
            .with_state(state)
    }

    async fn index_page() -> Html<&'static str> {
        Html(include_str!("../static/index.html"))
    }

    async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateSnapshot> {
        let current = state.controller.snapshot().await;
        Json(StateSnapshot::from_state(&current))
    }

    async fn get_view(State(state): State<Arc<AppState>>) -> Html<String> {
        let current = state.controller.snapshot().await;
        Html(render_html(&View::for_state(&current)))
    }

    async fn get_constraints(State(state): State<Arc<AppState>>) -> Json<CaptureConstraints> {
        Json(state.constraints.clone())
    }

    async fn capture_handler(
        State(state): State<Arc<AppState>>,
        Json(request): Json<CaptureRequest>,
    ) -> impl IntoResponse {
        let image = match CapturedImage::from_base64(&request.image) {
            Ok(image) if !image.is_empty() => image,
            Ok(_) => {
                log::warn!("⚠️ Empty capture payload");
                return StatusCode::BAD_REQUEST.into_response();
            }
            Err(e) => {
                log::warn!("⚠️ Capture payload is not base64: {}", e);
                return StatusCode::BAD_REQUEST.into_response();
            }
        };

        let status = match state.controller.capture(image).await {
            CaptureOutcome::Started => StatusCode::ACCEPTED,
            CaptureOutcome::Ignored(phase) => {
                log::info!("ℹ️ Capture rejected while {}", phase);
                StatusCode::CONFLICT
            }
        };

        let current = state.controller.snapshot().await;
        (status, Json(StateSnapshot::from_state(&current))).into_response()
    }

    async fn reset_handler(State(state): State<Arc<AppState>>) -> Json<StateSnapshot> {
        if state.controller.reset().await {
            log::info!("🔁 Scanner reset to idle");
        }
        let current = state.controller.snapshot().await;
        Json(StateSnapshot::from_state(&current))
    }

    async fn health_check() -> &'static str {
        "OK"
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::models::{AnalysisResponse, CapturedImage, InteractionState, Phase};
        use crate::services::gemini::parse_reply;
        use crate::services::{AnalysisError, LabelAnalyzer};
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        struct FixedAnalyzer(&'static str);

        #[async_trait::async_trait]
        impl LabelAnalyzer for FixedAnalyzer {
            async fn analyze(
                &self,
                _image: &CapturedImage,
            ) -> Result<AnalysisResponse, AnalysisError> {
                parse_reply(self.0)
            }
        }

        fn app(reply: &'static str) -> (Router, Arc<ScanController>) {
            let controller = Arc::new(ScanController::new(Arc::new(FixedAnalyzer(reply))));
            (
                create_router(controller.clone(), CaptureConstraints::default()),
                controller,
            )
        }

        async fn body_json(response: axum::response::Response) -> serde_json::Value {
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            serde_json::from_slice(&bytes).unwrap()
        }

        fn capture_request(image: &str) -> Request<Body> {
            Request::builder()
                .method("POST")
                .uri("/api/capture")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::json!({ "image": image }).to_string()))
                .unwrap()
        }

        #[tokio::test]
        async fn test_initial_state_is_idle() {
            let (router, _) = app(r#"{"summary":"","additives":[]}"#);
            let response = router
                .oneshot(Request::get("/api/state").body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let json = body_json(response).await;
            assert_eq!(json["state"], "IDLE");
            assert_eq!(json["view"], "capture");
            assert!(json.get("response").is_none());
        }

        #[tokio::test]
        async fn test_capture_then_reset() {
            let (router, controller) = app(r#"{"summary":"","additives":[]}"#);

            let response = router.clone().oneshot(capture_request("/9j/4AAQ")).await.unwrap();
            assert_eq!(response.status(), StatusCode::ACCEPTED);

            let settled = controller.settle().await;
            assert_eq!(settled.phase(), Phase::Result);

            let view = router
                .clone()
                .oneshot(Request::get("/api/view").body(Body::empty()).unwrap())
                .await
                .unwrap();
            let bytes = axum::body::to_bytes(view.into_body(), usize::MAX).await.unwrap();
            assert!(String::from_utf8(bytes.to_vec()).unwrap().contains("data-view=\"empty\""));

            let response = router
                .oneshot(Request::post("/api/reset").body(Body::empty()).unwrap())
                .await
                .unwrap();
            let json = body_json(response).await;
            assert_eq!(json["state"], "IDLE");
            assert!(json.get("errorMessage").is_none());
        }

        #[tokio::test]
        async fn test_second_capture_conflicts() {
            let (router, controller) = app("not json");

            let first = router.clone().oneshot(capture_request("/9j/4AAQ")).await.unwrap();
            assert_eq!(first.status(), StatusCode::ACCEPTED);
            controller.settle().await;

            // now in Error; capture must wait for a reset
            let second = router.oneshot(capture_request("/9j/4AAQ")).await.unwrap();
            assert_eq!(second.status(), StatusCode::CONFLICT);
            let json = body_json(second).await;
            assert_eq!(json["state"], "ERROR");
            assert_eq!(json["view"], "error");
        }

        #[tokio::test]
        async fn test_bad_payload_is_rejected() {
            let (router, controller) = app(r#"{"summary":"","additives":[]}"#);
            let response = router.oneshot(capture_request("%%%")).await.unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(controller.snapshot().await, InteractionState::Idle);
        }
    }
}
