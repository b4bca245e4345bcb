use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::models::{AnalysisResponse, CapturedImage, InteractionState, Phase};
use crate::services::capture::{capture_once, CaptureSource};
use crate::services::{AnalysisError, CaptureConstraints, LabelAnalyzer};

/// Identifies one analysis attempt. A resolution carrying an old ticket is
/// dropped, so a late reply can never land on a reset screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
}

/// Idle → Analyzing → Result | Error → Idle.
#[derive(Debug, Default)]
pub struct Scanner {
    state: InteractionState,
    generation: u64,
}

impl Scanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Only accepted from Idle. Anywhere else it is a no-op and no ticket is
    /// issued, so no second request can start.
    pub fn capture(&mut self) -> Option<Ticket> {
        if self.state != InteractionState::Idle {
            log::debug!("⏳ Capture ignored while {}", self.phase());
            return None;
        }

        self.generation += 1;
        self.state = InteractionState::Analyzing;
        Some(Ticket {
            generation: self.generation,
        })
    }

    pub fn resolve(
        &mut self,
        ticket: Ticket,
        outcome: Result<AnalysisResponse, AnalysisError>,
    ) -> bool {
        if ticket.generation != self.generation || self.state != InteractionState::Analyzing {
            log::info!(
                "🗑️ Discarding stale analysis (ticket {}, current {})",
                ticket.generation,
                self.generation
            );
            return false;
        }

        self.state = match outcome {
            Ok(response) => InteractionState::Result(Arc::new(response)),
            Err(e) => InteractionState::Error(e.user_message().to_string()),
        };
        true
    }

    /// Back to Idle from Result or Error. Also abandons an in-flight analysis.
    pub fn reset(&mut self) -> bool {
        if self.state == InteractionState::Idle {
            return false;
        }

        self.generation += 1;
        self.state = InteractionState::Idle;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Started,
    Ignored(Phase),
}

struct Inner {
    scanner: Scanner,
    in_flight: Option<JoinHandle<()>>,
}

impl Inner {
    /// Applies a finished analysis. A stale one leaves `in_flight` alone,
    /// since by then it belongs to a newer attempt.
    fn finish(&mut self, ticket: Ticket, outcome: Result<AnalysisResponse, AnalysisError>) {
        if self.scanner.resolve(ticket, outcome) {
            log::info!("🔄 Scanner moved to {}", self.scanner.phase());
            self.in_flight = None;
        }
    }
}

/// Drives a `Scanner` with a real analyzer. One instance per operator
/// surface; every transition goes through the inner lock.
pub struct ScanController {
    analyzer: Arc<dyn LabelAnalyzer>,
    inner: Arc<Mutex<Inner>>,
}

impl ScanController {
    pub fn new(analyzer: Arc<dyn LabelAnalyzer>) -> Self {
        Self {
            analyzer,
            inner: Arc::new(Mutex::new(Inner {
                scanner: Scanner::new(),
                in_flight: None,
            })),
        }
    }

    pub async fn snapshot(&self) -> InteractionState {
        self.inner.lock().await.scanner.state().clone()
    }

    /// Starts an analysis in the background and returns right away.
    pub async fn capture(&self, image: CapturedImage) -> CaptureOutcome {
        let mut inner = self.inner.lock().await;

        let ticket = match inner.scanner.capture() {
            Some(ticket) => ticket,
            None => return CaptureOutcome::Ignored(inner.scanner.phase()),
        };

        log::info!("📸 Label captured ({} bytes), analyzing...", image.len());

        let analyzer = self.analyzer.clone();
        let shared = self.inner.clone();
        let handle = tokio::spawn(async move {
            let outcome = analyzer.analyze(&image).await;

            shared.lock().await.finish(ticket, outcome);
        });
        inner.in_flight = Some(handle);

        CaptureOutcome::Started
    }

    pub async fn reset(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if !inner.scanner.reset() {
            return false;
        }

        if let Some(handle) = inner.in_flight.take() {
            log::info!("🛑 Cancelling in-flight analysis");
            handle.abort();
        }
        true
    }

    /// Waits for the current analysis (if any) to settle and returns the
    /// resulting state.
    pub async fn settle(&self) -> InteractionState {
        let handle = self.inner.lock().await.in_flight.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    log::error!("❌ Analysis task failed: {}", e);
                }
            }
        }
        self.snapshot().await
    }
}

#[derive(Debug)]
pub enum ScanOutcome {
    /// The device could not be opened; carries the operator message.
    CaptureFailed(&'static str),
    Settled(InteractionState),
}

/// One capture → analyze cycle. A capture failure stays on the capture
/// view: no scanner is created and the analyzer is never called.
pub async fn run_scan(
    source: &dyn CaptureSource,
    constraints: &CaptureConstraints,
    analyzer: Arc<dyn LabelAnalyzer>,
) -> ScanOutcome {
    let image = match capture_once(source, constraints) {
        Ok(image) => image,
        Err(e) => {
            log::error!("❌ Capture failed: {}", e);
            return ScanOutcome::CaptureFailed(e.user_message());
        }
    };

    let controller = ScanController::new(analyzer);
    controller.capture(image).await;
    ScanOutcome::Settled(controller.settle().await)
}
