mod config;
mod handlers;
mod models;
mod services;
mod views;
mod web; // Browser-facing camera page + JSON API

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use config::{Command, Config};
use handlers::{run_scan, ScanController, ScanOutcome};
use services::capture::is_supported_path;
use services::{CaptureConstraints, GeminiService, LabelAnalyzer, StillImageSource};
use views::{render_text, View};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize logger
    env_logger::init();

    // Load environment variables before clap reads them
    dotenv().ok();

    let config = Config::parse();

    let analysis_config = config.analysis_config().map_err(|e| {
        log::error!("❌ Invalid configuration: {}", e);
        e
    })?;

    let gemini = GeminiService::new(analysis_config);
    log::info!("✅ Gemini service initialized with model: {}", gemini.model());
    let analyzer: Arc<dyn LabelAnalyzer> = Arc::new(gemini);

    match config.command() {
        Command::Scan { path } => Ok(scan_file(analyzer, &path).await),
        Command::Serve { bind } => serve(analyzer, &bind).await.map(|_| ExitCode::SUCCESS),
    }
}

/// One capture → analyze → render cycle from a photo on disk.
async fn scan_file(analyzer: Arc<dyn LabelAnalyzer>, path: &Path) -> ExitCode {
    if !is_supported_path(path) {
        log::warn!("⚠️ {} does not look like a JPEG or PNG, trying anyway", path.display());
    }

    let source = StillImageSource::new(path);

    match run_scan(&source, &CaptureConstraints::default(), analyzer).await {
        ScanOutcome::CaptureFailed(message) => {
            println!("📷 {}", message);
            ExitCode::from(2)
        }
        ScanOutcome::Settled(state) => {
            println!("\n{}", render_text(&View::for_state(&state)));
            if state.error_message().is_some() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
    }
}

#[cfg(feature = "web-server")]
async fn serve(analyzer: Arc<dyn LabelAnalyzer>, bind: &str) -> Result<()> {
    use web::server::create_router;

    let controller = Arc::new(ScanController::new(analyzer));
    let app = create_router(controller, CaptureConstraints::default());

    let listener = tokio::net::TcpListener::bind(bind).await?;
    log::info!("🌐 AddiSafe listening on http://{}", bind);

    println!("\n🥫 AddiSafe está listo!");
    println!("🌐 Abre http://{} en tu teléfono", bind);
    println!("🛑 Presiona Ctrl+C para detener\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("🛑 Shutting down...");
        })
        .await?;

    Ok(())
}

#[cfg(not(feature = "web-server"))]
async fn serve(_analyzer: Arc<dyn LabelAnalyzer>, _bind: &str) -> Result<()> {
    anyhow::bail!(
        "this build has no web server; rebuild with --features web-server or use `scan <path>`"
    )
}
