use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::CapturedImage;

pub const CAMERA_UNAVAILABLE_MESSAGE: &str =
    "No se pudo acceder a la cámara. Por favor, otorga los permisos necesarios.";

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device unavailable: {0}")]
    Unavailable(String),
    #[error("could not decode frame: {0}")]
    Decode(image::ImageError),
    #[error("could not encode frame as JPEG: {0}")]
    Encode(image::ImageError),
}

impl CaptureError {
    /// Operator-facing text. Only a missing or denied device gets the
    /// permissions hint.
    pub fn user_message(&self) -> &'static str {
        match self {
            CaptureError::Unavailable(_) => CAMERA_UNAVAILABLE_MESSAGE,
            CaptureError::Decode(_) | CaptureError::Encode(_) => {
                "No se pudo capturar la imagen. Inténtalo de nuevo."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    Environment,
}

/// Serialized in the shape the browser page feeds to `getUserMedia`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConstraints {
    #[serde(rename = "facingMode")]
    pub facing: Facing,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub jpeg_quality: u8,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            facing: Facing::Environment,
            ideal_width: 1280,
            ideal_height: 720,
            jpeg_quality: 80,
        }
    }
}

/// A live feed from some device. `stop` releases every underlying track.
pub trait CaptureStream: Send {
    fn start(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn grab_frame(&mut self) -> Result<CapturedImage, CaptureError>;

    fn stop(&mut self);
}

pub trait CaptureSource {
    fn open(&self, constraints: &CaptureConstraints) -> Result<CaptureSession, CaptureError>;
}

/// Owns an acquired stream. The stream is stopped exactly once: on `close`,
/// on drop, or when `start` fails during acquisition.
pub struct CaptureSession {
    stream: Option<Box<dyn CaptureStream>>,
}

impl CaptureSession {
    pub fn start(stream: Box<dyn CaptureStream>) -> Result<Self, CaptureError> {
        let mut session = Self {
            stream: Some(stream),
        };
        if let Some(stream) = session.stream.as_mut() {
            // on error `session` drops here and releases the stream
            stream.start()?;
        }
        Ok(session)
    }

    pub fn capture_frame(&mut self) -> Result<CapturedImage, CaptureError> {
        match self.stream.as_mut() {
            Some(stream) => stream.grab_frame(),
            None => Err(CaptureError::Unavailable("session already closed".to_string())),
        }
    }

    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            log::debug!("📷 Capture stream released");
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// Uses a still photo on disk as the camera. Handy for the `scan` command
/// and for kiosks fed by an external shutter.
pub struct StillImageSource {
    path: PathBuf,
}

impl StillImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CaptureSource for StillImageSource {
    fn open(&self, constraints: &CaptureConstraints) -> Result<CaptureSession, CaptureError> {
        log::debug!("📸 Opening still image source: {}", self.path.display());

        let bytes = std::fs::read(&self.path).map_err(|e| {
            log::error!("❌ Cannot open {}: {} ({:?})", self.path.display(), e, e.kind());
            CaptureError::Unavailable(format!("{}: {}", self.path.display(), e))
        })?;

        CaptureSession::start(Box::new(StillImageStream {
            path: self.path.clone(),
            bytes,
            frame: None,
            constraints: constraints.clone(),
        }))
    }
}

struct StillImageStream {
    path: PathBuf,
    bytes: Vec<u8>,
    frame: Option<DynamicImage>,
    constraints: CaptureConstraints,
}

impl CaptureStream for StillImageStream {
    fn start(&mut self) -> Result<(), CaptureError> {
        let frame = image::load_from_memory(&self.bytes).map_err(CaptureError::Decode)?;
        log::debug!(
            "🖼️ Still frame {} is {}x{}",
            self.path.display(),
            frame.width(),
            frame.height()
        );
        self.frame = Some(frame);
        Ok(())
    }

    fn grab_frame(&mut self) -> Result<CapturedImage, CaptureError> {
        let frame = self
            .frame
            .as_ref()
            .ok_or_else(|| CaptureError::Unavailable("stream stopped".to_string()))?;
        encode_frame(frame, &self.constraints)
    }

    fn stop(&mut self) {
        self.frame = None;
        self.bytes.clear();
    }
}

/// Fits the frame inside the ideal resolution and encodes it as JPEG.
pub fn encode_frame(
    frame: &DynamicImage,
    constraints: &CaptureConstraints,
) -> Result<CapturedImage, CaptureError> {
    let too_large =
        frame.width() > constraints.ideal_width || frame.height() > constraints.ideal_height;
    let fitted = if too_large {
        frame.resize(constraints.ideal_width, constraints.ideal_height, FilterType::Triangle)
    } else {
        frame.clone()
    };

    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(fitted.to_rgb8());

    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, constraints.jpeg_quality);
    rgb.write_with_encoder(encoder).map_err(CaptureError::Encode)?;

    Ok(CapturedImage::jpeg(buffer))
}

/// Convenience for one-shot capture: acquire, grab one frame, release.
pub fn capture_once(
    source: &dyn CaptureSource,
    constraints: &CaptureConstraints,
) -> Result<CapturedImage, CaptureError> {
    let mut session = source.open(constraints)?;
    let frame = session.capture_frame();
    session.close();
    frame
}

pub fn is_supported_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref(),
        Some("jpg") | Some("jpeg") | Some("png")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct TrackingStream {
        stops: Arc<AtomicUsize>,
        fail_start: bool,
    }

    impl CaptureStream for TrackingStream {
        fn start(&mut self) -> Result<(), CaptureError> {
            if self.fail_start {
                Err(CaptureError::Unavailable("NotAllowedError".to_string()))
            } else {
                Ok(())
            }
        }

        fn grab_frame(&mut self) -> Result<CapturedImage, CaptureError> {
            Ok(CapturedImage::jpeg(vec![0xFF, 0xD8]))
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tracking(fail_start: bool) -> (Box<TrackingStream>, Arc<AtomicUsize>) {
        let stops = Arc::new(AtomicUsize::new(0));
        (
            Box::new(TrackingStream {
                stops: stops.clone(),
                fail_start,
            }),
            stops,
        )
    }

    #[test]
    fn test_session_releases_on_drop() {
        let (stream, stops) = tracking(false);
        {
            let mut session = CaptureSession::start(stream).unwrap();
            session.capture_frame().unwrap();
        }
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_releases_exactly_once() {
        let (stream, stops) = tracking(false);
        CaptureSession::start(stream).unwrap().close();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_acquisition_still_releases() {
        let (stream, stops) = tracking(true);
        let err = CaptureSession::start(stream).err().unwrap();
        assert_eq!(err.user_message(), CAMERA_UNAVAILABLE_MESSAGE);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_device_is_unavailable() {
        let source = StillImageSource::new("/nonexistent/label.jpg");
        let err = source.open(&CaptureConstraints::default()).err().unwrap();
        assert!(matches!(err, CaptureError::Unavailable(_)));
    }

    #[test]
    fn test_garbage_file_fails_to_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("label.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();

        let err = StillImageSource::new(&path)
            .open(&CaptureConstraints::default())
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::Decode(_)));
    }

    #[test]
    fn test_frame_is_fitted_and_jpeg_encoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("label.png");
        image::RgbaImage::new(2000, 1000).save(&path).unwrap();

        let source = StillImageSource::new(&path);
        let frame = capture_once(&source, &CaptureConstraints::default()).unwrap();

        assert_eq!(frame.mime_type, "image/jpeg");
        assert_eq!(image::guess_format(&frame.bytes).unwrap(), image::ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&frame.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (1280, 640));
    }

    #[test]
    fn test_constraints_json_for_browser() {
        let json = serde_json::to_value(CaptureConstraints::default()).unwrap();
        assert_eq!(json["facingMode"], "environment");
        assert_eq!(json["idealWidth"], 1280);
        assert_eq!(json["idealHeight"], 720);
        assert_eq!(json["jpegQuality"], 80);
    }

    #[test]
    fn test_supported_paths() {
        assert!(is_supported_path(Path::new("a/label.JPG")));
        assert!(is_supported_path(Path::new("label.png")));
        assert!(!is_supported_path(Path::new("label.gif")));
    }
}
