//! Tesseract engine through libtesseract.

use std::io::Cursor;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use image::{DynamicImage, ImageFormat};
use tesseract::Tesseract;
use tracing::{debug, info, warn};

use crate::error::{OcrError, ServiceError};
use crate::models::config::{OcrConfig, RetryPolicy};
use crate::services::with_retry;

use super::OcrService;

const SERVICE: &str = "tesseract";

/// Failure inside the engine thread.
enum EngineFailure {
    /// The engine could not start, usually missing language data.
    Init(String),
    /// The engine started but could not read the image.
    Recognition(String),
}

fn recognize(datapath: Option<&str>, language: &str, png: &[u8]) -> Result<String, EngineFailure> {
    let mut engine = Tesseract::new(datapath, Some(language))
        .map_err(|e| EngineFailure::Init(e.to_string()))?
        .set_image_from_mem(png)
        .map_err(|e| EngineFailure::Recognition(format!("cannot load image: {e}")))?;

    engine
        .get_text()
        .map_err(|e| EngineFailure::Recognition(e.to_string()))
}

/// Transcribes images with libtesseract, one engine per attempt.
pub struct TesseractOcr {
    datapath: Option<String>,
    language: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl TesseractOcr {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            datapath: config.tessdata_dir.clone(),
            language: config.language.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run the engine on a worker thread and wait at most `timeout`.
    ///
    /// A timed-out engine cannot be interrupted; it finishes detached and its
    /// result is dropped.
    fn run_once(&self, png: &[u8]) -> Result<String, OcrError> {
        let (tx, rx) = mpsc::channel();
        let datapath = self.datapath.clone();
        let language = self.language.clone();
        let png = png.to_vec();

        thread::Builder::new()
            .name("tesseract".to_string())
            .spawn(move || {
                let _ = tx.send(recognize(datapath.as_deref(), &language, &png));
            })
            .map_err(|e| ServiceError::Unavailable {
                service: SERVICE,
                attempts: 1,
                reason: format!("cannot start engine thread: {e}"),
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(EngineFailure::Init(reason))) => Err(ServiceError::Unavailable {
                service: SERVICE,
                attempts: 1,
                reason: format!("cannot initialize for {}: {reason}", self.language),
            }
            .into()),
            Ok(Err(EngineFailure::Recognition(reason))) => Err(OcrError::Recognition(reason)),
            Err(RecvTimeoutError::Timeout) => {
                warn!(after = ?self.timeout, "Tesseract did not finish, abandoning");
                Err(ServiceError::Timeout {
                    service: SERVICE,
                    after: self.timeout,
                }
                .into())
            }
            Err(RecvTimeoutError::Disconnected) => Err(OcrError::Recognition(
                "engine thread stopped without a result".to_string(),
            )),
        }
    }
}

impl OcrService for TesseractOcr {
    fn transcribe(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let start = Instant::now();

        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| OcrError::Preprocessing(format!("cannot encode image: {e}")))?;

        // Recognition failures are not retried; only service failures are.
        let mut failure = None;
        let result = with_retry(&self.retry, SERVICE, || match self.run_once(&png) {
            Ok(text) => Ok(Some(text)),
            Err(OcrError::Service(e)) => Err(e),
            Err(other) => {
                failure = Some(other);
                Ok(None)
            }
        });

        let text = match (result?, failure) {
            (Some(text), _) => text,
            (None, Some(err)) => return Err(err),
            (None, None) => String::new(),
        };

        info!(
            language = %self.language,
            chars = text.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Transcribed image"
        );
        debug!("Transcript:\n{}", text);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_language_data_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let config = OcrConfig {
            tessdata_dir: Some(dir.path().to_string_lossy().into_owned()),
            language: "zzz".to_string(),
            ..Default::default()
        };
        let image = DynamicImage::new_luma8(4, 4);

        let err = TesseractOcr::new(&config).transcribe(&image).unwrap_err();
        assert!(matches!(
            err,
            OcrError::Service(ServiceError::Unavailable { attempts: 1, .. })
        ));
    }

    #[test]
    fn test_init_failure_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let config = OcrConfig {
            tessdata_dir: Some(dir.path().to_string_lossy().into_owned()),
            language: "zzz".to_string(),
            ..Default::default()
        };
        let retry = RetryPolicy {
            max_attempts: 2,
            base_delay_ms: 1,
            backoff_factor: 1.0,
            max_delay_ms: 1,
        };
        let image = DynamicImage::new_luma8(4, 4);

        let err = TesseractOcr::new(&config)
            .with_retry(retry)
            .transcribe(&image)
            .unwrap_err();
        assert!(matches!(
            err,
            OcrError::Service(ServiceError::Unavailable { attempts: 2, .. })
        ));
    }
}
