//! Image preparation and transcription.

mod preprocessing;
#[cfg(feature = "native")]
mod tesseract;

pub use preprocessing::{otsu_threshold, ImagePreprocessor};
#[cfg(feature = "native")]
pub use tesseract::TesseractOcr;

use std::path::Path;

use image::DynamicImage;
use tracing::debug;

use crate::error::OcrError;

/// Image transformation applied before transcription.
pub trait ImageStage {
    fn prepare(&self, image: &DynamicImage) -> Result<DynamicImage, OcrError>;
}

/// Leaves images untouched.
pub struct Passthrough;

impl ImageStage for Passthrough {
    fn prepare(&self, image: &DynamicImage) -> Result<DynamicImage, OcrError> {
        Ok(image.clone())
    }
}

/// Turns an image into plain text.
pub trait OcrService {
    fn transcribe(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

impl<S: OcrService + ?Sized> OcrService for Box<S> {
    fn transcribe(&self, image: &DynamicImage) -> Result<String, OcrError> {
        (**self).transcribe(image)
    }
}

/// Open an image file, prepare it and transcribe it.
pub fn transcribe_file(
    path: &Path,
    stage: &dyn ImageStage,
    ocr: &dyn OcrService,
) -> Result<String, OcrError> {
    let image = image::open(path)
        .map_err(|e| OcrError::InvalidImage(format!("{}: {e}", path.display())))?;
    debug!(path = %path.display(), width = image.width(), height = image.height(), "Loaded image");
    let prepared = stage.prepare(&image)?;
    ocr.transcribe(&prepared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    struct FixedText {
        seen: Cell<Option<(u32, u32)>>,
    }

    impl OcrService for FixedText {
        fn transcribe(&self, image: &DynamicImage) -> Result<String, OcrError> {
            self.seen.set(Some((image.width(), image.height())));
            Ok("CARTE BANCAIRE".to_string())
        }
    }

    #[test]
    fn test_transcribe_file_runs_stage_then_ocr() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt.png");
        DynamicImage::new_luma8(40, 10).save(&path).unwrap();

        let ocr = FixedText { seen: Cell::new(None) };
        let stage = ImagePreprocessor::new().with_max_size(20);
        let text = transcribe_file(&path, &stage, &ocr).unwrap();

        assert_eq!(text, "CARTE BANCAIRE");
        assert_eq!(ocr.seen.get(), Some((20, 5)));
    }

    #[test]
    fn test_unreadable_file() {
        let err = transcribe_file(Path::new("/nonexistent/receipt.jpg"), &Passthrough, &FixedText {
            seen: Cell::new(None),
        })
        .unwrap_err();
        assert!(matches!(err, OcrError::InvalidImage(_)));
    }
}
