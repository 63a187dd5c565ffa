use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;
use serde::Serialize;

use crate::error::EngineError;

use super::histogram::{color_histogram, cosine_similarity};

/// Decodes an opaque image handle into pixel data. The engine never assumes
/// what a handle is; the default codec treats it as a filesystem path,
/// tests hand in an in-memory map.
pub trait ImageCodec: Send + Sync {
    fn decode(&self, handle: &str) -> Result<DynamicImage, EngineError>;
}

/// Handles are filesystem paths.
pub struct FileCodec;

impl ImageCodec for FileCodec {
    fn decode(&self, handle: &str) -> Result<DynamicImage, EngineError> {
        image::open(Path::new(handle))
            .map_err(|err| EngineError::Decode(format!("{handle}: {err}")))
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub is_similar: bool,
    pub similarity: f64,
}

/// Scores a captured photo against the stored reference.
///
/// Comparison is the cosine similarity of the two images' color histograms;
/// identical images score 1.0 up to floating-point tolerance, and the score
/// is commutative. The verifier holds only the reference handle; both
/// images are decoded per attempt so a retried capture always sees the
/// current reference.
#[derive(Clone)]
pub struct PhotoVerifier {
    codec: Arc<dyn ImageCodec>,
    reference: Option<String>,
}

impl PhotoVerifier {
    pub fn new(codec: Arc<dyn ImageCodec>) -> Self {
        Self {
            codec,
            reference: None,
        }
    }

    /// Replaces any prior reference. Idempotent.
    pub fn set_reference(&mut self, handle: impl Into<String>) {
        self.reference = Some(handle.into());
    }

    /// Back to the unconfigured state.
    pub fn reset(&mut self) {
        self.reference = None;
    }

    pub fn is_ready(&self) -> bool {
        self.reference.is_some()
    }

    /// Compare `captured` against the reference. Errors when no reference
    /// is set or either image fails to decode; callers treat any error as a
    /// failed attempt, never as a reason to stop ringing.
    pub fn verify(
        &self,
        captured: &str,
        threshold: f64,
    ) -> Result<VerificationResult, EngineError> {
        let reference = self.reference.as_deref().ok_or_else(|| {
            EngineError::Configuration("no reference photo set".into())
        })?;

        let reference_image = self.codec.decode(reference)?;
        let captured_image = self.codec.decode(captured)?;

        let similarity = cosine_similarity(
            &color_histogram(&reference_image),
            &color_histogram(&captured_image),
        );

        Ok(VerificationResult {
            is_similar: similarity >= threshold,
            similarity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::collections::HashMap;

    struct MemoryCodec {
        images: HashMap<String, DynamicImage>,
    }

    impl MemoryCodec {
        fn new(images: Vec<(&str, DynamicImage)>) -> Arc<Self> {
            Arc::new(Self {
                images: images
                    .into_iter()
                    .map(|(handle, image)| (handle.to_string(), image))
                    .collect(),
            })
        }
    }

    impl ImageCodec for MemoryCodec {
        fn decode(&self, handle: &str) -> Result<DynamicImage, EngineError> {
            self.images
                .get(handle)
                .cloned()
                .ok_or_else(|| EngineError::Decode(format!("unknown handle {handle}")))
        }
    }

    fn solid(color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb(color)))
    }

    fn gradient() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(32, 32, |x, y| {
            Rgb([(x * 8) as u8, (y * 8) as u8, 128])
        }))
    }

    #[test]
    fn identical_images_score_one() {
        let codec = MemoryCodec::new(vec![("ref", gradient()), ("cap", gradient())]);
        let mut verifier = PhotoVerifier::new(codec);
        verifier.set_reference("ref");

        let result = verifier.verify("cap", 0.9).unwrap();
        assert!(result.is_similar);
        assert!(result.similarity >= 0.999);
    }

    #[test]
    fn opposite_hues_do_not_match() {
        let codec = MemoryCodec::new(vec![
            ("ref", solid([255, 0, 0])),
            ("cap", solid([0, 0, 255])),
        ]);
        let mut verifier = PhotoVerifier::new(codec);
        verifier.set_reference("ref");

        let result = verifier.verify("cap", 0.7).unwrap();
        assert!(!result.is_similar);
        assert!(result.similarity < 0.5);
    }

    #[test]
    fn score_is_commutative() {
        let codec = MemoryCodec::new(vec![("a", gradient()), ("b", solid([90, 200, 40]))]);
        let mut forward = PhotoVerifier::new(Arc::clone(&codec) as Arc<dyn ImageCodec>);
        forward.set_reference("a");
        let mut backward = PhotoVerifier::new(codec);
        backward.set_reference("b");

        let ab = forward.verify("b", 0.5).unwrap().similarity;
        let ba = backward.verify("a", 0.5).unwrap().similarity;
        assert!((ab - ba).abs() < 1e-12);
    }

    #[test]
    fn missing_reference_is_a_configuration_error() {
        let codec = MemoryCodec::new(vec![("cap", gradient())]);
        let verifier = PhotoVerifier::new(codec);
        assert!(matches!(
            verifier.verify("cap", 0.7),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn undecodable_capture_is_a_decode_error() {
        let codec = MemoryCodec::new(vec![("ref", gradient())]);
        let mut verifier = PhotoVerifier::new(codec);
        verifier.set_reference("ref");
        assert!(matches!(
            verifier.verify("missing", 0.7),
            Err(EngineError::Decode(_))
        ));
    }

    #[test]
    fn reset_clears_the_reference() {
        let codec = MemoryCodec::new(vec![("ref", gradient())]);
        let mut verifier = PhotoVerifier::new(codec);
        verifier.set_reference("ref");
        assert!(verifier.is_ready());
        verifier.reset();
        assert!(!verifier.is_ready());
    }

    #[test]
    fn file_codec_reports_unreadable_paths() {
        let result = FileCodec.decode("/nonexistent/wakeproof-test.png");
        assert!(matches!(result, Err(EngineError::Decode(_))));
    }
}
