use image::{ImageReader, RgbImage};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::annotate::draw_detections;
use super::{Detection, Detector, InferenceError, RawDetection};

pub struct InferenceOutput {
    pub detections: Vec<Detection>,
    pub annotated: RgbImage,
}

/// Single shared detector instance; concurrent callers queue on the lock.
#[derive(Clone)]
pub struct InferenceEngine {
    detector: Arc<Mutex<Box<dyn Detector>>>,
}

impl InferenceEngine {
    pub fn new(detector: Box<dyn Detector>) -> Self {
        Self {
            detector: Arc::new(Mutex::new(detector)),
        }
    }

    /// Runs detection once on the image at `path`. Blocking; call from the blocking pool.
    ///
    /// The decoder is chosen from the file contents, not its extension.
    pub fn run(&self, path: &Path) -> Result<InferenceOutput, InferenceError> {
        let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
        let (width, height) = (image.width(), image.height());

        let detections = {
            let detector = self.detector.lock().map_err(|_| InferenceError::Poisoned)?;
            let raw = detector.detect(&image)?;
            normalize(&raw, detector.vocabulary(), width, height)?
        };

        let mut annotated = image.to_rgb8();
        draw_detections(&mut annotated, &detections);
        log::debug!(
            "Detected {} objects in {} ({}x{})",
            detections.len(),
            path.display(),
            width,
            height
        );
        Ok(InferenceOutput {
            detections,
            annotated,
        })
    }
}

/// Maps raw engine output onto labelled detections, preserving engine order.
pub fn normalize(
    raw: &[RawDetection],
    vocabulary: &[String],
    width: u32,
    height: u32,
) -> Result<Vec<Detection>, InferenceError> {
    raw.iter()
        .map(|det| {
            let label = vocabulary.get(det.class_index).ok_or_else(|| {
                InferenceError::Malformed(format!("unknown class index {}", det.class_index))
            })?;
            if !det.confidence.is_finite() || !(0.0..=1.0).contains(&det.confidence) {
                return Err(InferenceError::Malformed(format!(
                    "confidence {} outside [0, 1]",
                    det.confidence
                )));
            }
            if det.bbox.iter().any(|v| !v.is_finite()) {
                return Err(InferenceError::Malformed(format!(
                    "non-finite box {:?}",
                    det.bbox
                )));
            }
            Ok(Detection {
                label: label.clone(),
                score: round_score(det.confidence),
                bbox: clip_box(det.bbox, width, height),
            })
        })
        .collect()
}

/// Widens to f64 without carrying f32 representation noise into the database.
fn round_score(confidence: f32) -> f64 {
    (f64::from(confidence) * 1e6).round() / 1e6
}

fn clip_box(bbox: [f32; 4], width: u32, height: u32) -> [f32; 4] {
    let (w, h) = (width as f32, height as f32);
    let [x1, y1, x2, y2] = bbox;
    [
        x1.min(x2).clamp(0.0, w),
        y1.min(y2).clamp(0.0, h),
        x1.max(x2).clamp(0.0, w),
        y1.max(y2).clamp(0.0, h),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> Vec<String> {
        vec!["cat".to_string(), "dog".to_string()]
    }

    #[test]
    fn resolves_labels_in_engine_order() {
        let raw = vec![
            RawDetection {
                class_index: 1,
                confidence: 0.7,
                bbox: [1.0, 2.0, 30.0, 40.0],
            },
            RawDetection {
                class_index: 0,
                confidence: 0.9,
                bbox: [5.0, 5.0, 10.0, 10.0],
            },
        ];
        let out = normalize(&raw, &vocab(), 100, 100).unwrap();
        assert_eq!(out[0].label, "dog");
        assert_eq!(out[0].score, 0.7);
        assert_eq!(out[1].label, "cat");
    }

    #[test]
    fn empty_output_is_valid() {
        assert!(normalize(&[], &vocab(), 10, 10).unwrap().is_empty());
    }

    #[test]
    fn rejects_unknown_index_and_bad_scores() {
        let unknown = RawDetection {
            class_index: 5,
            confidence: 0.5,
            bbox: [0.0; 4],
        };
        assert!(normalize(&[unknown], &vocab(), 10, 10).is_err());

        let too_high = RawDetection {
            class_index: 0,
            confidence: 1.2,
            bbox: [0.0; 4],
        };
        assert!(normalize(&[too_high], &vocab(), 10, 10).is_err());

        let nan = RawDetection {
            class_index: 0,
            confidence: f32::NAN,
            bbox: [0.0; 4],
        };
        assert!(normalize(&[nan], &vocab(), 10, 10).is_err());
    }

    #[test]
    fn clips_boxes_to_image() {
        let raw = RawDetection {
            class_index: 0,
            confidence: 0.5,
            bbox: [120.0, -5.0, 20.0, 50.0],
        };
        let out = normalize(&[raw], &vocab(), 100, 40).unwrap();
        assert_eq!(out[0].bbox, [20.0, 0.0, 100.0, 40.0]);
    }

    struct NoObjects(Vec<String>);

    impl Detector for NoObjects {
        fn vocabulary(&self) -> &[String] {
            &self.0
        }

        fn detect(&self, _image: &image::DynamicImage) -> Result<Vec<RawDetection>, InferenceError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn decodes_by_content_regardless_of_extension() {
        use crate::inference::annotate::encode_image;
        use image::{ImageFormat, Rgb};

        let dir = tempfile::tempdir().unwrap();
        let png = encode_image(&RgbImage::from_pixel(8, 6, Rgb([1, 2, 3])), ImageFormat::Png).unwrap();
        let engine = InferenceEngine::new(Box::new(NoObjects(vocab())));

        for name in ["blob.bin", "blob", "photo.jpg"] {
            let path = dir.path().join(name);
            std::fs::write(&path, &png).unwrap();
            let output = engine.run(&path).unwrap();
            assert_eq!(output.annotated.dimensions(), (8, 6), "{}", name);
        }

        let garbage = dir.path().join("garbage.jpg");
        std::fs::write(&garbage, b"not an image").unwrap();
        assert!(matches!(engine.run(&garbage), Err(InferenceError::Decode(_))));
    }
}
