use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use std::path::Path;
use tch::{CModule, Device, Kind, Tensor};

use super::labels::coco_vocabulary;
use super::postprocess::{Letterbox, decode_yolo, non_maximum_suppression};
use super::{Detector, InferenceError, RawDetection};

const PAD_VALUE: u8 = 114;

/// YOLOv8 detector exported to TorchScript.
pub struct TorchDetector {
    model: CModule,
    device: Device,
    vocabulary: Vec<String>,
    input_size: i64,
    confidence: f32,
    iou_threshold: f32,
}

impl TorchDetector {
    pub fn load(
        model_path: &Path,
        input_size: i64,
        confidence: f32,
        iou_threshold: f32,
    ) -> Result<Self, InferenceError> {
        let device = Device::cuda_if_available();
        let model = CModule::load_on_device(model_path, device)
            .map_err(|e| InferenceError::Model(e.to_string()))?;
        log::info!(
            "Loaded TorchScript model {} on {:?}",
            model_path.display(),
            device
        );
        Ok(Self {
            model,
            device,
            vocabulary: coco_vocabulary(),
            input_size,
            confidence,
            iou_threshold,
        })
    }

    fn preprocess(&self, image: &DynamicImage) -> Result<(Tensor, Letterbox), InferenceError> {
        let size = self.input_size as u32;
        if image.width() == 0 || image.height() == 0 {
            return Err(InferenceError::Preprocessing(
                "image has zero dimensions".to_string(),
            ));
        }
        let letterbox = Letterbox::new(image.width(), image.height(), size);
        let resized = imageops::resize(
            &image.to_rgb8(),
            letterbox.new_width,
            letterbox.new_height,
            FilterType::Triangle,
        );
        let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
        imageops::replace(
            &mut canvas,
            &resized,
            letterbox.pad_x as i64,
            letterbox.pad_y as i64,
        );

        let plane = (size * size) as usize;
        let mut chw = vec![0f32; 3 * plane];
        for (i, pixel) in canvas.pixels().enumerate() {
            for c in 0..3 {
                chw[c * plane + i] = f32::from(pixel[c]) / 255.0;
            }
        }
        let tensor = Tensor::from_slice(&chw)
            .view([1, 3, self.input_size, self.input_size])
            .to_device(self.device);
        Ok((tensor, letterbox))
    }
}

impl Detector for TorchDetector {
    fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawDetection>, InferenceError> {
        let (input, letterbox) = self.preprocess(image)?;
        let output = tch::no_grad(|| self.model.forward_ts(&[input]))
            .map_err(|e| InferenceError::Model(e.to_string()))?;

        let shape = output.size();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(InferenceError::Model(format!(
                "unexpected output shape {:?}",
                shape
            )));
        }
        let (channels, anchors) = (shape[1] as usize, shape[2] as usize);

        let flat = output
            .to_kind(Kind::Float)
            .to_device(Device::Cpu)
            .contiguous()
            .view([-1]);
        let num_elements = channels * anchors;
        let mut values = vec![0f32; num_elements];
        flat.copy_data(&mut values, num_elements);

        let candidates = decode_yolo(&values, channels, anchors, self.confidence);
        let kept = non_maximum_suppression(candidates, self.iou_threshold);
        Ok(kept
            .into_iter()
            .map(|det| RawDetection {
                bbox: letterbox.unmap(det.bbox),
                ..det
            })
            .collect())
    }
}
