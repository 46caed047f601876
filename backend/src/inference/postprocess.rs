use super::RawDetection;

/// Resize-and-pad transform from a source image into a square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub new_width: u32,
    pub new_height: u32,
}

impl Letterbox {
    pub fn new(src_width: u32, src_height: u32, target: u32) -> Self {
        let scale = (target as f32 / src_width as f32).min(target as f32 / src_height as f32);
        let new_width = ((src_width as f32 * scale).round() as u32).clamp(1, target);
        let new_height = ((src_height as f32 * scale).round() as u32).clamp(1, target);
        Self {
            scale,
            pad_x: (target - new_width) as f32 / 2.0,
            pad_y: (target - new_height) as f32 / 2.0,
            new_width,
            new_height,
        }
    }

    /// Maps a box from model-input space back to source pixels.
    pub fn unmap(&self, bbox: [f32; 4]) -> [f32; 4] {
        [
            (bbox[0] - self.pad_x) / self.scale,
            (bbox[1] - self.pad_y) / self.scale,
            (bbox[2] - self.pad_x) / self.scale,
            (bbox[3] - self.pad_y) / self.scale,
        ]
    }
}

/// Decodes a YOLOv8-style `[4 + classes, anchors]` row-major output.
/// Each anchor column is `(cx, cy, w, h, class scores...)`.
pub fn decode_yolo(
    output: &[f32],
    channels: usize,
    anchors: usize,
    confidence: f32,
) -> Vec<RawDetection> {
    if channels <= 4 || output.len() < channels * anchors {
        return Vec::new();
    }
    let mut detections = Vec::new();
    for a in 0..anchors {
        let at = |c: usize| output[c * anchors + a];
        let Some((class_index, prob)) = (4..channels)
            .map(|c| (c - 4, at(c)))
            .filter(|(_, p)| p.is_finite())
            .reduce(|best, cur| if cur.1 > best.1 { cur } else { best })
        else {
            continue;
        };
        if prob < confidence {
            continue;
        }
        let (cx, cy, w, h) = (at(0), at(1), at(2), at(3));
        detections.push(RawDetection {
            class_index,
            confidence: prob.clamp(0.0, 1.0),
            bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
        });
    }
    detections
}

pub fn intersection_over_union(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = ix * iy;
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

/// Per-class non-maximum suppression. Survivors are ordered by descending confidence.
pub fn non_maximum_suppression(
    mut detections: Vec<RawDetection>,
    iou_threshold: f32,
) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut suppressed = vec![false; detections.len()];
    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        for j in (i + 1)..detections.len() {
            if suppressed[j] || detections[i].class_index != detections[j].class_index {
                continue;
            }
            if intersection_over_union(&detections[i].bbox, &detections[j].bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }
    let mut keep = suppressed.iter();
    detections.retain(|_| !keep.next().copied().unwrap_or(true));
    detections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_index: usize, confidence: f32, bbox: [f32; 4]) -> RawDetection {
        RawDetection {
            class_index,
            confidence,
            bbox,
        }
    }

    #[test]
    fn letterbox_wide_image() {
        let lb = Letterbox::new(1280, 640, 640);
        assert_eq!(lb.scale, 0.5);
        assert_eq!((lb.new_width, lb.new_height), (640, 320));
        assert_eq!((lb.pad_x, lb.pad_y), (0.0, 160.0));
        assert_eq!(lb.unmap([0.0, 160.0, 640.0, 480.0]), [0.0, 0.0, 1280.0, 640.0]);
    }

    #[test]
    fn nms_keeps_disjoint_boxes() {
        let dets = vec![
            det(0, 0.6, [0.0, 0.0, 1.0, 1.0]),
            det(0, 0.6, [2.0, 2.0, 3.0, 3.0]),
        ];
        assert_eq!(non_maximum_suppression(dets, 0.5).len(), 2);
    }

    #[test]
    fn nms_suppresses_overlap_within_class() {
        let dets = vec![
            det(0, 0.6, [0.0, 0.0, 4.0, 4.0]),
            det(0, 0.55, [0.0, 0.0, 5.0, 5.0]),
            det(0, 0.75, [6.0, 6.0, 10.0, 10.0]),
        ];
        let kept = non_maximum_suppression(dets, 0.5);
        assert_eq!(
            kept,
            vec![
                det(0, 0.75, [6.0, 6.0, 10.0, 10.0]),
                det(0, 0.6, [0.0, 0.0, 4.0, 4.0]),
            ]
        );
    }

    #[test]
    fn nms_ignores_overlap_across_classes() {
        let dets = vec![
            det(0, 0.6, [0.0, 0.0, 4.0, 4.0]),
            det(1, 0.55, [0.0, 0.0, 4.0, 4.0]),
        ];
        assert_eq!(non_maximum_suppression(dets, 0.5).len(), 2);
    }

    #[test]
    fn decodes_best_class_per_anchor() {
        // channels = 4 + 2 classes, anchors = 2
        let output = vec![
            50.0, 10.0, // cx
            50.0, 10.0, // cy
            20.0, 4.0, // w
            10.0, 4.0, // h
            0.1, 0.05, // class 0
            0.8, 0.1, // class 1
        ];
        let dets = decode_yolo(&output, 6, 2, 0.25);
        assert_eq!(dets, vec![det(1, 0.8, [40.0, 45.0, 60.0, 55.0])]);
    }

    #[test]
    fn decode_rejects_short_output() {
        assert!(decode_yolo(&[1.0, 2.0], 6, 2, 0.25).is_empty());
    }
}
