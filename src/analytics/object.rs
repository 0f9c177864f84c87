use ndarray::{Array4, ArrayViewD};
use opencv::core::{Mat, Size, BORDER_CONSTANT};
use opencv::imgproc;
use opencv::prelude::*;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;

use super::detector::{BoxError, DetectError, Detection, Detector};

const YOLO_INPUT_SIZE: u32 = 640;
const PAD_VALUE: f64 = 114.0;

const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    frame_w: f32,
    frame_h: f32,
}

impl Letterbox {
    fn for_frame(frame_w: f32, frame_h: f32) -> Self {
        let input_size = YOLO_INPUT_SIZE as f32;
        let scale = (input_size / frame_w).min(input_size / frame_h);
        let new_w = (frame_w * scale).round();
        let new_h = (frame_h * scale).round();
        Self {
            scale,
            pad_x: ((input_size - new_w) / 2.0).floor(),
            pad_y: ((input_size - new_h) / 2.0).floor(),
            frame_w,
            frame_h,
        }
    }

    fn scaled_size(&self) -> (i32, i32) {
        (
            (self.frame_w * self.scale).round() as i32,
            (self.frame_h * self.scale).round() as i32,
        )
    }
}

// End-to-end YOLO export: `logits` + `pred_boxes`, no NMS needed.
pub struct ObjectDetector {
    session: Session,
    confidence_threshold: f32,
    allowed_classes: Vec<String>,
}

impl ObjectDetector {
    pub fn new(
        model_path: &str,
        confidence_threshold: f32,
        allowed_classes: Vec<String>,
        intra_threads: usize,
    ) -> Result<Self, BoxError> {
        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?;

        let session = if model_path.starts_with("http://") || model_path.starts_with("https://") {
            builder.commit_from_url(model_path)?
        } else {
            builder.commit_from_file(model_path)?
        };

        tracing::info!(model = %model_path, "loaded detection model");

        Ok(Self {
            session,
            confidence_threshold,
            allowed_classes,
        })
    }

    fn infer(&mut self, frame: &Mat) -> Result<Vec<Detection>, DetectError> {
        let rows = frame.rows();
        let cols = frame.cols();
        if rows == 0 || cols == 0 {
            return Err(DetectError::EmptyFrame);
        }

        let letterbox = Letterbox::for_frame(cols as f32, rows as f32);
        let input_tensor = preprocess(frame, &letterbox).map_err(DetectError::Backend)?;

        let tensor_ref = TensorRef::from_array_view(input_tensor.view())
            .map_err(|e| DetectError::Backend(e.into()))?
            .into_dyn();
        let outputs = self
            .session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| DetectError::Backend(e.into()))?;

        let (Some(logits_val), Some(boxes_val)) =
            (outputs.get("logits"), outputs.get("pred_boxes"))
        else {
            return Err(DetectError::UnsupportedModel(
                "expected 'logits' and 'pred_boxes' outputs".into(),
            ));
        };

        let logits = logits_val
            .try_extract_array::<f32>()
            .map_err(|e| DetectError::Backend(e.into()))?
            .to_owned();
        let boxes = boxes_val
            .try_extract_array::<f32>()
            .map_err(|e| DetectError::Backend(e.into()))?
            .to_owned();
        drop(outputs);

        decode_predictions(
            &logits.view(),
            &boxes.view(),
            self.confidence_threshold,
            &self.allowed_classes,
            &letterbox,
        )
    }
}

impl Detector for ObjectDetector {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<Detection>, DetectError> {
        self.infer(frame)
    }
}

fn preprocess(frame: &Mat, letterbox: &Letterbox) -> Result<Array4<f32>, BoxError> {
    let input_size = YOLO_INPUT_SIZE as i32;
    let (new_w, new_h) = letterbox.scaled_size();
    let pad_x = letterbox.pad_x as i32;
    let pad_y = letterbox.pad_y as i32;

    let mut resized = Mat::default();
    imgproc::resize(
        frame,
        &mut resized,
        Size::new(new_w, new_h),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;

    let mut padded = Mat::default();
    opencv::core::copy_make_border(
        &resized,
        &mut padded,
        pad_y,
        input_size - new_h - pad_y,
        pad_x,
        input_size - new_w - pad_x,
        BORDER_CONSTANT,
        opencv::core::Scalar::new(PAD_VALUE, PAD_VALUE, PAD_VALUE, 0.0),
    )?;

    let mut rgb = Mat::default();
    imgproc::cvt_color(&padded, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

    let side = YOLO_INPUT_SIZE as usize;
    let data = rgb.data_bytes()?;
    if data.len() < side * side * 3 {
        return Err("frame data too small".into());
    }

    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for y in 0..side {
        for x in 0..side {
            let idx = (y * side + x) * 3;
            tensor[[0, 0, y, x]] = data[idx] as f32 / 255.0;
            tensor[[0, 1, y, x]] = data[idx + 1] as f32 / 255.0;
            tensor[[0, 2, y, x]] = data[idx + 2] as f32 / 255.0;
        }
    }

    Ok(tensor)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

// logits: [1, N, classes] or [N, classes]; boxes: normalised (cx, cy, w, h).
fn decode_predictions(
    logits: &ArrayViewD<f32>,
    boxes: &ArrayViewD<f32>,
    confidence_threshold: f32,
    allowed_classes: &[String],
    letterbox: &Letterbox,
) -> Result<Vec<Detection>, DetectError> {
    let logits_shape = logits.shape();
    if logits_shape.len() < 2 || boxes.shape().len() < 2 {
        return Ok(Vec::new());
    }

    let (num_predictions, num_classes) = if logits_shape.len() == 3 {
        (logits_shape[1], logits_shape[2])
    } else {
        (logits_shape[0], logits_shape[1])
    };

    let logits_flat = logits
        .as_slice()
        .ok_or_else(|| DetectError::UnsupportedModel("non-contiguous logits".into()))?;
    let boxes_flat = boxes
        .as_slice()
        .ok_or_else(|| DetectError::UnsupportedModel("non-contiguous boxes".into()))?;
    if boxes_flat.len() < num_predictions * 4 {
        return Err(DetectError::UnsupportedModel(format!(
            "{} boxes for {} predictions",
            boxes_flat.len() / 4,
            num_predictions
        )));
    }

    let input_size = YOLO_INPUT_SIZE as f32;
    let mut detections = Vec::new();

    for i in 0..num_predictions {
        let scores = &logits_flat[i * num_classes..(i + 1) * num_classes];
        let Some((class_id, score)) = scores
            .iter()
            .map(|&logit| sigmoid(logit))
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            continue;
        };

        if score < confidence_threshold {
            continue;
        }

        let class_name = COCO_CLASSES
            .get(class_id)
            .map(|name| name.to_string())
            .unwrap_or_else(|| format!("class_{class_id}"));

        if !allowed_classes.is_empty() && !allowed_classes.contains(&class_name) {
            continue;
        }

        let cx = boxes_flat[i * 4] * input_size;
        let cy = boxes_flat[i * 4 + 1] * input_size;
        let w = boxes_flat[i * 4 + 2] * input_size;
        let h = boxes_flat[i * 4 + 3] * input_size;

        let x = (((cx - w / 2.0) - letterbox.pad_x) / letterbox.scale).clamp(0.0, letterbox.frame_w);
        let y = (((cy - h / 2.0) - letterbox.pad_y) / letterbox.scale).clamp(0.0, letterbox.frame_h);
        let width = (w / letterbox.scale).min(letterbox.frame_w - x);
        let height = (h / letterbox.scale).min(letterbox.frame_h - y);

        detections.push(Detection {
            class_name,
            class_id,
            confidence: score,
            x,
            y,
            width,
            height,
        });
    }

    Ok(detections)
}
