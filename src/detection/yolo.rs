// src/detection/yolo.rs
//
// YOLOv8 ONNX model behind the capability traits. One type serves both the
// object detector (wrapped in `Tracked` for identities) and the sign
// classifier; only the weights differ.

use super::capability::{ObjectDetector, RawSign, SignClassifier};
use super::postprocess::{decode, nms, preprocess, Candidate, MODEL_INPUT_SIZE, YOLO_ANCHORS};
use crate::config::ModelConfig;
use crate::types::Frame;
use anyhow::{Context, Result};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use std::path::Path;
use tracing::{debug, info};

pub struct YoloModel {
    session: Session,
    confidence_threshold: f32,
    nms_iou: f32,
}

impl YoloModel {
    pub fn load<P: AsRef<Path>>(path: P, config: &ModelConfig) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading YOLO model: {}", path.display());

        let mut builder = Session::builder()?;
        if config.use_cuda {
            info!("Enabling CUDA execution provider");
            builder = builder.with_execution_providers([CUDAExecutionProvider::default()
                .with_device_id(0)
                .build()])?;
        }

        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.num_threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model {}", path.display()))?;

        info!("✓ YOLO model ready");
        Ok(Self {
            session,
            confidence_threshold: config.confidence_threshold,
            nms_iou: config.nms_iou,
        })
    }

    fn infer(&mut self, input: Vec<f32>) -> Result<Vec<f32>> {
        let shape = [1, 3, MODEL_INPUT_SIZE, MODEL_INPUT_SIZE];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>()?;
        Ok(data.to_vec())
    }
}

impl ObjectDetector for YoloModel {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Candidate>> {
        let (input, letterbox) = preprocess(&frame.data, frame.width, frame.height, MODEL_INPUT_SIZE);
        let output = self.infer(input)?;
        let candidates = decode(&output, YOLO_ANCHORS, &letterbox, self.confidence_threshold);
        let kept = nms(candidates, self.nms_iou);
        debug!("Frame {}: {} candidate(s) after NMS", frame.index, kept.len());
        Ok(kept)
    }
}

impl SignClassifier for YoloModel {
    fn classify(&mut self, frame: &Frame) -> Result<Vec<RawSign>> {
        Ok(self
            .detect(frame)?
            .into_iter()
            .map(|c| RawSign {
                class_id: c.class_id as i64,
                confidence: c.confidence,
                bbox: c.bbox,
                label: None,
            })
            .collect())
    }
}
