// src/detection/sign_adapter.rs

use super::annotate::{annotate_box, COLOR_SIGN};
use super::capability::{RawSign, SignClassifier};
use crate::config::SignConfig;
use crate::types::{AlertKind, Frame, RawSignal, Severity};
use anyhow::Result;
use tracing::debug;

/// Confidence-filtered sign detections, one `traffic_sign` signal each.
pub struct SignAdapter<C: SignClassifier> {
    classifier: C,
    config: SignConfig,
}

impl<C: SignClassifier> SignAdapter<C> {
    pub fn new(classifier: C, config: &SignConfig) -> Self {
        Self {
            classifier,
            config: config.clone(),
        }
    }

    pub fn process(&mut self, frame: &mut Frame) -> Result<Vec<RawSignal>> {
        let raw = self.classifier.classify(frame)?;
        let mut signals = Vec::new();

        for sign in raw {
            if sign.confidence < self.config.confidence_threshold {
                continue;
            }
            if sign.bbox.iter().any(|v| !v.is_finite()) {
                debug!("Skipping sign with non-finite box");
                continue;
            }

            let name = self.sign_name(&sign);
            annotate_box(
                frame,
                &sign.bbox,
                COLOR_SIGN,
                format!("{} {:.2}", name, sign.confidence),
            );
            signals.push(RawSignal {
                kind: AlertKind::TrafficSign,
                description: format!("Detected sign: {}", name),
                severity: Severity::Medium,
                track_id: None,
                distance_m: None,
            });
        }

        Ok(signals)
    }

    fn sign_name(&self, sign: &RawSign) -> String {
        if let Some(label) = sign.label.as_ref().filter(|l| !l.is_empty()) {
            return label.clone();
        }
        usize::try_from(sign.class_id)
            .ok()
            .and_then(|idx| self.config.class_names.get(idx))
            .cloned()
            .unwrap_or_else(|| format!("sign{}", sign.class_id))
    }
}
