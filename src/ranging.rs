//! Per-frame ranging of detections.
//!
//! Filters detections by confidence, skips boxes with no apparent size, and
//! attaches a distance and display label to the rest.

use crate::detect::{ClassNames, Detection};
use crate::geometry::{format_metres, DistanceEstimator};

/// A detection with its estimated distance.
#[derive(Clone, Debug, PartialEq)]
pub struct RangedDetection {
    pub detection: Detection,
    pub class_name: String,
    pub distance_cm: f64,
}

impl RangedDetection {
    /// Overlay label, e.g. `ball: 0.49 m`.
    pub fn label(&self) -> String {
        format!("{}: {}", self.class_name, format_metres(self.distance_cm))
    }
}

/// Plain detection label, e.g. `ball 0.87`.
pub fn detection_label(detection: &Detection, names: &ClassNames) -> String {
    format!("{} {:.2}", names.name(detection.class_id), detection.confidence)
}

/// Keep detections at or above `min_confidence` and range them.
pub fn range_detections(
    detections: &[Detection],
    estimator: &DistanceEstimator,
    names: &ClassNames,
    min_confidence: f32,
) -> Vec<RangedDetection> {
    detections
        .iter()
        .filter(|det| det.confidence >= min_confidence)
        .filter_map(|det| {
            let Some(distance_cm) = estimator.estimate(&det.bbox) else {
                log::debug!(
                    "skipping degenerate detection of class {} at ({:.0}, {:.0})",
                    det.class_id,
                    det.bbox.x1(),
                    det.bbox.y1()
                );
                return None;
            };
            Some(RangedDetection {
                detection: det.clone(),
                class_name: names.name(det.class_id),
                distance_cm,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{BoundingBox, CameraIntrinsics, ObjectSpec};

    fn estimator() -> DistanceEstimator {
        DistanceEstimator::new(
            ObjectSpec::new("ball", 6.8).unwrap(),
            CameraIntrinsics::from_focal_length(718.409779, 640, 480).unwrap(),
        )
    }

    fn det(conf: f32, x1: f64, y1: f64, x2: f64, y2: f64) -> Detection {
        Detection::new(0, conf, BoundingBox::new(x1, y1, x2, y2).unwrap())
    }

    #[test]
    fn ranges_confident_detections() {
        let names = ClassNames::new(vec!["ball".to_string()]);
        let ranged = range_detections(
            &[det(0.9, 0.0, 0.0, 100.0, 100.0), det(0.3, 0.0, 0.0, 50.0, 50.0)],
            &estimator(),
            &names,
            0.5,
        );
        assert_eq!(ranged.len(), 1);
        assert!((ranged[0].distance_cm - 48.852).abs() < 1e-3);
        assert_eq!(ranged[0].label(), "ball: 0.49 m");
    }

    #[test]
    fn degenerate_boxes_are_skipped() {
        let ranged = range_detections(
            &[det(0.9, 10.0, 10.0, 10.0, 10.0)],
            &estimator(),
            &ClassNames::default(),
            0.5,
        );
        assert!(ranged.is_empty());
    }

    #[test]
    fn threshold_is_inclusive() {
        let ranged = range_detections(
            &[det(0.5, 0.0, 0.0, 10.0, 10.0)],
            &estimator(),
            &ClassNames::default(),
            0.5,
        );
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].class_name, "class0");
    }

    #[test]
    fn plain_label_shows_confidence() {
        let names = ClassNames::new(vec!["ball".to_string()]);
        assert_eq!(detection_label(&det(0.87, 0.0, 0.0, 1.0, 1.0), &names), "ball 0.87");
    }
}
