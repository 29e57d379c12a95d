use ndarray::Array1;

use crate::bbox::{BBox, Ltwh, Xyah};

/// A single bounding box detection of one frame together with its appearance embedding.
///
/// Detections are produced by the caller every frame and consumed by the tracker
/// within the same `update` call.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BBox<Ltwh>,
    pub confidence: f32,
    pub feature: Array1<f32>,
    pub class: Option<i32>,
}

impl Detection {
    pub fn new(bbox: BBox<Ltwh>, confidence: f32, feature: Array1<f32>) -> Self {
        Self {
            bbox,
            confidence,
            feature,
            class: None,
        }
    }

    #[inline]
    pub fn with_class(mut self, class: i32) -> Self {
        self.class = Some(class);
        self
    }

    #[inline(always)]
    pub fn to_xyah(&self) -> BBox<Xyah> {
        self.bbox.as_xyah()
    }

    #[inline]
    pub fn feature_dim(&self) -> usize {
        self.feature.len()
    }
}
