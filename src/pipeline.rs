use crate::bbox::{BBox, Xywh};
use crate::config::PipelineConfig;
use crate::error::Error;
use crate::extractor::FeatureExtractor;
use crate::frame::Frame;
use crate::gating::MatchOptions;
use crate::tracker::{TrackOutput, Tracker};
use crate::Detection;

/// Per-frame association switches of [`StrongSort::update`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct UpdateFlags {
    pub prevent_different_classes_match: bool,
    pub match_across_boundary: bool,
}

/// Frame level tracking: crops detections out of the image, embeds them and
/// runs one tracker step.
pub struct StrongSort {
    min_confidence: f32,
    extractor: Box<dyn FeatureExtractor>,
    tracker: Tracker,
}

impl StrongSort {
    pub fn new(config: PipelineConfig) -> Result<Self, Error> {
        let extractor = config.extractor.build()?;

        Self::with_extractor(config, extractor)
    }

    /// Use a custom embedding backend instead of the configured one.
    pub fn with_extractor(
        config: PipelineConfig,
        extractor: Box<dyn FeatureExtractor>,
    ) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            min_confidence: config.min_confidence,
            extractor,
            tracker: Tracker::new(config.tracker)?,
        })
    }

    #[inline]
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Track one frame.
    ///
    /// `boxes[i]` (center format), `classes[i]` and `confidences[i]` describe
    /// the same detection. Detections with confidence at or below
    /// `min_confidence` are ignored. Returned boxes are clamped to the image,
    /// or only to its top-left corner when `match_across_boundary` is set.
    pub fn update(
        &mut self,
        frame: &Frame<'_>,
        boxes: &[BBox<Xywh>],
        classes: &[i32],
        confidences: &[f32],
        flags: UpdateFlags,
    ) -> Result<Vec<TrackOutput>, Error> {
        for (what, actual) in [("classes", classes.len()), ("confidences", confidences.len())] {
            if actual != boxes.len() {
                return Err(Error::LengthMismatch {
                    what,
                    expected: boxes.len(),
                    actual,
                });
            }
        }

        let kept: Vec<usize> = (0..boxes.len())
            .filter(|&i| confidences[i] > self.min_confidence && boxes[i].as_ltwh().is_valid())
            .collect();

        let crops: Vec<_> = kept
            .iter()
            .map(|&i| frame.crop(&boxes[i].as_ltrb()))
            .collect();
        let features = self.extractor.extract(&crops)?;

        if features.len() != kept.len() {
            return Err(Error::Extractor(format!(
                "{} features for {} crops",
                features.len(),
                kept.len()
            )));
        }

        let dim = self.extractor.dim();
        if let Some(bad) = features.iter().find(|f| f.len() != dim) {
            return Err(Error::Extractor(format!(
                "feature of length {} from a {}-dim extractor",
                bad.len(),
                dim
            )));
        }

        let detections: Vec<Detection> = kept
            .iter()
            .zip(features)
            .map(|(&i, feature)| {
                Detection::new(boxes[i].as_ltwh(), confidences[i], feature).with_class(classes[i])
            })
            .collect();

        tracing::trace!(
            total = boxes.len(),
            kept = detections.len(),
            "frame detections"
        );

        let opts = MatchOptions {
            frame_width: frame.width() as f32,
            prevent_different_classes_match: flags.prevent_different_classes_match,
            match_across_boundary: flags.match_across_boundary,
        };

        self.tracker.predict();
        self.tracker.update(&detections, &opts)?;

        let (w, h) = frame.dims();
        let (max_x, max_y) = (w as i32 - 1, h as i32 - 1);

        Ok(self
            .tracker
            .outputs()
            .into_iter()
            .map(|mut out| {
                let [l, t, r, b] = out.ltrb;
                out.ltrb = if flags.match_across_boundary {
                    [l.max(0), t.max(0), r, b]
                } else {
                    [l.max(0), t.max(0), r.min(max_x), b.min(max_y)]
                };
                out
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::extractor::ExtractorKind;
    use ndarray::{Array1, Array3, ArrayView3};

    fn pipeline(n_init: u32) -> StrongSort {
        StrongSort::new(PipelineConfig {
            min_confidence: 0.3,
            extractor: ExtractorKind::GridColor { rows: 2, cols: 2 },
            tracker: TrackerConfig {
                n_init,
                ..TrackerConfig::default()
            },
        })
        .unwrap()
    }

    fn image() -> Array3<u8> {
        Array3::from_shape_fn((120, 160, 3), |(y, x, c)| ((x + 2 * y + 40 * c) % 256) as u8)
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        let mut sort = pipeline(1);
        let img = image();
        let frame = Frame::new(img.view());

        let err = sort
            .update(
                &frame,
                &[BBox::xywh(50.0, 50.0, 20.0, 20.0)],
                &[0, 1],
                &[0.9],
                UpdateFlags::default(),
            )
            .unwrap_err();

        assert!(matches!(
            err,
            Error::LengthMismatch {
                what: "classes",
                expected: 1,
                actual: 2
            }
        ));
    }

    #[test]
    fn low_confidence_detections_are_dropped() {
        let mut sort = pipeline(1);
        let img = image();
        let frame = Frame::new(img.view());

        sort.update(
            &frame,
            &[
                BBox::xywh(50.0, 50.0, 20.0, 20.0),
                BBox::xywh(120.0, 60.0, 20.0, 30.0),
            ],
            &[0, 2],
            &[0.9, 0.3],
            UpdateFlags::default(),
        )
        .unwrap();

        assert_eq!(sort.tracker().tracks().len(), 1);
        assert_eq!(sort.tracker().tracks()[0].class(), Some(0));
    }

    #[test]
    fn classes_follow_their_detections() {
        let mut sort = pipeline(1);
        let img = image();
        let frame = Frame::new(img.view());
        let boxes = [
            BBox::xywh(30.0, 50.0, 20.0, 20.0),
            BBox::xywh(80.0, 50.0, 20.0, 20.0),
            BBox::xywh(130.0, 50.0, 20.0, 20.0),
        ];
        let classes = [4, 5, 6];
        let confidences = [0.1, 0.8, 0.9];

        sort.update(&frame, &boxes, &classes, &confidences, UpdateFlags::default())
            .unwrap();
        let out = sort
            .update(&frame, &boxes, &classes, &confidences, UpdateFlags::default())
            .unwrap();

        let mut reported: Vec<(Option<i32>, f32)> = out.iter().map(|o| (o.class, o.score)).collect();
        reported.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(reported, vec![(Some(5), 0.8), (Some(6), 0.9)]);
    }

    #[test]
    fn outputs_are_clamped_to_the_image() {
        let mut sort = pipeline(1);
        let img = image();
        let frame = Frame::new(img.view());
        // sticks out of the right edge of the 160 px image
        let boxes = [BBox::xywh(155.0, 60.0, 20.0, 40.0)];

        sort.update(&frame, &boxes, &[0], &[0.9], UpdateFlags::default())
            .unwrap();
        let out = sort
            .update(&frame, &boxes, &[0], &[0.9], UpdateFlags::default())
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].ltrb, [145, 40, 159, 80]);

        let mut sort = pipeline(1);
        let flags = UpdateFlags {
            match_across_boundary: true,
            ..UpdateFlags::default()
        };
        sort.update(&frame, &boxes, &[0], &[0.9], flags).unwrap();
        let out = sort.update(&frame, &boxes, &[0], &[0.9], flags).unwrap();
        assert_eq!(out[0].ltrb, [145, 40, 165, 80]);
    }

    /// Claims 4 dimensions but emits 3.
    struct ShortExtractor;

    impl FeatureExtractor for ShortExtractor {
        fn extract(&mut self, crops: &[ArrayView3<'_, u8>]) -> Result<Vec<Array1<f32>>, Error> {
            Ok(crops.iter().map(|_| Array1::from_elem(3, 0.5)).collect())
        }

        fn dim(&self) -> usize {
            4
        }
    }

    #[test]
    fn features_of_the_wrong_length_are_rejected() {
        let mut sort =
            StrongSort::with_extractor(PipelineConfig::default(), Box::new(ShortExtractor))
                .unwrap();
        let img = image();
        let frame = Frame::new(img.view());

        let err = sort
            .update(
                &frame,
                &[BBox::xywh(50.0, 50.0, 20.0, 20.0)],
                &[0],
                &[0.9],
                UpdateFlags::default(),
            )
            .unwrap_err();

        assert!(matches!(err, Error::Extractor(_)));
        assert!(sort.tracker().tracks().is_empty());
    }
}
