//! Appearance embedding backends.
//!
//! The tracker only needs "image crop in, fixed length vector out". Crops are
//! `height × width × channel` RGB views. The backend is chosen once from
//! [`ExtractorKind`]; a learned re-identification network can be plugged in by
//! implementing [`FeatureExtractor`].

use ndarray::{Array1, ArrayView3, Axis};
use serde_derive::{Deserialize, Serialize};

use crate::error::Error;

const CHANNELS: usize = 3;

pub trait FeatureExtractor {
    /// One feature per crop, in input order. Every vector has length [`dim`](Self::dim).
    fn extract(&mut self, crops: &[ArrayView3<'_, u8>]) -> Result<Vec<Array1<f32>>, Error>;

    fn dim(&self) -> usize;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    /// Normalized per-channel intensity histogram.
    ColorHistogram { bins: usize },
    /// Mean color of each cell of a `rows × cols` grid.
    GridColor { rows: usize, cols: usize },
}

impl Default for ExtractorKind {
    fn default() -> Self {
        ExtractorKind::ColorHistogram { bins: 16 }
    }
}

impl ExtractorKind {
    pub fn validate(&self) -> Result<(), Error> {
        match *self {
            ExtractorKind::ColorHistogram { bins } if bins == 0 || bins > 256 => Err(
                Error::InvalidConfig(format!("histogram bins must be in 1..=256, got {}", bins)),
            ),
            ExtractorKind::GridColor { rows, cols } if rows == 0 || cols == 0 => Err(
                Error::InvalidConfig(format!("grid must not be empty, got {}x{}", rows, cols)),
            ),
            _ => Ok(()),
        }
    }

    pub fn build(&self) -> Result<Box<dyn FeatureExtractor>, Error> {
        self.validate()?;

        Ok(match *self {
            ExtractorKind::ColorHistogram { bins } => Box::new(ColorHistogram::new(bins)),
            ExtractorKind::GridColor { rows, cols } => Box::new(GridColor::new(rows, cols)),
        })
    }
}

fn check_channels(crop: &ArrayView3<'_, u8>) -> Result<(), Error> {
    let channels = crop.len_of(Axis(2));
    if channels != CHANNELS {
        return Err(Error::Extractor(format!(
            "expected {} channel crop, got {}",
            CHANNELS, channels
        )));
    }

    Ok(())
}

#[derive(Debug, Clone)]
pub struct ColorHistogram {
    bins: usize,
}

impl ColorHistogram {
    pub fn new(bins: usize) -> Self {
        Self { bins }
    }

    fn embed(&self, crop: &ArrayView3<'_, u8>) -> Array1<f32> {
        let mut hist = Array1::zeros(self.bins * CHANNELS);
        let pixels = crop.len_of(Axis(0)) * crop.len_of(Axis(1));
        if pixels == 0 {
            return hist;
        }

        for ((_, _, c), &v) in crop.indexed_iter() {
            let bin = v as usize * self.bins / 256;
            hist[c * self.bins + bin] += 1.0;
        }

        hist / pixels as f32
    }
}

impl FeatureExtractor for ColorHistogram {
    fn extract(&mut self, crops: &[ArrayView3<'_, u8>]) -> Result<Vec<Array1<f32>>, Error> {
        crops
            .iter()
            .map(|crop| {
                check_channels(crop)?;
                Ok(self.embed(crop))
            })
            .collect()
    }

    #[inline]
    fn dim(&self) -> usize {
        self.bins * CHANNELS
    }
}

#[derive(Debug, Clone)]
pub struct GridColor {
    rows: usize,
    cols: usize,
}

impl GridColor {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    fn embed(&self, crop: &ArrayView3<'_, u8>) -> Array1<f32> {
        let (h, w, _) = crop.dim();
        let mut feature = Array1::zeros(self.dim());

        for r in 0..self.rows {
            let (y0, y1) = (r * h / self.rows, (r + 1) * h / self.rows);
            for c in 0..self.cols {
                let (x0, x1) = (c * w / self.cols, (c + 1) * w / self.cols);
                let count = (y1 - y0) * (x1 - x0);
                if count == 0 {
                    continue;
                }

                let offset = (r * self.cols + c) * CHANNELS;
                for y in y0..y1 {
                    for x in x0..x1 {
                        for ch in 0..CHANNELS {
                            feature[offset + ch] += crop[[y, x, ch]] as f32;
                        }
                    }
                }

                for ch in 0..CHANNELS {
                    feature[offset + ch] /= count as f32 * 255.0;
                }
            }
        }

        feature
    }
}

impl FeatureExtractor for GridColor {
    fn extract(&mut self, crops: &[ArrayView3<'_, u8>]) -> Result<Vec<Array1<f32>>, Error> {
        crops
            .iter()
            .map(|crop| {
                check_channels(crop)?;
                Ok(self.embed(crop))
            })
            .collect()
    }

    #[inline]
    fn dim(&self) -> usize {
        self.rows * self.cols * CHANNELS
    }
}
