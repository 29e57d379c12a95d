use ndarray::{s, ArrayView3};

use crate::bbox::{BBox, Ltrb};

/// A borrowed `height × width × channel` image of one video frame.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub image: ArrayView3<'a, u8>,
}

impl<'a> Frame<'a> {
    #[inline]
    pub fn new(image: ArrayView3<'a, u8>) -> Self {
        Self { image }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.image.dim().1
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.image.dim().0
    }

    #[inline]
    pub fn dims(&self) -> (usize, usize) {
        (self.width(), self.height())
    }

    /// Image region covered by `bbox`, clamped to the frame. Boxes fully
    /// outside the frame give an empty view.
    pub fn crop(&self, bbox: &BBox<Ltrb>) -> ArrayView3<'a, u8> {
        let clamp = |v: f32, max: usize| (v.max(0.0) as usize).min(max);
        let (w, h) = self.dims();

        let x0 = clamp(bbox.left().floor(), w);
        let y0 = clamp(bbox.top().floor(), h);
        let x1 = clamp(bbox.right().ceil(), w).max(x0);
        let y1 = clamp(bbox.bottom().ceil(), h).max(y0);

        self.image.slice_move(s![y0..y1, x0..x1, ..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn crop_is_clamped_to_image() {
        let image = Array3::<u8>::zeros((48, 64, 3));
        let frame = Frame::new(image.view());
        assert_eq!(frame.dims(), (64, 48));

        let inside = frame.crop(&BBox::ltrb(10.0, 5.0, 30.0, 25.0));
        assert_eq!(inside.dim(), (20, 20, 3));

        let partial = frame.crop(&BBox::ltrb(-10.0, 40.0, 10.0, 60.0));
        assert_eq!(partial.dim(), (8, 10, 3));

        let outside = frame.crop(&BBox::ltrb(100.0, 100.0, 120.0, 120.0));
        assert_eq!(outside.len(), 0);
    }
}
