//! Axis-aligned boxes tagged with their coordinate layout.

use std::marker::PhantomData;

pub trait BBoxFormat: std::fmt::Debug + Copy + PartialEq {}

/// `(left, top, width, height)`
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ltwh;
impl BBoxFormat for Ltwh {}

/// `(center x, center y, width / height, height)`, the measurement space of the motion model
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Xyah;
impl BBoxFormat for Xyah {}

/// `(left, top, right, bottom)`
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ltrb;
impl BBoxFormat for Ltrb {}

/// `(center x, center y, width, height)`, as produced by most detectors
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Xywh;
impl BBoxFormat for Xywh {}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BBox<F: BBoxFormat>([f32; 4], PhantomData<F>);

impl<F: BBoxFormat> BBox<F> {
    #[inline(always)]
    fn raw(v: [f32; 4]) -> Self {
        BBox(v, PhantomData)
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32; 4] {
        &self.0
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

impl BBox<Ltwh> {
    #[inline]
    pub fn ltwh(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self::raw([left, top, width, height])
    }

    #[inline(always)]
    pub fn left(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.0[3]
    }

    #[inline(always)]
    pub fn right(&self) -> f32 {
        self.left() + self.width()
    }

    #[inline(always)]
    pub fn bottom(&self) -> f32 {
        self.top() + self.height()
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Motion model and IoU are only defined for boxes with positive extent.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.is_finite() && self.width() > 0.0 && self.height() > 0.0
    }

    pub fn as_xyah(&self) -> BBox<Xyah> {
        BBox::xyah(
            self.left() + self.width() / 2.0,
            self.top() + self.height() / 2.0,
            self.width() / self.height(),
            self.height(),
        )
    }

    #[inline]
    pub fn as_ltrb(&self) -> BBox<Ltrb> {
        BBox::ltrb(self.left(), self.top(), self.right(), self.bottom())
    }

    /// Intersection over union. Boxes without overlap yield `0.0`.
    pub fn iou(&self, other: &BBox<Ltwh>) -> f32 {
        let i_left = self.left().max(other.left());
        let i_top = self.top().max(other.top());
        let i_right = self.right().min(other.right());
        let i_bottom = self.bottom().min(other.bottom());

        let i_area = (i_right - i_left).max(0.0) * (i_bottom - i_top).max(0.0);
        let union = self.area() + other.area() - i_area;

        if union <= 0.0 {
            0.0
        } else {
            i_area / union
        }
    }

    /// True when the box reaches within `margin` pixels of the left or right frame edge.
    #[inline]
    pub fn touches_horizontal_edge(&self, frame_width: f32, margin: f32) -> bool {
        self.left() <= margin || self.right() >= frame_width - margin
    }
}

impl BBox<Ltrb> {
    #[inline]
    pub fn ltrb(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self::raw([left, top, right, bottom])
    }

    #[inline(always)]
    pub fn left(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn right(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn bottom(&self) -> f32 {
        self.0[3]
    }
}

impl BBox<Xyah> {
    #[inline]
    pub fn xyah(cx: f32, cy: f32, aspect_ratio: f32, height: f32) -> Self {
        Self::raw([cx, cy, aspect_ratio, height])
    }

    #[inline(always)]
    pub fn cx(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn cy(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn aspect_ratio(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.0[3]
    }

    pub fn as_ltwh(&self) -> BBox<Ltwh> {
        let width = self.aspect_ratio() * self.height();
        BBox::ltwh(
            self.cx() - width / 2.0,
            self.cy() - self.height() / 2.0,
            width,
            self.height(),
        )
    }
}

impl BBox<Xywh> {
    #[inline]
    pub fn xywh(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::raw([cx, cy, width, height])
    }

    pub fn as_ltwh(&self) -> BBox<Ltwh> {
        let [cx, cy, w, h] = self.0;
        BBox::ltwh(cx - w / 2.0, cy - h / 2.0, w, h)
    }

    #[inline]
    pub fn as_ltrb(&self) -> BBox<Ltrb> {
        self.as_ltwh().as_ltrb()
    }
}
