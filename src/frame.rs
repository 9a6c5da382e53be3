use std::fmt;

use image::{GrayImage, ImageBuffer};
use ndarray::{Array2, ArrayView2};
use serde::Serialize;

/// One decoded slice with its native sample values, indexed `[row, column]`.
pub type RawFrame = Array2<u16>;

/// One slice rescaled to 8 bits, same shape as the raw frame it came from.
pub type NormalizedFrame = Array2<u8>;

/// Frame dimensions in `(height, width)` order, as `ndarray` reports them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Shape {
    pub height: usize,
    pub width: usize,
}

impl Shape {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    pub fn of<T>(frame: &ArrayView2<'_, T>) -> Self {
        let (height, width) = frame.dim();
        Self { height, width }
    }

    /// `(width, height)`, the order image and video codecs expect.
    pub fn codec_dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.height, self.width)
    }
}

/// Copy a normalized frame into a grayscale image buffer.
pub fn to_gray_image(frame: &ArrayView2<'_, u8>) -> Option<GrayImage> {
    let (height, width) = frame.dim();
    let pixel_data: Vec<u8> = frame.iter().copied().collect();
    ImageBuffer::from_raw(u32::try_from(width).ok()?, u32::try_from(height).ok()?, pixel_data)
}

/// Smallest and largest sample of a frame, `None` for an empty frame.
pub fn sample_range<T: Copy + Ord>(frame: &ArrayView2<'_, T>) -> Option<(T, T)> {
    frame.iter().fold(None, |range, &v| match range {
        None => Some((v, v)),
        Some((min, max)) => Some((min.min(v), max.max(v))),
    })
}
